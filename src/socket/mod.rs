//! Raw socket plumbing: syscalls, socket options and their configuration.

mod builder;
mod listener;
mod options;
mod raw;
mod stream;

pub(crate) use self::listener::RawAccept;
pub(crate) use self::options::{apply_keepalive, take_error};
pub use self::options::{
	keepalive, keepalive_idle, set_keepalive, set_keepalive_count, set_keepalive_idle,
	set_keepalive_interval, set_reuse_addr, set_reuse_port, set_tcp_nodelay, tcp_nodelay,
};
pub(crate) use self::raw::{ConnectStart, RawSocket};

pub use self::builder::{KeepaliveConfig, ReuseConfig, TcpConfig};
