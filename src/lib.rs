pub mod socket;
mod addr;
mod error;
mod reactor;
mod tcp;

pub use self::error::{Error, Result, errno};
pub use self::addr::{AddressFamily, SockAddr, SocketAddrV4, SocketAddrV6};
pub use self::reactor::{Reactor, ReactorBuilder, RunMode};
pub use self::tcp::{AcceptResult, ConnectCallback, Tcp};
pub use self::socket::{KeepaliveConfig, ReuseConfig, TcpConfig};
pub use self::socket::{set_reuse_addr, set_reuse_port, set_tcp_nodelay, tcp_nodelay,
					   set_keepalive, keepalive, set_keepalive_idle, keepalive_idle,
					   set_keepalive_interval, set_keepalive_count};
