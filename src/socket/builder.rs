use std::os::fd::AsRawFd;

use super::{
	set_keepalive, set_keepalive_count, set_keepalive_idle, set_keepalive_interval,
	set_reuse_addr, set_reuse_port, set_tcp_nodelay,
};
use crate::error::Result;

/// Address reuse configuration, applied when an endpoint binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReuseConfig {
	pub addr: bool,
	pub port: bool,
}

impl Default for ReuseConfig {
	fn default() -> Self {
		Self {
			addr: true,
			port: false,
		}
	}
}

impl ReuseConfig {
	pub fn new() -> Self {
		Self::default()
	}

	/// `SO_REUSEADDR`, so a restarted listener can rebind a port in `TIME_WAIT`.
	pub fn addr(mut self, enable: bool) -> Self {
		self.addr = enable;
		self
	}

	/// `SO_REUSEPORT`.
	pub fn port(mut self, enable: bool) -> Self {
		self.port = enable;
		self
	}

	pub(crate) fn apply<S: AsRawFd>(&self, socket: &S) -> Result<()> {
		if self.addr {
			set_reuse_addr(socket, true)?;
		}
		if self.port {
			set_reuse_port(socket, true)?;
		}
		Ok(())
	}
}

/// TCP options applied to every socket a reactor creates or accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpConfig {
	pub nodelay: bool,
	pub keepalive: Option<KeepaliveConfig>,
}

impl TcpConfig {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn nodelay(mut self, enable: bool) -> Self {
		self.nodelay = enable;
		self
	}

	pub fn keepalive(mut self, config: KeepaliveConfig) -> Self {
		self.keepalive = Some(config);
		self
	}

	pub(crate) fn apply<S: AsRawFd>(&self, socket: &S) -> Result<()> {
		if self.nodelay {
			set_tcp_nodelay(socket, true)?;
		}
		if let Some(config) = self.keepalive {
			set_keepalive(socket, true)?;
			set_keepalive_idle(socket, config.idle_secs)?;
			set_keepalive_interval(socket, config.interval_secs)?;
			set_keepalive_count(socket, config.count)?;
		}
		Ok(())
	}
}

/// Keep-alive probe timing, in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepaliveConfig {
	pub idle_secs: u32,
	pub interval_secs: u32,
	pub count: u32,
}

impl Default for KeepaliveConfig {
	fn default() -> Self {
		Self {
			idle_secs: 60,
			interval_secs: 10,
			count: 5,
		}
	}
}

impl KeepaliveConfig {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn idle(mut self, secs: u32) -> Self {
		self.idle_secs = secs;
		self
	}

	pub fn interval(mut self, secs: u32) -> Self {
		self.interval_secs = secs;
		self
	}

	pub fn count(mut self, count: u32) -> Self {
		self.count = count;
		self
	}
}
