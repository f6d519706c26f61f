use std::os::fd::AsRawFd;
use std::time::Duration;

use crate::error::{Error, Result, errno};

fn setsockopt_int<S: AsRawFd>(
	socket: &S,
	level: libc::c_int,
	name: libc::c_int,
	val: libc::c_int,
	option: &'static str,
) -> Result<()> {
	let result = unsafe {
		libc::setsockopt(
			socket.as_raw_fd(),
			level,
			name,
			&val as *const _ as *const libc::c_void,
			std::mem::size_of::<libc::c_int>() as libc::socklen_t,
		)
	};
	if result == -1 {
		Err(Error::SetOption { errno: errno(), option })
	} else {
		Ok(())
	}
}

fn getsockopt_int<S: AsRawFd>(
	socket: &S,
	level: libc::c_int,
	name: libc::c_int,
	option: &'static str,
) -> Result<libc::c_int> {
	let mut val: libc::c_int = 0;
	let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
	let result = unsafe {
		libc::getsockopt(
			socket.as_raw_fd(),
			level,
			name,
			&mut val as *mut _ as *mut libc::c_void,
			&mut len,
		)
	};
	if result == -1 {
		Err(Error::GetOption { errno: errno(), option })
	} else {
		Ok(val)
	}
}

/// Sets SO_REUSEADDR on a socket.
///
/// Allows binding to an address that's in TIME_WAIT state.
/// Essential for server restarts.
pub fn set_reuse_addr<S: AsRawFd>(socket: &S, enable: bool) -> Result<()> {
	setsockopt_int(socket, libc::SOL_SOCKET, libc::SO_REUSEADDR, enable as libc::c_int, "SO_REUSEADDR")
}

/// Sets SO_REUSEPORT on a socket.
///
/// Allows multiple sockets to bind the same port.
pub fn set_reuse_port<S: AsRawFd>(socket: &S, enable: bool) -> Result<()> {
	setsockopt_int(socket, libc::SOL_SOCKET, libc::SO_REUSEPORT, enable as libc::c_int, "SO_REUSEPORT")
}

/// Sets TCP_NODELAY on a socket.
///
/// Disables Nagle's algorithm: small segments are sent immediately
/// instead of being coalesced.
pub fn set_tcp_nodelay<S: AsRawFd>(socket: &S, enable: bool) -> Result<()> {
	setsockopt_int(socket, libc::IPPROTO_TCP, libc::TCP_NODELAY, enable as libc::c_int, "TCP_NODELAY")
}

/// Reads TCP_NODELAY back from the kernel.
pub fn tcp_nodelay<S: AsRawFd>(socket: &S) -> Result<bool> {
	getsockopt_int(socket, libc::IPPROTO_TCP, libc::TCP_NODELAY, "TCP_NODELAY").map(|v| v != 0)
}

/// Enables TCP keep-alive (SO_KEEPALIVE).
///
/// When enabled, the kernel sends probes on idle connections to detect dead peers.
/// Use with TCP_KEEPIDLE, TCP_KEEPINTVL, TCP_KEEPCNT to tune timing.
pub fn set_keepalive<S: AsRawFd>(socket: &S, enable: bool) -> Result<()> {
	setsockopt_int(socket, libc::SOL_SOCKET, libc::SO_KEEPALIVE, enable as libc::c_int, "SO_KEEPALIVE")
}

/// Reads SO_KEEPALIVE back from the kernel.
pub fn keepalive<S: AsRawFd>(socket: &S) -> Result<bool> {
	getsockopt_int(socket, libc::SOL_SOCKET, libc::SO_KEEPALIVE, "SO_KEEPALIVE").map(|v| v != 0)
}

/// Sets TCP keep-alive idle time (TCP_KEEPIDLE).
///
/// Seconds of idle time before the first keep-alive probe is sent.
/// Requires SO_KEEPALIVE to be enabled.
pub fn set_keepalive_idle<S: AsRawFd>(socket: &S, seconds: u32) -> Result<()> {
	setsockopt_int(socket, libc::IPPROTO_TCP, libc::TCP_KEEPIDLE, seconds as libc::c_int, "TCP_KEEPIDLE")
}

/// Reads TCP_KEEPIDLE back from the kernel, in seconds.
pub fn keepalive_idle<S: AsRawFd>(socket: &S) -> Result<u32> {
	getsockopt_int(socket, libc::IPPROTO_TCP, libc::TCP_KEEPIDLE, "TCP_KEEPIDLE").map(|v| v as u32)
}

/// Sets TCP keep-alive probe interval (TCP_KEEPINTVL).
pub fn set_keepalive_interval<S: AsRawFd>(socket: &S, seconds: u32) -> Result<()> {
	setsockopt_int(socket, libc::IPPROTO_TCP, libc::TCP_KEEPINTVL, seconds as libc::c_int, "TCP_KEEPINTVL")
}

/// Sets TCP keep-alive probe count (TCP_KEEPCNT).
///
/// Total detection time = KEEPIDLE + (KEEPINTVL × KEEPCNT).
pub fn set_keepalive_count<S: AsRawFd>(socket: &S, count: u32) -> Result<()> {
	setsockopt_int(socket, libc::IPPROTO_TCP, libc::TCP_KEEPCNT, count as libc::c_int, "TCP_KEEPCNT")
}

/// Toggles keep-alive and, when enabling, sets the idle delay before the
/// first probe.
///
/// The kernel only accepts whole seconds; sub-second remainders are dropped
/// and an enabled keep-alive with a zero delay is rejected.
pub fn apply_keepalive<S: AsRawFd>(socket: &S, enable: bool, idle: Duration) -> Result<()> {
	if enable && idle.as_secs() == 0 {
		return Err(Error::InvalidArgument { reason: "keep-alive idle time must be at least one second" });
	}
	set_keepalive(socket, enable)?;
	if enable {
		let secs = u32::try_from(idle.as_secs()).unwrap_or(u32::MAX).min(i32::MAX as u32);
		set_keepalive_idle(socket, secs)?;
	}
	Ok(())
}

/// Reads and clears the pending socket error (SO_ERROR).
///
/// Returns `0` when no error is pending, i.e. a non-blocking connect
/// completed successfully. Reading clears the error, so only call it once.
pub fn take_error<S: AsRawFd>(socket: &S) -> Result<i32> {
	getsockopt_int(socket, libc::SOL_SOCKET, libc::SO_ERROR, "SO_ERROR")
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::net::TcpListener;

	#[test]
	fn nodelay_round_trips() {
		let sock = TcpListener::bind("127.0.0.1:0").unwrap();
		set_tcp_nodelay(&sock, true).unwrap();
		assert!(tcp_nodelay(&sock).unwrap());
		set_tcp_nodelay(&sock, false).unwrap();
		assert!(!tcp_nodelay(&sock).unwrap());
	}

	#[test]
	fn keepalive_sets_idle_seconds() {
		let sock = TcpListener::bind("127.0.0.1:0").unwrap();
		apply_keepalive(&sock, true, Duration::from_millis(30_500)).unwrap();
		assert!(keepalive(&sock).unwrap());
		assert_eq!(keepalive_idle(&sock).unwrap(), 30);
	}

	#[test]
	fn keepalive_rejects_zero_idle_when_enabling() {
		let sock = TcpListener::bind("127.0.0.1:0").unwrap();
		let err = apply_keepalive(&sock, true, Duration::ZERO).unwrap_err();
		assert!(matches!(err, Error::InvalidArgument { .. }));
		apply_keepalive(&sock, false, Duration::ZERO).unwrap();
		assert!(!keepalive(&sock).unwrap());
	}
}
