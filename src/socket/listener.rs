use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use super::raw::RawSocket;
use crate::error::{Error, Result, errno};

/// Result of a non-blocking accept probe on a raw listening socket.
///
/// The listener keeps listening in every case.
#[derive(Debug)]
pub(crate) enum RawAccept {
	/// A connection was accepted. The new socket is non-blocking.
	Connection(RawSocket),

	/// No connection is ready at this time.
	WouldBlock,

	/// The accept syscall was interrupted by a signal.
	Interrupted,
}

impl RawSocket {
	/// Starts listening.
	///
	/// `backlog` is the maximum length of the pending connection queue.
	pub(crate) fn listen(&self, backlog: i32) -> Result<()> {
		let result = unsafe { libc::listen(self.as_raw_fd(), backlog) };

		if result == -1 {
			return Err(Error::Listen { errno: errno(), backlog });
		}
		Ok(())
	}

	/// Attempts to accept a connection **without blocking**.
	///
	/// The accepted socket inherits this socket's address family.
	pub(crate) fn accept(&self) -> Result<RawAccept> {
		let fd = unsafe {
			libc::accept4(
				self.as_raw_fd(),
				std::ptr::null_mut(),
				std::ptr::null_mut(),
				libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
			)
		};

		if fd == -1 {
			let err = errno();
			return match err {
				libc::EAGAIN => Ok(RawAccept::WouldBlock),
				libc::EINTR => Ok(RawAccept::Interrupted),
				_ => Err(Error::Accept { errno: err }),
			};
		}

		let fd = unsafe { OwnedFd::from_raw_fd(fd) };
		Ok(RawAccept::Connection(RawSocket::from_accepted(fd, self.family())))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::addr::{AddressFamily, SockAddr};

	#[test]
	fn accept_without_pending_connection_would_block() {
		let sock = RawSocket::new(AddressFamily::Ipv4).unwrap();
		sock.bind(&SockAddr::parse(AddressFamily::Ipv4, "127.0.0.1", 0).unwrap()).unwrap();
		sock.listen(4).unwrap();
		assert!(matches!(sock.accept().unwrap(), RawAccept::WouldBlock));
	}

	#[test]
	fn accept_on_unlistened_socket_fails() {
		let sock = RawSocket::new(AddressFamily::Ipv4).unwrap();
		match sock.accept() {
			Err(Error::Accept { errno }) => assert_eq!(errno, libc::EINVAL),
			other => panic!("expected accept failure, got {other:?}"),
		}
	}

	#[test]
	fn accepts_pending_std_client() {
		let sock = RawSocket::new(AddressFamily::Ipv4).unwrap();
		sock.bind(&SockAddr::parse(AddressFamily::Ipv4, "127.0.0.1", 0).unwrap()).unwrap();
		sock.listen(4).unwrap();
		let addr: std::net::SocketAddr = sock.local_addr().unwrap().into();
		let _client = std::net::TcpStream::connect(addr).unwrap();

		match sock.accept().unwrap() {
			RawAccept::Connection(conn) => assert_eq!(conn.family(), AddressFamily::Ipv4),
			other => panic!("expected a connection, got {other:?}"),
		}
	}
}
