use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use crate::addr::{AddressFamily, SockAddr};
use crate::error::{Error, Result, errno};

/// Outcome of starting a non-blocking connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectStart {
	/// connect() returned 0. Rare, but possible on loopback.
	Connected,
	/// EINPROGRESS: wait for writability, then read SO_ERROR.
	InProgress,
}

/// An OS-level TCP socket owned by the reactor.
///
/// Always non-blocking and close-on-exec. The descriptor is closed on drop.
#[derive(Debug)]
pub(crate) struct RawSocket {
	fd: OwnedFd,
	family: AddressFamily,
}

impl RawSocket {
	/// Creates a new non-blocking TCP socket.
	pub(crate) fn new(family: AddressFamily) -> Result<Self> {
		let fd = unsafe {
			libc::socket(
				family.raw(),
				libc::SOCK_STREAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
				libc::IPPROTO_TCP,
			)
		};
		if fd == -1 {
			return Err(Error::Create { errno: errno() });
		}
		let fd = unsafe { OwnedFd::from_raw_fd(fd) };

		Ok(Self { fd, family })
	}

	/// Wraps a descriptor returned by accept4().
	pub(crate) fn from_accepted(fd: OwnedFd, family: AddressFamily) -> Self {
		Self { fd, family }
	}

	pub(crate) fn family(&self) -> AddressFamily {
		self.family
	}

	/// Binds the socket to an address.
	pub(crate) fn bind(&self, addr: &SockAddr) -> Result<()> {
		let result = addr.with_raw(|ptr, len| unsafe { libc::bind(self.as_raw_fd(), ptr, len) });

		if result == -1 {
			return Err(Error::Bind {
				errno: errno(),
				addr: addr.to_string(),
			});
		}
		Ok(())
	}

	/// Starts a non-blocking connection.
	///
	/// Returns immediately. Poll for writability, then check `take_error()`.
	pub(crate) fn connect(&self, addr: &SockAddr) -> Result<ConnectStart> {
		let result = addr.with_raw(|ptr, len| unsafe { libc::connect(self.as_raw_fd(), ptr, len) });

		match result {
			0 => Ok(ConnectStart::Connected),
			_ => {
				let e = errno();
				if e == libc::EINPROGRESS {
					Ok(ConnectStart::InProgress)
				} else {
					Err(Error::Connect {
						errno: e,
						addr: addr.to_string(),
					})
				}
			}
		}
	}
}

impl AsRawFd for RawSocket {
	fn as_raw_fd(&self) -> std::os::fd::RawFd {
		self.fd.as_raw_fd()
	}
}

impl std::os::fd::AsFd for RawSocket {
	fn as_fd(&self) -> std::os::fd::BorrowedFd<'_> {
		self.fd.as_fd()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bind_reports_address_in_error() {
		let first = RawSocket::new(AddressFamily::Ipv4).unwrap();
		let addr = SockAddr::parse(AddressFamily::Ipv4, "127.0.0.1", 0).unwrap();
		first.bind(&addr).unwrap();
		first.listen(8).unwrap();
		let taken = first.local_addr().unwrap();

		let second = RawSocket::new(AddressFamily::Ipv4).unwrap();
		match second.bind(&taken) {
			Err(Error::Bind { errno, addr }) => {
				assert_eq!(errno, libc::EADDRINUSE);
				assert_eq!(addr, taken.to_string());
			}
			other => panic!("expected bind failure, got {other:?}"),
		}
	}

	#[test]
	fn connect_to_closed_port_is_in_progress_or_refused() {
		let sock = RawSocket::new(AddressFamily::Ipv4).unwrap();
		let addr = SockAddr::parse(AddressFamily::Ipv4, "127.0.0.1", 1).unwrap();
		match sock.connect(&addr) {
			Ok(ConnectStart::InProgress) => {}
			Err(Error::Connect { errno, .. }) => assert_eq!(errno, libc::ECONNREFUSED),
			other => panic!("unexpected connect outcome {other:?}"),
		}
	}
}
