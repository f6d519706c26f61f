use std::os::fd::AsRawFd;

use super::raw::RawSocket;
use crate::addr::SockAddr;
use crate::error::{Error, Result, errno};

impl RawSocket {
	/// Returns the remote address of this connection.
	pub(crate) fn peer_addr(&self) -> Result<SockAddr> {
		let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
		let mut len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;

		let result = unsafe {
			libc::getpeername(
				self.as_raw_fd(),
				&mut storage as *mut _ as *mut libc::sockaddr,
				&mut len,
			)
		};

		if result == -1 {
			return Err(Error::GetOption { errno: errno(), option: "SO_PEERNAME" });
		}

		SockAddr::from_storage(&storage, len).ok_or(Error::InvalidAddress { reason: "invalid address" })
	}

	/// Returns the local address of this socket.
	pub(crate) fn local_addr(&self) -> Result<SockAddr> {
		let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
		let mut len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;

		let result = unsafe {
			libc::getsockname(
				self.as_raw_fd(),
				&mut storage as *mut _ as *mut libc::sockaddr,
				&mut len,
			)
		};

		if result == -1 {
			return Err(Error::GetOption { errno: errno(), option: "SO_SOCKNAME" });
		}

		SockAddr::from_storage(&storage, len).ok_or(Error::InvalidAddress { reason: "invalid address" })
	}
}
