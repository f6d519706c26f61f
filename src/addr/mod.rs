//! Address families and socket addresses.
//!
//! The family is a runtime value: one connect entry point dispatches to the
//! IPv4 or IPv6 parser and `sockaddr` layout depending on it.
//! - `Ipv4`: Internet Protocol version 4
//! - `Ipv6`: Internet Protocol version 6

mod ipv4;
mod ipv6;

use std::fmt;

use crate::error::{Error, Result};

pub use self::ipv4::SocketAddrV4;
pub use self::ipv6::SocketAddrV6;

/// Address family of a TCP endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
	Ipv4,
	Ipv6,
}

impl AddressFamily {
	/// Returns the libc constant for this address family.
	#[inline]
	pub fn raw(self) -> libc::c_int {
		match self {
			AddressFamily::Ipv4 => libc::AF_INET,
			AddressFamily::Ipv6 => libc::AF_INET6,
		}
	}
}

impl fmt::Display for AddressFamily {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			AddressFamily::Ipv4 => f.write_str("IPv4"),
			AddressFamily::Ipv6 => f.write_str("IPv6"),
		}
	}
}

/// A socket address of either family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SockAddr {
	V4(SocketAddrV4),
	V6(SocketAddrV6),
}

impl SockAddr {
	/// Parses a literal IP address of the given family.
	///
	/// No name resolution is performed; `"localhost"` is rejected.
	pub fn parse(family: AddressFamily, ip: &str, port: u16) -> Result<Self> {
		match family {
			AddressFamily::Ipv4 => SocketAddrV4::parse(ip, port).map(SockAddr::V4),
			AddressFamily::Ipv6 => SocketAddrV6::parse(ip, port).map(SockAddr::V6),
		}
	}

	pub fn family(&self) -> AddressFamily {
		match self {
			SockAddr::V4(_) => AddressFamily::Ipv4,
			SockAddr::V6(_) => AddressFamily::Ipv6,
		}
	}

	pub fn port(&self) -> u16 {
		match self {
			SockAddr::V4(addr) => addr.port(),
			SockAddr::V6(addr) => addr.port(),
		}
	}

	/// Calls the provided closure with a pointer to the raw sockaddr and its size.
	///
	/// The raw struct lives on this stack frame, so the pointer is only valid
	/// inside the closure.
	pub(crate) fn with_raw<F, R>(&self, f: F) -> R
	where
		F: FnOnce(*const libc::sockaddr, libc::socklen_t) -> R,
	{
		match self {
			SockAddr::V4(addr) => {
				let raw = addr.to_raw();
				let len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
				f(&raw as *const _ as *const libc::sockaddr, len)
			}
			SockAddr::V6(addr) => {
				let raw = addr.to_raw();
				let len = std::mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t;
				f(&raw as *const _ as *const libc::sockaddr, len)
			}
		}
	}

	/// Creates an address from kernel-filled storage.
	///
	/// Returns `None` for families other than `AF_INET`/`AF_INET6` or when
	/// `len` is too short for the reported family.
	pub(crate) fn from_storage(storage: &libc::sockaddr_storage, len: libc::socklen_t) -> Option<Self> {
		let ptr = storage as *const libc::sockaddr_storage;
		match storage.ss_family as libc::c_int {
			libc::AF_INET => {
				if (len as usize) < std::mem::size_of::<libc::sockaddr_in>() {
					return None;
				}
				let raw = unsafe { &*(ptr as *const libc::sockaddr_in) };
				Some(SockAddr::V4(SocketAddrV4::from_raw(raw)))
			}
			libc::AF_INET6 => {
				if (len as usize) < std::mem::size_of::<libc::sockaddr_in6>() {
					return None;
				}
				let raw = unsafe { &*(ptr as *const libc::sockaddr_in6) };
				Some(SockAddr::V6(SocketAddrV6::from_raw(raw)))
			}
			_ => None,
		}
	}
}

impl From<SocketAddrV4> for SockAddr {
	fn from(addr: SocketAddrV4) -> Self {
		SockAddr::V4(addr)
	}
}

impl From<SocketAddrV6> for SockAddr {
	fn from(addr: SocketAddrV6) -> Self {
		SockAddr::V6(addr)
	}
}

impl From<SockAddr> for std::net::SocketAddr {
	fn from(addr: SockAddr) -> Self {
		match addr {
			SockAddr::V4(addr) => std::net::SocketAddr::V4(std::net::SocketAddrV4::new(
				addr.ip().into(),
				addr.port(),
			)),
			SockAddr::V6(addr) => std::net::SocketAddr::V6(std::net::SocketAddrV6::new(
				addr.ip().into(),
				addr.port(),
				0,
				addr.scope_id(),
			)),
		}
	}
}

impl fmt::Display for SockAddr {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		std::net::SocketAddr::from(*self).fmt(f)
	}
}

fn invalid(reason: &'static str) -> Error {
	Error::InvalidAddress { reason }
}
