use std::ffi::CString;
use std::net::Ipv6Addr;

use super::invalid;
use crate::error::Result;

/// IPv6 socket address (IP + port + scope).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketAddrV6 {
	ip: [u8; 16],
	port: u16,
	/// Scope ID for link-local addresses (identifies network interface).
	/// Usually 0 unless using link-local addresses like fe80::.
	scope_id: u32,
}

impl SocketAddrV6 {
	/// Creates a new IPv6 address.
	pub fn new(ip: [u8; 16], port: u16) -> Self {
		Self { ip, port, scope_id: 0 }
	}

	/// Creates with explicit scope ID.
	///
	/// Use for link-local addresses (fe80::) where you need to specify the interface.
	pub fn with_scope(ip: [u8; 16], port: u16, scope_id: u32) -> Self {
		Self { ip, port, scope_id }
	}

	/// Parses an IPv6 literal, optionally followed by `%scope`.
	///
	/// The scope may be a numeric index (`fe80::1%2`) or an interface name
	/// (`fe80::1%eth0`), resolved with `if_nametoindex`.
	pub fn parse(ip: &str, port: u16) -> Result<Self> {
		let (literal, scope) = match ip.split_once('%') {
			Some((literal, scope)) => (literal, Some(scope)),
			None => (ip, None),
		};
		let addr: Ipv6Addr = literal.parse().map_err(|_| invalid("not an IPv6 literal"))?;
		let scope_id = match scope {
			None => 0,
			Some(scope) => parse_scope(scope)?,
		};
		Ok(Self::with_scope(addr.octets(), port, scope_id))
	}

	/// Returns the IP bytes.
	pub fn ip(&self) -> [u8; 16] {
		self.ip
	}

	/// Returns the port.
	pub fn port(&self) -> u16 {
		self.port
	}

	/// Returns the scope ID.
	pub fn scope_id(&self) -> u32 {
		self.scope_id
	}

	/// Converts to the raw sockaddr_in6 for syscalls.
	pub(crate) fn to_raw(&self) -> libc::sockaddr_in6 {
		libc::sockaddr_in6 {
			sin6_family: libc::AF_INET6 as libc::sa_family_t,
			sin6_port: self.port.to_be(),
			sin6_flowinfo: 0,
			sin6_addr: libc::in6_addr {
				s6_addr: self.ip,
			},
			sin6_scope_id: self.scope_id,
		}
	}

	/// Creates from raw sockaddr_in6.
	pub(crate) fn from_raw(raw: &libc::sockaddr_in6) -> Self {
		Self {
			ip: raw.sin6_addr.s6_addr,
			port: u16::from_be(raw.sin6_port),
			scope_id: raw.sin6_scope_id,
		}
	}
}

fn parse_scope(scope: &str) -> Result<u32> {
	if scope.is_empty() {
		return Err(invalid("empty IPv6 scope"));
	}
	if let Ok(index) = scope.parse::<u32>() {
		return Ok(index);
	}
	let name = CString::new(scope).map_err(|_| invalid("IPv6 scope contains NUL"))?;
	match unsafe { libc::if_nametoindex(name.as_ptr()) } {
		0 => Err(invalid("unknown IPv6 scope interface")),
		index => Ok(index),
	}
}
