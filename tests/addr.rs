use std::net::SocketAddr;

use evlane::{AddressFamily, Error, SockAddr, SocketAddrV4, SocketAddrV6};
use rstest::rstest;

#[rstest]
#[case::loopback("127.0.0.1", [127, 0, 0, 1])]
#[case::any("0.0.0.0", [0, 0, 0, 0])]
#[case::broadcast("255.255.255.255", [255, 255, 255, 255])]
fn parses_ipv4_literals(#[case] literal: &str, #[case] octets: [u8; 4]) {
	let addr = SockAddr::parse(AddressFamily::Ipv4, literal, 9000).unwrap();
	assert_eq!(addr, SockAddr::V4(SocketAddrV4::new(octets, 9000)));
	assert_eq!(addr.family(), AddressFamily::Ipv4);
	assert_eq!(addr.port(), 9000);
}

#[rstest]
#[case::loopback("::1")]
#[case::any("::")]
#[case::mapped("::ffff:127.0.0.1")]
#[case::link_local("fe80::1%3")]
fn parses_ipv6_literals(#[case] literal: &str) {
	let addr = SockAddr::parse(AddressFamily::Ipv6, literal, 443).unwrap();
	assert_eq!(addr.family(), AddressFamily::Ipv6);
	assert_eq!(addr.port(), 443);
}

#[rstest]
#[case::empty(AddressFamily::Ipv4, "")]
#[case::short(AddressFamily::Ipv4, "127.0.1")]
#[case::with_port(AddressFamily::Ipv4, "127.0.0.1:80")]
#[case::name(AddressFamily::Ipv4, "localhost")]
#[case::wrong_family(AddressFamily::Ipv4, "::1")]
#[case::bracketed(AddressFamily::Ipv6, "[::1]")]
#[case::v4_as_v6(AddressFamily::Ipv6, "10.0.0.1")]
#[case::empty_scope(AddressFamily::Ipv6, "fe80::1%")]
fn rejects_malformed_literals(#[case] family: AddressFamily, #[case] literal: &str) {
	let err = SockAddr::parse(family, literal, 80).unwrap_err();
	assert!(matches!(err, Error::InvalidAddress { .. }), "{err}");
	assert_eq!(err.code(), libc::EINVAL);
}

#[test]
fn scope_id_survives_conversion_to_std() {
	let addr = SockAddr::from(SocketAddrV6::with_scope(
		"fe80::1".parse::<std::net::Ipv6Addr>().unwrap().octets(),
		22,
		5,
	));
	match SocketAddr::from(addr) {
		SocketAddr::V6(std) => {
			assert_eq!(std.scope_id(), 5);
			assert_eq!(std.port(), 22);
		}
		other => panic!("expected an IPv6 address, got {other}"),
	}
}

#[test]
fn display_uses_standard_notation() {
	let v4 = SockAddr::parse(AddressFamily::Ipv4, "192.168.1.10", 8080).unwrap();
	let v6 = SockAddr::parse(AddressFamily::Ipv6, "::1", 8080).unwrap();
	assert_eq!(v4.to_string(), "192.168.1.10:8080");
	assert_eq!(v6.to_string(), "[::1]:8080");
	assert_eq!(AddressFamily::Ipv4.to_string(), "IPv4");
	assert_eq!(AddressFamily::Ipv6.raw(), libc::AF_INET6);
}
