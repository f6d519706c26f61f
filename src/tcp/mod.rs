//! TCP endpoints bound to a [`Reactor`].
//!
//! A [`Tcp`] is a cheap, clonable handle. The endpoint itself lives in the
//! reactor's arena; the handle only names it. Operations on a handle whose
//! endpoint never came into existence, was closed, or whose reactor is gone
//! report an error instead of panicking.
//!
//! ```rust,ignore
//! let reactor = Reactor::new()?;
//! let client = Tcp::new(&reactor);
//! client.connect(AddressFamily::Ipv4, "127.0.0.1", 9000, |result| {
//!     println!("connected: {result:?}");
//! });
//! reactor.run(RunMode::Default)?;
//! ```

mod state;

use std::os::fd::{AsRawFd, RawFd};
use std::rc::{Rc, Weak};
use std::time::Duration;

pub use self::state::ConnectCallback;
pub(crate) use self::state::TcpState;

use crate::addr::{AddressFamily, SockAddr};
use crate::error::{Error, Result};
use crate::reactor::{HandleKey, Reactor, Shared, Slot};
use crate::socket::RawAccept;

/// Outcome of [`Tcp::try_accept`].
#[derive(Debug)]
pub enum AcceptResult {
	/// A connection was accepted into a new endpoint.
	Connection(Tcp),

	/// No connection is pending right now.
	WouldBlock,

	/// The accept was interrupted by a signal; retrying is fine.
	Interrupted,
}

/// Names one endpoint in a reactor's arena.
///
/// Shared by every clone of a [`Tcp`]; when the last clone goes away the
/// endpoint is released.
pub(crate) struct HandleRef {
	reactor: Weak<Shared>,
	/// `None` when the endpoint could not be created.
	key: Option<HandleKey>,
}

impl Drop for HandleRef {
	fn drop(&mut self) {
		if let (Some(key), Some(shared)) = (self.key, self.reactor.upgrade()) {
			shared.release(key);
		}
	}
}

/// A TCP endpoint.
///
/// Dropping the last clone closes the endpoint, unless a connect is still
/// outstanding: then the endpoint stays alive until the connect completes and
/// its callback has run.
#[derive(Clone)]
pub struct Tcp {
	inner: Rc<HandleRef>,
}

impl Tcp {
	/// Creates an endpoint on `reactor`.
	///
	/// The OS socket is created by the first `bind` or `connect`, in that
	/// call's address family. Creation never fails loudly: check
	/// [`is_initialized`](Self::is_initialized).
	pub fn new(reactor: &Reactor) -> Self {
		Self::create(reactor.shared(), None)
	}

	/// Creates an endpoint whose socket is created right away in `family`.
	pub fn with_family(reactor: &Reactor, family: AddressFamily) -> Self {
		Self::create(reactor.shared(), Some(family))
	}

	fn create(shared: &Rc<Shared>, family: Option<AddressFamily>) -> Self {
		let mut state = TcpState::new();
		let created = match family {
			Some(family) => state.ensure_socket(&shared.config, family),
			None => Ok(()),
		};

		match created.and_then(|()| Self::adopt(shared, state)) {
			Ok(tcp) => tcp,
			Err(err) => {
				tracing::debug!(target: "evlane::tcp", %err, "endpoint not initialized");
				Self {
					inner: Rc::new(HandleRef {
						reactor: Rc::downgrade(shared),
						key: None,
					}),
				}
			}
		}
	}

	/// Moves `state` into the arena and hands out the first handle to it.
	fn adopt(shared: &Rc<Shared>, state: TcpState) -> Result<Self> {
		let key = shared.insert(Slot::Tcp(state))?;
		let inner = Rc::new(HandleRef {
			reactor: Rc::downgrade(shared),
			key: Some(key),
		});
		if let Some(Slot::Tcp(state)) = shared.handles.borrow_mut().get_mut(key) {
			state.this = Rc::downgrade(&inner);
		}
		Ok(Self { inner })
	}

	fn parts(&self) -> Result<(Rc<Shared>, HandleKey)> {
		let key = self.inner.key.ok_or(Error::NotInitialized)?;
		let shared = self.inner.reactor.upgrade().ok_or(Error::ReactorGone)?;
		Ok((shared, key))
	}

	/// Runs `f` against the endpoint's state.
	///
	/// The arena stays borrowed while `f` runs, so `f` must not invoke user
	/// callbacks or drop anything that could.
	fn with_state<R>(&self, f: impl FnOnce(&Shared, HandleKey, &mut TcpState) -> Result<R>) -> Result<R> {
		let (shared, key) = self.parts()?;
		let mut handles = shared.handles.borrow_mut();
		let result = match handles.get_mut(key) {
			Some(Slot::Tcp(state)) => f(&shared, key, state),
			None => Err(Error::Closed),
		};
		result
	}

	/// Whether the reactor created this endpoint.
	///
	/// Stays true after `close()`; see [`is_closed`](Self::is_closed).
	pub fn is_initialized(&self) -> bool {
		self.inner.key.is_some()
	}

	/// Whether the endpoint was closed or its reactor dropped.
	///
	/// An uninitialized endpoint was never open, so it is never closed
	/// either; check [`is_initialized`](Self::is_initialized) first.
	pub fn is_closed(&self) -> bool {
		match self.parts() {
			Ok((shared, key)) => {
				let handles = shared.handles.borrow();
				!handles.contains_key(key)
			}
			Err(Error::ReactorGone) => true,
			Err(_) => false,
		}
	}

	/// Whether a connect is outstanding or the endpoint is listening.
	pub fn is_active(&self) -> bool {
		self.with_state(|_, _, state| Ok(state.is_active())).unwrap_or(false)
	}

	/// Address family of the socket, once it exists.
	pub fn family(&self) -> Option<AddressFamily> {
		self.with_state(|_, _, state| Ok(state.family())).ok().flatten()
	}

	/// The underlying descriptor. Owned by the endpoint: do not close it.
	pub fn fileno(&self) -> Result<RawFd> {
		self.with_state(|_, _, state| Ok(state.socket()?.as_raw_fd()))
	}

	/// Enables or disables Nagle's algorithm suppression (`TCP_NODELAY`).
	pub fn set_no_delay(&self, enable: bool) -> Result<()> {
		self.with_state(|_, _, state| state.set_no_delay(enable))
	}

	/// Enables or disables TCP keep-alive.
	///
	/// `idle` is the time before the first probe, in whole seconds; it is
	/// ignored when disabling. Enabling with less than one second fails with
	/// [`Error::InvalidArgument`].
	pub fn set_keep_alive(&self, enable: bool, idle: Duration) -> Result<()> {
		self.with_state(|_, _, state| state.set_keep_alive(enable, idle))
	}

	/// Connects to `address:port`, parsed as a literal of `family`.
	///
	/// `on_complete` runs exactly once. Failures known immediately (malformed
	/// address, endpoint not usable, a connect already outstanding, refused
	/// by the kernel up front) are reported before this call returns;
	/// otherwise the reactor reports the outcome from a later iteration.
	pub fn connect<F>(&self, family: AddressFamily, address: &str, port: u16, on_complete: F)
	where
		F: FnOnce(Result<()>) + 'static,
	{
		match SockAddr::parse(family, address, port) {
			Ok(target) => self.connect_addr(target, on_complete),
			Err(err) => {
				tracing::debug!(target: "evlane::tcp", address, %err, "connect rejected");
				on_complete(Err(err));
			}
		}
	}

	/// Like [`connect`](Self::connect), with an already parsed address.
	pub fn connect_addr<F>(&self, target: SockAddr, on_complete: F)
	where
		F: FnOnce(Result<()>) + 'static,
	{
		let mut callback: Option<ConnectCallback> = Some(Box::new(on_complete));
		let started = self.with_state(|shared, key, state| state.begin_connect(shared, key, target, &mut callback));

		if let Err(err) = started {
			tracing::debug!(target: "evlane::tcp", %target, %err, "connect failed to start");
			if let Some(callback) = callback {
				callback(Err(err));
			}
		}
	}

	/// Binds to a literal address of `family`.
	pub fn bind(&self, family: AddressFamily, address: &str, port: u16) -> Result<()> {
		self.bind_addr(SockAddr::parse(family, address, port)?)
	}

	/// Binds to an already parsed address.
	pub fn bind_addr(&self, addr: SockAddr) -> Result<()> {
		self.with_state(|shared, _, state| state.bind(&shared.config, &addr))
	}

	/// Starts listening.
	///
	/// `on_connection` runs on every reactor iteration in which connections
	/// are waiting; call [`accept`](Self::accept) from it. An endpoint with
	/// no socket yet listens on an IPv4 socket with an ephemeral port.
	/// Calling `listen` again replaces the callback.
	pub fn listen<F>(&self, backlog: i32, on_connection: F) -> Result<()>
	where
		F: FnMut(&Tcp, Result<()>) + 'static,
	{
		let replaced =
			self.with_state(|shared, key, state| state.listen(shared, key, backlog, Box::new(on_connection)))?;
		drop(replaced);
		Ok(())
	}

	/// Accepts one pending connection into a new endpoint.
	///
	/// Returns `None` when nothing is pending, the endpoint is not a
	/// listener, or the new endpoint could not be created. The listener
	/// keeps listening either way. Use [`try_accept`](Self::try_accept) to
	/// tell these apart.
	pub fn accept(&self) -> Option<Tcp> {
		match self.try_accept() {
			Ok(AcceptResult::Connection(tcp)) => Some(tcp),
			Ok(AcceptResult::WouldBlock | AcceptResult::Interrupted) => None,
			Err(err) => {
				tracing::debug!(target: "evlane::tcp", %err, "accept failed");
				None
			}
		}
	}

	/// Accepts one pending connection, reporting why none was produced.
	///
	/// The arena slot is reserved before the connection is taken off the
	/// backlog, so a full reactor leaves the connection pending.
	pub fn try_accept(&self) -> Result<AcceptResult> {
		let (shared, _) = self.parts()?;
		shared.reserve()?;

		let socket = match self.with_state(|_, _, state| state.accept_raw())? {
			RawAccept::Connection(socket) => socket,
			RawAccept::WouldBlock => return Ok(AcceptResult::WouldBlock),
			RawAccept::Interrupted => return Ok(AcceptResult::Interrupted),
		};
		shared.config.tcp.apply(&socket)?;
		let fd = socket.as_raw_fd();

		let tcp = Self::adopt(&shared, TcpState::accepted(socket))?;
		tracing::debug!(target: "evlane::tcp", fd, "connection accepted");
		Ok(AcceptResult::Connection(tcp))
	}

	/// Local address of the socket.
	pub fn local_addr(&self) -> Result<SockAddr> {
		self.with_state(|_, _, state| state.socket()?.local_addr())
	}

	/// Address of the connected peer.
	pub fn peer_addr(&self) -> Result<SockAddr> {
		self.with_state(|_, _, state| state.socket()?.peer_addr())
	}

	/// Closes the endpoint. Idempotent.
	///
	/// An outstanding connect completes with [`Error::Canceled`] before this
	/// returns. Other clones of the handle see the endpoint as closed.
	pub fn close(&self) {
		let Ok((shared, key)) = self.parts() else {
			return;
		};
		let Some(mut slot) = shared.take_slot(key) else {
			return;
		};
		let pending = match &mut slot {
			Slot::Tcp(state) => state.take_pending(),
		};
		drop(slot);
		tracing::debug!(target: "evlane::tcp", ?key, "closed");

		if let Some(callback) = pending {
			callback(Err(Error::Canceled));
		}
	}
}

impl std::fmt::Debug for Tcp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Tcp")
			.field("initialized", &self.is_initialized())
			.field("closed", &self.is_closed())
			.field("family", &self.family())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::reactor::RunMode;
	use std::cell::RefCell;

	#[test]
	fn endpoint_past_handle_limit_is_uninitialized() {
		let reactor = Reactor::builder().max_handles(0).build().unwrap();
		let tcp = Tcp::new(&reactor);

		assert!(!tcp.is_initialized());
		assert!(!tcp.is_closed());
		assert_eq!(tcp.set_no_delay(true), Err(Error::NotInitialized));
		assert_eq!(tcp.fileno(), Err(Error::NotInitialized));
		assert!(tcp.accept().is_none());
		tcp.close();
	}

	#[test]
	fn dropping_last_handle_frees_the_slot() {
		let reactor = Reactor::new().unwrap();
		let tcp = Tcp::new(&reactor);
		let clone = tcp.clone();
		assert_eq!(reactor.handle_count(), 1);

		drop(tcp);
		assert_eq!(reactor.handle_count(), 1);
		drop(clone);
		assert_eq!(reactor.handle_count(), 0);
	}

	#[test]
	fn options_before_socket_are_applied_on_creation() {
		let reactor = Reactor::new().unwrap();
		let tcp = Tcp::new(&reactor);
		tcp.set_no_delay(true).unwrap();
		tcp.set_keep_alive(true, Duration::from_secs(30)).unwrap();
		assert!(tcp.fileno().is_err());

		tcp.bind(AddressFamily::Ipv4, "127.0.0.1", 0).unwrap();
		let fd = tcp.fileno().unwrap();
		let sock = unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) };
		assert!(crate::socket::tcp_nodelay(&sock).unwrap());
		assert!(crate::socket::keepalive(&sock).unwrap());
		assert_eq!(crate::socket::keepalive_idle(&sock).unwrap(), 30);
	}

	#[test]
	fn zero_idle_keep_alive_is_rejected_before_and_after_creation() {
		let reactor = Reactor::new().unwrap();
		let tcp = Tcp::new(&reactor);
		assert!(matches!(
			tcp.set_keep_alive(true, Duration::ZERO),
			Err(Error::InvalidArgument { .. })
		));
		tcp.set_keep_alive(false, Duration::ZERO).unwrap();

		let tcp = Tcp::with_family(&reactor, AddressFamily::Ipv6);
		assert!(matches!(
			tcp.set_keep_alive(true, Duration::from_millis(500)),
			Err(Error::InvalidArgument { .. })
		));
	}

	#[test]
	fn released_endpoint_outlives_its_handle_until_connect_completes() {
		let reactor = Reactor::new().unwrap();
		let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
		let port = listener.local_addr().unwrap().port();

		let outcome = Rc::new(RefCell::new(None));
		let tcp = Tcp::new(&reactor);
		let sink = outcome.clone();
		tcp.connect(AddressFamily::Ipv4, "127.0.0.1", port, move |result| {
			*sink.borrow_mut() = Some(result);
		});
		drop(tcp);
		assert_eq!(reactor.handle_count(), 1);

		reactor.run(RunMode::Default).unwrap();
		assert_eq!(*outcome.borrow(), Some(Ok(())));
		assert_eq!(reactor.handle_count(), 0);
	}

	#[test]
	fn listen_without_bind_uses_ephemeral_ipv4_port() {
		let reactor = Reactor::new().unwrap();
		let tcp = Tcp::new(&reactor);
		tcp.listen(8, |_, _| {}).unwrap();

		assert!(tcp.is_active());
		assert_eq!(tcp.family(), Some(AddressFamily::Ipv4));
		assert_ne!(tcp.local_addr().unwrap().port(), 0);
	}

	#[test]
	fn failed_poller_registration_reports_connect_synchronously() {
		let reactor = Reactor::new().unwrap();
		let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
		let port = listener.local_addr().unwrap().port();

		// Point the epoll descriptor at /dev/null so epoll_ctl fails.
		let devnull = std::fs::File::open("/dev/null").unwrap();
		let epoll = reactor.shared().poller().as_raw_fd();
		assert!(unsafe { libc::dup2(devnull.as_raw_fd(), epoll) } >= 0);

		let outcome = Rc::new(RefCell::new(Vec::new()));
		let tcp = Tcp::new(&reactor);
		let sink = outcome.clone();
		tcp.connect(AddressFamily::Ipv4, "127.0.0.1", port, move |result| {
			sink.borrow_mut().push(result);
		});

		assert_eq!(*outcome.borrow(), vec![Err(Error::Poll { errno: libc::EINVAL })]);
		assert!(!tcp.is_active());
		assert!(!reactor.alive());
	}

	#[test]
	fn connect_on_listener_fails_synchronously() {
		let reactor = Reactor::new().unwrap();
		let tcp = Tcp::new(&reactor);
		tcp.listen(8, |_, _| {}).unwrap();

		let outcome = Rc::new(RefCell::new(None));
		let sink = outcome.clone();
		tcp.connect(AddressFamily::Ipv4, "127.0.0.1", 1, move |result| {
			*sink.borrow_mut() = Some(result);
		});
		assert!(matches!(*outcome.borrow(), Some(Err(Error::InvalidArgument { .. }))));
	}
}
