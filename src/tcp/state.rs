use std::os::fd::AsRawFd;
use std::rc::Weak;
use std::time::Duration;

use super::{HandleRef, Tcp};
use crate::addr::{AddressFamily, SockAddr};
use crate::error::{Error, Result};
use crate::reactor::{Config, Event, HandleKey, Interest, Shared, Slot};
use crate::socket::{ConnectStart, RawAccept, RawSocket, apply_keepalive, set_tcp_nodelay, take_error};

/// Completion callback of a connect. Invoked exactly once.
pub type ConnectCallback = Box<dyn FnOnce(Result<()>)>;

/// Invoked each time a listener has connections waiting to be accepted.
pub(crate) type ConnectionCallback = Box<dyn FnMut(&Tcp, Result<()>)>;

/// The one outstanding connect of an endpoint.
pub(crate) struct ConnectRequest {
	id: u64,
	target: SockAddr,
	callback: ConnectCallback,
}

/// Options set before the socket exists, applied when it is created.
#[derive(Debug, Default)]
struct DeferredOptions {
	nodelay: Option<bool>,
	keepalive: Option<(bool, Duration)>,
}

impl DeferredOptions {
	fn apply(&self, socket: &RawSocket) -> Result<()> {
		if let Some(enable) = self.nodelay {
			set_tcp_nodelay(socket, enable)?;
		}
		if let Some((enable, idle)) = self.keepalive {
			apply_keepalive(socket, enable, idle)?;
		}
		Ok(())
	}
}

/// Arena-side state of a TCP endpoint.
pub(crate) struct TcpState {
	socket: Option<RawSocket>,
	options: DeferredOptions,
	connect: Option<ConnectRequest>,
	listening: bool,
	on_connection: Option<ConnectionCallback>,
	/// Interest currently registered with the poller, if any.
	registered: Option<Interest>,
	/// No caller handle is left; close once idle.
	pub(crate) released: bool,
	pub(crate) this: Weak<HandleRef>,
	next_request: u64,
}

impl TcpState {
	pub(crate) fn new() -> Self {
		Self {
			socket: None,
			options: DeferredOptions::default(),
			connect: None,
			listening: false,
			on_connection: None,
			registered: None,
			released: false,
			this: Weak::new(),
			next_request: 0,
		}
	}

	pub(crate) fn accepted(socket: RawSocket) -> Self {
		Self {
			socket: Some(socket),
			..Self::new()
		}
	}

	pub(crate) fn is_active(&self) -> bool {
		self.connect.is_some() || self.listening
	}

	pub(crate) fn has_pending_connect(&self) -> bool {
		self.connect.is_some()
	}

	pub(crate) fn family(&self) -> Option<AddressFamily> {
		self.socket.as_ref().map(RawSocket::family)
	}

	pub(crate) fn socket(&self) -> Result<&RawSocket> {
		self.socket.as_ref().ok_or(Error::InvalidArgument { reason: "socket not created yet" })
	}

	/// Materializes the OS socket in `family` unless one already exists.
	pub(crate) fn ensure_socket(&mut self, config: &Config, family: AddressFamily) -> Result<()> {
		match &self.socket {
			Some(socket) if socket.family() != family => Err(Error::FamilyMismatch {
				socket: socket.family(),
				target: family,
			}),
			Some(_) => Ok(()),
			None => {
				let socket = RawSocket::new(family)?;
				config.tcp.apply(&socket)?;
				self.options.apply(&socket)?;
				tracing::debug!(target: "evlane::tcp", fd = socket.as_raw_fd(), %family, "socket created");
				self.socket = Some(socket);
				Ok(())
			}
		}
	}

	pub(crate) fn set_no_delay(&mut self, enable: bool) -> Result<()> {
		match &self.socket {
			Some(socket) => set_tcp_nodelay(socket, enable),
			None => {
				self.options.nodelay = Some(enable);
				Ok(())
			}
		}
	}

	pub(crate) fn set_keep_alive(&mut self, enable: bool, idle: Duration) -> Result<()> {
		match &self.socket {
			Some(socket) => apply_keepalive(socket, enable, idle),
			None if enable && idle.as_secs() == 0 => Err(Error::InvalidArgument {
				reason: "keep-alive idle time must be at least one second",
			}),
			None => {
				self.options.keepalive = Some((enable, idle));
				Ok(())
			}
		}
	}

	pub(crate) fn bind(&mut self, config: &Config, addr: &SockAddr) -> Result<()> {
		self.ensure_socket(config, addr.family())?;
		let socket = self.socket()?;
		config.reuse.apply(socket)?;
		socket.bind(addr)
	}

	/// Starts listening; returns the callback this call replaced.
	pub(crate) fn listen(
		&mut self,
		shared: &Shared,
		key: HandleKey,
		backlog: i32,
		callback: ConnectionCallback,
	) -> Result<Option<ConnectionCallback>> {
		if self.connect.is_some() {
			return Err(Error::InProgress);
		}
		if self.socket.is_none() {
			self.ensure_socket(&shared.config, AddressFamily::Ipv4)?;
		}
		self.socket()?.listen(backlog)?;
		self.listening = true;
		let previous = self.on_connection.replace(callback);
		self.sync_interest(shared, key)?;
		tracing::debug!(target: "evlane::tcp", ?key, backlog, "listening");
		Ok(previous)
	}

	/// Accepts one pending connection from this listener's descriptor.
	pub(crate) fn accept_raw(&self) -> Result<RawAccept> {
		if !self.listening {
			return Err(Error::NotListening);
		}
		self.socket()?.accept()
	}

	/// Starts a non-blocking connect.
	///
	/// `callback` is taken only when the connect is in flight; on error it is
	/// left with the caller to report the failure synchronously.
	pub(crate) fn begin_connect(
		&mut self,
		shared: &Shared,
		key: HandleKey,
		target: SockAddr,
		callback: &mut Option<ConnectCallback>,
	) -> Result<()> {
		if self.connect.is_some() {
			return Err(Error::InProgress);
		}
		if self.listening {
			return Err(Error::InvalidArgument { reason: "endpoint is listening" });
		}
		self.ensure_socket(&shared.config, target.family())?;
		let start = self.socket()?.connect(&target)?;

		let Some(taken) = callback.take() else {
			return Err(Error::InvalidArgument { reason: "missing connect callback" });
		};
		self.next_request += 1;
		self.connect = Some(ConnectRequest {
			id: self.next_request,
			target,
			callback: taken,
		});

		if let Err(err) = self.sync_interest(shared, key) {
			// Without a registration the completion would never arrive.
			*callback = self.connect.take().map(|request| request.callback);
			return Err(err);
		}

		tracing::debug!(
			target: "evlane::tcp",
			?key,
			request = self.next_request,
			%target,
			immediate = (start == ConnectStart::Connected),
			"connect started"
		);
		Ok(())
	}

	/// Brings the poller registration in line with what the endpoint waits for.
	fn sync_interest(&mut self, shared: &Shared, key: HandleKey) -> Result<()> {
		let wanted = Interest {
			read: self.listening,
			write: self.connect.is_some(),
		};
		let Some(socket) = &self.socket else {
			return Ok(());
		};
		let fd = socket.as_raw_fd();
		let poller = shared.poller();
		let token = Shared::token(key);

		match (self.registered, wanted.is_empty()) {
			(None, true) => {}
			(None, false) => {
				poller.register(fd, token, wanted).map_err(Error::poll)?;
				self.registered = Some(wanted);
			}
			(Some(_), true) => {
				poller.deregister(fd).map_err(Error::poll)?;
				self.registered = None;
			}
			(Some(current), false) if current != wanted => {
				poller.reregister(fd, token, wanted).map_err(Error::poll)?;
				self.registered = Some(wanted);
			}
			(Some(_), false) => {}
		}
		Ok(())
	}

	pub(crate) fn deregister(&mut self, shared: &Shared) {
		if self.registered.take().is_none() {
			return;
		}
		if let Some(socket) = &self.socket {
			if let Err(err) = shared.poller().deregister(socket.as_raw_fd()) {
				tracing::warn!(target: "evlane::tcp", %err, "failed to deregister socket");
			}
		}
	}

	/// Takes whatever the reactor should complete after `close()`.
	pub(crate) fn take_pending(&mut self) -> Option<ConnectCallback> {
		self.listening = false;
		self.connect.take().map(|request| request.callback)
	}

	/// Completion trampoline: runs inside the arena borrow and collects the
	/// callbacks to invoke once the borrow is released.
	pub(crate) fn on_ready(&mut self, shared: &Shared, key: HandleKey, event: &Event) -> Ready {
		let mut ready = Ready {
			connect: None,
			connection: None,
			this: self.this.clone(),
			remove: false,
		};

		if (event.writable || event.error) && self.connect.is_some() {
			if let Some(request) = self.connect.take() {
				let result = self.finish_connect(&request.target);
				match &result {
					Ok(()) => tracing::debug!(target: "evlane::tcp", ?key, request = request.id, "connected"),
					Err(err) => tracing::debug!(target: "evlane::tcp", ?key, request = request.id, %err, "connect failed"),
				}
				ready.connect = Some((request.callback, result));
			}
		}

		if (event.readable || event.error) && self.listening {
			let status = if event.error { self.pending_error() } else { Ok(()) };
			ready.connection = self.on_connection.take().map(|callback| (callback, status));
		}

		if let Err(err) = self.sync_interest(shared, key) {
			tracing::warn!(target: "evlane::tcp", ?key, %err, "failed to update poller interest");
		}
		ready.remove = self.released && !self.is_active();
		ready
	}

	fn pending_error(&self) -> Result<()> {
		match take_error(self.socket()?)? {
			0 => Ok(()),
			errno => Err(Error::Accept { errno }),
		}
	}

	fn finish_connect(&self, target: &SockAddr) -> Result<()> {
		match take_error(self.socket()?)? {
			0 => Ok(()),
			errno => Err(Error::Connect {
				errno,
				addr: target.to_string(),
			}),
		}
	}
}

/// Callbacks collected by [`TcpState::on_ready`].
#[must_use]
pub(crate) struct Ready {
	connect: Option<(ConnectCallback, Result<()>)>,
	connection: Option<(ConnectionCallback, Result<()>)>,
	this: Weak<HandleRef>,
	remove: bool,
}

impl Ready {
	pub(crate) fn deliver(self, shared: &Shared, key: HandleKey) {
		if self.remove {
			drop(shared.take_slot(key));
		}

		if let Some((callback, result)) = self.connect {
			callback(result);
		}

		let Some((mut callback, status)) = self.connection else {
			return;
		};
		let Some(inner) = self.this.upgrade() else {
			return;
		};
		let listener = Tcp { inner };
		callback(&listener, status);

		// Put the callback back unless the listener was closed or given a new
		// one from inside the callback.
		let leftover = match shared.handles.borrow_mut().get_mut(key) {
			Some(Slot::Tcp(state)) if state.listening && state.on_connection.is_none() => {
				state.on_connection = Some(callback);
				None
			}
			_ => Some(callback),
		};
		drop(leftover);
	}
}
