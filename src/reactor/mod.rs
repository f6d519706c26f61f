//! Single-threaded reactor.
//!
//! The reactor owns every live handle in an arena keyed by generational
//! indices. Handles given to callers only hold a weak reference to the
//! reactor plus their key, so dropping the reactor invalidates all of them at
//! once and a stale key can never reach a recycled slot.
//!
//! Readiness comes from a level-triggered `epoll` instance. Each registered
//! descriptor carries its handle key as the poll token; a ready token is
//! resolved back to the handle, which decides which stored callback to run.
//! Callbacks always run with no internal borrow held, so they may call back
//! into the reactor or any endpoint.

mod builder;
mod poller;

use std::cell::{Cell, RefCell};
use std::io;
use std::rc::Rc;
use std::time::Duration;

use slotmap::{Key, KeyData, SlotMap, new_key_type};

pub use self::builder::ReactorBuilder;
pub(crate) use self::poller::{Event, Interest};

use self::poller::EpollPoller;
use crate::error::{Error, Result};
use crate::socket::{ReuseConfig, TcpConfig};
use crate::tcp::TcpState;

new_key_type! {
    /// Stable index of a live handle in the reactor's arena.
    pub(crate) struct HandleKey;
}

/// Every kind of handle a reactor can own.
///
/// Construction picks the variant, so a slot produced for a TCP endpoint is
/// a TCP slot by type.
pub(crate) enum Slot {
    Tcp(TcpState),
}

impl Slot {
    fn is_active(&self) -> bool {
        match self {
            Slot::Tcp(state) => state.is_active(),
        }
    }
}

/// How long [`Reactor::run`] keeps looping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Loop until no handle has outstanding work or `stop()` is called.
    Default,
    /// Block for one batch of events, dispatch it, return.
    Once,
    /// Dispatch whatever is ready right now without blocking.
    NoWait,
}

pub(crate) struct Config {
    pub(crate) events_capacity: usize,
    pub(crate) max_handles: Option<usize>,
    pub(crate) tcp: TcpConfig,
    pub(crate) reuse: ReuseConfig,
}

pub(crate) struct Shared {
    poller: RefCell<EpollPoller>,
    pub(crate) handles: RefCell<SlotMap<HandleKey, Slot>>,
    /// Keys released while the arena was borrowed.
    released: RefCell<Vec<HandleKey>>,
    pub(crate) config: Config,
    stopped: Cell<bool>,
    /// Set while the reactor is being dropped; no new slots are handed out.
    closing: Cell<bool>,
}

/// The event loop that owns every endpoint created from it.
///
/// Not `Send`: the reactor and its endpoints live on one thread.
pub struct Reactor {
    shared: Rc<Shared>,
}

impl Reactor {
    /// Creates a reactor with default configuration.
    pub fn new() -> io::Result<Self> {
        ReactorBuilder::new().build()
    }

    /// Returns a builder for configuring a reactor.
    pub fn builder() -> ReactorBuilder {
        ReactorBuilder::new()
    }

    pub(crate) fn with_config(config: Config) -> io::Result<Self> {
        let poller = EpollPoller::new(config.events_capacity)?;
        Ok(Self {
            shared: Rc::new(Shared {
                poller: RefCell::new(poller),
                handles: RefCell::new(SlotMap::with_key()),
                released: RefCell::new(Vec::new()),
                config,
                stopped: Cell::new(false),
                closing: Cell::new(false),
            }),
        })
    }

    pub(crate) fn shared(&self) -> &Rc<Shared> {
        &self.shared
    }

    /// Runs the event loop.
    ///
    /// Returns immediately when no handle has outstanding work. Otherwise
    /// dispatches events according to `mode`. Returns whether any handle
    /// still has outstanding work afterwards.
    pub fn run(&self, mode: RunMode) -> io::Result<bool> {
        let timeout = match mode {
            RunMode::NoWait => Some(Duration::ZERO),
            RunMode::Default | RunMode::Once => None,
        };
        self.shared.stopped.set(false);

        loop {
            self.shared.drain_released();
            if !self.shared.is_alive() {
                break;
            }
            self.shared.poll_once(timeout)?;
            if mode != RunMode::Default || self.shared.stopped.get() {
                break;
            }
        }

        self.shared.drain_released();
        Ok(self.shared.is_alive())
    }

    /// Runs one iteration, blocking at most `timeout` for events.
    pub fn run_for(&self, timeout: Duration) -> io::Result<bool> {
        self.shared.drain_released();
        if self.shared.is_alive() {
            self.shared.poll_once(Some(timeout))?;
            self.shared.drain_released();
        }
        Ok(self.shared.is_alive())
    }

    /// Makes a `RunMode::Default` loop return after the current iteration.
    pub fn stop(&self) {
        self.shared.stopped.set(true);
    }

    /// Whether any handle has a connect outstanding or is listening.
    pub fn alive(&self) -> bool {
        self.shared.is_alive()
    }

    /// Number of endpoints currently owned by the reactor.
    pub fn handle_count(&self) -> usize {
        self.shared.handles.borrow().len()
    }
}

impl Drop for Reactor {
    /// Closes every endpoint. Outstanding connects complete with
    /// [`Error::ReactorGone`] once the arena is empty.
    fn drop(&mut self) {
        self.shared.closing.set(true);
        let keys: Vec<HandleKey> = self.shared.handles.borrow().keys().collect();

        let mut pending = Vec::new();
        for key in keys {
            let Some(mut slot) = self.shared.take_slot(key) else {
                continue;
            };
            match &mut slot {
                Slot::Tcp(state) => pending.extend(state.take_pending()),
            }
            drop(slot);
        }
        self.shared.released.borrow_mut().clear();

        if !pending.is_empty() {
            tracing::debug!(target: "evlane::reactor", canceled = pending.len(), "reactor dropped with connects outstanding");
        }
        for callback in pending {
            callback(Err(Error::ReactorGone));
        }
    }
}

impl std::fmt::Debug for Reactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reactor")
            .field("handles", &self.handle_count())
            .field("alive", &self.alive())
            .finish()
    }
}

impl Shared {
    pub(crate) fn token(key: HandleKey) -> u64 {
        key.data().as_ffi()
    }

    fn key_of(token: u64) -> HandleKey {
        KeyData::from_ffi(token).into()
    }

    /// Fails when the configured handle limit is reached.
    pub(crate) fn reserve(&self) -> Result<()> {
        if self.closing.get() {
            return Err(Error::ReactorGone);
        }
        if let Some(max) = self.config.max_handles {
            if self.handles.borrow().len() >= max {
                return Err(Error::Create { errno: libc::EMFILE });
            }
        }
        Ok(())
    }

    pub(crate) fn insert(&self, slot: Slot) -> Result<HandleKey> {
        self.reserve()?;
        Ok(self.handles.borrow_mut().insert(slot))
    }

    pub(crate) fn poller(&self) -> std::cell::Ref<'_, EpollPoller> {
        self.poller.borrow()
    }

    /// Removes a slot from the arena and the poller.
    ///
    /// The slot is returned so the caller drops it, along with any callbacks
    /// it still holds, outside the arena borrow.
    pub(crate) fn take_slot(&self, key: HandleKey) -> Option<Slot> {
        let mut slot = self.handles.borrow_mut().remove(key)?;
        match &mut slot {
            Slot::Tcp(state) => state.deregister(self),
        }
        Some(slot)
    }

    /// The last caller handle for `key` went away.
    ///
    /// A slot with a connect outstanding stays alive until that connect
    /// completes; anything else is closed now.
    pub(crate) fn release(&self, key: HandleKey) {
        let Ok(mut handles) = self.handles.try_borrow_mut() else {
            self.released.borrow_mut().push(key);
            return;
        };
        let remove = match handles.get_mut(key) {
            Some(Slot::Tcp(state)) => {
                state.released = true;
                !state.has_pending_connect()
            }
            None => false,
        };
        drop(handles);

        if remove {
            tracing::debug!(target: "evlane::reactor", ?key, "handle released");
            drop(self.take_slot(key));
        }
    }

    fn drain_released(&self) {
        let keys = std::mem::take(&mut *self.released.borrow_mut());
        for key in keys {
            self.release(key);
        }
    }

    fn is_alive(&self) -> bool {
        self.handles.borrow().values().any(Slot::is_active)
    }

    fn poll_once(&self, timeout: Option<Duration>) -> io::Result<()> {
        let mut events = Vec::with_capacity(self.config.events_capacity);
        self.poller.borrow_mut().poll(&mut events, timeout)?;
        tracing::trace!(target: "evlane::reactor", events = events.len(), "poll returned");

        for event in events {
            self.dispatch(event);
        }
        Ok(())
    }

    fn dispatch(&self, event: Event) {
        let key = Self::key_of(event.token);
        let ready = match self.handles.borrow_mut().get_mut(key) {
            Some(Slot::Tcp(state)) => state.on_ready(self, key, &event),
            // Closed between the wait and this dispatch.
            None => return,
        };
        ready.deliver(self, key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_reactor_run_returns_immediately() {
        let reactor = Reactor::new().unwrap();
        assert!(!reactor.run(RunMode::Default).unwrap());
        assert!(!reactor.run(RunMode::Once).unwrap());
        assert!(!reactor.run_for(Duration::from_secs(60)).unwrap());
    }

    #[test]
    fn tokens_round_trip_through_keys() {
        let mut arena: SlotMap<HandleKey, ()> = SlotMap::with_key();
        let key = arena.insert(());
        assert_eq!(Shared::key_of(Shared::token(key)), key);
    }

    #[test]
    fn reserve_honors_handle_limit() {
        let reactor = Reactor::builder().max_handles(1).build().unwrap();
        let shared = reactor.shared();
        assert!(shared.reserve().is_ok());
        shared.insert(Slot::Tcp(TcpState::new())).unwrap();
        assert_eq!(shared.reserve(), Err(Error::Create { errno: libc::EMFILE }));
    }

    #[test]
    fn stale_token_is_ignored() {
        let reactor = Reactor::new().unwrap();
        let shared = reactor.shared();
        let key = shared.insert(Slot::Tcp(TcpState::new())).unwrap();
        drop(shared.take_slot(key));
        shared.dispatch(Event { token: Shared::token(key), readable: true, writable: true, error: false });
        assert_eq!(reactor.handle_count(), 0);
    }
}
