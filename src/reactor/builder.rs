use std::io;

use super::{Config, Reactor};
use crate::socket::{ReuseConfig, TcpConfig};

/// Builder for configuring and creating a reactor.
///
/// # Examples
///
/// ```rust,ignore
/// let reactor = Reactor::builder()
///     .max_handles(1024)
///     .tcp(TcpConfig::new().nodelay(true))
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct ReactorBuilder {
    events_capacity: usize,
    max_handles: Option<usize>,
    tcp: TcpConfig,
    reuse: ReuseConfig,
}

impl ReactorBuilder {
    /// Creates a new `ReactorBuilder` with default configuration.
    pub fn new() -> Self {
        Self {
            events_capacity: 64,
            max_handles: None,
            tcp: TcpConfig::default(),
            reuse: ReuseConfig::default(),
        }
    }

    /// Maximum number of events collected per poll. Values below one are
    /// raised to one.
    pub fn events_capacity(mut self, n: usize) -> Self {
        self.events_capacity = n.max(1);
        self
    }

    /// Caps the number of endpoints the reactor will own at once.
    ///
    /// Endpoints created past the cap come back uninitialized, and `accept`
    /// yields nothing.
    pub fn max_handles(mut self, n: usize) -> Self {
        self.max_handles = Some(n);
        self
    }

    /// TCP options applied to every socket the reactor creates or accepts.
    pub fn tcp(mut self, config: TcpConfig) -> Self {
        self.tcp = config;
        self
    }

    /// Address reuse options applied when an endpoint binds.
    pub fn reuse(mut self, config: ReuseConfig) -> Self {
        self.reuse = config;
        self
    }

    /// Builds the reactor with the configured options.
    pub fn build(self) -> io::Result<Reactor> {
        Reactor::with_config(Config {
            events_capacity: self.events_capacity,
            max_handles: self.max_handles,
            tcp: self.tcp,
            reuse: self.reuse,
        })
    }
}

impl Default for ReactorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
