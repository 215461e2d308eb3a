//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//


//! Server configuration

use crate::{MonitorError, Result};
use heartwire_codec::DEFAULT_MAX_FRAME_LENGTH;
use heartwire_registry::RegistryConfig;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Server configuration
///
/// This structure contains all configuration options for the heartbeat server.
/// Use the builder pattern methods to customize the configuration. No file format is
/// owned here; callers load values however they like and pass them in.
///
/// # Example
///
/// ```
/// use heartwire_server::MonitorConfig;
/// use std::time::Duration;
///
/// let config = MonitorConfig::default()
///     .with_port(7500)
///     .with_max_connections(250)
///     .with_inactivity_threshold(Duration::from_secs(15));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Address to bind the listener to
    pub bind_address: SocketAddr,

    /// Maximum number of concurrently handled connections
    ///
    /// Further connections wait in the OS accept queue until a slot frees up.
    pub max_connections: usize,

    /// Timeout for a single frame read
    ///
    /// A connection that delivers no complete frame within this duration is closed.
    pub read_timeout: Duration,

    /// Timeout for graceful shutdown
    ///
    /// Workers still running after this long are aborted.
    pub shutdown_timeout: Duration,

    /// How often the reaper sweeps for silent clients
    pub reap_interval: Duration,

    /// Largest accepted frame payload in bytes
    pub max_frame_length: usize,

    /// Client registry settings
    pub registry: RegistryConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from((Ipv4Addr::LOCALHOST, 9000)),
            max_connections: 100,
            read_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(5),
            reap_interval: Duration::from_secs(30),
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            registry: RegistryConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Create a new configuration with the given bind address
    ///
    /// All other settings will use their default values.
    pub fn new(bind_address: SocketAddr) -> Self {
        Self {
            bind_address,
            ..Default::default()
        }
    }

    /// Set the listening port, keeping the bind interface
    ///
    /// Port 0 asks the OS for an ephemeral port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.bind_address.set_port(port);
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the per-frame read timeout
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the shutdown timeout duration
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the reaper interval
    pub fn with_reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval = interval;
        self
    }

    /// Set the maximum frame payload length
    pub fn with_max_frame_length(mut self, length: usize) -> Self {
        self.max_frame_length = length;
        self
    }

    /// Set the inactivity threshold
    pub fn with_inactivity_threshold(mut self, threshold: Duration) -> Self {
        self.registry.inactivity_threshold = threshold;
        self
    }

    /// Set the per-client transition history capacity
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.registry.history_capacity = capacity;
        self
    }

    /// Set the per-client recent message capacity
    pub fn with_recent_capacity(mut self, capacity: usize) -> Self {
        self.registry.recent_capacity = capacity;
        self
    }

    /// Set the throughput window
    pub fn with_rate_window(mut self, window: Duration) -> Self {
        self.registry.rate_window = window;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(MonitorError::InvalidConfig(
                "max_connections must be greater than 0".to_string(),
            ));
        }

        if self.max_connections > Semaphore::MAX_PERMITS {
            return Err(MonitorError::InvalidConfig(format!(
                "max_connections must not exceed {}",
                Semaphore::MAX_PERMITS
            )));
        }

        if self.read_timeout.is_zero() {
            return Err(MonitorError::InvalidConfig(
                "read_timeout must be greater than 0".to_string(),
            ));
        }

        if self.shutdown_timeout.is_zero() {
            return Err(MonitorError::InvalidConfig(
                "shutdown_timeout must be greater than 0".to_string(),
            ));
        }

        if self.reap_interval.is_zero() {
            return Err(MonitorError::InvalidConfig(
                "reap_interval must be greater than 0".to_string(),
            ));
        }

        if self.max_frame_length == 0 {
            return Err(MonitorError::InvalidConfig(
                "max_frame_length must be greater than 0".to_string(),
            ));
        }

        self.registry.validate().map_err(MonitorError::InvalidConfig)
    }
}
