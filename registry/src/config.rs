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


//! Registry configuration

use std::time::Duration;

/// Registry configuration
///
/// ```
/// use heartwire_registry::RegistryConfig;
/// use std::time::Duration;
///
/// let config = RegistryConfig::default()
///     .with_history_capacity(50)
///     .with_inactivity_threshold(Duration::from_secs(10));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Transitions kept per client before the oldest are evicted
    pub history_capacity: usize,

    /// Raw messages kept per client before the oldest are evicted
    pub recent_capacity: usize,

    /// A client with no message for this long is inactive
    pub inactivity_threshold: Duration,

    /// Window used to compute message throughput
    pub rate_window: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            history_capacity: 1000,
            recent_capacity: 100,
            inactivity_threshold: Duration::from_secs(30),
            rate_window: Duration::from_secs(10),
        }
    }
}

impl RegistryConfig {
    /// Set the per-client history capacity
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Set the per-client recent message capacity
    pub fn with_recent_capacity(mut self, capacity: usize) -> Self {
        self.recent_capacity = capacity;
        self
    }

    /// Set the inactivity threshold
    pub fn with_inactivity_threshold(mut self, threshold: Duration) -> Self {
        self.inactivity_threshold = threshold;
        self
    }

    /// Set the throughput window
    pub fn with_rate_window(mut self, window: Duration) -> Self {
        self.rate_window = window;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.history_capacity == 0 {
            return Err("history_capacity must be greater than 0".to_string());
        }

        if self.recent_capacity == 0 {
            return Err("recent_capacity must be greater than 0".to_string());
        }

        if self.inactivity_threshold.is_zero() {
            return Err("inactivity_threshold must be greater than 0".to_string());
        }

        if self.rate_window.is_zero() {
            return Err("rate_window must be greater than 0".to_string());
        }

        Ok(())
    }
}
