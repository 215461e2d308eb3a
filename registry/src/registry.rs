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


//! Concurrent client registry
//!
//! The ClientRegistry is responsible for:
//! - Creating a record on the first valid message from a source
//! - Applying messages and detecting transitions atomically per source
//! - Snapshot queries over all tracked clients
//! - The liveness sweep used by the reaper

use crate::{
    ClientInfo, ClientRecord, RegistryConfig, RegistryError, RegistryResult, RegistryStatistics,
    StateTransition,
};
use dashmap::DashMap;
use heartwire_codec::{Message, SourceId, StatusCode};
use metrics::counter;
use tokio::time::Instant;
use tracing::{debug, info};

/// Result of applying one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Source the message was applied to
    pub source: SourceId,
    /// Status after applying
    pub status: StatusCode,
    /// Whether this message created the record
    pub created: bool,
    /// The transition caused by this message, if any
    pub transition: Option<StateTransition>,
    /// Valid messages applied to the record, including this one
    pub message_count: u64,
}

/// Registry of client records keyed by source identifier
///
/// Constructed explicitly and shared by handle (`Arc<ClientRegistry>`); there is no global
/// instance.
pub struct ClientRegistry {
    records: DashMap<SourceId, ClientRecord>,
    config: RegistryConfig,
}

impl ClientRegistry {
    /// Create an empty registry
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            records: DashMap::new(),
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Apply a message to the record for its source.
    ///
    /// Creation and update happen under the entry lock for the source, so concurrent callers
    /// for the same source are serialized and exactly one of them observes `created`.
    /// Invalid messages are rejected without touching the registry.
    pub fn apply(&self, message: &Message) -> RegistryResult<ApplyOutcome> {
        self.apply_with(message, |_| {})
    }

    /// Apply a message and run `on_applied` while the entry lock for the source is still held.
    ///
    /// Calls for one source run `on_applied` in the same order as their transitions enter the
    /// history. `on_applied` must not touch this registry.
    pub fn apply_with<F>(&self, message: &Message, on_applied: F) -> RegistryResult<ApplyOutcome>
    where
        F: FnOnce(&ApplyOutcome),
    {
        let heartbeat = message
            .heartbeat()
            .ok_or_else(|| RegistryError::InvalidMessage {
                raw: message.raw().to_string(),
                reason: message
                    .error()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
            })?;
        let source = heartbeat.source();

        let mut created = false;
        let mut record = self.records.entry(source).or_insert_with(|| {
            created = true;
            ClientRecord::new(source, message.received_at(), &self.config)
        });
        let transition = record.observe(heartbeat, message);
        let outcome = ApplyOutcome {
            source,
            status: record.status(),
            created,
            transition,
            message_count: record.message_count(),
        };
        on_applied(&outcome);
        drop(record);

        if created {
            counter!("heartwire.registry.clients_created").increment(1);
            debug!(source = %source, status = %outcome.status, "Tracking new client");
        }
        if let Some(t) = transition {
            counter!("heartwire.registry.transitions").increment(1);
            info!(
                source = %source,
                from = %t.from,
                to = %t.to,
                sequence = t.sequence,
                "Client status changed"
            );
        }

        Ok(outcome)
    }

    /// Snapshot one client
    pub fn get(&self, source: SourceId) -> Option<ClientInfo> {
        self.records.get(&source).map(|entry| entry.info())
    }

    /// Snapshot every client, ordered by source
    pub fn get_all(&self) -> Vec<ClientInfo> {
        self.collect(|_| true)
    }

    /// Snapshot clients that reported within the inactivity threshold
    pub fn get_active(&self, now: Instant) -> Vec<ClientInfo> {
        let threshold = self.config.inactivity_threshold;
        self.collect(|record| record.is_active(now, threshold))
    }

    /// Snapshot clients that have not reported within the inactivity threshold
    pub fn get_inactive(&self, now: Instant) -> Vec<ClientInfo> {
        let threshold = self.config.inactivity_threshold;
        self.collect(|record| !record.is_active(now, threshold))
    }

    /// Snapshot clients currently in `status`
    pub fn get_by_status(&self, status: StatusCode) -> Vec<ClientInfo> {
        self.collect(|record| record.status() == status)
    }

    fn collect<F>(&self, filter: F) -> Vec<ClientInfo>
    where
        F: Fn(&ClientRecord) -> bool,
    {
        let mut infos: Vec<ClientInfo> = self
            .records
            .iter()
            .filter(|entry| filter(entry.value()))
            .map(|entry| entry.info())
            .collect();
        infos.sort_by_key(|info| info.source);
        infos
    }

    /// Retained transitions for a client, oldest first
    pub fn history(&self, source: SourceId) -> Option<Vec<StateTransition>> {
        self.records
            .get(&source)
            .map(|entry| entry.history().to_vec())
    }

    /// Retained raw messages for a client, oldest first
    pub fn recent_messages(&self, source: SourceId) -> Option<Vec<Message>> {
        self.records
            .get(&source)
            .map(|entry| entry.recent_messages().to_vec())
    }

    /// Whether a record exists for `source`
    pub fn contains(&self, source: SourceId) -> bool {
        self.records.contains_key(&source)
    }

    /// Number of tracked clients
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no clients are tracked
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Delete one record and its history
    pub fn remove(&self, source: SourceId) -> Option<ClientInfo> {
        let removed = self.records.remove(&source).map(|(_, record)| record.info());
        if removed.is_some() {
            info!(source = %source, "Client removed from registry");
        }
        removed
    }

    /// Delete every record. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let count = self.records.len();
        self.records.clear();
        info!(count, "Registry cleared");
        count
    }

    /// Clear the connected hint for one client.
    ///
    /// Returns `true` only if the hint was set, so callers can notify exactly once.
    pub fn mark_disconnected(&self, source: SourceId) -> bool {
        self.records
            .get_mut(&source)
            .is_some_and(|mut entry| entry.mark_disconnected())
    }

    /// Clear the connected hint on every client idle for at least the inactivity threshold.
    ///
    /// Returns the sources flipped by this call; a repeated sweep with no new traffic returns
    /// nothing. Records and history are never removed.
    pub fn sweep(&self, now: Instant) -> Vec<SourceId> {
        let threshold = self.config.inactivity_threshold;
        let mut flipped: Vec<SourceId> = self
            .records
            .iter_mut()
            .filter_map(|mut entry| {
                let timed_out = entry.is_connected() && !entry.is_active(now, threshold);
                (timed_out && entry.mark_disconnected()).then(|| *entry.key())
            })
            .collect();
        flipped.sort();

        counter!("heartwire.registry.sweeps").increment(1);
        if !flipped.is_empty() {
            counter!("heartwire.registry.timeouts").increment(flipped.len() as u64);
            debug!(count = flipped.len(), "Sweep marked clients disconnected");
        }

        flipped
    }

    /// Compute aggregate statistics at `now` without mutating any record
    pub fn statistics(&self, now: Instant) -> RegistryStatistics {
        let mut stats = RegistryStatistics::default();
        let threshold = self.config.inactivity_threshold;
        let window = self.config.rate_window;
        let mut recent = 0usize;

        for entry in self.records.iter() {
            let record = entry.value();
            stats.record_client(&record.info(), record.is_active(now, threshold));
            recent += record.messages_within(now, window);
        }

        if !window.is_zero() {
            stats.messages_per_second = recent as f64 / window.as_secs_f64();
        }
        stats
    }
}

impl std::fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("clients", &self.len())
            .field("config", &self.config)
            .finish()
    }
}
