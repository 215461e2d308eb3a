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


//! Per-client state machine

use crate::{BoundedBuffer, RegistryConfig};
use heartwire_codec::{Heartbeat, Message, SourceId, StatusCode};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// One entry of a client's transition history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    /// Client that changed status
    pub source: SourceId,
    /// Status before the change
    pub from: StatusCode,
    /// Status after the change
    pub to: StatusCode,
    /// When the change was applied
    pub at: Instant,
    /// How long the client spent in `from`
    pub duration_in_previous: Duration,
    /// Position of this transition in the client's lifetime, starting at 1
    pub sequence: u64,
}

/// Tracked state for a single reporting source.
///
/// The record starts in [`StatusCode::Unknown`]. The first valid message assigns the initial
/// status without producing a history entry; every later message whose status differs from
/// the current one is a transition.
#[derive(Debug, Clone)]
pub struct ClientRecord {
    source: SourceId,
    status: StatusCode,
    previous_status: StatusCode,
    first_seen: Instant,
    last_received: Instant,
    last_status_change: Instant,
    transition_count: u64,
    message_count: u64,
    byte_count: u64,
    connected: bool,
    history: BoundedBuffer<StateTransition>,
    recent: BoundedBuffer<Message>,
    rate_window: Duration,
    arrivals: VecDeque<Instant>,
}

impl ClientRecord {
    /// Create an empty record first seen at `first_seen`
    pub fn new(source: SourceId, first_seen: Instant, config: &RegistryConfig) -> Self {
        Self {
            source,
            status: StatusCode::Unknown,
            previous_status: StatusCode::Unknown,
            first_seen,
            last_received: first_seen,
            last_status_change: first_seen,
            transition_count: 0,
            message_count: 0,
            byte_count: 0,
            connected: true,
            history: BoundedBuffer::new(config.history_capacity),
            recent: BoundedBuffer::new(config.recent_capacity),
            rate_window: config.rate_window,
            arrivals: VecDeque::new(),
        }
    }

    /// Record a validated message.
    ///
    /// Timestamps never move backwards: a message stamped earlier than the last one applied
    /// (possible when two connections report for the same source) is applied at
    /// `last_received`, keeping the history time-ordered.
    pub fn observe(&mut self, heartbeat: Heartbeat, message: &Message) -> Option<StateTransition> {
        let at = message.received_at().max(self.last_received);

        self.last_received = at;
        self.message_count += 1;
        self.byte_count += message.wire_len() as u64;
        self.connected = true;
        self.recent.push(message.clone());
        self.record_arrival(at);

        let status = heartbeat.status();
        if status == self.status {
            return None;
        }

        if self.status == StatusCode::Unknown {
            self.status = status;
            self.last_status_change = at;
            return None;
        }

        self.transition_count += 1;
        let transition = StateTransition {
            source: self.source,
            from: self.status,
            to: status,
            at,
            duration_in_previous: at.saturating_duration_since(self.last_status_change),
            sequence: self.transition_count,
        };

        self.previous_status = self.status;
        self.status = status;
        self.last_status_change = at;
        self.history.push(transition);

        Some(transition)
    }

    /// Arrival times are pushed in clamped order, so the front is always the oldest.
    fn record_arrival(&mut self, at: Instant) {
        while let Some(&oldest) = self.arrivals.front() {
            if at.saturating_duration_since(oldest) <= self.rate_window {
                break;
            }
            self.arrivals.pop_front();
        }
        self.arrivals.push_back(at);
    }

    /// Clear the connected hint. Returns `true` if it was set.
    pub fn mark_disconnected(&mut self) -> bool {
        std::mem::replace(&mut self.connected, false)
    }

    /// Whether a message arrived within `threshold` of `now`
    pub fn is_active(&self, now: Instant, threshold: Duration) -> bool {
        now.saturating_duration_since(self.last_received) < threshold
    }

    /// Reporting source
    pub fn source(&self) -> SourceId {
        self.source
    }

    /// Current status
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Status before the last transition
    pub fn previous_status(&self) -> StatusCode {
        self.previous_status
    }

    /// Whether the connected hint is set
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Time of the most recent message
    pub fn last_received(&self) -> Instant {
        self.last_received
    }

    /// Number of transitions since creation, including evicted ones
    pub fn transition_count(&self) -> u64 {
        self.transition_count
    }

    /// Valid messages applied
    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    /// Retained transitions, oldest first
    pub fn history(&self) -> &BoundedBuffer<StateTransition> {
        &self.history
    }

    /// Retained raw messages, oldest first
    pub fn recent_messages(&self) -> &BoundedBuffer<Message> {
        &self.recent
    }

    /// Messages applied within `window` of `now`.
    ///
    /// Counts arrivals independently of the recent-message ring, so the result is not capped
    /// by its capacity. Only arrivals inside the configured rate window are retained.
    pub fn messages_within(&self, now: Instant, window: Duration) -> usize {
        self.arrivals
            .iter()
            .rev()
            .take_while(|&&at| now.saturating_duration_since(at) <= window)
            .count()
    }

    /// Copy the fixed-size part of the record
    pub fn info(&self) -> ClientInfo {
        ClientInfo {
            source: self.source,
            status: self.status,
            previous_status: self.previous_status,
            first_seen: self.first_seen,
            last_received: self.last_received,
            last_status_change: self.last_status_change,
            transition_count: self.transition_count,
            message_count: self.message_count,
            byte_count: self.byte_count,
            connected: self.connected,
            history_len: self.history.len(),
        }
    }
}

/// Client snapshot (for non-blocking queries)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    /// Reporting source
    pub source: SourceId,
    /// Current status
    pub status: StatusCode,
    /// Status before the last transition
    pub previous_status: StatusCode,
    /// When the first message arrived
    pub first_seen: Instant,
    /// When the latest message arrived
    pub last_received: Instant,
    /// When the status last changed
    pub last_status_change: Instant,
    /// Transitions since creation
    pub transition_count: u64,
    /// Valid messages applied
    pub message_count: u64,
    /// Wire bytes of valid messages applied
    pub byte_count: u64,
    /// Optimistic connected hint, cleared by the reaper or on disconnect
    pub connected: bool,
    /// Transitions currently retained
    pub history_len: usize,
}

impl ClientInfo {
    /// Whether a message arrived within `threshold` of `now`
    pub fn is_active(&self, now: Instant, threshold: Duration) -> bool {
        now.saturating_duration_since(self.last_received) < threshold
    }

    /// Time since the latest message
    pub fn idle_duration(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_received)
    }

    /// Time spent in the current status
    pub fn time_in_status(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_status_change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> SourceId {
        SourceId::from([10, 0, 0, 5])
    }

    fn observe(record: &mut ClientRecord, payload: &str, at: Instant) -> Option<StateTransition> {
        let message = Message::parse(payload, at);
        let heartbeat = message.heartbeat().unwrap();
        record.observe(heartbeat, &message)
    }

    #[test]
    fn test_initial_status_is_not_a_transition() {
        let t0 = Instant::now();
        let mut record = ClientRecord::new(source(), t0, &RegistryConfig::default());
        assert_eq!(record.status(), StatusCode::Unknown);

        assert!(observe(&mut record, "10.0.0.5_state2", t0).is_none());
        assert_eq!(record.status(), StatusCode::Primary);
        assert_eq!(record.transition_count(), 0);
        assert!(record.history().is_empty());
    }

    #[test]
    fn test_transition_records_duration() {
        let t0 = Instant::now();
        let mut record = ClientRecord::new(source(), t0, &RegistryConfig::default());
        observe(&mut record, "10.0.0.5_state2", t0);

        let t1 = t0 + Duration::from_secs(7);
        let transition = observe(&mut record, "10.0.0.5_state0", t1).unwrap();
        assert_eq!(transition.from, StatusCode::Primary);
        assert_eq!(transition.to, StatusCode::Error);
        assert_eq!(transition.at, t1);
        assert_eq!(transition.duration_in_previous, Duration::from_secs(7));
        assert_eq!(transition.sequence, 1);
        assert_eq!(record.previous_status(), StatusCode::Primary);
    }

    #[test]
    fn test_same_status_updates_counters_only() {
        let t0 = Instant::now();
        let mut record = ClientRecord::new(source(), t0, &RegistryConfig::default());
        observe(&mut record, "10.0.0.5_state1", t0);

        let t1 = t0 + Duration::from_secs(3);
        assert!(observe(&mut record, "10.0.0.5_state1", t1).is_none());

        let info = record.info();
        assert_eq!(info.message_count, 2);
        assert_eq!(info.byte_count, 34);
        assert_eq!(info.last_received, t1);
        assert_eq!(info.last_status_change, t0);
        assert_eq!(info.history_len, 0);
    }

    #[test]
    fn test_out_of_order_timestamp_is_clamped() {
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_secs(5);
        let mut record = ClientRecord::new(source(), t0, &RegistryConfig::default());
        observe(&mut record, "10.0.0.5_state2", t1);

        let transition = observe(&mut record, "10.0.0.5_state1", t0).unwrap();
        assert_eq!(transition.at, t1);
        assert_eq!(record.last_received(), t1);
    }

    #[test]
    fn test_history_eviction() {
        let t0 = Instant::now();
        let config = RegistryConfig::default().with_history_capacity(2);
        let mut record = ClientRecord::new(source(), t0, &config);

        for (i, payload) in ["10.0.0.5_state0", "10.0.0.5_state1", "10.0.0.5_state2", "10.0.0.5_state0"]
            .iter()
            .enumerate()
        {
            observe(&mut record, payload, t0 + Duration::from_secs(i as u64));
        }

        assert_eq!(record.transition_count(), 3);
        let history = record.history().to_vec();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].sequence, 2);
        assert_eq!(history[1].sequence, 3);
    }

    #[test]
    fn test_activity_window() {
        let t0 = Instant::now();
        let mut record = ClientRecord::new(source(), t0, &RegistryConfig::default());
        observe(&mut record, "10.0.0.5_state2", t0);

        let threshold = Duration::from_secs(30);
        assert!(record.is_active(t0 + Duration::from_secs(29), threshold));
        assert!(!record.is_active(t0 + Duration::from_secs(30), threshold));
    }

    #[test]
    fn test_mark_disconnected_reports_flip() {
        let t0 = Instant::now();
        let mut record = ClientRecord::new(source(), t0, &RegistryConfig::default());
        assert!(record.mark_disconnected());
        assert!(!record.mark_disconnected());
        assert!(!record.is_connected());

        observe(&mut record, "10.0.0.5_state2", t0);
        assert!(record.is_connected());
    }

    #[test]
    fn test_messages_within_window() {
        let t0 = Instant::now();
        let mut record = ClientRecord::new(source(), t0, &RegistryConfig::default());
        for i in 0..5 {
            observe(&mut record, "10.0.0.5_state2", t0 + Duration::from_secs(i * 5));
        }
        let now = t0 + Duration::from_secs(20);
        assert_eq!(record.messages_within(now, Duration::from_secs(10)), 3);
    }

    #[test]
    fn test_messages_within_is_not_capped_by_recent_ring() {
        let t0 = Instant::now();
        let config = RegistryConfig::default().with_recent_capacity(10);
        let mut record = ClientRecord::new(source(), t0, &config);
        for i in 0..300 {
            observe(&mut record, "10.0.0.5_state2", t0 + Duration::from_millis(i * 10));
        }
        assert_eq!(record.recent_messages().len(), 10);
        let now = t0 + Duration::from_secs(3);
        assert_eq!(record.messages_within(now, Duration::from_secs(10)), 300);
    }

    #[test]
    fn test_messages_within_uses_clamped_arrival() {
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_secs(30);
        let mut record = ClientRecord::new(source(), t0, &RegistryConfig::default());
        observe(&mut record, "10.0.0.5_state2", t1);
        // Stamped 30s earlier, but applied at t1
        observe(&mut record, "10.0.0.5_state2", t0);
        assert_eq!(record.messages_within(t1, Duration::from_secs(10)), 2);
    }

    #[test]
    fn test_arrivals_outside_rate_window_are_pruned() {
        let t0 = Instant::now();
        let config = RegistryConfig::default().with_rate_window(Duration::from_secs(2));
        let mut record = ClientRecord::new(source(), t0, &config);
        for i in 0..10 {
            observe(&mut record, "10.0.0.5_state2", t0 + Duration::from_secs(i));
        }
        assert_eq!(record.arrivals.len(), 3);
        let now = t0 + Duration::from_secs(9);
        assert_eq!(record.messages_within(now, Duration::from_secs(60)), 3);
    }
}
