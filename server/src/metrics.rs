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


//! Lock-free counters for the heartbeat server

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Lock-free server metrics
///
/// Every counter is an atomic, so workers update them without coordination. Use
/// [`ServerMetrics::snapshot`] for a point-in-time view.
#[derive(Debug)]
pub struct ServerMetrics {
    // Connections
    total_connections: AtomicU64,
    active_connections: AtomicU64,

    // Ingestion
    frames_received: AtomicU64,
    bytes_received: AtomicU64,
    valid_messages: AtomicU64,

    // Errors
    parse_errors: AtomicU64,
    connection_errors: AtomicU64,
    timeout_errors: AtomicU64,

    // Reaper
    sweeps: AtomicU64,
    clients_timed_out: AtomicU64,

    total_connection_duration_ns: AtomicU64,
    started_at: Instant,
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerMetrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            total_connections: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            valid_messages: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            timeout_errors: AtomicU64::new(0),
            sweeps: AtomicU64::new(0),
            clients_timed_out: AtomicU64::new(0),
            total_connection_duration_ns: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Record a new connection being opened
    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection being closed
    pub fn connection_closed(&self, duration: Duration) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
        self.total_connection_duration_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Get the current number of active connections
    pub fn active_connections(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Get the total number of connections since the server was created
    pub fn total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    /// Record one decoded frame of `wire_len` bytes
    pub fn frame_received(&self, wire_len: usize) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received
            .fetch_add(wire_len as u64, Ordering::Relaxed);
    }

    /// Record a frame that was applied to the registry
    pub fn valid_message(&self) {
        self.valid_messages.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a frame the parser rejected
    pub fn parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection-fatal error (I/O or framing)
    pub fn connection_error(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a stalled connection
    pub fn timeout_error(&self) {
        self.timeout_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one reaper sweep and the number of clients it flipped
    pub fn sweep_completed(&self, timed_out: usize) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
        self.clients_timed_out
            .fetch_add(timed_out as u64, Ordering::Relaxed);
    }

    /// Get a snapshot of all metrics
    ///
    /// Counters are read individually, so a snapshot taken under load may mix values from
    /// slightly different instants.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            valid_messages: self.valid_messages.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            timeout_errors: self.timeout_errors.load(Ordering::Relaxed),
            sweeps: self.sweeps.load(Ordering::Relaxed),
            clients_timed_out: self.clients_timed_out.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
            avg_connection_duration: self.average_connection_duration(),
        }
    }

    fn average_connection_duration(&self) -> Duration {
        let total = self.total_connections.load(Ordering::Relaxed);
        let active = self.active_connections.load(Ordering::Relaxed);
        let closed = total.saturating_sub(active);
        if closed == 0 {
            return Duration::ZERO;
        }
        let total_ns = self.total_connection_duration_ns.load(Ordering::Relaxed);
        Duration::from_nanos(total_ns / closed)
    }
}

/// A snapshot of server metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Total connections since the server was created
    pub total_connections: u64,
    /// Connections currently open
    pub active_connections: u64,
    /// Complete frames decoded
    pub frames_received: u64,
    /// Bytes of complete frames, delimiters included
    pub bytes_received: u64,
    /// Frames applied to the registry
    pub valid_messages: u64,
    /// Frames rejected by the parser
    pub parse_errors: u64,
    /// Connections closed by an I/O or framing error
    pub connection_errors: u64,
    /// Connections closed for stalling
    pub timeout_errors: u64,
    /// Reaper sweeps performed
    pub sweeps: u64,
    /// Clients flipped to disconnected by the reaper
    pub clients_timed_out: u64,
    /// Time since the server was created
    pub uptime: Duration,
    /// Average lifetime of closed connections
    pub avg_connection_duration: Duration,
}

impl MetricsSnapshot {
    /// Frames decoded per second of uptime
    pub fn frames_per_sec(&self) -> f64 {
        self.per_sec(self.frames_received)
    }

    /// Bytes received per second of uptime
    pub fn bytes_received_per_sec(&self) -> f64 {
        self.per_sec(self.bytes_received)
    }

    /// Total error count
    pub fn total_errors(&self) -> u64 {
        self.parse_errors + self.connection_errors + self.timeout_errors
    }

    /// Errors per second of uptime
    pub fn error_rate(&self) -> f64 {
        self.per_sec(self.total_errors())
    }

    fn per_sec(&self, count: u64) -> f64 {
        if self.uptime.is_zero() {
            return 0.0;
        }
        count as f64 / self.uptime.as_secs_f64()
    }
}
