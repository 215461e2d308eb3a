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


//! Connection manager implementation
//!
//! The ConnectionManager is responsible for:
//! - Spawning and tracking one worker per accepted connection
//! - Holding each connection's slot of the connection ceiling until its worker exits
//! - Closing individual connections on request
//! - Draining all workers on shutdown and aborting stragglers

use crate::{
    ConnectionId, ConnectionInfo, ConnectionState, ConnectionStats, ConnectionWorker,
    HeartbeatConnection, MonitorError, MonitorHandler, Result, ServerMetrics, SourceTracker,
    WorkerConfig, WorkerContext,
};
use dashmap::DashMap;
use heartwire_registry::ClientRegistry;
use metrics::gauge;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{OwnedSemaphorePermit, watch};
use tokio::task::AbortHandle;
use tokio::time::{Instant, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Managed connection entry
struct ManagedConnection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    created_at: Instant,
    /// Current state (written by the worker)
    state: Arc<AtomicU8>,
    stats: Arc<ConnectionStats>,
    cancel: CancellationToken,
    /// Set right after spawn
    abort: Option<AbortHandle>,
}

impl ManagedConnection {
    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id,
            state: self.state(),
            peer_addr: self.peer_addr,
            created_at: self.created_at,
            bytes_received: self.stats.bytes_received(),
            frames_received: self.stats.frames_received(),
            valid_messages: self.stats.valid_messages(),
            invalid_messages: self.stats.invalid_messages(),
            sources: self.stats.sources(),
        }
    }
}

/// Owned by a worker task. Dropping it (normal exit or abort) releases the connection's
/// ceiling slot and removes its tracking entry.
struct ConnectionSlot {
    id: ConnectionId,
    created_at: Instant,
    connections: Arc<DashMap<ConnectionId, ManagedConnection>>,
    live: Arc<watch::Sender<usize>>,
    metrics: Arc<ServerMetrics>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.connections.remove(&self.id);
        self.metrics.connection_closed(self.created_at.elapsed());
        self.live.send_modify(|live| *live = live.saturating_sub(1));
        gauge!("heartwire.connections.active").decrement(1.0);
    }
}

/// Connection manager
pub struct ConnectionManager {
    /// Active connections (lock-free concurrent map)
    connections: Arc<DashMap<ConnectionId, ManagedConnection>>,
    /// Next connection ID (monotonically increasing)
    next_id: AtomicU64,
    /// Number of workers still holding a slot
    live: Arc<watch::Sender<usize>>,
    registry: Arc<ClientRegistry>,
    /// Shared by every worker this manager spawns
    sources: Arc<SourceTracker>,
    metrics: Arc<ServerMetrics>,
    worker_config: WorkerConfig,
}

impl ConnectionManager {
    /// Create a new connection manager
    pub fn new(
        registry: Arc<ClientRegistry>,
        metrics: Arc<ServerMetrics>,
        worker_config: WorkerConfig,
    ) -> Self {
        let (live, _) = watch::channel(0);
        Self {
            connections: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            live: Arc::new(live),
            registry,
            sources: Arc::new(SourceTracker::new()),
            metrics,
            worker_config,
        }
    }

    fn next_connection_id(&self) -> ConnectionId {
        ConnectionId::new(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Spawn a worker for an accepted socket
    ///
    /// The worker holds `permit` until it exits. Cancelling `shutdown` stops the worker
    /// along with every other worker spawned under the same token.
    pub fn add_connection(
        &self,
        socket: TcpStream,
        permit: OwnedSemaphorePermit,
        handler: Arc<dyn MonitorHandler>,
        shutdown: &CancellationToken,
    ) -> Result<ConnectionId> {
        let id = self.next_connection_id();
        let connection =
            HeartbeatConnection::wrap(socket, id, self.worker_config.max_frame_length)?;

        let state = Arc::new(AtomicU8::new(ConnectionState::Connecting.as_u8()));
        let cancel = shutdown.child_token();
        let created_at = connection.created_at();

        self.connections.insert(
            id,
            ManagedConnection {
                id,
                peer_addr: connection.peer_addr(),
                created_at,
                state: state.clone(),
                stats: connection.stats().clone(),
                cancel: cancel.clone(),
                abort: None,
            },
        );
        self.live.send_modify(|live| *live += 1);
        self.metrics.connection_opened();
        gauge!("heartwire.connections.active").increment(1.0);

        let slot = ConnectionSlot {
            id,
            created_at,
            connections: self.connections.clone(),
            live: self.live.clone(),
            metrics: self.metrics.clone(),
            _permit: permit,
        };
        let context = WorkerContext {
            registry: self.registry.clone(),
            handler,
            metrics: self.metrics.clone(),
            sources: self.sources.clone(),
        };
        let worker = ConnectionWorker::new(
            connection,
            context,
            self.worker_config.clone(),
            state,
            cancel,
        );

        let handle = tokio::spawn(async move {
            let _slot = slot;
            worker.run().await;
        });
        if let Some(mut entry) = self.connections.get_mut(&id) {
            entry.abort = Some(handle.abort_handle());
        }

        Ok(id)
    }

    /// Ask a connection's worker to stop
    ///
    /// The worker finishes its cleanup (clients marked disconnected, observers notified)
    /// before the connection disappears from [`ConnectionManager::get_all_connection_infos`].
    pub fn close_connection(&self, id: ConnectionId) -> Result<()> {
        match self.connections.get(&id) {
            Some(entry) => {
                debug!(connection_id = %id, "Closing connection");
                entry.cancel.cancel();
                Ok(())
            }
            None => Err(MonitorError::ConnectionNotFound(id)),
        }
    }

    /// Get connection info
    pub fn get_connection_info(&self, id: ConnectionId) -> Option<ConnectionInfo> {
        self.connections.get(&id).map(|entry| entry.info())
    }

    /// Get all connection infos, ordered by ID
    pub fn get_all_connection_infos(&self) -> Vec<ConnectionInfo> {
        let mut infos: Vec<ConnectionInfo> = self
            .connections
            .iter()
            .map(|entry| entry.value().info())
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    /// Per-source state shared by this manager's workers
    pub fn sources(&self) -> Arc<SourceTracker> {
        self.sources.clone()
    }

    /// Get the number of connections whose worker has not exited
    pub fn connection_count(&self) -> usize {
        *self.live.borrow()
    }

    /// Get the number of connections accepted since creation
    pub fn total_connections(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst) - 1
    }

    /// Wait until no connection is live
    pub async fn wait_idle(&self) {
        let mut rx = self.live.subscribe();
        // The sender lives in self, so the channel cannot close here
        let _ = rx.wait_for(|live| *live == 0).await;
    }

    /// Stop every worker, waiting up to `grace` before aborting the rest
    ///
    /// Returns the number of workers that had to be aborted.
    pub async fn shutdown(&self, grace: Duration) -> usize {
        for entry in self.connections.iter() {
            entry.cancel.cancel();
        }

        if timeout(grace, self.wait_idle()).await.is_ok() {
            debug!("All connections drained");
            return 0;
        }

        let stragglers: Vec<AbortHandle> = self
            .connections
            .iter()
            .filter_map(|entry| entry.abort.clone())
            .collect();
        warn!(
            count = stragglers.len(),
            "Connections did not drain in time, aborting"
        );
        for handle in &stragglers {
            handle.abort();
        }
        // Aborted tasks release their slots once the runtime drops them
        let _ = timeout(grace, self.wait_idle()).await;
        // Aborted workers never released their source claims
        self.sources.reset_carriers();

        stragglers.len()
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connections", &self.connection_count())
            .field("total_connections", &self.total_connections())
            .field("worker_config", &self.worker_config)
            .finish()
    }
}
