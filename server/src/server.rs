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


//! Heartbeat server implementation
//!
//! The HeartbeatServer owns the listener and coordinates the accept loop, the
//! ConnectionManager and the Reaper for one run between `start` and `stop`.

use crate::{
    ConnectionManager, ErrorScope, MonitorConfig, MonitorError, MonitorHandler, Reaper, Result,
    ServerMetrics, ServerSnapshot, WorkerConfig, WorkerContext,
};
use heartwire_registry::{ClientRegistry, RegistryStatistics};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::select;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Pause after a failed `accept` so a persistent error does not spin
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Everything that exists only between `start` and `stop`
struct RunState {
    local_addr: SocketAddr,
    handler: Arc<dyn MonitorHandler>,
    shutdown: CancellationToken,
    accept_handle: JoinHandle<()>,
    reaper_handle: JoinHandle<()>,
}

/// Heartbeat ingestion server
///
/// Accepts agent connections, applies their heartbeats to a shared [`ClientRegistry`] and
/// reports activity to a [`MonitorHandler`]. The registry outlives individual runs, so a
/// server that is stopped and started again keeps its client history.
///
/// # Example
///
/// ```no_run
/// use heartwire_server::{EventChannel, HeartbeatServer, MonitorConfig};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = HeartbeatServer::new(MonitorConfig::default())?;
///     let (handler, mut events) = EventChannel::new();
///
///     let addr = server.start(Arc::new(handler)).await?;
///     println!("listening on {addr}");
///
///     while let Some(event) = events.recv().await {
///         println!("{event:?}");
///     }
///     Ok(())
/// }
/// ```
pub struct HeartbeatServer {
    config: MonitorConfig,
    registry: Arc<ClientRegistry>,
    manager: Arc<ConnectionManager>,
    metrics: Arc<ServerMetrics>,
    running: AtomicBool,
    run: Mutex<Option<RunState>>,
    created_at: Instant,
}

impl HeartbeatServer {
    /// Create a stopped server
    ///
    /// Fails with [`MonitorError::InvalidConfig`] if the configuration does not validate.
    pub fn new(config: MonitorConfig) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(ClientRegistry::new(config.registry.clone()));
        let metrics = Arc::new(ServerMetrics::new());
        let worker_config = WorkerConfig {
            read_timeout: config.read_timeout,
            max_frame_length: config.max_frame_length,
        };
        let manager = Arc::new(ConnectionManager::new(
            registry.clone(),
            metrics.clone(),
            worker_config,
        ));

        Ok(Self {
            config,
            registry,
            manager,
            metrics,
            running: AtomicBool::new(false),
            run: Mutex::new(None),
            created_at: Instant::now(),
        })
    }

    /// Bind the listener and start accepting connections
    ///
    /// Returns the bound address, which differs from the configured one when port 0 was
    /// requested. Fails with [`MonitorError::Bind`] if the listener cannot be created and
    /// with [`MonitorError::AlreadyRunning`] if the server is running. A failed start leaves
    /// nothing behind.
    pub async fn start(&self, handler: Arc<dyn MonitorHandler>) -> Result<SocketAddr> {
        let mut run = self.run.lock().await;
        if run.is_some() {
            return Err(MonitorError::AlreadyRunning);
        }

        let address = self.config.bind_address;
        let listener = TcpListener::bind(address)
            .await
            .map_err(|source| MonitorError::Bind { address, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| MonitorError::Bind { address, source })?;

        info!(
            local_addr = %local_addr,
            max_connections = self.config.max_connections,
            "Heartbeat server started"
        );
        handler.on_server_started(local_addr).await;

        let shutdown = CancellationToken::new();
        let accept_handle = tokio::spawn(accept_loop(
            listener,
            local_addr,
            Arc::new(Semaphore::new(self.config.max_connections)),
            self.manager.clone(),
            handler.clone(),
            self.metrics.clone(),
            shutdown.clone(),
        ));
        let reaper = Reaper::new(
            WorkerContext {
                registry: self.registry.clone(),
                handler: handler.clone(),
                metrics: self.metrics.clone(),
                sources: self.manager.sources(),
            },
            self.config.reap_interval,
        );
        let reaper_handle = tokio::spawn(reaper.run(shutdown.clone()));

        *run = Some(RunState {
            local_addr,
            handler,
            shutdown,
            accept_handle,
            reaper_handle,
        });
        self.running.store(true, Ordering::SeqCst);

        Ok(local_addr)
    }

    /// Stop accepting, drain every connection and release the listener
    ///
    /// Workers get `shutdown_timeout` to finish. Any still running after that are aborted
    /// and [`MonitorError::ShutdownTimeout`] is returned; the server is stopped either way.
    /// Fails with [`MonitorError::NotRunning`] if the server is not running.
    pub async fn stop(&self) -> Result<()> {
        let mut run = self.run.lock().await;
        let state = run.take().ok_or(MonitorError::NotRunning)?;
        self.running.store(false, Ordering::SeqCst);

        info!(local_addr = %state.local_addr, "Stopping heartbeat server");
        state.shutdown.cancel();

        if let Err(e) = state.accept_handle.await {
            warn!(error = %e, "Accept loop ended abnormally");
        }
        if let Err(e) = state.reaper_handle.await {
            warn!(error = %e, "Reaper ended abnormally");
        }
        let aborted = self.manager.shutdown(self.config.shutdown_timeout).await;

        info!(local_addr = %state.local_addr, aborted, "Heartbeat server stopped");
        state.handler.on_server_stopped(state.local_addr).await;

        if aborted > 0 {
            let error = MonitorError::ShutdownTimeout(aborted);
            state.handler.on_error(ErrorScope::Server, &error).await;
            return Err(error);
        }
        Ok(())
    }

    /// Check if the server is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the bound address while running
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.run.lock().await.as_ref().map(|run| run.local_addr)
    }

    /// Get the number of connections currently handled
    pub fn connection_count(&self) -> usize {
        self.manager.connection_count()
    }

    /// Get a snapshot of the server state
    pub async fn snapshot(&self) -> ServerSnapshot {
        ServerSnapshot {
            running: self.is_running(),
            local_addr: self.local_addr().await,
            active_connections: self.manager.connection_count(),
            total_connections: self.metrics.total_connections(),
            tracked_clients: self.registry.len(),
            uptime: self.created_at.elapsed(),
        }
    }

    /// Get registry statistics as of now
    pub fn statistics(&self) -> RegistryStatistics {
        self.registry.statistics(Instant::now())
    }

    /// Get the client registry
    pub fn registry(&self) -> Arc<ClientRegistry> {
        self.registry.clone()
    }

    /// Get the server metrics
    pub fn metrics(&self) -> Arc<ServerMetrics> {
        self.metrics.clone()
    }

    /// Get the connection manager
    pub fn manager(&self) -> Arc<ConnectionManager> {
        self.manager.clone()
    }

    /// Get the server configuration
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }
}

/// Accept connections until `shutdown` fires
///
/// A ceiling slot is acquired before each `accept`, so a saturated server leaves new
/// connections in the listen backlog instead of accepting and dropping them.
#[instrument(skip_all, fields(local_addr = %local_addr))]
async fn accept_loop(
    listener: TcpListener,
    local_addr: SocketAddr,
    slots: Arc<Semaphore>,
    manager: Arc<ConnectionManager>,
    handler: Arc<dyn MonitorHandler>,
    metrics: Arc<ServerMetrics>,
    shutdown: CancellationToken,
) {
    loop {
        if slots.available_permits() == 0 {
            debug!("Connection ceiling reached, waiting for a free slot");
        }
        let permit = select! {
            biased;
            _ = shutdown.cancelled() => break,
            permit = slots.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let (socket, peer_addr) = select! {
            biased;
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                    metrics.connection_error();
                    handler.on_error(ErrorScope::Server, &MonitorError::Io(e)).await;
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    continue;
                }
            },
        };

        match manager.add_connection(socket, permit, handler.clone(), &shutdown) {
            Ok(id) => debug!(connection_id = %id, peer_addr = %peer_addr, "Accepted connection"),
            Err(e) => {
                warn!(peer_addr = %peer_addr, error = %e, "Failed to set up connection");
                metrics.connection_error();
                handler.on_error(ErrorScope::Server, &e).await;
            }
        }
    }

    info!("Accept loop terminated");
}

impl std::fmt::Debug for HeartbeatServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatServer")
            .field("bind_address", &self.config.bind_address)
            .field("running", &self.is_running())
            .field("connection_count", &self.connection_count())
            .field("clients", &self.registry.len())
            .finish()
    }
}

impl Drop for HeartbeatServer {
    fn drop(&mut self) {
        if let Some(run) = self.run.get_mut().take() {
            warn!("HeartbeatServer dropped while still running");
            run.shutdown.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NoopHandler;

    fn test_config() -> MonitorConfig {
        MonitorConfig::new("127.0.0.1:0".parse().unwrap())
    }

    #[tokio::test]
    async fn test_server_lifecycle() {
        let server = HeartbeatServer::new(test_config()).unwrap();
        assert!(!server.is_running());
        assert!(server.local_addr().await.is_none());

        let addr = server.start(Arc::new(NoopHandler)).await.unwrap();
        assert!(server.is_running());
        assert_ne!(addr.port(), 0);
        assert_eq!(server.local_addr().await, Some(addr));

        server.stop().await.unwrap();
        assert!(!server.is_running());
        assert!(server.local_addr().await.is_none());
    }

    #[tokio::test]
    async fn test_server_snapshot() {
        let server = HeartbeatServer::new(test_config()).unwrap();
        let snapshot = server.snapshot().await;

        assert!(!snapshot.running);
        assert_eq!(snapshot.active_connections, 0);
        assert_eq!(snapshot.total_connections, 0);
        assert_eq!(snapshot.tracked_clients, 0);
    }

    #[tokio::test]
    async fn test_server_double_start() {
        let server = HeartbeatServer::new(test_config()).unwrap();
        server.start(Arc::new(NoopHandler)).await.unwrap();

        let result = server.start(Arc::new(NoopHandler)).await;
        assert!(matches!(result, Err(MonitorError::AlreadyRunning)));

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_server_stop_when_idle() {
        let server = HeartbeatServer::new(test_config()).unwrap();
        assert!(matches!(server.stop().await, Err(MonitorError::NotRunning)));
    }

    #[tokio::test]
    async fn test_server_restart() {
        let server = HeartbeatServer::new(test_config()).unwrap();
        server.start(Arc::new(NoopHandler)).await.unwrap();
        server.stop().await.unwrap();
        server.start(Arc::new(NoopHandler)).await.unwrap();
        assert!(server.is_running());
        server.stop().await.unwrap();
    }

    #[test]
    fn test_server_rejects_invalid_config() {
        let result = HeartbeatServer::new(test_config().with_max_connections(0));
        assert!(matches!(result, Err(MonitorError::InvalidConfig(_))));
    }
}
