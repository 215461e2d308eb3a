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


//! Connection worker implementation
//!
//! The ConnectionWorker owns a single accepted connection and is responsible for:
//! - Reading frames with a per-frame stall timeout
//! - Parsing frames and applying valid messages to the registry
//! - Reporting malformed frames without closing the connection
//! - Publishing status changes in per-source order
//! - Marking the connection's clients disconnected when it closes

use crate::{
    ConnectionId, ConnectionInfo, ConnectionState, ConnectionStats, ErrorScope,
    HeartbeatConnection, MonitorError, MonitorHandler, Result, ServerMetrics, SourceTracker,
};
use heartwire_codec::{Frame, Message};
use heartwire_registry::ClientRegistry;
use metrics::counter;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::select;
use tokio::time::{Instant, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Max time to wait for the next frame before the connection counts as stalled
    pub read_timeout: Duration,
    /// Max undelimited bytes buffered per connection
    pub max_frame_length: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(5),
            max_frame_length: heartwire_codec::DEFAULT_MAX_FRAME_LENGTH,
        }
    }
}

/// Services shared by every worker of one server run
#[derive(Clone)]
pub struct WorkerContext {
    /// Registry the workers apply messages to
    pub registry: Arc<ClientRegistry>,
    /// Observer for lifecycle and message notifications
    pub handler: Arc<dyn MonitorHandler>,
    /// Server-wide counters
    pub metrics: Arc<ServerMetrics>,
    /// Per-source ordering and connection claims
    pub sources: Arc<SourceTracker>,
}

impl std::fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerContext")
            .field("registry", &self.registry)
            .field("metrics", &self.metrics)
            .field("sources", &self.sources)
            .finish_non_exhaustive()
    }
}

/// Connection worker that manages a single connection's lifecycle
pub struct ConnectionWorker {
    connection: HeartbeatConnection,
    context: WorkerContext,
    config: WorkerConfig,
    /// Current state (atomic for lock-free access by the manager)
    state: Arc<AtomicU8>,
    cancel: CancellationToken,
}

impl ConnectionWorker {
    /// Create a new connection worker
    pub fn new(
        connection: HeartbeatConnection,
        context: WorkerContext,
        config: WorkerConfig,
        state: Arc<AtomicU8>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            connection,
            context,
            config,
            state,
            cancel,
        }
    }

    /// Get the connection ID
    pub fn id(&self) -> ConnectionId {
        self.connection.id()
    }

    /// Get the current state
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, new_state: ConnectionState) {
        self.state.store(new_state.as_u8(), Ordering::Release);
    }

    fn stats(&self) -> &ConnectionStats {
        self.connection.stats()
    }

    fn scope(&self) -> ErrorScope {
        ErrorScope::Connection {
            id: self.connection.id(),
            peer_addr: self.connection.peer_addr(),
        }
    }

    /// Snapshot of this connection
    pub fn info(&self) -> ConnectionInfo {
        let stats = self.stats();
        ConnectionInfo {
            id: self.connection.id(),
            state: self.state(),
            peer_addr: self.connection.peer_addr(),
            created_at: self.connection.created_at(),
            bytes_received: stats.bytes_received(),
            frames_received: stats.frames_received(),
            valid_messages: stats.valid_messages(),
            invalid_messages: stats.invalid_messages(),
            sources: stats.sources(),
        }
    }

    /// Run the worker until the peer closes, the connection fails, or cancellation
    #[instrument(
        skip(self),
        fields(connection_id = %self.connection.id(), peer_addr = %self.connection.peer_addr())
    )]
    pub async fn run(mut self) {
        self.set_state(ConnectionState::Active);
        info!("Connection opened");
        self.context
            .handler
            .on_connection_opened(&self.info())
            .await;

        if let Err(e) = self.event_loop().await {
            match e {
                MonitorError::ReadTimeout(_) => self.context.metrics.timeout_error(),
                _ => self.context.metrics.connection_error(),
            }
            counter!("heartwire.connections.errors").increment(1);
            warn!(error = %e, "Closing connection after error");
            self.context.handler.on_error(self.scope(), &e).await;
        }

        self.cleanup().await;
    }

    async fn event_loop(&mut self) -> Result<()> {
        loop {
            let next = select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!("Shutdown requested");
                    return Ok(());
                }
                result = timeout(self.config.read_timeout, self.connection.next()) => result,
            };

            match next {
                Ok(Ok(Some(frame))) => self.process_frame(frame).await,
                Ok(Ok(None)) => {
                    debug!("Peer closed connection");
                    return Ok(());
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => return Err(MonitorError::ReadTimeout(self.config.read_timeout)),
            }
        }
    }

    async fn process_frame(&mut self, frame: Frame) {
        let message = Message::from_frame(frame, Instant::now());
        self.context.metrics.frame_received(message.wire_len());

        if let Some(reason) = message.error().cloned() {
            self.stats().invalid_message();
            self.context.metrics.parse_error();
            counter!("heartwire.frames.malformed").increment(1);
            warn!(raw = message.raw(), error = %reason, "Discarding malformed frame");
            let error = MonitorError::Parse {
                raw: message.raw().to_string(),
                reason,
            };
            self.context.handler.on_error(self.scope(), &error).await;
            return;
        }

        // Claim the source before applying so a close elsewhere cannot clear it afterwards
        if let Some(source) = message.source() {
            if self.stats().record_source(source) {
                self.context.sources.attach(source);
            }
        }

        let sources = &self.context.sources;
        let applied = self.context.registry.apply_with(&message, |outcome| {
            if let Some(transition) = outcome.transition {
                sources.push_transition(transition);
            }
        });
        let outcome = match applied {
            Ok(outcome) => outcome,
            Err(e) => {
                let error = MonitorError::from(e);
                self.context.handler.on_error(self.scope(), &error).await;
                return;
            }
        };

        self.stats().valid_message();
        self.context.metrics.valid_message();

        if outcome.created {
            if let Some(client) = self.context.registry.get(outcome.source) {
                self.context.handler.on_client_added(&client).await;
            }
        }
        self.context
            .handler
            .on_message(self.connection.id(), &message)
            .await;
        self.context
            .sources
            .publish_transitions(outcome.source, self.context.handler.as_ref())
            .await;
    }

    async fn cleanup(&mut self) {
        self.set_state(ConnectionState::Closing);

        for source in self.stats().sources() {
            if self.context.sources.release(source, &self.context.registry) {
                debug!(source = %source, "Client disconnected");
                self.context.handler.on_client_disconnected(source).await;
            }
        }

        self.set_state(ConnectionState::Closed);
        info!(
            frames = self.stats().frames_received(),
            invalid = self.stats().invalid_messages(),
            "Connection closed"
        );
        self.context
            .handler
            .on_connection_closed(&self.info())
            .await;
    }
}

impl std::fmt::Debug for ConnectionWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionWorker")
            .field("id", &self.connection.id())
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventChannel, MonitorEvent};
    use heartwire_codec::{SourceId, StatusCode};
    use heartwire_registry::RegistryConfig;
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Harness {
        client: TcpStream,
        registry: Arc<ClientRegistry>,
        cancel: CancellationToken,
        events: UnboundedReceiver<MonitorEvent>,
        task: tokio::task::JoinHandle<()>,
    }

    async fn start_worker(config: WorkerConfig) -> Harness {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
        let client = TcpStream::connect(addr).await.unwrap();
        let server = accept.await.unwrap();

        let connection =
            HeartbeatConnection::wrap(server, ConnectionId::new(1), config.max_frame_length)
                .unwrap();
        let registry = Arc::new(ClientRegistry::new(RegistryConfig::default()));
        let (handler, events) = EventChannel::new();
        let context = WorkerContext {
            registry: registry.clone(),
            handler: Arc::new(handler),
            metrics: Arc::new(ServerMetrics::new()),
            sources: Arc::new(SourceTracker::new()),
        };
        let cancel = CancellationToken::new();
        let state = Arc::new(AtomicU8::new(ConnectionState::Connecting.as_u8()));
        let worker = ConnectionWorker::new(connection, context, config, state, cancel.clone());
        let task = tokio::spawn(worker.run());

        Harness {
            client,
            registry,
            cancel,
            events,
            task,
        }
    }

    #[tokio::test]
    async fn test_worker_lifecycle() {
        let mut h = start_worker(WorkerConfig::default()).await;
        let source = SourceId::from([10, 0, 0, 5]);

        h.client.write_all(b"10.0.0.5_state2\r\n").await.unwrap();
        h.client.shutdown().await.unwrap();
        h.task.await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = h.events.try_recv() {
            kinds.push(match event {
                MonitorEvent::ConnectionOpened { .. } => "opened",
                MonitorEvent::ClientAdded { .. } => "added",
                MonitorEvent::MessageReceived { .. } => "message",
                MonitorEvent::ClientDisconnected { .. } => "disconnected",
                MonitorEvent::ConnectionClosed { .. } => "closed",
                other => panic!("unexpected event: {other:?}"),
            });
        }
        assert_eq!(kinds, ["opened", "added", "message", "disconnected", "closed"]);

        let client = h.registry.get(source).unwrap();
        assert_eq!(client.status, StatusCode::Primary);
        assert!(!client.connected);
    }

    #[tokio::test]
    async fn test_worker_cancellation() {
        let h = start_worker(WorkerConfig {
            read_timeout: Duration::from_secs(60),
            ..WorkerConfig::default()
        })
        .await;

        h.cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), h.task)
            .await
            .expect("worker should observe cancellation")
            .unwrap();
        drop(h.client);
    }

    #[tokio::test]
    async fn test_worker_read_timeout() {
        let mut h = start_worker(WorkerConfig {
            read_timeout: Duration::from_millis(50),
            ..WorkerConfig::default()
        })
        .await;

        h.task.await.unwrap();

        let mut saw_timeout = false;
        while let Ok(event) = h.events.try_recv() {
            if let MonitorEvent::Error {
                error, recoverable, ..
            } = event
            {
                assert!(error.starts_with("No data received"));
                assert!(recoverable);
                saw_timeout = true;
            }
        }
        assert!(saw_timeout);
        drop(h.client);
    }

    #[tokio::test]
    async fn test_worker_keeps_connection_after_parse_error() {
        let mut h = start_worker(WorkerConfig::default()).await;

        h.client
            .write_all(b"garbage\r\n10.0.0.7_state0\r\n")
            .await
            .unwrap();
        h.client.shutdown().await.unwrap();
        h.task.await.unwrap();

        let client = h.registry.get(SourceId::from([10, 0, 0, 7])).unwrap();
        assert_eq!(client.status, StatusCode::Error);
        assert_eq!(client.message_count, 1);

        let parse_errors = std::iter::from_fn(|| h.events.try_recv().ok())
            .filter(|e| matches!(e, MonitorEvent::Error { .. }))
            .count();
        assert_eq!(parse_errors, 1);
    }
}
