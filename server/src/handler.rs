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


//! Observer trait for the heartbeat server

use crate::{ConnectionId, ConnectionInfo, ErrorScope, MonitorError, MonitorEvent};
use async_trait::async_trait;
use heartwire_codec::{Message, SourceId};
use heartwire_registry::{ClientInfo, StateTransition};
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Server observer trait
///
/// Implement this trait to receive notifications from the heartbeat server. All methods
/// are async and default to doing nothing. Callbacks run on the worker that raised them,
/// so a slow observer slows the connection it is observing and nothing else.
///
/// # Example
///
/// ```no_run
/// use heartwire_server::{MonitorHandler, StateTransition};
/// use async_trait::async_trait;
///
/// struct Alerts;
///
/// #[async_trait]
/// impl MonitorHandler for Alerts {
///     async fn on_status_changed(&self, transition: &StateTransition) {
///         println!("{} is now {}", transition.source, transition.to);
///     }
/// }
/// ```
#[async_trait]
pub trait MonitorHandler: Send + Sync + 'static {
    /// Called once the listener is bound
    async fn on_server_started(&self, _addr: SocketAddr) {}

    /// Called after every worker has exited during `stop`
    async fn on_server_stopped(&self, _addr: SocketAddr) {}

    /// Called when a worker starts on an accepted connection
    async fn on_connection_opened(&self, _info: &ConnectionInfo) {}

    /// Called when a worker exits, after its clients were marked disconnected
    async fn on_connection_closed(&self, _info: &ConnectionInfo) {}

    /// Called for the first valid message from a new source, before `on_message`
    async fn on_client_added(&self, _client: &ClientInfo) {}

    /// Called for every valid message applied to the registry
    async fn on_message(&self, _id: ConnectionId, _message: &Message) {}

    /// Called when a message changes a client's status
    ///
    /// Calls for one client are serialized and follow the order of its history. The call may
    /// come from a different connection's worker than the one that applied the message.
    async fn on_status_changed(&self, _transition: &StateTransition) {}

    /// Called when a client is marked disconnected because the last connection reporting it
    /// closed
    async fn on_client_disconnected(&self, _source: SourceId) {}

    /// Called when the reaper marks a client disconnected for inactivity
    async fn on_client_timeout(&self, _source: SourceId) {}

    /// Called for every handled error
    ///
    /// Parse errors leave the connection open. Any other connection-scoped error is
    /// followed by the connection closing.
    async fn on_error(&self, _scope: ErrorScope, _error: &MonitorError) {}
}

/// Handler that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl MonitorHandler for NoopHandler {}

/// Observer that forwards every notification as a [`MonitorEvent`] over a channel
///
/// `StatusChanged` events for one client always arrive in history order, even when the
/// client reports over several connections.
#[derive(Debug, Clone)]
pub struct EventChannel {
    tx: mpsc::UnboundedSender<MonitorEvent>,
}

impl EventChannel {
    /// Create a channel handler and the receiver its events arrive on
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MonitorEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn publish(&self, event: MonitorEvent) {
        // A dropped receiver means nobody is listening
        let _ = self.tx.send(event);
    }
}

#[async_trait]
impl MonitorHandler for EventChannel {
    async fn on_server_started(&self, addr: SocketAddr) {
        self.publish(MonitorEvent::ServerStarted {
            addr,
            at: Instant::now(),
        });
    }

    async fn on_server_stopped(&self, addr: SocketAddr) {
        self.publish(MonitorEvent::ServerStopped {
            addr,
            at: Instant::now(),
        });
    }

    async fn on_connection_opened(&self, info: &ConnectionInfo) {
        self.publish(MonitorEvent::ConnectionOpened { info: info.clone() });
    }

    async fn on_connection_closed(&self, info: &ConnectionInfo) {
        self.publish(MonitorEvent::ConnectionClosed {
            info: info.clone(),
            at: Instant::now(),
        });
    }

    async fn on_client_added(&self, client: &ClientInfo) {
        self.publish(MonitorEvent::ClientAdded {
            client: client.clone(),
        });
    }

    async fn on_message(&self, id: ConnectionId, message: &Message) {
        self.publish(MonitorEvent::MessageReceived {
            connection: id,
            message: message.clone(),
        });
    }

    async fn on_status_changed(&self, transition: &StateTransition) {
        self.publish(MonitorEvent::StatusChanged {
            transition: *transition,
        });
    }

    async fn on_client_disconnected(&self, source: SourceId) {
        self.publish(MonitorEvent::ClientDisconnected {
            source,
            at: Instant::now(),
        });
    }

    async fn on_client_timeout(&self, source: SourceId) {
        self.publish(MonitorEvent::ClientTimedOut {
            source,
            at: Instant::now(),
        });
    }

    async fn on_error(&self, scope: ErrorScope, error: &MonitorError) {
        self.publish(MonitorEvent::Error {
            scope,
            error: error.to_string(),
            recoverable: error.is_recoverable(),
            at: Instant::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heartwire_codec::ParseError;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn test_event_channel_forwards() {
        let (handler, mut rx) = EventChannel::new();
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let source = SourceId::new(Ipv4Addr::new(10, 0, 0, 5));

        handler.on_server_started(addr).await;
        handler.on_client_timeout(source).await;
        handler
            .on_error(
                ErrorScope::Server,
                &MonitorError::Parse {
                    raw: "x".to_string(),
                    reason: ParseError::MissingMarker,
                },
            )
            .await;

        assert!(matches!(
            rx.recv().await,
            Some(MonitorEvent::ServerStarted { addr: a, .. }) if a == addr
        ));
        assert!(matches!(
            rx.recv().await,
            Some(MonitorEvent::ClientTimedOut { source: s, .. }) if s == source
        ));
        match rx.recv().await {
            Some(MonitorEvent::Error {
                scope, recoverable, ..
            }) => {
                assert_eq!(scope, ErrorScope::Server);
                assert!(recoverable);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_event_channel_survives_dropped_receiver() {
        let (handler, rx) = EventChannel::new();
        drop(rx);
        handler
            .on_client_disconnected(SourceId::new(Ipv4Addr::LOCALHOST))
            .await;
    }

    #[tokio::test]
    async fn test_noop_handler() {
        let handler = NoopHandler;
        handler
            .on_server_started("127.0.0.1:9000".parse().unwrap())
            .await;
    }
}
