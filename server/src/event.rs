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


//! Events published to observers of the heartbeat server

use crate::{ConnectionId, ConnectionInfo};
use heartwire_codec::{Message, SourceId};
use heartwire_registry::{ClientInfo, StateTransition};
use std::fmt;
use std::net::SocketAddr;
use tokio::time::Instant;

/// Where an error was raised
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    /// The listener or the reaper
    Server,
    /// A single connection worker
    Connection {
        /// Connection that failed
        id: ConnectionId,
        /// Remote address of the connection
        peer_addr: SocketAddr,
    },
}

impl fmt::Display for ErrorScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorScope::Server => write!(f, "server"),
            ErrorScope::Connection { id, peer_addr } => write!(f, "{id} ({peer_addr})"),
        }
    }
}

/// An owned event, as delivered by [`EventChannel`](crate::EventChannel)
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// The listener is bound and accepting
    ServerStarted {
        /// Bound address
        addr: SocketAddr,
        /// When the server started
        at: Instant,
    },
    /// The server finished shutting down
    ServerStopped {
        /// Address that was bound
        addr: SocketAddr,
        /// When shutdown completed
        at: Instant,
    },
    /// A connection was accepted and its worker started
    ConnectionOpened {
        /// Connection snapshot at open
        info: ConnectionInfo,
    },
    /// A connection worker exited
    ConnectionClosed {
        /// Connection snapshot at close
        info: ConnectionInfo,
        /// When the worker exited
        at: Instant,
    },
    /// The first valid message from a new source was applied
    ClientAdded {
        /// Client snapshot after the first message
        client: ClientInfo,
    },
    /// A valid message was applied to the registry
    MessageReceived {
        /// Connection that delivered the message
        connection: ConnectionId,
        /// The applied message
        message: Message,
    },
    /// A client changed status
    StatusChanged {
        /// The transition, carrying the per-client sequence number
        transition: StateTransition,
    },
    /// A connection the client reported over closed
    ClientDisconnected {
        /// Client that was marked disconnected
        source: SourceId,
        /// When it was marked
        at: Instant,
    },
    /// The reaper found a client past the inactivity threshold
    ClientTimedOut {
        /// Client that was marked disconnected
        source: SourceId,
        /// When the sweep ran
        at: Instant,
    },
    /// An error was raised and handled
    Error {
        /// Where the error was raised
        scope: ErrorScope,
        /// Rendered error
        error: String,
        /// Whether the affected component kept running
        recoverable: bool,
        /// When the error was raised
        at: Instant,
    },
}

impl MonitorEvent {
    /// When the event happened
    pub fn timestamp(&self) -> Instant {
        match self {
            MonitorEvent::ServerStarted { at, .. }
            | MonitorEvent::ServerStopped { at, .. }
            | MonitorEvent::ConnectionClosed { at, .. }
            | MonitorEvent::ClientDisconnected { at, .. }
            | MonitorEvent::ClientTimedOut { at, .. }
            | MonitorEvent::Error { at, .. } => *at,
            MonitorEvent::ConnectionOpened { info } => info.created_at,
            MonitorEvent::ClientAdded { client } => client.first_seen,
            MonitorEvent::MessageReceived { message, .. } => message.received_at(),
            MonitorEvent::StatusChanged { transition } => transition.at,
        }
    }

    /// The client the event concerns, if any
    pub fn source(&self) -> Option<SourceId> {
        match self {
            MonitorEvent::ClientAdded { client } => Some(client.source),
            MonitorEvent::MessageReceived { message, .. } => message.source(),
            MonitorEvent::StatusChanged { transition } => Some(transition.source),
            MonitorEvent::ClientDisconnected { source, .. }
            | MonitorEvent::ClientTimedOut { source, .. } => Some(*source),
            _ => None,
        }
    }
}
