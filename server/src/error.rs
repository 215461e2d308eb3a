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


//! Error types for the heartbeat server

use crate::types::ConnectionId;
use heartwire_codec::{CodecError, ParseError};
use heartwire_registry::RegistryError;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Result type for operations
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Heartbeat server error types
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The listener could not be created
    #[error("Failed to bind {address}: {source}")]
    Bind {
        /// Address that was requested
        address: SocketAddr,
        /// Underlying socket error
        source: std::io::Error,
    },

    /// I/O error from the underlying TCP stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Framing error from the codec layer
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// A frame did not match the payload grammar
    #[error("Malformed frame '{raw}': {reason}")]
    Parse {
        /// The payload as received
        raw: String,
        /// Why it was rejected
        reason: ParseError,
    },

    /// Registry rejected an update
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// No frame arrived within the read timeout
    #[error("No data received for {0:?}")]
    ReadTimeout(Duration),

    /// Connection with the given ID was not found
    #[error("Connection {0} not found")]
    ConnectionNotFound(ConnectionId),

    /// `start` was called on a running server
    #[error("Server already running")]
    AlreadyRunning,

    /// `stop` was called on a stopped server
    #[error("Server not running")]
    NotRunning,

    /// Workers did not drain in time and were aborted
    #[error("Shutdown timed out, {0} connection(s) aborted")]
    ShutdownTimeout(usize),

    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl MonitorError {
    /// Check if the error is recoverable
    ///
    /// Recoverable errors affect a single frame or connection and leave the server running.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MonitorError::Parse { .. }
                | MonitorError::ReadTimeout(_)
                | MonitorError::Io(_)
                | MonitorError::Codec(_)
        )
    }

    /// Check if the error is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            MonitorError::Io(_)
                | MonitorError::Codec(_)
                | MonitorError::ReadTimeout(_)
                | MonitorError::ConnectionNotFound(_)
        )
    }

    /// Check if the error is a malformed frame
    pub fn is_parse_error(&self) -> bool {
        matches!(self, MonitorError::Parse { .. })
    }
}
