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


//! Heartbeat values and received messages

use crate::{Frame, ParseError, STATE_MARKER, SourceId, StatusCode, parse_payload};
use std::fmt;
use tokio::time::Instant;

/// A validated status report: who sent it and what it said.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Heartbeat {
    source: SourceId,
    status: StatusCode,
}

impl Heartbeat {
    /// Create a heartbeat
    pub fn new(source: SourceId, status: StatusCode) -> Self {
        Self { source, status }
    }

    /// Get the reporting source
    pub fn source(&self) -> SourceId {
        self.source
    }

    /// Get the reported status
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

/// Formats the canonical wire payload, without the delimiter.
///
/// `Unknown` has no wire digit and is rendered as `?`, which the parser rejects.
impl fmt::Display for Heartbeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.source,
            STATE_MARKER,
            self.status.digit().unwrap_or('?')
        )
    }
}

/// An immutable record of one received frame.
///
/// Construction never fails. A payload that does not match the grammar produces an invalid
/// message carrying [`StatusCode::Unknown`] and the parse failure; such messages must not be
/// applied to client state.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    raw: String,
    source: Option<SourceId>,
    status: StatusCode,
    received_at: Instant,
    wire_len: usize,
    error: Option<ParseError>,
}

impl Message {
    /// Parse a raw payload received at `received_at`.
    ///
    /// The wire length is assumed to be the payload plus the two byte delimiter.
    pub fn parse(raw: impl Into<String>, received_at: Instant) -> Self {
        let raw = raw.into();
        let wire_len = raw.len() + 2;
        Self::build(raw, wire_len, received_at)
    }

    /// Parse a decoded frame received at `received_at`.
    pub fn from_frame(frame: Frame, received_at: Instant) -> Self {
        let wire_len = frame.wire_len();
        Self::build(frame.into_payload(), wire_len, received_at)
    }

    fn build(raw: String, wire_len: usize, received_at: Instant) -> Self {
        match parse_payload(&raw) {
            Ok(heartbeat) => Self {
                raw,
                source: Some(heartbeat.source()),
                status: heartbeat.status(),
                received_at,
                wire_len,
                error: None,
            },
            Err(error) => Self {
                raw,
                source: None,
                status: StatusCode::Unknown,
                received_at,
                wire_len,
                error: Some(error),
            },
        }
    }

    /// The payload text exactly as received
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The reporting source, `None` when the payload was invalid
    pub fn source(&self) -> Option<SourceId> {
        self.source
    }

    /// The reported status, `Unknown` when the payload was invalid
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// When the frame was received
    pub fn received_at(&self) -> Instant {
        self.received_at
    }

    /// Bytes the frame occupied on the wire, delimiter included
    pub fn wire_len(&self) -> usize {
        self.wire_len
    }

    /// Whether the payload matched the grammar
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }

    /// The parse failure for an invalid message
    pub fn error(&self) -> Option<&ParseError> {
        self.error.as_ref()
    }

    /// The validated heartbeat, if any
    pub fn heartbeat(&self) -> Option<Heartbeat> {
        self.source
            .filter(|_| self.is_valid())
            .map(|source| Heartbeat::new(source, self.status))
    }
}
