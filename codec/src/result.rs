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


//! Error types and result aliases for codec operations

/// Result Type for Codec Operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors raised while framing a heartbeat byte stream.
///
/// Any of these terminates the connection that produced it. Malformed payloads inside a
/// well-formed frame are not codec errors; see [`ParseError`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// An I/O error occurred while reading from or writing to the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer sent more than `max` bytes without a delimiter.
    #[error("Frame of {length} bytes exceeds the {max} byte limit")]
    FrameTooLong {
        /// Number of undelimited bytes buffered
        length: usize,
        /// Configured maximum payload length
        max: usize,
    },

    /// An outbound payload contained the frame delimiter.
    #[error("Payload contains an embedded frame delimiter")]
    EmbeddedDelimiter,
}

/// Reasons a frame payload does not match `<ipv4>_state<digit>`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The frame carried no payload
    #[error("empty payload")]
    Empty,

    /// The `_state` separator was not found
    #[error("missing '_state' marker")]
    MissingMarker,

    /// The address part is not four dot separated decimal octets
    #[error("invalid address: {reason}")]
    InvalidAddress {
        /// What was wrong with the address
        reason: String,
    },

    /// An octet is numeric but larger than 255
    #[error("octet '{octet}' is out of range")]
    OctetOutOfRange {
        /// The offending octet text
        octet: String,
    },

    /// Nothing follows the `_state` marker
    #[error("missing state digit")]
    MissingState,

    /// The state part is not a single decimal digit
    #[error("invalid state '{found}'")]
    InvalidState {
        /// The text found after the marker
        found: String,
    },

    /// The state digit is not one of 0, 1 or 2
    #[error("unknown state digit '{digit}'")]
    UnknownState {
        /// The unrecognized digit
        digit: char,
    },
}
