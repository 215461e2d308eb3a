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


use crate::{CodecError, CodecResult, Heartbeat};
use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace};

/// Frame terminator on the wire.
pub const DELIMITER: &[u8; 2] = b"\r\n";

/// Default ceiling on the payload length of a single frame.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 1024;

/// One delimited unit of the heartbeat stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    payload: String,
    wire_len: usize,
}

impl Frame {
    /// Create a frame from its payload and the number of bytes it occupied on the wire
    pub fn new(payload: String, wire_len: usize) -> Self {
        Self { payload, wire_len }
    }

    /// The payload text without the delimiter
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Payload plus delimiter length
    pub fn wire_len(&self) -> usize {
        self.wire_len
    }

    /// Consume the frame, returning the payload
    pub fn into_payload(self) -> String {
        self.payload
    }
}

/// A codec splitting a byte stream into CRLF delimited heartbeat frames.
///
/// The decoder tolerates frames split across any number of reads: undelimited bytes stay in
/// the read buffer until the delimiter arrives. Every complete frame already buffered is
/// yielded in arrival order before more input is requested.
///
/// Unlike a plain line codec, an undelimited remainder at end of stream is discarded rather
/// than reported as an error, and a peer that sends more than `max_frame_length` bytes
/// without a delimiter gets [`CodecError::FrameTooLong`].
///
/// Payload bytes are decoded lossily as UTF-8; invalid sequences become U+FFFD and are left
/// for the parser to reject.
///
/// # Example
/// ```
/// use heartwire_codec::HeartbeatCodec;
/// use bytes::BytesMut;
/// use tokio_util::codec::Decoder;
///
/// let mut codec = HeartbeatCodec::new();
/// let mut buf = BytesMut::from(&b"10.0.0.5_state2\r\n10.0.0"[..]);
///
/// let frame = codec.decode(&mut buf).unwrap().unwrap();
/// assert_eq!(frame.payload(), "10.0.0.5_state2");
/// assert!(codec.decode(&mut buf).unwrap().is_none());
/// assert_eq!(&buf[..], b"10.0.0");
/// ```
#[derive(Debug, Clone)]
pub struct HeartbeatCodec {
    /// Index in the read buffer where the next delimiter search resumes
    next_index: usize,
    max_frame_length: usize,
}

impl HeartbeatCodec {
    /// Creates a codec with the default frame length limit.
    pub fn new() -> Self {
        Self::with_max_frame_length(DEFAULT_MAX_FRAME_LENGTH)
    }

    /// Creates a codec with a custom frame length limit.
    pub fn with_max_frame_length(max_frame_length: usize) -> Self {
        Self {
            next_index: 0,
            max_frame_length,
        }
    }

    /// Maximum payload length accepted by the decoder.
    pub fn max_frame_length(&self) -> usize {
        self.max_frame_length
    }
}

impl Default for HeartbeatCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for HeartbeatCodec {
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> CodecResult<Option<Frame>> {
        // Step back one byte so a CR at the end of the previous read can pair with an LF.
        let start = self.next_index.saturating_sub(1).min(src.len());
        let found = src[start..]
            .windows(DELIMITER.len())
            .position(|window| window == DELIMITER);

        match found {
            Some(offset) => {
                let end = start + offset;
                self.next_index = 0;

                if end > self.max_frame_length {
                    return Err(CodecError::FrameTooLong {
                        length: end,
                        max: self.max_frame_length,
                    });
                }

                let line = src.split_to(end + DELIMITER.len());
                let payload = String::from_utf8_lossy(&line[..end]).into_owned();
                trace!(length = end, "Decoded heartbeat frame");
                Ok(Some(Frame::new(payload, line.len())))
            }
            None => {
                self.next_index = src.len();

                let pending = src.len() - usize::from(src.ends_with(b"\r"));
                if pending > self.max_frame_length {
                    return Err(CodecError::FrameTooLong {
                        length: pending,
                        max: self.max_frame_length,
                    });
                }
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> CodecResult<Option<Frame>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                if !src.is_empty() {
                    debug!(
                        remaining = src.len(),
                        "Discarding undelimited bytes at end of stream"
                    );
                    src.clear();
                }
                self.next_index = 0;
                Ok(None)
            }
        }
    }
}

impl Encoder<&str> for HeartbeatCodec {
    type Error = CodecError;

    fn encode(&mut self, payload: &str, dst: &mut BytesMut) -> CodecResult<()> {
        if payload.contains(['\r', '\n']) {
            return Err(CodecError::EmbeddedDelimiter);
        }
        dst.reserve(payload.len() + DELIMITER.len());
        dst.put_slice(payload.as_bytes());
        dst.put_slice(DELIMITER);
        Ok(())
    }
}

impl Encoder<Heartbeat> for HeartbeatCodec {
    type Error = CodecError;

    fn encode(&mut self, heartbeat: Heartbeat, dst: &mut BytesMut) -> CodecResult<()> {
        let payload = heartbeat.to_string();
        Encoder::<&str>::encode(self, payload.as_str(), dst)
    }
}
