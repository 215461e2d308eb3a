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


//! # Heartwire Heartbeat Codec
//!
//! This crate provides the wire layer for heartbeat telemetry: a CRLF frame codec for
//! `tokio_util::codec` and a pure parser that turns a frame payload into a typed
//! [`Message`].
//!
//! ## Wire Format
//!
//! Agents push one frame per status report and never expect a reply:
//!
//! ```text
//! <a.b.c.d>_state<digit>\r\n
//! ```
//!
//! The digit maps `0` to [`StatusCode::Error`], `1` to [`StatusCode::Secondary`] and `2` to
//! [`StatusCode::Primary`]. [`StatusCode::Unknown`] is never produced by a successful parse.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use heartwire_codec::{HeartbeatCodec, Message};
//! use tokio_util::codec::FramedRead;
//! use tokio::net::TcpStream;
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let stream = TcpStream::connect("127.0.0.1:9000").await?;
//! let mut frames = FramedRead::new(stream, HeartbeatCodec::new());
//!
//! while let Some(frame) = frames.next().await {
//!     let message = Message::from_frame(frame?, tokio::time::Instant::now());
//!     println!("{:?}", message);
//! }
//! # Ok(())
//! # }
//! ```

mod codec;
mod message;
mod parser;
mod result;
mod source;
mod status;

pub use codec::{DEFAULT_MAX_FRAME_LENGTH, DELIMITER, Frame, HeartbeatCodec};
pub use message::{Heartbeat, Message};
pub use parser::{STATE_MARKER, parse_payload};
pub use result::{CodecError, CodecResult, ParseError};
pub use source::SourceId;
pub use status::StatusCode;
