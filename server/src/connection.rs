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


//! Framed heartbeat connection

use crate::{ConnectionId, ConnectionStats, MonitorError, Result};
use futures_util::StreamExt;
use heartwire_codec::{Frame, HeartbeatCodec};
use metrics::counter;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_util::codec::FramedRead;
use tracing::{debug, instrument, trace};

/// An accepted agent connection that yields CRLF-delimited frames
///
/// The connection is read-only. Agents never receive a reply.
pub struct HeartbeatConnection {
    framed: FramedRead<TcpStream, HeartbeatCodec>,
    id: ConnectionId,
    peer_addr: SocketAddr,
    created_at: Instant,
    stats: Arc<ConnectionStats>,
}

impl HeartbeatConnection {
    /// Wrap an accepted TCP stream
    #[instrument(skip(socket), fields(connection_id = %id))]
    pub fn wrap(socket: TcpStream, id: ConnectionId, max_frame_length: usize) -> Result<Self> {
        let peer_addr = socket.peer_addr()?;
        debug!(peer_addr = %peer_addr, max_frame_length, "Wrapping heartbeat connection");
        counter!("heartwire.connections.total").increment(1);

        Ok(Self {
            framed: FramedRead::new(
                socket,
                HeartbeatCodec::with_max_frame_length(max_frame_length),
            ),
            id,
            peer_addr,
            created_at: Instant::now(),
            stats: Arc::new(ConnectionStats::default()),
        })
    }

    /// Get the connection ID
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Get the peer address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Get when the connection was accepted
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Get the shared counters for this connection
    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.stats
    }

    /// Read the next frame
    ///
    /// Returns `Ok(None)` when the peer closed the stream. A trailing partial frame is
    /// discarded at end of stream.
    pub async fn next(&mut self) -> Result<Option<Frame>> {
        match self.framed.next().await {
            Some(Ok(frame)) => {
                trace!(connection_id = %self.id, wire_len = frame.wire_len(), "Frame received");
                self.stats.frame_received(frame.wire_len());
                counter!("heartwire.frames.received").increment(1);
                counter!("heartwire.bytes.received").increment(frame.wire_len() as u64);
                Ok(Some(frame))
            }
            Some(Err(e)) => Err(MonitorError::Codec(e)),
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for HeartbeatConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatConnection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("created_at", &self.created_at)
            .field("frames_received", &self.stats.frames_received())
            .finish()
    }
}
