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


//! Heartbeat Agent Example
//!
//! Connects to a heartbeat monitor and reports a rotating status for one source address
//! every second.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --example heartbeat_agent -- [server address] [source ip]
//! ```
//!
//! Defaults to `127.0.0.1:9000` and `10.0.0.5`.

use futures::SinkExt;
use heartwire_codec::{Heartbeat, HeartbeatCodec, SourceId, StatusCode};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::FramedWrite;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let server: SocketAddr = args.next().as_deref().unwrap_or("127.0.0.1:9000").parse()?;
    let source: Ipv4Addr = args.next().as_deref().unwrap_or("10.0.0.5").parse()?;
    let source = SourceId::new(source);

    let stream = TcpStream::connect(server).await?;
    let mut sink = FramedWrite::new(stream, HeartbeatCodec::new());
    println!("Reporting as {source} to {server}, press Ctrl+C to stop");

    let states = [StatusCode::Primary, StatusCode::Primary, StatusCode::Secondary, StatusCode::Error];
    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    for status in states.iter().copied().cycle() {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                let heartbeat = Heartbeat::new(source, status);
                sink.send(heartbeat).await?;
                println!("sent {heartbeat}");
            }
        }
    }

    Ok(())
}
