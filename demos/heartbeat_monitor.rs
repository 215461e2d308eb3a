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


//! Heartbeat Monitor Example
//!
//! Runs the heartbeat server, logs every event it publishes and prints registry
//! statistics every ten seconds.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --example heartbeat_monitor
//! ```
//!
//! Then feed it heartbeats, for example with the agent example:
//! ```bash
//! cargo run --example heartbeat_agent -- 127.0.0.1:9000 10.0.0.5
//! ```

use heartwire_server::{EventChannel, HeartbeatServer, MonitorConfig, MonitorEvent};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    let config = MonitorConfig::default()
        .with_port(9000)
        .with_inactivity_threshold(Duration::from_secs(15))
        .with_reap_interval(Duration::from_secs(5));
    let server = HeartbeatServer::new(config)?;

    let (handler, mut events) = EventChannel::new();
    let addr = server.start(Arc::new(handler)).await?;
    println!("Heartbeat monitor listening on {addr}");
    println!("Press Ctrl+C to stop");

    let mut report = tokio::time::interval(Duration::from_secs(10));
    report.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = report.tick() => {
                info!("{}", server.statistics());
            }
            Some(event) = events.recv() => match event {
                MonitorEvent::ClientAdded { client } => {
                    info!(source = %client.source, status = %client.status, "New client");
                }
                MonitorEvent::StatusChanged { transition } => {
                    info!(
                        source = %transition.source,
                        from = %transition.from,
                        to = %transition.to,
                        after = ?transition.duration_in_previous,
                        "Status changed"
                    );
                }
                MonitorEvent::ClientDisconnected { source, .. } => {
                    info!(source = %source, "Client disconnected");
                }
                MonitorEvent::ClientTimedOut { source, .. } => {
                    warn!(source = %source, "Client went silent");
                }
                MonitorEvent::Error { scope, error, .. } => {
                    warn!(scope = %scope, "{error}");
                }
                _ => {}
            },
        }
    }

    if let Err(e) = server.stop().await {
        warn!("Shutdown incomplete: {e}");
    }
    println!("{}", server.statistics());

    Ok(())
}
