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


//! Heartbeat Ingestion Server
//!
//! This crate accepts heartbeat frames from many agents over TCP, applies them to a shared
//! [`ClientRegistry`] and reports what happened to an injected [`MonitorHandler`]:
//!
//! - Bounded connection concurrency with backpressure on accept
//! - One worker task per connection with a stall timeout
//! - Per-source state tracking with transition history
//! - A periodic reaper that marks silent sources disconnected
//! - Cancellation driven shutdown with a bounded drain
//!
//! # Architecture
//!
//! ```text
//! HeartbeatServer ── Reaper
//!     ↓
//! ConnectionManager
//!     ↓
//! ConnectionWorker → HeartbeatConnection → ClientRegistry
//! ```
//!
//! # Example
//!
//! ```no_run
//! use heartwire_server::{HeartbeatServer, MonitorConfig, MonitorHandler};
//! use heartwire_registry::StateTransition;
//! use async_trait::async_trait;
//!
//! struct MyHandler;
//!
//! #[async_trait]
//! impl MonitorHandler for MyHandler {
//!     async fn on_status_changed(&self, transition: &StateTransition) {
//!         println!("{} went {} -> {}", transition.source, transition.from, transition.to);
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = HeartbeatServer::new(MonitorConfig::default().with_port(9000))?;
//!     server.start(std::sync::Arc::new(MyHandler)).await?;
//!     tokio::signal::ctrl_c().await?;
//!     server.stop().await?;
//!     Ok(())
//! }
//! ```

mod config;
mod connection;
mod error;
mod event;
mod handler;
mod manager;
mod metrics;
mod reaper;
mod server;
mod sources;
mod types;
mod worker;

pub use config::MonitorConfig;
pub use connection::HeartbeatConnection;
pub use error::{MonitorError, Result};
pub use event::{ErrorScope, MonitorEvent};
pub use handler::{EventChannel, MonitorHandler, NoopHandler};
pub use manager::ConnectionManager;
pub use self::metrics::{MetricsSnapshot, ServerMetrics};
pub use reaper::Reaper;
pub use server::HeartbeatServer;
pub use sources::SourceTracker;
pub use types::{ConnectionId, ConnectionInfo, ConnectionState, ConnectionStats, ServerSnapshot};
pub use worker::{ConnectionWorker, WorkerConfig, WorkerContext};

pub use heartwire_codec::{Heartbeat, Message, ParseError, SourceId, StatusCode};
pub use heartwire_registry::{
    ClientInfo, ClientRegistry, RegistryConfig, RegistryStatistics, StateTransition,
};
