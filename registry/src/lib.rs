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


//! # Heartwire Client Registry
//!
//! Tracks one [`ClientRecord`] per reporting agent. Each record is a small state machine over
//! [`StatusCode`](heartwire_codec::StatusCode) with a bounded transition history, a bounded
//! ring of recent messages and running counters.
//!
//! # Architecture
//!
//! ```text
//! ClientRegistry (DashMap, sharded locks)
//!     ↓
//! ClientRecord → BoundedBuffer<StateTransition>
//!              → BoundedBuffer<Message>
//! ```
//!
//! Updates for the same source are serialized by the shard lock that owns the key; sources
//! hashed to other shards update in parallel. Reads return owned snapshots.
//!
//! # Example
//!
//! ```
//! use heartwire_codec::{Message, StatusCode};
//! use heartwire_registry::{ClientRegistry, RegistryConfig};
//! use tokio::time::Instant;
//!
//! let registry = ClientRegistry::new(RegistryConfig::default());
//! let now = Instant::now();
//!
//! let outcome = registry.apply(&Message::parse("10.0.0.5_state2", now)).unwrap();
//! assert!(outcome.created);
//!
//! let outcome = registry.apply(&Message::parse("10.0.0.5_state1", now)).unwrap();
//! let transition = outcome.transition.unwrap();
//! assert_eq!(transition.from, StatusCode::Primary);
//! assert_eq!(transition.to, StatusCode::Secondary);
//! ```

mod buffer;
mod config;
mod error;
mod record;
mod registry;
mod statistics;

pub use buffer::BoundedBuffer;
pub use config::RegistryConfig;
pub use error::{RegistryError, RegistryResult};
pub use record::{ClientInfo, ClientRecord, StateTransition};
pub use registry::{ApplyOutcome, ClientRegistry};
pub use statistics::{RegistryStatistics, StatusDistribution};
