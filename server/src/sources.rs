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

//! Per-source bookkeeping shared by every worker
//!
//! Two connections may report for the same source. The tracker keeps their effects on that
//! source consistent:
//! - Status changes reach the handler in the order they entered the source's history, even
//!   when they were applied by different workers
//! - A source stays connected until the last connection carrying it closes

use crate::MonitorHandler;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use heartwire_codec::SourceId;
use heartwire_registry::{ClientRegistry, StateTransition};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

/// Transitions of one source waiting to be published
struct Outbox {
    tx: mpsc::UnboundedSender<StateTransition>,
    /// Held for the whole drain, so only one worker publishes a source at a time
    rx: Mutex<mpsc::UnboundedReceiver<StateTransition>>,
}

impl Outbox {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }
}

/// Shared per-source state for one server
#[derive(Default)]
pub struct SourceTracker {
    /// Live connections that have reported each source
    carriers: DashMap<SourceId, usize>,
    outboxes: DashMap<SourceId, Arc<Outbox>>,
}

impl SourceTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more live connection reporting `source`
    ///
    /// Call once per connection, before the connection's first message for the source is
    /// applied.
    pub fn attach(&self, source: SourceId) {
        *self.carriers.entry(source).or_insert(0) += 1;
    }

    /// Number of live connections reporting `source`
    pub fn carriers(&self, source: SourceId) -> usize {
        self.carriers.get(&source).map_or(0, |count| *count)
    }

    /// Drop one connection's claim on `source`
    ///
    /// When it was the last claim the client is marked disconnected in `registry`. Returns
    /// `true` if that cleared the connected hint.
    pub fn release(&self, source: SourceId, registry: &ClientRegistry) -> bool {
        match self.carriers.entry(source) {
            Entry::Occupied(mut entry) if *entry.get() > 1 => {
                *entry.get_mut() -= 1;
                debug!(source = %source, remaining = *entry.get(), "Client still reported elsewhere");
                false
            }
            Entry::Occupied(entry) => {
                // Marked while the entry is locked so a concurrent attach waits for it
                let flipped = registry.mark_disconnected(source);
                entry.remove();
                flipped
            }
            Entry::Vacant(_) => registry.mark_disconnected(source),
        }
    }

    /// Forget every claim, e.g. after workers were aborted without releasing
    pub fn reset_carriers(&self) {
        self.carriers.clear();
    }

    /// Queue a transition for publication
    ///
    /// Must be called while the registry entry for the source is locked, so the queue order
    /// matches the history order.
    pub fn push_transition(&self, transition: StateTransition) {
        let outbox = self
            .outboxes
            .entry(transition.source)
            .or_insert_with(|| Arc::new(Outbox::new()));
        // The receiver lives in the same outbox, so the send cannot fail
        let _ = outbox.tx.send(transition);
    }

    /// Deliver every queued transition of `source` to `handler`, oldest first
    ///
    /// Concurrent callers for the same source take turns. A transition is delivered by
    /// whichever caller drains it first. Returns the number delivered by this call.
    pub async fn publish_transitions(&self, source: SourceId, handler: &dyn MonitorHandler) -> usize {
        let Some(outbox) = self.outboxes.get(&source).map(|o| Arc::clone(o.value())) else {
            return 0;
        };

        let mut pending = outbox.rx.lock().await;
        let mut published = 0;
        while let Ok(transition) = pending.try_recv() {
            handler.on_status_changed(&transition).await;
            published += 1;
        }
        published
    }
}

impl std::fmt::Debug for SourceTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceTracker")
            .field("carried", &self.carriers.len())
            .field("outboxes", &self.outboxes.len())
            .finish()
    }
}
