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


//! Periodic inactivity sweep

use crate::WorkerContext;
use heartwire_codec::SourceId;
use std::time::Duration;
use tokio::select;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Background task that marks silent clients disconnected
///
/// The reaper only clears the `connected` hint. Records and their history stay in the
/// registry until removed explicitly.
#[derive(Debug)]
pub struct Reaper {
    context: WorkerContext,
    interval: Duration,
}

impl Reaper {
    /// Create a reaper sweeping every `interval`
    pub fn new(context: WorkerContext, interval: Duration) -> Self {
        Self { context, interval }
    }

    /// Time between sweeps
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sweep the registry once as of `now`, notifying the handler for each client flipped
    pub async fn sweep_once(&self, now: Instant) -> Vec<SourceId> {
        let timed_out = self.context.registry.sweep(now);
        self.context.metrics.sweep_completed(timed_out.len());

        for source in &timed_out {
            info!(source = %source, "Client timed out");
            self.context.handler.on_client_timeout(*source).await;
        }
        timed_out
    }

    /// Sweep on every interval tick until `cancel` fires
    ///
    /// The first sweep happens one interval after the call.
    #[instrument(skip_all, fields(interval = ?self.interval))]
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!("Reaper started");

        loop {
            select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.sweep_once(Instant::now()).await;
                }
            }
        }

        debug!("Reaper stopped");
    }
}
