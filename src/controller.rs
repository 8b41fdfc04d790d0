// Copyright 2025 PingCAP, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Worker pool driving YuLong reconciliation off the work queue.

use crate::context::Context;
use crate::event::EventHandler;
use crate::metrics::Metrics;
use crate::queue::WorkQueue;
use crate::queue::rate_limiter::controller_rate_limiter;
use crate::reconcile;
use futures::FutureExt;
use futures::future::join_all;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const CONTROLLER_NAME: &str = "YuLong";

/// How long a crashed worker stays down before it is started again.
const WORKER_RESTART_PERIOD: Duration = Duration::from_secs(1);

pub struct Controller {
    ctx: Arc<Context>,
    queue: WorkQueue<String>,
    metrics: Arc<Metrics>,
}

impl Controller {
    pub fn new(
        ctx: Arc<Context>,
        metrics: Arc<Metrics>,
        backoff_base: Duration,
        backoff_max: Duration,
    ) -> Self {
        let queue = WorkQueue::new(
            CONTROLLER_NAME,
            controller_rate_limiter(backoff_base, backoff_max),
        );
        Self::with_queue(ctx, metrics, queue)
    }

    pub fn with_queue(ctx: Arc<Context>, metrics: Arc<Metrics>, queue: WorkQueue<String>) -> Self {
        Self {
            ctx,
            queue,
            metrics,
        }
    }

    pub fn name(&self) -> &str {
        self.queue.name()
    }

    pub fn queue(&self) -> &WorkQueue<String> {
        &self.queue
    }

    /// Handler feeding watch events of YuLongs into this controller's queue.
    pub fn event_handler(&self) -> EventHandler {
        EventHandler::new(self.queue.clone())
    }

    /// Runs `workers` workers until `shutdown` is cancelled, then shuts the queue down and
    /// waits for the syncs in flight to finish.
    pub async fn run(self: Arc<Self>, workers: usize, shutdown: CancellationToken) {
        info!("Starting {} controller with {} workers", self.name(), workers);

        let handles: Vec<_> = (0..workers)
            .map(|id| tokio::spawn(self.clone().supervise_worker(id, shutdown.clone())))
            .collect();

        shutdown.cancelled().await;
        self.queue.shut_down();

        for result in join_all(handles).await {
            if let Err(e) = result {
                error!("{} worker ended abnormally: {}", self.name(), e);
            }
        }
        info!("Shutting down {} controller", self.name());
    }

    /// Keeps worker `id` running, restarting it if it panics.
    async fn supervise_worker(self: Arc<Self>, id: usize, shutdown: CancellationToken) {
        loop {
            let worker = tokio::spawn(self.clone().worker(shutdown.clone()));
            match worker.await {
                Ok(()) => return,
                Err(e) if e.is_panic() => {
                    error!("{} worker {} panicked, restarting", self.name(), id);
                }
                Err(e) => {
                    error!("{} worker {} was cancelled: {}", self.name(), id, e);
                    return;
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(WORKER_RESTART_PERIOD) => {}
            }
        }
    }

    async fn worker(self: Arc<Self>, shutdown: CancellationToken) {
        while !shutdown.is_cancelled() && self.process_next_work_item().await {}
    }

    /// Takes one key off the queue and syncs it. Returns `false` once the queue is
    /// shut down.
    pub async fn process_next_work_item(&self) -> bool {
        let Some(key) = self.queue.get().await else {
            return false;
        };
        let _active = self.metrics.active_worker(self.name());
        let item = self.queue.done_on_drop(key);
        let key = item.key();

        // a panicking sync must not lose its key
        let result = AssertUnwindSafe(self.sync(key)).catch_unwind().await;

        match result {
            Ok(Ok(())) => self.queue.forget(key),
            Ok(Err(e)) if e.is_requeue() => {
                info!("{}: {}, still need sync: {}, requeuing", self.name(), key, e);
                self.queue.add_rate_limited(key.clone());
            }
            Ok(Err(e)) => {
                error!("{}: {}, sync failed {}, requeuing", self.name(), key, e);
                self.queue.add_rate_limited(key.clone());
            }
            Err(_) => {
                error!("{}: {}, sync panicked, requeuing", self.name(), key);
                self.queue.add_rate_limited(key.clone());
            }
        }

        true
    }

    async fn sync(&self, key: &str) -> Result<(), reconcile::Error> {
        let start = Instant::now();
        let result = reconcile::sync(&self.ctx, key).await;
        let elapsed = start.elapsed();

        let outcome = match &result {
            Ok(()) => "success",
            Err(e) if e.is_requeue() => "requeue",
            Err(_) => "error",
        };
        self.metrics.observe_reconcile(self.name(), elapsed, outcome);
        debug!("Finished syncing {} {:?} ({:?})", self.name(), key, elapsed);

        result
    }
}
