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

//! Deduplicating, rate limited work queue.
//!
//! A key is held in at most one of two places: waiting in the queue, or being processed
//! by a worker. Adding a key that is being processed marks it dirty, and it is queued
//! again once the worker calls [`WorkQueue::done`]. This is what keeps two workers from
//! ever handling the same key at once.

pub mod rate_limiter;

use parking_lot::Mutex;
use rate_limiter::RateLimiter;
use std::collections::{HashSet, VecDeque};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::trace;

struct State<K> {
    queue: VecDeque<K>,
    // keys that need processing, queued or not
    dirty: HashSet<K>,
    processing: HashSet<K>,
    shutting_down: bool,
}

struct Inner<K> {
    name: String,
    state: Mutex<State<K>>,
    notify: Notify,
    rate_limiter: Box<dyn RateLimiter<K>>,
}

pub struct WorkQueue<K> {
    inner: Arc<Inner<K>>,
}

impl<K> Clone for WorkQueue<K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Send + Sync + std::fmt::Debug + 'static,
{
    pub fn new(name: impl Into<String>, rate_limiter: impl RateLimiter<K> + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    dirty: HashSet::new(),
                    processing: HashSet::new(),
                    shutting_down: false,
                }),
                notify: Notify::new(),
                rate_limiter: Box::new(rate_limiter),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Marks `key` as needing processing. No-op if it is already waiting. If it is being
    /// processed, it is queued again when that processing is done.
    pub fn add(&self, key: K) {
        {
            let mut state = self.inner.state.lock();
            if state.shutting_down || state.dirty.contains(&key) {
                return;
            }

            state.dirty.insert(key.clone());
            if state.processing.contains(&key) {
                trace!(queue = %self.inner.name, "{:?} is in flight, deferring", key);
                return;
            }

            state.queue.push_back(key);
        }
        self.inner.notify.notify_one();
    }

    /// Number of keys waiting to be handed out.
    pub fn len(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Waits for the next key. Returns `None` once the queue is shut down and drained.
    ///
    /// The caller owns the key until it calls [`WorkQueue::done`].
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.inner.state.lock();
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }

                if state.shutting_down {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Marks `key` as no longer in flight.
    pub fn done(&self, key: &K) {
        {
            let mut state = self.inner.state.lock();
            state.processing.remove(key);
            if !state.dirty.contains(key) {
                return;
            }
            state.queue.push_back(key.clone());
        }
        self.inner.notify.notify_one();
    }

    /// Wraps a key obtained from [`WorkQueue::get`] so that `done` is called when the
    /// guard goes out of scope, whether by return, `?` or panic.
    pub fn done_on_drop(&self, key: K) -> DoneGuard<K> {
        DoneGuard {
            queue: self.clone(),
            key,
        }
    }

    /// Adds `key` after `delay` has passed.
    pub fn add_after(&self, key: K, delay: Duration) {
        if self.is_shutting_down() {
            return;
        }

        if delay.is_zero() {
            self.add(key);
            return;
        }

        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// Adds `key` once the rate limiter allows it.
    pub fn add_rate_limited(&self, key: K) {
        let delay = self.inner.rate_limiter.when(&key);
        trace!(queue = %self.inner.name, "requeue {:?} after {:?}", key, delay);
        self.add_after(key, delay);
    }

    /// Clears the backoff history of `key`.
    pub fn forget(&self, key: &K) {
        self.inner.rate_limiter.forget(key);
    }

    pub fn num_requeues(&self, key: &K) -> u32 {
        self.inner.rate_limiter.num_requeues(key)
    }

    /// Stops accepting new keys and wakes every waiting `get`. Keys already queued are
    /// still handed out.
    pub fn shut_down(&self) {
        self.inner.state.lock().shutting_down = true;
        self.inner.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.state.lock().shutting_down
    }
}

/// Calls [`WorkQueue::done`] for its key when dropped.
pub struct DoneGuard<K>
where
    K: Clone + Eq + Hash + Send + Sync + std::fmt::Debug + 'static,
{
    queue: WorkQueue<K>,
    key: K,
}

impl<K> DoneGuard<K>
where
    K: Clone + Eq + Hash + Send + Sync + std::fmt::Debug + 'static,
{
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K> Drop for DoneGuard<K>
where
    K: Clone + Eq + Hash + Send + Sync + std::fmt::Debug + 'static,
{
    fn drop(&mut self) {
        self.queue.done(&self.key);
    }
}
