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

//! Turns watch notifications into work queue keys.
//!
//! Only the object's identity is queued. The reconciler always reads the current state,
//! so an update's previous version is of no interest.

use crate::key;
use crate::queue::WorkQueue;
use kube::Resource;
use kube::runtime::watcher;
use std::fmt::Debug;
use tracing::{error, trace};

#[derive(Clone)]
pub struct EventHandler {
    queue: WorkQueue<String>,
}

impl EventHandler {
    pub fn new(queue: WorkQueue<String>) -> Self {
        Self { queue }
    }

    pub fn on_add<K: Resource + Debug>(&self, obj: &K) {
        self.enqueue(obj);
    }

    pub fn on_update<K: Resource + Debug>(&self, _old: Option<&K>, cur: &K) {
        self.enqueue(cur);
    }

    pub fn on_delete<K: Resource + Debug>(&self, obj: &K) {
        self.enqueue(obj);
    }

    /// Dispatches a watcher event. Objects listed during the initial sync count as adds,
    /// later applies as updates.
    pub fn handle<K: Resource + Debug>(&self, event: &watcher::Event<K>) {
        match event {
            watcher::Event::InitApply(obj) => self.on_add(obj),
            watcher::Event::Apply(obj) => self.on_update(None, obj),
            watcher::Event::Delete(obj) => self.on_delete(obj),
            watcher::Event::Init | watcher::Event::InitDone => {}
        }
    }

    fn enqueue<K: Resource + Debug>(&self, obj: &K) {
        match key::meta_namespace_key(obj) {
            Ok(key) => {
                trace!("enqueue {}", key);
                self.queue.add(key);
            }
            Err(e) => error!("couldn't get key for object {:?}: {}", obj, e),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::queue::rate_limiter::ItemExponentialFailureRateLimiter;
    use crate::tests::create_test_yulong;
    use crate::types::v1alpha1::yulong::YuLong;
    use std::time::Duration;

    fn handler() -> (EventHandler, WorkQueue<String>) {
        let queue = WorkQueue::new(
            "test",
            ItemExponentialFailureRateLimiter::new(Duration::from_secs(1), Duration::from_secs(100)),
        );
        (EventHandler::new(queue.clone()), queue)
    }

    #[tokio::test]
    async fn test_add_update_delete_enqueue_key() {
        let (handler, queue) = handler();
        let a = create_test_yulong("default", "a");
        let b = create_test_yulong("default", "b");
        let c = create_test_yulong("other", "c");

        handler.on_add(&a);
        handler.on_update(Some(&a), &b);
        handler.on_delete(&c);

        assert_eq!(queue.get().await.as_deref(), Some("default/a"));
        assert_eq!(queue.get().await.as_deref(), Some("default/b"));
        assert_eq!(queue.get().await.as_deref(), Some("other/c"));
    }

    #[tokio::test]
    async fn test_repeated_events_collapse() {
        let (handler, queue) = handler();
        let a = create_test_yulong("default", "a");

        handler.on_add(&a);
        handler.on_update(Some(&a), &a);
        handler.on_update(None, &a);

        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_handle_watcher_events() {
        let (handler, queue) = handler();

        handler.handle(&watcher::Event::<YuLong>::Init);
        handler.handle(&watcher::Event::InitApply(create_test_yulong("default", "a")));
        handler.handle(&watcher::Event::<YuLong>::InitDone);
        handler.handle(&watcher::Event::Apply(create_test_yulong("default", "b")));
        handler.handle(&watcher::Event::Delete(create_test_yulong("default", "c")));

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.get().await.as_deref(), Some("default/a"));
    }

    #[test]
    fn test_object_without_name_is_dropped() {
        let (handler, queue) = handler();
        let mut yl = create_test_yulong("default", "a");
        yl.metadata.name = None;

        handler.on_add(&yl);

        assert!(queue.is_empty());
    }
}
