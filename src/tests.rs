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

//! Fixtures and in-memory collaborators shared by the unit tests.

use crate::context::{self, Context, Lister, YuLongStore};
use crate::pd::{self, PdClient, StoreInfo, StoreStatus, StoresInfo};
use crate::types::v1alpha1::status::condition::ConditionStatus;
use crate::types::v1alpha1::tidbcluster::{
    TidbCluster, TidbClusterCondition, TidbClusterSpec, TidbClusterStatus,
};
use crate::types::v1alpha1::yulong::{YuLong, YuLongSpec};
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

pub fn create_test_yulong(namespace: &str, name: &str) -> YuLong {
    YuLong {
        metadata: metav1::ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(format!("{name}-uid")),
            resource_version: Some("1".to_string()),
            ..Default::default()
        },
        spec: YuLongSpec::default(),
        status: None,
    }
}

pub fn create_test_tidb_cluster(
    namespace: &str,
    name: &str,
    ready: Option<ConditionStatus>,
) -> TidbCluster {
    TidbCluster {
        metadata: metav1::ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: TidbClusterSpec::default(),
        status: ready.map(|status| TidbClusterStatus {
            conditions: vec![tc_condition("Ready", status)],
        }),
    }
}

pub fn tc_condition(type_: &str, status: ConditionStatus) -> TidbClusterCondition {
    TidbClusterCondition {
        type_: type_.to_string(),
        status,
        ..Default::default()
    }
}

/// A PD store listing with one store per `(capacity, available)` pair.
pub fn stores(samples: &[(u64, u64)]) -> StoresInfo {
    StoresInfo {
        count: samples.len(),
        stores: samples
            .iter()
            .map(|&(capacity, available)| StoreInfo {
                store: None,
                status: StoreStatus {
                    capacity,
                    available,
                },
            })
            .collect(),
    }
}

pub fn api_error(code: u16) -> context::Error {
    context::Error::Kube {
        source: kube::Error::Api(Box::new(kube::core::Status {
            status: Some(kube::core::response::StatusSummary::Failure),
            message: format!("injected error {code}"),
            reason: match code {
                404 => "NotFound",
                409 => "Conflict",
                _ => "InternalError",
            }
            .to_string(),
            code,
            metadata: None,
            details: None,
        })),
    }
}

type ObjectKey = (String, String);

fn object_key(namespace: &str, name: &str) -> ObjectKey {
    (namespace.to_string(), name.to_string())
}

pub struct FakeLister<K> {
    objects: Mutex<HashMap<ObjectKey, Arc<K>>>,
}

impl<K> FakeLister<K> {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, namespace: &str, name: &str, obj: K) {
        self.objects
            .lock()
            .insert(object_key(namespace, name), Arc::new(obj));
    }

    pub fn remove(&self, namespace: &str, name: &str) {
        self.objects.lock().remove(&object_key(namespace, name));
    }
}

impl<K: Send + Sync> Lister<K> for FakeLister<K> {
    fn get(&self, namespace: &str, name: &str) -> Option<Arc<K>> {
        self.objects.lock().get(&object_key(namespace, name)).cloned()
    }
}

fn bump_resource_version(yl: &mut YuLong) {
    let next = yl
        .metadata
        .resource_version
        .as_deref()
        .and_then(|rv| rv.parse::<u64>().ok())
        .unwrap_or_default()
        + 1;
    yl.metadata.resource_version = Some(next.to_string());
}

/// In-memory YuLong store with optimistic concurrency on `resourceVersion`.
pub struct FakeStore {
    objects: Mutex<HashMap<ObjectKey, YuLong>>,
    conflicts: AtomicUsize,
    get_failures: AtomicUsize,
    get_calls: AtomicUsize,
    update_calls: AtomicUsize,
}

impl FakeStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            conflicts: AtomicUsize::new(0),
            get_failures: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
        }
    }

    pub fn insert_if_absent(&self, yl: YuLong) {
        let key = object_key(
            yl.metadata.namespace.as_deref().unwrap_or_default(),
            yl.metadata.name.as_deref().unwrap_or_default(),
        );
        self.objects.lock().entry(key).or_insert(yl);
    }

    pub fn stored(&self, namespace: &str, name: &str) -> Option<YuLong> {
        self.objects.lock().get(&object_key(namespace, name)).cloned()
    }

    /// Applies a write from some other actor.
    pub fn mutate(&self, namespace: &str, name: &str, f: impl FnOnce(&mut YuLong)) {
        if let Some(yl) = self.objects.lock().get_mut(&object_key(namespace, name)) {
            f(yl);
            bump_resource_version(yl);
        }
    }

    pub fn delete(&self, namespace: &str, name: &str) {
        self.objects.lock().remove(&object_key(namespace, name));
    }

    /// The next `n` status updates lose a race against another writer.
    pub fn inject_conflicts(&self, n: usize) {
        self.conflicts.store(n, Ordering::SeqCst);
    }

    /// The next `n` reads fail with a server error.
    pub fn fail_gets(&self, n: usize) {
        self.get_failures.store(n, Ordering::SeqCst);
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl YuLongStore for FakeStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<YuLong, context::Error> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if self
            .get_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(api_error(500));
        }
        self.stored(namespace, name).ok_or_else(|| api_error(404))
    }

    async fn update_status(&self, yulong: &YuLong) -> Result<YuLong, context::Error> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let namespace = yulong.metadata.namespace.as_deref().unwrap_or_default();
        let name = yulong.metadata.name.as_deref().unwrap_or_default();

        let injected = self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            self.mutate(namespace, name, |_| {});
            return Err(api_error(409));
        }

        let mut objects = self.objects.lock();
        let stored = objects
            .get_mut(&object_key(namespace, name))
            .ok_or_else(|| api_error(404))?;
        if stored.metadata.resource_version != yulong.metadata.resource_version {
            return Err(api_error(409));
        }

        stored.status = yulong.status.clone();
        bump_resource_version(stored);
        Ok(stored.clone())
    }
}

pub struct FakePdClient {
    stores: Mutex<Option<StoresInfo>>,
    calls: AtomicUsize,
    panics: AtomicUsize,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl FakePdClient {
    pub fn new() -> Self {
        Self {
            stores: Mutex::new(None),
            calls: AtomicUsize::new(0),
            panics: AtomicUsize::new(0),
            gate: Mutex::new(None),
        }
    }

    pub fn set_stores(&self, stores: StoresInfo) {
        *self.stores.lock() = Some(stores);
    }

    /// Every following query fails until `set_stores` is called again.
    pub fn fail(&self) {
        *self.stores.lock() = None;
    }

    pub fn panic_next(&self, n: usize) {
        self.panics.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every following query blocks until the returned `Notify` is signalled.
    pub fn gate(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock() = Some(gate.clone());
        gate
    }
}

#[async_trait]
impl PdClient for FakePdClient {
    async fn get_stores(&self, tc: &TidbCluster) -> Result<StoresInfo, pd::Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .panics
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            panic!("PD client blew up");
        }

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let stores = self.stores.lock().clone();
        stores.ok_or_else(|| pd::Error::Status {
            url: tc.pd_url().unwrap_or_default(),
            status: 503,
        })
    }
}

pub struct TestContext {
    pub yulongs: Arc<FakeLister<YuLong>>,
    pub tidb_clusters: Arc<FakeLister<TidbCluster>>,
    pub store: Arc<FakeStore>,
    pub pd: Arc<FakePdClient>,
}

impl TestContext {
    pub fn new() -> Self {
        Self {
            yulongs: Arc::new(FakeLister::new()),
            tidb_clusters: Arc::new(FakeLister::new()),
            store: Arc::new(FakeStore::new()),
            pd: Arc::new(FakePdClient::new()),
        }
    }

    /// Puts `yl` in the cache, and in the store unless it already holds that object.
    pub fn add_yulong(&self, yl: YuLong) {
        let namespace = yl.metadata.namespace.clone().unwrap_or_default();
        let name = yl.metadata.name.clone().unwrap_or_default();
        self.store.insert_if_absent(yl.clone());
        self.yulongs.insert(&namespace, &name, yl);
    }

    pub fn remove_yulong(&self, namespace: &str, name: &str) {
        self.yulongs.remove(namespace, name);
        self.store.delete(namespace, name);
    }

    pub fn add_tidb_cluster(&self, tc: TidbCluster) {
        let namespace = tc.metadata.namespace.clone().unwrap_or_default();
        let name = tc.metadata.name.clone().unwrap_or_default();
        self.tidb_clusters.insert(&namespace, &name, tc);
    }

    pub fn context(&self) -> Context {
        Context::new(
            self.yulongs.clone(),
            self.tidb_clusters.clone(),
            self.store.clone(),
            self.pd.clone(),
        )
    }
}
