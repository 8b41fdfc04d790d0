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

use crate::pd::PdClient;
use crate::types;
use crate::types::v1alpha1::tidbcluster::TidbCluster;
use crate::types::v1alpha1::yulong::YuLong;
use async_trait::async_trait;
use kube::Resource;
use kube::api::{Api, PostParams};
use kube::runtime::reflector::{ObjectRef, Store};
use snafu::Snafu;
use snafu::futures::TryFutureExt;
use std::hash::Hash;
use std::sync::Arc;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Kubernetes API error: {}", source))]
    Kube { source: kube::Error },

    #[snafu(transparent)]
    Types { source: types::error::Error },

    #[snafu(transparent)]
    Serde { source: serde_json::Error },
}

impl Error {
    fn api_code(&self) -> Option<u16> {
        match self {
            Error::Kube {
                source: kube::Error::Api(ae),
            } => Some(ae.code),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.api_code() == Some(404)
    }

    /// The write was rejected because the object changed since it was read.
    pub fn is_conflict(&self) -> bool {
        self.api_code() == Some(409)
    }
}

/// Read-only view over a local cache of objects.
pub trait Lister<K>: Send + Sync {
    fn get(&self, namespace: &str, name: &str) -> Option<Arc<K>>;
}

impl<K> Lister<K> for Store<K>
where
    K: Resource + Clone + Send + Sync + 'static,
    K::DynamicType: Default + Eq + Hash + Clone + Send + Sync,
{
    fn get(&self, namespace: &str, name: &str) -> Option<Arc<K>> {
        Store::get(self, &ObjectRef::new(name).within(namespace))
    }
}

/// Authoritative YuLong storage, bypassing any cache.
#[async_trait]
pub trait YuLongStore: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<YuLong, Error>;

    /// Replaces the status of `yulong`. Fails with a conflict if the stored
    /// resource version no longer matches.
    async fn update_status(&self, yulong: &YuLong) -> Result<YuLong, Error>;
}

pub struct KubeYuLongStore {
    client: kube::Client,
}

impl KubeYuLongStore {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl YuLongStore for KubeYuLongStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<YuLong, Error> {
        let api: Api<YuLong> = Api::namespaced(self.client.clone(), namespace);
        api.get(name).context(KubeSnafu).await
    }

    async fn update_status(&self, yulong: &YuLong) -> Result<YuLong, Error> {
        let api: Api<YuLong> = Api::namespaced(self.client.clone(), &yulong.namespace()?);
        let body = serde_json::to_vec(yulong)?;

        api.replace_status(&yulong.name(), &PostParams::default(), yulong)
            .context(KubeSnafu)
            .await
    }
}

/// Everything a reconciliation needs to talk to the outside world.
pub struct Context {
    pub(crate) yulongs: Arc<dyn Lister<YuLong>>,
    pub(crate) tidb_clusters: Arc<dyn Lister<TidbCluster>>,
    pub(crate) store: Arc<dyn YuLongStore>,
    pub(crate) pd: Arc<dyn PdClient>,
}

impl Context {
    pub fn new(
        yulongs: Arc<dyn Lister<YuLong>>,
        tidb_clusters: Arc<dyn Lister<TidbCluster>>,
        store: Arc<dyn YuLongStore>,
        pd: Arc<dyn PdClient>,
    ) -> Self {
        Self {
            yulongs,
            tidb_clusters,
            store,
            pd,
        }
    }
}
