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

//! Read-only projection of the TidbCluster resource.
//!
//! Only the fields the YuLong controller looks at are modelled, everything else
//! in the object is ignored when deserializing.

use crate::types;
use crate::types::error::NoNamespaceSnafu;
use crate::types::v1alpha1::status::condition::ConditionStatus;
use chrono::{DateTime, Utc};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use snafu::OptionExt;

const PD_CLIENT_PORT: u16 = 2379;

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[kube(
    group = "pingcap.com",
    version = "v1alpha1",
    kind = "TidbCluster",
    namespaced,
    status = "TidbClusterStatus",
    shortname = "tc",
    plural = "tidbclusters",
    singular = "tidbcluster",
    crates(serde_json = "k8s_openapi::serde_json")
)]
#[serde(rename_all = "camelCase")]
pub struct TidbClusterSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Kubernetes cluster domain, used to build fully qualified service addresses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_domain: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TidbClusterStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<TidbClusterCondition>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TidbClusterCondition {
    #[serde(rename = "type")]
    pub type_: String,

    pub status: ConditionStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TidbCluster {
    pub fn namespace(&self) -> Result<String, types::error::Error> {
        ResourceExt::namespace(self).context(NoNamespaceSnafu)
    }

    pub fn name(&self) -> String {
        ResourceExt::name_any(self)
    }

    /// Status of the first reported condition, which is taken as the cluster's overall
    /// readiness. `None` when the cluster has not reported any condition yet.
    pub fn first_condition_status(&self) -> Option<ConditionStatus> {
        self.status
            .as_ref()
            .and_then(|status| status.conditions.first())
            .map(|cond| cond.status)
    }

    /// base URL of the cluster's PD service
    pub fn pd_url(&self) -> Result<String, types::error::Error> {
        let ns = self.namespace()?;
        let host = match self.spec.cluster_domain.as_deref() {
            Some(domain) if !domain.is_empty() => {
                format!("{}-pd.{}.svc.{}", self.name(), ns, domain)
            }
            _ => format!("{}-pd.{}", self.name(), ns),
        };

        Ok(format!("http://{host}:{PD_CLIENT_PORT}"))
    }
}
