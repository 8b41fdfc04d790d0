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

use crate::types;
use crate::types::error::NoNamespaceSnafu;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use snafu::OptionExt;

/// YuLong binds a workload to a TiDB cluster and mirrors that cluster's health in its status.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[kube(
    group = "pingcap.com",
    version = "v1alpha1",
    kind = "YuLong",
    namespaced,
    status = "crate::types::v1alpha1::status::Status",
    shortname = "yl",
    plural = "yulongs",
    singular = "yulong",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"UsedSize", "type":"string", "jsonPath":".status.usedSize"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#,
    crates(serde_json = "k8s_openapi::serde_json")
)]
#[serde(rename_all = "camelCase")]
pub struct YuLongSpec {
    /// The TidbCluster backing this YuLong. Defaults to the TidbCluster with the same
    /// namespace and name as the YuLong.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<ClusterRef>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRef {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl YuLong {
    pub fn namespace(&self) -> Result<String, types::error::Error> {
        ResourceExt::namespace(self).context(NoNamespaceSnafu)
    }

    pub fn name(&self) -> String {
        ResourceExt::name_any(self)
    }

    /// namespace of the bound TidbCluster
    pub fn cluster_namespace(&self) -> Result<String, types::error::Error> {
        match self.spec.cluster.as_ref().and_then(|c| c.namespace.clone()) {
            Some(ns) => Ok(ns),
            None => self.namespace(),
        }
    }

    /// name of the bound TidbCluster
    pub fn cluster_name(&self) -> String {
        self.spec
            .cluster
            .as_ref()
            .map(|c| c.name.clone())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.name())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn test_cluster_identity_defaults_to_own() {
        let yl = crate::tests::create_test_yulong("default", "demo");

        assert_eq!(yl.cluster_name(), "demo");
        assert_eq!(yl.cluster_namespace().unwrap(), "default");
    }

    #[test]
    fn test_cluster_identity_from_ref() {
        let mut yl = crate::tests::create_test_yulong("default", "demo");
        yl.spec.cluster = Some(ClusterRef {
            name: "basic".to_string(),
            namespace: Some("tidb".to_string()),
        });

        assert_eq!(yl.cluster_name(), "basic");
        assert_eq!(yl.cluster_namespace().unwrap(), "tidb");
    }

    #[test]
    fn test_cluster_ref_without_namespace_uses_own() {
        let mut yl = crate::tests::create_test_yulong("default", "demo");
        yl.spec.cluster = Some(ClusterRef {
            name: "basic".to_string(),
            namespace: None,
        });

        assert_eq!(yl.cluster_name(), "basic");
        assert_eq!(yl.cluster_namespace().unwrap(), "default");
    }

    #[test]
    fn test_namespace_missing() {
        let mut yl = crate::tests::create_test_yulong("default", "demo");
        yl.metadata.namespace = None;

        assert!(yl.namespace().is_err());
    }

    #[test]
    fn test_crd_metadata() {
        let crd = YuLong::crd();

        assert_eq!(crd.spec.group, "pingcap.com");
        assert_eq!(crd.spec.names.kind, "YuLong");
        assert_eq!(crd.spec.names.plural, "yulongs");
        assert_eq!(crd.spec.scope, "Namespaced");
    }

    #[test]
    fn test_status_serializes_used_size_camel_case() {
        let mut yl = crate::tests::create_test_yulong("default", "demo");
        yl.status = Some(crate::types::v1alpha1::status::Status {
            used_size: "600".to_string(),
            ..Default::default()
        });

        let value = serde_json::to_value(&yl).unwrap();
        assert_eq!(value["status"]["usedSize"], "600");
        assert!(value["status"].get("conditions").is_none());
    }
}
