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

//! Translates TiDB cluster state into YuLong status conditions.

use crate::types::v1alpha1::status::condition::{
    ConditionStatus, REASON_CLUSTER_UNREADY, REASON_READY, YuLongCondition, YuLongConditionType,
};
use crate::types::v1alpha1::tidbcluster::TidbCluster;
use crate::types::v1alpha1::yulong::YuLong;

/// Only the cluster's first condition is consulted.
pub fn tidb_cluster_is_up_to_date(tc: &TidbCluster) -> bool {
    tc.first_condition_status() == Some(ConditionStatus::True)
}

/// The Ready condition a YuLong bound to `tc` should carry.
pub fn ready_condition(tc: &TidbCluster) -> YuLongCondition {
    let (status, reason, message) = if tidb_cluster_is_up_to_date(tc) {
        (
            ConditionStatus::True,
            REASON_READY,
            "TiDB cluster is fully up and running",
        )
    } else {
        (
            ConditionStatus::False,
            REASON_CLUSTER_UNREADY,
            "TiDB cluster is not ready",
        )
    };

    YuLongCondition::new(YuLongConditionType::Ready, status, reason, message)
}

pub fn update_ready_condition(yl: &mut YuLong, tc: &TidbCluster) {
    yl.status
        .get_or_insert_with(Default::default)
        .set_condition(ready_condition(tc));
}
