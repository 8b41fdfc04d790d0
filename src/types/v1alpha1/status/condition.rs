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

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::Display;

use super::Status;

/// Reason set on the Ready condition when the bound cluster is healthy.
pub const REASON_READY: &str = "Ready";

/// Reason set on the Ready condition when the bound cluster is not ready.
pub const REASON_CLUSTER_UNREADY: &str = "ClusterUnReady";

#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, Display, PartialEq, Eq, Default)]
pub enum ConditionStatus {
    #[strum(to_string = "True")]
    True,

    #[strum(to_string = "False")]
    False,

    #[strum(to_string = "Unknown")]
    #[default]
    Unknown,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, Display, PartialEq, Eq, Hash)]
pub enum YuLongConditionType {
    /// The bound TiDB cluster is up and serving.
    #[strum(to_string = "Ready")]
    Ready,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct YuLongCondition {
    #[serde(rename = "type")]
    pub type_: YuLongConditionType,

    pub status: ConditionStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl YuLongCondition {
    /// a new condition stamped with the current time
    pub fn new(
        type_: YuLongConditionType,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            type_,
            status,
            last_update_time: Some(now),
            last_transition_time: Some(now),
            reason: reason.into(),
            message: message.into(),
        }
    }
}

impl Status {
    pub fn condition(&self, type_: YuLongConditionType) -> Option<&YuLongCondition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    pub fn ready_condition(&self) -> Option<&YuLongCondition> {
        self.condition(YuLongConditionType::Ready)
    }

    /// Sets `condition`, replacing any existing one of the same type.
    ///
    /// An existing condition with the same status and reason is left as it is, timestamps
    /// included. When only the reason changes, the old `last_transition_time` is carried over.
    /// The new entry always goes to the end of the list.
    pub fn set_condition(&mut self, mut condition: YuLongCondition) {
        if let Some(current) = self.condition(condition.type_) {
            if current.status == condition.status && current.reason == condition.reason {
                return;
            }

            if current.status == condition.status {
                condition.last_transition_time = current.last_transition_time;
            }
        }

        self.conditions.retain(|c| c.type_ != condition.type_);
        self.conditions.push(condition);
    }
}
