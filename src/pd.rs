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

//! Minimal PD client used to sample store capacity of a TiDB cluster.

use crate::types;
use crate::types::v1alpha1::tidbcluster::TidbCluster;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use std::time::Duration;
use tracing::debug;

const STORES_PREFIX: &str = "pd/api/v1/stores";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(transparent)]
    Types { source: types::error::Error },

    #[snafu(display("failed to build PD http client: {}", source))]
    Build { source: reqwest::Error },

    #[snafu(display("request to {} failed: {}", url, source))]
    Request { url: String, source: reqwest::Error },

    #[snafu(display("request to {} returned status {}", url, status))]
    Status { url: String, status: u16 },

    #[snafu(display("failed to decode response from {}: {}", url, source))]
    Decode { url: String, source: reqwest::Error },

    #[snafu(display("PD reported no stores"))]
    NoStores,
}

/// Store listing returned by `GET /pd/api/v1/stores`.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct StoresInfo {
    #[serde(default)]
    pub count: usize,

    #[serde(default)]
    pub stores: Vec<StoreInfo>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct StoreInfo {
    #[serde(default)]
    pub store: Option<MetaStore>,

    #[serde(default)]
    pub status: StoreStatus,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct MetaStore {
    #[serde(default)]
    pub id: u64,

    #[serde(default)]
    pub address: String,

    #[serde(default)]
    pub state_name: String,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct StoreStatus {
    #[serde(default, deserialize_with = "deserialize_byte_size")]
    pub capacity: u64,

    #[serde(default, deserialize_with = "deserialize_byte_size")]
    pub available: u64,
}

impl StoresInfo {
    /// Bytes in use on the first reported store, `capacity - available`.
    pub fn used_size(&self) -> Result<i128, Error> {
        let first = self.stores.first().context(NoStoresSnafu)?;
        Ok(i128::from(first.status.capacity) - i128::from(first.status.available))
    }
}

/// Parses a PD byte size such as `"1.5TiB"`, `"512MB"` or `"1024"`.
///
/// Units are binary and case-insensitive, `KB` and `KiB` both mean 1024 bytes.
pub fn parse_byte_size(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(raw.len());
    let (number, unit) = raw.split_at(split);

    let number: f64 = number.parse().ok()?;
    let shift = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 0,
        "k" | "kb" | "kib" => 10,
        "m" | "mb" | "mib" => 20,
        "g" | "gb" | "gib" => 30,
        "t" | "tb" | "tib" => 40,
        "p" | "pb" | "pib" => 50,
        _ => return None,
    };

    Some((number * (1u64 << shift) as f64) as u64)
}

fn deserialize_byte_size<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => parse_byte_size(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid byte size '{s}'"))),
    }
}

/// Source of cluster health samples.
#[async_trait]
pub trait PdClient: Send + Sync {
    async fn get_stores(&self, tc: &TidbCluster) -> Result<StoresInfo, Error>;
}

pub struct HttpPdClient {
    http: reqwest::Client,
}

impl HttpPdClient {
    pub fn new(timeout: Duration) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context(BuildSnafu)?;
        Ok(Self { http })
    }

    pub async fn get_stores_from(&self, base_url: &str) -> Result<StoresInfo, Error> {
        let url = format!("{}/{}", base_url.trim_end_matches('/'), STORES_PREFIX);
        debug!("querying PD stores from {}", url);

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .context(RequestSnafu { url: url.clone() })?;

        let status = resp.status();
        ensure!(
            status.is_success(),
            StatusSnafu {
                url: url.clone(),
                status: status.as_u16()
            }
        );

        resp.json::<StoresInfo>().await.context(DecodeSnafu { url })
    }
}

#[async_trait]
impl PdClient for HttpPdClient {
    async fn get_stores(&self, tc: &TidbCluster) -> Result<StoresInfo, Error> {
        self.get_stores_from(&tc.pd_url()?).await
    }
}
