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

use clap::Args;
use std::net::SocketAddr;
use std::time::Duration;

/// Settings of the controller server.
#[derive(Args, Debug, Clone, PartialEq)]
pub struct Config {
    /// Number of YuLongs synced concurrently
    #[arg(long, env = "YULONG_WORKERS", default_value_t = 5, value_parser = clap::value_parser!(u32).range(1..))]
    pub workers: u32,

    /// Only watch this namespace. All namespaces are watched when unset.
    #[arg(long, env = "YULONG_NAMESPACE")]
    pub namespace: Option<String>,

    /// Timeout of a single PD request, in seconds
    #[arg(long, env = "YULONG_PD_TIMEOUT_SECS", default_value_t = 5)]
    pub pd_timeout_secs: u64,

    /// First retry delay of a failed sync, in milliseconds
    #[arg(long, env = "YULONG_BACKOFF_BASE_MS", default_value_t = 1000)]
    pub backoff_base_ms: u64,

    /// Upper bound of the retry delay, in seconds
    #[arg(long, env = "YULONG_BACKOFF_MAX_SECS", default_value_t = 100)]
    pub backoff_max_secs: u64,

    /// Address serving /metrics and /healthz
    #[arg(long, env = "YULONG_METRICS_ADDR", default_value = "0.0.0.0:8080")]
    pub metrics_addr: SocketAddr,
}

impl Config {
    pub fn workers(&self) -> usize {
        self.workers as usize
    }

    pub fn pd_timeout(&self) -> Duration {
        Duration::from_secs(self.pd_timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs(self.backoff_max_secs)
    }
}
