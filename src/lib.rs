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

use crate::config::Config;
use crate::context::{Context, KubeYuLongStore};
use crate::controller::Controller;
use crate::metrics::Metrics;
use crate::pd::HttpPdClient;
use crate::types::v1alpha1::tidbcluster::TidbCluster;
use crate::types::v1alpha1::yulong::YuLong;
use futures::{StreamExt, future};
use kube::CustomResourceExt;
use kube::runtime::{WatchStreamExt, reflector, watcher};
use kube::{Api, Client};
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

pub mod config;
pub mod context;
pub mod controller;
pub mod event;
pub mod key;
pub mod metrics;
pub mod pd;
pub mod queue;
pub mod reconcile;
pub mod types;

#[cfg(test)]
mod tests;

pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_level(true)
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();

    let client = Client::try_default().await?;
    let (yulong_api, tc_api): (Api<YuLong>, Api<TidbCluster>) = match &config.namespace {
        Some(ns) => (
            Api::namespaced(client.clone(), ns),
            Api::namespaced(client.clone(), ns),
        ),
        None => (Api::all(client.clone()), Api::all(client.clone())),
    };

    let (yulong_reader, yulong_writer) = reflector::store::<YuLong>();
    let (tc_reader, tc_writer) = reflector::store::<TidbCluster>();

    let context = Context::new(
        Arc::new(yulong_reader.clone()),
        Arc::new(tc_reader.clone()),
        Arc::new(KubeYuLongStore::new(client.clone())),
        Arc::new(HttpPdClient::new(config.pd_timeout())?),
    );
    let metrics = Arc::new(Metrics::new()?);
    let controller = Arc::new(Controller::new(
        Arc::new(context),
        metrics.clone(),
        config.backoff_base(),
        config.backoff_max(),
    ));

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    let metrics_addr = config.metrics_addr;
    let metrics_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = metrics::serve(metrics_addr, metrics, metrics_shutdown).await {
            error!("metrics server failed: {}", e);
        }
    });

    // TidbClusters are only cached, changes to them do not trigger a sync
    let tc_watch = tokio::spawn(
        reflector(
            tc_writer,
            watcher(tc_api, watcher::Config::default()).default_backoff(),
        )
        .for_each(|event| {
            if let Err(e) = event {
                warn!("TidbCluster watch error: {}", e);
            }
            future::ready(())
        }),
    );

    let handler = controller.event_handler();
    let yulong_watch = tokio::spawn(
        reflector(
            yulong_writer,
            watcher(yulong_api, watcher::Config::default()).default_backoff(),
        )
        .for_each(move |event| {
            match event {
                Ok(event) => handler.handle(&event),
                Err(e) => warn!("YuLong watch error: {}", e),
            }
            future::ready(())
        }),
    );

    info!("waiting for YuLong and TidbCluster caches to sync");
    tokio::select! {
        ready = async { tokio::try_join!(yulong_reader.wait_until_ready(), tc_reader.wait_until_ready()) } => {
            ready?;
            controller.run(config.workers(), shutdown.clone()).await;
        }
        _ = shutdown.cancelled() => {}
    }

    tc_watch.abort();
    yulong_watch.abort();

    Ok(())
}

async fn wait_for_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("received shutdown signal");
    shutdown.cancel();
}

pub async fn crd(file: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer: Pin<Box<dyn AsyncWrite + Send>> = if let Some(file) = file {
        Box::pin(
            tokio::fs::OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(file)
                .await?,
        )
    } else {
        Box::pin(tokio::io::stdout())
    };

    writer
        .write_all(serde_yaml_ng::to_string(&YuLong::crd())?.as_bytes())
        .await?;
    writer.flush().await?;

    Ok(())
}
