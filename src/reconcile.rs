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

pub mod condition;

use crate::context::Context;
use crate::types::v1alpha1::yulong::YuLong;
use crate::{context, key, pd, types};
use snafu::{OptionExt, ResultExt, Snafu};
use tracing::{debug, error, info};

#[derive(Snafu, Debug)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(transparent)]
    Context { source: context::Error },

    #[snafu(transparent)]
    Types { source: types::error::Error },

    #[snafu(display("TidbCluster {}/{} not found", namespace, name))]
    TidbClusterNotFound { namespace: String, name: String },

    #[snafu(display("failed to get stores of TidbCluster {}/{}: {}", namespace, name, source))]
    Pd {
        namespace: String,
        name: String,
        source: pd::Error,
    },

    /// Not a failure as such, the key needs another pass.
    #[snafu(display("{}", msg))]
    Requeue { msg: String },

    #[snafu(display("{}", join_errors(errors)))]
    Aggregate { errors: Vec<Error> },
}

fn join_errors(errors: &[Error]) -> String {
    match errors {
        [single] => single.to_string(),
        _ => format!(
            "[{}]",
            errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

impl Error {
    /// Folds `errors` into a single result, `Ok` when there are none.
    pub fn aggregate(mut errors: Vec<Error>) -> Result<(), Error> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => AggregateSnafu { errors }.fail(),
        }
    }

    /// Whether this error only signals that the key should be synced again, as opposed
    /// to something having gone wrong.
    pub fn is_requeue(&self) -> bool {
        match self {
            Error::Requeue { .. } => true,
            Error::Aggregate { errors } => errors.iter().any(Error::is_requeue),
            _ => false,
        }
    }
}

/// Syncs the YuLong identified by `key`.
///
/// Malformed keys and YuLongs missing from the cache are not errors: neither gets
/// better by retrying.
pub async fn sync(ctx: &Context, key: &str) -> Result<(), Error> {
    let (ns, name) = match key::split_meta_namespace_key(key) {
        Ok(parts) => parts,
        Err(e) => {
            error!("dropping YuLong key {:?}: {}", key, e);
            return Ok(());
        }
    };

    let Some(cached) = ctx.yulongs.get(&ns, &name) else {
        info!("YuLong has been deleted {}", key);
        return Ok(());
    };

    // work on a copy, the cached object is shared
    update_yulong(ctx, YuLong::clone(&cached)).await
}

pub async fn update_yulong(ctx: &Context, yl: YuLong) -> Result<(), Error> {
    let mut errors = Vec::new();

    if let Err(e) = update_status(ctx, yl).await {
        errors.push(e);
    }

    Error::aggregate(errors)
}

async fn update_status(ctx: &Context, mut yl: YuLong) -> Result<(), Error> {
    let ns = yl.namespace()?;
    let name = yl.name();
    let tc_ns = yl.cluster_namespace()?;
    let tc_name = yl.cluster_name();

    let tc = ctx
        .tidb_clusters
        .get(&tc_ns, &tc_name)
        .context(TidbClusterNotFoundSnafu {
            namespace: tc_ns.clone(),
            name: tc_name.clone(),
        })?;

    let stores = ctx.pd.get_stores(&tc).await.context(PdSnafu {
        namespace: tc_ns.clone(),
        name: tc_name.clone(),
    })?;

    condition::update_ready_condition(&mut yl, &tc);

    let used_size = stores.used_size().context(PdSnafu {
        namespace: tc_ns,
        name: tc_name,
    })?;

    // the cached copy may be stale, only our two fields go onto the latest version
    let mut latest = match ctx.store.get(&ns, &name).await {
        Ok(latest) => latest,
        Err(e) if e.is_not_found() => {
            info!("YuLong {}/{} was deleted before its status could be written", ns, name);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    let status = latest.status.get_or_insert_with(Default::default);
    status.used_size = used_size.to_string();
    status.conditions = yl.status.map(|s| s.conditions).unwrap_or_default();

    match ctx.store.update_status(&latest).await {
        Ok(_) => {
            debug!("updated status of YuLong {}/{}, usedSize {}", ns, name, used_size);
            Ok(())
        }
        Err(e) if e.is_conflict() => RequeueSnafu {
            msg: format!("YuLong {ns}/{name} was modified concurrently: {e}"),
        }
        .fail(),
        Err(e) => Err(e.into()),
    }
}
