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

//! `namespace/name` keys identifying objects in the work queue.

use kube::{Resource, ResourceExt};
use snafu::{Snafu, ensure};

#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum Error {
    #[snafu(display("object has no name"))]
    MissingName,

    #[snafu(display("unexpected key format: {:?}", key))]
    MalformedKey { key: String },
}

/// Key of `obj`: `namespace/name`, or just `name` for cluster scoped objects.
pub fn meta_namespace_key<K: Resource>(obj: &K) -> Result<String, Error> {
    let name = obj.meta().name.as_deref().unwrap_or_default();
    ensure!(!name.is_empty(), MissingNameSnafu);

    match obj.namespace() {
        Some(ns) if !ns.is_empty() => Ok(format!("{ns}/{name}")),
        _ => Ok(name.to_owned()),
    }
}

/// Splits a key made by [`meta_namespace_key`] back into `(namespace, name)`.
/// The namespace is empty for cluster scoped keys.
pub fn split_meta_namespace_key(key: &str) -> Result<(String, String), Error> {
    let parts: Vec<&str> = key.split('/').collect();
    let (ns, name) = match parts.as_slice() {
        [name] => ("", *name),
        [ns, name] => (*ns, *name),
        _ => return MalformedKeySnafu { key }.fail(),
    };
    ensure!(!name.is_empty(), MalformedKeySnafu { key });

    Ok((ns.to_owned(), name.to_owned()))
}
