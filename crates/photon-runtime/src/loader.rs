// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2026 Photon Contributors

//! Chunk loading with de-duplication.
//!
//! The loader turns a chunk descriptor into the guarantee that all of its
//! modules and sibling chunks have finished loading, with the minimum number
//! of backend fetches. The `available_modules` / `available_module_chunks`
//! maps are the sole concurrency-control structures: an in-flight load is
//! recorded *before* the first suspension point, so N concurrent requesters
//! of the same resource become one fetch and N waiters. There is no
//! preemption between the availability check and the registration of the
//! in-flight entry (both happen on the single logical thread, before any
//! await), so no locking is needed.

use crate::error::{Result, RuntimeError};
use crate::id::{ChunkPath, ModuleId};
use crate::runtime::DevRuntime;
use crate::source::SourceInfo;
use futures::FutureExt;
use futures::future::{LocalBoxFuture, Shared, try_join_all};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use tracing::{debug, trace};

/// An in-flight chunk load, shareable between any number of waiters.
pub(crate) type SharedLoad = Shared<LocalBoxFuture<'static, Result<()>>>;

/// Whether a module or module chunk is available or still being fetched.
#[derive(Clone)]
pub(crate) enum Availability {
    /// The resource finished loading.
    Ready,
    /// A load is in flight (or has settled); waiters share its outcome.
    Pending(SharedLoad),
}

/// De-duplication state for module and module-chunk loads.
#[derive(Default)]
pub(crate) struct LoaderState {
    pub(crate) available_modules: HashMap<ModuleId, Availability>,
    pub(crate) available_module_chunks: HashMap<ChunkPath, Availability>,
}

/// The outcome of planning one descriptor load: what to wait on, and which
/// availability entries this call inserted. Only the inserted entries may be
/// settled by this call once the waits succeed; entries registered by other
/// callers are settled by their registrars, and entries never registered
/// (a short-circuited fetch) must stay absent so a later genuine load of
/// the same path still fetches it.
#[derive(Default)]
struct ChunkLoadPlan {
    waits: Vec<SharedLoad>,
    chunks: Vec<ChunkPath>,
    modules: Vec<ModuleId>,
}

/// Descriptor of a chunk to load: either a bare path, or a path enriched
/// with the module ids its retrieval will make available and the sibling
/// module chunks known to jointly satisfy them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChunkData {
    /// A bare chunk path.
    Raw(ChunkPath),
    /// A chunk path with availability information.
    WithContents(ChunkContents),
}

impl ChunkData {
    /// The path of the chunk this descriptor names.
    pub fn path(&self) -> &ChunkPath {
        match self {
            ChunkData::Raw(path) => path,
            ChunkData::WithContents(contents) => &contents.path,
        }
    }
}

impl From<&str> for ChunkData {
    fn from(s: &str) -> Self {
        ChunkData::Raw(ChunkPath::from(s))
    }
}

/// The enriched form of [`ChunkData`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkContents {
    /// The chunk's own path
    pub path: ChunkPath,
    /// Module ids that become available once this chunk group has loaded
    #[serde(default)]
    pub included: Vec<ModuleId>,
    /// Sibling chunk paths known to jointly satisfy the included modules
    #[serde(default)]
    pub module_chunks: Vec<ChunkPath>,
}

impl DevRuntime {
    /// Ensures that everything `chunk_data` describes has finished loading,
    /// fetching only what is not already available or in flight.
    pub async fn load_chunk(&self, source: SourceInfo, chunk_data: &ChunkData) -> Result<()> {
        let contents = match chunk_data {
            ChunkData::Raw(path) => return self.load_chunk_path(&source, path).await,
            ChunkData::WithContents(contents) => contents,
        };

        // Every decision and in-flight registration happens before the first
        // await, so concurrent callers observe each other's entries.
        let ChunkLoadPlan {
            waits,
            chunks,
            modules,
        } = self.plan_chunk_load(&source, contents);
        try_join_all(waits).await?;

        let mut loader = self.inner.loader.borrow_mut();
        for chunk in chunks {
            loader
                .available_module_chunks
                .insert(chunk, Availability::Ready);
        }
        for id in modules {
            loader.available_modules.insert(id, Availability::Ready);
        }
        Ok(())
    }

    /// Loads a single chunk by path through the backend, reusing any load
    /// already in flight for it.
    pub async fn load_chunk_path(&self, source: &SourceInfo, chunk_path: &ChunkPath) -> Result<()> {
        let load = {
            let mut loader = self.inner.loader.borrow_mut();
            match loader.available_module_chunks.get(chunk_path) {
                Some(Availability::Ready) => {
                    trace!(chunk = %chunk_path, "chunk already available");
                    return Ok(());
                }
                Some(Availability::Pending(load)) => {
                    trace!(chunk = %chunk_path, "joining in-flight chunk load");
                    load.clone()
                }
                None => {
                    let load = self.chunk_load_future(source, chunk_path);
                    loader
                        .available_module_chunks
                        .insert(chunk_path.clone(), Availability::Pending(load.clone()));
                    load
                }
            }
        };
        load.await?;
        self.inner
            .loader
            .borrow_mut()
            .available_module_chunks
            .insert(chunk_path.clone(), Availability::Ready);
        Ok(())
    }

    /// Decides what to wait on for `contents` and records every new
    /// in-flight entry, reporting exactly the entries it inserted. Never
    /// suspends.
    fn plan_chunk_load(&self, source: &SourceInfo, contents: &ChunkContents) -> ChunkLoadPlan {
        let mut loader = self.inner.loader.borrow_mut();
        let registry = self.inner.registry.borrow();
        let mut plan = ChunkLoadPlan::default();

        // If every included module is already resolvable (factory present,
        // or load in flight/settled), no new fetch is needed. The chunk path
        // itself is deliberately not recorded as available: it was never
        // fetched, and a later genuine load of it must still fetch.
        if !contents.included.is_empty() {
            let mut waits = Vec::new();
            let mut all_available = true;
            for id in &contents.included {
                match loader.available_modules.get(id) {
                    Some(Availability::Ready) => {}
                    Some(Availability::Pending(load)) => waits.push(load.clone()),
                    None if registry.has_factory(id) => {}
                    None => {
                        all_available = false;
                        break;
                    }
                }
            }
            if all_available {
                trace!(chunk = %contents.path, "all included modules already available");
                plan.waits = waits;
                return plan;
            }
        }

        // If sibling module chunks are known and at least one already has an
        // availability entry, fetch exactly the missing siblings.
        if !contents.module_chunks.is_empty() {
            let mut waits = Vec::new();
            let mut missing = Vec::new();
            for chunk in &contents.module_chunks {
                match loader.available_module_chunks.get(chunk) {
                    Some(Availability::Ready) => {}
                    Some(Availability::Pending(load)) => waits.push(load.clone()),
                    None => missing.push(chunk.clone()),
                }
            }
            if missing.len() < contents.module_chunks.len() {
                if missing.is_empty() {
                    plan.waits = waits;
                    return plan;
                }
                for chunk in &missing {
                    let load = self.chunk_load_future(source, chunk);
                    loader
                        .available_module_chunks
                        .insert(chunk.clone(), Availability::Pending(load.clone()));
                    plan.chunks.push(chunk.clone());
                    waits.push(load);
                }
                // Included modules resolve when all siblings have.
                let combined = combine_loads(waits.clone());
                for id in &contents.included {
                    if let Entry::Vacant(entry) = loader.available_modules.entry(id.clone()) {
                        entry.insert(Availability::Pending(combined.clone()));
                        plan.modules.push(id.clone());
                    }
                }
                plan.waits = waits;
                return plan;
            }
        }

        // Fall back to fetching the chunk itself; every module and module
        // chunk it includes resolves together with this single load. Reuse a
        // load already in flight for the path instead of issuing another.
        let load = match loader.available_module_chunks.get(&contents.path) {
            Some(Availability::Ready) => {
                trace!(chunk = %contents.path, "chunk already available");
                return plan;
            }
            Some(Availability::Pending(load)) => load.clone(),
            None => {
                let load = self.chunk_load_future(source, &contents.path);
                loader
                    .available_module_chunks
                    .insert(contents.path.clone(), Availability::Pending(load.clone()));
                plan.chunks.push(contents.path.clone());
                load
            }
        };
        for chunk in &contents.module_chunks {
            if let Entry::Vacant(entry) = loader.available_module_chunks.entry(chunk.clone()) {
                entry.insert(Availability::Pending(load.clone()));
                plan.chunks.push(chunk.clone());
            }
        }
        for id in &contents.included {
            if let Entry::Vacant(entry) = loader.available_modules.entry(id.clone()) {
                entry.insert(Availability::Pending(load.clone()));
                plan.modules.push(id.clone());
            }
        }
        plan.waits = vec![load];
        plan
    }

    /// Builds the shared future that fetches `chunk_path` through the
    /// backend, wrapping failure with the reason this load was requested.
    fn chunk_load_future(&self, source: &SourceInfo, chunk_path: &ChunkPath) -> SharedLoad {
        let runtime = self.clone();
        let reason = source.load_reason();
        let chunk_path = chunk_path.clone();
        debug!(chunk = %chunk_path, %reason, "fetching chunk");
        async move {
            runtime
                .backend()
                .load_chunk(runtime.clone(), chunk_path.clone())
                .await
                .map_err(|cause| RuntimeError::chunk_load(chunk_path, reason, cause))
        }
        .boxed_local()
        .shared()
    }
}

/// A load that settles once every constituent load has.
fn combine_loads(loads: Vec<SharedLoad>) -> SharedLoad {
    async move {
        for load in loads {
            load.await?;
        }
        Ok(())
    }
    .boxed_local()
    .shared()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_data_wire_format() {
        let raw: ChunkData = serde_json::from_str("\"static/chunks/a.js\"").unwrap();
        assert_eq!(raw, ChunkData::from("static/chunks/a.js"));

        let rich: ChunkData = serde_json::from_str(
            r#"{"path": "static/chunks/a.js", "included": [1, "app/page"], "moduleChunks": ["static/chunks/b.js"]}"#,
        )
        .unwrap();
        let ChunkData::WithContents(contents) = rich else {
            panic!("expected enriched descriptor");
        };
        assert_eq!(contents.path, ChunkPath::from("static/chunks/a.js"));
        assert_eq!(
            contents.included,
            vec![ModuleId::Num(1), ModuleId::from("app/page")]
        );
        assert_eq!(
            contents.module_chunks,
            vec![ChunkPath::from("static/chunks/b.js")]
        );
    }

    #[test]
    fn test_chunk_data_defaults() {
        let rich: ChunkData = serde_json::from_str(r#"{"path": "a.js"}"#).unwrap();
        let ChunkData::WithContents(contents) = rich else {
            panic!("expected enriched descriptor");
        };
        assert!(contents.included.is_empty());
        assert!(contents.module_chunks.is_empty());
    }
}
