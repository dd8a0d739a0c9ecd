// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2026 Photon Contributors

//! The development-mode module runtime instance.
//!
//! A [`DevRuntime`] owns the module registry, the chunk graph, the loader
//! state and the shared globals of one execution context. It is a cheap
//! `Clone` handle; clones share state. Independent instances share nothing,
//! so tests can run several side by side.
//!
//! All operations execute on one logical thread of control. Concurrency is
//! expressed purely through interleaved asynchronous continuations;
//! suspension occurs only at chunk-fetch boundaries inside the loader.

use crate::backend::RuntimeBackend;
use crate::error::{Result, RuntimeError};
use crate::graph::ChunkGraph;
use crate::id::{ChunkListPath, ChunkPath, ModuleId};
use crate::instantiate::ModuleContext;
use crate::loader::LoaderState;
use crate::registry::{Module, ModuleFactory, ModuleRegistry};
use crate::source::SourceInfo;
use crate::value::{ObjectRef, new_object};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Configuration for a runtime instance.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Prefix prepended by [`DevRuntime::resolve_asset`].
    pub asset_prefix: String,
    /// Base path prepended by [`DevRuntime::resolve_chunk`]. Backends use
    /// the resolved form as their fetch URL or file path.
    pub chunk_base_path: String,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            asset_prefix: "/".to_string(),
            chunk_base_path: "/".to_string(),
        }
    }
}

impl RuntimeOptions {
    /// Sets the asset prefix.
    pub fn asset_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.asset_prefix = prefix.into();
        self
    }

    /// Sets the chunk base path.
    pub fn chunk_base_path(mut self, base: impl Into<String>) -> Self {
        self.chunk_base_path = base.into();
        self
    }
}

/// Development-only chunk metadata delegated to the backend's registration
/// hook.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevRuntimeParams {
    /// Module ids constituting the chunk's own runtime roots
    #[serde(default)]
    pub runtime_module_ids: Vec<ModuleId>,
}

/// A chunk registration event: the chunk's path, its module factories, and
/// optional development-only metadata.
#[derive(Clone)]
pub struct ChunkRegistration {
    /// The chunk being registered
    pub path: ChunkPath,
    /// `(module id, factory)` pairs the chunk carries
    pub modules: Vec<(ModuleId, ModuleFactory)>,
    /// Development-only metadata handed to the backend
    pub params: Option<DevRuntimeParams>,
}

impl ChunkRegistration {
    /// Starts a registration for `path` with no modules.
    pub fn new(path: impl Into<ChunkPath>) -> Self {
        Self {
            path: path.into(),
            modules: Vec::new(),
            params: None,
        }
    }

    /// Adds a module factory to the registration.
    pub fn module(
        mut self,
        id: impl Into<ModuleId>,
        factory: impl Fn(&mut ModuleContext) -> anyhow::Result<()> + 'static,
    ) -> Self {
        self.modules.push((id.into(), Rc::new(factory)));
        self
    }

    /// Declares `id` as one of the chunk's runtime roots.
    pub fn runtime_module(mut self, id: impl Into<ModuleId>) -> Self {
        self.params
            .get_or_insert_with(DevRuntimeParams::default)
            .runtime_module_ids
            .push(id.into());
        self
    }
}

/// Where a chunk list comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkListSource {
    /// The list belongs to an entry point and contains a runtime.
    Entry,
    /// The list belongs to a dynamic import group.
    #[default]
    Dynamic,
}

/// A chunk list registration event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkListRegistration {
    /// The chunk list's path
    pub path: ChunkListPath,
    /// The chunks the list contains
    pub chunks: Vec<ChunkPath>,
    /// Entry lists are flagged as runtime chunk lists
    #[serde(default)]
    pub source: ChunkListSource,
}

pub(crate) struct RuntimeInner {
    pub(crate) registry: RefCell<ModuleRegistry>,
    pub(crate) graph: RefCell<ChunkGraph>,
    pub(crate) loader: RefCell<LoaderState>,
    pub(crate) runtime_modules: RefCell<HashSet<ModuleId>>,
    globals: ObjectRef,
    options: RuntimeOptions,
    backend: Box<dyn RuntimeBackend>,
}

/// A development-mode module runtime instance.
#[derive(Clone)]
pub struct DevRuntime {
    pub(crate) inner: Rc<RuntimeInner>,
}

impl DevRuntime {
    /// Creates a runtime with default options.
    pub fn new(backend: impl RuntimeBackend + 'static) -> Self {
        Self::with_options(backend, RuntimeOptions::default())
    }

    /// Creates a runtime with the given options.
    pub fn with_options(backend: impl RuntimeBackend + 'static, options: RuntimeOptions) -> Self {
        Self {
            inner: Rc::new(RuntimeInner {
                registry: RefCell::new(ModuleRegistry::default()),
                graph: RefCell::new(ChunkGraph::default()),
                loader: RefCell::new(LoaderState::default()),
                runtime_modules: RefCell::new(HashSet::new()),
                globals: new_object(),
                options,
                backend: Box::new(backend),
            }),
        }
    }

    pub(crate) fn backend(&self) -> &dyn RuntimeBackend {
        &*self.inner.backend
    }

    /// The shared global environment of this instance.
    pub fn globals(&self) -> ObjectRef {
        self.inner.globals.clone()
    }

    /// Resolves an asset path against the configured asset prefix.
    pub fn resolve_asset(&self, path: &str) -> String {
        format!("{}{}", self.inner.options.asset_prefix, path)
    }

    /// Resolves a chunk path against the configured chunk base path.
    pub fn resolve_chunk(&self, chunk_path: &ChunkPath) -> String {
        format!("{}{}", self.inner.options.chunk_base_path, chunk_path)
    }

    /// Processes a chunk registration event.
    ///
    /// Each factory is installed only if none exists yet for its id
    /// (first-registration-wins, so chunks declaring an overlapping shared
    /// module never clobber each other), while the module↔chunk membership
    /// edge is recorded unconditionally. Development metadata is then
    /// delegated to the backend's registration hook, which instantiates the
    /// declared runtime roots.
    pub fn register_chunk(&self, registration: ChunkRegistration) -> Result<()> {
        debug!(
            chunk = %registration.path,
            modules = registration.modules.len(),
            "registering chunk"
        );
        {
            let mut registry = self.inner.registry.borrow_mut();
            let mut graph = self.inner.graph.borrow_mut();
            for (id, factory) in &registration.modules {
                if !registry.register_factory(id.clone(), factory.clone()) {
                    trace!(module = %id, "factory already registered, keeping the first");
                }
                graph.add_module_to_chunk(id, &registration.path);
            }
        }
        self.inner
            .backend
            .register_chunk(self, &registration.path, registration.params.as_ref())
    }

    /// Processes a chunk list registration event, installing the list↔chunk
    /// edges and flagging entry lists as runtime chunk lists.
    pub fn register_chunk_list(&self, registration: &ChunkListRegistration) {
        debug!(
            chunk_list = %registration.path,
            chunks = registration.chunks.len(),
            "registering chunk list"
        );
        let mut graph = self.inner.graph.borrow_mut();
        for chunk in &registration.chunks {
            graph.add_chunk_to_list(chunk, &registration.path);
        }
        if registration.source == ChunkListSource::Entry {
            graph.mark_runtime_chunk_list(&registration.path);
        }
    }

    /// The cached module record for `id`, if instantiated.
    pub fn module(&self, id: &ModuleId) -> Option<Rc<RefCell<Module>>> {
        self.inner.registry.borrow().cached_module(id)
    }

    /// Whether a factory is registered for `id`.
    pub fn has_module_factory(&self, id: &ModuleId) -> bool {
        self.inner.registry.borrow().has_factory(id)
    }

    /// Whether `id` was instantiated as a chunk's runtime entry. Runtime
    /// modules are never disposed by dependency-graph pruning.
    pub fn is_runtime_module(&self, id: &ModuleId) -> bool {
        self.inner.runtime_modules.borrow().contains(id)
    }

    /// An arbitrary but deterministic chunk containing `id`, for reporting.
    pub fn first_chunk(&self, id: &ModuleId) -> Option<ChunkPath> {
        self.inner.graph.borrow().first_chunk(id)
    }

    /// Records that `chunk_path` contains `id`. Idempotent.
    pub fn add_module_to_chunk(&self, id: &ModuleId, chunk_path: &ChunkPath) {
        self.inner.graph.borrow_mut().add_module_to_chunk(id, chunk_path);
    }

    /// Removes the membership of `id` in `chunk_path`.
    ///
    /// Returns true iff no chunk references the module afterwards; in that
    /// case its cache entry is evicted (unless it is a runtime module), so
    /// a later instantiation starts from an empty history. Calling this for
    /// a pair that was never added is a caller bug and panics.
    pub fn remove_module_from_chunk(&self, id: &ModuleId, chunk_path: &ChunkPath) -> bool {
        let orphaned = self
            .inner
            .graph
            .borrow_mut()
            .remove_module_from_chunk(id, chunk_path);
        if orphaned {
            let is_runtime = self.inner.runtime_modules.borrow().contains(id);
            if !is_runtime {
                self.dispose_module(id);
            }
        }
        orphaned
    }

    /// Flags `list_path` as containing a runtime entry.
    pub fn mark_runtime_chunk_list(&self, list_path: &ChunkListPath) {
        self.inner.graph.borrow_mut().mark_runtime_chunk_list(list_path);
    }

    /// Evicts the cached module for `id` and unlinks it from its children's
    /// parent lists. Returns whether a record was evicted.
    pub fn dispose_module(&self, id: &ModuleId) -> bool {
        let evicted = self.inner.registry.borrow_mut().evict(id);
        let Some(module) = evicted else {
            return false;
        };
        debug!(module = %id, "disposing module");
        let children = module.borrow().children.clone();
        for child_id in &children {
            let child = self.inner.registry.borrow().cached_module(child_id);
            if let Some(child) = child {
                if !Rc::ptr_eq(&child, &module) {
                    child.borrow_mut().parents.retain(|parent| parent != id);
                }
            }
        }
        self.inner.runtime_modules.borrow_mut().remove(id);
        self.inner.loader.borrow_mut().available_modules.remove(id);
        true
    }

    /// Removes a chunk and everything only it provided: every contained
    /// module loses its membership, modules left in zero chunks are
    /// disposed and their factories dropped (runtime modules exempt), and
    /// the backend is asked to release the chunk's resources.
    pub fn remove_chunk(&self, chunk_path: &ChunkPath) {
        debug!(chunk = %chunk_path, "removing chunk");
        let modules = self.inner.graph.borrow().modules_in_chunk(chunk_path);
        for id in modules {
            let orphaned = self
                .inner
                .graph
                .borrow_mut()
                .remove_module_from_chunk(&id, chunk_path);
            if orphaned {
                let is_runtime = self.inner.runtime_modules.borrow().contains(&id);
                if !is_runtime {
                    self.dispose_module(&id);
                    self.inner.registry.borrow_mut().remove_factory(&id);
                }
            }
        }
        self.inner.graph.borrow_mut().remove_chunk(chunk_path);
        self.inner
            .loader
            .borrow_mut()
            .available_module_chunks
            .remove(chunk_path);
        self.inner.backend.unload_chunk(self, chunk_path);
    }

    /// Removes a chunk list and returns the chunks that belong to no list
    /// afterwards. The caller decides whether to remove those chunks.
    pub fn remove_chunk_list(&self, list_path: &ChunkListPath) -> Vec<ChunkPath> {
        self.inner.graph.borrow_mut().remove_chunk_list(list_path)
    }

    /// Applies an HMR update to a chunk list.
    ///
    /// An update touching a list flagged as a runtime chunk list cannot be
    /// reconciled partially; the backend is told to restart and `true` is
    /// returned. Otherwise every member chunk is reloaded in place and
    /// `false` is returned.
    pub async fn update_chunk_list(&self, list_path: &ChunkListPath) -> Result<bool> {
        let is_runtime = self.inner.graph.borrow().is_runtime_chunk_list(list_path);
        if is_runtime {
            warn!(chunk_list = %list_path, "update touches a runtime chunk list, restarting");
            self.inner.backend.restart();
            return Ok(true);
        }
        let chunks = self.inner.graph.borrow().chunks_in_list(list_path);
        let reason = SourceInfo::Update { parents: None };
        for chunk in chunks {
            debug!(chunk = %chunk, "reloading chunk");
            self.inner
                .backend
                .reload_chunk(self.clone(), chunk.clone())
                .await
                .map_err(|cause| RuntimeError::ChunkLoad {
                    chunk,
                    reason: reason.load_reason(),
                    cause: Arc::new(cause),
                })?;
        }
        Ok(false)
    }

    /// Re-instantiates `id` after an HMR update, carrying over the parents
    /// of the replaced record when one exists.
    pub fn reinstantiate_module(&self, id: &ModuleId) -> Result<Rc<RefCell<Module>>> {
        let parents = self
            .inner
            .registry
            .borrow()
            .cached_module(id)
            .map(|module| module.borrow().parents.clone());
        if parents.is_some() {
            self.dispose_module(id);
        }
        self.instantiate_module(id, SourceInfo::Update { parents })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::value::Value;
    use std::cell::Cell;

    fn runtime() -> (DevRuntime, MemoryBackend) {
        let backend = MemoryBackend::new();
        let runtime = DevRuntime::new(backend.clone());
        (runtime, backend)
    }

    #[test]
    fn test_runtime_roots_record_edges() {
        let (runtime, _backend) = runtime();

        runtime
            .register_chunk(
                ChunkRegistration::new("chunk-a.js")
                    .module(1u64, |ctx| {
                        let two = ctx.require(2u64)?;
                        ctx.export_value("doubled", two.borrow().get("value").cloned().unwrap_or_default());
                        Ok(())
                    })
                    .module(2u64, |ctx| {
                        ctx.export_value("value", 21.0);
                        Ok(())
                    })
                    .runtime_module(1u64),
            )
            .unwrap();

        let one = runtime.module(&ModuleId::Num(1)).unwrap();
        let two = runtime.module(&ModuleId::Num(2)).unwrap();
        assert_eq!(one.borrow().children, vec![ModuleId::Num(2)]);
        assert_eq!(two.borrow().parents, vec![ModuleId::Num(1)]);
        assert!(one.borrow().loaded);
        assert!(runtime.is_runtime_module(&ModuleId::Num(1)));
        assert!(!runtime.is_runtime_module(&ModuleId::Num(2)));
        assert_eq!(
            one.borrow().exports.borrow().get("doubled"),
            Some(&Value::Number(21.0))
        );
    }

    #[test]
    fn test_register_then_remove_last_chunk() {
        let (runtime, _backend) = runtime();
        runtime
            .register_chunk(ChunkRegistration::new("chunk-a.js").module(1u64, |ctx| {
                ctx.export_value("ok", true);
                Ok(())
            }))
            .unwrap();

        assert!(runtime.remove_module_from_chunk(&ModuleId::Num(1), &"chunk-a.js".into()));

        // Adding the module back makes it reappear with an empty history.
        runtime.add_module_to_chunk(&ModuleId::Num(1), &"chunk-a.js".into());
        assert_eq!(
            runtime.first_chunk(&ModuleId::Num(1)),
            Some("chunk-a.js".into())
        );
    }

    #[test]
    fn test_remove_last_chunk_evicts_cached_record() {
        let (runtime, _backend) = runtime();
        runtime
            .register_chunk(ChunkRegistration::new("chunk-a.js").module(1u64, |ctx| {
                ctx.export_value("ok", true);
                Ok(())
            }))
            .unwrap();
        // Cache the module without making it a runtime root.
        runtime.reinstantiate_module(&ModuleId::Num(1)).unwrap();
        assert!(runtime.module(&ModuleId::Num(1)).is_some());

        assert!(runtime.remove_module_from_chunk(&ModuleId::Num(1), &"chunk-a.js".into()));
        assert!(runtime.module(&ModuleId::Num(1)).is_none());
    }

    #[test]
    fn test_sticky_factory_error() {
        let (runtime, _backend) = runtime();
        let runs = Rc::new(Cell::new(0u32));
        let counter = runs.clone();
        runtime
            .register_chunk(ChunkRegistration::new("chunk-a.js").module(1u64, move |_ctx| {
                counter.set(counter.get() + 1);
                anyhow::bail!("boom")
            }))
            .unwrap();

        let chunk = ChunkPath::from("chunk-a.js");
        let first = runtime
            .get_or_instantiate_runtime_module(&ModuleId::Num(1), &chunk)
            .unwrap_err();
        let second = runtime
            .get_or_instantiate_runtime_module(&ModuleId::Num(1), &chunk)
            .unwrap_err();

        assert_eq!(runs.get(), 1);
        assert_eq!(first.to_string(), second.to_string());
        assert!(first.to_string().contains("boom"));

        let module = runtime.module(&ModuleId::Num(1)).unwrap();
        assert!(!module.borrow().loaded);
    }

    #[test]
    fn test_circular_requires_observe_live_exports() {
        let (runtime, _backend) = runtime();
        let seen_by_b: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let held_by_b: Rc<RefCell<Option<crate::value::ObjectRef>>> =
            Rc::new(RefCell::new(None));
        let seen = seen_by_b.clone();
        let held = held_by_b.clone();
        runtime
            .register_chunk(
                ChunkRegistration::new("chunk-a.js")
                    .module("a", |ctx| {
                        ctx.export_value("early", 1.0);
                        let b = ctx.require("b")?;
                        ctx.export_value("late", 2.0);
                        assert_eq!(b.borrow().get("from_b"), Some(&Value::Number(3.0)));
                        Ok(())
                    })
                    .module("b", move |ctx| {
                        // Requiring "a" mid-instantiation returns its
                        // partially-populated exports.
                        let a = ctx.require("a")?;
                        seen.borrow_mut()
                            .extend(a.borrow().keys().cloned());
                        *held.borrow_mut() = Some(a);
                        ctx.export_value("from_b", 3.0);
                        Ok(())
                    })
                    .runtime_module("a"),
            )
            .unwrap();

        // Mid-cycle, b saw only the exports a had written so far.
        assert_eq!(*seen_by_b.borrow(), vec!["early".to_string()]);
        // The exports object aliases live storage: a's later write is
        // visible through the reference b held onto.
        let held = held_by_b.borrow();
        let a_exports = held.as_ref().unwrap();
        assert_eq!(a_exports.borrow().get("late"), Some(&Value::Number(2.0)));

        let a = runtime.module(&"a".into()).unwrap();
        let a = a.borrow();
        assert!(a.loaded);
        assert_eq!(a.children, vec![ModuleId::from("b")]);
        assert_eq!(a.parents, vec![ModuleId::from("b")]);
        let b = runtime.module(&"b".into()).unwrap();
        assert_eq!(b.borrow().parents, vec![ModuleId::from("a")]);
    }

    #[test]
    fn test_missing_factory_is_fatal_with_reason() {
        let (runtime, _backend) = runtime();
        let err = runtime
            .instantiate_runtime_module(&ModuleId::Num(9), &"main.js".into())
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("module 9"));
        assert!(msg.contains("as a runtime entry of chunk main.js"));
    }

    #[test]
    fn test_reinstantiate_carries_parents() {
        let (runtime, _backend) = runtime();
        runtime
            .register_chunk(
                ChunkRegistration::new("chunk-a.js")
                    .module(1u64, |ctx| {
                        ctx.require(2u64)?;
                        Ok(())
                    })
                    .module(2u64, |ctx| {
                        ctx.export_value("gen", 1.0);
                        Ok(())
                    })
                    .runtime_module(1u64),
            )
            .unwrap();

        let replaced = runtime.reinstantiate_module(&ModuleId::Num(2)).unwrap();
        assert_eq!(replaced.borrow().parents, vec![ModuleId::Num(1)]);
        // A fresh record, not the old one.
        assert!(replaced.borrow().children.is_empty());
    }

    #[test]
    fn test_update_runtime_chunk_list_restarts() {
        let (runtime, backend) = runtime();
        runtime.register_chunk_list(&ChunkListRegistration {
            path: "entry.list".into(),
            chunks: vec!["chunk-a.js".into()],
            source: ChunkListSource::Entry,
        });

        let restarted =
            futures::executor::block_on(runtime.update_chunk_list(&"entry.list".into())).unwrap();
        assert!(restarted);
        assert_eq!(backend.restarts(), 1);
        assert!(backend.reloads().is_empty());
    }

    #[test]
    fn test_update_dynamic_chunk_list_reloads_members() {
        let (runtime, backend) = runtime();
        backend.add_chunk(ChunkRegistration::new("lazy.js").module(5u64, |_ctx| Ok(())));
        runtime.register_chunk_list(&ChunkListRegistration {
            path: "lazy.list".into(),
            chunks: vec!["lazy.js".into()],
            source: ChunkListSource::Dynamic,
        });

        let restarted =
            futures::executor::block_on(runtime.update_chunk_list(&"lazy.list".into())).unwrap();
        assert!(!restarted);
        assert_eq!(backend.reloads(), vec![ChunkPath::from("lazy.js")]);
        assert_eq!(backend.restarts(), 0);
    }

    #[test]
    fn test_remove_chunk_disposes_orphaned_modules() {
        let (runtime, backend) = runtime();
        runtime
            .register_chunk(
                ChunkRegistration::new("chunk-a.js")
                    .module(1u64, |ctx| {
                        ctx.require(2u64)?;
                        Ok(())
                    })
                    .module(2u64, |_ctx| Ok(()))
                    .runtime_module(1u64),
            )
            .unwrap();
        runtime
            .register_chunk(ChunkRegistration::new("chunk-b.js").module(2u64, |_ctx| Ok(())))
            .unwrap();

        runtime.remove_chunk(&"chunk-a.js".into());

        // Module 2 survives: chunk-b still contains it.
        assert!(runtime.module(&ModuleId::Num(2)).is_some());
        // Module 1 is a runtime module, so it is exempt from pruning even
        // though no chunk contains it anymore.
        assert!(runtime.module(&ModuleId::Num(1)).is_some());
        assert_eq!(backend.unloads(), vec![ChunkPath::from("chunk-a.js")]);
    }

    #[test]
    fn test_resolve_asset_uses_prefix() {
        let backend = MemoryBackend::new();
        let runtime = DevRuntime::with_options(
            backend,
            RuntimeOptions::default()
                .asset_prefix("/_photon/assets/")
                .chunk_base_path("/_photon/chunks/"),
        );
        assert_eq!(
            runtime.resolve_asset("logo.svg"),
            "/_photon/assets/logo.svg"
        );
        assert_eq!(
            runtime.resolve_chunk(&"main.js".into()),
            "/_photon/chunks/main.js"
        );
    }

    #[test]
    fn test_instances_are_independent() {
        let (first, _b1) = runtime();
        let (second, _b2) = runtime();
        first
            .register_chunk(ChunkRegistration::new("chunk-a.js").module(1u64, |_ctx| Ok(())))
            .unwrap();
        assert!(first.has_module_factory(&ModuleId::Num(1)));
        assert!(!second.has_module_factory(&ModuleId::Num(1)));
    }
}
