// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2026 Photon Contributors

//! The pluggable runtime backend.
//!
//! The backend performs chunk registration, loading, unloading and reload
//! against whatever transport the hosting environment provides (HTTP,
//! worker messaging, a websocket for HMR). It is injected at runtime
//! construction, so transports are swappable without touching the core.

use crate::error::Result;
use crate::id::ChunkPath;
use crate::runtime::{ChunkRegistration, DevRuntime, DevRuntimeParams};
use async_trait::async_trait;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::debug;

/// Transport-level operations the runtime delegates to.
#[async_trait(?Send)]
pub trait RuntimeBackend {
    /// Called synchronously after a chunk's factories have been merged into
    /// the registry. Responsible for any further bookkeeping, in particular
    /// instantiating the runtime roots declared in `params` through
    /// [`DevRuntime::get_or_instantiate_runtime_module`].
    fn register_chunk(
        &self,
        runtime: &DevRuntime,
        chunk_path: &ChunkPath,
        params: Option<&DevRuntimeParams>,
    ) -> Result<()>;

    /// Fetches and evaluates the chunk's code so that
    /// [`DevRuntime::register_chunk`] is subsequently invoked for it.
    async fn load_chunk(&self, runtime: DevRuntime, chunk_path: ChunkPath) -> anyhow::Result<()>;

    /// HMR-only: re-fetches and re-applies a chunk in place.
    async fn reload_chunk(&self, runtime: DevRuntime, chunk_path: ChunkPath) -> anyhow::Result<()> {
        let _ = runtime;
        anyhow::bail!("this backend does not support reloading chunk {chunk_path}")
    }

    /// HMR-only: releases a chunk's resources.
    fn unload_chunk(&self, runtime: &DevRuntime, chunk_path: &ChunkPath) {
        let _ = (runtime, chunk_path);
    }

    /// Signals that partial HMR reconciliation is impossible and the whole
    /// execution context must be torn down and restarted.
    fn restart(&self);
}

#[derive(Default)]
struct MemoryBackendState {
    chunks: RefCell<HashMap<ChunkPath, ChunkRegistration>>,
    loads: RefCell<Vec<ChunkPath>>,
    reloads: RefCell<Vec<ChunkPath>>,
    unloads: RefCell<Vec<ChunkPath>>,
    restarts: Cell<usize>,
}

/// An in-process backend holding prepared chunk registrations.
///
/// `load_chunk` applies the registration prepared for the requested path,
/// and `register_chunk` instantiates declared runtime roots. Every
/// transport operation is logged, which makes the backend double as a test
/// double for the de-duplication guarantees. Cloning shares the underlying
/// state.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Rc<MemoryBackendState>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepares `registration` to be applied when its chunk is loaded.
    pub fn add_chunk(&self, registration: ChunkRegistration) {
        self.state
            .chunks
            .borrow_mut()
            .insert(registration.path.clone(), registration);
    }

    /// The chunks fetched through this backend, in order.
    pub fn loads(&self) -> Vec<ChunkPath> {
        self.state.loads.borrow().clone()
    }

    /// The chunks reloaded through this backend, in order.
    pub fn reloads(&self) -> Vec<ChunkPath> {
        self.state.reloads.borrow().clone()
    }

    /// The chunks unloaded through this backend, in order.
    pub fn unloads(&self) -> Vec<ChunkPath> {
        self.state.unloads.borrow().clone()
    }

    /// How many times a full restart was requested.
    pub fn restarts(&self) -> usize {
        self.state.restarts.get()
    }

    fn registration(&self, chunk_path: &ChunkPath) -> anyhow::Result<ChunkRegistration> {
        self.state
            .chunks
            .borrow()
            .get(chunk_path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("chunk {chunk_path} is not present in the backend"))
    }
}

#[async_trait(?Send)]
impl RuntimeBackend for MemoryBackend {
    fn register_chunk(
        &self,
        runtime: &DevRuntime,
        chunk_path: &ChunkPath,
        params: Option<&DevRuntimeParams>,
    ) -> Result<()> {
        if let Some(params) = params {
            for id in &params.runtime_module_ids {
                runtime.get_or_instantiate_runtime_module(id, chunk_path)?;
            }
        }
        Ok(())
    }

    async fn load_chunk(&self, runtime: DevRuntime, chunk_path: ChunkPath) -> anyhow::Result<()> {
        let registration = self.registration(&chunk_path)?;
        self.state.loads.borrow_mut().push(chunk_path.clone());
        debug!(chunk = %chunk_path, "applying prepared chunk registration");
        runtime.register_chunk(registration)?;
        Ok(())
    }

    async fn reload_chunk(&self, runtime: DevRuntime, chunk_path: ChunkPath) -> anyhow::Result<()> {
        let registration = self.registration(&chunk_path)?;
        self.state.reloads.borrow_mut().push(chunk_path.clone());
        runtime.register_chunk(registration)?;
        Ok(())
    }

    fn unload_chunk(&self, _runtime: &DevRuntime, chunk_path: &ChunkPath) {
        self.state.unloads.borrow_mut().push(chunk_path.clone());
    }

    fn restart(&self) {
        self.state.restarts.set(self.state.restarts.get() + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::ModuleId;

    #[test]
    fn test_memory_backend_applies_prepared_registration() {
        let backend = MemoryBackend::new();
        let runtime = DevRuntime::new(backend.clone());

        backend.add_chunk(
            ChunkRegistration::new("chunk-a.js").module(ModuleId::Num(1), |_ctx| Ok(())),
        );

        futures::executor::block_on(
            backend.load_chunk(runtime.clone(), ChunkPath::from("chunk-a.js")),
        )
        .unwrap();

        assert!(runtime.has_module_factory(&ModuleId::Num(1)));
        assert_eq!(backend.loads(), vec![ChunkPath::from("chunk-a.js")]);
    }

    #[test]
    fn test_memory_backend_rejects_unknown_chunk() {
        let backend = MemoryBackend::new();
        let runtime = DevRuntime::new(backend.clone());
        let err = futures::executor::block_on(
            backend.load_chunk(runtime, ChunkPath::from("missing.js")),
        )
        .unwrap_err();
        assert!(err.to_string().contains("missing.js"));
    }
}
