// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2026 Photon Contributors

//! # photon-runtime
//!
//! The development-mode module runtime of the Photon bundler: it lazily
//! loads code chunks through a pluggable backend, instantiates modules from
//! factory functions, tracks the live module dependency graph, and supports
//! hot-module-replacement (HMR) by adding and removing modules and chunks
//! without tearing the whole execution context down unless it has to.
//!
//! The runtime is single-threaded and cooperative: concurrency is expressed
//! through interleaved asynchronous continuations, and the only suspension
//! points are chunk fetches. Module factories run synchronously from entry
//! to return, which is what makes circular requires resolvable.
//!
//! ## Quick Start
//!
//! ```rust
//! use photon_runtime::{ChunkRegistration, DevRuntime, MemoryBackend};
//!
//! let backend = MemoryBackend::new();
//! let runtime = DevRuntime::new(backend.clone());
//!
//! runtime
//!     .register_chunk(
//!         ChunkRegistration::new("static/chunks/main.js")
//!             .module(1u64, |ctx| {
//!                 ctx.export_value("answer", 42.0);
//!                 Ok(())
//!             })
//!             .runtime_module(1u64),
//!     )
//!     .unwrap();
//! ```
//!
//! Hosts supply the transport by implementing [`RuntimeBackend`]; the
//! [`MemoryBackend`] keeps prepared chunk registrations in memory and is
//! what the test-suite (and embedders without a network) use.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod backend;
pub mod error;
mod graph;
mod id;
mod instantiate;
mod loader;
mod registry;
mod runtime;
mod source;
mod value;

// Re-exports
pub use backend::{MemoryBackend, RuntimeBackend};
pub use error::{Result, RuntimeError};
pub use id::{ChunkListPath, ChunkPath, ModuleId};
pub use instantiate::ModuleContext;
pub use loader::{ChunkContents, ChunkData};
pub use registry::{Module, ModuleFactory};
pub use runtime::{
    ChunkListRegistration, ChunkListSource, ChunkRegistration, DevRuntime, DevRuntimeParams,
    RuntimeOptions,
};
pub use source::SourceInfo;
pub use value::{ObjectRef, Value, new_object};

/// Version of the photon runtime
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
