// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2026 Photon Contributors

//! Error types for the development-mode module runtime.

use crate::id::{ChunkPath, ModuleId};
use std::sync::Arc;
use thiserror::Error;

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors that can occur in the module runtime.
///
/// The type is `Clone` (underlying causes are held behind `Arc`) so that a
/// failure recorded on a module, or shared between waiters of one in-flight
/// chunk load, re-surfaces as the same error on every later access.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    /// No factory is registered for a requested module id. This is always a
    /// consistency bug: typically a stale reference to a module deleted by a
    /// prior HMR update. Never retried.
    #[error(
        "module {id} was instantiated {reason}, but the module factory is not available; \
         it might have been deleted in an HMR update"
    )]
    MissingFactory {
        /// The requested module id
        id: ModuleId,
        /// Why instantiation was attempted, derived from the source info
        reason: String,
    },

    /// A module factory failed. Recorded on the module record and rethrown
    /// on every subsequent cache hit without re-executing the factory.
    #[error("factory for module {id} failed: {cause}")]
    Factory {
        /// The module whose factory failed
        id: ModuleId,
        /// The application error raised by the factory
        cause: Arc<anyhow::Error>,
    },

    /// A chunk failed to fetch or register through the backend.
    #[error("failed to load chunk {chunk} {reason}: {cause}")]
    ChunkLoad {
        /// The chunk that failed to load
        chunk: ChunkPath,
        /// Why the chunk was being loaded, derived from the source info
        reason: String,
        /// The underlying backend error
        cause: Arc<anyhow::Error>,
    },
}

impl RuntimeError {
    /// Wraps an application error raised by the factory for `id`.
    pub fn factory(id: ModuleId, cause: anyhow::Error) -> Self {
        Self::Factory {
            id,
            cause: Arc::new(cause),
        }
    }

    /// Wraps a backend failure while loading `chunk`.
    pub fn chunk_load(chunk: ChunkPath, reason: String, cause: anyhow::Error) -> Self {
        Self::ChunkLoad {
            chunk,
            reason,
            cause: Arc::new(cause),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_load_message_carries_reason_and_cause() {
        let err = RuntimeError::chunk_load(
            ChunkPath::from("static/chunks/app.js"),
            "from module 3".to_string(),
            anyhow::anyhow!("connection reset"),
        );
        let msg = err.to_string();
        assert!(msg.contains("static/chunks/app.js"));
        assert!(msg.contains("from module 3"));
        assert!(msg.contains("connection reset"));
    }

    #[test]
    fn test_clone_surfaces_same_failure() {
        let err = RuntimeError::factory(ModuleId::Num(7), anyhow::anyhow!("boom"));
        assert_eq!(err.to_string(), err.clone().to_string());
    }
}
