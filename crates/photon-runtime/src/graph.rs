// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2026 Photon Contributors

//! Chunk graph tracker.
//!
//! Bidirectional many-to-many maps between modules and the chunks containing
//! them, and between chunk lists and their member chunks. `BTreeSet` keeps
//! iteration order deterministic, which [`ChunkGraph::first_chunk`] relies
//! on.

use crate::id::{ChunkListPath, ChunkPath, ModuleId};
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Default)]
pub(crate) struct ChunkGraph {
    module_chunks: HashMap<ModuleId, BTreeSet<ChunkPath>>,
    chunk_modules: HashMap<ChunkPath, BTreeSet<ModuleId>>,
    list_chunks: HashMap<ChunkListPath, BTreeSet<ChunkPath>>,
    chunk_lists: HashMap<ChunkPath, BTreeSet<ChunkListPath>>,
    runtime_chunk_lists: HashSet<ChunkListPath>,
}

impl ChunkGraph {
    /// Records that `chunk_path` contains `module_id`. Idempotent.
    pub(crate) fn add_module_to_chunk(&mut self, module_id: &ModuleId, chunk_path: &ChunkPath) {
        self.module_chunks
            .entry(module_id.clone())
            .or_default()
            .insert(chunk_path.clone());
        self.chunk_modules
            .entry(chunk_path.clone())
            .or_default()
            .insert(module_id.clone());
    }

    /// Removes the membership of `module_id` in `chunk_path` and returns
    /// true iff no chunk still references the module afterwards.
    ///
    /// The pair must be a member established by a prior
    /// [`ChunkGraph::add_module_to_chunk`]; calling this for a non-member
    /// pair is a bug in the caller and panics.
    pub(crate) fn remove_module_from_chunk(
        &mut self,
        module_id: &ModuleId,
        chunk_path: &ChunkPath,
    ) -> bool {
        let chunks = self
            .module_chunks
            .get_mut(module_id)
            .unwrap_or_else(|| panic!("module {module_id} is not a member of any chunk"));
        if !chunks.remove(chunk_path) {
            panic!("module {module_id} is not a member of chunk {chunk_path}");
        }
        let orphaned = chunks.is_empty();
        if orphaned {
            self.module_chunks.remove(module_id);
        }

        let modules = self
            .chunk_modules
            .get_mut(chunk_path)
            .unwrap_or_else(|| panic!("chunk {chunk_path} has no module map"));
        modules.remove(module_id);
        if modules.is_empty() {
            self.chunk_modules.remove(chunk_path);
        }

        orphaned
    }

    /// An arbitrary but deterministic member of the module's chunk set.
    pub(crate) fn first_chunk(&self, module_id: &ModuleId) -> Option<ChunkPath> {
        self.module_chunks
            .get(module_id)
            .and_then(|chunks| chunks.iter().next().cloned())
    }

    /// The modules currently recorded as members of `chunk_path`.
    pub(crate) fn modules_in_chunk(&self, chunk_path: &ChunkPath) -> Vec<ModuleId> {
        self.chunk_modules
            .get(chunk_path)
            .map(|modules| modules.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Records that `list_path` contains `chunk_path`. Idempotent.
    pub(crate) fn add_chunk_to_list(&mut self, chunk_path: &ChunkPath, list_path: &ChunkListPath) {
        self.list_chunks
            .entry(list_path.clone())
            .or_default()
            .insert(chunk_path.clone());
        self.chunk_lists
            .entry(chunk_path.clone())
            .or_default()
            .insert(list_path.clone());
    }

    /// Removes a chunk list and returns the chunks that belong to no list
    /// afterwards.
    pub(crate) fn remove_chunk_list(&mut self, list_path: &ChunkListPath) -> Vec<ChunkPath> {
        self.runtime_chunk_lists.remove(list_path);
        let Some(chunks) = self.list_chunks.remove(list_path) else {
            return Vec::new();
        };
        let mut orphaned = Vec::new();
        for chunk in chunks {
            if let Some(lists) = self.chunk_lists.get_mut(&chunk) {
                lists.remove(list_path);
                if lists.is_empty() {
                    self.chunk_lists.remove(&chunk);
                    orphaned.push(chunk);
                }
            }
        }
        orphaned
    }

    /// Drops all graph entries for `chunk_path` itself (its module map and
    /// its chunk-list memberships). Module edges must already be removed.
    pub(crate) fn remove_chunk(&mut self, chunk_path: &ChunkPath) {
        self.chunk_modules.remove(chunk_path);
        if let Some(lists) = self.chunk_lists.remove(chunk_path) {
            for list in lists {
                if let Some(chunks) = self.list_chunks.get_mut(&list) {
                    chunks.remove(chunk_path);
                }
            }
        }
    }

    /// The chunks currently recorded as members of `list_path`.
    pub(crate) fn chunks_in_list(&self, list_path: &ChunkListPath) -> Vec<ChunkPath> {
        self.list_chunks
            .get(list_path)
            .map(|chunks| chunks.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Flags `list_path` as containing a runtime entry. An unreconcilable
    /// HMR update to such a list forces a full restart instead of a patch.
    pub(crate) fn mark_runtime_chunk_list(&mut self, list_path: &ChunkListPath) {
        self.runtime_chunk_lists.insert(list_path.clone());
    }

    pub(crate) fn is_runtime_chunk_list(&self, list_path: &ChunkListPath) -> bool {
        self.runtime_chunk_lists.contains(list_path)
    }
}
