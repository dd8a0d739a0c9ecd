// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2026 Photon Contributors

//! Provenance of a module instantiation or chunk load.

use crate::id::{ChunkPath, ModuleId};

/// Records why a module is being instantiated or a chunk loaded.
///
/// Used for diagnostics and for computing a module's initial parent list,
/// never for control flow beyond that. The enum is closed: every consumer
/// matches it exhaustively, so adding a variant is a compile error at each
/// consumption site rather than a silently-taken default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceInfo {
    /// The module is a runtime entry of a chunk.
    Runtime {
        /// The chunk that declared the module as a runtime root
        chunk_path: ChunkPath,
    },
    /// The module was required by another module.
    Parent {
        /// The requiring module
        parent_id: ModuleId,
    },
    /// The module is being (re-)instantiated by an HMR update.
    Update {
        /// Parents carried over from the replaced module record, if any
        parents: Option<Vec<ModuleId>>,
    },
}

impl SourceInfo {
    /// The initial `parents` list for a module instantiated with this source.
    pub(crate) fn initial_parents(&self) -> Vec<ModuleId> {
        match self {
            SourceInfo::Runtime { .. } => Vec::new(),
            SourceInfo::Parent { parent_id } => vec![parent_id.clone()],
            SourceInfo::Update { parents } => parents.clone().unwrap_or_default(),
        }
    }

    /// Human-readable reason for a chunk load attributed to this source.
    pub(crate) fn load_reason(&self) -> String {
        match self {
            SourceInfo::Runtime { chunk_path } => {
                format!("as a runtime dependency of chunk {chunk_path}")
            }
            SourceInfo::Parent { parent_id } => format!("from module {parent_id}"),
            SourceInfo::Update { .. } => "from an HMR update".to_string(),
        }
    }

    /// Human-readable reason for a module instantiation attributed to this
    /// source.
    pub(crate) fn instantiation_reason(&self) -> String {
        match self {
            SourceInfo::Runtime { chunk_path } => {
                format!("as a runtime entry of chunk {chunk_path}")
            }
            SourceInfo::Parent { parent_id } => {
                format!("because it was required from module {parent_id}")
            }
            SourceInfo::Update { .. } => "because of an HMR update".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_parents() {
        let runtime = SourceInfo::Runtime {
            chunk_path: "chunk.js".into(),
        };
        assert!(runtime.initial_parents().is_empty());

        let parent = SourceInfo::Parent {
            parent_id: ModuleId::Num(3),
        };
        assert_eq!(parent.initial_parents(), vec![ModuleId::Num(3)]);

        let update = SourceInfo::Update {
            parents: Some(vec![ModuleId::Num(1), ModuleId::Num(2)]),
        };
        assert_eq!(
            update.initial_parents(),
            vec![ModuleId::Num(1), ModuleId::Num(2)]
        );

        let bare_update = SourceInfo::Update { parents: None };
        assert!(bare_update.initial_parents().is_empty());
    }

    #[test]
    fn test_load_reasons() {
        let runtime = SourceInfo::Runtime {
            chunk_path: "main.js".into(),
        };
        assert_eq!(
            runtime.load_reason(),
            "as a runtime dependency of chunk main.js"
        );

        let parent = SourceInfo::Parent {
            parent_id: "app/page".into(),
        };
        assert_eq!(parent.load_reason(), "from module app/page");

        let update = SourceInfo::Update { parents: None };
        assert_eq!(update.load_reason(), "from an HMR update");
    }
}
