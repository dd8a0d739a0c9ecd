// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2026 Photon Contributors

//! Identifiers for modules, chunks and chunk lists.
//!
//! All three are opaque to the runtime: they are map keys and fetch keys,
//! nothing more. `ModuleId` mirrors the wire format, where an id is either a
//! number or a string.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identifier for a module, unique within a build and stable across HMR
/// updates for the same logical module.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModuleId {
    /// Numeric module id
    Num(u64),
    /// String module id
    Str(Arc<str>),
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleId::Num(n) => write!(f, "{n}"),
            ModuleId::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<u64> for ModuleId {
    fn from(n: u64) -> Self {
        ModuleId::Num(n)
    }
}

impl From<&str> for ModuleId {
    fn from(s: &str) -> Self {
        ModuleId::Str(Arc::from(s))
    }
}

impl From<String> for ModuleId {
    fn from(s: String) -> Self {
        ModuleId::Str(Arc::from(s.as_str()))
    }
}

/// Path of a chunk resource, used both as a fetch key and a map key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkPath(Arc<str>);

impl ChunkPath {
    /// Returns the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChunkPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ChunkPath {
    fn from(s: &str) -> Self {
        ChunkPath(Arc::from(s))
    }
}

impl From<String> for ChunkPath {
    fn from(s: String) -> Self {
        ChunkPath(Arc::from(s.as_str()))
    }
}

/// Identifier for a named, ordered collection of chunks associated with one
/// entry point or dynamic import group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkListPath(Arc<str>);

impl ChunkListPath {
    /// Returns the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChunkListPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ChunkListPath {
    fn from(s: &str) -> Self {
        ChunkListPath(Arc::from(s))
    }
}

impl From<String> for ChunkListPath {
    fn from(s: String) -> Self {
        ChunkListPath(Arc::from(s.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_id_wire_format() {
        let num: ModuleId = serde_json::from_str("42").unwrap();
        assert_eq!(num, ModuleId::Num(42));

        let s: ModuleId = serde_json::from_str("\"[project]/app/page.js\"").unwrap();
        assert_eq!(s, ModuleId::from("[project]/app/page.js"));

        assert_eq!(serde_json::to_string(&num).unwrap(), "42");
        assert_eq!(
            serde_json::to_string(&s).unwrap(),
            "\"[project]/app/page.js\""
        );
    }

    #[test]
    fn test_chunk_path_display() {
        let path = ChunkPath::from("static/chunks/main.js");
        assert_eq!(path.to_string(), "static/chunks/main.js");
        assert_eq!(path.as_str(), "static/chunks/main.js");
    }
}
