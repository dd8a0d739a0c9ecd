// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2026 Photon Contributors

//! Module registry: factory storage and instantiated module records.
//!
//! The registry is pure storage. It never triggers loading or instantiation;
//! the instantiator and loader drive it.

use crate::error::RuntimeError;
use crate::id::ModuleId;
use crate::instantiate::ModuleContext;
use crate::value::{ObjectRef, new_object};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// A module factory: executed at most once per module id, it populates the
/// module's exports through the [`ModuleContext`] it is handed.
pub type ModuleFactory = Rc<dyn Fn(&mut ModuleContext) -> anyhow::Result<()>>;

/// An instantiated module record.
#[derive(Debug)]
pub struct Module {
    /// The module's id
    pub id: ModuleId,
    /// The module's exports, mutated by the factory during/after execution
    pub exports: ObjectRef,
    /// Sticky failure: set at most once, rethrown on every later access
    pub error: Option<RuntimeError>,
    /// False until the factory returns without failing
    pub loaded: bool,
    /// Modules (or runtime contexts) that caused instantiation, deduplicated
    pub parents: Vec<ModuleId>,
    /// Modules this one has required, deduplicated
    pub children: Vec<ModuleId>,
    /// Separate ESM-style export surface, when distinct from `exports`
    pub namespace_object: Option<ObjectRef>,
}

impl Module {
    pub(crate) fn new(id: ModuleId, parents: Vec<ModuleId>) -> Self {
        Self {
            id,
            exports: new_object(),
            error: None,
            loaded: false,
            parents,
            children: Vec::new(),
            namespace_object: None,
        }
    }

    /// Records a parent edge, skipping duplicates.
    pub fn add_parent(&mut self, parent: ModuleId) {
        if !self.parents.contains(&parent) {
            self.parents.push(parent);
        }
    }

    /// Records a child edge, skipping duplicates.
    pub fn add_child(&mut self, child: ModuleId) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }
}

/// Factory map plus instantiated-module cache.
#[derive(Default)]
pub(crate) struct ModuleRegistry {
    factories: HashMap<ModuleId, ModuleFactory>,
    cache: HashMap<ModuleId, Rc<RefCell<Module>>>,
}

impl ModuleRegistry {
    /// Installs `factory` for `id` unless one is already installed.
    ///
    /// First registration wins: two chunks declaring the same shared module
    /// must not clobber each other. Returns whether the factory was
    /// installed.
    pub(crate) fn register_factory(&mut self, id: ModuleId, factory: ModuleFactory) -> bool {
        match self.factories.entry(id) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(factory);
                true
            }
        }
    }

    pub(crate) fn factory(&self, id: &ModuleId) -> Option<ModuleFactory> {
        self.factories.get(id).cloned()
    }

    pub(crate) fn has_factory(&self, id: &ModuleId) -> bool {
        self.factories.contains_key(id)
    }

    pub(crate) fn remove_factory(&mut self, id: &ModuleId) -> bool {
        self.factories.remove(id).is_some()
    }

    pub(crate) fn cached_module(&self, id: &ModuleId) -> Option<Rc<RefCell<Module>>> {
        self.cache.get(id).cloned()
    }

    pub(crate) fn insert_module(&mut self, module: Rc<RefCell<Module>>) {
        let id = module.borrow().id.clone();
        self.cache.insert(id, module);
    }

    pub(crate) fn evict(&mut self, id: &ModuleId) -> Option<Rc<RefCell<Module>>> {
        self.cache.remove(id)
    }
}
