// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2026 Photon Contributors

//! Module instantiation.
//!
//! A factory runs exactly once per module id. The module record is inserted
//! into the cache *before* the factory executes, so re-entrant requires
//! issued by the factory itself (circular references) observe the
//! in-progress record instead of recursing into a second instantiation.
//! Factory execution is synchronous from entry to return; a factory that
//! needs to await something exports a promise-like value instead of
//! suspending the instantiation call.

use crate::error::{Result, RuntimeError};
use crate::id::{ChunkPath, ModuleId};
use crate::loader::ChunkData;
use crate::registry::Module;
use crate::runtime::DevRuntime;
use crate::source::SourceInfo;
use crate::value::{ObjectRef, Value, new_object};
use futures::FutureExt;
use futures::future::LocalBoxFuture;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

/// The execution context handed to a module factory.
///
/// Every capability is relative to the module being instantiated: requires
/// record parent/child edges against it, chunk loads are attributed to it,
/// and exports land on its record.
pub struct ModuleContext {
    pub(crate) runtime: DevRuntime,
    pub(crate) module: Rc<RefCell<Module>>,
}

impl ModuleContext {
    /// The id of the module being instantiated.
    pub fn id(&self) -> ModuleId {
        self.module.borrow().id.clone()
    }

    /// The module's exports object.
    pub fn exports(&self) -> ObjectRef {
        self.module.borrow().exports.clone()
    }

    /// Writes a CommonJS-style export.
    pub fn export_value(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.exports().borrow_mut().insert(name.into(), value.into());
    }

    /// Marks the module as an ECMAScript module and returns its namespace
    /// object, creating it on first use.
    ///
    /// The namespace is a separate export surface from `exports`; after the
    /// factory returns, the two are reconciled so consumers observe a
    /// consistent surface regardless of which form they accessed first.
    pub fn esm(&self) -> ObjectRef {
        self.module
            .borrow_mut()
            .namespace_object
            .get_or_insert_with(new_object)
            .clone()
    }

    /// Writes an ESM-style export into the namespace object.
    ///
    /// Because the namespace object is shared by reference, a consumer that
    /// obtained it before this write observes the new binding (live
    /// bindings under circular references).
    pub fn esm_export(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.esm().borrow_mut().insert(name.into(), value.into());
    }

    /// Requires a module by id relative to this module, instantiating it if
    /// needed. Returns its exports object.
    ///
    /// Under a circular reference this returns a partially-populated exports
    /// object; since exports alias shared storage, later writes by the
    /// other factory become visible through it.
    pub fn require(&self, id: impl Into<ModuleId>) -> Result<ObjectRef> {
        let module = self
            .runtime
            .get_or_instantiate_module_from_parent(&id.into(), &self.module)?;
        let module = module.borrow();
        if let Some(error) = &module.error {
            return Err(error.clone());
        }
        Ok(module.exports.clone())
    }

    /// Dynamically imports a module by id, resolving to its namespace
    /// object (synthesized with a `default` binding for CommonJS modules).
    pub fn dynamic_import(
        &self,
        id: impl Into<ModuleId>,
    ) -> LocalBoxFuture<'static, Result<ObjectRef>> {
        let runtime = self.runtime.clone();
        let parent = self.module.clone();
        let id = id.into();
        async move {
            let module = runtime.get_or_instantiate_module_from_parent(&id, &parent)?;
            {
                let module = module.borrow();
                if let Some(error) = &module.error {
                    return Err(error.clone());
                }
            }
            Ok(module_namespace(&module))
        }
        .boxed_local()
    }

    /// Loads a chunk on behalf of this module.
    pub fn load_chunk(&self, chunk_data: ChunkData) -> LocalBoxFuture<'static, Result<()>> {
        let runtime = self.runtime.clone();
        let source = SourceInfo::Parent {
            parent_id: self.id(),
        };
        async move { runtime.load_chunk(source, &chunk_data).await }.boxed_local()
    }

    /// The shared global environment of this runtime instance.
    pub fn globals(&self) -> ObjectRef {
        self.runtime.globals()
    }

    /// Resolves an asset path against the runtime's configured asset
    /// prefix.
    pub fn resolve_asset(&self, path: &str) -> String {
        self.runtime.resolve_asset(path)
    }
}

/// The namespace surface of a module: its namespace object when it has one,
/// otherwise a namespace synthesized from its exports with a `default`
/// binding (CommonJS interop). The synthesized namespace is cached on the
/// module record, so repeated imports observe one stable object identity.
pub(crate) fn module_namespace(module: &Rc<RefCell<Module>>) -> ObjectRef {
    let mut module = module.borrow_mut();
    if let Some(namespace) = &module.namespace_object {
        return namespace.clone();
    }
    let namespace = new_object();
    {
        let mut ns = namespace.borrow_mut();
        for (name, value) in module.exports.borrow().iter() {
            ns.insert(name.clone(), value.clone());
        }
        ns.insert("default".to_string(), Value::Object(module.exports.clone()));
    }
    module.namespace_object = Some(namespace.clone());
    namespace
}

impl DevRuntime {
    /// Produces a loaded module for `id`, running its factory exactly once.
    pub(crate) fn instantiate_module(
        &self,
        id: &ModuleId,
        source: SourceInfo,
    ) -> Result<Rc<RefCell<Module>>> {
        let factory = self.inner.registry.borrow().factory(id).ok_or_else(|| {
            RuntimeError::MissingFactory {
                id: id.clone(),
                reason: source.instantiation_reason(),
            }
        })?;

        if let SourceInfo::Runtime { .. } = &source {
            self.inner.runtime_modules.borrow_mut().insert(id.clone());
        }

        debug!(module = %id, reason = %source.instantiation_reason(), "instantiating module");
        let module = Rc::new(RefCell::new(Module::new(
            id.clone(),
            source.initial_parents(),
        )));
        // Insert before executing the factory: re-entrant requires for this
        // id must observe the in-progress record.
        self.inner.registry.borrow_mut().insert_module(module.clone());

        let mut ctx = ModuleContext {
            runtime: self.clone(),
            module: module.clone(),
        };
        match factory(&mut ctx) {
            Err(cause) => {
                let error = RuntimeError::factory(id.clone(), cause);
                module.borrow_mut().error = Some(error.clone());
                Err(error)
            }
            Ok(()) => {
                self.finish_module(&module);
                Ok(module)
            }
        }
    }

    /// Marks a module loaded and reconciles its namespace object with its
    /// exports.
    fn finish_module(&self, module: &Rc<RefCell<Module>>) {
        let (exports, namespace) = {
            let mut module = module.borrow_mut();
            module.loaded = true;
            (module.exports.clone(), module.namespace_object.clone())
        };
        // Under circular ESM references resolved via CommonJS-style
        // requires a module can end up with both surfaces; alias the
        // namespace bindings onto exports so later consumers agree.
        if let Some(namespace) = namespace {
            if !Rc::ptr_eq(&namespace, &exports) {
                for (name, value) in namespace.borrow().iter() {
                    exports.borrow_mut().insert(name.clone(), value.clone());
                }
            }
        }
    }

    /// Returns the module for `id`, instantiating it if missing, and
    /// records the dependency edge from `parent`.
    ///
    /// The child edge is recorded regardless of cache hit or miss. On a hit
    /// the cached record is returned as-is, even mid-instantiation: that is
    /// what makes circular references terminate.
    pub(crate) fn get_or_instantiate_module_from_parent(
        &self,
        id: &ModuleId,
        parent: &Rc<RefCell<Module>>,
    ) -> Result<Rc<RefCell<Module>>> {
        let parent_id = parent.borrow().id.clone();
        parent.borrow_mut().add_child(id.clone());

        let cached = self.inner.registry.borrow().cached_module(id);
        if let Some(module) = cached {
            module.borrow_mut().add_parent(parent_id);
            return Ok(module);
        }

        self.instantiate_module(id, SourceInfo::Parent { parent_id })
    }

    /// Instantiates `id` as a runtime entry of `chunk_path`.
    pub fn instantiate_runtime_module(
        &self,
        id: &ModuleId,
        chunk_path: &ChunkPath,
    ) -> Result<Rc<RefCell<Module>>> {
        self.instantiate_module(
            id,
            SourceInfo::Runtime {
                chunk_path: chunk_path.clone(),
            },
        )
    }

    /// Returns the module for `id`, instantiating it as a runtime entry of
    /// `chunk_path` if missing.
    ///
    /// A cached module's sticky error is rethrown immediately without
    /// re-running the factory: a module that failed once stays failed for
    /// the lifetime of its cache entry.
    pub fn get_or_instantiate_runtime_module(
        &self,
        id: &ModuleId,
        chunk_path: &ChunkPath,
    ) -> Result<Rc<RefCell<Module>>> {
        let cached = self.inner.registry.borrow().cached_module(id);
        if let Some(module) = cached {
            if let Some(error) = &module.borrow().error {
                return Err(error.clone());
            }
            return Ok(module);
        }
        self.instantiate_runtime_module(id, chunk_path)
    }
}
