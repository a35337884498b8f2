//! # Context — Extension Accumulation and Builder Factories
//!
//! The context is the top-level façade: extensions register through
//! [`Context::use_extension`], and builder factory functions hand out fresh
//! models bound to the current registry.
//!
//! Models receive an immutable compiled snapshot (`Rc<Registry>`) taken at
//! construction. Extensions registered afterwards compile into the next
//! snapshot; already-built models are unaffected. This replaces the ambient
//! global registry of older designs with an explicit value passed by
//! reference into every model and validator.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::error::SchemaError;
use crate::model::Model;
use crate::registry::{ContextFn, Extension, Registry};

/// Top-level façade accumulating extensions and exposing builder factories.
///
/// Not safe for concurrent mutation from multiple logical owners; the
/// prescribed isolation boundary is cloning the models it hands out.
#[derive(Default)]
pub struct Context {
    registry: Registry,
    factories: BTreeMap<String, ContextFn>,
    compiled: RefCell<Option<Rc<Registry>>>,
}

impl Context {
    pub fn new() -> Self {
        Context::default()
    }

    /// Register an extension: merges its contributions into the registry and
    /// attaches its composite context factories.
    ///
    /// # Errors
    ///
    /// Propagates registry merge errors (unknown type, duplicate format).
    pub fn use_extension(&mut self, mut extension: Extension) -> Result<&mut Self, SchemaError> {
        let factories = std::mem::take(&mut extension.extend_context);
        self.registry.merge(extension)?;
        for (name, factory) in factories {
            self.factories.insert(name, factory);
        }
        // Invalidate the compiled snapshot; the next model recompiles.
        *self.compiled.borrow_mut() = None;
        Ok(self)
    }

    /// The compiled registry snapshot, (re)built on demand.
    pub fn registry(&self) -> Rc<Registry> {
        if let Some(snapshot) = self.compiled.borrow().as_ref() {
            return Rc::clone(snapshot);
        }
        let snapshot = Rc::new(self.registry.clone());
        *self.compiled.borrow_mut() = Some(Rc::clone(&snapshot));
        snapshot
    }

    /// A fresh model of a registered type.
    ///
    /// # Errors
    ///
    /// `SchemaError::UnknownType` when the type is not registered; any
    /// construction-hook error.
    pub fn model(&self, type_name: &str) -> Result<Model, SchemaError> {
        Model::new(self.registry())?.with_type(type_name)
    }

    /// A fresh model seeded by a `builders: true` format registration:
    /// both type and format are set.
    ///
    /// # Errors
    ///
    /// `SchemaError::UnknownBuilder` when no seed exists for `format`.
    pub fn builder(&self, format: &str) -> Result<Model, SchemaError> {
        let registry = self.registry();
        let type_name = registry
            .builder_seed(format)
            .ok_or_else(|| SchemaError::UnknownBuilder(format.to_string()))?
            .to_string();
        Model::new(registry)?.with_type(&type_name)?.with_format(format)
    }

    /// Invoke a named composite factory attached by an extension.
    ///
    /// # Errors
    ///
    /// `SchemaError::UnknownFactory` when no factory is registered under
    /// `name`; any error from the factory itself.
    pub fn factory(&self, name: &str) -> Result<Model, SchemaError> {
        let factory = self
            .factories
            .get(name)
            .cloned()
            .ok_or_else(|| SchemaError::UnknownFactory(name.to_string()))?;
        factory(self)
    }

    /// Attach a composite factory directly (the programmatic form of an
    /// extension's `extend_context` entry).
    pub fn extend(&mut self, name: impl Into<String>, factory: ContextFn) -> &mut Self {
        self.factories.insert(name.into(), factory);
        self
    }
}
