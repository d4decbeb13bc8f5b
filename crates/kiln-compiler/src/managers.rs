//! Pluggable dependency contributors
//!
//! Collaborator seams the dependency engine consults during expansion.
//! Each has an empty default so the core pipeline runs without a metadata
//! emitter, interop layer or dictionary layout policy attached.

use kiln_types::{MethodId, ModuleId, TypeId, Universe};

use crate::node::{DictionaryOwner, NodeKind};

/// Contributes reflection-metadata dependencies.
pub trait MetadataManager: Sync {
    /// Extra nodes a module's metadata blob requires.
    fn module_dependencies(&self, _universe: &Universe, _module: ModuleId) -> Vec<NodeKind> {
        Vec::new()
    }

    /// Extra nodes compiling a method requires for its metadata to be
    /// reflectable.
    fn method_dependencies(&self, _universe: &Universe, _method: MethodId) -> Vec<NodeKind> {
        Vec::new()
    }
}

/// No reflection metadata.
#[derive(Debug, Default)]
pub struct EmptyMetadataManager;

impl MetadataManager for EmptyMetadataManager {}

/// Contributes marshalling-stub dependencies.
pub trait InteropStubManager: Sync {
    /// Extra nodes constructing an instance of `ty` requires.
    fn construction_dependencies(&self, _universe: &Universe, _ty: TypeId) -> Vec<NodeKind> {
        Vec::new()
    }
}

/// No interop.
#[derive(Debug, Default)]
pub struct EmptyInteropStubManager;

impl InteropStubManager for EmptyInteropStubManager {}

/// Decides what a generic dictionary contains.
pub trait DictionaryLayoutProvider: Sync {
    /// Nodes backing the dictionary's entries.
    fn entries(&self, _universe: &Universe, _owner: &DictionaryOwner) -> Vec<NodeKind> {
        Vec::new()
    }
}

/// Dictionaries with no precomputed entries; shared code resolves handles
/// lazily at run time.
#[derive(Debug, Default)]
pub struct EmptyDictionaryLayoutProvider;

impl DictionaryLayoutProvider for EmptyDictionaryLayoutProvider {}
