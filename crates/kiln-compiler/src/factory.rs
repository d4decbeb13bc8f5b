//! Node factory
//!
//! Maps type-system entities to singleton graph nodes. The entity→node cache
//! is the only shared mutable state the expansion threads write through, so
//! it uses insert-if-absent semantics: two edges discovering the same entity
//! concurrently converge on one node.

use std::cmp::Ordering;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use kiln_types::{MethodId, ModuleId, TypeId, Universe};

use crate::node::{DictionaryOwner, NodeId, NodeKind};

/// Singleton node storage for one compilation.
pub struct NodeFactory {
    universe: Arc<Universe>,
    cache: DashMap<NodeKind, NodeId>,
    nodes: RwLock<Vec<NodeKind>>,
}

impl NodeFactory {
    /// Factory over the given universe.
    pub fn new(universe: Arc<Universe>) -> Self {
        Self {
            universe,
            cache: DashMap::new(),
            nodes: RwLock::new(Vec::new()),
        }
    }

    /// The universe this factory resolves entities against.
    pub fn universe(&self) -> &Universe {
        &self.universe
    }

    /// The node for `kind`, creating it on first request. Two concurrent
    /// requests for the same kind always yield the same id.
    pub fn node(&self, kind: NodeKind) -> NodeId {
        *self.cache.entry(kind.clone()).or_insert_with(|| {
            let mut nodes = self.nodes.write();
            let id = NodeId(nodes.len() as u32);
            nodes.push(kind);
            id
        })
    }

    /// The kind behind a node id.
    pub fn kind(&self, node: NodeId) -> NodeKind {
        self.nodes.read()[node.0 as usize].clone()
    }

    /// Number of nodes created so far.
    pub fn node_count(&self) -> usize {
        self.nodes.read().len()
    }

    /// Convenience: constructed-type node.
    pub fn constructed_type(&self, ty: TypeId) -> NodeId {
        self.node(NodeKind::ConstructedType(ty))
    }

    /// Convenience: method-code node.
    pub fn method_code(&self, method: MethodId) -> NodeId {
        self.node(NodeKind::MethodCode(method))
    }

    /// Convenience: virtual-method-use node.
    pub fn virtual_method_use(&self, method: MethodId) -> NodeId {
        self.node(NodeKind::VirtualMethodUse(method))
    }

    /// Convenience: vtable-slice node.
    pub fn vtable_slice(&self, ty: TypeId) -> NodeId {
        self.node(NodeKind::VTableSlice(ty))
    }

    /// Convenience: generic-dictionary node.
    pub fn generic_dictionary(&self, owner: DictionaryOwner) -> NodeId {
        self.node(NodeKind::GenericDictionary(owner))
    }

    /// Convenience: module-metadata node.
    pub fn module_metadata(&self, module: ModuleId) -> NodeId {
        self.node(NodeKind::ModuleMetadata(module))
    }

    /// Convenience: extern-symbol node.
    pub fn extern_symbol(&self, name: impl Into<String>) -> NodeId {
        self.node(NodeKind::ExternSymbol(name.into()))
    }

    /// Structural sort key: independent of discovery order, unique per
    /// (kind, entity). Methods include their signature so overloads order
    /// deterministically, and every key carries the definition's registration
    /// index so same-named duplicate definitions never tie.
    pub fn sort_key(&self, node: NodeId) -> (u8, String) {
        let kind = self.kind(node);
        (kind.rank(), self.stable_key(&kind))
    }

    /// Human-readable node description, also used in dependency logs.
    pub fn display(&self, node: NodeId) -> String {
        let kind = self.kind(node);
        let name = match &kind {
            NodeKind::ConstructedType(_) => "ConstructedType",
            NodeKind::MethodCode(_) => "MethodCode",
            NodeKind::VirtualMethodUse(_) => "VirtualMethodUse",
            NodeKind::VTableSlice(_) => "VTableSlice",
            NodeKind::GenericDictionary(_) => "GenericDictionary",
            NodeKind::ShadowConcreteMethod { .. } => "ShadowConcreteMethod",
            NodeKind::GcStaticBase(_) => "GcStaticBase",
            NodeKind::NonGcStaticBase(_) => "NonGcStaticBase",
            NodeKind::ThreadStaticBase(_) => "ThreadStaticBase",
            NodeKind::ModuleMetadata(_) => "ModuleMetadata",
            NodeKind::ExternSymbol(_) => "ExternSymbol",
        };
        format!("{}({})", name, self.entity_key(&kind))
    }

    /// Total order over nodes: kind rank, then structural entity key.
    pub fn compare(&self, a: NodeId, b: NodeId) -> Ordering {
        self.sort_key(a).cmp(&self.sort_key(b))
    }

    // The display key plus registration-index discriminators, since the
    // universe never deduplicates definitions. Only definition ids appear:
    // ids of interned instantiations depend on discovery order and must
    // stay out of the key.
    fn stable_key(&self, kind: &NodeKind) -> String {
        let u = &self.universe;
        match kind {
            NodeKind::ConstructedType(ty)
            | NodeKind::VTableSlice(ty)
            | NodeKind::GcStaticBase(ty)
            | NodeKind::NonGcStaticBase(ty)
            | NodeKind::ThreadStaticBase(ty) => type_key(u, *ty),
            NodeKind::MethodCode(m) | NodeKind::VirtualMethodUse(m) => method_sort_key(u, *m),
            NodeKind::ShadowConcreteMethod { method, canon } => {
                format!("{} -> {}", method_sort_key(u, *method), method_sort_key(u, *canon))
            }
            NodeKind::GenericDictionary(DictionaryOwner::Type(ty)) => {
                format!("type {}", type_key(u, *ty))
            }
            NodeKind::GenericDictionary(DictionaryOwner::Method(m)) => {
                format!("method {}", method_sort_key(u, *m))
            }
            NodeKind::ModuleMetadata(module) => {
                format!("{}#{}", u.module_name(*module), module)
            }
            NodeKind::ExternSymbol(name) => name.clone(),
        }
    }

    fn entity_key(&self, kind: &NodeKind) -> String {
        let u = &self.universe;
        match kind {
            NodeKind::ConstructedType(ty)
            | NodeKind::VTableSlice(ty)
            | NodeKind::GcStaticBase(ty)
            | NodeKind::NonGcStaticBase(ty)
            | NodeKind::ThreadStaticBase(ty) => u.type_display(*ty),
            NodeKind::MethodCode(m) | NodeKind::VirtualMethodUse(m) => method_key(u, *m),
            NodeKind::ShadowConcreteMethod { method, canon } => {
                format!("{} -> {}", method_key(u, *method), method_key(u, *canon))
            }
            NodeKind::GenericDictionary(DictionaryOwner::Type(ty)) => {
                format!("type {}", u.type_display(*ty))
            }
            NodeKind::GenericDictionary(DictionaryOwner::Method(m)) => {
                format!("method {}", method_key(u, *m))
            }
            NodeKind::ModuleMetadata(module) => u.module_name(*module),
            NodeKind::ExternSymbol(name) => name.clone(),
        }
    }
}

fn method_key(u: &Universe, method: MethodId) -> String {
    let sig = u.method_signature(method);
    let params: Vec<String> = sig.params.iter().map(|p| u.type_display(*p)).collect();
    format!("{}({})", u.method_display(method), params.join(", "))
}

/// Recursive structural type key. Definitions and generic parameters carry
/// their registration index; instantiations and arrays are keyed by their
/// components, never by their own interned id.
fn type_key(u: &Universe, ty: TypeId) -> String {
    if let Some(element) = u.array_element(ty) {
        return format!("{}[]", type_key(u, element));
    }
    match u.instantiation_of(ty) {
        Some((def, args)) => {
            let args: Vec<String> = args.iter().map(|a| type_key(u, *a)).collect();
            format!("{}<{}>", type_key(u, def), args.join(", "))
        }
        None => format!("{}#{}", u.type_display(ty), ty),
    }
}

fn method_sort_key(u: &Universe, method: MethodId) -> String {
    let sig = u.method_signature(method);
    let params: Vec<String> = sig.params.iter().map(|p| type_key(u, *p)).collect();
    format!(
        "{}({})#{}",
        u.method_display(method),
        params.join(", "),
        u.method_definition(method)
    )
}
