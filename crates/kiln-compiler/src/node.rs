//! Dependency graph nodes
//!
//! A closed tagged variant over node kinds replaces the virtual-dispatch
//! node class hierarchy of the original design: each kind carries only the
//! entity it tracks, and a single dispatch function per kind (in the engine)
//! computes its dependencies. Node identity is (kind, entity); the
//! [`crate::factory::NodeFactory`] guarantees one node per identity.

use kiln_types::{MethodId, ModuleId, TypeId};

/// Index of a node in the factory's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

/// Who owns a generic dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DictionaryOwner {
    /// Dictionary attached to a shared generic type instantiation
    Type(TypeId),
    /// Dictionary attached to a shared generic method instantiation
    Method(MethodId),
}

/// The kinds of dependency-graph nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// A fully constructible runtime type (vtable/type record present)
    ConstructedType(TypeId),
    /// Compiled body of a method
    MethodCode(MethodId),
    /// The method's vtable slot is used for virtual dispatch somewhere
    VirtualMethodUse(MethodId),
    /// The vtable slots a type contributes on top of its base's
    VTableSlice(TypeId),
    /// Runtime-resolved table of handles for shared canonical code
    GenericDictionary(DictionaryOwner),
    /// Tracks the dictionary dependency of a concrete instantiation whose
    /// code is owned by its canonical form
    ShadowConcreteMethod {
        /// The concrete instantiation
        method: MethodId,
        /// The canonical method that owns the code
        canon: MethodId,
    },
    /// Statics region holding GC references
    GcStaticBase(TypeId),
    /// Statics region without GC references (also the cctor context)
    NonGcStaticBase(TypeId),
    /// Thread-local statics region
    ThreadStaticBase(TypeId),
    /// Reflection metadata for a module
    ModuleMetadata(ModuleId),
    /// A symbol provided by the runtime, referenced by name
    ExternSymbol(String),
}

impl NodeKind {
    /// Rank used as the major key of the deterministic output ordering.
    pub fn rank(&self) -> u8 {
        match self {
            NodeKind::ConstructedType(_) => 0,
            NodeKind::VTableSlice(_) => 1,
            NodeKind::MethodCode(_) => 2,
            NodeKind::VirtualMethodUse(_) => 3,
            NodeKind::ShadowConcreteMethod { .. } => 4,
            NodeKind::GenericDictionary(_) => 5,
            NodeKind::GcStaticBase(_) => 6,
            NodeKind::NonGcStaticBase(_) => 7,
            NodeKind::ThreadStaticBase(_) => 8,
            NodeKind::ModuleMetadata(_) => 9,
            NodeKind::ExternSymbol(_) => 10,
        }
    }

    /// Whether the node owns compiled code.
    pub fn has_code(&self) -> bool {
        matches!(self, NodeKind::MethodCode(_))
    }
}
