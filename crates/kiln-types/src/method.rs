//! Method and field descriptors

use crate::body::MethodBody;
use crate::handles::TypeId;
use crate::ty::GenericParamDef;

/// Attributes of a method definition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MethodFlags {
    /// Participates in virtual dispatch
    pub is_virtual: bool,
    /// Introduces a new vtable slot (as opposed to overriding an inherited one)
    pub is_new_slot: bool,
    /// Has no body; must be overridden
    pub is_abstract: bool,
    /// Static method
    pub is_static: bool,
    /// Finalizer; invoked indirectly by the GC, never call-site rooted
    pub is_finalizer: bool,
    /// Static (class) constructor
    pub is_cctor: bool,
    /// Instance constructor
    pub is_ctor: bool,
    /// Stand-in for an unresolvable import
    pub is_missing: bool,
}

/// Method signature: parameter types and return type.
///
/// For generic definitions the component types may reference generic
/// parameters; instantiation substitutes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    /// Parameter types, in order
    pub params: Vec<TypeId>,
    /// Return type
    pub ret: TypeId,
}

impl MethodSignature {
    /// Signature with the given parameters and return type.
    pub fn new(params: Vec<TypeId>, ret: TypeId) -> Self {
        Self { params, ret }
    }

    /// All component types of the signature.
    pub fn component_types(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.params.iter().copied().chain(std::iter::once(self.ret))
    }
}

/// A method definition.
#[derive(Debug, Clone)]
pub struct MethodDef {
    /// Simple name
    pub name: String,
    /// Owning type definition
    pub owner: TypeId,
    /// Attributes
    pub flags: MethodFlags,
    /// Signature
    pub signature: MethodSignature,
    /// Declared generic parameters; empty for non-generic methods
    pub generic_params: Vec<GenericParamDef>,
    /// IL-equivalent body; `None` for abstract methods and synthesized slots
    pub body: Option<MethodBody>,
    /// Export name if the method is externally callable (runtime export)
    pub export_name: Option<String>,
}

/// Which statics region a static field lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StaticBaseKind {
    /// Statics holding GC references
    Gc,
    /// Statics without GC references
    NonGc,
    /// Thread-local statics
    Thread,
}

/// A field definition.
#[derive(Debug, Clone)]
pub struct FieldDef {
    /// Simple name
    pub name: String,
    /// Owning type definition
    pub owner: TypeId,
    /// Field type
    pub ty: TypeId,
    /// Static field
    pub is_static: bool,
    /// Thread-local static field
    pub is_thread_static: bool,
    /// Stand-in for an unresolvable import
    pub is_missing: bool,
}
