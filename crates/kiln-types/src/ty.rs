//! Type descriptors
//!
//! A closed set of entity kinds replaces the deep descriptor class lattice of
//! metadata-driven type systems: policy code matches on [`TypeKind`] instead
//! of dispatching through virtual overrides.

use std::fmt;

use crate::handles::{FieldId, MethodId, ModuleId, TypeId};

/// Primitive types of the managed type system.
///
/// The portable-source backend unconditionally roots all of these because the
/// text emitter needs them present even if no user code mentions them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Void,
    Boolean,
    Char,
    SByte,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    /// Pointer-sized signed integer
    IntPtr,
    /// Pointer-sized unsigned integer
    UIntPtr,
    Single,
    Double,
}

impl PrimitiveKind {
    /// Every primitive kind, in a fixed order.
    pub const ALL: [PrimitiveKind; 15] = [
        PrimitiveKind::Void,
        PrimitiveKind::Boolean,
        PrimitiveKind::Char,
        PrimitiveKind::SByte,
        PrimitiveKind::Byte,
        PrimitiveKind::Int16,
        PrimitiveKind::UInt16,
        PrimitiveKind::Int32,
        PrimitiveKind::UInt32,
        PrimitiveKind::Int64,
        PrimitiveKind::UInt64,
        PrimitiveKind::IntPtr,
        PrimitiveKind::UIntPtr,
        PrimitiveKind::Single,
        PrimitiveKind::Double,
    ];

    /// Position of this kind within [`PrimitiveKind::ALL`].
    pub fn index(self) -> usize {
        match self {
            PrimitiveKind::Void => 0,
            PrimitiveKind::Boolean => 1,
            PrimitiveKind::Char => 2,
            PrimitiveKind::SByte => 3,
            PrimitiveKind::Byte => 4,
            PrimitiveKind::Int16 => 5,
            PrimitiveKind::UInt16 => 6,
            PrimitiveKind::Int32 => 7,
            PrimitiveKind::UInt32 => 8,
            PrimitiveKind::Int64 => 9,
            PrimitiveKind::UInt64 => 10,
            PrimitiveKind::IntPtr => 11,
            PrimitiveKind::UIntPtr => 12,
            PrimitiveKind::Single => 13,
            PrimitiveKind::Double => 14,
        }
    }

    /// Metadata name of the primitive (e.g. `Int32`).
    pub fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Void => "Void",
            PrimitiveKind::Boolean => "Boolean",
            PrimitiveKind::Char => "Char",
            PrimitiveKind::SByte => "SByte",
            PrimitiveKind::Byte => "Byte",
            PrimitiveKind::Int16 => "Int16",
            PrimitiveKind::UInt16 => "UInt16",
            PrimitiveKind::Int32 => "Int32",
            PrimitiveKind::UInt32 => "UInt32",
            PrimitiveKind::Int64 => "Int64",
            PrimitiveKind::UInt64 => "UInt64",
            PrimitiveKind::IntPtr => "IntPtr",
            PrimitiveKind::UIntPtr => "UIntPtr",
            PrimitiveKind::Single => "Single",
            PrimitiveKind::Double => "Double",
        }
    }

    /// Spelling of the primitive in the portable C-like output.
    pub fn portable_name(self) -> &'static str {
        match self {
            PrimitiveKind::Void => "void",
            PrimitiveKind::Boolean => "uint8_t",
            PrimitiveKind::Char => "uint16_t",
            PrimitiveKind::SByte => "int8_t",
            PrimitiveKind::Byte => "uint8_t",
            PrimitiveKind::Int16 => "int16_t",
            PrimitiveKind::UInt16 => "uint16_t",
            PrimitiveKind::Int32 => "int32_t",
            PrimitiveKind::UInt32 => "uint32_t",
            PrimitiveKind::Int64 => "int64_t",
            PrimitiveKind::UInt64 => "uint64_t",
            PrimitiveKind::IntPtr => "intptr_t",
            PrimitiveKind::UIntPtr => "uintptr_t",
            PrimitiveKind::Single => "float",
            PrimitiveKind::Double => "double",
        }
    }
}

/// Kind of a type definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// Reference type with fields and virtual methods
    Class,
    /// Value type (struct); distinct canonical buckets per layout
    ValueType,
    /// Interface type
    Interface,
    /// Delegate type; its `Invoke` slot is synthesized, not read from metadata
    Delegate,
    /// Primitive value type
    Primitive(PrimitiveKind),
    /// `__Canon`: the shared canonical stand-in for reference type arguments
    Canon,
    /// `__UniversalCanon`: the canonical stand-in for arguments of any shape
    UniversalCanon,
}

impl TypeKind {
    /// Whether instances are represented as object references.
    pub fn is_reference(self) -> bool {
        matches!(
            self,
            TypeKind::Class | TypeKind::Interface | TypeKind::Delegate | TypeKind::Canon
        )
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeKind::Class => write!(f, "class"),
            TypeKind::ValueType => write!(f, "struct"),
            TypeKind::Interface => write!(f, "interface"),
            TypeKind::Delegate => write!(f, "delegate"),
            TypeKind::Primitive(p) => write!(f, "primitive {}", p.name()),
            TypeKind::Canon => write!(f, "__Canon"),
            TypeKind::UniversalCanon => write!(f, "__UniversalCanon"),
        }
    }
}

/// Constraint on a generic parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenericConstraint {
    /// No constraint; any type argument is legal
    None,
    /// `class` constraint: argument must be a reference type
    ReferenceType,
    /// `struct` constraint: argument must be a non-nullable value type.
    /// Disallows the shared `__Canon` argument.
    NotNullableValueType,
}

/// One declared generic parameter of a type or method definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericParamDef {
    /// Parameter name (diagnostic only)
    pub name: String,
    /// Constraint the argument must satisfy
    pub constraint: GenericConstraint,
}

impl GenericParamDef {
    /// Unconstrained parameter with the given name.
    pub fn unconstrained(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constraint: GenericConstraint::None,
        }
    }
}

/// Attributes of a type definition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeFlags {
    /// Cannot be instantiated directly
    pub is_abstract: bool,
    /// Cannot be derived from
    pub is_sealed: bool,
    /// Stand-in for an unresolvable import; any use fails with
    /// [`crate::ResolutionError::MissingType`]
    pub is_missing: bool,
}

/// A type definition: the metadata-level shape of a class, struct, interface
/// or delegate, before any generic instantiation.
#[derive(Debug, Clone)]
pub struct TypeDef {
    /// Simple name (e.g. `Program`)
    pub name: String,
    /// Declaring namespace (e.g. `App`); empty for the global namespace
    pub namespace: String,
    /// Module the definition lives in
    pub module: ModuleId,
    /// Kind of the definition
    pub kind: TypeKind,
    /// Base type; `None` only for `System.Object` and interfaces.
    /// For generic definitions this may reference the definition's own
    /// generic parameters.
    pub base: Option<TypeId>,
    /// Attributes
    pub flags: TypeFlags,
    /// Declared generic parameters; empty for non-generic definitions
    pub generic_params: Vec<GenericParamDef>,
    /// Declared methods, in metadata order
    pub methods: Vec<MethodId>,
    /// Declared fields, in metadata order
    pub fields: Vec<FieldId>,
}

impl TypeDef {
    /// Namespace-qualified name.
    pub fn qualified_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}
