//! IL-equivalent method bodies
//!
//! Only the dependency-carrying subset of an IL stream is modeled: the ops a
//! body scanner needs to discover callees, constructed types and touched
//! statics, and that the portable-source backend lowers to text. Operand
//! stack shuffling, branches and arithmetic carry no dependencies and are
//! not represented.

use crate::handles::{FieldId, MethodId, TypeId};

/// One dependency-relevant operation of a method body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IlOp {
    /// Direct (non-virtual) call
    Call(MethodId),
    /// Virtual call through the declared method's slot
    CallVirt(MethodId),
    /// Allocate an instance and invoke the given constructor
    NewObject(MethodId),
    /// Allocate an array with the given element type
    NewArray(TypeId),
    /// Read an instance field
    LoadField(FieldId),
    /// Write an instance field
    StoreField(FieldId),
    /// Read a static field
    LoadStaticField(FieldId),
    /// Write a static field
    StoreStaticField(FieldId),
    /// Load a runtime type handle (`ldtoken` / `typeof`)
    LoadTypeToken(TypeId),
    /// Throw the value on top of the stack
    Throw,
    /// Return from the method
    Return,
}

/// An IL-equivalent method body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MethodBody {
    /// Operations in program order
    pub ops: Vec<IlOp>,
}

impl MethodBody {
    /// Body with the given operations.
    pub fn new(ops: Vec<IlOp>) -> Self {
        Self { ops }
    }

    /// Empty body that just returns.
    pub fn empty() -> Self {
        Self {
            ops: vec![IlOp::Return],
        }
    }
}
