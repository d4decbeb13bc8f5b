//! Kiln type/method universe
//!
//! This crate implements the queryable type/method/field universe the
//! compilation engine runs against: entity handles, descriptors, the generic
//! instantiation algebra, and canonical-form conversion. Entities are interned
//! so that two requests for the same instantiation always yield the same
//! handle — graph deduplication in the compiler depends on this.
//!
//! The universe is populated through [`UniverseBuilder`] (the ingestion API a
//! metadata reader drives) and is append-only afterwards: generic
//! instantiation during compilation adds interned entries but never mutates
//! existing ones.

pub mod body;
pub mod builder;
pub mod error;
pub mod handles;
pub mod method;
pub mod ty;
pub mod universe;

pub use body::{IlOp, MethodBody};
pub use builder::UniverseBuilder;
pub use error::{ResolutionError, UniverseError};
pub use handles::{FieldId, MethodId, ModuleId, TypeId};
pub use method::{FieldDef, MethodFlags, MethodSignature, StaticBaseKind};
pub use ty::{GenericConstraint, GenericParamDef, PrimitiveKind, TypeKind};
pub use universe::{CanonicalFormKind, Instantiation, Universe, WellKnownType};
