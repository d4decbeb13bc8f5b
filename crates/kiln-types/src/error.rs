//! Universe errors
//!
//! Two channels, matching how callers recover:
//! - [`ResolutionError`] is the recoverable channel. A missing type or method
//!   referenced from a signature or a method body is an expected condition in
//!   partial inputs; the compiler substitutes a throwing stub or skips the
//!   offending root and keeps going.
//! - [`UniverseError`] is fatal. A missing well-known type or a malformed
//!   instantiation signals a broken core library or a programming error and
//!   aborts the compilation.

use thiserror::Error;

/// A type-system entity could not be resolved.
///
/// Recoverable: carried into the compiled output as a throwing stub so the
/// symbol still links, or dropped at rooting time under the skip policy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionError {
    /// A referenced type is not present in the universe
    #[error("missing type: {name}")]
    MissingType {
        /// Full name of the unresolvable type
        name: String,
    },

    /// A referenced method is not present on its owning type
    #[error("missing method: {name}")]
    MissingMethod {
        /// Full name of the unresolvable method
        name: String,
    },

    /// A referenced field is not present on its owning type
    #[error("missing field: {name}")]
    MissingField {
        /// Full name of the unresolvable field
        name: String,
    },
}

/// Fatal universe errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UniverseError {
    /// A required well-known type was never registered
    #[error("missing well-known type: {name} (broken or incompatible core library)")]
    MissingWellKnownType {
        /// Well-known type name
        name: &'static str,
    },

    /// Instantiation arity does not match the definition
    #[error("instantiation arity mismatch for {definition}: expected {expected}, got {actual}")]
    ArityMismatch {
        /// Display name of the generic definition
        definition: String,
        /// Declared generic parameter count
        expected: usize,
        /// Supplied argument count
        actual: usize,
    },

    /// Attempt to instantiate a non-generic definition
    #[error("{definition} is not a generic definition")]
    NotGeneric {
        /// Display name of the definition
        definition: String,
    },
}
