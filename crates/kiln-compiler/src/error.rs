//! Compilation errors
//!
//! Only fatal conditions surface here. Recoverable type-system resolution
//! failures travel as [`kiln_types::ResolutionError`] and are absorbed by the
//! throwing-stub substitution or the root-skipping policy before they could
//! reach a caller.

use thiserror::Error;

use kiln_types::{ResolutionError, UniverseError};

/// Fatal compilation errors. These abort the run.
#[derive(Debug, Error)]
pub enum CompilationError {
    /// Broken core library or malformed instantiation
    #[error(transparent)]
    Universe(#[from] UniverseError),

    /// A compilation root failed to resolve under
    /// [`crate::rooting::RootingPolicy::FailOnFailedRoots`]
    #[error("failed to root {entity}: {source}")]
    RootingFailed {
        /// Display name of the root entity
        entity: String,
        /// Underlying resolution failure
        #[source]
        source: ResolutionError,
    },

    /// The external method compiler failed for a reason other than type
    /// resolution; this indicates a backend bug, not a bad input
    #[error("method compiler failed for {method}: {message}")]
    MethodCompilerFailed {
        /// Display name of the method
        method: String,
        /// Backend-reported failure
        message: String,
    },

    /// Invalid builder configuration or API misuse
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Output emission failure
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
