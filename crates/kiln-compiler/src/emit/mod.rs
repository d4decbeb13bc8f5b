//! Output-side emitters
//!
//! Everything that turns the marked graph into files on disk, apart from the
//! object/source payload itself (which the backend owns): symbol name
//! mangling, the linker exports file, the diagnostic object dump and the
//! stack trace metadata blob.

pub mod exports;
pub mod mangling;
pub mod objectdump;
pub mod stacktrace;
