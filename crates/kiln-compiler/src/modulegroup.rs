//! Compilation module group
//!
//! Decides which entities this compilation unit owns and which methods cross
//! the unit boundary as exports. Single-file builds own everything; multi-
//! module builds own a declared subset and export methods other units call.

use rustc_hash::FxHashSet;

use kiln_types::{MethodId, ModuleId, TypeId, Universe};

/// Ownership boundary of one compilation unit.
pub trait CompilationModuleGroup: Sync {
    /// Whether this unit emits the type record for `ty`.
    fn contains_type(&self, universe: &Universe, ty: TypeId) -> bool;

    /// Whether this unit compiles the body of `method`.
    fn contains_method(&self, universe: &Universe, method: MethodId) -> bool;

    /// Whether the method's symbol must be visible outside this unit.
    fn is_exported_method(&self, universe: &Universe, method: MethodId) -> bool;
}

/// Whole-program compilation: everything is owned, nothing needs exporting
/// beyond explicitly named runtime exports.
#[derive(Debug, Default)]
pub struct SingleFileCompilationModuleGroup;

impl CompilationModuleGroup for SingleFileCompilationModuleGroup {
    fn contains_type(&self, _universe: &Universe, _ty: TypeId) -> bool {
        true
    }

    fn contains_method(&self, _universe: &Universe, _method: MethodId) -> bool {
        true
    }

    fn is_exported_method(&self, _universe: &Universe, _method: MethodId) -> bool {
        false
    }
}

/// Compilation of a declared module subset. Entities defined elsewhere are
/// referenced by symbol; owned methods reachable from outside are exported.
#[derive(Debug)]
pub struct MultiModuleGroup {
    modules: FxHashSet<ModuleId>,
}

impl MultiModuleGroup {
    /// Group owning exactly the given modules.
    pub fn new(modules: impl IntoIterator<Item = ModuleId>) -> Self {
        Self {
            modules: modules.into_iter().collect(),
        }
    }
}

impl CompilationModuleGroup for MultiModuleGroup {
    fn contains_type(&self, universe: &Universe, ty: TypeId) -> bool {
        self.modules.contains(&universe.module_of_type(ty))
    }

    fn contains_method(&self, universe: &Universe, method: MethodId) -> bool {
        self.contains_type(universe, universe.method_owner(method))
    }

    fn is_exported_method(&self, universe: &Universe, method: MethodId) -> bool {
        self.contains_method(universe, method)
    }
}
