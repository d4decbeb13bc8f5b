//! Compilation roots
//!
//! Roots are the externally-reachable entry points the fixpoint starts from:
//! an entry method, runtime exports, or (for library builds) every public
//! surface of a module. The [`RootingService`] translates entities into graph
//! marks, applying canonicalization so open generic definitions root their
//! shared form, and applying the failure policy when a root does not resolve.

use tracing::{debug, warn};

use kiln_types::{
    CanonicalFormKind, MethodId, ModuleId, ResolutionError, StaticBaseKind, TypeId,
};

use crate::canon::{constraint_satisfying_instantiation, CanonicalizationPolicy};
use crate::error::CompilationError;
use crate::factory::NodeFactory;
use crate::graph::DependencyAnalyzer;
use crate::node::NodeKind;

/// What to do when a compilation root fails to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RootingPolicy {
    /// Skip the failed root and keep going; library builds want this because
    /// a missing optional dependency only poisons the surface that uses it.
    #[default]
    SkipFailedRoots,
    /// Abort the compilation on the first unresolvable root.
    FailOnFailedRoots,
}

/// Sink the root providers write into.
pub struct RootingService<'a> {
    factory: &'a NodeFactory,
    analyzer: &'a DependencyAnalyzer<'a>,
    canon_policy: CanonicalizationPolicy,
    policy: RootingPolicy,
    exports: Vec<(MethodId, String)>,
}

impl<'a> RootingService<'a> {
    pub(crate) fn new(
        factory: &'a NodeFactory,
        analyzer: &'a DependencyAnalyzer<'a>,
        canon_policy: CanonicalizationPolicy,
        policy: RootingPolicy,
    ) -> Self {
        Self {
            factory,
            analyzer,
            canon_policy,
            policy,
            exports: Vec::new(),
        }
    }

    /// The universe roots resolve against.
    pub fn universe(&self) -> &'a kiln_types::Universe {
        self.factory.universe()
    }

    fn failed(
        &self,
        entity: String,
        source: ResolutionError,
    ) -> Result<(), CompilationError> {
        match self.policy {
            RootingPolicy::SkipFailedRoots => {
                warn!(%entity, error = %source, "skipping unresolvable root");
                Ok(())
            }
            RootingPolicy::FailOnFailedRoots => {
                Err(CompilationError::RootingFailed { entity, source })
            }
        }
    }

    /// Root a method: its code (or shared canonical code) becomes reachable.
    /// Virtual instance methods root their slot use instead, so devirtualized
    /// or vtable-based callers agree on what exists.
    pub fn add_compilation_root_method(
        &mut self,
        method: MethodId,
        reason: &'static str,
    ) -> Result<(), CompilationError> {
        let u = self.factory.universe();
        if let Err(e) = u.check_method_resolvable(method) {
            return self.failed(u.method_display(method), e);
        }
        let flags = u.method_flags(method);
        if flags.is_virtual && !flags.is_static {
            let target = u.canon_method_target(method, CanonicalFormKind::Specific);
            self.analyzer
                .mark(self.factory.virtual_method_use(target), None, reason);
            if flags.is_abstract {
                return Ok(());
            }
        }
        debug!(method = %u.method_display(method), reason, "rooting method");
        if u.is_shared_method(method) {
            let canon = u.canon_method_target(method, CanonicalFormKind::Specific);
            let node = self.factory.node(NodeKind::ShadowConcreteMethod { method, canon });
            self.analyzer.mark(node, None, reason);
        } else {
            self.analyzer
                .mark(self.factory.method_code(method), None, reason);
        }
        Ok(())
    }

    /// Root a method and record its externally visible symbol name.
    pub fn add_compilation_root_export(
        &mut self,
        method: MethodId,
        export_name: impl Into<String>,
        reason: &'static str,
    ) -> Result<(), CompilationError> {
        self.add_compilation_root_method(method, reason)?;
        self.exports.push((method, export_name.into()));
        Ok(())
    }

    /// Root a type: its constructed form, its base chain, and every method
    /// a user of the type could reach. An open generic definition roots a
    /// constraint-satisfying instantiation alongside its own record, so the
    /// shared body exists even with no concrete call site in view.
    pub fn add_compilation_root_type(
        &mut self,
        ty: TypeId,
        reason: &'static str,
    ) -> Result<(), CompilationError> {
        let u = self.factory.universe();
        if let Err(e) = u.check_type_resolvable(ty) {
            return self.failed(u.type_display(ty), e);
        }
        if u.is_generic_definition(ty) {
            // The definition's record stays in the rooted surface; the
            // instantiation below carries the layout and the compiled code.
            self.analyzer
                .mark(self.factory.constructed_type(ty), None, reason);
            let params = u.generic_params_of_type(ty);
            let Some(args) = constraint_satisfying_instantiation(u, &params, self.canon_policy)
            else {
                debug!(ty = %u.type_display(ty), "no satisfying instantiation; skipping");
                return Ok(());
            };
            let inst = u.instantiate_type(ty, args)?;
            return self.add_compilation_root_type(inst, reason);
        }
        debug!(ty = %u.type_display(ty), reason, "rooting type");
        self.analyzer
            .mark(self.factory.constructed_type(ty), None, reason);
        if let Some(base) = u.base_type(ty) {
            self.add_compilation_root_type(base, reason)?;
        }
        for method in u.methods_of(ty) {
            let flags = u.method_flags(method);
            // Abstract methods flow through: they root their slot as used
            // virtually rather than rooting code directly.
            if flags.is_finalizer || flags.is_missing {
                continue;
            }
            let method = if u.is_generic_method_definition(method) {
                // Type<T>.Method<U> pairs explode combinatorially; generic
                // methods are only rooted when their owner is non-generic.
                if u.instantiation_of(ty).is_some() {
                    continue;
                }
                let params = u.method_def(method).generic_params.clone();
                let Some(args) =
                    constraint_satisfying_instantiation(u, &params, self.canon_policy)
                else {
                    continue;
                };
                u.instantiate_method(method, u.method_owner(method), args)?
            } else {
                method
            };
            // A bad method must not poison the rest of the type's surface.
            if let Err(e) = u.check_method_resolvable(method) {
                warn!(method = %u.method_display(method), error = %e, "skipping root method");
                continue;
            }
            self.add_compilation_root_method(method, reason)?;
        }
        Ok(())
    }

    /// Root a virtual method's slot so reflection-driven dispatch finds an
    /// implementation for every constructed type.
    pub fn root_virtual_method(
        &mut self,
        method: MethodId,
        reason: &'static str,
    ) -> Result<(), CompilationError> {
        let u = self.factory.universe();
        if let Err(e) = u.check_method_resolvable(method) {
            return self.failed(u.method_display(method), e);
        }
        let target = u.canon_method_target(method, CanonicalFormKind::Specific);
        self.analyzer
            .mark(self.factory.virtual_method_use(target), None, reason);
        Ok(())
    }

    /// Root a statics region of a type, if the type declares fields in it.
    pub fn root_static_base_for_type(
        &mut self,
        ty: TypeId,
        kind: StaticBaseKind,
        reason: &'static str,
    ) {
        let u = self.factory.universe();
        if !u.has_statics(ty, kind) {
            return;
        }
        let node = match kind {
            StaticBaseKind::Gc => NodeKind::GcStaticBase(ty),
            StaticBaseKind::NonGc => NodeKind::NonGcStaticBase(ty),
            StaticBaseKind::Thread => NodeKind::ThreadStaticBase(ty),
        };
        self.analyzer.mark(self.factory.node(node), None, reason);
    }

    /// Root a module's reflection metadata blob.
    pub fn root_module_metadata(&mut self, module: ModuleId, reason: &'static str) {
        self.analyzer
            .mark(self.factory.module_metadata(module), None, reason);
    }

    pub(crate) fn take_exports(&mut self) -> Vec<(MethodId, String)> {
        std::mem::take(&mut self.exports)
    }
}

/// A source of compilation roots.
pub trait CompilationRootProvider: Sync {
    /// Write this provider's roots into the service.
    fn add_compilation_roots(
        &self,
        rooting: &mut RootingService<'_>,
    ) -> Result<(), CompilationError>;
}

/// Roots the program entry point and exports it under the runtime's expected
/// entry symbol.
#[derive(Debug)]
pub struct MainMethodRootProvider {
    main: MethodId,
}

impl MainMethodRootProvider {
    /// Provider for the given entry method.
    pub fn new(main: MethodId) -> Self {
        Self { main }
    }
}

impl CompilationRootProvider for MainMethodRootProvider {
    fn add_compilation_roots(
        &self,
        rooting: &mut RootingService<'_>,
    ) -> Result<(), CompilationError> {
        rooting.add_compilation_root_export(self.main, "__managed_main", "entry point")
    }
}

/// Roots every method of a module that declares an export name.
#[derive(Debug)]
pub struct ExportedMethodsRootProvider {
    module: ModuleId,
}

impl ExportedMethodsRootProvider {
    /// Provider scanning the given module.
    pub fn new(module: ModuleId) -> Self {
        Self { module }
    }
}

impl CompilationRootProvider for ExportedMethodsRootProvider {
    fn add_compilation_roots(
        &self,
        rooting: &mut RootingService<'_>,
    ) -> Result<(), CompilationError> {
        let mut found = Vec::new();
        {
            let u = rooting.factory.universe();
            for ty in u.module_types(self.module) {
                for method in u.methods_of(ty) {
                    if let Some(name) = u.method_export_name(method) {
                        found.push((method, name));
                    }
                }
            }
        }
        for (method, name) in found {
            rooting.add_compilation_root_export(method, name, "runtime export")?;
        }
        Ok(())
    }
}

/// Library builds: every type of the module is a root, since any of them may
/// be the first thing a consumer touches.
#[derive(Debug)]
pub struct LibraryRootProvider {
    module: ModuleId,
}

impl LibraryRootProvider {
    /// Provider rooting the whole surface of the given module.
    pub fn new(module: ModuleId) -> Self {
        Self { module }
    }
}

impl CompilationRootProvider for LibraryRootProvider {
    fn add_compilation_roots(
        &self,
        rooting: &mut RootingService<'_>,
    ) -> Result<(), CompilationError> {
        let types = rooting.factory.universe().module_types(self.module);
        for ty in types {
            rooting.add_compilation_root_type(ty, "library surface")?;
        }
        Ok(())
    }
}

/// Roots exactly one method; used by focused debugging builds.
#[derive(Debug)]
pub struct SingleMethodRootProvider {
    method: MethodId,
}

impl SingleMethodRootProvider {
    /// Provider for the given method.
    pub fn new(method: MethodId) -> Self {
        Self { method }
    }
}

impl CompilationRootProvider for SingleMethodRootProvider {
    fn add_compilation_roots(
        &self,
        rooting: &mut RootingService<'_>,
    ) -> Result<(), CompilationError> {
        rooting.add_compilation_root_method(self.method, "single method root")
    }
}

/// Roots the generic dispatch helpers at their canonical instantiations so
/// shared code always has a helper body to call into.
#[derive(Debug)]
pub struct GenericDispatchHelperRootProvider {
    helpers: Vec<MethodId>,
}

impl GenericDispatchHelperRootProvider {
    /// Provider for the given helper method definitions.
    pub fn new(helpers: Vec<MethodId>) -> Self {
        Self { helpers }
    }
}

impl CompilationRootProvider for GenericDispatchHelperRootProvider {
    fn add_compilation_roots(
        &self,
        rooting: &mut RootingService<'_>,
    ) -> Result<(), CompilationError> {
        let policy = rooting.canon_policy;
        for helper in &self.helpers {
            let mut targets = Vec::new();
            {
                let u = rooting.factory.universe();
                let arity = u.method_def(*helper).generic_params.len();
                let owner = u.method_owner(*helper);
                if arity == 0 {
                    targets.push(*helper);
                } else {
                    if policy.supports_canon {
                        let canon = u.canon()?;
                        targets.push(u.instantiate_method(*helper, owner, vec![canon; arity])?);
                    }
                    if policy.supports_universal_canon {
                        let uc = u.universal_canon()?;
                        targets.push(u.instantiate_method(*helper, owner, vec![uc; arity])?);
                    }
                }
            }
            for target in targets {
                rooting.add_compilation_root_method(target, "dispatch helper")?;
            }
        }
        Ok(())
    }
}

/// Roots the static constructor contexts of an ordered initializer list.
/// Order matters to the startup code, not to the graph; the list is carried
/// through to the output stage unchanged.
#[derive(Debug)]
pub struct RuntimeInitializerRootProvider {
    types: Vec<TypeId>,
}

impl RuntimeInitializerRootProvider {
    /// Provider for the given initializer order.
    pub fn new(types: Vec<TypeId>) -> Self {
        Self { types }
    }
}

impl CompilationRootProvider for RuntimeInitializerRootProvider {
    fn add_compilation_roots(
        &self,
        rooting: &mut RootingService<'_>,
    ) -> Result<(), CompilationError> {
        for ty in &self.types {
            rooting.root_static_base_for_type(*ty, StaticBaseKind::NonGc, "eager initializer");
            let cctor = rooting.factory.universe().static_constructor(*ty);
            if let Some(cctor) = cctor {
                rooting.add_compilation_root_method(cctor, "eager initializer")?;
            }
        }
        Ok(())
    }
}
