//! Dependency computation per node kind
//!
//! One dispatch function per node kind, driven by the analyzer's expansion
//! loop. This is also where method bodies get compiled: compiling and
//! scanning are the same pass, so a body is visited exactly once no matter
//! how many call sites reach it.

use dashmap::DashMap;
use tracing::trace;

use kiln_types::{
    CanonicalFormKind, IlOp, MethodId, ResolutionError, StaticBaseKind, TypeId, Universe,
};

use crate::backend::{CompilationBackend, CompiledMethodBody, MethodCompileError};
use crate::error::CompilationError;
use crate::factory::NodeFactory;
use crate::graph::{DependencyProvider, NodeDependencies};
use crate::managers::{DictionaryLayoutProvider, InteropStubManager, MetadataManager};
use crate::modulegroup::CompilationModuleGroup;
use crate::node::{DictionaryOwner, NodeId, NodeKind};
use crate::vtable::{has_vtable, resolve_virtual_method, VTableSliceProvider};

/// The symbol a throwing stub tail-calls into.
pub(crate) const THROW_TYPE_LOAD_SYMBOL: &str = "__throw_type_load_exception";

pub(crate) struct CompilationEngine<'a> {
    pub(crate) factory: &'a NodeFactory,
    pub(crate) backend: &'a dyn CompilationBackend,
    pub(crate) vtable: &'a dyn VTableSliceProvider,
    pub(crate) group: &'a dyn CompilationModuleGroup,
    pub(crate) metadata: &'a dyn MetadataManager,
    pub(crate) interop: &'a dyn InteropStubManager,
    pub(crate) dictionary: &'a dyn DictionaryLayoutProvider,
    pub(crate) bodies: DashMap<MethodId, CompiledMethodBody>,
}

impl<'a> CompilationEngine<'a> {
    fn universe(&self) -> &Universe {
        self.factory.universe()
    }

    /// Node for a direct call's target: shared methods route through their
    /// canonical body plus the caller-side dictionary tracking node.
    fn call_target_node(&self, method: MethodId) -> NodeId {
        let u = self.universe();
        if u.is_shared_method(method) {
            let canon = u.canon_method_target(method, CanonicalFormKind::Specific);
            self.factory.node(NodeKind::ShadowConcreteMethod { method, canon })
        } else {
            self.factory.method_code(method)
        }
    }

    fn constructed_type_deps(
        &self,
        ty: TypeId,
        deps: &mut NodeDependencies,
    ) -> Result<(), CompilationError> {
        let u = self.universe();

        // An open definition's record has no layout of its own; vtable,
        // statics and virtual-implementation edges belong to its
        // instantiations.
        if u.is_generic_definition(ty) {
            return Ok(());
        }

        if let Some(element) = u.array_element(ty) {
            deps.push(self.factory.constructed_type(element), "array element");
        }
        if let Some(base) = u.base_type(ty) {
            deps.push(self.factory.constructed_type(base), "base type");
        }
        if let Some((_, args)) = u.instantiation_of(ty) {
            for arg in args {
                if !u.is_canonical_subtype(arg, CanonicalFormKind::Any) {
                    deps.push(self.factory.constructed_type(arg), "instantiation argument");
                }
            }
        }
        if !self.vtable.slice(u, ty).is_empty() {
            deps.push(self.factory.vtable_slice(ty), "vtable");
        }

        // A shared concrete instantiation keeps its own type record but its
        // code lives on the canonical form; the dictionary bridges the two.
        if u.is_shared_type(ty) && !u.is_canonical_subtype(ty, CanonicalFormKind::Any) {
            let canon = u.convert_to_canon_form(ty, CanonicalFormKind::Specific);
            deps.push(self.factory.constructed_type(canon), "canonical form");
            deps.push(
                self.factory.generic_dictionary(DictionaryOwner::Type(ty)),
                "type dictionary",
            );
        }

        for kind in [StaticBaseKind::Gc, StaticBaseKind::NonGc, StaticBaseKind::Thread] {
            if u.has_statics(ty, kind) {
                let node = match kind {
                    StaticBaseKind::Gc => NodeKind::GcStaticBase(ty),
                    StaticBaseKind::NonGc => NodeKind::NonGcStaticBase(ty),
                    StaticBaseKind::Thread => NodeKind::ThreadStaticBase(ty),
                };
                deps.push(self.factory.node(node), "statics");
            }
        }

        if let Some(finalizer) = u.finalizer(ty) {
            let target = u.canon_method_target(finalizer, CanonicalFormKind::Specific);
            deps.push(self.factory.method_code(target), "finalizer");
        }

        for kind in self.interop.construction_dependencies(u, ty) {
            deps.push(self.factory.node(kind), "interop construction");
        }

        // Virtual implementations are conditional: a slot's implementation on
        // this type is needed only if something actually dispatches through
        // that slot.
        let mut chain = Some(ty);
        while let Some(t) = chain {
            for decl in self.vtable.slice(u, t) {
                let Some(impl_method) = resolve_virtual_method(u, decl, ty) else {
                    continue;
                };
                if u.method_flags(impl_method).is_abstract {
                    continue;
                }
                let impl_target = u.canon_method_target(impl_method, CanonicalFormKind::Specific);
                let trigger = u.canon_method_target(decl, CanonicalFormKind::Specific);
                deps.push_conditional(
                    self.factory.method_code(impl_target),
                    self.factory.virtual_method_use(trigger),
                    "virtual implementation",
                );
            }
            chain = u.base_type(t);
        }
        Ok(())
    }

    fn method_code_deps(
        &self,
        method: MethodId,
        deps: &mut NodeDependencies,
    ) -> Result<(), CompilationError> {
        let u = self.universe();
        let owner = u.method_owner(method);

        // Methods owned by another compilation unit are referenced by symbol.
        if !self.group.contains_method(u, method) {
            deps.push(
                self.factory
                    .extern_symbol(crate::emit::mangling::sanitize(&u.method_display(method))),
                "external method",
            );
            return Ok(());
        }

        if !u.method_flags(method).is_static && !u.is_generic_definition(owner) {
            deps.push(self.factory.constructed_type(owner), "owning type");
        }
        for kind in self.metadata.method_dependencies(u, method) {
            deps.push(self.factory.node(kind), "method metadata");
        }

        match self.backend.compile_method(u, method) {
            Ok(body) => {
                self.bodies.insert(method, body);
            }
            Err(MethodCompileError::Resolution(e)) => {
                self.substitute_throwing_stub(method, e, deps);
                return Ok(());
            }
            Err(MethodCompileError::Internal(message)) => {
                return Err(CompilationError::MethodCompilerFailed {
                    method: u.method_display(method),
                    message,
                });
            }
        }

        if let Err(e) = self.scan_body(method, deps) {
            // The body references something unresolvable; the method stays in
            // the graph but its semantics become "throw on entry".
            self.substitute_throwing_stub(method, e, deps);
        }
        Ok(())
    }

    fn substitute_throwing_stub(
        &self,
        method: MethodId,
        error: ResolutionError,
        deps: &mut NodeDependencies,
    ) {
        let u = self.universe();
        trace!(method = %u.method_display(method), error = %error, "throwing stub");
        let stub = self.backend.throwing_stub(u, error);
        self.bodies.insert(method, stub);
        deps.push(
            self.factory.extern_symbol(THROW_TYPE_LOAD_SYMBOL),
            "throw helper",
        );
    }

    fn scan_body(
        &self,
        method: MethodId,
        deps: &mut NodeDependencies,
    ) -> Result<(), ResolutionError> {
        let u = self.universe();
        let owner = u.method_owner(method);
        let type_args = u
            .instantiation_of(owner)
            .map(|(_, args)| args)
            .unwrap_or_default();
        let method_args = u.method_instantiation(method);
        let Some(body) = u.method_body(method) else {
            return Ok(());
        };

        for op in &body.ops {
            match op {
                IlOp::Call(callee) => {
                    let callee = u.method_in_context(*callee, owner);
                    u.check_method_resolvable(callee)?;
                    if u.method_flags(callee).is_abstract {
                        let target = u.canon_method_target(callee, CanonicalFormKind::Specific);
                        deps.push(self.factory.virtual_method_use(target), "call to abstract");
                    } else {
                        deps.push(self.call_target_node(callee), "direct call");
                    }
                }
                IlOp::CallVirt(callee) => {
                    let callee = u.method_in_context(*callee, owner);
                    u.check_method_resolvable(callee)?;
                    let target = u.canon_method_target(callee, CanonicalFormKind::Specific);
                    deps.push(self.factory.virtual_method_use(target), "virtual call");
                }
                IlOp::NewObject(ctor) => {
                    let ctor = u.method_in_context(*ctor, owner);
                    u.check_method_resolvable(ctor)?;
                    let allocated = u.method_owner(ctor);
                    deps.push(self.factory.constructed_type(allocated), "allocation");
                    deps.push(self.call_target_node(ctor), "constructor call");
                }
                IlOp::NewArray(element) => {
                    let element = u.substitute(*element, &type_args, &method_args);
                    u.check_type_resolvable(element)?;
                    deps.push(
                        self.factory.constructed_type(u.array_of(element)),
                        "array allocation",
                    );
                }
                IlOp::LoadField(field) | IlOp::StoreField(field) => {
                    u.check_field_resolvable(*field)?;
                }
                IlOp::LoadStaticField(field) | IlOp::StoreStaticField(field) => {
                    u.check_field_resolvable(*field)?;
                    let declared = u.field_def(*field).owner;
                    let field_owner = if u.definition(owner) == declared {
                        owner
                    } else {
                        declared
                    };
                    let node = match u.static_base_kind(*field, field_owner) {
                        StaticBaseKind::Gc => NodeKind::GcStaticBase(field_owner),
                        StaticBaseKind::NonGc => NodeKind::NonGcStaticBase(field_owner),
                        StaticBaseKind::Thread => NodeKind::ThreadStaticBase(field_owner),
                    };
                    deps.push(self.factory.node(node), "static field access");
                }
                IlOp::LoadTypeToken(ty) => {
                    let ty = u.substitute(*ty, &type_args, &method_args);
                    u.check_type_resolvable(ty)?;
                    deps.push(self.factory.constructed_type(ty), "type token");
                }
                IlOp::Throw | IlOp::Return => {}
            }
        }
        Ok(())
    }

    fn dictionary_deps(&self, owner: &DictionaryOwner, deps: &mut NodeDependencies) {
        let u = self.universe();
        let args = match owner {
            DictionaryOwner::Type(ty) => {
                u.instantiation_of(*ty).map(|(_, a)| a).unwrap_or_default()
            }
            DictionaryOwner::Method(m) => u.method_instantiation(*m),
        };
        for arg in args {
            if !u.is_canonical_subtype(arg, CanonicalFormKind::Any) {
                deps.push(self.factory.constructed_type(arg), "dictionary argument");
            }
        }
        for kind in self.dictionary.entries(u, owner) {
            deps.push(self.factory.node(kind), "dictionary entry");
        }
    }
}

impl DependencyProvider for CompilationEngine<'_> {
    fn compute_dependencies(&self, node: NodeId) -> Result<NodeDependencies, CompilationError> {
        let u = self.universe();
        let mut deps = NodeDependencies::default();
        match self.factory.kind(node) {
            NodeKind::ConstructedType(ty) => self.constructed_type_deps(ty, &mut deps)?,
            NodeKind::MethodCode(method) => self.method_code_deps(method, &mut deps)?,
            // Pure trigger: consumed by the conditional edges registered on
            // constructed types.
            NodeKind::VirtualMethodUse(method) => {
                let owner = u.method_owner(method);
                if !self.vtable.slice(u, owner).is_empty() {
                    deps.push(self.factory.vtable_slice(owner), "slot-defining slice");
                }
            }
            NodeKind::VTableSlice(ty) => {
                if let Some(base) = u.base_type(ty) {
                    if has_vtable(u, self.vtable, base) {
                        deps.push(self.factory.vtable_slice(base), "base slice");
                    }
                }
            }
            NodeKind::GenericDictionary(owner) => self.dictionary_deps(&owner, &mut deps),
            NodeKind::ShadowConcreteMethod { method, canon } => {
                deps.push(self.factory.method_code(canon), "canonical body");
                let dict_owner = if u.method_instantiation(method).is_empty() {
                    DictionaryOwner::Type(u.method_owner(method))
                } else {
                    DictionaryOwner::Method(method)
                };
                deps.push(
                    self.factory.generic_dictionary(dict_owner),
                    "instantiation dictionary",
                );
            }
            NodeKind::GcStaticBase(ty) | NodeKind::ThreadStaticBase(ty) => {
                // The cctor context lives in the non-GC base.
                if u.static_constructor(ty).is_some() {
                    deps.push(
                        self.factory.node(NodeKind::NonGcStaticBase(ty)),
                        "cctor context",
                    );
                }
            }
            NodeKind::NonGcStaticBase(ty) => {
                if let Some(cctor) = u.static_constructor(ty) {
                    let target = u.canon_method_target(cctor, CanonicalFormKind::Specific);
                    deps.push(self.factory.method_code(target), "static constructor");
                }
            }
            NodeKind::ModuleMetadata(module) => {
                for kind in self.metadata.module_dependencies(u, module) {
                    deps.push(self.factory.node(kind), "module metadata");
                }
            }
            NodeKind::ExternSymbol(_) => {}
        }
        Ok(deps)
    }
}
