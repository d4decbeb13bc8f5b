//! Universe construction
//!
//! [`UniverseBuilder`] is the ingestion API: a metadata reader (or a test)
//! registers modules, type definitions, methods and fields, then calls
//! [`UniverseBuilder::finish`]. Handle assignment follows registration order,
//! so identical inputs always produce identical handles.

use std::sync::Arc;

use crate::body::MethodBody;
use crate::handles::{FieldId, MethodId, ModuleId, TypeId};
use crate::method::{FieldDef, MethodDef, MethodFlags, MethodSignature};
use crate::ty::{GenericParamDef, PrimitiveKind, TypeDef, TypeFlags, TypeKind};
use crate::universe::{MethodData, ModuleData, TypeData, Universe, WellKnownTable};

/// Incremental builder for a [`Universe`].
pub struct UniverseBuilder {
    universe: Universe,
}

impl Default for UniverseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl UniverseBuilder {
    /// Empty builder.
    pub fn new() -> Self {
        Self {
            universe: Universe::empty(),
        }
    }

    /// Register a module.
    pub fn define_module(&mut self, name: impl Into<String>) -> ModuleId {
        let mut modules = self.universe.modules.write();
        let id = ModuleId(modules.len() as u32);
        modules.push(ModuleData {
            name: name.into(),
            is_system: false,
            types: Vec::new(),
        });
        id
    }

    /// Register the system (core library) module and its well-known types:
    /// `System.Object`, the primitives, `__Canon` and `__UniversalCanon`.
    pub fn define_system_module(&mut self, name: impl Into<String>) -> ModuleId {
        let module = self.define_module(name);
        self.universe.modules.write()[module_index(module)].is_system = true;

        let object = self.define_type(module, "System", "Object", TypeKind::Class, None);
        let mut primitives = [object; PrimitiveKind::ALL.len()];
        for (i, prim) in PrimitiveKind::ALL.iter().enumerate() {
            primitives[i] = self.define_type(
                module,
                "System",
                prim.name(),
                TypeKind::Primitive(*prim),
                Some(object),
            );
        }
        let canon = self.define_type(module, "System", "__Canon", TypeKind::Canon, Some(object));
        let universal_canon = self.define_type(
            module,
            "System",
            "__UniversalCanon",
            TypeKind::UniversalCanon,
            Some(object),
        );

        self.universe
            .well_known
            .set(WellKnownTable {
                object,
                canon,
                universal_canon,
                primitives,
            })
            .ok();
        module
    }

    fn define_type(
        &mut self,
        module: ModuleId,
        namespace: &str,
        name: &str,
        kind: TypeKind,
        base: Option<TypeId>,
    ) -> TypeId {
        self.define_type_full(
            module,
            namespace,
            name,
            kind,
            base,
            TypeFlags::default(),
            Vec::new(),
        )
    }

    /// Register a type definition with all knobs exposed.
    #[allow(clippy::too_many_arguments)]
    pub fn define_type_full(
        &mut self,
        module: ModuleId,
        namespace: impl Into<String>,
        name: impl Into<String>,
        kind: TypeKind,
        base: Option<TypeId>,
        flags: TypeFlags,
        generic_params: Vec<GenericParamDef>,
    ) -> TypeId {
        let id = self.universe.push_type(TypeData::Definition(Arc::new(TypeDef {
            name: name.into(),
            namespace: namespace.into(),
            module,
            kind,
            base,
            flags,
            generic_params,
            methods: Vec::new(),
            fields: Vec::new(),
        })));
        self.universe.modules.write()[module_index(module)].types.push(id);
        id
    }

    /// Register a class.
    pub fn define_class(
        &mut self,
        module: ModuleId,
        namespace: impl Into<String>,
        name: impl Into<String>,
        base: TypeId,
    ) -> TypeId {
        self.define_type_full(
            module,
            namespace,
            name,
            TypeKind::Class,
            Some(base),
            TypeFlags::default(),
            Vec::new(),
        )
    }

    /// Register a generic class.
    pub fn define_generic_class(
        &mut self,
        module: ModuleId,
        namespace: impl Into<String>,
        name: impl Into<String>,
        base: TypeId,
        generic_params: Vec<GenericParamDef>,
    ) -> TypeId {
        self.define_type_full(
            module,
            namespace,
            name,
            TypeKind::Class,
            Some(base),
            TypeFlags::default(),
            generic_params,
        )
    }

    /// Register a value type.
    pub fn define_struct(
        &mut self,
        module: ModuleId,
        namespace: impl Into<String>,
        name: impl Into<String>,
        base: TypeId,
    ) -> TypeId {
        self.define_type_full(
            module,
            namespace,
            name,
            TypeKind::ValueType,
            Some(base),
            TypeFlags::default(),
            Vec::new(),
        )
    }

    /// Register a generic value type.
    pub fn define_generic_struct(
        &mut self,
        module: ModuleId,
        namespace: impl Into<String>,
        name: impl Into<String>,
        base: TypeId,
        generic_params: Vec<GenericParamDef>,
    ) -> TypeId {
        self.define_type_full(
            module,
            namespace,
            name,
            TypeKind::ValueType,
            Some(base),
            TypeFlags::default(),
            generic_params,
        )
    }

    /// Register an interface.
    pub fn define_interface(
        &mut self,
        module: ModuleId,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> TypeId {
        self.define_type_full(
            module,
            namespace,
            name,
            TypeKind::Interface,
            None,
            TypeFlags {
                is_abstract: true,
                ..TypeFlags::default()
            },
            Vec::new(),
        )
    }

    /// Register a delegate type. The `Invoke` slot is synthesized by the
    /// vtable layer, not declared here; the builder records the bodyless
    /// method so call sites have something to reference.
    pub fn define_delegate(
        &mut self,
        module: ModuleId,
        namespace: impl Into<String>,
        name: impl Into<String>,
        base: TypeId,
        invoke_signature: MethodSignature,
    ) -> (TypeId, MethodId) {
        let ty = self.define_type_full(
            module,
            namespace,
            name,
            TypeKind::Delegate,
            Some(base),
            TypeFlags {
                is_sealed: true,
                ..TypeFlags::default()
            },
            Vec::new(),
        );
        let invoke = self.define_method(
            ty,
            "Invoke",
            MethodFlags::default(),
            invoke_signature,
            None,
        );
        (ty, invoke)
    }

    /// Register a stand-in for a type that failed to resolve.
    pub fn define_missing_type(
        &mut self,
        module: ModuleId,
        namespace: impl Into<String>,
        name: impl Into<String>,
        base: TypeId,
    ) -> TypeId {
        self.define_type_full(
            module,
            namespace,
            name,
            TypeKind::Class,
            Some(base),
            TypeFlags {
                is_missing: true,
                ..TypeFlags::default()
            },
            Vec::new(),
        )
    }

    /// Register a method on a type definition.
    pub fn define_method(
        &mut self,
        owner: TypeId,
        name: impl Into<String>,
        flags: MethodFlags,
        signature: MethodSignature,
        body: Option<MethodBody>,
    ) -> MethodId {
        self.define_method_full(owner, name, flags, signature, Vec::new(), body, None)
    }

    /// Register a method with generic parameters and an optional export name.
    #[allow(clippy::too_many_arguments)]
    pub fn define_method_full(
        &mut self,
        owner: TypeId,
        name: impl Into<String>,
        flags: MethodFlags,
        signature: MethodSignature,
        generic_params: Vec<GenericParamDef>,
        body: Option<MethodBody>,
        export_name: Option<String>,
    ) -> MethodId {
        let id = self.universe.push_method(MethodData::Definition(Arc::new(MethodDef {
            name: name.into(),
            owner,
            flags,
            signature,
            generic_params,
            body,
            export_name,
        })));
        self.attach_method(owner, id);
        id
    }

    /// Register a field on a type definition.
    pub fn define_field(
        &mut self,
        owner: TypeId,
        name: impl Into<String>,
        ty: TypeId,
        is_static: bool,
        is_thread_static: bool,
    ) -> FieldId {
        let id = self.universe.push_field(FieldDef {
            name: name.into(),
            owner,
            ty,
            is_static,
            is_thread_static,
            is_missing: false,
        });
        self.attach_field(owner, id);
        id
    }

    /// Register a stand-in for a field that failed to resolve.
    pub fn define_missing_field(
        &mut self,
        owner: TypeId,
        name: impl Into<String>,
        ty: TypeId,
    ) -> FieldId {
        let id = self.universe.push_field(FieldDef {
            name: name.into(),
            owner,
            ty,
            is_static: false,
            is_thread_static: false,
            is_missing: true,
        });
        self.attach_field(owner, id);
        id
    }

    /// Reference to generic parameter `index` of the enclosing type.
    pub fn type_param(&self, index: u16) -> TypeId {
        self.universe.type_param(index)
    }

    /// Reference to generic parameter `index` of the enclosing method.
    pub fn method_param(&self, index: u16) -> TypeId {
        self.universe.method_param(index)
    }

    /// Direct access to the universe under construction, for queries the
    /// builder surface does not cover (e.g. pre-instantiating a generic).
    pub fn universe(&self) -> &Universe {
        &self.universe
    }

    /// Freeze and hand out the universe.
    pub fn finish(self) -> Arc<Universe> {
        Arc::new(self.universe)
    }

    fn attach_method(&mut self, owner: TypeId, method: MethodId) {
        let mut types = self.universe.types.write();
        if let TypeData::Definition(def) = &mut types[type_index(owner)] {
            Arc::make_mut(def).methods.push(method);
        }
    }

    fn attach_field(&mut self, owner: TypeId, field: FieldId) {
        let mut types = self.universe.types.write();
        if let TypeData::Definition(def) = &mut types[type_index(owner)] {
            Arc::make_mut(def).fields.push(field);
        }
    }
}

fn module_index(module: ModuleId) -> usize {
    module.0 as usize
}

fn type_index(ty: TypeId) -> usize {
    ty.0 as usize
}
