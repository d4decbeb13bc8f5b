//! The type/method universe
//!
//! Interned storage for every type, method and field the compilation can
//! see, plus the instantiation algebra over them. All tables are append-only:
//! instantiating a generic adds entries but never changes existing ones, so
//! handles stay valid for the lifetime of the universe.
//!
//! Interning guarantees one handle per distinct instantiation under
//! concurrent access; the dependency graph relies on that for deduplication.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::body::MethodBody;
use crate::error::{ResolutionError, UniverseError};
use crate::handles::{FieldId, MethodId, ModuleId, TypeId};
use crate::method::{FieldDef, MethodDef, MethodFlags, MethodSignature, StaticBaseKind};
use crate::ty::{GenericParamDef, PrimitiveKind, TypeDef, TypeKind};

/// Ordered sequence of type arguments bound to a generic definition.
pub type Instantiation = Vec<TypeId>;

/// Which canonical form a conversion targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalFormKind {
    /// Reference arguments collapse to `__Canon`; value-type arguments keep
    /// their layout identity (their own instantiations canonicalize
    /// recursively).
    Specific,
    /// Every argument collapses to `__UniversalCanon` regardless of shape.
    Universal,
    /// Query-only: matches either canonical stand-in. Not a conversion target.
    Any,
}

/// Types the compilation core needs to be able to find by identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WellKnownType {
    /// `System.Object`
    Object,
    /// A primitive type
    Primitive(PrimitiveKind),
    /// `System.__Canon`
    Canon,
    /// `System.__UniversalCanon`
    UniversalCanon,
}

impl WellKnownType {
    fn name(self) -> &'static str {
        match self {
            WellKnownType::Object => "Object",
            WellKnownType::Primitive(p) => p.name(),
            WellKnownType::Canon => "__Canon",
            WellKnownType::UniversalCanon => "__UniversalCanon",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum TypeData {
    Definition(Arc<TypeDef>),
    Instantiated { def: TypeId, args: Instantiation },
    Array { element: TypeId },
    TypeParameter { index: u16 },
    MethodParameter { index: u16 },
}

#[derive(Debug, Clone)]
pub(crate) enum MethodData {
    Definition(Arc<MethodDef>),
    Instantiated {
        def: MethodId,
        owner: TypeId,
        args: Instantiation,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TypeKey {
    Instantiated(TypeId, Instantiation),
    Array(TypeId),
    TypeParameter(u16),
    MethodParameter(u16),
}

type MethodKey = (MethodId, TypeId, Instantiation);

#[derive(Debug)]
pub(crate) struct ModuleData {
    pub(crate) name: String,
    pub(crate) is_system: bool,
    pub(crate) types: Vec<TypeId>,
}

pub(crate) struct WellKnownTable {
    pub(crate) object: TypeId,
    pub(crate) canon: TypeId,
    pub(crate) universal_canon: TypeId,
    pub(crate) primitives: [TypeId; PrimitiveKind::ALL.len()],
}

/// The queryable type/method/field universe.
pub struct Universe {
    pub(crate) modules: RwLock<Vec<ModuleData>>,
    pub(crate) types: RwLock<Vec<TypeData>>,
    pub(crate) methods: RwLock<Vec<MethodData>>,
    pub(crate) fields: RwLock<Vec<FieldDef>>,
    type_interner: Mutex<FxHashMap<TypeKey, TypeId>>,
    method_interner: Mutex<FxHashMap<MethodKey, MethodId>>,
    pub(crate) well_known: OnceCell<WellKnownTable>,
}

impl Universe {
    pub(crate) fn empty() -> Self {
        Self {
            modules: RwLock::new(Vec::new()),
            types: RwLock::new(Vec::new()),
            methods: RwLock::new(Vec::new()),
            fields: RwLock::new(Vec::new()),
            type_interner: Mutex::new(FxHashMap::default()),
            method_interner: Mutex::new(FxHashMap::default()),
            well_known: OnceCell::new(),
        }
    }

    pub(crate) fn push_type(&self, data: TypeData) -> TypeId {
        let mut types = self.types.write();
        let id = TypeId(types.len() as u32);
        types.push(data);
        id
    }

    pub(crate) fn push_method(&self, data: MethodData) -> MethodId {
        let mut methods = self.methods.write();
        let id = MethodId(methods.len() as u32);
        methods.push(data);
        id
    }

    pub(crate) fn push_field(&self, def: FieldDef) -> FieldId {
        let mut fields = self.fields.write();
        let id = FieldId(fields.len() as u32);
        fields.push(def);
        id
    }

    fn type_data(&self, ty: TypeId) -> TypeData {
        self.types.read()[ty.0 as usize].clone()
    }

    fn method_data(&self, method: MethodId) -> MethodData {
        self.methods.read()[method.0 as usize].clone()
    }

    // ---------------------------------------------------------------------
    // Modules
    // ---------------------------------------------------------------------

    /// All modules, in registration order.
    pub fn modules(&self) -> Vec<ModuleId> {
        (0..self.modules.read().len() as u32).map(ModuleId).collect()
    }

    /// Name of a module.
    pub fn module_name(&self, module: ModuleId) -> String {
        self.modules.read()[module.0 as usize].name.clone()
    }

    /// Whether the module is the system (core library) module.
    pub fn module_is_system(&self, module: ModuleId) -> bool {
        self.modules.read()[module.0 as usize].is_system
    }

    /// Type definitions declared in a module, in metadata order.
    pub fn module_types(&self, module: ModuleId) -> Vec<TypeId> {
        self.modules.read()[module.0 as usize].types.clone()
    }

    // ---------------------------------------------------------------------
    // Well-known types
    // ---------------------------------------------------------------------

    /// Look up a well-known type. Absence is fatal: it means the core library
    /// this universe was populated from is broken or incompatible.
    pub fn well_known(&self, wk: WellKnownType) -> Result<TypeId, UniverseError> {
        let table = self
            .well_known
            .get()
            .ok_or(UniverseError::MissingWellKnownType { name: wk.name() })?;
        Ok(match wk {
            WellKnownType::Object => table.object,
            WellKnownType::Canon => table.canon,
            WellKnownType::UniversalCanon => table.universal_canon,
            WellKnownType::Primitive(p) => table.primitives[p.index()],
        })
    }

    /// `System.Object`.
    pub fn object(&self) -> Result<TypeId, UniverseError> {
        self.well_known(WellKnownType::Object)
    }

    /// `System.__Canon`.
    pub fn canon(&self) -> Result<TypeId, UniverseError> {
        self.well_known(WellKnownType::Canon)
    }

    /// `System.__UniversalCanon`.
    pub fn universal_canon(&self) -> Result<TypeId, UniverseError> {
        self.well_known(WellKnownType::UniversalCanon)
    }

    // ---------------------------------------------------------------------
    // Type queries
    // ---------------------------------------------------------------------

    /// Kind of a type. Arrays report as sealed classes.
    pub fn type_kind(&self, ty: TypeId) -> TypeKind {
        match self.type_data(ty) {
            TypeData::Definition(def) => def.kind,
            TypeData::Instantiated { def, .. } => self.type_kind(def),
            TypeData::Array { .. } => TypeKind::Class,
            TypeData::TypeParameter { .. } | TypeData::MethodParameter { .. } => TypeKind::Class,
        }
    }

    /// Whether instances of the type are object references.
    pub fn is_reference_type(&self, ty: TypeId) -> bool {
        match self.type_data(ty) {
            TypeData::Definition(def) => def.kind.is_reference(),
            TypeData::Instantiated { def, .. } => self.is_reference_type(def),
            TypeData::Array { .. } => true,
            TypeData::TypeParameter { .. } | TypeData::MethodParameter { .. } => false,
        }
    }

    /// Whether the type is a value type (struct or primitive).
    pub fn is_value_type(&self, ty: TypeId) -> bool {
        matches!(
            self.type_kind(ty),
            TypeKind::ValueType | TypeKind::Primitive(_)
        )
    }

    /// Element type if `ty` is an array.
    pub fn array_element(&self, ty: TypeId) -> Option<TypeId> {
        match self.type_data(ty) {
            TypeData::Array { element } => Some(element),
            _ => None,
        }
    }

    /// The definition a type was instantiated from; the type itself if it is
    /// a definition, array or generic parameter.
    pub fn definition(&self, ty: TypeId) -> TypeId {
        match self.type_data(ty) {
            TypeData::Instantiated { def, .. } => def,
            _ => ty,
        }
    }

    /// Instantiation arguments if `ty` is an instantiated generic.
    pub fn instantiation_of(&self, ty: TypeId) -> Option<(TypeId, Instantiation)> {
        match self.type_data(ty) {
            TypeData::Instantiated { def, args } => Some((def, args)),
            _ => None,
        }
    }

    /// The definition record, if `ty` is a definition.
    pub fn type_def(&self, ty: TypeId) -> Option<Arc<TypeDef>> {
        match self.type_data(ty) {
            TypeData::Definition(def) => Some(def),
            _ => None,
        }
    }

    fn def_of(&self, ty: TypeId) -> Option<Arc<TypeDef>> {
        self.type_def(self.definition(ty))
    }

    /// Whether `ty` is an uninstantiated generic definition.
    pub fn is_generic_definition(&self, ty: TypeId) -> bool {
        self.type_def(ty)
            .map(|d| !d.generic_params.is_empty())
            .unwrap_or(false)
    }

    /// Generic parameters declared by the type's definition.
    pub fn generic_params_of_type(&self, ty: TypeId) -> Vec<GenericParamDef> {
        self.def_of(ty)
            .map(|d| d.generic_params.clone())
            .unwrap_or_default()
    }

    /// Module the type's definition lives in. Arrays report their element's
    /// module; generic parameters report the system module.
    pub fn module_of_type(&self, ty: TypeId) -> ModuleId {
        match self.type_data(ty) {
            TypeData::Definition(def) => def.module,
            TypeData::Instantiated { def, .. } => self.module_of_type(def),
            TypeData::Array { element } => self.module_of_type(element),
            TypeData::TypeParameter { .. } | TypeData::MethodParameter { .. } => ModuleId(0),
        }
    }

    /// Base type, with generic arguments substituted for instantiated types.
    pub fn base_type(&self, ty: TypeId) -> Option<TypeId> {
        match self.type_data(ty) {
            TypeData::Definition(def) => def.base,
            TypeData::Instantiated { def, args } => {
                let base = self.type_def(def)?.base?;
                Some(self.substitute(base, &args, &[]))
            }
            TypeData::Array { .. } => self.object().ok(),
            TypeData::TypeParameter { .. } | TypeData::MethodParameter { .. } => None,
        }
    }

    /// Declared methods of the type, in metadata order. On an instantiated
    /// type, each is the instantiation of the definition's method over this
    /// owner (generic methods stay open).
    pub fn methods_of(&self, ty: TypeId) -> Vec<MethodId> {
        match self.type_data(ty) {
            TypeData::Definition(def) => def.methods.clone(),
            TypeData::Instantiated { def, .. } => {
                let methods = match self.type_def(def) {
                    Some(d) => d.methods.clone(),
                    None => return Vec::new(),
                };
                methods
                    .into_iter()
                    .map(|m| self.intern_method(m, ty, Vec::new()))
                    .collect()
            }
            _ => Vec::new(),
        }
    }

    /// Declared fields of the type's definition.
    pub fn fields_of(&self, ty: TypeId) -> Vec<FieldId> {
        self.def_of(ty).map(|d| d.fields.clone()).unwrap_or_default()
    }

    /// Static constructor of the type, if declared.
    pub fn static_constructor(&self, ty: TypeId) -> Option<MethodId> {
        self.methods_of(ty)
            .into_iter()
            .find(|m| self.method_flags(*m).is_cctor)
    }

    /// Finalizer of the type, if declared.
    pub fn finalizer(&self, ty: TypeId) -> Option<MethodId> {
        self.methods_of(ty)
            .into_iter()
            .find(|m| self.method_flags(*m).is_finalizer)
    }

    /// Whether the type declares any static fields in the given region,
    /// with generic arguments substituted when deciding GC shape.
    pub fn has_statics(&self, ty: TypeId, kind: StaticBaseKind) -> bool {
        let fields = self.fields_of(ty);
        fields.iter().any(|f| {
            let def = self.field_def(*f);
            if !def.is_static {
                return false;
            }
            match kind {
                StaticBaseKind::Thread => def.is_thread_static,
                StaticBaseKind::Gc => {
                    !def.is_thread_static && self.is_reference_type(self.field_type_on(*f, ty))
                }
                StaticBaseKind::NonGc => {
                    !def.is_thread_static && !self.is_reference_type(self.field_type_on(*f, ty))
                }
            }
        })
    }

    // ---------------------------------------------------------------------
    // Field queries
    // ---------------------------------------------------------------------

    /// The field record.
    pub fn field_def(&self, field: FieldId) -> FieldDef {
        self.fields.read()[field.0 as usize].clone()
    }

    /// Field type with the context type's instantiation substituted.
    pub fn field_type_on(&self, field: FieldId, context: TypeId) -> TypeId {
        let ty = self.field_def(field).ty;
        match self.instantiation_of(context) {
            Some((_, args)) => self.substitute(ty, &args, &[]),
            None => ty,
        }
    }

    /// Owning type of a field as seen from an execution context: if the
    /// context type instantiates the field's declaring definition, the
    /// instantiated owner is returned.
    pub fn field_owner_in_context(&self, field: FieldId, context_owner: TypeId) -> TypeId {
        let declared = self.field_def(field).owner;
        if self.definition(context_owner) == declared {
            context_owner
        } else {
            declared
        }
    }

    /// Which statics region a static field lives in.
    pub fn static_base_kind(&self, field: FieldId, owner: TypeId) -> StaticBaseKind {
        let def = self.field_def(field);
        if def.is_thread_static {
            StaticBaseKind::Thread
        } else if self.is_reference_type(self.field_type_on(field, owner)) {
            StaticBaseKind::Gc
        } else {
            StaticBaseKind::NonGc
        }
    }

    // ---------------------------------------------------------------------
    // Method queries
    // ---------------------------------------------------------------------

    /// The definition record behind a method handle.
    pub fn method_def(&self, method: MethodId) -> Arc<MethodDef> {
        match self.method_data(method) {
            MethodData::Definition(def) => def,
            MethodData::Instantiated { def, .. } => self.method_def(def),
        }
    }

    /// Simple name of the method.
    pub fn method_name(&self, method: MethodId) -> String {
        self.method_def(method).name.clone()
    }

    /// Attributes of the method.
    pub fn method_flags(&self, method: MethodId) -> MethodFlags {
        self.method_def(method).flags
    }

    /// Owning type: the instantiated owner for instantiated methods, the
    /// declaring definition otherwise.
    pub fn method_owner(&self, method: MethodId) -> TypeId {
        match self.method_data(method) {
            MethodData::Definition(def) => def.owner,
            MethodData::Instantiated { owner, .. } => owner,
        }
    }

    /// The uninstantiated method definition handle.
    pub fn method_definition(&self, method: MethodId) -> MethodId {
        match self.method_data(method) {
            MethodData::Definition(_) => method,
            MethodData::Instantiated { def, .. } => def,
        }
    }

    /// Generic arguments of the method itself (not its owner). Empty for
    /// uninstantiated methods.
    pub fn method_instantiation(&self, method: MethodId) -> Instantiation {
        match self.method_data(method) {
            MethodData::Definition(_) => Vec::new(),
            MethodData::Instantiated { args, .. } => args,
        }
    }

    /// Whether the method's definition declares generic parameters that have
    /// not been bound.
    pub fn is_generic_method_definition(&self, method: MethodId) -> bool {
        !self.method_def(method).generic_params.is_empty()
            && self.method_instantiation(method).is_empty()
    }

    /// Signature with owner and method instantiations substituted.
    pub fn method_signature(&self, method: MethodId) -> MethodSignature {
        let def = self.method_def(method);
        let owner_args = self
            .instantiation_of(self.method_owner(method))
            .map(|(_, args)| args)
            .unwrap_or_default();
        let method_args = self.method_instantiation(method);
        MethodSignature {
            params: def
                .signature
                .params
                .iter()
                .map(|p| self.substitute(*p, &owner_args, &method_args))
                .collect(),
            ret: self.substitute(def.signature.ret, &owner_args, &method_args),
        }
    }

    /// IL body shared by all instantiations of the method's definition.
    pub fn method_body(&self, method: MethodId) -> Option<MethodBody> {
        self.method_def(method).body.clone()
    }

    /// Export name if the method is a runtime export.
    pub fn method_export_name(&self, method: MethodId) -> Option<String> {
        self.method_def(method).export_name.clone()
    }

    /// Map a callee referenced from a method body to the caller's execution
    /// context: a reference to a method of the caller's own (generic)
    /// definition resolves to the instantiated owner.
    pub fn method_in_context(&self, callee: MethodId, context_owner: TypeId) -> MethodId {
        let declared_owner = self.method_owner(self.method_definition(callee));
        if self.definition(context_owner) == declared_owner && context_owner != declared_owner {
            self.intern_method(
                self.method_definition(callee),
                context_owner,
                self.method_instantiation(callee),
            )
        } else {
            callee
        }
    }

    // ---------------------------------------------------------------------
    // Instantiation algebra
    // ---------------------------------------------------------------------

    fn intern_type(&self, key: TypeKey, data: impl FnOnce() -> TypeData) -> TypeId {
        let mut interner = self.type_interner.lock();
        if let Some(existing) = interner.get(&key) {
            return *existing;
        }
        let id = self.push_type(data());
        interner.insert(key, id);
        id
    }

    fn intern_method(&self, def: MethodId, owner: TypeId, args: Instantiation) -> MethodId {
        let declared_owner = self.method_def(def).owner;
        if owner == declared_owner && args.is_empty() {
            return def;
        }
        let key = (def, owner, args.clone());
        let mut interner = self.method_interner.lock();
        if let Some(existing) = interner.get(&key) {
            return *existing;
        }
        let id = self.push_method(MethodData::Instantiated { def, owner, args });
        interner.insert(key, id);
        id
    }

    /// Bind type arguments to a generic type definition.
    pub fn instantiate_type(
        &self,
        def: TypeId,
        args: Instantiation,
    ) -> Result<TypeId, UniverseError> {
        let type_def = self.type_def(def).ok_or_else(|| UniverseError::NotGeneric {
            definition: self.type_display(def),
        })?;
        if type_def.generic_params.is_empty() {
            return Err(UniverseError::NotGeneric {
                definition: self.type_display(def),
            });
        }
        if type_def.generic_params.len() != args.len() {
            return Err(UniverseError::ArityMismatch {
                definition: self.type_display(def),
                expected: type_def.generic_params.len(),
                actual: args.len(),
            });
        }
        Ok(self.intern_type(TypeKey::Instantiated(def, args.clone()), || {
            TypeData::Instantiated { def, args }
        }))
    }

    /// Bind method arguments (and an owner) to a generic method definition.
    pub fn instantiate_method(
        &self,
        def: MethodId,
        owner: TypeId,
        args: Instantiation,
    ) -> Result<MethodId, UniverseError> {
        let method_def = self.method_def(def);
        if method_def.generic_params.len() != args.len() {
            return Err(UniverseError::ArityMismatch {
                definition: self.method_display(def),
                expected: method_def.generic_params.len(),
                actual: args.len(),
            });
        }
        Ok(self.intern_method(self.method_definition(def), owner, args))
    }

    /// The array type over `element`.
    pub fn array_of(&self, element: TypeId) -> TypeId {
        self.intern_type(TypeKey::Array(element), || TypeData::Array { element })
    }

    /// Reference to the owning type's generic parameter `index`.
    pub fn type_param(&self, index: u16) -> TypeId {
        self.intern_type(TypeKey::TypeParameter(index), || TypeData::TypeParameter {
            index,
        })
    }

    /// Reference to the owning method's generic parameter `index`.
    pub fn method_param(&self, index: u16) -> TypeId {
        self.intern_type(TypeKey::MethodParameter(index), || {
            TypeData::MethodParameter { index }
        })
    }

    /// Replace generic parameter references with concrete arguments.
    pub fn substitute(&self, ty: TypeId, type_args: &[TypeId], method_args: &[TypeId]) -> TypeId {
        match self.type_data(ty) {
            TypeData::TypeParameter { index } => type_args
                .get(index as usize)
                .copied()
                .unwrap_or(ty),
            TypeData::MethodParameter { index } => method_args
                .get(index as usize)
                .copied()
                .unwrap_or(ty),
            TypeData::Instantiated { def, args } => {
                let new_args: Instantiation = args
                    .iter()
                    .map(|a| self.substitute(*a, type_args, method_args))
                    .collect();
                if new_args == args {
                    ty
                } else {
                    self.intern_type(TypeKey::Instantiated(def, new_args.clone()), || {
                        TypeData::Instantiated {
                            def,
                            args: new_args,
                        }
                    })
                }
            }
            TypeData::Array { element } => {
                let new_element = self.substitute(element, type_args, method_args);
                if new_element == element {
                    ty
                } else {
                    self.array_of(new_element)
                }
            }
            TypeData::Definition(_) => ty,
        }
    }

    // ---------------------------------------------------------------------
    // Canonicalization
    // ---------------------------------------------------------------------

    fn canon_arg(&self, arg: TypeId, kind: CanonicalFormKind) -> TypeId {
        let canon = match self.canon() {
            Ok(c) => c,
            Err(_) => return arg,
        };
        let universal = match self.universal_canon() {
            Ok(c) => c,
            Err(_) => return arg,
        };
        match kind {
            CanonicalFormKind::Universal => universal,
            CanonicalFormKind::Specific => {
                if arg == canon || arg == universal {
                    arg
                } else if self.is_reference_type(arg) {
                    canon
                } else if self.is_value_type(arg) {
                    // Value types keep their layout identity but their own
                    // instantiation canonicalizes recursively.
                    self.convert_to_canon_form(arg, CanonicalFormKind::Specific)
                } else {
                    arg
                }
            }
            // Any is a query kind, never a conversion target.
            CanonicalFormKind::Any => unreachable!("CanonicalFormKind::Any is query-only"),
        }
    }

    /// Convert a type to its canonical form. Idempotent and arity-preserving.
    ///
    /// `kind` must be `Specific` or `Universal`.
    pub fn convert_to_canon_form(&self, ty: TypeId, kind: CanonicalFormKind) -> TypeId {
        assert!(
            !matches!(kind, CanonicalFormKind::Any),
            "CanonicalFormKind::Any is query-only"
        );
        match self.type_data(ty) {
            TypeData::Definition(_)
            | TypeData::TypeParameter { .. }
            | TypeData::MethodParameter { .. } => ty,
            TypeData::Array { element } => {
                let canon_element = self.canon_arg(element, kind);
                if canon_element == element {
                    ty
                } else {
                    self.array_of(canon_element)
                }
            }
            TypeData::Instantiated { def, args } => {
                let canon_args: Instantiation =
                    args.iter().map(|a| self.canon_arg(*a, kind)).collect();
                if canon_args == args {
                    ty
                } else {
                    self.intern_type(TypeKey::Instantiated(def, canon_args.clone()), || {
                        TypeData::Instantiated {
                            def,
                            args: canon_args,
                        }
                    })
                }
            }
        }
    }

    /// Whether the type's composition involves a canonical stand-in of the
    /// given kind (`Any` matches either).
    pub fn is_canonical_subtype(&self, ty: TypeId, kind: CanonicalFormKind) -> bool {
        let matches_standin = |t: TypeId| {
            let k = self.def_of(t).map(|d| d.kind);
            match kind {
                CanonicalFormKind::Specific => k == Some(TypeKind::Canon),
                CanonicalFormKind::Universal => k == Some(TypeKind::UniversalCanon),
                CanonicalFormKind::Any => {
                    matches!(k, Some(TypeKind::Canon) | Some(TypeKind::UniversalCanon))
                }
            }
        };
        if matches_standin(ty) {
            return true;
        }
        match self.type_data(ty) {
            TypeData::Instantiated { args, .. } => {
                args.iter().any(|a| self.is_canonical_subtype(*a, kind))
            }
            TypeData::Array { element } => self.is_canonical_subtype(element, kind),
            _ => false,
        }
    }

    /// Whether the type is compiled once in canonical form and reused across
    /// concrete instantiations (its canonical conversion differs from itself).
    pub fn is_shared_type(&self, ty: TypeId) -> bool {
        self.convert_to_canon_form(ty, CanonicalFormKind::Specific) != ty
    }

    /// The canonical method a call to `method` actually executes, when the
    /// owner or method instantiation is shared.
    pub fn canon_method_target(&self, method: MethodId, kind: CanonicalFormKind) -> MethodId {
        let owner = self.method_owner(method);
        let canon_owner = self.convert_to_canon_form(owner, kind);
        let args = self.method_instantiation(method);
        let canon_args: Instantiation = args.iter().map(|a| self.canon_arg(*a, kind)).collect();
        if canon_owner == owner && canon_args == args {
            method
        } else {
            self.intern_method(self.method_definition(method), canon_owner, canon_args)
        }
    }

    /// Whether the method is compiled once in canonical form and shared.
    pub fn is_shared_method(&self, method: MethodId) -> bool {
        self.canon_method_target(method, CanonicalFormKind::Specific) != method
    }

    // ---------------------------------------------------------------------
    // Resolvability
    // ---------------------------------------------------------------------

    /// Fail if the type's composition involves a missing stand-in.
    pub fn check_type_resolvable(&self, ty: TypeId) -> Result<(), ResolutionError> {
        match self.type_data(ty) {
            TypeData::Definition(def) => {
                if def.flags.is_missing {
                    Err(ResolutionError::MissingType {
                        name: def.qualified_name(),
                    })
                } else {
                    Ok(())
                }
            }
            TypeData::Instantiated { def, args } => {
                self.check_type_resolvable(def)?;
                for arg in args {
                    self.check_type_resolvable(arg)?;
                }
                Ok(())
            }
            TypeData::Array { element } => self.check_type_resolvable(element),
            TypeData::TypeParameter { .. } | TypeData::MethodParameter { .. } => Ok(()),
        }
    }

    /// Fail if the method, its owner, its signature or its instantiation
    /// involves a missing stand-in.
    pub fn check_method_resolvable(&self, method: MethodId) -> Result<(), ResolutionError> {
        let def = self.method_def(method);
        if def.flags.is_missing {
            return Err(ResolutionError::MissingMethod {
                name: self.method_display(method),
            });
        }
        self.check_type_resolvable(self.method_owner(method))?;
        for ty in def.signature.component_types() {
            self.check_type_resolvable(ty)?;
        }
        for arg in self.method_instantiation(method) {
            self.check_type_resolvable(arg)?;
        }
        Ok(())
    }

    /// Fail if the field or its type involves a missing stand-in.
    pub fn check_field_resolvable(&self, field: FieldId) -> Result<(), ResolutionError> {
        let def = self.field_def(field);
        if def.is_missing {
            return Err(ResolutionError::MissingField {
                name: format!("{}.{}", self.type_display(def.owner), def.name),
            });
        }
        self.check_type_resolvable(def.ty)
    }

    // ---------------------------------------------------------------------
    // Display
    // ---------------------------------------------------------------------

    /// Structural display name: module-qualified, discovery-order
    /// independent. Used for deterministic ordering and diagnostics.
    pub fn type_display(&self, ty: TypeId) -> String {
        match self.type_data(ty) {
            TypeData::Definition(def) => {
                let module = self.module_name(def.module);
                format!("[{}]{}", module, def.qualified_name())
            }
            TypeData::Instantiated { def, args } => {
                let args: Vec<String> = args.iter().map(|a| self.type_display(*a)).collect();
                format!("{}<{}>", self.type_display(def), args.join(", "))
            }
            TypeData::Array { element } => format!("{}[]", self.type_display(element)),
            TypeData::TypeParameter { index } => format!("!{index}"),
            TypeData::MethodParameter { index } => format!("!!{index}"),
        }
    }

    /// Structural display name of a method.
    pub fn method_display(&self, method: MethodId) -> String {
        let def = self.method_def(method);
        let owner = self.type_display(self.method_owner(method));
        let args = self.method_instantiation(method);
        if args.is_empty() {
            format!("{}.{}", owner, def.name)
        } else {
            let args: Vec<String> = args.iter().map(|a| self.type_display(*a)).collect();
            format!("{}.{}<{}>", owner, def.name, args.join(", "))
        }
    }
}
