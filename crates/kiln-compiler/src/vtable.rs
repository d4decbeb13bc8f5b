//! VTable slot assignment
//!
//! Each type contributes a slice of slots on top of its base's. A method's
//! total slot index is the sum of every strict ancestor's slice length (plus
//! one reserved dictionary slot per shared-generic ancestor) plus the
//! method's index within its own type's slice. Slice order derives from
//! metadata order of the type's own slot-introducing virtuals, so slot
//! assignment is deterministic and base-consistent across the hierarchy.

use kiln_types::{CanonicalFormKind, MethodId, TypeId, TypeKind, Universe};

/// Supplies the ordered vtable slice (own virtual methods only, not
/// inherited) for a type.
pub trait VTableSliceProvider: Sync {
    /// Slot-introducing virtual methods of `ty`, in slot order.
    fn slice(&self, universe: &Universe, ty: TypeId) -> Vec<MethodId>;
}

/// Metadata-order slices: every declared virtual that introduces a new slot,
/// in declaration order. Delegate types route through a dedicated enumerator
/// because their `Invoke` slot is synthesized rather than declared virtual.
#[derive(Debug, Default)]
pub struct LazyVTableSliceProvider;

impl VTableSliceProvider for LazyVTableSliceProvider {
    fn slice(&self, universe: &Universe, ty: TypeId) -> Vec<MethodId> {
        if universe.type_kind(ty) == TypeKind::Delegate {
            return delegate_virtual_methods(universe, ty);
        }
        universe
            .methods_of(ty)
            .into_iter()
            .filter(|m| {
                let flags = universe.method_flags(*m);
                flags.is_virtual && flags.is_new_slot
            })
            .collect()
    }
}

/// Synthesized virtual-method enumeration for delegate types: the `Invoke`
/// slot exists even though no declared method is marked virtual.
fn delegate_virtual_methods(universe: &Universe, ty: TypeId) -> Vec<MethodId> {
    universe
        .methods_of(ty)
        .into_iter()
        .filter(|m| universe.method_name(*m) == "Invoke")
        .collect()
}

/// Whether a type's vtable reserves a slot for generic dictionary access:
/// true exactly when the type participates in canonical sharing, so shared
/// code and its concrete users agree on the layout.
pub fn requires_dictionary_slot(universe: &Universe, ty: TypeId) -> bool {
    universe.instantiation_of(ty).is_some()
        && (universe.is_shared_type(ty)
            || universe.is_canonical_subtype(ty, CanonicalFormKind::Any))
}

/// Whether any type in `ty`'s inheritance chain contributes vtable slots.
pub fn has_vtable(universe: &Universe, provider: &dyn VTableSliceProvider, ty: TypeId) -> bool {
    let mut current = Some(ty);
    while let Some(t) = current {
        if !provider.slice(universe, t).is_empty() {
            return true;
        }
        current = universe.base_type(t);
    }
    false
}

/// Resolve the implementation of a virtual declaration on a concrete type:
/// the most derived method in `ty`'s chain matching the declaration.
pub fn resolve_virtual_method(
    universe: &Universe,
    decl: MethodId,
    ty: TypeId,
) -> Option<MethodId> {
    let decl_def = universe.method_def(decl);
    let mut current = Some(ty);
    while let Some(t) = current {
        for m in universe.methods_of(t) {
            let def = universe.method_def(m);
            if def.name == decl_def.name
                && def.signature.params.len() == decl_def.signature.params.len()
                && universe.method_flags(m).is_virtual
            {
                return Some(m);
            }
        }
        current = universe.base_type(t);
    }
    None
}

/// Total vtable slot index of a virtual method, or `None` if the method does
/// not occupy a slot on its owning type. `None` means "do not emit a
/// vtable-based call site", not an error.
pub fn virtual_method_slot(
    universe: &Universe,
    provider: &dyn VTableSliceProvider,
    method: MethodId,
) -> Option<usize> {
    let owner = universe.method_owner(method);
    let definition = universe.method_definition(method);

    let index = provider
        .slice(universe, owner)
        .iter()
        .position(|m| universe.method_definition(*m) == definition)?;

    let mut base_slots = 0usize;
    let mut current = universe.base_type(owner);
    while let Some(ancestor) = current {
        base_slots += provider.slice(universe, ancestor).len();
        if requires_dictionary_slot(universe, ancestor) {
            base_slots += 1;
        }
        current = universe.base_type(ancestor);
    }
    Some(base_slots + index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_types::{
        GenericParamDef, MethodBody, MethodFlags, MethodSignature, UniverseBuilder,
    };

    fn virtual_flags() -> MethodFlags {
        MethodFlags {
            is_virtual: true,
            is_new_slot: true,
            ..MethodFlags::default()
        }
    }

    fn override_flags() -> MethodFlags {
        MethodFlags {
            is_virtual: true,
            is_new_slot: false,
            ..MethodFlags::default()
        }
    }

    #[test]
    fn slots_grow_monotonically_down_the_hierarchy() {
        let mut b = UniverseBuilder::new();
        let sys = b.define_system_module("System.Private.CoreLib");
        let object = b.universe().object().unwrap();
        let void = b
            .universe()
            .well_known(kiln_types::WellKnownType::Primitive(
                kiln_types::PrimitiveKind::Void,
            ))
            .unwrap();
        let sig = || MethodSignature::new(vec![], void);

        let a = b.define_class(sys, "Hierarchy", "A", object);
        let a0 = b.define_method(a, "M0", virtual_flags(), sig(), Some(MethodBody::empty()));
        let a1 = b.define_method(a, "M1", virtual_flags(), sig(), Some(MethodBody::empty()));
        let bt = b.define_class(sys, "Hierarchy", "B", a);
        let b0 = b.define_method(bt, "N0", virtual_flags(), sig(), Some(MethodBody::empty()));
        let c = b.define_class(sys, "Hierarchy", "C", bt);
        let c0 = b.define_method(c, "P0", virtual_flags(), sig(), Some(MethodBody::empty()));
        let u = b.finish();

        let provider = LazyVTableSliceProvider;
        let slot = |m| virtual_method_slot(&u, &provider, m).unwrap();
        assert_eq!(slot(a0), 0);
        assert_eq!(slot(a1), 1);
        assert_eq!(slot(b0), 2);
        assert_eq!(slot(c0), 3);
        assert!(slot(a1) < slot(b0) && slot(b0) < slot(c0));
    }

    #[test]
    fn overrides_do_not_add_slots_and_resolve_to_the_most_derived_method() {
        let mut b = UniverseBuilder::new();
        let sys = b.define_system_module("System.Private.CoreLib");
        let object = b.universe().object().unwrap();
        let void = b
            .universe()
            .well_known(kiln_types::WellKnownType::Primitive(
                kiln_types::PrimitiveKind::Void,
            ))
            .unwrap();
        let sig = || MethodSignature::new(vec![], void);

        let a = b.define_class(sys, "Hierarchy", "A", object);
        let decl = b.define_method(a, "M", virtual_flags(), sig(), Some(MethodBody::empty()));
        let bt = b.define_class(sys, "Hierarchy", "B", a);
        let ovr = b.define_method(bt, "M", override_flags(), sig(), Some(MethodBody::empty()));
        let u = b.finish();

        let provider = LazyVTableSliceProvider;
        assert!(provider.slice(&u, bt).is_empty());
        assert_eq!(virtual_method_slot(&u, &provider, ovr), None);
        assert_eq!(resolve_virtual_method(&u, decl, bt), Some(ovr));
        assert_eq!(resolve_virtual_method(&u, decl, a), Some(decl));
    }

    #[test]
    fn shared_generic_ancestors_reserve_a_dictionary_slot() {
        let mut b = UniverseBuilder::new();
        let sys = b.define_system_module("System.Private.CoreLib");
        let object = b.universe().object().unwrap();
        let void = b
            .universe()
            .well_known(kiln_types::WellKnownType::Primitive(
                kiln_types::PrimitiveKind::Void,
            ))
            .unwrap();
        let sig = || MethodSignature::new(vec![], void);

        let holder = b.define_generic_class(
            sys,
            "Hierarchy",
            "Holder",
            object,
            vec![GenericParamDef::unconstrained("T")],
        );
        b.define_method(holder, "Get", virtual_flags(), sig(), Some(MethodBody::empty()));
        let ref_ty = b.define_class(sys, "Hierarchy", "Ref", object);
        let u = b.universe();
        let holder_of_ref = u.instantiate_type(holder, vec![ref_ty]).unwrap();
        let derived = b.define_class(sys, "Hierarchy", "Derived", holder_of_ref);
        let d0 = b.define_method(
            derived,
            "Extra",
            virtual_flags(),
            sig(),
            Some(MethodBody::empty()),
        );
        let u = b.finish();

        assert!(requires_dictionary_slot(&u, holder_of_ref));
        let provider = LazyVTableSliceProvider;
        // One slot for Holder.Get, one reserved dictionary slot, then Extra.
        assert_eq!(virtual_method_slot(&u, &provider, d0), Some(2));
    }

    #[test]
    fn delegate_invoke_occupies_a_synthesized_slot() {
        let mut b = UniverseBuilder::new();
        let sys = b.define_system_module("System.Private.CoreLib");
        let object = b.universe().object().unwrap();
        let void = b
            .universe()
            .well_known(kiln_types::WellKnownType::Primitive(
                kiln_types::PrimitiveKind::Void,
            ))
            .unwrap();

        let (action, invoke) = b.define_delegate(
            sys,
            "System",
            "Action",
            object,
            MethodSignature::new(vec![], void),
        );
        let u = b.finish();

        let provider = LazyVTableSliceProvider;
        assert_eq!(provider.slice(&u, action), vec![invoke]);
        assert_eq!(virtual_method_slot(&u, &provider, invoke), Some(0));
    }
}
