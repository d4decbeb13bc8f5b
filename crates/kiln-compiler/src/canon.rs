//! Generic expansion and canonicalization policy
//!
//! Decides whether generic code is compiled per-instantiation or shared
//! through a canonical form, and constructs the "constraint-satisfying"
//! instantiations used to root open generic definitions that no call site
//! ever materializes.

use kiln_types::{
    GenericConstraint, GenericParamDef, Instantiation, PrimitiveKind, TypeId, Universe,
    WellKnownType,
};

/// Which canonical sharing forms the compilation supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalizationPolicy {
    /// Reference-type arguments collapse to `__Canon`
    pub supports_canon: bool,
    /// All arguments may collapse to `__UniversalCanon`, trading a runtime
    /// indirection for a hard bound on code size
    pub supports_universal_canon: bool,
}

impl Default for CanonicalizationPolicy {
    fn default() -> Self {
        Self {
            supports_canon: true,
            supports_universal_canon: false,
        }
    }
}

/// Build an instantiation satisfying the given generic parameters, for
/// rooting open definitions with no concrete call site.
///
/// Prefers the shared canonical argument when the constraint permits it, so
/// one compiled instantiation covers the whole reference-type family. A
/// `struct` constraint disallows `__Canon`; those parameters fall back to a
/// concrete default value type. `None` when no satisfying argument exists.
pub fn constraint_satisfying_instantiation(
    universe: &Universe,
    params: &[GenericParamDef],
    policy: CanonicalizationPolicy,
) -> Option<Instantiation> {
    params
        .iter()
        .map(|param| constraint_satisfying_argument(universe, param, policy))
        .collect()
}

fn constraint_satisfying_argument(
    universe: &Universe,
    param: &GenericParamDef,
    policy: CanonicalizationPolicy,
) -> Option<TypeId> {
    match param.constraint {
        GenericConstraint::None | GenericConstraint::ReferenceType => {
            if policy.supports_canon {
                universe.canon().ok()
            } else {
                universe.object().ok()
            }
        }
        GenericConstraint::NotNullableValueType => universe
            .well_known(WellKnownType::Primitive(PrimitiveKind::Int32))
            .ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_types::UniverseBuilder;

    #[test]
    fn prefers_canon_and_falls_back_on_struct_constraint() {
        let mut b = UniverseBuilder::new();
        b.define_system_module("System.Private.CoreLib");
        let u = b.finish();

        let params = vec![
            GenericParamDef::unconstrained("T"),
            GenericParamDef {
                name: "U".into(),
                constraint: GenericConstraint::NotNullableValueType,
            },
        ];
        let inst =
            constraint_satisfying_instantiation(&u, &params, CanonicalizationPolicy::default())
                .unwrap();
        assert_eq!(inst[0], u.canon().unwrap());
        assert_eq!(
            inst[1],
            u.well_known(WellKnownType::Primitive(PrimitiveKind::Int32))
                .unwrap()
        );

        // With canon disabled the unconstrained parameter takes Object.
        let no_canon = CanonicalizationPolicy {
            supports_canon: false,
            supports_universal_canon: false,
        };
        let inst = constraint_satisfying_instantiation(&u, &params, no_canon).unwrap();
        assert_eq!(inst[0], u.object().unwrap());
    }
}
