//! Canonical code sharing across generic instantiations.

use std::sync::Arc;

use kiln_compiler::{
    CompilationBuilder, LibraryRootProvider, MainMethodRootProvider, NodeKind,
};
use kiln_types::{
    GenericParamDef, IlOp, MethodBody, MethodFlags, MethodId, MethodSignature, PrimitiveKind,
    TypeId, Universe, UniverseBuilder, WellKnownType,
};

fn static_flags() -> MethodFlags {
    MethodFlags {
        is_static: true,
        ..MethodFlags::default()
    }
}

fn ctor_flags() -> MethodFlags {
    MethodFlags {
        is_ctor: true,
        ..MethodFlags::default()
    }
}

struct SharingSetup {
    universe: Arc<Universe>,
    main: MethodId,
    box_def: TypeId,
    box_first: TypeId,
    box_second: TypeId,
    box_int: TypeId,
    ctor_first: MethodId,
    ctor_canon: MethodId,
    ctor_int: MethodId,
}

fn build_sharing_setup() -> SharingSetup {
    let mut b = UniverseBuilder::new();
    let sys = b.define_system_module("System.Private.CoreLib");
    let object = b.universe().object().unwrap();
    let void = b
        .universe()
        .well_known(WellKnownType::Primitive(PrimitiveKind::Void))
        .unwrap();
    let int32 = b
        .universe()
        .well_known(WellKnownType::Primitive(PrimitiveKind::Int32))
        .unwrap();
    let sig = || MethodSignature::new(vec![], void);

    let box_def = b.define_generic_class(
        sys,
        "App",
        "Box",
        object,
        vec![GenericParamDef::unconstrained("T")],
    );
    let ctor = b.define_method(box_def, ".ctor", ctor_flags(), sig(), Some(MethodBody::empty()));

    let first = b.define_class(sys, "App", "First", object);
    let second = b.define_class(sys, "App", "Second", object);

    let u = b.universe();
    let canon = u.canon().unwrap();
    let box_first = u.instantiate_type(box_def, vec![first]).unwrap();
    let box_second = u.instantiate_type(box_def, vec![second]).unwrap();
    let box_int = u.instantiate_type(box_def, vec![int32]).unwrap();
    let box_canon = u.instantiate_type(box_def, vec![canon]).unwrap();
    let ctor_first = u.instantiate_method(ctor, box_first, vec![]).unwrap();
    let ctor_second = u.instantiate_method(ctor, box_second, vec![]).unwrap();
    let ctor_int = u.instantiate_method(ctor, box_int, vec![]).unwrap();
    let ctor_canon = u.instantiate_method(ctor, box_canon, vec![]).unwrap();

    let program = b.define_class(sys, "App", "Program", object);
    let main = b.define_method(
        program,
        "Main",
        static_flags(),
        MethodSignature::new(vec![], void),
        Some(MethodBody::new(vec![
            IlOp::NewObject(ctor_first),
            IlOp::NewObject(ctor_second),
            IlOp::NewObject(ctor_int),
            IlOp::Return,
        ])),
    );

    SharingSetup {
        universe: b.finish(),
        main,
        box_def,
        box_first,
        box_second,
        box_int,
        ctor_first,
        ctor_canon,
        ctor_int,
    }
}

#[test]
fn reference_instantiations_share_one_canonical_body() {
    let setup = build_sharing_setup();
    let mut compilation = CompilationBuilder::new(setup.universe.clone())
        .add_root_provider(Box::new(MainMethodRootProvider::new(setup.main)))
        .to_compilation();
    compilation.compile().unwrap();
    let results = compilation.results().unwrap();
    let u = &setup.universe;

    // Each concrete instantiation keeps its own type record.
    assert!(results.contains(&NodeKind::ConstructedType(setup.box_first)));
    assert!(results.contains(&NodeKind::ConstructedType(setup.box_second)));
    assert!(results.contains(&NodeKind::ConstructedType(setup.box_int)));

    // Both reference-type constructors compile once, on Box<__Canon>; the
    // value-type instantiation keeps its own body.
    assert!(results.contains(&NodeKind::MethodCode(setup.ctor_canon)));
    assert!(!results.contains(&NodeKind::MethodCode(setup.ctor_first)));
    assert!(results.contains(&NodeKind::MethodCode(setup.ctor_int)));

    let box_ctor_bodies = results
        .marked_nodes
        .iter()
        .filter(|kind| match kind {
            NodeKind::MethodCode(m) => u.definition(u.method_owner(*m)) == setup.box_def,
            _ => false,
        })
        .count();
    assert_eq!(box_ctor_bodies, 2, "one canonical body plus one for Box<int>");
}

#[test]
fn shared_instantiations_carry_a_dictionary() {
    let setup = build_sharing_setup();
    let mut compilation = CompilationBuilder::new(setup.universe.clone())
        .add_root_provider(Box::new(MainMethodRootProvider::new(setup.main)))
        .to_compilation();
    compilation.compile().unwrap();
    let results = compilation.results().unwrap();

    let dictionaries = results
        .marked_nodes
        .iter()
        .filter(|kind| matches!(kind, NodeKind::GenericDictionary(_)))
        .count();
    // Box<First> and Box<Second> are shared; Box<int> is not.
    assert_eq!(dictionaries, 2);

    let shadows = results
        .marked_nodes
        .iter()
        .filter(|kind| matches!(kind, NodeKind::ShadowConcreteMethod { .. }))
        .count();
    assert_eq!(shadows, 2);
}

#[test]
fn rooting_an_open_definition_roots_it_alongside_its_canonical_form() {
    let mut b = UniverseBuilder::new();
    b.define_system_module("System.Private.CoreLib");
    let object = b.universe().object().unwrap();
    let void = b
        .universe()
        .well_known(WellKnownType::Primitive(PrimitiveKind::Void))
        .unwrap();
    let module = b.define_module("Acme.Collections");
    let box_def = b.define_generic_class(
        module,
        "Acme",
        "Box",
        object,
        vec![GenericParamDef::unconstrained("T")],
    );
    b.define_method(
        box_def,
        "Get",
        MethodFlags::default(),
        MethodSignature::new(vec![], void),
        Some(MethodBody::empty()),
    );
    let universe = b.finish();
    let canon = universe.canon().unwrap();
    let box_canon = universe.instantiate_type(box_def, vec![canon]).unwrap();

    let mut compilation = CompilationBuilder::new(universe.clone())
        .add_root_provider(Box::new(LibraryRootProvider::new(module)))
        .to_compilation();
    compilation.compile().unwrap();
    let results = compilation.results().unwrap();

    // The open definition's own record is rooted, its canonical
    // instantiation stands in for the whole reference-type family, and no
    // other instantiation materializes.
    assert!(results.contains(&NodeKind::ConstructedType(box_def)));
    assert!(results.contains(&NodeKind::ConstructedType(box_canon)));
    let box_instantiations = results
        .marked_nodes
        .iter()
        .filter(|kind| match kind {
            NodeKind::ConstructedType(ty) => {
                *ty != box_def && universe.definition(*ty) == box_def
            }
            _ => false,
        })
        .count();
    assert_eq!(box_instantiations, 1);
}
