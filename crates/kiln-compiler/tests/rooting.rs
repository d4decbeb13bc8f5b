//! Root provider behavior: library surface completeness and failure policy.

use std::sync::Arc;

use kiln_compiler::{
    CanonicalizationPolicy, CompilationBuilder, CompilationError, ExportedMethodsRootProvider,
    GenericDispatchHelperRootProvider, LibraryRootProvider, MainMethodRootProvider, NodeKind,
    RootingPolicy,
};
use kiln_types::{
    GenericParamDef, IlOp, MethodBody, MethodFlags, MethodId, MethodSignature, ModuleId, TypeId,
    Universe, UniverseBuilder, WellKnownType,
};

struct Library {
    universe: Arc<Universe>,
    module: ModuleId,
    service: TypeId,
    service_methods: Vec<MethodId>,
    good_sibling: TypeId,
    object: TypeId,
}

fn build_library(with_missing_type: bool) -> Library {
    let mut b = UniverseBuilder::new();
    b.define_system_module("System.Private.CoreLib");
    let object = b.universe().object().unwrap();
    let void = b
        .universe()
        .well_known(WellKnownType::Primitive(kiln_types::PrimitiveKind::Void))
        .unwrap();
    let sig = || MethodSignature::new(vec![], void);

    let module = b.define_module("Acme.Services");
    let service = b.define_class(module, "Acme", "Service", object);
    let mut service_methods = Vec::new();
    for name in ["Start", "Stop", "Poll"] {
        service_methods.push(b.define_method(
            service,
            name,
            MethodFlags::default(),
            sig(),
            Some(MethodBody::empty()),
        ));
    }
    // Finalizers are rooted by construction, never as library surface.
    b.define_method(
        service,
        "Finalize",
        MethodFlags {
            is_finalizer: true,
            ..MethodFlags::default()
        },
        sig(),
        Some(MethodBody::empty()),
    );

    if with_missing_type {
        b.define_missing_type(module, "Acme", "VanishedDependency", object);
    }
    let good_sibling = b.define_class(module, "Acme", "Sibling", object);
    b.define_method(
        good_sibling,
        "Run",
        MethodFlags::default(),
        sig(),
        Some(MethodBody::empty()),
    );
    Library {
        universe: b.finish(),
        module,
        service,
        service_methods,
        good_sibling,
        object,
    }
}

#[test]
fn library_rooting_marks_every_method_and_the_base_chain() {
    let lib = build_library(false);
    let mut compilation = CompilationBuilder::new(lib.universe.clone())
        .add_root_provider(Box::new(LibraryRootProvider::new(lib.module)))
        .to_compilation();
    compilation.compile().unwrap();
    let results = compilation.results().unwrap();

    assert!(results.contains(&NodeKind::ConstructedType(lib.service)));
    assert!(results.contains(&NodeKind::ConstructedType(lib.object)));
    for method in &lib.service_methods {
        assert!(
            results.contains(&NodeKind::MethodCode(*method)),
            "library method not rooted"
        );
    }
    // The finalizer is not part of the callable surface.
    let finalizer = lib.universe.finalizer(lib.service).unwrap();
    assert!(!results.contains(&NodeKind::MethodCode(finalizer)));
}

#[test]
fn an_unresolvable_root_does_not_poison_its_siblings() {
    let lib = build_library(true);
    let mut compilation = CompilationBuilder::new(lib.universe.clone())
        .add_root_provider(Box::new(LibraryRootProvider::new(lib.module)))
        .use_rooting_policy(RootingPolicy::SkipFailedRoots)
        .to_compilation();
    compilation.compile().unwrap();
    let results = compilation.results().unwrap();

    assert!(results.contains(&NodeKind::ConstructedType(lib.good_sibling)));
    assert!(results.contains(&NodeKind::ConstructedType(lib.service)));
}

#[test]
fn fail_on_failed_roots_aborts_the_compilation() {
    let lib = build_library(true);
    let mut compilation = CompilationBuilder::new(lib.universe.clone())
        .add_root_provider(Box::new(LibraryRootProvider::new(lib.module)))
        .use_rooting_policy(RootingPolicy::FailOnFailedRoots)
        .to_compilation();
    let err = compilation.compile().unwrap_err();
    assert!(matches!(err, CompilationError::RootingFailed { .. }));
}

#[test]
fn exported_methods_are_rooted_and_recorded() {
    let mut b = UniverseBuilder::new();
    b.define_system_module("System.Private.CoreLib");
    let object = b.universe().object().unwrap();
    let void = b
        .universe()
        .well_known(WellKnownType::Primitive(kiln_types::PrimitiveKind::Void))
        .unwrap();
    let module = b.define_module("Acme.Interop");
    let ty = b.define_class(module, "Acme", "Callbacks", object);
    let exported = b.define_method_full(
        ty,
        "OnTimer",
        MethodFlags {
            is_static: true,
            ..MethodFlags::default()
        },
        MethodSignature::new(vec![], void),
        Vec::new(),
        Some(MethodBody::empty()),
        Some("acme_on_timer".to_string()),
    );
    b.define_method(
        ty,
        "Internal",
        MethodFlags::default(),
        MethodSignature::new(vec![], void),
        Some(MethodBody::empty()),
    );
    let universe = b.finish();

    let mut compilation = CompilationBuilder::new(universe)
        .add_root_provider(Box::new(ExportedMethodsRootProvider::new(module)))
        .to_compilation();
    compilation.compile().unwrap();
    let results = compilation.results().unwrap();

    assert!(results.contains(&NodeKind::MethodCode(exported)));
    assert_eq!(
        results.exports,
        vec![(exported, "acme_on_timer".to_string())]
    );
}

#[test]
fn an_abstract_slot_on_the_library_surface_counts_as_used_virtually() {
    let mut b = UniverseBuilder::new();
    b.define_system_module("System.Private.CoreLib");
    let object = b.universe().object().unwrap();
    let void = b
        .universe()
        .well_known(WellKnownType::Primitive(kiln_types::PrimitiveKind::Void))
        .unwrap();
    let sig = || MethodSignature::new(vec![], void);

    let lib = b.define_module("Acme.Ui");
    let control = b.define_class(lib, "Acme", "Control", object);
    let render_decl = b.define_method(
        control,
        "Render",
        MethodFlags {
            is_virtual: true,
            is_new_slot: true,
            is_abstract: true,
            ..MethodFlags::default()
        },
        sig(),
        None,
    );

    // The override lives in a consumer module that constructs Widget but
    // never calls Render itself.
    let app = b.define_module("Acme.App");
    let widget = b.define_class(app, "Acme", "Widget", control);
    let render_impl = b.define_method(
        widget,
        "Render",
        MethodFlags {
            is_virtual: true,
            ..MethodFlags::default()
        },
        sig(),
        Some(MethodBody::empty()),
    );
    let ctor = b.define_method(
        widget,
        ".ctor",
        MethodFlags {
            is_ctor: true,
            ..MethodFlags::default()
        },
        sig(),
        Some(MethodBody::empty()),
    );
    let program = b.define_class(app, "Acme", "Program", object);
    let main = b.define_method(
        program,
        "Main",
        MethodFlags {
            is_static: true,
            ..MethodFlags::default()
        },
        sig(),
        Some(MethodBody::new(vec![IlOp::NewObject(ctor), IlOp::Return])),
    );

    let mut compilation = CompilationBuilder::new(b.finish())
        .add_root_provider(Box::new(LibraryRootProvider::new(lib)))
        .add_root_provider(Box::new(MainMethodRootProvider::new(main)))
        .to_compilation();
    compilation.compile().unwrap();
    let results = compilation.results().unwrap();

    // The declaration is never compiled, but its slot counts as used, so
    // the override on the constructed subclass gets pulled in.
    assert!(results.contains(&NodeKind::VirtualMethodUse(render_decl)));
    assert!(!results.contains(&NodeKind::MethodCode(render_decl)));
    assert!(results.contains(&NodeKind::MethodCode(render_impl)));
}

#[test]
fn a_method_with_an_unresolvable_signature_does_not_poison_its_type() {
    let mut b = UniverseBuilder::new();
    let sys = b.define_system_module("System.Private.CoreLib");
    let object = b.universe().object().unwrap();
    let void = b
        .universe()
        .well_known(WellKnownType::Primitive(kiln_types::PrimitiveKind::Void))
        .unwrap();
    // The vanished type lives outside the rooted module, so only the method
    // that mentions it in its signature is affected.
    let vanished = b.define_missing_type(sys, "Acme", "Vanished", object);

    let module = b.define_module("Acme.Services");
    let service = b.define_class(module, "Acme", "Service", object);
    let start = b.define_method(
        service,
        "Start",
        MethodFlags::default(),
        MethodSignature::new(vec![], void),
        Some(MethodBody::empty()),
    );
    let broken = b.define_method(
        service,
        "Configure",
        MethodFlags::default(),
        MethodSignature::new(vec![vanished], void),
        Some(MethodBody::empty()),
    );
    let stop = b.define_method(
        service,
        "Stop",
        MethodFlags::default(),
        MethodSignature::new(vec![], void),
        Some(MethodBody::empty()),
    );

    let mut compilation = CompilationBuilder::new(b.finish())
        .add_root_provider(Box::new(LibraryRootProvider::new(module)))
        .to_compilation();
    compilation.compile().unwrap();
    let results = compilation.results().unwrap();

    assert!(results.contains(&NodeKind::MethodCode(start)));
    assert!(results.contains(&NodeKind::MethodCode(stop)));
    assert!(!results.contains(&NodeKind::MethodCode(broken)));
}

#[test]
fn dispatch_helpers_root_both_uniform_instantiations() {
    let mut b = UniverseBuilder::new();
    b.define_system_module("System.Private.CoreLib");
    let object = b.universe().object().unwrap();
    let void = b
        .universe()
        .well_known(WellKnownType::Primitive(kiln_types::PrimitiveKind::Void))
        .unwrap();
    let module = b.define_module("Acme.Runtime");
    let helpers = b.define_class(module, "Acme", "DispatchHelpers", object);
    let compare = b.define_method_full(
        helpers,
        "FieldCompare",
        MethodFlags {
            is_static: true,
            ..MethodFlags::default()
        },
        MethodSignature::new(vec![], void),
        vec![GenericParamDef::unconstrained("T")],
        Some(MethodBody::empty()),
        None,
    );
    let u = b.universe();
    let canon = u.canon().unwrap();
    let universal = u.universal_canon().unwrap();
    let shared = u.instantiate_method(compare, helpers, vec![canon]).unwrap();
    let uniform = u
        .instantiate_method(compare, helpers, vec![universal])
        .unwrap();

    let mut compilation = CompilationBuilder::new(b.finish())
        .add_root_provider(Box::new(GenericDispatchHelperRootProvider::new(vec![
            compare,
        ])))
        .use_canonicalization_policy(CanonicalizationPolicy {
            supports_canon: true,
            supports_universal_canon: true,
        })
        .to_compilation();
    compilation.compile().unwrap();
    let results = compilation.results().unwrap();

    assert!(results.contains(&NodeKind::MethodCode(shared)));
    assert!(results.contains(&NodeKind::MethodCode(uniform)));
}
