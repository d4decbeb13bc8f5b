//! Reachability and determinism of the dependency expansion.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use kiln_compiler::{
    Compilation, CompilationBuilder, CompilationError, DependencyAnalyzer, DependencyProvider,
    DependencyTrackingLevel, ExpansionStrategy, MainMethodRootProvider, NodeDependencies,
    NodeFactory, NodeId, NodeKind,
};
use kiln_types::{
    IlOp, MethodBody, MethodFlags, MethodId, MethodSignature, TypeId, Universe, UniverseBuilder,
    WellKnownType,
};

struct Program {
    universe: Arc<Universe>,
    main: MethodId,
    helper: MethodId,
    unused: MethodId,
    widget: TypeId,
    base_decl: MethodId,
    derived_override: MethodId,
}

fn static_flags() -> MethodFlags {
    MethodFlags {
        is_static: true,
        ..MethodFlags::default()
    }
}

fn build_program(call_virtual: bool) -> Program {
    let mut b = UniverseBuilder::new();
    let sys = b.define_system_module("System.Private.CoreLib");
    let object = b.universe().object().unwrap();
    let void = b
        .universe()
        .well_known(WellKnownType::Primitive(kiln_types::PrimitiveKind::Void))
        .unwrap();
    let sig = || MethodSignature::new(vec![], void);

    let base = b.define_class(sys, "App", "Base", object);
    let base_decl = b.define_method(
        base,
        "Render",
        MethodFlags {
            is_virtual: true,
            is_new_slot: true,
            ..MethodFlags::default()
        },
        sig(),
        Some(MethodBody::empty()),
    );
    let widget = b.define_class(sys, "App", "Widget", base);
    let derived_override = b.define_method(
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

    let program = b.define_class(sys, "App", "Program", object);
    let helper = b.define_method(
        program,
        "Helper",
        static_flags(),
        sig(),
        Some(MethodBody::empty()),
    );
    let unused = b.define_method(
        program,
        "Unused",
        static_flags(),
        sig(),
        Some(MethodBody::empty()),
    );
    let mut ops = vec![IlOp::Call(helper), IlOp::NewObject(ctor)];
    if call_virtual {
        ops.push(IlOp::CallVirt(base_decl));
    }
    ops.push(IlOp::Return);
    let main = b.define_method(program, "Main", static_flags(), sig(), Some(MethodBody::new(ops)));

    Program {
        universe: b.finish(),
        main,
        helper,
        unused,
        widget,
        base_decl,
        derived_override,
    }
}

fn compile(program: &Program, strategy: ExpansionStrategy) -> Compilation {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let mut compilation = CompilationBuilder::new(program.universe.clone())
        .add_root_provider(Box::new(MainMethodRootProvider::new(program.main)))
        .use_expansion_strategy(strategy)
        .use_dependency_tracking(DependencyTrackingLevel::First)
        .to_compilation();
    compilation.compile().unwrap();
    compilation
}

#[test]
fn reachable_entities_are_marked_and_unreachable_are_not() {
    let program = build_program(true);
    let compilation = compile(&program, ExpansionStrategy::SingleThreaded);
    let results = compilation.results().unwrap();

    assert!(results.contains(&NodeKind::MethodCode(program.main)));
    assert!(results.contains(&NodeKind::MethodCode(program.helper)));
    assert!(results.contains(&NodeKind::ConstructedType(program.widget)));
    assert!(!results.contains(&NodeKind::MethodCode(program.unused)));
    assert!(results.body_of(program.main).is_some());
    assert!(results.body_of(program.unused).is_none());
}

#[test]
fn virtual_dispatch_pulls_in_overrides_only_when_a_call_site_exists() {
    let with_call = build_program(true);
    let compilation = compile(&with_call, ExpansionStrategy::SingleThreaded);
    let results = compilation.results().unwrap();
    assert!(results.contains(&NodeKind::VirtualMethodUse(with_call.base_decl)));
    assert!(results.contains(&NodeKind::MethodCode(with_call.derived_override)));

    // Same program without the virtual call: the override stays out even
    // though Widget itself is constructed.
    let without_call = build_program(false);
    let compilation = compile(&without_call, ExpansionStrategy::SingleThreaded);
    let results = compilation.results().unwrap();
    assert!(results.contains(&NodeKind::ConstructedType(without_call.widget)));
    assert!(!results.contains(&NodeKind::MethodCode(without_call.derived_override)));
}

#[test]
fn serial_and_parallel_expansion_produce_identical_output() {
    let program = build_program(true);
    let serial = compile(&program, ExpansionStrategy::SingleThreaded);
    let parallel = compile(&program, ExpansionStrategy::Parallel(4));
    let serial_names = &serial.results().unwrap().node_names;
    let parallel_names = &parallel.results().unwrap().node_names;
    assert!(!serial_names.is_empty());
    assert_eq!(serial_names, parallel_names);
}

#[test]
fn root_edges_are_recorded_under_first_level_tracking() {
    let program = build_program(true);
    let compilation = compile(&program, ExpansionStrategy::SingleThreaded);
    let results = compilation.results().unwrap();
    let main_edge = results
        .edges
        .iter()
        .find(|e| e.dependency.contains("Program.Main"))
        .unwrap();
    assert!(main_edge.dependent.is_none());
    assert_eq!(main_edge.reason, "entry point");
}

struct CountingProvider {
    expansions: AtomicUsize,
}

impl DependencyProvider for CountingProvider {
    fn compute_dependencies(&self, _node: NodeId) -> Result<NodeDependencies, CompilationError> {
        self.expansions.fetch_add(1, Ordering::SeqCst);
        Ok(NodeDependencies::default())
    }
}

#[test]
fn marking_is_idempotent() {
    let mut b = UniverseBuilder::new();
    b.define_system_module("System.Private.CoreLib");
    let universe = b.finish();
    let object = universe.object().unwrap();

    let factory = NodeFactory::new(universe);
    let analyzer = DependencyAnalyzer::new(
        &factory,
        ExpansionStrategy::SingleThreaded,
        DependencyTrackingLevel::None,
    );
    let node = factory.constructed_type(object);
    analyzer.mark(node, None, "test");
    analyzer.mark(node, None, "test");
    analyzer.mark(node, None, "test");

    let provider = CountingProvider {
        expansions: AtomicUsize::new(0),
    };
    analyzer.run_to_fixpoint(&provider).unwrap();
    assert_eq!(provider.expansions.load(Ordering::SeqCst), 1);
    assert_eq!(analyzer.marked_count(), 1);
}

#[test]
fn conditional_dependencies_fire_regardless_of_registration_order() {
    let mut b = UniverseBuilder::new();
    b.define_system_module("System.Private.CoreLib");
    let universe = b.finish();
    let object = universe.object().unwrap();
    let canon = universe.canon().unwrap();

    let factory = NodeFactory::new(universe);
    let analyzer = DependencyAnalyzer::new(
        &factory,
        ExpansionStrategy::SingleThreaded,
        DependencyTrackingLevel::None,
    );
    let dependee = factory.constructed_type(object);
    let trigger = factory.constructed_type(canon);

    // Registered before the trigger marks: fires when it does.
    analyzer.add_conditional(dependee, trigger, "test");
    assert!(!analyzer.is_marked(dependee));
    analyzer.mark(trigger, None, "test");
    assert!(analyzer.is_marked(dependee));

    // Registered after the trigger is already marked: fires immediately.
    let late = factory.vtable_slice(object);
    analyzer.add_conditional(late, trigger, "test");
    assert!(analyzer.is_marked(late));
}
