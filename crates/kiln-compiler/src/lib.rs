//! Dependency-driven ahead-of-time compilation
//!
//! The pipeline in one sentence: root providers mark the externally
//! reachable entry points, the analyzer expands marked nodes to a fixpoint
//! (compiling each method body exactly once along the way), and the sorted
//! marked set becomes the output — only what is provably reachable gets
//! compiled or gets a type record.
//!
//! ```text
//! roots ──> DependencyAnalyzer ──> marked nodes ──> backend output
//!              │        ▲                             exports file
//!              ▼        │                             object dump
//!         CompilationEngine                           stack traces
//!         (per-kind dependency dispatch,
//!          method compilation + body scan)
//! ```
//!
//! Entities come from a [`kiln_types::Universe`]; canonicalization keeps the
//! generic expansion finite by sharing one body across all reference-type
//! instantiations.

pub mod backend;
pub mod canon;
pub mod compile;
pub mod emit;
mod engine;
pub mod error;
pub mod factory;
pub mod graph;
pub mod managers;
pub mod modulegroup;
pub mod node;
pub mod rooting;
pub mod vtable;

pub use backend::{
    CompilationBackend, CompiledMethodBody, MethodBodyContent, MethodCompileError,
    MethodCompiler, NativeBackend, ObjectEmitter, PortableSourceBackend,
};
pub use canon::{constraint_satisfying_instantiation, CanonicalizationPolicy};
pub use compile::{
    Compilation, CompilationBuilder, CompilationResults, OptimizationMode, RecordedEdge,
};
pub use emit::exports::{parse_exports_file, ExportsFileWriter, TargetOs};
pub use emit::mangling::NameMangler;
pub use emit::stacktrace::{
    decode_stack_trace_metadata, StackTraceEmissionPolicy, StackTraceRecord,
};
pub use error::CompilationError;
pub use factory::NodeFactory;
pub use graph::{
    ConditionalDependency, DependencyAnalyzer, DependencyEdge, DependencyProvider,
    DependencyTrackingLevel, ExpansionStrategy, NodeDependencies,
};
pub use managers::{
    DictionaryLayoutProvider, EmptyDictionaryLayoutProvider, EmptyInteropStubManager,
    EmptyMetadataManager, InteropStubManager, MetadataManager,
};
pub use modulegroup::{
    CompilationModuleGroup, MultiModuleGroup, SingleFileCompilationModuleGroup,
};
pub use node::{DictionaryOwner, NodeId, NodeKind};
pub use rooting::{
    CompilationRootProvider, ExportedMethodsRootProvider, GenericDispatchHelperRootProvider,
    LibraryRootProvider, MainMethodRootProvider, RootingPolicy, RootingService,
    RuntimeInitializerRootProvider, SingleMethodRootProvider,
};
pub use vtable::{
    has_vtable, requires_dictionary_slot, resolve_virtual_method, virtual_method_slot,
    LazyVTableSliceProvider, VTableSliceProvider,
};
