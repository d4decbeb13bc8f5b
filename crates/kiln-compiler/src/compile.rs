//! Compilation driver
//!
//! [`CompilationBuilder`] assembles the collaborators (backend, module group,
//! vtable provider, managers, root providers) with working defaults, and
//! [`Compilation`] runs the pipeline: pre-root, root, expand to fixpoint,
//! then order and collect the results. Output files are written on demand
//! from the collected results.

use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

use kiln_types::{MethodId, Universe};

use crate::backend::{CompilationBackend, CompiledMethodBody, PortableSourceBackend};
use crate::canon::CanonicalizationPolicy;
use crate::emit::exports::{ExportsFileWriter, TargetOs};
use crate::emit::mangling::NameMangler;
use crate::emit::objectdump::{write_object_dump, ObjectDumpEntry};
use crate::emit::stacktrace::{write_stack_trace_metadata, StackTraceEmissionPolicy};
use crate::engine::CompilationEngine;
use crate::error::CompilationError;
use crate::factory::NodeFactory;
use crate::graph::{DependencyAnalyzer, DependencyTrackingLevel, ExpansionStrategy};
use crate::managers::{
    DictionaryLayoutProvider, EmptyDictionaryLayoutProvider, EmptyInteropStubManager,
    EmptyMetadataManager, InteropStubManager, MetadataManager,
};
use crate::modulegroup::{CompilationModuleGroup, SingleFileCompilationModuleGroup};
use crate::node::NodeKind;
use crate::rooting::{CompilationRootProvider, RootingPolicy, RootingService};
use crate::vtable::{LazyVTableSliceProvider, VTableSliceProvider};

/// Code generation aggressiveness, forwarded to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptimizationMode {
    /// No optimization
    None,
    /// Favor small code
    PreferSize,
    /// Balanced
    #[default]
    Blended,
    /// Favor fast code
    PreferSpeed,
}

/// One recorded dependency edge, resolved to display names.
#[derive(Debug, Clone)]
pub struct RecordedEdge {
    /// Display name of the dependent; `None` for roots
    pub dependent: Option<String>,
    /// Display name of the dependency
    pub dependency: String,
    /// Why the edge exists
    pub reason: &'static str,
}

/// Everything a finished compilation produced, in deterministic order.
#[derive(Debug)]
pub struct CompilationResults {
    /// Marked nodes, sorted by the structural total order
    pub marked_nodes: Vec<NodeKind>,
    /// Display names of the marked nodes, same order
    pub node_names: Vec<String>,
    /// Compiled bodies, in node order
    pub bodies: Vec<(MethodId, CompiledMethodBody)>,
    /// Exported methods with their symbol names, in rooting order
    pub exports: Vec<(MethodId, String)>,
    /// Recorded edges, per the tracking level
    pub edges: Vec<RecordedEdge>,
}

impl CompilationResults {
    /// Whether a node kind was marked.
    pub fn contains(&self, kind: &NodeKind) -> bool {
        self.marked_nodes.contains(kind)
    }

    /// The compiled body of a method, if it was reached.
    pub fn body_of(&self, method: MethodId) -> Option<&CompiledMethodBody> {
        self.bodies
            .iter()
            .find(|(m, _)| *m == method)
            .map(|(_, b)| b)
    }

    /// Number of compiled method bodies.
    pub fn method_count(&self) -> usize {
        self.bodies.len()
    }
}

/// Fluent configuration for one compilation.
pub struct CompilationBuilder {
    universe: Arc<Universe>,
    backend: Box<dyn CompilationBackend>,
    group: Box<dyn CompilationModuleGroup>,
    vtable: Box<dyn VTableSliceProvider>,
    metadata: Box<dyn MetadataManager>,
    interop: Box<dyn InteropStubManager>,
    dictionary: Box<dyn DictionaryLayoutProvider>,
    root_providers: Vec<Box<dyn CompilationRootProvider>>,
    optimization: OptimizationMode,
    strategy: ExpansionStrategy,
    tracking: DependencyTrackingLevel,
    rooting_policy: RootingPolicy,
    canon_policy: CanonicalizationPolicy,
    stack_trace_policy: StackTraceEmissionPolicy,
    backend_options: FxHashMap<String, String>,
    debug_info: bool,
}

impl CompilationBuilder {
    /// Builder with working defaults: portable backend, single-file module
    /// group, metadata-order vtables, no metadata/interop/dictionary layers.
    pub fn new(universe: Arc<Universe>) -> Self {
        Self {
            universe,
            backend: Box::new(PortableSourceBackend),
            group: Box::new(SingleFileCompilationModuleGroup),
            vtable: Box::new(LazyVTableSliceProvider),
            metadata: Box::new(EmptyMetadataManager),
            interop: Box::new(EmptyInteropStubManager),
            dictionary: Box::new(EmptyDictionaryLayoutProvider),
            root_providers: Vec::new(),
            optimization: OptimizationMode::default(),
            strategy: ExpansionStrategy::default(),
            tracking: DependencyTrackingLevel::default(),
            rooting_policy: RootingPolicy::default(),
            canon_policy: CanonicalizationPolicy::default(),
            stack_trace_policy: StackTraceEmissionPolicy::include_all(),
            backend_options: FxHashMap::default(),
            debug_info: false,
        }
    }

    /// Swap the code generation backend.
    pub fn use_backend(mut self, backend: Box<dyn CompilationBackend>) -> Self {
        self.backend = backend;
        self
    }

    /// Swap the compilation unit boundary.
    pub fn use_module_group(mut self, group: Box<dyn CompilationModuleGroup>) -> Self {
        self.group = group;
        self
    }

    /// Swap the vtable slice policy.
    pub fn use_vtable_slice_provider(mut self, vtable: Box<dyn VTableSliceProvider>) -> Self {
        self.vtable = vtable;
        self
    }

    /// Attach a metadata manager.
    pub fn use_metadata_manager(mut self, metadata: Box<dyn MetadataManager>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Attach an interop stub manager.
    pub fn use_interop_stub_manager(mut self, interop: Box<dyn InteropStubManager>) -> Self {
        self.interop = interop;
        self
    }

    /// Attach a dictionary layout provider.
    pub fn use_dictionary_layout_provider(
        mut self,
        dictionary: Box<dyn DictionaryLayoutProvider>,
    ) -> Self {
        self.dictionary = dictionary;
        self
    }

    /// Add a compilation root provider. Providers run in addition order.
    pub fn add_root_provider(mut self, provider: Box<dyn CompilationRootProvider>) -> Self {
        self.root_providers.push(provider);
        self
    }

    /// Set the optimization mode.
    pub fn use_optimization_mode(mut self, optimization: OptimizationMode) -> Self {
        self.optimization = optimization;
        self
    }

    /// Set the expansion strategy.
    pub fn use_expansion_strategy(mut self, strategy: ExpansionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the dependency tracking level.
    pub fn use_dependency_tracking(mut self, tracking: DependencyTrackingLevel) -> Self {
        self.tracking = tracking;
        self
    }

    /// Set the failed-root policy.
    pub fn use_rooting_policy(mut self, policy: RootingPolicy) -> Self {
        self.rooting_policy = policy;
        self
    }

    /// Set the canonical sharing policy.
    pub fn use_canonicalization_policy(mut self, policy: CanonicalizationPolicy) -> Self {
        self.canon_policy = policy;
        self
    }

    /// Set the stack trace emission policy.
    pub fn use_stack_trace_policy(mut self, policy: StackTraceEmissionPolicy) -> Self {
        self.stack_trace_policy = policy;
        self
    }

    /// Enable debug location info in the backend's output.
    pub fn use_debug_info(mut self, debug_info: bool) -> Self {
        self.debug_info = debug_info;
        self
    }

    /// Parse `key=value` backend options from the command line. The first
    /// entry may be a bare flag (it reads as `flag=true`); later bare
    /// entries are ignored rather than guessed at.
    pub fn use_backend_options<S: AsRef<str>>(mut self, options: &[S]) -> Self {
        for (index, option) in options.iter().enumerate() {
            let option = option.as_ref();
            match option.split_once('=') {
                Some((key, value)) => {
                    self.backend_options.insert(key.to_string(), value.to_string());
                }
                None if index == 0 => {
                    self.backend_options.insert(option.to_string(), "true".to_string());
                }
                None => {}
            }
        }
        self
    }

    /// Finish configuration.
    pub fn to_compilation(self) -> Compilation {
        let factory = NodeFactory::new(self.universe.clone());
        Compilation {
            universe: self.universe,
            factory,
            backend: self.backend,
            group: self.group,
            vtable: self.vtable,
            metadata: self.metadata,
            interop: self.interop,
            dictionary: self.dictionary,
            root_providers: self.root_providers,
            optimization: self.optimization,
            strategy: self.strategy,
            tracking: self.tracking,
            rooting_policy: self.rooting_policy,
            canon_policy: self.canon_policy,
            stack_trace_policy: self.stack_trace_policy,
            backend_options: self.backend_options,
            debug_info: self.debug_info,
            results: None,
        }
    }
}

/// A configured compilation, run at most once.
pub struct Compilation {
    universe: Arc<Universe>,
    factory: NodeFactory,
    backend: Box<dyn CompilationBackend>,
    group: Box<dyn CompilationModuleGroup>,
    vtable: Box<dyn VTableSliceProvider>,
    metadata: Box<dyn MetadataManager>,
    interop: Box<dyn InteropStubManager>,
    dictionary: Box<dyn DictionaryLayoutProvider>,
    root_providers: Vec<Box<dyn CompilationRootProvider>>,
    optimization: OptimizationMode,
    strategy: ExpansionStrategy,
    tracking: DependencyTrackingLevel,
    rooting_policy: RootingPolicy,
    canon_policy: CanonicalizationPolicy,
    stack_trace_policy: StackTraceEmissionPolicy,
    backend_options: FxHashMap<String, String>,
    debug_info: bool,
    results: Option<CompilationResults>,
}

impl Compilation {
    /// The universe being compiled.
    pub fn universe(&self) -> &Universe {
        &self.universe
    }

    /// A backend option set via the command line.
    pub fn backend_option(&self, key: &str) -> Option<&str> {
        self.backend_options.get(key).map(String::as_str)
    }

    /// Whether debug location info was requested.
    pub fn debug_info_enabled(&self) -> bool {
        self.debug_info
    }

    /// Root, expand to fixpoint, and collect results.
    pub fn compile(&mut self) -> Result<&CompilationResults, CompilationError> {
        info!(optimization = ?self.optimization, strategy = ?self.strategy, "compiling");
        let analyzer = DependencyAnalyzer::new(&self.factory, self.strategy, self.tracking);

        let mut rooting = RootingService::new(
            &self.factory,
            &analyzer,
            self.canon_policy,
            self.rooting_policy,
        );
        self.backend.pre_root(&mut rooting)?;
        for provider in &self.root_providers {
            provider.add_compilation_roots(&mut rooting)?;
        }
        let exports = rooting.take_exports();
        debug!(roots = analyzer.marked_count(), exports = exports.len(), "rooted");

        let engine = CompilationEngine {
            factory: &self.factory,
            backend: self.backend.as_ref(),
            vtable: self.vtable.as_ref(),
            group: self.group.as_ref(),
            metadata: self.metadata.as_ref(),
            interop: self.interop.as_ref(),
            dictionary: self.dictionary.as_ref(),
            bodies: DashMap::new(),
        };
        analyzer.run_to_fixpoint(&engine)?;

        let sorted = analyzer.marked_nodes_sorted();
        let mut marked_nodes = Vec::with_capacity(sorted.len());
        let mut node_names = Vec::with_capacity(sorted.len());
        let mut bodies = Vec::new();
        for node in &sorted {
            let kind = self.factory.kind(*node);
            node_names.push(self.factory.display(*node));
            if let NodeKind::MethodCode(method) = &kind {
                if let Some((_, body)) = engine.bodies.remove(method) {
                    bodies.push((*method, body));
                }
            }
            marked_nodes.push(kind);
        }
        let edges = analyzer
            .take_edges()
            .into_iter()
            .map(|e| RecordedEdge {
                dependent: e.dependent.map(|n| self.factory.display(n)),
                dependency: self.factory.display(e.dependency),
                reason: e.reason,
            })
            .collect();

        info!(nodes = marked_nodes.len(), methods = bodies.len(), "compilation complete");
        Ok(&*self.results.insert(CompilationResults {
            marked_nodes,
            node_names,
            bodies,
            exports,
            edges,
        }))
    }

    /// Results of a finished compilation.
    pub fn results(&self) -> Result<&CompilationResults, CompilationError> {
        self.results.as_ref().ok_or_else(|| {
            CompilationError::InvalidConfiguration("compile() has not been run".into())
        })
    }

    /// Write the backend's output (object file or portable source).
    pub fn write_output(&self, path: &Path) -> Result<(), CompilationError> {
        let results = self.results()?;
        self.backend.write_output(&self.universe, &results.bodies, path)
    }

    /// Write the linker exports file.
    pub fn write_exports_file(
        &self,
        target: TargetOs,
        library_name: &str,
        path: &Path,
    ) -> Result<(), CompilationError> {
        let results = self.results()?;
        let mut writer = ExportsFileWriter::new(target, library_name);
        for (_, symbol) in &results.exports {
            writer.add_export(symbol.clone());
        }
        writer.write(path)
    }

    /// Write the diagnostic object dump.
    pub fn write_object_dump(&self, path: &Path) -> Result<(), CompilationError> {
        let results = self.results()?;
        let mangler = NameMangler::new();
        let names: Vec<String> = results
            .bodies
            .iter()
            .map(|(method, _)| mangler.mangle(&self.universe.method_display(*method)))
            .collect();
        let entries: Vec<ObjectDumpEntry<'_>> = results
            .bodies
            .iter()
            .zip(&names)
            .map(|((_, body), name)| ObjectDumpEntry { name, body })
            .collect();
        write_object_dump(path, &entries)
    }

    /// Write the stack trace metadata blob.
    pub fn write_stack_trace_metadata(&self, path: &Path) -> Result<(), CompilationError> {
        let results = self.results()?;
        let methods: Vec<MethodId> = results.bodies.iter().map(|(m, _)| *m).collect();
        write_stack_trace_metadata(&self.universe, &methods, &self.stack_trace_policy, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_types::UniverseBuilder;

    fn empty_universe() -> Arc<Universe> {
        let mut b = UniverseBuilder::new();
        b.define_system_module("System.Private.CoreLib");
        b.finish()
    }

    #[test]
    fn backend_options_parse_key_value_pairs() {
        let compilation = CompilationBuilder::new(empty_universe())
            .use_backend_options(&["emit-comments=false", "runtime=minimal"])
            .to_compilation();
        assert_eq!(compilation.backend_option("emit-comments"), Some("false"));
        assert_eq!(compilation.backend_option("runtime"), Some("minimal"));
        assert_eq!(compilation.backend_option("absent"), None);
    }

    #[test]
    fn a_leading_bare_entry_reads_as_a_flag_and_later_ones_are_dropped() {
        let compilation = CompilationBuilder::new(empty_universe())
            .use_backend_options(&["verbose", "runtime=minimal", "stray"])
            .to_compilation();
        assert_eq!(compilation.backend_option("verbose"), Some("true"));
        assert_eq!(compilation.backend_option("runtime"), Some("minimal"));
        assert_eq!(compilation.backend_option("stray"), None);
    }
}
