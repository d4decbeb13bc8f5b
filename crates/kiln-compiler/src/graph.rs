//! Dependency analyzer
//!
//! Transitive-closure engine over graph nodes. A node moves through three
//! states: unmarked, marked (reachable, dependencies not yet computed) and
//! expanded (dependencies computed and inserted). Expansion may synthesize
//! brand-new nodes; the loop runs until no marked-but-unexpanded node
//! remains. Termination follows from the entity space being finite per
//! compilation and canonicalization bounding generic expansion.
//!
//! The final node order is a pure function of the reachable set: nodes sort
//! by the factory's structural comparer, never by discovery time or thread
//! schedule, so identical inputs produce identical output.

use crossbeam::queue::SegQueue;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::CompilationError;
use crate::factory::NodeFactory;
use crate::node::NodeId;

/// How much of the dependency graph's edge structure to record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DependencyTrackingLevel {
    /// Record nothing
    #[default]
    None,
    /// Record the first edge that marked each node
    First,
    /// Record every edge, including edges to already-marked nodes
    All,
}

/// How marked nodes are expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionStrategy {
    /// Expand on the calling thread, in discovery order
    SingleThreaded,
    /// Expand each wave across worker threads; 0 means one per CPU
    Parallel(usize),
}

impl Default for ExpansionStrategy {
    fn default() -> Self {
        ExpansionStrategy::SingleThreaded
    }
}

/// One recorded dependency edge.
#[derive(Debug, Clone)]
pub struct DependencyEdge {
    /// The node whose expansion produced the edge; `None` for roots
    pub dependent: Option<NodeId>,
    /// The marked dependency
    pub dependency: NodeId,
    /// Why the edge exists
    pub reason: &'static str,
}

/// A dependency that only applies if some other node is also marked.
#[derive(Debug, Clone)]
pub struct ConditionalDependency {
    /// Node to mark once the trigger marks
    pub dependee: NodeId,
    /// The node whose marking activates this dependency
    pub trigger: NodeId,
    /// Why the edge exists
    pub reason: &'static str,
}

/// Dependency list one node expansion produces.
#[derive(Debug, Default)]
pub struct NodeDependencies {
    /// Unconditional edges
    pub static_deps: Vec<(NodeId, &'static str)>,
    /// Edges contingent on a trigger node being marked
    pub conditional_deps: Vec<ConditionalDependency>,
}

impl NodeDependencies {
    /// Add an unconditional edge.
    pub fn push(&mut self, dependency: NodeId, reason: &'static str) {
        self.static_deps.push((dependency, reason));
    }

    /// Add a conditional edge.
    pub fn push_conditional(&mut self, dependee: NodeId, trigger: NodeId, reason: &'static str) {
        self.conditional_deps.push(ConditionalDependency {
            dependee,
            trigger,
            reason,
        });
    }
}

/// Computes a node's dependency list. Called exactly once per marked node;
/// for method-code nodes this is where the method body gets compiled.
pub trait DependencyProvider: Sync {
    /// Dependencies of `node`. Recoverable resolution failures must be
    /// absorbed (throwing-stub substitution) before returning; an `Err`
    /// aborts the whole compilation.
    fn compute_dependencies(&self, node: NodeId) -> Result<NodeDependencies, CompilationError>;
}

/// The mark-and-expand fixpoint engine.
pub struct DependencyAnalyzer<'a> {
    factory: &'a NodeFactory,
    marked: DashSet<NodeId>,
    pending: SegQueue<NodeId>,
    conditional: DashMap<NodeId, Vec<(NodeId, &'static str)>>,
    edges: Mutex<Vec<DependencyEdge>>,
    tracking: DependencyTrackingLevel,
    strategy: ExpansionStrategy,
}

impl<'a> DependencyAnalyzer<'a> {
    /// Analyzer over the given factory.
    pub fn new(
        factory: &'a NodeFactory,
        strategy: ExpansionStrategy,
        tracking: DependencyTrackingLevel,
    ) -> Self {
        Self {
            factory,
            marked: DashSet::new(),
            pending: SegQueue::new(),
            conditional: DashMap::new(),
            edges: Mutex::new(Vec::new()),
            tracking,
            strategy,
        }
    }

    /// Whether a node has been marked reachable.
    pub fn is_marked(&self, node: NodeId) -> bool {
        self.marked.contains(&node)
    }

    /// Number of marked nodes.
    pub fn marked_count(&self) -> usize {
        self.marked.len()
    }

    /// Mark `node` reachable. Idempotent: marking twice neither duplicates
    /// edges nor re-expands the node. Marking also fires any conditional
    /// dependencies waiting on this node.
    pub fn mark(&self, node: NodeId, dependent: Option<NodeId>, reason: &'static str) {
        let newly_marked = self.marked.insert(node);
        match self.tracking {
            DependencyTrackingLevel::None => {}
            DependencyTrackingLevel::First if !newly_marked => {}
            _ => self.edges.lock().push(DependencyEdge {
                dependent,
                dependency: node,
                reason,
            }),
        }
        if newly_marked {
            trace!(node = %self.factory.display(node), reason, "marked");
            self.pending.push(node);
            if let Some((_, waiters)) = self.conditional.remove(&node) {
                for (dependee, waiter_reason) in waiters {
                    self.mark(dependee, Some(node), waiter_reason);
                }
            }
        }
    }

    /// Register a conditional dependency: mark `dependee` when (and only
    /// when) `trigger` is marked. Re-evaluated on the trigger's marking, not
    /// just at registration.
    pub fn add_conditional(&self, dependee: NodeId, trigger: NodeId, reason: &'static str) {
        if self.is_marked(trigger) {
            self.mark(dependee, Some(trigger), reason);
            return;
        }
        self.conditional.entry(trigger).or_default().push((dependee, reason));
        // The trigger may have marked between the check and the insert; the
        // marker only drains entries present at its removal, so re-check.
        if self.is_marked(trigger) {
            if let Some((_, waiters)) = self.conditional.remove(&trigger) {
                for (dependee, waiter_reason) in waiters {
                    self.mark(dependee, Some(trigger), waiter_reason);
                }
            }
        }
    }

    /// Run mark-and-expand until no unexpanded node remains.
    pub fn run_to_fixpoint(
        &self,
        provider: &dyn DependencyProvider,
    ) -> Result<(), CompilationError> {
        let mut wave = 0usize;
        loop {
            let mut batch = Vec::new();
            while let Some(node) = self.pending.pop() {
                batch.push(node);
            }
            if batch.is_empty() {
                break;
            }
            debug!(wave, nodes = batch.len(), "expanding wave");
            match self.strategy {
                ExpansionStrategy::SingleThreaded => {
                    for node in batch {
                        self.expand(node, provider)?;
                    }
                }
                ExpansionStrategy::Parallel(threads) => {
                    self.expand_parallel(batch, threads, provider)?;
                }
            }
            wave += 1;
        }
        debug!(marked = self.marked_count(), waves = wave, "fixpoint reached");
        Ok(())
    }

    fn expand(
        &self,
        node: NodeId,
        provider: &dyn DependencyProvider,
    ) -> Result<(), CompilationError> {
        let deps = provider.compute_dependencies(node)?;
        for (dependency, reason) in deps.static_deps {
            self.mark(dependency, Some(node), reason);
        }
        for cond in deps.conditional_deps {
            self.add_conditional(cond.dependee, cond.trigger, cond.reason);
        }
        Ok(())
    }

    fn expand_parallel(
        &self,
        batch: Vec<NodeId>,
        threads: usize,
        provider: &dyn DependencyProvider,
    ) -> Result<(), CompilationError> {
        let workers = if threads == 0 {
            num_cpus::get().max(1)
        } else {
            threads
        };
        let workers = workers.min(batch.len()).max(1);
        let chunk_size = batch.len().div_ceil(workers);
        let failures: Mutex<Vec<CompilationError>> = Mutex::new(Vec::new());

        std::thread::scope(|scope| {
            for chunk in batch.chunks(chunk_size) {
                let failures = &failures;
                scope.spawn(move || {
                    for node in chunk {
                        if let Err(e) = self.expand(*node, provider) {
                            failures.lock().push(e);
                            return;
                        }
                    }
                });
            }
        });

        match failures.into_inner().into_iter().next() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// The final marked-node list, in the deterministic total order.
    pub fn marked_nodes_sorted(&self) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self.marked.iter().map(|n| *n).collect();
        nodes.sort_by(|a, b| self.factory.compare(*a, *b));
        nodes
    }

    /// Recorded dependency edges, per the tracking level.
    pub fn take_edges(&self) -> Vec<DependencyEdge> {
        std::mem::take(&mut self.edges.lock())
    }
}
