//! Bridging engine
//!
//! Runs the three phases over one graph:
//!
//! ```text
//! TransGraph
//!     ↓
//! 1. Insert → one conversion chain per producer/consumer mismatch
//!     ↓
//! 2. Merge → identity, shared-prefix and inverse-pair elimination
//!     ↓
//! 3. Reorder → move Casts across TransData to the smaller side
//! ```
//!
//! # Example
//!
//! ```
//! use transbridge::{StaticRegistry, TransBridge, TransGraph};
//!
//! let mut bridge = TransBridge::new(StaticRegistry::new());
//! bridge.initialize()?;
//!
//! let mut graph = TransGraph::new();
//! bridge.insert_and_merge_trans_nodes(&mut graph)?;
//! let candidates = bridge.get_optimizable_cast();
//! bridge.switch_trans_data_and_cast(&mut graph, &candidates)?;
//! bridge.finalize()?;
//! # Ok::<(), transbridge::TransError>(())
//! ```

use crate::config::TransConfig;
use crate::graph::passes::merge_passes;
use crate::graph::{ControlSnapshot, GraphOptimizer, NodeId, TransGraph};
use crate::registry::KernelRegistry;
use crate::trans::{CastReorder, TransNodeInserter};
use crate::transfer::ConversionKind;
use crate::{Result, TransError};
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::info;

/// Entry point for the bridging passes
pub struct TransBridge<R: KernelRegistry> {
    registry: R,
    config: TransConfig,
    initialized: bool,
    /// Casts next to a TransData, recorded by the last insertion run
    optimizable_casts: BTreeSet<NodeId>,
}

impl<R: KernelRegistry> TransBridge<R> {
    /// Create an engine with default settings
    pub fn new(registry: R) -> Self {
        Self::with_config(registry, TransConfig::default())
    }

    pub fn with_config(registry: R, config: TransConfig) -> Self {
        Self {
            registry,
            config,
            initialized: false,
            optimizable_casts: BTreeSet::new(),
        }
    }

    pub fn config(&self) -> &TransConfig {
        &self.config
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Validate the configuration and accept work. Calling it again is a no-op.
    pub fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        self.config.validate()?;
        self.initialized = true;
        info!("Trans bridge initialized (tile size {})", self.config.tile_size);
        Ok(())
    }

    /// Drop recorded candidates and stop accepting work. Calling it again is a no-op.
    pub fn finalize(&mut self) -> Result<()> {
        if self.initialized {
            self.optimizable_casts.clear();
            self.initialized = false;
            info!("Trans bridge finalized");
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Insert conversion chains on every mismatched edge, then merge them
    ///
    /// Aborts on the first edge that cannot be bridged. The Casts eligible for
    /// reordering are available from [`TransBridge::get_optimizable_cast`]
    /// afterwards.
    pub fn insert_and_merge_trans_nodes(&mut self, graph: &mut TransGraph) -> Result<()> {
        self.ensure_initialized("insert_and_merge_trans_nodes")?;
        let start = Instant::now();
        let snapshot = ControlSnapshot::capture(graph);
        let nodes_before = graph.node_count();

        let inserter = TransNodeInserter::new(&self.registry, self.config.tile_size);
        let report = inserter.insert(graph)?;
        self.verify(&snapshot, graph)?;

        let optimizer = GraphOptimizer::with_max_iterations(merge_passes(), self.config.max_merge_iterations);
        let stats = optimizer.optimize(graph)?;
        self.verify(&snapshot, graph)?;

        self.optimizable_casts = prune_candidates(graph, &report.optimizable_casts);
        info!(
            "Bridged {} edges: {} -> {} nodes ({} merged away) in {:.2}ms",
            report.bridged_edges,
            nodes_before,
            graph.node_count(),
            stats.nodes_removed,
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(())
    }

    /// Casts eligible for [`TransBridge::switch_trans_data_and_cast`]
    pub fn get_optimizable_cast(&self) -> BTreeSet<NodeId> {
        self.optimizable_casts.clone()
    }

    /// Swap Casts across adjacent TransData nodes where that shrinks the cast
    ///
    /// Does nothing when reordering is disabled in the configuration.
    pub fn switch_trans_data_and_cast(&mut self, graph: &mut TransGraph, candidates: &BTreeSet<NodeId>) -> Result<()> {
        self.ensure_initialized("switch_trans_data_and_cast")?;
        if !self.config.enable_reorder {
            info!("Cast reordering disabled, skipping {} candidates", candidates.len());
            return Ok(());
        }
        let snapshot = ControlSnapshot::capture(graph);

        CastReorder::new(self.config.tile_size)
            .with_max_merge_iterations(self.config.max_merge_iterations)
            .run(graph, candidates)?;
        self.verify(&snapshot, graph)?;

        self.optimizable_casts = prune_candidates(graph, &self.optimizable_casts);
        Ok(())
    }

    fn ensure_initialized(&self, operation: &str) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(TransError::NotInitialized(format!("{} called before initialize", operation)))
        }
    }

    fn verify(&self, snapshot: &ControlSnapshot, graph: &TransGraph) -> Result<()> {
        if self.config.verify_control_edges {
            snapshot.verify(graph)?;
        }
        Ok(())
    }
}

/// Candidates still present as inserted Casts
fn prune_candidates(graph: &TransGraph, candidates: &BTreeSet<NodeId>) -> BTreeSet<NodeId> {
    candidates
        .iter()
        .copied()
        .filter(|&id| {
            graph
                .node(id)
                .is_some_and(|n| n.is_synthesized() && n.op_type == ConversionKind::Cast.op_type())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StaticRegistry;

    #[test]
    fn test_operations_require_initialize() {
        let mut bridge = TransBridge::new(StaticRegistry::new());
        let mut graph = TransGraph::new();

        let err = bridge.insert_and_merge_trans_nodes(&mut graph).unwrap_err();
        assert!(matches!(err, TransError::NotInitialized(_)));
        let err = bridge.switch_trans_data_and_cast(&mut graph, &BTreeSet::new()).unwrap_err();
        assert!(matches!(err, TransError::NotInitialized(_)));
    }

    #[test]
    fn test_lifecycle_is_idempotent() {
        let mut bridge = TransBridge::new(StaticRegistry::new());
        bridge.initialize().unwrap();
        bridge.initialize().unwrap();
        assert!(bridge.is_initialized());
        bridge.finalize().unwrap();
        bridge.finalize().unwrap();
        assert!(!bridge.is_initialized());
    }

    #[test]
    fn test_initialize_rejects_bad_config() {
        let config = TransConfig::default().with_tile_size(0);
        let mut bridge = TransBridge::with_config(StaticRegistry::new(), config);
        assert!(matches!(bridge.initialize(), Err(TransError::Config(_))));
        assert!(!bridge.is_initialized());
    }

    #[test]
    fn test_empty_graph_is_untouched() {
        let mut bridge = TransBridge::new(StaticRegistry::new());
        bridge.initialize().unwrap();
        let mut graph = TransGraph::new();
        bridge.insert_and_merge_trans_nodes(&mut graph).unwrap();
        assert_eq!(graph.node_count(), 0);
        assert!(bridge.get_optimizable_cast().is_empty());
    }
}
