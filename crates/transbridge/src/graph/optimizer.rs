// Merge optimizer driver
//
// Repeats a fixed pass list over a TransGraph until a full round leaves the
// graph unchanged. A round bound keeps a misbehaving pass from looping
// forever; hitting it is reported, never silently accepted.

use super::ir::TransGraph;
use super::passes::OptimizationPass;
use crate::config::DEFAULT_MAX_MERGE_ITERATIONS;
use anyhow::Result;
use tracing::{debug, info, warn};

/// Fixpoint driver for the merge and cleanup passes
pub struct GraphOptimizer {
    passes: Vec<Box<dyn OptimizationPass>>,
    max_iterations: usize,
}

impl GraphOptimizer {
    pub fn new(passes: Vec<Box<dyn OptimizationPass>>) -> Self {
        Self::with_max_iterations(passes, DEFAULT_MAX_MERGE_ITERATIONS)
    }

    pub fn with_max_iterations(passes: Vec<Box<dyn OptimizationPass>>, max_iterations: usize) -> Self {
        Self { passes, max_iterations }
    }

    /// Run rounds of every pass until one round changes nothing
    pub fn optimize(&self, graph: &mut TransGraph) -> Result<OptimizationStats> {
        let initial_nodes = graph.node_count();
        let mut stats = OptimizationStats::default();

        while stats.iterations < self.max_iterations {
            stats.iterations += 1;
            let mut changed = false;
            for pass in &self.passes {
                if pass.run(graph)? {
                    debug!("Round {}: {} rewrote the graph", stats.iterations, pass.name());
                    stats.rewrites += 1;
                    changed = true;
                }
            }
            if !changed {
                stats.converged = true;
                break;
            }
        }

        stats.nodes_removed = initial_nodes.saturating_sub(graph.node_count());
        if stats.converged {
            info!(
                "Merge converged in {} rounds, {} -> {} nodes",
                stats.iterations,
                initial_nodes,
                graph.node_count()
            );
        } else {
            warn!(
                "Merge still rewriting after {} rounds; result may not be a fixpoint",
                self.max_iterations
            );
        }
        Ok(stats)
    }
}

/// Outcome of one optimizer run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimizationStats {
    /// Rounds executed, the last one included
    pub iterations: usize,
    /// Pass runs that changed the graph
    pub rewrites: usize,
    pub nodes_removed: usize,
    /// False when the round bound cut the fixpoint short
    pub converged: bool,
}
