// Chain merge passes for TransGraph
//
// Each pass only ever touches conversion nodes synthesized by the bridging
// stage; model-authored nodes of the same op type are left alone.

mod dedup;
mod identity;
mod inverse_pair;

pub use dedup::BranchDeduplication;
pub use identity::IdentityElimination;
pub use inverse_pair::InversePairElimination;

use super::ir::TransGraph;
use anyhow::Result;

/// Optimization pass trait
///
/// Each optimization pass implements this trait to provide a
/// composable transformation on the graph.
pub trait OptimizationPass {
    /// Get the name of this pass (for logging/debugging)
    fn name(&self) -> &str;

    /// Run the optimization pass on the graph
    ///
    /// Returns `true` if the graph was modified, `false` otherwise.
    /// This is used to determine when to stop fixpoint iteration.
    fn run(&self, graph: &mut TransGraph) -> Result<bool>;
}

/// The full merge pipeline in application order
pub fn merge_passes() -> Vec<Box<dyn OptimizationPass>> {
    vec![
        Box::new(IdentityElimination),
        Box::new(BranchDeduplication),
        Box::new(InversePairElimination),
    ]
}

/// Passes that only remove nodes, run again after reordering
pub fn cleanup_passes() -> Vec<Box<dyn OptimizationPass>> {
    vec![Box::new(IdentityElimination), Box::new(InversePairElimination)]
}
