// Graph module for the trans-node bridging passes
//
// Arena-backed graph IR with stable node handles, the merge passes that
// rewrite it and the fixpoint driver that runs them.

pub mod control;
pub mod ir;
pub mod optimizer;
pub mod passes;

// Re-exports for convenience
pub use control::ControlSnapshot;
pub use ir::{AttrValue, Dependency, GraphNode, NodeId, OpDesc, TransGraph, INSERTED_ATTR};
pub use optimizer::{GraphOptimizer, OptimizationStats};
pub use passes::OptimizationPass;
