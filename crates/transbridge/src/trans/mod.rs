//! Trans-node insertion and reordering
//!
//! The analyzer plans a conversion chain per producer/consumer mismatch, the
//! factory turns each planned step into a graph node, the inserter splices
//! chains into the graph and the reorder phase moves Casts across TransData.

pub mod analyzer;
pub mod factory;
pub mod inserter;
pub mod reorder;

pub use analyzer::{cast_upstream, resolve_requirement, BridgeAnalyzer, PlannedStep};
pub use factory::TransNodeFactory;
pub use inserter::{InsertionReport, TransNodeInserter};
pub use reorder::{CastReorder, ReorderReport};
