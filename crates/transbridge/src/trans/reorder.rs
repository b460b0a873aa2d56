// Cast/TransData reordering
//
// A Cast and an adjacent TransData commute: the layout change does not care
// about the element type and the Cast does not care about the layout. Moving
// the Cast to whichever side carries fewer elements shrinks the conversion
// work, and lining Casts up next to each other lets the cleanup passes fold
// them away.

use super::analyzer::cast_upstream;
use super::factory::TransNodeFactory;
use crate::config::DEFAULT_MAX_MERGE_ITERATIONS;
use crate::graph::passes::cleanup_passes;
use crate::graph::{GraphOptimizer, NodeId, OptimizationStats, TransGraph};
use crate::transfer::{ConversionKind, TransStep};
use crate::Result;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// What one reorder run did
#[derive(Debug, Clone, Default)]
pub struct ReorderReport {
    pub swapped: usize,
    pub skipped: usize,
    /// Cleanup run after the swaps, if any swap happened
    pub cleanup: Option<OptimizationStats>,
}

/// Swaps synthesized Casts across adjacent synthesized TransData nodes
pub struct CastReorder {
    factory: TransNodeFactory,
    max_merge_iterations: usize,
}

impl CastReorder {
    pub fn new(tile: i64) -> Self {
        Self {
            factory: TransNodeFactory::new(tile),
            max_merge_iterations: DEFAULT_MAX_MERGE_ITERATIONS,
        }
    }

    pub fn with_max_merge_iterations(mut self, max_merge_iterations: usize) -> Self {
        self.max_merge_iterations = max_merge_iterations;
        self
    }

    /// Reorder around every candidate Cast still present in the graph
    ///
    /// Candidates that are gone, or no longer synthesized Casts, are skipped
    /// with a warning.
    pub fn run(&self, graph: &mut TransGraph, candidates: &BTreeSet<NodeId>) -> Result<ReorderReport> {
        let mut report = ReorderReport::default();
        info!("Reordering around {} candidate casts", candidates.len());

        for &cast in candidates {
            if self.try_swap(graph, cast)? {
                report.swapped += 1;
            } else {
                report.skipped += 1;
            }
        }

        if report.swapped > 0 {
            let optimizer = GraphOptimizer::with_max_iterations(cleanup_passes(), self.max_merge_iterations);
            report.cleanup = Some(optimizer.optimize(graph)?);
        }
        info!("Swapped {} casts, skipped {}", report.swapped, report.skipped);
        Ok(report)
    }

    fn try_swap(&self, graph: &mut TransGraph, cast: NodeId) -> Result<bool> {
        let Some(node) = graph.node(cast) else {
            warn!("Reorder candidate {} is no longer in the graph", cast.index());
            return Ok(false);
        };
        if node.op_type != ConversionKind::Cast.op_type() || !node.is_synthesized() {
            warn!("Reorder candidate '{}' ({}) is not an inserted Cast", node.name, node.op_type);
            return Ok(false);
        }
        let inputs = graph.data_inputs(cast);
        let &[(producer, _, _)] = inputs.as_slice() else {
            warn!("Reorder candidate '{}' has {} data inputs", node.name, inputs.len());
            return Ok(false);
        };

        if is_inserted_trans_data(graph, producer) {
            self.hoist_cast(graph, producer, cast)
        } else {
            self.sink_cast(graph, cast)
        }
    }

    /// `TransData -> Cast` becomes `Cast -> TransData`
    ///
    /// Sibling Casts to the same type are folded into `cast` first. The two
    /// nodes swap payloads in place, so every edge keeps its position.
    fn hoist_cast(&self, graph: &mut TransGraph, trans: NodeId, cast: NodeId) -> Result<bool> {
        let trans_node = graph.expect_node(trans)?;
        let cast_node = graph.expect_node(cast)?;
        if graph.data_inputs(trans).len() != 1 {
            return Ok(false);
        }
        let (Some(pre), Some(post), Some(cast_out)) = (trans_node.input(0), trans_node.output(0), cast_node.output(0))
        else {
            return Ok(false);
        };

        let mut siblings = Vec::new();
        for (slot, consumer, _) in graph.data_outputs(trans) {
            let sibling = graph.expect_node(consumer)?;
            let same_cast = slot == 0
                && sibling.op_type == cast_node.op_type
                && sibling.is_synthesized()
                && graph.data_inputs(consumer).len() == 1
                && sibling.output(0).is_some_and(|out| out.equivalent(cast_out));
            if !same_cast {
                debug!("'{}' has consumers other than casts to {}", trans_node.name, cast_out.dtype);
                return Ok(false);
            }
            if consumer != cast {
                siblings.push(consumer);
            }
        }
        if !cast_upstream(pre.element_count(), post.element_count()) {
            debug!("Keeping '{}' after '{}': {} is smaller", cast_node.name, trans_node.name, post);
            return Ok(false);
        }
        if siblings.iter().any(|&sibling| !graph.can_merge(sibling, cast)) {
            return Ok(false);
        }

        let new_cast = self
            .factory
            .build(&TransStep::Cast { to: cast_out.dtype }, pre, cast_node.name.clone())?;
        let cast_pre = pre.with_dtype(cast_out.dtype);
        let new_trans = self
            .factory
            .build(&TransStep::LayoutTransform { format: post.format }, &cast_pre, trans_node.name.clone())?;
        if !new_trans.output(0).is_some_and(|out| out.equivalent(cast_out)) {
            debug!("Swapping '{}' and '{}' would change the output", trans_node.name, cast_node.name);
            return Ok(false);
        }
        debug!("Hoisting '{}' above '{}'", cast_node.name, trans_node.name);

        for sibling in siblings {
            graph.merge_node_into(sibling, cast)?;
        }
        graph.swap_payloads(trans, cast)?;
        graph.replace_payload(trans, new_cast)?;
        graph.replace_payload(cast, new_trans)?;
        Ok(true)
    }

    /// `Cast -> TransData*` becomes one `TransData -> Cast` per branch
    ///
    /// Only done when every consumer is an inserted TransData with a strictly
    /// smaller output than the Cast's input. The first branch's Cast takes
    /// over `cast`'s slot and name, so `cast` stays a valid Cast handle.
    fn sink_cast(&self, graph: &mut TransGraph, cast: NodeId) -> Result<bool> {
        let cast_node = graph.expect_node(cast)?;
        let cast_name = cast_node.name.clone();
        let (Some(x), Some(x_cast)) = (cast_node.input(0).cloned(), cast_node.output(0).cloned()) else {
            return Ok(false);
        };
        let Some((producer, producer_slot)) = graph.data_producer(cast, 0) else {
            return Ok(false);
        };
        let branches = graph.data_outputs(cast);
        if branches.is_empty() {
            return Ok(false);
        }

        let mut planned = Vec::with_capacity(branches.len());
        for &(slot, td, input_slot) in &branches {
            let td_node = graph.expect_node(td)?;
            if slot != 0 || input_slot != 0 || !is_inserted_trans_data(graph, td) || graph.data_inputs(td).len() != 1 {
                return Ok(false);
            }
            let Some(y) = td_node.output(0) else {
                return Ok(false);
            };
            if cast_upstream(x.element_count(), y.element_count()) {
                debug!("Keeping '{}' before '{}'", cast_name, td_node.name);
                return Ok(false);
            }
            let new_td = self
                .factory
                .build(&TransStep::LayoutTransform { format: y.format }, &x, td_node.name.clone())?;
            let Some(y_in) = new_td.output(0).cloned() else {
                return Ok(false);
            };
            if !y_in.with_dtype(x_cast.dtype).equivalent(y) {
                return Ok(false);
            }
            planned.push((td, new_td, y_in));
        }
        debug!("Sinking '{}' below {} trans nodes", cast_name, planned.len());

        let preds = graph.control_predecessors(cast);
        let succs = graph.control_successors(cast);
        for &pred in &preds {
            graph.remove_control_edge(pred, cast);
        }
        for &succ in &succs {
            graph.remove_control_edge(cast, succ);
        }
        graph.remove_data_edge(producer, producer_slot, cast, 0);
        for (td, _, _) in &planned {
            graph.remove_data_edge(cast, 0, *td, 0);
        }

        for (i, (td, new_td, y_in)) in planned.into_iter().enumerate() {
            graph.replace_payload(td, new_td)?;
            graph.add_data_edge(producer, producer_slot, td, 0)?;

            let branch = if i == 0 {
                let first = self
                    .factory
                    .build(&TransStep::Cast { to: x_cast.dtype }, &y_in, cast_name.clone())?;
                graph.replace_payload(cast, first)?;
                cast
            } else {
                let name = graph.unique_name(&cast_name);
                graph.add_node(self.factory.build(&TransStep::Cast { to: x_cast.dtype }, &y_in, name)?)?
            };

            for (slot, consumer, input_slot) in graph.data_outputs(td) {
                graph.remove_data_edge(td, slot, consumer, input_slot);
                graph.add_data_edge(branch, 0, consumer, input_slot)?;
            }
            graph.add_data_edge(td, 0, branch, 0)?;

            for pred in graph.control_predecessors(td) {
                graph.remove_control_edge(pred, td);
                graph.add_control_edge(pred, branch)?;
            }
            for succ in graph.control_successors(td) {
                graph.remove_control_edge(td, succ);
                graph.add_control_edge(branch, succ)?;
            }
            for &pred in &preds {
                graph.add_control_edge(pred, td)?;
            }
            for &succ in &succs {
                graph.add_control_edge(td, succ)?;
            }
        }
        Ok(true)
    }
}

fn is_inserted_trans_data(graph: &TransGraph, id: NodeId) -> bool {
    graph
        .node(id)
        .is_some_and(|n| n.is_synthesized() && n.op_type == ConversionKind::LayoutTransform.op_type())
}
