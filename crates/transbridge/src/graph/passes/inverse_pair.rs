// Inverse pair elimination
//
// A conversion immediately undone by the next conversion of the same kind
// (Cast f16->f32 then f32->f16, tile then de-tile, NCHW->NHWC->NCHW, ...)
// is removed together with its inverse.

use super::OptimizationPass;
use crate::graph::ir::{GraphNode, NodeId, TransGraph};
use crate::transfer::ConversionKind;
use anyhow::Result;
use tracing::debug;

/// Inverse pair elimination pass
pub struct InversePairElimination;

impl InversePairElimination {
    fn same_kind(a: &GraphNode, b: &GraphNode) -> bool {
        match (ConversionKind::from_op_type(&a.op_type), ConversionKind::from_op_type(&b.op_type)) {
            (Some(x), Some(y)) => x == y || (x.is_reshape_like() && y.is_reshape_like()),
            _ => false,
        }
    }

    /// `(first, second)` when `first` feeds only `second` and `second` undoes it
    fn find_pair(graph: &TransGraph, first: NodeId) -> Option<(NodeId, NodeId)> {
        let a = graph.node(first)?;
        if !a.is_synthesized() || graph.data_inputs(first).len() != 1 {
            return None;
        }
        let outputs = graph.data_outputs(first);
        let &[(0, second, 0)] = outputs.as_slice() else {
            return None;
        };
        let b = graph.node(second)?;
        if !b.is_synthesized() || !Self::same_kind(a, b) {
            return None;
        }
        let restores = a.input(0)?.equivalent(b.output(0)?);
        restores.then_some((first, second))
    }
}

impl OptimizationPass for InversePairElimination {
    fn name(&self) -> &str {
        "InversePairElimination"
    }

    fn run(&self, graph: &mut TransGraph) -> Result<bool> {
        let mut removed_any = false;

        for id in graph.topological_sort()? {
            if !graph.contains(id) {
                continue;
            }
            let Some((first, second)) = Self::find_pair(graph, id) else {
                continue;
            };
            debug!(
                "Removing inverse pair {} -> {}",
                graph.expect_node(first)?.name,
                graph.expect_node(second)?.name
            );
            graph.bypass_node(second)?;
            graph.bypass_node(first)?;
            removed_any = true;
        }

        Ok(removed_any)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desc::{DataType, Format, TensorDesc};
    use crate::graph::ir::{AttrValue, INSERTED_ATTR};

    fn conv(graph: &mut TransGraph, op: &str, name: &str, src: NodeId, input: &TensorDesc, output: &TensorDesc) -> NodeId {
        graph
            .add_op(op)
            .name(name)
            .input(src, 0, 0)
            .input_desc(input.clone())
            .output_desc(output.clone())
            .attribute(INSERTED_ATTR, AttrValue::Bool(true))
            .finish()
            .unwrap()
    }

    #[test]
    fn test_cast_round_trip_removed() {
        let f16 = TensorDesc::new(vec![2, 3], Format::Nd, DataType::Float16);
        let f32 = f16.with_dtype(DataType::Float32);
        let mut graph = TransGraph::new();
        let a = graph.add_op("Data").name("a").output_desc(f16.clone()).finish().unwrap();
        let up = conv(&mut graph, "Cast", "up", a, &f16, &f32);
        let down = conv(&mut graph, "Cast", "down", up, &f32, &f16);
        let sink = graph.add_op("Use").name("sink").input(down, 0, 0).input_desc(f16.clone()).finish().unwrap();

        assert!(InversePairElimination.run(&mut graph).unwrap());
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.data_producer(sink, 0), Some((a, 0)));
    }

    #[test]
    fn test_shared_first_node_kept() {
        let f16 = TensorDesc::new(vec![2, 3], Format::Nd, DataType::Float16);
        let f32 = f16.with_dtype(DataType::Float32);
        let mut graph = TransGraph::new();
        let a = graph.add_op("Data").name("a").finish().unwrap();
        let up = conv(&mut graph, "Cast", "up", a, &f16, &f32);
        let down = conv(&mut graph, "Cast", "down", up, &f32, &f16);
        graph.add_op("Use").name("other").input(up, 0, 0).finish().unwrap();
        graph.add_op("Use").name("sink").input(down, 0, 0).finish().unwrap();

        assert!(!InversePairElimination.run(&mut graph).unwrap());
        assert_eq!(graph.node_count(), 5);
    }

    #[test]
    fn test_different_kinds_kept() {
        let nchw = TensorDesc::new(vec![1, 16, 2, 2], Format::Nchw, DataType::Float16);
        let tiled = TensorDesc::tiled(vec![1, 16, 2, 2], Format::Nchw, Format::Nc1hwc0, DataType::Float16, 16).unwrap();
        let mut graph = TransGraph::new();
        let a = graph.add_op("Data").name("a").finish().unwrap();
        let t = conv(&mut graph, "TransData", "t", a, &nchw, &tiled);
        let c = conv(&mut graph, "Cast", "c", t, &tiled, &nchw);
        graph.add_op("Use").name("sink").input(c, 0, 0).finish().unwrap();

        assert!(!InversePairElimination.run(&mut graph).unwrap());
    }

    #[test]
    fn test_orderings_survive_pair_removal() {
        let f16 = TensorDesc::new(vec![2, 3], Format::Nd, DataType::Float16);
        let f32 = f16.with_dtype(DataType::Float32);
        let mut graph = TransGraph::new();
        let a = graph.add_op("Data").name("a").output_desc(f16.clone()).finish().unwrap();
        let gate = graph.add_op("Barrier").name("gate").finish().unwrap();
        let after = graph.add_op("Barrier").name("after").finish().unwrap();
        let up = conv(&mut graph, "Cast", "up", a, &f16, &f32);
        let down = conv(&mut graph, "Cast", "down", up, &f32, &f16);
        let sink = graph.add_op("Use").name("sink").input(down, 0, 0).input_desc(f16.clone()).finish().unwrap();
        graph.add_control_edge(gate, up).unwrap();
        graph.add_control_edge(down, after).unwrap();

        assert!(InversePairElimination.run(&mut graph).unwrap());
        assert!(!graph.contains(up));
        assert!(!graph.contains(down));
        assert_eq!(graph.data_producer(sink, 0), Some((a, 0)));
        assert!(graph.control_successors(gate).contains(&sink));
        assert!(graph.control_successors(gate).contains(&after));
        assert!(graph.has_path(a, after));
    }
}
