//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::Once;
use transbridge::desc::{DataType, Format, TensorDesc};
use transbridge::trans::TransNodeFactory;
use transbridge::{NodeId, StaticRegistry, TransBridge, TransGraph, TransStep};

static TRACING: Once = Once::new();

/// Route `tracing` output to the test harness, filtered by `RUST_LOG`
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Initialized engine over a registry that reads requirements off the graph
pub fn bridge() -> TransBridge<StaticRegistry> {
    bridge_with(StaticRegistry::new())
}

pub fn bridge_with(registry: StaticRegistry) -> TransBridge<StaticRegistry> {
    init_tracing();
    let mut bridge = TransBridge::new(registry);
    bridge.initialize().expect("default config is valid");
    bridge
}

pub fn plain(shape: &[i64], format: Format, dtype: DataType) -> TensorDesc {
    TensorDesc::new(shape.to_vec(), format, dtype)
}

pub fn tiled(origin: &[i64], origin_format: Format, format: Format, dtype: DataType) -> TensorDesc {
    TensorDesc::tiled(origin.to_vec(), origin_format, format, dtype, 16).expect("valid tiling")
}

pub fn source(graph: &mut TransGraph, name: &str, desc: TensorDesc) -> NodeId {
    graph.add_op("Data").name(name).output_desc(desc).finish().unwrap()
}

pub fn sink(graph: &mut TransGraph, op_type: &str, name: &str, producer: NodeId, want: TensorDesc) -> NodeId {
    graph
        .add_op(op_type)
        .name(name)
        .input(producer, 0, 0)
        .input_desc(want)
        .finish()
        .unwrap()
}

/// Add a factory-built conversion node fed by `producer:0`
pub fn conversion(graph: &mut TransGraph, name: &str, step: TransStep, producer: NodeId) -> NodeId {
    let input = graph.node(producer).unwrap().output(0).unwrap().clone();
    let node = TransNodeFactory::new(16).build(&step, &input, name).unwrap();
    let id = graph.add_node(node).unwrap();
    graph.add_data_edge(producer, 0, id, 0).unwrap();
    id
}

/// Op types from `consumer`'s input back to the first model-authored node
pub fn chain_into(graph: &TransGraph, consumer: NodeId) -> Vec<String> {
    let mut ops = Vec::new();
    let mut current = graph.data_producer(consumer, 0);
    while let Some((id, _)) = current {
        let node = graph.node(id).unwrap();
        if !node.is_synthesized() {
            break;
        }
        ops.push(node.op_type.clone());
        current = graph.data_producer(id, 0);
    }
    ops.reverse();
    ops
}

pub fn synthesized_count(graph: &TransGraph) -> usize {
    graph.statistics().synthesized_nodes
}
