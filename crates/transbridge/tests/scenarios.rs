//! End-to-end bridging scenarios over small graphs

mod common;

use common::*;
use std::collections::BTreeSet;
use transbridge::desc::{DataType, Format};
use transbridge::{StaticRegistry, TransBridge, TransConfig, TransError, TransGraph, TransStep};

#[test]
fn test_tiled_fp16_to_nhwc_fp32() {
    let mut graph = TransGraph::new();
    let p = source(
        &mut graph,
        "conv_out",
        tiled(&[1, 4, 4, 16], Format::Nhwc, Format::Nc1hwc0, DataType::Float16),
    );
    let want = plain(&[1, 4, 4, 16], Format::Nhwc, DataType::Float32);
    let u = sink(&mut graph, "Softmax", "softmax", p, want.clone());
    let before = graph.node_count();

    let mut bridge = bridge();
    bridge.insert_and_merge_trans_nodes(&mut graph).unwrap();

    assert_eq!(chain_into(&graph, u), vec!["Cast", "TransData"]);
    assert_eq!(graph.node_count(), before + 2);

    let (tail, _) = graph.data_producer(u, 0).unwrap();
    assert!(graph.node(tail).unwrap().output(0).unwrap().conforms_to(&want));
    assert_eq!(bridge.get_optimizable_cast().len(), 1);
}

#[test]
fn test_matching_descriptors_insert_nothing() {
    let desc = plain(&[2, 8], Format::Nd, DataType::Float32);
    let mut graph = TransGraph::new();
    let p = source(&mut graph, "x", desc.clone());
    sink(&mut graph, "Relu", "relu", p, desc);
    // ND and a plain format of the same rank are the same bytes
    let q = source(&mut graph, "y", plain(&[1, 3, 4, 4], Format::Nd, DataType::Float16));
    sink(&mut graph, "Pool", "pool", q, plain(&[1, 3, 4, 4], Format::Nchw, DataType::Float16));

    let mut bridge = bridge();
    bridge.insert_and_merge_trans_nodes(&mut graph).unwrap();
    assert_eq!(graph.node_count(), 4);
    assert_eq!(synthesized_count(&graph), 0);
}

#[test]
fn test_shared_cast_prefix_collapses() {
    let mut graph = TransGraph::new();
    let p = source(&mut graph, "p", plain(&[8, 8], Format::Nd, DataType::Float16));
    let tails = [DataType::Int32, DataType::Bool, DataType::Int8];

    let mut consumers = Vec::new();
    for (i, dtype) in tails.into_iter().enumerate() {
        let up = conversion(&mut graph, &format!("up_{}", i), TransStep::Cast { to: DataType::Float32 }, p);
        let down = conversion(&mut graph, &format!("down_{}", i), TransStep::Cast { to: dtype }, up);
        consumers.push(sink(&mut graph, "Use", &format!("use_{}", i), down, plain(&[8, 8], Format::Nd, dtype)));
    }

    let mut bridge = bridge();
    bridge.insert_and_merge_trans_nodes(&mut graph).unwrap();

    let heads = graph.data_consumers(p, 0);
    assert_eq!(heads.len(), 1);
    let (shared, _) = heads[0];
    assert_eq!(graph.node(shared).unwrap().output(0).unwrap().dtype, DataType::Float32);
    assert_eq!(graph.data_consumers(shared, 0).len(), 3);
    for u in consumers {
        assert_eq!(chain_into(&graph, u), vec!["Cast", "Cast"]);
    }
}

#[test]
fn test_fan_out_shares_one_chain() {
    let mut graph = TransGraph::new();
    let p = source(&mut graph, "p", plain(&[1, 16, 4, 4], Format::Nchw, DataType::Float32));
    let want = tiled(&[1, 16, 4, 4], Format::Nchw, Format::Nc1hwc0, DataType::Float16);
    let users: Vec<_> = (0..3)
        .map(|i| sink(&mut graph, "Conv2D", &format!("conv_{}", i), p, want.clone()))
        .collect();

    let mut bridge = bridge();
    bridge.insert_and_merge_trans_nodes(&mut graph).unwrap();

    let tail = graph.data_producer(users[0], 0).unwrap();
    for &u in &users {
        assert_eq!(graph.data_producer(u, 0), Some(tail));
    }
    assert_eq!(synthesized_count(&graph), 2);
}

#[test]
fn test_hoists_cast_out_of_tiled_layout() {
    let mut graph = TransGraph::new();
    let p = source(&mut graph, "mask", plain(&[1, 16, 2, 2], Format::Nchw, DataType::Bool));
    let trans = conversion(&mut graph, "mask_TransData", TransStep::LayoutTransform { format: Format::Nc1hwc0 }, p);
    let cast = conversion(&mut graph, "mask_Cast", TransStep::Cast { to: DataType::Float16 }, trans);
    let want = tiled(&[1, 16, 2, 2], Format::Nchw, Format::Nc1hwc0, DataType::Float16);
    let u = sink(&mut graph, "Mul", "mul", cast, want.clone());

    let mut bridge = bridge();
    bridge
        .switch_trans_data_and_cast(&mut graph, &BTreeSet::from([cast]))
        .unwrap();

    assert_eq!(chain_into(&graph, u), vec!["Cast", "TransData"]);
    let first = graph.node(trans).unwrap();
    assert_eq!(first.input(0).unwrap().format, Format::Nchw);
    assert_eq!(first.output(0).unwrap().format, Format::Nchw);
    assert_eq!(first.input(0).unwrap().dtype, DataType::Bool);
    assert_eq!(first.output(0).unwrap().dtype, DataType::Float16);

    let second = graph.node(cast).unwrap();
    assert_eq!(second.output(0).unwrap().format, Format::Nc1hwc0);
    assert!(second.output(0).unwrap().conforms_to(&want));
}

#[test]
fn test_reorder_disabled_is_a_no_op() {
    let mut graph = TransGraph::new();
    let p = source(&mut graph, "mask", plain(&[1, 16, 2, 2], Format::Nchw, DataType::Bool));
    let trans = conversion(&mut graph, "t", TransStep::LayoutTransform { format: Format::Nc1hwc0 }, p);
    let cast = conversion(&mut graph, "c", TransStep::Cast { to: DataType::Float16 }, trans);

    let config = TransConfig::default().with_reorder(false);
    let mut bridge = TransBridge::with_config(StaticRegistry::new(), config);
    bridge.initialize().unwrap();
    bridge
        .switch_trans_data_and_cast(&mut graph, &BTreeSet::from([cast]))
        .unwrap();
    assert_eq!(graph.node(trans).unwrap().op_type, "TransData");
}

#[test]
fn test_axis_reorder_uses_transpose() {
    let mut graph = TransGraph::new();
    let p = source(&mut graph, "p", plain(&[1, 3, 4, 5], Format::Nchw, DataType::Float32));
    let u = sink(&mut graph, "Pool", "pool", p, plain(&[1, 4, 5, 3], Format::Nhwc, DataType::Float32));

    let mut bridge = bridge();
    bridge.insert_and_merge_trans_nodes(&mut graph).unwrap();
    assert_eq!(chain_into(&graph, u), vec!["Transpose"]);
}

#[test]
fn test_singleton_axis_move_becomes_reshape() {
    let mut graph = TransGraph::new();
    let p = source(&mut graph, "p", plain(&[1, 1, 4, 5], Format::Nchw, DataType::Float32));
    let u = sink(&mut graph, "Pool", "pool", p, plain(&[1, 4, 5, 1], Format::Nhwc, DataType::Float32));

    let mut bridge = bridge();
    bridge.insert_and_merge_trans_nodes(&mut graph).unwrap();
    assert_eq!(chain_into(&graph, u), vec!["Reshape"]);
}

#[test]
fn test_control_edge_survives_insertion() {
    let mut graph = TransGraph::new();
    let x = graph.add_op("Assign").name("x").finish().unwrap();
    let p = graph
        .add_op("Conv2D")
        .name("p")
        .after(x)
        .output_desc(tiled(&[1, 4, 4, 16], Format::Nhwc, Format::Nc1hwc0, DataType::Float16))
        .finish()
        .unwrap();
    let y = graph.add_op("Assign").name("y").finish().unwrap();
    graph.add_control_edge(p, y).unwrap();
    let users = [
        sink(&mut graph, "Softmax", "a", p, plain(&[1, 4, 4, 16], Format::Nhwc, DataType::Float32)),
        sink(&mut graph, "Softmax", "b", p, plain(&[1, 4, 4, 16], Format::Nhwc, DataType::Float32)),
    ];
    let before = graph.control_edges();

    let mut bridge = bridge();
    bridge.insert_and_merge_trans_nodes(&mut graph).unwrap();
    let candidates = bridge.get_optimizable_cast();
    bridge.switch_trans_data_and_cast(&mut graph, &candidates).unwrap();

    assert_eq!(graph.control_edges(), before);
    for u in users {
        assert_eq!(chain_into(&graph, u).len(), 2);
        assert!(graph.has_path(x, u));
    }
    assert!(graph.has_path(p, y));
}

#[test]
fn test_unbridgeable_edge_is_fatal() {
    let mut graph = TransGraph::new();
    let p = source(
        &mut graph,
        "p",
        tiled(&[1, 16, 4, 4], Format::Nchw, Format::Nc1hwc0, DataType::Float16),
    );
    sink(
        &mut graph,
        "Conv3D",
        "conv3d",
        p,
        tiled(&[1, 16, 2, 4, 4], Format::Ncdhw, Format::Ndc1hwc0, DataType::Float16),
    );

    let mut bridge = bridge();
    let err = bridge.insert_and_merge_trans_nodes(&mut graph).unwrap_err();
    assert!(matches!(err, TransError::UnsupportedConversion(_)));
    assert!(!err.is_internal());
    assert!(err.to_string().contains("p:0 -> conv3d:0"));
}

#[test]
fn test_format_agnostic_consumer_only_casts() {
    let mut graph = TransGraph::new();
    let p = source(
        &mut graph,
        "p",
        tiled(&[1, 16, 4, 4], Format::Nchw, Format::Nc1hwc0, DataType::Float16),
    );
    let u = sink(&mut graph, "Relu", "relu", p, plain(&[1, 16, 4, 4], Format::Nchw, DataType::Float32));

    let mut bridge = bridge_with(StaticRegistry::new().with_format_agnostic("Relu"));
    bridge.insert_and_merge_trans_nodes(&mut graph).unwrap();
    assert_eq!(chain_into(&graph, u), vec!["Cast"]);
}

#[test]
fn test_tile_size_from_config_file() {
    use std::io::Write;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"[trans-bridge]\ntile_size = 32\n").unwrap();
    let config = TransConfig::load(file.path()).unwrap();

    let mut graph = TransGraph::new();
    let p = source(&mut graph, "p", plain(&[1, 48, 2, 2], Format::Nchw, DataType::Float16));
    let want = transbridge::desc::TensorDesc::tiled(vec![1, 48, 2, 2], Format::Nchw, Format::Nc1hwc0, DataType::Float16, 32)
        .unwrap();
    let u = sink(&mut graph, "Conv2D", "conv", p, want);

    let mut bridge = TransBridge::with_config(StaticRegistry::new(), config);
    bridge.initialize().unwrap();
    bridge.insert_and_merge_trans_nodes(&mut graph).unwrap();

    let (tail, _) = graph.data_producer(u, 0).unwrap();
    assert_eq!(graph.node(tail).unwrap().output(0).unwrap().shape, vec![1, 2, 2, 2, 32]);
}
