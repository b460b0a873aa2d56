// Tensor graph intermediate representation
//
// Operators are nodes of a petgraph StableGraph. Data edges carry a tensor
// from an output slot to an input slot; control edges only order execution.
// Node ids stay valid across removals, which the rewrite passes rely on.

use crate::desc::TensorDesc;
use anyhow::{anyhow, bail, Context, Result};
use petgraph::algo::{has_path_connecting, toposort};
use petgraph::stable_graph::{EdgeIndex, EdgeReference, NodeIndex, StableGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Direction;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Node identifier in the graph (petgraph NodeIndex)
pub type NodeId = NodeIndex;

/// Attribute marking nodes synthesized by the bridging passes
pub const INSERTED_ATTR: &str = "_trans_bridge_inserted";

/// Edge between two operators
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependency {
    /// Tensor flows from `output_slot` of the source to `input_slot` of the target
    Data { output_slot: u8, input_slot: u8 },
    /// Execution order only
    Control,
}

impl Dependency {
    pub fn is_data(&self) -> bool {
        matches!(self, Dependency::Data { .. })
    }
}

/// Operator attribute value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Ints(Vec<i64>),
    Str(String),
}

/// Per-slot tensor descriptors and attributes of an operator
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpDesc {
    pub inputs: Vec<TensorDesc>,
    pub outputs: Vec<TensorDesc>,
    pub attrs: BTreeMap<String, AttrValue>,
}

/// A node in the computation graph
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    /// Unique node name
    pub name: String,
    /// Operation type (e.g., "Conv2D", "Cast", "TransData")
    pub op_type: String,
    pub desc: OpDesc,
}

impl GraphNode {
    pub fn new(name: impl Into<String>, op_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            op_type: op_type.into(),
            desc: OpDesc::default(),
        }
    }

    pub fn input(&self, slot: usize) -> Option<&TensorDesc> {
        self.desc.inputs.get(slot)
    }

    pub fn output(&self, slot: usize) -> Option<&TensorDesc> {
        self.desc.outputs.get(slot)
    }

    /// Get attribute by name
    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.desc.attrs.get(name)
    }

    /// True for conversion nodes created by the bridging passes
    pub fn is_synthesized(&self) -> bool {
        matches!(self.attr(INSERTED_ATTR), Some(AttrValue::Bool(true)))
    }
}

/// Computation graph with data and control edges
#[derive(Debug, Clone, Default)]
pub struct TransGraph {
    graph: StableGraph<GraphNode, Dependency>,

    /// Node name to node ID mapping
    name_to_id: FxHashMap<String, NodeId>,
}

impl TransGraph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Start building a new operation
    pub fn add_op(&mut self, op_type: impl Into<String>) -> NewOp<'_> {
        NewOp::new(self, op_type.into())
    }

    /// Insert a fully described node
    pub fn add_node(&mut self, node: GraphNode) -> Result<NodeId> {
        if node.name.is_empty() {
            bail!("{} node has an empty name", node.op_type);
        }
        if self.name_to_id.contains_key(&node.name) {
            bail!("node name '{}' already in use", node.name);
        }
        let name = node.name.clone();
        let id = self.graph.add_node(node);
        self.name_to_id.insert(name, id);
        Ok(id)
    }

    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.graph.node_weight(id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut GraphNode> {
        self.graph.node_weight_mut(id)
    }

    /// Node that must exist, for use inside rewrites
    pub fn expect_node(&self, id: NodeId) -> Result<&GraphNode> {
        self.node(id).ok_or_else(|| anyhow!("node {} not found", id.index()))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.graph.contains_node(id)
    }

    /// Get node ID by name
    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.name_to_id.get(name).copied()
    }

    /// Get node by name
    pub fn node_by_name(&self, name: &str) -> Option<&GraphNode> {
        self.node_id(name).and_then(|id| self.node(id))
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// All node ids in insertion order
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.graph.node_indices().collect()
    }

    /// First name of the form `base`, `base_1`, `base_2`, ... not yet taken
    pub fn unique_name(&self, base: &str) -> String {
        if !self.name_to_id.contains_key(base) {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{}_{}", base, n))
            .find(|candidate| !self.name_to_id.contains_key(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    /// Connect an output slot to an input slot
    ///
    /// An input slot has at most one producer.
    pub fn add_data_edge(&mut self, src: NodeId, output_slot: u8, dst: NodeId, input_slot: u8) -> Result<()> {
        self.check_endpoints(src, dst)?;
        if let Some((producer, _)) = self.data_producer(dst, input_slot) {
            bail!(
                "input {} of '{}' is already fed by '{}'",
                input_slot,
                self.graph[dst].name,
                self.graph[producer].name
            );
        }
        self.graph.add_edge(src, dst, Dependency::Data { output_slot, input_slot });
        Ok(())
    }

    /// Add an ordering constraint; duplicates and self-loops are ignored
    pub fn add_control_edge(&mut self, src: NodeId, dst: NodeId) -> Result<bool> {
        self.check_endpoints(src, dst)?;
        if src == dst || self.control_successors(src).contains(&dst) {
            return Ok(false);
        }
        self.graph.add_edge(src, dst, Dependency::Control);
        Ok(true)
    }

    fn check_endpoints(&self, src: NodeId, dst: NodeId) -> Result<()> {
        if !self.contains(src) {
            bail!("edge source {} not found", src.index());
        }
        if !self.contains(dst) {
            bail!("edge target {} not found", dst.index());
        }
        Ok(())
    }

    fn find_edge(&self, src: NodeId, dst: NodeId, dep: &Dependency) -> Option<EdgeIndex> {
        self.graph
            .edges_directed(src, Direction::Outgoing)
            .find(|e| e.target() == dst && e.weight() == dep)
            .map(|e| e.id())
    }

    /// Remove one data edge, returns false when it did not exist
    pub fn remove_data_edge(&mut self, src: NodeId, output_slot: u8, dst: NodeId, input_slot: u8) -> bool {
        match self.find_edge(src, dst, &Dependency::Data { output_slot, input_slot }) {
            Some(edge) => self.graph.remove_edge(edge).is_some(),
            None => false,
        }
    }

    pub fn remove_control_edge(&mut self, src: NodeId, dst: NodeId) -> bool {
        match self.find_edge(src, dst, &Dependency::Control) {
            Some(edge) => self.graph.remove_edge(edge).is_some(),
            None => false,
        }
    }

    /// Remove a node together with all of its edges
    pub fn remove_node(&mut self, id: NodeId) -> Result<GraphNode> {
        let node = self
            .graph
            .remove_node(id)
            .ok_or_else(|| anyhow!("cannot remove node {}: not found", id.index()))?;
        self.name_to_id.remove(&node.name);
        Ok(node)
    }

    /// Producer feeding an input slot
    pub fn data_producer(&self, id: NodeId, input_slot: u8) -> Option<(NodeId, u8)> {
        self.graph
            .edges_directed(id, Direction::Incoming)
            .find_map(|e: EdgeReference<Dependency>| match e.weight() {
                Dependency::Data { output_slot, input_slot: slot } if *slot == input_slot => {
                    Some((e.source(), *output_slot))
                }
                _ => None,
            })
    }

    /// All data inputs as `(producer, output_slot, input_slot)`, ordered by input slot
    pub fn data_inputs(&self, id: NodeId) -> Vec<(NodeId, u8, u8)> {
        let mut inputs: Vec<_> = self
            .graph
            .edges_directed(id, Direction::Incoming)
            .filter_map(|e: EdgeReference<Dependency>| match e.weight() {
                Dependency::Data { output_slot, input_slot } => Some((e.source(), *output_slot, *input_slot)),
                Dependency::Control => None,
            })
            .collect();
        inputs.sort_by_key(|&(_, _, input_slot)| input_slot);
        inputs
    }

    /// Consumers of one output slot as `(consumer, input_slot)`, in node order
    pub fn data_consumers(&self, id: NodeId, output_slot: u8) -> Vec<(NodeId, u8)> {
        let mut consumers: Vec<_> = self
            .data_outputs(id)
            .into_iter()
            .filter(|&(slot, _, _)| slot == output_slot)
            .map(|(_, consumer, input_slot)| (consumer, input_slot))
            .collect();
        consumers.sort();
        consumers
    }

    /// All outgoing data edges as `(output_slot, consumer, input_slot)`
    pub fn data_outputs(&self, id: NodeId) -> Vec<(u8, NodeId, u8)> {
        let mut outputs: Vec<_> = self
            .graph
            .edges_directed(id, Direction::Outgoing)
            .filter_map(|e: EdgeReference<Dependency>| match e.weight() {
                Dependency::Data { output_slot, input_slot } => Some((*output_slot, e.target(), *input_slot)),
                Dependency::Control => None,
            })
            .collect();
        outputs.sort();
        outputs
    }

    pub fn control_predecessors(&self, id: NodeId) -> Vec<NodeId> {
        self.control_neighbors(id, Direction::Incoming)
    }

    pub fn control_successors(&self, id: NodeId) -> Vec<NodeId> {
        self.control_neighbors(id, Direction::Outgoing)
    }

    fn control_neighbors(&self, id: NodeId, direction: Direction) -> Vec<NodeId> {
        let mut neighbors: Vec<_> = self
            .graph
            .edges_directed(id, direction)
            .filter(|e| !e.weight().is_data())
            .map(|e| match direction {
                Direction::Incoming => e.source(),
                Direction::Outgoing => e.target(),
            })
            .collect();
        neighbors.sort();
        neighbors.dedup();
        neighbors
    }

    /// Compute topological sort over data and control edges
    pub fn topological_sort(&self) -> Result<Vec<NodeId>> {
        toposort(&self.graph, None).map_err(|cycle| anyhow!("graph contains a cycle through node {}", cycle.node_id().index()))
    }

    /// True when `to` is reachable from `from` through any edges
    pub fn has_path(&self, from: NodeId, to: NodeId) -> bool {
        has_path_connecting(&self.graph, from, to, None)
    }

    /// Remove a single-input node and connect its producer straight to its
    /// consumers, keeping every ordering the node took part in
    ///
    /// With producer P, control predecessors S and control successors T:
    /// S is ordered before each data consumer and each T, and P before each T.
    pub fn bypass_node(&mut self, id: NodeId) -> Result<()> {
        let name = self.expect_node(id)?.name.clone();
        let inputs = self.data_inputs(id);
        let &[(producer, producer_slot, _)] = inputs.as_slice() else {
            bail!("cannot bypass '{}': expected one data input, found {}", name, inputs.len());
        };
        let outputs = self.data_outputs(id);
        if outputs.iter().any(|&(slot, _, _)| slot != 0) {
            bail!("cannot bypass '{}': it feeds more than one output slot", name);
        }
        let preds = self.control_predecessors(id);
        let succs = self.control_successors(id);

        self.remove_node(id)?;
        for &(_, consumer, input_slot) in &outputs {
            self.add_data_edge(producer, producer_slot, consumer, input_slot)
                .with_context(|| format!("reconnecting consumers of '{}'", name))?;
        }
        for &pred in &preds {
            for &(_, consumer, _) in &outputs {
                self.add_control_edge(pred, consumer)?;
            }
            for &succ in &succs {
                self.add_control_edge(pred, succ)?;
            }
        }
        for &succ in &succs {
            self.add_control_edge(producer, succ)?;
        }
        Ok(())
    }

    /// True when folding `dup` into `keep` cannot create a cycle
    pub fn can_merge(&self, dup: NodeId, keep: NodeId) -> bool {
        dup != keep && !self.has_path(dup, keep) && !self.has_path(keep, dup)
    }

    /// Redirect every consumer and control edge of `dup` to `keep`, then remove `dup`
    ///
    /// Both nodes must compute the same value.
    pub fn merge_node_into(&mut self, dup: NodeId, keep: NodeId) -> Result<()> {
        if !self.can_merge(dup, keep) {
            bail!(
                "merging '{}' into '{}' would create a cycle",
                self.expect_node(dup)?.name,
                self.expect_node(keep)?.name
            );
        }
        let outputs = self.data_outputs(dup);
        let preds = self.control_predecessors(dup);
        let succs = self.control_successors(dup);

        self.remove_node(dup)?;
        for (slot, consumer, input_slot) in outputs {
            self.add_data_edge(keep, slot, consumer, input_slot)?;
        }
        for pred in preds {
            self.add_control_edge(pred, keep)?;
        }
        for succ in succs {
            self.add_control_edge(keep, succ)?;
        }
        Ok(())
    }

    /// Exchange the payloads of two nodes, leaving every edge where it is
    pub fn swap_payloads(&mut self, a: NodeId, b: NodeId) -> Result<()> {
        self.check_endpoints(a, b)?;
        if a == b {
            return Ok(());
        }
        let node_a = self.graph[a].clone();
        let node_b = std::mem::replace(&mut self.graph[b], node_a);
        self.graph[a] = node_b;
        self.name_to_id.insert(self.graph[a].name.clone(), a);
        self.name_to_id.insert(self.graph[b].name.clone(), b);
        Ok(())
    }

    /// Replace a node's payload in place, keeping its name
    pub fn replace_payload(&mut self, id: NodeId, node: GraphNode) -> Result<()> {
        let current = self.expect_node(id)?;
        if current.name != node.name {
            bail!("replacing '{}' with a node named '{}'", current.name, node.name);
        }
        self.graph[id] = node;
        Ok(())
    }

    /// Control edges between model-authored nodes, by name
    pub fn control_edges(&self) -> BTreeSet<(String, String)> {
        self.graph
            .edge_references()
            .filter(|e| !e.weight().is_data())
            .filter(|e| !self.graph[e.source()].is_synthesized() && !self.graph[e.target()].is_synthesized())
            .map(|e| (self.graph[e.source()].name.clone(), self.graph[e.target()].name.clone()))
            .collect()
    }

    /// Export to Graphviz DOT format
    ///
    /// Synthesized conversion nodes are highlighted and control edges are dashed.
    pub fn visualize_dot(&self) -> String {
        let mut dot = String::new();
        dot.push_str("digraph TransGraph {\n");
        dot.push_str("  rankdir=TB;\n");
        dot.push_str("  node [shape=box, style=rounded];\n");

        for node_id in self.graph.node_indices() {
            let node = &self.graph[node_id];
            let color = if node.is_synthesized() { "lightyellow" } else { "white" };
            let label = match node.output(0) {
                Some(out) => format!("{}\\n{}\\n{}", node.op_type, node.name, out),
                None => format!("{}\\n{}", node.op_type, node.name),
            };
            dot.push_str(&format!(
                "  node{} [label=\"{}\", fillcolor={}, style=filled];\n",
                node_id.index(),
                label,
                color
            ));
        }

        for edge in self.graph.edge_references() {
            let line = match edge.weight() {
                Dependency::Data { output_slot, input_slot } => format!(
                    "  node{} -> node{} [label=\"out{}→in{}\"];\n",
                    edge.source().index(),
                    edge.target().index(),
                    output_slot,
                    input_slot
                ),
                Dependency::Control => format!(
                    "  node{} -> node{} [style=dashed];\n",
                    edge.source().index(),
                    edge.target().index()
                ),
            };
            dot.push_str(&line);
        }

        dot.push_str("}\n");
        dot
    }

    /// Get graph statistics
    pub fn statistics(&self) -> GraphStatistics {
        let synthesized_nodes = self.graph.node_weights().filter(|n| n.is_synthesized()).count();
        let control_edges = self.graph.edge_references().filter(|e| !e.weight().is_data()).count();

        GraphStatistics {
            total_nodes: self.graph.node_count(),
            total_edges: self.graph.edge_count(),
            control_edges,
            synthesized_nodes,
        }
    }
}

/// Builder for adding operations to the graph
pub struct NewOp<'a> {
    graph: &'a mut TransGraph,
    node_data: GraphNode,
    inputs: Vec<(NodeId, u8, u8)>, // (source_id, output_slot, input_slot)
    control_inputs: Vec<NodeId>,
}

impl<'a> NewOp<'a> {
    fn new(graph: &'a mut TransGraph, op_type: String) -> Self {
        Self {
            graph,
            node_data: GraphNode::new(String::new(), op_type),
            inputs: Vec::new(),
            control_inputs: Vec::new(),
        }
    }

    /// Set node name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.node_data.name = name.into();
        self
    }

    /// Add an input connection
    pub fn input(mut self, source_id: NodeId, output_slot: u8, input_slot: u8) -> Self {
        self.inputs.push((source_id, output_slot, input_slot));
        self
    }

    /// Order this node after `source_id`
    pub fn after(mut self, source_id: NodeId) -> Self {
        self.control_inputs.push(source_id);
        self
    }

    /// Append an input descriptor
    pub fn input_desc(mut self, desc: TensorDesc) -> Self {
        self.node_data.desc.inputs.push(desc);
        self
    }

    /// Append an output descriptor
    pub fn output_desc(mut self, desc: TensorDesc) -> Self {
        self.node_data.desc.outputs.push(desc);
        self
    }

    /// Add an attribute
    pub fn attribute(mut self, name: impl Into<String>, value: AttrValue) -> Self {
        self.node_data.desc.attrs.insert(name.into(), value);
        self
    }

    /// Finish building and add to graph
    ///
    /// Unnamed nodes get a unique name derived from their op type.
    pub fn finish(mut self) -> Result<NodeId> {
        if self.node_data.name.is_empty() {
            self.node_data.name = self.graph.unique_name(&self.node_data.op_type.to_lowercase());
        }
        let node_id = self.graph.add_node(self.node_data)?;

        for (source_id, output_slot, input_slot) in self.inputs {
            self.graph.add_data_edge(source_id, output_slot, node_id, input_slot)?;
        }
        for source_id in self.control_inputs {
            self.graph.add_control_edge(source_id, node_id)?;
        }

        Ok(node_id)
    }
}

/// Graph statistics
#[derive(Debug, Clone)]
pub struct GraphStatistics {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub control_edges: usize,
    pub synthesized_nodes: usize,
}
