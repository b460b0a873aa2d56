// Branch deduplication
//
// Sibling conversion nodes reading the same producer anchor and producing the
// same descriptor compute the same tensor. One of them is kept and takes over
// the consumers of the others. Repeating the pass walks shared prefixes of
// multi-hop chains one hop at a time until the branches diverge.

use super::OptimizationPass;
use crate::graph::ir::{GraphNode, NodeId, TransGraph};
use anyhow::Result;
use tracing::debug;

/// Branch deduplication pass
pub struct BranchDeduplication;

impl BranchDeduplication {
    /// Same kind, same parameters, same result
    fn duplicates(a: &GraphNode, b: &GraphNode) -> bool {
        a.op_type == b.op_type
            && a.desc.attrs == b.desc.attrs
            && a.desc.outputs.len() == b.desc.outputs.len()
            && a.desc.outputs.iter().zip(&b.desc.outputs).all(|(x, y)| x.equivalent(y))
    }

    /// Synthesized single-input consumers of each output anchor of `producer`,
    /// grouped into duplicate sets
    fn duplicate_groups(graph: &TransGraph, producer: NodeId) -> Vec<Vec<NodeId>> {
        let mut groups: Vec<Vec<NodeId>> = Vec::new();
        let mut slots: Vec<u8> = graph.data_outputs(producer).into_iter().map(|(slot, _, _)| slot).collect();
        slots.dedup();

        for slot in slots {
            let mut slot_groups: Vec<Vec<NodeId>> = Vec::new();
            let mut seen: Vec<NodeId> = Vec::new();
            for (consumer, _) in graph.data_consumers(producer, slot) {
                if seen.contains(&consumer) {
                    continue;
                }
                seen.push(consumer);
                let Some(node) = graph.node(consumer) else { continue };
                if !node.is_synthesized() || graph.data_inputs(consumer).len() != 1 {
                    continue;
                }
                let group = slot_groups
                    .iter_mut()
                    .find(|group| graph.node(group[0]).is_some_and(|leader| Self::duplicates(leader, node)));
                match group {
                    Some(group) => group.push(consumer),
                    None => slot_groups.push(vec![consumer]),
                }
            }
            groups.extend(slot_groups.into_iter().filter(|group| group.len() > 1));
        }
        groups
    }
}

impl OptimizationPass for BranchDeduplication {
    fn name(&self) -> &str {
        "BranchDeduplication"
    }

    fn run(&self, graph: &mut TransGraph) -> Result<bool> {
        let mut merged_any = false;

        for producer in graph.topological_sort()? {
            if !graph.contains(producer) {
                continue;
            }
            for group in Self::duplicate_groups(graph, producer) {
                let keep = group[0];
                for &dup in &group[1..] {
                    if !graph.can_merge(dup, keep) {
                        debug!(
                            "Keeping duplicate {}: merging into {} would create a cycle",
                            graph.expect_node(dup)?.name,
                            graph.expect_node(keep)?.name
                        );
                        continue;
                    }
                    debug!(
                        "Merging {} into {}",
                        graph.expect_node(dup)?.name,
                        graph.expect_node(keep)?.name
                    );
                    graph.merge_node_into(dup, keep)?;
                    merged_any = true;
                }
            }
        }

        Ok(merged_any)
    }
}
