// Identity elimination
//
// Removes synthesized conversion nodes whose output descriptor is identical
// to their input descriptor.

use super::OptimizationPass;
use crate::graph::ir::TransGraph;
use anyhow::Result;
use tracing::debug;

/// Identity elimination pass
pub struct IdentityElimination;

impl OptimizationPass for IdentityElimination {
    fn name(&self) -> &str {
        "IdentityElimination"
    }

    fn run(&self, graph: &mut TransGraph) -> Result<bool> {
        let identities: Vec<_> = graph
            .node_ids()
            .into_iter()
            .filter(|&id| {
                graph.node(id).is_some_and(|node| {
                    node.is_synthesized()
                        && match (node.input(0), node.output(0)) {
                            (Some(input), Some(output)) => input.equivalent(output),
                            _ => false,
                        }
                })
            })
            .collect();

        for &id in &identities {
            debug!("Removing identity {}", graph.expect_node(id)?.name);
            graph.bypass_node(id)?;
        }

        Ok(!identities.is_empty())
    }
}
