// Control dependency conservation
//
// Rewrites may move a control edge onto a synthesized node, but every
// ordering `S before T` recorded before the rewrite must still hold
// transitively afterwards.

use super::ir::TransGraph;
use crate::{Result, TransError};
use std::collections::BTreeSet;

/// Named control edges of a graph at one point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlSnapshot {
    edges: BTreeSet<(String, String)>,
}

impl ControlSnapshot {
    pub fn capture(graph: &TransGraph) -> Self {
        Self {
            edges: graph.control_edges(),
        }
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Fails with `DanglingControlEdge` for the first recorded ordering the
    /// graph no longer enforces
    pub fn verify(&self, graph: &TransGraph) -> Result<()> {
        for (src, dst) in &self.edges {
            let (Some(s), Some(t)) = (graph.node_id(src), graph.node_id(dst)) else {
                return Err(TransError::DanglingControlEdge(format!(
                    "{} -> {}: endpoint no longer in graph",
                    src, dst
                )));
            };
            if !graph.has_path(s, t) {
                return Err(TransError::DanglingControlEdge(format!(
                    "{} is no longer ordered before {}",
                    src, dst
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_lost_ordering() {
        let mut graph = TransGraph::new();
        let x = graph.add_op("Barrier").name("x").finish().unwrap();
        let y = graph.add_op("Barrier").name("y").finish().unwrap();
        graph.add_control_edge(x, y).unwrap();

        let snapshot = ControlSnapshot::capture(&graph);
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.verify(&graph).is_ok());

        graph.remove_control_edge(x, y);
        let err = snapshot.verify(&graph).unwrap_err();
        assert!(matches!(err, TransError::DanglingControlEdge(_)));
        assert!(err.is_internal());
    }

    #[test]
    fn test_transitive_ordering_accepted() {
        let mut graph = TransGraph::new();
        let x = graph.add_op("Barrier").name("x").finish().unwrap();
        let y = graph.add_op("Barrier").name("y").finish().unwrap();
        graph.add_control_edge(x, y).unwrap();
        let snapshot = ControlSnapshot::capture(&graph);

        let mid = graph.add_op("Cast").name("mid").finish().unwrap();
        graph.remove_control_edge(x, y);
        graph.add_control_edge(x, mid).unwrap();
        graph.add_control_edge(mid, y).unwrap();
        assert!(snapshot.verify(&graph).is_ok());
    }
}
