// Trans-node insertion
//
// Walks every producer in topological order, asks the analyzer what each
// consumer of each output anchor needs, and splices one conversion chain per
// distinct plan between the producer and the consumers sharing that plan.

use super::analyzer::{resolve_requirement, BridgeAnalyzer, PlannedStep};
use super::factory::TransNodeFactory;
use crate::graph::{NodeId, TransGraph};
use crate::registry::KernelRegistry;
use crate::transfer::ConversionKind;
use crate::{Result, TransError};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// What one insertion run did
#[derive(Debug, Clone, Default)]
pub struct InsertionReport {
    /// Producer/consumer edges that needed a bridge
    pub bridged_edges: usize,
    pub inserted_nodes: usize,
    /// Inserted chains, head first
    pub chains: Vec<Vec<NodeId>>,
    /// Inserted Casts adjacent to an inserted TransData
    pub optimizable_casts: BTreeSet<NodeId>,
}

/// Consumers of one anchor that share a bridging plan
struct ConsumerGroup {
    plan: Vec<PlannedStep>,
    consumers: Vec<(NodeId, u8)>,
}

/// Inserts conversion chains wherever a producer and consumer disagree
pub struct TransNodeInserter<'a, R: KernelRegistry + ?Sized> {
    registry: &'a R,
    analyzer: BridgeAnalyzer,
    factory: TransNodeFactory,
}

impl<'a, R: KernelRegistry + ?Sized> TransNodeInserter<'a, R> {
    pub fn new(registry: &'a R, tile: i64) -> Self {
        Self {
            registry,
            analyzer: BridgeAnalyzer::new(tile),
            factory: TransNodeFactory::new(tile),
        }
    }

    pub fn insert(&self, graph: &mut TransGraph) -> Result<InsertionReport> {
        let order = graph
            .topological_sort()
            .map_err(|e| TransError::InvalidGraph(format!("{:#}", e)))?;
        let mut report = InsertionReport::default();

        info!("Inserting trans nodes over {} nodes", order.len());
        for producer in order {
            let mut slots: Vec<u8> = graph.data_outputs(producer).into_iter().map(|(slot, _, _)| slot).collect();
            slots.dedup();

            for slot in slots {
                for group in self.group_consumers(graph, producer, slot)? {
                    report.bridged_edges += group.consumers.len();
                    let chain = self.splice(graph, producer, slot, &group)?;
                    report.inserted_nodes += chain.len();
                    report.optimizable_casts.extend(optimizable_casts(graph, &chain));
                    report.chains.push(chain);
                }
            }
        }

        info!(
            "Inserted {} trans nodes on {} edges",
            report.inserted_nodes, report.bridged_edges
        );
        Ok(report)
    }

    /// Plans for every consumer of `producer:slot` that needs a bridge,
    /// consumers with identical plans grouped together
    fn group_consumers(&self, graph: &TransGraph, producer: NodeId, slot: u8) -> Result<Vec<ConsumerGroup>> {
        let producer_node = graph.expect_node(producer)?;
        let src = producer_node.output(slot as usize).ok_or_else(|| {
            TransError::InvalidGraph(format!(
                "'{}' feeds output {} but has no descriptor for it",
                producer_node.name, slot
            ))
        })?;

        let mut groups: Vec<ConsumerGroup> = Vec::new();
        for (consumer, input_slot) in graph.data_consumers(producer, slot) {
            let node = graph.expect_node(consumer)?;
            if node.is_synthesized() {
                continue;
            }
            let Some(required) = self.registry.required_descriptor(node, input_slot as usize) else {
                continue;
            };
            let edge = format!("edge {}:{} -> {}:{}", producer_node.name, slot, node.name, input_slot);
            let required = resolve_requirement(
                &required,
                src,
                &self.registry.unknown_shape_formats(&node.op_type),
                &self.registry.unknown_shape_dtypes(&node.op_type),
                self.factory.tile(),
            )
            .map_err(|e| e.context(&edge))?;

            let plan = self
                .analyzer
                .analyze(src, &required, self.registry.is_format_agnostic(&node.op_type))
                .map_err(|e| e.context(&edge))?;
            if plan.is_empty() {
                continue;
            }
            debug!(
                "Bridging {}: {}",
                edge,
                plan.iter().map(|p| p.step.to_string()).collect::<Vec<_>>().join(" -> ")
            );

            match groups.iter_mut().find(|group| group.plan == plan) {
                Some(group) => group.consumers.push((consumer, input_slot)),
                None => groups.push(ConsumerGroup {
                    plan,
                    consumers: vec![(consumer, input_slot)],
                }),
            }
        }
        Ok(groups)
    }

    /// Build the chain and move the group's consumers onto its tail
    fn splice(&self, graph: &mut TransGraph, producer: NodeId, slot: u8, group: &ConsumerGroup) -> Result<Vec<NodeId>> {
        let producer_name = graph.expect_node(producer)?.name.clone();
        let mut chain = Vec::with_capacity(group.plan.len());
        let mut upstream = (producer, slot);

        for planned in &group.plan {
            let name = graph.unique_name(&format!("{}_{}", producer_name, planned.kind().op_type()));
            let node = self.factory.build(&planned.step, &planned.input, name)?;
            let id = graph.add_node(node)?;
            graph.add_data_edge(upstream.0, upstream.1, id, 0)?;
            upstream = (id, 0);
            chain.push(id);
        }

        for &(consumer, input_slot) in &group.consumers {
            graph.remove_data_edge(producer, slot, consumer, input_slot);
            graph.add_data_edge(upstream.0, upstream.1, consumer, input_slot)?;
        }
        Ok(chain)
    }
}

/// Casts in `chain` sitting right before or after a TransData
fn optimizable_casts(graph: &TransGraph, chain: &[NodeId]) -> Vec<NodeId> {
    let kind_of = |id: NodeId| graph.node(id).and_then(|n| ConversionKind::from_op_type(&n.op_type));
    chain
        .iter()
        .enumerate()
        .filter(|&(_, &id)| kind_of(id) == Some(ConversionKind::Cast))
        .filter(|&(i, _)| {
            let before = i.checked_sub(1).and_then(|j| chain.get(j)).copied();
            let after = chain.get(i + 1).copied();
            [before, after]
                .into_iter()
                .flatten()
                .any(|n| kind_of(n) == Some(ConversionKind::LayoutTransform))
        })
        .map(|(_, &id)| id)
        .collect()
}
