// Conversion node factory
//
// Builds detached graph nodes for single conversion steps. Wiring the node
// into the graph is left to the caller.

use crate::desc::TensorDesc;
use crate::graph::{AttrValue, GraphNode, INSERTED_ATTR};
use crate::transfer::{ConversionKind, TransStep};
use crate::{Result, TransError};

pub const ATTR_SRC_TYPE: &str = "src_type";
pub const ATTR_DST_TYPE: &str = "dst_type";
pub const ATTR_SHAPE: &str = "shape";
pub const ATTR_AXES: &str = "axes";
pub const ATTR_PERM: &str = "perm";
pub const ATTR_SRC_FORMAT: &str = "src_format";
pub const ATTR_DST_FORMAT: &str = "dst_format";

/// Builds conversion nodes for one tile size
#[derive(Debug, Clone, Copy)]
pub struct TransNodeFactory {
    tile: i64,
}

impl TransNodeFactory {
    pub fn new(tile: i64) -> Self {
        Self { tile }
    }

    pub fn tile(&self) -> i64 {
        self.tile
    }

    /// Node performing `step` on `input`, marked as synthesized
    pub fn build(&self, step: &TransStep, input: &TensorDesc, name: impl Into<String>) -> Result<GraphNode> {
        let output = step.apply(input, self.tile)?;
        let mut node = GraphNode::new(name, step.kind().op_type());
        let attrs = &mut node.desc.attrs;
        attrs.insert(INSERTED_ATTR.to_string(), AttrValue::Bool(true));

        match step {
            TransStep::Cast { to } => {
                attrs.insert(ATTR_SRC_TYPE.to_string(), AttrValue::Str(input.dtype.name().to_string()));
                attrs.insert(ATTR_DST_TYPE.to_string(), AttrValue::Str(to.name().to_string()));
            }
            TransStep::Reshape { shape, .. } => {
                attrs.insert(ATTR_SHAPE.to_string(), AttrValue::Ints(shape.clone()));
            }
            TransStep::Squeeze { axes } | TransStep::Unsqueeze { axes, .. } => {
                attrs.insert(ATTR_AXES.to_string(), AttrValue::Ints(to_ints(axes)));
            }
            TransStep::Transpose { perm, .. } => {
                attrs.insert(ATTR_PERM.to_string(), AttrValue::Ints(to_ints(perm)));
            }
            TransStep::LayoutTransform { format } => {
                attrs.insert(ATTR_SRC_FORMAT.to_string(), AttrValue::Str(input.format.name().to_string()));
                attrs.insert(ATTR_DST_FORMAT.to_string(), AttrValue::Str(format.name().to_string()));
            }
        }

        node.desc.inputs.push(input.clone());
        node.desc.outputs.push(output);
        Ok(node)
    }

    /// Step a synthesized node performs, recovered from its attributes and
    /// output descriptor
    pub fn step_of(node: &GraphNode) -> Result<TransStep> {
        let kind = ConversionKind::from_op_type(&node.op_type)
            .ok_or_else(|| TransError::InvalidGraph(format!("'{}' ({}) is not a conversion node", node.name, node.op_type)))?;
        let output = node
            .output(0)
            .ok_or_else(|| TransError::InvalidGraph(format!("conversion node '{}' has no output descriptor", node.name)))?;

        let step = match kind {
            ConversionKind::Cast => TransStep::Cast { to: output.dtype },
            ConversionKind::Reshape => TransStep::Reshape {
                shape: output.shape.clone(),
                format: output.format,
            },
            ConversionKind::Squeeze => TransStep::Squeeze {
                axes: usize_attr(node, ATTR_AXES)?,
            },
            ConversionKind::Unsqueeze => TransStep::Unsqueeze {
                axes: usize_attr(node, ATTR_AXES)?,
                format: output.format,
            },
            ConversionKind::Transpose => TransStep::Transpose {
                perm: usize_attr(node, ATTR_PERM)?,
                format: output.format,
            },
            ConversionKind::LayoutTransform => TransStep::LayoutTransform { format: output.format },
        };
        Ok(step)
    }
}

fn to_ints(values: &[usize]) -> Vec<i64> {
    values.iter().map(|&v| v as i64).collect()
}

fn usize_attr(node: &GraphNode, name: &str) -> Result<Vec<usize>> {
    match node.attr(name) {
        Some(AttrValue::Ints(values)) => values
            .iter()
            .map(|&v| {
                usize::try_from(v)
                    .map_err(|_| TransError::InvalidGraph(format!("'{}' has negative {} entry {}", node.name, name, v)))
            })
            .collect(),
        _ => Err(TransError::InvalidGraph(format!(
            "conversion node '{}' is missing its '{}' attribute",
            node.name, name
        ))),
    }
}
