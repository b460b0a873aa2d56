// Elementary conversion steps
//
// Each step is a pure function from an input descriptor to an output
// descriptor. Steps never look at tensor values, only at metadata.

use crate::desc::{shape, DataType, Format, TensorDesc};
use crate::{Result, TransError};
use std::fmt;

/// Operator kinds this subsystem synthesizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConversionKind {
    Cast,
    Reshape,
    Squeeze,
    Unsqueeze,
    Transpose,
    LayoutTransform,
}

impl ConversionKind {
    pub const ALL: [ConversionKind; 6] = [
        ConversionKind::Cast,
        ConversionKind::Reshape,
        ConversionKind::Squeeze,
        ConversionKind::Unsqueeze,
        ConversionKind::Transpose,
        ConversionKind::LayoutTransform,
    ];

    /// Operator type of the graph node implementing this kind
    pub fn op_type(self) -> &'static str {
        match self {
            ConversionKind::Cast => "Cast",
            ConversionKind::Reshape => "Reshape",
            ConversionKind::Squeeze => "Squeeze",
            ConversionKind::Unsqueeze => "Unsqueeze",
            ConversionKind::Transpose => "Transpose",
            ConversionKind::LayoutTransform => "TransData",
        }
    }

    pub fn from_op_type(op_type: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.op_type() == op_type)
    }

    /// Kinds that only regroup axes of untiled data
    pub fn is_reshape_like(self) -> bool {
        matches!(
            self,
            ConversionKind::Reshape | ConversionKind::Squeeze | ConversionKind::Unsqueeze
        )
    }
}

impl fmt::Display for ConversionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.op_type())
    }
}

/// One parameterized conversion
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TransStep {
    Cast { to: DataType },
    /// Regroup contiguous axes of an untiled tensor
    Reshape { shape: Vec<i64>, format: Format },
    /// Drop size-1 axes, producing ND
    Squeeze { axes: Vec<usize> },
    /// Insert size-1 axes at output positions, producing `format`
    Unsqueeze { axes: Vec<usize>, format: Format },
    Transpose { perm: Vec<usize>, format: Format },
    /// Tile into, or de-tile out of, a hardware layout
    LayoutTransform { format: Format },
}

impl TransStep {
    pub fn kind(&self) -> ConversionKind {
        match self {
            TransStep::Cast { .. } => ConversionKind::Cast,
            TransStep::Reshape { .. } => ConversionKind::Reshape,
            TransStep::Squeeze { .. } => ConversionKind::Squeeze,
            TransStep::Unsqueeze { .. } => ConversionKind::Unsqueeze,
            TransStep::Transpose { .. } => ConversionKind::Transpose,
            TransStep::LayoutTransform { .. } => ConversionKind::LayoutTransform,
        }
    }

    /// Output descriptor of this step applied to `input`
    pub fn apply(&self, input: &TensorDesc, tile: i64) -> Result<TensorDesc> {
        match self {
            TransStep::Cast { to } => Ok(input.with_dtype(*to)),
            TransStep::Reshape { shape: target, format } => reshape(input, target, *format),
            TransStep::Squeeze { axes } => {
                require_untiled(input, self)?;
                let out = shape::squeeze_shape(&input.shape, axes)?;
                let mut desc = TensorDesc::new(out, Format::Nd, input.dtype);
                desc.shape_range = input.shape_range.as_ref().map(|range| {
                    range
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| !axes.contains(i))
                        .map(|(_, r)| *r)
                        .collect()
                });
                Ok(desc)
            }
            TransStep::Unsqueeze { axes, format } => {
                require_untiled(input, self)?;
                let out = shape::unsqueeze_shape(&input.shape, axes)?;
                if format.rank().is_some_and(|rank| rank != out.len()) {
                    return Err(TransError::ShapeIncompatible(format!(
                        "unsqueeze of {:?} at {:?} gives rank {}, {} needs {}",
                        input.shape,
                        axes,
                        out.len(),
                        format,
                        format.rank().unwrap_or_default()
                    )));
                }
                let mut desc = TensorDesc::new(out, *format, input.dtype);
                if let Some(range) = &input.shape_range {
                    let ones: Vec<(i64, i64)> = vec![(1, 1); axes.len()];
                    let mut expanded = Vec::with_capacity(desc.rank());
                    let (mut existing, mut inserted) = (range.iter(), ones.iter());
                    for i in 0..desc.rank() {
                        let next = if axes.contains(&i) { inserted.next() } else { existing.next() };
                        expanded.extend(next.copied());
                    }
                    desc.shape_range = Some(expanded);
                }
                Ok(desc)
            }
            TransStep::Transpose { perm, format } => {
                if !input.format.is_plain() {
                    return Err(TransError::UnsupportedConversion(format!(
                        "Transpose needs a plain input format, got {}",
                        input
                    )));
                }
                let expected = shape::permutation(input.format, *format)?;
                if &expected != perm {
                    return Err(TransError::UnsupportedConversion(format!(
                        "permutation {:?} does not map {} to {} (expected {:?})",
                        perm, input.format, format, expected
                    )));
                }
                let out = shape::transpose_shape(&input.shape, perm)?;
                let mut desc = TensorDesc::new(out, *format, input.dtype);
                desc.shape_range = input
                    .shape_range
                    .as_ref()
                    .map(|range| perm.iter().filter_map(|&p| range.get(p).copied()).collect());
                Ok(desc)
            }
            TransStep::LayoutTransform { format } => layout_transform(input, *format, tile),
        }
    }
}

fn require_untiled(input: &TensorDesc, step: &TransStep) -> Result<()> {
    if input.format.is_tiled() {
        return Err(TransError::UnsupportedConversion(format!(
            "{} cannot be applied to tiled tensor {}",
            step.kind(),
            input
        )));
    }
    Ok(())
}

fn reshape(input: &TensorDesc, target: &[i64], format: Format) -> Result<TensorDesc> {
    if input.format.is_tiled() || format.is_tiled() {
        return Err(TransError::UnsupportedConversion(format!(
            "Reshape cannot change tiled layout {} -> {}",
            input.format, format
        )));
    }
    match (input.element_count(), shape::element_count(target)) {
        (Some(a), Some(b)) if a == b => {}
        (Some(a), Some(b)) => {
            return Err(TransError::ShapeIncompatible(format!(
                "Reshape {:?} -> {:?} changes element count {} -> {}",
                input.shape, target, a, b
            )))
        }
        _ => {
            return Err(TransError::ShapeIncompatible(format!(
                "Reshape {:?} -> {:?} needs static shapes",
                input.shape, target
            )))
        }
    }
    if let Some(rank) = format.rank() {
        if rank != target.len() {
            return Err(TransError::ShapeIncompatible(format!(
                "Reshape target {:?} does not have the rank of {}",
                target, format
            )));
        }
    }
    Ok(TensorDesc::new(target.to_vec(), format, input.dtype))
}

fn layout_transform(input: &TensorDesc, format: Format, tile: i64) -> Result<TensorDesc> {
    match (input.format.is_tiled(), format.is_tiled()) {
        (false, true) => {
            let shape = shape::tile_shape(&input.shape, input.format, format, tile)?;
            let shape_range = match &input.shape_range {
                Some(range) => Some(shape::tile_shape_range(range, input.format, format, tile)?),
                None => None,
            };
            Ok(TensorDesc {
                shape,
                origin_shape: input.shape.clone(),
                format,
                origin_format: input.format,
                dtype: input.dtype,
                shape_range,
            })
        }
        (true, false) => {
            input.validate(tile)?;
            let shape = shape::tile_shape(&input.origin_shape, input.origin_format, format, tile).map_err(|_| {
                TransError::UnsupportedConversion(format!(
                    "{} can only be de-tiled to its origin format {}, not {}",
                    input.format, input.origin_format, format
                ))
            })?;
            Ok(TensorDesc::new(shape, format, input.dtype))
        }
        _ => Err(TransError::UnsupportedConversion(format!(
            "TransData needs exactly one tiled side: {} -> {}",
            input.format, format
        ))),
    }
}

impl fmt::Display for TransStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransStep::Cast { to } => write!(f, "Cast(->{})", to),
            TransStep::Reshape { shape, format } => write!(f, "Reshape(->{}{:?})", format, shape),
            TransStep::Squeeze { axes } => write!(f, "Squeeze({:?})", axes),
            TransStep::Unsqueeze { axes, format } => write!(f, "Unsqueeze({:?}->{})", axes, format),
            TransStep::Transpose { perm, format } => write!(f, "Transpose({:?}->{})", perm, format),
            TransStep::LayoutTransform { format } => write!(f, "TransData(->{})", format),
        }
    }
}
