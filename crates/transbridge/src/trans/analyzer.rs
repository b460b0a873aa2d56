// Bridge requirement analysis
//
// Decides which conversion steps turn a producer's output descriptor into the
// descriptor a consumer requires. The layout part follows the route table;
// the dtype part is a single Cast placed on the cheaper side of the layout
// steps.

use crate::desc::{shape, DataType, Format, TensorDesc};
use crate::transfer::{route, ConversionKind, Route, TransStep};
use crate::{Result, TransError};
use tracing::debug;

/// One step of a bridging chain with the descriptors it reads and writes
///
/// `input` may be a relabelling of the previous step's output (ND viewed as
/// a plain format of the same rank); no node is needed for that.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedStep {
    pub step: TransStep,
    pub input: TensorDesc,
    pub output: TensorDesc,
}

impl PlannedStep {
    fn new(step: TransStep, input: TensorDesc, tile: i64) -> Result<Self> {
        let output = step.apply(&input, tile)?;
        Ok(Self { step, input, output })
    }

    pub fn kind(&self) -> ConversionKind {
        self.step.kind()
    }
}

/// Same tensor viewed under another untiled format
fn relabel(desc: &TensorDesc, format: Format) -> TensorDesc {
    TensorDesc {
        format,
        origin_format: format,
        origin_shape: desc.shape.clone(),
        ..desc.clone()
    }
}

/// Plans bridging chains for one tile size
#[derive(Debug, Clone, Copy)]
pub struct BridgeAnalyzer {
    tile: i64,
}

impl BridgeAnalyzer {
    pub fn new(tile: i64) -> Self {
        Self { tile }
    }

    /// Steps turning `src` into `dst`, empty when `src` already conforms
    ///
    /// A format-agnostic consumer only ever gets a Cast.
    pub fn analyze(&self, src: &TensorDesc, dst: &TensorDesc, format_agnostic: bool) -> Result<Vec<PlannedStep>> {
        shape::checked_element_count(&src.shape)?;
        shape::checked_element_count(&dst.shape)?;
        if src.conforms_to(dst) {
            return Ok(Vec::new());
        }
        if format_agnostic {
            if src.dtype == dst.dtype {
                return Ok(Vec::new());
            }
            return Ok(vec![PlannedStep::new(TransStep::Cast { to: dst.dtype }, src.clone(), self.tile)?]);
        }

        let layout = if src.same_layout(dst) {
            Vec::new()
        } else {
            self.substitute_reshapes(self.plan_layout(src, dst)?)?
        };
        let plan = self.place_cast(src, dst.dtype, layout)?;

        let out = plan.last().map_or(src, |s| &s.output);
        if !out.conforms_to(dst) {
            let msg = format!("chain ends in {} but {} is required", out, dst);
            return Err(if shape::shapes_match(&out.shape, &dst.shape) {
                TransError::UnsupportedConversion(msg)
            } else {
                TransError::ShapeIncompatible(msg)
            });
        }
        Ok(plan)
    }

    /// Layout steps only, every step keeping the source dtype
    fn plan_layout(&self, src: &TensorDesc, dst: &TensorDesc) -> Result<Vec<PlannedStep>> {
        let kinds = match route(src.format.family(), dst.format.family()) {
            Route::Steps(kinds) => kinds,
            Route::Unsupported => {
                return Err(TransError::UnsupportedConversion(format!(
                    "no conversion route from {} to {}",
                    src, dst
                )))
            }
        };
        // logical view the untiled part of the chain has to reach
        let (view_shape, view_format) = if dst.format.is_tiled() {
            (dst.origin_shape.as_slice(), dst.origin_format)
        } else {
            (dst.shape.as_slice(), dst.format)
        };

        let mut cur = src.clone();
        let mut steps = Vec::new();
        for &kind in kinds {
            match kind {
                ConversionKind::LayoutTransform if cur.format.is_tiled() => {
                    let step = TransStep::LayoutTransform { format: cur.origin_format };
                    self.push(&mut steps, &mut cur, step)?;
                }
                ConversionKind::LayoutTransform => {
                    self.reconcile(&mut steps, &mut cur, view_shape, view_format)?;
                    self.push(&mut steps, &mut cur, TransStep::LayoutTransform { format: dst.format })?;
                }
                ConversionKind::Squeeze => {
                    if cur.format.is_plain() && cur.rank() > view_shape.len() {
                        let axes = shape::expand_axes(view_shape.len(), cur.format)?;
                        if axes.iter().all(|&a| cur.shape.get(a) == Some(&1)) {
                            self.push(&mut steps, &mut cur, TransStep::Squeeze { axes })?;
                        }
                    }
                }
                ConversionKind::Unsqueeze => {
                    if !cur.format.is_tiled() && view_format.is_plain() && cur.rank() < view_shape.len() {
                        let axes = shape::expand_axes(cur.rank(), view_format)?;
                        let step = TransStep::Unsqueeze { axes, format: view_format };
                        self.push(&mut steps, &mut cur, step)?;
                    }
                }
                ConversionKind::Transpose => {
                    if cur.format == Format::Nd && view_format.rank() == Some(cur.rank()) {
                        cur = relabel(&cur, view_format);
                    }
                    if cur.format.is_plain() && view_format.is_plain() && cur.format != view_format {
                        let perm = shape::permutation(cur.format, view_format)?;
                        let step = TransStep::Transpose { perm, format: view_format };
                        self.push(&mut steps, &mut cur, step)?;
                    }
                }
                ConversionKind::Reshape => {
                    if !cur.format.is_tiled() {
                        self.reconcile(&mut steps, &mut cur, view_shape, view_format)?;
                    }
                }
                ConversionKind::Cast => {}
            }
        }
        if !dst.format.is_tiled() && !cur.format.is_tiled() {
            self.reconcile(&mut steps, &mut cur, view_shape, view_format)?;
        }
        Ok(steps)
    }

    fn push(&self, steps: &mut Vec<PlannedStep>, cur: &mut TensorDesc, step: TransStep) -> Result<()> {
        let planned = PlannedStep::new(step, cur.clone(), self.tile)?;
        *cur = planned.output.clone();
        steps.push(planned);
        Ok(())
    }

    /// Bring an untiled `cur` to `shape` in `format` by relabelling or a Reshape
    fn reconcile(&self, steps: &mut Vec<PlannedStep>, cur: &mut TensorDesc, target: &[i64], format: Format) -> Result<()> {
        if cur.format != format && shape::layout_compatible(cur.format, cur.rank(), format, target.len()) {
            *cur = relabel(cur, format);
        }
        if cur.format == format && shape::shapes_match(&cur.shape, target) {
            return Ok(());
        }
        // reshaping between two different plain orders would reorder data
        if cur.format != format && cur.format.is_plain() && format.is_plain() {
            return Ok(());
        }
        match (cur.element_count(), shape::element_count(target)) {
            (Some(a), Some(b)) if a == b => {
                let step = TransStep::Reshape { shape: target.to_vec(), format };
                self.push(steps, cur, step)
            }
            (Some(a), Some(b)) => Err(TransError::ShapeIncompatible(format!(
                "cannot reshape {} ({} elements) into {}{:?} ({} elements)",
                cur, a, format, target, b
            ))),
            _ => Ok(()),
        }
    }

    /// Replace Transposes that only move singleton axes with Reshapes, then
    /// fuse adjacent reshape-like steps
    fn substitute_reshapes(&self, steps: Vec<PlannedStep>) -> Result<Vec<PlannedStep>> {
        let mut out: Vec<PlannedStep> = Vec::with_capacity(steps.len());
        for planned in steps {
            let planned = match &planned.step {
                TransStep::Transpose { perm, .. } if shape::moves_only_singletons(&planned.input.shape, perm) => {
                    let step = TransStep::Reshape {
                        shape: planned.output.shape.clone(),
                        format: planned.output.format,
                    };
                    PlannedStep::new(step, planned.input, self.tile)?
                }
                _ => planned,
            };

            let fuse = planned.kind().is_reshape_like()
                && planned.input.is_static()
                && planned.output.is_static()
                && out.last().is_some_and(|prev| {
                    prev.kind().is_reshape_like() && prev.input.is_static() && prev.output.same_layout(&planned.input)
                });
            match if fuse { out.pop() } else { None } {
                Some(prev) => {
                    let step = TransStep::Reshape {
                        shape: planned.output.shape.clone(),
                        format: planned.output.format,
                    };
                    let fused = PlannedStep::new(step, prev.input, self.tile)?;
                    if !fused.input.same_layout(&fused.output) {
                        out.push(fused);
                    }
                }
                None => out.push(planned),
            }
        }
        Ok(out)
    }

    /// Insert the dtype change at the producer or consumer end of `layout`
    ///
    /// The Cast goes where the tensor has fewer elements; equal or unknown
    /// counts keep it on the producer side.
    fn place_cast(&self, src: &TensorDesc, to: DataType, layout: Vec<PlannedStep>) -> Result<Vec<PlannedStep>> {
        if src.dtype == to {
            return Ok(layout);
        }
        let Some(last) = layout.last() else {
            return Ok(vec![PlannedStep::new(TransStep::Cast { to }, src.clone(), self.tile)?]);
        };

        if cast_upstream(src.element_count(), last.output.element_count()) {
            debug!("Cast to {} placed before {} layout steps", to, layout.len());
            let mut plan = vec![PlannedStep::new(TransStep::Cast { to }, src.clone(), self.tile)?];
            plan.extend(layout.into_iter().map(|planned| PlannedStep {
                step: planned.step,
                input: planned.input.with_dtype(to),
                output: planned.output.with_dtype(to),
            }));
            Ok(plan)
        } else {
            debug!("Cast to {} placed after {} layout steps", to, layout.len());
            let tail = PlannedStep::new(TransStep::Cast { to }, last.output.clone(), self.tile)?;
            let mut plan = layout;
            plan.push(tail);
            Ok(plan)
        }
    }
}

/// Cast cost rule shared with the reorder phase: upstream unless the
/// downstream tensor is strictly smaller
pub fn cast_upstream(upstream_elems: Option<i64>, downstream_elems: Option<i64>) -> bool {
    match (upstream_elems, downstream_elems) {
        (Some(up), Some(down)) => up <= down,
        _ => true,
    }
}

/// Requirement to bridge to when the consumer cannot run the required
/// descriptor with dynamic shapes
///
/// `formats` and `dtypes` are the consumer's unknown-shape capabilities; an
/// empty list means no restriction. The producer's own format or dtype is
/// preferred when supported, otherwise the first supported entry. The shape is
/// re-derived from the logical origin and the shape range is dropped.
pub fn resolve_requirement(
    required: &TensorDesc,
    producer: &TensorDesc,
    formats: &[Format],
    dtypes: &[DataType],
    tile: i64,
) -> Result<TensorDesc> {
    if required.is_static() {
        return Ok(required.clone());
    }
    let mut resolved = required.clone();

    if !formats.is_empty() && !formats.contains(&required.format) {
        let format = if formats.contains(&producer.format) {
            producer.format
        } else {
            formats[0]
        };
        resolved = derive_view(required, format, tile)?;
        debug!("Unknown-shape requirement {} resolved to format {}", required, format);
    }
    if !dtypes.is_empty() && !dtypes.contains(&required.dtype) {
        resolved.dtype = if dtypes.contains(&producer.dtype) {
            producer.dtype
        } else {
            dtypes[0]
        };
    }
    Ok(resolved)
}

/// `desc`'s logical tensor laid out in `format`
fn derive_view(desc: &TensorDesc, format: Format, tile: i64) -> Result<TensorDesc> {
    if format.is_tiled() {
        return TensorDesc::tiled(desc.origin_shape.clone(), desc.origin_format, format, desc.dtype, tile);
    }
    let (origin, origin_format) = (&desc.origin_shape, desc.origin_format);
    let shape = if origin_format.is_plain() && format.is_plain() && origin_format != format {
        shape::transpose_shape(origin, &shape::permutation(origin_format, format)?)?
    } else {
        shape::tile_shape(origin, origin_format, format, tile)?
    };
    Ok(TensorDesc::new(shape, format, desc.dtype))
}
