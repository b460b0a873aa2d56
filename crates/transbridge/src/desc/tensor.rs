// Tensor descriptors
//
// A descriptor carries both the physical (possibly tiled) shape and the
// logical origin shape it was derived from. The physical shape must always be
// reproducible from `(origin_shape, origin_format, format)`.

use super::dtype::DataType;
use super::format::Format;
use super::shape;
use crate::{Result, TransError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shape, layout and element type of one tensor anchor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorDesc {
    /// Physical shape in `format`
    pub shape: Vec<i64>,
    /// Logical shape before any hardware tiling
    pub origin_shape: Vec<i64>,
    pub format: Format,
    pub origin_format: Format,
    pub dtype: DataType,
    /// Per-dimension `[min, max]` of `shape` for dynamic tensors, `-1` max is unbounded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape_range: Option<Vec<(i64, i64)>>,
}

impl TensorDesc {
    /// Untiled descriptor whose origin equals its physical layout
    pub fn new(shape: Vec<i64>, format: Format, dtype: DataType) -> Self {
        Self {
            origin_shape: shape.clone(),
            shape,
            format,
            origin_format: format,
            dtype,
            shape_range: None,
        }
    }

    /// Descriptor laid out in `format`, derived from a logical origin
    pub fn tiled(
        origin_shape: Vec<i64>,
        origin_format: Format,
        format: Format,
        dtype: DataType,
        tile: i64,
    ) -> Result<Self> {
        let shape = shape::tile_shape(&origin_shape, origin_format, format, tile)?;
        Ok(Self {
            shape,
            origin_shape,
            format,
            origin_format,
            dtype,
            shape_range: None,
        })
    }

    pub fn with_shape_range(mut self, range: Vec<(i64, i64)>) -> Self {
        self.shape_range = Some(range);
        self
    }

    pub fn with_dtype(&self, dtype: DataType) -> Self {
        let mut desc = self.clone();
        desc.dtype = dtype;
        desc
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn is_static(&self) -> bool {
        shape::is_static(&self.shape)
    }

    pub fn element_count(&self) -> Option<i64> {
        shape::element_count(&self.shape)
    }

    pub fn byte_size(&self) -> Option<i64> {
        self.element_count()
            .and_then(|n| n.checked_mul(self.dtype.size_in_bytes() as i64))
    }

    /// Physical shape implied by the origin
    pub fn derive_shape(&self, tile: i64) -> Result<Vec<i64>> {
        shape::tile_shape(&self.origin_shape, self.origin_format, self.format, tile)
    }

    /// Check that the physical shape is derivable from the origin
    pub fn validate(&self, tile: i64) -> Result<()> {
        if !self.format.is_tiled() {
            return Ok(());
        }
        let derived = self.derive_shape(tile)?;
        if !shape::shapes_match(&derived, &self.shape) {
            return Err(TransError::ShapeIncompatible(format!(
                "{} shape {:?} does not match {:?} derived from origin {} {:?}",
                self.format, self.shape, derived, self.origin_format, self.origin_shape
            )));
        }
        Ok(())
    }

    /// Same shape, layout and element type (shape ranges are not compared)
    pub fn equivalent(&self, other: &TensorDesc) -> bool {
        self.shape == other.shape
            && self.origin_shape == other.origin_shape
            && self.format == other.format
            && self.origin_format == other.origin_format
            && self.dtype == other.dtype
    }

    /// True when a consumer requiring `required` can read this tensor without
    /// any conversion node
    ///
    /// ND and a plain format of the same rank are accepted as a relabelling;
    /// tiled tensors must also agree on their origin.
    pub fn conforms_to(&self, required: &TensorDesc) -> bool {
        if self.dtype != required.dtype || !shape::shapes_match(&self.shape, &required.shape) {
            return false;
        }
        if self.format == required.format {
            if !self.format.is_tiled() {
                return true;
            }
            return self.origin_format == required.origin_format
                && shape::shapes_match(&self.origin_shape, &required.origin_shape);
        }
        shape::layout_compatible(self.format, self.rank(), required.format, required.rank())
    }

    /// Same layout ignoring dtype
    pub fn same_layout(&self, other: &TensorDesc) -> bool {
        self.with_dtype(other.dtype).conforms_to(other)
    }
}

impl fmt::Display for TensorDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:?} {}", self.format, self.shape, self.dtype)?;
        if self.format != self.origin_format || self.shape != self.origin_shape {
            write!(f, " (origin {}{:?})", self.origin_format, self.origin_shape)?;
        }
        Ok(())
    }
}
