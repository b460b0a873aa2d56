// Shape math for layout conversions
//
// Pure functions over `&[i64]` shapes. Unknown dimensions are `-1` and every
// function maps an unknown input dimension to an unknown output dimension.

use super::format::{Format, FormatFamily};
use crate::{Result, TransError};

/// Marker for a dimension whose size is only known at runtime
pub const UNKNOWN_DIM: i64 = -1;

/// Number of tiles needed to cover `dim` (padding up to a multiple of `tile`)
pub fn ceil_div(dim: i64, tile: i64) -> Result<i64> {
    if dim < 0 {
        return Ok(UNKNOWN_DIM);
    }
    if tile <= 0 {
        return Err(TransError::ShapeIncompatible(format!("tile size {} must be positive", tile)));
    }
    dim.checked_add(tile - 1)
        .map(|padded| padded / tile)
        .ok_or_else(|| TransError::ShapeIncompatible(format!("dimension {} overflows when padded to {}", dim, tile)))
}

fn mul_dims(a: i64, b: i64) -> Result<i64> {
    if a < 0 || b < 0 {
        return Ok(UNKNOWN_DIM);
    }
    a.checked_mul(b)
        .ok_or_else(|| TransError::ShapeIncompatible(format!("dimension product {} x {} overflows", a, b)))
}

pub fn is_static(shape: &[i64]) -> bool {
    shape.iter().all(|&d| d >= 0)
}

/// Total element count, `None` when any dimension is unknown or the count
/// does not fit in an `i64`
pub fn element_count(shape: &[i64]) -> Option<i64> {
    checked_element_count(shape).ok().flatten()
}

/// Total element count, failing when a static shape overflows
pub fn checked_element_count(shape: &[i64]) -> Result<Option<i64>> {
    if !is_static(shape) {
        return Ok(None);
    }
    shape
        .iter()
        .try_fold(1i64, |acc, &d| acc.checked_mul(d))
        .map(Some)
        .ok_or_else(|| TransError::ShapeIncompatible(format!("element count of {:?} overflows", shape)))
}

/// Dimension-wise equality where an unknown dimension matches anything
pub fn shapes_match(a: &[i64], b: &[i64]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(&x, &y)| x == y || x < 0 || y < 0)
}

fn dim_of(shape: &[i64], format: Format, axis: char) -> Result<i64> {
    format
        .axis_index(axis)
        .and_then(|idx| shape.get(idx).copied())
        .ok_or_else(|| TransError::ShapeIncompatible(format!("{:?} has no axis {} in {}", shape, axis, format)))
}

fn check_rank(shape: &[i64], format: Format) -> Result<()> {
    match format.rank() {
        Some(rank) if rank != shape.len() => Err(TransError::ShapeIncompatible(format!(
            "{:?} has rank {}, {} requires rank {}",
            shape,
            shape.len(),
            format,
            rank
        ))),
        _ => Ok(()),
    }
}

/// Physical shape of a tensor whose logical shape is `origin` in `origin_format`
/// once it is laid out in `target`
pub fn tile_shape(origin: &[i64], origin_format: Format, target: Format, tile: i64) -> Result<Vec<i64>> {
    if !target.is_tiled() {
        return relabel_shape(origin, origin_format, target);
    }
    if !target.accepts_origin(origin_format) {
        return Err(TransError::UnsupportedConversion(format!(
            "{} cannot be derived from {}",
            target, origin_format
        )));
    }
    check_rank(origin, origin_format)?;

    let shape = match target.family() {
        FormatFamily::Tiled4D => {
            let n = dim_of(origin, origin_format, 'N')?;
            let c = dim_of(origin, origin_format, 'C')?;
            let h = dim_of(origin, origin_format, 'H')?;
            let w = dim_of(origin, origin_format, 'W')?;
            vec![n, ceil_div(c, tile)?, h, w, tile]
        }
        FormatFamily::Tiled5D => {
            let n = dim_of(origin, origin_format, 'N')?;
            let c = dim_of(origin, origin_format, 'C')?;
            let d = dim_of(origin, origin_format, 'D')?;
            let h = dim_of(origin, origin_format, 'H')?;
            let w = dim_of(origin, origin_format, 'W')?;
            vec![n, d, ceil_div(c, tile)?, h, w, tile]
        }
        FormatFamily::FractalZ => {
            let n = dim_of(origin, origin_format, 'N')?;
            let c = dim_of(origin, origin_format, 'C')?;
            let h = dim_of(origin, origin_format, 'H')?;
            let w = dim_of(origin, origin_format, 'W')?;
            vec![mul_dims(mul_dims(ceil_div(c, tile)?, h)?, w)?, ceil_div(n, tile)?, tile, tile]
        }
        FormatFamily::FractalNz => match origin {
            [] => {
                return Err(TransError::UnsupportedConversion(
                    "scalar cannot be laid out as FRACTAL_NZ".to_string(),
                ))
            }
            [n] => vec![ceil_div(*n, tile)?, 1, tile, tile],
            [batch @ .., m, n] => {
                let mut shape = batch.to_vec();
                shape.extend([ceil_div(*n, tile)?, ceil_div(*m, tile)?, tile, tile]);
                shape
            }
        },
        _ => unreachable!("non-tiled target handled above"),
    };
    Ok(shape)
}

/// Shape of an untiled tensor viewed in another untiled format without moving data
fn relabel_shape(origin: &[i64], origin_format: Format, target: Format) -> Result<Vec<i64>> {
    if origin_format == target || layout_compatible(origin_format, origin.len(), target, origin.len()) {
        return Ok(origin.to_vec());
    }
    Err(TransError::UnsupportedConversion(format!(
        "{} is not a relabelling of {}",
        target, origin_format
    )))
}

/// ND and a plain format of the same rank describe the same bytes
pub fn layout_compatible(a: Format, rank_a: usize, b: Format, rank_b: usize) -> bool {
    if a == b {
        return rank_a == rank_b;
    }
    match (a, b) {
        (Format::Nd, plain) if plain.is_plain() => plain.rank() == Some(rank_a) && rank_a == rank_b,
        (plain, Format::Nd) if plain.is_plain() => plain.rank() == Some(rank_b) && rank_a == rank_b,
        _ => false,
    }
}

/// Apply tiling to a per-dimension `[min, max]` range
pub fn tile_shape_range(
    range: &[(i64, i64)],
    origin_format: Format,
    target: Format,
    tile: i64,
) -> Result<Vec<(i64, i64)>> {
    let mins: Vec<i64> = range.iter().map(|&(lo, _)| lo).collect();
    let maxs: Vec<i64> = range.iter().map(|&(_, hi)| hi).collect();
    let mins = tile_shape(&mins, origin_format, target, tile)?;
    let maxs = tile_shape(&maxs, origin_format, target, tile)?;
    Ok(mins.into_iter().zip(maxs).collect())
}

/// Output positions of the singleton axes inserted when a rank-`rank` tensor is
/// expanded into `format`
///
/// Existing dimensions stay contiguous and cover the channel axis: they start
/// at C for channel-first formats and end at C otherwise.
pub fn expand_axes(rank: usize, format: Format) -> Result<Vec<usize>> {
    let full = format
        .rank()
        .ok_or_else(|| TransError::UnsupportedConversion(format!("cannot expand dims into {}", format)))?;
    if rank > full {
        return Err(TransError::UnsupportedConversion(format!(
            "rank {} does not fit into {} (rank {})",
            rank, format, full
        )));
    }
    let c = format.axis_index('C').unwrap_or(0);
    let start = if format.is_channel_first() {
        c
    } else {
        (c + 1).saturating_sub(rank)
    };
    let start = start.min(full - rank);
    Ok((0..full).filter(|i| *i < start || *i >= start + rank).collect())
}

/// Insert size-1 axes at the given output positions
pub fn unsqueeze_shape(shape: &[i64], axes: &[usize]) -> Result<Vec<i64>> {
    let out_rank = shape.len() + axes.len();
    let mut dims = shape.iter();
    let mut out = Vec::with_capacity(out_rank);
    for i in 0..out_rank {
        if axes.contains(&i) {
            out.push(1);
        } else {
            let dim = dims.next().ok_or_else(|| {
                TransError::ShapeIncompatible(format!("axes {:?} out of range for {:?}", axes, shape))
            })?;
            out.push(*dim);
        }
    }
    Ok(out)
}

/// Remove the given axes, each of which must have size 1
pub fn squeeze_shape(shape: &[i64], axes: &[usize]) -> Result<Vec<i64>> {
    for &axis in axes {
        match shape.get(axis) {
            Some(1) => {}
            Some(dim) => {
                return Err(TransError::ShapeIncompatible(format!(
                    "cannot squeeze axis {} of {:?}: size {} is not 1",
                    axis, shape, dim
                )))
            }
            None => {
                return Err(TransError::ShapeIncompatible(format!(
                    "squeeze axis {} out of range for {:?}",
                    axis, shape
                )))
            }
        }
    }
    Ok(shape
        .iter()
        .enumerate()
        .filter(|(i, _)| !axes.contains(i))
        .map(|(_, &d)| d)
        .collect())
}

/// Permutation taking a `from` tensor to `to` order: `out[i] = in[perm[i]]`
pub fn permutation(from: Format, to: Format) -> Result<Vec<usize>> {
    let (Some(src), Some(dst)) = (from.axes(), to.axes()) else {
        return Err(TransError::UnsupportedConversion(format!(
            "no axis mapping between {} and {}",
            from, to
        )));
    };
    if from.family() != to.family() {
        return Err(TransError::UnsupportedConversion(format!(
            "{} and {} have different axis sets",
            from, to
        )));
    }
    dst.chars()
        .map(|axis| {
            src.find(axis)
                .ok_or_else(|| TransError::UnsupportedConversion(format!("axis {} missing from {}", axis, from)))
        })
        .collect()
}

pub fn transpose_shape(shape: &[i64], perm: &[usize]) -> Result<Vec<i64>> {
    if perm.len() != shape.len() {
        return Err(TransError::ShapeIncompatible(format!(
            "permutation {:?} does not match rank of {:?}",
            perm, shape
        )));
    }
    perm.iter()
        .map(|&p| {
            shape
                .get(p)
                .copied()
                .ok_or_else(|| TransError::ShapeIncompatible(format!("permutation index {} out of range", p)))
        })
        .collect()
}

/// True when `perm` only moves size-1 axes, so the data order is unchanged and
/// a reshape can stand in for the transpose
pub fn moves_only_singletons(shape: &[i64], perm: &[usize]) -> bool {
    if !is_static(shape) {
        return false;
    }
    let order: Vec<usize> = perm.iter().copied().filter(|&p| shape.get(p) != Some(&1)).collect();
    order.windows(2).all(|w| w[0] < w[1])
}
