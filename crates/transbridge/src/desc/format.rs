// Memory layout tags
//
// Plain formats name their logical axes with one letter each (N, C, D, H, W);
// the canonical mapping between two plain formats of the same family is the
// permutation of those letters. Tiled and fractal formats are derived from a
// plain (or ND) origin by splitting an axis into tiles.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Physical memory layout of a tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Format {
    #[serde(rename = "NCHW")]
    Nchw,
    #[serde(rename = "NHWC")]
    Nhwc,
    #[serde(rename = "HWCN")]
    Hwcn,
    #[serde(rename = "CHWN")]
    Chwn,
    #[serde(rename = "NCDHW")]
    Ncdhw,
    #[serde(rename = "NDHWC")]
    Ndhwc,
    #[serde(rename = "ND")]
    Nd,
    /// Channel-tiled 4D+1: `[N, C1, H, W, C0]`
    #[serde(rename = "NC1HWC0")]
    Nc1hwc0,
    /// Depth + channel-tiled 5D+1: `[N, D, C1, H, W, C0]`
    #[serde(rename = "NDC1HWC0")]
    Ndc1hwc0,
    /// Fractal weight layout: `[C1*H*W, N1, N0, C0]`
    #[serde(rename = "FRACTAL_Z")]
    FractalZ,
    /// Fractal matrix layout: `[..., N1, M1, M0, N0]`
    #[serde(rename = "FRACTAL_NZ")]
    FractalNz,
}

/// Group of formats that share a shape-derivation rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FormatFamily {
    Plain4D,
    Plain5D,
    Nd,
    Tiled4D,
    Tiled5D,
    FractalZ,
    FractalNz,
}

impl FormatFamily {
    pub const ALL: [FormatFamily; 7] = [
        FormatFamily::Plain4D,
        FormatFamily::Plain5D,
        FormatFamily::Nd,
        FormatFamily::Tiled4D,
        FormatFamily::Tiled5D,
        FormatFamily::FractalZ,
        FormatFamily::FractalNz,
    ];

    /// Families whose physical shape is a tiling of the origin shape
    pub fn is_tiled(self) -> bool {
        matches!(
            self,
            FormatFamily::Tiled4D | FormatFamily::Tiled5D | FormatFamily::FractalZ | FormatFamily::FractalNz
        )
    }
}

impl Format {
    pub const ALL: [Format; 11] = [
        Format::Nchw,
        Format::Nhwc,
        Format::Hwcn,
        Format::Chwn,
        Format::Ncdhw,
        Format::Ndhwc,
        Format::Nd,
        Format::Nc1hwc0,
        Format::Ndc1hwc0,
        Format::FractalZ,
        Format::FractalNz,
    ];

    pub fn family(self) -> FormatFamily {
        match self {
            Format::Nchw | Format::Nhwc | Format::Hwcn | Format::Chwn => FormatFamily::Plain4D,
            Format::Ncdhw | Format::Ndhwc => FormatFamily::Plain5D,
            Format::Nd => FormatFamily::Nd,
            Format::Nc1hwc0 => FormatFamily::Tiled4D,
            Format::Ndc1hwc0 => FormatFamily::Tiled5D,
            Format::FractalZ => FormatFamily::FractalZ,
            Format::FractalNz => FormatFamily::FractalNz,
        }
    }

    /// Axis letters of a plain format, `None` for ND and tiled formats
    pub fn axes(self) -> Option<&'static str> {
        match self {
            Format::Nchw => Some("NCHW"),
            Format::Nhwc => Some("NHWC"),
            Format::Hwcn => Some("HWCN"),
            Format::Chwn => Some("CHWN"),
            Format::Ncdhw => Some("NCDHW"),
            Format::Ndhwc => Some("NDHWC"),
            _ => None,
        }
    }

    pub fn is_plain(self) -> bool {
        self.axes().is_some()
    }

    pub fn is_tiled(self) -> bool {
        self.family().is_tiled()
    }

    /// Logical rank of a plain format
    pub fn rank(self) -> Option<usize> {
        self.axes().map(str::len)
    }

    /// Position of an axis letter in a plain format
    pub fn axis_index(self, axis: char) -> Option<usize> {
        self.axes().and_then(|axes| axes.find(axis))
    }

    /// Formats that keep the channel right after the batch axis
    pub fn is_channel_first(self) -> bool {
        matches!(self, Format::Nchw | Format::Ncdhw)
    }

    /// Plain formats a tiled format can be derived from
    pub fn accepts_origin(self, origin: Format) -> bool {
        match self.family() {
            FormatFamily::Tiled4D | FormatFamily::FractalZ => origin.family() == FormatFamily::Plain4D,
            FormatFamily::Tiled5D => origin.family() == FormatFamily::Plain5D,
            FormatFamily::FractalNz => !origin.is_tiled(),
            _ => origin == self,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Format::Nchw => "NCHW",
            Format::Nhwc => "NHWC",
            Format::Hwcn => "HWCN",
            Format::Chwn => "CHWN",
            Format::Ncdhw => "NCDHW",
            Format::Ndhwc => "NDHWC",
            Format::Nd => "ND",
            Format::Nc1hwc0 => "NC1HWC0",
            Format::Ndc1hwc0 => "NDC1HWC0",
            Format::FractalZ => "FRACTAL_Z",
            Format::FractalNz => "FRACTAL_NZ",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_partition() {
        for format in Format::ALL {
            let family = format.family();
            assert_eq!(format.is_plain(), matches!(family, FormatFamily::Plain4D | FormatFamily::Plain5D));
            assert_eq!(format.is_tiled(), family.is_tiled());
        }
    }

    #[test]
    fn test_axes() {
        assert_eq!(Format::Nhwc.axis_index('C'), Some(3));
        assert_eq!(Format::Hwcn.axis_index('N'), Some(3));
        assert_eq!(Format::Ncdhw.rank(), Some(5));
        assert_eq!(Format::Nc1hwc0.axes(), None);
        assert_eq!(Format::Nd.rank(), None);
    }

    #[test]
    fn test_accepts_origin() {
        assert!(Format::Nc1hwc0.accepts_origin(Format::Nhwc));
        assert!(!Format::Nc1hwc0.accepts_origin(Format::Ncdhw));
        assert!(Format::Ndc1hwc0.accepts_origin(Format::Ndhwc));
        assert!(Format::FractalNz.accepts_origin(Format::Nd));
        assert!(!Format::FractalZ.accepts_origin(Format::Nd));
        assert!(Format::Nchw.accepts_origin(Format::Nchw));
    }

    #[test]
    fn test_display() {
        assert_eq!(Format::FractalNz.to_string(), "FRACTAL_NZ");
        assert_eq!(Format::Nc1hwc0.to_string(), "NC1HWC0");
    }
}
