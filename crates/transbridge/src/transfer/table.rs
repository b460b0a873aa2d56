// Conversion route table
//
// One entry per (source family, target family) pair. A route lists the step
// kinds in the order they are applied; steps that turn out to be no-ops for a
// concrete descriptor pair are skipped when the route is materialized.

use super::step::ConversionKind;
use crate::desc::FormatFamily;

use ConversionKind::{LayoutTransform as Lt, Reshape, Squeeze, Transpose, Unsqueeze};
use FormatFamily::{FractalNz, FractalZ, Nd, Plain4D, Plain5D, Tiled4D, Tiled5D};

/// How to get from one format family to another
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Steps(&'static [ConversionKind]),
    Unsupported,
}

#[derive(Debug, Clone, Copy)]
pub struct RouteEntry {
    pub from: FormatFamily,
    pub to: FormatFamily,
    pub route: Route,
}

const fn entry(from: FormatFamily, to: FormatFamily, route: Route) -> RouteEntry {
    RouteEntry { from, to, route }
}

const NONE: Route = Route::Unsupported;

pub const ROUTE_TABLE: [RouteEntry; 49] = [
    // plain 4D source
    entry(Plain4D, Plain4D, Route::Steps(&[Transpose])),
    entry(Plain4D, Plain5D, NONE),
    entry(Plain4D, Nd, Route::Steps(&[Squeeze, Reshape])),
    entry(Plain4D, Tiled4D, Route::Steps(&[Transpose, Lt])),
    entry(Plain4D, Tiled5D, NONE),
    entry(Plain4D, FractalZ, Route::Steps(&[Transpose, Lt])),
    entry(Plain4D, FractalNz, Route::Steps(&[Lt])),
    // plain 5D source
    entry(Plain5D, Plain4D, NONE),
    entry(Plain5D, Plain5D, Route::Steps(&[Transpose])),
    entry(Plain5D, Nd, Route::Steps(&[Squeeze, Reshape])),
    entry(Plain5D, Tiled4D, NONE),
    entry(Plain5D, Tiled5D, Route::Steps(&[Transpose, Lt])),
    entry(Plain5D, FractalZ, NONE),
    entry(Plain5D, FractalNz, Route::Steps(&[Lt])),
    // ND source
    entry(Nd, Plain4D, Route::Steps(&[Unsqueeze, Transpose])),
    entry(Nd, Plain5D, Route::Steps(&[Unsqueeze, Transpose])),
    entry(Nd, Nd, Route::Steps(&[Reshape])),
    entry(Nd, Tiled4D, Route::Steps(&[Unsqueeze, Transpose, Lt])),
    entry(Nd, Tiled5D, Route::Steps(&[Unsqueeze, Transpose, Lt])),
    entry(Nd, FractalZ, Route::Steps(&[Unsqueeze, Transpose, Lt])),
    entry(Nd, FractalNz, Route::Steps(&[Lt])),
    // NC1HWC0 source
    entry(Tiled4D, Plain4D, Route::Steps(&[Lt, Transpose])),
    entry(Tiled4D, Plain5D, NONE),
    entry(Tiled4D, Nd, Route::Steps(&[Lt, Squeeze, Reshape])),
    entry(Tiled4D, Tiled4D, Route::Steps(&[Lt, Transpose, Lt])),
    entry(Tiled4D, Tiled5D, NONE),
    entry(Tiled4D, FractalZ, NONE),
    entry(Tiled4D, FractalNz, NONE),
    // NDC1HWC0 source
    entry(Tiled5D, Plain4D, NONE),
    entry(Tiled5D, Plain5D, Route::Steps(&[Lt, Transpose])),
    entry(Tiled5D, Nd, Route::Steps(&[Lt, Squeeze, Reshape])),
    entry(Tiled5D, Tiled4D, NONE),
    entry(Tiled5D, Tiled5D, Route::Steps(&[Lt, Transpose, Lt])),
    entry(Tiled5D, FractalZ, NONE),
    entry(Tiled5D, FractalNz, NONE),
    // FRACTAL_Z source
    entry(FractalZ, Plain4D, Route::Steps(&[Lt, Transpose])),
    entry(FractalZ, Plain5D, NONE),
    entry(FractalZ, Nd, Route::Steps(&[Lt, Squeeze, Reshape])),
    entry(FractalZ, Tiled4D, NONE),
    entry(FractalZ, Tiled5D, NONE),
    entry(FractalZ, FractalZ, Route::Steps(&[Lt, Transpose, Lt])),
    entry(FractalZ, FractalNz, NONE),
    // FRACTAL_NZ source
    entry(FractalNz, Plain4D, Route::Steps(&[Lt, Unsqueeze, Transpose])),
    entry(FractalNz, Plain5D, Route::Steps(&[Lt, Unsqueeze, Transpose])),
    entry(FractalNz, Nd, Route::Steps(&[Lt, Squeeze, Reshape])),
    entry(FractalNz, Tiled4D, NONE),
    entry(FractalNz, Tiled5D, NONE),
    entry(FractalNz, FractalZ, NONE),
    entry(FractalNz, FractalNz, Route::Steps(&[Lt, Reshape, Lt])),
];

/// Route between two format families
pub fn route(from: FormatFamily, to: FormatFamily) -> Route {
    ROUTE_TABLE
        .iter()
        .find(|e| e.from == from && e.to == to)
        .map(|e| e.route)
        .unwrap_or(Route::Unsupported)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_pair_listed_once() {
        for from in FormatFamily::ALL {
            for to in FormatFamily::ALL {
                let count = ROUTE_TABLE.iter().filter(|e| e.from == from && e.to == to).count();
                assert_eq!(count, 1, "{:?} -> {:?} listed {} times", from, to, count);
            }
        }
    }

    #[test]
    fn test_same_family_always_routable() {
        for family in FormatFamily::ALL {
            assert!(matches!(route(family, family), Route::Steps(_)), "{:?}", family);
        }
    }

    #[test]
    fn test_tiled_routes_end_in_layout_transform() {
        for e in ROUTE_TABLE.iter().filter(|e| e.to.is_tiled()) {
            if let Route::Steps(kinds) = e.route {
                assert_eq!(kinds.last(), Some(&Lt), "{:?} -> {:?}", e.from, e.to);
            }
        }
        for e in ROUTE_TABLE.iter().filter(|e| e.from.is_tiled()) {
            if let Route::Steps(kinds) = e.route {
                assert_eq!(kinds.first(), Some(&Lt), "{:?} -> {:?}", e.from, e.to);
            }
        }
    }

    #[test]
    fn test_cross_tiled_unsupported() {
        assert_eq!(route(Tiled4D, FractalZ), Route::Unsupported);
        assert_eq!(route(Tiled5D, Tiled4D), Route::Unsupported);
        assert_eq!(route(Plain4D, Plain5D), Route::Unsupported);
    }
}
