// Conversion steps and the routes that chain them

pub mod step;
pub mod table;

pub use step::{ConversionKind, TransStep};
pub use table::{route, Route, ROUTE_TABLE};
