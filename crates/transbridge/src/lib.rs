//! # transbridge
//!
//! Layout and dtype bridging for tensor graphs.
//!
//! After format selection every operator in a graph has decided which layout
//! and element type it wants for each input. Wherever a producer's output
//! disagrees with what a consumer asked for, this crate inserts the chain of
//! conversion nodes (Cast, Reshape, Squeeze, Unsqueeze, Transpose, TransData)
//! that bridges the two, merges redundant chains, and finally moves Casts
//! across TransData nodes to whichever side has fewer elements.
//!
//! ## Library Usage
//!
//! ```
//! use transbridge::desc::{DataType, Format, TensorDesc};
//! use transbridge::{StaticRegistry, TransBridge, TransGraph};
//!
//! let nchw = TensorDesc::new(vec![1, 16, 4, 4], Format::Nchw, DataType::Float16);
//! let tiled = TensorDesc::tiled(vec![1, 16, 4, 4], Format::Nchw, Format::Nc1hwc0, DataType::Float16, 16)?;
//!
//! let mut graph = TransGraph::new();
//! let data = graph.add_op("Data").name("data").output_desc(nchw).finish()?;
//! graph.add_op("Conv2D").name("conv").input(data, 0, 0).input_desc(tiled).finish()?;
//!
//! let mut bridge = TransBridge::new(StaticRegistry::new());
//! bridge.initialize()?;
//! bridge.insert_and_merge_trans_nodes(&mut graph)?;
//! assert_eq!(graph.node_count(), 3);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod desc;
pub mod engine;
pub mod error;
pub mod graph;
pub mod registry;
pub mod trans;
pub mod transfer;

pub use config::{ConfigError, TransConfig, TransConfigFile, DEFAULT_TILE_SIZE};
pub use engine::TransBridge;
pub use error::{Result, TransError};
pub use graph::{GraphNode, NodeId, TransGraph};
pub use registry::{KernelRegistry, StaticRegistry};
pub use transfer::{ConversionKind, TransStep};

/// Get the version of transbridge
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
