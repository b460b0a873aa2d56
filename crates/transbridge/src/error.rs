//! Error types for the trans-node bridging passes

use crate::config::ConfigError;
use thiserror::Error;

/// Result type for bridging operations
pub type Result<T> = std::result::Result<T, TransError>;

/// Errors that can occur while bridging, merging or reordering trans nodes
///
/// Every variant is fatal to the enclosing graph's compilation. The
/// internal ones (`DanglingControlEdge`, `InvalidGraph`) indicate a broken
/// invariant rather than an unsupported user graph.
#[derive(Debug, Error)]
pub enum TransError {
    #[error("Unsupported conversion: {0}")]
    UnsupportedConversion(String),

    #[error("Incompatible shape: {0}")]
    ShapeIncompatible(String),

    #[error("Control edge lost during rewrite: {0}")]
    DanglingControlEdge(String),

    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    #[error("Not initialized: {0}")]
    NotInitialized(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Graph error: {0}")]
    Graph(String),
}

impl TransError {
    /// True for invariant violations that no user graph should be able to trigger
    pub fn is_internal(&self) -> bool {
        matches!(self, TransError::DanglingControlEdge(_) | TransError::InvalidGraph(_))
    }

    /// Prefix the message with the node or edge it concerns
    pub fn context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            TransError::UnsupportedConversion(msg) => TransError::UnsupportedConversion(format!("{}: {}", ctx, msg)),
            TransError::ShapeIncompatible(msg) => TransError::ShapeIncompatible(format!("{}: {}", ctx, msg)),
            TransError::DanglingControlEdge(msg) => TransError::DanglingControlEdge(format!("{}: {}", ctx, msg)),
            TransError::InvalidGraph(msg) => TransError::InvalidGraph(format!("{}: {}", ctx, msg)),
            TransError::Graph(msg) => TransError::Graph(format!("{}: {}", ctx, msg)),
            other => other,
        }
    }
}

// Manual From impl for anyhow::Error
impl From<anyhow::Error> for TransError {
    fn from(err: anyhow::Error) -> Self {
        TransError::Graph(format!("{:#}", err))
    }
}
