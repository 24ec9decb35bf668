//! Crate-level error types.

use std::fmt;

/// Errors produced by the throng engine.
#[derive(Debug)]
pub enum EngineError {
    /// Model, level, or config file could not be opened or parsed.
    FileIo(std::io::Error),
    /// A model is missing a required feature (bad skeleton, empty clip
    /// table); rejected at load.
    AssetInvariant(String),
    /// GPU buffer or image allocation failed; fatal.
    GpuAllocation(String),
    /// A behavior graph references an unknown node id or a dangling link;
    /// the graph is rejected.
    GraphIntegrity(String),
    /// Config file parsing/serialization failure.
    ConfigParse(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileIo(e) => write!(f, "I/O error: {e}"),
            Self::AssetInvariant(msg) => {
                write!(f, "asset invariant violated: {msg}")
            }
            Self::GpuAllocation(msg) => {
                write!(f, "GPU allocation failed: {msg}")
            }
            Self::GraphIntegrity(msg) => {
                write!(f, "behavior graph integrity: {msg}")
            }
            Self::ConfigParse(msg) => {
                write!(f, "config parse error: {msg}")
            }
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::FileIo(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        Self::FileIo(e)
    }
}
