//! Error types for the reverie core library.

use thiserror::Error;

/// Top-level error type for all cognitive operations.
///
/// Public cognitive entry points (decisions, retrieval, planning) never
/// surface these to the scheduler — they exist for host-facing surfaces
/// (config loading, export/import) and for internal capability boundaries.
#[derive(Error, Debug)]
pub enum CognitionError {
    /// A memory with the given ID was not found.
    #[error("Memory not found: {0}")]
    MemoryNotFound(crate::MemoryId),

    /// A plan node with the given ID was not found.
    #[error("Plan node not found: {0}")]
    PlanNotFound(crate::PlanId),

    /// The capability (language model / embedding) is not configured.
    #[error("Capability unavailable: {0}")]
    Unavailable(String),

    /// The capability is configured but the call failed.
    #[error("Capability call failed: {0}")]
    Capability(String),

    /// A structured model response could not be parsed.
    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, CognitionError>;
