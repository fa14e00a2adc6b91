//! # Error Types
//!
//! Central error type for the multiplexer. Configuration problems abort
//! initialisation, per-packet problems abort the offending `write_packet`
//! call and leave the output byte stream in a consistent state (no partial
//! transport packet is ever emitted).

use thiserror::Error;

/// Primary error type for the isdbmux library
#[derive(Error, Debug)]
pub enum MuxError {
    /// I/O errors from the byte sink
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed input bitstream or missing mandatory metadata
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Invalid multiplexer configuration (duplicate PIDs, bad stream ids, ...)
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Input that is valid but cannot be represented on the wire
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Errors from the codec adaptation layer
    #[error("codec error: {0}")]
    Codec(String),
}

/// A specialized Result type for isdbmux operations.
pub type Result<T> = std::result::Result<T, MuxError>;
