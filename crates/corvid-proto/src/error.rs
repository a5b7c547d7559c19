//! Error types for the protocol layer.

use thiserror::Error;

/// Result type alias using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Errors raised by the framing and transport layer.
///
/// Message parsing itself never fails: a line the grammar rejects decodes
/// to a [`Message`](crate::Message) with an empty command, which dispatch
/// layers can skip. Everything here comes from the socket side.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Underlying socket error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A line exceeded the inbound length limit.
    #[error("line too long: {actual} bytes (limit {limit})")]
    LineTooLong {
        /// Bytes buffered when the limit tripped.
        actual: usize,
        /// Configured limit.
        limit: usize,
    },
}
