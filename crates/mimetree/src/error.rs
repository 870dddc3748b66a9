//! Error types for MIME parsing.
//!
//! Only caller mistakes surface here. Damage in the message itself (missing
//! boundaries, broken parameters, undecodable words) is recovered in place
//! and never turns into an error.

/// Result type alias for MIME operations.
pub type Result<T> = std::result::Result<T, Error>;

/// MIME error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input is not text where only text is supported.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid argument, such as an unknown header grammar or a registry conflict.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No structured decoder is registered for the header.
    #[error("Unknown structured header: {0}")]
    UnknownHeader(String),

    /// Charset label is not recognized.
    #[error("Unsupported charset: {0}")]
    UnsupportedCharset(String),
}
