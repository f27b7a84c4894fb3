//! Error types shared across the hlsplay crates.

use thiserror::Error;

/// Top-level error type for the core and codec layers.
#[derive(Error, Debug)]
pub enum Error {
    /// Bitstream parsing errors.
    #[error("Bitstream error: {0}")]
    Bitstream(#[from] BitstreamError),

    /// Codec errors (NAL units, parameter sets).
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Invalid parameter provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Bitstream parsing errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BitstreamError {
    /// Ran out of bits mid-parse.
    #[error("Unexpected end of bitstream")]
    UnexpectedEnd,

    /// Exp-Golomb code with more than 31 leading zeros.
    #[error("Exp-Golomb code overflow")]
    ExpGolombOverflow,
}

/// Codec-level errors.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Invalid NAL unit.
    #[error("Invalid NAL unit: {0}")]
    InvalidNalUnit(String),

    /// Invalid parameter set.
    #[error("Invalid parameter set: {0}")]
    InvalidParameterSet(String),

    /// Generic codec error message.
    #[error("{0}")]
    Other(String),
}

impl From<String> for CodecError {
    fn from(s: String) -> Self {
        CodecError::Other(s)
    }
}

impl From<&str> for CodecError {
    fn from(s: &str) -> Self {
        CodecError::Other(s.to_string())
    }
}

/// Result type for core and codec operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err: Error = BitstreamError::UnexpectedEnd.into();
        assert_eq!(err.to_string(), "Bitstream error: Unexpected end of bitstream");
    }

    #[test]
    fn test_codec_error_from_str() {
        let err = CodecError::from("bad slice");
        assert_eq!(err.to_string(), "bad slice");
    }
}
