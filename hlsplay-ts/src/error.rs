//! MPEG Transport Stream error types.

use thiserror::Error;

/// MPEG-TS specific errors.
///
/// These never surface through [`crate::TsDemuxer::demux`]; the demuxer
/// swallows them into counters. They are the error currency of the parsing
/// layers underneath.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TsError {
    /// Invalid sync byte (expected 0x47).
    #[error("Invalid sync byte: expected 0x47, got 0x{0:02X}")]
    InvalidSyncByte(u8),

    /// Packet too short.
    #[error("Packet too short: expected 188 bytes, got {0}")]
    PacketTooShort(usize),

    /// Invalid adaptation field.
    #[error("Invalid adaptation field: {0}")]
    InvalidAdaptationField(String),

    /// Invalid PAT (Program Association Table).
    #[error("Invalid PAT: {0}")]
    InvalidPat(String),

    /// Invalid PMT (Program Map Table).
    #[error("Invalid PMT: {0}")]
    InvalidPmt(String),

    /// Invalid PES packet.
    #[error("Invalid PES packet: {0}")]
    InvalidPes(String),

    /// Continuity counter error.
    #[error("Continuity counter error on PID {pid}: expected {expected}, got {actual}")]
    ContinuityError {
        /// The PID with the error.
        pid: u16,
        /// Expected continuity counter.
        expected: u8,
        /// Actual continuity counter.
        actual: u8,
    },

    /// PCR error.
    #[error("PCR error: {0}")]
    PcrError(String),
}

impl TsError {
    /// Create an invalid PAT error.
    pub fn invalid_pat(msg: impl Into<String>) -> Self {
        TsError::InvalidPat(msg.into())
    }

    /// Create an invalid PMT error.
    pub fn invalid_pmt(msg: impl Into<String>) -> Self {
        TsError::InvalidPmt(msg.into())
    }

    /// Create an invalid PES error.
    pub fn invalid_pes(msg: impl Into<String>) -> Self {
        TsError::InvalidPes(msg.into())
    }
}

impl From<TsError> for hlsplay_core::Error {
    fn from(err: TsError) -> Self {
        hlsplay_core::Error::InvalidParameter(err.to_string())
    }
}

/// Result type for MPEG-TS operations.
pub type Result<T> = std::result::Result<T, TsError>;
