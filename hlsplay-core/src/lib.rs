//! # hlsplay-core
//!
//! Shared primitives for the hlsplay demuxer crates:
//!
//! - [`bitstream`]: bounds-checked bit-level reading and writing, including
//!   the Exp-Golomb codes used throughout H.264 parameter sets, and the
//!   Annex-B start-code / emulation-prevention helpers.
//! - [`error`]: the common error hierarchy shared by the codec and
//!   transport layers.

pub mod bitstream;
pub mod error;

pub use bitstream::{
    add_emulation_prevention, find_start_code, remove_emulation_prevention, BitReader, BitWriter,
};
pub use error::{BitstreamError, CodecError, Error, Result};
