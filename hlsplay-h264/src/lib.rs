//! # hlsplay-h264
//!
//! The H.264 bitstream side of the hlsplay demuxer:
//!
//! - [`nal`]: NAL unit enumeration over Annex-B byte streams and
//!   access-unit classification (AUD/SPS/PPS/IDR presence, keyframes).
//! - [`avcc`]: conversion between Annex-B start-code framing and AVCC
//!   length-prefixed framing, with recovery over malformed regions.
//! - [`sps`]: Sequence Parameter Set parsing, including cropping and the
//!   VUI timing information, resolved into display width/height and a
//!   sanity-checked frame rate.
//!
//! Everything here operates on borrowed byte slices and never panics on
//! malformed input; parse failures surface as errors or are skipped during
//! scanning.

pub mod avcc;
pub mod nal;
pub mod sps;

pub use avcc::{annex_b_to_avcc, avcc_to_annex_b, looks_like_avcc, AvccUnits};
pub use nal::{AccessUnitInfo, NalScanner, NalUnit, NalUnitType, MAX_NAL_UNIT_SIZE};
pub use sps::{FpsPolicy, SequenceParameterSet, SpsInfo, VuiParameters};
