//! # hlsplay-ts
//!
//! MPEG Transport Stream demuxer tuned for lossy, segmented delivery
//! (adaptive-bitrate HTTP streaming, where segment boundaries introduce
//! timestamp discontinuities and continuity-counter gaps).
//!
//! Raw bytes go in through [`TsDemuxer::demux`]; complete H.264 access
//! units come out in AVCC framing, prefixed with a [`FrameInfo`] record
//! carrying the resolved width, height, frame rate and normalized
//! timestamps.
//!
//! ## Pipeline
//!
//! ```text
//! bytes -> sync -> packet -> psi (PAT/PMT) -> program table
//!                        \-> pes -> assembler -> h264 -> timing -> sink
//! ```
//!
//! - [`sync`]: recover 188-byte packet alignment from an unframed byte
//!   stream, with bounded buffering.
//! - [`packet`]: TS header and adaptation field decoding, PCR extraction.
//! - [`psi`]: PAT/PMT section parsing into programs and elementary streams.
//! - [`pes`]: PES header parsing with 33-bit PTS/DTS extraction.
//! - [`assembler`]: per-PID access-unit reassembly across TS packets.
//! - [`timing`]: timestamp normalization with wraparound and discontinuity
//!   handling.
//! - [`sink`]: the ring-buffer sink contract and the emitted frame record.
//! - [`demuxer`]: the controller tying everything together.
//!
//! The demuxer is single-threaded and never fails on input: corrupted
//! streams degrade to counters in [`DemuxerStats`], not errors.
//!
//! ## Example
//!
//! ```no_run
//! use hlsplay_ts::TsDemuxer;
//!
//! let mut demuxer = TsDemuxer::new();
//! demuxer.set_video_callback(|pid, avcc, header| {
//!     println!("pid {pid}: {} byte access unit, pts {:?}", avcc.len(), header.pts);
//! });
//!
//! let segment: Vec<u8> = std::fs::read("segment.ts").unwrap();
//! demuxer.demux(&segment);
//! ```

pub mod assembler;
pub mod clock;
pub mod demuxer;
pub mod error;
pub mod packet;
pub mod pes;
pub mod psi;
pub mod sink;
pub mod sync;
pub mod timing;

pub use assembler::{AccessUnitAssembler, AssembledUnit, AssemblyConfig};
pub use clock::{Clock, ManualClock, SystemClock};
pub use demuxer::{DemuxerConfig, DemuxerStats, Program, Stream, TsDemuxer};
pub use error::{Result, TsError};
pub use packet::{
    AdaptationField, AdaptationFieldControl, Pcr, ScramblingControl, TsHeader, PID_MAX, PID_NULL,
    PID_PAT, SYNC_BYTE, TS_PACKET_SIZE,
};
pub use pes::{PesFlags, PesHeader, PesTimestamp, StreamId, PES_START_CODE_PREFIX};
pub use psi::{Pat, PatEntry, Pmt, PmtStream, StreamType};
pub use sink::{FrameInfo, FrameSink};
pub use sync::{PacketSynchronizer, SyncConfig};
pub use timing::TimestampNormalizer;
