//! Per-PID access-unit reassembly.
//!
//! MPEG-TS slices PES packets across 184-byte payloads and, for video,
//! gives no explicit access-unit end marker. The assembler buffers payload
//! bytes per PID and decides when a complete H.264 access unit can be
//! emitted: immediately when a single payload-unit-start packet carries a
//! self-delimiting unit, otherwise by size and age heuristics while
//! continuation packets accumulate.

use hlsplay_h264::nal::AccessUnitInfo;

use crate::pes::PesHeader;

/// Reassembly thresholds.
///
/// The completion heuristics are policy, not format. Defaults match
/// observed segmented streams; tests override them to pin behavior.
#[derive(Debug, Clone, Copy)]
pub struct AssemblyConfig {
    /// Buffered size at which an in-progress unit is considered complete.
    pub complete_size: usize,
    /// Minimum size for the age-based emit path.
    pub aged_size: usize,
    /// Age in seconds after which a unit of at least `aged_size` is emitted.
    pub max_age: f64,
    /// Size at which a unit is emitted unconditionally.
    pub emergency_size: usize,
    /// Soft cap on the per-PID buffer; the unit in progress is dropped when
    /// a continuation pushes past it.
    pub max_buffer: usize,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            complete_size: 8 * 1024,
            aged_size: 2 * 1024,
            max_age: 0.100,
            emergency_size: 16 * 1024,
            max_buffer: 32 * 1024,
        }
    }
}

/// A reassembled access unit with its captured timing.
#[derive(Debug, Clone)]
pub struct AssembledUnit {
    /// Elementary stream bytes (Annex-B framing).
    pub data: Vec<u8>,
    /// Raw 33-bit PTS captured from the PES header (0 when absent).
    pub pts: u64,
    /// Raw 33-bit DTS (PTS-substituted or 0 when absent).
    pub dts: u64,
    /// Keyframe flag from the NAL scan at capture time.
    pub keyframe: bool,
}

/// Result of feeding one TS payload into the assembler.
#[derive(Debug, Default)]
pub struct PushOutcome {
    /// Zero, one or two access units ready for emission (a forced emit of
    /// the previous unit plus a complete new one).
    pub units: Vec<AssembledUnit>,
    /// PES header parsed at a payload-unit start.
    pub header: Option<PesHeader>,
    /// A malformed PES start or header was encountered.
    pub error: bool,
    /// The per-PID buffer overflowed and the unit in progress was dropped.
    pub overflowed: bool,
}

/// Access-unit reassembly state for a single PID.
#[derive(Debug)]
pub struct AccessUnitAssembler {
    pid: u16,
    buffer: Vec<u8>,
    in_progress: bool,
    started_at: f64,
    pts: u64,
    dts: u64,
    keyframe: bool,
    config: AssemblyConfig,
}

impl AccessUnitAssembler {
    /// Create an assembler for one PID.
    pub fn new(pid: u16, config: AssemblyConfig) -> Self {
        Self {
            pid,
            buffer: Vec::new(),
            in_progress: false,
            started_at: 0.0,
            pts: 0,
            dts: 0,
            keyframe: false,
            config,
        }
    }

    /// The PID this assembler serves.
    pub fn pid(&self) -> u16 {
        self.pid
    }

    /// Whether a unit is currently being assembled.
    pub fn in_progress(&self) -> bool {
        self.in_progress
    }

    /// Bytes buffered for the unit in progress.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any unit in progress.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.in_progress = false;
        self.keyframe = false;
    }

    /// Feed one TS packet payload.
    ///
    /// `pusi` is the packet's payload_unit_start flag; `now` is the clock
    /// reading used for age-based completion.
    pub fn push(&mut self, payload: &[u8], pusi: bool, now: f64) -> PushOutcome {
        if pusi {
            self.push_start(payload, now)
        } else {
            self.push_continuation(payload, now)
        }
    }

    fn push_start(&mut self, payload: &[u8], now: f64) -> PushOutcome {
        let mut outcome = PushOutcome::default();

        // A new PES packet delimits whatever was in flight.
        if self.in_progress && !self.buffer.is_empty() {
            tracing::trace!(
                pid = self.pid,
                size = self.buffer.len(),
                "forcing completion of buffered unit"
            );
            outcome.units.push(self.take_unit());
        }
        self.reset();

        let header = match PesHeader::parse(payload) {
            Ok(header) => header,
            Err(_) => {
                outcome.error = true;
                return outcome;
            }
        };

        let es_start = header.payload_offset();
        if es_start >= payload.len() {
            outcome.error = true;
            outcome.header = Some(header);
            return outcome;
        }

        let (pts, dts) = header.timestamps();
        let es = &payload[es_start..];
        let info = AccessUnitInfo::scan(es);

        if info.is_complete() {
            outcome.units.push(AssembledUnit {
                data: es.to_vec(),
                pts,
                dts,
                keyframe: info.is_keyframe(),
            });
        } else {
            self.buffer.extend_from_slice(es);
            self.in_progress = true;
            self.started_at = now;
            self.pts = pts;
            self.dts = dts;
            self.keyframe = info.is_keyframe();
        }

        outcome.header = Some(header);
        outcome
    }

    fn push_continuation(&mut self, payload: &[u8], now: f64) -> PushOutcome {
        let mut outcome = PushOutcome::default();

        if !self.in_progress {
            // Orphaned continuation; without the PES start there is no
            // header context to attach the bytes to.
            tracing::trace!(pid = self.pid, "dropping orphaned continuation");
            return outcome;
        }

        self.buffer.extend_from_slice(payload);

        if self.buffer.len() > self.config.max_buffer {
            tracing::warn!(
                pid = self.pid,
                size = self.buffer.len(),
                "reassembly buffer overflow, dropping unit"
            );
            self.reset();
            outcome.overflowed = true;
            return outcome;
        }

        if self.extended_ready(now) {
            outcome.units.push(self.take_unit());
        }

        outcome
    }

    /// Emission heuristic for units spanning multiple packets.
    fn extended_ready(&self, now: f64) -> bool {
        let size = self.buffer.len();

        if size >= self.config.complete_size {
            return true;
        }
        if size >= self.config.aged_size && now - self.started_at >= self.config.max_age {
            return true;
        }
        size >= self.config.emergency_size
    }

    fn take_unit(&mut self) -> AssembledUnit {
        self.in_progress = false;
        AssembledUnit {
            data: std::mem::take(&mut self.buffer),
            pts: self.pts,
            dts: self.dts,
            keyframe: self.keyframe,
        }
    }
}
