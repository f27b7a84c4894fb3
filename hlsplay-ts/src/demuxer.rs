//! Demuxer controller.
//!
//! Ties the pipeline together: packet synchronization, continuity
//! tracking, PAT/PMT routing, PES reassembly, AVCC conversion, SPS
//! caching, timestamp normalization and frame emission.
//!
//! The controller is deliberately unkillable on input. Sync loss,
//! transport errors, malformed sections, broken PES starts and corrupt
//! H.264 are all counted and swallowed; a corrupt stream degrades to zero
//! output, never to an error surfaced from [`TsDemuxer::demux`].

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use hlsplay_h264::avcc;
use hlsplay_h264::sps::{FpsPolicy, SpsInfo};

use crate::assembler::{AccessUnitAssembler, AssembledUnit, AssemblyConfig};
use crate::clock::{Clock, SystemClock};
use crate::packet::{AdaptationField, Pcr, TsHeader, PID_PAT, TS_PACKET_SIZE};
use crate::pes::{PesHeader, StreamId};
use crate::psi::{Pat, Pmt, StreamType};
use crate::sink::{FrameInfo, FrameSink};
use crate::sync::{PacketSynchronizer, SyncConfig};
use crate::timing::TimestampNormalizer;

/// Width reported before any SPS has been seen.
const DEFAULT_WIDTH: u32 = 640;
/// Height reported before any SPS has been seen.
const DEFAULT_HEIGHT: u32 = 480;
/// Frame rate assumed before any SPS has been seen.
const DEFAULT_FPS: f64 = 30.0;

/// Program number used for streams discovered without a PAT.
const SYNTHETIC_PROGRAM: u16 = 1;
/// PMT PID recorded for the synthetic program.
const SYNTHETIC_PMT_PID: u16 = 0x1000;

/// Observer callback invoked after each video access-unit emission with
/// the AVCC bytes.
pub type VideoCallback = Box<dyn FnMut(u16, &[u8], &PesHeader)>;

/// Observer callback invoked with raw audio PES packets; audio reassembly
/// is out of scope, single-packet audio frames dominate in practice.
pub type AudioCallback = Box<dyn FnMut(u16, &[u8], &PesHeader)>;

/// Demuxer tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct DemuxerConfig {
    /// Packet synchronizer limits.
    pub sync: SyncConfig,
    /// Access-unit reassembly thresholds.
    pub assembly: AssemblyConfig,
    /// Frame-rate acceptance window for SPS timing.
    pub fps: FpsPolicy,
    /// Largest tolerated continuity-counter gap before the timestamp
    /// normalizer is reset.
    pub continuity_gap_limit: u8,
}

impl Default for DemuxerConfig {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            assembly: AssemblyConfig::default(),
            fps: FpsPolicy::default(),
            continuity_gap_limit: 5,
        }
    }
}

/// An elementary stream discovered via PMT or auto-detection.
#[derive(Debug)]
pub struct Stream {
    /// Elementary stream PID.
    pub pid: u16,
    /// Raw stream type from the PMT.
    pub stream_type: u8,
    /// Recognized stream type, when known.
    pub kind: Option<StreamType>,
    /// Most recent raw PTS seen on this stream.
    pub last_pts: u64,
    /// Most recent raw DTS seen on this stream.
    pub last_dts: u64,
    /// Packets routed to this stream.
    pub packets_received: u64,
    /// Scrambled packets skipped on this stream.
    pub scrambled_packets: u64,
    assembler: AccessUnitAssembler,
}

impl Stream {
    fn new(pid: u16, stream_type: u8, assembly: AssemblyConfig) -> Self {
        Self {
            pid,
            stream_type,
            kind: StreamType::from_u8(stream_type),
            last_pts: 0,
            last_dts: 0,
            packets_received: 0,
            scrambled_packets: 0,
            assembler: AccessUnitAssembler::new(pid, assembly),
        }
    }

    /// Whether this stream carries video.
    pub fn is_video(&self) -> bool {
        self.kind.map(|k| k.is_video()).unwrap_or(false)
    }

    /// Whether this stream carries audio.
    pub fn is_audio(&self) -> bool {
        self.kind.map(|k| k.is_audio()).unwrap_or(false)
    }
}

/// A program from the PAT, owning its elementary streams.
#[derive(Debug)]
pub struct Program {
    /// Program number from the PAT.
    pub program_number: u16,
    /// PID carrying this program's PMT.
    pub pmt_pid: u16,
    /// PCR PID from the PMT.
    pub pcr_pid: u16,
    /// Most recent PCR observed on the PCR PID.
    pub last_pcr: Option<Pcr>,
    /// Elementary streams by PID.
    pub streams: BTreeMap<u16, Stream>,
}

impl Program {
    fn new(program_number: u16, pmt_pid: u16) -> Self {
        Self {
            program_number,
            pmt_pid,
            pcr_pid: 0,
            last_pcr: None,
            streams: BTreeMap::new(),
        }
    }
}

/// Counters and cached state exposed through [`TsDemuxer::stats`].
#[derive(Debug, Clone, Default)]
pub struct DemuxerStats {
    /// Packets processed, null packets included.
    pub total_packets: u64,
    /// Resynchronization events in the packet synchronizer.
    pub sync_errors: u64,
    /// Continuity-counter gaps beyond the tolerated limit.
    pub continuity_errors: u64,
    /// Packets with the transport_error indicator set.
    pub transport_errors: u64,
    /// Discontinuities signalled by adaptation fields or CC gaps.
    pub discontinuities: u64,
    /// PAT/PMT sections rejected as malformed.
    pub section_errors: u64,
    /// Malformed PES packet starts.
    pub pes_errors: u64,
    /// Access units dropped during AVCC conversion.
    pub h264_errors: u64,
    /// SPS NAL units rejected by the parser.
    pub sps_errors: u64,
    /// Access units emitted to the sink.
    pub frames_emitted: u64,
    /// Number of programs in the table.
    pub programs: usize,
    /// Currently cached SPS, if any.
    pub sps: Option<SpsInfo>,
}

#[derive(Debug, Clone, Default)]
struct Counters {
    total_packets: u64,
    continuity_errors: u64,
    transport_errors: u64,
    discontinuities: u64,
    section_errors: u64,
    pes_errors: u64,
    h264_errors: u64,
    sps_errors: u64,
    frames_emitted: u64,
}

/// Push-mode MPEG-TS demuxer.
///
/// Single-threaded and cooperative: a driver appends bytes through
/// [`demux`](Self::demux), which drains at most the per-call packet budget
/// before returning. All state is owned by the instance; callers must
/// serialize access.
pub struct TsDemuxer {
    config: DemuxerConfig,
    sync: PacketSynchronizer,
    programs: BTreeMap<u16, Program>,
    continuity: BTreeMap<u16, u8>,
    normalizer: TimestampNormalizer,
    sps_cache: Option<SpsInfo>,
    next_sequence: u32,
    counters: Counters,
    clock: Box<dyn Clock>,
    sink: Option<Box<dyn FrameSink>>,
    video_callback: Option<VideoCallback>,
    audio_callback: Option<AudioCallback>,
}

impl TsDemuxer {
    /// Create a demuxer with default configuration.
    pub fn new() -> Self {
        Self::with_config(DemuxerConfig::default())
    }

    /// Create a demuxer with explicit configuration.
    pub fn with_config(config: DemuxerConfig) -> Self {
        Self {
            config,
            sync: PacketSynchronizer::with_config(config.sync),
            programs: BTreeMap::new(),
            continuity: BTreeMap::new(),
            normalizer: TimestampNormalizer::new(),
            sps_cache: None,
            next_sequence: 1,
            counters: Counters::default(),
            clock: Box::new(SystemClock::new()),
            sink: None,
            video_callback: None,
            audio_callback: None,
        }
    }

    /// Replace the time source. Tests install a manual clock here.
    pub fn set_clock(&mut self, clock: Box<dyn Clock>) {
        self.clock = clock;
    }

    /// Attach the frame sink receiving `FrameInfo || avcc` records.
    pub fn set_sink(&mut self, sink: Box<dyn FrameSink>) {
        self.sink = Some(sink);
    }

    /// Observe emitted video access units (AVCC bytes).
    pub fn set_video_callback(&mut self, callback: impl FnMut(u16, &[u8], &PesHeader) + 'static) {
        self.video_callback = Some(Box::new(callback));
    }

    /// Observe raw audio PES packets.
    pub fn set_audio_callback(&mut self, callback: impl FnMut(u16, &[u8], &PesHeader) + 'static) {
        self.audio_callback = Some(Box::new(callback));
    }

    /// Append raw bytes and process buffered packets.
    ///
    /// Returns whether at least one packet was processed. Never fails;
    /// input-level problems land in [`stats`](Self::stats).
    pub fn demux(&mut self, bytes: &[u8]) -> bool {
        if bytes.is_empty() {
            return false;
        }

        self.sync.extend(bytes);

        let budget = self.sync.packets_per_call();
        let mut processed = 0usize;
        while processed < budget {
            let Some(packet) = self.sync.take_packet() else {
                break;
            };
            self.process_packet(&packet);
            processed += 1;
        }

        processed > 0
    }

    /// Clear all state and return to initial configuration.
    pub fn reset(&mut self) {
        self.sync.clear();
        self.programs.clear();
        self.continuity.clear();
        self.normalizer.reset();
        self.sps_cache = None;
        self.next_sequence = 1;
        self.counters = Counters::default();
        tracing::debug!("demuxer reset");
    }

    /// Snapshot of counters and cached stream information.
    pub fn stats(&self) -> DemuxerStats {
        DemuxerStats {
            total_packets: self.counters.total_packets,
            sync_errors: self.sync.resyncs(),
            continuity_errors: self.counters.continuity_errors,
            transport_errors: self.counters.transport_errors,
            discontinuities: self.counters.discontinuities,
            section_errors: self.counters.section_errors,
            pes_errors: self.counters.pes_errors,
            h264_errors: self.counters.h264_errors,
            sps_errors: self.counters.sps_errors,
            frames_emitted: self.counters.frames_emitted,
            programs: self.programs.len(),
            sps: self.sps_cache.clone(),
        }
    }

    /// Program table.
    pub fn programs(&self) -> &BTreeMap<u16, Program> {
        &self.programs
    }

    fn process_packet(&mut self, packet: &[u8; TS_PACKET_SIZE]) {
        let header = match TsHeader::parse(packet) {
            Ok(header) => header,
            Err(_) => return,
        };

        self.counters.total_packets += 1;

        if header.transport_error {
            self.counters.transport_errors += 1;
            return;
        }
        if header.is_null() {
            return;
        }

        let mut payload_start = TsHeader::SIZE;
        let mut adaptation: Option<AdaptationField> = None;
        if header.has_adaptation_field() {
            match AdaptationField::parse(&packet[TsHeader::SIZE..]) {
                Ok(field) => {
                    payload_start += field.total_size();
                    adaptation = Some(field);
                }
                Err(_) => return,
            }
        }

        if let Some(field) = &adaptation {
            if field.discontinuity {
                tracing::debug!(pid = header.pid, "adaptation discontinuity");
                self.continuity.insert(header.pid, header.continuity_counter);
                self.normalizer.reset();
                self.counters.discontinuities += 1;
            } else if header.has_payload() {
                self.check_continuity(header.pid, header.continuity_counter);
            }

            if let Some(pcr) = field.pcr {
                self.record_pcr(header.pid, pcr);
            }
        } else if header.has_payload() {
            self.check_continuity(header.pid, header.continuity_counter);
        }

        if !header.has_payload() || payload_start >= TS_PACKET_SIZE {
            return;
        }
        let payload = &packet[payload_start..];

        if header.pid == PID_PAT {
            if header.payload_unit_start {
                self.handle_pat(payload);
            }
            return;
        }

        if self.pmt_program(header.pid).is_some() {
            if header.payload_unit_start {
                self.handle_pmt(header.pid, payload);
            }
            return;
        }

        if header.scrambling_control.is_scrambled() {
            if let Some(stream) = Self::stream_mut(&mut self.programs, header.pid) {
                stream.scrambled_packets += 1;
            }
            return;
        }

        if Self::stream_mut(&mut self.programs, header.pid).is_some() {
            self.handle_stream_payload(header.pid, header.payload_unit_start, payload);
            return;
        }

        // Unknown PID: auto-detect a PES start so playback can begin before
        // (or without) the PMT, common when joining mid-segment.
        if header.payload_unit_start && self.auto_detect(header.pid, payload) {
            self.handle_stream_payload(header.pid, true, payload);
        }
    }

    /// Adopt on first sight, tolerate small gaps, reset timing on large
    /// ones. Gaps are normal around segment transitions.
    fn check_continuity(&mut self, pid: u16, cc: u8) {
        if let Some(last) = self.continuity.insert(pid, cc) {
            let expected = (last + 1) & 0x0F;
            if cc != expected {
                let gap = cc.wrapping_sub(expected) & 0x0F;
                if gap > self.config.continuity_gap_limit {
                    tracing::warn!(pid, gap, "continuity gap beyond limit");
                    self.counters.continuity_errors += 1;
                    self.counters.discontinuities += 1;
                    self.normalizer.reset();
                }
            }
        }
    }

    fn record_pcr(&mut self, pid: u16, pcr: Pcr) {
        for program in self.programs.values_mut() {
            if program.pcr_pid == pid || program.streams.contains_key(&pid) {
                program.last_pcr = Some(pcr);
            }
        }
    }

    fn pmt_program(&self, pid: u16) -> Option<u16> {
        self.programs
            .values()
            .find(|p| p.pmt_pid == pid)
            .map(|p| p.program_number)
    }

    fn stream_mut(programs: &mut BTreeMap<u16, Program>, pid: u16) -> Option<&mut Stream> {
        programs
            .values_mut()
            .find_map(|program| program.streams.get_mut(&pid))
    }

    fn handle_pat(&mut self, payload: &[u8]) {
        let pat = match Pat::parse(payload) {
            Ok(pat) => pat,
            Err(err) => {
                tracing::warn!(%err, "PAT rejected");
                self.counters.section_errors += 1;
                return;
            }
        };
        if !pat.current_next {
            return;
        }

        for entry in &pat.programs {
            match self.programs.entry(entry.program_number) {
                Entry::Occupied(mut occupied) => {
                    // An auto-detected program keeps its streams; the PAT
                    // just pins down the real PMT PID.
                    occupied.get_mut().pmt_pid = entry.pmt_pid;
                }
                Entry::Vacant(vacant) => {
                    tracing::debug!(
                        program = entry.program_number,
                        pmt_pid = entry.pmt_pid,
                        "program added from PAT"
                    );
                    vacant.insert(Program::new(entry.program_number, entry.pmt_pid));
                }
            }
        }
    }

    fn handle_pmt(&mut self, pid: u16, payload: &[u8]) {
        let Some(program_number) = self.pmt_program(pid) else {
            return;
        };

        let pmt = match Pmt::parse(payload) {
            Ok(pmt) => pmt,
            Err(err) => {
                tracing::warn!(%err, "PMT rejected");
                self.counters.section_errors += 1;
                return;
            }
        };
        if !pmt.current_next {
            return;
        }
        if pmt.program_number != program_number {
            tracing::warn!(
                expected = program_number,
                got = pmt.program_number,
                "PMT program number mismatch"
            );
            self.counters.section_errors += 1;
            return;
        }

        let assembly = self.config.assembly;
        if let Some(program) = self.programs.get_mut(&program_number) {
            program.pcr_pid = pmt.pcr_pid;
            for es in &pmt.streams {
                program.streams.entry(es.pid).or_insert_with(|| {
                    match StreamType::from_u8(es.stream_type) {
                        Some(kind) => tracing::debug!(
                            pid = es.pid,
                            kind = kind.name(),
                            "elementary stream added"
                        ),
                        None => tracing::warn!(
                            pid = es.pid,
                            stream_type = es.stream_type,
                            "unknown stream type"
                        ),
                    }
                    Stream::new(es.pid, es.stream_type, assembly)
                });
            }
        }
    }

    /// Register an unknown PID whose payload opens a PES packet with a
    /// video or audio stream ID under a synthetic program.
    fn auto_detect(&mut self, pid: u16, payload: &[u8]) -> bool {
        if payload.len() < 9 {
            return false;
        }
        if payload[0] != 0x00 || payload[1] != 0x00 || payload[2] != 0x01 {
            return false;
        }

        let stream_id = payload[3];
        let stream_type = if StreamId::is_video(stream_id) {
            StreamType::H264 as u8
        } else if StreamId::is_audio(stream_id) || StreamId::is_private_audio(stream_id) {
            StreamType::AacAdts as u8
        } else {
            return false;
        };

        tracing::debug!(pid, stream_id, stream_type, "auto-detected stream");

        let assembly = self.config.assembly;
        let program = self
            .programs
            .entry(SYNTHETIC_PROGRAM)
            .or_insert_with(|| Program::new(SYNTHETIC_PROGRAM, SYNTHETIC_PMT_PID));
        program
            .streams
            .entry(pid)
            .or_insert_with(|| Stream::new(pid, stream_type, assembly));
        true
    }

    fn handle_stream_payload(&mut self, pid: u16, pusi: bool, payload: &[u8]) {
        let now = self.clock.now();

        let mut units: Vec<AssembledUnit> = Vec::new();
        let mut audio_header: Option<PesHeader> = None;
        let mut pes_error = false;

        {
            let Some(stream) = Self::stream_mut(&mut self.programs, pid) else {
                return;
            };
            stream.packets_received += 1;

            if stream.is_video() {
                let outcome = stream.assembler.push(payload, pusi, now);
                if let Some(header) = &outcome.header {
                    let (pts, dts) = header.timestamps();
                    if pts != 0 || dts != 0 {
                        stream.last_pts = pts;
                        stream.last_dts = dts;
                    }
                }
                pes_error = outcome.error;
                units = outcome.units;
            } else if stream.is_audio() {
                if pusi {
                    match PesHeader::parse(payload) {
                        Ok(header) => {
                            let (pts, dts) = header.timestamps();
                            if pts != 0 || dts != 0 {
                                stream.last_pts = pts;
                                stream.last_dts = dts;
                            }
                            audio_header = Some(header);
                        }
                        Err(_) => pes_error = true,
                    }
                }
                // Audio continuations are not reassembled.
            }
        }

        if pes_error {
            self.counters.pes_errors += 1;
        }
        for unit in units {
            self.emit_video(pid, unit);
        }
        if let Some(header) = audio_header {
            if let Some(callback) = self.audio_callback.as_mut() {
                callback(pid, payload, &header);
            }
        }
    }

    fn emit_video(&mut self, pid: u16, unit: AssembledUnit) {
        // Some sources hand over AVCC already; everything else is Annex-B.
        let avcc = if avcc::looks_like_avcc(&unit.data) {
            unit.data
        } else {
            match avcc::annex_b_to_avcc(&unit.data) {
                Some(converted) => converted,
                None => {
                    tracing::warn!(pid, size = unit.data.len(), "unconvertible access unit");
                    self.counters.h264_errors += 1;
                    return;
                }
            }
        };

        let mut keyframe = unit.keyframe;
        let mut sps_nal: Option<Vec<u8>> = None;
        for nal in avcc::AvccUnits::new(&avcc) {
            let nal_type = nal[0] & 0x1F;
            if nal_type == 5 || nal_type == 7 {
                keyframe = true;
            }
            if nal_type == 7 {
                sps_nal = Some(nal.to_vec());
            }
        }
        if let Some(nal) = sps_nal {
            self.update_sps(&nal);
        }

        let (width, height, fps, frame_duration) = match &self.sps_cache {
            Some(sps) => (sps.width, sps.height, sps.fps, sps.frame_duration),
            None => (DEFAULT_WIDTH, DEFAULT_HEIGHT, DEFAULT_FPS, 1.0 / DEFAULT_FPS),
        };

        let now = self.clock.now();
        let (cts, dts) = self.normalizer.normalize(unit.pts, unit.dts, frame_duration, now);

        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let info = FrameInfo {
            sequence,
            is_keyframe: keyframe,
            cts,
            dts,
            duration: frame_duration,
            fps,
            width,
            height,
            time_scale: 90_000,
            size: (FrameInfo::ENCODED_LEN + avcc.len()) as u32,
        };
        let record = info.encode(&avcc);

        if let Some(sink) = self.sink.as_mut() {
            // The sink is the backpressure boundary; emitted frames are
            // never dropped.
            while sink.free_space() < record.len() {
                std::hint::spin_loop();
            }
            sink.write(&record);
        }

        self.counters.frames_emitted += 1;
        tracing::trace!(
            pid,
            sequence,
            keyframe,
            cts,
            size = avcc.len(),
            "access unit emitted"
        );

        if let Some(callback) = self.video_callback.as_mut() {
            let header = PesHeader::synthetic(StreamId::VIDEO_BASE, unit.pts, unit.dts);
            callback(pid, &avcc, &header);
        }
    }

    /// Update the cached SPS when an incoming type-7 NAL differs byte for
    /// byte from the cached copy. A parse failure keeps the prior cache.
    fn update_sps(&mut self, nal: &[u8]) {
        if let Some(cached) = &self.sps_cache {
            if cached.matches(nal) {
                return;
            }
        }

        match SpsInfo::parse(nal, &self.config.fps) {
            Ok(info) => {
                tracing::debug!(
                    width = info.width,
                    height = info.height,
                    fps = info.fps,
                    "SPS cache updated"
                );
                self.sps_cache = Some(info);
            }
            Err(err) => {
                tracing::warn!(%err, "SPS rejected, keeping cached copy");
                self.counters.sps_errors += 1;
            }
        }
    }
}

impl Default for TsDemuxer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_construction() {
        let demuxer = TsDemuxer::new();
        let stats = demuxer.stats();
        assert_eq!(stats.total_packets, 0);
        assert_eq!(stats.programs, 0);
        assert!(stats.sps.is_none());
    }

    #[test]
    fn test_empty_input() {
        let mut demuxer = TsDemuxer::new();
        assert!(!demuxer.demux(&[]));
    }

    #[test]
    fn test_garbage_only_input() {
        let mut demuxer = TsDemuxer::new();
        assert!(!demuxer.demux(&[0xABu8; 64]));
        assert_eq!(demuxer.stats().total_packets, 0);
    }
}
