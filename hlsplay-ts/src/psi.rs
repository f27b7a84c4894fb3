//! Program Specific Information (PSI) tables.
//!
//! PAT and PMT parsing from the payload of a payload-unit-start packet.
//! Both tables share the section framing: a pointer field, a table ID, a
//! 12-bit section length bounding the body, and four trailing CRC bytes.
//! The CRC is carried but not validated; a segmented-delivery demuxer
//! gains nothing from rejecting a table the mux already committed to.

use crate::error::{Result, TsError};

/// MPEG-TS stream types recognized by the demuxer.
///
/// Other values are accepted from the PMT but flagged unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StreamType {
    /// MPEG-1 Video.
    Mpeg1Video = 0x01,
    /// MPEG-2 Video.
    Mpeg2Video = 0x02,
    /// MPEG-1 Audio.
    Mpeg1Audio = 0x03,
    /// MPEG-2 Audio.
    Mpeg2Audio = 0x04,
    /// Private PES data.
    PrivateData = 0x06,
    /// AAC ADTS.
    AacAdts = 0x0F,
    /// MPEG-4 Visual.
    Mpeg4Visual = 0x10,
    /// AAC LATM.
    AacLatm = 0x11,
    /// H.264/AVC video.
    H264 = 0x1B,
    /// H.265/HEVC video.
    H265 = 0x24,
    /// CAVS video.
    Cavs = 0x42,
    /// Dirac video.
    Dirac = 0xD1,
    /// VC-1 video.
    Vc1 = 0xEA,
}

impl StreamType {
    /// Create from raw value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(StreamType::Mpeg1Video),
            0x02 => Some(StreamType::Mpeg2Video),
            0x03 => Some(StreamType::Mpeg1Audio),
            0x04 => Some(StreamType::Mpeg2Audio),
            0x06 => Some(StreamType::PrivateData),
            0x0F => Some(StreamType::AacAdts),
            0x10 => Some(StreamType::Mpeg4Visual),
            0x11 => Some(StreamType::AacLatm),
            0x1B => Some(StreamType::H264),
            0x24 => Some(StreamType::H265),
            0x42 => Some(StreamType::Cavs),
            0xD1 => Some(StreamType::Dirac),
            0xEA => Some(StreamType::Vc1),
            _ => None,
        }
    }

    /// Check if this is a video stream type.
    pub fn is_video(&self) -> bool {
        matches!(
            self,
            StreamType::Mpeg1Video
                | StreamType::Mpeg2Video
                | StreamType::Mpeg4Visual
                | StreamType::H264
                | StreamType::H265
                | StreamType::Cavs
                | StreamType::Dirac
                | StreamType::Vc1
        )
    }

    /// Check if this is an audio stream type.
    pub fn is_audio(&self) -> bool {
        matches!(
            self,
            StreamType::Mpeg1Audio
                | StreamType::Mpeg2Audio
                | StreamType::AacAdts
                | StreamType::AacLatm
        )
    }

    /// Human-readable codec name for logs and stats.
    pub fn name(&self) -> &'static str {
        match self {
            StreamType::Mpeg1Video => "MPEG-1 Video",
            StreamType::Mpeg2Video => "MPEG-2 Video",
            StreamType::Mpeg1Audio => "MPEG-1 Audio",
            StreamType::Mpeg2Audio => "MPEG-2 Audio",
            StreamType::PrivateData => "Private PES",
            StreamType::AacAdts => "AAC Audio",
            StreamType::Mpeg4Visual => "MPEG-4 Video",
            StreamType::AacLatm => "AAC-LATM Audio",
            StreamType::H264 => "H.264 Video",
            StreamType::H265 => "HEVC Video",
            StreamType::Cavs => "CAVS Video",
            StreamType::Dirac => "Dirac Video",
            StreamType::Vc1 => "VC-1 Video",
        }
    }
}

/// Skip the pointer field at the start of a PUS payload, check the table
/// ID and bounds-check the section framing. Returns the section bytes,
/// CRC included.
fn section_bytes<'a>(
    payload: &'a [u8],
    expected_table_id: u8,
    make_err: fn(String) -> TsError,
) -> std::result::Result<&'a [u8], TsError> {
    if payload.is_empty() {
        return Err(make_err("empty payload".to_string()));
    }

    let pointer = payload[0] as usize;
    let start = 1 + pointer;
    if start >= payload.len() {
        return Err(make_err(format!("pointer field {} exceeds payload", pointer)));
    }

    let section = &payload[start..];
    if section.len() < 8 {
        return Err(make_err("section too short".to_string()));
    }

    if section[0] != expected_table_id {
        return Err(make_err(format!(
            "table ID 0x{:02X}, expected 0x{:02X}",
            section[0], expected_table_id
        )));
    }

    let section_length = (((section[1] & 0x0F) as usize) << 8) | section[2] as usize;
    if 3 + section_length > section.len() {
        return Err(make_err(format!(
            "section length {} exceeds payload",
            section_length
        )));
    }
    if section_length < 9 {
        return Err(make_err(format!("section length {} too short", section_length)));
    }

    Ok(&section[..3 + section_length])
}

/// Program entry in PAT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatEntry {
    /// Program number.
    pub program_number: u16,
    /// PID of this program's PMT.
    pub pmt_pid: u16,
}

/// Program Association Table.
#[derive(Debug, Clone)]
pub struct Pat {
    /// Transport stream ID.
    pub transport_stream_id: u16,
    /// Version number.
    pub version_number: u8,
    /// Current/next indicator; tables with it unset describe the future
    /// and are ignored.
    pub current_next: bool,
    /// Program entries. The network PID entry (program 0) is not included.
    pub programs: Vec<PatEntry>,
}

impl Pat {
    /// PAT table ID.
    pub const TABLE_ID: u8 = 0x00;

    /// Parse a PAT from a payload-unit-start payload (pointer field first).
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let section = section_bytes(payload, Self::TABLE_ID, TsError::InvalidPat)?;

        let transport_stream_id = ((section[3] as u16) << 8) | section[4] as u16;
        let version_number = (section[5] >> 1) & 0x1F;
        let current_next = (section[5] & 0x01) != 0;

        // Entries run from after the header to before the CRC.
        let entries_end = section.len() - 4;
        let mut programs = Vec::new();
        let mut offset = 8;
        while offset + 4 <= entries_end {
            let program_number = ((section[offset] as u16) << 8) | section[offset + 1] as u16;
            let pmt_pid =
                ((section[offset + 2] as u16 & 0x1F) << 8) | section[offset + 3] as u16;

            // Program 0 maps the network PID, which this demuxer ignores.
            if program_number != 0 {
                programs.push(PatEntry {
                    program_number,
                    pmt_pid,
                });
            }
            offset += 4;
        }

        Ok(Self {
            transport_stream_id,
            version_number,
            current_next,
            programs,
        })
    }
}

/// Elementary stream entry in PMT.
#[derive(Debug, Clone)]
pub struct PmtStream {
    /// Raw stream type.
    pub stream_type: u8,
    /// Elementary stream PID.
    pub pid: u16,
}

impl PmtStream {
    /// Recognized stream type, if any.
    pub fn kind(&self) -> Option<StreamType> {
        StreamType::from_u8(self.stream_type)
    }

    /// Check if this is a video stream.
    pub fn is_video(&self) -> bool {
        self.kind().map(|st| st.is_video()).unwrap_or(false)
    }

    /// Check if this is an audio stream.
    pub fn is_audio(&self) -> bool {
        self.kind().map(|st| st.is_audio()).unwrap_or(false)
    }
}

/// Program Map Table.
#[derive(Debug, Clone)]
pub struct Pmt {
    /// Program number.
    pub program_number: u16,
    /// Version number.
    pub version_number: u8,
    /// Current/next indicator.
    pub current_next: bool,
    /// PCR PID.
    pub pcr_pid: u16,
    /// Elementary streams.
    pub streams: Vec<PmtStream>,
}

impl Pmt {
    /// PMT table ID.
    pub const TABLE_ID: u8 = 0x02;

    /// Parse a PMT from a payload-unit-start payload (pointer field first).
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let section = section_bytes(payload, Self::TABLE_ID, TsError::InvalidPmt)?;

        if section.len() < 16 {
            return Err(TsError::invalid_pmt("PMT too short"));
        }

        let program_number = ((section[3] as u16) << 8) | section[4] as u16;
        let version_number = (section[5] >> 1) & 0x1F;
        let current_next = (section[5] & 0x01) != 0;
        let pcr_pid = ((section[8] as u16 & 0x1F) << 8) | section[9] as u16;
        let program_info_length =
            (((section[10] & 0x0F) as usize) << 8) | section[11] as usize;

        let entries_end = section.len() - 4;
        let mut offset = 12 + program_info_length;
        if offset > entries_end {
            return Err(TsError::invalid_pmt("program info exceeds section"));
        }

        let mut streams = Vec::new();
        while offset + 5 <= entries_end {
            let stream_type = section[offset];
            let pid = ((section[offset + 1] as u16 & 0x1F) << 8) | section[offset + 2] as u16;
            let es_info_length =
                (((section[offset + 3] & 0x0F) as usize) << 8) | section[offset + 4] as usize;

            streams.push(PmtStream { stream_type, pid });

            offset += 5 + es_info_length;
        }

        Ok(Self {
            program_number,
            version_number,
            current_next,
            pcr_pid,
            streams,
        })
    }

    /// Get stream entry by PID.
    pub fn get_stream(&self, pid: u16) -> Option<&PmtStream> {
        self.streams.iter().find(|s| s.pid == pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a PAT payload: pointer field, section header, entries, and
    /// four placeholder CRC bytes (the parser does not validate them).
    fn build_pat(programs: &[(u16, u16)]) -> Vec<u8> {
        let section_length = 5 + programs.len() * 4 + 4;
        let mut p = vec![0x00]; // pointer field
        p.push(Pat::TABLE_ID);
        p.push(0xB0 | ((section_length >> 8) as u8 & 0x0F));
        p.push((section_length & 0xFF) as u8);
        p.extend_from_slice(&[0x00, 0x01]); // transport_stream_id
        p.push(0xC1); // version 0, current
        p.extend_from_slice(&[0x00, 0x00]); // section 0 of 0
        for &(number, pid) in programs {
            p.push((number >> 8) as u8);
            p.push((number & 0xFF) as u8);
            p.push(0xE0 | ((pid >> 8) as u8 & 0x1F));
            p.push((pid & 0xFF) as u8);
        }
        p.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]); // CRC, unchecked
        p
    }

    /// Build a PMT payload for one program.
    fn build_pmt(program: u16, pcr_pid: u16, streams: &[(u8, u16)]) -> Vec<u8> {
        let section_length = 9 + streams.len() * 5 + 4;
        let mut p = vec![0x00]; // pointer field
        p.push(Pmt::TABLE_ID);
        p.push(0xB0 | ((section_length >> 8) as u8 & 0x0F));
        p.push((section_length & 0xFF) as u8);
        p.push((program >> 8) as u8);
        p.push((program & 0xFF) as u8);
        p.push(0xC1);
        p.extend_from_slice(&[0x00, 0x00]);
        p.push(0xE0 | ((pcr_pid >> 8) as u8 & 0x1F));
        p.push((pcr_pid & 0xFF) as u8);
        p.extend_from_slice(&[0xF0, 0x00]); // program_info_length 0
        for &(stream_type, pid) in streams {
            p.push(stream_type);
            p.push(0xE0 | ((pid >> 8) as u8 & 0x1F));
            p.push((pid & 0xFF) as u8);
            p.extend_from_slice(&[0xF0, 0x00]); // es_info_length 0
        }
        p.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        p
    }

    #[test]
    fn test_pat_parse() {
        let payload = build_pat(&[(1, 0x1000), (2, 0x1010)]);
        let pat = Pat::parse(&payload).unwrap();

        assert_eq!(pat.transport_stream_id, 1);
        assert!(pat.current_next);
        assert_eq!(pat.programs.len(), 2);
        assert_eq!(
            pat.programs[0],
            PatEntry {
                program_number: 1,
                pmt_pid: 0x1000
            }
        );
    }

    #[test]
    fn test_pat_skips_network_pid() {
        let payload = build_pat(&[(0, 0x0010), (1, 0x1000)]);
        let pat = Pat::parse(&payload).unwrap();

        assert_eq!(pat.programs.len(), 1);
        assert_eq!(pat.programs[0].program_number, 1);
    }

    #[test]
    fn test_pat_with_stuffed_pointer() {
        let mut payload = build_pat(&[(1, 0x1000)]);
        // Rebuild with a 3-byte pointer field.
        payload[0] = 3;
        payload.splice(1..1, [0xFF, 0xFF, 0xFF]);

        let pat = Pat::parse(&payload).unwrap();
        assert_eq!(pat.programs.len(), 1);
    }

    #[test]
    fn test_pat_bad_table_id() {
        let mut payload = build_pat(&[(1, 0x1000)]);
        payload[1] = 0x02;
        assert!(matches!(Pat::parse(&payload), Err(TsError::InvalidPat(_))));
    }

    #[test]
    fn test_pat_section_length_beyond_payload() {
        let mut payload = build_pat(&[(1, 0x1000)]);
        payload[3] = 0xF0; // absurd section length
        assert!(Pat::parse(&payload).is_err());
    }

    #[test]
    fn test_pmt_parse() {
        let payload = build_pmt(1, 0x0100, &[(0x1B, 0x0100), (0x0F, 0x0101)]);
        let pmt = Pmt::parse(&payload).unwrap();

        assert_eq!(pmt.program_number, 1);
        assert_eq!(pmt.pcr_pid, 0x0100);
        assert_eq!(pmt.streams.len(), 2);
        assert!(pmt.streams[0].is_video());
        assert!(pmt.streams[1].is_audio());
        assert!(pmt.get_stream(0x0101).is_some());
        assert!(pmt.get_stream(0x0999).is_none());
    }

    #[test]
    fn test_pmt_skips_es_descriptors() {
        let mut payload = build_pmt(1, 0x0100, &[(0x1B, 0x0100)]);
        // Rewrite the single stream entry to carry 4 descriptor bytes.
        let section_length = 9 + 5 + 4 + 4;
        payload[3] = (section_length & 0xFF) as u8;
        let entry_at = 1 + 12; // pointer + fixed part
        payload[entry_at + 4] = 0x04; // es_info_length low byte
        payload.splice(entry_at + 5..entry_at + 5, [0x0A, 0x02, 0x65, 0x6E]);

        let pmt = Pmt::parse(&payload).unwrap();
        assert_eq!(pmt.streams.len(), 1);
        assert_eq!(pmt.streams[0].pid, 0x0100);
    }

    #[test]
    fn test_pmt_unknown_stream_type_kept() {
        let payload = build_pmt(1, 0x0100, &[(0x99, 0x0200)]);
        let pmt = Pmt::parse(&payload).unwrap();

        assert_eq!(pmt.streams[0].stream_type, 0x99);
        assert!(pmt.streams[0].kind().is_none());
        assert!(!pmt.streams[0].is_video());
        assert!(!pmt.streams[0].is_audio());
    }

    #[test]
    fn test_stream_type_classify() {
        assert!(StreamType::H264.is_video());
        assert!(StreamType::H265.is_video());
        assert!(!StreamType::H264.is_audio());
        assert!(StreamType::AacAdts.is_audio());
        assert!(StreamType::AacLatm.is_audio());
        assert!(!StreamType::PrivateData.is_video());
        assert_eq!(StreamType::H264.name(), "H.264 Video");
        assert_eq!(StreamType::from_u8(0x1B), Some(StreamType::H264));
        assert_eq!(StreamType::from_u8(0x99), None);
    }
}
