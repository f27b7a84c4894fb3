//! PES (Packetized Elementary Stream) header parsing.
//!
//! PES packets carry the codec payload with timing. The demuxer only ever
//! reads PES data; the single write path in this module is the timestamp
//! encoder, kept alongside its parser so the 33-bit interleaved layout is
//! covered from both directions by the tests.

use crate::error::{Result, TsError};

/// PES start code prefix.
pub const PES_START_CODE_PREFIX: [u8; 3] = [0x00, 0x00, 0x01];

/// PES stream ID classification helpers.
#[derive(Debug, Clone, Copy)]
pub struct StreamId;

impl StreamId {
    /// Private stream 1, used by some encoders for audio.
    pub const PRIVATE_STREAM_1: u8 = 0xBD;
    /// First video stream ID.
    pub const VIDEO_BASE: u8 = 0xE0;
    /// First audio stream ID.
    pub const AUDIO_BASE: u8 = 0xC0;

    /// Check if stream ID is audio (0xC0-0xDF).
    pub fn is_audio(id: u8) -> bool {
        (0xC0..=0xDF).contains(&id)
    }

    /// Check if stream ID is video (0xE0-0xEF).
    pub fn is_video(id: u8) -> bool {
        (0xE0..=0xEF).contains(&id)
    }

    /// Check if stream ID is the private-1 stream carrying audio.
    pub fn is_private_audio(id: u8) -> bool {
        id == Self::PRIVATE_STREAM_1
    }

    /// Check if the stream ID carries the optional PES header with PTS/DTS.
    pub fn has_optional_header(id: u8) -> bool {
        !matches!(id, 0xBC | 0xBE | 0xBF | 0xF0 | 0xF1 | 0xF2 | 0xF8 | 0xFF)
    }
}

/// A 33-bit PES timestamp at 90 kHz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PesTimestamp {
    /// Timestamp value, masked to 33 bits.
    pub value: u64,
}

impl PesTimestamp {
    /// Maximum value for a 33-bit timestamp.
    pub const MAX_VALUE: u64 = (1u64 << 33) - 1;

    /// Clock rate (90 kHz).
    pub const CLOCK_RATE: u64 = 90_000;

    /// Create a new PES timestamp.
    pub fn new(value: u64) -> Self {
        Self {
            value: value & Self::MAX_VALUE,
        }
    }

    /// Convert to seconds.
    pub fn to_seconds(&self) -> f64 {
        self.value as f64 / Self::CLOCK_RATE as f64
    }

    /// Parse a PTS/DTS from 5 bytes.
    ///
    /// Layout: prefix nibble, ts[32:30], marker, ts[29:15], marker,
    /// ts[14:0], marker. Marker bits are not validated.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 5 {
            return Err(TsError::invalid_pes("Timestamp requires 5 bytes"));
        }

        let value = ((data[0] as u64 & 0x0E) << 29)
            | ((data[1] as u64) << 22)
            | ((data[2] as u64 & 0xFE) << 14)
            | ((data[3] as u64) << 7)
            | ((data[4] as u64) >> 1);

        Ok(Self::new(value))
    }

    /// Write a PTS/DTS to 5 bytes with the given prefix nibble
    /// (0x20 = PTS only, 0x30 = PTS with DTS following, 0x10 = DTS).
    pub fn write(&self, data: &mut [u8], prefix: u8) -> Result<()> {
        if data.len() < 5 {
            return Err(TsError::invalid_pes("Timestamp requires 5 bytes"));
        }

        data[0] = prefix | ((((self.value >> 30) as u8) & 0x07) << 1) | 0x01;
        data[1] = ((self.value >> 22) & 0xFF) as u8;
        data[2] = (((self.value >> 15) & 0x7F) << 1) as u8 | 0x01;
        data[3] = ((self.value >> 7) & 0xFF) as u8;
        data[4] = ((self.value & 0x7F) << 1) as u8 | 0x01;

        Ok(())
    }
}

/// PES optional header flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct PesFlags {
    /// PES scrambling control.
    pub scrambling_control: u8,
    /// PES priority.
    pub priority: bool,
    /// Data alignment indicator.
    pub data_alignment: bool,
    /// Copyright.
    pub copyright: bool,
    /// Original or copy.
    pub original: bool,
    /// PTS/DTS flags (0b00 = none, 0b10 = PTS only, 0b11 = PTS+DTS).
    pub pts_dts_flags: u8,
    /// ESCR flag.
    pub escr_flag: bool,
    /// ES rate flag.
    pub es_rate_flag: bool,
    /// DSM trick mode flag.
    pub dsm_trick_mode_flag: bool,
    /// Additional copy info flag.
    pub additional_copy_info_flag: bool,
    /// PES CRC flag.
    pub pes_crc_flag: bool,
    /// PES extension flag.
    pub pes_extension_flag: bool,
    /// PES header data length.
    pub header_data_length: u8,
}

impl PesFlags {
    /// Parse the two flag bytes plus the header data length byte.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 3 {
            return Err(TsError::invalid_pes(
                "Need at least 3 bytes for PES optional header",
            ));
        }

        let byte0 = data[0];
        let byte1 = data[1];

        Ok(Self {
            scrambling_control: (byte0 >> 4) & 0x03,
            priority: (byte0 & 0x08) != 0,
            data_alignment: (byte0 & 0x04) != 0,
            copyright: (byte0 & 0x02) != 0,
            original: (byte0 & 0x01) != 0,
            pts_dts_flags: (byte1 >> 6) & 0x03,
            escr_flag: (byte1 & 0x20) != 0,
            es_rate_flag: (byte1 & 0x10) != 0,
            dsm_trick_mode_flag: (byte1 & 0x08) != 0,
            additional_copy_info_flag: (byte1 & 0x04) != 0,
            pes_crc_flag: (byte1 & 0x02) != 0,
            pes_extension_flag: (byte1 & 0x01) != 0,
            header_data_length: data[2],
        })
    }

    /// Check if PTS is present.
    pub fn has_pts(&self) -> bool {
        self.pts_dts_flags & 0x02 != 0
    }

    /// Check if DTS is present.
    pub fn has_dts(&self) -> bool {
        self.pts_dts_flags == 0x03
    }
}

/// Parsed PES packet header.
#[derive(Debug, Clone)]
pub struct PesHeader {
    /// Stream ID.
    pub stream_id: u8,
    /// PES packet length (0 means unbounded, standard for video).
    pub packet_length: u16,
    /// Optional header flags.
    pub flags: Option<PesFlags>,
    /// Presentation timestamp.
    pub pts: Option<PesTimestamp>,
    /// Decode timestamp.
    pub dts: Option<PesTimestamp>,
    /// Total header size (start code through header data).
    pub header_size: usize,
}

impl PesHeader {
    /// Minimum PES header size (start code + stream_id + length).
    pub const MIN_SIZE: usize = 6;

    /// Parse a PES header from the start of a PES packet.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::MIN_SIZE {
            return Err(TsError::invalid_pes("Data too short for PES header"));
        }

        if data[0..3] != PES_START_CODE_PREFIX {
            return Err(TsError::invalid_pes("Invalid PES start code prefix"));
        }

        let stream_id = data[3];
        let packet_length = ((data[4] as u16) << 8) | (data[5] as u16);

        if !StreamId::has_optional_header(stream_id) {
            return Ok(Self {
                stream_id,
                packet_length,
                flags: None,
                pts: None,
                dts: None,
                header_size: Self::MIN_SIZE,
            });
        }

        if data.len() < 9 {
            return Err(TsError::invalid_pes("Data too short for PES optional header"));
        }

        let flags = PesFlags::parse(&data[6..9])?;
        let header_size = 9 + flags.header_data_length as usize;

        let mut pts = None;
        let mut dts = None;
        let mut offset = 9;

        if flags.has_pts() {
            if offset + 5 > data.len() {
                return Err(TsError::invalid_pes("Truncated PTS"));
            }
            pts = Some(PesTimestamp::parse(&data[offset..offset + 5])?);
            offset += 5;

            if flags.has_dts() {
                if offset + 5 > data.len() {
                    return Err(TsError::invalid_pes("Truncated DTS"));
                }
                dts = Some(PesTimestamp::parse(&data[offset..offset + 5])?);
            }
        }

        Ok(Self {
            stream_id,
            packet_length,
            flags: Some(flags),
            pts,
            dts,
            header_size,
        })
    }

    /// Build a header record for observer callbacks on reassembled units,
    /// where the original header bytes are gone.
    pub fn synthetic(stream_id: u8, pts: u64, dts: u64) -> Self {
        Self {
            stream_id,
            packet_length: 0,
            flags: None,
            pts: Some(PesTimestamp::new(pts)),
            dts: Some(PesTimestamp::new(dts)),
            header_size: Self::MIN_SIZE,
        }
    }

    /// Check if this is a video stream.
    pub fn is_video(&self) -> bool {
        StreamId::is_video(self.stream_id)
    }

    /// Check if this is an audio stream.
    pub fn is_audio(&self) -> bool {
        StreamId::is_audio(self.stream_id) || StreamId::is_private_audio(self.stream_id)
    }

    /// Offset of the elementary stream data within the PES packet.
    pub fn payload_offset(&self) -> usize {
        self.header_size
    }

    /// Effective raw (PTS, DTS) pair.
    ///
    /// Without a DTS the PTS doubles as decode time; without either, both
    /// are zero and frame-based fallback timing applies downstream.
    pub fn timestamps(&self) -> (u64, u64) {
        match (self.pts, self.dts) {
            (Some(pts), Some(dts)) => (pts.value, dts.value),
            (Some(pts), None) => (pts.value, pts.value),
            _ => (0, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_header(stream_id: u8, pts: Option<u64>, dts: Option<u64>) -> Vec<u8> {
        let mut data = PES_START_CODE_PREFIX.to_vec();
        data.push(stream_id);
        data.extend_from_slice(&[0x00, 0x00]); // unbounded

        let pts_dts_flags: u8 = match (pts.is_some(), dts.is_some()) {
            (true, true) => 0b11,
            (true, false) => 0b10,
            _ => 0b00,
        };
        let header_data_length = match pts_dts_flags {
            0b11 => 10,
            0b10 => 5,
            _ => 0,
        };
        data.push(0x80);
        data.push(pts_dts_flags << 6);
        data.push(header_data_length);

        if let Some(pts) = pts {
            let mut bytes = [0u8; 5];
            let prefix = if dts.is_some() { 0x30 } else { 0x20 };
            PesTimestamp::new(pts).write(&mut bytes, prefix).unwrap();
            data.extend_from_slice(&bytes);
        }
        if let Some(dts) = dts {
            let mut bytes = [0u8; 5];
            PesTimestamp::new(dts).write(&mut bytes, 0x10).unwrap();
            data.extend_from_slice(&bytes);
        }
        data
    }

    #[test]
    fn test_timestamp_roundtrip() {
        for value in [0u64, 90_000, 8_589_934_591, (1 << 33) - 90_000] {
            let ts = PesTimestamp::new(value);
            let mut bytes = [0u8; 5];
            ts.write(&mut bytes, 0x20).unwrap();
            assert_eq!(PesTimestamp::parse(&bytes).unwrap().value, value);
        }
    }

    #[test]
    fn test_timestamp_masks_to_33_bits() {
        let ts = PesTimestamp::new(1 << 34);
        assert_eq!(ts.value, 0);
    }

    #[test]
    fn test_header_pts_only() {
        let data = build_header(0xE0, Some(900_000), None);
        let header = PesHeader::parse(&data).unwrap();

        assert_eq!(header.stream_id, 0xE0);
        assert!(header.is_video());
        assert_eq!(header.pts.unwrap().value, 900_000);
        assert!(header.dts.is_none());
        assert_eq!(header.timestamps(), (900_000, 900_000));
        assert_eq!(header.payload_offset(), 9 + 5);
    }

    #[test]
    fn test_header_pts_and_dts() {
        let data = build_header(0xE0, Some(93_000), Some(90_000));
        let header = PesHeader::parse(&data).unwrap();

        assert_eq!(header.timestamps(), (93_000, 90_000));
        assert_eq!(header.payload_offset(), 9 + 10);
    }

    #[test]
    fn test_header_no_timestamps() {
        let data = build_header(0xC0, None, None);
        let header = PesHeader::parse(&data).unwrap();

        assert!(header.is_audio());
        assert_eq!(header.timestamps(), (0, 0));
        assert_eq!(header.payload_offset(), 9);
    }

    #[test]
    fn test_bad_prefix_rejected() {
        let data = [0x00, 0x00, 0x02, 0xE0, 0x00, 0x00, 0x80, 0x00, 0x00];
        assert!(PesHeader::parse(&data).is_err());
    }

    #[test]
    fn test_truncated_pts_rejected() {
        let mut data = build_header(0xE0, Some(900_000), None);
        data.truncate(11);
        assert!(PesHeader::parse(&data).is_err());
    }

    #[test]
    fn test_stream_id_ranges() {
        assert!(StreamId::is_video(0xE0));
        assert!(StreamId::is_video(0xEF));
        assert!(!StreamId::is_video(0xC0));

        assert!(StreamId::is_audio(0xC0));
        assert!(StreamId::is_audio(0xDF));
        assert!(!StreamId::is_audio(0xE0));

        assert!(StreamId::is_private_audio(0xBD));
        assert!(StreamId::has_optional_header(0xBD));
        assert!(!StreamId::has_optional_header(0xBE));
    }
}
