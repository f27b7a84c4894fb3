//! NAL (Network Abstraction Layer) unit enumeration.
//!
//! NAL units are the smallest syntactic unit of H.264 bitstreams. This
//! module scans Annex-B framed data (0x000001 / 0x00000001 start codes) and
//! classifies units without copying payload bytes.

use hlsplay_core::bitstream::find_start_code;

/// Maximum accepted size for a single NAL unit (1 MiB).
///
/// Larger units in a reassembled PES payload indicate corruption and are
/// skipped during scanning.
pub const MAX_NAL_UNIT_SIZE: usize = 1024 * 1024;

/// NAL unit type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NalUnitType {
    /// Non-IDR slice.
    Slice = 1,
    /// Slice data partition A.
    SliceDataA = 2,
    /// Slice data partition B.
    SliceDataB = 3,
    /// Slice data partition C.
    SliceDataC = 4,
    /// IDR slice.
    IdrSlice = 5,
    /// Supplemental enhancement information (SEI).
    Sei = 6,
    /// Sequence parameter set (SPS).
    Sps = 7,
    /// Picture parameter set (PPS).
    Pps = 8,
    /// Access unit delimiter.
    Aud = 9,
    /// End of sequence.
    EndOfSequence = 10,
    /// End of stream.
    EndOfStream = 11,
    /// Filler data.
    Filler = 12,
    /// Unknown or reserved type.
    Unknown(u8),
}

impl NalUnitType {
    /// Create from the low five bits of a NAL header byte.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Slice,
            2 => Self::SliceDataA,
            3 => Self::SliceDataB,
            4 => Self::SliceDataC,
            5 => Self::IdrSlice,
            6 => Self::Sei,
            7 => Self::Sps,
            8 => Self::Pps,
            9 => Self::Aud,
            10 => Self::EndOfSequence,
            11 => Self::EndOfStream,
            12 => Self::Filler,
            n => Self::Unknown(n),
        }
    }

    /// Get the raw value.
    pub fn to_u8(&self) -> u8 {
        match self {
            Self::Slice => 1,
            Self::SliceDataA => 2,
            Self::SliceDataB => 3,
            Self::SliceDataC => 4,
            Self::IdrSlice => 5,
            Self::Sei => 6,
            Self::Sps => 7,
            Self::Pps => 8,
            Self::Aud => 9,
            Self::EndOfSequence => 10,
            Self::EndOfStream => 11,
            Self::Filler => 12,
            Self::Unknown(n) => *n,
        }
    }

    /// Check if this is a VCL (Video Coding Layer) NAL unit.
    pub fn is_vcl(&self) -> bool {
        matches!(
            self,
            Self::Slice
                | Self::SliceDataA
                | Self::SliceDataB
                | Self::SliceDataC
                | Self::IdrSlice
        )
    }

    /// Check if this unit marks the containing access unit as a keyframe.
    pub fn marks_keyframe(&self) -> bool {
        matches!(self, Self::IdrSlice | Self::Sps)
    }
}

/// A NAL unit borrowed from an Annex-B buffer.
///
/// `data` includes the NAL header byte but not the start code.
#[derive(Debug, Clone, Copy)]
pub struct NalUnit<'a> {
    /// NAL unit type from the header byte.
    pub nal_type: NalUnitType,
    /// NAL unit bytes (header byte included, start code stripped).
    pub data: &'a [u8],
}

/// Iterator over the NAL units of an Annex-B byte stream.
///
/// Units with a forbidden type of zero, zero length, or a length above
/// [`MAX_NAL_UNIT_SIZE`] are skipped; scanning continues at the next start
/// code.
pub struct NalScanner<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> NalScanner<'a> {
    /// Create a scanner over an Annex-B buffer.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl<'a> Iterator for NalScanner<'a> {
    type Item = NalUnit<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.pos >= self.data.len() {
                return None;
            }

            let remaining = &self.data[self.pos..];
            let (offset, sc_len) = find_start_code(remaining)?;
            let nal_start = self.pos + offset + sc_len;

            if nal_start >= self.data.len() {
                self.pos = self.data.len();
                return None;
            }

            let nal_end = match find_start_code(&self.data[nal_start..]) {
                Some((next_offset, _)) => nal_start + next_offset,
                None => self.data.len(),
            };
            self.pos = nal_end;

            let nal = &self.data[nal_start..nal_end];
            if nal.is_empty() || nal.len() > MAX_NAL_UNIT_SIZE {
                continue;
            }

            let raw_type = nal[0] & 0x1F;
            if raw_type == 0 {
                continue;
            }

            return Some(NalUnit {
                nal_type: NalUnitType::from_u8(raw_type),
                data: nal,
            });
        }
    }
}

/// Summary of the NAL units present in one (candidate) access unit.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessUnitInfo {
    /// Number of valid NAL units found.
    pub nal_count: usize,
    /// Access unit delimiter present.
    pub has_aud: bool,
    /// Sequence parameter set present.
    pub has_sps: bool,
    /// Picture parameter set present.
    pub has_pps: bool,
    /// IDR slice present.
    pub has_idr: bool,
}

impl AccessUnitInfo {
    /// Scan an Annex-B buffer and summarize its NAL content.
    pub fn scan(data: &[u8]) -> Self {
        let mut info = Self::default();
        for nal in NalScanner::new(data) {
            info.nal_count += 1;
            match nal.nal_type {
                NalUnitType::Aud => info.has_aud = true,
                NalUnitType::Sps => info.has_sps = true,
                NalUnitType::Pps => info.has_pps = true,
                NalUnitType::IdrSlice => info.has_idr = true,
                _ => {}
            }
        }
        info
    }

    /// A keyframe access unit carrying its full parameter sets.
    pub fn is_complete_keyframe(&self) -> bool {
        self.has_aud && self.has_sps && self.has_pps && self.has_idr
    }

    /// Whether the unit can be emitted without waiting for continuations.
    ///
    /// MPEG-TS carries no access-unit end marker; a delimiter plus at least
    /// one further unit is taken as a complete non-keyframe. This can accept
    /// a truncated slice when the following packets were lost.
    pub fn is_complete(&self) -> bool {
        self.is_complete_keyframe() || (self.has_aud && self.nal_count >= 2)
    }

    /// Keyframe classification: IDR slice or SPS present.
    pub fn is_keyframe(&self) -> bool {
        self.has_idr || self.has_sps
    }
}
