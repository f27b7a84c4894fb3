//! Sequence Parameter Set (SPS) parsing.
//!
//! The SPS carries the coded picture dimensions and, through the optional
//! VUI section, the nominal frame timing. Both are needed to label emitted
//! access units, so the demuxer caches the most recent distinct SPS.

use hlsplay_core::bitstream::{remove_emulation_prevention, BitReader};
use hlsplay_core::error::{CodecError, Result};

use crate::nal::NalUnitType;

/// Profiles that carry the chroma/bit-depth extension block.
const HIGH_PROFILE_IDCS: [u8; 9] = [44, 83, 86, 100, 110, 118, 122, 128, 244];

/// Sequence Parameter Set fields needed for demuxing.
#[derive(Debug, Clone)]
pub struct SequenceParameterSet {
    /// Profile IDC.
    pub profile_idc: u8,
    /// Constraint set flags.
    pub constraint_set_flags: u8,
    /// Level IDC.
    pub level_idc: u8,
    /// SPS ID (0-31).
    pub sps_id: u8,
    /// Chroma format IDC (0=mono, 1=4:2:0, 2=4:2:2, 3=4:4:4).
    pub chroma_format_idc: u8,
    /// Picture width in macroblocks minus 1.
    pub pic_width_in_mbs_minus1: u32,
    /// Picture height in map units minus 1.
    pub pic_height_in_map_units_minus1: u32,
    /// Frame MBS only flag (zero means interlaced map units).
    pub frame_mbs_only_flag: bool,
    /// Frame cropping flag.
    pub frame_cropping_flag: bool,
    /// Frame crop left offset.
    pub frame_crop_left_offset: u32,
    /// Frame crop right offset.
    pub frame_crop_right_offset: u32,
    /// Frame crop top offset.
    pub frame_crop_top_offset: u32,
    /// Frame crop bottom offset.
    pub frame_crop_bottom_offset: u32,
    /// VUI parameters, when present.
    pub vui: Option<VuiParameters>,
}

impl SequenceParameterSet {
    /// Parse an SPS from RBSP data (NAL header byte already stripped,
    /// emulation prevention removed).
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = BitReader::new(data);
        Self::parse_from_reader(&mut reader)
    }

    /// Parse from a bit reader positioned at profile_idc.
    pub fn parse_from_reader(reader: &mut BitReader<'_>) -> Result<Self> {
        let profile_idc = reader.read_bits(8)? as u8;
        let constraint_set_flags = reader.read_bits(8)? as u8;
        let level_idc = reader.read_bits(8)? as u8;
        let sps_id = reader.read_ue()? as u8;

        if sps_id > 31 {
            return Err(CodecError::InvalidParameterSet(format!(
                "SPS ID {} out of range",
                sps_id
            ))
            .into());
        }

        let chroma_format_idc = if HIGH_PROFILE_IDCS.contains(&profile_idc) {
            let chroma_format_idc = reader.read_ue()? as u8;
            if chroma_format_idc == 3 {
                let _ = reader.read_bit()?; // separate_colour_plane_flag
            }

            let _ = reader.read_ue()?; // bit_depth_luma_minus8
            let _ = reader.read_ue()?; // bit_depth_chroma_minus8
            let _ = reader.read_bit()?; // qpprime_y_zero_transform_bypass_flag

            // seq_scaling_matrix_present_flag
            if reader.read_bit()? {
                let count = if chroma_format_idc != 3 { 8 } else { 12 };
                for i in 0..count {
                    if reader.read_bit()? {
                        let size = if i < 6 { 16 } else { 64 };
                        skip_scaling_list(reader, size)?;
                    }
                }
            }

            chroma_format_idc
        } else {
            1 // 4:2:0
        };

        let _ = reader.read_ue()?; // log2_max_frame_num_minus4
        let pic_order_cnt_type = reader.read_ue()?;

        match pic_order_cnt_type {
            0 => {
                let _ = reader.read_ue()?; // log2_max_pic_order_cnt_lsb_minus4
            }
            1 => {
                let _ = reader.read_bit()?; // delta_pic_order_always_zero_flag
                let _ = reader.read_se()?; // offset_for_non_ref_pic
                let _ = reader.read_se()?; // offset_for_top_to_bottom_field
                let num_ref_frames = reader.read_ue()?;
                if num_ref_frames > 255 {
                    return Err(CodecError::InvalidParameterSet(
                        "num_ref_frames_in_pic_order_cnt_cycle too large".into(),
                    )
                    .into());
                }
                for _ in 0..num_ref_frames {
                    let _ = reader.read_se()?; // offset_for_ref_frame
                }
            }
            _ => {}
        }

        let _ = reader.read_ue()?; // max_num_ref_frames
        let _ = reader.read_bit()?; // gaps_in_frame_num_value_allowed_flag

        let pic_width_in_mbs_minus1 = reader.read_ue()?;
        let pic_height_in_map_units_minus1 = reader.read_ue()?;
        let frame_mbs_only_flag = reader.read_bit()?;
        if !frame_mbs_only_flag {
            let _ = reader.read_bit()?; // mb_adaptive_frame_field_flag
        }
        let _ = reader.read_bit()?; // direct_8x8_inference_flag

        let (
            frame_cropping_flag,
            frame_crop_left_offset,
            frame_crop_right_offset,
            frame_crop_top_offset,
            frame_crop_bottom_offset,
        ) = if reader.read_bit()? {
            (
                true,
                reader.read_ue()?,
                reader.read_ue()?,
                reader.read_ue()?,
                reader.read_ue()?,
            )
        } else {
            (false, 0, 0, 0, 0)
        };

        let vui = if reader.read_bit()? {
            Some(VuiParameters::parse(reader)?)
        } else {
            None
        };

        Ok(Self {
            profile_idc,
            constraint_set_flags,
            level_idc,
            sps_id,
            chroma_format_idc,
            pic_width_in_mbs_minus1,
            pic_height_in_map_units_minus1,
            frame_mbs_only_flag,
            frame_cropping_flag,
            frame_crop_left_offset,
            frame_crop_right_offset,
            frame_crop_top_offset,
            frame_crop_bottom_offset,
            vui,
        })
    }

    /// Display width in pixels, cropping applied.
    ///
    /// Saturating arithmetic keeps malformed crop offsets from wrapping.
    pub fn width(&self) -> u32 {
        let raw = self
            .pic_width_in_mbs_minus1
            .saturating_add(1)
            .saturating_mul(16);
        if self.frame_cropping_flag {
            // Crop units assume 4:2:0 chroma.
            let crop = self
                .frame_crop_left_offset
                .saturating_add(self.frame_crop_right_offset)
                .saturating_mul(2);
            raw.saturating_sub(crop)
        } else {
            raw
        }
    }

    /// Display height in pixels, interlace doubling and cropping applied.
    pub fn height(&self) -> u32 {
        let mut raw = self
            .pic_height_in_map_units_minus1
            .saturating_add(1)
            .saturating_mul(16);
        if !self.frame_mbs_only_flag {
            raw = raw.saturating_mul(2);
        }
        if self.frame_cropping_flag {
            let crop_unit_y: u32 = if self.frame_mbs_only_flag { 2 } else { 4 };
            let crop = self
                .frame_crop_top_offset
                .saturating_add(self.frame_crop_bottom_offset)
                .saturating_mul(crop_unit_y);
            raw.saturating_sub(crop)
        } else {
            raw
        }
    }
}

/// VUI (Video Usability Information) timing fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct VuiParameters {
    /// Timing info present.
    pub timing_info_present_flag: bool,
    /// Number of time units per tick.
    pub num_units_in_tick: u32,
    /// Time scale in Hz.
    pub time_scale: u32,
    /// Fixed frame rate flag.
    pub fixed_frame_rate_flag: bool,
}

impl VuiParameters {
    /// Parse VUI parameters up to and including the timing information.
    ///
    /// Fields after the timing block are irrelevant here and left unread.
    pub fn parse(reader: &mut BitReader<'_>) -> Result<Self> {
        // aspect_ratio_info
        if reader.read_bit()? {
            let aspect_ratio_idc = reader.read_bits(8)? as u8;
            if aspect_ratio_idc == 255 {
                reader.skip(32)?; // sar_width + sar_height
            }
        }

        // overscan_info
        if reader.read_bit()? {
            let _ = reader.read_bit()?;
        }

        // video_signal_type
        if reader.read_bit()? {
            reader.skip(4)?; // video_format + video_full_range_flag
            if reader.read_bit()? {
                reader.skip(24)?; // colour primaries / transfer / matrix
            }
        }

        // chroma_loc_info
        if reader.read_bit()? {
            let _ = reader.read_ue()?;
            let _ = reader.read_ue()?;
        }

        let timing_info_present_flag = reader.read_bit()?;
        let (num_units_in_tick, time_scale, fixed_frame_rate_flag) = if timing_info_present_flag {
            let nuit = reader.read_bits(32)?;
            let ts = reader.read_bits(32)?;
            let ffrf = reader.read_bit()?;
            (nuit, ts, ffrf)
        } else {
            (0, 0, false)
        };

        Ok(Self {
            timing_info_present_flag,
            num_units_in_tick,
            time_scale,
            fixed_frame_rate_flag,
        })
    }
}

/// Skip a scaling list in the bitstream.
fn skip_scaling_list(reader: &mut BitReader<'_>, size: usize) -> Result<()> {
    let mut last_scale = 8i32;
    let mut next_scale = 8i32;

    for _ in 0..size {
        if next_scale != 0 {
            let delta_scale = reader.read_se()?;
            next_scale = (last_scale + delta_scale + 256) % 256;
        }
        last_scale = if next_scale == 0 { last_scale } else { next_scale };
    }

    Ok(())
}

/// Acceptance window for VUI-derived frame rates.
///
/// VUI timing is frequently mis-encoded in the wild; candidates outside the
/// window fall through to pattern defaults. The window is policy, not
/// format, and is adjustable for tests.
#[derive(Debug, Clone, Copy)]
pub struct FpsPolicy {
    /// Lowest accepted frame rate.
    pub min_fps: f64,
    /// Highest accepted frame rate.
    pub max_fps: f64,
}

impl Default for FpsPolicy {
    fn default() -> Self {
        Self {
            min_fps: 15.0,
            max_fps: 120.0,
        }
    }
}

impl FpsPolicy {
    fn accepts(&self, fps: f64) -> bool {
        fps >= self.min_fps && fps <= self.max_fps
    }

    /// Resolve a frame rate from VUI timing.
    ///
    /// Field timing (`time_scale / (2 * num_units_in_tick)`) is tried first,
    /// then frame timing, then defaults keyed on time_scale patterns seen in
    /// broken encoders: 16777216 and 90000 map to 30 and 29.97.
    pub fn resolve(&self, vui: Option<&VuiParameters>) -> f64 {
        let Some(vui) = vui else { return 30.0 };
        if !vui.timing_info_present_flag || vui.num_units_in_tick == 0 || vui.time_scale == 0 {
            return 30.0;
        }

        let half = vui.time_scale as f64 / (2.0 * vui.num_units_in_tick as f64);
        if self.accepts(half) {
            return half;
        }

        let full = vui.time_scale as f64 / vui.num_units_in_tick as f64;
        if self.accepts(full) {
            return full;
        }

        match vui.time_scale {
            16_777_216 => 30.0,
            90_000 => 30_000.0 / 1_001.0,
            _ => 30.0,
        }
    }
}

/// A parsed-and-resolved SPS as cached by the demuxer.
#[derive(Debug, Clone)]
pub struct SpsInfo {
    /// Display width in pixels.
    pub width: u32,
    /// Display height in pixels.
    pub height: u32,
    /// Profile IDC.
    pub profile: u8,
    /// Level IDC.
    pub level: u8,
    /// Resolved frame rate.
    pub fps: f64,
    /// Nominal frame duration in seconds.
    pub frame_duration: f64,
    /// Raw SPS NAL bytes (header byte included), for change detection.
    pub raw: Vec<u8>,
}

impl SpsInfo {
    /// Parse a complete SPS NAL unit (header byte included) into a resolved
    /// record.
    pub fn parse(nal: &[u8], policy: &FpsPolicy) -> Result<Self> {
        if nal.len() < 4 {
            return Err(CodecError::InvalidParameterSet("SPS NAL too short".into()).into());
        }
        if NalUnitType::from_u8(nal[0] & 0x1F) != NalUnitType::Sps {
            return Err(CodecError::InvalidParameterSet("not an SPS NAL".into()).into());
        }

        let rbsp = remove_emulation_prevention(&nal[1..]);
        let sps = SequenceParameterSet::parse(&rbsp)?;

        let fps = policy.resolve(sps.vui.as_ref());
        Ok(Self {
            width: sps.width(),
            height: sps.height(),
            profile: sps.profile_idc,
            level: sps.level_idc,
            fps,
            frame_duration: 1.0 / fps,
            raw: nal.to_vec(),
        })
    }

    /// Byte-wise comparison against a candidate SPS NAL.
    pub fn matches(&self, nal: &[u8]) -> bool {
        self.raw == nal
    }
}
