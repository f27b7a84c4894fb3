//! Timestamp normalization.
//!
//! Raw PES timestamps are 33-bit 90 kHz values with no defined origin; they
//! wrap roughly every 26.5 hours and jump arbitrarily at segment
//! boundaries. The normalizer rebases them to seconds from the first frame,
//! carries wraparound offsets, and falls back to frame counting when the
//! clock misbehaves.

/// 33-bit timestamp wrap period.
const WRAP_PERIOD: u64 = 1 << 33;

/// A backwards step larger than this is a wrap, not a reordering.
const WRAP_DETECT: u64 = 1 << 31;

/// Normalizes raw PTS/DTS pairs into presentation seconds.
#[derive(Debug, Clone, Default)]
pub struct TimestampNormalizer {
    initialized: bool,
    base_pts: u64,
    base_dts: u64,
    base_time: f64,
    frame_counter: u32,
    last_pts: u64,
    last_dts: u64,
    pts_wrap_offset: u64,
    dts_wrap_offset: u64,
}

impl TimestampNormalizer {
    /// Create an uninitialized normalizer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a baseline has been captured.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Frames normalized since the baseline.
    pub fn frame_counter(&self) -> u32 {
        self.frame_counter
    }

    /// Drop all state. The next timestamps re-seed the baseline.
    pub fn reset(&mut self) {
        if self.initialized {
            tracing::debug!("timestamp normalizer reset");
        }
        *self = Self::default();
    }

    /// Normalize a raw (PTS, DTS) pair into (cts, dts) seconds.
    ///
    /// `frame_duration` feeds the frame-counter fallback used when the raw
    /// PTS is zero or the rebased result runs negative; `now` seeds the
    /// baseline wall-clock capture on the first call.
    pub fn normalize(
        &mut self,
        raw_pts: u64,
        raw_dts: u64,
        frame_duration: f64,
        now: f64,
    ) -> (f64, f64) {
        if !self.initialized {
            self.base_pts = raw_pts;
            self.base_dts = raw_dts;
            self.base_time = now;
            self.last_pts = raw_pts;
            self.last_dts = raw_dts;
            self.frame_counter = 1;
            self.initialized = true;
            return (0.0, 0.0);
        }

        let adjusted_pts = if raw_pts != 0 {
            if raw_pts < self.last_pts && self.last_pts - raw_pts > WRAP_DETECT {
                self.pts_wrap_offset += WRAP_PERIOD;
                tracing::debug!(
                    last = self.last_pts,
                    current = raw_pts,
                    offset = self.pts_wrap_offset,
                    "PTS wraparound"
                );
            }
            self.last_pts = raw_pts;
            raw_pts + self.pts_wrap_offset
        } else {
            0
        };

        let adjusted_dts = if raw_dts != 0 {
            if raw_dts < self.last_dts && self.last_dts - raw_dts > WRAP_DETECT {
                self.dts_wrap_offset += WRAP_PERIOD;
                tracing::debug!(
                    last = self.last_dts,
                    current = raw_dts,
                    offset = self.dts_wrap_offset,
                    "DTS wraparound"
                );
            }
            self.last_dts = raw_dts;
            raw_dts + self.dts_wrap_offset
        } else {
            0
        };

        let mut cts = if adjusted_pts != 0 {
            (adjusted_pts as i64 - self.base_pts as i64) as f64 / 90_000.0
        } else {
            self.frame_counter as f64 * frame_duration
        };

        let mut dts = if adjusted_dts != 0 {
            (adjusted_dts as i64 - self.base_dts as i64) as f64 / 90_000.0
        } else {
            cts
        };

        // A backwards clock inside the wrap-detect window means a segment
        // discontinuity the caller did not flag; frame timing takes over.
        if cts < 0.0 {
            tracing::warn!(cts, "negative normalized timestamp, frame fallback");
            cts = self.frame_counter as f64 * frame_duration;
            dts = cts;
        }
        if dts < 0.0 {
            dts = cts;
        }

        self.frame_counter += 1;
        (cts, dts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FD: f64 = 1.0 / 30.0;

    #[test]
    fn test_first_pair_is_zero() {
        let mut n = TimestampNormalizer::new();
        assert_eq!(n.normalize(900_000, 900_000, FD, 10.0), (0.0, 0.0));
        assert!(n.is_initialized());
    }

    #[test]
    fn test_linear_progression() {
        let mut n = TimestampNormalizer::new();
        n.normalize(900_000, 900_000, FD, 0.0);

        let (cts, dts) = n.normalize(903_000, 903_000, FD, 0.1);
        assert!((cts - 3_000.0 / 90_000.0).abs() < 1e-9);
        assert!((dts - cts).abs() < 1e-9);
    }

    #[test]
    fn test_wrap_sequence() {
        // Synthetic wrap: Δ = 45000 across the 2^33 boundary.
        let mut n = TimestampNormalizer::new();
        let near_wrap = (1u64 << 33) - 90_000;

        let (cts, _) = n.normalize(near_wrap, near_wrap, FD, 0.0);
        assert_eq!(cts, 0.0);

        let (cts, _) = n.normalize(near_wrap + 45_000, near_wrap + 45_000, FD, 0.0);
        assert!((cts - 0.5).abs() < 1e-9);

        let (cts, dts) = n.normalize(45_000, 45_000, FD, 0.0);
        assert!((cts - 1.5).abs() < 1e-9);
        assert!((dts - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_wrap_is_strictly_increasing() {
        let mut n = TimestampNormalizer::new();
        let step = 3_000u64;
        let start = (1u64 << 33) - 10 * step;

        let mut prev = -1.0;
        for i in 0..40 {
            let raw = (start + i * step) & ((1 << 33) - 1);
            // Raw zero would trigger the fallback path instead.
            let raw = if raw == 0 { 1 } else { raw };
            let (cts, _) = n.normalize(raw, raw, FD, 0.0);
            assert!(cts > prev || i == 0);
            prev = cts;
        }
    }

    #[test]
    fn test_backwards_jump_falls_back_to_frame_timing() {
        // 900000 -> 90000 is a backwards jump below the wrap threshold.
        let mut n = TimestampNormalizer::new();
        n.normalize(900_000, 900_000, FD, 0.0);

        let (cts, dts) = n.normalize(90_000, 90_000, FD, 0.0);
        assert!((cts - FD).abs() < 1e-9);
        assert_eq!(dts, cts);
    }

    #[test]
    fn test_zero_pts_uses_frame_counter() {
        let mut n = TimestampNormalizer::new();
        n.normalize(900_000, 900_000, FD, 0.0);

        let (cts, dts) = n.normalize(0, 0, FD, 0.0);
        assert!((cts - FD).abs() < 1e-9);
        assert_eq!(dts, cts);

        let (cts, _) = n.normalize(0, 0, FD, 0.0);
        assert!((cts - 2.0 * FD).abs() < 1e-9);
    }

    #[test]
    fn test_reset_reseeds_baseline() {
        let mut n = TimestampNormalizer::new();
        n.normalize(900_000, 900_000, FD, 0.0);
        n.normalize(903_000, 903_000, FD, 0.0);

        n.reset();
        assert!(!n.is_initialized());

        // Wildly different timestamps after reset are a fresh origin.
        let (cts, dts) = n.normalize(5_000_000, 5_000_000, FD, 1.0);
        assert_eq!((cts, dts), (0.0, 0.0));
    }
}
