//! Level meter state: RMS smoothing and peak hold

use crate::model::PeakSample;

/// Visible range of the meter in dB below full scale
pub const METER_RANGE_DB: f64 = 62.0;
/// Levels below this are treated as silence
pub const NOISE_FLOOR_DB: f64 = -96.0;

const RMS_SMOOTHING_FACTOR: f64 = 0.8;
const PEAK_HOLD_FRAMES: u64 = 60;

/// Per-channel meter state, fed once per display frame
#[derive(Debug, Clone)]
pub struct PeakMeter {
    pub left_peak: f64,
    pub right_peak: f64,
    pub left_rms: f64,
    pub right_rms: f64,
    pub left_peak_hold: f64,
    pub right_peak_hold: f64,
    left_hold_frame: u64,
    right_hold_frame: u64,
    frame: u64,
}

impl Default for PeakMeter {
    fn default() -> Self {
        Self {
            left_peak: NOISE_FLOOR_DB,
            right_peak: NOISE_FLOOR_DB,
            left_rms: NOISE_FLOOR_DB,
            right_rms: NOISE_FLOOR_DB,
            left_peak_hold: NOISE_FLOOR_DB,
            right_peak_hold: NOISE_FLOOR_DB,
            left_hold_frame: 0,
            right_hold_frame: 0,
            frame: 0,
        }
    }
}

impl PeakMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance one frame with a fresh sample
    pub fn update(&mut self, sample: &PeakSample) {
        self.left_peak = sample.left_peak;
        self.right_peak = sample.right_peak;

        let left_rms = sample.left_rms.max(NOISE_FLOOR_DB);
        let right_rms = sample.right_rms.max(NOISE_FLOOR_DB);
        self.left_rms = RMS_SMOOTHING_FACTOR * self.left_rms + (1.0 - RMS_SMOOTHING_FACTOR) * left_rms;
        self.right_rms =
            RMS_SMOOTHING_FACTOR * self.right_rms + (1.0 - RMS_SMOOTHING_FACTOR) * right_rms;

        if sample.left_peak > self.left_peak_hold
            || self.frame - self.left_hold_frame > PEAK_HOLD_FRAMES
        {
            self.left_peak_hold = sample.left_peak;
            self.left_hold_frame = self.frame;
        }
        if sample.right_peak > self.right_peak_hold
            || self.frame - self.right_hold_frame > PEAK_HOLD_FRAMES
        {
            self.right_peak_hold = sample.right_peak;
            self.right_hold_frame = self.frame;
        }

        self.frame += 1;
    }

    /// Map a dB level onto the meter's visible range as 0.0..=1.0
    pub fn fraction(db: f64) -> f64 {
        if db.is_nan() {
            return 0.0;
        }
        ((db + METER_RANGE_DB) / METER_RANGE_DB).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(peak: f64, rms: f64) -> PeakSample {
        PeakSample {
            left_peak: peak,
            right_peak: peak,
            left_rms: rms,
            right_rms: rms,
        }
    }

    #[test]
    fn test_rms_is_smoothed() {
        let mut meter = PeakMeter::new();
        meter.update(&sample(-6.0, -16.0));
        // 0.8 * -96 + 0.2 * -16
        assert!((meter.left_rms - -80.0).abs() < 1e-9);
        assert!((meter.right_rms - -80.0).abs() < 1e-9);
    }

    #[test]
    fn test_rms_clamped_to_noise_floor() {
        let mut meter = PeakMeter::new();
        meter.update(&sample(f64::NEG_INFINITY, f64::NEG_INFINITY));
        assert_eq!(meter.left_rms, NOISE_FLOOR_DB);
    }

    #[test]
    fn test_peak_hold_latches_then_releases() {
        let mut meter = PeakMeter::new();
        meter.update(&sample(-3.0, -20.0));
        assert_eq!(meter.left_peak_hold, -3.0);

        for _ in 0..PEAK_HOLD_FRAMES {
            meter.update(&sample(-30.0, -40.0));
        }
        assert_eq!(meter.left_peak_hold, -3.0);

        meter.update(&sample(-30.0, -40.0));
        assert_eq!(meter.left_peak_hold, -30.0);
    }

    #[test]
    fn test_fraction() {
        assert_eq!(PeakMeter::fraction(0.0), 1.0);
        assert_eq!(PeakMeter::fraction(-62.0), 0.0);
        assert_eq!(PeakMeter::fraction(-96.0), 0.0);
        assert_eq!(PeakMeter::fraction(3.0), 1.0);
        assert!((PeakMeter::fraction(-31.0) - 0.5).abs() < 1e-9);
        assert_eq!(PeakMeter::fraction(f64::NAN), 0.0);
    }
}
