// Gauge engine
//
// Converts incoming samples into a damped, bounded needle angle relative to an
// operator-settable baseline. Samples update the target; `tick` advances the
// displayed angle one frame and drives the SET hold timer.

pub mod calibration;
pub mod physics;

use crate::config::GaugeConfig;
use crate::numeric::finite;
use crate::types::Sample;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info};

pub use calibration::{Baselines, CalibrationOutcome, GestureRelease, SetGesture, SignalSource};
pub use physics::SignalReading;

/// Snapshot of the gauge for one frame
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GaugeState {
    /// Displayed needle angle in degrees
    pub angle: f64,
    /// Angle the needle is damping toward, when the last sample was usable
    pub target: Option<f64>,
    pub source: Option<SignalSource>,
    pub baseline: Option<f64>,
    /// Hold progress 0..1 while SET is held
    pub set_progress: Option<f64>,
    /// Calibration committed during this tick
    pub calibration: Option<CalibrationOutcome>,
    pub sensitivity: f64,
    pub smoothing: f64,
    pub tone_offset: f64,
}

pub struct GaugeEngine {
    config: GaugeConfig,
    baselines: Baselines,
    gesture: SetGesture,
    latest: Option<Sample>,
    angle: f64,

    // Operator controls
    sensitivity: f64,
    smoothing: f64,
    tone_offset: f64,
}

impl GaugeEngine {
    pub fn new(config: GaugeConfig) -> Self {
        let gesture = SetGesture::new(config.hold_threshold());
        Self {
            angle: config.set_angle,
            sensitivity: config.default_sensitivity,
            smoothing: config.default_smoothing,
            tone_offset: config.neutral_tone_offset,
            baselines: Baselines::default(),
            latest: None,
            gesture,
            config,
        }
    }

    pub fn config(&self) -> &GaugeConfig {
        &self.config
    }

    pub fn angle(&self) -> f64 {
        self.angle
    }

    pub fn baseline(&self, source: SignalSource) -> Option<f64> {
        self.baselines.get(source)
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.latest.as_ref()
    }

    pub fn set_sensitivity(&mut self, sensitivity: f64) {
        // Non-finite values are kept: the needle holds until a usable value arrives
        self.sensitivity = sensitivity;
    }

    pub fn set_smoothing(&mut self, smoothing: f64) {
        if smoothing.is_finite() {
            self.smoothing = smoothing.clamp(0.0, 100.0);
        }
    }

    /// Operator tone offset, used when a sample carries none
    pub fn set_tone_offset(&mut self, tone_offset: f64) {
        if tone_offset.is_finite() {
            self.tone_offset = tone_offset;
        }
    }

    fn blend(&self) -> f64 {
        physics::blend(self.smoothing)
    }

    /// Current reading of the latest sample in its active representation
    pub fn reading(&self) -> Option<SignalReading> {
        let sample = self.latest.as_ref()?;
        physics::read_signal(
            sample.raw_filtered,
            sample.raw_unfiltered,
            sample.position,
            self.blend(),
            self.config.magnitude_floor,
        )
    }

    /// Mirror a sample into the engine. Seeds the active source's baseline on
    /// its first valid reading. Returns the active source, if any.
    pub fn apply_sample(&mut self, sample: &Sample) -> Option<SignalSource> {
        self.latest = Some(sample.clone());
        let reading = self.reading()?;
        if self.baselines.seed(reading.source, reading.value) {
            debug!("Seeded {:?} baseline at {}", reading.source, reading.value);
        }
        Some(reading.source)
    }

    /// Angle the needle is heading for, or `None` when this frame cannot update
    pub fn target(&self) -> Option<f64> {
        let reading = self.reading()?;
        let baseline = self.baselines.get(reading.source)?;
        let tone_offset = self
            .latest
            .as_ref()
            .and_then(|s| s.tone_offset)
            .unwrap_or(self.tone_offset);
        physics::target_angle(&self.config, reading, baseline, self.sensitivity, tone_offset)
    }

    pub fn press_set(&mut self, now: Instant) {
        self.gesture.press(now);
    }

    /// Finish a SET press
    pub fn release_set(&mut self, now: Instant) -> Option<CalibrationOutcome> {
        match self.gesture.release(now) {
            GestureRelease::Nudge => self.nudge(),
            GestureRelease::Commit => Some(self.commit()),
            GestureRelease::Nothing => None,
        }
    }

    pub fn cancel_set(&mut self) {
        self.gesture.cancel();
    }

    /// Re-zero the active source against its current reading
    fn nudge(&mut self) -> Option<CalibrationOutcome> {
        let Some(reading) = self.reading() else {
            debug!("SET released without a usable reading");
            return None;
        };

        let outcome = match self.baselines.get(reading.source) {
            None => CalibrationOutcome::Seeded {
                source: reading.source,
            },
            Some(prior) => CalibrationOutcome::Nudged {
                source: reading.source,
                offset: reading.value - prior,
            },
        };
        self.baselines.set(reading.source, Some(reading.value));
        info!("SET: {:?}", outcome);
        Some(outcome)
    }

    /// Reset both baselines to their current readings and snap to SET
    fn commit(&mut self) -> CalibrationOutcome {
        // A source without a valid reading reseeds lazily
        let (raw, position) = match &self.latest {
            Some(sample) => {
                let raw = physics::read_signal(
                    sample.raw_filtered,
                    sample.raw_unfiltered,
                    None,
                    self.blend(),
                    self.config.magnitude_floor,
                )
                .map(|r| r.value);
                (raw, finite(sample.position))
            }
            None => (None, None),
        };
        self.baselines.set(SignalSource::AbsoluteRaw, raw);
        self.baselines.set(SignalSource::NormalizedPosition, position);
        self.angle = self.config.set_angle;
        info!("🎯 SET committed: full recalibration");
        CalibrationOutcome::Committed
    }

    /// Advance one frame
    pub fn tick(&mut self, now: Instant) -> GaugeState {
        let calibration = if self.gesture.tick(now) {
            Some(self.commit())
        } else {
            None
        };

        let target = self.target();
        if let Some(target) = target {
            let damping = physics::damping(&self.config, self.blend());
            self.angle = physics::step(self.angle, target, damping)
                .clamp(self.config.arc_min, self.config.arc_max);
        }

        let source = self.reading().map(|r| r.source);
        GaugeState {
            angle: self.angle,
            target,
            source,
            baseline: source.and_then(|s| self.baselines.get(s)),
            set_progress: self.gesture.progress(now),
            calibration,
            sensitivity: self.sensitivity,
            smoothing: self.smoothing,
            tone_offset: self.tone_offset,
        }
    }

    /// Clear baselines, the latest sample, the gesture and the accumulator
    pub fn reset(&mut self) {
        self.baselines.clear();
        self.latest = None;
        self.gesture.cancel();
        self.angle = self.config.set_angle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Reading;
    use chrono::Utc;
    use std::time::Duration;

    fn raw_sample(seq: u64, value: f64) -> Sample {
        Sample::new(
            seq,
            Utc::now(),
            Reading {
                raw_filtered: Some(value),
                raw_unfiltered: Some(value),
                connected: true,
                ..Default::default()
            },
        )
    }

    fn position_sample(seq: u64, value: f64) -> Sample {
        Sample::new(
            seq,
            Utc::now(),
            Reading {
                position: Some(value),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_first_sample_seeds_baseline() {
        let mut gauge = GaugeEngine::new(GaugeConfig::default());
        assert_eq!(gauge.apply_sample(&raw_sample(0, 1000.0)), Some(SignalSource::AbsoluteRaw));
        assert_eq!(gauge.baseline(SignalSource::AbsoluteRaw), Some(1000.0));

        gauge.apply_sample(&raw_sample(1, 1500.0));
        assert_eq!(gauge.baseline(SignalSource::AbsoluteRaw), Some(1000.0));
    }

    #[test]
    fn test_needle_rests_at_set_on_baseline() {
        let mut gauge = GaugeEngine::new(GaugeConfig::default());
        let now = Instant::now();
        gauge.apply_sample(&raw_sample(0, 1000.0));
        let state = gauge.tick(now);
        assert_eq!(state.target, Some(-20.0));
        assert_eq!(state.angle, -20.0);
    }

    #[test]
    fn test_missing_values_hold_angle() {
        let mut gauge = GaugeEngine::new(GaugeConfig::default());
        let now = Instant::now();
        gauge.apply_sample(&raw_sample(0, 1000.0));
        gauge.apply_sample(&raw_sample(1, 1200.0));
        let moved = gauge.tick(now).angle;

        gauge.apply_sample(&Sample::new(2, Utc::now(), Reading::default()));
        let state = gauge.tick(now);
        assert_eq!(state.target, None);
        assert_eq!(state.angle, moved);
    }

    #[test]
    fn test_non_finite_sensitivity_holds() {
        let mut gauge = GaugeEngine::new(GaugeConfig::default());
        let now = Instant::now();
        gauge.apply_sample(&raw_sample(0, 1000.0));
        gauge.apply_sample(&raw_sample(1, 1200.0));
        let moved = gauge.tick(now).angle;

        gauge.set_sensitivity(f64::NAN);
        assert_eq!(gauge.tick(now).angle, moved);
    }

    #[test]
    fn test_sources_keep_separate_baselines() {
        let mut gauge = GaugeEngine::new(GaugeConfig::default());
        gauge.apply_sample(&raw_sample(0, 1000.0));
        gauge.apply_sample(&position_sample(1, 0.3));
        assert_eq!(gauge.baseline(SignalSource::AbsoluteRaw), Some(1000.0));
        assert_eq!(gauge.baseline(SignalSource::NormalizedPosition), Some(0.3));
    }

    #[test]
    fn test_short_press_nudges_active_source() {
        let mut gauge = GaugeEngine::new(GaugeConfig::default());
        let t0 = Instant::now();
        gauge.apply_sample(&position_sample(0, 0.3));
        gauge.apply_sample(&position_sample(1, 0.5));

        gauge.press_set(t0);
        let outcome = gauge.release_set(t0 + Duration::from_millis(300)).unwrap();
        match outcome {
            CalibrationOutcome::Nudged { source, offset } => {
                assert_eq!(source, SignalSource::NormalizedPosition);
                assert!((offset - 0.2).abs() < 1e-12);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(gauge.baseline(SignalSource::NormalizedPosition), Some(0.5));
    }

    #[test]
    fn test_hold_commits_and_snaps_to_set() {
        let mut gauge = GaugeEngine::new(GaugeConfig::default());
        let t0 = Instant::now();
        gauge.apply_sample(&raw_sample(0, 1000.0));
        gauge.apply_sample(&raw_sample(1, 1400.0));
        for i in 0..20 {
            gauge.tick(t0 + Duration::from_millis(i * 33));
        }
        assert!(gauge.angle() < -20.0);

        gauge.press_set(t0);
        let state = gauge.tick(t0 + Duration::from_secs(1));
        assert!(state.set_progress.is_some());
        assert_eq!(state.calibration, None);

        let state = gauge.tick(t0 + Duration::from_secs(2));
        assert_eq!(state.calibration, Some(CalibrationOutcome::Committed));
        assert_eq!(state.angle, -20.0);
        assert_eq!(gauge.baseline(SignalSource::AbsoluteRaw), Some(1400.0));
        assert_eq!(gauge.baseline(SignalSource::NormalizedPosition), None);

        assert_eq!(gauge.release_set(t0 + Duration::from_secs(3)), None);
    }

    #[test]
    fn test_commit_below_floor_leaves_raw_baseline_unset() {
        let mut gauge = GaugeEngine::new(GaugeConfig::default());
        let t0 = Instant::now();
        let weak = Reading {
            raw_filtered: Some(50.0),
            raw_unfiltered: Some(50.0),
            position: Some(0.5),
            ..Default::default()
        };
        gauge.apply_sample(&Sample::new(0, Utc::now(), weak));

        gauge.press_set(t0);
        let state = gauge.tick(t0 + Duration::from_secs(2));
        assert_eq!(state.calibration, Some(CalibrationOutcome::Committed));
        assert_eq!(gauge.baseline(SignalSource::AbsoluteRaw), None);
        assert_eq!(gauge.baseline(SignalSource::NormalizedPosition), Some(0.5));

        // The raw domain reseeds from its first valid reading
        gauge.apply_sample(&raw_sample(1, 1000.0));
        assert_eq!(gauge.baseline(SignalSource::AbsoluteRaw), Some(1000.0));
        assert_eq!(gauge.target(), Some(-20.0));
    }

    #[test]
    fn test_release_without_reading_does_nothing() {
        let mut gauge = GaugeEngine::new(GaugeConfig::default());
        let t0 = Instant::now();
        gauge.press_set(t0);
        assert_eq!(gauge.release_set(t0 + Duration::from_millis(100)), None);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut gauge = GaugeEngine::new(GaugeConfig::default());
        let t0 = Instant::now();
        gauge.apply_sample(&raw_sample(0, 1000.0));
        gauge.apply_sample(&raw_sample(1, 3000.0));
        gauge.tick(t0);
        gauge.press_set(t0);

        gauge.reset();
        assert_eq!(gauge.angle(), -20.0);
        assert!(gauge.latest().is_none());
        assert_eq!(gauge.baseline(SignalSource::AbsoluteRaw), None);
        assert_eq!(gauge.tick(t0 + Duration::from_secs(5)).calibration, None);
    }

    #[test]
    fn test_sample_tone_overrides_operator_tone() {
        let mut gauge = GaugeEngine::new(GaugeConfig::default());
        gauge.set_tone_offset(5.0);
        gauge.apply_sample(&position_sample(0, 0.5));
        // Operator tone: (5 - 2) * 4 = 12 degrees
        assert!((gauge.target().unwrap() - -8.0).abs() < 1e-9);

        let mut reading = Reading {
            position: Some(0.5),
            tone_offset: Some(2.0),
            ..Default::default()
        };
        gauge.apply_sample(&Sample::new(1, Utc::now(), reading.clone()));
        assert!((gauge.target().unwrap() - -20.0).abs() < 1e-9);

        reading.tone_offset = None;
        gauge.apply_sample(&Sample::new(2, Utc::now(), reading));
        assert!((gauge.target().unwrap() - -8.0).abs() < 1e-9);
    }
}
