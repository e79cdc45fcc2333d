// Needle physics: source selection, target angle and damping
//
// Pure functions over one reading and the current controls. Nothing here keeps
// state; the engine in `gauge::GaugeEngine` owns the accumulator.

use super::calibration::SignalSource;
use crate::config::GaugeConfig;
use crate::numeric::{finite, lerp};

/// The signal value of one sample in the representation that drives the needle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalReading {
    pub source: SignalSource,
    pub value: f64,
}

/// Smoothing control (0-100) as a 0..1 blend factor
pub fn blend(smoothing: f64) -> f64 {
    if !smoothing.is_finite() {
        return 0.5;
    }
    smoothing.clamp(0.0, 100.0) / 100.0
}

/// Pick the representation for one sample and compute its signal value.
///
/// Absolute raw values win when both are finite and above the magnitude floor;
/// the normalized position is the fallback. Re-evaluated per sample.
pub fn read_signal(
    raw_filtered: Option<f64>,
    raw_unfiltered: Option<f64>,
    position: Option<f64>,
    blend: f64,
    magnitude_floor: f64,
) -> Option<SignalReading> {
    if let (Some(filtered), Some(unfiltered)) = (finite(raw_filtered), finite(raw_unfiltered)) {
        if filtered.abs() > magnitude_floor && unfiltered.abs() > magnitude_floor {
            return Some(SignalReading {
                source: SignalSource::AbsoluteRaw,
                value: unfiltered + (filtered - unfiltered) * blend,
            });
        }
    }

    finite(position).map(|value| SignalReading {
        source: SignalSource::NormalizedPosition,
        value,
    })
}

/// Degrees per unit per sensitivity step for a source
pub fn domain_scale(config: &GaugeConfig, source: SignalSource) -> f64 {
    match source {
        SignalSource::AbsoluteRaw => config.raw_domain_scale,
        SignalSource::NormalizedPosition => config.position_domain_scale,
    }
}

/// Target needle angle, clamped to the arc. `None` when any input is not finite.
pub fn target_angle(
    config: &GaugeConfig,
    reading: SignalReading,
    baseline: f64,
    sensitivity: f64,
    tone_offset: f64,
) -> Option<f64> {
    if !(reading.value.is_finite()
        && baseline.is_finite()
        && sensitivity.is_finite()
        && tone_offset.is_finite())
    {
        return None;
    }

    let delta = baseline - reading.value;
    let tone = (tone_offset - config.neutral_tone_offset) * config.tone_scale;
    let angle = config.set_angle + delta * sensitivity * domain_scale(config, reading.source) + tone;
    if !angle.is_finite() {
        return None;
    }
    Some(angle.clamp(config.arc_min, config.arc_max))
}

/// Per-frame damping for a blend factor
pub fn damping(config: &GaugeConfig, blend: f64) -> f64 {
    lerp(config.min_damping, config.max_damping, blend)
}

/// Move `angle` one frame toward `target`.
///
/// With `damping` in [0, 1) the step is a convex combination, so the result
/// lies between the two and never overshoots.
pub fn step(angle: f64, target: f64, damping: f64) -> f64 {
    let alpha = (1.0 - damping).clamp(0.0, 1.0);
    angle + (target - angle) * alpha
}
