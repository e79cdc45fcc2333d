// Baselines and the SET gesture
//
// Each signal representation keeps its own baseline. The SET control is a
// press/hold/release gesture: a short press re-zeroes the active source, a hold
// past the threshold commits a full recalibration of both sources.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Which representation of the instrument signal drives the needle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    /// Absolute raw magnitudes from the hardware
    AbsoluteRaw,
    /// Normalized 0..1 position computed by the backend
    NormalizedPosition,
}

/// Zero references, one per source. `None` until seeded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Baselines {
    raw: Option<f64>,
    position: Option<f64>,
}

impl Baselines {
    pub fn get(&self, source: SignalSource) -> Option<f64> {
        match source {
            SignalSource::AbsoluteRaw => self.raw,
            SignalSource::NormalizedPosition => self.position,
        }
    }

    pub fn set(&mut self, source: SignalSource, value: Option<f64>) {
        let value = value.filter(|v| v.is_finite());
        match source {
            SignalSource::AbsoluteRaw => self.raw = value,
            SignalSource::NormalizedPosition => self.position = value,
        }
    }

    /// Seed a source's baseline if it has never been set. Returns true when seeded.
    pub fn seed(&mut self, source: SignalSource, value: f64) -> bool {
        if self.get(source).is_some() || !value.is_finite() {
            return false;
        }
        self.set(source, Some(value));
        true
    }

    pub fn clear(&mut self) {
        self.raw = None;
        self.position = None;
    }
}

/// What a SET gesture did to the baselines
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalibrationOutcome {
    /// The active source had no baseline; the current reading became one
    Seeded { source: SignalSource },
    /// Short press: active source re-zeroed. `offset` is the reading minus the prior baseline.
    Nudged { source: SignalSource, offset: f64 },
    /// Hold past the threshold: both sources re-zeroed and the needle snapped to SET
    Committed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Holding { since: Instant },
    /// Commit already happened; waiting for the release
    Committed,
}

/// What the gesture asks the engine to do on release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureRelease {
    /// Released before the threshold
    Nudge,
    /// Released after the threshold without an intervening tick
    Commit,
    /// Nothing pending (not pressed, or already committed)
    Nothing,
}

/// Press-and-hold state machine driven by explicit timestamps
#[derive(Debug, Clone)]
pub struct SetGesture {
    phase: Phase,
    hold_threshold: Duration,
}

impl SetGesture {
    pub fn new(hold_threshold: Duration) -> Self {
        Self {
            phase: Phase::Idle,
            hold_threshold,
        }
    }

    /// Whether a press is being held and has not committed yet
    pub fn is_holding(&self) -> bool {
        matches!(self.phase, Phase::Holding { .. })
    }

    /// Fraction of the hold threshold elapsed at `now`, if holding
    pub fn progress(&self, now: Instant) -> Option<f64> {
        match self.phase {
            Phase::Holding { since } => {
                let threshold = self.hold_threshold.as_secs_f64();
                if threshold <= 0.0 {
                    return Some(1.0);
                }
                let held = now.saturating_duration_since(since).as_secs_f64();
                Some((held / threshold).min(1.0))
            }
            _ => None,
        }
    }

    /// Start a hold. Repeated presses while held are ignored.
    pub fn press(&mut self, now: Instant) {
        if self.phase == Phase::Idle {
            self.phase = Phase::Holding { since: now };
        }
    }

    /// Advance the hold timer. Returns true exactly once, when the hold commits.
    pub fn tick(&mut self, now: Instant) -> bool {
        if let Phase::Holding { since } = self.phase {
            if now.saturating_duration_since(since) >= self.hold_threshold {
                self.phase = Phase::Committed;
                return true;
            }
        }
        false
    }

    pub fn release(&mut self, now: Instant) -> GestureRelease {
        let action = match self.phase {
            Phase::Holding { since } if now.saturating_duration_since(since) >= self.hold_threshold => {
                GestureRelease::Commit
            }
            Phase::Holding { .. } => GestureRelease::Nudge,
            Phase::Idle | Phase::Committed => GestureRelease::Nothing,
        };
        self.phase = Phase::Idle;
        action
    }

    /// Abandon a pending hold without calibrating
    pub fn cancel(&mut self) {
        self.phase = Phase::Idle;
    }
}
