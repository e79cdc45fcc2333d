// Core data types shared by the gauge and the timeline

use crate::numeric::finite;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Needle action reported by the backend classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeedleAction {
    Idle,
    Fall,
    LongFall,
    LongFallBlowdown,
    SpeededFall,
    Rise,
    ThetaBlink,
    RockSlam,
    Stuck,
    Floating,
    FreeNeedle,
    StageFour,
    BodyMotion,
    Squeeze,
    DirtyNeedle,
    NullTa,
    RocketRead,
    Tick,
    DoubleTick,
    Sticky,
    Null,
    /// Any action name this build does not know about
    #[serde(other)]
    Unknown,
}

impl NeedleAction {
    /// Whether this action describes a detected event worth annotating
    pub fn is_event(&self) -> bool {
        !matches!(self, Self::Idle | Self::Null | Self::Unknown)
    }
}

/// Raw fields of one telemetry reading before it is stamped with a sequence
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reading {
    pub raw_filtered: Option<f64>,
    pub raw_unfiltered: Option<f64>,
    pub position: Option<f64>,
    pub tone_offset: Option<f64>,
    pub classified_action: Option<NeedleAction>,
    pub confidence: f64,
    pub connected: bool,
}

/// One timestamped telemetry reading.
///
/// Numeric fields are `None` when the instrument did not report a finite value.
/// `raw_unfiltered` falls back to `raw_filtered` when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub sequence: u64,
    pub wall_clock: DateTime<Utc>,
    pub raw_filtered: Option<f64>,
    pub raw_unfiltered: Option<f64>,
    pub position: Option<f64>,
    pub tone_offset: Option<f64>,
    pub classified_action: Option<NeedleAction>,
    pub confidence: f64,
    pub connected: bool,
}

impl Sample {
    /// Stamp a reading, normalizing missing and non-finite values
    pub fn new(sequence: u64, wall_clock: DateTime<Utc>, reading: Reading) -> Self {
        let raw_filtered = finite(reading.raw_filtered);
        let raw_unfiltered = finite(reading.raw_unfiltered).or(raw_filtered);
        let confidence = if reading.confidence.is_finite() {
            reading.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };

        Self {
            sequence,
            wall_clock,
            raw_filtered,
            raw_unfiltered,
            position: finite(reading.position),
            tone_offset: finite(reading.tone_offset),
            classified_action: reading
                .classified_action
                .filter(|a| *a != NeedleAction::Unknown),
            confidence,
            connected: reading.connected,
        }
    }

    /// Value plotted on the strip chart: the filtered raw signal, or the
    /// normalized position when the instrument only reports that
    pub fn chart_value(&self) -> Option<f64> {
        self.raw_filtered.or(self.position)
    }
}
