// Detected-event annotations
//
// The backend reclassifies the signal periodically and stamps every telemetry
// event with the time of its latest classification. A classification is turned
// into an annotation once, on the first event that carries it.

use crate::protocol::MeterEvent;
use crate::types::NeedleAction;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A detected-event interval in sample-index space.
///
/// Covers `[start_sequence - window_length, start_sequence]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub action: NeedleAction,
    pub confidence: f64,
    pub start_sequence: u64,
    pub window_length: u64,
}

impl Annotation {
    /// First sequence of the interval; may precede the oldest retained sample
    pub fn interval_start(&self) -> i64 {
        let start = i64::try_from(self.start_sequence).unwrap_or(i64::MAX);
        let length = i64::try_from(self.window_length).unwrap_or(i64::MAX);
        start.saturating_sub(length)
    }

    pub fn interval_end(&self) -> u64 {
        self.start_sequence
    }

    /// Whether the interval overlaps `[first, last]`
    pub fn intersects(&self, first: u64, last: u64) -> bool {
        self.interval_start() <= last as i64 && self.interval_end() >= first
    }
}

/// Classification fields carried by one telemetry event
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    /// Backend clock reading at classification time
    pub classified_at: f64,
    pub window_seconds: Option<f64>,
    pub action: Option<NeedleAction>,
    pub confidence: f64,
}

impl Classification {
    pub fn from_meter(event: &MeterEvent) -> Option<Self> {
        let classified_at = event.classified_at.filter(|t| t.is_finite())?;
        Some(Self {
            classified_at,
            window_seconds: event.classify_window.filter(|w| w.is_finite() && *w >= 0.0),
            action: event.needle_action,
            confidence: event.confidence.filter(|c| c.is_finite()).unwrap_or(0.0),
        })
    }
}

/// Annotations in arrival order. Window lengths are capped at `max_window_length`
/// samples, normally the retention horizon.
#[derive(Debug, Clone)]
pub struct AnnotationLog {
    entries: VecDeque<Annotation>,
    last_classified_at: Option<f64>,
    max_window_length: u64,
}

impl AnnotationLog {
    pub fn new(max_window_length: u64) -> Self {
        Self {
            entries: VecDeque::new(),
            last_classified_at: None,
            max_window_length,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Annotation> {
        self.entries.iter()
    }

    /// Record that a classification was seen; true when its timestamp changed.
    ///
    /// A timestamp that goes backwards is a restarted backend clock and counts
    /// as fresh.
    pub fn mark_seen(&mut self, classification: &Classification) -> bool {
        match self.last_classified_at {
            Some(last) if classification.classified_at == last => false,
            _ => {
                self.last_classified_at = Some(classification.classified_at);
                true
            }
        }
    }

    /// Turn a fresh classification into an annotation ending at `sequence`.
    ///
    /// Replays of an already seen classification and non-event actions are ignored.
    pub fn observe(
        &mut self,
        classification: &Classification,
        sequence: u64,
        points_per_second: f64,
        default_window_seconds: f64,
    ) -> Option<&Annotation> {
        if !self.mark_seen(classification) {
            return None;
        }
        let action = classification.action.filter(NeedleAction::is_event)?;
        let window_seconds = classification.window_seconds.unwrap_or(default_window_seconds);

        self.entries.push_back(Annotation {
            action,
            confidence: classification.confidence.clamp(0.0, 1.0),
            start_sequence: sequence,
            window_length: self.window_length(window_seconds * points_per_second),
        });
        self.entries.back()
    }

    fn window_length(&self, samples: f64) -> u64 {
        if samples >= self.max_window_length as f64 {
            return self.max_window_length;
        }
        samples.round().max(0.0) as u64
    }

    /// Drop annotations whose interval ends before `oldest_sequence`
    pub fn evict_before(&mut self, oldest_sequence: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|a| a.interval_end() >= oldest_sequence);
        before - self.entries.len()
    }

    /// Annotations overlapping `[first, last]`
    pub fn intersecting(&self, first: u64, last: u64) -> impl Iterator<Item = &Annotation> {
        self.entries.iter().filter(move |a| a.intersects(first, last))
    }

    /// Replace the log contents, e.g. from an export snapshot
    pub fn restore(&mut self, entries: impl IntoIterator<Item = Annotation>) {
        let max = self.max_window_length;
        self.entries = entries
            .into_iter()
            .map(|mut a| {
                a.window_length = a.window_length.min(max);
                a
            })
            .collect();
        self.last_classified_at = None;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.last_classified_at = None;
    }
}
