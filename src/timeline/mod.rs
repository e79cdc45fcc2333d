// Rolling timeline
//
// Owns everything the strip chart shows: the sample buffer, detected-event
// annotations, question and recording markers, the session transcript and the
// viewport. Telemetry is appended live; pausing halts ingestion entirely until
// the operator resumes.

pub mod annotations;
pub mod buffer;
pub mod export;
pub mod markers;
pub mod viewport;

use crate::config::TimelineConfig;
use crate::error::{TelemetryError, TelemetryResult};
use crate::numeric::{epoch_to_datetime, seconds_to_samples};
use crate::protocol::{ChatMessage, MeterEvent};
use crate::types::{Reading, Sample};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

pub use annotations::{Annotation, AnnotationLog, Classification};
pub use buffer::SampleBuffer;
pub use export::{ExportDocument, SessionMessage};
pub use markers::{MarkerLog, QuestionMarker, RecordingEdge, RecordingInterval};
pub use viewport::{compute_viewport, ChartFrame, Viewport, ViewportAction, ViewportLimits};

/// Result of ingesting one telemetry event
#[derive(Debug, Clone, PartialEq)]
pub struct Ingested {
    pub sample: Sample,
    /// False when the timeline was paused and the sample was not stored
    pub retained: bool,
}

/// Buffer occupancy
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineStats {
    pub retained: usize,
    pub evicted: u64,
    pub oldest_sequence: Option<u64>,
    pub newest_sequence: Option<u64>,
    pub retained_seconds: f64,
    pub annotations: usize,
    pub question_markers: usize,
    pub recordings: usize,
}

pub struct Timeline {
    config: TimelineConfig,
    limits: ViewportLimits,
    buffer: SampleBuffer,
    annotations: AnnotationLog,
    markers: MarkerLog,
    messages: Vec<SessionMessage>,
    viewport: Viewport,
    next_sequence: u64,
}

impl Timeline {
    pub fn new(config: TimelineConfig) -> Self {
        let limits = ViewportLimits::from_config(&config);
        let horizon = seconds_to_samples(config.retention_seconds, config.points_per_second);
        Self {
            buffer: SampleBuffer::new(horizon),
            annotations: AnnotationLog::new(horizon as u64),
            markers: MarkerLog::new(),
            messages: Vec::new(),
            viewport: Viewport::live(&limits),
            next_sequence: 0,
            limits,
            config,
        }
    }

    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    pub fn limits(&self) -> &ViewportLimits {
        &self.limits
    }

    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }

    pub fn annotations(&self) -> &AnnotationLog {
        &self.annotations
    }

    pub fn markers(&self) -> &MarkerLog {
        &self.markers
    }

    pub fn messages(&self) -> &[SessionMessage] {
        &self.messages
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn is_paused(&self) -> bool {
        self.viewport.paused
    }

    /// Sequence the next telemetry event will receive
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Stamp a reading with the next sequence and append it unless paused.
    ///
    /// The sequence advances either way so sequences are never reused.
    pub fn apply_sample(&mut self, reading: Reading, wall_clock: DateTime<Utc>) -> Ingested {
        let sample = Sample::new(self.next_sequence, wall_clock, reading);
        self.next_sequence += 1;

        if self.viewport.paused {
            return Ingested {
                sample,
                retained: false,
            };
        }

        if self.buffer.push(sample.clone()) > 0 {
            if let Some(oldest) = self.buffer.oldest_sequence() {
                self.annotations.evict_before(oldest);
                self.markers.evict_before(oldest);
            }
        }
        Ingested {
            sample,
            retained: true,
        }
    }

    /// Ingest a telemetry event: append its sample and evaluate its classification
    pub fn apply_meter(&mut self, event: &MeterEvent, wall_clock: DateTime<Utc>) -> Ingested {
        let ingested = self.apply_sample(event.reading(), wall_clock);

        if let Some(classification) = Classification::from_meter(event) {
            if ingested.retained {
                let created = self.annotations.observe(
                    &classification,
                    ingested.sample.sequence,
                    self.config.points_per_second,
                    self.config.default_classify_window_seconds,
                );
                if let Some(annotation) = created {
                    debug!(
                        "Annotation {:?} at sequence {} ({} samples)",
                        annotation.action, annotation.start_sequence, annotation.window_length
                    );
                }
            } else {
                // Consume it so it is not attributed to a later sample after resume
                self.annotations.mark_seen(&classification);
            }
        }
        ingested
    }

    /// Record a transcript line and place its question marker, if any
    pub fn apply_chat(&mut self, message: &ChatMessage) -> Option<QuestionMarker> {
        self.messages.push(message.to_session_message());
        self.cap_messages();

        let dropped_at = message.question_dropped_at?;
        if self.viewport.paused {
            debug!("Paused: question marker at {} not placed", dropped_at);
            return None;
        }
        let Some(at) = epoch_to_datetime(dropped_at) else {
            warn!("Ignoring question marker with invalid time {}", dropped_at);
            return None;
        };
        self.markers
            .add_question(&self.buffer, at, message.text.clone())
            .cloned()
    }

    /// Apply a recording edge at the newest retained sample
    pub fn mark_recording(&mut self, edge: RecordingEdge) -> bool {
        if self.viewport.paused {
            return false;
        }
        let Some(sequence) = self.buffer.newest_sequence() else {
            debug!("Recording {:?} ignored: no samples yet", edge);
            return false;
        };
        self.markers.apply_edge(edge, sequence)
    }

    pub fn apply_viewport(&mut self, action: ViewportAction) -> Viewport {
        self.viewport = compute_viewport(self.viewport, action, self.buffer.len(), &self.limits);
        self.viewport
    }

    pub fn chart_frame(&self, width: f64) -> ChartFrame {
        ChartFrame::build(
            &self.buffer,
            &self.annotations,
            &self.markers,
            &self.viewport,
            width,
            &self.config,
        )
    }

    pub fn stats(&self) -> TimelineStats {
        TimelineStats {
            retained: self.buffer.len(),
            evicted: self.buffer.evicted(),
            oldest_sequence: self.buffer.oldest_sequence(),
            newest_sequence: self.buffer.newest_sequence(),
            retained_seconds: self.buffer.len() as f64 / self.config.points_per_second,
            annotations: self.annotations.len(),
            question_markers: self.markers.questions().len(),
            recordings: self.markers.recordings().len(),
        }
    }

    pub fn export(&self, exported_at: DateTime<Utc>) -> ExportDocument {
        ExportDocument::build(
            &self.buffer,
            self.annotations.iter(),
            self.markers.questions(),
            self.markers.recordings(),
            &self.messages,
            self.config.points_per_second,
            exported_at,
        )
    }

    /// Drop all retained data and return to the live view.
    /// The sequence counter keeps counting.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.annotations.clear();
        self.markers.clear();
        self.messages.clear();
        self.viewport = Viewport::live(&self.limits);
    }

    /// Close an open recording at the newest sample; retained data is kept
    pub fn end_session(&mut self) {
        if self.markers.open_recording().is_none() {
            return;
        }
        if let Some(sequence) = self.buffer.newest_sequence() {
            self.markers.apply_edge(RecordingEdge::End, sequence);
            info!("Closed open recording at sequence {}", sequence);
        }
    }

    pub fn adopt_messages(&mut self, messages: Vec<SessionMessage>) {
        self.messages = messages;
        self.cap_messages();
    }

    /// Keep only the newest `max_session_messages` transcript lines
    fn cap_messages(&mut self) {
        let excess = self
            .messages
            .len()
            .saturating_sub(self.config.max_session_messages);
        if excess > 0 {
            self.messages.drain(..excess);
        }
    }

    /// Replace retained data with the contents of an export document
    pub fn restore(&mut self, document: &ExportDocument) -> TelemetryResult<()> {
        let warnings = document.compatibility_warnings(self.config.points_per_second);
        for warning in &warnings {
            warn!("Restore: {}", warning);
        }
        let ordered = document
            .signal
            .samples
            .windows(2)
            .all(|pair| pair[0].sequence < pair[1].sequence);
        if !ordered {
            return Err(TelemetryError::Export(
                "snapshot samples are not in sequence order".to_string(),
            ));
        }

        self.reset();
        for sample in document.samples() {
            self.buffer.push(sample);
        }
        self.annotations.restore(document.annotations());
        self.markers
            .restore(document.question_markers(), document.recordings());
        if let Some(oldest) = self.buffer.oldest_sequence() {
            self.annotations.evict_before(oldest);
            self.markers.evict_before(oldest);
        }
        self.messages = document.timeline.session_messages.clone();
        self.cap_messages();

        if let Some(newest) = self.buffer.newest_sequence() {
            self.next_sequence = self.next_sequence.max(newest + 1);
        }
        info!(
            "Restored {} samples, {} annotations from snapshot",
            self.buffer.len(),
            self.annotations.len()
        );
        Ok(())
    }
}
