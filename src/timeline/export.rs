use super::annotations::Annotation;
use super::buffer::SampleBuffer;
use super::markers::{QuestionMarker, RecordingInterval};
use crate::numeric::{sequence_offset_seconds, shift_seconds};
use crate::types::{NeedleAction, Sample};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Portable snapshot of the retained timeline.
///
/// Every time in the document is given twice: as seconds since the first
/// retained sample (derived from sequence numbers) and as an absolute timestamp
/// anchored to that sample's wall clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub exported_at: DateTime<Utc>,
    pub points_per_second: f64,
    pub signal: SignalExport,
    pub timeline: TimelineExport,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalExport {
    #[serde(default)]
    pub samples: Vec<ExportedSample>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineExport {
    #[serde(default)]
    pub session_messages: Vec<SessionMessage>,
    #[serde(default)]
    pub question_markers: Vec<ExportedQuestionMarker>,
    #[serde(default)]
    pub recording_markers: Vec<ExportedRecording>,
    #[serde(default)]
    pub annotations: Vec<ExportedAnnotation>,
}

/// One transcript line of the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMessage {
    pub speaker: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub turn_number: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedSample {
    pub sequence: u64,
    pub offset_seconds: f64,
    pub timestamp: DateTime<Utc>,
    pub raw_filtered: Option<f64>,
    pub raw_unfiltered: Option<f64>,
    pub position: Option<f64>,
    pub tone_offset: Option<f64>,
    pub classified_action: Option<NeedleAction>,
    pub confidence: f64,
    pub connected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedAnnotation {
    pub action: NeedleAction,
    pub confidence: f64,
    pub start_sequence: u64,
    pub window_length: u64,
    /// Offset of the interval's first sample (may be negative)
    pub start_offset_seconds: f64,
    /// Offset of the sample that triggered the annotation
    pub end_offset_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedQuestionMarker {
    pub sequence: u64,
    pub offset_seconds: f64,
    pub dropped_at: DateTime<Utc>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedRecording {
    pub start_sequence: u64,
    pub end_sequence: Option<u64>,
    pub start_offset_seconds: f64,
    pub end_offset_seconds: Option<f64>,
}

impl ExportDocument {
    /// Serialize the retained timeline
    pub fn build<'a>(
        buffer: &SampleBuffer,
        annotations: impl IntoIterator<Item = &'a Annotation>,
        questions: &[QuestionMarker],
        recordings: &[RecordingInterval],
        messages: &[SessionMessage],
        points_per_second: f64,
        exported_at: DateTime<Utc>,
    ) -> Self {
        let origin = buffer.oldest().map(|s| (s.sequence, s.wall_clock));
        let offset = |sequence: i64| -> f64 {
            origin.map_or(0.0, |(first, _)| {
                sequence_offset_seconds(sequence, first, points_per_second)
            })
        };

        let samples = buffer
            .iter()
            .map(|s| {
                let offset_seconds = offset(s.sequence as i64);
                ExportedSample {
                    sequence: s.sequence,
                    offset_seconds,
                    timestamp: origin.map_or(s.wall_clock, |(_, anchor)| {
                        shift_seconds(anchor, offset_seconds)
                    }),
                    raw_filtered: s.raw_filtered,
                    raw_unfiltered: s.raw_unfiltered,
                    position: s.position,
                    tone_offset: s.tone_offset,
                    classified_action: s.classified_action,
                    confidence: s.confidence,
                    connected: s.connected,
                }
            })
            .collect();

        let annotations = annotations
            .into_iter()
            .map(|a| ExportedAnnotation {
                action: a.action,
                confidence: a.confidence,
                start_sequence: a.start_sequence,
                window_length: a.window_length,
                start_offset_seconds: offset(a.interval_start()),
                end_offset_seconds: offset(a.interval_end() as i64),
            })
            .collect();

        let question_markers = questions
            .iter()
            .map(|q| ExportedQuestionMarker {
                sequence: q.sequence,
                offset_seconds: offset(q.sequence as i64),
                dropped_at: q.dropped_at,
                text: q.text.clone(),
            })
            .collect();

        let recording_markers = recordings
            .iter()
            .map(|r| ExportedRecording {
                start_sequence: r.start_sequence,
                end_sequence: r.end_sequence,
                start_offset_seconds: offset(r.start_sequence as i64),
                end_offset_seconds: r.end_sequence.map(|end| offset(end as i64)),
            })
            .collect();

        Self {
            exported_at,
            points_per_second,
            signal: SignalExport { samples },
            timeline: TimelineExport {
                session_messages: messages.to_vec(),
                question_markers,
                recording_markers,
                annotations,
            },
        }
    }

    /// Samples of the document, in order, with their anchored timestamps as wall clock
    pub fn samples(&self) -> impl Iterator<Item = Sample> + '_ {
        self.signal.samples.iter().map(|s| Sample {
            sequence: s.sequence,
            wall_clock: s.timestamp,
            raw_filtered: s.raw_filtered,
            raw_unfiltered: s.raw_unfiltered,
            position: s.position,
            tone_offset: s.tone_offset,
            classified_action: s.classified_action,
            confidence: s.confidence,
            connected: s.connected,
        })
    }

    pub fn annotations(&self) -> impl Iterator<Item = Annotation> + '_ {
        self.timeline.annotations.iter().map(|a| Annotation {
            action: a.action,
            confidence: a.confidence,
            start_sequence: a.start_sequence,
            window_length: a.window_length,
        })
    }

    pub fn question_markers(&self) -> impl Iterator<Item = QuestionMarker> + '_ {
        self.timeline
            .question_markers
            .iter()
            .map(|q| QuestionMarker {
                sequence: q.sequence,
                dropped_at: q.dropped_at,
                text: q.text.clone(),
            })
    }

    pub fn recordings(&self) -> impl Iterator<Item = RecordingInterval> + '_ {
        self.timeline
            .recording_markers
            .iter()
            .map(|r| RecordingInterval {
                start_sequence: r.start_sequence,
                end_sequence: r.end_sequence,
            })
    }

    /// Warnings about restoring this document into a timeline running at `points_per_second`
    pub fn compatibility_warnings(&self, points_per_second: f64) -> Vec<String> {
        let mut warnings = Vec::new();

        if (self.points_per_second - points_per_second).abs() > 1e-9 {
            warnings.push(format!(
                "Rate mismatch: document has {:.2} points/s, timeline runs at {:.2}",
                self.points_per_second, points_per_second
            ));
        }

        let ordered = self
            .signal
            .samples
            .windows(2)
            .all(|pair| pair[0].sequence < pair[1].sequence);
        if !ordered {
            warnings.push("Sample sequences are not strictly increasing".to_string());
        }

        warnings
    }

    /// Write as pretty JSON
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json =
            serde_json::to_string_pretty(self).context("Failed to serialize export document")?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write export file {}", path.display()))?;
        Ok(())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read export file {}", path.display()))?;
        let document: ExportDocument =
            serde_json::from_str(&json).context("Failed to parse export file")?;
        Ok(document)
    }
}
