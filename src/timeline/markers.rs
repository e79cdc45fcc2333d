// Question and recording markers
//
// Question markers pin a transcript event to the sample that was live when the
// question was put. Recording markers arrive as bare start/end edges and are
// paired into intervals by order as they arrive.

use super::buffer::SampleBuffer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionMarker {
    pub sequence: u64,
    pub dropped_at: DateTime<Utc>,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingEdge {
    Start,
    End,
}

/// A recording interval; `end_sequence` is `None` while still open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingInterval {
    pub start_sequence: u64,
    pub end_sequence: Option<u64>,
}

impl RecordingInterval {
    pub fn is_open(&self) -> bool {
        self.end_sequence.is_none()
    }

    /// Whether the interval overlaps `[first, last]`; an open interval runs through `last`
    pub fn intersects(&self, first: u64, last: u64) -> bool {
        let end = self.end_sequence.unwrap_or(u64::MAX);
        self.start_sequence <= last && end >= first
    }
}

#[derive(Debug, Clone, Default)]
pub struct MarkerLog {
    questions: Vec<QuestionMarker>,
    recordings: Vec<RecordingInterval>,
}

impl MarkerLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn questions(&self) -> &[QuestionMarker] {
        &self.questions
    }

    pub fn recordings(&self) -> &[RecordingInterval] {
        &self.recordings
    }

    pub fn open_recording(&self) -> Option<&RecordingInterval> {
        self.recordings.last().filter(|r| r.is_open())
    }

    /// Place a question marker at the latest sample not after `dropped_at`.
    ///
    /// Returns `None` for a drop time already marked or with no sample to pin to.
    pub fn add_question(
        &mut self,
        buffer: &SampleBuffer,
        dropped_at: DateTime<Utc>,
        text: impl Into<String>,
    ) -> Option<&QuestionMarker> {
        if self.questions.iter().any(|q| q.dropped_at == dropped_at) {
            return None;
        }
        let sequence = buffer.latest_at_or_before(dropped_at)?.sequence;

        // Keep markers ordered by sequence even if drops arrive out of order
        let marker = QuestionMarker {
            sequence,
            dropped_at,
            text: text.into(),
        };
        let index = self.questions.partition_point(|q| q.sequence <= sequence);
        self.questions.insert(index, marker);
        self.questions.get(index)
    }

    /// Apply one recording edge at `sequence`. Returns false when the edge was
    /// ignored (a start while one is open, or an end with nothing open).
    pub fn apply_edge(&mut self, edge: RecordingEdge, sequence: u64) -> bool {
        let open = self.recordings.last_mut().filter(|r| r.is_open());
        match (edge, open) {
            (RecordingEdge::Start, Some(_)) | (RecordingEdge::End, None) => false,
            (RecordingEdge::Start, None) => {
                self.recordings.push(RecordingInterval {
                    start_sequence: sequence,
                    end_sequence: None,
                });
                true
            }
            (RecordingEdge::End, Some(last)) => {
                last.end_sequence = Some(sequence.max(last.start_sequence));
                true
            }
        }
    }

    /// Drop markers lying entirely before `oldest_sequence`
    pub fn evict_before(&mut self, oldest_sequence: u64) {
        self.questions.retain(|q| q.sequence >= oldest_sequence);
        self.recordings
            .retain(|r| r.end_sequence.map_or(true, |end| end >= oldest_sequence));
    }

    pub fn restore(
        &mut self,
        questions: impl IntoIterator<Item = QuestionMarker>,
        recordings: impl IntoIterator<Item = RecordingInterval>,
    ) {
        self.questions = questions.into_iter().collect();
        self.questions.sort_by_key(|q| q.sequence);
        self.recordings = recordings.into_iter().collect();
    }

    pub fn clear(&mut self) {
        self.questions.clear();
        self.recordings.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Reading, Sample};
    use chrono::TimeDelta;

    fn buffer_at(t0: DateTime<Utc>, count: u64) -> SampleBuffer {
        let mut buffer = SampleBuffer::new(100);
        for seq in 0..count {
            buffer.push(Sample::new(
                seq,
                t0 + TimeDelta::milliseconds(100 * seq as i64),
                Reading::default(),
            ));
        }
        buffer
    }

    #[test]
    fn test_question_pinned_to_latest_prior_sample() {
        let t0 = Utc::now();
        let buffer = buffer_at(t0, 10);
        let mut log = MarkerLog::new();

        let marker = log
            .add_question(&buffer, t0 + TimeDelta::milliseconds(430), "When?")
            .unwrap();
        assert_eq!(marker.sequence, 4);
    }

    #[test]
    fn test_duplicate_drop_time_ignored() {
        let t0 = Utc::now();
        let buffer = buffer_at(t0, 10);
        let mut log = MarkerLog::new();
        let at = t0 + TimeDelta::milliseconds(200);
        assert!(log.add_question(&buffer, at, "a").is_some());
        assert!(log.add_question(&buffer, at, "a again").is_none());
        assert_eq!(log.questions().len(), 1);
    }

    #[test]
    fn test_drop_before_buffer_has_no_anchor() {
        let t0 = Utc::now();
        let buffer = buffer_at(t0, 3);
        let mut log = MarkerLog::new();
        assert!(log
            .add_question(&buffer, t0 - TimeDelta::seconds(5), "early")
            .is_none());
    }

    #[test]
    fn test_recording_pairing_by_order() {
        let mut log = MarkerLog::new();
        assert!(!log.apply_edge(RecordingEdge::End, 1));
        assert!(log.apply_edge(RecordingEdge::Start, 5));
        assert!(!log.apply_edge(RecordingEdge::Start, 7));
        assert!(log.apply_edge(RecordingEdge::End, 9));
        assert!(!log.apply_edge(RecordingEdge::End, 10));
        assert!(log.apply_edge(RecordingEdge::Start, 12));

        assert_eq!(
            log.recordings(),
            &[
                RecordingInterval {
                    start_sequence: 5,
                    end_sequence: Some(9)
                },
                RecordingInterval {
                    start_sequence: 12,
                    end_sequence: None
                },
            ]
        );
        assert!(log.open_recording().is_some());
    }

    #[test]
    fn test_evict_keeps_open_recording() {
        let mut log = MarkerLog::new();
        log.apply_edge(RecordingEdge::Start, 1);
        log.apply_edge(RecordingEdge::End, 3);
        log.apply_edge(RecordingEdge::Start, 4);
        log.evict_before(50);
        assert_eq!(log.recordings().len(), 1);
        assert!(log.recordings()[0].is_open());
    }
}
