// Viewport and chart projection
//
// The viewport selects a window of the retained samples counted back from the
// newest one. `compute_viewport` is the only way it changes; `ChartFrame`
// projects the visible window and its overlays onto plot coordinates.

use super::annotations::AnnotationLog;
use super::buffer::SampleBuffer;
use super::markers::MarkerLog;
use crate::config::TimelineConfig;
use crate::numeric::{finite_extent, padded_range, project, seconds_to_samples};
use crate::types::NeedleAction;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Visible window, in samples, counted back from the newest retained sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub window_size: usize,
    /// Samples between the newest retained sample and the right edge
    pub offset: usize,
    pub paused: bool,
}

impl Viewport {
    pub fn live(limits: &ViewportLimits) -> Self {
        Self {
            window_size: limits.default_window,
            offset: 0,
            paused: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewportAction {
    Pause,
    Resume,
    /// Set the offset, clamped to the buffer
    PanTo(usize),
    /// Move the offset by a signed number of samples (positive is further back)
    PanBy(i64),
    ZoomIn,
    ZoomOut,
}

/// Window bounds in samples
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportLimits {
    pub default_window: usize,
    pub min_window: usize,
    pub max_window: usize,
    pub zoom_in_factor: f64,
    pub zoom_out_factor: f64,
}

impl ViewportLimits {
    pub fn from_config(config: &TimelineConfig) -> Self {
        let rate = config.points_per_second;
        let min_window = seconds_to_samples(config.min_window_seconds, rate).max(1);
        let max_window = seconds_to_samples(config.max_window_seconds, rate).max(min_window);
        Self {
            default_window: seconds_to_samples(config.default_window_seconds, rate)
                .clamp(min_window, max_window),
            min_window,
            max_window,
            zoom_in_factor: config.zoom_in_factor,
            zoom_out_factor: config.zoom_out_factor,
        }
    }
}

fn max_offset(buffer_len: usize, window_size: usize) -> usize {
    buffer_len.saturating_sub(window_size)
}

fn zoom(viewport: Viewport, factor: f64, buffer_len: usize, limits: &ViewportLimits) -> Viewport {
    let scaled = (viewport.window_size as f64 * factor).round();
    let window_size = if scaled.is_finite() && scaled > 0.0 {
        (scaled as usize).clamp(limits.min_window, limits.max_window)
    } else {
        viewport.window_size
    };
    Viewport {
        window_size,
        offset: viewport.offset.min(max_offset(buffer_len, window_size)),
        paused: true,
    }
}

/// Apply one viewport action.
///
/// Pure: the result depends only on the arguments. Pan is ignored while live,
/// zoom pauses, resume returns to the live default window.
pub fn compute_viewport(
    viewport: Viewport,
    action: ViewportAction,
    buffer_len: usize,
    limits: &ViewportLimits,
) -> Viewport {
    match action {
        ViewportAction::Pause => Viewport {
            paused: true,
            ..viewport
        },
        ViewportAction::Resume => Viewport::live(limits),
        ViewportAction::PanTo(_) | ViewportAction::PanBy(_) if !viewport.paused => viewport,
        ViewportAction::PanTo(offset) => Viewport {
            offset: offset.min(max_offset(buffer_len, viewport.window_size)),
            ..viewport
        },
        ViewportAction::PanBy(delta) => {
            let offset = if delta >= 0 {
                viewport.offset.saturating_add(delta as usize)
            } else {
                viewport.offset.saturating_sub(delta.unsigned_abs() as usize)
            };
            Viewport {
                offset: offset.min(max_offset(buffer_len, viewport.window_size)),
                ..viewport
            }
        }
        ViewportAction::ZoomIn => zoom(viewport, limits.zoom_in_factor, buffer_len, limits),
        ViewportAction::ZoomOut => zoom(viewport, limits.zoom_out_factor, buffer_len, limits),
    }
}

/// Buffer indices covered by the viewport
pub fn visible_range(viewport: &Viewport, buffer_len: usize) -> Range<usize> {
    let end = buffer_len.saturating_sub(viewport.offset);
    let start = end.saturating_sub(viewport.window_size);
    start..end
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartPoint {
    pub sequence: u64,
    pub x: f64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationSpan {
    pub action: NeedleAction,
    pub confidence: f64,
    pub x_start: f64,
    pub x_end: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionTick {
    pub sequence: u64,
    pub x: f64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSpan {
    pub x_start: f64,
    pub x_end: f64,
    pub open: bool,
}

/// Everything needed to draw one frame of the strip chart
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartFrame {
    pub width: f64,
    pub first_sequence: Option<u64>,
    pub last_sequence: Option<u64>,
    /// Auto-ranged y axis; `None` when no visible sample has a value
    pub y_range: Option<(f64, f64)>,
    pub points: Vec<ChartPoint>,
    pub annotations: Vec<AnnotationSpan>,
    pub questions: Vec<QuestionTick>,
    pub recordings: Vec<RecordingSpan>,
}

impl ChartFrame {
    pub fn build(
        buffer: &SampleBuffer,
        annotations: &AnnotationLog,
        markers: &MarkerLog,
        viewport: &Viewport,
        width: f64,
        config: &TimelineConfig,
    ) -> Self {
        let range = visible_range(viewport, buffer.len());
        let (Some(first), Some(last)) = (buffer.get(range.start), range.end.checked_sub(1).and_then(|i| buffer.get(i)))
        else {
            return Self {
                width,
                ..Default::default()
            };
        };
        let (first, last) = (first.sequence, last.sequence);
        let x_of = |sequence: f64| project(sequence, first as f64, last as f64, width).clamp(0.0, width);

        let points: Vec<ChartPoint> = buffer
            .slice(range.start, range.end)
            .filter_map(|s| {
                s.chart_value().map(|value| ChartPoint {
                    sequence: s.sequence,
                    x: x_of(s.sequence as f64),
                    value,
                })
            })
            .collect();

        let y_range = finite_extent(points.iter().map(|p| p.value))
            .map(|(lo, hi)| padded_range(lo, hi, config.auto_range_padding, config.min_y_span));

        let annotations = annotations
            .intersecting(first, last)
            .map(|a| AnnotationSpan {
                action: a.action,
                confidence: a.confidence,
                x_start: x_of(a.interval_start() as f64),
                x_end: x_of(a.interval_end() as f64),
            })
            .collect();

        let questions = markers
            .questions()
            .iter()
            .filter(|q| q.sequence >= first && q.sequence <= last)
            .map(|q| QuestionTick {
                sequence: q.sequence,
                x: x_of(q.sequence as f64),
                text: q.text.clone(),
            })
            .collect();

        let recordings = markers
            .recordings()
            .iter()
            .filter(|r| r.intersects(first, last))
            .map(|r| RecordingSpan {
                x_start: x_of(r.start_sequence as f64),
                x_end: x_of(r.end_sequence.unwrap_or(last) as f64),
                open: r.is_open(),
            })
            .collect();

        Self {
            width,
            first_sequence: Some(first),
            last_sequence: Some(last),
            y_range,
            points,
            annotations,
            questions,
            recordings,
        }
    }
}
