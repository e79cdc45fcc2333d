// Shared numeric and formatting helpers
//
// Small pure functions used by both the gauge physics and the timeline: finite
// filtering, interpolation, range padding, sequence/time conversion and the
// elapsed-time formatting used in operator status lines.

use chrono::{DateTime, TimeDelta, Utc};

/// Keep a value only when it is present and finite
pub fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Linear interpolation from `a` (t = 0) to `b` (t = 1)
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Min and max over the finite values of an iterator
pub fn finite_extent<I>(values: I) -> Option<(f64, f64)>
where
    I: IntoIterator<Item = f64>,
{
    values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Pad an extent by a fraction of its span.
///
/// A flat extent (span of zero) is widened symmetrically to `min_span` so the
/// chart never divides by zero.
pub fn padded_range(min: f64, max: f64, padding: f64, min_span: f64) -> (f64, f64) {
    let span = max - min;
    if span <= f64::EPSILON {
        let half = min_span / 2.0;
        return (min - half, max + half);
    }
    let pad = span * padding;
    (min - pad, max + pad)
}

/// Map `value` from `[from_start, from_end]` linearly onto `[0, width]`
pub fn project(value: f64, from_start: f64, from_end: f64, width: f64) -> f64 {
    let span = from_end - from_start;
    if span.abs() <= f64::EPSILON {
        return 0.0;
    }
    (value - from_start) / span * width
}

/// Seconds between `origin` and `sequence` at `rate` samples per second.
///
/// Signed because annotation intervals may start before the oldest retained sample.
pub fn sequence_offset_seconds(sequence: i64, origin: u64, rate: f64) -> f64 {
    (sequence - origin as i64) as f64 / rate
}

/// Number of samples covering `seconds` at `rate`
pub fn seconds_to_samples(seconds: f64, rate: f64) -> usize {
    (seconds * rate).round().max(0.0) as usize
}

/// Shift a timestamp by fractional seconds (microsecond resolution)
pub fn shift_seconds(origin: DateTime<Utc>, seconds: f64) -> DateTime<Utc> {
    origin + TimeDelta::microseconds((seconds * 1_000_000.0).round() as i64)
}

/// Convert fractional epoch seconds to a UTC timestamp
pub fn epoch_to_datetime(epoch_seconds: f64) -> Option<DateTime<Utc>> {
    if !epoch_seconds.is_finite() {
        return None;
    }
    let secs = epoch_seconds.floor();
    let nanos = ((epoch_seconds - secs) * 1_000_000_000.0).round() as u32;
    DateTime::from_timestamp(secs as i64, nanos.min(999_999_999))
}

/// Format seconds as `m:ss.s`
pub fn format_elapsed(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let minutes = (seconds / 60.0).floor() as u64;
    let rest = seconds - minutes as f64 * 60.0;
    format!("{}:{:04.1}", minutes, rest)
}
