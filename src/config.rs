// Engine configuration
//
// Every tuned constant of the console lives here with its default. Values can be
// overridden from `MINDSCOPE_*` environment variables (a `.env` file is loaded by
// the binary first) and from the command line.

use crate::error::{TelemetryError, TelemetryResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default backend endpoint
pub const DEFAULT_URL: &str = "ws://127.0.0.1:8765";

/// Connection and bus settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// WebSocket URL of the instrument backend
    pub url: String,

    /// Delay before the single reconnection attempt after a disconnect
    pub reconnect_delay_ms: u64,

    /// Interval between heartbeat pings while connected (0 disables)
    pub heartbeat_interval_secs: u64,

    /// Size at which the correlation id dedup set is cleared
    pub dedup_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            reconnect_delay_ms: 2000,
            heartbeat_interval_secs: 30,
            dedup_capacity: 500,
        }
    }
}

impl ConnectionConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_secs > 0).then(|| Duration::from_secs(self.heartbeat_interval_secs))
    }
}

/// Gauge geometry and physics constants (angles in degrees)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaugeConfig {
    /// Needle angle when the signal equals the baseline
    pub set_angle: f64,
    pub arc_min: f64,
    pub arc_max: f64,

    /// Raw magnitude above which the absolute raw representation is preferred
    pub magnitude_floor: f64,

    /// Degrees per raw unit per sensitivity step
    pub raw_domain_scale: f64,

    /// Degrees per position unit per sensitivity step
    pub position_domain_scale: f64,

    /// Tone offset that contributes no deflection
    pub neutral_tone_offset: f64,

    /// Degrees per tone offset unit
    pub tone_scale: f64,

    /// Damping at smoothing 0 (snappy) and smoothing 100 (smooth)
    pub min_damping: f64,
    pub max_damping: f64,

    /// How long SET must be held to commit a full recalibration
    pub hold_threshold_ms: u64,

    pub default_sensitivity: f64,
    pub default_smoothing: f64,
}

impl Default for GaugeConfig {
    fn default() -> Self {
        Self {
            set_angle: -20.0,
            arc_min: -55.0,
            arc_max: 55.0,
            magnitude_floor: 100.0,
            raw_domain_scale: 0.005,
            position_domain_scale: 6.0,
            neutral_tone_offset: 2.0,
            tone_scale: 4.0,
            min_damping: 0.5,
            max_damping: 0.95,
            hold_threshold_ms: 2000,
            default_sensitivity: 16.0,
            default_smoothing: 50.0,
        }
    }
}

impl GaugeConfig {
    pub fn hold_threshold(&self) -> Duration {
        Duration::from_millis(self.hold_threshold_ms)
    }
}

/// Rolling buffer, viewport and export settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineConfig {
    /// Telemetry events per second delivered by the backend
    pub points_per_second: f64,

    /// Retention horizon in seconds
    pub retention_seconds: f64,

    pub default_window_seconds: f64,
    pub min_window_seconds: f64,
    pub max_window_seconds: f64,

    /// Window scale per zoom step
    pub zoom_in_factor: f64,
    pub zoom_out_factor: f64,

    /// Fractional padding applied to the auto-ranged y axis
    pub auto_range_padding: f64,

    /// Span used for the y axis when every visible value is identical
    pub min_y_span: f64,

    /// Annotation length when a classification omits its window
    pub default_classify_window_seconds: f64,

    /// Transcript lines kept per session; the oldest are dropped past this
    pub max_session_messages: usize,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            points_per_second: 10.0,
            retention_seconds: 600.0,
            default_window_seconds: 60.0,
            min_window_seconds: 5.0,
            max_window_seconds: 600.0,
            zoom_in_factor: 0.83,
            zoom_out_factor: 1.2,
            auto_range_padding: 0.1,
            min_y_span: 1.0,
            default_classify_window_seconds: 2.0,
            max_session_messages: 5000,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub connection: ConnectionConfig,
    pub gauge: GaugeConfig,
    pub timeline: TimelineConfig,
}

fn env_parse<T: FromStr>(key: &str, target: &mut T) -> TelemetryResult<()> {
    if let Ok(raw) = env::var(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|_| TelemetryError::InvalidConfig(format!("{} has invalid value '{}'", key, raw)))?;
    }
    Ok(())
}

impl TelemetryConfig {
    /// Defaults overridden by `MINDSCOPE_*` environment variables
    pub fn from_env() -> TelemetryResult<Self> {
        let mut config = Self::default();

        if let Ok(url) = env::var("MINDSCOPE_URL") {
            config.connection.url = url;
        }
        env_parse("MINDSCOPE_RECONNECT_DELAY_MS", &mut config.connection.reconnect_delay_ms)?;
        env_parse("MINDSCOPE_HEARTBEAT_SECONDS", &mut config.connection.heartbeat_interval_secs)?;
        env_parse("MINDSCOPE_MAGNITUDE_FLOOR", &mut config.gauge.magnitude_floor)?;
        env_parse("MINDSCOPE_SENSITIVITY", &mut config.gauge.default_sensitivity)?;
        env_parse("MINDSCOPE_SMOOTHING", &mut config.gauge.default_smoothing)?;
        env_parse("MINDSCOPE_POINTS_PER_SECOND", &mut config.timeline.points_per_second)?;
        env_parse("MINDSCOPE_RETENTION_SECONDS", &mut config.timeline.retention_seconds)?;
        env_parse("MINDSCOPE_MAX_SESSION_MESSAGES", &mut config.timeline.max_session_messages)?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the engines cannot work with
    pub fn validate(&self) -> TelemetryResult<()> {
        let gauge = &self.gauge;
        let timeline = &self.timeline;

        if !(gauge.arc_min < gauge.arc_max) {
            return Err(TelemetryError::InvalidConfig(format!(
                "arc_min ({}) must be below arc_max ({})",
                gauge.arc_min, gauge.arc_max
            )));
        }
        if gauge.set_angle < gauge.arc_min || gauge.set_angle > gauge.arc_max {
            return Err(TelemetryError::InvalidConfig(format!(
                "set_angle ({}) must lie within the arc",
                gauge.set_angle
            )));
        }
        if !(0.0..1.0).contains(&gauge.min_damping) || !(0.0..1.0).contains(&gauge.max_damping) {
            return Err(TelemetryError::InvalidConfig(
                "damping factors must be in [0, 1)".to_string(),
            ));
        }
        if !(gauge.magnitude_floor >= 0.0) {
            return Err(TelemetryError::InvalidConfig(
                "magnitude_floor must be non-negative".to_string(),
            ));
        }
        if !(timeline.points_per_second > 0.0) {
            return Err(TelemetryError::InvalidConfig(
                "points_per_second must be positive".to_string(),
            ));
        }
        if !(timeline.min_window_seconds > 0.0)
            || timeline.min_window_seconds > timeline.max_window_seconds
        {
            return Err(TelemetryError::InvalidConfig(format!(
                "window bounds [{}, {}] are inconsistent",
                timeline.min_window_seconds, timeline.max_window_seconds
            )));
        }
        if timeline.default_window_seconds < timeline.min_window_seconds
            || timeline.default_window_seconds > timeline.max_window_seconds
        {
            return Err(TelemetryError::InvalidConfig(format!(
                "default window {}s is outside the window bounds",
                timeline.default_window_seconds
            )));
        }
        if timeline.retention_seconds < timeline.max_window_seconds {
            return Err(TelemetryError::InvalidConfig(format!(
                "retention ({}s) must cover the widest window ({}s)",
                timeline.retention_seconds, timeline.max_window_seconds
            )));
        }
        if self.connection.dedup_capacity == 0 {
            return Err(TelemetryError::InvalidConfig(
                "dedup_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TelemetryConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.connection.reconnect_delay(), Duration::from_secs(2));
        assert_eq!(config.connection.dedup_capacity, 500);
        assert_eq!(config.gauge.hold_threshold(), Duration::from_secs(2));
    }

    #[test]
    fn test_inverted_arc_rejected() {
        let mut config = TelemetryConfig::default();
        config.gauge.arc_min = 10.0;
        config.gauge.arc_max = -10.0;
        assert!(matches!(
            config.validate(),
            Err(TelemetryError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_retention_must_cover_max_window() {
        let mut config = TelemetryConfig::default();
        config.timeline.retention_seconds = 120.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_heartbeat_can_be_disabled() {
        let mut config = ConnectionConfig::default();
        config.heartbeat_interval_secs = 0;
        assert!(config.heartbeat_interval().is_none());
    }
}
