//! Live telemetry engine for the MindScope operator console.
//!
//! Streams instrument samples from the session backend over a WebSocket,
//! turns them into a damped gauge needle relative to an operator-set baseline,
//! and keeps a ten-minute rolling timeline with detected-event annotations,
//! transcript markers and JSON export.

pub mod bus;
pub mod commands;
pub mod config;
pub mod console;
pub mod error;
pub mod gauge;
pub mod numeric;
pub mod protocol;
pub mod timeline;
pub mod types;

pub use bus::{run_connection, Delivery, Multiplexer, Subscription, WILDCARD};
pub use commands::{OperatorCommand, ZoomDirection};
pub use config::{ConnectionConfig, GaugeConfig, TelemetryConfig, TimelineConfig};
pub use console::{CommandOutcome, Console, InstrumentStatus, RenderState};
pub use error::{TelemetryError, TelemetryResult};
pub use gauge::{CalibrationOutcome, GaugeEngine, GaugeState, SignalSource};
pub use protocol::{InboundEvent, WireMessage};
pub use timeline::{
    compute_viewport, ChartFrame, ExportDocument, Timeline, TimelineStats, Viewport,
    ViewportAction, ViewportLimits,
};
pub use types::{NeedleAction, Reading, Sample};
