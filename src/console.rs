// Operator console state
//
// The single owner of the gauge and the timeline. Inbound events and operator
// commands mutate it; the frame scheduler pulls a `RenderState` from `tick`.
// Shared as `Arc<Mutex<Console>>` so a dispatch and a tick never interleave.

use crate::bus::{Multiplexer, Subscription};
use crate::commands::{OperatorCommand, ZoomDirection};
use crate::config::TelemetryConfig;
use crate::error::TelemetryResult;
use crate::gauge::{CalibrationOutcome, GaugeEngine, GaugeState};
use crate::numeric::format_elapsed;
use crate::protocol::{kinds, InboundEvent, MeterEvent, ToneArmMotion};
use crate::timeline::{
    ChartFrame, ExportDocument, RecordingEdge, Timeline, TimelineStats, Viewport, ViewportAction,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Instrument and session status reported alongside the telemetry
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentStatus {
    pub hardware_connected: bool,
    pub samples_received: Option<u64>,
    pub ta_trend: Option<String>,
    pub ta_motion: Option<ToneArmMotion>,
    pub session_id: Option<String>,
    pub last_event_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl InstrumentStatus {
    fn update(&mut self, event: &MeterEvent, received_at: DateTime<Utc>) {
        self.hardware_connected = event.hardware_connected;
        if event.samples_received.is_some() {
            self.samples_received = event.samples_received;
        }
        if event.ta_trend.is_some() {
            self.ta_trend = event.ta_trend.clone();
        }
        if event.ta_motion.is_some() {
            self.ta_motion = event.ta_motion.clone();
        }
        if event.session_id.is_some() {
            self.session_id = event.session_id.clone();
        }
        self.last_event_at = Some(received_at);
    }
}

/// Everything a renderer needs for one frame
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderState {
    pub gauge: GaugeState,
    pub chart: ChartFrame,
    pub viewport: Viewport,
    pub stats: TimelineStats,
    pub status: InstrumentStatus,
}

/// Result of an operator command
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Applied,
    Calibrated(CalibrationOutcome),
    Viewport(Viewport),
    /// Export requested; the caller decides where to write it
    Export {
        document: Box<ExportDocument>,
        path: Option<PathBuf>,
    },
    Status(String),
}

pub struct Console {
    gauge: GaugeEngine,
    timeline: Timeline,
    status: InstrumentStatus,
}

impl Console {
    pub fn new(config: &TelemetryConfig) -> Self {
        Self {
            gauge: GaugeEngine::new(config.gauge.clone()),
            timeline: Timeline::new(config.timeline.clone()),
            status: InstrumentStatus::default(),
        }
    }

    pub fn gauge(&self) -> &GaugeEngine {
        &self.gauge
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn status(&self) -> &InstrumentStatus {
        &self.status
    }

    /// Apply one inbound event
    pub fn handle_event(&mut self, event: &InboundEvent, received_at: DateTime<Utc>) {
        match event {
            InboundEvent::Meter(meter) => {
                let ingested = self.timeline.apply_meter(meter, received_at);
                self.gauge.apply_sample(&ingested.sample);
                self.status.update(meter, received_at);
            }
            InboundEvent::Chat(chat) => {
                if let Some(marker) = self.timeline.apply_chat(chat) {
                    debug!("Question marker at sequence {}", marker.sequence);
                }
            }
            InboundEvent::SessionStarted(lifecycle) => {
                info!("Session started ({:?}), clearing timeline", lifecycle.session_id);
                self.timeline.reset();
                self.status.session_id = lifecycle.session_id.clone();
            }
            InboundEvent::SessionEnded(lifecycle) => {
                info!("Session ended ({:?})", lifecycle.session_id);
                self.timeline.end_session();
            }
            InboundEvent::SessionRecovered(recovered) => {
                info!(
                    "Session recovered ({:?}) with {} messages",
                    recovered.session_id,
                    recovered.messages.len()
                );
                match &recovered.snapshot {
                    Some(snapshot) => {
                        if let Err(e) = self.timeline.restore(snapshot) {
                            warn!("Snapshot not restored: {}", e);
                            self.timeline.reset();
                        }
                    }
                    None => self.timeline.reset(),
                }
                self.timeline.adopt_messages(recovered.messages.clone());
                if recovered.session_id.is_some() {
                    self.status.session_id = recovered.session_id.clone();
                }
            }
            InboundEvent::Recording(marker) => {
                if !self.timeline.mark_recording(marker.edge) {
                    debug!("Recording {:?} edge ignored", marker.edge);
                }
            }
            InboundEvent::Pong => debug!("Heartbeat acknowledged"),
            InboundEvent::Error(err) => {
                warn!("Backend error: {}", err.message);
                self.status.last_error = Some(err.message.clone());
            }
            InboundEvent::Other { kind, .. } => debug!("Ignoring {} message", kind),
        }
    }

    /// Advance one frame and snapshot everything the renderer needs
    pub fn tick(&mut self, now: Instant, plot_width: f64) -> RenderState {
        let gauge = self.gauge.tick(now);
        if let Some(outcome) = &gauge.calibration {
            debug!("Calibration during tick: {:?}", outcome);
        }
        RenderState {
            gauge,
            chart: self.timeline.chart_frame(plot_width),
            viewport: self.timeline.viewport(),
            stats: self.timeline.stats(),
            status: self.status.clone(),
        }
    }

    pub fn press_set(&mut self, now: Instant) {
        self.gauge.press_set(now);
    }

    pub fn release_set(&mut self, now: Instant) -> Option<CalibrationOutcome> {
        self.gauge.release_set(now)
    }

    pub fn cancel_set(&mut self) {
        self.gauge.cancel_set();
    }

    pub fn apply_viewport(&mut self, action: ViewportAction) -> Viewport {
        self.timeline.apply_viewport(action)
    }

    pub fn mark_recording(&mut self, edge: RecordingEdge) -> bool {
        self.timeline.mark_recording(edge)
    }

    pub fn export(&self, exported_at: DateTime<Utc>) -> ExportDocument {
        self.timeline.export(exported_at)
    }

    /// Load a previously exported timeline
    pub fn restore(&mut self, document: &ExportDocument) -> TelemetryResult<()> {
        self.timeline.restore(document)
    }

    /// One-line summary for the operator
    pub fn status_line(&self) -> String {
        let stats = self.timeline.stats();
        let viewport = self.timeline.viewport();
        let rate = self.timeline.config().points_per_second;
        let source = self
            .gauge
            .reading()
            .map_or("no signal".to_string(), |r| format!("{:?}", r.source));

        format!(
            "needle {:.1}° ({}) | {} samples ({}) | window {} | {}{}",
            self.gauge.angle(),
            source,
            stats.retained,
            format_elapsed(stats.retained_seconds),
            format_elapsed(viewport.window_size as f64 / rate),
            if viewport.paused { "paused" } else { "live" },
            if self.status.hardware_connected {
                ""
            } else {
                " | hardware disconnected"
            },
        )
    }

    pub fn apply_command(&mut self, command: &OperatorCommand, now: Instant) -> CommandOutcome {
        match command {
            OperatorCommand::Set => {
                self.press_set(now);
                CommandOutcome::Applied
            }
            OperatorCommand::Release => match self.release_set(now) {
                Some(outcome) => CommandOutcome::Calibrated(outcome),
                None => CommandOutcome::Applied,
            },
            OperatorCommand::Cancel => {
                self.cancel_set();
                CommandOutcome::Applied
            }
            OperatorCommand::Pause => CommandOutcome::Viewport(self.apply_viewport(ViewportAction::Pause)),
            OperatorCommand::Resume => {
                CommandOutcome::Viewport(self.apply_viewport(ViewportAction::Resume))
            }
            OperatorCommand::Pan(offset) => {
                CommandOutcome::Viewport(self.apply_viewport(ViewportAction::PanTo(*offset)))
            }
            OperatorCommand::Zoom(ZoomDirection::In) => {
                CommandOutcome::Viewport(self.apply_viewport(ViewportAction::ZoomIn))
            }
            OperatorCommand::Zoom(ZoomDirection::Out) => {
                CommandOutcome::Viewport(self.apply_viewport(ViewportAction::ZoomOut))
            }
            OperatorCommand::Sensitivity(value) => {
                self.gauge.set_sensitivity(*value);
                CommandOutcome::Applied
            }
            OperatorCommand::Smoothing(value) => {
                self.gauge.set_smoothing(*value);
                CommandOutcome::Applied
            }
            OperatorCommand::Tone(value) => {
                self.gauge.set_tone_offset(*value);
                CommandOutcome::Applied
            }
            OperatorCommand::Record(edge) => {
                self.mark_recording(*edge);
                CommandOutcome::Applied
            }
            OperatorCommand::Export(path) => CommandOutcome::Export {
                document: Box::new(self.export(Utc::now())),
                path: path.clone(),
            },
            OperatorCommand::Status => CommandOutcome::Status(self.status_line()),
        }
    }

    /// Route the inbound message types the console consumes into `console`
    pub fn attach(console: &Arc<Mutex<Console>>, mux: &Multiplexer) -> Vec<Subscription> {
        [
            kinds::METER_EVENT,
            kinds::CHAT_MESSAGE,
            kinds::SESSION_STARTED,
            kinds::SESSION_ENDED,
            kinds::SESSION_RECOVERED,
            kinds::RECORDING_MARKER,
            kinds::PONG,
            kinds::ERROR,
        ]
        .into_iter()
        .map(|kind| {
            let console = Arc::clone(console);
            mux.subscribe(kind, move |event| {
                console.lock().handle_event(event, Utc::now());
            })
        })
        .collect()
    }
}
