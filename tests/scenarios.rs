// End-to-end behaviour of the telemetry engine through its public API

use chrono::{TimeDelta, Utc};
use mindscope_telemetry::protocol::MeterEvent;
use mindscope_telemetry::timeline::RecordingEdge;
use mindscope_telemetry::{
    compute_viewport, Console, Delivery, GaugeConfig, GaugeEngine, InboundEvent, Multiplexer,
    NeedleAction, Reading, Sample, TelemetryConfig, Timeline, TimelineConfig, Viewport,
    ViewportAction, ViewportLimits, WILDCARD,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn raw(value: f64) -> Reading {
    Reading {
        raw_filtered: Some(value),
        raw_unfiltered: Some(value),
        connected: true,
        ..Default::default()
    }
}

#[test]
fn scenario_a_needle_damps_toward_target_without_overshoot() {
    let config = GaugeConfig::default();
    let mut gauge = GaugeEngine::new(config.clone());
    gauge.set_sensitivity(16.0);
    let t0 = Instant::now();
    let now = Utc::now();

    for seq in 0..5 {
        gauge.apply_sample(&Sample::new(seq, now, raw(1000.0)));
    }
    assert_eq!(gauge.tick(t0).angle, config.set_angle);

    gauge.apply_sample(&Sample::new(5, now, raw(1200.0)));
    let target = gauge.target().unwrap();
    // Signal rose above the baseline, so the delta is negative
    assert!(target < config.set_angle);

    let mut previous = gauge.angle();
    for frame in 1..120 {
        let state = gauge.tick(t0 + Duration::from_millis(frame * 33));
        assert!(state.angle <= previous);
        assert!(state.angle >= target);
        assert!(state.angle >= config.arc_min && state.angle <= config.arc_max);
        previous = state.angle;
    }
    assert!((previous - target).abs() < 0.01);
}

#[test]
fn scenario_b_seven_hundred_seconds_keeps_last_six_hundred() {
    let mut timeline = Timeline::new(TimelineConfig::default());
    let t0 = Utc::now();
    for i in 0..7000 {
        timeline.apply_sample(raw(1000.0), t0 + TimeDelta::milliseconds(100 * i));
    }

    let stats = timeline.stats();
    assert_eq!(stats.retained, 6000);
    assert_eq!(stats.oldest_sequence, Some(1000));
    assert_eq!(stats.newest_sequence, Some(6999));
    assert_eq!(stats.evicted, 1000);
    assert_eq!(stats.retained_seconds, 600.0);

    let sequences: Vec<u64> = timeline.buffer().iter().map(|s| s.sequence).collect();
    assert!(sequences.windows(2).all(|w| w[1] == w[0] + 1));
}

#[test]
fn scenario_c_pause_pan_zoom_resume() {
    let mut timeline = Timeline::new(TimelineConfig::default());
    let t0 = Utc::now();
    for _ in 0..2000 {
        timeline.apply_sample(raw(1000.0), t0);
    }

    timeline.apply_viewport(ViewportAction::Pause);
    let v = timeline.apply_viewport(ViewportAction::PanTo(50));
    assert_eq!(v.offset, 50);
    let v = timeline.apply_viewport(ViewportAction::ZoomOut);
    assert_eq!(v.window_size, 720);
    assert!(v.paused);

    let v = timeline.apply_viewport(ViewportAction::Resume);
    assert_eq!(v.offset, 0);
    assert_eq!(v.window_size, 600);
    assert!(!v.paused);
}

#[test]
fn scenario_d_duplicate_correlation_id_dispatches_once() {
    let mux = Multiplexer::with_dedup_capacity(500);
    let hits = Arc::new(AtomicUsize::new(0));
    let h = hits.clone();
    let _sub = mux.subscribe(WILDCARD, move |_| {
        h.fetch_add(1, Ordering::SeqCst);
    });

    let frame = r#"{"type":"meter.event","data":{"rawSignal":1000.0},"correlationId":"m-1"}"#;
    assert_eq!(mux.handle_text(frame), Delivery::Dispatched(1));
    assert_eq!(mux.handle_text(frame), Delivery::Duplicate);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn scenario_e_annotation_offsets_match_sample_offsets() {
    let mut timeline = Timeline::new(TimelineConfig::default());
    let t0 = Utc::now();
    for i in 0..2 {
        timeline.apply_sample(raw(1000.0), t0 + TimeDelta::milliseconds(100 * i));
    }
    let event = MeterEvent {
        raw_signal: Some(1000.0),
        needle_action: Some(NeedleAction::Fall),
        confidence: Some(0.8),
        classified_at: Some(12.0),
        classify_window: Some(0.1),
        ..Default::default()
    };
    timeline.apply_meter(&event, t0 + TimeDelta::milliseconds(200));

    let document = timeline.export(Utc::now());
    let samples = &document.signal.samples;
    assert_eq!(samples.len(), 3);

    let annotation = &document.timeline.annotations[0];
    assert_eq!(annotation.start_sequence, 2);
    assert_eq!(annotation.window_length, 1);
    assert_eq!(annotation.start_offset_seconds, samples[1].offset_seconds);
    assert_eq!(annotation.end_offset_seconds, samples[2].offset_seconds);
}

#[test]
fn paused_timeline_ignores_telemetry() {
    let mut console = Console::new(&TelemetryConfig::default());
    for _ in 0..1000 {
        console.handle_event(
            &InboundEvent::Meter(MeterEvent {
                raw_signal: Some(1000.0),
                ..Default::default()
            }),
            Utc::now(),
        );
    }
    console.apply_viewport(ViewportAction::Pause);
    let v = console.apply_viewport(ViewportAction::PanTo(120));
    let len = console.timeline().buffer().len();

    for i in 0..500 {
        console.handle_event(
            &InboundEvent::Meter(MeterEvent {
                raw_signal: Some(1000.0 + i as f64),
                classified_at: Some(i as f64),
                needle_action: Some(NeedleAction::Rise),
                ..Default::default()
            }),
            Utc::now(),
        );
        console.mark_recording(RecordingEdge::Start);
    }

    assert_eq!(console.timeline().buffer().len(), len);
    assert_eq!(console.timeline().viewport(), v);
    assert!(console.timeline().annotations().is_empty());
    assert!(console.timeline().markers().recordings().is_empty());
}

#[test]
fn zoom_window_stays_within_bounds() {
    let limits = ViewportLimits::from_config(&TimelineConfig::default());
    let mut viewport = Viewport::live(&limits);
    let actions = [
        ViewportAction::ZoomIn,
        ViewportAction::ZoomOut,
        ViewportAction::ZoomOut,
        ViewportAction::PanBy(300),
        ViewportAction::ZoomIn,
        ViewportAction::ZoomIn,
        ViewportAction::ZoomIn,
        ViewportAction::PanBy(-40),
    ];
    for round in 0..40 {
        for (i, action) in actions.iter().enumerate() {
            let len = (round * 173 + i * 31) % 6001;
            viewport = compute_viewport(viewport, *action, len, &limits);
            assert!(viewport.window_size >= 50 && viewport.window_size <= 6000);
            assert!(viewport.offset <= len.saturating_sub(viewport.window_size));
        }
    }
}

#[test]
fn needle_stays_on_arc_for_erratic_input() {
    let mut console = Console::new(&TelemetryConfig::default());
    let config = GaugeConfig::default();
    let t0 = Instant::now();
    let values = [1000.0, 1e9, -1e9, 0.0, 50.0, f64::NAN, 1e-3, 2500.0, -4000.0];

    for (frame, value) in values.iter().cycle().take(400).enumerate() {
        console.handle_event(
            &InboundEvent::Meter(MeterEvent {
                raw_signal: Some(*value),
                raw_unfiltered: Some(value * 0.9),
                position: Some((frame % 10) as f64 / 10.0),
                tone_arm: Some((frame % 7) as f64),
                ..Default::default()
            }),
            Utc::now(),
        );
        let state = console.tick(t0 + Duration::from_millis(frame as u64 * 33), 640.0);
        assert!(state.gauge.angle >= config.arc_min && state.gauge.angle <= config.arc_max);
        if let Some((lo, hi)) = state.chart.y_range {
            assert!(lo < hi);
        }
    }
}

#[test]
fn chart_frame_projects_visible_window() {
    let mut timeline = Timeline::new(TimelineConfig::default());
    let t0 = Utc::now();
    for i in 0..100 {
        timeline.apply_sample(raw(1000.0 + i as f64), t0);
    }
    timeline.apply_viewport(ViewportAction::Pause);
    for _ in 0..20 {
        timeline.apply_viewport(ViewportAction::ZoomIn);
    }

    let frame = timeline.chart_frame(500.0);
    assert_eq!(frame.first_sequence, Some(50));
    assert_eq!(frame.last_sequence, Some(99));
    assert_eq!(frame.points.first().unwrap().x, 0.0);
    assert_eq!(frame.points.last().unwrap().x, 500.0);

    let (lo, hi) = frame.y_range.unwrap();
    assert!((lo - (1050.0 - 4.9)).abs() < 1e-9);
    assert!((hi - (1099.0 + 4.9)).abs() < 1e-9);
}
