#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use framewatch_core::{MonitorRunner, RunOutcome, RunnerSettings};
use framewatch_logging::{LogFormat, Logger};
use framewatch_probe::{MonitorConfig, MonitorOptions, ProbeMonitor};
use tempfile::TempDir;
use tokio::time::timeout;

/// Helper: write an executable shell script standing in for the probe.
fn fake_probe(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-probe");
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Helper: a runner whose structured log goes to `dir/run.jsonl`.
fn runner(dir: &Path, probe: PathBuf, settings: RunnerSettings) -> MonitorRunner {
    let config = MonitorConfig::from_options(MonitorOptions {
        probe_path: Some(probe),
        stop_guard_timeout_ms: Some(500),
        ..Default::default()
    })
    .unwrap();
    let (monitor, events) = ProbeMonitor::new("srt://example:9000", config);
    let logger = Logger::with_file(LogFormat::Compact, &dir.join("run.jsonl")).unwrap();
    MonitorRunner::new(monitor, events, Arc::new(logger)).with_settings(settings)
}

fn logged_events(dir: &Path) -> Vec<serde_json::Value> {
    fs::read_to_string(dir.join("run.jsonl"))
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn quick_settings() -> RunnerSettings {
    RunnerSettings {
        stats_interval: Duration::from_secs(60),
        max_restarts: 2,
        restart_delay: Duration::from_millis(10),
        max_pending_frames: 1000,
    }
}

/// Probe output: `gops` one-second GOPs of 25 frames, then the next key frame.
fn frame_script(gops: usize) -> String {
    let mut out = String::from("cat <<'EOF'\n");
    for i in 0..=(gops * 25) {
        let key = i % 25 == 0;
        out.push_str(&format!(
            "[FRAME]\nmedia_type=video\nkey_frame={}\npict_type={}\npkt_pts_time={:.6}\npkt_size=5000\nwidth=1280\nheight=720\n[/FRAME]\n",
            if key { 1 } else { 0 },
            if key { "I" } else { "P" },
            i as f64 * 0.04
        ));
    }
    out.push_str("EOF\n");
    out
}

// ============================================================
// Run outcomes
// ============================================================

#[tokio::test]
async fn test_stream_end_completes_run() {
    let dir = TempDir::new().unwrap();
    let probe = fake_probe(dir.path(), &format!("{}exit 0", frame_script(1)));

    let outcome = timeout(
        Duration::from_secs(10),
        runner(dir.path(), probe, quick_settings()).run(),
    )
    .await
    .unwrap()
    .unwrap();

    assert!(matches!(outcome, RunOutcome::Completed { restarts: 0, .. }));
    assert_eq!(outcome.exit_code(), 0);

    let events = logged_events(dir.path());
    assert_eq!(events.first().unwrap()["event"], "monitor_started");
    assert_eq!(events.last().unwrap()["event"], "monitor_stopped");
}

#[tokio::test]
async fn test_abnormal_exits_restart_until_limit() {
    let dir = TempDir::new().unwrap();
    let counter = dir.path().join("starts");
    let probe = fake_probe(
        dir.path(),
        &format!(
            "echo start >> '{}'\necho 'Connection refused' >&2\nexit 1",
            counter.display()
        ),
    );

    let outcome = timeout(
        Duration::from_secs(10),
        runner(dir.path(), probe, quick_settings()).run(),
    )
    .await
    .unwrap()
    .unwrap();

    match &outcome {
        RunOutcome::Failed {
            restarts, error, ..
        } => {
            assert_eq!(*restarts, 2);
            assert!(error.contains("exit 1"), "{}", error);
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(fs::read_to_string(&counter).unwrap().lines().count(), 3);

    let events = logged_events(dir.path());
    let restarts = events
        .iter()
        .filter(|e| e["event"] == "probe_restarting")
        .count();
    assert_eq!(restarts, 2);
    assert!(events
        .iter()
        .any(|e| e["event"] == "probe_exited" && e["detail"] == "Connection refused"));
}

#[tokio::test]
async fn test_missing_probe_fails_without_restart() {
    let dir = TempDir::new().unwrap();
    let outcome = timeout(
        Duration::from_secs(10),
        runner(dir.path(), dir.path().join("missing"), quick_settings()).run(),
    )
    .await
    .unwrap()
    .unwrap();

    assert!(matches!(outcome, RunOutcome::Failed { restarts: 0, .. }));
}

#[tokio::test]
async fn test_interrupt_stops_probe() {
    let dir = TempDir::new().unwrap();
    let probe = fake_probe(dir.path(), "exec sleep 30");

    let runner = runner(dir.path(), probe, quick_settings());
    let interrupt = runner.interrupt_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        interrupt.store(true, Ordering::SeqCst);
    });

    let outcome = timeout(Duration::from_secs(10), runner.run())
        .await
        .unwrap()
        .unwrap();

    assert!(matches!(outcome, RunOutcome::Interrupted { .. }));
    assert_eq!(outcome.exit_code(), 130);
}

// ============================================================
// Stats sampling
// ============================================================

#[tokio::test]
async fn test_periodic_stats_are_logged() {
    let dir = TempDir::new().unwrap();
    let probe = fake_probe(
        dir.path(),
        &format!("{}exec sleep 30", frame_script(2)),
    );
    let settings = RunnerSettings {
        stats_interval: Duration::from_millis(200),
        ..quick_settings()
    };

    let runner = runner(dir.path(), probe, settings);
    let interrupt = runner.interrupt_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(700)).await;
        interrupt.store(true, Ordering::SeqCst);
    });

    let outcome = timeout(Duration::from_secs(10), runner.run())
        .await
        .unwrap()
        .unwrap();
    assert!(outcome.samples() >= 1);

    let events = logged_events(dir.path());
    let encoder = events
        .iter()
        .find(|e| e["event"] == "encoder_stats")
        .expect("no encoder stats logged");
    assert_eq!(encoder["gops"], 2);
    assert_eq!(encoder["aspect_ratio"], "16:9");
    assert_eq!(encoder["width"], 1280);
    assert_eq!(encoder["fps_mean"], 25.0);
    assert_eq!(encoder["identical_gops"], true);
    assert_eq!(encoder["has_audio"], false);

    assert!(events
        .iter()
        .any(|e| e["event"] == "network_stats" && e["media_type"] == "video" && e["frames"] == 51));
}
