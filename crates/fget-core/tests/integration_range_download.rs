//! Integration test: local HTTP server with Range support, multi-segment
//! download through the full engine, and common fallback paths.
//!
//! Starts a minimal range-capable server, adds a task to a fresh engine, runs
//! it to completion, and asserts the downloaded file matches the served body.

mod common;

use std::time::Duration;

use fget_core::task::TaskStatus;
use fget_core::{Engine, EngineConfig};
use tempfile::tempdir;

const WAIT: Duration = Duration::from_secs(30);

fn engine_with(download_dir: &std::path::Path) -> std::sync::Arc<Engine> {
    let mut cfg = EngineConfig::default();
    cfg.default_save_path = download_dir.to_path_buf();
    cfg.verify_checksum = true;
    Engine::new(cfg)
}

#[test]
fn multi_segment_download_completes_and_file_matches() {
    let body: Vec<u8> = (0u8..100).cycle().take(64 * 1024).collect();
    let url = common::range_server::start(body.clone());

    let download_dir = tempdir().unwrap();
    let engine = engine_with(download_dir.path());
    let save_path = download_dir.path().join("download.bin");
    let id = engine.add_task(&url, &save_path, Some(4));

    let snapshot = engine.wait_for_task(&id, WAIT).expect("task reached terminal state");
    engine.shutdown();

    assert_eq!(
        snapshot.status,
        TaskStatus::Completed,
        "task should complete: {:?}",
        snapshot.error_message
    );
    let content = std::fs::read(&save_path).unwrap();
    assert_eq!(content.len(), body.len(), "file size must match");
    assert_eq!(content, body, "file content must match");
}

#[test]
fn head_blocked_falls_back_to_range_probe_and_completes() {
    let body: Vec<u8> = (0u8..100).cycle().take(32 * 1024).collect();
    let url = common::range_server::start_with_options(
        body.clone(),
        common::range_server::RangeServerOptions {
            head_allowed: false,
            support_ranges: true,
            advertise_ranges: true,
        },
    );

    let download_dir = tempdir().unwrap();
    let engine = engine_with(download_dir.path());
    let save_path = download_dir.path().join("download.bin");
    let id = engine.add_task(&url, &save_path, Some(4));

    let snapshot = engine.wait_for_task(&id, WAIT).expect("task reached terminal state");
    engine.shutdown();

    assert_eq!(
        snapshot.status,
        TaskStatus::Completed,
        "task should complete: {:?}",
        snapshot.error_message
    );
    let content = std::fs::read(&save_path).unwrap();
    assert_eq!(content, body);
}

#[test]
fn no_range_server_falls_back_to_single_stream_get() {
    let body: Vec<u8> = (0u8..100).cycle().take(32 * 1024).collect();
    let url = common::range_server::start_with_options(
        body.clone(),
        common::range_server::RangeServerOptions {
            head_allowed: true,
            support_ranges: false,
            advertise_ranges: false,
        },
    );

    let download_dir = tempdir().unwrap();
    let engine = engine_with(download_dir.path());
    let save_path = download_dir.path().join("download.bin");
    let id = engine.add_task(&url, &save_path, Some(4));

    let snapshot = engine.wait_for_task(&id, WAIT).expect("task reached terminal state");
    engine.shutdown();

    assert_eq!(
        snapshot.status,
        TaskStatus::Completed,
        "task should complete: {:?}",
        snapshot.error_message
    );
    let content = std::fs::read(&save_path).unwrap();
    assert_eq!(content, body);
}

#[test]
fn ranges_advertised_but_unused_still_completes() {
    // Accept-Ranges is sent but the server ignores Range and always returns
    // the full body; the engine must still finish rather than looping.
    let body: Vec<u8> = (0u8..50).cycle().take(16 * 1024).collect();
    let url = common::range_server::start_with_options(
        body.clone(),
        common::range_server::RangeServerOptions {
            head_allowed: true,
            support_ranges: false,
            advertise_ranges: true,
        },
    );

    let download_dir = tempdir().unwrap();
    let engine = engine_with(download_dir.path());
    let save_path = download_dir.path().join("download.bin");
    let id = engine.add_task(&url, &save_path, Some(8));

    let snapshot = engine.wait_for_task(&id, WAIT).expect("task reached terminal state");
    engine.shutdown();

    assert_eq!(
        snapshot.status,
        TaskStatus::Completed,
        "task should complete: {:?}",
        snapshot.error_message
    );
    let content = std::fs::read(&save_path).unwrap();
    assert_eq!(content, body);
}

#[test]
fn checksum_mismatch_surfaces_as_task_error() {
    let body: Vec<u8> = (0u8..100).cycle().take(8 * 1024).collect();
    let url = common::range_server::start(body.clone());

    let download_dir = tempdir().unwrap();
    let mut cfg = EngineConfig::default();
    cfg.default_save_path = download_dir.path().to_path_buf();
    cfg.max_retries = 0;
    let engine = Engine::new(cfg);
    let save_path = download_dir.path().join("download.bin");
    let id = engine.add_task_with_md5(&url, &save_path, Some(2), Some("0".repeat(32)));

    let snapshot = engine.wait_for_task(&id, WAIT).expect("task reached terminal state");
    engine.shutdown();

    assert_eq!(snapshot.status, TaskStatus::Error);
    assert!(snapshot.error_message.is_some());
}

#[test]
fn cancelled_task_stops_without_completing() {
    let body: Vec<u8> = (0u8..200).cycle().take(4 * 1024 * 1024).collect();
    let url = common::range_server::start(body);

    let download_dir = tempdir().unwrap();
    let engine = engine_with(download_dir.path());
    let save_path = download_dir.path().join("download.bin");
    let id = engine.add_task(&url, &save_path, Some(4));

    std::thread::sleep(Duration::from_millis(20));
    engine.cancel_task(&id);

    let snapshot = engine.wait_for_task(&id, WAIT).expect("task reached terminal state");
    engine.shutdown();

    assert_eq!(snapshot.status, TaskStatus::Cancelled);
}
