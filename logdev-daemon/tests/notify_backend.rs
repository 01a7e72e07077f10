//! Real inotify round trips. Linux only: other platforms have no
//! close-after-write event.
#![cfg(target_os = "linux")]

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::thread::sleep;
use std::time::{Duration, Instant};

use logdev_core::{WatchConfig, WatchService};
use logdev_daemon::NotifyBackend;
use tempfile::TempDir;

fn config_for(path: &Path, debounce_ms: u64) -> WatchConfig {
    WatchConfig {
        path: path.to_path_buf(),
        debounce: Duration::from_millis(debounce_ms),
        buffer_capacity: 1000,
        trailing_edge: false,
    }
}

fn write_and_close(path: &Path, contents: &[u8]) {
    let mut file = OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)
        .expect("open for write");
    file.write_all(contents).expect("write");
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(20));
    }
    false
}

#[test]
fn write_close_triggers_a_read() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("watched.txt");
    fs::write(&path, b"").expect("create");

    let mut service =
        WatchService::new(config_for(&path, 0), Arc::new(NotifyBackend::new())).expect("service");
    service.start().expect("start");
    let dispatcher = service.dispatcher().clone();

    write_and_close(&path, b"hello from a writer");
    assert!(
        wait_until(Duration::from_secs(5), || dispatcher.last_report().is_some()),
        "no read after write-close"
    );
    let report = dispatcher.last_report().expect("report");
    assert_eq!(report.content, b"hello from a writer");
}

#[test]
fn read_only_open_does_not_trigger() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("watched.txt");
    fs::write(&path, b"abc").expect("create");

    let mut service =
        WatchService::new(config_for(&path, 0), Arc::new(NotifyBackend::new())).expect("service");
    service.start().expect("start");

    let _ = fs::read(&path).expect("read");
    sleep(Duration::from_millis(300));
    assert_eq!(service.dispatcher().stats().accepted, 0);
}

#[test]
fn burst_inside_window_reads_once() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("watched.txt");
    fs::write(&path, b"").expect("create");

    let mut service = WatchService::new(config_for(&path, 5_000), Arc::new(NotifyBackend::new()))
        .expect("service");
    service.start().expect("start");
    let dispatcher = service.dispatcher().clone();

    for chunk in [&b"one"[..], b"two", b"three"] {
        write_and_close(&path, chunk);
    }
    assert!(wait_until(Duration::from_secs(5), || {
        let stats = dispatcher.stats();
        stats.accepted + stats.suppressed >= 3
    }));
    assert_eq!(dispatcher.stats().accepted, 1);
}

#[test]
fn no_reads_after_shutdown() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("watched.txt");
    fs::write(&path, b"").expect("create");

    let mut service =
        WatchService::new(config_for(&path, 0), Arc::new(NotifyBackend::new())).expect("service");
    service.start().expect("start");
    let dispatcher = service.dispatcher().clone();
    service.shutdown();

    write_and_close(&path, b"late");
    sleep(Duration::from_millis(300));
    assert!(dispatcher.last_report().is_none());
}

#[test]
fn restart_after_shutdown_rearms() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("watched.txt");
    fs::write(&path, b"").expect("create");

    let mut service =
        WatchService::new(config_for(&path, 0), Arc::new(NotifyBackend::new())).expect("service");
    service.start().expect("start");
    service.shutdown();
    service.start().expect("restart");

    write_and_close(&path, b"again");
    let dispatcher = service.dispatcher().clone();
    assert!(wait_until(Duration::from_secs(5), || dispatcher
        .last_report()
        .is_some()));
}
