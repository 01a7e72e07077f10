//! Drives a real `logdev watch` process: status, devices, debounced reads.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use tempfile::TempDir;

fn logdev_bin() -> PathBuf {
    PathBuf::from(assert_cmd::cargo::cargo_bin!("logdev"))
}

struct DaemonProcess {
    child: Child,
    binary: PathBuf,
    home: PathBuf,
}

impl DaemonProcess {
    fn start(binary: PathBuf, home: PathBuf, args: &[&str]) -> Self {
        let child = Command::new(&binary)
            .env("HOME", &home)
            .env("USERPROFILE", &home)
            .arg("watch")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn daemon");

        Self {
            child,
            binary,
            home,
        }
    }

    fn stop(&mut self) {
        let _ = Command::new(&self.binary)
            .env("HOME", &self.home)
            .env("USERPROFILE", &self.home)
            .arg("stop")
            .status();

        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if let Ok(Some(_)) = self.child.try_wait() {
                return;
            }
            sleep(Duration::from_millis(50));
        }

        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for DaemonProcess {
    fn drop(&mut self) {
        self.stop();
    }
}

fn status(binary: &Path, home: &Path) -> Option<serde_json::Value> {
    let output = Command::new(binary)
        .env("HOME", home)
        .env("USERPROFILE", home)
        .arg("status")
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    serde_json::from_slice(&output.stdout).ok()
}

fn daemon_running(binary: &Path, home: &Path) -> bool {
    status(binary, home)
        .and_then(|value| value.get("running").and_then(|v| v.as_bool()))
        .unwrap_or(false)
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(100));
    }
    false
}

fn write_and_close(path: &Path, contents: &[u8]) {
    let mut file = OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)
        .expect("open for write");
    file.write_all(contents).expect("write");
}

#[test]
fn daemon_answers_device_commands() {
    let home = TempDir::new().expect("home");
    let watched = home.path().join("watched.txt");
    fs::write(&watched, b"").expect("create");

    let binary = logdev_bin();
    let watched_arg = watched.to_string_lossy().into_owned();
    let mut daemon = DaemonProcess::start(
        binary.clone(),
        home.path().to_path_buf(),
        &["--path", &watched_arg],
    );
    assert!(
        wait_until(Duration::from_secs(5), || daemon_running(&binary, home.path())),
        "daemon did not report running state in time",
    );

    let hello = Command::new(&binary)
        .env("HOME", home.path())
        .arg("hello")
        .output()
        .expect("run hello");
    assert!(hello.status.success());
    assert_eq!(
        String::from_utf8_lossy(&hello.stdout),
        "Hello! It's hello driver.\n"
    );

    let echo = Command::new(&binary)
        .env("HOME", home.path())
        .args(["echo", "redirected text"])
        .output()
        .expect("run echo");
    assert!(echo.status.success());
    assert!(String::from_utf8_lossy(&echo.stdout).contains("wrote 15 bytes"));

    daemon.stop();
    assert!(!daemon_running(&binary, home.path()));
}

#[cfg(target_os = "linux")]
#[test]
fn write_close_is_read_once_per_debounce_window() {
    let home = TempDir::new().expect("home");
    let watched = home.path().join("watched.txt");
    fs::write(&watched, b"").expect("create");

    let binary = logdev_bin();
    let watched_arg = watched.to_string_lossy().into_owned();
    let mut daemon = DaemonProcess::start(
        binary.clone(),
        home.path().to_path_buf(),
        &["--path", &watched_arg, "--debounce-ms", "2000"],
    );
    assert!(
        wait_until(Duration::from_secs(5), || daemon_running(&binary, home.path())),
        "daemon did not report running state in time",
    );

    write_and_close(&watched, b"abc");
    let read_abc = wait_until(Duration::from_secs(5), || {
        status(&binary, home.path())
            .map(|s| s["last_read"]["content"] == "abc")
            .unwrap_or(false)
    });
    assert!(read_abc, "first write-close was not read");

    write_and_close(&watched, b"def");
    let suppressed = wait_until(Duration::from_secs(2), || {
        status(&binary, home.path())
            .map(|s| s["stats"]["suppressed"].as_u64().unwrap_or(0) >= 1)
            .unwrap_or(false)
    });
    assert!(suppressed, "second write-close inside the window was not suppressed");

    let snapshot = status(&binary, home.path()).expect("status");
    assert_eq!(snapshot["last_read"]["content"], "abc");
    assert_eq!(snapshot["stats"]["accepted"], 1);

    daemon.stop();
}
