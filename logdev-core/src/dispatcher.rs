//! Event dispatcher: debounce gate in front of the content reader.
//!
//! ```text
//!            mask miss            gate rejects
//!   Idle ─────────────▶ Idle   Idle ───────────▶ Idle
//!   Idle ──gate accepts──▶ Reading ──read done/failed──▶ Idle
//! ```
//!
//! A failed read is returned to the caller but leaves the dispatcher armed;
//! the next accepted event simply tries again.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

use crate::config::WatchConfig;
use crate::debounce::DebounceGate;
use crate::error::WatchError;
use crate::reader::ContentReader;
use crate::registry::ChangeHandler;
use crate::types::{EventMask, Notification, Timestamp};

/// Tag prefixed to every boundary log line.
pub const COMPONENT: &str = "<logdev>";

/// Event kinds the service reacts to.
pub const INTEREST_MASK: EventMask = EventMask::CLOSE_WRITE;

pub fn written_and_closed_line(path: &Path) -> String {
    format!("{COMPONENT}: File {} was written and closed", path.display())
}

pub fn read_header_line(bytes_read: usize) -> String {
    format!("{COMPONENT}: read first {bytes_read} bytes:")
}

pub fn read_failed_line(path: &Path, err: &WatchError) -> String {
    format!("{COMPONENT}: read of {} failed: {err}", path.display())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatcherState {
    Idle,
    Reading,
}

/// What happened to one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The mask did not include the interest bits.
    Ignored,
    /// Dropped by the debounce gate.
    Suppressed,
    Read { bytes_read: usize },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub accepted: u64,
    pub suppressed: u64,
    pub ignored: u64,
    pub failed: u64,
}

/// The last successful read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadReport {
    pub path: PathBuf,
    pub bytes_read: usize,
    pub content: Vec<u8>,
    pub at: Timestamp,
}

impl ReadReport {
    pub fn content_lossy(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }
}

#[derive(Debug, Default)]
struct Counters {
    accepted: AtomicU64,
    suppressed: AtomicU64,
    ignored: AtomicU64,
    failed: AtomicU64,
}

pub struct Dispatcher {
    gate: DebounceGate,
    reader: Mutex<ContentReader>,
    path: PathBuf,
    reading: AtomicBool,
    counters: Counters,
    last_report: Mutex<Option<ReadReport>>,
}

impl Dispatcher {
    /// Leading-edge dispatcher.
    pub fn new(reader: ContentReader, debounce: Duration) -> Self {
        Self::with_gate(reader, DebounceGate::new(debounce))
    }

    pub fn with_gate(reader: ContentReader, gate: DebounceGate) -> Self {
        let path = reader.path().to_path_buf();
        Self {
            gate,
            reader: Mutex::new(reader),
            path,
            reading: AtomicBool::new(false),
            counters: Counters::default(),
            last_report: Mutex::new(None),
        }
    }

    pub fn from_config(config: &WatchConfig) -> Result<Self, WatchError> {
        let reader = ContentReader::new(&config.path, config.buffer_capacity)?;
        let gate = if config.trailing_edge {
            DebounceGate::with_trailing_edge(config.debounce)
        } else {
            DebounceGate::new(config.debounce)
        };
        Ok(Self::with_gate(reader, gate))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn gate(&self) -> &DebounceGate {
        &self.gate
    }

    pub fn state(&self) -> DispatcherState {
        if self.reading.load(Ordering::Acquire) {
            DispatcherState::Reading
        } else {
            DispatcherState::Idle
        }
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            accepted: self.counters.accepted.load(Ordering::Relaxed),
            suppressed: self.counters.suppressed.load(Ordering::Relaxed),
            ignored: self.counters.ignored.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    pub fn last_report(&self) -> Option<ReadReport> {
        self.last_report.lock().clone()
    }

    /// Drop per-run state: the debounce window, the buffered bytes and the
    /// last report. Counters are kept for the life of the process.
    ///
    /// A read still holding the buffer (one abandoned after a timeout) keeps
    /// it; that read overwrites the buffer anyway.
    pub fn reset(&self) {
        self.gate.reset();
        match self.reader.try_lock() {
            Some(mut reader) => reader.clear(),
            None => {
                tracing::warn!(path = %self.path.display(), "read in flight; buffer not cleared")
            }
        }
        *self.last_report.lock() = None;
        tracing::debug!(path = %self.path.display(), "dispatcher state reset");
    }

    /// Handle one notification synchronously.
    pub fn dispatch(&self, notification: &Notification) -> Result<DispatchOutcome, WatchError> {
        if !notification.mask.intersects(INTEREST_MASK) {
            self.counters.ignored.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(mask = %notification.mask, "ignoring event outside interest mask");
            return Ok(DispatchOutcome::Ignored);
        }

        if !self.gate.should_accept(notification.at) {
            self.counters.suppressed.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(path = %self.path.display(), "event suppressed by debounce");
            return Ok(DispatchOutcome::Suppressed);
        }

        self.counters.accepted.fetch_add(1, Ordering::Relaxed);
        let bytes_read = self.read_and_log(notification.at)?;
        Ok(DispatchOutcome::Read { bytes_read })
    }

    /// Take the trailing read owed to a suppressed burst, if any.
    pub fn flush_trailing(&self, now: Timestamp) -> Result<DispatchOutcome, WatchError> {
        if !self.gate.flush_trailing(now) {
            return Ok(DispatchOutcome::Suppressed);
        }
        self.counters.accepted.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(path = %self.path.display(), "trailing read after burst");
        let bytes_read = self.read_and_log(now)?;
        Ok(DispatchOutcome::Read { bytes_read })
    }

    fn read_and_log(&self, at: Timestamp) -> Result<usize, WatchError> {
        tracing::info!("{}", written_and_closed_line(&self.path));

        let mut reader = self.reader.lock();
        self.reading.store(true, Ordering::Release);
        let result = match reader.read_current_contents() {
            Ok(contents) => {
                let bytes_read = contents.bytes_read();
                tracing::info!("{}", read_header_line(bytes_read));
                tracing::info!("{}", contents.to_string_lossy());
                *self.last_report.lock() = Some(ReadReport {
                    path: self.path.clone(),
                    bytes_read,
                    content: contents.as_bytes().to_vec(),
                    at,
                });
                Ok(bytes_read)
            }
            Err(err) => Err(WatchError::from(err)),
        };
        self.reading.store(false, Ordering::Release);
        drop(reader);

        if let Err(err) = &result {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            tracing::error!("{}", read_failed_line(&self.path, err));
        }
        result
    }
}

impl ChangeHandler for Dispatcher {
    fn on_change(&self, notification: Notification) {
        if let Err(err) = self.dispatch(&notification) {
            tracing::warn!(error = %err, "event handling failed; watch remains armed");
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("path", &self.path)
            .field("state", &self.state())
            .field("stats", &self.stats())
            .finish()
    }
}
