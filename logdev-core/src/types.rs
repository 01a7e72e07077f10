//! Domain types shared by the watch components.
//!
//! Timestamps are monotonic and relative to a process-local origin, so a
//! service restart always starts from a clean debounce state.

use std::fmt;
use std::ops::{BitAnd, BitOr};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use serde::Serialize;

// ---------------------------------------------------------------------------
// Event mask
// ---------------------------------------------------------------------------

/// Bit set of file event kinds a mark is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EventMask(u32);

impl EventMask {
    pub const ACCESS: EventMask = EventMask(0x0000_0001);
    pub const MODIFY: EventMask = EventMask(0x0000_0002);
    /// File opened for writing was closed.
    pub const CLOSE_WRITE: EventMask = EventMask(0x0000_0008);
    pub const CLOSE_NOWRITE: EventMask = EventMask(0x0000_0010);
    pub const OPEN: EventMask = EventMask(0x0000_0020);

    pub const fn empty() -> Self {
        EventMask(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: EventMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: EventMask) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for EventMask {
    type Output = EventMask;

    fn bitor(self, rhs: Self) -> Self::Output {
        EventMask(self.0 | rhs.0)
    }
}

impl BitAnd for EventMask {
    type Output = EventMask;

    fn bitand(self, rhs: Self) -> Self::Output {
        EventMask(self.0 & rhs.0)
    }
}

impl fmt::Display for EventMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(EventMask, &str); 5] = [
            (EventMask::ACCESS, "access"),
            (EventMask::MODIFY, "modify"),
            (EventMask::CLOSE_WRITE, "close_write"),
            (EventMask::CLOSE_NOWRITE, "close_nowrite"),
            (EventMask::OPEN, "open"),
        ];
        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&names.join("|"))
        }
    }
}

// ---------------------------------------------------------------------------
// Monotonic timestamps
// ---------------------------------------------------------------------------

static ORIGIN: OnceLock<Instant> = OnceLock::new();

/// Point on the monotonic clock, measured from a process-local origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(Duration);

impl Timestamp {
    pub fn now() -> Self {
        let origin = *ORIGIN.get_or_init(Instant::now);
        Timestamp(Instant::now().duration_since(origin))
    }

    pub const fn from_millis(millis: u64) -> Self {
        Timestamp(Duration::from_millis(millis))
    }

    pub const fn from_duration(offset: Duration) -> Self {
        Timestamp(offset)
    }

    pub const fn as_duration(self) -> Duration {
        self.0
    }

    /// Elapsed time since `earlier`, or `None` if `earlier` lies in the future.
    pub fn checked_since(self, earlier: Timestamp) -> Option<Duration> {
        self.0.checked_sub(earlier.0)
    }

    /// The timestamp `offset` after this one.
    pub fn after(self, offset: Duration) -> Self {
        Timestamp(self.0.saturating_add(offset))
    }
}

// ---------------------------------------------------------------------------
// Registry identifiers
// ---------------------------------------------------------------------------

/// Backend-issued handle for a watch group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub u64);

/// Backend-issued handle for a mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkId(pub u64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group#{}", self.0)
    }
}

impl fmt::Display for MarkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mark#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Watch target
// ---------------------------------------------------------------------------

/// Device/inode pair identifying the watched filesystem object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FileIdentity {
    pub device: u64,
    pub inode: u64,
}

impl FileIdentity {
    #[cfg(unix)]
    pub fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        FileIdentity {
            device: metadata.dev(),
            inode: metadata.ino(),
        }
    }

    #[cfg(not(unix))]
    pub fn from_metadata(_metadata: &std::fs::Metadata) -> Self {
        FileIdentity {
            device: 0,
            inode: 0,
        }
    }
}

/// The single file under observation, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    /// Path as configured.
    pub path: PathBuf,
    /// Path after following symlinks.
    pub canonical: PathBuf,
    pub identity: FileIdentity,
}

impl WatchTarget {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn canonical(&self) -> &Path {
        &self.canonical
    }
}

/// A change notification delivered by a backend for one mark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub mask: EventMask,
    pub path: PathBuf,
    /// When the backend observed the event.
    pub at: Timestamp,
}

impl Notification {
    pub fn new(mask: EventMask, path: impl Into<PathBuf>, at: Timestamp) -> Self {
        Self {
            mask,
            path: path.into(),
            at,
        }
    }
}
