//! The two character devices served next to the watch: `hello` answers with
//! a fixed greeting, `null2` swallows writes and logs a prefix of them.
//! Each device admits one open handle at a time.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::DaemonError;

pub const HELLO_REPLY: &str = "Hello! It's hello driver.\n";
pub const NULL2_REPLY: &str = "This is a null2 driver for redirect some text.\n";

/// Bytes of a null2 write echoed into the log.
pub const MAX_LOG_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Hello,
    Null2,
}

impl DeviceKind {
    pub fn reply(self) -> &'static str {
        match self {
            DeviceKind::Hello => HELLO_REPLY,
            DeviceKind::Null2 => NULL2_REPLY,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeviceKind::Hello => "hello",
            DeviceKind::Null2 => "null2",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceKind {
    type Err = DaemonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hello" => Ok(DeviceKind::Hello),
            "null2" => Ok(DeviceKind::Null2),
            other => Err(DaemonError::UnknownDevice(other.to_string())),
        }
    }
}

pub fn null2_log_line(data: &[u8]) -> String {
    let shown = &data[..data.len().min(MAX_LOG_SIZE)];
    format!(
        "null2: received {} bytes: '{}'",
        data.len(),
        String::from_utf8_lossy(shown)
    )
}

#[derive(Debug)]
pub struct CharDevice {
    kind: DeviceKind,
    open: AtomicBool,
}

impl CharDevice {
    pub fn new(kind: DeviceKind) -> Self {
        Self {
            kind,
            open: AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn open(&self) -> Result<DeviceHandle<'_>, DaemonError> {
        if self
            .open
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(DaemonError::DeviceBusy(self.kind.to_string()));
        }
        tracing::debug!(device = %self.kind, "device opened");
        Ok(DeviceHandle { device: self })
    }
}

/// An open device. Dropping it releases the device.
#[derive(Debug)]
pub struct DeviceHandle<'a> {
    device: &'a CharDevice,
}

impl DeviceHandle<'_> {
    /// Read up to `count` bytes of the reply starting at `offset`.
    pub fn read(&self, offset: usize, count: usize) -> &'static [u8] {
        let reply = self.device.kind.reply().as_bytes();
        if offset >= reply.len() {
            return &[];
        }
        let end = offset.saturating_add(count).min(reply.len());
        &reply[offset..end]
    }

    pub fn write(&self, data: &[u8]) -> Result<usize, DaemonError> {
        match self.device.kind {
            DeviceKind::Null2 => {
                tracing::info!("{}", null2_log_line(data));
                Ok(data.len())
            }
            DeviceKind::Hello => Err(DaemonError::ReadOnlyDevice(self.device.kind.to_string())),
        }
    }
}

impl Drop for DeviceHandle<'_> {
    fn drop(&mut self) {
        self.device.open.store(false, Ordering::Release);
        tracing::debug!(device = %self.device.kind, "device released");
    }
}

#[derive(Debug)]
pub struct Devices {
    hello: CharDevice,
    null2: CharDevice,
}

impl Default for Devices {
    fn default() -> Self {
        Self {
            hello: CharDevice::new(DeviceKind::Hello),
            null2: CharDevice::new(DeviceKind::Null2),
        }
    }
}

impl Devices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: DeviceKind) -> &CharDevice {
        match kind {
            DeviceKind::Hello => &self.hello,
            DeviceKind::Null2 => &self.null2,
        }
    }
}
