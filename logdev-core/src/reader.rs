//! Bounded reader for the watched file.
//!
//! The file is reopened by path on every read; the resolution handle from
//! startup is long gone by the time events arrive. The read buffer is
//! allocated once and reused, so callers must serialize access (the
//! dispatcher holds the reader behind a mutex).

use std::borrow::Cow;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

use crate::error::{ReadError, Resource, WatchError};

pub struct ContentReader {
    path: PathBuf,
    buffer: Box<[u8]>,
}

impl ContentReader {
    /// Allocate a reader with a `capacity`-byte buffer.
    pub fn new(path: impl Into<PathBuf>, capacity: usize) -> Result<Self, WatchError> {
        if capacity == 0 {
            return Err(WatchError::Config(
                "read buffer capacity must be greater than zero".to_string(),
            ));
        }
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(capacity)
            .map_err(|err| WatchError::allocation(Resource::Buffer, err.to_string()))?;
        buffer.resize(capacity, 0);
        Ok(Self {
            path: path.into(),
            buffer: buffer.into_boxed_slice(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Zero the buffer so no bytes from an earlier read linger in it.
    pub fn clear(&mut self) {
        self.buffer.fill(0);
    }

    #[cfg(test)]
    fn raw_buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Read up to `capacity` bytes from the start of the file.
    ///
    /// The file handle is closed before returning on every path. Zero bytes
    /// read is reported as [`ReadError::EmptyOrUnreadable`].
    pub fn read_current_contents(&mut self) -> Result<Contents<'_>, ReadError> {
        let mut file = File::open(&self.path).map_err(|source| ReadError::Open {
            path: self.path.clone(),
            source,
        })?;

        let mut filled = 0;
        while filled < self.buffer.len() {
            match file.read(&mut self.buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(ReadError::Read {
                        path: self.path.clone(),
                        source,
                    })
                }
            }
        }
        drop(file);

        if filled == 0 {
            return Err(ReadError::EmptyOrUnreadable {
                path: self.path.clone(),
            });
        }
        Ok(Contents {
            bytes: &self.buffer[..filled],
        })
    }
}

impl std::fmt::Debug for ContentReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentReader")
            .field("path", &self.path)
            .field("capacity", &self.buffer.len())
            .finish()
    }
}

/// View of the bytes produced by one read, borrowed from the shared buffer.
#[derive(Debug, Clone, Copy)]
pub struct Contents<'a> {
    bytes: &'a [u8],
}

impl<'a> Contents<'a> {
    pub fn bytes_read(&self) -> usize {
        self.bytes.len()
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Display form; invalid UTF-8 is replaced rather than rejected.
    pub fn to_string_lossy(&self) -> Cow<'a, str> {
        String::from_utf8_lossy(self.bytes)
    }
}
