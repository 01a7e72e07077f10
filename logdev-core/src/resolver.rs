//! Path resolution for the watch target.
//!
//! A [`PathRef`] is the transient resolution handle: it is held from the
//! start of setup until the mark is attached and then released. The mark
//! keeps its own binding to the target, so nothing downstream depends on it.

use std::fs::{self, Metadata};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::ResolutionError;
use crate::types::{FileIdentity, WatchTarget};

/// Resolves a configured path string to a watch target.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathResolver;

impl PathResolver {
    /// Follow `path` to a filesystem object.
    ///
    /// Returns [`ResolutionError::TargetNotFound`] when nothing exists at
    /// `path`, and [`ResolutionError::TargetUnreachable`] when something
    /// exists but cannot be followed (dangling symlink, permission error).
    pub fn resolve(&self, path: &Path) -> Result<PathRef, ResolutionError> {
        let canonical = match fs::canonicalize(path) {
            Ok(canonical) => canonical,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                // A link that exists but points nowhere is unreachable, not missing.
                if fs::symlink_metadata(path).is_ok() {
                    return Err(unreachable(path, "dangling symlink"));
                }
                return Err(ResolutionError::TargetNotFound {
                    path: path.to_path_buf(),
                });
            }
            Err(err) => return Err(unreachable(path, err.to_string())),
        };

        let metadata =
            fs::metadata(&canonical).map_err(|err| unreachable(path, err.to_string()))?;

        tracing::debug!(
            path = %path.display(),
            canonical = %canonical.display(),
            "resolved watch path",
        );

        Ok(PathRef {
            requested: path.to_path_buf(),
            canonical,
            metadata,
        })
    }
}

/// Transient reference to a resolved path.
#[derive(Debug)]
pub struct PathRef {
    requested: PathBuf,
    canonical: PathBuf,
    metadata: Metadata,
}

impl PathRef {
    pub fn requested(&self) -> &Path {
        &self.requested
    }

    pub fn canonical(&self) -> &Path {
        &self.canonical
    }

    /// Identity of the resolved object. Only regular files can be watched.
    pub fn target(&self) -> Result<WatchTarget, ResolutionError> {
        if !self.metadata.is_file() {
            return Err(unreachable(&self.requested, "not a regular file"));
        }
        Ok(WatchTarget {
            path: self.requested.clone(),
            canonical: self.canonical.clone(),
            identity: FileIdentity::from_metadata(&self.metadata),
        })
    }

    /// Drop the resolution handle.
    pub fn release(self) {
        tracing::debug!(path = %self.requested.display(), "path reference released");
    }
}

fn unreachable(path: &Path, reason: impl Into<String>) -> ResolutionError {
    ResolutionError::TargetUnreachable {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_path_is_not_found() {
        let dir = TempDir::new().expect("tempdir");
        let err = PathResolver
            .resolve(&dir.path().join("watched.txt"))
            .unwrap_err();
        assert!(
            matches!(err, ResolutionError::TargetNotFound { .. }),
            "got: {err}"
        );
    }

    #[test]
    fn regular_file_resolves_to_target() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("watched.txt");
        fs::write(&path, b"abc").expect("write");

        let path_ref = PathResolver.resolve(&path).expect("resolve");
        let target = path_ref.target().expect("target");
        assert_eq!(target.path, path);
        assert_eq!(target.canonical, fs::canonicalize(&path).expect("canonical"));
        path_ref.release();
    }

    #[test]
    fn directory_is_unreachable_target() {
        let dir = TempDir::new().expect("tempdir");
        let path_ref = PathResolver.resolve(dir.path()).expect("resolve dir");
        let err = path_ref.target().unwrap_err();
        assert!(
            matches!(err, ResolutionError::TargetUnreachable { .. }),
            "got: {err}"
        );
    }

    #[cfg(unix)]
    #[test]
    fn dangling_symlink_is_unreachable() {
        let dir = TempDir::new().expect("tempdir");
        let link = dir.path().join("link.txt");
        std::os::unix::fs::symlink(dir.path().join("gone.txt"), &link).expect("symlink");

        let err = PathResolver.resolve(&link).unwrap_err();
        match err {
            ResolutionError::TargetUnreachable { reason, .. } => {
                assert!(reason.contains("dangling"), "reason: {reason}")
            }
            other => panic!("expected unreachable, got {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn symlink_is_followed_to_real_file() {
        let dir = TempDir::new().expect("tempdir");
        let real = dir.path().join("real.txt");
        let link = dir.path().join("link.txt");
        fs::write(&real, b"x").expect("write");
        std::os::unix::fs::symlink(&real, &link).expect("symlink");

        let target = PathResolver
            .resolve(&link)
            .and_then(|r| r.target())
            .expect("target");
        assert_eq!(target.path, link);
        assert_eq!(target.canonical, fs::canonicalize(&real).expect("canonical"));
    }
}
