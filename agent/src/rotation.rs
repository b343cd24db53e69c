//! Active/previous file rotation shared between detectors.
//!
//! Several detectors may point at the same storage directory: one recording
//! the current session, another reading what an earlier session left behind.
//! A rotation request renames `active` to `previous` exactly once, performed by
//! whichever detector asks for a file first; everyone else sees the request
//! already served.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

/// File the current session records into
pub const ACTIVE_FILE_NAME: &str = "anr_profile";

/// File holding the data of the previous session
pub const PREVIOUS_FILE_NAME: &str = "anr_profile.old";

/// Shared rotation state. Wrap in an `Arc` and hand the same instance to every
/// detector that uses a given directory.
#[derive(Debug, Default)]
pub struct RotationCoordinator {
    needs_rotation: AtomicBool,
    lock: Mutex<()>,
}

impl RotationCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a rotation before the next file lookup
    pub fn rotate(&self) {
        self.needs_rotation.store(true, Ordering::Release);
    }

    pub fn is_rotation_pending(&self) -> bool {
        self.needs_rotation.load(Ordering::Acquire)
    }

    /// Path new samples should be recorded to
    pub fn file_for_recording(&self, dir: &Path) -> PathBuf {
        self.rotate_if_needed(dir);
        dir.join(ACTIVE_FILE_NAME)
    }

    /// Path of the previous session's file
    pub fn last_file(&self, dir: &Path) -> PathBuf {
        self.rotate_if_needed(dir);
        dir.join(PREVIOUS_FILE_NAME)
    }

    /// Delete the previous session's file. Returns true if a file was removed.
    pub fn delete_last_file(&self, dir: &Path) -> bool {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let path = dir.join(PREVIOUS_FILE_NAME);
        match fs::remove_file(&path) {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => {
                warn!("Failed to delete {}: {}", path.display(), e);
                false
            }
        }
    }

    fn rotate_if_needed(&self, dir: &Path) {
        if !self.needs_rotation.load(Ordering::Acquire) {
            return;
        }

        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.needs_rotation.load(Ordering::Acquire) {
            return;
        }

        Self::rename_active(dir);
        self.needs_rotation.store(false, Ordering::Release);
    }

    fn rename_active(dir: &Path) {
        let active = dir.join(ACTIVE_FILE_NAME);
        let previous = dir.join(PREVIOUS_FILE_NAME);

        match fs::remove_file(&previous) {
            Ok(()) => debug!("Discarded stale {}", previous.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to delete {}: {}", previous.display(), e),
        }

        match fs::rename(&active, &previous) {
            Ok(()) => info!("Rotated {} to {}", active.display(), previous.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Nothing to rotate in {}", dir.display())
            }
            Err(e) => warn!(
                "Failed to rotate {} to {}: {}",
                active.display(),
                previous.display(),
                e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};

    #[test]
    fn test_rotate_moves_active_to_previous_once() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = RotationCoordinator::new();

        let active = coordinator.file_for_recording(dir.path());
        fs::write(&active, b"session-1").unwrap();

        coordinator.rotate();
        assert!(coordinator.is_rotation_pending());
        let active = coordinator.file_for_recording(dir.path());
        assert!(!coordinator.is_rotation_pending());
        assert!(!active.exists());
        assert_eq!(fs::read(coordinator.last_file(dir.path())).unwrap(), b"session-1");

        // No new request, so no second rotation
        fs::write(&active, b"session-2").unwrap();
        let again = coordinator.file_for_recording(dir.path());
        assert_eq!(fs::read(&again).unwrap(), b"session-2");
        assert_eq!(fs::read(coordinator.last_file(dir.path())).unwrap(), b"session-1");
    }

    #[test]
    fn test_last_file_triggers_pending_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = RotationCoordinator::new();
        fs::write(dir.path().join(ACTIVE_FILE_NAME), b"old run").unwrap();

        coordinator.rotate();
        let last = coordinator.last_file(dir.path());
        assert_eq!(fs::read(last).unwrap(), b"old run");
        assert!(!dir.path().join(ACTIVE_FILE_NAME).exists());
    }

    #[test]
    fn test_rotation_replaces_previous() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = RotationCoordinator::new();
        fs::write(dir.path().join(PREVIOUS_FILE_NAME), b"stale").unwrap();
        fs::write(dir.path().join(ACTIVE_FILE_NAME), b"fresh").unwrap();

        coordinator.rotate();
        coordinator.file_for_recording(dir.path());
        assert_eq!(fs::read(coordinator.last_file(dir.path())).unwrap(), b"fresh");
    }

    #[test]
    fn test_rotation_without_active_file_clears_request() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = RotationCoordinator::new();
        fs::write(dir.path().join(PREVIOUS_FILE_NAME), b"stale").unwrap();

        coordinator.rotate();
        coordinator.file_for_recording(dir.path());
        assert!(!coordinator.is_rotation_pending());
        assert!(!coordinator.last_file(dir.path()).exists());
    }

    #[test]
    fn test_delete_last_file() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = RotationCoordinator::new();
        assert!(!coordinator.delete_last_file(dir.path()));

        fs::write(dir.path().join(PREVIOUS_FILE_NAME), b"x").unwrap();
        assert!(coordinator.delete_last_file(dir.path()));
        assert!(!dir.path().join(PREVIOUS_FILE_NAME).exists());
        assert!(!coordinator.delete_last_file(dir.path()));
    }

    #[test]
    fn test_concurrent_callers_rotate_once() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = Arc::new(RotationCoordinator::new());
        fs::write(dir.path().join(ACTIVE_FILE_NAME), b"first").unwrap();
        coordinator.rotate();

        let barrier = Barrier::new(8);
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    barrier.wait();
                    coordinator.file_for_recording(dir.path());
                });
            }
        });

        // A second rename would have replaced `previous` with nothing
        assert_eq!(fs::read(coordinator.last_file(dir.path())).unwrap(), b"first");
        assert!(!coordinator.is_rotation_pending());
    }
}
