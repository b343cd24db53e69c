//! Persistent store of hang samples.
//!
//! Wraps a [`QueueFile`] with the sample codec. Storage problems never reach
//! the caller: a corrupt file is deleted and recreated once, and if that fails
//! too the manager silently drops samples for the rest of its life.

use crate::queue::{QueueError, QueueFile};
use anrwatch_shared::{decode_sample, encode_sample, StackSample};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug)]
enum Backend {
    File(QueueFile),
    Disabled,
}

/// Bounded, disk-backed FIFO of stack samples
#[derive(Debug)]
pub struct ProfileManager {
    path: PathBuf,
    backend: Backend,
}

impl ProfileManager {
    /// Open the store at `path`, falling back to a no-op store if the file
    /// cannot be opened even after recreating it.
    pub fn open(path: impl AsRef<Path>, capacity: usize) -> Self {
        let path = path.as_ref().to_path_buf();
        match Self::try_open(&path, capacity) {
            Ok(manager) => manager,
            Err(e) => {
                warn!(
                    "Hang profile store {} is unusable, samples will be dropped: {}",
                    path.display(),
                    e
                );
                Self {
                    path,
                    backend: Backend::Disabled,
                }
            }
        }
    }

    /// Open the store at `path`, deleting and recreating the file once if it
    /// cannot be read. Errors unrelated to the file's contents leave it alone.
    pub fn try_open(path: impl AsRef<Path>, capacity: usize) -> Result<Self, QueueError> {
        let path = path.as_ref().to_path_buf();
        let queue = match QueueFile::open(&path, capacity) {
            Ok(queue) => queue,
            Err(e @ (QueueError::ZeroCapacity | QueueError::RecordTooLarge(_))) => return Err(e),
            Err(e) => {
                warn!(
                    "Failed to open hang profile store {}, recreating it: {}",
                    path.display(),
                    e
                );
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => debug!("Failed to delete {}: {}", path.display(), e),
                }
                QueueFile::open(&path, capacity)?
            }
        };

        Ok(Self {
            path,
            backend: Backend::File(queue),
        })
    }

    /// Persist one sample, evicting the oldest if the store is full
    pub fn add(&mut self, sample: &StackSample) {
        let Backend::File(queue) = &mut self.backend else {
            return;
        };

        let record = match encode_sample(sample) {
            Ok(record) => record,
            Err(e) => {
                debug!("Dropping sample taken at {}: {}", sample.timestamp_ms, e);
                return;
            }
        };

        if let Err(e) = queue.add(&record) {
            warn!("Failed to persist hang sample to {}: {}", self.path.display(), e);
        }
    }

    /// Remove every stored sample
    pub fn clear(&mut self) {
        if let Backend::File(queue) = &mut self.backend {
            if let Err(e) = queue.clear() {
                warn!("Failed to clear hang profile store {}: {}", self.path.display(), e);
            }
        }
    }

    /// Read back all decodable samples, oldest first
    pub fn load(&mut self) -> Vec<StackSample> {
        let Backend::File(queue) = &mut self.backend else {
            return Vec::new();
        };

        let records = match queue.records() {
            Ok(records) => records,
            Err(e) => {
                warn!("Failed to read hang profile store {}: {}", self.path.display(), e);
                return Vec::new();
            }
        };

        let total = records.len();
        let samples: Vec<StackSample> = records.iter().filter_map(|r| decode_sample(r)).collect();
        if samples.len() < total {
            debug!(
                "Skipped {} undecodable records in {}",
                total - samples.len(),
                self.path.display()
            );
        }
        samples
    }

    /// Release the underlying file. Later calls behave like a disabled store.
    pub fn close(&mut self) {
        self.backend = Backend::Disabled;
    }

    /// Whether samples are actually being written to disk
    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, Backend::File(_))
    }

    /// Number of stored records, including ones that may not decode
    pub fn len(&self) -> usize {
        match &self.backend {
            Backend::File(queue) => queue.len(),
            Backend::Disabled => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
