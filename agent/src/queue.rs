//! Bounded, file-backed FIFO of binary records.
//!
//! File layout (big-endian):
//!
//! ```text
//! header (32 bytes): magic "ANRQUEUE" | format:u32 | capacity:u32 | head:u64 | tail:u64
//! records:           len:u32 | payload
//! ```
//!
//! Records between `head` and `tail` are live, oldest first. Appending writes
//! the record past `tail` and then rewrites the header, so the header is the
//! commit point: bytes past `tail` are leftovers of an interrupted append and
//! are cut off on open. Evicting the oldest record only advances `head`; the
//! dead prefix is compacted away once it outweighs the live records.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

const MAGIC: &[u8; 8] = b"ANRQUEUE";
const FORMAT_VERSION: u32 = 1;

/// Size of the file header
pub const HEADER_LEN: u64 = 32;

const RECORD_PREFIX_LEN: u64 = 4;

/// Largest payload a single record may carry
pub const MAX_RECORD_LEN: usize = 16 * 1024 * 1024;

/// Dead prefix size below which compaction is skipped
const MIN_COMPACT_BYTES: u64 = 4096;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue file I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("queue file {} is corrupt: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("record of {0} bytes exceeds the {} byte limit", MAX_RECORD_LEN)]
    RecordTooLarge(usize),

    #[error("queue capacity must be greater than 0")]
    ZeroCapacity,
}

/// A capacity-bounded queue of byte records persisted in a single file
#[derive(Debug)]
pub struct QueueFile {
    path: PathBuf,
    file: File,
    capacity: usize,
    head: u64,
    tail: u64,
    /// (offset, payload length) of each live record, oldest first
    records: VecDeque<(u64, u32)>,
}

impl QueueFile {
    /// Open the queue at `path`, creating it if needed.
    ///
    /// If the file holds more than `capacity` records, the oldest extra
    /// records are evicted.
    pub fn open(path: impl AsRef<Path>, capacity: usize) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::ZeroCapacity);
        }

        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;

        let mut queue = Self {
            path,
            file,
            capacity,
            head: HEADER_LEN,
            tail: HEADER_LEN,
            records: VecDeque::new(),
        };

        if contents.is_empty() {
            queue.write_header()?;
            return Ok(queue);
        }

        queue.load_existing(&contents)?;

        let file_len = contents.len() as u64;
        if file_len > queue.tail {
            debug!(
                "Discarding {} uncommitted bytes at the end of {}",
                file_len - queue.tail,
                queue.path.display()
            );
            queue.file.set_len(queue.tail)?;
        }

        let before = queue.records.len();
        queue.evict_over_capacity();
        if queue.records.len() != before {
            debug!(
                "Evicted {} records above the capacity of {}",
                before - queue.records.len(),
                capacity
            );
        }
        queue.write_header()?;
        queue.maybe_compact()?;

        Ok(queue)
    }

    fn load_existing(&mut self, contents: &[u8]) -> Result<(), QueueError> {
        let layout = Layout::parse(&self.path, contents)?;
        self.head = layout.head;
        self.tail = layout.tail;
        self.records = layout.records;
        Ok(())
    }

    /// Append a record, evicting the oldest one when the queue is full
    pub fn add(&mut self, record: &[u8]) -> Result<(), QueueError> {
        if record.len() > MAX_RECORD_LEN {
            return Err(QueueError::RecordTooLarge(record.len()));
        }

        let mut buf = Vec::with_capacity(RECORD_PREFIX_LEN as usize + record.len());
        buf.extend_from_slice(&(record.len() as u32).to_be_bytes());
        buf.extend_from_slice(record);

        self.file.seek(SeekFrom::Start(self.tail))?;
        self.file.write_all(&buf)?;

        self.records.push_back((self.tail, record.len() as u32));
        self.tail += buf.len() as u64;
        self.evict_over_capacity();

        self.write_header()?;
        self.maybe_compact()
    }

    /// Remove every record
    pub fn clear(&mut self) -> Result<(), QueueError> {
        self.records.clear();
        self.head = HEADER_LEN;
        self.tail = HEADER_LEN;
        self.write_header()?;
        self.file.set_len(HEADER_LEN)?;
        Ok(())
    }

    /// Read every live record, oldest first
    pub fn records(&mut self) -> Result<Vec<Vec<u8>>, QueueError> {
        let live = self.read_live()?;
        Ok(self
            .records
            .iter()
            .map(|&(offset, len)| {
                let start = (offset - self.head + RECORD_PREFIX_LEN) as usize;
                live[start..start + len as usize].to_vec()
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes currently occupied on disk
    pub fn file_len(&self) -> u64 {
        self.tail
    }

    fn evict_over_capacity(&mut self) {
        while self.records.len() > self.capacity {
            self.records.pop_front();
        }
        self.head = self.records.front().map_or(self.tail, |&(offset, _)| offset);
    }

    fn read_live(&mut self) -> Result<Vec<u8>, QueueError> {
        let mut live = vec![0u8; (self.tail - self.head) as usize];
        self.file.seek(SeekFrom::Start(self.head))?;
        self.file.read_exact(&mut live)?;
        Ok(live)
    }

    /// Move the live records to the front of the file once the dead prefix
    /// is larger than they are. The two ranges never overlap, so the old copy
    /// stays valid until the header switches over.
    fn maybe_compact(&mut self) -> Result<(), QueueError> {
        let dead = self.head - HEADER_LEN;
        let live_len = self.tail - self.head;
        if dead < MIN_COMPACT_BYTES || dead <= live_len {
            return Ok(());
        }

        let live = self.read_live()?;
        self.file.seek(SeekFrom::Start(HEADER_LEN))?;
        self.file.write_all(&live)?;

        let shift = dead;
        for record in self.records.iter_mut() {
            record.0 -= shift;
        }
        self.head = HEADER_LEN;
        self.tail = HEADER_LEN + live_len;
        self.write_header()?;
        self.file.set_len(self.tail)?;

        debug!("Compacted {}: reclaimed {} bytes", self.path.display(), shift);
        Ok(())
    }

    fn write_header(&mut self) -> Result<(), QueueError> {
        let mut header = [0u8; HEADER_LEN as usize];
        header[0..8].copy_from_slice(MAGIC);
        header[8..12].copy_from_slice(&FORMAT_VERSION.to_be_bytes());
        let capacity = self.capacity.min(u32::MAX as usize) as u32;
        header[12..16].copy_from_slice(&capacity.to_be_bytes());
        header[16..24].copy_from_slice(&self.head.to_be_bytes());
        header[24..32].copy_from_slice(&self.tail.to_be_bytes());

        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&header)?;
        Ok(())
    }
}

/// Read-only view of a queue file, as returned by [`read_snapshot`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    /// Capacity recorded by the last writer
    pub capacity: usize,

    /// Live records, oldest first
    pub records: Vec<Vec<u8>>,

    /// Bytes past the committed end, left by an interrupted append
    pub uncommitted_bytes: u64,
}

/// Read the live records of the queue at `path` without modifying the file
pub fn read_snapshot(path: impl AsRef<Path>) -> Result<QueueSnapshot, QueueError> {
    let path = path.as_ref();
    let contents = fs::read(path)?;
    let layout = Layout::parse(path, &contents)?;

    let records = layout
        .records
        .iter()
        .map(|&(offset, len)| {
            let start = (offset + RECORD_PREFIX_LEN) as usize;
            contents[start..start + len as usize].to_vec()
        })
        .collect();

    Ok(QueueSnapshot {
        capacity: layout.capacity as usize,
        records,
        uncommitted_bytes: contents.len() as u64 - layout.tail,
    })
}

/// Committed structure of a queue file
struct Layout {
    capacity: u32,
    head: u64,
    tail: u64,
    records: VecDeque<(u64, u32)>,
}

impl Layout {
    fn parse(path: &Path, contents: &[u8]) -> Result<Self, QueueError> {
        let corrupt = |reason: String| QueueError::Corrupt {
            path: path.to_path_buf(),
            reason,
        };

        let file_len = contents.len() as u64;
        if file_len < HEADER_LEN {
            return Err(corrupt(format!("{} bytes is shorter than the header", file_len)));
        }
        if &contents[0..8] != MAGIC {
            return Err(corrupt("bad magic".to_string()));
        }

        let format = read_u32(contents, 8);
        if format != FORMAT_VERSION {
            return Err(corrupt(format!("unsupported format version {}", format)));
        }

        let capacity = read_u32(contents, 12);
        let head = read_u64(contents, 16);
        let tail = read_u64(contents, 24);
        if head < HEADER_LEN || head > tail || tail > file_len {
            return Err(corrupt(format!(
                "record range {}..{} does not fit a {} byte file",
                head, tail, file_len
            )));
        }

        let mut records = VecDeque::new();
        let mut pos = head;
        while pos < tail {
            if tail - pos < RECORD_PREFIX_LEN {
                return Err(corrupt(format!("partial record prefix at offset {}", pos)));
            }
            let len = read_u32(contents, pos as usize);
            let end = pos + RECORD_PREFIX_LEN + len as u64;
            if len as usize > MAX_RECORD_LEN || end > tail {
                return Err(corrupt(format!(
                    "record of {} bytes at offset {} overruns the queue",
                    len, pos
                )));
            }
            records.push_back((pos, len));
            pos = end;
        }

        Ok(Self {
            capacity,
            head,
            tail,
            records,
        })
    }
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[at..at + 4]);
    u32::from_be_bytes(raw)
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    u64::from_be_bytes(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(i: usize) -> Vec<u8> {
        format!("record-{}", i).into_bytes()
    }

    #[test]
    fn test_add_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut queue = QueueFile::open(dir.path().join("q"), 4).unwrap();
        assert!(queue.is_empty());

        queue.add(b"one").unwrap();
        queue.add(b"").unwrap();
        queue.add(b"three").unwrap();

        assert_eq!(queue.len(), 3);
        assert_eq!(
            queue.records().unwrap(),
            vec![b"one".to_vec(), Vec::new(), b"three".to_vec()]
        );
    }

    #[test]
    fn test_overflow_keeps_newest_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut queue = QueueFile::open(dir.path().join("q"), 5).unwrap();

        for i in 0..13 {
            queue.add(&record(i)).unwrap();
        }

        let expected: Vec<Vec<u8>> = (8..13).map(record).collect();
        assert_eq!(queue.len(), 5);
        assert_eq!(queue.records().unwrap(), expected);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("q");
        {
            let mut queue = QueueFile::open(&path, 3).unwrap();
            for i in 0..4 {
                queue.add(&record(i)).unwrap();
            }
        }

        let mut queue = QueueFile::open(&path, 3).unwrap();
        let expected: Vec<Vec<u8>> = (1..4).map(record).collect();
        assert_eq!(queue.records().unwrap(), expected);

        queue.add(&record(4)).unwrap();
        let expected: Vec<Vec<u8>> = (2..5).map(record).collect();
        assert_eq!(queue.records().unwrap(), expected);
    }

    #[test]
    fn test_reopen_with_smaller_capacity_evicts_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q");
        {
            let mut queue = QueueFile::open(&path, 10).unwrap();
            for i in 0..6 {
                queue.add(&record(i)).unwrap();
            }
        }

        let mut queue = QueueFile::open(&path, 2).unwrap();
        assert_eq!(queue.records().unwrap(), vec![record(4), record(5)]);
    }

    #[test]
    fn test_clear_truncates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q");
        let mut queue = QueueFile::open(&path, 3).unwrap();
        queue.add(b"abc").unwrap();
        queue.clear().unwrap();

        assert!(queue.is_empty());
        assert!(queue.records().unwrap().is_empty());
        assert_eq!(fs::metadata(&path).unwrap().len(), HEADER_LEN);

        queue.add(b"after").unwrap();
        assert_eq!(queue.records().unwrap(), vec![b"after".to_vec()]);
    }

    #[test]
    fn test_garbage_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q");
        fs::write(&path, [0x5Au8; 100]).unwrap();

        match QueueFile::open(&path, 3) {
            Err(QueueError::Corrupt { .. }) => {}
            other => panic!("expected corrupt error, got {:?}", other),
        }
    }

    #[test]
    fn test_short_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q");
        fs::write(&path, b"ANRQ").unwrap();
        assert!(matches!(
            QueueFile::open(&path, 3),
            Err(QueueError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_uncommitted_tail_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q");
        {
            let mut queue = QueueFile::open(&path, 3).unwrap();
            queue.add(b"kept").unwrap();
        }

        // Simulate a crash between writing a record and committing the header
        let committed = fs::metadata(&path).unwrap().len();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[0, 0, 0, 9, b'p', b'a', b'r']).unwrap();
        drop(file);

        let mut queue = QueueFile::open(&path, 3).unwrap();
        assert_eq!(queue.records().unwrap(), vec![b"kept".to_vec()]);
        assert_eq!(fs::metadata(&path).unwrap().len(), committed);
    }

    #[test]
    fn test_snapshot_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q");
        {
            let mut queue = QueueFile::open(&path, 2).unwrap();
            for i in 0..3 {
                queue.add(&record(i)).unwrap();
            }
        }
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[0, 0]).unwrap();
        drop(file);
        let before = fs::read(&path).unwrap();

        let snapshot = read_snapshot(&path).unwrap();
        assert_eq!(snapshot.capacity, 2);
        assert_eq!(snapshot.records, vec![record(1), record(2)]);
        assert_eq!(snapshot.uncommitted_bytes, 2);
        assert_eq!(fs::read(&path).unwrap(), before);

        fs::write(&path, b"definitely not a queue file, far too weird").unwrap();
        assert!(matches!(
            read_snapshot(&path),
            Err(QueueError::Corrupt { .. })
        ));
        assert!(matches!(
            read_snapshot(dir.path().join("missing")),
            Err(QueueError::Io(_))
        ));
    }

    #[test]
    fn test_record_overrunning_tail_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q");
        {
            let mut queue = QueueFile::open(&path, 3).unwrap();
            queue.add(b"abcd").unwrap();
        }

        let mut bytes = fs::read(&path).unwrap();
        let at = HEADER_LEN as usize;
        bytes[at..at + 4].copy_from_slice(&1000u32.to_be_bytes());
        fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            QueueFile::open(&path, 3),
            Err(QueueError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_compaction_bounds_file_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q");
        let mut queue = QueueFile::open(&path, 4).unwrap();
        let payload = vec![7u8; 1000];

        for _ in 0..100 {
            queue.add(&payload).unwrap();
        }

        let live = 4 * (RECORD_PREFIX_LEN + payload.len() as u64);
        assert!(queue.file_len() <= HEADER_LEN + MIN_COMPACT_BYTES.max(live) + live);
        assert_eq!(fs::metadata(&path).unwrap().len(), queue.file_len());
        assert_eq!(queue.records().unwrap(), vec![payload.clone(); 4]);

        drop(queue);
        let mut reopened = QueueFile::open(&path, 4).unwrap();
        assert_eq!(reopened.records().unwrap(), vec![payload; 4]);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            QueueFile::open(dir.path().join("q"), 0),
            Err(QueueError::ZeroCapacity)
        ));
    }

    #[test]
    fn test_oversized_record_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut queue = QueueFile::open(dir.path().join("q"), 1).unwrap();
        let big = vec![0u8; MAX_RECORD_LEN + 1];
        assert!(matches!(
            queue.add(&big),
            Err(QueueError::RecordTooLarge(_))
        ));
        assert!(queue.is_empty());
    }
}
