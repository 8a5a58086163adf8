//! JSON Lines backend shared by several processes.
//!
//! Layout: the first line is a [`StoreHeader`], every following line is one
//! entry. Writers serialise on an advisory lock held on a sidecar `.lock`
//! file. Each append is a single `write_all` of a newline-terminated record
//! on an append-mode handle, followed by `sync_data`. Readers take no lock
//! and read no further than the last newline present when they opened the
//! file, so an append in flight (or torn by a crash) is never observed. The
//! next locked append truncates a torn tail and rewrites that region; an
//! open reader never reaches it. Pruning rewrites into a temp file and
//! renames it over the store.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::{EntryIter, MemoryBackend};
use crate::entry::{MemoryEntry, PendingEntry};
use crate::error::MemoryStoreError;
use crate::retention::PruneBound;

pub const CURRENT_STORE_VERSION: u32 = 1;

const TAIL_CHUNK_BYTES: u64 = 8 * 1024;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreHeader {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    /// Highest sequence number ever pruned away.
    #[serde(default)]
    pub base_seq: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StoreLine {
    Header(StoreHeader),
    Entry(MemoryEntry),
}

/// File-backed store in newline-delimited JSON.
#[derive(Debug, Clone)]
pub struct JsonlBackend {
    path: PathBuf,
    lock_path: PathBuf,
    tmp_path: PathBuf,
}

struct StoreLock {
    file: File,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// What the end of the file looks like.
#[derive(Debug, PartialEq, Eq)]
struct Tail {
    len: u64,
    /// Length up to and including the last newline.
    complete_len: u64,
    last_line: Option<String>,
}

impl JsonlBackend {
    /// Open the store at `path`, creating it (and its parent directory) if needed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, MemoryStoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|error| MemoryStoreError::io(parent, error))?;
        }

        let backend = Self {
            lock_path: sibling_path(&path, "lock"),
            tmp_path: sibling_path(&path, "tmp"),
            path,
        };
        let _lock = backend.lock()?;
        backend.ensure_header()?;
        Ok(backend)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the store header without taking the writer lock.
    pub fn header(&self) -> Result<StoreHeader, MemoryStoreError> {
        self.read_header()
    }

    fn lock(&self) -> Result<StoreLock, MemoryStoreError> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(|error| MemoryStoreError::io(&self.lock_path, error))?;
        file.lock()
            .map_err(|error| MemoryStoreError::io(&self.lock_path, error))?;
        Ok(StoreLock { file })
    }

    fn ensure_header(&self) -> Result<StoreHeader, MemoryStoreError> {
        match fs::metadata(&self.path) {
            Ok(metadata) if metadata.len() > 0 => self.read_header(),
            Ok(_) => self.write_fresh_store(),
            Err(error) if error.kind() == io::ErrorKind::NotFound => self.write_fresh_store(),
            Err(error) => Err(MemoryStoreError::io(&self.path, error)),
        }
    }

    fn write_fresh_store(&self) -> Result<StoreHeader, MemoryStoreError> {
        let header = StoreHeader {
            version: CURRENT_STORE_VERSION,
            created_at: Utc::now(),
            base_seq: 0,
        };
        self.rewrite(&header, &[])?;
        tracing::info!(path = %self.path.display(), "created shared memory store");
        Ok(header)
    }

    fn read_header(&self) -> Result<StoreHeader, MemoryStoreError> {
        let file = File::open(&self.path).map_err(|error| MemoryStoreError::io(&self.path, error))?;
        let mut reader = BufReader::new(file);
        let mut first_line = Vec::new();
        reader
            .read_until(b'\n', &mut first_line)
            .map_err(|error| MemoryStoreError::io(&self.path, error))?;

        let parsed = serde_json::from_slice::<StoreLine>(&first_line).map_err(|source| {
            MemoryStoreError::Corrupt {
                path: self.path.clone(),
                line: 1,
                source,
            }
        })?;
        let StoreLine::Header(header) = parsed else {
            return Err(MemoryStoreError::Format {
                path: self.path.clone(),
                reason: "first line is not a store header".to_string(),
            });
        };
        if header.version > CURRENT_STORE_VERSION {
            return Err(MemoryStoreError::Format {
                path: self.path.clone(),
                reason: format!(
                    "store version {} is newer than supported version {CURRENT_STORE_VERSION}",
                    header.version
                ),
            });
        }
        Ok(header)
    }

    /// Replace the whole store with `header` and `entries` via temp file + rename.
    fn rewrite(&self, header: &StoreHeader, entries: &[MemoryEntry]) -> Result<(), MemoryStoreError> {
        let mut buffer = encode_line(&StoreLine::Header(header.clone()))?;
        for entry in entries {
            buffer.extend(encode_line(&StoreLine::Entry(entry.clone()))?);
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.tmp_path)
            .map_err(|error| MemoryStoreError::io(&self.tmp_path, error))?;
        file.write_all(&buffer)
            .map_err(|error| MemoryStoreError::io(&self.tmp_path, error))?;
        file.sync_all()
            .map_err(|error| MemoryStoreError::io(&self.tmp_path, error))?;
        drop(file);

        fs::rename(&self.tmp_path, &self.path)
            .map_err(|error| MemoryStoreError::io(&self.path, error))?;
        sync_parent_dir(&self.path);
        Ok(())
    }

    fn next_seq(&self, tail: &Tail, file: &File) -> Result<u64, MemoryStoreError> {
        let parsed = tail
            .last_line
            .as_deref()
            .filter(|line| !line.is_empty())
            .and_then(|line| serde_json::from_str::<StoreLine>(line).ok());
        let last_seq = match parsed {
            Some(StoreLine::Entry(entry)) => entry.seq,
            Some(StoreLine::Header(header)) => header.base_seq,
            None => self.max_seq_by_scan(file)?,
        };
        Ok(last_seq + 1)
    }

    /// Slow path when the last line cannot be read on its own.
    fn max_seq_by_scan(&self, file: &File) -> Result<u64, MemoryStoreError> {
        let reader = file
            .try_clone()
            .map_err(|error| MemoryStoreError::io(&self.path, error))?;
        let mut max_seq = self.read_header()?.base_seq;
        for entry in JsonlEntries::new(self.path.clone(), reader)? {
            max_seq = max_seq.max(entry?.seq);
        }
        Ok(max_seq)
    }
}

impl MemoryBackend for JsonlBackend {
    fn append(&self, entry: PendingEntry) -> Result<MemoryEntry, MemoryStoreError> {
        let _lock = self.lock()?;
        self.ensure_header()?;

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(|error| MemoryStoreError::io(&self.path, error))?;
        let tail = read_tail(&mut file).map_err(|error| MemoryStoreError::io(&self.path, error))?;
        if tail.complete_len < tail.len {
            tracing::warn!(
                path = %self.path.display(),
                torn_bytes = tail.len - tail.complete_len,
                "truncating torn tail left by an interrupted append"
            );
            file.set_len(tail.complete_len)
                .map_err(|error| MemoryStoreError::io(&self.path, error))?;
        }

        let stored = entry.into_entry(self.next_seq(&tail, &file)?);
        let line = encode_line(&StoreLine::Entry(stored.clone()))?;
        file.write_all(&line)
            .map_err(|error| MemoryStoreError::io(&self.path, error))?;
        file.sync_data()
            .map_err(|error| MemoryStoreError::io(&self.path, error))?;
        Ok(stored)
    }

    fn scan(&self) -> Result<EntryIter<'_>, MemoryStoreError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Ok(Box::new(std::iter::empty()));
            }
            Err(error) => return Err(MemoryStoreError::io(&self.path, error)),
        };
        Ok(Box::new(JsonlEntries::new(self.path.clone(), file)?))
    }

    fn prune(&self, bound: PruneBound, now: DateTime<Utc>) -> Result<usize, MemoryStoreError> {
        let _lock = self.lock()?;
        let header = self.ensure_header()?;
        let entries = self.scan()?.collect::<Result<Vec<_>, _>>()?;
        let split = bound.split(entries, now);
        if split.removed == 0 {
            return Ok(0);
        }

        let header = StoreHeader {
            base_seq: header.base_seq.max(split.removed_max_seq.unwrap_or(0)),
            ..header
        };
        self.rewrite(&header, &split.kept)?;
        tracing::info!(
            path = %self.path.display(),
            removed = split.removed,
            kept = split.kept.len(),
            "pruned shared memory"
        );
        Ok(split.removed)
    }
}

/// Streaming reader over complete entry lines.
pub struct JsonlEntries {
    path: PathBuf,
    reader: BufReader<io::Take<File>>,
    line_no: usize,
    buffer: Vec<u8>,
    done: bool,
}

impl JsonlEntries {
    fn new(path: PathBuf, mut file: File) -> Result<Self, MemoryStoreError> {
        let complete_len = read_tail(&mut file)
            .map_err(|error| MemoryStoreError::io(&path, error))?
            .complete_len;
        file.seek(SeekFrom::Start(0))
            .map_err(|error| MemoryStoreError::io(&path, error))?;
        Ok(Self {
            path,
            reader: BufReader::new(file.take(complete_len)),
            line_no: 0,
            buffer: Vec::new(),
            done: false,
        })
    }
}

impl Iterator for JsonlEntries {
    type Item = Result<MemoryEntry, MemoryStoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            self.buffer.clear();
            match self.reader.read_until(b'\n', &mut self.buffer) {
                Ok(0) => {
                    self.done = true;
                    return None;
                }
                Ok(_) => {}
                Err(error) => {
                    self.done = true;
                    return Some(Err(MemoryStoreError::io(&self.path, error)));
                }
            }
            self.line_no += 1;

            if self.buffer.last() != Some(&b'\n') {
                tracing::debug!(
                    path = %self.path.display(),
                    line = self.line_no,
                    "ignoring unterminated tail record"
                );
                self.done = true;
                return None;
            }
            if self.buffer.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            match serde_json::from_slice::<StoreLine>(&self.buffer) {
                Ok(StoreLine::Entry(entry)) => return Some(Ok(entry)),
                Ok(StoreLine::Header(_)) => continue,
                Err(source) => {
                    return Some(Err(MemoryStoreError::Corrupt {
                        path: self.path.clone(),
                        line: self.line_no,
                        source,
                    }));
                }
            }
        }
        None
    }
}

fn encode_line(line: &StoreLine) -> Result<Vec<u8>, MemoryStoreError> {
    let mut bytes = serde_json::to_vec(line).map_err(MemoryStoreError::Serialize)?;
    bytes.push(b'\n');
    Ok(bytes)
}

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|value| value.to_os_string())
        .unwrap_or_else(|| OsString::from("shared_memory.jsonl"));
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) {}

fn read_tail(file: &mut File) -> io::Result<Tail> {
    let len = file.metadata()?.len();
    let mut start = len;
    let mut window: Vec<u8> = Vec::new();

    loop {
        if let Some(tail) = locate_tail(&window, start, len) {
            return Ok(tail);
        }
        let read_from = start.saturating_sub(TAIL_CHUNK_BYTES);
        let mut chunk = vec![0_u8; (start - read_from) as usize];
        file.seek(SeekFrom::Start(read_from))?;
        file.read_exact(&mut chunk)?;
        chunk.extend_from_slice(&window);
        window = chunk;
        start = read_from;
    }
}

/// `window` holds the bytes `start..len` of the file.
fn locate_tail(window: &[u8], start: u64, len: u64) -> Option<Tail> {
    let at_file_start = start == 0;
    let Some(last_newline) = window.iter().rposition(|byte| *byte == b'\n') else {
        return at_file_start.then_some(Tail {
            len,
            complete_len: 0,
            last_line: None,
        });
    };

    let line_start = match window[..last_newline]
        .iter()
        .rposition(|byte| *byte == b'\n')
    {
        Some(previous) => previous + 1,
        None if at_file_start => 0,
        None => return None,
    };
    Some(Tail {
        len,
        complete_len: start + last_newline as u64 + 1,
        last_line: Some(
            String::from_utf8_lossy(&window[line_start..last_newline])
                .trim()
                .to_string(),
        ),
    })
}
