//! Scan-and-filter source over an append-only record file

use crate::schema::{LogRecord, QueryParams};
use crate::source::Source;
use fs2::FileExt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Chunk size used when reading the file backwards
const TAIL_CHUNK_SIZE: u64 = 64 * 1024;

/// Answers queries by scanning a record file written in the line format
///
/// Every query rewinds to the start and reads the whole file, so results
/// always reflect what has been persisted so far. Lines that do not decode
/// are skipped.
pub struct FileSource {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileSource {
    /// Open `path` for reading; a missing or unreadable file is an error
    pub fn new(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = File::open(&path)?;
        if file.metadata()?.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is a directory", path.display()),
            ));
        }
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` on the read handle while holding a shared lock on the file
    ///
    /// The writer locks exclusively for each drain cycle, so a locked scan
    /// never observes a partially appended batch.
    fn with_locked_file<T>(&self, f: impl FnOnce(&mut File) -> io::Result<T>) -> io::Result<T> {
        let mut file = self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        file.lock_shared()?;
        let result = f(&mut *file);
        let unlocked = FileExt::unlock(&*file);
        let value = result?;
        unlocked?;
        Ok(value)
    }

    /// The last `n` well-formed records, oldest first
    ///
    /// Reads from the end of the file in chunks, so the cost grows with `n`
    /// rather than with the size of the file.
    pub fn tail(&self, n: usize) -> io::Result<Vec<LogRecord>> {
        if n == 0 {
            return Ok(Vec::new());
        }

        self.with_locked_file(|file| {
            let mut offset = file.seek(SeekFrom::End(0))?;
            let mut newest_first = Vec::with_capacity(n);
            // Bytes of the line that straddles the previous chunk boundary
            let mut carry: Vec<u8> = Vec::new();

            while offset > 0 && newest_first.len() < n {
                let read_size = TAIL_CHUNK_SIZE.min(offset);
                offset -= read_size;

                file.seek(SeekFrom::Start(offset))?;
                let mut chunk = vec![0u8; read_size as usize];
                file.read_exact(&mut chunk)?;
                chunk.append(&mut carry);

                let mut end = chunk.len();
                while let Some(pos) = chunk[..end].iter().rposition(|b| *b == b'\n') {
                    push_decoded(&chunk[pos + 1..end], &mut newest_first);
                    if newest_first.len() >= n {
                        break;
                    }
                    end = pos;
                }

                // Everything before the first newline may continue in the
                // previous chunk
                carry = chunk[..end].to_vec();
            }

            if offset == 0 && newest_first.len() < n {
                push_decoded(&carry, &mut newest_first);
            }

            newest_first.truncate(n);
            newest_first.reverse();
            Ok(newest_first)
        })
    }
}

fn push_decoded(line: &[u8], out: &mut Vec<LogRecord>) {
    if let Some(record) = decode(line) {
        out.push(record);
    }
}

/// Decode one raw line; `None` for blank, non-UTF-8 or malformed lines
fn decode(line: &[u8]) -> Option<LogRecord> {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    if line.is_empty() {
        return None;
    }
    std::str::from_utf8(line).ok().and_then(LogRecord::parse_line)
}

impl Source for FileSource {
    fn name(&self) -> &str {
        "FileSource"
    }

    fn query(&self, params: &QueryParams) -> io::Result<Vec<LogRecord>> {
        if params.is_inverted() {
            return Ok(Vec::new());
        }

        self.with_locked_file(|file| {
            file.seek(SeekFrom::Start(0))?;
            let mut reader = BufReader::new(file);
            let mut records = Vec::new();
            let mut line = Vec::new();
            let mut skipped = 0usize;

            loop {
                line.clear();
                if reader.read_until(b'\n', &mut line)? == 0 {
                    break;
                }
                match decode(&line) {
                    Some(record) if params.matches(&record) => records.push(record),
                    Some(_) => {}
                    None => skipped += 1,
                }
            }

            if skipped > 0 {
                tracing::debug!(path = %self.path.display(), lines = skipped, "skipped unreadable lines");
            }
            Ok(records)
        })
    }
}
