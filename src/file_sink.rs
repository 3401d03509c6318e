//! Asynchronous append-only file sink
//!
//! Producers enqueue records on an unbounded channel and return immediately.
//! A single dedicated worker thread drains the channel in batches, encodes
//! every record with the shared line format, appends the batch to the file
//! and syncs it to stable storage before waiting for more.

use crate::schema::LogRecord;
use crate::sink::Sink;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tokio::sync::{mpsc, oneshot};

/// Buffer size for the writer wrapping the backing file
const WRITE_BUFFER_SIZE: usize = 64 * 1024;

/// Lifecycle of a [`FileSink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    /// Accepting writes; the worker drains as records arrive
    Running,
    /// Shutdown requested; the worker is emptying what is left
    Draining,
    /// Worker has exited and the file handle is closed
    Stopped,
}

impl SinkState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SinkState::Running,
            1 => SinkState::Draining,
            _ => SinkState::Stopped,
        }
    }
}

enum Command {
    Write(LogRecord),
    Flush(oneshot::Sender<io::Result<()>>),
    Shutdown,
}

/// State shared between the sink handle and its worker
struct Shared {
    path: PathBuf,
    state: AtomicU8,
    failed: AtomicBool,
}

impl Shared {
    fn set_state(&self, state: SinkState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

/// Buffered, asynchronous sink writing one encoded record per line
pub struct FileSink {
    sender: mpsc::UnboundedSender<Command>,
    worker: Mutex<Option<JoinHandle<()>>>,
    shared: Arc<Shared>,
}

impl FileSink {
    /// Open `path` for appending and start the background worker
    ///
    /// The parent directory is created if missing. Any failure to open the
    /// file is returned here; the sink is never handed out half-open.
    pub fn new(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let shared = Arc::new(Shared {
            path: path.clone(),
            state: AtomicU8::new(SinkState::Running as u8),
            failed: AtomicBool::new(false),
        });
        let (sender, receiver) = mpsc::unbounded_channel();

        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name("file-sink".to_string())
            .spawn(move || {
                Worker {
                    writer: BufWriter::with_capacity(WRITE_BUFFER_SIZE, file),
                    receiver,
                    shared: worker_shared,
                }
                .run()
            })?;

        tracing::debug!(path = %path.display(), "file sink started");

        Ok(Self {
            sender,
            worker: Mutex::new(Some(worker)),
            shared,
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    pub fn state(&self) -> SinkState {
        SinkState::from_u8(self.shared.state.load(Ordering::SeqCst))
    }

    /// Whether a storage failure has disabled this sink
    pub fn is_failed(&self) -> bool {
        self.shared.failed.load(Ordering::SeqCst)
    }

    /// Stop accepting records, drain everything pending, and close the file
    ///
    /// Blocks until the worker has exited. Calling it again is a no-op.
    pub fn shutdown(&self) {
        let worker = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(worker) = worker else {
            return;
        };

        if self.state() == SinkState::Running {
            self.shared.set_state(SinkState::Draining);
        }
        // The worker may already be gone if it hit a fatal error
        let _ = self.sender.send(Command::Shutdown);

        if worker.join().is_err() {
            tracing::error!(path = %self.shared.path.display(), "file sink worker panicked");
            self.shared.set_state(SinkState::Stopped);
        }
    }
}

impl Sink for FileSink {
    fn name(&self) -> &str {
        "FileSink"
    }

    /// Enqueue a record for the worker; never touches the disk
    fn write(&self, record: &LogRecord) {
        if self.sender.send(Command::Write(record.clone())).is_err() {
            tracing::warn!(
                path = %self.shared.path.display(),
                "file sink stopped, dropping record"
            );
        }
    }

    /// Drain every record enqueued before this call and sync the file
    ///
    /// Blocks the calling thread until the worker acknowledges. Must not be
    /// called from inside an async task; use `spawn_blocking` there.
    fn flush(&self) -> io::Result<()> {
        let (ack, done) = oneshot::channel();
        self.sender
            .send(Command::Flush(ack))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "file sink is stopped"))?;
        done.blocking_recv()
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "file sink worker exited"))?
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Worker {
    writer: BufWriter<File>,
    receiver: mpsc::UnboundedReceiver<Command>,
    shared: Arc<Shared>,
}

impl Worker {
    fn run(mut self) {
        let mut batch = Vec::new();
        let mut acks = Vec::new();

        loop {
            // Blocks until there is something to do; None once every
            // sender is gone, which only happens when the sink is dropped.
            let Some(command) = self.receiver.blocking_recv() else {
                break;
            };

            let mut stopping = false;
            let mut next = Some(command);
            while let Some(command) = next {
                match command {
                    Command::Write(record) => batch.push(record),
                    Command::Flush(ack) => acks.push(ack),
                    Command::Shutdown => {
                        self.shared.set_state(SinkState::Draining);
                        stopping = true;
                    }
                }
                next = self.receiver.try_recv().ok();
            }

            let result = self.drain(&mut batch);
            for ack in acks.drain(..) {
                let _ = ack.send(clone_result(&result));
            }

            if stopping {
                break;
            }
        }

        // Flush whatever BufWriter still holds before the file closes
        if !self.shared.failed.load(Ordering::SeqCst) {
            if let Err(e) = self.writer.flush() {
                self.fail(&e);
            }
        }
        self.shared.set_state(SinkState::Stopped);
        tracing::debug!(path = %self.shared.path.display(), "file sink stopped");
    }

    /// One drain cycle: append the batch and sync it to disk
    fn drain(&mut self, batch: &mut Vec<LogRecord>) -> io::Result<()> {
        if self.shared.failed.load(Ordering::SeqCst) {
            if !batch.is_empty() {
                tracing::warn!(
                    path = %self.shared.path.display(),
                    records = batch.len(),
                    "file sink failed earlier, discarding records"
                );
                batch.clear();
            }
            return Err(io::Error::other("file sink failed"));
        }

        let count = batch.len();
        match self.append(batch) {
            Ok(()) => {
                if count > 0 {
                    tracing::trace!(path = %self.shared.path.display(), records = count, "drained batch");
                }
                Ok(())
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    fn append(&mut self, batch: &mut Vec<LogRecord>) -> io::Result<()> {
        // Advisory lock so readers using flock never see a half-written batch
        self.writer.get_ref().lock_exclusive()?;
        let result = self.write_batch(batch);
        let unlocked = FileExt::unlock(self.writer.get_ref());
        result.and(unlocked)
    }

    fn write_batch(&mut self, batch: &mut Vec<LogRecord>) -> io::Result<()> {
        let mut line = String::new();
        for record in batch.drain(..) {
            line.clear();
            record.encode_into(&mut line);
            self.writer.write_all(line.as_bytes())?;
        }
        self.writer.flush()?;
        self.writer.get_ref().sync_data()
    }

    fn fail(&self, error: &io::Error) {
        if !self.shared.failed.swap(true, Ordering::SeqCst) {
            tracing::error!(
                path = %self.shared.path.display(),
                error = %error,
                "file sink write failed, sink disabled"
            );
        }
    }
}

fn clone_result(result: &io::Result<()>) -> io::Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
    }
}
