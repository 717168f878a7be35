//! Per-run context: randomness, reporting and cancellation.
//!
//! Nothing in the pipeline reaches for process-global state. The random
//! source that picks the sampling offset, the sink that receives console and
//! log lines, and the cancellation flag all travel in a [`RunContext`]. Tests
//! pass a seeded RNG and a [`MemorySink`]; the binary passes an OS-seeded RNG,
//! a [`ConsoleSink`] and a flag wired to `SIGINT`.
//!
//! The run log file itself is a [`RunLog`]: append-only, one line per call,
//! guarded by a mutex so parallel exports never interleave partial lines.

use rand::RngCore;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Receiver for operator-facing lines.
///
/// `console` lines are progress messages for the person running the tool.
/// `log` lines are the ones also written to the run log file.
pub trait LogSink: Send + Sync {
    fn console(&self, line: &str);
    fn log(&self, line: &str);
}

/// Prints console lines to stdout; log lines go to `tracing` at debug level,
/// since the run log file already holds them.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl LogSink for ConsoleSink {
    fn console(&self, line: &str) {
        println!("{line}");
    }

    fn log(&self, line: &str) {
        tracing::debug!(target: "stepanizerizer::runlog", "{line}");
    }
}

/// Sink that keeps every line in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    console: Mutex<Vec<String>>,
    log: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn console_lines(&self) -> Vec<String> {
        self.console.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn log_lines(&self) -> Vec<String> {
        self.log.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl LogSink for MemorySink {
    fn console(&self, line: &str) {
        if let Ok(mut lines) = self.console.lock() {
            lines.push(line.to_string());
        }
    }

    fn log(&self, line: &str) {
        if let Ok(mut lines) = self.log.lock() {
            lines.push(line.to_string());
        }
    }
}

/// Cooperative cancellation flag, checked between slices.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// The shared flag, for registering with a signal handler.
    pub fn as_atomic(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

/// Everything a run needs besides its configuration.
pub struct RunContext {
    pub rng: Box<dyn RngCore + Send>,
    pub sink: Arc<dyn LogSink>,
    pub cancel: CancelFlag,
    /// Command line recorded in the run log banner.
    pub command_line: String,
}

impl RunContext {
    pub fn new(rng: Box<dyn RngCore + Send>, sink: Arc<dyn LogSink>) -> Self {
        Self {
            rng,
            sink,
            cancel: CancelFlag::new(),
            command_line: String::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_command_line(mut self, command_line: impl Into<String>) -> Self {
        self.command_line = command_line.into();
        self
    }
}

/// Append-only run log file.
pub struct RunLog {
    writer: Mutex<BufWriter<File>>,
}

impl RunLog {
    /// Create the log file. Fails if it already exists.
    pub fn create(path: &Path) -> std::io::Result<Self> {
        let file = File::options().write(true).create_new(true).open(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Append one line and flush it, so the file documents progress even if
    /// the run aborts.
    pub fn write_line(&self, line: &str) -> std::io::Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| std::io::Error::other("run log lock poisoned"))?;
        writeln!(writer, "{line}")?;
        writer.flush()
    }
}
