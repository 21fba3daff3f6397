//! Output Capture
//!
//! Test cases do not redirect the process-wide stdout/stderr. Instead every
//! piece of output a test case (or an in-process application under test) emits
//! goes through an [`OutputStreams`] handle. While a [`CaptureGuard`] is alive,
//! writes land in two fresh in-memory buffers; when the guard is finished or
//! dropped the original destinations are restored, the buffered bytes are
//! replayed through them, and the captured text is handed back for inspection.
//!
//! The guard restores on every exit path, including unwinding, so a failing or
//! panicking test case never leaves the streams redirected.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tracing::{Level, Metadata};
use tracing_subscriber::fmt::MakeWriter;

use crate::error::{HarnessError, Result};

type Sink = Box<dyn Write + Send>;

/// Which of the two output streams a write targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

#[derive(Default)]
struct Buffers {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl Buffers {
    fn get_mut(&mut self, stream: Stream) -> &mut Vec<u8> {
        match stream {
            Stream::Stdout => &mut self.stdout,
            Stream::Stderr => &mut self.stderr,
        }
    }
}

struct StreamState {
    stdout: Sink,
    stderr: Sink,
    captured: Option<Buffers>,
    restorations: usize,
}

impl StreamState {
    fn sink(&mut self, stream: Stream) -> &mut Sink {
        match stream {
            Stream::Stdout => &mut self.stdout,
            Stream::Stderr => &mut self.stderr,
        }
    }
}

/// Shared handle to the current stdout/stderr destinations
#[derive(Clone)]
pub struct OutputStreams {
    state: Arc<Mutex<StreamState>>,
}

impl std::fmt::Debug for OutputStreams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputStreams")
            .field("capturing", &self.is_capturing())
            .field("restorations", &self.restorations())
            .finish()
    }
}

impl OutputStreams {
    /// Create streams writing to the given original destinations
    pub fn new(stdout: impl Write + Send + 'static, stderr: impl Write + Send + 'static) -> Self {
        Self {
            state: Arc::new(Mutex::new(StreamState {
                stdout: Box::new(stdout),
                stderr: Box::new(stderr),
                captured: None,
                restorations: 0,
            })),
        }
    }

    /// Streams backed by the process stdout and stderr
    pub fn stdio() -> Self {
        Self::new(io::stdout(), io::stderr())
    }

    fn lock(&self) -> MutexGuard<'_, StreamState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn stdout(&self) -> StreamWriter {
        StreamWriter {
            streams: self.clone(),
            stream: Stream::Stdout,
        }
    }

    pub fn stderr(&self) -> StreamWriter {
        StreamWriter {
            streams: self.clone(),
            stream: Stream::Stderr,
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.lock().captured.is_some()
    }

    /// Number of times a capture has been released and the originals restored
    pub fn restorations(&self) -> usize {
        self.lock().restorations
    }

    /// Start capturing both streams into fresh buffers.
    ///
    /// Only one capture may be active at a time.
    pub fn capture(&self) -> Result<CaptureGuard> {
        let mut state = self.lock();
        if state.captured.is_some() {
            return Err(HarnessError::CaptureInProgress);
        }
        // pending output must reach the originals before the redirection starts
        let flushed = state.stdout.flush().and_then(|_| state.stderr.flush());
        state.captured = Some(Buffers::default());
        drop(state);

        if let Err(e) = flushed {
            tracing::warn!(error = %e, "failed to flush output before capture");
        }
        Ok(CaptureGuard {
            streams: self.clone(),
            released: false,
        })
    }

    fn write_to(&self, stream: Stream, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.lock();
        match state.captured.as_mut() {
            Some(buffers) => {
                buffers.get_mut(stream).extend_from_slice(buf);
                Ok(buf.len())
            }
            None => state.sink(stream).write(buf),
        }
    }

    fn flush_stream(&self, stream: Stream) -> io::Result<()> {
        let mut state = self.lock();
        match state.captured {
            Some(_) => Ok(()),
            None => state.sink(stream).flush(),
        }
    }

    fn release(&self) -> (CapturedOutput, io::Result<()>) {
        let mut state = self.lock();
        let buffers = state.captured.take().unwrap_or_default();
        state.restorations += 1;

        let replayed = replay(&mut state, &buffers);

        let output = CapturedOutput {
            stdout: String::from_utf8_lossy(&buffers.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&buffers.stderr).into_owned(),
        };
        (output, replayed)
    }
}

fn replay(state: &mut StreamState, buffers: &Buffers) -> io::Result<()> {
    state.stdout.write_all(&buffers.stdout)?;
    state.stdout.flush()?;
    state.stderr.write_all(&buffers.stderr)?;
    state.stderr.flush()
}

/// `io::Write` handle routed to the current destination of one stream
#[derive(Clone)]
pub struct StreamWriter {
    streams: OutputStreams,
    stream: Stream,
}

impl Write for StreamWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.streams.write_to(self.stream, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.streams.flush_stream(self.stream)
    }
}

/// Lets an in-process application under test log through the captured
/// streams: WARN and ERROR events go to stderr, everything else to stdout.
impl<'a> MakeWriter<'a> for OutputStreams {
    type Writer = StreamWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.stdout()
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        if *meta.level() <= Level::WARN {
            self.stderr()
        } else {
            self.stdout()
        }
    }
}

/// Active capture; restores the original destinations exactly once
#[must_use = "dropping the guard immediately ends the capture"]
pub struct CaptureGuard {
    streams: OutputStreams,
    released: bool,
}

impl CaptureGuard {
    /// Write into the capture buffer of one stream
    pub fn writer(&self, stream: Stream) -> StreamWriter {
        match stream {
            Stream::Stdout => self.streams.stdout(),
            Stream::Stderr => self.streams.stderr(),
        }
    }

    /// End the capture, restore and replay, and return what was captured.
    ///
    /// The originals are restored even when replaying into them fails; the
    /// replay error is returned next to the captured text.
    pub fn finish(mut self) -> (CapturedOutput, io::Result<()>) {
        self.released = true;
        self.streams.release()
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            let (_, replayed) = self.streams.release();
            // logged after unlocking: a subscriber may write through these streams
            if let Err(e) = replayed {
                tracing::warn!(error = %e, "failed to replay captured output");
            }
        }
    }
}

/// Text captured from both streams during one test case
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CapturedOutput {
    pub fn get(&self, stream: Stream) -> &str {
        match stream {
            Stream::Stdout => &self.stdout,
            Stream::Stderr => &self.stderr,
        }
    }
}

/// Substring scan for error markers. "ERROR" is listed alongside "ERR" even
/// though the latter subsumes it; both are plain, case-sensitive scans.
pub fn has_log_errors(output: &str) -> bool {
    output.contains("ERROR") || output.contains("ERR")
}

/// Substring scan for warning markers, case-sensitive
pub fn has_log_warnings(output: &str) -> bool {
    output.contains("WARNING") || output.contains("WARN")
}

/// Follows a server log file so that lines appended while a test case runs can
/// be folded into that case's captured stdout.
#[derive(Debug, Clone)]
pub struct LogFollower {
    path: PathBuf,
    offset: u64,
}

impl LogFollower {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remember the current end of the log; a missing file counts as empty
    pub async fn mark(&mut self) -> Result<()> {
        self.offset = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        Ok(())
    }

    /// Read everything appended since the last mark or drain.
    ///
    /// A log that shrank was rotated or truncated and is read from the start.
    pub async fn drain(&mut self) -> Result<Vec<u8>> {
        let mut file = match tokio::fs::File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let len = file.metadata().await?.len();
        if len < self.offset {
            self.offset = 0;
        }
        file.seek(SeekFrom::Start(self.offset)).await?;

        let mut appended = Vec::new();
        file.read_to_end(&mut appended).await?;
        self.offset += appended.len() as u64;
        Ok(appended)
    }
}
