//! Validation Test Case
//!
//! One target fetched through one client and checked by one validator. A run
//! announces the case on the uncaptured stdout, captures both streams, fetches
//! and validates the document, then restores the streams and scans what was
//! captured for error and warning markers.

use std::any::Any;
use std::fmt;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::capture::{
    CaptureGuard, CapturedOutput, LogFollower, OutputStreams, Stream, has_log_errors,
    has_log_warnings,
};
use crate::http_client::{Credentials, DocumentFetcher};
use crate::target::Target;
use crate::validator::DocumentValidator;

/// One of the four checks run on the captured output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogCheck {
    StdoutErrors,
    StdoutWarnings,
    StderrErrors,
    StderrWarnings,
}

impl LogCheck {
    pub const ALL: [LogCheck; 4] = [
        LogCheck::StdoutErrors,
        LogCheck::StdoutWarnings,
        LogCheck::StderrErrors,
        LogCheck::StderrWarnings,
    ];

    pub fn stream(&self) -> Stream {
        match self {
            LogCheck::StdoutErrors | LogCheck::StdoutWarnings => Stream::Stdout,
            LogCheck::StderrErrors | LogCheck::StderrWarnings => Stream::Stderr,
        }
    }

    /// True when the captured output trips this check
    pub fn fails(&self, captured: &CapturedOutput) -> bool {
        let output = captured.get(self.stream());
        match self {
            LogCheck::StdoutErrors | LogCheck::StderrErrors => has_log_errors(output),
            LogCheck::StdoutWarnings | LogCheck::StderrWarnings => has_log_warnings(output),
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            LogCheck::StdoutErrors => "Errors found in the stdout output",
            LogCheck::StdoutWarnings => "Warnings found in the stdout output",
            LogCheck::StderrErrors => "Errors found in the stderr output",
            LogCheck::StderrWarnings => "Warnings found in the stderr output",
        }
    }
}

/// Why a test case failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestFailure {
    /// The document could not be retrieved
    Fetch { message: String },
    /// The validator reported at least one error
    Validation { message: String },
    /// The validator panicked
    Panicked { message: String },
    /// A marker was found in the captured output
    LogHygiene(LogCheck),
    /// The output streams could not be captured
    Capture { message: String },
    /// The captured output could not be replayed into the restored streams
    Restore { message: String },
}

impl fmt::Display for TestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestFailure::Fetch { message } => write!(f, "Failed to fetch document: {}", message),
            TestFailure::Validation { message } => f.write_str(message),
            TestFailure::Panicked { message } => write!(f, "Validator panicked: {}", message),
            TestFailure::LogHygiene(check) => f.write_str(check.description()),
            TestFailure::Capture { message } => {
                write!(f, "Failed to capture output streams: {}", message)
            }
            TestFailure::Restore { message } => {
                write!(f, "Failed to restore output streams: {}", message)
            }
        }
    }
}

/// Result of running one test case
#[derive(Debug, Clone)]
pub struct TestOutcome {
    pub name: String,
    pub failures: Vec<TestFailure>,
    pub captured: CapturedOutput,
    pub duration: Duration,
}

impl TestOutcome {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    /// True when one of the four output checks failed
    pub fn failed_check(&self, check: LogCheck) -> bool {
        self.failures.contains(&TestFailure::LogHygiene(check))
    }

    pub fn validation_message(&self) -> Option<&str> {
        self.failures.iter().find_map(|f| match f {
            TestFailure::Validation { message } => Some(message.as_str()),
            _ => None,
        })
    }
}

pub struct ValidationTestCase {
    target: Target,
    fetcher: Arc<dyn DocumentFetcher>,
    validator: Arc<dyn DocumentValidator>,
}

impl ValidationTestCase {
    pub fn new(
        target: Target,
        fetcher: Arc<dyn DocumentFetcher>,
        validator: Arc<dyn DocumentValidator>,
    ) -> Self {
        Self {
            target,
            fetcher,
            validator,
        }
    }

    pub fn name(&self) -> String {
        format!(
            "Validating {} validity for: {}",
            self.validator.name(),
            self.target.name()
        )
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn credentials(&self) -> &Credentials {
        self.fetcher.credentials()
    }

    /// Run the case against `streams`.
    ///
    /// When a log follower is given, whatever the server appends to its log
    /// during the run is added to the captured stdout before the checks.
    pub async fn run(
        &self,
        streams: &OutputStreams,
        mut server_log: Option<&mut LogFollower>,
    ) -> TestOutcome {
        let started = Instant::now();
        let name = self.name();

        let mut stdout = streams.stdout();
        if let Err(e) = writeln!(stdout, "{}", name).and_then(|_| stdout.flush()) {
            warn!(error = %e, "failed to announce test case");
        }

        let guard = match streams.capture() {
            Ok(guard) => guard,
            Err(e) => {
                return TestOutcome {
                    name,
                    failures: vec![TestFailure::Capture {
                        message: e.to_string(),
                    }],
                    captured: CapturedOutput::default(),
                    duration: started.elapsed(),
                };
            }
        };

        if let Some(log) = server_log.as_deref_mut()
            && let Err(e) = log.mark().await
        {
            warn!(path = %log.path().display(), error = %e, "failed to mark server log");
        }

        let mut failures = Vec::new();
        if let Err(failure) = self.check_document(&guard).await {
            failures.push(failure);
        }

        if let Some(log) = server_log {
            match log.drain().await {
                Ok(appended) => {
                    if let Err(e) = guard.writer(Stream::Stdout).write_all(&appended) {
                        warn!(error = %e, "failed to copy server log output");
                    }
                }
                Err(e) => warn!(path = %log.path().display(), error = %e, "failed to read server log"),
            }
        }

        let (captured, replayed) = guard.finish();
        if let Err(e) = replayed {
            failures.push(TestFailure::Restore {
                message: e.to_string(),
            });
        }
        failures.extend(
            LogCheck::ALL
                .iter()
                .filter(|check| check.fails(&captured))
                .map(|check| TestFailure::LogHygiene(*check)),
        );

        let outcome = TestOutcome {
            name,
            failures,
            captured,
            duration: started.elapsed(),
        };
        info!(
            case = %outcome.name,
            passed = outcome.passed(),
            failures = outcome.failures.len(),
            "test case finished"
        );
        outcome
    }

    async fn check_document(&self, guard: &CaptureGuard) -> Result<(), TestFailure> {
        let body = self
            .fetcher
            .fetch(self.target.url())
            .await
            .map_err(|e| TestFailure::Fetch {
                message: e.to_string(),
            })?;

        let errors = panic::catch_unwind(AssertUnwindSafe(|| self.validator.validate(&body)))
            .map_err(|payload| TestFailure::Panicked {
                message: panic_message(payload.as_ref()),
            })?;
        debug!(url = %self.target.url(), reported = errors.len(), "document validated");

        let mut stdout = guard.writer(Stream::Stdout);
        let mut message = format!("Validation errors in {}", self.target.name());
        let mut has_error = false;

        for error in &errors {
            if error.is_warning() {
                let written = match &error.position {
                    Some(pos) => writeln!(
                        stdout,
                        "Warning at {}:{} {}",
                        pos.line, pos.column, error.message
                    ),
                    None => writeln!(stdout, "Warning {}", error.message),
                };
                if let Err(e) = written {
                    warn!(error = %e, "failed to report validation warning");
                }
            } else {
                match &error.position {
                    Some(pos) => message.push_str(&format!(
                        "\n{} at line [{}] column [{}]",
                        error, pos.line, pos.column
                    )),
                    None => message.push_str(&format!("\n{}", error)),
                }
                has_error = true;
            }
        }

        if has_error {
            if let Err(e) = dump_content(guard, &body) {
                warn!(error = %e, "failed to dump validated content");
            }
            return Err(TestFailure::Validation { message });
        }
        Ok(())
    }
}

/// Write the document to stderr with 1-based line numbers
fn dump_content(guard: &CaptureGuard, body: &[u8]) -> std::io::Result<()> {
    let mut stderr = guard.writer(Stream::Stderr);
    writeln!(stderr)?;
    writeln!(stderr, "Validated content:")?;
    for (index, line) in String::from_utf8_lossy(body).lines().enumerate() {
        writeln!(stderr, "{}\t{}", index + 1, line)?;
    }
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
