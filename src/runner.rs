use std::time::{Duration, Instant};

use tracing::info;

use crate::capture::{LogFollower, OutputStreams};
use crate::suite::ValidationSuite;
use crate::test_case::TestOutcome;

/// Aggregate result of a suite run
#[derive(Debug, Clone, Default)]
pub struct SuiteReport {
    pub outcomes: Vec<TestOutcome>,
    pub total_duration: Duration,
}

impl SuiteReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.passed()
    }

    /// True when every case passed; an empty suite succeeds
    pub fn success(&self) -> bool {
        self.outcomes.iter().all(TestOutcome::passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &TestOutcome> {
        self.outcomes.iter().filter(|o| !o.passed())
    }
}

/// Runs the cases of a suite one after another on shared output streams
pub struct SuiteRunner {
    streams: OutputStreams,
    server_log: Option<LogFollower>,
}

impl SuiteRunner {
    pub fn new(streams: OutputStreams) -> Self {
        Self {
            streams,
            server_log: None,
        }
    }

    /// Follow a server log file during every case
    pub fn with_server_log(mut self, follower: LogFollower) -> Self {
        self.server_log = Some(follower);
        self
    }

    pub fn streams(&self) -> &OutputStreams {
        &self.streams
    }

    pub async fn run(&mut self, suite: &ValidationSuite) -> SuiteReport {
        self.run_with_progress(suite, |_| {}).await
    }

    /// Run every case in order, calling `on_case` after each one finishes
    pub async fn run_with_progress<F>(&mut self, suite: &ValidationSuite, mut on_case: F) -> SuiteReport
    where
        F: FnMut(&TestOutcome),
    {
        let started = Instant::now();
        let mut outcomes = Vec::with_capacity(suite.len());

        for case in suite.cases() {
            let outcome = case.run(&self.streams, self.server_log.as_mut()).await;
            on_case(&outcome);
            outcomes.push(outcome);
        }

        let report = SuiteReport {
            outcomes,
            total_duration: started.elapsed(),
        };
        info!(
            total = report.total(),
            passed = report.passed(),
            failed = report.failed(),
            "suite finished"
        );
        report
    }
}
