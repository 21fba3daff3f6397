//! Output and Reporting
//!
//! Human-readable formatting of test case outcomes and suite summaries.

use std::time::Duration;

use crate::cli::VerbosityLevel;
use crate::runner::SuiteReport;
use crate::test_case::{TestFailure, TestOutcome};

/// Output formatter for human-readable results
pub struct Output {
    verbosity: VerbosityLevel,
    show_colors: bool,
}

impl Output {
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            show_colors: atty::is(atty::Stream::Stdout),
        }
    }

    /// Formatter that never emits ANSI escapes
    pub fn plain(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            show_colors: false,
        }
    }

    fn colorize(&self, text: &str, color: &str) -> String {
        if self.show_colors {
            format!("\x1b[{}m{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    /// One result line per case; `None` when the verbosity hides it
    pub fn format_outcome(&self, outcome: &TestOutcome) -> Option<String> {
        if outcome.passed() && self.verbosity == VerbosityLevel::Quiet {
            return None;
        }

        let duration = format_duration(outcome.duration);
        if outcome.passed() {
            return Some(format!(
                "{}  {} ({})",
                self.colorize("✓ PASS", "32"),
                outcome.name,
                duration
            ));
        }

        let mut output = format!(
            "{}  {} ({}) - {} failure{}",
            self.colorize("✗ FAIL", "31"),
            outcome.name,
            duration,
            outcome.failures.len(),
            if outcome.failures.len() == 1 { "" } else { "s" }
        );

        for failure in &outcome.failures {
            output.push_str(&self.format_failure(failure));
        }

        if self.verbosity >= VerbosityLevel::Verbose {
            for (label, text) in [
                ("stdout", &outcome.captured.stdout),
                ("stderr", &outcome.captured.stderr),
            ] {
                if !text.is_empty() {
                    output.push_str(&format!("\n    Captured {}:", label));
                    for line in text.lines() {
                        output.push_str(&format!("\n      {}", line));
                    }
                }
            }
        }

        Some(output)
    }

    fn format_failure(&self, failure: &TestFailure) -> String {
        let text = failure.to_string();
        let mut lines = text.lines();
        let mut output = format!("\n    {}", lines.next().unwrap_or_default());
        for line in lines {
            output.push_str(&format!("\n      {}", line));
        }
        output
    }

    pub fn format_summary(&self, report: &SuiteReport) -> String {
        if self.verbosity == VerbosityLevel::Quiet {
            return if report.success() {
                String::new()
            } else {
                format!("Failed: {} of {}\n", report.failed(), report.total())
            };
        }

        let mut output = String::new();
        output.push_str("Validation Summary:\n");
        output.push_str(&format!("  Total cases: {}\n", report.total()));
        output.push_str(&format!(
            "  {} {}\n",
            self.colorize("Passed:", "32"),
            report.passed()
        ));
        if report.failed() > 0 {
            output.push_str(&format!(
                "  {} {}\n",
                self.colorize("Failed:", "31"),
                report.failed()
            ));
        }
        output.push_str(&format!(
            "  Duration: {}\n",
            format_duration(report.total_duration)
        ));
        output
    }
}

fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs_f64();
    if total_secs < 1.0 {
        format!("{:.0}ms", duration.as_millis())
    } else if total_secs < 60.0 {
        format!("{:.2}s", total_secs)
    } else {
        let mins = (total_secs / 60.0) as u64;
        let secs = total_secs % 60.0;
        format!("{}m{:.1}s", mins, secs)
    }
}
