use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::suite::SuiteKeys;

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum VerbosityLevel {
    /// Only show failures and the final summary
    Quiet,
    /// Show one line per test case
    #[default]
    Normal,
    /// Show failure details and captured output
    Verbose,
}

/// Document type the suite validates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ValidatorKind {
    /// XHTML 1.0 Strict pages
    #[default]
    Xhtml,
    /// RSS 2.0 feeds
    Rss,
    /// Well-formed XML only
    Xml,
    /// XML Schema (XSD) validation, requires --schema
    Schema,
}

impl ValidatorKind {
    /// Default configuration keys of the admin and guest URL lists
    pub fn suite_keys(&self) -> SuiteKeys {
        match self {
            ValidatorKind::Rss => SuiteKeys::rss(),
            ValidatorKind::Xhtml | ValidatorKind::Xml | ValidatorKind::Schema => SuiteKeys::xhtml(),
        }
    }
}

/// Validate the pages and feeds served by a running web application
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "webstandards-check")]
#[command(
    about = "Fetch configured URLs from a running application, validate every response and fail on server-side errors or warnings"
)]
#[command(version)]
pub struct Cli {
    /// Configuration file (TOML or JSON)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Base URL the configured paths are resolved against
    #[arg(long = "base-url")]
    pub base_url: Option<String>,

    /// Document type to validate
    #[arg(long = "validator", value_enum, default_value_t = ValidatorKind::Xhtml)]
    pub validator: ValidatorKind,

    /// XSD file used by the schema validator
    #[arg(long = "schema", required_if_eq("validator", "schema"))]
    pub schema: Option<PathBuf>,

    /// Configuration key of the URLs fetched with administrator credentials
    #[arg(long = "admin-key")]
    pub admin_key: Option<String>,

    /// Configuration key of the URLs fetched anonymously
    #[arg(long = "guest-key")]
    pub guest_key: Option<String>,

    /// Server log file whose new lines are checked for errors and warnings
    #[arg(long = "server-log")]
    pub server_log: Option<PathBuf>,

    /// HTTP request timeout in seconds
    #[arg(long = "timeout")]
    pub timeout: Option<u64>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", help = "Enable verbose output")]
    pub verbose: bool,

    /// Enable quiet mode (failures only)
    #[arg(
        short = 'q',
        long = "quiet",
        help = "Quiet mode",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Admin and guest list keys, falling back to the validator's defaults
    pub fn suite_keys(&self) -> SuiteKeys {
        let mut keys = self.validator.suite_keys();
        if let Some(admin) = &self.admin_key {
            keys.as_admin = admin.clone();
        }
        if let Some(guest) = &self.guest_key {
            keys.as_guest = guest.clone();
        }
        keys
    }
}
