//! # webstandards-harness Library
//!
//! Integration-test harness for running web applications: fetches configured
//! pages and feeds over HTTP (as an administrator and as a guest), validates
//! every response body, and fails a test case when the validator reports errors
//! or when the output captured while the case ran contains error or warning
//! markers.

pub mod capture;
pub mod cli;
pub mod config;
pub mod error;
pub mod http_client;
pub mod libxml2;
pub mod markup;
pub mod output;
pub mod runner;
pub mod suite;
pub mod target;
pub mod test_case;
pub mod validator;

pub use capture::{
    CaptureGuard, CapturedOutput, LogFollower, OutputStreams, Stream, has_log_errors,
    has_log_warnings,
};
pub use cli::{Cli, ValidatorKind, VerbosityLevel};
pub use config::{
    ConfigError, ConfigManager, HarnessConfig, LayeredProperties, PropertySource,
    SystemEnvProvider,
};
pub use error::{HarnessError, LibXml2Error};
pub use http_client::{AsyncHttpClient, Credentials, DocumentFetcher, HttpClientConfig};
pub use libxml2::SchemaValidator;
pub use markup::{RssValidator, XhtmlValidator, XmlValidator};
pub use output::Output;
pub use runner::{SuiteReport, SuiteRunner};
pub use suite::{Access, SuiteBuilder, SuiteKeys, TestCaseSpec, ValidationSuite, plan_suite};
pub use target::Target;
pub use test_case::{LogCheck, TestFailure, TestOutcome, ValidationTestCase};
pub use validator::{DocumentValidator, ErrorType, Position, ValidationError};
