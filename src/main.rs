use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use webstandards_harness::{
    Cli, ConfigManager, DocumentValidator, HarnessConfig, LayeredProperties, LogFollower, Output,
    OutputStreams, RssValidator, SchemaValidator, SuiteBuilder, SuiteRunner, SystemEnvProvider,
    ValidatorKind, VerbosityLevel, XhtmlValidator, XmlValidator,
};

const EXIT_FAILED: u8 = 1;
const EXIT_CONFIG: u8 = 2;

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // Harness diagnostics go to the real stderr, never through the captured streams
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn verbosity(config: &HarnessConfig) -> VerbosityLevel {
    if config.output.quiet {
        VerbosityLevel::Quiet
    } else if config.output.verbose {
        VerbosityLevel::Verbose
    } else {
        VerbosityLevel::Normal
    }
}

async fn create_validator(cli: &Cli) -> anyhow::Result<Arc<dyn DocumentValidator>> {
    let validator: Arc<dyn DocumentValidator> = match cli.validator {
        ValidatorKind::Xhtml => Arc::new(XhtmlValidator),
        ValidatorKind::Rss => Arc::new(RssValidator),
        ValidatorKind::Xml => Arc::new(XmlValidator),
        ValidatorKind::Schema => {
            let path = cli
                .schema
                .as_deref()
                .context("--schema is required with --validator schema")?;
            let validator = SchemaValidator::load(path)
                .await
                .with_context(|| format!("Failed to load schema {}", path.display()))?;
            Arc::new(validator)
        }
    };
    Ok(validator)
}

/// Build the validator and the clients the run needs
async fn prepare(cli: &Cli, config: &HarnessConfig) -> anyhow::Result<SuiteBuilder> {
    let validator = create_validator(cli).await?;
    SuiteBuilder::new(
        validator,
        ConfigManager::http_client_config(config),
        ConfigManager::admin_credentials(config),
    )
    .context("Failed to create HTTP clients")
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();

    let config = match ConfigManager::load_config(&cli).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: Failed to load configuration: {}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    // verbosity may come from the file or the environment as well as -v
    init_tracing(config.output.verbose);

    let builder = match prepare(&cli, &config).await {
        Ok(builder) => builder,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let keys = cli.suite_keys();
    let properties = LayeredProperties::new(&SystemEnvProvider, &config);

    let suite = match ConfigManager::base_url(&config)
        .and_then(|base_url| builder.build(&properties, &keys, &base_url))
    {
        Ok(suite) => suite,
        Err(e) => {
            eprintln!("Error: Failed to build test suite: {}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    debug!(cases = suite.len(), "running suite");

    let output = Output::new(verbosity(&config));
    let mut runner = SuiteRunner::new(OutputStreams::stdio());
    if let Some(path) = &config.output.server_log {
        runner = runner.with_server_log(LogFollower::new(path));
    }

    let report = runner
        .run_with_progress(&suite, |outcome| {
            if let Some(line) = output.format_outcome(outcome) {
                println!("{}", line);
            }
        })
        .await;

    print!("{}", output.format_summary(&report));

    if report.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_FAILED)
    }
}
