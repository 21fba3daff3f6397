use crate::cli::Cli;
use crate::http_client::{Credentials, HttpClientConfig};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// System environment variable provider for production use
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable error: {0}")]
    Environment(String),

    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),

    #[error("Missing configuration property: {key}")]
    MissingProperty { key: String },

    #[error("Invalid URL in configuration: {url} - {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Duplicate test target: {name}")]
    DuplicateTarget { name: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Main harness configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct HarnessConfig {
    pub server: ServerConfig,
    pub network: NetworkConfig,
    pub output: OutputConfig,
    /// Named URL lists, e.g. `rssUrlsToTestAsAdmin`
    pub properties: BTreeMap<String, Vec<String>>,
}

/// Application under test
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL configured paths are resolved against
    pub base_url: String,
    /// Administrator account used for the "as admin" URL list
    pub admin_username: String,
    pub admin_password: String,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// HTTP request timeout in seconds
    pub timeout_seconds: u64,
    /// User agent override
    pub user_agent: Option<String>,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct OutputConfig {
    /// Verbose output
    pub verbose: bool,
    /// Quiet mode (failures only)
    pub quiet: bool,
    /// Server log file followed while test cases run
    pub server_log: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/".to_string(),
            admin_username: "Admin".to_string(),
            admin_password: "admin".to_string(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            user_agent: None,
        }
    }
}

/// Source of named URL lists
pub trait PropertySource {
    /// The list stored under `key`, or `None` when the key is not defined.
    /// A defined but empty list is `Some(vec![])`.
    fn string_list(&self, key: &str) -> Option<Vec<String>>;
}

impl PropertySource for HarnessConfig {
    fn string_list(&self, key: &str) -> Option<Vec<String>> {
        self.properties.get(key).cloned()
    }
}

impl PropertySource for BTreeMap<String, Vec<String>> {
    fn string_list(&self, key: &str) -> Option<Vec<String>> {
        self.get(key).cloned()
    }
}

/// URL lists from environment variables named exactly like the key, holding
/// whitespace or comma separated entries; anything else falls through to the
/// configuration file.
pub struct LayeredProperties<'a, E: EnvProvider> {
    env: &'a E,
    config: &'a HarnessConfig,
}

impl<'a, E: EnvProvider> LayeredProperties<'a, E> {
    pub fn new(env: &'a E, config: &'a HarnessConfig) -> Self {
        Self { env, config }
    }
}

impl<E: EnvProvider> PropertySource for LayeredProperties<'_, E> {
    fn string_list(&self, key: &str) -> Option<Vec<String>> {
        match self.env.get(key) {
            Some(value) => Some(split_list(&value)),
            None => self.config.string_list(key),
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Configuration manager for loading and merging configurations
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration with precedence: file -> environment -> CLI
    pub async fn load_config(cli: &Cli) -> Result<HarnessConfig> {
        Self::load_config_with(&SystemEnvProvider, cli).await
    }

    pub async fn load_config_with(env: &impl EnvProvider, cli: &Cli) -> Result<HarnessConfig> {
        let mut config = match &cli.config {
            Some(config_path) => Self::load_from_file(config_path).await?,
            None => Self::find_config_file().await?.unwrap_or_default(),
        };

        config = Self::apply_environment_overrides_with(env, config)?;
        config = Self::merge_with_cli(config, cli);

        Self::validate_config(&config)?;

        Ok(config)
    }

    /// Load configuration from a file (TOML or JSON)
    pub async fn load_from_file(path: &Path) -> Result<HarnessConfig> {
        let content = tokio::fs::read_to_string(path).await?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => {
                // Try to parse as TOML first, then JSON
                if let Ok(config) = toml::from_str::<HarnessConfig>(&content) {
                    Ok(config)
                } else {
                    Ok(serde_json::from_str(&content)?)
                }
            }
        }
    }

    /// Find configuration file in standard locations
    pub async fn find_config_file() -> Result<Option<HarnessConfig>> {
        let config_names = [
            "webstandards.toml",
            "webstandards.json",
            ".webstandards.toml",
            ".webstandards.json",
        ];

        // Check current directory first
        for name in &config_names {
            let path = PathBuf::from(name);
            if path.exists() {
                return Ok(Some(Self::load_from_file(&path).await?));
            }
        }

        // Check user config directory
        if let Some(config_dir) = dirs::config_dir() {
            let app_config_dir = config_dir.join("webstandards-harness");
            for name in &config_names {
                let path = app_config_dir.join(name);
                if path.exists() {
                    return Ok(Some(Self::load_from_file(&path).await?));
                }
            }
        }

        Ok(None)
    }

    /// Apply environment variable overrides with a custom environment provider
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut config: HarnessConfig,
    ) -> Result<HarnessConfig> {
        // Server settings
        if let Some(base_url) = env.get("WEBSTANDARDS_BASE_URL") {
            config.server.base_url = base_url;
        }

        if let Some(username) = env.get("WEBSTANDARDS_ADMIN_USERNAME") {
            config.server.admin_username = username;
        }

        if let Some(password) = env.get("WEBSTANDARDS_ADMIN_PASSWORD") {
            config.server.admin_password = password;
        }

        // Network settings
        if let Some(timeout) = env.get("WEBSTANDARDS_TIMEOUT") {
            config.network.timeout_seconds = timeout.parse().map_err(|_| {
                ConfigError::Environment(format!("Invalid WEBSTANDARDS_TIMEOUT value: {}", timeout))
            })?;
        }

        // Output settings
        if let Some(server_log) = env.get("WEBSTANDARDS_SERVER_LOG") {
            config.output.server_log = Some(PathBuf::from(server_log));
        }

        if let Some(verbose) = env.get("WEBSTANDARDS_VERBOSE") {
            config.output.verbose = verbose.parse().map_err(|_| {
                ConfigError::Environment(format!("Invalid WEBSTANDARDS_VERBOSE value: {}", verbose))
            })?;
        }

        if let Some(quiet) = env.get("WEBSTANDARDS_QUIET") {
            config.output.quiet = quiet.parse().map_err(|_| {
                ConfigError::Environment(format!("Invalid WEBSTANDARDS_QUIET value: {}", quiet))
            })?;
        }

        Ok(config)
    }

    /// Merge CLI arguments with configuration (CLI takes precedence)
    pub fn merge_with_cli(mut config: HarnessConfig, cli: &Cli) -> HarnessConfig {
        if let Some(base_url) = &cli.base_url {
            config.server.base_url = base_url.clone();
        }

        if let Some(timeout) = cli.timeout {
            config.network.timeout_seconds = timeout;
        }

        if let Some(server_log) = &cli.server_log {
            config.output.server_log = Some(server_log.clone());
        }

        if cli.verbose {
            config.output.verbose = true;
            config.output.quiet = false;
        }
        if cli.quiet {
            config.output.quiet = true;
            config.output.verbose = false;
        }

        config
    }

    /// Validate the final configuration
    pub fn validate_config(config: &HarnessConfig) -> Result<()> {
        if config.network.timeout_seconds == 0 {
            return Err(ConfigError::Validation(
                "Timeout must be greater than 0".to_string(),
            ));
        }

        Self::base_url(config)?;

        if config.server.admin_username.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Administrator username cannot be empty".to_string(),
            ));
        }

        if config.output.verbose && config.output.quiet {
            return Err(ConfigError::Validation(
                "Cannot enable both verbose and quiet output".to_string(),
            ));
        }

        Ok(())
    }

    /// Parsed base URL; must be an absolute http(s) URL
    pub fn base_url(config: &HarnessConfig) -> Result<Url> {
        let url = Url::parse(&config.server.base_url).map_err(|e| ConfigError::InvalidUrl {
            url: config.server.base_url.clone(),
            reason: e.to_string(),
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                url: config.server.base_url.clone(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        Ok(url)
    }

    pub fn admin_credentials(config: &HarnessConfig) -> Credentials {
        Credentials::basic(
            config.server.admin_username.clone(),
            config.server.admin_password.clone(),
        )
    }

    pub fn http_client_config(config: &HarnessConfig) -> HttpClientConfig {
        let defaults = HttpClientConfig::default();
        HttpClientConfig {
            timeout_seconds: config.network.timeout_seconds,
            user_agent: config
                .network
                .user_agent
                .clone()
                .unwrap_or(defaults.user_agent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[derive(Default)]
    struct MockEnvProvider {
        vars: HashMap<String, String>,
    }

    impl MockEnvProvider {
        fn new() -> Self {
            Self::default()
        }

        fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
            self.vars.insert(key.into(), value.into());
        }
    }

    impl EnvProvider for MockEnvProvider {
        fn get(&self, key: &str) -> Option<String> {
            self.vars.get(key).cloned()
        }
    }

    #[test]
    fn test_default_config() {
        let config = HarnessConfig::default();
        assert_eq!(config.server.base_url, "http://localhost:8080/");
        assert_eq!(config.server.admin_username, "Admin");
        assert_eq!(config.server.admin_password, "admin");
        assert_eq!(config.network.timeout_seconds, 30);
        assert!(config.properties.is_empty());
        assert!(ConfigManager::validate_config(&config).is_ok());
    }

    #[tokio::test]
    async fn test_load_toml_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("webstandards.toml");

        let toml_content = r#"
[server]
base_url = "http://wiki.example.com:8080/"
admin_username = "Admin"
admin_password = "secret"

[network]
timeout_seconds = 10

[properties]
rssUrlsToTestAsAdmin = ["/xwiki/bin/view/Main/WebRss?xpage=rdf"]
rssUrlsToTestAsGuest = []
"#;
        tokio::fs::write(&config_path, toml_content).await.unwrap();

        let config = ConfigManager::load_from_file(&config_path).await.unwrap();
        assert_eq!(config.server.base_url, "http://wiki.example.com:8080/");
        assert_eq!(config.server.admin_password, "secret");
        assert_eq!(config.network.timeout_seconds, 10);
        assert_eq!(
            config.string_list("rssUrlsToTestAsAdmin"),
            Some(vec!["/xwiki/bin/view/Main/WebRss?xpage=rdf".to_string()])
        );
        assert_eq!(config.string_list("rssUrlsToTestAsGuest"), Some(vec![]));
        assert_eq!(config.string_list("urlsToTestAsAdmin"), None);
    }

    #[tokio::test]
    async fn test_load_json_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("webstandards.json");

        let json_content = r#"{
            "server": { "base_url": "https://wiki.example.com/" },
            "properties": { "urlsToTestAsGuest": ["/", "/xwiki/bin/view/Sandbox/"] }
        }"#;
        tokio::fs::write(&config_path, json_content).await.unwrap();

        let config = ConfigManager::load_from_file(&config_path).await.unwrap();
        assert_eq!(config.server.base_url, "https://wiki.example.com/");
        // unspecified sections keep their defaults
        assert_eq!(config.server.admin_username, "Admin");
        assert_eq!(config.network.timeout_seconds, 30);
        assert_eq!(config.string_list("urlsToTestAsGuest").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unsupported_file_format() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("webstandards.yaml");
        tokio::fs::write(&config_path, "server: {}").await.unwrap();

        let result = ConfigManager::load_from_file(&config_path).await;
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(ext)) if ext == "yaml"));
    }

    #[tokio::test]
    async fn test_invalid_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("webstandards.toml");
        tokio::fs::write(&config_path, "[server\nbase_url = ").await.unwrap();

        let result = ConfigManager::load_from_file(&config_path).await;
        assert!(matches!(result, Err(ConfigError::TomlParsing(_))));
    }

    #[test]
    fn test_environment_overrides() {
        let mut env = MockEnvProvider::new();
        env.set("WEBSTANDARDS_BASE_URL", "http://127.0.0.1:9090/");
        env.set("WEBSTANDARDS_ADMIN_PASSWORD", "changed");
        env.set("WEBSTANDARDS_TIMEOUT", "5");
        env.set("WEBSTANDARDS_SERVER_LOG", "/var/log/xwiki.log");
        env.set("WEBSTANDARDS_VERBOSE", "true");

        let config =
            ConfigManager::apply_environment_overrides_with(&env, HarnessConfig::default())
                .unwrap();
        assert_eq!(config.server.base_url, "http://127.0.0.1:9090/");
        assert_eq!(config.server.admin_username, "Admin");
        assert_eq!(config.server.admin_password, "changed");
        assert_eq!(config.network.timeout_seconds, 5);
        assert_eq!(
            config.output.server_log,
            Some(PathBuf::from("/var/log/xwiki.log"))
        );
        assert!(config.output.verbose);
    }

    #[test]
    fn test_invalid_environment_values() {
        let mut env = MockEnvProvider::new();
        env.set("WEBSTANDARDS_TIMEOUT", "soon");

        let result =
            ConfigManager::apply_environment_overrides_with(&env, HarnessConfig::default());
        assert!(matches!(result, Err(ConfigError::Environment(msg)) if msg.contains("soon")));
    }

    #[test]
    fn test_merge_with_cli() {
        let cli = Cli::try_parse_from([
            "webstandards-check",
            "--base-url",
            "http://cli.example.com/",
            "--timeout",
            "7",
            "--quiet",
        ])
        .unwrap();

        let mut config = HarnessConfig::default();
        config.output.verbose = true;
        config.network.user_agent = Some("from-file".to_string());

        let merged = ConfigManager::merge_with_cli(config, &cli);
        assert_eq!(merged.server.base_url, "http://cli.example.com/");
        assert_eq!(merged.network.timeout_seconds, 7);
        assert!(merged.output.quiet);
        assert!(!merged.output.verbose);
        // untouched by the command line
        assert_eq!(merged.network.user_agent.as_deref(), Some("from-file"));
    }

    #[test]
    fn test_config_validation() {
        let mut config = HarnessConfig::default();
        config.network.timeout_seconds = 0;
        assert!(ConfigManager::validate_config(&config).is_err());

        let mut config = HarnessConfig::default();
        config.server.base_url = "/relative/only".to_string();
        assert!(matches!(
            ConfigManager::validate_config(&config),
            Err(ConfigError::InvalidUrl { .. })
        ));

        let mut config = HarnessConfig::default();
        config.server.base_url = "ftp://localhost/".to_string();
        assert!(ConfigManager::validate_config(&config).is_err());

        let mut config = HarnessConfig::default();
        config.server.admin_username = "  ".to_string();
        assert!(ConfigManager::validate_config(&config).is_err());

        let mut config = HarnessConfig::default();
        config.output.verbose = true;
        config.output.quiet = true;
        assert!(ConfigManager::validate_config(&config).is_err());
    }

    #[test]
    fn test_layered_properties_prefer_environment() {
        let mut config = HarnessConfig::default();
        config
            .properties
            .insert("urlsToTestAsAdmin".to_string(), vec!["/from-file".to_string()]);
        config
            .properties
            .insert("urlsToTestAsGuest".to_string(), vec!["/guest".to_string()]);

        let mut env = MockEnvProvider::new();
        env.set("urlsToTestAsAdmin", "/a, /b\n/c");

        let layered = LayeredProperties::new(&env, &config);
        assert_eq!(
            layered.string_list("urlsToTestAsAdmin"),
            Some(vec!["/a".to_string(), "/b".to_string(), "/c".to_string()])
        );
        assert_eq!(
            layered.string_list("urlsToTestAsGuest"),
            Some(vec!["/guest".to_string()])
        );
        assert_eq!(layered.string_list("rssUrlsToTestAsGuest"), None);
    }

    #[test]
    fn test_utility_functions() {
        let mut config = HarnessConfig::default();
        config.network.timeout_seconds = 12;

        assert_eq!(
            ConfigManager::admin_credentials(&config),
            Credentials::basic("Admin", "admin")
        );

        let http = ConfigManager::http_client_config(&config);
        assert_eq!(http.timeout_seconds, 12);
        assert!(http.user_agent.starts_with("webstandards-harness/"));
    }

    #[tokio::test]
    async fn test_load_config_integration() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("harness.toml");
        tokio::fs::write(
            &config_path,
            "[server]\nbase_url = \"http://file.example.com/\"\n[network]\ntimeout_seconds = 20\n",
        )
        .await
        .unwrap();

        let cli = Cli::try_parse_from([
            "webstandards-check",
            "--config",
            config_path.to_str().unwrap(),
            "--timeout",
            "3",
        ])
        .unwrap();

        let mut env = MockEnvProvider::new();
        env.set("WEBSTANDARDS_ADMIN_USERNAME", "superadmin");

        let config = ConfigManager::load_config_with(&env, &cli).await.unwrap();
        assert_eq!(config.server.base_url, "http://file.example.com/");
        assert_eq!(config.server.admin_username, "superadmin");
        assert_eq!(config.network.timeout_seconds, 3);
    }
}
