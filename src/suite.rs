use std::collections::HashSet;
use std::sync::Arc;

use reqwest::Url;
use tracing::{debug, info};

use crate::config::{ConfigError, PropertySource};
use crate::error::Result;
use crate::http_client::{AsyncHttpClient, Credentials, DocumentFetcher, HttpClientConfig};
use crate::target::Target;
use crate::test_case::ValidationTestCase;
use crate::validator::DocumentValidator;

const GUEST_SUFFIX: &str = " (as guest)";

/// Configuration keys of the two URL lists a suite is built from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteKeys {
    pub as_admin: String,
    pub as_guest: String,
}

impl SuiteKeys {
    pub fn new(as_admin: impl Into<String>, as_guest: impl Into<String>) -> Self {
        Self {
            as_admin: as_admin.into(),
            as_guest: as_guest.into(),
        }
    }

    /// Keys of the feed lists
    pub fn rss() -> Self {
        Self::new("rssUrlsToTestAsAdmin", "rssUrlsToTestAsGuest")
    }

    /// Keys of the page lists
    pub fn xhtml() -> Self {
        Self::new("urlsToTestAsAdmin", "urlsToTestAsGuest")
    }
}

/// Which URL list a planned case came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Admin,
    Guest,
}

/// One planned test case: what to fetch and as whom
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCaseSpec {
    pub target: Target,
    pub access: Access,
    pub credentials: Credentials,
}

/// Turn the two URL lists into test case specs, admin cases first.
///
/// Both keys must be defined (an empty list is fine). Nothing is returned
/// unless every entry resolves.
pub fn plan_suite(
    properties: &impl PropertySource,
    keys: &SuiteKeys,
    base_url: &Url,
    admin: &Credentials,
) -> std::result::Result<Vec<TestCaseSpec>, ConfigError> {
    let admin_entries = required_list(properties, &keys.as_admin)?;
    let guest_entries = required_list(properties, &keys.as_guest)?;

    let admin_targets = resolve_all(base_url, &admin_entries)?;
    let guest_targets = resolve_all(base_url, &guest_entries)?;

    let admin_urls: HashSet<&Url> = admin_targets.iter().map(Target::url).collect();
    let guest_targets: Vec<Target> = guest_targets
        .into_iter()
        .map(|target| {
            if admin_urls.contains(target.url()) {
                let name = format!("{}{}", target.name(), GUEST_SUFFIX);
                target.renamed(name)
            } else {
                target
            }
        })
        .collect();

    let mut specs = Vec::with_capacity(admin_targets.len() + guest_targets.len());
    specs.extend(admin_targets.into_iter().map(|target| TestCaseSpec {
        target,
        access: Access::Admin,
        credentials: admin.clone(),
    }));
    specs.extend(guest_targets.into_iter().map(|target| TestCaseSpec {
        target,
        access: Access::Guest,
        credentials: Credentials::Anonymous,
    }));
    Ok(specs)
}

fn required_list(
    properties: &impl PropertySource,
    key: &str,
) -> std::result::Result<Vec<String>, ConfigError> {
    properties
        .string_list(key)
        .ok_or_else(|| ConfigError::MissingProperty {
            key: key.to_string(),
        })
}

fn resolve_all(base_url: &Url, entries: &[String]) -> std::result::Result<Vec<Target>, ConfigError> {
    let mut seen = HashSet::new();
    let mut targets = Vec::with_capacity(entries.len());

    for entry in entries.iter().filter(|e| !e.trim().is_empty()) {
        let target = Target::resolve(base_url, entry)?;
        if !seen.insert(target.url().clone()) {
            return Err(ConfigError::DuplicateTarget {
                name: target.name().to_string(),
            });
        }
        targets.push(target);
    }
    Ok(targets)
}

/// Ordered collection of test cases
#[derive(Default)]
pub struct ValidationSuite {
    cases: Vec<ValidationTestCase>,
}

impl ValidationSuite {
    pub fn new(cases: Vec<ValidationTestCase>) -> Self {
        Self { cases }
    }

    pub fn cases(&self) -> &[ValidationTestCase] {
        &self.cases
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.cases.iter().map(ValidationTestCase::name).collect()
    }
}

/// Builds a suite bound to one admin and one anonymous client
pub struct SuiteBuilder {
    validator: Arc<dyn DocumentValidator>,
    admin_client: Arc<dyn DocumentFetcher>,
    guest_client: Arc<dyn DocumentFetcher>,
}

impl SuiteBuilder {
    /// Create real HTTP clients for both credential contexts
    pub fn new(
        validator: Arc<dyn DocumentValidator>,
        http_config: HttpClientConfig,
        admin: Credentials,
    ) -> Result<Self> {
        let admin_client = AsyncHttpClient::new(http_config.clone(), admin)?;
        let guest_client = AsyncHttpClient::anonymous(http_config)?;

        Ok(Self::with_clients(
            validator,
            Arc::new(admin_client),
            Arc::new(guest_client),
        ))
    }

    pub fn with_clients(
        validator: Arc<dyn DocumentValidator>,
        admin_client: Arc<dyn DocumentFetcher>,
        guest_client: Arc<dyn DocumentFetcher>,
    ) -> Self {
        Self {
            validator,
            admin_client,
            guest_client,
        }
    }

    pub fn build(
        &self,
        properties: &impl PropertySource,
        keys: &SuiteKeys,
        base_url: &Url,
    ) -> std::result::Result<ValidationSuite, ConfigError> {
        let specs = plan_suite(
            properties,
            keys,
            base_url,
            self.admin_client.credentials(),
        )?;

        let cases: Vec<ValidationTestCase> = specs
            .into_iter()
            .map(|spec| {
                let fetcher = match spec.access {
                    Access::Admin => Arc::clone(&self.admin_client),
                    Access::Guest => Arc::clone(&self.guest_client),
                };
                debug!(target_name = %spec.target, user = %spec.credentials, "planned test case");
                ValidationTestCase::new(spec.target, fetcher, Arc::clone(&self.validator))
            })
            .collect();

        info!(
            validator = self.validator.name(),
            cases = cases.len(),
            admin_key = %keys.as_admin,
            guest_key = %keys.as_guest,
            "suite built"
        );
        Ok(ValidationSuite::new(cases))
    }
}
