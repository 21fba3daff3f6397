use std::fmt;

use reqwest::Url;

use crate::config::ConfigError;

/// One page or feed of the application under test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    name: String,
    url: Url,
}

impl Target {
    /// Resolve a configured entry against the server base URL.
    ///
    /// Entries may be paths (`/xwiki/bin/view/Main/`) or absolute URLs; the
    /// configured text is kept as the display name.
    pub fn resolve(base_url: &Url, entry: &str) -> Result<Self, ConfigError> {
        let entry = entry.trim();
        let url = base_url.join(entry).map_err(|e| ConfigError::InvalidUrl {
            url: entry.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            name: entry.to_string(),
            url,
        })
    }

    pub fn new(name: impl Into<String>, url: Url) -> Self {
        Self {
            name: name.into(),
            url,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Same target with a different display name
    pub fn renamed(self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: self.url,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
