use crate::error::{HarnessError, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::fmt;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Credentials a client presents to the application under test
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Credentials {
    /// No credentials at all
    #[default]
    Anonymous,
    /// HTTP basic credentials, sent preemptively to whatever realm asks
    Basic { username: String, password: String },
}

impl Credentials {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Credentials::Anonymous)
    }
}

impl fmt::Display for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Anonymous => f.write_str("guest"),
            Credentials::Basic { username, .. } => f.write_str(username),
        }
    }
}

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            user_agent: format!("webstandards-harness/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Fetches response bodies on behalf of a test case
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    /// GET the URL and return the raw body of a successful response
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>>;

    /// Credential context the fetcher is bound to
    fn credentials(&self) -> &Credentials;
}

/// Async HTTP client bound to one credential context
pub struct AsyncHttpClient {
    client: Client,
    config: HttpClientConfig,
    credentials: Credentials,
}

impl AsyncHttpClient {
    /// Create a new async HTTP client with the given configuration
    pub fn new(config: HttpClientConfig, credentials: Credentials) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(&config.user_agent)
            .build()
            .map_err(HarnessError::from)?;

        Ok(Self {
            client,
            config,
            credentials,
        })
    }

    /// Client without credentials
    pub fn anonymous(config: HttpClientConfig) -> Result<Self> {
        Self::new(config, Credentials::Anonymous)
    }
}

#[async_trait]
impl DocumentFetcher for AsyncHttpClient {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        let mut request = self.client.get(url.clone());
        if let Credentials::Basic { username, password } = &self.credentials {
            request = request.basic_auth(username, Some(password));
        }

        debug!(url = %url, user = %self.credentials, "fetching document");
        let response = timeout(
            Duration::from_secs(self.config.timeout_seconds),
            request.send(),
        )
        .await
        .map_err(|_| HarnessError::Timeout {
            url: url.to_string(),
            timeout_seconds: self.config.timeout_seconds,
        })?
        .map_err(HarnessError::from)?;

        let status = response.status();
        if !status.is_success() {
            return Err(HarnessError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
                message: format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown")
                ),
            });
        }

        let body = response.bytes().await.map_err(HarnessError::from)?;
        debug!(url = %url, bytes = body.len(), "document fetched");
        Ok(body.to_vec())
    }

    fn credentials(&self) -> &Credentials {
        &self.credentials
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn config() -> HttpClientConfig {
        HttpClientConfig {
            timeout_seconds: 5,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_http_client_creation() {
        let client = AsyncHttpClient::anonymous(HttpClientConfig::default());
        assert!(client.is_ok());
        assert!(client.unwrap().credentials().is_anonymous());
    }

    #[tokio::test]
    async fn test_admin_client_sends_basic_auth() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/xwiki/bin/view/Main/")
            .match_header("authorization", "Basic QWRtaW46YWRtaW4=")
            .with_status(200)
            .with_body("<html/>")
            .create_async()
            .await;

        let client = AsyncHttpClient::new(config(), Credentials::basic("Admin", "admin")).unwrap();
        let url = Url::parse(&server.url())
            .unwrap()
            .join("/xwiki/bin/view/Main/")
            .unwrap();

        let body = client.fetch(&url).await.unwrap();
        assert_eq!(body, b"<html/>");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_anonymous_client_sends_no_credentials() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/feed")
            .match_header("authorization", Matcher::Missing)
            .with_status(200)
            .with_body("<rss/>")
            .create_async()
            .await;

        let client = AsyncHttpClient::anonymous(config()).unwrap();
        let url = Url::parse(&format!("{}/feed", server.url())).unwrap();

        assert_eq!(client.fetch(&url).await.unwrap(), b"<rss/>");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/missing")
            .with_status(404)
            .create_async()
            .await;

        let client = AsyncHttpClient::anonymous(config()).unwrap();
        let url = Url::parse(&format!("{}/missing", server.url())).unwrap();

        match client.fetch(&url).await {
            Err(HarnessError::HttpStatus { status, message, .. }) => {
                assert_eq!(status, 404);
                assert_eq!(message, "HTTP 404: Not Found");
            }
            other => panic!("Expected HttpStatus error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connection_failure_is_an_error() {
        let client = AsyncHttpClient::anonymous(config()).unwrap();
        let url = Url::parse("http://127.0.0.1:1/unreachable").unwrap();

        assert!(matches!(
            client.fetch(&url).await,
            Err(HarnessError::Http(_)) | Err(HarnessError::Timeout { .. })
        ));
    }

    #[test]
    fn test_credentials_display_hides_password() {
        assert_eq!(Credentials::basic("Admin", "admin").to_string(), "Admin");
        assert_eq!(Credentials::Anonymous.to_string(), "guest");
    }
}
