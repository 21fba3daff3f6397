mod common;

use std::sync::Arc;

use mockito::Matcher;
use reqwest::Url;
use webstandards_harness::{
    ConfigError, ConfigManager, Credentials, HttpClientConfig, LogCheck, RssValidator,
    SuiteBuilder, SuiteKeys, SuiteRunner, TestFailure, XhtmlValidator,
};

use common::fixtures::{INVALID_XHTML, MALFORMED_RSS, VALID_RSS, VALID_XHTML, url_lists};
use common::mocks::{FaultInjectingValidator, test_streams};

const ADMIN_AUTH: &str = "Basic QWRtaW46YWRtaW4=";

fn http_config() -> HttpClientConfig {
    HttpClientConfig {
        timeout_seconds: 5,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_admin_and_guest_lists_use_their_own_credentials() {
    let mut server = mockito::Server::new_async().await;
    let admin_page = server
        .mock("GET", "/xwiki/bin/admin/XWiki/XWikiPreferences")
        .match_header("authorization", ADMIN_AUTH)
        .with_body(VALID_XHTML)
        .expect(1)
        .create_async()
        .await;
    let guest_page = server
        .mock("GET", "/xwiki/bin/view/Main/")
        .match_header("authorization", Matcher::Missing)
        .with_body(VALID_XHTML)
        .expect(1)
        .create_async()
        .await;

    let base = Url::parse(&server.url()).unwrap();
    let properties = url_lists(&[
        ("urlsToTestAsAdmin", &["/xwiki/bin/admin/XWiki/XWikiPreferences"]),
        ("urlsToTestAsGuest", &["/xwiki/bin/view/Main/"]),
    ]);

    let builder = SuiteBuilder::new(
        Arc::new(XhtmlValidator),
        http_config(),
        Credentials::basic("Admin", "admin"),
    )
    .unwrap();
    let suite = builder
        .build(&properties, &SuiteKeys::xhtml(), &base)
        .unwrap();
    assert_eq!(suite.len(), 2);

    let (streams, out, _err) = test_streams();
    let report = SuiteRunner::new(streams).run(&suite).await;

    assert!(report.success(), "{:?}", report.outcomes);
    admin_page.assert_async().await;
    guest_page.assert_async().await;

    let out = out.contents();
    assert!(out.contains("Validating XHTML validity for: /xwiki/bin/admin/XWiki/XWikiPreferences\n"));
    assert!(out.contains("Validating XHTML validity for: /xwiki/bin/view/Main/\n"));
}

#[tokio::test]
async fn test_failures_are_collected_per_case() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/feed/ok")
        .with_body(VALID_RSS)
        .create_async()
        .await;
    server
        .mock("GET", "/feed/broken")
        .with_body(MALFORMED_RSS)
        .create_async()
        .await;
    server
        .mock("GET", "/feed/gone")
        .with_status(404)
        .create_async()
        .await;

    let base = Url::parse(&server.url()).unwrap();
    let properties = url_lists(&[
        ("rssUrlsToTestAsAdmin", &["/feed/ok", "/feed/broken"]),
        ("rssUrlsToTestAsGuest", &["/feed/ok", "/feed/gone"]),
    ]);

    let builder = SuiteBuilder::new(
        Arc::new(RssValidator),
        http_config(),
        Credentials::basic("Admin", "admin"),
    )
    .unwrap();
    let suite = builder.build(&properties, &SuiteKeys::rss(), &base).unwrap();
    assert_eq!(
        suite.names(),
        vec![
            "Validating RSS validity for: /feed/ok",
            "Validating RSS validity for: /feed/broken",
            "Validating RSS validity for: /feed/ok (as guest)",
            "Validating RSS validity for: /feed/gone",
        ]
    );

    let (streams, _out, _err) = test_streams();
    let report = SuiteRunner::new(streams).run(&suite).await;

    assert_eq!(report.passed(), 2);
    assert_eq!(report.failed(), 2);

    let broken = &report.outcomes[1];
    let message = broken.validation_message().unwrap();
    assert!(message.starts_with("Validation errors in /feed/broken\n"));
    assert!(message.contains("at line [1]"));
    assert!(broken.captured.stderr.contains("Validated content:"));

    let gone = &report.outcomes[3];
    assert!(matches!(
        gone.failures.as_slice(),
        [TestFailure::Fetch { message }] if message.contains("404")
    ));
}

#[tokio::test]
async fn test_fault_injecting_validator_restores_streams_every_case() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", Matcher::Any)
        .with_body(VALID_XHTML)
        .create_async()
        .await;

    let base = Url::parse(&server.url()).unwrap();
    let properties = url_lists(&[
        ("urlsToTestAsAdmin", &["/a", "/b"]),
        ("urlsToTestAsGuest", &["/c"]),
    ]);

    let validator = Arc::new(FaultInjectingValidator::new());
    let builder = SuiteBuilder::new(
        validator.clone(),
        http_config(),
        Credentials::basic("Admin", "admin"),
    )
    .unwrap();
    let suite = builder
        .build(&properties, &SuiteKeys::xhtml(), &base)
        .unwrap();

    let (streams, _out, err) = test_streams();
    let mut runner = SuiteRunner::new(streams);
    let report = runner.run(&suite).await;

    assert_eq!(report.failed(), 3);
    assert_eq!(validator.seen(), 3);
    assert_eq!(runner.streams().restorations(), 3);
    assert!(!runner.streams().is_capturing());
    // every dump reached the real stderr after restoration
    assert_eq!(err.contents().matches("Validated content:").count(), 3);
    for outcome in &report.outcomes {
        assert!(!outcome.failed_check(LogCheck::StderrErrors));
    }
}

#[tokio::test]
async fn test_invalid_xhtml_page_fails_with_line_numbered_dump() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/xwiki/bin/view/Sandbox/")
        .with_body(INVALID_XHTML)
        .create_async()
        .await;

    let base = Url::parse(&server.url()).unwrap();
    let properties = url_lists(&[
        ("urlsToTestAsAdmin", &[]),
        ("urlsToTestAsGuest", &["/xwiki/bin/view/Sandbox/"]),
    ]);
    let builder = SuiteBuilder::new(
        Arc::new(XhtmlValidator),
        http_config(),
        Credentials::basic("Admin", "admin"),
    )
    .unwrap();
    let suite = builder
        .build(&properties, &SuiteKeys::xhtml(), &base)
        .unwrap();

    let (streams, _out, _err) = test_streams();
    let report = SuiteRunner::new(streams).run(&suite).await;
    let outcome = &report.outcomes[0];

    assert_eq!(
        outcome.validation_message(),
        Some(
            "Validation errors in /xwiki/bin/view/Sandbox/\n\
             ERROR: element <center> is not allowed in XHTML 1.0 Strict at line [6] column [1]"
        )
    );
    assert!(outcome.captured.stderr.contains("6\t<center>legacy markup</center>\n"));
}

#[test]
fn test_missing_list_aborts_suite_construction() {
    let builder = SuiteBuilder::new(
        Arc::new(RssValidator),
        http_config(),
        Credentials::basic("Admin", "admin"),
    )
    .unwrap();
    let properties = url_lists(&[("rssUrlsToTestAsAdmin", &["/feed"])]);
    let base = Url::parse("http://localhost:8080/").unwrap();

    let result = builder.build(&properties, &SuiteKeys::rss(), &base);
    assert!(matches!(
        result,
        Err(ConfigError::MissingProperty { key }) if key == "rssUrlsToTestAsGuest"
    ));
}

#[tokio::test]
async fn test_config_file_drives_suite() {
    let (_dir, path) = common::fixtures::write_config(
        "webstandards.toml",
        r#"
[server]
base_url = "http://wiki.example.com/"
admin_username = "Admin"
admin_password = "admin"

[properties]
urlsToTestAsAdmin = ["/xwiki/bin/view/Main/", "/xwiki/bin/edit/Main/WebHome"]
urlsToTestAsGuest = ["/xwiki/bin/view/Main/"]
"#,
    );
    let config = ConfigManager::load_from_file(&path).await.unwrap();
    ConfigManager::validate_config(&config).unwrap();

    let builder = SuiteBuilder::new(
        Arc::new(XhtmlValidator),
        ConfigManager::http_client_config(&config),
        ConfigManager::admin_credentials(&config),
    )
    .unwrap();
    let base = ConfigManager::base_url(&config).unwrap();
    let suite = builder.build(&config, &SuiteKeys::xhtml(), &base).unwrap();

    assert_eq!(suite.len(), 3);
    assert_eq!(
        suite.cases()[1].target().url().as_str(),
        "http://wiki.example.com/xwiki/bin/edit/Main/WebHome"
    );
    assert!(suite.cases()[2].credentials().is_anonymous());
    assert_eq!(
        suite.cases()[2].target().name(),
        "/xwiki/bin/view/Main/ (as guest)"
    );
}
