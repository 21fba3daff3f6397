use std::collections::BTreeMap;
use std::path::PathBuf;

use tempfile::TempDir;

pub const VALID_XHTML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Strict//EN" "http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd">
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>Main.WebHome</title></head>
<body>
<div id="content"><p>Welcome to your wiki</p></div>
</body>
</html>"#;

pub const INVALID_XHTML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Strict//EN" "http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd">
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>Sandbox.WebHome</title></head>
<body>
<center>legacy markup</center>
</body>
</html>"#;

pub const VALID_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
<channel>
<title>Recent changes</title>
<link>http://localhost:8080/xwiki/bin/view/Main/</link>
<description>Latest modified pages</description>
<item>
<title>Main.WebHome</title>
<pubDate>Mon, 06 Sep 2010 16:45:00 +0000</pubDate>
</item>
</channel>
</rss>"#;

pub const MALFORMED_RSS: &str = r#"<rss version="2.0"><channel><title>Broken</channel></rss>"#;

/// URL lists keyed like a harness configuration
pub fn url_lists(pairs: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
    pairs
        .iter()
        .map(|(key, urls)| {
            (
                key.to_string(),
                urls.iter().map(|url| url.to_string()).collect(),
            )
        })
        .collect()
}

/// Write a configuration file into a fresh temporary directory
pub fn write_config(file_name: &str, content: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join(file_name);
    std::fs::write(&path, content).expect("write config");
    (dir, path)
}
