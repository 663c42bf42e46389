//! Target enumeration from public artifact listings.
//!
//! Two listing styles, both driven by a JSON config file: S3 bucket XML
//! listings (`ListBucketResult` with `Contents` and `CommonPrefixes`) and
//! plain HTML directory indexes. Each matching file becomes one
//! download-then-scan target.
//!
//! Listing pages that fail to fetch or parse are logged and skipped so one
//! unreachable prefix cannot sink the others; only loading the config file
//! itself is fatal.

use std::collections::{HashSet, VecDeque};
use std::path::Path;

use chrono::{DateTime, Utc};
use drover_core::target::{SourceKind, Target};
use quick_xml::Reader;
use quick_xml::events::Event;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::EnumerationError;

/// One S3 bucket listing to walk.
#[derive(Debug, Clone, Deserialize)]
pub struct S3Listing {
    /// Display name copied into every event from this listing.
    pub name: String,
    /// Pattern a key must match to be scanned.
    pub regex: String,
    /// Whether to descend into `CommonPrefixes`.
    pub recursive: bool,
    /// Bucket name, or a full base URL for S3-compatible endpoints.
    pub endpoint: String,
    /// Key prefixes to start from.
    pub prefixes: Vec<String>,
    /// Only objects modified after this instant are scanned.
    pub after_date: DateTime<Utc>,
}

/// One HTML directory listing to walk.
#[derive(Debug, Clone, Deserialize)]
pub struct HtmlListing {
    /// Display name copied into every event from this listing.
    pub name: String,
    /// Pattern a file name must match to be scanned.
    pub regex: String,
    /// Whether to follow subdirectory links.
    pub recursive: bool,
    /// Listing page URL, trailing slash included.
    pub url: String,
}

/// Loads a JSON array of listing entries from disk.
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>, EnumerationError> {
    let bytes = std::fs::read(path).map_err(|e| EnumerationError::Config {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    serde_json::from_slice(&bytes).map_err(|e| EnumerationError::Config {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

#[derive(Debug, PartialEq)]
struct S3Object {
    key: String,
    size: u64,
    modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, PartialEq)]
struct BucketPage {
    objects: Vec<S3Object>,
    prefixes: Vec<String>,
}

/// Parses one `ListBucketResult` page.
fn parse_bucket_page(xml: &str) -> Result<BucketPage, EnumerationError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut page = BucketPage::default();
    let mut in_contents = false;
    let mut in_common_prefixes = false;
    let mut field: Option<&'static str> = None;
    let mut current = S3Object { key: String::new(), size: 0, modified: None };

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => match start.local_name().as_ref() {
                b"Contents" => in_contents = true,
                b"CommonPrefixes" => in_common_prefixes = true,
                b"Key" if in_contents => field = Some("key"),
                b"Size" if in_contents => field = Some("size"),
                b"LastModified" if in_contents => field = Some("modified"),
                b"Prefix" if in_common_prefixes => field = Some("prefix"),
                _ => field = None,
            },
            Ok(Event::Text(text)) => {
                let value = text.unescape().map_err(|e| EnumerationError::Malformed {
                    service: "S3",
                    message: e.to_string(),
                })?;
                match field {
                    Some("key") => current.key = value.into_owned(),
                    Some("size") => current.size = value.parse().unwrap_or(0),
                    Some("modified") => {
                        current.modified = DateTime::parse_from_rfc3339(&value)
                            .ok()
                            .map(|dt| dt.with_timezone(&Utc));
                    }
                    Some("prefix") => page.prefixes.push(value.into_owned()),
                    _ => {}
                }
            }
            Ok(Event::End(end)) => match end.local_name().as_ref() {
                b"Contents" => {
                    in_contents = false;
                    page.objects
                        .push(std::mem::replace(&mut current, S3Object { key: String::new(), size: 0, modified: None }));
                }
                b"CommonPrefixes" => in_common_prefixes = false,
                _ => field = None,
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(EnumerationError::Malformed {
                    service: "S3",
                    message: e.to_string(),
                });
            }
            _ => {}
        }
    }
    Ok(page)
}

fn bucket_base(endpoint: &str) -> String {
    if endpoint.contains("://") {
        endpoint.trim_end_matches('/').to_string()
    } else {
        format!("https://{endpoint}.s3.amazonaws.com")
    }
}

fn basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

fn compile_listing_regex(name: &str, pattern: &str) -> Result<Regex, EnumerationError> {
    Regex::new(pattern).map_err(|e| EnumerationError::Malformed {
        service: "listing config",
        message: format!("invalid regex for listing {name}: {e}"),
    })
}

/// Walks listings and produces archive targets.
#[derive(Debug)]
pub struct WebListingScanner {
    client: reqwest::Client,
}

impl WebListingScanner {
    /// Creates a scanner with a fresh HTTP client.
    pub fn new() -> Result<Self, EnumerationError> {
        Ok(Self { client: crate::http_client()? })
    }

    async fn fetch_text(&self, url: &str) -> Result<String, EnumerationError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EnumerationError::Api {
                service: "listing",
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.text().await?)
    }

    /// Enumerates one S3 listing, expanding common prefixes breadth-first
    /// when the listing is recursive.
    pub async fn s3_targets(&self, listing: &S3Listing) -> Result<Vec<Target>, EnumerationError> {
        let regex = compile_listing_regex(&listing.name, &listing.regex)?;
        let base = bucket_base(&listing.endpoint);
        let mut targets = Vec::new();
        let mut worklist: VecDeque<String> = listing.prefixes.iter().cloned().collect();

        while let Some(prefix) = worklist.pop_front() {
            let url = format!("{base}/?delimiter=/&prefix={prefix}");
            let page = match self.fetch_text(&url).await {
                Ok(body) => match parse_bucket_page(&body) {
                    Ok(page) => page,
                    Err(e) => {
                        warn!(listing = %listing.name, prefix, error = %e, "skipping unparsable bucket page");
                        continue;
                    }
                },
                Err(e) => {
                    warn!(listing = %listing.name, prefix, error = %e, "skipping unreachable bucket page");
                    continue;
                }
            };

            for object in page.objects {
                let fresh = object.modified.is_some_and(|m| m > listing.after_date);
                if regex.is_match(&object.key) && object.size > 0 && fresh {
                    let file_url = format!("{base}/{}", object.key);
                    targets.push(
                        Target::new(SourceKind::Archive, file_url.as_str())
                            .with_link(file_url.as_str())
                            .with_context("name", listing.name.as_str())
                            .with_context("filename", basename(&object.key)),
                    );
                } else {
                    debug!(key = %object.key, "object filtered out");
                }
            }
            if listing.recursive {
                worklist.extend(page.prefixes);
            }
        }
        info!(listing = %listing.name, targets = targets.len(), "bucket listing walked");
        Ok(targets)
    }

    /// Enumerates one HTML directory listing, following trailing-slash links
    /// when the listing is recursive.
    pub async fn html_targets(&self, listing: &HtmlListing) -> Result<Vec<Target>, EnumerationError> {
        let regex = compile_listing_regex(&listing.name, &listing.regex)?;
        let mut targets = Vec::new();
        let mut worklist: VecDeque<String> = VecDeque::from([normalize_dir_url(&listing.url)]);
        let mut visited: HashSet<String> = HashSet::new();

        while let Some(page_url) = worklist.pop_front() {
            // Pages can cross-link each other; fetch each one once.
            if !visited.insert(page_url.clone()) {
                continue;
            }
            let body = match self.fetch_text(&page_url).await {
                Ok(body) => body,
                Err(e) => {
                    warn!(listing = %listing.name, url = %page_url, error = %e, "skipping unreachable listing page");
                    continue;
                }
            };

            for href in listing_hrefs(&body) {
                if let Some(dir) = href.strip_suffix('/') {
                    if listing.recursive && !dir.is_empty() {
                        worklist.push_back(normalize_dir_url(&join_url(&page_url, &href)));
                    }
                } else if regex.is_match(&href) {
                    let file_url = join_url(&page_url, &href);
                    targets.push(
                        Target::new(SourceKind::Archive, file_url.as_str())
                            .with_link(file_url.as_str())
                            .with_context("name", listing.name.as_str())
                            .with_context("filename", basename(&href)),
                    );
                }
            }
        }
        info!(listing = %listing.name, targets = targets.len(), "directory listing walked");
        Ok(targets)
    }
}

fn normalize_dir_url(url: &str) -> String {
    let mut url = url.to_string();
    if !url.ends_with('/') {
        url.push('/');
    }
    url
}

fn join_url(base: &str, href: &str) -> String {
    if href.contains("://") {
        href.to_string()
    } else {
        format!("{base}{href}")
    }
}

/// Anchor hrefs from an index page, minus navigation links.
fn listing_hrefs(html: &str) -> Vec<String> {
    static HREF_RE: std::sync::LazyLock<Regex> = std::sync::LazyLock::new(|| {
        #[expect(clippy::unwrap_used, reason = "static regex is known-valid at compile time")]
        Regex::new(r#"(?i)<a\s+[^>]*href="([^"]+)""#).unwrap()
    });
    HREF_RE
        .captures_iter(html)
        .filter_map(|captures| captures.get(1))
        .map(|href| href.as_str().to_string())
        .filter(|href| {
            !href.starts_with('?') && !href.starts_with('#') && !href.starts_with('/') && !href.starts_with("..")
        })
        .collect()
}

#[cfg(test)]
#[expect(clippy::expect_used, reason = "tests use expect for clearer failure messages")]
mod tests {
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const BUCKET_PAGE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
        <ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
          <Name>downloads</Name>
          <Contents>
            <Key>php_agent/release/agent-10.0.0.tar.gz</Key>
            <LastModified>2026-08-20T10:00:00.000Z</LastModified>
            <Size>1048576</Size>
          </Contents>
          <Contents>
            <Key>php_agent/release/agent-1.0.0.tar.gz</Key>
            <LastModified>2019-01-01T00:00:00.000Z</LastModified>
            <Size>1048576</Size>
          </Contents>
          <Contents>
            <Key>php_agent/release/empty.tar.gz</Key>
            <LastModified>2026-08-20T10:00:00.000Z</LastModified>
            <Size>0</Size>
          </Contents>
          <CommonPrefixes><Prefix>php_agent/release/archive/</Prefix></CommonPrefixes>
        </ListBucketResult>"#;

    #[test]
    fn bucket_page_parses_contents_and_prefixes() {
        let page = parse_bucket_page(BUCKET_PAGE).expect("page parses");
        assert_eq!(page.objects.len(), 3);
        assert_eq!(page.objects[0].key, "php_agent/release/agent-10.0.0.tar.gz");
        assert_eq!(page.objects[0].size, 1_048_576);
        assert!(page.objects[0].modified.is_some());
        assert_eq!(page.prefixes, ["php_agent/release/archive/"]);
    }

    fn s3_listing(endpoint: String, recursive: bool) -> S3Listing {
        S3Listing {
            name: "PHP Agent".to_string(),
            regex: r".*\.tar\.gz".to_string(),
            recursive,
            endpoint,
            prefixes: vec!["php_agent/release/".to_string()],
            after_date: "2026-01-01T00:00:00Z".parse().expect("cutoff parses"),
        }
    }

    #[tokio::test]
    async fn s3_targets_filter_on_regex_size_and_date() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .and(query_param("prefix", "php_agent/release/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(BUCKET_PAGE))
            .mount(&server)
            .await;

        let scanner = WebListingScanner::new().expect("scanner builds");
        let targets = scanner
            .s3_targets(&s3_listing(server.uri(), false))
            .await
            .expect("enumeration succeeds");

        assert_eq!(targets.len(), 1, "stale and empty objects are filtered");
        let target = &targets[0];
        assert!(target.locator.ends_with("/php_agent/release/agent-10.0.0.tar.gz"));
        assert_eq!(target.context.get("filename").map(String::as_str), Some("agent-10.0.0.tar.gz"));
        assert_eq!(target.context.get("name").map(String::as_str), Some("PHP Agent"));
    }

    #[tokio::test]
    async fn recursive_s3_listing_expands_common_prefixes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .and(query_param("prefix", "php_agent/release/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(BUCKET_PAGE))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/"))
            .and(query_param("prefix", "php_agent/release/archive/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<ListBucketResult>
                     <Contents>
                       <Key>php_agent/release/archive/agent-9.0.0.tar.gz</Key>
                       <LastModified>2026-08-01T00:00:00Z</LastModified>
                       <Size>5</Size>
                     </Contents>
                   </ListBucketResult>"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let scanner = WebListingScanner::new().expect("scanner builds");
        let targets = scanner
            .s3_targets(&s3_listing(server.uri(), true))
            .await
            .expect("enumeration succeeds");
        assert_eq!(targets.len(), 2);
    }

    #[tokio::test]
    async fn unreachable_prefix_is_skipped_not_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let scanner = WebListingScanner::new().expect("scanner builds");
        let targets = scanner
            .s3_targets(&s3_listing(server.uri(), false))
            .await
            .expect("one bad prefix must not fail the listing");
        assert!(targets.is_empty());
    }

    const INDEX_PAGE: &str = r#"<html><body><h1>Index of /release/</h1>
        <a href="../">Parent Directory</a>
        <a href="archive/">archive/</a>
        <a href="agent-10.0.0.tar.gz">agent-10.0.0.tar.gz</a>
        <a href="agent-10.0.0.tar.gz.sha256">agent-10.0.0.tar.gz.sha256</a>
        </body></html>"#;

    #[tokio::test]
    async fn html_targets_match_names_against_the_config_regex() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/release/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(INDEX_PAGE))
            .mount(&server)
            .await;

        let listing = HtmlListing {
            name: "PHP Agent".to_string(),
            regex: r".*\.tar\.gz$".to_string(),
            recursive: false,
            url: format!("{}/release/", server.uri()),
        };

        let scanner = WebListingScanner::new().expect("scanner builds");
        let targets = scanner.html_targets(&listing).await.expect("enumeration succeeds");

        assert_eq!(targets.len(), 1);
        assert_eq!(&*targets[0].locator, format!("{}/release/agent-10.0.0.tar.gz", server.uri()));
    }

    #[tokio::test]
    async fn recursive_html_listing_follows_directory_links() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/release/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(INDEX_PAGE))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/release/archive/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<a href="agent-9.0.0.tar.gz">agent-9.0.0.tar.gz</a>"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let listing = HtmlListing {
            name: "PHP Agent".to_string(),
            regex: r".*\.tar\.gz$".to_string(),
            recursive: true,
            url: format!("{}/release/", server.uri()),
        };

        let scanner = WebListingScanner::new().expect("scanner builds");
        let targets = scanner.html_targets(&listing).await.expect("enumeration succeeds");
        assert_eq!(targets.len(), 2, "parent-directory links must not be followed");
    }

    #[tokio::test]
    async fn cross_linked_listing_pages_are_fetched_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/release/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(INDEX_PAGE))
            .expect(1)
            .mount(&server)
            .await;
        // The subdirectory links back to the root listing with an absolute
        // URL, which the navigation-link filter does not catch.
        Mock::given(method("GET"))
            .and(path("/release/archive/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                r#"<a href="{}/release/">release</a> <a href="agent-9.0.0.tar.gz">agent-9.0.0.tar.gz</a>"#,
                server.uri()
            )))
            .expect(1)
            .mount(&server)
            .await;

        let listing = HtmlListing {
            name: "PHP Agent".to_string(),
            regex: r".*\.tar\.gz$".to_string(),
            recursive: true,
            url: format!("{}/release/", server.uri()),
        };

        let scanner = WebListingScanner::new().expect("scanner builds");
        let targets = scanner.html_targets(&listing).await.expect("enumeration succeeds");
        assert_eq!(targets.len(), 2, "the cycle must terminate without duplicate targets");
    }

    #[test]
    fn config_file_round_trips() {
        let dir = tempfile::tempdir().expect("temp dir creates");
        let path = dir.path().join("listings.json");
        std::fs::write(
            &path,
            r#"[{ "url": "https://download.example/php_agent/release/",
                 "regex": ".*\\.tar\\.gz", "name": "PHP Agent", "recursive": false }]"#,
        )
        .expect("config writes");

        let listings: Vec<HtmlListing> = load_config(&path).expect("config loads");
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].name, "PHP Agent");
        assert!(!listings[0].recursive);
    }

    #[test]
    fn missing_config_file_is_fatal() {
        let err = load_config::<HtmlListing>(Path::new("/nonexistent/listings.json"))
            .expect_err("missing file must fail");
        assert!(matches!(err, EnumerationError::Config { .. }));
    }

    #[test]
    fn invalid_listing_regex_is_fatal() {
        let listing = HtmlListing {
            name: "broken".to_string(),
            regex: "(".to_string(),
            recursive: false,
            url: "https://example.com/".to_string(),
        };
        let err = compile_listing_regex(&listing.name, &listing.regex).expect_err("bad regex must fail");
        assert!(matches!(err, EnumerationError::Malformed { .. }));
    }
}
