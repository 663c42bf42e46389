//! Latest-release lookup for public package registries.
//!
//! Resolves the most recent published artifact for one PyPI package or one
//! RubyGem and turns it into a single download-then-scan target carrying the
//! package name and version as event context.

use drover_core::target::{SourceKind, Target};
use quick_xml::Reader;
use quick_xml::events::Event;
use regex::Regex;
use tracing::info;

use crate::EnumerationError;

/// One resolved package artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRelease {
    /// Package or gem name as published.
    pub name: String,
    /// Version string parsed from the artifact name.
    pub version: String,
    /// Direct download URL for the artifact.
    pub url: String,
}

/// Builds the archive target for a PyPI release.
#[must_use]
pub fn pypi_target(release: &PackageRelease) -> Target {
    Target::new(SourceKind::Archive, release.url.as_str())
        .with_link(release.url.as_str())
        .with_context("pypi_title", release.name.as_str())
        .with_context("pypi_version", release.version.as_str())
        .with_context("filename", format!("{}-{}.tar.gz", release.name, release.version))
}

/// Builds the archive target for a RubyGems release.
#[must_use]
pub fn gem_target(release: &PackageRelease) -> Target {
    Target::new(SourceKind::Archive, release.url.as_str())
        .with_link(release.url.as_str())
        .with_context("gem_title", release.name.as_str())
        .with_context("gem_version", release.version.as_str())
        .with_context("filename", format!("{}-{}.gem", release.name, release.version))
}

/// Client for the PyPI simple index.
#[derive(Debug)]
pub struct PypiClient {
    client: reqwest::Client,
    base_url: String,
}

impl PypiClient {
    /// Public index used when no override is given.
    pub const DEFAULT_BASE_URL: &'static str = "https://pypi.org";

    /// Creates a client for the index at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, EnumerationError> {
        Ok(Self {
            client: crate::http_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Resolves the latest sdist for `package` from its simple-index page.
    ///
    /// The simple index lists releases oldest-first, so the last matching
    /// `<name>-<version>.tar.gz` link is the newest sdist.
    pub async fn latest_sdist(&self, package: &str) -> Result<PackageRelease, EnumerationError> {
        let response = self
            .client
            .get(format!("{}/simple/{package}/", self.base_url))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EnumerationError::Api {
                service: "PyPI",
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let html = response.text().await?;

        let sdist_re = Regex::new(&format!(
            r"(?i)({})-([\d\-\.]+)\.tar\.gz",
            regex::escape(package)
        ))
        .map_err(|e| EnumerationError::Malformed {
            service: "PyPI",
            message: format!("package name does not form a valid pattern: {e}"),
        })?;

        let release = extract_hrefs(&html)
            .into_iter()
            .filter_map(|href| {
                let captures = sdist_re.captures(&href)?;
                Some(PackageRelease {
                    name: captures.get(1)?.as_str().to_string(),
                    version: captures.get(2)?.as_str().trim_end_matches('.').to_string(),
                    url: href.clone(),
                })
            })
            .next_back()
            .ok_or_else(|| EnumerationError::Malformed {
                service: "PyPI",
                message: format!("no sdist link found for {package}"),
            })?;
        info!(package, version = %release.version, "resolved latest sdist");
        Ok(release)
    }
}

/// Client for the RubyGems version feed.
#[derive(Debug)]
pub struct RubyGemsClient {
    client: reqwest::Client,
    base_url: String,
}

impl RubyGemsClient {
    /// Public registry used when no override is given.
    pub const DEFAULT_BASE_URL: &'static str = "https://rubygems.org";

    /// Creates a client for the registry at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, EnumerationError> {
        Ok(Self {
            client: crate::http_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Resolves the latest version of `gem` from its `versions.atom` feed.
    /// Entries are newest-first; the first entry title carries
    /// `name (version)`.
    pub async fn latest_gem(&self, gem: &str) -> Result<PackageRelease, EnumerationError> {
        let response = self
            .client
            .get(format!("{}/gems/{gem}/versions.atom", self.base_url))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EnumerationError::Api {
                service: "RubyGems",
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let feed = response.text().await?;

        let title = first_entry_title(&feed).ok_or_else(|| EnumerationError::Malformed {
            service: "RubyGems",
            message: format!("versions feed for {gem} has no entries"),
        })?;

        static TITLE_RE: std::sync::LazyLock<Regex> = std::sync::LazyLock::new(|| {
            #[expect(clippy::unwrap_used, reason = "static regex is known-valid at compile time")]
            Regex::new(r"(.*)\s+\(([0-9\.]+)\)").unwrap()
        });
        let captures = TITLE_RE.captures(&title).ok_or_else(|| EnumerationError::Malformed {
            service: "RubyGems",
            message: format!("unrecognised entry title: {title}"),
        })?;
        let (name, version) = (captures[1].to_string(), captures[2].to_string());

        let release = PackageRelease {
            url: format!("{}/downloads/{name}-{version}.gem", self.base_url),
            name,
            version,
        };
        info!(gem, version = %release.version, "resolved latest gem");
        Ok(release)
    }
}

/// Pulls every `href` attribute value out of an index page, in order.
fn extract_hrefs(html: &str) -> Vec<String> {
    static HREF_RE: std::sync::LazyLock<Regex> = std::sync::LazyLock::new(|| {
        #[expect(clippy::unwrap_used, reason = "static regex is known-valid at compile time")]
        Regex::new(r#"(?i)href="([^"]+)""#).unwrap()
    });
    HREF_RE
        .captures_iter(html)
        .filter_map(|captures| captures.get(1))
        .map(|href| href.as_str().to_string())
        .collect()
}

/// First `<entry><title>` text in an Atom feed.
fn first_entry_title(xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut in_entry = false;
    let mut in_title = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => match start.local_name().as_ref() {
                b"entry" => in_entry = true,
                b"title" if in_entry => in_title = true,
                _ => {}
            },
            Ok(Event::Text(text)) if in_title => {
                return text.unescape().ok().map(|title| title.into_owned());
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}
