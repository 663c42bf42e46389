//! Google Drive enumeration with MIME-type routing.
//!
//! Lists files via the Drive v3 API and splits them into two scan flows:
//! native documents and spreadsheets go to the doc scanner by file id, and
//! everything not on the block list is downloaded and scanned as a binary.
//! Blocked MIME types are Drive-internal objects (forms, maps, sites) that
//! have no downloadable content worth scanning.

use drover_core::target::{SourceKind, Target};
use serde::Deserialize;
use tracing::{debug, info};

use crate::EnumerationError;

const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const DOC_MIMES: [&str; 2] = [
    "application/vnd.google-apps.document",
    "application/vnd.google-apps.spreadsheet",
];

/// Drive-native MIME types excluded from binary download.
pub const MIME_BLOCK_LIST: [&str; 17] = [
    "application/vnd.google-apps.audio",
    "application/vnd.google-apps.document",
    "application/vnd.google-apps.drive",
    "application/vnd.google-apps.drawing",
    "application/vnd.google-apps.file",
    "application/vnd.google-apps.folder",
    "application/vnd.google-apps.form",
    "application/vnd.google-apps.fusiontable",
    "application/vnd.google-apps.map",
    "application/vnd.google-apps.photo",
    "application/vnd.google-apps.presentation",
    "application/vnd.google-apps.script",
    "application/vnd.google-apps.shortcut",
    "application/vnd.google-apps.site",
    "application/vnd.google-apps.spreadsheet",
    "application/vnd.google-apps.unknown",
    "application/vnd.google-apps.video",
];

/// One file from the Drive listing.
#[derive(Debug, Clone, Deserialize)]
pub struct DriveFile {
    /// Drive file id.
    pub id: String,
    /// Display name, used as the download filename.
    pub name: String,
    /// MIME type driving the routing decision.
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    /// Authenticated download link; absent for Drive-native types.
    #[serde(rename = "webContentLink", default)]
    pub web_content_link: Option<String>,
    /// Browser link, used for trace-back.
    #[serde(rename = "webViewLink", default)]
    pub web_view_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    #[serde(rename = "nextPageToken", default)]
    next_page_token: Option<String>,
}

/// What to list: the whole corpus, one folder, or one shared drive.
#[derive(Debug, Clone, Default)]
pub struct ListScope {
    /// Restrict the listing to children of this folder id.
    pub folder: Option<String>,
    /// Restrict the listing to this shared drive.
    pub drive_id: Option<String>,
}

/// Doc-scanner targets and download-then-scan targets from one listing.
#[derive(Debug, Default)]
pub struct DrivePartition {
    /// Native documents and spreadsheets, addressed by file id.
    pub docs: Vec<Target>,
    /// Downloadable files, addressed by media URL.
    pub binaries: Vec<Target>,
}

/// Bearer-token client for the Drive v3 API.
#[derive(Debug)]
pub struct GdriveClient {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

impl GdriveClient {
    /// Drive v3 endpoint used when no override is given.
    pub const DEFAULT_API_BASE: &'static str = "https://www.googleapis.com/drive/v3";

    /// Creates a client for the given API base and OAuth bearer token.
    pub fn new(api_base: impl Into<String>, token: impl Into<String>) -> Result<Self, EnumerationError> {
        Ok(Self {
            client: crate::http_client()?,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    /// A client whose requests carry the Drive bearer token, for media
    /// downloads through the files endpoint.
    pub fn authorized_client(&self) -> Result<reqwest::Client, EnumerationError> {
        let mut headers = reqwest::header::HeaderMap::new();
        let mut value = reqwest::header::HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|e| EnumerationError::ClientInit(e.to_string()))?;
        value.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, value);
        reqwest::Client::builder()
            .user_agent(crate::USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| EnumerationError::ClientInit(e.to_string()))
    }

    /// Lists every non-folder file in scope, following `nextPageToken`.
    pub async fn list_files(&self, scope: &ListScope) -> Result<Vec<DriveFile>, EnumerationError> {
        let mut files: Vec<DriveFile> = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query: Vec<(&str, String)> = vec![
                ("pageSize", "100".to_string()),
                (
                    "fields",
                    "nextPageToken, files(id,name,mimeType,webContentLink,webViewLink)".to_string(),
                ),
            ];
            if let Some(folder) = scope.folder.as_deref() {
                query.push(("q", format!("'{folder}' in parents")));
            }
            if let Some(drive_id) = scope.drive_id.as_deref() {
                query.push(("driveId", drive_id.to_string()));
                query.push(("corpora", "drive".to_string()));
            }
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token.to_string()));
            }

            let response = self
                .client
                .get(format!("{}/files", self.api_base))
                .bearer_auth(&self.token)
                .query(&query)
                .send()
                .await?;
            let status = response.status();
            if !status.is_success() {
                return Err(EnumerationError::Api {
                    service: "Google Drive",
                    status: status.as_u16(),
                    body: response.text().await.unwrap_or_default(),
                });
            }
            let page: FileList = response.json().await?;
            files.extend(page.files.into_iter().filter(|f| f.mime_type != FOLDER_MIME));
            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }
        info!(files = files.len(), "drive listing complete");
        Ok(files)
    }

    /// Routes listed files to the doc scanner or the download flow.
    #[must_use]
    pub fn partition_targets(&self, files: &[DriveFile]) -> DrivePartition {
        let mut partition = DrivePartition::default();
        for file in files {
            if DOC_MIMES.contains(&file.mime_type.as_str()) {
                let mut target = Target::new(SourceKind::GoogleDoc, file.id.as_str());
                if let Some(link) = file.web_view_link.as_deref() {
                    target = target.with_link(link);
                }
                partition.docs.push(target);
            }
            if MIME_BLOCK_LIST.contains(&file.mime_type.as_str()) {
                continue;
            }
            let Some(link) = file.web_content_link.as_deref() else {
                debug!(id = %file.id, name = %file.name, "skipping file with no download link");
                continue;
            };
            partition.binaries.push(
                Target::new(
                    SourceKind::Archive,
                    format!("{}/files/{}?alt=media", self.api_base, file.id),
                )
                .with_link(link)
                .with_context("g_drive_id", file.id.as_str())
                .with_context("filename", file.name.as_str()),
            );
        }
        info!(
            docs = partition.docs.len(),
            binaries = partition.binaries.len(),
            "partitioned drive files"
        );
        partition
    }
}

#[cfg(test)]
#[expect(clippy::expect_used, reason = "tests use expect for clearer failure messages")]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn file_json(id: &str, name: &str, mime: &str) -> serde_json::Value {
        json!({
            "id": id,
            "name": name,
            "mimeType": mime,
            "webContentLink": format!("https://drive.example/uc?id={id}"),
            "webViewLink": format!("https://drive.example/view/{id}"),
        })
    }

    #[tokio::test]
    async fn listing_follows_next_page_token_and_drops_folders() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .and(query_param("pageToken", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "files": [file_json("c", "notes.txt", "text/plain")],
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "files": [
                    file_json("a", "reports", "application/vnd.google-apps.folder"),
                    file_json("b", "plan", "application/vnd.google-apps.document"),
                ],
                "nextPageToken": "page-2",
            })))
            .mount(&server)
            .await;

        let client = GdriveClient::new(server.uri(), "ya29.token").expect("client builds");
        let files = client.list_files(&ListScope::default()).await.expect("listing succeeds");

        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["plan", "notes.txt"], "folders are not scan candidates");
    }

    #[tokio::test]
    async fn folder_scope_becomes_a_parents_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .and(query_param("q", "'folder-1' in parents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "files": [] })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GdriveClient::new(server.uri(), "ya29.token").expect("client builds");
        let scope = ListScope { folder: Some("folder-1".to_string()), drive_id: None };
        let files = client.list_files(&scope).await.expect("listing succeeds");
        assert!(files.is_empty());
    }

    #[test]
    fn partition_routes_by_mime_type() {
        let client = GdriveClient::new("https://api.example/drive/v3", "t").expect("client builds");
        let files = vec![
            DriveFile {
                id: "doc-1".to_string(),
                name: "plan".to_string(),
                mime_type: "application/vnd.google-apps.document".to_string(),
                web_content_link: None,
                web_view_link: Some("https://drive.example/view/doc-1".to_string()),
            },
            DriveFile {
                id: "bin-1".to_string(),
                name: "agent.tar.gz".to_string(),
                mime_type: "application/gzip".to_string(),
                web_content_link: Some("https://drive.example/uc?id=bin-1".to_string()),
                web_view_link: None,
            },
            DriveFile {
                id: "form-1".to_string(),
                name: "survey".to_string(),
                mime_type: "application/vnd.google-apps.form".to_string(),
                web_content_link: None,
                web_view_link: None,
            },
        ];

        let partition = client.partition_targets(&files);

        assert_eq!(partition.docs.len(), 1);
        assert_eq!(&*partition.docs[0].locator, "doc-1");
        assert_eq!(partition.docs[0].kind, SourceKind::GoogleDoc);

        assert_eq!(partition.binaries.len(), 1, "blocked mimes are skipped");
        let binary = &partition.binaries[0];
        assert_eq!(binary.kind, SourceKind::Archive);
        assert_eq!(&*binary.locator, "https://api.example/drive/v3/files/bin-1?alt=media");
        assert_eq!(binary.context.get("filename").map(String::as_str), Some("agent.tar.gz"));
        assert_eq!(binary.link.as_deref(), Some("https://drive.example/uc?id=bin-1"));
    }

    #[tokio::test]
    async fn expired_token_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let client = GdriveClient::new(server.uri(), "expired").expect("client builds");
        let err = client
            .list_files(&ListScope::default())
            .await
            .expect_err("401 must fail");
        assert!(matches!(err, EnumerationError::Api { status: 401, .. }));
    }
}
