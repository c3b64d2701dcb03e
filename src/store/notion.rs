//! Notion REST API client and project store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use super::{Project, ProjectStore, StoreError};
use crate::config::Config;

const NOTION_VERSION: &str = "2022-06-28";

/// Notion client authenticated with an integration token
#[derive(Clone)]
pub struct NotionClient {
    client: Client,
    base_url: Url,
    token: String,
}

impl NotionClient {
    pub fn new(base_url: Url, token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url,
            token: token.into(),
        }
    }

    /// API URL under `/v1`; each segment is percent-encoded on its own
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("v1").extend(segments);
        }
        url
    }

    /// Build an authenticated request against an API path
    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        self.client
            .request(method, self.endpoint(segments))
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .header("Content-Type", "application/json")
    }

    async fn send<T: DeserializeOwned>(
        request: RequestBuilder,
        page_id: Option<&str>,
    ) -> Result<T, StoreError> {
        let response = request.send().await.map_err(StoreError::Request)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            if let Some(id) = page_id {
                return Err(StoreError::NotFound(id.to_string()));
            }
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Api { status: status.as_u16(), body });
        }

        response.json().await.map_err(StoreError::Parse)
    }

    /// Query one page of a database
    pub async fn query_database(
        &self,
        database_id: &str,
        body: &Value,
    ) -> Result<QueryResponse, StoreError> {
        let request = self
            .request(Method::POST, &["databases", database_id, "query"])
            .json(body);
        Self::send(request, None).await
    }

    /// Retrieve a page with its properties
    pub async fn retrieve_page(&self, page_id: &str) -> Result<NotionPage, StoreError> {
        let request = self.request(Method::GET, &["pages", page_id]);
        Self::send(request, Some(page_id)).await
    }

    /// Patch page properties
    pub async fn update_page(&self, page_id: &str, properties: Value) -> Result<(), StoreError> {
        let request = self
            .request(Method::PATCH, &["pages", page_id])
            .json(&json!({ "properties": properties }));
        Self::send::<Value>(request, Some(page_id)).await.map(|_| ())
    }
}

/// Notion object ids are UUIDs, with or without hyphens
pub fn is_notion_id(id: &str) -> bool {
    let hex_digits = id.chars().filter(char::is_ascii_hexdigit).count();
    let hyphens = id.chars().filter(|c| *c == '-').count();
    let well_formed = match id.len() {
        32 => hyphens == 0,
        36 => hyphens == 4 && [8, 13, 18, 23].iter().all(|&i| id.as_bytes()[i] == b'-'),
        _ => false,
    };
    well_formed && hex_digits == 32
}

/// Database query response page
#[derive(Debug, Deserialize)]
pub struct QueryResponse {
    pub results: Vec<NotionPage>,
    #[serde(default)]
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

/// Raw Notion page; properties are kept untyped and read leniently
#[derive(Debug, Deserialize)]
pub struct NotionPage {
    pub id: String,
    pub last_edited_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub properties: Value,
}

impl NotionPage {
    fn text(&self, pointer: &str) -> Option<String> {
        self.properties
            .pointer(pointer)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn signal_count(&self) -> u64 {
        let Some(number) = self.properties.pointer("/SignalCount/number") else {
            return 0;
        };
        number
            .as_u64()
            .or_else(|| number.as_f64().filter(|n| *n > 0.0).map(|n| n as u64))
            .unwrap_or(0)
    }

    /// Flatten the page into a project, substituting defaults for empty fields
    pub fn into_project(self) -> Project {
        let defaults = Project::new(self.id.clone(), self.signal_count());
        Project {
            name: self.text("/Name/title/0/plain_text").unwrap_or(defaults.name),
            description: self
                .text("/Description/rich_text/0/plain_text")
                .unwrap_or(defaults.description),
            status: self.text("/Status/select/name").unwrap_or(defaults.status),
            content: self.text("/Content/rich_text/0/plain_text").unwrap_or_default(),
            last_update: self.last_edited_time,
            ..defaults
        }
    }
}

/// Project store over a Notion database.
///
/// Missing credentials are tolerated: listing degrades to an empty result so
/// the board still renders, while single-record operations fail.
#[derive(Clone)]
pub struct NotionProjectStore {
    client: Option<NotionClient>,
    database_id: Option<String>,
}

impl NotionProjectStore {
    pub fn new(config: &Config) -> Self {
        if !config.notion_configured() {
            warn!("NOTION_TOKEN or NOTION_DATABASE_ID not set; project listing will be empty");
        }

        Self {
            client: config
                .notion_token
                .clone()
                .map(|token| NotionClient::new(config.notion_api_url.clone(), token)),
            database_id: config.notion_database_id.clone(),
        }
    }

    /// Client for a single-page call; the id must look like a Notion id
    fn page_client(&self, id: &str) -> Result<&NotionClient, StoreError> {
        let client = self.client.as_ref().ok_or(StoreError::NotConfigured)?;
        if !is_notion_id(id) {
            warn!(project_id = %id, "Rejecting malformed project id");
            return Err(StoreError::InvalidId(id.to_string()));
        }
        Ok(client)
    }
}

#[async_trait]
impl ProjectStore for NotionProjectStore {
    async fn query_projects(&self) -> Result<Vec<Project>, StoreError> {
        let (Some(client), Some(database_id)) = (&self.client, &self.database_id) else {
            error!("Notion database is not configured in environment variables");
            return Ok(Vec::new());
        };

        let mut projects = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut body = json!({
                "sorts": [{ "property": "LastUpdate", "direction": "descending" }],
            });
            if let Some(cursor) = &cursor {
                body["start_cursor"] = json!(cursor);
            }

            let page = client.query_database(database_id, &body).await?;
            projects.extend(page.results.into_iter().map(NotionPage::into_project));

            match page.next_cursor {
                Some(next) if page.has_more => cursor = Some(next),
                _ => break,
            }
        }

        debug!(count = projects.len(), "Fetched projects from Notion");
        Ok(projects)
    }

    async fn get_project(&self, id: &str) -> Result<Project, StoreError> {
        let page = self.page_client(id)?.retrieve_page(id).await?;
        Ok(page.into_project())
    }

    async fn update_signal_count(&self, id: &str, new_value: u64) -> Result<(), StoreError> {
        self.page_client(id)?
            .update_page(id, json!({ "SignalCount": { "number": new_value } }))
            .await
    }
}
