//! Client for the external book-metadata API (Google Books volumes endpoint).

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use shelf_kernel::settings::CatalogSettings;
use shelf_resilience::Transient;
use time::{Date, Month};

use super::models::ExternalBook;

#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("catalog answered with status {0}")]
    Status(StatusCode),

    #[error("no book found for id: {0}")]
    NotFound(String),

    #[error("malformed catalog payload: {0}")]
    Malformed(String),
}

impl Transient for CatalogError {
    fn is_transient(&self) -> bool {
        match self {
            CatalogError::Transport(err) => !err.is_decode() && !err.is_builder(),
            CatalogError::Status(status) => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            CatalogError::NotFound(_) | CatalogError::Malformed(_) => false,
        }
    }
}

/// Lookup seam for the external catalog.
#[async_trait::async_trait]
pub trait BookCatalog: Send + Sync {
    /// Volumes whose title matches `title`
    async fn search(&self, title: &str) -> Result<Vec<ExternalBook>, CatalogError>;
    /// A single volume by its catalog id
    async fn volume(&self, id: &str) -> Result<ExternalBook, CatalogError>;
}

#[derive(Debug, Deserialize)]
struct VolumeList {
    #[serde(default)]
    items: Vec<Volume>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Volume {
    id: String,
    volume_info: Option<VolumeInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeInfo {
    #[serde(default)]
    title: String,
    #[serde(default)]
    authors: Vec<String>,
    published_date: Option<String>,
}

impl VolumeInfo {
    fn authors_or_unknown(authors: Vec<String>) -> Vec<String> {
        if authors.is_empty() {
            vec!["Unknown".to_string()]
        } else {
            authors
        }
    }
}

/// HTTP client for the Google Books `volumes` resource.
#[derive(Debug, Clone)]
pub struct GoogleBooksClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl GoogleBooksClient {
    pub fn new(settings: &CatalogSettings) -> Result<Self, CatalogError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()?;
        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
        })
    }

    fn with_key(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.query(&[("key", key.as_str())]),
            None => request,
        }
    }
}

#[async_trait::async_trait]
impl BookCatalog for GoogleBooksClient {
    async fn search(&self, title: &str) -> Result<Vec<ExternalBook>, CatalogError> {
        tracing::info!(%title, "searching external catalog");

        let query = format!("intitle:{title}");
        let request = self
            .http
            .get(&self.base_url)
            .query(&[("q", query.as_str())]);
        let response = self.with_key(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status(status));
        }

        let list: VolumeList = response.json().await?;
        let books = list
            .items
            .into_iter()
            .filter_map(|volume| {
                let info = volume.volume_info?;
                let published_date = info.published_date.as_deref().and_then(|raw| {
                    parse_partial_date(raw)
                        .map_err(|err| tracing::debug!(volume = %volume.id, %err, "unparsable date"))
                        .ok()
                });
                Some(ExternalBook {
                    id: volume.id,
                    title: info.title,
                    authors: VolumeInfo::authors_or_unknown(info.authors),
                    published_date,
                })
            })
            .collect::<Vec<_>>();

        tracing::debug!(count = books.len(), "external catalog search finished");
        Ok(books)
    }

    async fn volume(&self, id: &str) -> Result<ExternalBook, CatalogError> {
        tracing::info!(volume = %id, "fetching volume from external catalog");

        let url = format!("{}/{}", self.base_url, id);
        let response = self.with_key(self.http.get(&url)).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(CatalogError::NotFound(id.to_string()));
        }
        if !status.is_success() {
            return Err(CatalogError::Status(status));
        }

        let volume: Volume = response.json().await?;
        let info = volume
            .volume_info
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;
        let raw_date = info
            .published_date
            .ok_or_else(|| CatalogError::Malformed(format!("volume {id} has no publishedDate")))?;
        let published_date = parse_partial_date(&raw_date)?;

        Ok(ExternalBook {
            id: volume.id,
            title: info.title,
            authors: VolumeInfo::authors_or_unknown(info.authors),
            published_date: Some(published_date),
        })
    }
}

/// Parse `yyyy`, `yyyy-MM` or `yyyy-MM-dd`; a missing month or day is 1.
pub fn parse_partial_date(raw: &str) -> Result<Date, CatalogError> {
    let malformed = || CatalogError::Malformed(format!("unsupported date '{raw}'"));

    let mut parts = raw.trim().splitn(3, '-');
    let year: i32 = parts
        .next()
        .filter(|part| part.len() == 4)
        .and_then(|part| part.parse().ok())
        .ok_or_else(malformed)?;
    let month: u8 = match parts.next() {
        Some(part) => part.parse().map_err(|_| malformed())?,
        None => 1,
    };
    let day: u8 = match parts.next() {
        Some(part) => part.parse().map_err(|_| malformed())?,
        None => 1,
    };

    let month = Month::try_from(month).map_err(|_| malformed())?;
    Date::from_calendar_date(year, month, day).map_err(|_| malformed())
}
