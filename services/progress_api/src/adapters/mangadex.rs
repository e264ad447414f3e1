//! services/progress_api/src/adapters/mangadex.rs
//!
//! The `MangaCatalog` adapter backed by the public MangaDex REST API. Only
//! metadata and page lists come from here; reading progress never does.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use manga_progress_core::ports::{
    ChapterSummary, MangaCatalog, MangaSummary, PortError, PortResult,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

const COVER_BASE_URL: &str = "https://uploads.mangadex.org/covers";
const FEED_LANGUAGE: &str = "en";

#[derive(Clone, Debug)]
pub struct MangaDexCatalog {
    base_url: String,
    client: reqwest::Client,
}

impl MangaDexCatalog {
    /// Create a client for the given API root (e.g. "https://api.mangadex.org").
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url_str = base_url.into();
        tracing::debug!(base_url = %base_url_str, "creating MangaDexCatalog");
        Ok(Self {
            base_url: base_url_str.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> PortResult<T> {
        let url = self.url(path);
        tracing::debug!(%url, "GET catalog");
        let resp = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(map_http_error)?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PortError::NotFound(path.to_string()));
        }
        let body = resp
            .error_for_status()
            .map_err(map_http_error)?
            .text()
            .await
            .map_err(map_http_error)?;
        serde_json::from_str(&body)
            .map_err(|e| PortError::Unexpected(format!("unexpected catalog payload: {}", e)))
    }
}

fn map_http_error(e: reqwest::Error) -> PortError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        PortError::Unreachable(e.to_string())
    } else {
        PortError::Unexpected(e.to_string())
    }
}

#[async_trait]
impl MangaCatalog for MangaDexCatalog {
    /// GET /manga/{id}
    #[tracing::instrument(level = "debug", skip(self))]
    async fn get_manga(&self, manga_id: &str) -> PortResult<MangaSummary> {
        let resp: MangaResponse = self
            .get_json(
                &format!("/manga/{}", manga_id),
                &[("includes[]", "cover_art".to_string())],
            )
            .await?;
        Ok(resp.data.into_summary())
    }

    /// GET /manga/{id}/feed
    #[tracing::instrument(level = "debug", skip(self))]
    async fn get_chapters(
        &self,
        manga_id: &str,
        limit: usize,
        offset: usize,
    ) -> PortResult<Vec<ChapterSummary>> {
        let query = [
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
            ("translatedLanguage[]", FEED_LANGUAGE.to_string()),
            ("order[chapter]", "asc".to_string()),
            ("includes[]", "scanlation_group".to_string()),
            ("contentRating[]", "safe".to_string()),
            ("contentRating[]", "suggestive".to_string()),
            ("contentRating[]", "erotica".to_string()),
        ];
        let resp: FeedResponse = self
            .get_json(&format!("/manga/{}/feed", manga_id), &query)
            .await?;
        Ok(resp.data.into_iter().map(ChapterData::into_summary).collect())
    }

    /// GET /at-home/server/{chapterId}
    #[tracing::instrument(level = "debug", skip(self))]
    async fn get_chapter_pages(&self, chapter_id: &str) -> PortResult<Vec<String>> {
        let resp: AtHomeResponse = self
            .get_json(&format!("/at-home/server/{}", chapter_id), &[])
            .await?;
        Ok(resp.page_urls())
    }
}

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Debug, Deserialize)]
struct MangaResponse {
    data: MangaData,
}

#[derive(Debug, Deserialize)]
struct MangaData {
    id: String,
    attributes: MangaAttributes,
    #[serde(default)]
    relationships: Vec<Relationship>,
}

#[derive(Debug, Deserialize)]
struct MangaAttributes {
    #[serde(default)]
    title: BTreeMap<String, String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Relationship {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    attributes: Option<RelationshipAttributes>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelationshipAttributes {
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FeedResponse {
    #[serde(default)]
    data: Vec<ChapterData>,
}

#[derive(Debug, Deserialize)]
struct ChapterData {
    id: String,
    attributes: ChapterAttributes,
    #[serde(default)]
    relationships: Vec<Relationship>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChapterAttributes {
    #[serde(default)]
    chapter: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    publish_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AtHomeResponse {
    base_url: String,
    chapter: AtHomeChapter,
}

#[derive(Debug, Deserialize)]
struct AtHomeChapter {
    hash: String,
    #[serde(default)]
    data: Vec<String>,
}

//=========================================================================================
// Mapping
//=========================================================================================

fn related<'a>(relationships: &'a [Relationship], kind: &str) -> Option<&'a RelationshipAttributes> {
    relationships
        .iter()
        .find(|r| r.kind == kind)
        .and_then(|r| r.attributes.as_ref())
}

impl MangaData {
    fn into_summary(self) -> MangaSummary {
        let cover_url = related(&self.relationships, "cover_art")
            .and_then(|a| a.file_name.as_deref())
            .map(|file| format!("{}/{}/{}.256.jpg", COVER_BASE_URL, self.id, file));

        let title = self
            .attributes
            .title
            .get(FEED_LANGUAGE)
            .or_else(|| self.attributes.title.values().next())
            .cloned()
            .unwrap_or_else(|| "Unknown Title".to_string());

        MangaSummary {
            id: self.id,
            title,
            cover_url,
            status: self.attributes.status.unwrap_or_else(|| "unknown".to_string()),
        }
    }
}

impl ChapterData {
    fn into_summary(self) -> ChapterSummary {
        let scanlation_group = related(&self.relationships, "scanlation_group")
            .and_then(|a| a.name.clone());
        ChapterSummary {
            id: self.id,
            number: self.attributes.chapter,
            title: self.attributes.title.filter(|t| !t.trim().is_empty()),
            published_at: self.attributes.publish_at,
            scanlation_group,
        }
    }
}

impl AtHomeResponse {
    fn page_urls(&self) -> Vec<String> {
        self.chapter
            .data
            .iter()
            .map(|file| format!("{}/data/{}/{}", self.base_url, self.chapter.hash, file))
            .collect()
    }
}
