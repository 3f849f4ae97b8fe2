//! Authenticated HTTP client for the generation backend
//!
//! [`ApiClient`] wraps two `reqwest` clients: one with a total request timeout for JSON
//! calls and downloads, and one bounded only on connect for the long-lived status stream.
//! It implements every external collaborator trait the rest of the crate consumes.

use crate::config::Config;
use crate::error::{ApiError, Error, Result, StreamError};
use crate::stream::{ChunkStream, StatusTransport};
use crate::types::{HistoryEntry, JobId, TitlesByLanguage};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;
use url::Url;

/// Backend endpoint paths
pub mod endpoints {
    /// Liveness check
    pub const HEALTH: &str = "/health";
    /// Candidate title generation
    pub const GENERATE_TITLES: &str = "/generate-titles";
    /// Job submission
    pub const START_GENERATE: &str = "/start-generate";
    /// Status stream, followed by `/{job_id}`
    pub const GENERATE_STATUS: &str = "/generate-status";
    /// Past jobs
    pub const GET_HISTORY: &str = "/get-history";
    /// Zip bundle of all generated files
    pub const DOWNLOAD: &str = "/download";
    /// One generated file
    pub const DOWNLOAD_FILE: &str = "/download-file";
    /// Text translation
    pub const TRANSLATE_TEXT: &str = "/translate-text";
}

/// Produces candidate titles for a book
#[async_trait]
pub trait TitleGenerator: Send + Sync {
    /// Generate candidates in every requested language
    async fn generate_titles(
        &self,
        title: &str,
        table_of_contents: Option<&str>,
        languages: &[String],
    ) -> Result<TitlesByLanguage>;
}

/// Translates one text into several languages
#[async_trait]
pub trait Translator: Send + Sync {
    /// Returns language code → translated text; languages may be missing from the result
    async fn translate(
        &self,
        text: &str,
        from_language: &str,
        to_languages: &[String],
    ) -> Result<BTreeMap<String, String>>;
}

/// Submits a generation job
#[async_trait]
pub trait GenerationStarter: Send + Sync {
    /// Start generating bonuses for the given titles; returns the new job id
    async fn start_generation(
        &self,
        titles_by_language: &TitlesByLanguage,
        book_title: &str,
        table_of_contents: Option<&str>,
        languages: &[String],
    ) -> Result<JobId>;
}

/// Read-only listing of past jobs
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Most recent jobs, newest first, at most `limit`
    async fn history(&self, limit: u32) -> Result<Vec<HistoryEntry>>;
}

#[derive(Serialize)]
struct GenerateTitlesRequest<'a> {
    title: &'a str,
    table_of_contents: Option<&'a str>,
    languages: &'a [String],
}

#[derive(Deserialize)]
struct GenerateTitlesResponse {
    #[serde(default)]
    titles_by_language: TitlesByLanguage,
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    text: &'a str,
    from_language: &'a str,
    to_languages: &'a [String],
}

#[derive(Deserialize)]
struct TranslateResponse {
    #[serde(default)]
    translations: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct StartGenerationRequest<'a> {
    titles_by_language: &'a TitlesByLanguage,
    book_title: &'a str,
    table_of_contents: Option<&'a str>,
    languages: &'a [String],
}

#[derive(Deserialize)]
struct StartGenerationResponse {
    job_id: JobId,
}

#[derive(Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    generations: Vec<HistoryEntry>,
}

/// Shape of a JSON error body
#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<serde_json::Value>,
}

/// Pull `detail`, then `message`, out of a JSON error body
///
/// Non-string values (e.g. validation error lists) are rendered as JSON text.
pub(crate) fn json_error_message(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    [parsed.detail, parsed.message]
        .into_iter()
        .flatten()
        .find_map(|value| match value {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) if s.trim().is_empty() => None,
            serde_json::Value::String(s) => Some(s),
            other => Some(other.to_string()),
        })
}

/// HTTP client for the generation backend
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    stream_http: reqwest::Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a client from configuration
    ///
    /// # Errors
    /// Returns an error if the base URL or token is malformed, or the HTTP client
    /// cannot be created.
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        let base_url = Url::parse(config.api.base_url.trim_end_matches('/'))?;

        let mut headers = HeaderMap::new();
        if let Some(token) = &config.api.token {
            let mut value =
                HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|e| Error::Config {
                    message: format!("token is not a valid header value: {}", e),
                    key: Some("api.token".to_string()),
                })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers.clone())
            .timeout(config.api.request_timeout)
            .connect_timeout(config.api.connect_timeout)
            .user_agent(config.api.user_agent.clone())
            .build()
            .map_err(|e| Error::Config {
                message: format!("failed to create HTTP client: {}", e),
                key: None,
            })?;

        let stream_http = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(config.stream.connect_timeout)
            .user_agent(config.api.user_agent.clone())
            .build()
            .map_err(|e| Error::Config {
                message: format!("failed to create streaming HTTP client: {}", e),
                key: None,
            })?;

        Ok(Self {
            http,
            stream_http,
            base_url,
        })
    }

    /// Base URL requests are resolved against
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute URL of an endpoint path, with query parameters
    pub fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Url {
        let mut url = self.base_url.clone();
        let joined = format!("{}{}", self.base_url.path().trim_end_matches('/'), path);
        url.set_path(&joined);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        url
    }

    /// Issue a GET with the non-streaming client and return the raw response
    ///
    /// Used for binary downloads; the status is left for the caller to classify.
    pub async fn get_raw(&self, path: &str, query: &[(&str, &str)], accept: &str) -> Result<reqwest::Response> {
        let url = self.endpoint(path, query);
        debug!(url = %url, "GET");
        Ok(self.http.get(url).header(ACCEPT, accept).send().await?)
    }

    /// GET a JSON document
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = self.endpoint(path, query);
        debug!(url = %url, "GET");
        let response = self.http.get(url).send().await.map_err(transport_error)?;
        decode_json(response).await
    }

    /// POST a JSON body and decode the JSON answer
    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = self.endpoint(path, &[]);
        debug!(url = %url, "POST");
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        decode_json(response).await
    }

    /// Check that the backend answers
    pub async fn health(&self) -> Result<serde_json::Value> {
        self.get_json(endpoints::HEALTH, &[]).await
    }
}

fn transport_error(e: reqwest::Error) -> Error {
    ApiError::new(0, format!("Network error occurred: {}", e)).into()
}

async fn decode_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await.map_err(transport_error)?;

    if !status.is_success() {
        let message =
            json_error_message(&body).unwrap_or_else(|| crate::user_message::GENERIC_ERROR.to_string());
        return Err(ApiError::new(status.as_u16(), message).into());
    }

    Ok(serde_json::from_str(&body)?)
}

#[async_trait]
impl TitleGenerator for ApiClient {
    async fn generate_titles(
        &self,
        title: &str,
        table_of_contents: Option<&str>,
        languages: &[String],
    ) -> Result<TitlesByLanguage> {
        let response: GenerateTitlesResponse = self
            .post_json(
                endpoints::GENERATE_TITLES,
                &GenerateTitlesRequest {
                    title,
                    table_of_contents,
                    languages,
                },
            )
            .await?;
        Ok(response.titles_by_language)
    }
}

#[async_trait]
impl Translator for ApiClient {
    async fn translate(
        &self,
        text: &str,
        from_language: &str,
        to_languages: &[String],
    ) -> Result<BTreeMap<String, String>> {
        let response: TranslateResponse = self
            .post_json(
                endpoints::TRANSLATE_TEXT,
                &TranslateRequest {
                    text,
                    from_language,
                    to_languages,
                },
            )
            .await?;
        Ok(response.translations)
    }
}

#[async_trait]
impl GenerationStarter for ApiClient {
    async fn start_generation(
        &self,
        titles_by_language: &TitlesByLanguage,
        book_title: &str,
        table_of_contents: Option<&str>,
        languages: &[String],
    ) -> Result<JobId> {
        let response: StartGenerationResponse = self
            .post_json(
                endpoints::START_GENERATE,
                &StartGenerationRequest {
                    titles_by_language,
                    book_title,
                    table_of_contents,
                    languages,
                },
            )
            .await?;
        Ok(response.job_id)
    }
}

#[async_trait]
impl HistorySource for ApiClient {
    async fn history(&self, limit: u32) -> Result<Vec<HistoryEntry>> {
        let limit = limit.to_string();
        let response: HistoryResponse = self
            .get_json(endpoints::GET_HISTORY, &[("limit", limit.as_str())])
            .await?;
        Ok(response.generations)
    }
}

#[async_trait]
impl StatusTransport for ApiClient {
    async fn open(&self, job_id: &JobId) -> std::result::Result<ChunkStream, StreamError> {
        let mut url = self.endpoint(endpoints::GENERATE_STATUS, &[]);
        url.path_segments_mut()
            .map_err(|_| StreamError::Connection {
                status: None,
                message: format!("base URL {} cannot carry a job id", self.base_url),
            })?
            .push(job_id.as_str());
        debug!(url = %url, "Opening status stream");

        let response = self
            .stream_http
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| StreamError::Connection {
                status: None,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::Connection {
                status: Some(status.as_u16()),
                message: format!("HTTP error! status: {}", status.as_u16()),
            });
        }

        let chunks = response.bytes_stream().map(|chunk| {
            chunk.map_err(|e| StreamError::Connection {
                status: None,
                message: e.to_string(),
            })
        });
        Ok(chunks.boxed())
    }
}
