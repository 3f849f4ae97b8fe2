//! Mock generation backend built on wiremock

use bookgen_client::{ApiClient, Config};
use serde_json::{Value, json};
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Bearer token every mocked endpoint requires
pub const TOKEN: &str = "integration-token";

/// A wiremock server answering like the generation backend
pub struct MockBackend {
    /// Underlying server, for ad-hoc mocks and request inspection
    pub server: MockServer,
}

impl MockBackend {
    /// Start an empty backend
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Configuration pointing at this backend, with millisecond retry delays
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.api.base_url = self.server.uri();
        config.api.token = Some(TOKEN.to_string());
        config.download.base_interval = Duration::from_millis(10);
        config
    }

    /// API client for this backend
    pub fn client(&self) -> ApiClient {
        ApiClient::new(&self.config()).expect("Failed to create API client")
    }

    /// `POST /generate-titles` answers with `titles`
    pub async fn mount_titles(&self, titles: Value) {
        Mock::given(method("POST"))
            .and(path("/generate-titles"))
            .and(header("authorization", format!("Bearer {}", TOKEN).as_str()))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "titles_by_language": titles })),
            )
            .mount(&self.server)
            .await;
    }

    /// `POST /translate-text` answers with `translations`
    pub async fn mount_translations(&self, translations: Value) {
        Mock::given(method("POST"))
            .and(path("/translate-text"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "translations": translations })),
            )
            .mount(&self.server)
            .await;
    }

    /// `POST /start-generate` answers with `job_id`
    pub async fn mount_start(&self, job_id: &str) {
        Mock::given(method("POST"))
            .and(path("/start-generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "job_id": job_id })))
            .expect(1)
            .mount(&self.server)
            .await;
    }

    /// `GET /generate-status/{job_id}` streams `body` as server-sent events
    pub async fn mount_status(&self, job_id: &str, body: String) {
        Mock::given(method("GET"))
            .and(path(format!("/generate-status/{}", job_id)))
            .and(header("accept", "text/event-stream"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&self.server)
            .await;
    }

    /// `GET /download` fails with 500 `failures` times, then serves `bytes`
    pub async fn mount_flaky_bundle(&self, job_id: &str, failures: u64, bytes: &[u8]) {
        if failures > 0 {
            Mock::given(method("GET"))
                .and(path("/download"))
                .and(query_param("job_id", job_id))
                .respond_with(ResponseTemplate::new(500))
                .up_to_n_times(failures)
                .expect(failures)
                .mount(&self.server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/download"))
            .and(query_param("job_id", job_id))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes.to_vec()))
            .mount(&self.server)
            .await;
    }
}

/// Server-sent event body with one `data:` frame per value
pub fn sse_body(frames: &[Value]) -> String {
    frames
        .iter()
        .map(|frame| format!("data: {}\n\n", frame))
        .collect()
}

/// Progress frame for a running job
pub fn running(completed: u64, total: u64) -> Value {
    json!({
        "status": "running",
        "completed": completed,
        "total": total,
        "remaining": total - completed,
    })
}

/// Completed frame listing `titles` as results
pub fn completed(titles: &[&str]) -> Value {
    let results: serde_json::Map<String, Value> = titles
        .iter()
        .map(|title| (title.to_string(), json!({ "pdf": true, "docx": true })))
        .collect();
    json!({
        "status": "completed",
        "completed": titles.len(),
        "total": titles.len(),
        "remaining": 0,
        "results": results,
    })
}
