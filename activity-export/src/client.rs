use std::sync::Arc;

use base64::Engine;
use reqwest::{header, Client, StatusCode};
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::error::{ConfigError, FetchError};

/// The shape of a response body, decided once at the HTTP boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    List(Vec<Value>),
    Object(Map<String, Value>),
    Empty,
}

impl Payload {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Array(items) => Payload::List(items),
            Value::Object(map) => Payload::Object(map),
            Value::Null => Payload::Empty,
            other => {
                debug!("Discarding scalar response body: {other}");
                Payload::Empty
            }
        }
    }

    /// Treat the payload as a list of records. A single object becomes a
    /// one-item list.
    pub fn into_items(self) -> Vec<Value> {
        match self {
            Payload::List(items) => items,
            Payload::Object(map) => vec![Value::Object(map)],
            Payload::Empty => Vec::new(),
        }
    }

    pub fn into_object(self) -> Option<Map<String, Value>> {
        match self {
            Payload::Object(map) => Some(map),
            _ => None,
        }
    }
}

/// Shared, read-only handle on the upstream API. One connection pool for
/// the whole run, with a cap on in-flight requests.
pub struct ApiClient {
    client: Client,
    base: String,
    per_page: u32,
    permits: Arc<Semaphore>,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let mut token = header::HeaderValue::from_str(config.access_token.as_str())?;
        token.set_sensitive(true);

        let mut headers = header::HeaderMap::new();
        headers.insert("private-token", token);
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .user_agent(concat!("activity-export/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout.0)
            .build()?;

        Ok(Self {
            client,
            base: config.api_base().to_owned(),
            per_page: config.per_page.max(1),
            permits: Arc::new(Semaphore::new(config.max_concurrent_requests.max(1))),
        })
    }

    /// Absolute URL for an API path such as `/projects/1/pipelines`.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    pub async fn try_get(&self, url: &str) -> Result<Payload, FetchError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .expect("semaphore has been closed");

        metrics::counter!("activity_export_requests_total").increment(1);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_owned(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_owned(),
                status: status.as_u16(),
            });
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|source| FetchError::Body {
                url: url.to_owned(),
                source,
            })?;

        Ok(Payload::from_value(body))
    }

    /// Fetch a single resource. Failures are logged and read as "no data".
    pub async fn get(&self, url: &str) -> Payload {
        match self.try_get(url).await {
            Ok(payload) => payload,
            Err(e) => {
                metrics::counter!("activity_export_request_failures_total").increment(1);
                error!("Request failed: {e}");
                Payload::Empty
            }
        }
    }

    /// Contents of `path` at `git_ref`, or `None` when the file doesn't exist
    /// there or can't be decoded.
    pub async fn file_content(&self, project_id: i64, path: &str, git_ref: &str) -> Option<String> {
        let url = self.url(&format!(
            "/projects/{project_id}/repository/files/{}?ref={git_ref}",
            urlencoding::encode(path)
        ));

        let map = match self.try_get(&url).await {
            Ok(payload) => payload.into_object()?,
            Err(FetchError::Status { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                debug!("{path} does not exist at {git_ref} in project {project_id}");
                return None;
            }
            Err(e) => {
                metrics::counter!("activity_export_request_failures_total").increment(1);
                error!("Request failed: {e}");
                return None;
            }
        };

        let encoded = map.get("content").and_then(Value::as_str)?;
        let cleaned: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();

        let bytes = match base64::engine::general_purpose::STANDARD.decode(cleaned) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Content of {path} at {git_ref} is not valid base64: {e}");
                return None;
            }
        };

        match String::from_utf8(bytes) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!("Content of {path} at {git_ref} is not valid utf-8: {e}");
                None
            }
        }
    }
}
