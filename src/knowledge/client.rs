use std::time::Duration;

use axum::{
    body::Bytes,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use reqwest::{multipart, Method, Url};
use serde_json::Value;

use crate::error::{AppError, Result};

pub const SERVICE_NOT_RUNNING: &str =
    "Knowledge base service is not running. Please start the knowledge base service first.";
pub const INVALID_RESPONSE: &str = "Invalid response from service";

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
const HEALTH_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const REQUEST_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

enum Payload {
    Empty,
    File(UploadedFile),
}

/// Upstream JSON passed back to the caller with the upstream status code.
#[derive(Debug)]
pub struct Relayed {
    pub status: StatusCode,
    pub body: Value,
}

impl IntoResponse for Relayed {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// HTTP client for the document-indexing service. Each call checks liveness
/// first and never retries.
#[derive(Clone)]
pub struct KnowledgeClient {
    base_url: Url,
    health: reqwest::Client,
    http: reqwest::Client,
}

impl KnowledgeClient {
    pub fn new(base_url: Url) -> reqwest::Result<Self> {
        let health = reqwest::Client::builder()
            .timeout(HEALTH_TIMEOUT)
            .connect_timeout(HEALTH_CONNECT_TIMEOUT)
            .build()?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(REQUEST_CONNECT_TIMEOUT)
            .build()?;

        Ok(KnowledgeClient {
            base_url,
            health,
            http,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::Internal(format!("unusable service url {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub async fn is_running(&self) -> bool {
        let Ok(url) = self.endpoint(&["api", "health"]) else {
            return false;
        };

        match self.health.get(url).send().await {
            Ok(res) => res.status() == reqwest::StatusCode::OK,
            Err(e) => {
                tracing::debug!("knowledge service health check failed: {}", e);
                false
            }
        }
    }

    pub async fn list_files(&self) -> Result<Relayed> {
        let url = self.endpoint(&["api", "files"])?;
        self.forward(Method::GET, url, Payload::Empty).await
    }

    pub async fn upload(&self, file: UploadedFile) -> Result<Relayed> {
        let url = self.endpoint(&["api", "upload"])?;
        self.forward(Method::POST, url, Payload::File(file)).await
    }

    pub async fn delete_file(&self, file_id: &str) -> Result<Relayed> {
        let url = self.endpoint(&["api", "files", file_id])?;
        self.forward(Method::DELETE, url, Payload::Empty).await
    }

    pub async fn rename_file(&self, file_id: &str, new_name: &str) -> Result<Relayed> {
        let mut url = self.endpoint(&["api", "files", file_id, "rename"])?;
        url.query_pairs_mut().append_pair("new_name", new_name);
        self.forward(Method::PUT, url, Payload::Empty).await
    }

    pub async fn search(&self, query: &str, limit: i64) -> Result<Relayed> {
        let url = self.query_endpoint("search", query, limit)?;
        self.forward(Method::GET, url, Payload::Empty).await
    }

    pub async fn context(&self, query: &str, limit: i64) -> Result<Relayed> {
        let url = self.query_endpoint("context", query, limit)?;
        self.forward(Method::GET, url, Payload::Empty).await
    }

    fn query_endpoint(&self, endpoint: &str, query: &str, limit: i64) -> Result<Url> {
        let mut url = self.endpoint(&["api", endpoint])?;
        url.query_pairs_mut()
            .append_pair("query", query)
            .append_pair("limit", &limit.to_string());
        Ok(url)
    }

    async fn forward(&self, method: Method, url: Url, payload: Payload) -> Result<Relayed> {
        if !self.is_running().await {
            return Err(AppError::ServiceUnavailable(SERVICE_NOT_RUNNING.to_string()));
        }

        tracing::debug!("forwarding {} {}", method, url.path());

        let mut request = self.http.request(method, url);
        if let Payload::File(file) = payload {
            let mut part = multipart::Part::bytes(file.data.to_vec()).file_name(file.file_name);
            if let Some(content_type) = file.content_type {
                part = part
                    .mime_str(&content_type)
                    .map_err(|e| AppError::BadRequest(format!("Invalid content type: {}", e)))?;
            }
            request = request.multipart(multipart::Form::new().part("file", part));
        }

        let res = request.send().await.map_err(connect_error)?;
        let status =
            StatusCode::from_u16(res.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        let text = res.text().await.map_err(connect_error)?;

        let body = serde_json::from_str::<Value>(&text).map_err(|e| {
            tracing::warn!("knowledge service returned non-JSON body: {}", e);
            AppError::Upstream(INVALID_RESPONSE.to_string())
        })?;

        Ok(Relayed { status, body })
    }
}

fn connect_error(err: reqwest::Error) -> AppError {
    AppError::ServiceUnavailable(format!(
        "Failed to connect to knowledge base service: {}",
        err
    ))
}
