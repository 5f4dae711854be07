//! HTTP client for the school backend.
//!
//! Every call goes through [`ApiClient::send`]: bearer token from the
//! session, a request id for log correlation, and a typed decode of the
//! response body so aggregation code only ever sees well-formed records.

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::error::{extract_message, ApiError};
use crate::config::ApiSection;
use crate::session::Session;

/// Endpoints where a 401 means "wrong credentials" rather than an expired
/// session.
const AUTH_ENDPOINTS: [&str; 2] = ["/api/auth/login", "/api/auth/register"];

pub type Query<'a> = [(&'a str, String)];

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(config: &ApiSection, session: Option<&Session>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ApiError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: session.map(|s| s.token.clone()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R, ApiError> {
        self.send(Method::GET, path, &[], None::<&()>).await
    }

    pub async fn get_with<R: DeserializeOwned>(
        &self,
        path: &str,
        query: &Query<'_>,
    ) -> Result<R, ApiError> {
        self.send(Method::GET, path, query, None::<&()>).await
    }

    pub async fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, ApiError> {
        self.send(Method::POST, path, &[], Some(body)).await
    }

    pub async fn put<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, ApiError> {
        self.send(Method::PUT, path, &[], Some(body)).await
    }

    pub async fn delete<R: DeserializeOwned>(&self, path: &str) -> Result<R, ApiError> {
        self.send(Method::DELETE, path, &[], None::<&()>).await
    }

    #[instrument(skip(self, query, body), fields(request_id = tracing::field::Empty))]
    pub async fn send<B: Serialize, R: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &Query<'_>,
        body: Option<&B>,
    ) -> Result<R, ApiError> {
        let request_id = Uuid::new_v4();
        tracing::Span::current().record("request_id", tracing::field::display(request_id));

        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .http
            .request(method.clone(), &url)
            .header("X-Request-Id", request_id.to_string());
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        debug!(%method, url = %url, "sending request");
        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| self.transport_error(e))?;
        debug!(status = status.as_u16(), bytes = text.len(), "response received");

        if !status.is_success() {
            return Err(Self::status_error(path, status, &text));
        }

        decode(path, &text)
    }

    fn transport_error(&self, source: reqwest::Error) -> ApiError {
        if source.is_connect() {
            warn!(base_url = %self.base_url, "backend unreachable");
            ApiError::Unreachable {
                base_url: self.base_url.clone(),
                source,
            }
        } else {
            ApiError::Transport(source)
        }
    }

    fn status_error(path: &str, status: StatusCode, body: &str) -> ApiError {
        let message = extract_message(status, body);
        if status == StatusCode::UNAUTHORIZED {
            if AUTH_ENDPOINTS.iter().any(|endpoint| path.starts_with(endpoint)) {
                return ApiError::InvalidCredentials(message);
            }
            warn!(path, "session rejected by backend");
            return ApiError::SessionExpired;
        }
        ApiError::Server {
            status: status.as_u16(),
            message,
        }
    }
}

fn decode<R: DeserializeOwned>(path: &str, text: &str) -> Result<R, ApiError> {
    let text = if text.trim().is_empty() { "null" } else { text };
    serde_json::from_str(text).map_err(|source| ApiError::Decode {
        path: path.to_string(),
        source,
    })
}
