//! HTTP client for the memory backend
//!
//! Every outbound request goes through [`SyncClient::call`], which attaches
//! headers, validates that the body is JSON, and normalizes failures into
//! [`Error::AuthRejected`], [`Error::Http`] or [`Error::Network`].

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde_json::Value;

use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::session::Session;

/// HTTP client for the memory backend
#[derive(Debug, Clone)]
pub struct SyncClient {
    http_client: reqwest::Client,
    base_url: String,
    session: Session,
}

impl SyncClient {
    /// Create a new client from configuration.
    ///
    /// The session is used only to invalidate the token on a 401; callers
    /// decide which calls carry a token.
    pub fn new(config: &BackendConfig, session: Session) -> Result<Self> {
        config.validate()?;

        let base_url = config.base_url.trim().trim_end_matches('/').to_string();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Send one request and return the parsed JSON body.
    ///
    /// `endpoint` is a path such as `/projects`. The `Authorization` header is
    /// attached only when `token` is given. A 401 clears the session before
    /// the error is returned.
    pub async fn call(
        &self,
        endpoint: &str,
        method: Method,
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<Value> {
        let url = format!("{}{}", self.base_url, endpoint);
        tracing::debug!(%method, %url, authenticated = token.is_some(), "Calling backend");

        let mut request = self.http_client.request(method.clone(), &url);
        if let Some(token) = token {
            let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| Error::validation(format!("invalid token: {}", e)))?;
            request = request.header(AUTHORIZATION, auth_value);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!(%method, %url, error = %e, "Backend request failed");
            Error::Network(e.to_string())
        })?;

        let status = response.status();

        if status.is_success() {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| Error::Network(format!("failed to read response: {}", e)))?;
            return serde_json::from_slice(&bytes).map_err(|e| {
                Error::InvalidResponse(format!("{} {} returned non-JSON body: {}", method, endpoint, e))
            });
        }

        let body = response.text().await.ok();
        let message = error_message(status, body.as_deref());

        if status == StatusCode::UNAUTHORIZED {
            if let Err(e) = self.session.clear_token() {
                tracing::error!(error = %e, "Failed to clear session after 401");
            }
            tracing::info!(%url, "Session cleared after 401");
            return Err(Error::AuthRejected { message });
        }

        tracing::warn!(%url, status = status.as_u16(), %message, "Backend returned error");
        Err(Error::Http {
            status: status.as_u16(),
            message,
        })
    }
}

/// Best-effort human message for a failed response. Never empty.
///
/// Tries a JSON `message` or `detail` field, then the raw body text, then
/// `HTTP {status}`.
pub fn error_message(status: StatusCode, body: Option<&str>) -> String {
    let fallback = || format!("HTTP {}", status.as_u16());

    let Some(text) = body.map(str::trim).filter(|t| !t.is_empty()) else {
        return fallback();
    };

    if let Ok(json) = serde_json::from_str::<Value>(text) {
        for field in ["message", "detail"] {
            match json.get(field) {
                Some(Value::String(s)) if !s.trim().is_empty() => return s.trim().to_string(),
                Some(Value::String(_)) | Some(Value::Null) | None => {}
                Some(other) => return other.to_string(),
            }
        }
    }

    text.to_string()
}
