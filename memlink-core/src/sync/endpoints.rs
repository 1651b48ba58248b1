//! Typed wrappers for the backend endpoints
//!
//! Listings come back as raw JSON so the controller can drop malformed
//! entries one by one instead of failing the whole load.

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::client::SyncClient;
use crate::error::{Error, Result};
use crate::types::{ContextResult, ConversationRecord, Project};

pub const LOGIN: &str = "/auth/login";
pub const REGISTER: &str = "/auth/register";
pub const PROJECTS: &str = "/projects";
pub const CREATE_PROJECT: &str = "/projects/create";
pub const CONVERSATIONS: &str = "/conversations";
pub const SAVE_CONVERSATION: &str = "/conversations/save";
pub const MEMORY_CONTEXT: &str = "/memory/context";

/// Response from POST /auth/login and /auth/register
#[derive(Debug, Default, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl SyncClient {
    /// POST /auth/login (unauthenticated)
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse> {
        let body = json!({ "email": email, "password": password });
        let value = self.call(LOGIN, Method::POST, Some(&body), None).await?;
        decode(LOGIN, value)
    }

    /// POST /auth/register (unauthenticated)
    pub async fn register(&self, email: &str, password: &str) -> Result<AuthResponse> {
        let body = json!({ "email": email, "password": password });
        let value = self.call(REGISTER, Method::POST, Some(&body), None).await?;
        decode(REGISTER, value)
    }

    /// GET /projects
    pub async fn list_projects(&self, token: &str) -> Result<Value> {
        self.call(PROJECTS, Method::GET, None, Some(token)).await
    }

    /// POST /projects/create
    pub async fn create_project(&self, token: &str, name: &str) -> Result<Project> {
        let body = json!({ "name": name });
        let value = self
            .call(CREATE_PROJECT, Method::POST, Some(&body), Some(token))
            .await?;
        Project::from_value(&value).ok_or_else(|| {
            Error::InvalidResponse(format!("{CREATE_PROJECT} returned no id/name: {value}"))
        })
    }

    /// GET /conversations?project_id={id}
    pub async fn list_conversations(&self, token: &str, project_id: i64) -> Result<Value> {
        let endpoint = format!("{CONVERSATIONS}?project_id={project_id}");
        self.call(&endpoint, Method::GET, None, Some(token)).await
    }

    /// POST /conversations/save
    pub async fn save_conversation(
        &self,
        token: &str,
        project_id: i64,
        raw_content: &str,
    ) -> Result<ConversationRecord> {
        let body = json!({ "project_id": project_id, "raw_content": raw_content });
        let value = self
            .call(SAVE_CONVERSATION, Method::POST, Some(&body), Some(token))
            .await?;
        decode(SAVE_CONVERSATION, value)
    }

    /// POST /memory/context
    pub async fn memory_context(
        &self,
        token: &str,
        project_id: i64,
        query: &str,
    ) -> Result<ContextResult> {
        let body = json!({ "project_id": project_id, "query": query });
        let value = self
            .call(MEMORY_CONTEXT, Method::POST, Some(&body), Some(token))
            .await?;
        decode(MEMORY_CONTEXT, value)
    }
}

fn decode<T: DeserializeOwned>(endpoint: &str, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| Error::InvalidResponse(format!("unexpected {endpoint} response: {e}")))
}
