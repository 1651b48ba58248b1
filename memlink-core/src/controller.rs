//! User-facing orchestration
//!
//! The [`Controller`] runs one user action at a time (login, load projects,
//! capture-and-save, query memory) as a short sequence of awaited steps. A
//! failed step stops the sequence. All operations take `&mut self`, so
//! overlapping actions against the same session cannot be issued.
//!
//! ## State machine
//!
//! ```text
//! LoggedOut ──login/register──▶ Authenticating ──ok──▶ LoggedIn
//!     ▲                              │ err                 │
//!     └──────────────────────────────┘                     │
//!     └────────────── logout / AuthRejected ───────────────┘
//! ```
//!
//! On `AuthRejected` the sync client has already cleared the token; the
//! controller then drops its selection and project list so the whole client
//! is consistently logged out by the time the caller sees the error.

use serde_json::Value;

use crate::config::CaptureConfig;
use crate::error::{Error, Result};
use crate::logging::redact_token;
use crate::relay::{RelayChannel, RelayRequest, RelayResponse, TabId};
use crate::session::Session;
use crate::sync::{AuthResponse, SyncClient};
use crate::types::{ContextResult, ControllerState, ConversationRecord, Project};

/// Orchestrates session, sync client and relay for user actions
pub struct Controller {
    session: Session,
    client: SyncClient,
    relay: RelayChannel,
    state: ControllerState,
    projects: Vec<Project>,
    selected_project: Option<i64>,
    min_transcript_chars: usize,
}

impl Controller {
    pub fn new(session: Session, client: SyncClient, relay: RelayChannel) -> Self {
        Self {
            session,
            client,
            relay,
            state: ControllerState::LoggedOut,
            projects: Vec::new(),
            selected_project: None,
            min_transcript_chars: CaptureConfig::default().min_transcript_chars,
        }
    }

    pub fn with_capture_config(mut self, capture: &CaptureConfig) -> Self {
        self.min_transcript_chars = capture.min_transcript_chars;
        self
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn is_logged_in(&self) -> bool {
        self.state == ControllerState::LoggedIn
    }

    /// Projects from the last successful load
    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn selected_project(&self) -> Option<i64> {
        self.selected_project
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Determine the initial state.
    ///
    /// A stored token is checked with a harmless authenticated read (listing
    /// projects). Any failure clears the token and leaves the controller
    /// logged out; nothing is reported to the caller.
    pub async fn startup(&mut self) -> ControllerState {
        let Some(token) = self.session.get_token() else {
            tracing::debug!("No token found in storage");
            self.state = ControllerState::LoggedOut;
            return self.state;
        };

        self.state = ControllerState::Authenticating;
        tracing::debug!(token = %redact_token(&token), "Validating stored token");

        match self.fetch_projects(&token).await {
            Ok(projects) => {
                tracing::info!(projects = projects.len(), "Stored token is valid");
                self.projects = projects;
                self.state = ControllerState::LoggedIn;
            }
            Err(e) => {
                tracing::info!(error = %e, "Stored token failed validation");
                self.demote();
            }
        }
        self.state
    }

    /// Log in with email and password.
    pub async fn login(&mut self, email: &str, password: &str) -> Result<()> {
        self.authenticate(email, password, AuthFlow::Login).await
    }

    /// Create an account and log in with it.
    pub async fn register(&mut self, email: &str, password: &str) -> Result<()> {
        self.authenticate(email, password, AuthFlow::Register).await
    }

    /// Reload the project list.
    ///
    /// Malformed entries are dropped one by one; a response that is not a
    /// list fails the load and keeps the previous list.
    pub async fn load_projects(&mut self) -> Result<&[Project]> {
        let token = self.require_login()?;
        let result = self.fetch_projects(&token).await;
        let projects = self.observe(result)?;

        if let Some(selected) = self.selected_project {
            if !projects.iter().any(|p| p.id == selected) {
                tracing::info!(project_id = selected, "Selected project no longer listed");
                self.selected_project = None;
            }
        }

        tracing::info!(count = projects.len(), "Loaded projects");
        self.projects = projects;
        Ok(&self.projects)
    }

    /// Choose the project that saves and queries apply to.
    pub fn select_project(&mut self, project_id: i64) -> Result<()> {
        if !self.is_logged_in() {
            return Err(Error::validation("Not logged in. Please log in first."));
        }
        if !self.projects.iter().any(|p| p.id == project_id) {
            return Err(Error::validation(format!(
                "Unknown project {project_id}. Load projects and pick one from the list."
            )));
        }
        self.selected_project = Some(project_id);
        Ok(())
    }

    /// Create a project and add it to the loaded list.
    pub async fn create_project(&mut self, name: &str) -> Result<Project> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation("Please enter a project name"));
        }
        let token = self.require_login()?;

        let result = self.client.create_project(&token, name).await;
        let project = self.observe(result)?;
        tracing::info!(project_id = project.id, "Created project");
        self.projects.push(project.clone());
        Ok(project)
    }

    /// Conversations saved in the selected project.
    pub async fn list_conversations(&mut self) -> Result<Vec<ConversationRecord>> {
        let token = self.require_login()?;
        let project_id = self.require_selection()?;

        let result = self.client.list_conversations(&token, project_id).await;
        let value = self.observe(result)?;
        let entries = as_list(value, "conversations")?;

        let conversations = entries
            .into_iter()
            .enumerate()
            .filter_map(|(index, entry)| {
                match serde_json::from_value::<ConversationRecord>(entry) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        tracing::warn!(index, error = %e, "Dropping malformed conversation");
                        None
                    }
                }
            })
            .collect();
        Ok(conversations)
    }

    /// Extract the conversation from the active tab and save it.
    pub async fn capture_and_save(&mut self) -> Result<ConversationRecord> {
        let token = self.require_login()?;
        let project_id = self.require_selection()?;

        let tab_id = self.resolve_active_tab().await?;
        let text = self.extract_from_tab(tab_id).await?;

        let content = text.trim();
        if content.is_empty() {
            return Err(Error::ExtractionEmpty);
        }
        let chars = content.chars().count();
        if chars < self.min_transcript_chars {
            return Err(Error::validation(format!(
                "Conversation too short to save ({chars} characters, need at least {})",
                self.min_transcript_chars
            )));
        }

        let result = self
            .client
            .save_conversation(&token, project_id, content)
            .await;
        let record = self.observe(result)?;
        tracing::info!(project_id, conversation_id = record.id, chars, "Conversation saved");
        Ok(record)
    }

    /// Ask the backend for memory relevant to `query` in the selected project.
    pub async fn query_memory(&mut self, query: &str) -> Result<ContextResult> {
        let token = self.require_login()?;
        let project_id = self.require_selection()?;
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::validation("Please enter a query"));
        }

        let result = self.client.memory_context(&token, project_id, query).await;
        let context = self.observe(result)?;
        tracing::info!(
            project_id,
            total_scanned = context.total_scanned,
            blocks = context.context_blocks.len(),
            "Memory query complete"
        );
        Ok(context)
    }

    /// Forget the session, the selection and the project list. Always succeeds.
    pub fn logout(&mut self) {
        if let Err(e) = self.session.clear_token() {
            tracing::error!(error = %e, "Failed to clear session token on logout");
        }
        self.reset_view();
        tracing::info!("User logged out");
    }

    async fn authenticate(&mut self, email: &str, password: &str, flow: AuthFlow) -> Result<()> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(Error::validation("Please enter email and password"));
        }
        if self.is_logged_in() {
            return Err(Error::validation("Already logged in. Log out first."));
        }

        self.state = ControllerState::Authenticating;
        let result = match flow {
            AuthFlow::Login => self.client.login(email, password).await,
            AuthFlow::Register => self.client.register(email, password).await,
        }
        .map_err(credentials_error);

        match result.and_then(require_access_token) {
            Ok(token) => match self.session.set_token(&token) {
                Ok(()) => {
                    self.state = ControllerState::LoggedIn;
                    tracing::info!(flow = flow.as_str(), "Authentication successful");
                    Ok(())
                }
                Err(e) => {
                    self.state = ControllerState::LoggedOut;
                    Err(e)
                }
            },
            Err(e) => {
                tracing::warn!(flow = flow.as_str(), error = %e, "Authentication failed");
                self.state = ControllerState::LoggedOut;
                Err(e)
            }
        }
    }

    async fn fetch_projects(&self, token: &str) -> Result<Vec<Project>> {
        let value = self.client.list_projects(token).await?;
        let entries = as_list(value, "projects")?;

        Ok(entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| {
                let project = Project::from_value(entry);
                if project.is_none() {
                    tracing::warn!(index, %entry, "Project missing id or name");
                }
                project
            })
            .collect())
    }

    async fn resolve_active_tab(&self) -> Result<TabId> {
        match self.relay.request(RelayRequest::GetActiveTabId).await {
            Ok(RelayResponse::ActiveTab(id)) => Ok(id),
            Ok(RelayResponse::NoActiveTab { error }) | Ok(RelayResponse::Error { error }) => {
                Err(Error::RelayUnavailable(error))
            }
            Ok(other) => Err(Error::RelayUnavailable(format!(
                "unexpected relay response: {other:?}"
            ))),
            Err(e) => Err(Error::RelayUnavailable(e.to_string())),
        }
    }

    async fn extract_from_tab(&self, tab_id: TabId) -> Result<String> {
        match self
            .relay
            .request(RelayRequest::ExtractConversation { tab_id })
            .await
        {
            Ok(RelayResponse::Conversation { text }) => Ok(text),
            Ok(RelayResponse::Error { error }) => {
                tracing::warn!(tab_id = %tab_id, %error, "Could not extract conversation");
                Err(Error::RelayUnavailable(error))
            }
            Ok(other) => Err(Error::RelayUnavailable(format!(
                "unexpected relay response: {other:?}"
            ))),
            Err(e) => Err(Error::RelayUnavailable(e.to_string())),
        }
    }

    fn require_login(&mut self) -> Result<String> {
        if !self.is_logged_in() {
            return Err(Error::validation("Not logged in. Please log in first."));
        }
        match self.session.get_token() {
            Some(token) => Ok(token),
            None => {
                self.demote();
                Err(Error::validation("Not authenticated. Please log in again."))
            }
        }
    }

    fn require_selection(&self) -> Result<i64> {
        self.selected_project
            .ok_or_else(|| Error::validation("Please select a project"))
    }

    /// Pass `result` through, demoting to logged-out on `AuthRejected`.
    fn observe<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_auth_rejected() {
                tracing::info!("Session rejected by backend, logging out");
                self.demote();
            }
        }
        result
    }

    fn demote(&mut self) {
        if let Err(e) = self.session.clear_token() {
            tracing::error!(error = %e, "Failed to clear session token");
        }
        self.reset_view();
    }

    fn reset_view(&mut self) {
        self.state = ControllerState::LoggedOut;
        self.selected_project = None;
        self.projects.clear();
    }
}

#[derive(Debug, Clone, Copy)]
enum AuthFlow {
    Login,
    Register,
}

impl AuthFlow {
    fn as_str(&self) -> &'static str {
        match self {
            AuthFlow::Login => "login",
            AuthFlow::Register => "register",
        }
    }
}

/// A 401 on an unauthenticated login/register call refuses the credentials,
/// it does not mean an existing session expired.
fn credentials_error(error: Error) -> Error {
    match error {
        Error::AuthRejected { message } => Error::LoginRejected { message },
        other => other,
    }
}

fn require_access_token(response: AuthResponse) -> Result<String> {
    match response.access_token {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(Error::MissingAccessToken),
    }
}

fn as_list(value: Value, what: &str) -> Result<Vec<Value>> {
    match value {
        Value::Array(entries) => Ok(entries),
        other => {
            tracing::error!(response = %other, "{} response is not a list", what);
            Err(Error::InvalidResponse(format!("{what} response is not a list")))
        }
    }
}
