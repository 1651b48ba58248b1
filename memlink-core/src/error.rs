//! Error types for memlink-core

use thiserror::Error;

/// Main error type for the memlink-core library
#[derive(Error, Debug)]
pub enum Error {
    /// A local precondition failed; never reaches the network
    #[error("{0}")]
    Validation(String),

    /// Backend answered 401; the stored session has already been cleared
    #[error("authentication rejected: {message}")]
    AuthRejected { message: String },

    /// Any other non-2xx response from the backend
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Transport failed before a status was received
    #[error("network error: {0}")]
    Network(String),

    /// A 2xx response whose body is not valid JSON or has the wrong shape
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Login/register credentials refused by the backend (401)
    #[error("login rejected: {message}")]
    LoginRejected { message: String },

    /// Login/register succeeded at the HTTP level but carried no token
    #[error("no access token in response")]
    MissingAccessToken,

    /// The page was reachable but yielded no conversation
    #[error("no conversation found on the page")]
    ExtractionEmpty,

    /// No tab, no responding content service, or the relay is gone
    #[error("relay unavailable: {0}")]
    RelayUnavailable(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Shorthand for [`Error::Validation`]
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    /// True for errors that mean the session is gone.
    pub fn is_auth_rejected(&self) -> bool {
        matches!(self, Error::AuthRejected { .. })
    }

    /// Message suitable for showing to the person at the keyboard.
    pub fn user_message(&self) -> String {
        match self {
            Error::Validation(message) => message.clone(),
            Error::AuthRejected { message } => {
                format!("Session expired or rejected ({message}). Please log in again.")
            }
            Error::LoginRejected { message } => format!("Login failed: {message}"),
            Error::Http { message, .. } => message.clone(),
            Error::Network(_) => "Could not reach the memory server. Check your connection.".into(),
            Error::MissingAccessToken => "Login failed: no access token in response".into(),
            Error::ExtractionEmpty | Error::RelayUnavailable(_) => {
                "Could not extract conversation. Are you on the right page?".into()
            }
            other => other.to_string(),
        }
    }
}

/// Result type alias for memlink-core
pub type Result<T> = std::result::Result<T, Error>;
