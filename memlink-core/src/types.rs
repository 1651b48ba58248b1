//! Core domain types for memlink
//!
//! Everything here except [`ControllerState`] is pass-through data: the
//! client never stores projects, conversations, or transcripts of record.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Project** | Backend-owned bucket that conversations are saved into |
//! | **Turn** | One role-tagged message rendered on the conversation page |
//! | **Transcript** | Ordered turns extracted fresh from a page on each request |
//! | **ConversationRecord** | A saved transcript as the backend returns it |
//! | **ContextResult** | Ranked memory blocks returned for a query |

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================
// Transcript
// ============================================

/// Who authored a turn on the conversation page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Attribute value used by the page schema
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Heading used in the saved transcript text
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Assistant => "ASSISTANT",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            _ => Err(format!("unknown role: {}", s)),
        }
    }
}

/// A single non-empty message in a transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    /// Trimmed rendered text; never empty
    pub text: String,
}

/// Ordered sequence of turns, in document order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub turns: Vec<Turn>,
}

impl Transcript {
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Plain-text form submitted as `raw_content`.
    ///
    /// Each turn becomes `ROLE:\n{text}\n`; turns are separated by a blank line.
    pub fn render(&self) -> String {
        self.turns
            .iter()
            .map(|turn| format!("{}:\n{}\n", turn.role.label(), turn.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ============================================
// Backend records
// ============================================

/// A project as listed by the backend. Ids are never assigned client-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
}

impl Project {
    /// Parse one entry of a project listing.
    ///
    /// Returns `None` for null entries, entries without an integer `id`, and
    /// entries with a missing or empty `name`.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        let id = value.get("id")?.as_i64()?;
        let name = value.get("name")?.as_str()?;
        if name.trim().is_empty() {
            return None;
        }
        Some(Project {
            id,
            name: name.to_string(),
        })
    }
}

/// A saved conversation (server-owned, read-only here)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: i64,
    pub created_at: String,
    #[serde(default)]
    pub raw_content: String,
}

impl ConversationRecord {
    /// `created_at` as UTC, accepting RFC 3339 or naive ISO timestamps.
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.created_at)
    }
}

/// Result of a memory-context query; display only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextResult {
    #[serde(default)]
    pub project_id: Option<i64>,
    #[serde(default)]
    pub query: Option<String>,
    pub total_scanned: u64,
    pub context_blocks: Vec<ContextBlock>,
}

/// One ranked block of remembered content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextBlock {
    pub score: f64,
    pub raw_content: String,
    #[serde(default)]
    pub conversation_id: Option<i64>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl ContextBlock {
    /// First `max_chars` characters of the content.
    pub fn preview(&self, max_chars: usize) -> &str {
        match self.raw_content.char_indices().nth(max_chars) {
            Some((idx, _)) => &self.raw_content[..idx],
            None => &self.raw_content,
        }
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

// ============================================
// Controller state
// ============================================

/// Authentication state of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerState {
    #[default]
    LoggedOut,
    Authenticating,
    LoggedIn,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ControllerState::LoggedOut => "logged out",
            ControllerState::Authenticating => "authenticating",
            ControllerState::LoggedIn => "logged in",
        };
        f.write_str(s)
    }
}
