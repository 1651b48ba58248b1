//! Transcript extraction from the conversation page
//!
//! ## Design Principles
//!
//! 1. **Pull only**: extraction runs when asked and never pushes data
//! 2. **Order preserving**: turns follow document order
//! 3. **Per-node isolation**: a bad node is skipped with a warning; the scan
//!    continues with the next node
//! 4. **Fail closed**: a page that does not match the schema yields an empty
//!    transcript, which is a normal outcome rather than an error

mod page;

pub use page::{
    inner_text, rendered_text, ConversationPage, HtmlFile, HtmlPage, MessageNode, PageSource,
    StaticHtml, ROLE_ATTRIBUTE,
};

use crate::error::Result;
use crate::types::{Role, Transcript, Turn};

/// Result of scanning a page
#[derive(Debug, Default)]
pub struct Extraction {
    pub transcript: Transcript,
    /// Nodes that were skipped, one line each (non-fatal)
    pub warnings: Vec<String>,
}

/// Turns message nodes into a [`Transcript`]
#[derive(Debug, Clone, Copy, Default)]
pub struct Extractor;

impl Extractor {
    pub fn new() -> Self {
        Self
    }

    /// Scan `page` and build a fresh transcript.
    pub fn extract(&self, page: &(impl ConversationPage + ?Sized)) -> Extraction {
        let nodes = page.message_nodes();
        let mut extraction = Extraction::default();

        if nodes.is_empty() {
            tracing::warn!("No message elements found on page");
            return extraction;
        }

        for (index, node) in nodes.into_iter().enumerate() {
            match turn_from_node(node) {
                Ok(turn) => extraction.transcript.turns.push(turn),
                Err(reason) => {
                    tracing::warn!(index, %reason, "Skipping message node");
                    extraction.warnings.push(format!("node {index}: {reason}"));
                }
            }
        }

        if extraction.transcript.is_empty() {
            tracing::warn!(skipped = extraction.warnings.len(), "No valid messages extracted");
        } else {
            tracing::debug!(
                turns = extraction.transcript.len(),
                skipped = extraction.warnings.len(),
                "Extracted conversation"
            );
        }

        extraction
    }

    /// Load a fresh snapshot from `source` and extract it.
    pub fn extract_from(&self, source: &dyn PageSource) -> Result<Transcript> {
        let page = source.load()?;
        Ok(self.extract(&page).transcript)
    }
}

fn turn_from_node(node: MessageNode) -> std::result::Result<Turn, String> {
    let raw_role = node.role.ok_or_else(|| "missing role attribute".to_string())?;
    let role: Role = raw_role.parse()?;

    let text = node.text.trim();
    if text.is_empty() {
        return Err(format!("empty text for {} message", role.as_str()));
    }

    Ok(Turn {
        role,
        text: text.to_string(),
    })
}
