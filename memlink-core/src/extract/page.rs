//! Page model for the conversation page
//!
//! The extractor never touches HTML directly; it reads [`MessageNode`]s from a
//! [`ConversationPage`]. [`HtmlPage`] provides them from an HTML snapshot.

use std::path::PathBuf;

use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};

use crate::error::{Error, Result};

/// Attribute carrying the author role of a message node
pub const ROLE_ATTRIBUTE: &str = "data-message-author-role";

/// Elements whose content is never rendered
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "head"];

/// Elements that start on their own line when rendered
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "dd", "details", "div", "dl", "dt",
    "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6",
    "header", "hr", "li", "main", "nav", "ol", "p", "pre", "section", "summary", "table",
    "tbody", "thead", "tfoot", "tr", "ul",
];

/// Table cells; cells of one row are separated by a tab
const TABLE_CELLS: &[&str] = &["td", "th"];

/// A candidate message node as found on the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageNode {
    /// Raw role attribute value; `None` when missing or blank
    pub role: Option<String>,
    /// Rendered text, untrimmed
    pub text: String,
}

/// Anything that can list message nodes in document order
pub trait ConversationPage {
    fn message_nodes(&self) -> Vec<MessageNode>;
}

impl ConversationPage for [MessageNode] {
    fn message_nodes(&self) -> Vec<MessageNode> {
        self.to_vec()
    }
}

/// Parsed HTML snapshot of a conversation page
pub struct HtmlPage {
    document: Html,
}

impl HtmlPage {
    pub fn parse(html: &str) -> Self {
        Self {
            document: Html::parse_document(html),
        }
    }
}

impl ConversationPage for HtmlPage {
    fn message_nodes(&self) -> Vec<MessageNode> {
        let selector = match Selector::parse(&format!("[{ROLE_ATTRIBUTE}]")) {
            Ok(selector) => selector,
            Err(e) => {
                tracing::error!(error = %e, "Invalid message selector");
                return Vec::new();
            }
        };

        self.document
            .select(&selector)
            .map(|element| MessageNode {
                role: element
                    .value()
                    .attr(ROLE_ATTRIBUTE)
                    .map(str::trim)
                    .filter(|role| !role.is_empty())
                    .map(str::to_string),
                text: rendered_text(element),
            })
            .collect()
    }
}

/// Where a page snapshot comes from. Loaded fresh for every extraction.
pub trait PageSource: Send + Sync {
    fn load(&self) -> Result<HtmlPage>;

    /// Short label for logs
    fn describe(&self) -> String;
}

/// Page snapshot read from an HTML file on each load
#[derive(Debug, Clone)]
pub struct HtmlFile {
    path: PathBuf,
}

impl HtmlFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PageSource for HtmlFile {
    fn load(&self) -> Result<HtmlPage> {
        let html = std::fs::read_to_string(&self.path).map_err(|e| {
            Error::RelayUnavailable(format!("cannot read page {}: {}", self.path.display(), e))
        })?;
        Ok(HtmlPage::parse(&html))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Page snapshot held in memory
#[derive(Debug, Clone)]
pub struct StaticHtml {
    html: String,
}

impl StaticHtml {
    pub fn new(html: impl Into<String>) -> Self {
        Self { html: html.into() }
    }
}

impl PageSource for StaticHtml {
    fn load(&self) -> Result<HtmlPage> {
        Ok(HtmlPage::parse(&self.html))
    }

    fn describe(&self) -> String {
        format!("<inline html, {} bytes>", self.html.len())
    }
}

/// Rendered text of an element, preferring the visual rendering over raw text.
///
/// Falls back to the concatenated text content when nothing renders.
pub fn rendered_text(element: ElementRef<'_>) -> String {
    let rendered = inner_text(element);
    if !rendered.trim().is_empty() {
        return rendered;
    }
    element.text().collect()
}

/// Approximation of the browser's `innerText`.
///
/// Collapses whitespace outside `<pre>`, turns `<br>` and block boundaries
/// into line breaks, and skips hidden elements.
pub fn inner_text(element: ElementRef<'_>) -> String {
    let mut out = TextBuffer::default();
    render_children(element, false, &mut out);
    out.finish()
}

fn render_children(element: ElementRef<'_>, in_pre: bool, out: &mut TextBuffer) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                if in_pre {
                    out.push_raw(text);
                } else {
                    out.push_collapsed(text);
                }
            }
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    render_element(child, in_pre, out);
                }
            }
            _ => {}
        }
    }
}

fn render_element(element: ElementRef<'_>, in_pre: bool, out: &mut TextBuffer) {
    let name = element.value().name();
    if HIDDEN_ELEMENTS.contains(&name) || element.value().attr("hidden").is_some() {
        return;
    }
    if name == "br" {
        out.line_break();
        return;
    }

    if TABLE_CELLS.contains(&name) {
        out.cell_break();
    }

    let block = BLOCK_ELEMENTS.contains(&name);
    if block {
        out.line_break();
    }
    render_children(element, in_pre || name == "pre", out);
    if block {
        out.line_break();
    }
}

#[derive(Default)]
struct TextBuffer {
    text: String,
}

impl TextBuffer {
    fn push_collapsed(&mut self, s: &str) {
        for ch in s.chars() {
            if ch.is_whitespace() {
                if !self.text.is_empty() && !self.text.ends_with([' ', '\n', '\t']) {
                    self.text.push(' ');
                }
            } else {
                self.text.push(ch);
            }
        }
    }

    fn push_raw(&mut self, s: &str) {
        self.text.push_str(s);
    }

    /// Separate a table cell from the previous cell of the same row.
    fn cell_break(&mut self) {
        while self.text.ends_with(' ') {
            self.text.pop();
        }
        if !self.text.is_empty() && !self.text.ends_with(['\n', '\t']) {
            self.text.push('\t');
        }
    }

    fn line_break(&mut self) {
        while self.text.ends_with(' ') {
            self.text.pop();
        }
        if !self.text.is_empty() && !self.text.ends_with('\n') {
            self.text.push('\n');
        }
    }

    fn finish(self) -> String {
        self.text
            .lines()
            .map(str::trim_end)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
