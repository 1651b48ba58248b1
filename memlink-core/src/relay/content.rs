//! Content service living inside a page tab
//!
//! Answers `EXTRACT_CONVERSATION` by loading a fresh snapshot of the page and
//! running the [`Extractor`] over it.

use std::sync::Arc;

use tokio::task::JoinHandle;

use super::channel::{channel, spawn_service, MAILBOX_BUFFER};
use super::message::{TabRequest, TabResponse};
use super::tabs::TabChannel;
use crate::extract::{Extractor, PageSource};

/// In-tab responder for extraction requests
#[derive(Clone)]
pub struct ContentService {
    source: Arc<dyn PageSource>,
    extractor: Extractor,
}

impl ContentService {
    pub fn new(source: Arc<dyn PageSource>) -> Self {
        Self {
            source,
            extractor: Extractor::new(),
        }
    }

    /// Answer one request. An empty transcript is answered with empty text.
    pub fn handle(&self, request: TabRequest) -> TabResponse {
        match request {
            TabRequest::ExtractConversation => match self.extractor.extract_from(self.source.as_ref()) {
                Ok(transcript) => {
                    let text = transcript.render();
                    tracing::info!(
                        page = %self.source.describe(),
                        turns = transcript.len(),
                        chars = text.len(),
                        "Extracted conversation"
                    );
                    TabResponse::text(text)
                }
                Err(e) => {
                    tracing::error!(page = %self.source.describe(), error = %e, "Extract conversation error");
                    TabResponse {
                        text: String::new(),
                        error: Some(e.to_string()),
                    }
                }
            },
        }
    }

    /// Run the service and return the channel a tab host should register.
    pub fn spawn(self) -> (TabChannel, JoinHandle<()>) {
        let (chan, mailbox) = channel(MAILBOX_BUFFER);
        let service = Arc::new(self);
        let handle = spawn_service(mailbox, move |request: TabRequest| {
            let service = Arc::clone(&service);
            async move { service.handle(request) }
        });
        (chan, handle)
    }
}
