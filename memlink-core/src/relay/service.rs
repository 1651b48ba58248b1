//! The relay: a stateless broker between the controller and page tabs

use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinHandle;

use super::channel::{channel, spawn_service, Channel, MAILBOX_BUFFER};
use super::message::{RelayRequest, RelayResponse, TabId, TabRequest};
use super::tabs::TabHost;

/// Channel the controller uses to reach the relay
pub type RelayChannel = Channel<RelayRequest, RelayResponse>;

/// Stateless message dispatcher.
///
/// Every request is answered from the data it carries plus a fresh query of
/// the [`TabHost`]; nothing about tabs is remembered between requests.
#[derive(Clone)]
pub struct Relay {
    host: Arc<dyn TabHost>,
}

impl Relay {
    pub fn new(host: Arc<dyn TabHost>) -> Self {
        Self { host }
    }

    /// Answer one request. Never fails; faults become error responses.
    pub async fn handle(&self, request: RelayRequest) -> RelayResponse {
        tracing::debug!(message_type = request.kind(), "Relay received request");
        match request {
            RelayRequest::GetActiveTabId => self.active_tab_id(),
            RelayRequest::Ping => RelayResponse::Alive,
            RelayRequest::ExtractConversation { tab_id } => self.forward_extract(tab_id).await,
        }
    }

    /// Answer a raw `{type, ...}` message from a foreign context.
    pub async fn dispatch_value(&self, raw: Value) -> Value {
        match RelayRequest::from_value(raw) {
            Ok(request) => self.handle(request).await.to_value(),
            Err(response) => response.to_value(),
        }
    }

    /// Run the relay as a service and return its channel.
    pub fn spawn(self) -> (RelayChannel, JoinHandle<()>) {
        let (chan, mailbox) = channel(MAILBOX_BUFFER);
        let relay = Arc::new(self);
        let handle = spawn_service(mailbox, move |request: RelayRequest| {
            let relay = Arc::clone(&relay);
            async move { relay.handle(request).await }
        });
        (chan, handle)
    }

    fn active_tab_id(&self) -> RelayResponse {
        let tabs = self.host.active_tabs();
        let Some(tab) = tabs.first() else {
            tracing::warn!("No active tab found");
            return RelayResponse::NoActiveTab {
                error: "No active tab".to_string(),
            };
        };
        match tab.id {
            Some(id) => {
                tracing::debug!(tab_id = %id, "Returning active tab id");
                RelayResponse::ActiveTab(id)
            }
            None => {
                tracing::warn!(?tab, "Active tab has no id");
                RelayResponse::NoActiveTab {
                    error: "Invalid tab".to_string(),
                }
            }
        }
    }

    async fn forward_extract(&self, tab_id: TabId) -> RelayResponse {
        let Some(content) = self.host.content_channel(tab_id) else {
            tracing::warn!(tab_id = %tab_id, "No content service in tab");
            return RelayResponse::error(format!("No content script in tab {tab_id}"));
        };

        match content.request(TabRequest::ExtractConversation).await {
            Ok(response) => match response.error {
                Some(error) if response.text.is_empty() => {
                    tracing::warn!(tab_id = %tab_id, %error, "Content service reported an error");
                    RelayResponse::Error { error }
                }
                _ => RelayResponse::Conversation {
                    text: response.text,
                },
            },
            Err(e) => {
                tracing::warn!(tab_id = %tab_id, error = %e, "Content service did not answer");
                RelayResponse::error(format!("Tab {tab_id} did not respond: {e}"))
            }
        }
    }
}
