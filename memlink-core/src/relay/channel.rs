//! Typed request/response channel between execution contexts
//!
//! A [`Channel`] sends a request and waits for exactly one response. The
//! serving side receives [`Envelope`]s from its [`Mailbox`]. There is no
//! timeout and no cancellation: a request resolves with a response, or with
//! an error if the serving side went away without answering.

use std::future::Future;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Buffer size for service mailboxes.
pub const MAILBOX_BUFFER: usize = 64;

/// Errors raised on the requesting side of a channel.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The serving side has shut down.
    #[error("receiving end is closed")]
    Closed,

    /// The request was accepted but dropped without a response.
    #[error("no response received")]
    NoReply,
}

/// Responses that can describe a handler fault.
///
/// Used by [`serve`] to answer a request whose handler panicked.
pub trait FaultResponse {
    fn fault(message: String) -> Self;
}

/// A request paired with the slot for its single response.
pub struct Envelope<Req, Resp> {
    pub request: Req,
    reply: oneshot::Sender<Resp>,
}

impl<Req, Resp> Envelope<Req, Resp> {
    /// Answer the request. Returns false if the requester is gone.
    pub fn respond(self, response: Resp) -> bool {
        self.reply.send(response).is_ok()
    }

    pub fn into_parts(self) -> (Req, oneshot::Sender<Resp>) {
        (self.request, self.reply)
    }
}

/// Requesting half.
pub struct Channel<Req, Resp> {
    tx: mpsc::Sender<Envelope<Req, Resp>>,
}

impl<Req, Resp> Clone for Channel<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<Req, Resp> std::fmt::Debug for Channel<Req, Resp> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl<Req, Resp> Channel<Req, Resp> {
    /// Send `request` and wait for its response.
    pub async fn request(&self, request: Req) -> Result<Resp, ChannelError> {
        let (reply, reply_rx) = oneshot::channel();
        self.tx
            .send(Envelope { request, reply })
            .await
            .map_err(|_| ChannelError::Closed)?;
        reply_rx.await.map_err(|_| ChannelError::NoReply)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Serving half.
pub struct Mailbox<Req, Resp> {
    rx: mpsc::Receiver<Envelope<Req, Resp>>,
}

impl<Req, Resp> Mailbox<Req, Resp> {
    /// Next envelope, or `None` once every [`Channel`] is dropped.
    pub async fn recv(&mut self) -> Option<Envelope<Req, Resp>> {
        self.rx.recv().await
    }
}

/// Create a connected channel/mailbox pair.
pub fn channel<Req, Resp>(buffer: usize) -> (Channel<Req, Resp>, Mailbox<Req, Resp>) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    (Channel { tx }, Mailbox { rx })
}

/// Answer every request arriving in `mailbox` with `handler`.
///
/// Each request runs in its own task, so one slow or faulty request never
/// blocks or kills the others. A panicking handler is answered with
/// [`FaultResponse::fault`]. Returns when all channels are dropped.
pub async fn serve<Req, Resp, H, Fut>(mut mailbox: Mailbox<Req, Resp>, handler: H)
where
    Req: Send + 'static,
    Resp: FaultResponse + Send + 'static,
    H: Fn(Req) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Resp> + Send + 'static,
{
    while let Some(envelope) = mailbox.recv().await {
        let handler = handler.clone();
        tokio::spawn(async move {
            let (request, reply) = envelope.into_parts();
            let response = match tokio::spawn(handler(request)).await {
                Ok(response) => response,
                Err(join_error) => {
                    tracing::error!(error = %join_error, "Message handler failed");
                    Resp::fault(fault_message(join_error))
                }
            };
            if reply.send(response).is_err() {
                tracing::debug!("Requester went away before the response was sent");
            }
        });
    }
    tracing::debug!("Mailbox closed, service stopping");
}

/// Spawn [`serve`] on the current runtime.
pub fn spawn_service<Req, Resp, H, Fut>(mailbox: Mailbox<Req, Resp>, handler: H) -> JoinHandle<()>
where
    Req: Send + 'static,
    Resp: FaultResponse + Send + 'static,
    H: Fn(Req) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Resp> + Send + 'static,
{
    tokio::spawn(serve(mailbox, handler))
}

fn fault_message(join_error: tokio::task::JoinError) -> String {
    if !join_error.is_panic() {
        return join_error.to_string();
    }
    let payload = join_error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}
