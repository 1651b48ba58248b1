//! Memory backend synchronization
//!
//! [`SyncClient`] wraps every outbound HTTP call with the same contract:
//!
//! - `Content-Type: application/json` on every request
//! - `Authorization: Bearer …` only when the caller passes a token
//! - 2xx bodies must be JSON, otherwise [`Error::InvalidResponse`](crate::Error::InvalidResponse)
//! - 401 clears the stored session, then fails with `AuthRejected`
//! - other non-2xx statuses fail with `Http { status, message }`, where the
//!   message is never empty
//! - transport failures fail with `Network`
//!
//! Nothing here retries; retry is a user action.

mod client;
pub mod endpoints;

pub use client::{error_message, SyncClient};
pub use endpoints::AuthResponse;
