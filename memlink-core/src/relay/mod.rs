//! Cross-context messaging
//!
//! Three contexts take part:
//!
//! ```text
//! Controller ──RelayRequest──▶ Relay ──TabRequest──▶ ContentService (per tab)
//!            ◀─RelayResponse──       ◀─TabResponse──
//! ```
//!
//! Both hops use the same [`Channel`] abstraction: one typed request, exactly
//! one typed response, no timeout, no cancellation. The relay holds no
//! business logic and no tab state; it resolves every request against a
//! fresh query of its [`TabHost`]. Extraction is routed through the relay
//! like every other request, so the controller only ever talks to the relay.

mod channel;
mod content;
mod message;
mod service;
mod tabs;

pub use channel::{
    channel, serve, spawn_service, Channel, ChannelError, Envelope, FaultResponse, Mailbox,
    MAILBOX_BUFFER,
};
pub use content::ContentService;
pub use message::{RelayRequest, RelayResponse, TabId, TabRequest, TabResponse};
pub use service::{Relay, RelayChannel};
pub use tabs::{TabChannel, TabHost, TabInfo, TabRegistry};
