/// Gmail Relay
///
/// A websocket bridge between a browser chat, an upstream query planner and
/// a Gmail account. Each browser question is forwarded to the planner, which
/// answers with a Gmail search query; matching mail is fetched, promotional
/// messages are filtered out, and the genuine ones are streamed to the planner
/// before its synthesized answer is returned to the browser.
///
/// # Modules
///
/// - `relay`: the per-turn session state machine
/// - `server`: the browser-facing websocket endpoint
/// - `gmail_api`: Gmail REST adapter and the mailbox traits
/// - `auth`: OAuth token refresh, consent flow and credential check
/// - `envelope`: framing for the planner hop
pub mod auth;
pub mod config;
pub mod envelope;
pub mod errors;
pub mod gmail_api;
pub mod logging;
pub mod relay;
pub mod server;
pub mod utils;

// Re-export key types for use in tests
pub use crate::config::{Config, RelayConfig};
pub use crate::envelope::{Envelope, EnvelopeKind, WireFormat};
pub use crate::gmail_api::{EmailMessage, GmailAuthenticator, MailAuthenticator, Mailbox};
pub use crate::logging::setup_logging;
pub use crate::relay::{FetchStats, RelaySession, TurnOutcome};
