//! Host module - the chat application the tracker runs inside.
//!
//! The tracker never owns conversation data. Everything it knows comes
//! through the [`Host`] trait:
//! - conversation snapshots, read fresh on every refresh
//! - the host's own token counter (optional)
//! - lifecycle notifications via [`Host::subscribe`]
//! - the host's token-count label, for scraping and change watching
//! - summary editing hooks

mod snapshot;
mod static_host;

pub use snapshot::{ChatMessage, ConversationSnapshot, MessageExtra};
pub use static_host::StaticHost;

use std::collections::HashMap;

use tokio::sync::watch;

use crate::error::Error;
use crate::events::EventSink;
use crate::tokens::parse_token_count;
use crate::Result;

/// How far the host has come through its own startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Host context not reachable yet
    Unavailable,
    /// Context exists but no chat is loaded
    NoChat,
    Ready,
}

/// A token count as the host returns it: a number or numeric text.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCount {
    Number(f64),
    Text(String),
}

impl RawCount {
    /// Rounded non-negative count, or `None` for anything unusable.
    pub fn to_tokens(&self) -> Option<u64> {
        match self {
            RawCount::Number(n) if n.is_finite() && *n >= 0.0 => Some(n.round() as u64),
            RawCount::Number(_) => None,
            RawCount::Text(text) => parse_token_count(text),
        }
    }
}

impl From<u64> for RawCount {
    fn from(n: u64) -> Self {
        RawCount::Number(n as f64)
    }
}

/// Capabilities the host exposes to the tracker.
///
/// Only [`Host::readiness`] and [`Host::snapshot`] are required; every other
/// capability degrades to "unavailable" by default.
pub trait Host: Send + Sync {
    fn readiness(&self) -> Readiness;

    /// Current conversation, or `None` when no chat is loaded.
    fn snapshot(&self) -> Option<ConversationSnapshot>;

    fn has_token_counter(&self) -> bool {
        false
    }

    /// Count tokens with the host's own tokenizer.
    fn count_tokens(&self, _text: &str) -> Result<RawCount> {
        Err(Error::HostUnavailable("token counter"))
    }

    /// Symbolic event-name table, when the host publishes one.
    fn event_types(&self) -> Option<HashMap<String, String>> {
        None
    }

    /// Register interest in `event`. Returns false when the host has no event bus.
    fn subscribe(&self, _event: &str, _sink: EventSink) -> bool {
        false
    }

    /// Current text of the host's own token-count label.
    fn token_ui_text(&self) -> Option<String> {
        None
    }

    /// Change feed for the host's token-count label, `None` while it is absent.
    fn watch_token_ui(&self) -> Option<watch::Receiver<String>> {
        None
    }

    fn set_summary(&self, _index: usize, _text: &str) -> Result<()> {
        Err(Error::HostUnavailable("summary editing"))
    }

    fn save_chat(&self) -> Result<()> {
        Err(Error::HostUnavailable("chat saving"))
    }

    /// Ask the host's summarizer to produce a new summary.
    fn request_summary(&self) -> Result<()> {
        Err(Error::HostUnavailable("summarizer"))
    }

    /// Ask the host's summarizer to restore the previous summary.
    fn restore_summary(&self) -> Result<()> {
        Err(Error::HostUnavailable("summarizer"))
    }
}
