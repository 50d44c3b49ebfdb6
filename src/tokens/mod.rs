//! Token accounting values.
//!
//! A [`TokenEstimate`] is a count plus where it came from. The interception
//! layer and the tracker share one [`EstimateCell`]; updates replace the
//! whole estimate and never merge counts.

mod extract;
mod parse;

pub use extract::{collect_candidates, extract_token_count, Candidate, FUZZY_RANK, KEY_RANKS};
pub use parse::parse_token_count;

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Source of a token estimate, most trusted first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provenance {
    /// Read from a generation response body
    InterceptedResponse,
    /// Counted from an outgoing generation request
    InterceptedRequest,
    /// Host tokenizer over the visible conversation
    HostRecompute,
    /// Parsed from the host's own token label
    DomScraped,
    /// No visible conversation text
    Empty,
    /// Host has no token counter
    HostUnavailable,
    /// Counting failed
    Error,
}

impl Provenance {
    pub fn as_str(self) -> &'static str {
        match self {
            Provenance::InterceptedResponse => "fetch-intercepted-response",
            Provenance::InterceptedRequest => "fetch-intercepted-request",
            Provenance::HostRecompute => "host-authoritative-recompute",
            Provenance::DomScraped => "dom-scraped",
            Provenance::Empty => "empty",
            Provenance::HostUnavailable => "host-unavailable",
            Provenance::Error => "error",
        }
    }

    pub fn is_intercepted(self) -> bool {
        matches!(self, Provenance::InterceptedResponse | Provenance::InterceptedRequest)
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Best-guess context size with its provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenEstimate {
    pub tokens: u64,
    pub method: Provenance,
}

impl TokenEstimate {
    pub fn new(tokens: u64, method: Provenance) -> Self {
        Self { tokens, method }
    }

    /// Zero estimate tagged with why there is nothing to count.
    pub fn zero(method: Provenance) -> Self {
        Self { tokens: 0, method }
    }
}

/// Shared "current intercepted estimate" cell.
#[derive(Debug, Clone, Default)]
pub struct EstimateCell {
    inner: Arc<Mutex<Option<TokenEstimate>>>,
}

impl EstimateCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<TokenEstimate> {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current token count, zero when empty.
    pub fn tokens(&self) -> u64 {
        self.get().map_or(0, |e| e.tokens)
    }

    /// Replace the estimate, returning the previous one.
    pub fn replace(&self, estimate: TokenEstimate) -> Option<TokenEstimate> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(estimate)
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}
