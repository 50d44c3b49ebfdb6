//! Schema-agnostic search for a token count inside a response payload.
//!
//! Backends report usage under many different field names, so the payload is
//! walked without any schema. Every numeric field whose name looks like a
//! token count becomes a [`Candidate`]; exact known names outrank fuzzy
//! `*token*` matches, and fields that look like configured ceilings (`max`,
//! `limit`) are never taken from the fuzzy path.

use std::collections::HashSet;

use serde_json::Value;

use super::parse_token_count;

/// Known field names, best first. Keys are compared lowercased, with and
/// without underscores.
pub const KEY_RANKS: &[(&str, u8)] = &[
    ("prompt_total_tokens", 0),
    ("prompt_tokens", 1),
    ("prompt_token_count", 1),
    ("prompttokencount", 1),
    ("token_count", 2),
    ("tokencount", 2),
    ("total_tokens", 3),
    ("totaltokens", 3),
];

/// Rank for fields that merely mention "token".
pub const FUZZY_RANK: u8 = 10;

/// One ranked guess taken from a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub tokens: u64,
    pub rank: u8,
}

impl Candidate {
    /// Lower rank wins; equal ranks prefer the larger count.
    fn beats(&self, other: &Candidate) -> bool {
        self.rank < other.rank || (self.rank == other.rank && self.tokens > other.tokens)
    }
}

fn exact_rank(key_lower: &str) -> Option<u8> {
    let stripped = key_lower.replace('_', "");
    KEY_RANKS
        .iter()
        .find(|(name, _)| *name == key_lower)
        .or_else(|| KEY_RANKS.iter().find(|(name, _)| *name == stripped))
        .map(|(_, rank)| *rank)
}

fn is_fuzzy_token_key(key_lower: &str) -> bool {
    key_lower.contains("token") && !key_lower.contains("max") && !key_lower.contains("limit")
}

/// Positive token count carried by a field value.
fn field_tokens(value: &Value) -> Option<u64> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => return parse_token_count(s).filter(|t| *t > 0),
        _ => return None,
    };
    if !raw.is_finite() || raw <= 0.0 {
        return None;
    }
    Some(raw.round() as u64).filter(|t| *t > 0)
}

/// Collect every candidate in `payload`.
pub fn collect_candidates(payload: &Value) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    let mut visited: HashSet<*const Value> = HashSet::new();
    let mut stack: Vec<&Value> = vec![payload];

    while let Some(value) = stack.pop() {
        if !visited.insert(value as *const Value) {
            continue;
        }

        match value {
            Value::Array(items) => stack.extend(items.iter()),
            Value::Object(map) => {
                for (key, child) in map {
                    let key_lower = key.to_lowercase();

                    if let Some(rank) = exact_rank(&key_lower) {
                        if let Some(tokens) = field_tokens(child) {
                            candidates.push(Candidate { tokens, rank });
                        }
                    }

                    if is_fuzzy_token_key(&key_lower) {
                        if let Some(tokens) = field_tokens(child) {
                            candidates.push(Candidate { tokens, rank: FUZZY_RANK });
                        }
                    }

                    if child.is_object() || child.is_array() {
                        stack.push(child);
                    }
                }
            }
            _ => {}
        }
    }

    candidates
}

/// Best token count in `payload`, or `None` if nothing qualifies.
pub fn extract_token_count(payload: &Value) -> Option<u64> {
    if !payload.is_object() && !payload.is_array() {
        return None;
    }

    collect_candidates(payload)
        .into_iter()
        .reduce(|best, next| if next.beats(&best) { next } else { best })
        .map(|winner| winner.tokens)
}
