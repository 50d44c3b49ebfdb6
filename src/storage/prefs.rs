//! Typed preferences persisted in a [`KeyValueStore`].

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::KeyValueStore;
use crate::error::Error;
use crate::Result;

/// Storage key for the token limit (plain integer string).
pub const LIMIT_KEY: &str = "chatTrackerMaxTokens";

/// Storage key for the panel state (JSON object).
pub const SETTINGS_KEY: &str = "chatTracker_settings";

/// User-configured context ceiling, always within `0..=TokenLimit::MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLimit(u32);

impl TokenLimit {
    pub const MAX: u32 = 128_000;
    pub const DEFAULT: u32 = 50_000;

    pub fn new(value: u32) -> Result<Self> {
        if value > Self::MAX {
            return Err(Error::InvalidLimit(format!(
                "{} is above the maximum of {}",
                value,
                Self::MAX
            )));
        }
        Ok(Self(value))
    }

    /// Parse user input. Only a plain non-negative integer in range is accepted;
    /// nothing is clamped or truncated.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidLimit("a value is required".to_string()));
        }
        if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidLimit(format!(
                "'{}' is not a whole number",
                trimmed
            )));
        }

        let value: u32 = trimmed
            .parse()
            .map_err(|_| Error::InvalidLimit(format!("'{}' is out of range", trimmed)))?;
        Self::new(value)
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Load the persisted limit; missing or invalid values keep the default.
    pub fn load(store: &dyn KeyValueStore) -> Self {
        match store.get(LIMIT_KEY) {
            Ok(Some(saved)) => Self::parse(&saved).unwrap_or_else(|e| {
                debug!("Ignoring stored token limit {:?}: {}", saved, e);
                Self::default()
            }),
            Ok(None) => Self::default(),
            Err(e) => {
                debug!("Token limit unreadable, using default: {}", e);
                Self::default()
            }
        }
    }

    pub fn save(self, store: &dyn KeyValueStore) -> Result<()> {
        store.set(LIMIT_KEY, &self.0.to_string())
    }
}

impl Default for TokenLimit {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

/// Persisted panel chrome: collapsed flag and docked position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PanelState {
    #[serde(default)]
    pub collapsed: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<String>,

    /// Docked to the right edge of the viewport
    #[serde(default, rename = "isRight")]
    pub is_right: bool,
}

impl PanelState {
    pub fn load(store: &dyn KeyValueStore) -> Self {
        let raw = match store.get(SETTINGS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Self::default(),
            Err(e) => {
                debug!("Panel state unreadable: {}", e);
                return Self::default();
            }
        };

        serde_json::from_str(&raw).unwrap_or_else(|e| {
            debug!("Ignoring malformed panel state: {}", e);
            Self::default()
        })
    }

    pub fn save(&self, store: &dyn KeyValueStore) -> Result<()> {
        store.set(SETTINGS_KEY, &serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;

    #[test]
    fn test_limit_validation() {
        assert!(TokenLimit::parse("128001").is_err());
        assert_eq!(TokenLimit::parse("0").unwrap().get(), 0);
        assert!(TokenLimit::parse("-5").is_err());
        assert!(TokenLimit::parse("50000.5").is_err());
        assert!(TokenLimit::parse("").is_err());
        assert!(TokenLimit::parse("abc").is_err());
        assert!(TokenLimit::parse("99999999999").is_err());
        assert_eq!(TokenLimit::parse(" 128000 ").unwrap().get(), 128_000);
    }

    #[test]
    fn test_limit_load_defaults_and_ignores_invalid() {
        let store = InMemoryStore::new();
        assert_eq!(TokenLimit::load(&store).get(), 50_000);

        store.set(LIMIT_KEY, "200000").unwrap();
        assert_eq!(TokenLimit::load(&store).get(), 50_000);

        TokenLimit::parse("32000").unwrap().save(&store).unwrap();
        assert_eq!(TokenLimit::load(&store).get(), 32_000);
    }

    #[test]
    fn test_panel_state_uses_camel_case_dock_flag() {
        let store = InMemoryStore::new();
        let state = PanelState {
            collapsed: true,
            top: Some("40px".to_string()),
            left: None,
            right: Some("12px".to_string()),
            is_right: true,
        };
        state.save(&store).unwrap();

        let raw = store.get(SETTINGS_KEY).unwrap().unwrap();
        assert!(raw.contains("\"isRight\":true"));
        assert_eq!(PanelState::load(&store), state);
    }

    #[test]
    fn test_malformed_panel_state_falls_back() {
        let store = InMemoryStore::new();
        store.set(SETTINGS_KEY, "{broken").unwrap();
        assert_eq!(PanelState::load(&store), PanelState::default());
    }
}
