//! Host lifecycle events and the refresh schedule each one triggers.
//!
//! Hosts may publish a symbolic event-name table (`MESSAGE_SENT` →
//! `"message_sent"`, ...). [`EventNames`] resolves that table once at
//! startup and falls back to the well-known literals for anything missing.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::config::Config;

/// Channel the host pushes notifications into.
pub type EventSink = mpsc::UnboundedSender<HostNotification>;

/// Lifecycle events the tracker reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostEvent {
    MessageSent,
    MessageReceived,
    ChatChanged,
    GenerationEnded,
    MessageUpdated,
    MessageDeleted,
    MessageEdited,
    MessageHidden,
}

impl HostEvent {
    pub const ALL: [HostEvent; 8] = [
        HostEvent::MessageSent,
        HostEvent::MessageReceived,
        HostEvent::ChatChanged,
        HostEvent::GenerationEnded,
        HostEvent::MessageUpdated,
        HostEvent::MessageDeleted,
        HostEvent::MessageEdited,
        HostEvent::MessageHidden,
    ];

    /// Key in the host's symbolic event table.
    pub fn symbol(self) -> &'static str {
        match self {
            HostEvent::MessageSent => "MESSAGE_SENT",
            HostEvent::MessageReceived => "MESSAGE_RECEIVED",
            HostEvent::ChatChanged => "CHAT_CHANGED",
            HostEvent::GenerationEnded => "GENERATION_ENDED",
            HostEvent::MessageUpdated => "MESSAGE_UPDATED",
            HostEvent::MessageDeleted => "MESSAGE_DELETED",
            HostEvent::MessageEdited => "MESSAGE_EDITED",
            HostEvent::MessageHidden => "MESSAGE_HIDDEN",
        }
    }

    /// Literal name used when the host has no symbolic table entry.
    pub fn literal(self) -> &'static str {
        match self {
            HostEvent::MessageSent => "message_sent",
            HostEvent::MessageReceived => "message_received",
            HostEvent::ChatChanged => "chat_changed",
            HostEvent::GenerationEnded => "generation_ended",
            HostEvent::MessageUpdated => "message_updated",
            HostEvent::MessageDeleted => "message_deleted",
            HostEvent::MessageEdited => "message_edited",
            HostEvent::MessageHidden => "message_hidden",
        }
    }

    /// Refresh schedule for this event.
    pub fn plan(self, config: &Config) -> RefreshPlan {
        match self {
            HostEvent::GenerationEnded => {
                let delay = config.generation_ended_delay();
                RefreshPlan {
                    delay,
                    reset_intercepted: false,
                    capture_hidden: false,
                    follow_ups: config.follow_up_delays().into_iter().map(|d| delay + d).collect(),
                }
            }
            HostEvent::ChatChanged => RefreshPlan {
                delay: Duration::ZERO,
                reset_intercepted: true,
                capture_hidden: false,
                follow_ups: config.follow_up_delays(),
            },
            HostEvent::MessageHidden => RefreshPlan {
                delay: Duration::ZERO,
                reset_intercepted: false,
                capture_hidden: true,
                follow_ups: Vec::new(),
            },
            _ => RefreshPlan {
                delay: Duration::ZERO,
                reset_intercepted: false,
                capture_hidden: false,
                follow_ups: config.follow_up_delays(),
            },
        }
    }
}

/// What a single event asks the tracker to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshPlan {
    /// Wait before the full refresh
    pub delay: Duration,
    /// Clear the intercepted estimate and re-arm the token UI observer
    pub reset_intercepted: bool,
    /// Record the affected message as the last hidden one
    pub capture_hidden: bool,
    /// Context-only refreshes, measured from the event
    pub follow_ups: Vec<Duration>,
}

/// Extra names some hosts emit for hide operations.
const HIDDEN_ALIASES: [&str; 2] = ["MESSAGE_HIDDEN", "messageUpdated"];

/// Event names resolved once against the host's table.
#[derive(Debug, Clone)]
pub struct EventNames {
    by_name: HashMap<String, HostEvent>,
}

impl EventNames {
    /// Build the table from the host's symbolic names, if it has any.
    pub fn resolve(symbols: Option<&HashMap<String, String>>) -> Self {
        let mut by_name = HashMap::new();

        for event in HostEvent::ALL {
            let name = symbols
                .and_then(|table| table.get(event.symbol()))
                .filter(|name| !name.is_empty())
                .cloned()
                .unwrap_or_else(|| event.literal().to_string());
            by_name.insert(name, event);
        }

        by_name.entry(HostEvent::MessageHidden.literal().to_string())
            .or_insert(HostEvent::MessageHidden);
        for alias in HIDDEN_ALIASES {
            by_name.entry(alias.to_string()).or_insert(HostEvent::MessageHidden);
        }

        Self { by_name }
    }

    /// Fallback-only table.
    pub fn literals() -> Self {
        Self::resolve(None)
    }

    pub fn lookup(&self, name: &str) -> Option<HostEvent> {
        self.by_name.get(name).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }
}

/// A raw notification from the host's event bus.
#[derive(Debug, Clone)]
pub struct HostNotification {
    pub name: String,
    pub payload: Option<Value>,
}

impl HostNotification {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: None,
        }
    }

    pub fn with_payload(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload: Some(payload),
        }
    }

    /// Message id carried as `{ "messageId": n }` or as a bare number.
    pub fn message_id(&self) -> Option<u64> {
        match self.payload.as_ref()? {
            Value::Number(n) => n.as_u64(),
            Value::Object(map) => map.get("messageId").and_then(Value::as_u64),
            _ => None,
        }
    }
}
