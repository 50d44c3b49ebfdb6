//! Read-only view of the host's conversation.
//!
//! Hosts store messages as loosely typed JSON. Fields the tracker reads are
//! kept as raw values and interpreted on access, and everything else rides
//! along in `other`, so a message written back is the message that was read.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Only a JSON `true` sets a flag; any other value means "not set".
fn is_true(flag: &Option<Value>) -> bool {
    matches!(flag, Some(Value::Bool(true)))
}

/// Non-empty string content of a loosely typed text field.
fn non_empty_str(field: &Option<Value>) -> Option<&str> {
    field.as_ref().and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Extension data the host attaches to a message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageExtra {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_from_prompt: Option<Value>,

    /// Running conversation summary anchored on this message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<Value>,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// A single message as the host stores it.
///
/// Hosts disagree on which field marks a message as hidden, so every known
/// flag is kept and [`ChatMessage::is_hidden`] checks all of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mes: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_system: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mes_hidden: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_hidden: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_from_prompt: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<MessageExtra>,

    /// Host fields the tracker does not interpret (`name`, `is_user`, `swipes`, ...)
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl ChatMessage {
    /// Create a visible message with the given text
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            mes: Some(Value::String(text.into())),
            ..Self::default()
        }
    }

    /// Create a message hidden through the top-level `hidden` flag
    pub fn hidden(text: impl Into<String>) -> Self {
        Self {
            hidden: Some(Value::Bool(true)),
            ..Self::new(text)
        }
    }

    /// True when any hidden-indicating field is `true`.
    pub fn is_hidden(&self) -> bool {
        let extra = self.extra.as_ref();

        extra.is_some_and(|e| is_true(&e.hidden))
            || is_true(&self.mes_hidden)
            || is_true(&self.hidden)
            || is_true(&self.is_hidden)
            || is_true(&self.is_system)
            || is_true(&self.exclude_from_prompt)
            || extra.is_some_and(|e| is_true(&e.exclude_from_prompt))
    }

    /// Message body: the first non-empty of `mes`, `content`, `message`.
    pub fn text(&self) -> &str {
        non_empty_str(&self.mes)
            .or_else(|| non_empty_str(&self.content))
            .or_else(|| non_empty_str(&self.message))
            .unwrap_or("")
    }

    /// Summary annotation, if a non-empty one is attached.
    pub fn summary(&self) -> Option<&str> {
        self.extra.as_ref().and_then(|e| non_empty_str(&e.memory))
    }

    pub fn set_summary(&mut self, text: impl Into<String>) {
        self.extra.get_or_insert_with(MessageExtra::default).memory =
            Some(Value::String(text.into()));
    }

    /// Whether the `id` field holds this numeric id.
    fn has_id(&self, message_id: u64) -> bool {
        self.id.as_ref().and_then(Value::as_u64) == Some(message_id)
    }
}

/// Ordered messages of the current chat, captured at one point in time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationSnapshot {
    pub messages: Vec<ChatMessage>,
}

impl ConversationSnapshot {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self { messages }
    }

    pub fn visible(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter().filter(|m| !m.is_hidden())
    }

    /// Visible message bodies joined one per line, in snapshot order.
    pub fn visible_text(&self) -> String {
        self.visible().map(ChatMessage::text).collect::<Vec<_>>().join("\n")
    }

    /// The most recent message carrying a summary, by scan order.
    pub fn summary(&self) -> Option<(usize, &str)> {
        self.messages
            .iter()
            .enumerate()
            .filter_map(|(idx, m)| m.summary().map(|s| (idx, s)))
            .last()
    }

    /// Look a message up by position, falling back to its `id` field.
    ///
    /// The message at that position is taken unless it carries a different id.
    pub fn find(&self, message_id: u64) -> Option<(usize, &ChatMessage)> {
        let by_index = usize::try_from(message_id)
            .ok()
            .and_then(|idx| self.messages.get(idx).map(|m| (idx, m)))
            .filter(|(_, m)| m.id.is_none() || m.has_id(message_id));

        by_index.or_else(|| {
            self.messages
                .iter()
                .enumerate()
                .find(|(_, m)| m.has_id(message_id))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_each_hidden_flag_hides() {
        let variants: Vec<ChatMessage> = vec![
            serde_json::from_str(r#"{"mes":"a","extra":{"hidden":true}}"#).unwrap(),
            serde_json::from_str(r#"{"mes":"a","mes_hidden":true}"#).unwrap(),
            serde_json::from_str(r#"{"mes":"a","hidden":true}"#).unwrap(),
            serde_json::from_str(r#"{"mes":"a","is_hidden":true}"#).unwrap(),
            serde_json::from_str(r#"{"mes":"a","is_system":true}"#).unwrap(),
            serde_json::from_str(r#"{"mes":"a","exclude_from_prompt":true}"#).unwrap(),
            serde_json::from_str(r#"{"mes":"a","extra":{"exclude_from_prompt":true}}"#).unwrap(),
        ];
        for msg in variants {
            assert!(msg.is_hidden(), "{:?} should be hidden", msg);
        }
    }

    #[test]
    fn test_false_flags_stay_visible() {
        let msg: ChatMessage =
            serde_json::from_str(r#"{"mes":"a","hidden":false,"is_system":false,"extra":{}}"#).unwrap();
        assert!(!msg.is_hidden());
        assert!(!ChatMessage::new("plain").is_hidden());
    }

    #[test]
    fn test_visible_text_skips_hidden() {
        let snapshot = ConversationSnapshot::new(vec![
            ChatMessage::new("one"),
            ChatMessage::hidden("two"),
            ChatMessage::new("three"),
        ]);
        assert_eq!(snapshot.visible_text(), "one\nthree");
    }

    #[test]
    fn test_latest_summary_wins() {
        let mut first = ChatMessage::new("a");
        first.set_summary("old");
        let mut third = ChatMessage::new("c");
        third.set_summary("new");
        let mut empty = ChatMessage::new("d");
        empty.set_summary("");

        let snapshot = ConversationSnapshot::new(vec![first, ChatMessage::new("b"), third, empty]);
        assert_eq!(snapshot.summary(), Some((2, "new")));
    }

    #[test]
    fn test_find_falls_back_to_id() {
        let mut a = ChatMessage::new("a");
        a.id = Some(Value::from(10));
        let mut b = ChatMessage::new("b");
        b.id = Some(Value::from(0));
        let snapshot = ConversationSnapshot::new(vec![a, b]);

        assert_eq!(snapshot.find(0).map(|(i, _)| i), Some(1));
        assert_eq!(snapshot.find(10).map(|(i, _)| i), Some(0));
        assert!(snapshot.find(7).is_none());
    }

    #[test]
    fn test_off_type_fields_are_tolerated() {
        let messages: Vec<ChatMessage> = serde_json::from_str(
            r#"[
                {"mes":"a","id":"msg-1","hidden":"true"},
                {"mes":"b","is_system":1,"extra":{"hidden":null,"memory":42}},
                {"mes":"c","id":2,"mes_hidden":true}
            ]"#,
        )
        .unwrap();
        let snapshot = ConversationSnapshot::new(messages);

        assert_eq!(snapshot.visible_text(), "a\nb");
        assert_eq!(snapshot.summary(), None);
        // string id blocks the positional match and never equals a number
        assert!(snapshot.find(0).is_none());
        assert_eq!(snapshot.find(2).map(|(i, m)| (i, m.text())), Some((2, "c")));
    }

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let line = json!({
            "name": "User",
            "is_user": true,
            "send_date": "2024-05-01 10:00",
            "mes": "a",
            "swipes": ["a", "a2"],
            "extra": { "api": "openai", "model": "gpt" }
        });
        let mut message: ChatMessage = serde_json::from_value(line.clone()).unwrap();
        message.set_summary("recap");

        let saved = serde_json::to_value(&message).unwrap();
        let mut expected = line;
        expected["extra"]["memory"] = json!("recap");
        assert_eq!(saved, expected);
    }

    #[test]
    fn test_text_fallbacks() {
        let msg: ChatMessage = serde_json::from_str(r#"{"content":"from content"}"#).unwrap();
        assert_eq!(msg.text(), "from content");
        assert_eq!(ChatMessage::default().text(), "");

        let msg: ChatMessage = serde_json::from_str(r#"{"mes":"","message":"last"}"#).unwrap();
        assert_eq!(msg.text(), "last");
    }
}
