//! File-backed host used by the CLI: a chat loaded from disk, no tokenizer,
//! no event bus.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde_json::Value;

use super::{ChatMessage, ConversationSnapshot, Host, Readiness};
use crate::error::Error;
use crate::Result;

/// On-disk chat layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChatFormat {
    /// A JSON array of messages
    Array,
    /// One JSON object per line, optionally led by a metadata header line
    Lines,
}

/// A chat file exposed through the [`Host`] trait.
pub struct StaticHost {
    path: Option<PathBuf>,
    format: ChatFormat,
    header: Option<Value>,
    messages: Mutex<Vec<ChatMessage>>,
}

impl StaticHost {
    /// In-memory host over the given messages.
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            path: None,
            format: ChatFormat::Array,
            header: None,
            messages: Mutex::new(messages),
        }
    }

    /// Load a chat from a JSON array or a JSON-lines file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut host = Self::parse(&content)?;
        host.path = Some(path.to_path_buf());
        Ok(host)
    }

    fn parse(content: &str) -> Result<Self> {
        if content.trim_start().starts_with('[') {
            let messages: Vec<ChatMessage> = serde_json::from_str(content)?;
            return Ok(Self::new(messages));
        }

        let mut header = None;
        let mut messages = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let value: Value = serde_json::from_str(line)
                .map_err(|e| Error::Host(format!("line {}: {}", line_no + 1, e)))?;
            if value.get("chat_metadata").is_some() {
                header = Some(value);
                continue;
            }
            messages.push(serde_json::from_value(value)?);
        }

        Ok(Self {
            path: None,
            format: ChatFormat::Lines,
            header,
            messages: Mutex::new(messages),
        })
    }

    fn render(&self) -> Result<String> {
        let messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        match self.format {
            ChatFormat::Array => Ok(serde_json::to_string_pretty(&*messages)?),
            ChatFormat::Lines => {
                let mut lines = Vec::with_capacity(messages.len() + 1);
                if let Some(header) = &self.header {
                    lines.push(serde_json::to_string(header)?);
                }
                for message in messages.iter() {
                    lines.push(serde_json::to_string(message)?);
                }
                Ok(lines.join("\n") + "\n")
            }
        }
    }
}

impl Host for StaticHost {
    fn readiness(&self) -> Readiness {
        Readiness::Ready
    }

    fn snapshot(&self) -> Option<ConversationSnapshot> {
        let messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        Some(ConversationSnapshot::new(messages.clone()))
    }

    fn set_summary(&self, index: usize, text: &str) -> Result<()> {
        let mut messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        let message = messages
            .get_mut(index)
            .ok_or_else(|| Error::Host(format!("No message at index {}", index)))?;
        message.set_summary(text);
        Ok(())
    }

    fn save_chat(&self) -> Result<()> {
        let path = self
            .path
            .as_ref()
            .ok_or(Error::HostUnavailable("chat file"))?;
        std::fs::write(path, self.render()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.json");
        std::fs::write(&path, r#"[{"mes":"hi"},{"mes":"yo","is_system":true}]"#).unwrap();

        let host = StaticHost::open(&path).unwrap();
        let snapshot = host.snapshot().unwrap();
        assert_eq!(snapshot.messages.len(), 2);
        assert_eq!(snapshot.visible().count(), 1);
        assert!(!host.has_token_counter());
    }

    #[test]
    fn test_json_lines_keeps_header_on_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.jsonl");
        std::fs::write(
            &path,
            "{\"user_name\":\"me\",\"chat_metadata\":{}}\n{\"mes\":\"a\"}\n{\"mes\":\"b\"}\n",
        )
        .unwrap();

        let host = StaticHost::open(&path).unwrap();
        assert_eq!(host.snapshot().unwrap().messages.len(), 2);

        host.set_summary(1, "short recap").unwrap();
        host.save_chat().unwrap();

        let saved = std::fs::read_to_string(&path).unwrap();
        assert!(saved.lines().next().unwrap().contains("chat_metadata"));

        let reopened = StaticHost::open(&path).unwrap();
        assert_eq!(reopened.snapshot().unwrap().summary(), Some((1, "short recap")));
    }

    #[test]
    fn test_save_keeps_fields_the_tracker_ignores() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.jsonl");
        let line = serde_json::json!({
            "name": "User",
            "is_user": true,
            "send_date": "2024-05-01 10:00",
            "mes": "a",
            "swipes": ["a", "a2"],
            "extra": { "api": "openai" }
        });
        std::fs::write(&path, format!("{{\"chat_metadata\":{{}}}}\n{}\n", line)).unwrap();

        let host = StaticHost::open(&path).unwrap();
        host.set_summary(0, "recap").unwrap();
        host.save_chat().unwrap();

        let saved = std::fs::read_to_string(&path).unwrap();
        let message: Value = serde_json::from_str(saved.lines().nth(1).unwrap()).unwrap();
        assert_eq!(message["name"], "User");
        assert_eq!(message["is_user"], true);
        assert_eq!(message["send_date"], "2024-05-01 10:00");
        assert_eq!(message["swipes"], serde_json::json!(["a", "a2"]));
        assert_eq!(message["extra"]["api"], "openai");
        assert_eq!(message["extra"]["memory"], "recap");
    }

    #[test]
    fn test_open_tolerates_off_type_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.json");
        std::fs::write(
            &path,
            r#"[{"mes":"a","id":"msg-1"},{"mes":"b","hidden":"true"},{"mes":"c","hidden":true}]"#,
        )
        .unwrap();

        let host = StaticHost::open(&path).unwrap();
        let snapshot = host.snapshot().unwrap();
        assert_eq!(snapshot.visible_text(), "a\nb");
    }

    #[test]
    fn test_in_memory_host_cannot_save() {
        let host = StaticHost::new(vec![ChatMessage::new("a")]);
        assert!(matches!(host.save_chat(), Err(Error::HostUnavailable(_))));
        assert!(host.set_summary(5, "x").is_err());
    }
}
