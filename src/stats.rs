//! Message statistics shown next to the token readout.

use crate::host::ConversationSnapshot;

/// Hidden-message previews are cut to this many characters.
const PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageStats {
    pub visible: usize,
    pub hidden: usize,
    /// Zero-based index of the last hidden message
    pub last_hidden_index: Option<usize>,
    pub last_hidden_text: Option<String>,
    /// Index of the message carrying the current summary
    pub summary_index: Option<usize>,
}

impl MessageStats {
    /// Classify every message of `snapshot`. Nothing is cached between calls.
    pub fn from_snapshot(snapshot: &ConversationSnapshot) -> Self {
        let mut stats = Self::default();

        for (idx, message) in snapshot.messages.iter().enumerate() {
            if message.is_hidden() {
                stats.hidden += 1;
                stats.last_hidden_index = Some(idx);
                stats.last_hidden_text = Some(message.text().to_string());
            } else {
                stats.visible += 1;
            }
            if message.summary().is_some() {
                stats.summary_index = Some(idx);
            }
        }

        stats
    }

    /// Message counter label, e.g. `"12 (Sum: #7)"`.
    pub fn messages_label(&self) -> String {
        match self.summary_index {
            Some(idx) => format!("{} (Sum: #{})", self.visible, idx),
            None => self.visible.to_string(),
        }
    }

    /// Hidden counter label, e.g. `"2 (last: #4)"` (one-based).
    pub fn hidden_label(&self) -> String {
        match self.last_hidden_index {
            Some(idx) => format!("{} (last: #{})", self.hidden, idx + 1),
            None => self.hidden.to_string(),
        }
    }

    /// Tooltip for the hidden counter. `captured` is the text recorded from
    /// the most recent hide event and takes over when the scan found none.
    pub fn hidden_tooltip(&self, captured: Option<&str>) -> String {
        let preview = self
            .last_hidden_text
            .as_deref()
            .filter(|t| !t.is_empty())
            .or(captured.filter(|t| !t.is_empty()));

        match preview {
            Some(text) => {
                let number = self
                    .last_hidden_index
                    .map(|idx| format!("#{} ", idx + 1))
                    .unwrap_or_default();
                format!("Last hidden {}{}", number, truncate_preview(text))
            }
            None if self.hidden > 0 => format!("{} hidden messages in chat", self.hidden),
            None => "No hidden messages".to_string(),
        }
    }
}

fn truncate_preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
