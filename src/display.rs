//! Display surface for the tracker readouts.
//!
//! The tracker only decides *what* to show; a [`DisplaySink`] decides how.
//! [`TerminalDisplay`] prints colored lines, hosts with a real panel plug in
//! their own sink.

use colored::Colorize;

use crate::tokens::{Provenance, TokenEstimate};

/// Alert tier for the percentage label. Thresholds are inclusive and checked
/// from the top, so 90% is only ever `Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Normal,
    Elevated,
    Warning,
    Critical,
}

impl Severity {
    pub fn from_percentage(percentage: u64) -> Self {
        if percentage >= 90 {
            Severity::Critical
        } else if percentage >= 75 {
            Severity::Warning
        } else if percentage >= 50 {
            Severity::Elevated
        } else {
            Severity::Normal
        }
    }

    /// Label color, `None` for the default style.
    pub fn color(self) -> Option<&'static str> {
        match self {
            Severity::Normal => None,
            Severity::Elevated => Some("#ffcc44"),
            Severity::Warning => Some("#ffaa44"),
            Severity::Critical => Some("#ff4444"),
        }
    }

    fn rgb(self) -> Option<(u8, u8, u8)> {
        match self {
            Severity::Normal => None,
            Severity::Elevated => Some((0xff, 0xcc, 0x44)),
            Severity::Warning => Some((0xff, 0xaa, 0x44)),
            Severity::Critical => Some((0xff, 0x44, 0x44)),
        }
    }
}

/// `round(100 * tokens / limit)`, or 0 without a limit.
pub fn percentage(tokens: u64, limit: u32) -> u64 {
    if limit == 0 {
        return 0;
    }
    (100.0 * tokens as f64 / f64::from(limit)).round() as u64
}

/// Group digits by thousands: `12345` → `"12,345"`.
pub fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Everything needed to draw the token readout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextReadout {
    pub tokens: u64,
    pub limit: u32,
    pub percentage: u64,
    pub severity: Severity,
    pub method: Provenance,
}

impl ContextReadout {
    pub fn new(estimate: TokenEstimate, limit: u32) -> Self {
        let percentage = percentage(estimate.tokens, limit);
        Self {
            tokens: estimate.tokens,
            limit,
            percentage,
            severity: Severity::from_percentage(percentage),
            method: estimate.method,
        }
    }

    /// `"current / limit"`
    pub fn text(&self) -> String {
        format!("{} / {}", format_count(self.tokens), format_count(u64::from(self.limit)))
    }

    /// `"(pct%)"`
    pub fn percent_text(&self) -> String {
        format!("({}%)", self.percentage)
    }
}

/// Where readouts are written.
pub trait DisplaySink: Send {
    fn show_messages(&mut self, label: &str);

    fn show_hidden(&mut self, label: &str, tooltip: &str);

    fn show_context(&mut self, readout: &ContextReadout);
}

/// Prints readouts to stdout.
#[derive(Debug, Default)]
pub struct TerminalDisplay;

impl DisplaySink for TerminalDisplay {
    fn show_messages(&mut self, label: &str) {
        println!("  {} {}", "Messages:".bold(), label);
    }

    fn show_hidden(&mut self, label: &str, tooltip: &str) {
        println!("  {} {} {}", "Hidden:".bold(), label, tooltip.dimmed());
    }

    fn show_context(&mut self, readout: &ContextReadout) {
        let percent = readout.percent_text();
        let percent = match readout.severity.rgb() {
            Some((r, g, b)) => percent.truecolor(r, g, b).bold(),
            None => percent.normal(),
        };
        println!(
            "  {} {} {} {}",
            "Tokens:".bold(),
            readout.text(),
            percent,
            format!("[{}]", readout.method).dimmed()
        );
    }
}

/// Sink that records every write, for tests.
#[cfg(test)]
pub mod recording {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    pub struct Recorded {
        pub writes: usize,
        pub messages: Option<String>,
        pub hidden: Option<(String, String)>,
        pub context: Option<ContextReadout>,
        pub context_writes: usize,
    }

    #[derive(Debug, Clone, Default)]
    pub struct RecordingDisplay {
        pub recorded: Arc<Mutex<Recorded>>,
    }

    impl RecordingDisplay {
        pub fn context_writes(&self) -> usize {
            self.recorded.lock().unwrap().context_writes
        }

        pub fn context(&self) -> Option<ContextReadout> {
            self.recorded.lock().unwrap().context.clone()
        }
    }

    impl DisplaySink for RecordingDisplay {
        fn show_messages(&mut self, label: &str) {
            let mut r = self.recorded.lock().unwrap();
            r.writes += 1;
            r.messages = Some(label.to_string());
        }

        fn show_hidden(&mut self, label: &str, tooltip: &str) {
            let mut r = self.recorded.lock().unwrap();
            r.writes += 1;
            r.hidden = Some((label.to_string(), tooltip.to_string()));
        }

        fn show_context(&mut self, readout: &ContextReadout) {
            let mut r = self.recorded.lock().unwrap();
            r.writes += 1;
            r.context_writes += 1;
            r.context = Some(readout.clone());
        }
    }
}
