//! Why a refresh was requested.

use tokio::sync::mpsc;

use crate::events::HostEvent;

/// Channel refresh requests travel through to the tracker loop.
pub type RefreshSender = mpsc::UnboundedSender<RefreshTrigger>;
pub type RefreshReceiver = mpsc::UnboundedReceiver<RefreshTrigger>;

/// How much of the display a refresh touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshScope {
    /// Message stats, hidden stats and the token readout
    Full,
    /// Token readout only
    Context,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    Init,
    Timer,
    Event(HostEvent),
    /// Context refresh scheduled after an event; `nth` starts at 1
    FollowUp { event: HostEvent, nth: usize },
    FetchRequest,
    FetchResponse,
    UiMutation,
    Limit,
}

impl RefreshTrigger {
    pub fn scope(self) -> RefreshScope {
        match self {
            RefreshTrigger::Init | RefreshTrigger::Timer | RefreshTrigger::Event(_) => {
                RefreshScope::Full
            }
            _ => RefreshScope::Context,
        }
    }

    /// Diagnostic tag used in logs.
    pub fn tag(self) -> String {
        match self {
            RefreshTrigger::Init => "init".to_string(),
            RefreshTrigger::Timer => "timer".to_string(),
            RefreshTrigger::Event(event) => event.literal().to_string(),
            RefreshTrigger::FollowUp { event, nth: 1 } => format!("{}:follow-up", event.literal()),
            RefreshTrigger::FollowUp { event, nth } => {
                format!("{}:follow-up{}", event.literal(), nth)
            }
            RefreshTrigger::FetchRequest => "fetch:request".to_string(),
            RefreshTrigger::FetchResponse => "fetch:response".to_string(),
            RefreshTrigger::UiMutation => "ui-mutation".to_string(),
            RefreshTrigger::Limit => "limit".to_string(),
        }
    }
}
