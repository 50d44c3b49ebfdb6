//! Tracker session - the controller that owns all per-session state.
//!
//! One [`Tracker`] lives for as long as the host page. It:
//! - reconciles the token estimate from the intercepted cell and the host
//! - renders readouts, skipping writes that would not change anything
//! - reacts to host lifecycle events on a fixed refresh schedule
//! - edits the token limit and the conversation summary
//!
//! All handlers run on one task ([`Tracker::run`]); the interception layer
//! and background timers talk to it only through the shared
//! [`EstimateCell`] and the refresh channel.

mod trigger;

pub use trigger::{RefreshReceiver, RefreshScope, RefreshSender, RefreshTrigger};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::display::{ContextReadout, DisplaySink};
use crate::error::Error;
use crate::events::{EventNames, HostEvent, HostNotification};
use crate::host::{Host, Readiness};
use crate::intercept::{InterceptingTransport, Transport};
use crate::observer::TokenUiObserver;
use crate::stats::MessageStats;
use crate::storage::{KeyValueStore, PanelState, TokenLimit};
use crate::tokens::{parse_token_count, EstimateCell, Provenance, TokenEstimate};
use crate::Result;

type NotificationReceiver = mpsc::UnboundedReceiver<HostNotification>;

/// Per-session tracker state.
pub struct Tracker<H: Host + 'static> {
    host: Arc<H>,
    config: Config,
    store: Box<dyn KeyValueStore>,
    display: Box<dyn DisplaySink>,
    estimate: EstimateCell,
    /// Last rendered (tokens, provenance); only used to skip redundant writes
    last_displayed: Option<(u64, Provenance)>,
    limit: TokenLimit,
    panel: PanelState,
    ready: bool,
    last_hidden: Option<String>,
    observer: TokenUiObserver,
    event_names: EventNames,
    refresh_tx: RefreshSender,
    refresh_rx: Option<RefreshReceiver>,
    events_rx: Option<NotificationReceiver>,
}

impl<H: Host + 'static> Tracker<H> {
    pub fn new(
        host: Arc<H>,
        config: Config,
        store: Box<dyn KeyValueStore>,
        display: Box<dyn DisplaySink>,
    ) -> Self {
        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();
        let limit = TokenLimit::load(store.as_ref());
        let panel = PanelState::load(store.as_ref());
        let event_names = EventNames::resolve(host.event_types().as_ref());

        Self {
            host,
            config,
            store,
            display,
            estimate: EstimateCell::new(),
            last_displayed: None,
            limit,
            panel,
            ready: false,
            last_hidden: None,
            observer: TokenUiObserver::new(),
            event_names,
            refresh_tx,
            refresh_rx: Some(refresh_rx),
            events_rx: None,
        }
    }

    /// Shared intercepted-estimate cell.
    pub fn estimate_cell(&self) -> EstimateCell {
        self.estimate.clone()
    }

    pub fn refresh_sender(&self) -> RefreshSender {
        self.refresh_tx.clone()
    }

    /// Wrap the host's transport so generation traffic feeds this tracker.
    pub fn intercept<T: Transport>(&self, inner: T) -> InterceptingTransport<T, H> {
        InterceptingTransport::new(
            inner,
            Arc::clone(&self.host),
            self.estimate.clone(),
            self.refresh_tx.clone(),
            &self.config,
        )
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn limit(&self) -> TokenLimit {
        self.limit
    }

    pub fn panel_state(&self) -> &PanelState {
        &self.panel
    }

    /// Poll the host until it reports ready, within the configured budget.
    ///
    /// A host that exists but never loads a chat is treated as ready once
    /// the budget runs out; an unreachable host leaves the session degraded.
    pub async fn wait_for_host(&mut self) -> bool {
        let attempts = self.config.ready_poll_attempts.max(1);
        let mut state = Readiness::Unavailable;

        for attempt in 1..=attempts {
            state = self.host.readiness();
            if state == Readiness::Ready {
                debug!("host ready after {} polls", attempt);
                self.ready = true;
                return true;
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.ready_poll_interval()).await;
            }
        }

        self.ready = state == Readiness::NoChat;
        if !self.ready {
            warn!("host not ready after {} polls, running degraded", attempts);
        }
        self.ready
    }

    /// Register for every resolved lifecycle event name.
    pub fn subscribe(&mut self) -> bool {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribed = false;
        for name in self.event_names.names() {
            subscribed |= self.host.subscribe(name, tx.clone());
        }

        if subscribed {
            self.events_rx = Some(rx);
        } else {
            debug!("host has no event bus, relying on the refresh timer");
        }
        subscribed
    }

    /// (Re)start watching the host's token label.
    pub fn arm_observer(&mut self) {
        self.observer.arm(
            Arc::clone(&self.host),
            self.refresh_tx.clone(),
            self.config.observer_retry_attempts,
            self.config.observer_retry_interval(),
        );
    }

    /// Startup sequence: readiness wait, first render, subscriptions, observer.
    pub async fn start(&mut self) {
        let ready = self.wait_for_host().await;
        info!("tracker starting (host ready: {})", ready);
        self.refresh(RefreshTrigger::Init);
        self.subscribe();
        self.arm_observer();
    }

    /// Best current estimate.
    ///
    /// A positive intercepted estimate always wins; otherwise the visible
    /// conversation is recounted by the host.
    pub fn best_estimate(&self) -> TokenEstimate {
        match self.estimate.get() {
            Some(intercepted) if intercepted.tokens > 0 => intercepted,
            _ => self.recompute(),
        }
    }

    fn recompute(&self) -> TokenEstimate {
        let Some(snapshot) = self.host.snapshot() else {
            return TokenEstimate::zero(Provenance::Empty);
        };

        let text = snapshot.visible_text();
        if text.trim().is_empty() {
            return TokenEstimate::zero(Provenance::Empty);
        }

        if !self.host.has_token_counter() {
            return self.scrape().unwrap_or(TokenEstimate::zero(Provenance::HostUnavailable));
        }

        match self.host.count_tokens(&text) {
            Ok(raw) => match raw.to_tokens() {
                Some(tokens) => TokenEstimate::new(tokens, Provenance::HostRecompute),
                None => {
                    debug!("host returned an unusable count: {:?}", raw);
                    TokenEstimate::zero(Provenance::Error)
                }
            },
            Err(Error::HostUnavailable(_)) => {
                self.scrape().unwrap_or(TokenEstimate::zero(Provenance::HostUnavailable))
            }
            Err(e) => {
                debug!("host token count failed: {}", e);
                TokenEstimate::zero(Provenance::Error)
            }
        }
    }

    /// Token count shown in the host's own label.
    fn scrape(&self) -> Option<TokenEstimate> {
        let text = self.host.token_ui_text()?;
        parse_token_count(&text)
            .filter(|tokens| *tokens > 0)
            .map(|tokens| TokenEstimate::new(tokens, Provenance::DomScraped))
    }

    /// Render the token readout. Returns false when the write was skipped
    /// because neither the count nor its provenance changed.
    pub fn update_context_display(&mut self, trigger: RefreshTrigger) -> bool {
        let estimate = self.best_estimate();
        let key = (estimate.tokens, estimate.method);

        if self.last_displayed == Some(key) {
            return false;
        }

        debug!(
            "context display {} via {} ({})",
            estimate.tokens,
            estimate.method,
            trigger.tag()
        );
        self.last_displayed = Some(key);
        self.display
            .show_context(&ContextReadout::new(estimate, self.limit.get()));
        true
    }

    /// Current message statistics, `None` without a loaded chat.
    pub fn stats(&self) -> Option<MessageStats> {
        self.host
            .snapshot()
            .map(|snapshot| MessageStats::from_snapshot(&snapshot))
    }

    fn update_message_stats(&mut self) {
        let Some(stats) = self.stats() else {
            return;
        };

        if let Some(text) = stats.last_hidden_text.as_ref().filter(|t| !t.is_empty()) {
            self.last_hidden = Some(text.clone());
        }

        self.display.show_messages(&stats.messages_label());
        self.display.show_hidden(
            &stats.hidden_label(),
            &stats.hidden_tooltip(self.last_hidden.as_deref()),
        );
    }

    /// Run one refresh. Message stats are only touched once the host is ready.
    pub fn refresh(&mut self, trigger: RefreshTrigger) {
        debug!("refresh ({})", trigger.tag());
        if trigger.scope() == RefreshScope::Full && self.ready {
            self.update_message_stats();
        }
        self.update_context_display(trigger);
    }

    /// React to a raw host notification.
    pub fn handle_notification(&mut self, notification: HostNotification) {
        let Some(event) = self.event_names.lookup(&notification.name) else {
            debug!("ignoring unknown host event {:?}", notification.name);
            return;
        };

        let plan = event.plan(&self.config);

        if plan.capture_hidden {
            if let Some(id) = notification.message_id() {
                self.capture_hidden(id);
            }
        }

        if plan.reset_intercepted {
            self.estimate.clear();
            self.last_hidden = None;
            self.arm_observer();
        }

        if plan.delay.is_zero() {
            self.refresh(RefreshTrigger::Event(event));
        } else {
            self.schedule(plan.delay, RefreshTrigger::Event(event));
        }

        for (i, delay) in plan.follow_ups.into_iter().enumerate() {
            self.schedule(delay, RefreshTrigger::FollowUp { event, nth: i + 1 });
        }
    }

    /// Convenience for hosts that deliver typed events directly.
    pub fn handle_event(&mut self, event: HostEvent) {
        self.handle_notification(HostNotification::new(event.literal()));
    }

    fn capture_hidden(&mut self, message_id: u64) {
        let Some(snapshot) = self.host.snapshot() else {
            return;
        };
        if let Some((_, message)) = snapshot.find(message_id) {
            self.last_hidden = Some(message.text().to_string());
        }
    }

    /// Send `trigger` to the loop after `delay`, detached.
    fn schedule(&self, delay: Duration, trigger: RefreshTrigger) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("cannot schedule {} without a runtime", trigger.tag());
            return;
        };

        let tx = self.refresh_tx.clone();
        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(trigger);
        });
    }

    /// Validate, persist and apply a new token limit from user input.
    ///
    /// Invalid input leaves the limit untouched.
    pub fn set_limit(&mut self, input: &str) -> Result<TokenLimit> {
        let limit = TokenLimit::parse(input)?;
        limit.save(self.store.as_ref())?;
        self.limit = limit;

        self.last_displayed = None;
        self.update_context_display(RefreshTrigger::Limit);
        Ok(limit)
    }

    pub fn set_panel_state(&mut self, panel: PanelState) -> Result<()> {
        panel.save(self.store.as_ref())?;
        self.panel = panel;
        Ok(())
    }

    pub fn toggle_collapsed(&mut self) -> Result<bool> {
        let mut panel = self.panel.clone();
        panel.collapsed = !panel.collapsed;
        self.set_panel_state(panel)?;
        Ok(self.panel.collapsed)
    }

    /// Current summary: message index and text.
    pub fn summary(&self) -> Option<(usize, String)> {
        let snapshot = self.host.snapshot()?;
        snapshot
            .summary()
            .map(|(idx, text)| (idx, text.to_string()))
    }

    /// Overwrite the current summary and ask the host to persist the chat.
    pub fn edit_summary(&mut self, text: &str) -> Result<usize> {
        let (index, _) = self
            .summary()
            .ok_or_else(|| Error::Host("No summary to edit".to_string()))?;

        self.host.set_summary(index, text)?;
        self.host.save_chat()?;
        info!("summary on message #{} updated", index);
        Ok(index)
    }

    /// Ask the host's summarizer for a fresh summary.
    pub fn request_summary(&self) -> Result<()> {
        self.host.request_summary()
    }

    /// Ask the host's summarizer to bring back the previous summary.
    pub fn restore_summary(&self) -> Result<()> {
        self.host.restore_summary()
    }

    /// Drive the session until `shutdown` resolves.
    pub async fn run<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        self.start().await;

        let Some(mut refresh_rx) = self.refresh_rx.take() else {
            warn!("tracker loop already ran");
            return;
        };
        let mut events_rx = self.events_rx.take();

        // a zero period would panic inside tokio
        let period = self.config.refresh_interval().max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => self.refresh(RefreshTrigger::Timer),
                Some(trigger) = refresh_rx.recv() => self.refresh(trigger),
                Some(notification) = next_notification(&mut events_rx) => {
                    self.handle_notification(notification)
                }
            }
        }

        self.observer.disarm();
        info!("tracker stopped");
    }
}

async fn next_notification(rx: &mut Option<NotificationReceiver>) -> Option<HostNotification> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
