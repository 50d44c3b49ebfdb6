//! Watches the host's own token-count label and requests a refresh whenever
//! it changes. The label may not exist yet at startup, so lookup is retried
//! a bounded number of times before the signal is dropped for the session.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::host::Host;
use crate::tracker::{RefreshSender, RefreshTrigger};

/// Handle to the background watcher; re-arming replaces it.
#[derive(Debug, Default)]
pub struct TokenUiObserver {
    handle: Option<JoinHandle<()>>,
}

impl TokenUiObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start watching, dropping any previous watcher first.
    pub fn arm<H: Host + 'static>(
        &mut self,
        host: Arc<H>,
        refresh: RefreshSender,
        retries: u32,
        retry_interval: Duration,
    ) {
        self.disarm();

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("token UI observer not started, no runtime");
            return;
        };
        self.handle = Some(runtime.spawn(observe(host, refresh, retries, retry_interval)));
    }

    pub fn disarm(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Still looking for the label or watching it.
    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for TokenUiObserver {
    fn drop(&mut self) {
        self.disarm();
    }
}

async fn observe<H: Host>(host: Arc<H>, refresh: RefreshSender, retries: u32, retry_interval: Duration) {
    let mut attempt = 0;
    let mut label = loop {
        if let Some(rx) = host.watch_token_ui() {
            break rx;
        }
        if attempt >= retries {
            debug!("token UI label not found after {} retries, giving up", retries);
            return;
        }
        attempt += 1;
        tokio::time::sleep(retry_interval).await;
    };

    debug!("token UI observer attached after {} retries", attempt);
    while label.changed().await.is_ok() {
        if refresh.send(RefreshTrigger::UiMutation).is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::fake::FakeHost;
    use tokio::sync::{mpsc, watch};

    #[tokio::test]
    async fn test_gives_up_after_bounded_retries() {
        let host = Arc::new(FakeHost::default());
        let (tx, _rx) = mpsc::unbounded_channel();

        let mut observer = TokenUiObserver::new();
        observer.arm(host.clone(), tx, 3, Duration::from_millis(1));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(!observer.is_active());
        assert_eq!(*host.watch_calls.lock().unwrap(), 4);
    }

    #[tokio::test]
    async fn test_label_changes_trigger_refresh() {
        let host = Arc::new(FakeHost::default());
        let (label_tx, label_rx) = watch::channel("1,000".to_string());
        *host.ui_watch.lock().unwrap() = Some(label_rx);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut observer = TokenUiObserver::new();
        observer.arm(host.clone(), tx, 3, Duration::from_millis(1));
        tokio::time::sleep(Duration::from_millis(20)).await;

        label_tx.send("2,000".to_string()).unwrap();
        let trigger = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert_eq!(trigger, Some(RefreshTrigger::UiMutation));
        assert!(observer.is_active());
    }

    #[tokio::test]
    async fn test_rearm_replaces_watcher() {
        let host = Arc::new(FakeHost::default());
        let (label_tx, label_rx) = watch::channel(String::new());
        *host.ui_watch.lock().unwrap() = Some(label_rx);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut observer = TokenUiObserver::new();
        observer.arm(host.clone(), tx.clone(), 0, Duration::from_millis(1));
        observer.arm(host.clone(), tx, 0, Duration::from_millis(1));
        tokio::time::sleep(Duration::from_millis(20)).await;

        label_tx.send("5".to_string()).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 1);

        observer.disarm();
        assert!(!observer.is_active());
    }
}
