//! Traffic interception - a transparent wrapper around the host's transport.
//!
//! [`InterceptingTransport`] forwards every request untouched and returns
//! the inner transport's result as-is, errors included. On generation
//! requests it additionally:
//! - counts the outgoing prompt with the host tokenizer (pre-flight)
//! - scans a copy of the response body for a reported token count, in a
//!   detached task that never delays the caller (post-flight)
//!
//! Both side channels swallow their own failures.

mod http;
mod reqwest_transport;

pub use http::{HttpRequest, HttpResponse, RequestBody};
pub use reqwest_transport::ReqwestTransport;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::config::Config;
use crate::error::Error;
use crate::host::Host;
use crate::tokens::{extract_token_count, EstimateCell, Provenance, TokenEstimate};
use crate::tracker::{RefreshSender, RefreshTrigger};
use crate::Result;

/// The outbound network entry point being wrapped.
#[async_trait]
pub trait Transport: Send + Sync {
    type Error: fmt::Display + Send + Sync + 'static;

    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, Self::Error>;
}

/// Transport wrapper that taps generation traffic for token counts.
pub struct InterceptingTransport<T, H> {
    inner: T,
    taps: Arc<Taps<H>>,
}

/// State the wrapper shares with its background tasks.
struct Taps<H> {
    host: Arc<H>,
    estimate: EstimateCell,
    refresh: RefreshSender,
    markers: Vec<String>,
}

impl<T, H> InterceptingTransport<T, H>
where
    T: Transport,
    H: Host + 'static,
{
    pub fn new(
        inner: T,
        host: Arc<H>,
        estimate: EstimateCell,
        refresh: RefreshSender,
        config: &Config,
    ) -> Self {
        Self {
            inner,
            taps: Arc::new(Taps {
                host,
                estimate,
                refresh,
                markers: config.generation_markers.clone(),
            }),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// True when `url` targets a generation endpoint.
    pub fn is_generation_request(&self, url: &str) -> bool {
        is_generation_url(url, &self.taps.markers)
    }

    fn spawn_postflight(&self, response: HttpResponse) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("fetch:response skipped, no runtime");
            return;
        };

        let taps = Arc::clone(&self.taps);
        runtime.spawn(async move {
            if let Err(e) = taps.postflight(&response) {
                debug!("fetch:response handler error: {}", e);
            }
        });
    }
}

/// Whether the URL path (or the raw string, for relative URLs) carries a marker.
fn is_generation_url(url: &str, markers: &[String]) -> bool {
    let path = url::Url::parse(url)
        .map(|parsed| parsed.path().to_string())
        .unwrap_or_else(|_| url.to_string());
    markers.iter().any(|marker| path.contains(marker.as_str()))
}

impl<H: Host> Taps<H> {
    fn preflight(&self, request: &HttpRequest) -> Result<()> {
        let Some(body) = request.body.as_ref().map(RequestBody::to_json).transpose()? else {
            return Ok(());
        };
        let Some(prompt) = prompt_text(&body) else {
            return Ok(());
        };
        if !self.host.has_token_counter() {
            return Ok(());
        }

        let tokens = self
            .host
            .count_tokens(&prompt)?
            .to_tokens()
            .ok_or_else(|| Error::Host("unusable token count".to_string()))?;

        self.estimate
            .replace(TokenEstimate::new(tokens, Provenance::InterceptedRequest));
        debug!("fetch:request estimate {}", tokens);
        let _ = self.refresh.send(RefreshTrigger::FetchRequest);
        Ok(())
    }

    fn postflight(&self, response: &HttpResponse) -> Result<()> {
        let Some(tokens) = inspect_response(response)? else {
            return Ok(());
        };

        let previous = self.estimate.tokens();
        if tokens == previous {
            return Ok(());
        }

        self.estimate
            .replace(TokenEstimate::new(tokens, Provenance::InterceptedResponse));
        debug!("fetch:response estimate {} (was {})", tokens, previous);
        let _ = self.refresh.send(RefreshTrigger::FetchResponse);
        Ok(())
    }
}

/// Prompt text of a chat-style body: message contents, one per line.
fn prompt_text(body: &Value) -> Option<String> {
    let messages = body.get("messages")?.as_array()?;
    let lines: Vec<String> = messages.iter().map(message_content).collect();
    Some(lines.join("\n"))
}

fn message_content(message: &Value) -> String {
    match message.get("content") {
        Some(Value::String(text)) => text.clone(),
        // multi-part content: keep the text parts
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

/// Token count reported in a response body, if any.
///
/// JSON bodies must parse; text bodies are tried as JSON and otherwise
/// ignored, as is every other content type.
pub fn inspect_response(response: &HttpResponse) -> Result<Option<u64>> {
    let content_type = response.content_type().unwrap_or_default().to_ascii_lowercase();

    let payload: Value = if content_type.contains("application/json") {
        serde_json::from_slice(&response.body)?
    } else if content_type.contains("text") {
        match serde_json::from_slice(&response.body) {
            Ok(value) => value,
            Err(_) => return Ok(None),
        }
    } else {
        return Ok(None);
    };

    Ok(extract_token_count(&payload))
}

#[async_trait]
impl<T, H> Transport for InterceptingTransport<T, H>
where
    T: Transport,
    H: Host + 'static,
{
    type Error = T::Error;

    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, T::Error> {
        let is_generation = self.is_generation_request(&request.url);

        if is_generation {
            if let Err(e) = self.taps.preflight(&request) {
                debug!("fetch:request skipped: {}", e);
            }
        }

        let response = match self.inner.send(request).await {
            Ok(response) => response,
            Err(e) => {
                debug!("fetch error: {}", e);
                return Err(e);
            }
        };

        if is_generation && response.is_success() {
            self.spawn_postflight(response.clone());
        }

        Ok(response)
    }
}
