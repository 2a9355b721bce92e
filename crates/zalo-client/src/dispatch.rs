//! Handler registry and concurrent dispatch.
//!
//! The registry is filled before polling starts and then handed to the
//! [`Dispatcher`], which owns it read-only. Every matching handler runs as
//! its own task; a semaphore bounds how many run at once. Handler errors and
//! panics are caught, logged, and reported on the failure channel.

use futures_util::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, warn};
use zalo_core::MessageEvent;

/// Future returned by a handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// A message handler.
pub type Handler = Arc<dyn Fn(MessageEvent) -> HandlerFuture + Send + Sync>;

/// A content predicate for pattern handlers.
pub type Predicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

fn boxed<F, Fut>(f: F) -> Handler
where
    F: Fn(MessageEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |event| Box::pin(f(event)) as HandlerFuture)
}

struct PatternEntry {
    label: String,
    predicate: Predicate,
    handler: Handler,
}

/// Command, pattern, and general handlers, plus the command prefix.
#[derive(Default)]
pub struct HandlerRegistry {
    prefix: String,
    commands: HashMap<String, Handler>,
    patterns: Vec<PatternEntry>,
    general: Option<Handler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry whose commands must be preceded by `prefix`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Register a handler for content equal to `prefix + name`.
    pub fn command<F, Fut>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(MessageEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.commands.insert(name.to_string(), boxed(f));
        self
    }

    /// Register one handler under several command names.
    pub fn commands<F, Fut>(&mut self, names: &[&str], f: F) -> &mut Self
    where
        F: Fn(MessageEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler = boxed(f);
        for name in names {
            self.commands.insert(name.to_string(), handler.clone());
        }
        self
    }

    /// Register a handler for every message whose content satisfies
    /// `predicate`. Patterns are evaluated in registration order.
    pub fn pattern<P, F, Fut>(&mut self, label: &str, predicate: P, f: F) -> &mut Self
    where
        P: Fn(&str) -> bool + Send + Sync + 'static,
        F: Fn(MessageEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.patterns.push(PatternEntry {
            label: label.to_string(),
            predicate: Arc::new(predicate),
            handler: boxed(f),
        });
        self
    }

    /// Register the general handler, called for every message.
    pub fn on_message<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: Fn(MessageEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.general = Some(boxed(f));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.patterns.is_empty() && self.general.is_none()
    }

    /// Every handler matching `content`, labelled, in invocation order:
    /// general, then command, then patterns.
    pub fn matches(&self, content: &str) -> Vec<(String, Handler)> {
        let mut matched = Vec::new();

        if let Some(general) = &self.general {
            matched.push(("on_message".to_string(), general.clone()));
        }

        if let Some(name) = content.strip_prefix(self.prefix.as_str()) {
            if let Some(handler) = self.commands.get(name) {
                matched.push((format!("command:{}{name}", self.prefix), handler.clone()));
            }
        }

        for entry in &self.patterns {
            if (entry.predicate)(content) {
                matched.push((format!("pattern:{}", entry.label), entry.handler.clone()));
            }
        }

        matched
    }
}

/// Dispatcher settings.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Maximum number of handlers running at once.
    pub max_concurrency: usize,
    /// Capacity of the failure channel; failures beyond it are only logged.
    pub failure_buffer: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 64,
            failure_buffer: 256,
        }
    }
}

/// A handler that returned an error or panicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    pub handler: String,
    pub message_id: String,
    pub error: String,
}

/// Routes events to matching handlers without waiting for them.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    permits: Arc<Semaphore>,
    failures: Option<mpsc::Sender<HandlerFailure>>,
}

impl Dispatcher {
    /// Dispatcher whose handler failures are only logged.
    pub fn new(registry: HandlerRegistry, config: &DispatchConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            permits: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            failures: None,
        }
    }

    /// Dispatcher that also reports handler failures on the returned channel.
    pub fn with_failure_channel(
        registry: HandlerRegistry,
        config: &DispatchConfig,
    ) -> (Self, mpsc::Receiver<HandlerFailure>) {
        let (tx, rx) = mpsc::channel(config.failure_buffer.max(1));
        let mut dispatcher = Self::new(registry, config);
        dispatcher.failures = Some(tx);
        (dispatcher, rx)
    }

    /// Schedule every handler matching `event`. Returns the number scheduled.
    ///
    /// Must be called from within a tokio runtime. Never waits for handlers.
    pub fn dispatch(&self, event: MessageEvent) -> usize {
        let matched = self.registry.matches(&event.content_text());
        let count = matched.len();

        if count == 0 {
            debug!(msg_id = %event.message_id, "no handler matched");
            return 0;
        }

        for (label, handler) in matched {
            let event = event.clone();
            let permits = self.permits.clone();
            let failures = self.failures.clone();

            tokio::spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                let message_id = event.message_id.clone();

                let outcome = AssertUnwindSafe(async move { handler(event).await })
                    .catch_unwind()
                    .await;

                let error = match outcome {
                    Ok(Ok(())) => return,
                    Ok(Err(e)) => format!("{e:#}"),
                    Err(panic) => format!("handler panicked: {}", panic_message(panic.as_ref())),
                };

                warn!(handler = %label, msg_id = %message_id, "handler failed: {}", error);

                if let Some(tx) = failures {
                    let failure = HandlerFailure {
                        handler: label,
                        message_id,
                        error,
                    };
                    if tx.try_send(failure).is_err() {
                        debug!("failure channel full or closed, dropping report");
                    }
                }
            });
        }

        count
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
