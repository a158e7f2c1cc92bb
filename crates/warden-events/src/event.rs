//! Event envelope and subscriber trait.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error type returned by event handlers.
///
/// Handler failures are logged by the bus and never propagated to the
/// publisher, so any error type will do.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// An event delivered to subscribers.
///
/// Events are addressed by a free-form type string (e.g. `player.connect`)
/// and carry an arbitrary JSON payload. The envelope is shared between all
/// subscribers of a publish via [`Arc`], so handlers must not rely on
/// exclusive access to the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginEvent {
    /// The event-type string this event was published under.
    pub event_type: String,
    /// Publisher-supplied payload.
    pub payload: Value,
    /// When the event was handed to the bus.
    pub published_at: DateTime<Utc>,
}

impl PluginEvent {
    /// Create a new event stamped with the current time.
    #[must_use]
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            published_at: Utc::now(),
        }
    }
}

/// Trait for event subscribers.
///
/// Each delivery runs on its own detached task, so implementations may
/// await freely without delaying the publisher or other subscribers. A
/// returned error is logged by the bus and otherwise ignored.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Called once per matching published event.
    async fn handle(&self, event: Arc<PluginEvent>) -> Result<(), HandlerError>;

    /// Optional name for log output.
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "anonymous"
    }
}

impl std::fmt::Debug for dyn EventHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandler")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

/// Adapter that turns an async closure into an [`EventHandler`].
pub struct FnHandler<F, Fut> {
    name: String,
    f: F,
    _marker: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnHandler<F, Fut>
where
    F: Fn(Arc<PluginEvent>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    /// Wrap a closure under the given name.
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F, Fut>
where
    F: Fn(Arc<PluginEvent>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, event: Arc<PluginEvent>) -> Result<(), HandlerError> {
        (self.f)(event).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}
