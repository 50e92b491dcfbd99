//! Webhook handler and middleware traits.
//!
//! Handlers are registered against a [`KindPattern`] and run in three tiers:
//! exact-kind handlers first, then prefix/suffix globs, then catch-alls. Within
//! a tier, handlers run in registration order. The first handler error stops
//! dispatch.
//!
//! Middleware wraps the whole dispatch. Each middleware receives a [`Next`]
//! continuation and decides whether, and when, to call it.

use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::debug;

use crate::error::HandlerError;
use crate::webhook::event::WebhookEvent;
use crate::webhook::pattern::KindPattern;

/// Application logic invoked for matching webhook events.
///
/// # Examples
///
/// ```rust
/// use basecamp_sdk::webhook::{WebhookEvent, WebhookHandler};
/// use basecamp_sdk::error::HandlerError;
/// use async_trait::async_trait;
///
/// struct TodoAuditor;
///
/// #[async_trait]
/// impl WebhookHandler for TodoAuditor {
///     async fn handle_event(&self, event: &WebhookEvent) -> Result<(), HandlerError> {
///         println!("{} on recording {:?}", event.kind, event.recording.as_ref().and_then(|r| r.id));
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait WebhookHandler: Send + Sync {
    /// Handle a webhook event.
    ///
    /// Returning an error fails the delivery: the receiver reports it to the
    /// caller and does not mark the event as delivered.
    async fn handle_event(&self, event: &WebhookEvent) -> Result<(), HandlerError>;
}

/// Adapter that turns a synchronous closure into a [`WebhookHandler`].
pub struct FnHandler<F>(F);

#[async_trait]
impl<F> WebhookHandler for FnHandler<F>
where
    F: Fn(&WebhookEvent) -> Result<(), HandlerError> + Send + Sync,
{
    async fn handle_event(&self, event: &WebhookEvent) -> Result<(), HandlerError> {
        (self.0)(event)
    }
}

/// Wrap a closure as a shareable handler.
///
/// ```rust
/// use basecamp_sdk::webhook::handler_fn;
///
/// let handler = handler_fn(|event| {
///     println!("received {}", event.kind);
///     Ok(())
/// });
/// ```
pub fn handler_fn<F>(f: F) -> Arc<dyn WebhookHandler>
where
    F: Fn(&WebhookEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

/// Logic that wraps handler dispatch.
///
/// Middleware registered first runs outermost. Calling `next.run(event)`
/// continues the chain; returning without calling it skips the remaining
/// middleware and every handler.
///
/// ```rust
/// use basecamp_sdk::webhook::{Next, WebhookEvent, WebhookMiddleware};
/// use basecamp_sdk::error::HandlerError;
/// use async_trait::async_trait;
///
/// struct Timing;
///
/// #[async_trait]
/// impl WebhookMiddleware for Timing {
///     async fn handle(&self, event: &WebhookEvent, next: Next) -> Result<(), HandlerError> {
///         let started = std::time::Instant::now();
///         let result = next.run(event).await;
///         println!("{} took {:?}", event.kind, started.elapsed());
///         result
///     }
/// }
/// ```
#[async_trait]
pub trait WebhookMiddleware: Send + Sync {
    async fn handle(&self, event: &WebhookEvent, next: Next) -> Result<(), HandlerError>;
}

/// Boxed future returned by [`Next::run`].
pub type DispatchFuture<'e> = Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'e>>;

/// Continuation for the remainder of a middleware chain.
#[derive(Clone)]
pub struct Next {
    chain: Arc<[Arc<dyn WebhookMiddleware>]>,
    position: usize,
    handlers: Arc<HandlerSet>,
}

impl Next {
    pub(crate) fn new(chain: Arc<[Arc<dyn WebhookMiddleware>]>, handlers: Arc<HandlerSet>) -> Self {
        Self {
            chain,
            position: 0,
            handlers,
        }
    }

    /// Run the rest of the chain, ending with handler dispatch.
    pub fn run<'e>(self, event: &'e WebhookEvent) -> DispatchFuture<'e> {
        Box::pin(async move {
            match self.chain.get(self.position).cloned() {
                Some(middleware) => {
                    let next = Next {
                        chain: Arc::clone(&self.chain),
                        position: self.position + 1,
                        handlers: Arc::clone(&self.handlers),
                    };
                    middleware.handle(event, next).await
                }
                None => self.handlers.dispatch(event).await,
            }
        })
    }
}

impl std::fmt::Debug for Next {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next")
            .field("remaining_middleware", &(self.chain.len() - self.position))
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// A handler bound to the pattern it was registered under.
#[derive(Clone)]
pub(crate) struct Registration {
    pub(crate) pattern: KindPattern,
    pub(crate) handler: Arc<dyn WebhookHandler>,
}

/// Snapshot of registered handlers, taken once per delivery.
#[derive(Clone, Default)]
pub(crate) struct HandlerSet {
    registrations: Vec<Registration>,
}

impl HandlerSet {
    pub(crate) fn new(registrations: Vec<Registration>) -> Self {
        Self { registrations }
    }

    pub(crate) fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Run every matching handler, tier by tier, stopping at the first error.
    pub(crate) async fn dispatch(&self, event: &WebhookEvent) -> Result<(), HandlerError> {
        let mut invoked = 0usize;
        for tier in 0..=2u8 {
            for registration in self
                .registrations
                .iter()
                .filter(|r| r.pattern.tier() == tier && r.pattern.matches(&event.kind))
            {
                invoked += 1;
                registration.handler.handle_event(event).await?;
            }
        }

        debug!(
            event_id = %event.id,
            kind = %event.kind,
            handlers = invoked,
            "Webhook event dispatched"
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
