//! Source and destination middleware.
//!
//! Source middleware sees every event before any plugin runs. Destination
//! middleware sees the copy of an event bound for one destination. Returning
//! `None` drops the event (for everyone, or for that destination only).

use crate::PluginResult;
use events_core::Event;
use routing_middleware::RoutingMiddleware;
use std::sync::Arc;
use tracing::debug;

/// Rewrites or drops events before the pipeline runs.
pub trait SourceMiddleware: Send + Sync {
    fn apply(&self, event: Event) -> PluginResult<Option<Event>>;
}

/// Rewrites or drops an event for a single destination.
pub trait DestinationMiddleware: Send + Sync {
    fn apply(&self, destination: &str, event: Event) -> PluginResult<Option<Event>>;
}

struct FnSource<F>(F);

impl<F> SourceMiddleware for FnSource<F>
where
    F: Fn(Event) -> Option<Event> + Send + Sync,
{
    fn apply(&self, event: Event) -> PluginResult<Option<Event>> {
        Ok((self.0)(event))
    }
}

struct FnDestination<F>(F);

impl<F> DestinationMiddleware for FnDestination<F>
where
    F: Fn(&str, Event) -> Option<Event> + Send + Sync,
{
    fn apply(&self, destination: &str, event: Event) -> PluginResult<Option<Event>> {
        Ok((self.0)(destination, event))
    }
}

/// Wrap a closure as source middleware.
pub fn source_middleware<F>(f: F) -> Arc<dyn SourceMiddleware>
where
    F: Fn(Event) -> Option<Event> + Send + Sync + 'static,
{
    Arc::new(FnSource(f))
}

/// Wrap a closure as destination middleware.
pub fn destination_middleware<F>(f: F) -> Arc<dyn DestinationMiddleware>
where
    F: Fn(&str, Event) -> Option<Event> + Send + Sync + 'static,
{
    Arc::new(FnDestination(f))
}

/// Routing rules evaluated against the event's JSON payload.
impl DestinationMiddleware for RoutingMiddleware {
    fn apply(&self, destination: &str, event: Event) -> PluginResult<Option<Event>> {
        let payload = event.to_value()?;
        match RoutingMiddleware::apply(self, payload, destination)? {
            Some(routed) => Ok(Some(Event::from_value(routed)?)),
            None => Ok(None),
        }
    }
}

/// Run `chain` in order, stopping at the first drop.
pub(crate) fn apply_destination_middleware(
    destination: &str,
    mut event: Event,
    chain: &[Arc<dyn DestinationMiddleware>],
) -> PluginResult<Option<Event>> {
    for middleware in chain {
        match middleware.apply(destination, event)? {
            Some(next) => event = next,
            None => {
                debug!(destination = %destination, "Event dropped by destination middleware");
                return Ok(None);
            }
        }
    }
    Ok(Some(event))
}

/// Run `chain` in order, stopping at the first drop.
pub(crate) fn apply_source_middleware(
    mut event: Event,
    chain: &[Arc<dyn SourceMiddleware>],
) -> PluginResult<Option<Event>> {
    for middleware in chain {
        match middleware.apply(event)? {
            Some(next) => event = next,
            None => return Ok(None),
        }
    }
    Ok(Some(event))
}
