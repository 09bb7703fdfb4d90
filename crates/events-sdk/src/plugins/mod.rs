//! Built-in plugins.

mod environment;
mod ingest;

pub use environment::{EnvironmentEnrichment, LIBRARY_NAME};
pub use ingest::{EventsApiDestination, EVENTS_API};
