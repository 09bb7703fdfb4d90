//! Core types for the events SDK.
//!
//! This crate provides:
//! - Event: the canonical record built for every tracking call
//! - EventFactory: builds events from call arguments and the current identity
//! - Context: wraps one event for its whole pipeline lifetime
//! - Stats: metrics collaborator injected into every Context
//! - Validation of events before they enter the pipeline

mod context;
mod error;
mod event;
mod factory;
mod identity;
mod message_id;
mod stats;
mod validation;

pub use context::{
    CancelationOptions, Context, ContextCancelation, ContextLog, FailedDelivery, LogLevel,
    SerializedContext,
};
pub use error::{CoreError, CoreResult, ValidationError};
pub use event::{Event, EventOptions, EventType, Properties};
pub use factory::EventFactory;
pub use identity::{IdentityProvider, MemoryIdentity};
pub use message_id::create_message_id;
pub use stats::{CoreStats, Metric, MetricKind, Stats};
pub use validation::validate_event;
