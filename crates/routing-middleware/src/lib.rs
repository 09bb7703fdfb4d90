//! Destination routing for the events SDK.
//!
//! This crate provides:
//! - Matchers: `all` and FQL IR evaluation against an event payload
//! - Transformers: drop, allow/drop properties, map properties, sampling
//! - Consistent sampling that agrees with the server-side sampler
//! - RoutingMiddleware: applies a destination's routing rules to a payload

mod error;
mod matchers;
mod middleware;
pub mod path;
mod sampling;
mod store;
mod stringify;
mod transformers;

pub use error::{RoutingError, RoutingResult};
pub use matchers::{glob_match, matches, Matcher, MatcherConfig, MATCHER_ALL, MATCHER_FQL};
pub use middleware::RoutingMiddleware;
pub use sampling::{consistent_value, sample_event, sample_percent};
pub use store::{RoutingRule, RuleStore};
pub use stringify::stringify;
pub use transformers::{
    allow_properties, drop_properties, map_properties, transform, KeyTarget, MapAction,
    SampleConfig, Transformer, TransformerConfig,
};
