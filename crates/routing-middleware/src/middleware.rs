//! Applies routing rules to a destination-bound payload.

use crate::error::RoutingResult;
use crate::matchers::matches;
use crate::store::{RoutingRule, RuleStore};
use crate::transformers::transform;
use serde_json::Value;
use tracing::debug;

/// Evaluates the rules of a [`RuleStore`] for one destination at a time.
#[derive(Debug, Clone, Default)]
pub struct RoutingMiddleware {
    store: RuleStore,
}

impl RoutingMiddleware {
    pub fn new(rules: Vec<RoutingRule>) -> Self {
        Self {
            store: RuleStore::new(rules),
        }
    }

    pub fn store(&self) -> &RuleStore {
        &self.store
    }

    /// Run every rule for `destination` against `payload`.
    ///
    /// For each matcher that matches, the transformer list at the same index
    /// is applied. `Ok(None)` means the payload was dropped for this
    /// destination; no further rules are evaluated.
    pub fn apply(&self, mut payload: Value, destination: &str) -> RoutingResult<Option<Value>> {
        for rule in self.store.rules_for_destination(destination) {
            for (i, matcher) in rule.matchers.iter().enumerate() {
                if !matches(&payload, matcher) {
                    continue;
                }
                let transformers = rule.transformers.get(i).map(Vec::as_slice).unwrap_or(&[]);
                match transform(payload, transformers)? {
                    Some(next) => payload = next,
                    None => {
                        debug!(destination = %destination, scope = %rule.scope, "Payload dropped by routing rule");
                        return Ok(None);
                    }
                }
            }
        }
        Ok(Some(payload))
    }
}
