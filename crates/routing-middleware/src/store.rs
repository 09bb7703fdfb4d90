//! Routing rules and their lookup by destination.

use crate::matchers::Matcher;
use crate::transformers::Transformer;
use serde::{Deserialize, Serialize};

/// Per-destination matcher/transformer configuration.
///
/// `transformers[i]` applies when `matchers[i]` matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingRule {
    pub destination_name: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default, rename = "target_type")]
    pub target_type: String,
    #[serde(default)]
    pub matchers: Vec<Matcher>,
    #[serde(default)]
    pub transformers: Vec<Vec<Transformer>>,
}

/// Holds the routing rules delivered with the CDN settings.
#[derive(Debug, Clone, Default)]
pub struct RuleStore {
    rules: Vec<RoutingRule>,
}

impl RuleStore {
    pub fn new(rules: Vec<RoutingRule>) -> Self {
        Self { rules }
    }

    /// Rules targeting `destination_name`, in declaration order.
    pub fn rules_for_destination<'a>(
        &'a self,
        destination_name: &'a str,
    ) -> impl Iterator<Item = &'a RoutingRule> + 'a {
        self.rules
            .iter()
            .filter(move |rule| rule.destination_name == destination_name)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
