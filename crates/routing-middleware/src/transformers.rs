//! Payload transformers applied when a rule's matcher matches.

use crate::error::{RoutingError, RoutingResult};
use crate::path;
use crate::sampling;
use crate::stringify::stringify;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

pub const TRANSFORMER_DROP: &str = "drop";
pub const TRANSFORMER_DROP_PROPERTIES: &str = "drop_properties";
pub const TRANSFORMER_ALLOW_PROPERTIES: &str = "allow_properties";
pub const TRANSFORMER_SAMPLE_EVENT: &str = "sample_event";
pub const TRANSFORMER_MAP_PROPERTIES: &str = "map_properties";
pub const TRANSFORMER_HASH_PROPERTIES: &str = "hash_properties";

/// Dotted path (or `""` for the root) to the keys acted on there.
pub type KeyTarget = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleConfig {
    pub percent: f64,
    #[serde(default)]
    pub path: Option<String>,
}

/// One `map_properties` action. `copy`, `move` and `set` are exclusive, in
/// that precedence. `set` distinguishes an explicit `null` from absence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapAction {
    #[serde(default, deserialize_with = "explicit_value", skip_serializing_if = "Option::is_none")]
    pub set: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy: Option<String>,
    #[serde(default, rename = "move", skip_serializing_if = "Option::is_none")]
    pub move_from: Option<String>,
    #[serde(default)]
    pub to_string: bool,
}

fn explicit_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow: Option<KeyTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drop: Option<KeyTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample: Option<SampleConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<BTreeMap<String, MapAction>>,
}

/// A transformer as it appears in routing rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transformer {
    #[serde(rename = "type")]
    pub transformer_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<TransformerConfig>,
}

impl Transformer {
    pub fn new(transformer_type: impl Into<String>, config: Option<TransformerConfig>) -> Self {
        Self {
            transformer_type: transformer_type.into(),
            config,
        }
    }

    pub fn drop() -> Self {
        Self::new(TRANSFORMER_DROP, None)
    }

    fn section<T>(
        &self,
        section: &'static str,
        pick: impl FnOnce(&TransformerConfig) -> Option<&T>,
    ) -> RoutingResult<&T> {
        self.config
            .as_ref()
            .and_then(pick)
            .ok_or_else(|| RoutingError::MissingConfig {
                transformer: self.transformer_type.clone(),
                section,
            })
    }
}

/// Apply `transformers` in order. `Ok(None)` means the payload was dropped.
pub fn transform(mut payload: Value, transformers: &[Transformer]) -> RoutingResult<Option<Value>> {
    for transformer in transformers {
        match transformer.transformer_type.as_str() {
            TRANSFORMER_DROP => return Ok(None),
            TRANSFORMER_DROP_PROPERTIES => {
                let targets = transformer.section("drop", |c| c.drop.as_ref())?;
                drop_properties(&mut payload, targets);
            }
            TRANSFORMER_ALLOW_PROPERTIES => {
                let targets = transformer.section("allow", |c| c.allow.as_ref())?;
                allow_properties(&mut payload, targets);
            }
            TRANSFORMER_SAMPLE_EVENT => {
                let sample = transformer.section("sample", |c| c.sample.as_ref())?;
                if !sampling::sample_event(&payload, sample.percent, sample.path.as_deref()) {
                    return Ok(None);
                }
            }
            TRANSFORMER_MAP_PROPERTIES => {
                let map = transformer.section("map", |c| c.map.as_ref())?;
                map_properties(&mut payload, map);
            }
            TRANSFORMER_HASH_PROPERTIES => {
                debug!("hash_properties transformer ignored");
            }
            other => return Err(RoutingError::UnsupportedTransformer(other.to_string())),
        }
    }
    Ok(Some(payload))
}

/// Remove the listed keys under each target path.
pub fn drop_properties(payload: &mut Value, targets: &KeyTarget) {
    filter_properties(payload, targets, |obj, keys| {
        for key in keys {
            obj.remove(key);
        }
    });
}

/// Keep only the listed keys under each target path.
pub fn allow_properties(payload: &mut Value, targets: &KeyTarget) {
    filter_properties(payload, targets, |obj, keys| {
        obj.retain(|key, _| keys.contains(key));
    });
}

fn filter_properties<F>(payload: &mut Value, targets: &KeyTarget, filter: F)
where
    F: Fn(&mut Map<String, Value>, &[String]),
{
    for (target, keys) in targets {
        let Some(matched) = path::get_mut(payload, target) else {
            continue;
        };
        match matched {
            Value::Object(obj) => filter(obj, keys),
            Value::Array(items) => {
                for item in items.iter_mut() {
                    if let Value::Object(obj) = item {
                        filter(obj, keys);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Apply `map_properties` actions.
///
/// Every read goes against a snapshot taken before the first action, so the
/// result does not depend on the order of the actions.
pub fn map_properties(payload: &mut Value, actions: &BTreeMap<String, MapAction>) {
    let snapshot = payload.clone();

    for (key, action) in actions {
        let segs = path::segments(key);
        let parent = if segs.len() > 1 {
            path::get_in(&snapshot, &segs[..segs.len() - 1])
        } else {
            Some(&*payload)
        };
        // Containers and null parents are written through; a null parent
        // becomes a fresh container. Missing or scalar parents skip the key.
        if !matches!(
            parent,
            Some(Value::Object(_)) | Some(Value::Array(_)) | Some(Value::Null)
        ) {
            continue;
        }

        if let Some(copy) = &action.copy {
            if let Some(value) = path::get(&snapshot, copy) {
                path::set(payload, key, value.clone());
            }
        } else if let Some(move_from) = &action.move_from {
            if let Some(value) = path::get(&snapshot, move_from) {
                path::set(payload, key, value.clone());
            }
            path::remove(payload, move_from);
        } else if let Some(value) = &action.set {
            path::set(payload, key, value.clone());
        }

        if action.to_string {
            let encoded = match path::get(payload, key) {
                Some(Value::String(_)) | Some(Value::Object(_)) | Some(Value::Array(_)) => continue,
                Some(value) => stringify(value),
                None => "undefined".to_string(),
            };
            path::set(payload, key, Value::String(encoded));
        }
    }
}
