//! The canonical event record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Free-form JSON object used for properties, traits, context and integrations.
pub type Properties = Map<String, Value>;

/// Integration key that toggles every destination at once.
const ALL_INTEGRATIONS: &str = "All";

/// Kind of tracking call that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Track,
    Identify,
    Page,
    Screen,
    Group,
    Alias,
}

impl EventType {
    /// All event types, in declaration order.
    pub const ALL: [EventType; 6] = [
        EventType::Track,
        EventType::Identify,
        EventType::Page,
        EventType::Screen,
        EventType::Group,
        EventType::Alias,
    ];

    /// Wire name of the event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Track => "track",
            EventType::Identify => "identify",
            EventType::Page => "page",
            EventType::Screen => "screen",
            EventType::Group => "group",
            EventType::Alias => "alias",
        }
    }

    /// One-letter endpoint suffix used by the ingest API (`/v1/t`, `/v1/i`, ...).
    pub fn short_name(&self) -> &'static str {
        match self {
            EventType::Track => "t",
            EventType::Identify => "i",
            EventType::Page => "p",
            EventType::Screen => "s",
            EventType::Group => "g",
            EventType::Alias => "a",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured event produced by a tracking call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default = "crate::create_message_id")]
    pub message_id: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anonymous_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_id: Option<String>,
    /// Track event name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    /// Page or screen name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Page or screen category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Properties>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traits: Option<Properties>,
    #[serde(default)]
    pub context: Properties,
    #[serde(default)]
    pub integrations: Properties,
    /// Top-level keys with no field of their own, kept so routed payloads
    /// survive the trip back into an event.
    #[serde(flatten)]
    pub extra: Properties,
}

impl Event {
    /// Create an empty event of the given type with a fresh message id.
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            message_id: crate::create_message_id(),
            timestamp: Utc::now(),
            user_id: None,
            anonymous_id: None,
            group_id: None,
            previous_id: None,
            event: None,
            name: None,
            category: None,
            properties: None,
            traits: None,
            context: Properties::new(),
            integrations: Properties::new(),
            extra: Properties::new(),
        }
    }

    /// First identity field that is set, in userId → anonymousId → groupId →
    /// previousId precedence.
    pub fn any_identity(&self) -> Option<&str> {
        self.user_id
            .as_deref()
            .or(self.anonymous_id.as_deref())
            .or(self.group_id.as_deref())
            .or(self.previous_id.as_deref())
    }

    /// Whether the `integrations` map lets this event reach the named destination.
    ///
    /// An explicit `false` for the name disables it. `All: false` disables every
    /// destination not explicitly enabled.
    pub fn integration_enabled(&self, name: &str) -> bool {
        match self.integrations.get(name) {
            Some(Value::Bool(enabled)) => return *enabled,
            // Per-integration option objects imply "enabled".
            Some(Value::Object(_)) => return true,
            _ => {}
        }
        !matches!(self.integrations.get(ALL_INTEGRATIONS), Some(Value::Bool(false)))
    }

    /// Convert the event into a JSON payload.
    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    /// Rebuild an event from a JSON payload.
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }
}

/// Per-call options merged into the event by the factory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventOptions {
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub context: Properties,
    #[serde(default)]
    pub integrations: Properties,
    #[serde(default)]
    pub anonymous_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_serializes_camel_case() {
        let mut event = Event::new(EventType::Track);
        event.event = Some("Checkout".to_string());
        event.user_id = Some("user-1".to_string());

        let value = event.to_value().unwrap();
        assert_eq!(value["type"], "track");
        assert_eq!(value["userId"], "user-1");
        assert_eq!(value["event"], "Checkout");
        assert!(value.get("anonymousId").is_none());
        assert!(value["messageId"].is_string());
    }

    #[test]
    fn test_event_roundtrip_through_value() {
        let mut event = Event::new(EventType::Page);
        event.name = Some("Home".to_string());
        event.properties = Some(json!({"path": "/"}).as_object().unwrap().clone());

        let restored = Event::from_value(event.to_value().unwrap()).unwrap();
        assert_eq!(restored, event);
    }

    #[test]
    fn test_unknown_top_level_keys_are_kept() {
        let mut value = Event::new(EventType::Track).to_value().unwrap();
        value["channel"] = json!("server");

        let event = Event::from_value(value).unwrap();
        assert_eq!(event.extra.get("channel"), Some(&json!("server")));
        assert_eq!(event.to_value().unwrap()["channel"], "server");
    }

    #[test]
    fn test_missing_message_id_and_timestamp_are_filled() {
        let event = Event::from_value(json!({"type": "track", "event": "Signup"})).unwrap();
        assert!(!event.message_id.is_empty());
        assert!(event.timestamp <= Utc::now());
        assert!(event.extra.is_empty());
    }

    #[test]
    fn test_any_identity_precedence() {
        let mut event = Event::new(EventType::Track);
        assert!(event.any_identity().is_none());

        event.previous_id = Some("prev".to_string());
        assert_eq!(event.any_identity(), Some("prev"));

        event.anonymous_id = Some("anon".to_string());
        assert_eq!(event.any_identity(), Some("anon"));

        event.user_id = Some("user".to_string());
        assert_eq!(event.any_identity(), Some("user"));
    }

    #[test]
    fn test_integration_enabled_defaults_to_true() {
        let event = Event::new(EventType::Track);
        assert!(event.integration_enabled("Amplitude"));
    }

    #[test]
    fn test_integration_disabled_explicitly() {
        let mut event = Event::new(EventType::Track);
        event.integrations.insert("Amplitude".into(), json!(false));
        assert!(!event.integration_enabled("Amplitude"));
        assert!(event.integration_enabled("Mixpanel"));
    }

    #[test]
    fn test_integration_all_false_with_override() {
        let mut event = Event::new(EventType::Track);
        event.integrations.insert("All".into(), json!(false));
        event.integrations.insert("Mixpanel".into(), json!(true));
        event.integrations.insert("Braze".into(), json!({"appId": "x"}));

        assert!(!event.integration_enabled("Amplitude"));
        assert!(event.integration_enabled("Mixpanel"));
        assert!(event.integration_enabled("Braze"));
    }

    #[test]
    fn test_event_type_names() {
        assert_eq!(EventType::Track.as_str(), "track");
        assert_eq!(EventType::Page.short_name(), "p");
        assert_eq!(EventType::Alias.to_string(), "alias");
        let parsed: EventType = serde_json::from_value(json!("screen")).unwrap();
        assert_eq!(parsed, EventType::Screen);
    }
}
