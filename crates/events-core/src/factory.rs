//! Builds canonical events from tracking call arguments.

use crate::{Event, EventOptions, EventType, IdentityProvider, Properties};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;

/// Event factory.
///
/// Stateless apart from the injected identity collaborator, which is read to
/// stamp `userId`, `anonymousId` and `context.sessionId`.
#[derive(Clone)]
pub struct EventFactory {
    identity: Arc<dyn IdentityProvider>,
}

impl EventFactory {
    pub fn new(identity: Arc<dyn IdentityProvider>) -> Self {
        Self { identity }
    }

    /// The identity collaborator backing this factory.
    pub fn identity(&self) -> &Arc<dyn IdentityProvider> {
        &self.identity
    }

    pub fn track(&self, event: &str, properties: Properties, options: EventOptions) -> Event {
        let mut built = self.normalize(EventType::Track, options);
        built.event = Some(event.to_string());
        built.properties = Some(properties);
        built
    }

    pub fn identify(
        &self,
        user_id: Option<&str>,
        traits: Properties,
        options: EventOptions,
    ) -> Event {
        let mut built = self.normalize(EventType::Identify, options);
        if let Some(user_id) = user_id {
            built.user_id = Some(user_id.to_string());
        }
        built.traits = Some(traits);
        built
    }

    pub fn page(
        &self,
        category: Option<&str>,
        name: Option<&str>,
        properties: Properties,
        options: EventOptions,
    ) -> Event {
        self.page_like(EventType::Page, category, name, properties, options)
    }

    pub fn screen(
        &self,
        category: Option<&str>,
        name: Option<&str>,
        properties: Properties,
        options: EventOptions,
    ) -> Event {
        self.page_like(EventType::Screen, category, name, properties, options)
    }

    pub fn group(&self, group_id: &str, traits: Properties, options: EventOptions) -> Event {
        let mut built = self.normalize(EventType::Group, options);
        built.group_id = Some(group_id.to_string());
        built.traits = Some(traits);
        built
    }

    /// `to` becomes the user id; `from` (or the current user/anonymous id)
    /// becomes the previous id.
    pub fn alias(&self, to: &str, from: Option<&str>, options: EventOptions) -> Event {
        let mut built = self.normalize(EventType::Alias, options);
        built.previous_id = from
            .map(str::to_string)
            .or_else(|| self.identity.user_id())
            .or_else(|| self.identity.anonymous_id());
        built.user_id = Some(to.to_string());
        built
    }

    fn page_like(
        &self,
        event_type: EventType,
        category: Option<&str>,
        name: Option<&str>,
        mut properties: Properties,
        options: EventOptions,
    ) -> Event {
        let mut built = self.normalize(event_type, options);
        if let Some(category) = category {
            built.category = Some(category.to_string());
            properties
                .entry("category")
                .or_insert_with(|| Value::String(category.to_string()));
        }
        if let Some(name) = name {
            built.name = Some(name.to_string());
            properties
                .entry("name")
                .or_insert_with(|| Value::String(name.to_string()));
        }
        built.properties = Some(properties);
        built
    }

    fn normalize(&self, event_type: EventType, options: EventOptions) -> Event {
        let mut event = Event::new(event_type);
        event.timestamp = options.timestamp.unwrap_or_else(Utc::now);
        event.user_id = options.user_id.or_else(|| self.identity.user_id());
        event.anonymous_id = options
            .anonymous_id
            .or_else(|| self.identity.anonymous_id());
        event.context = options.context;
        event.integrations = options.integrations;

        if let Some(session_id) = self.identity.session_id() {
            event
                .context
                .entry("sessionId")
                .or_insert_with(|| Value::from(session_id));
        }

        event
    }
}
