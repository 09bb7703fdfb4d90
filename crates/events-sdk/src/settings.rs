//! Instance settings and the CDN settings they may be completed with.

use crate::{SdkError, SdkResult};
use async_trait::async_trait;
use events_core::Properties;
use reqwest::Client;
use routing_middleware::RoutingRule;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Default settings CDN.
pub const DEFAULT_CDN_URL: &str = "https://cdn.hightouch-events.com";

/// Hook rewriting CDN settings after they are loaded.
pub type UpdateCdnSettings = Arc<dyn Fn(CdnSettings) -> CdnSettings + Send + Sync>;

/// Middleware section of the CDN settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiddlewareSettings {
    #[serde(default)]
    pub routing_rules: Vec<RoutingRule>,
}

/// Remote per-project settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CdnSettings {
    /// Integration name → integration config.
    #[serde(default)]
    pub integrations: Properties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middleware_settings: Option<MiddlewareSettings>,
}

impl CdnSettings {
    pub fn routing_rules(&self) -> &[RoutingRule] {
        self.middleware_settings
            .as_ref()
            .map(|m| m.routing_rules.as_slice())
            .unwrap_or(&[])
    }
}

/// Settings an instance is created with.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub write_key: String,
    /// When absent, fetched by the [`SettingsLoader`] during load.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cdn_settings: Option<CdnSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "cdnURL")]
    pub cdn_url: Option<String>,
    /// Instance-wide integration switches, same shape as an event's
    /// `integrations` map.
    #[serde(default)]
    pub integrations: Properties,
}

impl Settings {
    pub fn new(write_key: impl Into<String>) -> Self {
        Self {
            write_key: write_key.into(),
            ..Self::default()
        }
    }

    pub fn with_cdn_settings(mut self, cdn_settings: CdnSettings) -> Self {
        self.cdn_settings = Some(cdn_settings);
        self
    }

    /// Whether the instance-level `integrations` map leaves `name` enabled.
    pub fn integration_enabled(&self, name: &str) -> bool {
        match self.integrations.get(name) {
            Some(Value::Bool(enabled)) => *enabled,
            Some(Value::Object(_)) => true,
            _ => !matches!(self.integrations.get("All"), Some(Value::Bool(false))),
        }
    }
}

/// Supplies CDN settings when they were not given up front.
#[async_trait]
pub trait SettingsLoader: Send + Sync {
    async fn load(&self, write_key: &str) -> SdkResult<CdnSettings>;
}

/// Fetches `<cdnURL>/v1/projects/<writeKey>/settings`.
pub struct CdnSettingsLoader {
    client: Client,
    cdn_url: String,
}

impl CdnSettingsLoader {
    pub fn new(cdn_url: Option<&str>) -> SdkResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SdkError::Settings(e.to_string()))?;
        Ok(Self {
            client,
            cdn_url: cdn_url.unwrap_or(DEFAULT_CDN_URL).trim_end_matches('/').to_string(),
        })
    }

    /// Settings URL for a write key.
    pub fn settings_url(&self, write_key: &str) -> SdkResult<Url> {
        let url = Url::parse(&format!("{}/v1/projects/{}/settings", self.cdn_url, write_key))
            .map_err(crate::ConfigError::from)?;
        Ok(url)
    }
}

#[async_trait]
impl SettingsLoader for CdnSettingsLoader {
    async fn load(&self, write_key: &str) -> SdkResult<CdnSettings> {
        let url = self.settings_url(write_key)?;
        debug!(url = %url, "Fetching CDN settings");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SdkError::Settings(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SdkError::Settings(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        let settings: CdnSettings = response
            .json()
            .await
            .map_err(|e| SdkError::Settings(e.to_string()))?;
        info!(
            integrations = settings.integrations.len(),
            routing_rules = settings.routing_rules().len(),
            "Loaded CDN settings"
        );
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_settings_url() {
        let loader = CdnSettingsLoader::new(Some("https://cdn.example.com/")).unwrap();
        assert_eq!(
            loader.settings_url("wk_123").unwrap().as_str(),
            "https://cdn.example.com/v1/projects/wk_123/settings"
        );

        let default = CdnSettingsLoader::new(None).unwrap();
        assert!(default
            .settings_url("wk")
            .unwrap()
            .as_str()
            .starts_with(DEFAULT_CDN_URL));
    }

    #[test]
    fn test_cdn_settings_wire_format() {
        let settings: CdnSettings = serde_json::from_value(json!({
            "integrations": {"Events API": {"apiHost": "example.com"}},
            "middlewareSettings": {
                "routingRules": [{
                    "destinationName": "Amplitude",
                    "matchers": [{"type": "all", "ir": ""}],
                    "transformers": [[{"type": "drop"}]]
                }]
            }
        }))
        .unwrap();

        assert_eq!(settings.routing_rules().len(), 1);
        assert_eq!(settings.routing_rules()[0].destination_name, "Amplitude");
        assert!(settings.integrations.contains_key("Events API"));
    }

    #[test]
    fn test_integration_switches() {
        let mut settings = Settings::new("wk");
        assert!(settings.integration_enabled("Events API"));

        settings.integrations.insert("Events API".into(), json!(false));
        assert!(!settings.integration_enabled("Events API"));

        settings.integrations.clear();
        settings.integrations.insert("All".into(), json!(false));
        settings.integrations.insert("Amplitude".into(), json!(true));
        assert!(!settings.integration_enabled("Events API"));
        assert!(settings.integration_enabled("Amplitude"));
    }
}
