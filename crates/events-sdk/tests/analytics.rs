mod common;

use async_trait::async_trait;
use common::{journal, offline_settings, settings_with_rules, FailingTransport, Recorder};
use delivery_queue::MemoryStore;
use events_core::{EventOptions, MemoryIdentity, Properties};
use events_sdk::plugins::EVENTS_API;
use events_sdk::{
    source_middleware, Analytics, CdnSettings, Emission, LoadOutcome, LoadState, Plugin, PluginError,
    SdkConfig, SdkError, SdkResult, Settings, SettingsLoader, EVENT_DELIVERY_FAILURE,
    EVENT_DEREGISTER, EVENT_INITIALIZE,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn props(value: Value) -> Properties {
    match value {
        Value::Object(map) => map,
        _ => Properties::new(),
    }
}

#[tokio::test]
async fn test_track_without_identity_is_rejected() {
    let analytics = Analytics::builder(offline_settings())
        .identity(Arc::new(MemoryIdentity::empty()))
        .build();
    analytics.load().await.unwrap();

    let result = analytics
        .track("Checkout", Properties::new(), EventOptions::default())
        .await;
    assert!(matches!(result, Err(SdkError::Validation(_))));
}

#[tokio::test]
async fn test_calls_before_load_replay_in_order() {
    let seen = journal();
    let analytics = Analytics::builder(offline_settings())
        .plugin(Recorder::new("Recorder", &seen))
        .build();

    let first = analytics.track("A", Properties::new(), EventOptions::default());
    let second = analytics.track("B", Properties::new(), EventOptions::default());
    assert_eq!(analytics.buffered_len(), 2);
    assert_eq!(analytics.load_state(), LoadState::Pending);

    assert_eq!(analytics.load().await.unwrap(), LoadOutcome::Loaded);
    assert_eq!(analytics.load_state(), LoadState::Ready);
    assert_eq!(analytics.buffered_len(), 0);

    // Awaiting out of order does not change dispatch order.
    second.await.unwrap();
    first.await.unwrap();
    assert_eq!(*seen.lock(), vec!["Recorder:A", "Recorder:B"]);

    assert_eq!(analytics.load().await.unwrap(), LoadOutcome::AlreadyLoaded);
    assert_eq!(seen.lock().len(), 2);
}

#[tokio::test]
async fn test_track_with_no_destinations_resolves() {
    let analytics = Analytics::new(offline_settings());
    analytics.load().await.unwrap();
    assert!(!analytics.plugin_names().contains(&EVENTS_API.to_string()));

    let ctx = analytics
        .track("Checkout", props(json!({"total": 42})), EventOptions::default())
        .await
        .unwrap();

    assert!(!ctx.is_cancelled());
    assert_eq!(ctx.event().event.as_deref(), Some("Checkout"));
    assert_eq!(ctx.event().properties.as_ref().unwrap()["total"], 42);
    assert!(ctx.event().context.contains_key("library"));
}

#[tokio::test]
async fn test_routing_rule_drops_for_one_destination() {
    let seen = journal();
    let settings = settings_with_rules(json!([
        {
            "destinationName": "Amplitude",
            "matchers": [{"type": "fql", "ir": "[\"=\",\"event\",{\"value\":\"Spam\"}]"}],
            "transformers": [[{"type": "drop"}]]
        }
    ]));
    let analytics = Analytics::new(settings);
    analytics.load().await.unwrap();
    analytics
        .register(vec![
            Recorder::new("Amplitude", &seen) as Arc<dyn Plugin>,
            Recorder::new("Mixpanel", &seen) as Arc<dyn Plugin>,
        ])
        .await
        .unwrap();

    analytics
        .track("Spam", Properties::new(), EventOptions::default())
        .await
        .unwrap();
    analytics
        .track("Checkout", Properties::new(), EventOptions::default())
        .await
        .unwrap();

    assert_eq!(
        *seen.lock(),
        vec!["Mixpanel:Spam", "Amplitude:Checkout", "Mixpanel:Checkout"]
    );
}

#[tokio::test]
async fn test_integrations_option_skips_destination() {
    let seen = journal();
    let analytics = Analytics::builder(offline_settings())
        .plugin(Recorder::new("Amplitude", &seen))
        .plugin(Recorder::new("Mixpanel", &seen))
        .build();
    analytics.load().await.unwrap();

    let options = EventOptions {
        integrations: props(json!({"Amplitude": false})),
        ..EventOptions::default()
    };
    analytics.track("Checkout", Properties::new(), options).await.unwrap();

    assert_eq!(*seen.lock(), vec!["Mixpanel:Checkout"]);
}

#[tokio::test]
async fn test_failed_delivery_is_emitted_after_single_attempt() {
    let transport = Arc::new(FailingTransport::default());
    let failures = Arc::new(Mutex::new(Vec::new()));

    let mut settings = Settings::new("test-write-key").with_cdn_settings(CdnSettings::default());
    settings.integrations.clear();
    let config = SdkConfig {
        retry_queue: false,
        flush_interval_ms: 10,
        ..SdkConfig::default()
    };
    let analytics = Analytics::builder(settings)
        .config(config)
        .store(Arc::new(MemoryStore::new()))
        .transport(transport.clone())
        .build();

    let sink = failures.clone();
    analytics.on(
        EVENT_DELIVERY_FAILURE,
        Arc::new(move |emission| {
            if let Emission::DeliveryFailure { event, reason } = emission {
                sink.lock().push((event.event.clone(), reason.clone()));
            }
        }),
    );
    analytics.load().await.unwrap();
    assert!(analytics.plugin_names().contains(&EVENTS_API.to_string()));

    analytics
        .track("Checkout", Properties::new(), EventOptions::default())
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while failures.lock().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("delivery failure was never emitted");

    // Give the worker a few more ticks to prove it does not retry.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(transport.request_count(), 1);
    assert_eq!(failures.lock().len(), 1);
    assert_eq!(failures.lock()[0].0.as_deref(), Some("Checkout"));

    analytics.close().await.unwrap();
}

#[tokio::test]
async fn test_plugin_that_fails_to_load_is_not_registered() {
    let seen = journal();
    let analytics = Analytics::new(offline_settings());
    analytics.load().await.unwrap();

    let err = analytics
        .register(vec![Recorder::broken("Broken", &seen) as Arc<dyn Plugin>])
        .await
        .unwrap_err();
    assert!(matches!(err, SdkError::Plugin(PluginError::Load { ref name, .. }) if name == "Broken"));
    assert!(!analytics.plugin_names().contains(&"Broken".to_string()));

    analytics
        .track("Checkout", Properties::new(), EventOptions::default())
        .await
        .unwrap();
    assert!(seen.lock().is_empty());
}

#[tokio::test]
async fn test_duplicate_plugin_name_is_rejected() {
    let seen = journal();
    let analytics = Analytics::new(offline_settings());
    analytics.load().await.unwrap();
    analytics
        .register(vec![Recorder::new("Amplitude", &seen) as Arc<dyn Plugin>])
        .await
        .unwrap();

    let err = analytics
        .register(vec![Recorder::new("Amplitude", &seen) as Arc<dyn Plugin>])
        .await
        .unwrap_err();
    assert!(matches!(err, SdkError::Plugin(PluginError::Duplicate(_))));
}

#[tokio::test]
async fn test_deregister_unloads_and_emits() {
    let seen = journal();
    let recorder = Recorder::new("Amplitude", &seen);
    let analytics = Analytics::new(offline_settings());
    analytics.load().await.unwrap();
    analytics
        .register(vec![recorder.clone() as Arc<dyn Plugin>])
        .await
        .unwrap();

    let removed = Arc::new(Mutex::new(Vec::new()));
    let sink = removed.clone();
    analytics.on(
        EVENT_DEREGISTER,
        Arc::new(move |emission| {
            if let Emission::Plugins { names } = emission {
                sink.lock().extend(names.iter().cloned());
            }
        }),
    );

    analytics.deregister(&["Amplitude", "Unknown"]).await.unwrap();
    assert!(recorder.was_unloaded());
    assert_eq!(*removed.lock(), vec!["Amplitude".to_string()]);

    analytics
        .track("Checkout", Properties::new(), EventOptions::default())
        .await
        .unwrap();
    assert!(seen.lock().is_empty());
}

#[tokio::test]
async fn test_source_middleware_drop_cancels_dispatch() {
    let seen = journal();
    let analytics = Analytics::builder(offline_settings())
        .plugin(Recorder::new("Amplitude", &seen))
        .build();
    analytics.add_source_middleware(source_middleware(|event| {
        if event.event.as_deref() == Some("Spam") {
            None
        } else {
            Some(event)
        }
    }));
    analytics.load().await.unwrap();

    let dropped = analytics
        .track("Spam", Properties::new(), EventOptions::default())
        .await
        .unwrap();
    assert!(dropped.is_cancelled());

    analytics
        .track("Checkout", Properties::new(), EventOptions::default())
        .await
        .unwrap();
    assert_eq!(*seen.lock(), vec!["Amplitude:Checkout"]);
}

#[tokio::test]
async fn test_buffered_anonymous_id_applies_to_buffered_events() {
    let analytics = Analytics::builder(offline_settings())
        .identity(Arc::new(MemoryIdentity::empty()))
        .build();

    let pending = analytics.page(None, Some("Home"), Properties::new(), EventOptions::default());
    analytics.set_anonymous_id(Some("anon-1".to_string()));
    analytics.load().await.unwrap();

    let ctx = pending.await.unwrap();
    assert_eq!(ctx.event().anonymous_id.as_deref(), Some("anon-1"));
}

#[tokio::test]
async fn test_identify_sets_user_for_later_calls() {
    let analytics = Analytics::new(offline_settings());
    analytics.load().await.unwrap();

    analytics
        .identify(Some("user-1"), props(json!({"plan": "pro"})), EventOptions::default())
        .await
        .unwrap();
    let ctx = analytics
        .track("Checkout", Properties::new(), EventOptions::default())
        .await
        .unwrap();

    assert_eq!(analytics.identity().user_id().as_deref(), Some("user-1"));
    assert_eq!(ctx.event().user_id.as_deref(), Some("user-1"));
}

#[tokio::test]
async fn test_initialize_listener_registered_before_load() {
    let initialized = Arc::new(Mutex::new(None));
    let analytics = Analytics::new(offline_settings());

    let sink = initialized.clone();
    analytics.on(
        EVENT_INITIALIZE,
        Arc::new(move |emission| {
            if let Emission::Initialize { write_key } = emission {
                *sink.lock() = Some(write_key.clone());
            }
        }),
    );
    analytics.load().await.unwrap();

    assert_eq!(initialized.lock().as_deref(), Some("test-write-key"));
}

#[tokio::test]
async fn test_close_rejects_further_calls() {
    let seen = journal();
    let recorder = Recorder::new("Amplitude", &seen);
    let analytics = Analytics::builder(offline_settings())
        .plugin(recorder.clone())
        .build();
    analytics.load().await.unwrap();

    analytics.close().await.unwrap();
    assert!(recorder.was_unloaded());
    assert_eq!(analytics.load_state(), LoadState::Closed);

    let result = analytics
        .track("Checkout", Properties::new(), EventOptions::default())
        .await;
    assert!(matches!(result, Err(SdkError::Closed)));
}

#[tokio::test]
async fn test_close_before_load_fails_buffered_calls() {
    let analytics = Analytics::new(offline_settings());
    let pending = analytics.track("Checkout", Properties::new(), EventOptions::default());

    analytics.close().await.unwrap();
    assert!(matches!(pending.await, Err(SdkError::Closed)));
}

struct StaticLoader(CdnSettings);

#[async_trait]
impl SettingsLoader for StaticLoader {
    async fn load(&self, _write_key: &str) -> SdkResult<CdnSettings> {
        Ok(self.0.clone())
    }
}

#[tokio::test]
async fn test_loader_settings_pass_through_update_hook() {
    let mut settings = Settings::new("test-write-key");
    settings
        .integrations
        .insert(EVENTS_API.to_string(), Value::Bool(false));

    let loaded: CdnSettings = serde_json::from_value(json!({
        "integrations": {"Amplitude": {"apiKey": "abc"}}
    }))
    .unwrap();

    let analytics = Analytics::builder(settings)
        .settings_loader(Arc::new(StaticLoader(loaded)))
        .update_cdn_settings(|mut cdn| {
            cdn.integrations.insert("Mixpanel".to_string(), json!({}));
            cdn
        })
        .build();
    analytics.load().await.unwrap();

    let cdn = analytics.cdn_settings().unwrap();
    assert!(cdn.integrations.contains_key("Amplitude"));
    assert!(cdn.integrations.contains_key("Mixpanel"));
}
