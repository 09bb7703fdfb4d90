use chrono::Utc;
use uuid::Uuid;

/// Create a globally unique message id in the form `<unix millis>-<uuid v4>`.
///
/// Receivers use the message id to deduplicate retried deliveries.
pub fn create_message_id() -> String {
    format!("{}-{}", Utc::now().timestamp_millis(), Uuid::new_v4())
}
