use crate::{Event, EventType, ValidationError};

const STRING_ERROR: &str = "is not a string";
const OBJECT_ERROR: &str = "is not an object";
const NIL_ERROR: &str = "is nil";

const USER_FIELD_NAME: &str = ".userId/anonymousId/previousId/groupId";

/// Check an event before it enters the pipeline.
///
/// `track` needs an event name and properties, `identify` and `group` need
/// traits, and every event must carry at least one identity field.
pub fn validate_event(event: &Event) -> Result<(), ValidationError> {
    match event.event_type {
        EventType::Track => {
            if event.event.is_none() {
                return Err(ValidationError::new(".event", STRING_ERROR));
            }
            if event.properties.is_none() {
                return Err(ValidationError::new(".properties", OBJECT_ERROR));
            }
        }
        EventType::Identify | EventType::Group => {
            if event.traits.is_none() {
                return Err(ValidationError::new(".traits", OBJECT_ERROR));
            }
        }
        EventType::Page | EventType::Screen | EventType::Alias => {}
    }

    if event.any_identity().is_none() {
        return Err(ValidationError::new(USER_FIELD_NAME, NIL_ERROR));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Properties;

    fn track(name: Option<&str>) -> Event {
        let mut event = Event::new(EventType::Track);
        event.event = name.map(str::to_string);
        event.properties = Some(Properties::new());
        event.anonymous_id = Some("anon".into());
        event
    }

    #[test]
    fn test_valid_track() {
        assert!(validate_event(&track(Some("Checkout"))).is_ok());
    }

    #[test]
    fn test_track_requires_name() {
        let err = validate_event(&track(None)).unwrap_err();
        assert_eq!(err.field, ".event");
        assert_eq!(err.message, "is not a string");
    }

    #[test]
    fn test_track_requires_properties() {
        let mut event = track(Some("x"));
        event.properties = None;
        let err = validate_event(&event).unwrap_err();
        assert_eq!(err.field, ".properties");
    }

    #[test]
    fn test_identify_requires_traits() {
        let mut event = Event::new(EventType::Identify);
        event.user_id = Some("u".into());
        assert_eq!(validate_event(&event).unwrap_err().field, ".traits");

        event.traits = Some(Properties::new());
        assert!(validate_event(&event).is_ok());
    }

    #[test]
    fn test_missing_identity_is_nil() {
        let mut event = track(Some("x"));
        event.anonymous_id = None;

        let err = validate_event(&event).unwrap_err();
        assert_eq!(err.field, ".userId/anonymousId/previousId/groupId");
        assert_eq!(err.message, "is nil");
        assert_eq!(err.to_string(), ".userId/anonymousId/previousId/groupId is nil");
    }

    #[test]
    fn test_any_single_identity_passes() {
        let mut event = Event::new(EventType::Alias);
        event.previous_id = Some("prev".into());
        assert!(validate_event(&event).is_ok());

        let mut group = Event::new(EventType::Group);
        group.traits = Some(Properties::new());
        group.group_id = Some("org".into());
        assert!(validate_event(&group).is_ok());
    }
}
