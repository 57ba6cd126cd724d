/// Dispatch key for the Work Queue's handler match. Sending platforms use
/// their own vocabulary for event names; anything not in `KnownEventType` is
/// logged and skipped rather than rejected, per the "unknown → log & skip"
/// contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    Known(KnownEventType),
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownEventType {
    HardBounce,
    Bounce,
    EmailSent,
    SpamComplaint,
}

impl EventType {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "HARD_BOUNCE" => EventType::Known(KnownEventType::HardBounce),
            "BOUNCE" | "EMAIL_BOUNCED" => EventType::Known(KnownEventType::Bounce),
            "EMAIL_SENT" => EventType::Known(KnownEventType::EmailSent),
            "SPAM_COMPLAINT" => EventType::Known(KnownEventType::SpamComplaint),
            _ => EventType::Other(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventType::Known(KnownEventType::HardBounce) => "HARD_BOUNCE",
            EventType::Known(KnownEventType::Bounce) => "BOUNCE",
            EventType::Known(KnownEventType::EmailSent) => "EMAIL_SENT",
            EventType::Known(KnownEventType::SpamComplaint) => "SPAM_COMPLAINT",
            EventType::Other(raw) => raw,
        }
    }

    pub fn is_bounce(&self) -> bool {
        matches!(
            self,
            EventType::Known(KnownEventType::HardBounce) | EventType::Known(KnownEventType::Bounce)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_event_types_round_trip_their_raw_text() {
        let parsed = EventType::parse("platform_specific_thing");
        assert_eq!(parsed.as_str(), "platform_specific_thing");
        assert!(matches!(parsed, EventType::Other(_)));
    }

    #[test]
    fn bounce_aliases_are_recognized() {
        assert!(EventType::parse("HARD_BOUNCE").is_bounce());
        assert!(EventType::parse("bounce").is_bounce());
        assert!(EventType::parse("email_bounced").is_bounce());
        assert!(!EventType::parse("EMAIL_SENT").is_bounce());
    }
}
