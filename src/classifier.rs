//! Bounce Classifier (component C). A pure function with no I/O: given raw
//! SMTP response text and an optional recipient, decide the failure type,
//! provider fingerprint, and whether the classification should affect
//! health. Patterns are tried in the fixed order spec.md prescribes — first
//! match wins — using `once_cell::sync::Lazy<Regex>` per pattern, the same
//! lazy-regex idiom the teacher already depends on `once_cell` for.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::domain::EmailProvider;
use crate::domain::FailureType;
use crate::domain::RecoveryExpectation;

#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub failure_type: FailureType,
    pub provider: EmailProvider,
    pub severity: u8,
    pub degrades_health: bool,
    pub recovery_expectation: RecoveryExpectation,
    pub raw_reason: String,
}

static HARD_INVALID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)5\.1\.1|user unknown|no such user|mailbox unavailable|invalid recipient|does not exist").unwrap()
});
static HARD_DOMAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)5\.1\.2|5\.1\.10|domain not found|no mx record|host unknown|unrouteable address")
        .unwrap()
});
static PROVIDER_SPAM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)5\.7\.1|spam|blocked|blacklist|reputation|rejected due to policy").unwrap()
});
static PROVIDER_THROTTLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)4\.7\.0|try again later|throttl|rate limit|too many (messages|connections)")
        .unwrap()
});
static AUTH_FAILURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)5\.7\.(?:[02-9]|1\d)|authentication (failed|required)|spf|dkim|dmarc").unwrap()
});
static TEMPORARY_NETWORK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b4\d\d\b|4\.\d\.\d|connection timed out|temporary failure").unwrap());

/// First-pattern-match-wins, tested in this exact order (spec.md §4.3).
pub fn classify(smtp_response: &str, recipient: Option<&str>) -> Classification {
    let failure_type = if HARD_INVALID.is_match(smtp_response) {
        FailureType::HardInvalid
    } else if HARD_DOMAIN.is_match(smtp_response) {
        FailureType::HardDomain
    } else if PROVIDER_SPAM.is_match(smtp_response) {
        FailureType::ProviderSpamRejection
    } else if PROVIDER_THROTTLE.is_match(smtp_response) {
        FailureType::ProviderThrottle
    } else if AUTH_FAILURE.is_match(smtp_response) {
        FailureType::AuthFailure
    } else if TEMPORARY_NETWORK.is_match(smtp_response) {
        FailureType::TemporaryNetwork
    } else {
        FailureType::Unknown
    };

    let provider = EmailProvider::resolve(recipient, smtp_response);

    Classification {
        failure_type,
        provider,
        severity: failure_type.severity(),
        degrades_health: failure_type.degrades_health(),
        recovery_expectation: failure_type.recovery_expectation(),
        raw_reason: smtp_response.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hard_invalid_wins_over_generic_4xx() {
        let c = classify("550 5.1.1 user unknown", None);
        assert_eq!(c.failure_type, FailureType::HardInvalid);
        assert!(c.degrades_health);
    }

    #[test]
    fn throttle_does_not_degrade_health() {
        let c = classify("421 4.7.0 try again later", None);
        assert_eq!(c.failure_type, FailureType::ProviderThrottle);
        assert!(!c.degrades_health);
    }

    #[test]
    fn temporary_network_does_not_degrade_health() {
        let c = classify("421 connection timed out", None);
        assert_eq!(c.failure_type, FailureType::TemporaryNetwork);
        assert!(!c.degrades_health);
    }

    #[test]
    fn spam_rejection_degrades_health() {
        let c = classify("550 5.7.1 message blocked as spam", None);
        assert_eq!(c.failure_type, FailureType::ProviderSpamRejection);
        assert!(c.degrades_health);
    }

    #[test]
    fn recipient_domain_fingerprints_provider_even_when_text_is_silent() {
        let c = classify("550 5.1.1 no such user", Some("jdoe@gmail.com"));
        assert_eq!(c.provider, EmailProvider::Gmail);
    }

    #[test]
    fn generic_4xx_dsn_code_is_temporary_network_not_unknown() {
        let c = classify("450 mailbox temporarily over quota, retrying", None);
        assert_eq!(c.failure_type, FailureType::TemporaryNetwork);
        assert!(!c.degrades_health);
    }

    #[test]
    fn unmatched_text_falls_back_to_unknown() {
        let c = classify("unexpected response from remote server, contact support", None);
        assert_eq!(c.failure_type, FailureType::Unknown);
        assert!(!c.degrades_health);
    }
}
