use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EmailProvider {
    Gmail,
    Microsoft,
    Yahoo,
    Other,
}

impl EmailProvider {
    /// Fingerprint a recipient's domain first; this is the authoritative
    /// signal when available.
    pub fn from_recipient_domain(domain: &str) -> Option<Self> {
        let domain = domain.to_ascii_lowercase();
        if domain == "gmail.com" || domain == "googlemail.com" {
            Some(EmailProvider::Gmail)
        } else if domain.ends_with("outlook.com")
            || domain.ends_with("hotmail.com")
            || domain.ends_with("live.com")
            || domain.ends_with("office365.com")
        {
            Some(EmailProvider::Microsoft)
        } else if domain.ends_with("yahoo.com") || domain.ends_with("ymail.com") {
            Some(EmailProvider::Yahoo)
        } else {
            None
        }
    }

    /// Fall back to scanning raw SMTP text for provider keywords.
    pub fn from_smtp_text(text: &str) -> Self {
        let lower = text.to_ascii_lowercase();
        if lower.contains("gmail") || lower.contains("google") {
            EmailProvider::Gmail
        } else if lower.contains("outlook") || lower.contains("microsoft") || lower.contains("hotmail") {
            EmailProvider::Microsoft
        } else if lower.contains("yahoo") {
            EmailProvider::Yahoo
        } else {
            EmailProvider::Other
        }
    }

    pub fn resolve(recipient: Option<&str>, smtp_text: &str) -> Self {
        recipient
            .and_then(|r| r.rsplit('@').next())
            .and_then(Self::from_recipient_domain)
            .unwrap_or_else(|| Self::from_smtp_text(smtp_text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipient_domain_wins_over_smtp_text() {
        let resolved = EmailProvider::resolve(Some("user@gmail.com"), "rejected by yahoo relay");
        assert_eq!(resolved, EmailProvider::Gmail);
    }

    #[test]
    fn falls_back_to_smtp_text_keyword_scan() {
        let resolved = EmailProvider::resolve(None, "550 rejected by Microsoft 365 policy");
        assert_eq!(resolved, EmailProvider::Microsoft);
    }

    #[test]
    fn unknown_domain_and_text_is_other() {
        let resolved = EmailProvider::resolve(Some("user@example.net"), "generic failure");
        assert_eq!(resolved, EmailProvider::Other);
    }
}
