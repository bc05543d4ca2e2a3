// Path: crates/types/src/alert.rs
//! Operator alert messages. Immutable once enqueued.

use serde::{Deserialize, Serialize};

/// An email leg of an alert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmailAlert {
    /// Recipient address.
    pub to: String,
    /// HTML body.
    pub html: String,
}

/// An SMS leg of an alert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SmsAlert {
    /// Recipient phone number in E.164 form.
    pub to: String,
    /// Plain-text body.
    pub text: String,
}

/// A single notification handed to the alert dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlertMessage {
    /// Subject line, shared by every channel.
    pub subject: String,
    /// Email delivery, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<EmailAlert>,
    /// SMS delivery, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sms: Option<SmsAlert>,
}

impl AlertMessage {
    /// Builds an email-only alert, wrapping `text` in a paragraph.
    pub fn email(subject: impl Into<String>, to: impl Into<String>, text: &str) -> Self {
        Self {
            subject: subject.into(),
            email: Some(EmailAlert {
                to: to.into(),
                html: format!("<p>{text}</p>"),
            }),
            sms: None,
        }
    }

    /// Builds an SMS-only alert.
    pub fn sms(subject: impl Into<String>, to: impl Into<String>, text: &str) -> Self {
        Self {
            subject: subject.into(),
            email: None,
            sms: Some(SmsAlert {
                to: to.into(),
                text: text.to_string(),
            }),
        }
    }

    /// Returns true if the message names at least one recipient.
    pub fn has_recipient(&self) -> bool {
        self.email.as_ref().is_some_and(|e| !e.to.is_empty())
            || self.sms.as_ref().is_some_and(|s| !s.to.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_body_is_wrapped() {
        let msg = AlertMessage::email("ALERT", "ops@example.org", "Check g1");
        assert_eq!(msg.email.as_ref().map(|e| e.html.as_str()), Some("<p>Check g1</p>"));
        assert!(msg.sms.is_none());
        assert!(msg.has_recipient());
    }

    #[test]
    fn test_empty_recipient_is_not_a_recipient() {
        let msg = AlertMessage::sms("ALERT", "", "Check g1");
        assert!(!msg.has_recipient());
    }
}
