//! Outbound mail for alert delivery.
//!
//! Delivery is simulated: `LogMailTransport` records the message in the log
//! instead of talking to an SMTP server.

use crate::config::MailConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub subject: String,
    pub body: String,
    pub user_id: i64,
}

pub trait MailTransport: Send + Sync {
    fn send(&self, message: &MailMessage) -> Result<(), String>;
    fn is_configured(&self) -> bool;
    fn sender(&self) -> Option<&str>;
}

pub struct LogMailTransport {
    sender: Option<String>,
}

impl LogMailTransport {
    pub fn new(sender: Option<String>) -> Self {
        Self {
            sender: sender.filter(|value| !value.trim().is_empty()),
        }
    }

    pub fn from_config(config: &MailConfig) -> Self {
        Self::new(config.sender.clone())
    }
}

impl MailTransport for LogMailTransport {
    fn send(&self, message: &MailMessage) -> Result<(), String> {
        let Some(sender) = self.sender.as_deref() else {
            return Err("mail transport not configured".to_string());
        };
        tracing::info!(
            user_id = message.user_id,
            sender = %mask_email(sender),
            subject = %message.subject,
            "Alert email delivered"
        );
        Ok(())
    }

    fn is_configured(&self) -> bool {
        self.sender.is_some()
    }

    fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }
}

/// Hides most of the local part: `ab***@domain`, or `***@domain` when the
/// local part is two characters or fewer.
pub fn mask_email(address: &str) -> String {
    match address.split_once('@') {
        Some((local, domain)) => {
            if local.chars().count() <= 2 {
                format!("***@{}", domain)
            } else {
                let prefix: String = local.chars().take(2).collect();
                format!("{}***@{}", prefix, domain)
            }
        }
        None => "***".to_string(),
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Transport that records messages, optionally failing every send.
    pub struct RecordingMail {
        sent: Mutex<Vec<MailMessage>>,
        fail: bool,
    }

    impl RecordingMail {
        pub fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        pub fn failing() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        pub fn sent(&self) -> Vec<MailMessage> {
            self.sent.lock().expect("mail lock").clone()
        }
    }

    impl MailTransport for RecordingMail {
        fn send(&self, message: &MailMessage) -> Result<(), String> {
            if self.fail {
                return Err("smtp connection refused".to_string());
            }
            self.sent.lock().expect("mail lock").push(message.clone());
            Ok(())
        }

        fn is_configured(&self) -> bool {
            true
        }

        fn sender(&self) -> Option<&str> {
            Some("alerts@example.com")
        }
    }
}
