mod smtp;

pub use smtp::SmtpMailer;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::core::error::MailError;

/// Outbound mail transport. One call is one message.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, subject: &str, body: &str) -> Result<(), MailError>;
}

/// Operator notifications with a fixed template per event kind.
///
/// Without a mailer every notification is a silent no-op.
#[derive(Clone, Default)]
pub struct Notifier {
    mailer: Option<Arc<dyn Mailer>>,
}

impl Notifier {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self {
            mailer: Some(mailer),
        }
    }

    pub fn disabled() -> Self {
        Self { mailer: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.mailer.is_some()
    }

    pub async fn notify_offline(&self, agent: &str) -> Result<(), MailError> {
        self.deliver(
            &format!("{} Offline Notice", agent),
            &format!("{} has just offline.", agent),
        )
        .await
    }

    pub async fn notify_sign_in_failure(&self, account: &str) -> Result<(), MailError> {
        self.deliver(
            &format!("{} Sign-in Failure Notice", account),
            &format!("{} has some trouble with daily sign-in.", account),
        )
        .await
    }

    async fn deliver(&self, subject: &str, body: &str) -> Result<(), MailError> {
        let Some(mailer) = &self.mailer else {
            debug!("Mail sender not configured, dropping '{}'", subject);
            return Ok(());
        };
        mailer.send(subject, body).await?;
        info!("Sent notification '{}'", subject);
        Ok(())
    }
}
