use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::Mailer;
use crate::core::config::MailConfig;
use crate::core::error::{ConfigError, MailError};

/// SMTP mailer that sends every notice from the operator account to itself.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    mailbox: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Result<Self, ConfigError> {
        if config.host.trim().is_empty() {
            return Err(ConfigError::Mail("host is empty".to_string()));
        }
        let mailbox: Mailbox = config
            .username
            .parse()
            .map_err(|e| ConfigError::Mail(format!("username '{}': {}", config.username, e)))?;

        // Implicit TLS when ssl is set, plaintext otherwise.
        let mut builder = if config.ssl {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| ConfigError::Mail(format!("host '{}': {}", config.host, e)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };
        if config.port != 0 {
            builder = builder.port(config.port);
        }
        let transport = builder
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();

        Ok(Self { transport, mailbox })
    }

    /// Connects and authenticates without sending anything.
    pub async fn test_connection(&self) -> Result<(), MailError> {
        match self.transport.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(MailError::Transport(
                "server did not accept the connection".to_string(),
            )),
            Err(e) => Err(MailError::Transport(e.to_string())),
        }
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, subject: &str, body: &str) -> Result<(), MailError> {
        let message = Message::builder()
            .from(self.mailbox.clone())
            .to(self.mailbox.clone())
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| MailError::Message(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;
        Ok(())
    }
}
