//! Error kinds shared by the presence, mail and sign-in subsystems.

use std::fmt;

/// Malformed or missing configuration. Degrades the affected subsystem.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid mail-sender config: {0}")]
    Mail(String),

    #[error("invalid account config: {0}")]
    Account(String),

    #[error("invalid {name}: {value}")]
    Env { name: &'static str, value: String },
}

/// Step of the external handshake that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePhase {
    Login,
    Grant,
    Credential,
}

impl fmt::Display for HandshakePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            HandshakePhase::Login => "login",
            HandshakePhase::Grant => "grant",
            HandshakePhase::Credential => "credential",
        };
        f.write_str(phase)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("authentication failed for account {account} during {phase}: {reason}")]
pub struct AuthError {
    pub account: String,
    pub phase: HandshakePhase,
    pub reason: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SignInError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("daily sign-in request failed for account {account}: {reason}")]
    Request { account: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("failed to build mail message: {0}")]
    Message(String),

    #[error("mail transport error: {0}")]
    Transport(String),
}
