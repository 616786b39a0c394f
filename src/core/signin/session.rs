use chrono::{DateTime, Local};
use serde_json::json;
use std::fmt;
use tracing::{debug, info};

use super::SklandClient;
use crate::core::config::AccountConfig;
use crate::core::error::{AuthError, HandshakePhase};

pub const LOGIN_PATH: &str = "/user/auth/v1/token_by_phone_password";
pub const GRANT_PATH: &str = "/user/oauth2/v2/grant";
pub const CREDENTIAL_PATH: &str = "/api/v1/user/auth/generate_cred_by_code";

/// Application code the game client presents when asking for a grant.
pub const APP_CODE: &str = "4ca99fa6b56cc2ba";

/// A ready-to-use credential pair. Only obtainable through a complete handshake.
pub struct SklandSession {
    account: String,
    credential: String,
    signing_key: String,
    obtained_at: DateTime<Local>,
}

impl fmt::Debug for SklandSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SklandSession")
            .field("account", &self.account)
            .field("obtained_at", &self.obtained_at)
            .finish_non_exhaustive()
    }
}

impl SklandSession {
    /// Login, grant and credential issuance, in that order, without retries.
    pub async fn establish(
        client: &SklandClient,
        account: &AccountConfig,
    ) -> Result<Self, AuthError> {
        let fail = |phase: HandshakePhase| {
            let account = account.phone.clone();
            move |reason: String| AuthError {
                account,
                phase,
                reason,
            }
        };

        let token = login(client, account)
            .await
            .map_err(fail(HandshakePhase::Login))?;
        debug!("Account [{}] logged in", account.phone);

        let code = grant(client, &token)
            .await
            .map_err(fail(HandshakePhase::Grant))?;
        debug!("Account [{}] received grant code", account.phone);

        let (credential, signing_key) = issue_credential(client, &code)
            .await
            .map_err(fail(HandshakePhase::Credential))?;
        info!("Account [{}] obtained a fresh credential", account.phone);

        Ok(Self {
            account: account.phone.clone(),
            credential,
            signing_key,
            obtained_at: Local::now(),
        })
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn credential(&self) -> &str {
        &self.credential
    }

    pub fn signing_key(&self) -> &str {
        &self.signing_key
    }

    pub fn obtained_at(&self) -> DateTime<Local> {
        self.obtained_at
    }
}

async fn login(client: &SklandClient, account: &AccountConfig) -> Result<String, String> {
    let request = client
        .http()
        .post(client.auth_url(LOGIN_PATH))
        .json(&json!({ "phone": account.phone, "password": account.password }));
    let envelope = client.send(request).await?;
    envelope.ensure_ok()?;
    envelope.data_str("token")
}

async fn grant(client: &SklandClient, token: &str) -> Result<String, String> {
    let request = client
        .http()
        .post(client.auth_url(GRANT_PATH))
        .json(&json!({ "appCode": APP_CODE, "token": token, "type": 0 }));
    let envelope = client.send(request).await?;
    envelope.ensure_ok()?;
    envelope.data_str("code")
}

async fn issue_credential(client: &SklandClient, code: &str) -> Result<(String, String), String> {
    let request = client
        .http()
        .post(client.api_url(CREDENTIAL_PATH))
        .json(&json!({ "code": code, "kind": 1 }));
    let envelope = client.send(request).await?;
    envelope.ensure_ok()?;
    Ok((envelope.data_str("cred")?, envelope.data_str("token")?))
}
