use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use tracing::{debug, error, info, warn};

use super::session::SklandSession;
use super::signer::{SignHeaders, canonical_string, sign, signing_timestamp};
use super::SklandClient;
use crate::core::config::AccountConfig;
use crate::core::error::SignInError;
use crate::core::notifier::Notifier;

pub const ATTENDANCE_PATH: &str = "/api/v1/game/attendance";
const GAME_ID: &str = "1";

/// One item granted by a successful attendance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Award {
    pub name: String,
    pub count: i64,
}

impl fmt::Display for Award {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x{}", self.name, self.count)
    }
}

#[derive(Deserialize)]
struct RawAward {
    resource: RawResource,
    #[serde(default)]
    count: i64,
}

#[derive(Deserialize)]
struct RawResource {
    name: String,
}

/// Daily sign-in for one account. Holds no state between runs.
#[derive(Clone)]
pub struct SignInJob {
    client: SklandClient,
    account: AccountConfig,
    notifier: Notifier,
}

impl SignInJob {
    pub fn new(client: SklandClient, account: AccountConfig, notifier: Notifier) -> Self {
        Self {
            client,
            account,
            notifier,
        }
    }

    pub fn account(&self) -> &str {
        &self.account.phone
    }

    /// Scheduled entry point; the outcome is only logged.
    pub async fn run(&self) {
        let _ = self.execute().await;
    }

    /// One attempt with the failure policy applied: request failures are mailed
    /// to the operator, handshake failures are only logged.
    pub async fn execute(&self) -> Result<Vec<Award>, SignInError> {
        let result = self.attempt().await;
        match &result {
            Ok(_) => {}
            Err(SignInError::Auth(e)) => {
                error!(
                    "Daily sign-in for [{}] skipped, handshake failed at {}: {}",
                    e.account, e.phase, e.reason
                );
            }
            Err(e @ SignInError::Request { .. }) => {
                error!("{}", e);
                if let Err(mail_err) = self.notifier.notify_sign_in_failure(self.account()).await {
                    warn!(
                        "Failed to send sign-in failure notice for [{}]: {}",
                        self.account(),
                        mail_err
                    );
                }
            }
        }
        result
    }

    /// One attempt: fresh session, signed attendance call, parsed awards.
    pub async fn attempt(&self) -> Result<Vec<Award>, SignInError> {
        let session = SklandSession::establish(&self.client, &self.account).await?;
        debug!(
            "Session for [{}] ready since {}",
            session.account(),
            session.obtained_at().format("%H:%M:%S")
        );
        let awards = self
            .attend(&session)
            .await
            .map_err(|reason| SignInError::Request {
                account: self.account.phone.clone(),
                reason,
            })?;

        let listed: Vec<String> = awards.iter().map(Award::to_string).collect();
        info!(
            "Daily sign-in for [{}] succeeded, awards: [{}]",
            self.account(),
            listed.join(", ")
        );
        Ok(awards)
    }

    async fn attend(&self, session: &SklandSession) -> Result<Vec<Award>, String> {
        let url = self.client.api_url(ATTENDANCE_PATH);
        let timestamp = signing_timestamp(Utc::now());
        let headers = SignHeaders::with_timestamp(timestamp.clone());
        let signature = sign(
            session.signing_key(),
            &canonical_string(&url, &timestamp, &headers),
        );

        let request = self
            .client
            .http()
            .post(&url)
            .header("cred", session.credential())
            .header("sign", signature)
            .header("platform", &headers.platform)
            .header("timestamp", &headers.timestamp)
            .header("dId", &headers.d_id)
            .header("vName", &headers.v_name)
            .json(&json!({ "uid": self.account.uid, "gameId": GAME_ID }));

        let envelope = self.client.send(request).await?;
        envelope.ensure_ok()?;
        parse_awards(envelope.data())
    }
}

fn parse_awards(data: Option<&serde_json::Value>) -> Result<Vec<Award>, String> {
    let Some(awards) = data.and_then(|data| data.get("awards")) else {
        return Ok(Vec::new());
    };
    let raw: Vec<RawAward> = serde_json::from_value(awards.clone())
        .map_err(|e| format!("unexpected awards payload: {}", e))?;
    Ok(raw
        .into_iter()
        .map(|award| Award {
            name: award.resource.name,
            count: award.count,
        })
        .collect())
}
