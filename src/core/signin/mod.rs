//! Daily attendance on the Skland game service.
//!
//! Every run performs the full handshake again ([`session`]), signs the attendance
//! request ([`signer`]) and reports failures to the operator ([`job`]). The
//! [`scheduler`] turns configured accounts into daily cron jobs.

pub mod job;
pub mod scheduler;
pub mod session;
pub mod signer;

use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_AUTH_BASE: &str = "https://as.hypergryph.com";
pub const DEFAULT_API_BASE: &str = "https://zonai.skland.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Base URLs of the account service and the game API. Configurable through the
/// `skland` config section or `MAA_SKLAND_BASE`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SklandEndpoints {
    pub auth_base: String,
    pub api_base: String,
}

impl Default for SklandEndpoints {
    fn default() -> Self {
        Self {
            auth_base: DEFAULT_AUTH_BASE.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }
}

impl SklandEndpoints {
    /// Both services behind one base URL.
    pub fn single(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            auth_base: base.clone(),
            api_base: base,
        }
    }
}

/// HTTP client for the game service. Cheap to clone.
#[derive(Clone)]
pub struct SklandClient {
    http: reqwest::Client,
    endpoints: SklandEndpoints,
}

impl SklandClient {
    pub fn new(endpoints: SklandEndpoints) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http, endpoints })
    }

    pub fn auth_url(&self, path: &str) -> String {
        format!("{}{}", self.endpoints.auth_base, path)
    }

    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.endpoints.api_base, path)
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Sends the request and decodes the service envelope. Non-2xx is an error.
    pub(crate) async fn send(&self, request: reqwest::RequestBuilder) -> Result<Envelope, String> {
        let response = request
            .send()
            .await
            .map_err(|e| format!("HTTP request failed: {}", e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| format!("failed to read response body: {}", e))?;

        if !status.is_success() {
            return Err(format!("HTTP {}: {}", status, body));
        }
        serde_json::from_str(&body).map_err(|e| format!("unparseable response ({}): {}", e, body))
    }
}

/// Response wrapper shared by both services. The account service reports
/// `status`, the game API reports `code`; zero means success either way.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    #[serde(default)]
    status: Option<i64>,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default, alias = "message")]
    msg: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

impl Envelope {
    pub(crate) fn ensure_ok(&self) -> Result<(), String> {
        match self.status.or(self.code) {
            Some(0) => Ok(()),
            Some(code) => Err(format!(
                "service returned {}: {}",
                code,
                self.msg.as_deref().unwrap_or("no message")
            )),
            None => Err("response carries no status".to_string()),
        }
    }

    pub(crate) fn data_str(&self, field: &str) -> Result<String, String> {
        self.data
            .as_ref()
            .and_then(|data| data.get(field))
            .and_then(|value| value.as_str())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .ok_or_else(|| format!("response is missing data.{}", field))
    }

    pub(crate) fn data(&self) -> Option<&serde_json::Value> {
        self.data.as_ref()
    }
}
