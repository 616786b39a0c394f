//! Service configuration.
//!
//! Values come from `config/config.json` (every section optional) and are then
//! overridden by `MAA_*` environment variables and finally by CLI flags. A broken
//! `mail-sender` section or account entry only disables that piece; the problem is
//! kept in [`AppConfig::warnings`] so it can be logged once tracing is up.

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::core::error::ConfigError;
use crate::core::signin::SklandEndpoints;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.json";
pub const DEFAULT_SAVED_PATH: &str = "config/saved.json";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 4573;

#[derive(Clone, Deserialize)]
pub struct MailConfig {
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub ssl: bool,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("ssl", &self.ssl)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// One account enrolled in the daily sign-in.
#[derive(Clone, Deserialize)]
pub struct AccountConfig {
    pub phone: String,
    pub password: String,
    pub uid: String,
}

impl AccountConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("phone", &self.phone),
            ("password", &self.password),
            ("uid", &self.uid),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Account(format!(
                    "account '{}' has an empty {}",
                    self.phone, field
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountConfig")
            .field("phone", &self.phone)
            .field("uid", &self.uid)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub ssl_certfile: Option<PathBuf>,
    #[serde(default)]
    pub ssl_keyfile: Option<PathBuf>,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ssl_certfile: None,
            ssl_keyfile: None,
        }
    }
}

impl ServerConfig {
    /// Certificate and key, only when both are present.
    pub fn tls_paths(&self) -> Option<(&Path, &Path)> {
        match (&self.ssl_certfile, &self.ssl_keyfile) {
            (Some(cert), Some(key)) => Some((cert.as_path(), key.as_path())),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawConfig {
    #[serde(default)]
    mail_sender: Option<serde_json::Value>,
    #[serde(default)]
    accounts: Vec<serde_json::Value>,
    #[serde(default)]
    server: Option<ServerConfig>,
    #[serde(default)]
    skland: Option<SklandEndpoints>,
    #[serde(default)]
    saved: Option<PathBuf>,
    #[serde(default)]
    log_file: Option<PathBuf>,
}

#[derive(Debug)]
pub struct AppConfig {
    pub mail: Option<MailConfig>,
    pub accounts: Vec<AccountConfig>,
    pub server: ServerConfig,
    pub skland: SklandEndpoints,
    pub saved_path: PathBuf,
    pub log_file: Option<PathBuf>,
    pub warnings: Vec<ConfigError>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mail: None,
            accounts: Vec::new(),
            server: ServerConfig::default(),
            skland: SklandEndpoints::default(),
            saved_path: PathBuf::from(DEFAULT_SAVED_PATH),
            log_file: None,
            warnings: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Loads the config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        let raw: RawConfig = serde_json::from_str(contents)?;
        let mut config = Self::default();

        if let Some(mail) = raw.mail_sender {
            match serde_json::from_value::<MailConfig>(mail) {
                Ok(mail) => config.mail = Some(mail),
                Err(e) => config.warnings.push(ConfigError::Mail(e.to_string())),
            }
        }

        for (index, account) in raw.accounts.into_iter().enumerate() {
            match serde_json::from_value::<AccountConfig>(account) {
                Ok(account) => config.accounts.push(account),
                Err(e) => config
                    .warnings
                    .push(ConfigError::Account(format!("entry {}: {}", index, e))),
            }
        }

        if let Some(server) = raw.server {
            config.server = server;
        }
        if let Some(skland) = raw.skland {
            config.skland = skland;
        }
        if let Some(saved) = raw.saved {
            config.saved_path = saved;
        }
        config.log_file = raw.log_file;
        Ok(config)
    }

    /// Applies `MAA_HOST`, `MAA_PORT`, `MAA_SSL_CERTFILE`, `MAA_SSL_KEYFILE` and
    /// `MAA_SKLAND_BASE` (one base URL for both game services).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("MAA_HOST").filter(|v| !v.is_empty()) {
            self.server.host = host;
        }
        if let Some(port) = lookup("MAA_PORT").filter(|v| !v.is_empty()) {
            self.server.port = port.parse().map_err(|_| ConfigError::Env {
                name: "MAA_PORT",
                value: port.clone(),
            })?;
        }
        if let Some(cert) = lookup("MAA_SSL_CERTFILE").filter(|v| !v.is_empty()) {
            self.server.ssl_certfile = Some(PathBuf::from(cert));
        }
        if let Some(key) = lookup("MAA_SSL_KEYFILE").filter(|v| !v.is_empty()) {
            self.server.ssl_keyfile = Some(PathBuf::from(key));
        }
        if let Some(base) = lookup("MAA_SKLAND_BASE").filter(|v| !v.is_empty()) {
            self.skland = SklandEndpoints::single(&base);
        }
        Ok(())
    }
}

/// Config path from `MAA_CONFIG`, falling back to the default location.
pub fn config_path_from_env() -> PathBuf {
    std::env::var("MAA_CONFIG")
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("config.json")).unwrap();
        assert!(config.mail.is_none());
        assert!(config.accounts.is_empty());
        assert_eq!(config.server, ServerConfig::default());
        assert_eq!(config.skland, SklandEndpoints::default());
        assert_eq!(config.saved_path, PathBuf::from(DEFAULT_SAVED_PATH));
    }

    #[test]
    fn parses_full_config() {
        let config = AppConfig::from_json(
            r#"{
                "mail-sender": {"host": "smtp.example.com", "port": 465, "ssl": true,
                                "username": "ops@example.com", "password": "pw"},
                "accounts": [{"phone": "p1", "password": "x", "uid": "10001"}],
                "server": {"host": "127.0.0.1", "port": 8443,
                           "ssl-certfile": "cert.pem", "ssl-keyfile": "key.pem"},
                "saved": "state/saved.json"
            }"#,
        )
        .unwrap();

        let mail = config.mail.unwrap();
        assert_eq!(mail.port, 465);
        assert!(mail.ssl);
        assert_eq!(config.accounts.len(), 1);
        assert_eq!(config.accounts[0].uid, "10001");
        assert_eq!(config.server.port, 8443);
        assert!(config.server.tls_paths().is_some());
        assert_eq!(config.saved_path, PathBuf::from("state/saved.json"));
        assert!(config.warnings.is_empty());
    }

    #[test]
    fn malformed_mail_section_only_disables_mail() {
        let config = AppConfig::from_json(
            r#"{
                "mail-sender": {"host": "smtp.example.com"},
                "accounts": [{"phone": "p1", "password": "x", "uid": "1"}, {"phone": 3}]
            }"#,
        )
        .unwrap();

        assert!(config.mail.is_none());
        assert_eq!(config.accounts.len(), 1);
        assert_eq!(config.warnings.len(), 2);
        assert!(matches!(config.warnings[0], ConfigError::Mail(_)));
        assert!(matches!(config.warnings[1], ConfigError::Account(_)));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            AppConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn env_overrides_server_settings() {
        let env: HashMap<&str, &str> = [
            ("MAA_HOST", "127.0.0.1"),
            ("MAA_PORT", "9000"),
            ("MAA_SSL_CERTFILE", "a.crt"),
        ]
        .into_iter()
        .collect();
        let mut config = AppConfig::default();
        config
            .apply_env(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.ssl_certfile, Some(PathBuf::from("a.crt")));
        assert!(config.server.tls_paths().is_none());
    }

    #[test]
    fn skland_endpoints_from_file_and_env() {
        let mut config = AppConfig::from_json(
            r#"{"skland": {"auth-base": "http://auth.local", "api-base": "http://api.local"}}"#,
        )
        .unwrap();
        assert_eq!(config.skland.auth_base, "http://auth.local");
        assert_eq!(config.skland.api_base, "http://api.local");

        config
            .apply_env(|name| (name == "MAA_SKLAND_BASE").then(|| "http://mock:8080/".to_string()))
            .unwrap();
        assert_eq!(config.skland, SklandEndpoints::single("http://mock:8080"));
    }

    #[test]
    fn env_rejects_bad_port() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env(|name| (name == "MAA_PORT").then(|| "http".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { name: "MAA_PORT", .. }));
    }

    #[test]
    fn account_validation_rejects_blank_fields() {
        let account = AccountConfig {
            phone: "p1".to_string(),
            password: String::new(),
            uid: "1".to_string(),
        };
        assert!(account.validate().is_err());
    }
}
