//! Client configuration and the stored integration settings.
//!
//! `ClientConfig` describes one connection to the CRM backend. `Settings`
//! mirrors what the site stores for the integration (backend address, keys,
//! sync switches, per-webform flags) and is loaded either from a JSON
//! document or from the environment.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Scheme used for the `Authorization` header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthScheme {
    #[default]
    Bearer,
    Token,
}

impl AuthScheme {
    pub fn header_value(self, api_key: &str) -> String {
        format!("{self} {api_key}")
    }
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthScheme::Bearer => f.write_str("Bearer"),
            AuthScheme::Token => f.write_str("Token"),
        }
    }
}

impl FromStr for AuthScheme {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bearer" => Ok(AuthScheme::Bearer),
            "token" => Ok(AuthScheme::Token),
            other => Err(ConfigError::Invalid {
                key: "auth_scheme",
                reason: format!("unknown scheme `{other}`"),
            }),
        }
    }
}

impl<'de> Deserialize<'de> for AuthScheme {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("settings document is not valid: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("could not read settings: {0}")]
    Io(#[from] std::io::Error),
}

/// Connection parameters for one client instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub auth_scheme: AuthScheme,
    /// Merged over the default `Accept`/`Content-Type` headers.
    pub extra_headers: Vec<(String, String)>,
    pub timeout: Duration,
    /// Log recovered conflicts at `info` instead of `debug`.
    pub log_conflicts: bool,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            auth_scheme: AuthScheme::default(),
            extra_headers: Vec::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            log_conflicts: false,
        }
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn auth_scheme(mut self, scheme: AuthScheme) -> Self {
        self.auth_scheme = scheme;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn log_conflicts(mut self, enabled: bool) -> Self {
        self.log_conflicts = enabled;
        self
    }
}

fn truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(is_truthy(&Value::deserialize(deserializer)?))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => matches!(s.trim(), "1" | "true" | "yes" | "on"),
        _ => false,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Stored integration settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    pub site_url: String,
    #[serde(default)]
    pub site_name: Option<String>,
    pub crm_api_base_url: String,
    #[serde(default)]
    pub crm_api_key: Option<String>,
    #[serde(default)]
    pub crm_auth_scheme: AuthScheme,
    #[serde(default)]
    pub mailjet_api_key_public: Option<String>,
    #[serde(default)]
    pub mailjet_api_key_private: Option<String>,
    /// Sync site users into the CRM.
    #[serde(default, rename = "syncronize", alias = "synchronize", deserialize_with = "truthy")]
    pub synchronize: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub log_conflicts: bool,
    /// Remaining keys, including the `webform_<id>` flags.
    #[serde(flatten)]
    pub flags: BTreeMap<String, Value>,
}

impl Settings {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let mut settings: Settings = serde_json::from_str(raw)?;
        settings.crm_api_key = non_empty(settings.crm_api_key.take());
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from a key lookup using the `CRM_*` variable names.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut flags = BTreeMap::new();
        if let Some(list) = lookup("CRM_WEBFORMS") {
            for id in list.split(',').map(str::trim).filter(|id| !id.is_empty()) {
                flags.insert(format!("webform_{id}"), Value::Bool(true));
            }
        }

        let settings = Settings {
            site_url: lookup("CRM_SITE_URL").unwrap_or_default(),
            site_name: non_empty(lookup("CRM_SITE_NAME")),
            crm_api_base_url: lookup("CRM_API_BASE_URL").unwrap_or_default(),
            crm_api_key: non_empty(lookup("CRM_API_KEY")),
            crm_auth_scheme: match lookup("CRM_AUTH_SCHEME") {
                Some(raw) => raw.parse()?,
                None => AuthScheme::default(),
            },
            mailjet_api_key_public: non_empty(lookup("MAILJET_API_KEY_PUBLIC")),
            mailjet_api_key_private: non_empty(lookup("MAILJET_API_KEY_PRIVATE")),
            synchronize: lookup("CRM_SYNCHRONIZE")
                .map(|v| is_truthy(&Value::String(v)))
                .unwrap_or(false),
            timeout_secs: match lookup("CRM_TIMEOUT_SECS") {
                Some(raw) => raw.trim().parse().map_err(|e| ConfigError::Invalid {
                    key: "CRM_TIMEOUT_SECS",
                    reason: format!("{e}"),
                })?,
                None => DEFAULT_TIMEOUT_SECS,
            },
            log_conflicts: lookup("CRM_LOG_CONFLICTS")
                .map(|v| is_truthy(&Value::String(v)))
                .unwrap_or(false),
            flags,
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.site_url.trim().is_empty() {
            return Err(ConfigError::Missing("site_url"));
        }
        if self.crm_api_base_url.trim().is_empty() {
            return Err(ConfigError::Missing("crm_api_base_url"));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Name used for the website record; falls back to the site URL.
    pub fn site_name(&self) -> &str {
        self.site_name.as_deref().unwrap_or(&self.site_url)
    }

    pub fn is_webform_enabled(&self, webform_id: &str) -> bool {
        self.flags
            .get(&format!("webform_{webform_id}"))
            .is_some_and(is_truthy)
    }

    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(&self.crm_api_base_url)
            .auth_scheme(self.crm_auth_scheme)
            .timeout(Duration::from_secs(self.timeout_secs))
            .log_conflicts(self.log_conflicts);
        if let Some(key) = &self.crm_api_key {
            config = config.api_key(key);
        }
        config
    }
}
