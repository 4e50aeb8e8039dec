use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{ParleyError, Result};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_SESSION_ID: &str = "mySession1";
pub const DEFAULT_LANGUAGE_CODE: &str = "en";
pub const DEFAULT_GRAPH_API_VERSION: &str = "2.11";
pub const DEFAULT_MAX_MESSAGES: u32 = 10;
pub const DEFAULT_ERROR_PAUSE_MS: u64 = 1_000;

/// Top-level config (parley.toml + PARLEY_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParleyConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    pub pubsub: PubSubConfig,
    pub dialogflow: DialogflowConfig,
    pub messenger: MessengerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Bearer token required by the listener control endpoints.
    /// When unset the endpoints are open.
    pub control_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            control_token: None,
        }
    }
}

/// Cloud Pub/Sub subscription carrying the webhook events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PubSubConfig {
    pub project_id: String,
    /// Path to the GCP service account JSON key file.
    pub key_file: String,
    /// Subscription name (short name, not the full resource path).
    pub subscription: String,
    /// Upper bound on messages returned by a single pull.
    #[serde(default = "default_max_messages")]
    pub max_messages: u32,
    /// Pause after a failed pull before pulling again.
    #[serde(default = "default_error_pause_ms")]
    pub error_pause_ms: u64,
    #[serde(default = "default_pubsub_api_base")]
    pub api_base: String,
    /// Start pulling as soon as the gateway boots (default: true).
    #[serde(default = "bool_true")]
    pub attach_on_start: bool,
}

/// Dialogflow v2 agent used for intent detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogflowConfig {
    pub project_id: String,
    pub key_file: String,
    /// Fixed session id shared by every conversation.
    #[serde(default = "default_session_id")]
    pub session_id: String,
    #[serde(default = "default_language_code")]
    pub language_code: String,
    #[serde(default = "default_dialogflow_api_base")]
    pub api_base: String,
}

/// Messenger Send API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessengerConfig {
    pub page_access_token: String,
    /// Graph API version without the leading `v` (e.g. "2.11").
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_graph_base")]
    pub graph_base: String,
    #[serde(default)]
    pub text_lines: TextLinePolicy,
}

/// How a text fulfillment with several lines becomes outbound messages.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TextLinePolicy {
    /// One message carrying only the last line. Earlier lines are dropped.
    #[default]
    LastWins,
    /// One message per line, in order.
    OnePerLine,
}

fn bool_true() -> bool {
    true
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_max_messages() -> u32 {
    DEFAULT_MAX_MESSAGES
}
fn default_error_pause_ms() -> u64 {
    DEFAULT_ERROR_PAUSE_MS
}
fn default_pubsub_api_base() -> String {
    "https://pubsub.googleapis.com".to_string()
}
fn default_session_id() -> String {
    DEFAULT_SESSION_ID.to_string()
}
fn default_language_code() -> String {
    DEFAULT_LANGUAGE_CODE.to_string()
}
fn default_dialogflow_api_base() -> String {
    "https://dialogflow.googleapis.com".to_string()
}
fn default_api_version() -> String {
    DEFAULT_GRAPH_API_VERSION.to_string()
}
fn default_graph_base() -> String {
    "https://graph.facebook.com".to_string()
}

impl ParleyConfig {
    /// Load config from a TOML file with PARLEY_* env var overrides.
    ///
    /// Nested keys use a double underscore:
    /// `PARLEY_MESSENGER__PAGE_ACCESS_TOKEN` overrides `messenger.page_access_token`.
    /// Relative key file paths are resolved against the config file's directory.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(PathBuf::from)
            .unwrap_or_else(default_config_path);
        debug!(path = %path.display(), "loading config");

        let mut config: ParleyConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("PARLEY_").split("__"))
            .extract()
            .map_err(|e| ParleyError::Config(e.to_string()))?;

        if let Some(dir) = path.parent() {
            config.resolve_key_files(dir);
        }
        config.validate()?;
        Ok(config)
    }

    fn resolve_key_files(&mut self, base: &Path) {
        self.pubsub.key_file = resolve_against(base, &self.pubsub.key_file);
        self.dialogflow.key_file = resolve_against(base, &self.dialogflow.key_file);
    }

    /// Reject values that deserialize fine but cannot work at runtime.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("pubsub.project_id", &self.pubsub.project_id),
            ("pubsub.key_file", &self.pubsub.key_file),
            ("pubsub.subscription", &self.pubsub.subscription),
            ("dialogflow.project_id", &self.dialogflow.project_id),
            ("dialogflow.key_file", &self.dialogflow.key_file),
            ("dialogflow.session_id", &self.dialogflow.session_id),
            ("messenger.page_access_token", &self.messenger.page_access_token),
            ("messenger.api_version", &self.messenger.api_version),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(ParleyError::Config(format!("{key} must not be empty")));
            }
        }
        if self.pubsub.max_messages == 0 {
            return Err(ParleyError::Config(
                "pubsub.max_messages must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn resolve_against(base: &Path, file: &str) -> String {
    let p = Path::new(file);
    if p.is_absolute() || file.is_empty() || base.as_os_str().is_empty() {
        file.to_string()
    } else {
        base.join(p).to_string_lossy().into_owned()
    }
}

fn default_config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".parley").join("parley.toml")
}
