//! Runtime settings.
//!
//! Layers, later ones win: built-in defaults, an optional YAML file, then
//! environment variables (a `.env` file is loaded first if present).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },

    #[error("{0}")]
    Invalid(String),
}

/// Which sheet parser backs the sheets stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SheetParserKind {
    /// Language-model assisted extraction
    Llm,
    /// Deterministic CSV reader
    Tabular,
}

impl std::str::FromStr for SheetParserKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "llm" => Ok(SheetParserKind::Llm),
            "tabular" | "csv" => Ok(SheetParserKind::Tabular),
            other => Err(ConfigError::InvalidValue {
                key: "SHEET_PARSER".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Connection details for the Infoblox appliance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InfobloxSettings {
    pub host: Option<String>,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub api_version: String,
    pub dns_view: String,
    pub verify_tls: bool,
}

impl Default for InfobloxSettings {
    fn default() -> Self {
        Self {
            host: None,
            username: "admin".to_string(),
            password: String::new(),
            api_version: "v2.5".to_string(),
            dns_view: "default".to_string(),
            verify_tls: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(skip_serializing)]
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub llm_timeout_secs: u64,
    pub http_timeout_secs: u64,
    /// `None` picks `llm` when an API key is configured, `tabular` otherwise
    pub sheet_parser: Option<SheetParserKind>,
    pub infoblox: InfobloxSettings,
    /// `None` means dry-run exactly when no Infoblox host is configured
    pub dns_dry_run: Option<bool>,
    pub database_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_model: "gemini-2.0-flash-exp".to_string(),
            llm_timeout_secs: 30,
            http_timeout_secs: 20,
            sheet_parser: None,
            infoblox: InfobloxSettings::default(),
            dns_dry_run: None,
            database_path: None,
        }
    }
}

impl Settings {
    /// Load settings from defaults, `config_file` and the process environment
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let mut settings = match config_file {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_yaml_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Override fields from environment-style variables
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(key) = get("GOOGLE_GEMINI_API_KEY") {
            self.gemini_api_key = Some(key);
        }
        if let Some(model) = get("GEMINI_MODEL") {
            self.gemini_model = model;
        }
        if let Some(host) = get("INFOBLOX_HOST") {
            self.infoblox.host = Some(host);
        }
        if let Some(username) = get("INFOBLOX_USERNAME") {
            self.infoblox.username = username;
        }
        if let Some(password) = get("INFOBLOX_PASSWORD") {
            self.infoblox.password = password;
        }
        if let Some(version) = get("INFOBLOX_API_VERSION") {
            self.infoblox.api_version = version;
        }
        if let Some(view) = get("DNS_VIEW") {
            self.infoblox.dns_view = view;
        }
        if let Some(value) = get("INFOBLOX_VERIFY_TLS") {
            self.infoblox.verify_tls = parse_bool("INFOBLOX_VERIFY_TLS", &value)?;
        }
        if let Some(value) = get("DNS_DRY_RUN") {
            self.dns_dry_run = Some(parse_bool("DNS_DRY_RUN", &value)?);
        }
        if let Some(value) = get("SHEET_PARSER") {
            self.sheet_parser = Some(value.parse()?);
        }
        if let Some(path) = get("ASSISTANT_DATABASE") {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(value) = get("LLM_TIMEOUT_SECS") {
            self.llm_timeout_secs = parse_secs("LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = get("HTTP_TIMEOUT_SECS") {
            self.http_timeout_secs = parse_secs("HTTP_TIMEOUT_SECS", &value)?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm_timeout_secs == 0 || self.http_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "timeouts must be at least one second".to_string(),
            ));
        }
        if self.dns_dry_run == Some(false) && self.infoblox.host.is_none() {
            return Err(ConfigError::Invalid(
                "DNS_DRY_RUN=false requires INFOBLOX_HOST".to_string(),
            ));
        }
        Ok(())
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn has_llm(&self) -> bool {
        self.gemini_api_key.is_some()
    }

    pub fn effective_sheet_parser(&self) -> SheetParserKind {
        self.sheet_parser.unwrap_or(if self.has_llm() {
            SheetParserKind::Llm
        } else {
            SheetParserKind::Tabular
        })
    }

    pub fn dns_dry_run(&self) -> bool {
        self.dns_dry_run.unwrap_or(self.infoblox.host.is_none())
    }

    /// Configured database path, or `assistant.db` in the platform data dir
    pub fn database_path(&self) -> PathBuf {
        if let Some(path) = &self.database_path {
            return path.clone();
        }
        use directories::ProjectDirs;

        if let Some(proj_dirs) = ProjectDirs::from("com", "cluster-assistant", "cluster-assistant") {
            proj_dirs.data_dir().join("assistant.db")
        } else {
            PathBuf::from(".cluster-assistant.db")
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
