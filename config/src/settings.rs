//! Typed server settings read from the (already layered) environment.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Deployment environment tag, from `ENV`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvTag {
    Local,
    Dev,
    Prod,
}

impl EnvTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvTag::Local => "local",
            EnvTag::Dev => "dev",
            EnvTag::Prod => "prod",
        }
    }
}

impl fmt::Display for EnvTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvTag {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(EnvTag::Local),
            "dev" | "development" => Ok(EnvTag::Dev),
            "prod" | "production" => Ok(EnvTag::Prod),
            _ => Err(()),
        }
    }
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Everything the server reads at startup. Flag defaults: retry off,
/// request logging off, history summarization on.
#[derive(Clone, Debug)]
pub struct Settings {
    pub env: EnvTag,
    pub openai_api_key: String,
    /// Model override; the factory default applies when unset.
    pub model: Option<String>,
    pub enable_retry: bool,
    pub enable_logging: bool,
    pub enable_summarization: bool,
    pub max_retries: u32,
}

impl Settings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup, so
    /// tests never mutate the process environment.
    pub fn from_env_with(
        get: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, SettingsError> {
        let env = match get("ENV") {
            None => EnvTag::Local,
            Some(raw) => raw.parse().map_err(|_| SettingsError::Invalid {
                key: "ENV",
                value: raw,
            })?,
        };
        let openai_api_key = get("OPENAI_API_KEY")
            .filter(|v| !v.trim().is_empty())
            .ok_or(SettingsError::Missing("OPENAI_API_KEY"))?;
        let model = get("MODEL").filter(|v| !v.trim().is_empty());
        let enable_retry = env_bool(&get, "ENABLE_RETRY", false)?;
        let enable_logging = env_bool(&get, "ENABLE_LOGGING", false)?;
        let enable_summarization = env_bool(&get, "ENABLE_SUMMARIZATION", true)?;
        let max_retries = match get("MAX_RETRIES") {
            None => 3,
            Some(raw) => raw.parse().map_err(|_| SettingsError::Invalid {
                key: "MAX_RETRIES",
                value: raw,
            })?,
        };

        Ok(Self {
            env,
            openai_api_key,
            model,
            enable_retry,
            enable_logging,
            enable_summarization,
            max_retries,
        })
    }
}

fn env_bool(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: bool,
) -> Result<bool, SettingsError> {
    match get(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "" => Ok(default),
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(SettingsError::Invalid { key, value: raw }),
        },
    }
}
