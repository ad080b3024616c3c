//! Process-environment configuration (spec §6 "Environment variables").

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root SDK configuration, sourced from environment variables with
/// explicit overrides taking precedence (mirrors the teacher framework's
/// `ForgeConfig`, but sourced from env rather than a TOML file — this SDK
/// is embedded in a host app, not run as a standalone server).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InngestConfig {
    pub event_key: Option<String>,
    pub signing_key: Option<String>,
    pub signing_key_fallback: Option<String>,
    pub env: Option<String>,
    pub base_url: String,
    pub serve_host: Option<String>,
    pub serve_path: Option<String>,
    pub is_dev: bool,
    pub log_level: String,
    /// How long the engine waits for a `requestedRunStep` to be
    /// discovered before emitting `step-not-found` (spec §4.4, §9 Open
    /// Questions: parametrized rather than hard-coded).
    #[serde(with = "duration_secs")]
    pub step_not_found_timeout: Duration,
}

impl Default for InngestConfig {
    fn default() -> Self {
        Self {
            event_key: None,
            signing_key: None,
            signing_key_fallback: None,
            env: None,
            base_url: default_base_url(),
            serve_host: None,
            serve_path: None,
            is_dev: false,
            log_level: default_log_level(),
            step_not_found_timeout: Duration::from_secs(10),
        }
    }
}

impl InngestConfig {
    /// Build configuration from `INNGEST_*` environment variables,
    /// falling back to defaults for anything unset.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("INNGEST_EVENT_KEY") {
            config.event_key = Some(v);
        }
        if let Ok(v) = std::env::var("INNGEST_SIGNING_KEY") {
            config.signing_key = Some(v);
        }
        if let Ok(v) = std::env::var("INNGEST_SIGNING_KEY_FALLBACK") {
            config.signing_key_fallback = Some(v);
        }
        if let Ok(v) = std::env::var("INNGEST_ENV") {
            config.env = Some(v);
        }
        if let Ok(v) = std::env::var("INNGEST_BASE_URL") {
            config.base_url = v;
        }
        if let Ok(v) = std::env::var("INNGEST_SERVE_HOST") {
            config.serve_host = Some(v);
        }
        if let Ok(v) = std::env::var("INNGEST_SERVE_PATH") {
            config.serve_path = Some(v);
        }
        if let Ok(v) = std::env::var("INNGEST_DEV") {
            config.is_dev = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Ok(v) = std::env::var("INNGEST_LOG_LEVEL") {
            config.log_level = v;
        }

        config
    }

    /// Whether this runtime should identify itself as `dev` to the
    /// Executor (`X-Inngest-Server-Kind`).
    pub fn server_kind(&self) -> &'static str {
        if self.is_dev {
            "dev"
        } else {
            "cloud"
        }
    }
}

fn default_base_url() -> String {
    "https://api.inngest.com".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = InngestConfig::default();
        assert_eq!(config.server_kind(), "cloud");
        assert_eq!(config.step_not_found_timeout, Duration::from_secs(10));
    }

    #[test]
    fn dev_flag_flips_server_kind() {
        let mut config = InngestConfig::default();
        config.is_dev = true;
        assert_eq!(config.server_kind(), "dev");
    }
}
