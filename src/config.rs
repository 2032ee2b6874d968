//! Configuration types, read from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};
use crate::mailer::MailerConfig;
use crate::questionnaire::{RequesterConfig, SessionLimits};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DB_PATH: &str = "./data/trip-planner.db";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Where the signed-in user comes from.
#[derive(Debug, Clone)]
pub enum IdentityConfig {
    Supabase {
        url: String,
        anon_key: SecretString,
    },
    /// Fixed local user, or nobody when `user_id` is `None`.
    Static { user_id: Option<String> },
}

/// Database location. `:memory:` selects a throwaway in-memory database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbLocation {
    Memory,
    File(PathBuf),
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub db: DbLocation,
    pub llm: LlmConfig,
    pub requester: RequesterConfig,
    pub identity: IdentityConfig,
    /// `None` disables the itinerary e-mail endpoint.
    pub mailer: Option<MailerConfig>,
    pub sessions: SessionLimits,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let backend: LlmBackend = match var("TRIP_PLANNER_LLM_BACKEND") {
            Some(value) => value.parse()?,
            None => LlmBackend::OpenAi,
        };
        let api_key = var(backend.api_key_var())
            .ok_or_else(|| ConfigError::MissingEnvVar(backend.api_key_var().to_string()))?;
        let model = var("TRIP_PLANNER_MODEL").unwrap_or_else(|| backend.default_model().to_string());
        let request_timeout = Duration::from_secs(
            parse_var(&var, "TRIP_PLANNER_REQUEST_TIMEOUT_SECS")?
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        );

        let mut requester = RequesterConfig::default();
        if let Some(temperature) = parse_var::<f32>(&var, "TRIP_PLANNER_TEMPERATURE")? {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ConfigError::InvalidValue {
                    key: "TRIP_PLANNER_TEMPERATURE".to_string(),
                    message: format!("{temperature} is outside 0.0..=2.0"),
                });
            }
            requester.temperature = temperature;
        }
        requester.max_tokens = parse_var(&var, "TRIP_PLANNER_MAX_TOKENS")?;

        let port = parse_var(&var, "TRIP_PLANNER_PORT")?.unwrap_or(DEFAULT_PORT);
        let db = match var("TRIP_PLANNER_DB_PATH").as_deref() {
            Some(":memory:") => DbLocation::Memory,
            Some(path) => DbLocation::File(PathBuf::from(path)),
            None => DbLocation::File(PathBuf::from(DEFAULT_DB_PATH)),
        };

        let identity = match (var("SUPABASE_URL"), var("SUPABASE_ANON_KEY")) {
            (Some(url), Some(anon_key)) => IdentityConfig::Supabase {
                url,
                anon_key: SecretString::from(anon_key),
            },
            (Some(_), None) => return Err(ConfigError::MissingEnvVar("SUPABASE_ANON_KEY".into())),
            _ => IdentityConfig::Static {
                user_id: var("TRIP_PLANNER_DEV_USER"),
            },
        };

        let mut sessions = SessionLimits::default();
        if let Some(secs) = parse_var::<u64>(&var, "TRIP_PLANNER_CALL_TIMEOUT_SECS")? {
            sessions.call_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&var, "TRIP_PLANNER_SESSION_IDLE_SECS")? {
            sessions.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(max) = parse_var::<usize>(&var, "TRIP_PLANNER_MAX_SESSIONS")? {
            if max == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "TRIP_PLANNER_MAX_SESSIONS".to_string(),
                    message: "must be at least 1".to_string(),
                });
            }
            sessions.max_sessions = max;
        }

        Ok(Self {
            port,
            db,
            llm: LlmConfig {
                backend,
                api_key: SecretString::from(api_key),
                model,
                request_timeout,
            },
            requester,
            identity,
            mailer: MailerConfig::from_lookup(var),
            sessions,
        })
    }
}

fn parse_var<T>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    var(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(move |key| map.get(key).cloned())
    }

    #[test]
    fn defaults_with_only_api_key() {
        let cfg = config(&[("OPENAI_API_KEY", "sk-test")]).unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.db, DbLocation::File(PathBuf::from("./data/trip-planner.db")));
        assert_eq!(cfg.llm.backend, LlmBackend::OpenAi);
        assert_eq!(cfg.llm.model, "gpt-4");
        assert_eq!(cfg.llm.request_timeout, Duration::from_secs(120));
        assert_eq!(cfg.requester, RequesterConfig::default());
        assert!(matches!(cfg.identity, IdentityConfig::Static { user_id: None }));
        assert!(cfg.mailer.is_none());
        assert_eq!(cfg.sessions, SessionLimits::default());
    }

    #[test]
    fn missing_api_key_is_an_error() {
        let err = config(&[("TRIP_PLANNER_LLM_BACKEND", "anthropic")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "ANTHROPIC_API_KEY"));
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = config(&[
            ("TRIP_PLANNER_LLM_BACKEND", "anthropic"),
            ("ANTHROPIC_API_KEY", "key"),
            ("TRIP_PLANNER_MODEL", "claude-test"),
            ("TRIP_PLANNER_TEMPERATURE", "0.2"),
            ("TRIP_PLANNER_MAX_TOKENS", "2048"),
            ("TRIP_PLANNER_PORT", "9000"),
            ("TRIP_PLANNER_DB_PATH", ":memory:"),
            ("TRIP_PLANNER_DEV_USER", "dev"),
            ("SMTP_HOST", "smtp.example.com"),
            ("TRIP_PLANNER_CALL_TIMEOUT_SECS", "3"),
            ("TRIP_PLANNER_SESSION_IDLE_SECS", "600"),
            ("TRIP_PLANNER_MAX_SESSIONS", "50"),
        ])
        .unwrap();
        assert_eq!(cfg.sessions.call_timeout, Duration::from_secs(3));
        assert_eq!(cfg.sessions.idle_timeout, Duration::from_secs(600));
        assert_eq!(cfg.sessions.max_sessions, 50);
        assert_eq!(cfg.llm.model, "claude-test");
        assert_eq!(cfg.requester.temperature, 0.2);
        assert_eq!(cfg.requester.max_tokens, Some(2048));
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.db, DbLocation::Memory);
        assert!(matches!(cfg.identity, IdentityConfig::Static { user_id: Some(ref u) } if u == "dev"));
        assert_eq!(cfg.mailer.unwrap().smtp_port, 587);
    }

    #[test]
    fn supabase_identity_needs_both_vars() {
        let cfg = config(&[
            ("OPENAI_API_KEY", "sk"),
            ("SUPABASE_URL", "https://x.supabase.co"),
            ("SUPABASE_ANON_KEY", "anon"),
        ])
        .unwrap();
        assert!(matches!(cfg.identity, IdentityConfig::Supabase { .. }));

        let err = config(&[("OPENAI_API_KEY", "sk"), ("SUPABASE_URL", "https://x.supabase.co")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(_)));
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let err = config(&[("OPENAI_API_KEY", "sk"), ("TRIP_PLANNER_PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "TRIP_PLANNER_PORT"));

        let err =
            config(&[("OPENAI_API_KEY", "sk"), ("TRIP_PLANNER_TEMPERATURE", "3.5")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = config(&[("OPENAI_API_KEY", "sk"), ("TRIP_PLANNER_MAX_SESSIONS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "TRIP_PLANNER_MAX_SESSIONS"));
    }
}
