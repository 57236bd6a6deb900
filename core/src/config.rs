use crate::error::CoreError;
use crate::error::Result;

/// Runtime configuration, constructed once at startup and threaded through as
/// an owned value (never a global). A malformed environment variable is a
/// startup error, not a silent fallback to a default.
#[derive(Debug, Clone)]
pub struct Config {
    pub canvas_api_token: String,
    pub canvas_api_url: String,
    pub api_timeout_secs: u64,
    pub cache_ttl_secs: u64,
    pub max_concurrent_requests: usize,
    pub log_level: String,
    /// Whether every outbound Canvas call is narrated on the `tracing`
    /// diagnostic stream (distinct from the audit log below).
    pub log_api_requests: bool,
    pub log_access_events: bool,
    pub log_execution_events: bool,
    pub enable_data_anonymization: bool,
    /// Surfaces pseudonym-generation events and cache size on the `tracing`
    /// stream; never changes the pseudonym derivation itself.
    pub anonymization_debug: bool,
    pub audit_log_dir: String,
    pub institution_name: String,
    pub timezone: String,
}

impl Config {
    /// Expands a leading `~/` in `audit_log_dir` against the current user's
    /// home directory, falling back to the process temp dir if it can't be
    /// determined (never fails startup over an audit-log path).
    pub fn resolved_audit_log_dir(&self) -> std::path::PathBuf {
        match self.audit_log_dir.strip_prefix("~/") {
            Some(rest) => dirs::home_dir().unwrap_or_else(std::env::temp_dir).join(rest),
            None => std::path::PathBuf::from(&self.audit_log_dir),
        }
    }

    /// Loads configuration from environment variables. `CANVAS_API_TOKEN` and
    /// `CANVAS_API_URL` are required; everything else has a documented
    /// default matching the original integration's behavior.
    pub fn from_env() -> Result<Self> {
        let canvas_api_token = non_empty_env("CANVAS_API_TOKEN")?;
        let canvas_api_url = non_empty_env("CANVAS_API_URL")?;
        if !canvas_api_url.ends_with("/api/v1") {
            tracing::warn!(
                url = %canvas_api_url,
                "CANVAS_API_URL does not end in /api/v1; Canvas requests may 404"
            );
        }

        Ok(Config {
            canvas_api_token,
            canvas_api_url,
            api_timeout_secs: env_u64("API_TIMEOUT", 30)?,
            cache_ttl_secs: env_u64("CACHE_TTL", 300)?,
            max_concurrent_requests: env_u64("MAX_CONCURRENT_REQUESTS", 10)? as usize,
            log_level: env_or("LOG_LEVEL", "INFO").to_uppercase(),
            log_api_requests: env_bool("LOG_API_REQUESTS", false)?,
            log_access_events: env_bool("LOG_ACCESS_EVENTS", false)?,
            log_execution_events: env_bool("LOG_EXECUTION_EVENTS", false)?,
            enable_data_anonymization: env_bool("ENABLE_DATA_ANONYMIZATION", true)?,
            anonymization_debug: env_bool("ANONYMIZATION_DEBUG", false)?,
            audit_log_dir: env_or("AUDIT_LOG_DIR", "~/.canvas-mcp/"),
            institution_name: env_or("INSTITUTION_NAME", ""),
            timezone: env_or("TIMEZONE", "UTC"),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn non_empty_env(key: &str) -> Result<String> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(CoreError::Config(format!(
            "required environment variable {key} is missing or empty"
        ))),
    }
}

fn env_bool(key: &str, default: bool) -> Result<bool> {
    match std::env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "y" | "t" => Ok(true),
            "false" | "0" | "no" | "n" | "f" => Ok(false),
            other => Err(CoreError::Config(format!(
                "environment variable {key} has unparseable boolean value: {other}"
            ))),
        },
    }
}

fn env_u64(key: &str, default: u64) -> Result<u64> {
    match std::env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => raw.trim().parse::<u64>().map_err(|_| {
            CoreError::Config(format!(
                "environment variable {key} has unparseable integer value: {raw}"
            ))
        }),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_canvas_env() {
        for key in [
            "CANVAS_API_TOKEN",
            "CANVAS_API_URL",
            "API_TIMEOUT",
            "CACHE_TTL",
            "MAX_CONCURRENT_REQUESTS",
            "LOG_LEVEL",
            "LOG_API_REQUESTS",
            "LOG_ACCESS_EVENTS",
            "LOG_EXECUTION_EVENTS",
            "ENABLE_DATA_ANONYMIZATION",
            "ANONYMIZATION_DEBUG",
            "AUDIT_LOG_DIR",
            "INSTITUTION_NAME",
            "TIMEZONE",
        ] {
            unsafe { std::env::remove_var(key) };
        }
    }

    #[test]
    fn missing_token_is_a_startup_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_canvas_env();
        unsafe { std::env::set_var("CANVAS_API_URL", "https://canvas.example.edu/api/v1") };
        let result = Config::from_env();
        assert!(result.is_err());
        clear_canvas_env();
    }

    #[test]
    fn defaults_apply_when_optional_vars_absent() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_canvas_env();
        unsafe {
            std::env::set_var("CANVAS_API_TOKEN", "secret-token");
            std::env::set_var("CANVAS_API_URL", "https://canvas.example.edu/api/v1");
        }
        let config = Config::from_env().expect("valid config");
        assert_eq!(config.cache_ttl_secs, 300);
        assert_eq!(config.audit_log_dir, "~/.canvas-mcp/");
        assert_eq!(config.timezone, "UTC");
        assert!(config.enable_data_anonymization);
        assert!(!config.log_access_events);
        assert!(!config.log_execution_events);
        clear_canvas_env();
    }

    #[test]
    fn resolved_audit_log_dir_expands_home_and_passes_through_absolute_paths() {
        let config = Config {
            canvas_api_token: "t".to_string(),
            canvas_api_url: "https://canvas.example.edu/api/v1".to_string(),
            api_timeout_secs: 30,
            cache_ttl_secs: 300,
            max_concurrent_requests: 10,
            log_level: "INFO".to_string(),
            log_api_requests: false,
            log_access_events: false,
            log_execution_events: false,
            enable_data_anonymization: true,
            anonymization_debug: false,
            audit_log_dir: "/var/log/canvas-mcp".to_string(),
            institution_name: String::new(),
            timezone: "UTC".to_string(),
        };
        assert_eq!(
            config.resolved_audit_log_dir(),
            std::path::PathBuf::from("/var/log/canvas-mcp")
        );

        let home_relative = Config {
            audit_log_dir: "~/.canvas-mcp/".to_string(),
            ..config
        };
        let resolved = home_relative.resolved_audit_log_dir();
        assert!(resolved.ends_with(".canvas-mcp"));
    }

    #[test]
    fn malformed_bool_is_a_startup_error_not_a_silent_default() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_canvas_env();
        unsafe {
            std::env::set_var("CANVAS_API_TOKEN", "secret-token");
            std::env::set_var("CANVAS_API_URL", "https://canvas.example.edu/api/v1");
            std::env::set_var("ENABLE_DATA_ANONYMIZATION", "maybe");
        }
        let result = Config::from_env();
        assert!(result.is_err());
        clear_canvas_env();
    }
}
