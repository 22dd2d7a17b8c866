//! Environment-variable configuration overlay: `<PREFIX>_LEVEL`,
//! `<PREFIX>_ENABLED`, `<PREFIX>_STRUCTURED`, `<PREFIX>_SANITIZE`, and
//! `<PREFIX>_CONTEXT_<KEY>`, plus the host "production" flag.
//!
//! Precedence is explicit config > environment > defaults: callers read an
//! [`EnvOverlay`] and apply only the fields their own explicit config left
//! unset.

use indexmap::IndexMap;
use vigil_types::level::LogLevel;

/// The default environment variable prefix, `VIGIL`.
pub const DEFAULT_PREFIX: &str = "VIGIL";

/// What the environment had to say about logger configuration, `prefix`-scoped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvOverlay {
    pub level: Option<LogLevel>,
    pub enabled: Option<bool>,
    pub structured: Option<bool>,
    pub sanitize: Option<bool>,
    pub context: IndexMap<String, String>,
}

/// `true`/`false`/`1`/`0`, case-insensitive; anything else is not a boolean.
fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// Reads `<prefix>_LEVEL`/`_ENABLED`/`_STRUCTURED`/`_SANITIZE`/`_CONTEXT_<KEY>`
/// out of the process environment. Unparseable values are ignored rather
/// than rejected, consistent with `log()` never raising on malformed input.
pub fn load_env_overlay(prefix: &str) -> EnvOverlay {
    let mut overlay = EnvOverlay::default();
    let context_prefix = format!("{prefix}_CONTEXT_");

    for (name, value) in std::env::vars() {
        if let Some(key) = name.strip_prefix(&context_prefix) {
            if !key.is_empty() {
                overlay.context.insert(key.to_ascii_lowercase(), value);
            }
            continue;
        }

        if name == format!("{prefix}_LEVEL") {
            overlay.level = value.parse().ok();
        } else if name == format!("{prefix}_ENABLED") {
            overlay.enabled = parse_bool(&value);
        } else if name == format!("{prefix}_STRUCTURED") {
            overlay.structured = parse_bool(&value);
        } else if name == format!("{prefix}_SANITIZE") {
            overlay.sanitize = parse_bool(&value);
        }
    }

    overlay
}

/// The host "production" flag: `<prefix>_ENV=production` (case-insensitive).
/// When set, defaults become level=warn, structured=true, ahead of any
/// further `EnvOverlay` fields applied on top.
pub fn is_production(prefix: &str) -> bool {
    std::env::var(format!("{prefix}_ENV")).map(|v| v.eq_ignore_ascii_case("production")).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variable tests mutate global process state; a mutex keeps
    // the tests in this module from racing on the same variables.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn parses_level_enabled_structured_sanitize() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("VIGILTEST_LEVEL", "warn");
        std::env::set_var("VIGILTEST_ENABLED", "FALSE");
        std::env::set_var("VIGILTEST_STRUCTURED", "1");
        std::env::set_var("VIGILTEST_SANITIZE", "0");

        let overlay = load_env_overlay("VIGILTEST");
        assert_eq!(overlay.level, Some(LogLevel::Warn));
        assert_eq!(overlay.enabled, Some(false));
        assert_eq!(overlay.structured, Some(true));
        assert_eq!(overlay.sanitize, Some(false));

        std::env::remove_var("VIGILTEST_LEVEL");
        std::env::remove_var("VIGILTEST_ENABLED");
        std::env::remove_var("VIGILTEST_STRUCTURED");
        std::env::remove_var("VIGILTEST_SANITIZE");
    }

    #[test]
    fn context_vars_are_collected_lowercased_without_prefix() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("VIGILCTXTEST_CONTEXT_TEAM", "payments");
        std::env::set_var("VIGILCTXTEST_CONTEXT_Region", "us-east");

        let overlay = load_env_overlay("VIGILCTXTEST");
        assert_eq!(overlay.context.get("team").map(String::as_str), Some("payments"));
        assert_eq!(overlay.context.get("region").map(String::as_str), Some("us-east"));

        std::env::remove_var("VIGILCTXTEST_CONTEXT_TEAM");
        std::env::remove_var("VIGILCTXTEST_CONTEXT_Region");
    }

    #[test]
    fn unparseable_values_are_ignored_not_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("VIGILBADTEST_LEVEL", "not-a-level");
        std::env::set_var("VIGILBADTEST_ENABLED", "maybe");

        let overlay = load_env_overlay("VIGILBADTEST");
        assert_eq!(overlay.level, None);
        assert_eq!(overlay.enabled, None);

        std::env::remove_var("VIGILBADTEST_LEVEL");
        std::env::remove_var("VIGILBADTEST_ENABLED");
    }

    #[test]
    fn production_flag_is_case_insensitive() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("VIGILPRODTEST_ENV", "PRODUCTION");
        assert!(is_production("VIGILPRODTEST"));
        std::env::remove_var("VIGILPRODTEST_ENV");
        assert!(!is_production("VIGILPRODTEST"));
    }
}
