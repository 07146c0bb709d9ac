//! Runtime secret resolution.
//!
//! # Contract
//! - Config YAML stores only **env var NAMES** (e.g., `"VIGIL_BROKER_LOGIN"`),
//!   never literal secret values.
//! - Callers invoke [`resolve_secrets_for_mode`] once at startup.
//! - The returned [`ResolvedSecrets`] is passed into constructors; never scatter
//!   `std::env::var` calls across the codebase.
//! - `Debug` on [`ResolvedSecrets`] redacts every field.
//! - Error messages reference the env var NAME, never the value.
//!
//! # Mode-aware enforcement
//! - `live` and `paper`: broker login + password are required.
//! - `dry_run`: no secrets required.

use anyhow::{bail, Result};
use serde_json::Value;

/// All runtime-resolved secrets for one engine instantiation.
/// Values are redacted in `Debug` output.
#[derive(Clone)]
pub struct ResolvedSecrets {
    pub broker_login: Option<String>,
    pub broker_password: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field(
                "broker_login",
                &self.broker_login.as_ref().map(|_| "<REDACTED>"),
            )
            .field(
                "broker_password",
                &self.broker_password.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

struct SecretEnvNames {
    broker_login_var: String,
    broker_password_var: String,
}

fn read_str_at(config: &Value, pointer: &str) -> Option<String> {
    let s = config.pointer(pointer)?.as_str()?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Returns `None` if the variable is unset or its value is blank. Never
/// returns the value on an error path; callers report the NAME only.
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

fn parse_env_names(config_json: &Value) -> SecretEnvNames {
    SecretEnvNames {
        broker_login_var: read_str_at(config_json, "/broker/login_env")
            .unwrap_or_else(|| "VIGIL_BROKER_LOGIN".to_string()),
        broker_password_var: read_str_at(config_json, "/broker/password_env")
            .unwrap_or_else(|| "VIGIL_BROKER_PASSWORD".to_string()),
    }
}

/// Mask an account identifier for logging, keeping only the last four
/// characters (e.g., last four digits only).
pub fn mask_account_identifier(id: &str) -> String {
    let chars: Vec<char> = id.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), tail)
}

/// Resolve all secrets from the environment for the given `mode` string.
/// `mode` is case-insensitive: `"live"`, `"paper"`, or `"dry_run"`.
///
/// # Errors
/// Returns `Err` naming the env var of the first missing required variable
/// when `mode` is `live` or `paper`. The actual value is never mentioned.
pub fn resolve_secrets_for_mode(config_json: &Value, mode: &str) -> Result<ResolvedSecrets> {
    let names = parse_env_names(config_json);
    let mode_lower = mode.trim().to_ascii_lowercase();

    let broker_login = resolve_env(&names.broker_login_var);
    let broker_password = resolve_env(&names.broker_password_var);

    match mode_lower.as_str() {
        "live" | "paper" => {
            if broker_login.is_none() {
                bail!(
                    "secrets missing for mode={mode_lower}: required env var '{}' (broker login) is not set or empty",
                    names.broker_login_var,
                );
            }
            if broker_password.is_none() {
                bail!(
                    "secrets missing for mode={mode_lower}: required env var '{}' (broker password) is not set or empty",
                    names.broker_password_var,
                );
            }
        }
        "dry_run" => {}
        other => {
            bail!("unrecognised mode '{other}'; expected one of: live | paper | dry_run",);
        }
    }

    Ok(ResolvedSecrets {
        broker_login,
        broker_password,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dry_run_requires_nothing() {
        let cfg: Value = serde_json::json!({});
        let secrets = resolve_secrets_for_mode(&cfg, "dry_run").unwrap();
        assert!(secrets.broker_login.is_none());
    }

    #[test]
    fn live_without_env_fails_naming_the_var() {
        std::env::remove_var("VIGIL_BROKER_LOGIN");
        let cfg: Value = serde_json::json!({});
        let err = resolve_secrets_for_mode(&cfg, "live").unwrap_err();
        assert!(err.to_string().contains("VIGIL_BROKER_LOGIN"));
    }

    #[test]
    fn mask_account_identifier_keeps_last_four() {
        assert_eq!(mask_account_identifier("1234567890"), "******7890");
        assert_eq!(mask_account_identifier("12"), "**");
    }
}
