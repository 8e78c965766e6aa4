//! Runtime secret resolution.
//!
//! # Contract
//! - Config YAML stores only **env var NAMES** (e.g. `"CRED_PUSH_API_KEY"`).
//! - Callers invoke [`resolve_secrets_for_scope`] once per pass and pass the
//!   result into client constructors; `std::env::var` is not read elsewhere.
//! - `Debug` output redacts values.
//! - Error messages reference the env var **NAME**, never the value.
//!
//! # Scope-aware enforcement
//! - `PUSH`: push api_key is **required**.
//! - `PULL`: pull client_id + client_secret are **required**.

use anyhow::{bail, Result};

use crate::settings::SyncSettings;
use crate::ConfigScope;

/// All secrets a pass needs, resolved from the environment.
/// **Values are redacted in `Debug` output.**
#[derive(Clone, Default)]
pub struct ResolvedSecrets {
    pub push_api_key: Option<String>,
    pub pull_client_id: Option<String>,
    pub pull_client_secret: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field(
                "push_api_key",
                &self.push_api_key.as_ref().map(|_| "<REDACTED>"),
            )
            .field(
                "pull_client_id",
                &self.pull_client_id.as_ref().map(|_| "<REDACTED>"),
            )
            .field(
                "pull_client_secret",
                &self.pull_client_secret.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

/// Resolve a named environment variable.
/// Returns `None` if the variable is unset or its value is blank.
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

fn require(var_name: &str, scope: ConfigScope, what: &str) -> Result<String> {
    match resolve_env(var_name) {
        Some(v) => Ok(v),
        None => bail!(
            "SECRETS_MISSING scope={}: required env var '{}' ({}) is not set or empty",
            scope.as_str(),
            var_name,
            what,
        ),
    }
}

/// Resolve the secrets required for `scope`.
///
/// # Errors
/// Returns `Err` naming the first missing required env var, or when the
/// scope's config section is absent.
pub fn resolve_secrets_for_scope(
    settings: &SyncSettings,
    scope: ConfigScope,
) -> Result<ResolvedSecrets> {
    match scope {
        ConfigScope::Push => {
            let push = settings.push()?;
            let api_key = require(&push.keys_env.api_key, scope, "push api_key")?;
            Ok(ResolvedSecrets {
                push_api_key: Some(api_key),
                ..ResolvedSecrets::default()
            })
        }
        ConfigScope::Pull => {
            let pull = settings.pull()?;
            let client_id = require(&pull.keys_env.client_id, scope, "pull client_id")?;
            let client_secret =
                require(&pull.keys_env.client_secret, scope, "pull client_secret")?;
            Ok(ResolvedSecrets {
                pull_client_id: Some(client_id),
                pull_client_secret: Some(client_secret),
                ..ResolvedSecrets::default()
            })
        }
    }
}
