//! Credential checks that must pass before anything is provisioned.
//!
//! Environment access goes through a lookup function so callers can validate
//! a captured or synthetic environment without touching process state.

use crate::error::ConfigError;

/// Credentials the azurerm provider authenticates with, in reporting order.
pub const REQUIRED_ENV_VARS: [&str; 4] = [
    crate::ENV_ARM_CLIENT_ID,
    crate::ENV_ARM_CLIENT_SECRET,
    crate::ENV_ARM_SUBSCRIPTION_ID,
    crate::ENV_ARM_TENANT_ID,
];

/// Reads a variable from the process environment. Unset, empty and
/// non-UTF-8 values all read as `None`.
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

pub(crate) fn non_empty<L: Fn(&str) -> Option<String>>(lookup: &L, name: &str) -> Option<String> {
    lookup(name).filter(|value| !value.is_empty())
}

pub fn validate_required_env_vars() -> Result<(), ConfigError> {
    validate_required_env_vars_with(process_env)
}

/// Fails with every missing credential named, not just the first.
pub fn validate_required_env_vars_with<L: Fn(&str) -> Option<String>>(
    lookup: L,
) -> Result<(), ConfigError> {
    let missing: Vec<String> = REQUIRED_ENV_VARS
        .iter()
        .filter(|name| non_empty(&lookup, name).is_none())
        .map(|name| name.to_string())
        .collect();

    if missing.is_empty() {
        log::debug!("All required credential variables are set");
        Ok(())
    } else {
        log::warn!("Missing credential variables: {}", missing.join(", "));
        Err(ConfigError::MissingEnvVars(missing))
    }
}
