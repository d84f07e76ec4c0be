//! Preconditions deciding whether a live test runs at all.
//!
//! The standard test runner has no short mode, so it is requested through
//! `TEST_SHORT`. A skipped test returns early without asserting anything; it
//! is reported as neither a pass nor a failure by the gate itself.

use crate::env::{non_empty, process_env};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    Run,
    Skip(String),
}

impl Gate {
    pub fn should_skip(&self) -> bool {
        matches!(self, Gate::Skip(_))
    }
}

pub fn skip_if_short() -> Gate {
    skip_if_short_with(process_env)
}

pub fn skip_if_not_ci() -> Gate {
    skip_if_not_ci_with(process_env)
}

pub fn skip_if_short_with<L: Fn(&str) -> Option<String>>(lookup: L) -> Gate {
    match non_empty(&lookup, crate::ENV_TEST_SHORT) {
        Some(value) if is_truthy(&value) => {
            log::info!("Skipping test - running in short mode");
            Gate::Skip("Skipping test - running in short mode".to_string())
        }
        _ => Gate::Run,
    }
}

/// Any non-empty `CI` value counts as running in CI.
pub fn skip_if_not_ci_with<L: Fn(&str) -> Option<String>>(lookup: L) -> Gate {
    if non_empty(&lookup, crate::ENV_CI).is_some() {
        Gate::Run
    } else {
        log::info!("Skipping test - not running in CI environment");
        Gate::Skip("Skipping test - not running in CI environment".to_string())
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
