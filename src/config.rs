use anyhow::{Context, Result};
use clap::ArgMatches;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::env::{non_empty, process_env};
use crate::error::ConfigError;
use crate::harness::RetryPolicy;

pub const DEFAULT_RESOURCE_GROUP_NAME: &str = "rg-tests";
pub const DEFAULT_LOCATION: &str = "West Europe";
pub const DEFAULT_ENVIRONMENT: &str = "Test";

const DEFAULT_TIMEOUT_SECS: u64 = 30 * 60;
const DEFAULT_PARALLELISM: usize = 1;
const DEFAULT_DESTROY_ATTEMPTS: u32 = 6;
const DEFAULT_DESTROY_DELAY_SECS: f64 = 30.0;

/// Per-test Azure configuration. Built once at the test entry point and never
/// re-read from the environment afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestConfig {
    pub resource_group_name: String,
    pub location: String,
    pub environment: String,
    pub tags: BTreeMap<String, String>,
}

impl TestConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(process_env)
    }

    /// Builds the configuration from an arbitrary variable source. Empty
    /// values count as unset.
    pub fn from_lookup<L: Fn(&str) -> Option<String>>(lookup: L) -> Self {
        let resource_group_name = non_empty(&lookup, crate::ENV_TEST_RESOURCE_GROUP_NAME)
            .unwrap_or_else(|| DEFAULT_RESOURCE_GROUP_NAME.to_string());
        let location = non_empty(&lookup, crate::ENV_TEST_LOCATION)
            .unwrap_or_else(|| DEFAULT_LOCATION.to_string());

        Self {
            resource_group_name,
            location,
            environment: DEFAULT_ENVIRONMENT.to_string(),
            tags: default_tags(),
        }
    }

    /// Standard input variables every fixture accepts. Test specific
    /// variables are layered on top of these.
    pub fn base_vars(&self) -> Map<String, Value> {
        let mut vars = Map::new();
        vars.insert(
            "resource_group_name".to_string(),
            json!(self.resource_group_name),
        );
        vars.insert("location".to_string(), json!(self.location));
        vars.insert("tags".to_string(), json!(self.tags));
        vars
    }
}

fn default_tags() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("Environment".to_string(), DEFAULT_ENVIRONMENT.to_string()),
        ("Project".to_string(), "TerraformModules".to_string()),
        ("Test".to_string(), "true".to_string()),
        ("CreatedBy".to_string(), "Terratest".to_string()),
    ])
}

/// Default tags plus the test name and creation timestamp.
pub fn generate_test_tags(test_name: &str) -> BTreeMap<String, String> {
    let mut tags = default_tags();
    tags.insert("TestName".to_string(), test_name.to_string());
    tags.insert("CreatedAt".to_string(), chrono::Utc::now().to_rfc3339());
    tags
}

/// Harness-level knobs shared by every module test in the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessSettings {
    pub terraform_binary: String,
    pub fixtures_dir: String,
    pub timeout_secs: u64,
    pub parallelism: usize,
    pub no_color: bool,
    pub destroy_attempts: u32,
    pub destroy_delay_secs: f64,
    pub retry: RetryPolicy,
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            terraform_binary: "terraform".to_string(),
            fixtures_dir: "./tests/fixtures".to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            parallelism: DEFAULT_PARALLELISM,
            no_color: true,
            destroy_attempts: DEFAULT_DESTROY_ATTEMPTS,
            destroy_delay_secs: DEFAULT_DESTROY_DELAY_SECS,
            retry: RetryPolicy::default(),
        }
    }
}

impl HarnessSettings {
    /// Defaults with environment overrides applied, then validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Self::default();
        settings.apply_env_overrides(process_env);
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.terraform_binary.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "terraform_binary must not be empty".to_string(),
            ));
        }

        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.parallelism == 0 {
            return Err(ConfigError::Invalid(
                "parallelism must be greater than 0".to_string(),
            ));
        }

        if self.destroy_attempts == 0 {
            return Err(ConfigError::Invalid(
                "destroy_attempts must be greater than 0".to_string(),
            ));
        }

        if self.destroy_delay_secs < 0.0
            || Duration::try_from_secs_f64(self.destroy_delay_secs).is_err()
        {
            return Err(ConfigError::Invalid(format!(
                "destroy_delay_secs must be a non-negative number of seconds within range, got {}",
                self.destroy_delay_secs
            )));
        }

        self.retry.validate().map_err(ConfigError::Invalid)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Out of range values saturate; `validate` is what rejects them.
    pub fn destroy_delay(&self) -> Duration {
        crate::harness::retry_policy::saturating_secs(self.destroy_delay_secs)
    }

    /// Resolves a fixture name such as `resource_group` against the fixtures root.
    pub fn fixture(&self, name: &str) -> PathBuf {
        Path::new(&self.fixtures_dir).join(name)
    }

    /// Malformed timeout or parallelism values are ignored with a warning and
    /// the previous value is kept.
    pub fn apply_env_overrides<L: Fn(&str) -> Option<String>>(&mut self, lookup: L) {
        if let Some(binary) = non_empty(&lookup, crate::ENV_TERRAFORM_BINARY) {
            self.terraform_binary = binary;
        }

        if let Some(dir) = non_empty(&lookup, crate::ENV_TEST_FIXTURES_DIR) {
            self.fixtures_dir = dir;
        }

        if let Some(timeout_str) = non_empty(&lookup, crate::ENV_TEST_TIMEOUT) {
            match parse_go_duration(&timeout_str) {
                Some(timeout) if timeout.as_secs() > 0 => self.timeout_secs = timeout.as_secs(),
                _ => log::warn!(
                    "Ignoring {}={timeout_str:?}: not a positive duration",
                    crate::ENV_TEST_TIMEOUT
                ),
            }
        }

        if let Some(parallel_str) = non_empty(&lookup, crate::ENV_TEST_PARALLELISM) {
            match parallel_str.parse::<usize>() {
                Ok(parallel) if parallel > 0 => self.parallelism = parallel,
                _ => log::warn!(
                    "Ignoring {}={parallel_str:?}: not a positive integer",
                    crate::ENV_TEST_PARALLELISM
                ),
            }
        }
    }

    pub fn apply_cli_overrides(&mut self, matches: &ArgMatches) {
        if let Some(binary) = matches.get_one::<String>("terraform") {
            self.terraform_binary = binary.clone();
        }

        if let Some(dir) = matches.get_one::<String>("fixtures-dir") {
            self.fixtures_dir = dir.clone();
        }
    }
}

/// Load settings: CLI args > env vars > settings file > defaults
pub fn load_settings(path: Option<&str>, matches: &ArgMatches) -> Result<HarnessSettings> {
    let mut settings = HarnessSettings::default();

    if let Some(path) = path {
        if Path::new(path).exists() {
            settings = read_settings_file(path)?;
            log::info!("Loaded settings from file: {path}");
        } else {
            log::info!("Settings file not found: {path}, using defaults");
        }
    }

    settings.apply_env_overrides(process_env);
    settings.apply_cli_overrides(matches);

    settings
        .validate()
        .with_context(|| "Settings validation failed")?;

    log::debug!("Final settings: {settings:?}");
    Ok(settings)
}

pub fn read_settings_file(path: &str) -> Result<HarnessSettings, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_string(),
        source,
    })?;

    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_string(),
        source,
    })
}

/// Create a sample settings file
pub fn create_sample_config(path: &str) -> Result<()> {
    let settings = HarnessSettings::default();
    let toml_content =
        toml::to_string_pretty(&settings).context("Failed to serialize default settings")?;

    fs::write(path, toml_content)
        .with_context(|| format!("Failed to write sample settings to: {path}"))?;

    log::info!("Sample settings written to: {path}");
    Ok(())
}

/// Parses durations in the `1h30m`, `45s`, `250ms` notation used by
/// `TEST_TIMEOUT`. A bare `0` is accepted; any other unitless number is not.
/// Values too large for a [`Duration`] are rejected.
pub fn parse_go_duration(input: &str) -> Option<Duration> {
    let input = input.trim();
    if input == "0" {
        return Some(Duration::ZERO);
    }

    match humantime::parse_duration(input) {
        Ok(duration) => Some(duration),
        Err(_) => parse_fractional(input),
    }
}

/// Single fractional term such as `1.5h`, which humantime does not take.
fn parse_fractional(input: &str) -> Option<Duration> {
    let split = input.find(|c: char| !(c.is_ascii_digit() || c == '.'))?;
    let (number, unit) = input.split_at(split);
    if !number.contains('.') {
        return None;
    }

    let value: f64 = number.parse().ok()?;
    let seconds_per_unit = match unit {
        "h" => 3600.0,
        "m" => 60.0,
        "s" => 1.0,
        "ms" => 1e-3,
        "us" | "µs" => 1e-6,
        "ns" => 1e-9,
        _ => return None,
    };
    Duration::try_from_secs_f64(value * seconds_per_unit).ok()
}
