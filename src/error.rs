use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Failures detected before any resource is provisioned.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{}", missing_vars_message(.0))]
    MissingEnvVars(Vec<String>),

    #[error("invalid value {value:?} for {name}: {reason}")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },

    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid settings: {0}")]
    Invalid(String),
}

fn missing_vars_message(names: &[String]) -> String {
    match names {
        [single] => format!("required environment variable {single} is not set"),
        _ => format!(
            "required environment variables {} are not set",
            names.join(", ")
        ),
    }
}

/// Failure of a single invocation of the infrastructure engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to run terraform {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("terraform {command} exited with code {code:?}: {stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("failed to write variables file: {0}")]
    VarFile(#[source] std::io::Error),

    #[error("failed to serialize variables: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Lifecycle phase a provisioning error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Apply,
    Destroy,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Apply => f.write_str("apply"),
            Phase::Destroy => f.write_str("destroy"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("{phase} failed after {attempts} attempt(s): {source}")]
    Exhausted {
        phase: Phase,
        attempts: u32,
        #[source]
        source: EngineError,
    },

    #[error("{phase} did not finish within {timeout:?}")]
    Timeout { phase: Phase, timeout: Duration },

    /// `terraform output` itself failed after a successful apply.
    #[error("reading module outputs failed: {0}")]
    OutputRead(#[source] EngineError),

    #[error("unusable module outputs: {0}")]
    Outputs(#[from] OutputError),

    #[error("lifecycle body was cancelled: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("output {0:?} is not defined by the module")]
    Undefined(String),

    #[error("output {name:?} is not {expected}")]
    WrongShape { name: String, expected: &'static str },

    #[error("unparseable output document: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// One output that did not meet its expectation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputMismatch {
    pub name: String,
    /// `None` means "any non-empty value".
    pub expected: Option<String>,
    /// `None` means the output was not defined at all.
    pub actual: Option<String>,
}

impl fmt::Display for OutputMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let actual = self.actual.as_deref().unwrap_or("<undefined>");
        match &self.expected {
            Some(expected) => write!(
                f,
                "output {} should equal {expected:?}, but got {actual:?}",
                self.name
            ),
            None => write!(
                f,
                "output {} should not be empty, but got {actual:?}",
                self.name
            ),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{} output assertion(s) failed:\n{}", .failures.len(), render_failures(.failures))]
pub struct AssertionError {
    pub failures: Vec<OutputMismatch>,
}

impl AssertionError {
    pub fn names(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.name.as_str()).collect()
    }
}

fn render_failures(failures: &[OutputMismatch]) -> String {
    failures
        .iter()
        .map(|f| format!("  - {f}"))
        .collect::<Vec<_>>()
        .join("\n")
}
