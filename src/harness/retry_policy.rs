use log::{info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{EngineError, Phase, ProvisionError};

/// Bounded retry loop settings. `max_retries` counts retries after the first
/// attempt, so a phase runs at most `max_retries + 1` times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_delay_secs")]
    pub delay_secs: f64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_delay_secs() -> f64 {
    30.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            delay_secs: default_delay_secs(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            delay_secs: delay.as_secs_f64(),
        }
    }

    /// A single attempt.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn delay(&self) -> Duration {
        saturating_secs(self.delay_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.delay_secs < 0.0 || Duration::try_from_secs_f64(self.delay_secs).is_err() {
            return Err(format!(
                "retry delay must be a non-negative number of seconds within range, got {}",
                self.delay_secs
            ));
        }
        Ok(())
    }
}

/// Seconds as a [`Duration`], clamped to `ZERO..=MAX`. NaN maps to zero.
pub(crate) fn saturating_secs(secs: f64) -> Duration {
    match Duration::try_from_secs_f64(secs) {
        Ok(duration) => duration,
        Err(_) if secs > 0.0 => Duration::MAX,
        Err(_) => Duration::ZERO,
    }
}

/// Decides whether a failed engine call is transient.
pub trait RetryClassifier: Send + Sync {
    fn is_retryable(&self, error: &EngineError) -> bool;
}

impl<F> RetryClassifier for F
where
    F: Fn(&EngineError) -> bool + Send + Sync,
{
    fn is_retryable(&self, error: &EngineError) -> bool {
        self(error)
    }
}

/// Treats every failure as transient, the equivalent of a `.*` pattern.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyError;

impl RetryClassifier for AnyError {
    fn is_retryable(&self, _error: &EngineError) -> bool {
        true
    }
}

/// Never retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryClassifier for NoRetry {
    fn is_retryable(&self, _error: &EngineError) -> bool {
        false
    }
}

/// Matches the error text against regular expressions, each paired with a
/// description that is logged when it matches.
#[derive(Debug, Clone)]
pub struct PatternClassifier {
    patterns: Vec<(Regex, String)>,
}

impl PatternClassifier {
    pub fn new<I, P, D>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = (P, D)>,
        P: AsRef<str>,
        D: Into<String>,
    {
        let patterns = patterns
            .into_iter()
            .map(|(pattern, description)| Ok((Regex::new(pattern.as_ref())?, description.into())))
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { patterns })
    }

    /// Description of the first pattern matching `text`.
    pub fn matching(&self, text: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|(regex, _)| regex.is_match(text))
            .map(|(_, description)| description.as_str())
    }
}

impl RetryClassifier for PatternClassifier {
    fn is_retryable(&self, error: &EngineError) -> bool {
        match self.matching(&error.to_string()) {
            Some(description) => {
                info!("Error matched retryable pattern: {description}");
                true
            }
            None => false,
        }
    }
}

/// How a provisioned module is torn down.
#[derive(Debug, Clone, PartialEq)]
pub enum TeardownPolicy {
    /// One destroy attempt whose outcome is only logged.
    BestEffort,
    /// Same retry policy and classifier as the apply phase.
    FromRequest,
    /// Up to `attempts` destroy calls separated by `delay`, retrying any failure.
    Retry { attempts: u32, delay: Duration },
}

impl Default for TeardownPolicy {
    fn default() -> Self {
        TeardownPolicy::FromRequest
    }
}

impl TeardownPolicy {
    pub(crate) fn resolve(
        &self,
        apply_policy: &RetryPolicy,
        apply_classifier: &Arc<dyn RetryClassifier>,
    ) -> (RetryPolicy, Arc<dyn RetryClassifier>) {
        match self {
            TeardownPolicy::BestEffort => (RetryPolicy::none(), Arc::new(NoRetry)),
            TeardownPolicy::FromRequest => (apply_policy.clone(), apply_classifier.clone()),
            TeardownPolicy::Retry { attempts, delay } => (
                RetryPolicy::new(attempts.saturating_sub(1), *delay),
                Arc::new(AnyError),
            ),
        }
    }
}

/// Runs `op` until it succeeds, the classifier rejects the error, or the
/// policy's attempts are spent. `on_retry` fires before each delay.
pub async fn retry_phase<T, F, Fut>(
    phase: Phase,
    policy: &RetryPolicy,
    classifier: &dyn RetryClassifier,
    mut on_retry: impl FnMut(u32, &EngineError),
    mut op: F,
) -> Result<(T, u32), ProvisionError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    info!("terraform {phase} succeeded on attempt {attempt}/{max_attempts}");
                }
                return Ok((value, attempt));
            }
            Err(error) => {
                if attempt >= max_attempts {
                    warn!("terraform {phase} attempt {attempt} failed, no attempts left: {error}");
                    return Err(ProvisionError::Exhausted {
                        phase,
                        attempts: attempt,
                        source: error,
                    });
                }

                if !classifier.is_retryable(&error) {
                    warn!("terraform {phase} attempt {attempt} failed with a non-retryable error: {error}");
                    return Err(ProvisionError::Exhausted {
                        phase,
                        attempts: attempt,
                        source: error,
                    });
                }

                let delay = policy.delay();
                warn!(
                    "terraform {phase} attempt {attempt}/{max_attempts} failed: {error}; retrying in {delay:?}"
                );
                on_retry(attempt, &error);
                tokio::time::sleep(delay).await;
            }
        }
    }
}
