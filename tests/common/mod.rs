#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use azure_tf_harness::config::HarnessSettings;
use azure_tf_harness::error::EngineError;
use azure_tf_harness::harness::Harness;
use azure_tf_harness::terraform::{TerraformEngine, TerraformOptions};

pub const THROTTLED: &str = "Error: retrieving Resource Group: StatusCode=429";

/// In-memory engine that replays scripted failures, then succeeds. Clones
/// share their script and counters.
#[derive(Clone, Default)]
pub struct ScriptedEngine {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    apply_failures: Mutex<VecDeque<String>>,
    destroy_failures: Mutex<VecDeque<String>>,
    output_failure: Mutex<Option<String>>,
    outputs: Mutex<String>,
    apply_delay: Mutex<Option<Duration>>,
    apply_calls: AtomicUsize,
    applies_completed: AtomicUsize,
    destroy_calls: AtomicUsize,
    output_calls: AtomicUsize,
    applied_vars: Mutex<Option<Map<String, Value>>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Output document returned by `output_all`, in `terraform output -json` form.
    pub fn with_outputs(self, outputs: Value) -> Self {
        let document = Map::from_iter(
            outputs
                .as_object()
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|(name, value)| (name, serde_json::json!({ "value": value }))),
        );
        *self.inner.outputs.lock().unwrap() = Value::Object(document).to_string();
        self
    }

    pub fn failing_apply(self, times: usize, stderr: &str) -> Self {
        self.inner
            .apply_failures
            .lock()
            .unwrap()
            .extend(std::iter::repeat(stderr.to_string()).take(times));
        self
    }

    pub fn failing_destroy(self, times: usize, stderr: &str) -> Self {
        self.inner
            .destroy_failures
            .lock()
            .unwrap()
            .extend(std::iter::repeat(stderr.to_string()).take(times));
        self
    }

    /// Each apply sleeps for `delay` on the tokio clock before finishing.
    pub fn slow_apply(self, delay: Duration) -> Self {
        *self.inner.apply_delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn failing_outputs(self, stderr: &str) -> Self {
        *self.inner.output_failure.lock().unwrap() = Some(stderr.to_string());
        self
    }

    pub fn apply_calls(&self) -> usize {
        self.inner.apply_calls.load(Ordering::SeqCst)
    }

    /// Applies that ran to the end rather than being dropped mid-flight.
    pub fn applies_completed(&self) -> usize {
        self.inner.applies_completed.load(Ordering::SeqCst)
    }

    pub fn destroy_calls(&self) -> usize {
        self.inner.destroy_calls.load(Ordering::SeqCst)
    }

    pub fn output_calls(&self) -> usize {
        self.inner.output_calls.load(Ordering::SeqCst)
    }

    pub fn applied_vars(&self) -> Option<Map<String, Value>> {
        self.inner.applied_vars.lock().unwrap().clone()
    }

    pub fn harness(&self) -> Harness {
        self.harness_with(settings())
    }

    pub fn harness_with(&self, settings: HarnessSettings) -> Harness {
        Harness::new(Arc::new(self.clone()), settings)
    }
}

fn scripted(
    command: &str,
    failures: &Mutex<VecDeque<String>>,
) -> Result<String, EngineError> {
    match failures.lock().unwrap().pop_front() {
        Some(stderr) => Err(EngineError::Failed {
            command: command.to_string(),
            code: Some(1),
            stderr,
        }),
        None => Ok(String::new()),
    }
}

#[async_trait]
impl TerraformEngine for ScriptedEngine {
    async fn init_and_apply(&self, options: &TerraformOptions) -> Result<String, EngineError> {
        self.inner.apply_calls.fetch_add(1, Ordering::SeqCst);
        *self.inner.applied_vars.lock().unwrap() = Some(options.vars.clone());

        let delay = *self.inner.apply_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.applies_completed.fetch_add(1, Ordering::SeqCst);
        scripted("apply", &self.inner.apply_failures)
    }

    async fn destroy(&self, _options: &TerraformOptions) -> Result<String, EngineError> {
        self.inner.destroy_calls.fetch_add(1, Ordering::SeqCst);
        scripted("destroy", &self.inner.destroy_failures)
    }

    async fn output_all(&self, _options: &TerraformOptions) -> Result<String, EngineError> {
        self.inner.output_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(stderr) = self.inner.output_failure.lock().unwrap().clone() {
            return Err(EngineError::Failed {
                command: "output".to_string(),
                code: Some(1),
                stderr,
            });
        }
        Ok(self.inner.outputs.lock().unwrap().clone())
    }
}

pub fn settings() -> HarnessSettings {
    HarnessSettings {
        fixtures_dir: "tests/fixtures".to_string(),
        ..Default::default()
    }
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
