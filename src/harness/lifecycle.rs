use log::{debug, error, info, warn};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AssertionError, OutputError, Phase};
use crate::harness::retry_policy::{retry_phase, RetryClassifier, RetryPolicy};
use crate::harness::stats::HarnessStats;
use crate::outputs::{validate_outputs, Outputs};
use crate::terraform::{TerraformEngine, TerraformOptions};

/// Where a single module test is in its provisioning lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    NotStarted,
    Validated,
    Applied,
    Asserted,
    Destroying,
    Destroyed,
    DestroyFailed,
}

impl LifecyclePhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, LifecyclePhase::Destroyed | LifecyclePhase::DestroyFailed)
    }
}

/// Result of tearing a module down. A failure here is recorded, never raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestroyOutcome {
    Destroyed { attempts: u32 },
    Failed { attempts: u32, error: String },
}

impl DestroyOutcome {
    pub fn is_destroyed(&self) -> bool {
        matches!(self, DestroyOutcome::Destroyed { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            DestroyOutcome::Destroyed { attempts } | DestroyOutcome::Failed { attempts, .. } => {
                *attempts
            }
        }
    }

    fn phase(&self) -> LifecyclePhase {
        if self.is_destroyed() {
            LifecyclePhase::Destroyed
        } else {
            LifecyclePhase::DestroyFailed
        }
    }
}

/// Everything needed to destroy a module, detachable from the guard so it can
/// run on another thread.
#[derive(Clone)]
pub(crate) struct Teardown {
    pub(crate) run_id: Uuid,
    pub(crate) engine: Arc<dyn TerraformEngine>,
    pub(crate) options: TerraformOptions,
    pub(crate) policy: RetryPolicy,
    pub(crate) classifier: Arc<dyn RetryClassifier>,
    pub(crate) stats: Arc<HarnessStats>,
}

impl Teardown {
    pub(crate) async fn run(self) -> DestroyOutcome {
        let Teardown {
            run_id,
            engine,
            options,
            policy,
            classifier,
            stats,
        } = self;

        info!(
            "[{run_id}] Destroying {} (up to {} attempt(s))",
            options.terraform_dir.display(),
            policy.max_attempts()
        );

        let result = retry_phase(
            Phase::Destroy,
            &policy,
            classifier.as_ref(),
            |_, _| {},
            |_| {
                stats.record_destroy_attempt();
                let engine = engine.clone();
                let options = options.clone();
                async move { engine.destroy(&options).await }
            },
        )
        .await;

        match result {
            Ok((_, attempts)) => {
                stats.record_destroy_succeeded();
                info!(
                    "[{run_id}] Destroyed {} after {attempts} attempt(s)",
                    options.terraform_dir.display()
                );
                DestroyOutcome::Destroyed { attempts }
            }
            Err(err) => {
                stats.record_destroy_failure();
                let attempts = match &err {
                    crate::error::ProvisionError::Exhausted { attempts, .. } => *attempts,
                    _ => policy.max_attempts(),
                };
                error!(
                    "[{run_id}] terraform destroy failed after retries for {}: {err}",
                    options.terraform_dir.display()
                );
                DestroyOutcome::Failed {
                    attempts,
                    error: err.to_string(),
                }
            }
        }
    }

    /// Runs the teardown to completion from synchronous code, on a helper
    /// thread with its own runtime so it works inside or outside tokio.
    fn run_blocking(self) -> DestroyOutcome {
        let run_id = self.run_id;
        let stats = self.stats.clone();
        let handle = std::thread::Builder::new()
            .name(format!("teardown-{run_id}"))
            .spawn(move || {
                match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime.block_on(self.run()),
                    Err(e) => DestroyOutcome::Failed {
                        attempts: 0,
                        error: format!("failed to start teardown runtime: {e}"),
                    },
                }
            });

        let outcome = match handle {
            Ok(handle) => handle.join().unwrap_or_else(|_| DestroyOutcome::Failed {
                attempts: 0,
                error: "teardown thread panicked".to_string(),
            }),
            Err(e) => DestroyOutcome::Failed {
                attempts: 0,
                error: format!("failed to spawn teardown thread: {e}"),
            },
        };

        if outcome.attempts() == 0 {
            // The retry loop never ran, so nothing has counted this failure yet
            stats.record_destroy_failure();
            error!("[{run_id}] Teardown could not run: {outcome:?}");
        }
        outcome
    }
}

/// Guard for an applied module. Destroy runs exactly once: explicitly through
/// [`ProvisionedModule::destroy`], or from `Drop` on any other exit path,
/// including panics unwinding through the test body.
pub struct ProvisionedModule {
    teardown: Teardown,
    outputs: Outputs,
    phase: LifecyclePhase,
}

impl ProvisionedModule {
    pub(crate) fn new(teardown: Teardown) -> Self {
        Self {
            teardown,
            outputs: Outputs::default(),
            phase: LifecyclePhase::Applied,
        }
    }

    pub(crate) fn set_outputs(&mut self, outputs: Outputs) {
        self.outputs = outputs;
    }

    pub fn run_id(&self) -> Uuid {
        self.teardown.run_id
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    pub fn options(&self) -> &TerraformOptions {
        &self.teardown.options
    }

    pub fn outputs(&self) -> &Outputs {
        &self.outputs
    }

    pub fn output(&self, name: &str) -> Result<String, OutputError> {
        self.outputs.output(name)
    }

    pub fn output_list(&self, name: &str) -> Result<Vec<String>, OutputError> {
        self.outputs.output_list(name)
    }

    pub fn output_json(&self, name: &str) -> Result<String, OutputError> {
        self.outputs.output_json(name)
    }

    /// Validates outputs and moves to `Asserted` when every expectation holds.
    pub fn validate_outputs(
        &mut self,
        expected: &[(&str, Option<&str>)],
    ) -> Result<(), AssertionError> {
        validate_outputs(&self.outputs, expected)?;
        self.mark_asserted();
        Ok(())
    }

    pub fn mark_asserted(&mut self) {
        if self.phase == LifecyclePhase::Applied {
            self.transition(LifecyclePhase::Asserted);
        }
    }

    /// Tears the module down according to its teardown policy.
    pub async fn destroy(mut self) -> DestroyOutcome {
        self.transition(LifecyclePhase::Destroying);
        let outcome = self.teardown.clone().run().await;
        self.transition(outcome.phase());
        outcome
    }

    fn transition(&mut self, next: LifecyclePhase) {
        debug!(
            "[{}] Lifecycle {:?} -> {next:?}",
            self.teardown.run_id, self.phase
        );
        self.phase = next;
    }
}

impl fmt::Debug for ProvisionedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisionedModule")
            .field("run_id", &self.teardown.run_id)
            .field("terraform_dir", &self.teardown.options.terraform_dir)
            .field("phase", &self.phase)
            .field("outputs", &self.outputs.names().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Drop for ProvisionedModule {
    fn drop(&mut self) {
        if self.phase.is_terminal() {
            return;
        }

        if std::thread::panicking() {
            warn!(
                "[{}] Test body panicked, destroying {} before unwinding further",
                self.teardown.run_id,
                self.teardown.options.terraform_dir.display()
            );
        } else {
            info!(
                "[{}] Module dropped without explicit destroy, tearing it down",
                self.teardown.run_id
            );
        }

        self.transition(LifecyclePhase::Destroying);
        let outcome = self.teardown.clone().run_blocking();
        self.transition(outcome.phase());
    }
}
