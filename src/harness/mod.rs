pub mod lifecycle;
pub mod retry_policy;
pub mod stats;

pub use lifecycle::{DestroyOutcome, LifecyclePhase, ProvisionedModule};
pub use retry_policy::{
    retry_phase, AnyError, NoRetry, PatternClassifier, RetryClassifier, RetryPolicy,
    TeardownPolicy,
};
pub use stats::{HarnessStats, StatsSnapshot};

use log::{debug, info, warn};
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

use crate::config::HarnessSettings;
use crate::error::{Phase, ProvisionError};
use crate::outputs::Outputs;
use crate::terraform::{BackendConfig, TerraformCli, TerraformEngine, TerraformOptions};
use self::lifecycle::Teardown;

/// One module under test: where it lives, what it is fed, and how its
/// apply and destroy phases retry.
#[derive(Clone)]
pub struct ProvisioningRequest {
    pub module_directory: PathBuf,
    pub input_variables: Map<String, Value>,
    pub retry: RetryPolicy,
    pub retryable: Arc<dyn RetryClassifier>,
    pub no_color: bool,
    pub backend: Option<BackendConfig>,
    pub teardown: TeardownPolicy,
}

impl fmt::Debug for ProvisioningRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisioningRequest")
            .field("module_directory", &self.module_directory)
            .field("input_variables", &self.input_variables)
            .field("retry", &self.retry)
            .field("no_color", &self.no_color)
            .field("backend", &self.backend)
            .field("teardown", &self.teardown)
            .finish_non_exhaustive()
    }
}

impl ProvisioningRequest {
    /// A request with no variables, the default retry policy and no
    /// retryable errors, so a failed apply is final until a classifier is set.
    pub fn new(module_directory: impl Into<PathBuf>) -> Self {
        Self {
            module_directory: module_directory.into(),
            input_variables: Map::new(),
            retry: RetryPolicy::default(),
            retryable: Arc::new(NoRetry),
            no_color: true,
            backend: None,
            teardown: TeardownPolicy::default(),
        }
    }

    /// Merges `vars` into the input variables; later keys win.
    pub fn vars(mut self, vars: Map<String, Value>) -> Self {
        self.input_variables.extend(vars);
        self
    }

    pub fn var(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.input_variables.insert(name.into(), value.into());
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn retry_on_any_error(self) -> Self {
        self.classifier(Arc::new(AnyError))
    }

    /// Retries errors whose text matches one of `patterns`, given as
    /// `(regex, description)` pairs.
    pub fn retryable_errors<I, P, D>(self, patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = (P, D)>,
        P: AsRef<str>,
        D: Into<String>,
    {
        let classifier = PatternClassifier::new(patterns)?;
        Ok(self.classifier(Arc::new(classifier)))
    }

    pub fn classifier(mut self, classifier: Arc<dyn RetryClassifier>) -> Self {
        self.retryable = classifier;
        self
    }

    pub fn teardown(mut self, teardown: TeardownPolicy) -> Self {
        self.teardown = teardown;
        self
    }

    pub fn backend(mut self, backend: BackendConfig) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn no_color(mut self, no_color: bool) -> Self {
        self.no_color = no_color;
        self
    }

    pub fn options(&self) -> TerraformOptions {
        TerraformOptions {
            terraform_dir: self.module_directory.clone(),
            vars: self.input_variables.clone(),
            no_color: self.no_color,
            backend_config: self.backend.clone(),
        }
    }
}

/// What a completed lifecycle produced: the assertion body's result and how
/// teardown went.
#[derive(Debug)]
pub struct LifecycleReport<T, E> {
    pub value: Result<T, E>,
    /// Whether the module reached `Asserted`, i.e. the body returned `Ok`.
    pub asserted: bool,
    pub destroy: DestroyOutcome,
}

/// Drives modules through apply, assertions and destroy against one engine.
#[derive(Clone)]
pub struct Harness {
    engine: Arc<dyn TerraformEngine>,
    settings: HarnessSettings,
    stats: Arc<HarnessStats>,
}

impl Harness {
    pub fn new(engine: Arc<dyn TerraformEngine>, settings: HarnessSettings) -> Self {
        Self {
            engine,
            settings,
            stats: Arc::new(HarnessStats::default()),
        }
    }

    /// Harness backed by the terraform binary named in `settings`.
    pub fn cli(settings: HarnessSettings) -> Self {
        let engine = TerraformCli::new(settings.terraform_binary.clone());
        Self::new(Arc::new(engine), settings)
    }

    pub fn settings(&self) -> &HarnessSettings {
        &self.settings
    }

    pub fn engine(&self) -> &Arc<dyn TerraformEngine> {
        &self.engine
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Request for a fixture under the configured fixtures root, carrying the
    /// configured retry policy and color setting.
    pub fn request(&self, fixture: &str) -> ProvisioningRequest {
        ProvisioningRequest::new(self.settings.fixture(fixture))
            .retry(self.settings.retry.clone())
            .no_color(self.settings.no_color)
    }

    /// Teardown retrying any failure with the configured destroy attempts and
    /// delay, for resources known to delete slowly.
    pub fn retrying_teardown(&self) -> TeardownPolicy {
        TeardownPolicy::Retry {
            attempts: self.settings.destroy_attempts,
            delay: self.settings.destroy_delay(),
        }
    }

    /// Runs init and apply under the request's retry policy, then reads the
    /// module outputs.
    ///
    /// Nothing is destroyed when apply fails. Once apply succeeds the returned
    /// guard owns teardown, and a failure to read outputs destroys the module
    /// before the error is returned.
    pub async fn apply(
        &self,
        request: ProvisioningRequest,
    ) -> Result<ProvisionedModule, ProvisionError> {
        let run_id = Uuid::new_v4();
        let options = request.options();
        debug!(
            "[{run_id}] Lifecycle {:?} -> {:?}",
            LifecyclePhase::NotStarted,
            LifecyclePhase::Validated
        );
        info!(
            "[{run_id}] Applying {} (up to {} attempt(s))",
            options.terraform_dir.display(),
            request.retry.max_attempts()
        );
        self.stats.record_apply_started();

        let timeout = self.settings.timeout();
        let engine = self.engine.clone();
        let stats = self.stats.clone();
        let apply = retry_phase(
            Phase::Apply,
            &request.retry,
            request.retryable.as_ref(),
            |_, _| stats.record_apply_retry(),
            |_| {
                let engine = engine.clone();
                let options = options.clone();
                async move { engine.init_and_apply(&options).await }
            },
        );

        // Dropping the apply future on timeout kills the running terraform process
        let (_, attempts) = match tokio::time::timeout(timeout, apply).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    "[{run_id}] Apply of {} timed out after {timeout:?} and was stopped; partial \
                     resources may remain, clean up with `azure-tf-harness destroy --dir {}`",
                    options.terraform_dir.display(),
                    options.terraform_dir.display()
                );
                return Err(ProvisionError::Timeout {
                    phase: Phase::Apply,
                    timeout,
                });
            }
        };

        self.stats.record_apply_succeeded();
        info!(
            "[{run_id}] Applied {} after {attempts} attempt(s)",
            options.terraform_dir.display()
        );

        let (destroy_policy, destroy_classifier) =
            request.teardown.resolve(&request.retry, &request.retryable);
        let mut module = ProvisionedModule::new(Teardown {
            run_id,
            engine: self.engine.clone(),
            options: options.clone(),
            policy: destroy_policy,
            classifier: destroy_classifier,
            stats: self.stats.clone(),
        });

        match self.read_outputs(&options).await {
            Ok(outputs) => {
                debug!("[{run_id}] Module exposes {} output(s)", outputs.len());
                module.set_outputs(outputs);
                Ok(module)
            }
            Err(err) => {
                warn!("[{run_id}] Could not read outputs, destroying module: {err}");
                module.destroy().await;
                Err(err)
            }
        }
    }

    /// Destroys the module described by `request` without a prior apply in
    /// this process, e.g. to clean up after a timed out or killed test run.
    pub async fn destroy(&self, request: ProvisioningRequest) -> DestroyOutcome {
        let (policy, classifier) = request.teardown.resolve(&request.retry, &request.retryable);
        Teardown {
            run_id: Uuid::new_v4(),
            engine: self.engine.clone(),
            options: request.options(),
            policy,
            classifier,
            stats: self.stats.clone(),
        }
        .run()
        .await
    }

    async fn read_outputs(&self, options: &TerraformOptions) -> Result<Outputs, ProvisionError> {
        let document = self
            .engine
            .output_all(options)
            .await
            .map_err(ProvisionError::OutputRead)?;
        Ok(Outputs::from_json(&document)?)
    }

    /// Apply, run `body` on its own task, then destroy no matter how the body
    /// ended. The module counts as asserted only when the body returns `Ok`.
    /// A panicking body is resumed after teardown has run.
    pub async fn run_lifecycle<F, Fut, T, E>(
        &self,
        request: ProvisioningRequest,
        body: F,
    ) -> Result<LifecycleReport<T, E>, ProvisionError>
    where
        F: FnOnce(Outputs) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let mut module = self.apply(request).await?;
        let joined = tokio::spawn(body(module.outputs().clone())).await;
        if matches!(joined, Ok(Ok(_))) {
            module.mark_asserted();
        }
        let asserted = module.phase() == LifecyclePhase::Asserted;

        let destroy = module.destroy().await;
        match joined {
            Ok(value) => Ok(LifecycleReport {
                value,
                asserted,
                destroy,
            }),
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => Err(ProvisionError::Join(err)),
        }
    }
}

static PARALLELISM: OnceLock<Arc<Semaphore>> = OnceLock::new();

/// Waits for one of the process-wide provisioning slots. The first caller
/// sizes the pool; later values of `parallelism` are ignored.
pub async fn parallelism_permit(parallelism: usize) -> Option<OwnedSemaphorePermit> {
    let semaphore = PARALLELISM
        .get_or_init(|| {
            info!("Allowing {parallelism} module test(s) to provision at once");
            Arc::new(Semaphore::new(parallelism.max(1)))
        })
        .clone();

    match semaphore.acquire_owned().await {
        Ok(permit) => Some(permit),
        Err(e) => {
            warn!("Parallelism limiter closed: {e}");
            None
        }
    }
}
