use async_trait::async_trait;
use log::{debug, info, warn};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tokio::process::Command;

use crate::error::EngineError;
use crate::terraform::{TerraformEngine, TerraformOptions};

/// Engine backed by the `terraform` executable.
#[derive(Debug, Clone)]
pub struct TerraformCli {
    binary: String,
}

impl Default for TerraformCli {
    fn default() -> Self {
        Self::new("terraform")
    }
}

impl TerraformCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Runs one terraform command to completion. The child is killed if the
    /// returned future is dropped first, e.g. by an apply timeout.
    async fn run(
        &self,
        command: &str,
        args: &[String],
        options: &TerraformOptions,
    ) -> Result<String, EngineError> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .current_dir(&options.terraform_dir)
            .env("TF_IN_AUTOMATION", "1")
            .env("TF_INPUT", "0")
            .kill_on_drop(true);

        debug!(
            "Running {} {:?} in {}",
            self.binary,
            args,
            options.terraform_dir.display()
        );

        let output = cmd.output().await.map_err(|source| EngineError::Spawn {
            command: command.to_string(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            debug!("terraform {command} succeeded in {}", options.terraform_dir.display());
            Ok(stdout)
        } else {
            let code = output.status.code();
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!("terraform {command} exited with code {code:?}");
            Err(EngineError::Failed {
                command: command.to_string(),
                code,
                stderr,
            })
        }
    }
}

#[async_trait]
impl TerraformEngine for TerraformCli {
    async fn init_and_apply(&self, options: &TerraformOptions) -> Result<String, EngineError> {
        info!("Initializing {}", options.terraform_dir.display());
        let mut combined = self.run("init", &init_args(options), options).await?;

        let var_file = write_var_file(options)?;
        info!("Applying {}", options.terraform_dir.display());
        let applied = self
            .run("apply", &apply_args(options, var_file.path()), options)
            .await?;
        combined.push_str(&applied);
        Ok(combined)
    }

    async fn destroy(&self, options: &TerraformOptions) -> Result<String, EngineError> {
        let var_file = write_var_file(options)?;
        info!("Destroying {}", options.terraform_dir.display());
        self.run("destroy", &destroy_args(options, var_file.path()), options)
            .await
    }

    async fn output_all(&self, options: &TerraformOptions) -> Result<String, EngineError> {
        self.run("output", &output_args(options), options).await
    }
}

/// Serializes the input variables to a temporary `.tfvars.json` file that is
/// removed once the returned handle drops.
fn write_var_file(options: &TerraformOptions) -> Result<NamedTempFile, EngineError> {
    let mut file = tempfile::Builder::new()
        .prefix("tfharness-")
        .suffix(".tfvars.json")
        .tempfile()
        .map_err(EngineError::VarFile)?;

    serde_json::to_writer(file.as_file_mut(), &options.vars)?;
    file.flush().map_err(EngineError::VarFile)?;
    Ok(file)
}

fn with_color_flag(mut args: Vec<String>, options: &TerraformOptions) -> Vec<String> {
    if options.no_color {
        args.push("-no-color".to_string());
    }
    args
}

pub(crate) fn init_args(options: &TerraformOptions) -> Vec<String> {
    let mut args = with_color_flag(vec!["init".to_string(), "-input=false".to_string()], options);
    if let Some(backend) = &options.backend_config {
        args.extend(backend.to_args());
    }
    args
}

pub(crate) fn apply_args(options: &TerraformOptions, var_file: &Path) -> Vec<String> {
    let mut args = with_color_flag(
        vec![
            "apply".to_string(),
            "-input=false".to_string(),
            "-auto-approve".to_string(),
        ],
        options,
    );
    args.push(format!("-var-file={}", var_file.display()));
    args
}

pub(crate) fn destroy_args(options: &TerraformOptions, var_file: &Path) -> Vec<String> {
    let mut args = with_color_flag(
        vec![
            "destroy".to_string(),
            "-input=false".to_string(),
            "-auto-approve".to_string(),
        ],
        options,
    );
    args.push(format!("-var-file={}", var_file.display()));
    args
}

pub(crate) fn output_args(options: &TerraformOptions) -> Vec<String> {
    with_color_flag(vec!["output".to_string(), "-json".to_string()], options)
}
