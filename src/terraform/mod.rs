//! The narrow interface the harness drives the infrastructure engine through.

pub mod cli;
pub mod options;

pub use cli::TerraformCli;
pub use options::{BackendConfig, TerraformOptions};

use async_trait::async_trait;

use crate::error::EngineError;

/// The three engine operations the harness depends on. Each future resolves
/// once the underlying process exits; dropping it must stop that process.
#[async_trait]
pub trait TerraformEngine: Send + Sync {
    /// `init` followed by `apply`. Returns the combined stdout.
    async fn init_and_apply(&self, options: &TerraformOptions) -> Result<String, EngineError>;

    async fn destroy(&self, options: &TerraformOptions) -> Result<String, EngineError>;

    /// The `terraform output -json` document for every output of the module.
    async fn output_all(&self, options: &TerraformOptions) -> Result<String, EngineError>;
}
