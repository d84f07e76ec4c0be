use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::naming::{storage_account_name, unique_id};

/// Everything a single terraform invocation needs. Retry settings live on the
/// harness side and never reach the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct TerraformOptions {
    pub terraform_dir: PathBuf,
    pub vars: Map<String, Value>,
    pub no_color: bool,
    pub backend_config: Option<BackendConfig>,
}

impl TerraformOptions {
    pub fn new(terraform_dir: impl AsRef<Path>) -> Self {
        Self {
            terraform_dir: terraform_dir.as_ref().to_path_buf(),
            vars: Map::new(),
            no_color: true,
            backend_config: None,
        }
    }
}

/// Remote state location in an Azure storage container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub resource_group_name: String,
    pub storage_account_name: String,
    pub container_name: String,
    pub key: String,
}

impl BackendConfig {
    /// Fresh storage account name and state key for one test run.
    pub fn for_test(resource_group_name: &str) -> Self {
        Self {
            resource_group_name: resource_group_name.to_string(),
            storage_account_name: storage_account_name(),
            container_name: "tfstate".to_string(),
            key: format!("test-{}.tfstate", unique_id()),
        }
    }

    /// `-backend-config=key=value` arguments for `terraform init`.
    pub fn to_args(&self) -> Vec<String> {
        [
            ("resource_group_name", &self.resource_group_name),
            ("storage_account_name", &self.storage_account_name),
            ("container_name", &self.container_name),
            ("key", &self.key),
        ]
        .iter()
        .map(|(key, value)| format!("-backend-config={key}={value}"))
        .collect()
    }
}
