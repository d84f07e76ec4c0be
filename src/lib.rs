pub mod config;
pub mod env;
pub mod error;
pub mod gating;
pub mod harness;
pub mod naming;
pub mod outputs;
pub mod terraform;

pub use config::{HarnessSettings, TestConfig};
pub use error::{AssertionError, ConfigError, EngineError, OutputError, ProvisionError};
pub use harness::{Harness, ProvisionedModule, ProvisioningRequest};
pub use outputs::Outputs;

// Azure credential variables consumed by the azurerm provider
pub const ENV_ARM_CLIENT_ID: &str = "ARM_CLIENT_ID";
pub const ENV_ARM_CLIENT_SECRET: &str = "ARM_CLIENT_SECRET";
pub const ENV_ARM_SUBSCRIPTION_ID: &str = "ARM_SUBSCRIPTION_ID";
pub const ENV_ARM_TENANT_ID: &str = "ARM_TENANT_ID";

// Optional overrides
pub const ENV_TEST_RESOURCE_GROUP_NAME: &str = "TEST_RESOURCE_GROUP_NAME";
pub const ENV_TEST_LOCATION: &str = "TEST_LOCATION";
pub const ENV_TEST_TIMEOUT: &str = "TEST_TIMEOUT";
pub const ENV_TEST_PARALLELISM: &str = "TEST_PARALLELISM";
pub const ENV_TEST_SHORT: &str = "TEST_SHORT";
pub const ENV_TEST_FIXTURES_DIR: &str = "TEST_FIXTURES_DIR";
pub const ENV_TERRAFORM_BINARY: &str = "TERRAFORM_BINARY";
pub const ENV_CI: &str = "CI";

/// Declares a live module test.
///
/// The generated `#[tokio::test]` applies the standard preconditions in
/// order: short-mode gate, credential validation, parallelism permit. The
/// body receives a [`Harness`] built from [`HarnessSettings::from_env`] and
/// the per-test [`TestConfig`].
#[macro_export]
macro_rules! module_test {
    ($test_name:ident, $body:expr) => {
        #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
        async fn $test_name() {
            let _ = env_logger::builder().is_test(true).try_init();

            if let $crate::gating::Gate::Skip(reason) = $crate::gating::skip_if_short() {
                log::info!("{}: {reason}", stringify!($test_name));
                return;
            }

            $crate::env::validate_required_env_vars()
                .expect("Required environment variables not set");

            let settings =
                $crate::config::HarnessSettings::from_env().expect("invalid harness settings");
            let _permit = $crate::harness::parallelism_permit(settings.parallelism).await;

            let config = $crate::config::TestConfig::from_env();
            let harness = $crate::harness::Harness::cli(settings);

            let fut = $body(harness, config);
            fut.await;
        }
    };
}
