use azure_tf_harness::config::TestConfig;
use azure_tf_harness::harness::TeardownPolicy;
use azure_tf_harness::module_test;
use azure_tf_harness::naming::generate_unique_name;
use azure_tf_harness::Harness;

use super::{retry_every, TRANSIENT_ERROR};

module_test!(test_application_gateway, |harness: Harness, config: TestConfig| async move {
    let request = harness
        .request("application_gateway")
        .vars(config.base_vars())
        .var("application_gateway_name", generate_unique_name("agw"))
        .var("public_ip_name", generate_unique_name("pip"))
        .retry(retry_every(6, 60))
        .retryable_errors([(".*", TRANSIENT_ERROR)])
        .expect("valid retry pattern")
        .teardown(TeardownPolicy::Retry {
            attempts: 6,
            delay: std::time::Duration::from_secs(30),
        });

    let mut module = harness
        .apply(request)
        .await
        .expect("application gateway apply failed");
    module
        .validate_outputs(&[("application_gateway_id", None), ("public_ip_id", None)])
        .expect("application gateway outputs");

    log::info!(
        "Application Gateway created successfully: {}",
        module.output("application_gateway_id").unwrap_or_default()
    );
    module.destroy().await;
});
