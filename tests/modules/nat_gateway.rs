use azure_tf_harness::config::TestConfig;
use azure_tf_harness::module_test;
use azure_tf_harness::naming::generate_unique_name;
use azure_tf_harness::Harness;

use super::{retry_every, TRANSIENT_ERROR};

module_test!(test_nat_gateway, |harness: Harness, config: TestConfig| async move {
    let request = harness
        .request("nat_gateway")
        .vars(config.base_vars())
        .var("nat_gateway_name", generate_unique_name("nat-gateway"))
        .var("public_ip_name", generate_unique_name("pip"))
        .retry(retry_every(6, 60))
        .retryable_errors([(".*", TRANSIENT_ERROR)])
        .expect("valid retry pattern")
        .teardown(harness.retrying_teardown());

    let mut module = harness.apply(request).await.expect("NAT gateway apply failed");
    module
        .validate_outputs(&[("nat_gateway_id", None), ("public_ip_id", None)])
        .expect("NAT gateway outputs");

    log::info!(
        "NAT Gateway created successfully: {}",
        module.output("nat_gateway_id").unwrap_or_default()
    );

    let outcome = module.destroy().await;
    if !outcome.is_destroyed() {
        log::warn!("NAT Gateway left behind: {outcome:?}");
    }
});
