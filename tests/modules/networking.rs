use azure_tf_harness::config::TestConfig;
use azure_tf_harness::module_test;
use azure_tf_harness::naming::generate_unique_name;
use azure_tf_harness::Harness;

use super::{retry_every, TRANSIENT_ERROR};

module_test!(test_networking_module, |harness: Harness, config: TestConfig| async move {
    let vnet_name = generate_unique_name("test-vnet");

    let request = harness
        .request("networking")
        .vars(config.base_vars())
        .var("vnet_name", vnet_name.clone())
        .retry(retry_every(2, 30))
        .retryable_errors([(".*", TRANSIENT_ERROR)])
        .expect("valid retry pattern");

    let mut module = harness.apply(request).await.expect("networking apply failed");
    module
        .validate_outputs(&[
            ("vnet_id", None),
            ("vnet_name", Some(vnet_name.as_str())),
            ("subnet_ids", None),
            ("nsg_ids", None),
        ])
        .expect("networking outputs");

    let vnet_id = module.output("vnet_id").expect("vnet_id output");
    assert!(vnet_id.contains("/virtualNetworks/"), "VNet ID should be valid: {vnet_id}");
    assert!(vnet_id.contains(&vnet_name), "VNet ID should contain VNet name: {vnet_id}");

    let subnet_ids = module.output_json("subnet_ids").expect("subnet_ids output");
    assert_ne!(subnet_ids, "{}", "Subnet IDs should not be empty");

    log::info!("Networking test completed, VNet {vnet_name}: {vnet_id}");
    module.destroy().await;
});
