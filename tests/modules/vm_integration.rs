use azure_tf_harness::config::{generate_test_tags, TestConfig};
use azure_tf_harness::module_test;
use azure_tf_harness::naming::generate_unique_name;
use azure_tf_harness::Harness;
use serde_json::json;

use super::{retry_every, TRANSIENT_ERROR};

module_test!(test_vm_integration, |harness: Harness, config: TestConfig| async move {
    let request = harness
        .request("vm_integration")
        .vars(config.base_vars())
        .var("vm_name", generate_unique_name("test-vm"))
        .var("vnet_name", generate_unique_name("test-vnet"))
        .var("vm_size", "Standard_B1s")
        .var("admin_username", "azureuser")
        .var("create_public_ip", false)
        .var("attach_nsg", true)
        .var("create_data_disk", false)
        .var("tags", json!(generate_test_tags("test_vm_integration")))
        .retry(retry_every(3, 30))
        .retryable_errors([(".*", TRANSIENT_ERROR)])
        .expect("valid retry pattern");

    let mut module = harness.apply(request).await.expect("VM apply failed");
    module
        .validate_outputs(&[("vnet_id", None)])
        .expect("VM integration outputs");

    let vm_ids = module.output_list("vm_ids").expect("vm_ids output");
    assert_eq!(vm_ids.len(), 1, "expected exactly one VM, got {vm_ids:?}");

    log::info!(
        "Integration test completed - VNet: {}, VM: {}",
        module.output("vnet_id").unwrap_or_default(),
        vm_ids[0]
    );
    module.destroy().await;
});
