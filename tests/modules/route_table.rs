use serde_json::json;

use azure_tf_harness::config::TestConfig;
use azure_tf_harness::module_test;
use azure_tf_harness::naming::generate_unique_name;
use azure_tf_harness::Harness;

use super::retry_every;

module_test!(test_route_table, |harness: Harness, config: TestConfig| async move {
    let rt_name = generate_unique_name("test-rt");

    // The fixture creates its own resource group
    let request = harness
        .request("route_table")
        .var("route_table_name", rt_name.clone())
        .var("location", config.location.clone())
        .var("tags", json!(config.tags))
        .retry(retry_every(3, 30))
        .retry_on_any_error();

    let mut module = harness.apply(request).await.expect("route table apply failed");
    module
        .validate_outputs(&[("route_table_id", None)])
        .expect("route table outputs");

    log::info!("Route table created successfully: {rt_name}");
    module.destroy().await;
});
