use azure_tf_harness::config::TestConfig;
use azure_tf_harness::harness::TeardownPolicy;
use azure_tf_harness::module_test;
use azure_tf_harness::naming::generate_unique_name;
use azure_tf_harness::Harness;

use super::retry_every;

module_test!(test_redis, |harness: Harness, config: TestConfig| async move {
    let request = harness
        .request("redis")
        .vars(config.base_vars())
        .var("redis_name", generate_unique_name("redis"))
        .retry(retry_every(3, 30))
        .teardown(TeardownPolicy::BestEffort);

    let mut module = harness.apply(request).await.expect("redis apply failed");
    module
        .validate_outputs(&[("redis_id", None)])
        .expect("redis outputs");

    log::info!(
        "Redis created: {}",
        module.output("redis_id").unwrap_or_default()
    );
    module.destroy().await;
});
