use azure_tf_harness::config::TestConfig;
use azure_tf_harness::module_test;
use azure_tf_harness::outputs::{normalize_location, validate_outputs};
use azure_tf_harness::Harness;

use super::{retry_every, TRANSIENT_ERROR};

module_test!(test_resource_group, |harness: Harness, config: TestConfig| async move {
    let request = harness
        .request("resource_group")
        .vars(config.base_vars())
        .retry(retry_every(3, 30))
        .retryable_errors([(".*", TRANSIENT_ERROR)])
        .expect("valid retry pattern");

    let expected_name = config.resource_group_name.clone();
    let expected_location = normalize_location(&config.location);

    let report = harness
        .run_lifecycle(request, move |outputs| async move {
            validate_outputs(
                &outputs,
                &[
                    ("name", Some(expected_name.as_str())),
                    ("id", None),
                    ("location", Some(expected_location.as_str())),
                ],
            )
        })
        .await
        .expect("resource group apply failed");

    report.value.expect("resource group outputs");
    log::info!(
        "Resource group created successfully: {}",
        config.resource_group_name
    );
});
