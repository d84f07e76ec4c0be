use azure_tf_harness::config::TestConfig;
use azure_tf_harness::harness::TeardownPolicy;
use azure_tf_harness::module_test;
use azure_tf_harness::naming::{generate_unique_name, unique_id};
use azure_tf_harness::Harness;

use super::retry_every;

module_test!(test_postgres_flexible_server, |harness: Harness, config: TestConfig| async move {
    // Azure requires upper, lower, digit and symbol characters
    let password = format!("Pg@{}9!", unique_id());

    let request = harness
        .request("postgres_flexible_server")
        .vars(config.base_vars())
        .var("postgresql_flexible_name", generate_unique_name("postgresql-flexible"))
        .var("administrator_login", generate_unique_name("psqladminun"))
        .var("administrator_password", password)
        .retry(retry_every(3, 30))
        .teardown(TeardownPolicy::BestEffort);

    let mut module = harness
        .apply(request)
        .await
        .expect("postgres flexible server apply failed");
    module
        .validate_outputs(&[("server_id", None)])
        .expect("postgres flexible server outputs");

    log::info!(
        "PostgreSQL Flexible Server created: {}",
        module.output("server_id").unwrap_or_default()
    );
    module.destroy().await;
});
