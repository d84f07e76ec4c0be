//! One file per Terraform fixture under `tests/fixtures/`.
//!
//! - **resource_group**, **route_table**, **vm_integration**: retry any
//!   apply failure 3 times, 30 seconds apart
//! - **networking**: 2 retries, 30 seconds apart
//! - **nat_gateway**, **application_gateway**: 6 retries a minute apart, and
//!   a teardown that retries slow deletions
//! - **redis**, **postgres_flexible_server**: no retryable errors and a single
//!   best-effort destroy
//!
//! Provisioning is bounded by `TEST_PARALLELISM` (default 1) across the suite.

pub mod application_gateway;
pub mod nat_gateway;
pub mod networking;
pub mod postgres_flexible_server;
pub mod redis;
pub mod resource_group;
pub mod route_table;
pub mod vm_integration;

use std::time::Duration;

use azure_tf_harness::harness::RetryPolicy;

pub const TRANSIENT_ERROR: &str = "Terraform failed due to transient error";

pub fn retry_every(max_retries: u32, secs: u64) -> RetryPolicy {
    RetryPolicy::new(max_retries, Duration::from_secs(secs))
}
