use rand::distributions::Alphanumeric;
use rand::Rng;

const UNIQUE_ID_LEN: usize = 8;
const STORAGE_ACCOUNT_PREFIX: &str = "teststg";
const STORAGE_ACCOUNT_MAX_LEN: usize = 24;

/// Random lowercase alphanumeric identifier, 36^8 possible values.
pub fn unique_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(UNIQUE_ID_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

/// `<prefix>-<random id>`, distinct across concurrently running tests.
pub fn generate_unique_name(prefix: &str) -> String {
    format!("{prefix}-{}", unique_id())
}

/// Storage accounts must be 3-24 lowercase alphanumerics.
pub fn storage_account_name() -> String {
    let mut name = format!("{STORAGE_ACCOUNT_PREFIX}{}", unique_id()).to_ascii_lowercase();
    name.truncate(STORAGE_ACCOUNT_MAX_LEN);
    name
}
