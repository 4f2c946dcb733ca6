//! Shared test setup.

use std::sync::Once;

/// Load `.env_test` (falling back to `.env`) once per test binary, and make
/// sure the generic stores point at in-memory backends when nothing else is
/// configured.
pub async fn init_test_environment() {
    static ENV_INIT: Once = Once::new();
    ENV_INIT.call_once(|| {
        if dotenvy::from_filename(".env_test").is_err() {
            dotenvy::dotenv().ok();
        }
        for (key, value) in [
            ("GENERIC_DATA_STORE_TYPE", "sqlite"),
            ("GENERIC_DATA_STORE_URL", "sqlite::memory:"),
            ("GENERIC_CACHE_STORE_TYPE", "memory"),
            ("GENERIC_CACHE_STORE_URL", "memory"),
        ] {
            if std::env::var(key).is_err() {
                unsafe { std::env::set_var(key, value) };
            }
        }
    });
}
