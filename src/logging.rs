//! Tracing bootstrap.

use std::env;

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,avatar_stylizer=debug,tower_http=info";

/// Install the global subscriber.
///
/// Precedence: `RUST_LOG`, then `AVATAR_STYLIZER_LOG`, then the built-in default.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_target(true)
        .with_env_filter(filter_from_env())
        .try_init();
}

fn filter_from_env() -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    if let Some(filter) = env::var("AVATAR_STYLIZER_LOG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .and_then(|v| EnvFilter::try_new(v).ok())
    {
        return filter;
    }

    EnvFilter::new(DEFAULT_FILTER)
}
