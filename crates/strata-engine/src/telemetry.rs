//! Tracing initialization.

use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global tracing subscriber with `RUST_LOG`-style
/// filtering, defaulting to `info`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init();
        init();
    }
}
