//! Structured tracing setup for binaries embedding the gateway.

use tracing_subscriber::EnvFilter;

/// Error returned when a global subscriber is already installed.
pub type InitError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Installs a formatted subscriber filtered by `RUST_LOG`, or by
/// `default_filter` when the variable is unset or invalid.
///
/// Libraries never call this; it is meant for `main`.
///
/// # Errors
///
/// Returns an error if a global subscriber has already been set.
pub fn init_tracing(default_filter: &str) -> Result<(), InitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_is_rejected() {
        let _ = init_tracing("info");
        assert!(init_tracing("debug").is_err());
    }
}
