//! Logging setup for examples, tests and benches.

/// Initialize a tracing subscriber when `RUST_LOG` is set.
///
/// Tests and benches can call `spindle::dev_tracing::init_tracing()` to see
/// registry lifecycle and monitor logs, e.g. `RUST_LOG=spindle_core=debug`.
/// This is a no-op when `RUST_LOG` is not set or when a global subscriber
/// is already installed.
pub fn init_tracing() {
    if std::env::var_os("RUST_LOG").is_none() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_thread_names(true)
        .try_init();
}
