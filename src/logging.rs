use tracing_subscriber::{fmt, EnvFilter};

/// Diagnostics go to stderr so command output stays clean. `RUST_LOG`
/// overrides the level picked by `--verbose`.
pub fn init(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .without_time()
        .try_init();
}
