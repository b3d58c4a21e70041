use tracing_subscriber::EnvFilter;

/// Log filter for a count of `-v` flags.
pub fn default_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Installs the stderr log subscriber used by the binaries. `RUST_LOG`
/// takes precedence over `verbosity` when it is set.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));
    // A subscriber may already be installed (e.g. by a test harness)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
