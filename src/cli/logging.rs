use tracing_subscriber::EnvFilter;

/// Initialize logging to stderr.
///
/// `RUST_LOG` wins when set; otherwise `log_level` applies, raised to
/// `debug` for this crate when `debug` is set.
pub fn init(log_level: &str, debug: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug {
            EnvFilter::new(format!("{},table_transformer=debug", log_level))
        } else {
            EnvFilter::new(log_level)
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
