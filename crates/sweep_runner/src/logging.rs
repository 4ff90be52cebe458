use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging to stderr.
///
/// The filter comes from `RUST_LOG` when set, otherwise `level` applies to
/// both workspace crates. Calling this twice is harmless; the second call is
/// ignored.
pub fn init_logging(level: &str) {
    let default_filter = format!("sweep_runner={level},sweep_core={level}");
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false),
        )
        .try_init();
}
