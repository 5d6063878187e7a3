use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "KUBESESS_LOG";

/// Initialize the tracing subscriber.
///
/// Logs go to stderr so stdout stays clean for the shell wrappers. The filter
/// comes from `KUBESESS_LOG`, defaulting to "warn"; `debug` forces "debug".
pub fn init(debug: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .compact();

    let filter_layer = if debug {
        EnvFilter::try_new("debug")?
    } else {
        EnvFilter::try_from_env(LOG_ENV).or_else(|_| EnvFilter::try_new("warn"))?
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
