use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{Layer, Registry};

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` directives take precedence over `level`. Setting
/// `NDN_FETCH_DISABLE_LOGS` skips installation and `NDN_FETCH_LOG_TO_STDERR`
/// sends output to stderr.
pub fn init_tracer(level: Option<LevelFilter>) -> anyhow::Result<()> {
    if std::env::var("NDN_FETCH_DISABLE_LOGS").is_ok() {
        return Ok(());
    }

    let default_filter = if cfg!(any(test, debug_assertions)) {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let filter_layer = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(level.unwrap_or(default_filter).into())
        .from_env_lossy();

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_level(true)
        .with_target(false);
    let fmt_layer = if std::env::var("NDN_FETCH_LOG_TO_STDERR").is_ok() {
        fmt_layer.with_writer(std::io::stderr).boxed()
    } else {
        fmt_layer.boxed()
    };

    let subscriber = Registry::default().with(fmt_layer.with_filter(filter_layer));
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
