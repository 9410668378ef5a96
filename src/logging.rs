use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install the global subscriber, writing to stderr so stdout stays JSON.
///
/// `RUST_LOG` wins when set; otherwise `info`, or `debug` for our own
/// crates when `verbose` is on. Calling this twice is a no-op.
pub fn init(verbose: bool) {
    let default = if verbose {
        "info,voxrag=debug,voxrag_core=debug"
    } else {
        "info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .try_init();
}
