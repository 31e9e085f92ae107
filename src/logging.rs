//! Structured logger setup.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// `level` is one of debug/info/warn/error; `format` selects human-readable
/// text or JSON lines. Safe to call more than once; later calls are no-ops.
pub fn init(level: &str, format: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match format {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init(),
        _ => tracing_subscriber::fmt().with_env_filter(filter).try_init(),
    };

    // Already initialized (tests, embedded use); keep the existing subscriber
    let _ = result;
}
