use std::sync::Once;

static INIT: Once = Once::new();

/// Installs the global tracing subscriber. Safe to call more than once;
/// later calls are no-ops (tests share one process).
pub fn init_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .try_init();
    });
}
