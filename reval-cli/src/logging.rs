//! Diagnostic logging for the engine itself.

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Install the `tracing` subscriber once.
///
/// `RUST_LOG` takes precedence; otherwise `REVAL_DEBUG=1` enables debug
/// output for this crate. Without either nothing is installed. Logs go to
/// stderr.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        let filter = match debug_filter() {
            Some(directives) => EnvFilter::new(directives),
            None => return,
        };
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .without_time(),
            )
            .with(filter)
            .init();
    });
}

fn debug_filter() -> Option<String> {
    if let Ok(directives) = std::env::var("RUST_LOG") {
        return Some(directives);
    }
    match std::env::var("REVAL_DEBUG").as_deref() {
        Ok("1" | "true") => Some("reval=debug".to_string()),
        _ => None,
    }
}
