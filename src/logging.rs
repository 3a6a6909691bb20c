//! Tracing initialization.

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info,sqlx=warn",
        _ => "debug,sqlx=info",
    }
}

/// Install the stderr subscriber.
///
/// `RUST_LOG` wins when set and valid; otherwise `-v` selects `info` and
/// `-vv` selects `debug`. Idempotent.
pub fn init_tracing(verbosity: u8) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(verbosity > 1),
            )
            .with(filter)
            .init();
    });
}
