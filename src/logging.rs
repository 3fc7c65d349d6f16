//! Structured logging setup for the binaries
//!
//! Log level comes from `RUST_LOG` when set; otherwise `ses_nullmodel=info,warn`
//! (or `debug` for this crate when `verbose` is true, which also enables
//! per-worker progress lines).

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "ses_nullmodel=debug,warn"
    } else {
        "ses_nullmodel=info,warn"
    };

    // A second call (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init();
}
