//! Tracing subscriber setup shared by the binaries

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Install the global subscriber. `RUST_LOG` wins over `level`.
pub fn init(cfg: &LoggingConfig) {
    let default_level = cfg.level.trim();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        // Quiet the HTTP stack when only a bare level is given
        let spec = if default_level.contains(',') || default_level.contains('=') {
            default_level.to_string()
        } else {
            format!("{},hyper=info,reqwest=info,h2=info", default_level)
        };
        EnvFilter::try_new(spec).unwrap_or_else(|_| EnvFilter::new("info"))
    });
    let subscriber = tracing_subscriber::registry().with(filter);

    if cfg.json {
        subscriber
            .with(fmt::layer().json().with_target(true).with_current_span(false))
            .init();
    } else {
        subscriber.with(fmt::layer().with_target(true).compact()).init();
    }
}
