//! Tracing setup for the `ranker` binary.
//!
//! `RUST_LOG` wins when set. Otherwise the ranker crates log at the
//! configured level and every dependency (surrealdb, reqwest, hyper) stays
//! at `warn`.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingSection;

/// Crates whose events follow the configured level.
const RANKER_TARGETS: [&str; 3] = ["ranker", "ranker_core", "ranker_state"];

/// Filter directives used when `RUST_LOG` is unset.
pub fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    let mut directives = String::from("warn");
    for target in RANKER_TARGETS {
        directives.push_str(&format!(",{target}={level}"));
    }
    directives
}

/// Parse a level name, falling back to `INFO`.
pub fn parse_level(name: &str) -> Level {
    name.parse().unwrap_or(Level::INFO)
}

/// Install the global subscriber from the `[logging]` section.
///
/// JSON output carries the current span so `storage.failure` and
/// `rating.submitted` lines can be tied to the request that raised them.
/// Only the first call in a process takes effect.
pub fn init_from_config(logging: &LoggingSection) {
    let level = parse_level(&logging.level);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if logging.json {
        registry
            .with(fmt::layer().json().with_current_span(true).with_span_list(false))
            .try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
