//! Tracing setup for processes embedding the engine.
//!
//! Call [`init_tracing`] once at program start. Later calls are ignored,
//! since the global subscriber can only be set once per process.
//!
//! Filter directives come from `GOBOX_LOG`, then `RUST_LOG`. Without
//! either, the gobox crates log at the requested level and everything else
//! (wasmtime and cranelift are chatty at debug) stays at `warn`.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable checked before `RUST_LOG`.
pub const LOG_ENV: &str = "GOBOX_LOG";

const GOBOX_TARGETS: [&str; 2] = ["gobox_core", "gobox_interp"];

/// Install the global subscriber.
///
/// * `json`: emit newline-delimited JSON instead of human-readable lines.
/// * `level`: verbosity of the gobox crates when no directives are set.
pub fn init_tracing(json: bool, level: Level) {
    let registry = tracing_subscriber::registry().with(env_filter(level));
    if json {
        registry
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
            .ok();
    } else {
        registry.with(fmt::layer()).try_init().ok();
    }
}

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)))
}

/// `warn` globally, `level` for the gobox crates.
pub fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    let mut directives = String::from("warn");
    for target in GOBOX_TARGETS {
        directives.push_str(&format!(",{target}={level}"));
    }
    directives
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_scope_the_level_to_gobox_crates() {
        assert_eq!(
            default_directives(Level::DEBUG),
            "warn,gobox_core=debug,gobox_interp=debug"
        );
        assert!(EnvFilter::try_new(default_directives(Level::TRACE)).is_ok());
    }

    #[test]
    fn repeated_init_is_harmless() {
        init_tracing(false, Level::WARN);
        init_tracing(true, Level::DEBUG);
        tracing::info!("still alive");
    }
}
