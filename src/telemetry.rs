//! Telemetry initialization (tracing/tracing-subscriber).
//!
//! Behavior:
//! - LOG_LEVEL controls the filter. Unset, it falls back to
//!   "info,hinteval_console=debug,reconcile=debug,tower_http=info,axum=info".
//! - LOG_FORMAT selects "pretty" (default) or "json" structured logs.
//!
//! Targets: `hinteval_console` (process), `reconcile` (session state machine),
//! `elimination` (map updates), `service` (upstream calls).

use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "info,hinteval_console=debug,reconcile=debug,tower_http=info,axum=info";

pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    // JSON vs pretty are different subscriber types; init each branch separately.
    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => {
            builder.json().init();
        }
        _ => {
            builder.init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_parses() {
        let filter = EnvFilter::try_new(DEFAULT_FILTER).unwrap();
        let shown = filter.to_string();
        assert!(shown.contains("reconcile=debug"));
        assert!(shown.contains("hinteval_console=debug"));
    }
}
