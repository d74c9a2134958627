//! Thin facade over the structured logging stack. Components hold a `Logger`
//! and emit key/value records; silent operation is a `Discard` root.

pub use slog::{debug, error, info, o, trace, warn};
pub use slog::{Discard, Drain, Logger};

use sloggers::{Config, LoggerConfig};

/// Logger that swallows everything. The default for components constructed
/// without an explicit parent logger.
pub fn discard() -> Logger {
    Logger::root(Discard, o!())
}

/// Terminal logger built from the embedded default configuration.
pub fn terminal() -> Logger {
    let config: LoggerConfig = serdeconv::from_toml_str(
        r#"
type = "terminal"
level = "debug"
destination = "stderr"
"#,
    )
    .expect("Malformed embedded logging config");

    config.build_logger().expect("Error building terminal logger")
}

/// Logger configured from a TOML snippet (see `sloggers` for the accepted
/// keys). Panics on malformed configuration, which is an operator error.
pub fn from_toml_str(text: &str) -> Logger {
    let config: LoggerConfig =
        serdeconv::from_toml_str(text).expect("Malformed logging config");
    config.build_logger().expect("Error building logger")
}

/// Derives a child logger from an optional parent, falling back to discard.
pub fn child<'a, L: Into<Option<&'a Logger>>>(log: L) -> Logger {
    match log.into() {
        Some(log) => log.new(o!()),
        None => discard(),
    }
}
