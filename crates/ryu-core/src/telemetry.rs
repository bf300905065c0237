// Logging setup
//
// The library itself only emits `tracing` events: device creation and
// backward passes at debug, kernel dispatch and buffer traffic at trace.
// Applications that do not install their own subscriber can call
// `init_tracing()` once at startup. The filter comes from `RYU_LOG`
// (standard EnvFilter syntax, e.g. `RYU_LOG=ryu_core=trace`) and defaults
// to `warn`.

use std::io::IsTerminal;
use std::sync::OnceLock;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::error::{Error, Result};

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "RYU_LOG";

static INITIALISED: OnceLock<()> = OnceLock::new();

/// Installs a global fmt subscriber filtered by `RYU_LOG`.
///
/// Fails if called twice, or if another global subscriber is already set.
pub fn init_tracing() -> Result<()> {
    INITIALISED
        .set(())
        .map_err(|_| Error::msg("tracing has already been initialised"))?;

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr);
    Registry::default()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| Error::msg(format!("failed to install tracing subscriber: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        let _ = init_tracing();
        let err = init_tracing().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Backend);
        tracing::debug!("still routed through the first subscriber");
    }
}
