//! Logging setup.

use tracing_subscriber::EnvFilter;

use crate::config::ApplicationConfig;
use crate::error::{TranslateError, TranslateResult};

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over the configured level. Returns `Ok(false)` when a
/// subscriber was already installed by someone else.
pub fn init_tracing(app: &ApplicationConfig) -> TranslateResult<bool> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&app.log_level)
            .map_err(|e| TranslateError::Configuration(format!("invalid log filter: {e}")))?,
    };

    let installed = if app.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
            .is_ok()
    };

    if installed {
        tracing::info!(application = %app.name, "logging initialised");
    }
    Ok(installed)
}
