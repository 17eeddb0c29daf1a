//! Tracing bootstrap.

use tracing_subscriber::EnvFilter;

use umi_core::config::GeneralConfig;

use crate::error::DialogueError;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over `[general].log_level`. `log_format = "json"` selects
/// structured JSON lines; anything else uses the human-readable formatter.
///
/// # Errors
/// Returns [`DialogueError::Telemetry`] if a global subscriber is already set
/// or the level directive does not parse.
pub fn init_tracing(config: &GeneralConfig) -> Result<(), DialogueError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level).map_err(|e| DialogueError::Telemetry(e.to_string()))?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let result = if config.log_format.eq_ignore_ascii_case("json") {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| DialogueError::Telemetry(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_an_error_not_a_panic() {
        let config = GeneralConfig::default();
        let _ = init_tracing(&config);
        assert!(matches!(init_tracing(&config), Err(DialogueError::Telemetry(_))));
    }

    #[test]
    fn bad_directive_is_rejected() {
        let config = GeneralConfig {
            log_level: "umi=verbose".into(),
            log_format: "pretty".into(),
        };
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(init_tracing(&config).is_err());
        }
    }
}
