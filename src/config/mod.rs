//! The `config` module loads runtime settings.
//!
//! Sources, later ones winning:
//! - `config/default.{toml,json,yaml,...}` relative to the working directory
//!   (optional)
//! - environment variables prefixed with `ROVERLINK_`, nested keys joined by
//!   `__`, e.g. `ROVERLINK_BROKER__URL` or `ROVERLINK_ROVER__COMMAND_INTERVAL_MS`
//!
//! Rover and logging settings fall back to defaults. Broker settings have
//! none; a missing one is an error.

mod settings;

use config::{Config, Environment, File};

use crate::utils::error::SettingsError;
use settings::PartialSettings;

pub use settings::{BrokerSettings, LoggingSettings, RoverSettings, Settings};

pub const ENV_PREFIX: &str = "ROVERLINK";

/// Loads the configuration from the default file and environment variables
/// and merges it with default values.
pub fn load_config() -> Result<Settings, SettingsError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__"),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    let broker = partial.broker.unwrap_or_default();
    let rover = partial.rover.unwrap_or_default();
    let logging = partial.logging.unwrap_or_default();
    let default_rover = RoverSettings::default();
    let default_logging = LoggingSettings::default();

    Ok(Settings {
        broker: BrokerSettings {
            url: broker.url.ok_or(SettingsError::Missing("broker.url"))?,
            vpn: broker.vpn.ok_or(SettingsError::Missing("broker.vpn"))?,
            username: broker
                .username
                .ok_or(SettingsError::Missing("broker.username"))?,
            password: broker
                .password
                .ok_or(SettingsError::Missing("broker.password"))?,
        },
        rover: RoverSettings {
            id: rover.id.unwrap_or(default_rover.id),
            command_interval_ms: rover
                .command_interval_ms
                .unwrap_or(default_rover.command_interval_ms),
        },
        logging: LoggingSettings {
            level: logging.level.unwrap_or(default_logging.level),
        },
    })
}
