use serde::Deserialize;

use crate::session::ConnectionConfig;

/// Top-level configuration settings for the application.
///
/// Includes the broker credentials, the rover being driven, and logging.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub rover: RoverSettings,
    pub logging: LoggingSettings,
}

/// Where the broker lives and who we are to it. There are no defaults for
/// any of these.
#[derive(Deserialize, Clone, PartialEq, Eq)]
pub struct BrokerSettings {
    pub url: String,
    pub vpn: String,
    pub username: String,
    pub password: String,
}

impl BrokerSettings {
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig::new(
            self.url.clone(),
            self.vpn.clone(),
            self.username.clone(),
            self.password.clone(),
        )
    }
}

impl std::fmt::Debug for BrokerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerSettings")
            .field("url", &self.url)
            .field("vpn", &self.vpn)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Which rover to drive and how often to resend the current command.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RoverSettings {
    pub id: String,
    pub command_interval_ms: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Default, Deserialize)]
pub struct PartialSettings {
    pub broker: Option<PartialBrokerSettings>,
    pub rover: Option<PartialRoverSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialBrokerSettings {
    pub url: Option<String>,
    pub vpn: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialRoverSettings {
    pub id: Option<String>,
    pub command_interval_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl Default for RoverSettings {
    fn default() -> Self {
        Self {
            id: "rover1".to_string(),
            command_interval_ms: 250,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
