use std::fmt;

/// Where and how to reach the broker. Every field is required.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// WebSocket endpoint, e.g. `wss://broker.example.com:443`.
    pub url: String,
    /// Routing domain (message VPN) on the broker.
    pub vpn_name: String,
    pub username: String,
    pub password: String,
}

impl ConnectionConfig {
    pub fn new(
        url: impl Into<String>,
        vpn_name: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            vpn_name: vpn_name.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("url", &self.url)
            .field("vpn_name", &self.vpn_name)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
        };
        f.write_str(name)
    }
}
