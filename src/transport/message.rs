use serde::{Deserialize, Serialize};

use super::event::DeliveryMode;

/// Frames sent from this client to the broker.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    #[serde(rename = "login")]
    Login {
        vpn: String,
        username: String,
        password: String,
        client_name: String,
    },
    #[serde(rename = "subscribe")]
    Subscribe {
        topic: String,
        correlation_key: String,
        confirm: bool,
        timeout_ms: u64,
    },
    #[serde(rename = "unsubscribe")]
    Unsubscribe {
        topic: String,
        correlation_key: String,
        confirm: bool,
    },
    #[serde(rename = "publish")]
    Publish {
        topic: String,
        payload: String,
        correlation_key: String,
        delivery_mode: DeliveryMode,
    },
}

/// Frames received from the broker.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    #[serde(rename = "authenticated")]
    Authenticated {},
    #[serde(rename = "error")]
    Error { message: String },
    #[serde(rename = "subscription_ok")]
    SubscriptionOk { correlation_key: Option<String> },
    #[serde(rename = "subscription_error")]
    SubscriptionError {
        correlation_key: Option<String>,
        message: String,
    },
    #[serde(rename = "message")]
    Message {
        topic: String,
        payload: String,
        timestamp: i64,
    },
    #[serde(rename = "ack")]
    Ack { correlation_key: Option<String> },
    #[serde(rename = "rejected")]
    Rejected {
        correlation_key: Option<String>,
        message: String,
    },
}
