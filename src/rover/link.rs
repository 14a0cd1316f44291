use std::sync::Arc;

use tracing::{debug, warn};

use super::command::ThrustCommand;
use crate::session::{BrokerSession, Response, ResultCode};
use crate::transport::InboundMessage;

pub fn commands_topic(rover_id: &str) -> String {
    format!("iot/rovers/{rover_id}/commands/thrust")
}

pub fn telemetry_topic(rover_id: &str) -> String {
    format!("iot/rovers/{rover_id}/gps/events/reading")
}

/// A [`BrokerSession`] bound to one rover.
#[derive(Debug, Clone)]
pub struct RoverLink {
    session: BrokerSession,
    rover_id: String,
}

impl RoverLink {
    pub fn new(session: BrokerSession, rover_id: impl Into<String>) -> Self {
        Self {
            session,
            rover_id: rover_id.into(),
        }
    }

    pub fn session(&self) -> &BrokerSession {
        &self.session
    }

    pub fn rover_id(&self) -> &str {
        &self.rover_id
    }

    /// Publishes `command` on the rover's thrust topic. Nothing is sent
    /// unless the session is connected.
    pub fn send_thrust(&self, command: &ThrustCommand) -> Response {
        if !self.session.is_connected() {
            return Response::new(
                ResultCode::NoActiveSession,
                "cannot send thrust command while not connected",
            );
        }

        let payload = match command.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "failed to encode thrust command");
                return Response::new(ResultCode::UnexpectedFailure, e.to_string());
            }
        };
        debug!(rover = %self.rover_id, distance = command.distance(), angle = command.angle(), "sending thrust");
        self.session.publish(&commands_topic(&self.rover_id), payload)
    }

    /// Subscribes `on_reading` to the rover's GPS telemetry.
    pub fn watch_telemetry<F>(&self, on_reading: F) -> Response
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.session
            .subscribe_with(&telemetry_topic(&self.rover_id), Arc::new(on_reading))
    }

    pub fn stop_telemetry(&self) -> Response {
        self.session.unsubscribe(&telemetry_topic(&self.rover_id))
    }
}
