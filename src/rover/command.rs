use serde::{Deserialize, Serialize};

pub const THRUST_COMMAND: &str = "thrust";

/// Payload published on a rover's thrust command topic.
///
/// `command_param2` carries the joystick distance and `command_param3` the
/// heading in whole degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrustCommand {
    pub command_name: String,
    pub command_param1: String,
    pub command_param2: f64,
    pub command_param3: i32,
    pub command_param4: bool,
}

impl ThrustCommand {
    pub fn new(distance: f64, angle: i32) -> Self {
        Self {
            command_name: THRUST_COMMAND.to_string(),
            command_param1: String::new(),
            command_param2: distance,
            command_param3: normalize_angle(angle),
            command_param4: false,
        }
    }

    /// Zero thrust, straight ahead.
    pub fn idle() -> Self {
        Self::new(0.0, 0)
    }

    pub fn distance(&self) -> f64 {
        self.command_param2
    }

    pub fn angle(&self) -> i32 {
        self.command_param3
    }

    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl Default for ThrustCommand {
    fn default() -> Self {
        Self::idle()
    }
}

/// Folds any angle in degrees into (-180, 180].
pub fn normalize_angle(degrees: i32) -> i32 {
    let wrapped = degrees.rem_euclid(360);
    if wrapped > 180 { wrapped - 360 } else { wrapped }
}
