//! Actuator commands
//!
//! Outbound commands understood by the sensor board firmware.

use serde::{Deserialize, Serialize};

/// Commands that drive the board's actuator output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActuatorCommand {
    /// Switch the actuator on ('1')
    On,

    /// Switch the actuator off ('0')
    Off,
}

impl ActuatorCommand {
    /// Get the single command byte sent over the wire
    pub fn byte(&self) -> u8 {
        match self {
            ActuatorCommand::On => b'1',
            ActuatorCommand::Off => b'0',
        }
    }

    /// Decode a command byte received by the board (used by the demo board)
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'1' => Some(ActuatorCommand::On),
            b'0' => Some(ActuatorCommand::Off),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_bytes() {
        assert_eq!(ActuatorCommand::On.byte(), b'1');
        assert_eq!(ActuatorCommand::Off.byte(), b'0');
        assert_eq!(ActuatorCommand::from_byte(b'1'), Some(ActuatorCommand::On));
        assert_eq!(ActuatorCommand::from_byte(b'x'), None);
    }
}
