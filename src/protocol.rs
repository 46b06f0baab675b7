/*!
 # Wire protocols

 Encoders and decoders for the two firmware families. Everything here is
 pure: payloads go in and out as bytes, the transport is handled by
 [`crate::Light`].
*/

use std::time::Duration;

use uuid::Uuid;

use crate::color;
use crate::light::{DeviceState, PowerState};
use crate::{Error, Result};

/// Default time to wait for a state notification
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// KulerSky command/state characteristic
pub const KULERSKY_CHARACTERISTIC: Uuid = Uuid::from_u128(0x8d96b002_0002_64c2_0001_9acc4838521c);
/// KulerSky status byte for "on"
pub const KULERSKY_ON: u8 = 0x02;
/// KulerSky status byte for "off"
pub const KULERSKY_OFF: u8 = 0x32;
const KULERSKY_MIN_RESPONSE_LEN: usize = 4;

/// Zerproc command characteristic
pub const ZERPROC_COMMAND_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0x0000ffe9_0000_1000_8000_00805f9b34fb);
/// Zerproc notification characteristic
pub const ZERPROC_NOTIFY_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0x0000ffe4_0000_1000_8000_00805f9b34fb);
/// Zerproc status byte for "on"
pub const ZERPROC_ON: u8 = 0x23;
/// Zerproc status byte for "off"
pub const ZERPROC_OFF: u8 = 0x24;
pub const ZERPROC_TURN_ON_CMD: [u8; 3] = [0xcc, ZERPROC_ON, 0x33];
pub const ZERPROC_TURN_OFF_CMD: [u8; 3] = [0xcc, ZERPROC_OFF, 0x33];
pub const ZERPROC_QUERY_CMD: [u8; 3] = [0xef, 0x01, 0x77];
const ZERPROC_COLOR_TAG: u8 = 0x56;
const ZERPROC_COLOR_TRAILER: [u8; 3] = [0x00, 0xf0, 0xaa];
const ZERPROC_STATUS_OFFSET: usize = 2;
const ZERPROC_COLOR_OFFSET: usize = 6;
const ZERPROC_MIN_RESPONSE_LEN: usize = 9;

/// Firmware families, each with its own wire format and query strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Single characteristic, state read directly
    KulerSky,
    /// Command characteristic plus notify characteristic for state
    Zerproc,
}

/// Per-family configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// Characteristic commands are written to
    pub command_uuid: Uuid,
    /// Characteristic state arrives on (read for KulerSky, notify for Zerproc)
    pub state_uuid: Uuid,
    /// Advertised name prefix of this family
    pub name_prefix: &'static str,
    /// How long a notification-based query waits for its answer
    pub response_timeout: Duration,
}

impl Protocol {
    /// Get configuration for this family
    pub fn config(self) -> ProtocolConfig {
        match self {
            Protocol::KulerSky => ProtocolConfig {
                command_uuid: KULERSKY_CHARACTERISTIC,
                state_uuid: KULERSKY_CHARACTERISTIC,
                name_prefix: "KulerSky-",
                response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            },
            Protocol::Zerproc => ProtocolConfig {
                command_uuid: ZERPROC_COMMAND_CHARACTERISTIC,
                state_uuid: ZERPROC_NOTIFY_CHARACTERISTIC,
                name_prefix: "LEDBlue-",
                response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            },
        }
    }

    /// Infers the family from an advertised device name
    pub fn from_advertised_name(name: &str) -> Option<Protocol> {
        [Protocol::KulerSky, Protocol::Zerproc]
            .into_iter()
            .find(|protocol| name.starts_with(protocol.config().name_prefix))
    }

    /// Whether state queries go through the notification mailbox
    pub fn uses_notifications(self) -> bool {
        matches!(self, Protocol::Zerproc)
    }

    /// Get the family name as string
    pub fn name(self) -> &'static str {
        match self {
            Protocol::KulerSky => "KulerSky",
            Protocol::Zerproc => "Zerproc",
        }
    }

    /// Payload turning the light on.
    ///
    /// KulerSky carries the color in the same payload, so `color` is the
    /// color to keep showing. Zerproc ignores it.
    pub fn encode_turn_on(self, color: (u8, u8, u8)) -> Vec<u8> {
        match self {
            Protocol::KulerSky => kulersky_payload(KULERSKY_ON, color),
            Protocol::Zerproc => ZERPROC_TURN_ON_CMD.to_vec(),
        }
    }

    /// Payload turning the light off. See [`Protocol::encode_turn_on`] for `color`.
    pub fn encode_turn_off(self, color: (u8, u8, u8)) -> Vec<u8> {
        match self {
            Protocol::KulerSky => kulersky_payload(KULERSKY_OFF, color),
            Protocol::Zerproc => ZERPROC_TURN_OFF_CMD.to_vec(),
        }
    }

    /// Payload setting a (non-black) color, channels in 0-255
    pub fn encode_set_color(self, color: (u8, u8, u8)) -> Vec<u8> {
        match self {
            Protocol::KulerSky => kulersky_payload(KULERSKY_ON, color),
            Protocol::Zerproc => {
                let (r, g, b) = color::zerproc_encode(color.0, color.1, color.2);
                let mut payload = vec![ZERPROC_COLOR_TAG, r, g, b];
                payload.extend_from_slice(&ZERPROC_COLOR_TRAILER);
                payload
            }
        }
    }

    /// Payload that asks for a state notification, if the family uses one
    pub fn encode_query(self) -> Option<Vec<u8>> {
        match self {
            Protocol::KulerSky => None,
            Protocol::Zerproc => Some(ZERPROC_QUERY_CMD.to_vec()),
        }
    }

    /// Decodes a state read (KulerSky) or notification (Zerproc).
    ///
    /// Unrecognized status bytes decode to [`PowerState::Unknown`]; only a
    /// payload too short to hold a color is an error.
    pub fn decode_state(self, payload: &[u8]) -> Result<DeviceState> {
        match self {
            Protocol::KulerSky => {
                if payload.len() < KULERSKY_MIN_RESPONSE_LEN {
                    return Err(short_payload(self, payload, KULERSKY_MIN_RESPONSE_LEN));
                }
                let is_on = power_state(payload[0], KULERSKY_ON, KULERSKY_OFF);
                Ok(DeviceState::new(is_on, (payload[1], payload[2], payload[3])))
            }
            Protocol::Zerproc => {
                if payload.len() < ZERPROC_MIN_RESPONSE_LEN {
                    return Err(short_payload(self, payload, ZERPROC_MIN_RESPONSE_LEN));
                }
                let is_on = power_state(payload[ZERPROC_STATUS_OFFSET], ZERPROC_ON, ZERPROC_OFF);
                let native = &payload[ZERPROC_COLOR_OFFSET..ZERPROC_COLOR_OFFSET + 3];
                let color = color::zerproc_decode(native[0], native[1], native[2]);
                Ok(DeviceState::new(is_on, color))
            }
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn kulersky_payload(status: u8, (r, g, b): (u8, u8, u8)) -> Vec<u8> {
    vec![status, r, g, b, color::kulersky_redundant_channel(r, g, b)]
}

fn power_state(status: u8, on: u8, off: u8) -> PowerState {
    if status == on {
        PowerState::On
    } else if status == off {
        PowerState::Off
    } else {
        PowerState::Unknown
    }
}

fn short_payload(protocol: Protocol, payload: &[u8], expected: usize) -> Error {
    Error::Communication(format!(
        "{} state response too short: got {} bytes {:02x?}, expected at least {}",
        protocol,
        payload.len(),
        payload,
        expected
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kulersky_white_sets_redundant_channel() {
        assert_eq!(
            Protocol::KulerSky.encode_set_color((255, 255, 255)),
            vec![KULERSKY_ON, 255, 255, 255, 255]
        );
        assert_eq!(
            Protocol::KulerSky.encode_set_color((255, 255, 0)),
            vec![KULERSKY_ON, 255, 255, 0, 0]
        );
    }

    #[test]
    fn kulersky_decode_ignores_redundant_channel() {
        let state = Protocol::KulerSky
            .decode_state(&[KULERSKY_ON, 10, 20, 30, 255])
            .unwrap();
        assert_eq!(state, DeviceState::new(PowerState::On, (10, 20, 30)));

        let state = Protocol::KulerSky
            .decode_state(&[KULERSKY_OFF, 10, 20, 30, 0])
            .unwrap();
        assert_eq!(state, DeviceState::new(PowerState::Off, (10, 20, 30)));
    }

    #[test]
    fn kulersky_on_and_off_carry_color() {
        assert_eq!(
            Protocol::KulerSky.encode_turn_on((1, 2, 3)),
            vec![0x02, 1, 2, 3, 0]
        );
        assert_eq!(
            Protocol::KulerSky.encode_turn_off((255, 255, 255)),
            vec![0x32, 255, 255, 255, 255]
        );
        assert_eq!(Protocol::KulerSky.encode_query(), None);
    }

    #[test]
    fn zerproc_fixed_commands() {
        assert_eq!(Protocol::Zerproc.encode_turn_on((9, 9, 9)), vec![0xcc, 0x23, 0x33]);
        assert_eq!(Protocol::Zerproc.encode_turn_off((9, 9, 9)), vec![0xcc, 0x24, 0x33]);
        assert_eq!(Protocol::Zerproc.encode_query(), Some(vec![0xef, 0x01, 0x77]));
    }

    #[test]
    fn zerproc_set_color_frame() {
        assert_eq!(
            Protocol::Zerproc.encode_set_color((255, 128, 1)),
            vec![0x56, 255, 16, 1, 0x00, 0xf0, 0xaa]
        );
    }

    #[test]
    fn zerproc_decode_expands_native_range() {
        let payload = [0x66, 0xe3, ZERPROC_ON, 0x00, 0x00, 0x00, 31, 16, 0, 0x99];
        let state = Protocol::Zerproc.decode_state(&payload).unwrap();
        assert_eq!(state, DeviceState::new(PowerState::On, (255, 131, 0)));
    }

    #[test]
    fn unknown_status_is_not_an_error() {
        let state = Protocol::KulerSky.decode_state(&[0x77, 1, 2, 3, 0]).unwrap();
        assert_eq!(state.is_on, PowerState::Unknown);

        let payload = [0, 0, 0x42, 0, 0, 0, 1, 2, 3];
        let state = Protocol::Zerproc.decode_state(&payload).unwrap();
        assert_eq!(state.is_on, PowerState::Unknown);
    }

    #[test]
    fn short_payload_is_a_communication_error() {
        assert!(matches!(
            Protocol::KulerSky.decode_state(&[KULERSKY_ON, 1]),
            Err(Error::Communication(_))
        ));
        assert!(matches!(
            Protocol::Zerproc.decode_state(&[0, 0, ZERPROC_ON, 0, 0, 0, 1, 2]),
            Err(Error::Communication(_))
        ));
    }

    #[test]
    fn family_from_advertised_name() {
        assert_eq!(
            Protocol::from_advertised_name("KulerSky-1a2b"),
            Some(Protocol::KulerSky)
        );
        assert_eq!(
            Protocol::from_advertised_name("LEDBlue-ABCD"),
            Some(Protocol::Zerproc)
        );
        assert_eq!(Protocol::from_advertised_name("ELK-BLEDOM"), None);
    }
}
