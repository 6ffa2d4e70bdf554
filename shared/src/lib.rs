//! Wire contract for the remote-events UDP protocol.
//!
//! A datagram carries exactly one [`Packet`]: a protocol version, an
//! optional 32-bit client token (0 = none, the server falls back to an
//! address-derived identity) and a typed body. Packets are encoded with
//! bincode; anything that fails to decode, or carries the wrong protocol
//! version, is invalid and must be dropped by the receiver without side
//! effects.
//!
//! There is no delivery or ordering guarantee between datagrams. Clients
//! that care about liveness are expected to send [`PacketBody::Ping`] at
//! least once per server-side session timeout.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Version expected in every packet header. Bumped on breaking protocol
/// changes; the server drops packets from other versions.
pub const PROTOCOL_VERSION: u16 = 2;

/// Largest datagram the server will read. Anything longer is truncated by
/// the socket layer and will fail to decode.
pub const MAX_PACKET_SIZE: usize = 1024;

/// Default UDP port the event server listens on.
pub const DEFAULT_PORT: u16 = 9777;

/// Service-discovery protocol tag published alongside the bound port.
pub const PROTOCOL_TAG: &str = "_remote-events._udp";

/// Direct action requests name the dispatch path to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    /// Run a builtin command of the host application.
    ExecBuiltin,
    /// Dispatch a mapped button/keyboard action by name.
    Button,
}

/// Typed payload of a single datagram.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PacketBody {
    /// Introduces or renames the sending device.
    Hello { device_name: String },
    /// Keeps the session alive; carries nothing else.
    Ping,
    /// Asks the server to tear the session down.
    Bye,
    /// Button state change. `queue` selects between the two consumption
    /// models: queued buttons become one-shot dispatched actions named
    /// `button_name`, unqueued buttons update the held-button state that
    /// the host polls through the query surface.
    Button {
        map_name: String,
        button_name: String,
        code: u32,
        down: bool,
        queue: bool,
        amount: f32,
        axis: bool,
        joystick: bool,
    },
    /// Absolute pointer position, both axes normalized to 0..=1.
    Mouse { x: f32, y: f32 },
    /// Direct action request, bypassing button mapping.
    Action { kind: ActionKind, text: String },
}

/// One decoded datagram.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Packet {
    pub version: u16,
    /// Client-chosen session token; 0 means "none".
    pub token: u32,
    pub body: PacketBody,
}

/// Reasons a datagram is rejected before reaching any session.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed datagram: {0}")]
    Malformed(#[from] bincode::Error),
    #[error("unsupported protocol version {0}")]
    Version(u16),
}

impl Packet {
    /// Builds a packet for the current protocol version.
    pub fn new(token: u32, body: PacketBody) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            token,
            body,
        }
    }

    /// Decodes and validates one datagram.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let packet: Packet = bincode::deserialize(buf)?;
        if packet.version != PROTOCOL_VERSION {
            return Err(DecodeError::Version(packet.version));
        }
        Ok(packet)
    }

    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// The embedded token, or `None` when the sender left it at 0 and the
    /// server should derive identity from the source address instead.
    pub fn token(&self) -> Option<u32> {
        if self.token == 0 {
            None
        } else {
            Some(self.token)
        }
    }
}
