//! VISCA frame construction and reply decoding.
//!
//! VISCA is the binary RS-232 protocol spoken by Tandberg PrecisionHD and most
//! Sony-derived PTZ cameras. Every packet starts with an address byte and ends
//! with the terminator `0xFF`.
//!
//! # Packet Layout
//!
//! Controller to camera 1:
//!
//! ```text
//! 81 01 <category> <command> <args...> FF   command
//! 81 09 <category> <command> FF             inquiry
//! 88 30 01 FF                               address set (broadcast handshake)
//! ```
//!
//! Camera 1 to controller:
//!
//! ```text
//! 90 4y FF          acknowledge (y = socket)
//! 90 5y <data> FF   completion; inquiry data arrives on socket 0
//! 90 6y EE FF       error, EE = error code
//! 88 30 0n FF       address set reply, n = next free address
//! ```
//!
//! ## Position Encoding
//!
//! Positions travel as four nibbles `0p 0q 0r 0s`, most significant first.
//! Pan and tilt are signed 16-bit values; zoom and focus are unsigned.
//!
//! # Example
//!
//! ```
//! use tandyberg::motion::{Direction, SpeedLevel};
//! use tandyberg::visca;
//!
//! let frame = visca::start(Direction::PanLeft, SpeedLevel::default());
//! assert_eq!(frame.as_bytes(), &[0x81, 0x01, 0x06, 0x01, 0x06, 0x06, 0x01, 0x03, 0xFF]);
//! ```

use std::fmt;

use thiserror::Error;
use tracing::warn;

use crate::motion::{AxisGroup, Direction, SpeedLevel};

/// Packet terminator.
pub const TERMINATOR: u8 = 0xFF;

/// Longest packet either side sends.
pub const MAX_PACKET_LEN: usize = 16;

const COMMAND_HEADER: [u8; 2] = [0x81, 0x01];
const INQUIRY_HEADER: [u8; 2] = [0x81, 0x09];
const REPLY_ADDRESS: u8 = 0x90;

const PAN_LEFT: u8 = 0x01;
const PAN_RIGHT: u8 = 0x02;
const TILT_UP: u8 = 0x01;
const TILT_DOWN: u8 = 0x02;
const DRIVE_STOP: u8 = 0x03;

const ZOOM_STOP: u8 = 0x00;
const ZOOM_TELE: u8 = 0x02;
const ZOOM_WIDE: u8 = 0x03;

/// Errors decoding camera replies.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ViscaError {
    /// Packet did not look like any known reply.
    #[error("Unexpected reply: {0:02X?}")]
    UnexpectedReply(Vec<u8>),

    /// Inquiry payload had the wrong number of bytes.
    #[error("Payload has {actual} bytes, expected {expected}")]
    PayloadLength {
        /// Bytes the inquiry should return
        expected: usize,
        /// Bytes actually received
        actual: usize,
    },

    /// A position nibble byte had its high nibble set.
    #[error("Invalid position nibble {0:#04x}")]
    InvalidNibble(u8),
}

/// Result type for VISCA decoding.
pub type ViscaResult<T> = Result<T, ViscaError>;

/// A complete packet ready for the wire, terminator included.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Frame(Vec<u8>);

impl Frame {
    fn command(body: &[u8]) -> Self {
        Self::with_header(&COMMAND_HEADER, body)
    }

    fn inquiry(body: &[u8]) -> Self {
        Self::with_header(&INQUIRY_HEADER, body)
    }

    fn with_header(header: &[u8], body: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(header.len() + body.len() + 1);
        bytes.extend_from_slice(header);
        bytes.extend_from_slice(body);
        bytes.push(TERMINATOR);
        Self(bytes)
    }

    /// Raw bytes including header and terminator.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Bytes between the two-byte header and the terminator.
    ///
    /// Empty for packets that are not camera commands or inquiries.
    pub fn body(&self) -> &[u8] {
        if self.is_command() || self.is_inquiry() {
            &self.0[2..self.0.len() - 1]
        } else {
            &[]
        }
    }

    /// True for `81 01 ...` packets.
    pub fn is_command(&self) -> bool {
        self.0.starts_with(&COMMAND_HEADER) && self.0.len() > 2
    }

    /// True for `81 09 ...` packets.
    pub fn is_inquiry(&self) -> bool {
        self.0.starts_with(&INQUIRY_HEADER) && self.0.len() > 2
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

/// Socket on which the camera answers inquiries and reports immediate errors.
///
/// Commands are acknowledged into sockets 1 and 2 and complete there later,
/// possibly while a different exchange is in progress.
pub const INQUIRY_SOCKET: u8 = 0;

/// A decoded camera reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Command accepted into `socket`.
    Ack { socket: u8 },
    /// `socket` finished; carries inquiry data (empty for commands).
    Completion { socket: u8, data: Vec<u8> },
    /// Camera refused the packet.
    Error { socket: u8, code: u8 },
}

impl Reply {
    /// Decode one terminated packet from camera 1.
    pub fn parse(packet: &[u8]) -> ViscaResult<Self> {
        let unexpected = || ViscaError::UnexpectedReply(packet.to_vec());

        if packet.len() < 3 || packet[0] != REPLY_ADDRESS || packet.last() != Some(&TERMINATOR) {
            return Err(unexpected());
        }

        let socket = packet[1] & 0x0F;
        let data = &packet[2..packet.len() - 1];
        match packet[1] & 0xF0 {
            0x40 if data.is_empty() => Ok(Reply::Ack { socket }),
            0x50 => Ok(Reply::Completion {
                socket,
                data: data.to_vec(),
            }),
            0x60 => data
                .first()
                .map(|&code| Reply::Error { socket, code })
                .ok_or_else(unexpected),
            _ => Err(unexpected()),
        }
    }

    /// True for the socket-0 completion that answers an inquiry.
    pub fn is_inquiry_answer(&self) -> bool {
        matches!(self, Reply::Completion { socket: INQUIRY_SOCKET, .. })
    }
}

/// Human-readable message for a VISCA error code.
pub fn error_message(code: u8) -> &'static str {
    match code {
        0x01 => "Message length error",
        0x02 => "Syntax error",
        0x03 => "Command buffer full",
        0x04 => "Command canceled",
        0x05 => "No socket",
        0x41 => "Command not executable",
        _ => "Unknown error",
    }
}

// ==================== Handshake ====================

/// Broadcast address-set packet used to probe for a camera.
pub fn address_set() -> Frame {
    Frame(vec![0x88, 0x30, 0x01, TERMINATOR])
}

/// True if `packet` is the reply a camera sends to [`address_set`].
pub fn is_address_reply(packet: &[u8]) -> bool {
    matches!(packet, [0x88, 0x30, next, TERMINATOR] if *next >= 0x02)
}

// ==================== Motion ====================

/// Drive `direction` until the matching [`stop`].
///
/// Steer frames embed the pan and tilt speed; zoom uses the standard rate.
pub fn start(direction: Direction, speed: SpeedLevel) -> Frame {
    match direction {
        Direction::PanLeft => steer(PAN_LEFT, DRIVE_STOP, speed),
        Direction::PanRight => steer(PAN_RIGHT, DRIVE_STOP, speed),
        Direction::TiltUp => steer(DRIVE_STOP, TILT_UP, speed),
        Direction::TiltDown => steer(DRIVE_STOP, TILT_DOWN, speed),
        Direction::ZoomIn => zoom(ZOOM_TELE),
        Direction::ZoomOut => zoom(ZOOM_WIDE),
    }
}

/// Stop every drive in `group`.
pub fn stop(group: AxisGroup, speed: SpeedLevel) -> Frame {
    match group {
        AxisGroup::Steer => steer(DRIVE_STOP, DRIVE_STOP, speed),
        AxisGroup::Zoom => zoom(ZOOM_STOP),
    }
}

fn steer(pan: u8, tilt: u8, speed: SpeedLevel) -> Frame {
    let v = speed.wire();
    Frame::command(&[0x06, 0x01, v, v, pan, tilt])
}

fn zoom(op: u8) -> Frame {
    Frame::command(&[0x04, 0x07, op])
}

/// Latch the pan/tilt speed used by subsequent drives.
pub fn speed(level: SpeedLevel) -> Frame {
    let v = level.wire();
    Frame::command(&[0x06, 0x11, v, v])
}

// ==================== Focus ====================

/// Switch between autofocus (`true`) and manual focus.
pub fn autofocus(enabled: bool) -> Frame {
    Frame::command(&[0x04, 0x38, if enabled { 0x02 } else { 0x03 }])
}

/// Move focus to an absolute position.
pub fn focus_direct(value: i32) -> Frame {
    position_command(&[0x04, 0x48], clamp_unsigned(value, "focus"))
}

/// Query the focus position.
pub fn focus_inquiry() -> Frame {
    Frame::inquiry(&[0x04, 0x48])
}

// ==================== Absolute Position ====================

/// Move zoom to an absolute position.
pub fn zoom_direct(value: i32) -> Frame {
    position_command(&[0x04, 0x47], clamp_unsigned(value, "zoom"))
}

/// Move pan and tilt to absolute positions at `speed`.
pub fn pan_tilt_absolute(pan: i32, tilt: i32, speed: SpeedLevel) -> Frame {
    let v = speed.wire();
    let mut body = vec![0x06, 0x02, v, v];
    body.extend_from_slice(&encode_nibbles(clamp_signed(pan, "pan") as u16));
    body.extend_from_slice(&encode_nibbles(clamp_signed(tilt, "tilt") as u16));
    Frame::command(&body)
}

/// Query the zoom position.
pub fn zoom_inquiry() -> Frame {
    Frame::inquiry(&[0x04, 0x47])
}

/// Query pan and tilt positions together.
pub fn pan_tilt_inquiry() -> Frame {
    Frame::inquiry(&[0x06, 0x12])
}

fn position_command(prefix: &[u8], value: u16) -> Frame {
    let mut body = prefix.to_vec();
    body.extend_from_slice(&encode_nibbles(value));
    Frame::command(&body)
}

// ==================== Payload Codec ====================

/// Split a 16-bit value into four `0x0N` bytes, most significant first.
pub fn encode_nibbles(value: u16) -> [u8; 4] {
    [
        ((value >> 12) & 0x0F) as u8,
        ((value >> 8) & 0x0F) as u8,
        ((value >> 4) & 0x0F) as u8,
        (value & 0x0F) as u8,
    ]
}

/// Join four `0x0N` bytes back into a 16-bit value.
pub fn decode_nibbles(nibbles: &[u8]) -> ViscaResult<u16> {
    if nibbles.len() != 4 {
        return Err(ViscaError::PayloadLength {
            expected: 4,
            actual: nibbles.len(),
        });
    }
    nibbles.iter().try_fold(0u16, |acc, &n| {
        if n > 0x0F {
            Err(ViscaError::InvalidNibble(n))
        } else {
            Ok((acc << 4) | u16::from(n))
        }
    })
}

/// Decode a zoom or focus inquiry payload.
pub fn decode_position(payload: &[u8]) -> ViscaResult<i32> {
    decode_nibbles(payload).map(i32::from)
}

/// Decode a pan/tilt inquiry payload into `(pan, tilt)`.
pub fn decode_pan_tilt(payload: &[u8]) -> ViscaResult<(i32, i32)> {
    if payload.len() != 8 {
        return Err(ViscaError::PayloadLength {
            expected: 8,
            actual: payload.len(),
        });
    }
    let pan = decode_nibbles(&payload[..4])? as i16;
    let tilt = decode_nibbles(&payload[4..])? as i16;
    Ok((i32::from(pan), i32::from(tilt)))
}

fn clamp_unsigned(value: i32, what: &str) -> u16 {
    let clamped = value.clamp(0, i32::from(u16::MAX));
    if clamped != value {
        warn!("{what} {value} outside 0..={}, clamped to {clamped}", u16::MAX);
    }
    clamped as u16
}

fn clamp_signed(value: i32, what: &str) -> i16 {
    let clamped = value.clamp(i32::from(i16::MIN), i32::from(i16::MAX));
    if clamped != value {
        warn!("{what} {value} outside i16 range, clamped to {clamped}");
    }
    clamped as i16
}
