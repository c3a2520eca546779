//! Transport seam between the controller and the physical serial link.
//!
//! A [`Transport`] is a single exclusively-owned byte channel. It can list
//! candidate interfaces, probe one for a camera (binding it on success), and
//! exchange frames with the bound camera. Callers above this layer serialize
//! access; see [`ConnectionManager`](crate::connection::ConnectionManager).
//!
//! [`SerialTransport`] implements the seam over RS-232 with the `serialport`
//! crate. Tests use [`MockTransport`](crate::mock::MockTransport).
//!
//! # Example
//!
//! ```no_run
//! use tandyberg::transport::{InterfaceId, SerialTransport, Transport};
//! use tandyberg::visca;
//!
//! let mut transport = SerialTransport::default();
//! for interface in transport.list_candidates() {
//!     if transport.probe(&interface) {
//!         println!("Camera on {interface}");
//!         let focus = transport.query(&visca::focus_inquiry())?;
//!         println!("Focus payload: {focus:02X?}");
//!         break;
//!     }
//! }
//! # Ok::<(), tandyberg::transport::TransportError>(())
//! ```

use std::fmt;
use std::io::{self, Read, Write};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serialport::{ClearBuffer, SerialPort};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::visca::{self, Frame, Reply, INQUIRY_SOCKET, MAX_PACKET_LEN, TERMINATOR};

/// Default baud rate for Tandberg PrecisionHD cameras.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default bound on every read.
const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Stray packets tolerated while waiting for the reply to one frame.
const MAX_STRAY_PACKETS: usize = 4;

/// Identifies a physical serial endpoint, e.g. `/dev/ttyUSB0` or `COM3`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InterfaceId(String);

impl InterfaceId {
    /// Wrap an OS port name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The OS port name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InterfaceId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for InterfaceId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Failures raised by a transport.
///
/// The connection manager absorbs all of these: the link is demoted to
/// disconnected and callers see [`ControlError::NotConnected`](crate::error::ControlError::NotConnected).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No complete reply within the read timeout.
    #[error("Timeout waiting for camera reply")]
    Timeout,

    /// Read or write failed, or the reply could not be understood.
    #[error("I/O failure: {0}")]
    IoFailure(String),

    /// No interface is bound, or the device went away.
    #[error("Interface disconnected")]
    Disconnected,
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportError::Timeout,
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::NotFound => TransportError::Disconnected,
            _ => TransportError::IoFailure(e.to_string()),
        }
    }
}

impl From<serialport::Error> for TransportError {
    fn from(e: serialport::Error) -> Self {
        match e.kind() {
            serialport::ErrorKind::NoDevice => TransportError::Disconnected,
            serialport::ErrorKind::Io(kind) => io::Error::new(kind, e.description).into(),
            _ => TransportError::IoFailure(e.to_string()),
        }
    }
}

impl From<visca::ViscaError> for TransportError {
    fn from(e: visca::ViscaError) -> Self {
        TransportError::IoFailure(e.to_string())
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// A single exclusively-owned channel to at most one camera.
pub trait Transport: Send {
    /// Enumerate interfaces that might host a camera.
    ///
    /// Order is stable between calls but carries no meaning.
    fn list_candidates(&self) -> Vec<InterfaceId>;

    /// Open `interface` and perform the handshake.
    ///
    /// Returns `true` iff a well-formed camera reply arrived within the
    /// timeout, in which case the interface stays bound. Any previous binding
    /// is released first.
    fn probe(&mut self, interface: &InterfaceId) -> bool;

    /// Send one command frame to the bound camera and consume its acknowledgement.
    fn send(&mut self, frame: &Frame) -> TransportResult<()>;

    /// Send one inquiry frame and return the completion payload.
    fn query(&mut self, frame: &Frame) -> TransportResult<Vec<u8>>;

    /// Release the bound interface, if any.
    fn close(&mut self);
}

/// Serial line parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialSettings {
    /// Line speed in baud
    pub baud_rate: u32,
    /// Bound on each read, including the probe handshake
    pub timeout: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// VISCA over an RS-232 port.
///
/// Holds at most one open port. Each exchange discards stale input and then
/// runs [`exchange_command`] or [`exchange_inquiry`] on the port.
pub struct SerialTransport {
    settings: SerialSettings,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    /// Create an unbound transport.
    pub fn new(settings: SerialSettings) -> Self {
        Self {
            settings,
            port: None,
        }
    }

    /// Line parameters in use.
    pub fn settings(&self) -> SerialSettings {
        self.settings
    }

    fn open(&self, interface: &InterfaceId) -> TransportResult<Box<dyn SerialPort>> {
        let port = serialport::new(interface.as_str(), self.settings.baud_rate)
            .timeout(self.settings.timeout)
            .open()?;
        debug!("Opened {} at {} baud", interface, self.settings.baud_rate);
        Ok(port)
    }

    fn bound_port(&mut self) -> TransportResult<&mut Box<dyn SerialPort>> {
        self.port.as_mut().ok_or(TransportError::Disconnected)
    }
}

impl Default for SerialTransport {
    fn default() -> Self {
        Self::new(SerialSettings::default())
    }
}

impl Transport for SerialTransport {
    fn list_candidates(&self) -> Vec<InterfaceId> {
        match serialport::available_ports() {
            Ok(ports) => ports
                .into_iter()
                .map(|p| InterfaceId::new(p.port_name))
                .collect(),
            Err(e) => {
                warn!("Failed to enumerate serial ports: {e}");
                Vec::new()
            }
        }
    }

    fn probe(&mut self, interface: &InterfaceId) -> bool {
        self.close();

        let mut port = match self.open(interface) {
            Ok(port) => port,
            Err(e) => {
                debug!("Probe {interface}: {e}");
                return false;
            }
        };

        match handshake(&mut *port) {
            Ok(true) => {
                self.port = Some(port);
                true
            }
            Ok(false) => {
                debug!("Probe {interface}: no camera reply");
                false
            }
            Err(e) => {
                debug!("Probe {interface}: {e}");
                false
            }
        }
    }

    fn send(&mut self, frame: &Frame) -> TransportResult<()> {
        let port = self.bound_port()?;
        port.clear(ClearBuffer::Input)?;
        exchange_command(&mut **port, frame)
    }

    fn query(&mut self, frame: &Frame) -> TransportResult<Vec<u8>> {
        let port = self.bound_port()?;
        port.clear(ClearBuffer::Input)?;
        exchange_inquiry(&mut **port, frame)
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!("Serial port closed");
        }
    }
}

/// Send the address-set broadcast and wait for a camera to answer it.
///
/// Returns `Ok(false)` if only unrelated packets arrive.
pub fn handshake<P: Read + Write + ?Sized>(port: &mut P) -> TransportResult<bool> {
    write_frame(port, &visca::address_set())?;
    for _ in 0..MAX_STRAY_PACKETS {
        let packet = read_packet(port)?;
        if visca::is_address_reply(&packet) {
            return Ok(true);
        }
        trace!("Ignoring packet during handshake: {:02X?}", packet);
    }
    Ok(false)
}

/// Write a command frame and consume the reply that settles it.
///
/// An ACK on any socket or an immediate socket-0 completion settles the
/// command. A camera error is logged and also settles it. Completions from
/// other sockets belong to earlier commands and are skipped.
pub fn exchange_command<P: Read + Write + ?Sized>(
    port: &mut P,
    frame: &Frame,
) -> TransportResult<()> {
    write_frame(port, frame)?;

    for _ in 0..MAX_STRAY_PACKETS {
        let packet = read_packet(port)?;
        match Reply::parse(&packet) {
            Ok(Reply::Ack { .. }) => return Ok(()),
            Ok(reply) if reply.is_inquiry_answer() => return Ok(()),
            Ok(Reply::Error { code, .. }) => {
                // The camera arbitrates; a refused command is not a link failure
                warn!(
                    "Camera refused {}: {} ({code:#04x})",
                    frame,
                    visca::error_message(code)
                );
                return Ok(());
            }
            _ => trace!("Ignoring stray packet: {:02X?}", packet),
        }
    }
    Err(TransportError::IoFailure(format!("No reply to {frame}")))
}

/// Write an inquiry frame and return the payload of its socket-0 completion.
///
/// ACKs, and completions or errors on command sockets, are skipped. A
/// socket-0 error means the inquiry was refused and carries no payload.
pub fn exchange_inquiry<P: Read + Write + ?Sized>(
    port: &mut P,
    frame: &Frame,
) -> TransportResult<Vec<u8>> {
    write_frame(port, frame)?;

    for _ in 0..MAX_STRAY_PACKETS {
        let packet = read_packet(port)?;
        match Reply::parse(&packet) {
            Ok(Reply::Completion {
                socket: INQUIRY_SOCKET,
                data,
            }) => return Ok(data),
            Ok(Reply::Error {
                socket: INQUIRY_SOCKET,
                code,
            }) => {
                return Err(TransportError::IoFailure(format!(
                    "Camera refused {}: {} ({code:#04x})",
                    frame,
                    visca::error_message(code)
                )))
            }
            _ => trace!("Ignoring stray packet: {:02X?}", packet),
        }
    }
    Err(TransportError::IoFailure(format!("No reply to {frame}")))
}

/// Write one frame and flush.
pub fn write_frame<W: Write + ?Sized>(writer: &mut W, frame: &Frame) -> TransportResult<()> {
    debug!("VISCA send: {frame}");
    writer.write_all(frame.as_bytes())?;
    writer.flush()?;
    Ok(())
}

/// Read bytes up to and including the next terminator.
///
/// A read returning zero bytes is treated as a timeout. Packets longer than
/// [`MAX_PACKET_LEN`] are rejected.
pub fn read_packet<R: Read + ?Sized>(reader: &mut R) -> TransportResult<Vec<u8>> {
    let mut buf = [0u8; 1];
    let mut packet = Vec::with_capacity(MAX_PACKET_LEN);

    loop {
        match reader.read(&mut buf) {
            Ok(0) => return Err(TransportError::Timeout),
            Ok(_) => {
                packet.push(buf[0]);
                if buf[0] == TERMINATOR {
                    trace!("VISCA recv: {:02X?}", packet);
                    return Ok(packet);
                }
                if packet.len() >= MAX_PACKET_LEN {
                    return Err(TransportError::IoFailure(format!(
                        "Unterminated packet: {packet:02X?}"
                    )));
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// In-memory port: reads come from a fixed script, writes are captured.
    struct ScriptedPort {
        input: Cursor<Vec<u8>>,
        written: Vec<u8>,
    }

    impl ScriptedPort {
        fn new(packets: &[&[u8]]) -> Self {
            Self {
                input: Cursor::new(packets.concat()),
                written: Vec::new(),
            }
        }

        fn repeating(packet: &[u8], times: usize) -> Self {
            Self::new(&vec![packet; times])
        }
    }

    impl Read for ScriptedPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for ScriptedPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_command_settled_by_ack() {
        let frame = visca::autofocus(true);
        let mut port = ScriptedPort::new(&[&[0x90, 0x41, 0xFF], &[0x90, 0x51, 0xFF]]);

        assert_eq!(exchange_command(&mut port, &frame), Ok(()));
        assert_eq!(port.written, frame.as_bytes());
    }

    #[test]
    fn test_command_error_reply_is_delivered() {
        let mut port = ScriptedPort::new(&[&[0x90, 0x61, 0x41, 0xFF]]);
        assert_eq!(exchange_command(&mut port, &visca::autofocus(false)), Ok(()));
    }

    #[test]
    fn test_command_skips_stray_packets() {
        let mut port = ScriptedPort::new(&[
            &[0x01, 0x02, 0xFF],
            &[0x90, 0x52, 0xFF],
            &[0x90, 0x42, 0xFF],
        ]);
        assert_eq!(exchange_command(&mut port, &visca::autofocus(true)), Ok(()));
    }

    #[test]
    fn test_command_without_reply_fails() {
        let mut port = ScriptedPort::repeating(&[0x01, 0xFF], MAX_STRAY_PACKETS);
        assert!(matches!(
            exchange_command(&mut port, &visca::autofocus(true)),
            Err(TransportError::IoFailure(_))
        ));

        let mut silent = ScriptedPort::new(&[]);
        assert_eq!(
            exchange_command(&mut silent, &visca::autofocus(true)),
            Err(TransportError::Timeout)
        );
    }

    #[test]
    fn test_inquiry_returns_socket_zero_payload() {
        let frame = visca::focus_inquiry();
        let mut port = ScriptedPort::new(&[&[0x90, 0x50, 0x00, 0x00, 0x01, 0x02, 0xFF]]);

        assert_eq!(exchange_inquiry(&mut port, &frame), Ok(vec![0x00, 0x00, 0x01, 0x02]));
        assert_eq!(port.written, frame.as_bytes());
    }

    #[test]
    fn test_inquiry_skips_late_command_completion() {
        let mut port = ScriptedPort::new(&[
            &[0x90, 0x51, 0xFF],
            &[0x90, 0x50, 0x00, 0x00, 0x01, 0x02, 0xFF],
        ]);
        assert_eq!(
            exchange_inquiry(&mut port, &visca::focus_inquiry()),
            Ok(vec![0x00, 0x00, 0x01, 0x02])
        );
    }

    #[test]
    fn test_inquiry_skips_ack_and_command_errors() {
        let mut port = ScriptedPort::new(&[
            &[0x90, 0x41, 0xFF],
            &[0x90, 0x62, 0x41, 0xFF],
            &[0xAA, 0xFF],
            &[0x90, 0x50, 0x03, 0x04, 0x05, 0x06, 0xFF],
        ]);
        assert_eq!(
            exchange_inquiry(&mut port, &visca::focus_inquiry()),
            Ok(vec![0x03, 0x04, 0x05, 0x06])
        );
    }

    #[test]
    fn test_inquiry_error_reply_fails() {
        let mut port = ScriptedPort::new(&[&[0x90, 0x60, 0x02, 0xFF]]);
        assert!(matches!(
            exchange_inquiry(&mut port, &visca::focus_inquiry()),
            Err(TransportError::IoFailure(_))
        ));
    }

    #[test]
    fn test_inquiry_without_answer_fails() {
        let mut port = ScriptedPort::repeating(&[0x90, 0x51, 0xFF], MAX_STRAY_PACKETS);
        assert!(matches!(
            exchange_inquiry(&mut port, &visca::focus_inquiry()),
            Err(TransportError::IoFailure(_))
        ));
    }

    #[test]
    fn test_handshake() {
        let mut port = ScriptedPort::new(&[&[0x90, 0x41, 0xFF], &[0x88, 0x30, 0x02, 0xFF]]);
        assert_eq!(handshake(&mut port), Ok(true));
        assert_eq!(port.written, vec![0x88, 0x30, 0x01, 0xFF]);

        let mut wrong = ScriptedPort::repeating(&[0x90, 0x41, 0xFF], MAX_STRAY_PACKETS);
        assert_eq!(handshake(&mut wrong), Ok(false));
    }

    #[test]
    fn test_read_packet_splits_on_terminator() {
        let mut cursor = Cursor::new(vec![0x90, 0x41, 0xFF, 0x90, 0x51, 0xFF]);
        assert_eq!(read_packet(&mut cursor).unwrap(), vec![0x90, 0x41, 0xFF]);
        assert_eq!(read_packet(&mut cursor).unwrap(), vec![0x90, 0x51, 0xFF]);
        assert_eq!(read_packet(&mut cursor), Err(TransportError::Timeout));
    }

    #[test]
    fn test_read_packet_rejects_overlong() {
        let mut cursor = Cursor::new(vec![0x01; MAX_PACKET_LEN + 4]);
        assert!(matches!(
            read_packet(&mut cursor),
            Err(TransportError::IoFailure(_))
        ));
    }

    #[test]
    fn test_write_frame() {
        let mut out = Vec::new();
        write_frame(&mut out, &visca::address_set()).unwrap();
        assert_eq!(out, vec![0x88, 0x30, 0x01, 0xFF]);
    }

    #[test]
    fn test_io_error_mapping() {
        let timeout = io::Error::new(io::ErrorKind::TimedOut, "slow");
        assert_eq!(TransportError::from(timeout), TransportError::Timeout);

        let gone = io::Error::new(io::ErrorKind::BrokenPipe, "unplugged");
        assert_eq!(TransportError::from(gone), TransportError::Disconnected);

        let other = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert!(matches!(
            TransportError::from(other),
            TransportError::IoFailure(_)
        ));
    }

    #[test]
    fn test_unbound_serial_transport_fails_fast() {
        let mut transport = SerialTransport::default();
        assert_eq!(
            transport.send(&visca::focus_inquiry()),
            Err(TransportError::Disconnected)
        );
        assert_eq!(
            transport.query(&visca::focus_inquiry()),
            Err(TransportError::Disconnected)
        );
    }

    #[test]
    fn test_interface_id_serde() {
        let id = InterfaceId::from("/dev/ttyUSB0");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"/dev/ttyUSB0\"");
        assert_eq!(id.to_string(), "/dev/ttyUSB0");
    }
}
