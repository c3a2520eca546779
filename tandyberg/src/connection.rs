//! Connection lifecycle and serialized access to the transport.
//!
//! The [`ConnectionManager`] owns the transport for its whole lifetime. Every
//! other component reaches the camera through [`send`](ConnectionManager::send)
//! and [`query`](ConnectionManager::query), which hold the transport lock for
//! exactly one frame exchange.
//!
//! # Binding
//!
//! [`connect`](ConnectionManager::connect) probes the preferred interface
//! first, then every candidate in enumeration order, and binds the first one
//! that answers the handshake. Serial enumeration is racy, so probing is
//! sequential and best-effort; finding nothing is a normal outcome.
//!
//! # Demotion
//!
//! Any transport error during normal operation closes the port and moves the
//! state to [`ConnectionState::Disconnected`]. The caller gets
//! [`ControlError::NotConnected`], and later calls fail fast without touching
//! the transport until the next successful `connect`.

use std::fmt;
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::error::{ControlError, ControlResult};
use crate::transport::{InterfaceId, Transport, TransportError};
use crate::visca::{Frame, ViscaResult};

/// Whether a camera is bound, and where.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No camera bound
    #[default]
    Disconnected,
    /// Camera bound on the given interface
    Connected(InterfaceId),
}

impl ConnectionState {
    /// True when bound.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected(_))
    }

    /// Bound interface, if any.
    pub fn interface(&self) -> Option<&InterfaceId> {
        match self {
            ConnectionState::Connected(interface) => Some(interface),
            ConnectionState::Disconnected => None,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connected(interface) => write!(f, "Connected on {interface}"),
            ConnectionState::Disconnected => write!(f, "Not connected to camera"),
        }
    }
}

/// Identifies one continuous binding.
///
/// Incremented on every successful connect, so state tied to an earlier
/// binding can be recognized as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Session(u64);

struct Link<T> {
    transport: T,
    state: ConnectionState,
    session: u64,
}

impl<T: Transport> Link<T> {
    fn session(&self) -> ControlResult<Session> {
        if self.state.is_connected() {
            Ok(Session(self.session))
        } else {
            Err(ControlError::NotConnected)
        }
    }

    fn demote(&mut self, error: &TransportError) -> ControlError {
        if let ConnectionState::Connected(interface) = &self.state {
            warn!("Lost camera on {interface}: {error}");
        }
        self.transport.close();
        self.state = ConnectionState::Disconnected;
        ControlError::NotConnected
    }

    fn release(&mut self) {
        if let ConnectionState::Connected(interface) = &self.state {
            info!("Releasing {interface}");
        }
        self.transport.close();
        self.state = ConnectionState::Disconnected;
    }
}

/// Owns the transport and the connection state.
pub struct ConnectionManager<T: Transport> {
    link: Mutex<Link<T>>,
}

impl<T: Transport> ConnectionManager<T> {
    /// Wrap an unbound transport. Starts disconnected.
    pub fn new(transport: T) -> Self {
        Self {
            link: Mutex::new(Link {
                transport,
                state: ConnectionState::Disconnected,
                session: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Link<T>> {
        self.link.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Interfaces the transport can see.
    pub fn list_candidates(&self) -> Vec<InterfaceId> {
        self.lock().transport.list_candidates()
    }

    /// Bind a camera, trying `preferred` first and then every candidate.
    ///
    /// Any current binding is released first. Returns the resulting state;
    /// `Disconnected` means nothing answered.
    pub fn connect(&self, preferred: Option<&InterfaceId>) -> ConnectionState {
        let mut link = self.lock();
        link.release();

        let mut probed = Vec::new();
        if let Some(interface) = preferred {
            if Self::try_bind(&mut link, interface) {
                return link.state.clone();
            }
            probed.push(interface.clone());
        }

        let candidates = link.transport.list_candidates();
        debug!("Candidate interfaces: {:?}", candidates);
        for interface in candidates.iter().filter(|c| !probed.contains(c)) {
            if Self::try_bind(&mut link, interface) {
                return link.state.clone();
            }
        }

        info!("No camera found");
        ConnectionState::Disconnected
    }

    fn try_bind(link: &mut Link<T>, interface: &InterfaceId) -> bool {
        debug!("Probing {interface}");
        if link.transport.probe(interface) {
            link.session += 1;
            link.state = ConnectionState::Connected(interface.clone());
            info!("Connected to camera on {interface}");
            true
        } else {
            false
        }
    }

    /// Release the binding, if any.
    pub fn disconnect(&self) {
        self.lock().release();
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.lock().state.clone()
    }

    /// Bound interface, if any.
    pub fn current_interface(&self) -> Option<InterfaceId> {
        self.lock().state.interface().cloned()
    }

    /// True when bound.
    pub fn is_connected(&self) -> bool {
        self.lock().state.is_connected()
    }

    /// Current session, or `NotConnected`.
    pub fn session(&self) -> ControlResult<Session> {
        self.lock().session()
    }

    /// Send one command frame to the bound camera.
    pub fn send(&self, frame: &Frame) -> ControlResult<()> {
        let mut link = self.lock();
        link.session()?;
        match link.transport.send(frame) {
            Ok(()) => Ok(()),
            Err(e) => Err(link.demote(&e)),
        }
    }

    /// Send one inquiry frame and decode its payload.
    ///
    /// A payload that fails to decode is treated as a link failure.
    pub fn query<R>(
        &self,
        frame: &Frame,
        decode: impl FnOnce(&[u8]) -> ViscaResult<R>,
    ) -> ControlResult<R> {
        let mut link = self.lock();
        link.session()?;
        let result = link
            .transport
            .query(frame)
            .and_then(|payload| decode(&payload).map_err(TransportError::from));
        result.map_err(|e| link.demote(&e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockEvent, MockTransport};
    use crate::visca;

    #[test]
    fn test_starts_disconnected() {
        let link = ConnectionManager::new(MockTransport::new());
        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert_eq!(link.current_interface(), None);
        assert_eq!(link.session(), Err(ControlError::NotConnected));
    }

    #[test]
    fn test_preferred_interface_probed_first() {
        let mock = MockTransport::with_candidates(&["/dev/ttyS0", "/dev/ttyUSB0"]);
        mock.respond_on("/dev/ttyS0");
        mock.respond_on("/dev/ttyUSB0");
        let link = ConnectionManager::new(mock.clone());

        let state = link.connect(Some(&InterfaceId::from("/dev/ttyUSB0")));
        assert_eq!(state, ConnectionState::Connected("/dev/ttyUSB0".into()));
        assert_eq!(mock.probes(), vec![InterfaceId::from("/dev/ttyUSB0")]);
    }

    #[test]
    fn test_failed_preferred_falls_back_without_reprobing() {
        let mock = MockTransport::with_candidates(&["/dev/ttyS0", "/dev/ttyS1"]);
        mock.respond_on("/dev/ttyS1");
        let link = ConnectionManager::new(mock.clone());

        let state = link.connect(Some(&InterfaceId::from("/dev/ttyS0")));
        assert_eq!(state, ConnectionState::Connected("/dev/ttyS1".into()));
        assert_eq!(
            mock.probes(),
            vec![InterfaceId::from("/dev/ttyS0"), InterfaceId::from("/dev/ttyS1")]
        );
    }

    #[test]
    fn test_no_responder_is_disconnected() {
        let mock = MockTransport::with_candidates(&["A", "B"]);
        let link = ConnectionManager::new(mock.clone());

        assert_eq!(link.connect(None), ConnectionState::Disconnected);
        assert_eq!(mock.probes().len(), 2);
    }

    #[test]
    fn test_transport_failure_demotes() {
        let mock = MockTransport::with_camera_on("/dev/ttyUSB0");
        let link = ConnectionManager::new(mock.clone());
        link.connect(None);

        mock.fail_next(TransportError::IoFailure("framing".to_string()));
        assert_eq!(
            link.send(&visca::autofocus(true)),
            Err(ControlError::NotConnected)
        );
        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert!(mock.events().contains(&MockEvent::Close));

        mock.clear_events();
        assert_eq!(
            link.send(&visca::autofocus(true)),
            Err(ControlError::NotConnected)
        );
        assert!(mock.events().is_empty());
    }

    #[test]
    fn test_undecodable_payload_demotes() {
        let mock = MockTransport::with_camera_on("/dev/ttyUSB0");
        let link = ConnectionManager::new(mock.clone());
        link.connect(None);

        let result = link.query(&visca::focus_inquiry(), |_| {
            Err(visca::ViscaError::InvalidNibble(0xAB))
        });
        assert_eq!(result, Err::<(), _>(ControlError::NotConnected));
        assert!(!link.is_connected());
    }

    #[test]
    fn test_reconnect_starts_new_session() {
        let link = ConnectionManager::new(MockTransport::with_camera_on("COM3"));
        link.connect(None);
        let first = link.session().unwrap();
        link.connect(None);
        let second = link.session().unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_status_text() {
        assert_eq!(
            ConnectionState::Connected("COM3".into()).to_string(),
            "Connected on COM3"
        );
        assert_eq!(
            ConnectionState::Disconnected.to_string(),
            "Not connected to camera"
        );
    }
}
