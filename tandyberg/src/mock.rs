//! Scriptable in-memory camera.
//!
//! [`MockTransport`] implements [`Transport`] without hardware. It records
//! every call, answers the handshake only on interfaces it was told to, keeps
//! a simulated pose that absolute-move frames update and inquiries report, and
//! can inject a failure into the next exchange.
//!
//! Clones share state, so a test can hand one clone to the controller and keep
//! another to inspect what reached the "wire".
//!
//! ```
//! use tandyberg::mock::MockTransport;
//! use tandyberg::transport::Transport;
//! use tandyberg::visca;
//!
//! let mock = MockTransport::with_camera_on("/dev/ttyUSB0");
//! let mut transport = mock.clone();
//! assert!(transport.probe(&"/dev/ttyUSB0".into()));
//! transport.send(&visca::autofocus(false)).unwrap();
//! assert_eq!(mock.sent_frames(), vec![visca::autofocus(false)]);
//! ```

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::trace;

use crate::pose::Pose;
use crate::transport::{InterfaceId, Transport, TransportError, TransportResult};
use crate::visca::{self, Frame};

/// One recorded transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    /// Handshake attempted on an interface
    Probe(InterfaceId),
    /// Command frame sent
    Send(Frame),
    /// Inquiry frame sent
    Query(Frame),
    /// Binding released
    Close,
}

#[derive(Debug, Default)]
struct MockState {
    candidates: Vec<InterfaceId>,
    responders: HashSet<InterfaceId>,
    bound: Option<InterfaceId>,
    events: Vec<MockEvent>,
    fail_next: Option<TransportError>,
    pose: Pose,
    autofocus: bool,
}

impl MockState {
    fn take_failure(&mut self) -> TransportResult<()> {
        if self.bound.is_none() {
            return Err(TransportError::Disconnected);
        }
        match self.fail_next.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Apply the effect of a command frame to the simulated camera.
    fn apply(&mut self, frame: &Frame) {
        match frame.body() {
            [0x06, 0x02, _, _, position @ ..] if position.len() == 8 => {
                if let Ok((pan, tilt)) = visca::decode_pan_tilt(position) {
                    self.pose.pan = pan;
                    self.pose.tilt = tilt;
                }
            }
            [0x04, 0x47, position @ ..] if position.len() == 4 => {
                if let Ok(zoom) = visca::decode_position(position) {
                    self.pose.zoom = zoom;
                }
            }
            [0x04, 0x48, position @ ..] if position.len() == 4 => {
                if let Ok(focus) = visca::decode_position(position) {
                    self.pose.focus = focus;
                }
            }
            [0x04, 0x38, mode] => self.autofocus = *mode == 0x02,
            _ => {}
        }
    }

    fn answer(&self, frame: &Frame) -> TransportResult<Vec<u8>> {
        let unsigned = |value: i32| visca::encode_nibbles(value as u16).to_vec();
        match frame.body() {
            [0x06, 0x12] => {
                let mut payload = visca::encode_nibbles(self.pose.pan as i16 as u16).to_vec();
                payload.extend_from_slice(&visca::encode_nibbles(self.pose.tilt as i16 as u16));
                Ok(payload)
            }
            [0x04, 0x47] => Ok(unsigned(self.pose.zoom)),
            [0x04, 0x48] => Ok(unsigned(self.pose.focus)),
            _ => Err(TransportError::IoFailure(format!(
                "Mock camera has no answer for {frame}"
            ))),
        }
    }
}

/// In-memory [`Transport`] for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// No candidates, nothing responds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enumerate `names` in order; none respond until [`respond_on`](Self::respond_on).
    pub fn with_candidates(names: &[&str]) -> Self {
        let mock = Self::new();
        mock.lock().candidates = names.iter().map(|&n| InterfaceId::from(n)).collect();
        mock
    }

    /// A single candidate with a responding camera.
    pub fn with_camera_on(name: &str) -> Self {
        let mock = Self::with_candidates(&[name]);
        mock.respond_on(name);
        mock
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make the handshake succeed on `name`.
    pub fn respond_on(&self, name: &str) {
        self.lock().responders.insert(InterfaceId::from(name));
    }

    /// Stop answering on `name`. Does not affect a current binding.
    pub fn silence(&self, name: &str) {
        self.lock().responders.remove(&InterfaceId::from(name));
    }

    /// Fail the next send or query with `error`, after recording it.
    pub fn fail_next(&self, error: TransportError) {
        self.lock().fail_next = Some(error);
    }

    /// Place the simulated camera at `pose`.
    pub fn set_pose(&self, pose: Pose) {
        self.lock().pose = pose;
    }

    /// Where the simulated camera currently is.
    pub fn pose(&self) -> Pose {
        self.lock().pose
    }

    /// Last autofocus mode commanded.
    pub fn autofocus(&self) -> bool {
        self.lock().autofocus
    }

    /// Currently bound interface.
    pub fn bound(&self) -> Option<InterfaceId> {
        self.lock().bound.clone()
    }

    /// Every recorded call, oldest first.
    pub fn events(&self) -> Vec<MockEvent> {
        self.lock().events.clone()
    }

    /// Forget recorded calls.
    pub fn clear_events(&self) {
        self.lock().events.clear();
    }

    /// Interfaces probed, in order.
    pub fn probes(&self) -> Vec<InterfaceId> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                MockEvent::Probe(interface) => Some(interface.clone()),
                _ => None,
            })
            .collect()
    }

    /// Command frames sent, in order.
    pub fn sent_frames(&self) -> Vec<Frame> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                MockEvent::Send(frame) => Some(frame.clone()),
                _ => None,
            })
            .collect()
    }

    /// Inquiry frames sent, in order.
    pub fn queries(&self) -> Vec<Frame> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                MockEvent::Query(frame) => Some(frame.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Transport for MockTransport {
    fn list_candidates(&self) -> Vec<InterfaceId> {
        self.lock().candidates.clone()
    }

    fn probe(&mut self, interface: &InterfaceId) -> bool {
        let mut state = self.lock();
        state.events.push(MockEvent::Probe(interface.clone()));
        let responds = state.responders.contains(interface);
        state.bound = responds.then(|| interface.clone());
        trace!("Mock probe {interface}: {responds}");
        responds
    }

    fn send(&mut self, frame: &Frame) -> TransportResult<()> {
        let mut state = self.lock();
        state.events.push(MockEvent::Send(frame.clone()));
        state.take_failure()?;
        state.apply(frame);
        Ok(())
    }

    fn query(&mut self, frame: &Frame) -> TransportResult<Vec<u8>> {
        let mut state = self.lock();
        state.events.push(MockEvent::Query(frame.clone()));
        state.take_failure()?;
        state.answer(frame)
    }

    fn close(&mut self) {
        let mut state = self.lock();
        state.events.push(MockEvent::Close);
        state.bound = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::SpeedLevel;

    fn bound_mock() -> MockTransport {
        let mock = MockTransport::with_camera_on("COM1");
        let mut transport = mock.clone();
        assert!(transport.probe(&"COM1".into()));
        mock
    }

    #[test]
    fn test_absolute_moves_update_pose() {
        let mock = bound_mock();
        let mut transport = mock.clone();

        transport
            .send(&visca::pan_tilt_absolute(-300, 120, SpeedLevel::MAX))
            .unwrap();
        transport.send(&visca::zoom_direct(0x2000)).unwrap();
        transport.send(&visca::focus_direct(0x1100)).unwrap();

        assert_eq!(
            mock.pose(),
            Pose {
                pan: -300,
                tilt: 120,
                zoom: 0x2000,
                focus: 0x1100
            }
        );
    }

    #[test]
    fn test_inquiries_report_pose() {
        let mock = bound_mock();
        mock.set_pose(Pose {
            pan: -5,
            tilt: 7,
            zoom: 100,
            focus: 200,
        });
        let mut transport = mock.clone();

        let payload = transport.query(&visca::pan_tilt_inquiry()).unwrap();
        assert_eq!(visca::decode_pan_tilt(&payload).unwrap(), (-5, 7));
        let payload = transport.query(&visca::focus_inquiry()).unwrap();
        assert_eq!(visca::decode_position(&payload).unwrap(), 200);
    }

    #[test]
    fn test_unbound_mock_rejects_frames() {
        let mut transport = MockTransport::new();
        assert_eq!(
            transport.send(&visca::autofocus(true)),
            Err(TransportError::Disconnected)
        );
    }

    #[test]
    fn test_fail_next_is_one_shot() {
        let mock = bound_mock();
        let mut transport = mock.clone();
        mock.fail_next(TransportError::Timeout);

        assert_eq!(
            transport.send(&visca::autofocus(true)),
            Err(TransportError::Timeout)
        );
        assert!(transport.send(&visca::autofocus(true)).is_ok());
        assert_eq!(mock.sent_frames().len(), 2);
    }
}
