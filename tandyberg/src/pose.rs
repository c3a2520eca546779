//! Absolute pose capture and recall.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::connection::ConnectionManager;
use crate::error::ControlResult;
use crate::motion::SpeedLevel;
use crate::transport::Transport;
use crate::visca;

/// Pan/tilt speed used when driving to a recalled pose.
pub const RECALL_SPEED: SpeedLevel = SpeedLevel::MAX;

/// Snapshot of all four camera axes, as reported by the device.
///
/// Serialized as `[pan, tilt, zoom, focus]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct Pose {
    /// Pan position, signed
    pub pan: i32,
    /// Tilt position, signed
    pub tilt: i32,
    /// Zoom position
    pub zoom: i32,
    /// Focus position
    pub focus: i32,
}

impl From<[i32; 4]> for Pose {
    fn from([pan, tilt, zoom, focus]: [i32; 4]) -> Self {
        Self {
            pan,
            tilt,
            zoom,
            focus,
        }
    }
}

impl From<Pose> for [i32; 4] {
    fn from(pose: Pose) -> Self {
        [pose.pan, pose.tilt, pose.zoom, pose.focus]
    }
}

/// Read pan, tilt, zoom and focus from the camera.
pub fn capture<T: Transport>(link: &ConnectionManager<T>) -> ControlResult<Pose> {
    let (pan, tilt) = link.query(&visca::pan_tilt_inquiry(), visca::decode_pan_tilt)?;
    let zoom = link.query(&visca::zoom_inquiry(), visca::decode_position)?;
    let focus = link.query(&visca::focus_inquiry(), visca::decode_position)?;

    let pose = Pose {
        pan,
        tilt,
        zoom,
        focus,
    };
    debug!("Captured {:?}", pose);
    Ok(pose)
}

/// Command the camera to `pose` without waiting for the move to finish.
pub fn recall<T: Transport>(link: &ConnectionManager<T>, pose: &Pose) -> ControlResult<()> {
    debug!("Recalling {:?}", pose);
    link.send(&visca::pan_tilt_absolute(pose.pan, pose.tilt, RECALL_SPEED))?;
    link.send(&visca::zoom_direct(pose.zoom))?;
    link.send(&visca::focus_direct(pose.focus))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ControlError;
    use crate::mock::MockTransport;
    use crate::transport::TransportError;

    #[test]
    fn test_pose_serializes_as_array() {
        let pose = Pose {
            pan: -10,
            tilt: 20,
            zoom: 300,
            focus: 4000,
        };
        assert_eq!(serde_json::to_string(&pose).unwrap(), "[-10,20,300,4000]");
        let back: Pose = serde_json::from_str("[-10,20,300,4000]").unwrap();
        assert_eq!(back, pose);
    }

    #[test]
    fn test_capture_reads_all_axes() {
        let mock = MockTransport::with_camera_on("COM1");
        let link = ConnectionManager::new(mock.clone());
        link.connect(None);
        let expected = Pose {
            pan: -1200,
            tilt: 340,
            zoom: 0x3FFF,
            focus: 0x1234,
        };
        mock.set_pose(expected);

        assert_eq!(capture(&link).unwrap(), expected);
        assert_eq!(mock.queries().len(), 3);
    }

    #[test]
    fn test_recall_drives_camera() {
        let mock = MockTransport::with_camera_on("COM1");
        let link = ConnectionManager::new(mock.clone());
        link.connect(None);
        let target = Pose {
            pan: 500,
            tilt: -40,
            zoom: 1000,
            focus: 2000,
        };

        recall(&link, &target).unwrap();
        assert_eq!(mock.pose(), target);
        assert_eq!(mock.sent_frames().len(), 3);
    }

    #[test]
    fn test_capture_failure_disconnects() {
        let mock = MockTransport::with_camera_on("COM1");
        let link = ConnectionManager::new(mock.clone());
        link.connect(None);
        mock.fail_next(TransportError::Timeout);

        assert_eq!(capture(&link), Err(ControlError::NotConnected));
        assert!(!link.is_connected());
    }
}
