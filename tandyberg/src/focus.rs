//! Autofocus toggle and manual focus.
//!
//! Manual set-points are forwarded even while autofocus is on; the camera
//! decides whether to honor them.

use std::sync::Mutex;

use tracing::debug;

use crate::connection::ConnectionManager;
use crate::error::ControlResult;
use crate::transport::Transport;
use crate::visca;

/// Focus mode last commanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum FocusMode {
    /// Camera focuses itself (power-on default)
    #[default]
    Auto,
    /// Focus follows set-points
    Manual,
}

/// Focus control for the bound camera.
#[derive(Debug, Default)]
pub struct FocusSubsystem {
    mode: Mutex<FocusMode>,
}

impl FocusSubsystem {
    /// Assumes the camera starts in autofocus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mode last commanded successfully.
    pub fn mode(&self) -> FocusMode {
        *self.mode.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Read the absolute focus position.
    pub fn get_focus<T: Transport>(&self, link: &ConnectionManager<T>) -> ControlResult<i32> {
        link.query(&visca::focus_inquiry(), visca::decode_position)
    }

    /// Switch to autofocus.
    pub fn enable_autofocus<T: Transport>(&self, link: &ConnectionManager<T>) -> ControlResult<()> {
        self.set_mode(link, FocusMode::Auto)
    }

    /// Switch to manual focus.
    pub fn disable_autofocus<T: Transport>(&self, link: &ConnectionManager<T>) -> ControlResult<()> {
        self.set_mode(link, FocusMode::Manual)
    }

    fn set_mode<T: Transport>(&self, link: &ConnectionManager<T>, mode: FocusMode) -> ControlResult<()> {
        let mut current = self.mode.lock().unwrap_or_else(|e| e.into_inner());
        link.send(&visca::autofocus(mode == FocusMode::Auto))?;
        debug!("Focus mode {mode}");
        *current = mode;
        Ok(())
    }

    /// Move focus to `value`.
    pub fn set_focus<T: Transport>(&self, link: &ConnectionManager<T>, value: i32) -> ControlResult<()> {
        link.send(&visca::focus_direct(value))
    }

    /// Flip between auto and manual.
    ///
    /// Reads the current focus first so a manual control can start from where
    /// the camera is. Returns that reading.
    pub fn toggle_autofocus<T: Transport>(&self, link: &ConnectionManager<T>) -> ControlResult<i32> {
        let focus = self.get_focus(link)?;
        match self.mode() {
            FocusMode::Auto => self.disable_autofocus(link)?,
            FocusMode::Manual => self.enable_autofocus(link)?,
        }
        Ok(focus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ControlError;
    use crate::mock::MockTransport;
    use crate::pose::Pose;

    fn connected() -> (MockTransport, ConnectionManager<MockTransport>) {
        let mock = MockTransport::with_camera_on("COM1");
        let link = ConnectionManager::new(mock.clone());
        link.connect(None);
        (mock, link)
    }

    #[test]
    fn test_mode_toggles() {
        let (mock, link) = connected();
        let focus = FocusSubsystem::new();

        focus.disable_autofocus(&link).unwrap();
        assert_eq!(focus.mode(), FocusMode::Manual);
        assert!(!mock.autofocus());

        focus.enable_autofocus(&link).unwrap();
        assert_eq!(focus.mode(), FocusMode::Auto);
        assert!(mock.autofocus());
    }

    #[test]
    fn test_set_then_get_focus() {
        let (_mock, link) = connected();
        let focus = FocusSubsystem::new();

        focus.disable_autofocus(&link).unwrap();
        focus.set_focus(&link, 0x0A00).unwrap();
        assert_eq!(focus.get_focus(&link).unwrap(), 0x0A00);
    }

    #[test]
    fn test_set_focus_forwarded_in_auto_mode() {
        let (mock, link) = connected();
        let focus = FocusSubsystem::new();

        assert_eq!(focus.mode(), FocusMode::Auto);
        focus.set_focus(&link, 42).unwrap();
        assert_eq!(mock.sent_frames(), vec![visca::focus_direct(42)]);
    }

    #[test]
    fn test_toggle_reads_focus_first() {
        let (mock, link) = connected();
        mock.set_pose(Pose {
            focus: 777,
            ..Pose::default()
        });
        let focus = FocusSubsystem::new();

        assert_eq!(focus.toggle_autofocus(&link).unwrap(), 777);
        assert_eq!(focus.mode(), FocusMode::Manual);
        assert_eq!(focus.toggle_autofocus(&link).unwrap(), 777);
        assert_eq!(focus.mode(), FocusMode::Auto);
    }

    #[test]
    fn test_mode_unchanged_when_disconnected() {
        let link = ConnectionManager::new(MockTransport::new());
        let focus = FocusSubsystem::new();

        assert_eq!(
            focus.disable_autofocus(&link),
            Err(ControlError::NotConnected)
        );
        assert_eq!(focus.mode(), FocusMode::Auto);
    }
}
