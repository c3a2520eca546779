//! Intent-level facade over the connection, motion, focus and preset layers.
//!
//! Every method takes `&self`, so a [`Controller`] can be shared through an
//! `Arc` between a UI thread and a worker. Calls that need the camera return
//! [`ControlError::NotConnected`] while disconnected, without touching the
//! transport.
//!
//! # Example
//!
//! ```
//! use tandyberg::config::MemoryStore;
//! use tandyberg::controller::Controller;
//! use tandyberg::mock::MockTransport;
//! use tandyberg::presets::PresetSlot;
//!
//! let controller = Controller::new(MockTransport::with_camera_on("COM1"), MemoryStore::new());
//! assert!(controller.connect(None).is_connected());
//!
//! let slot = PresetSlot::new(3).unwrap();
//! let stored = controller.set_preset(slot)?;
//! assert_eq!(controller.recall_preset(slot)?, Some(stored));
//! # Ok::<(), tandyberg::error::ControlError>(())
//! ```

use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::config::{Config, ConfigStore, JsonFileStore};
use crate::connection::{ConnectionManager, ConnectionState};
use crate::error::{ControlError, ControlResult};
use crate::focus::{FocusMode, FocusSubsystem};
use crate::motion::{AxisGroup, Direction, MotionState, MotionStateMachine, SpeedLevel};
use crate::pose::{self, Pose};
use crate::presets::PresetSlot;
use crate::transport::{InterfaceId, Transport};

/// PTZ camera controller.
pub struct Controller<T: Transport, S: ConfigStore = JsonFileStore> {
    link: ConnectionManager<T>,
    motion: MotionStateMachine,
    focus: FocusSubsystem,
    config: Mutex<Config>,
    store: S,
}

impl<T: Transport, S: ConfigStore> Controller<T, S> {
    /// Load the config from `store` and wrap `transport`. Starts disconnected.
    pub fn new(transport: T, store: S) -> Self {
        let config = store.load();
        Self {
            link: ConnectionManager::new(transport),
            motion: MotionStateMachine::new(),
            focus: FocusSubsystem::new(),
            config: Mutex::new(config),
            store,
        }
    }

    /// Like [`new`](Self::new), then try to rebind the interface saved in the
    /// config, falling back to the other candidates.
    ///
    /// Not finding a camera is not an error; check
    /// [`connection_state`](Self::connection_state).
    pub fn open(transport: T, store: S) -> Self {
        let controller = Self::new(transport, store);
        if let Some(interface) = controller.config().interface {
            info!("Reconnecting to saved interface {interface}");
            controller.connect(Some(interface));
        }
        controller
    }

    fn config_lock(&self) -> MutexGuard<'_, Config> {
        self.config.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of the in-memory config.
    pub fn config(&self) -> Config {
        self.config_lock().clone()
    }

    // ==================== Connection ====================

    /// Interfaces that might have a camera on them.
    pub fn list_interfaces(&self) -> Vec<InterfaceId> {
        self.link.list_candidates()
    }

    /// Bind a camera, trying `preferred` first.
    ///
    /// A new binding is saved as the preferred interface for next time. A
    /// failed save is logged and does not undo the binding.
    pub fn connect(&self, preferred: Option<InterfaceId>) -> ConnectionState {
        let state = self.link.connect(preferred.as_ref());

        if let Some(interface) = state.interface() {
            let mut config = self.config_lock();
            if config.interface.as_ref() != Some(interface) {
                config.interface = Some(interface.clone());
                if let Err(e) = self.store.save(&config) {
                    warn!("Could not save interface {interface}: {e}");
                }
            }
        }
        state
    }

    /// Release the camera.
    pub fn disconnect(&self) {
        self.link.disconnect();
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.link.state()
    }

    /// One-line status for display.
    pub fn status_text(&self) -> String {
        self.connection_state().to_string()
    }

    // ==================== Motion ====================

    /// Start driving `direction` until stopped.
    pub fn start_motion(&self, direction: Direction) -> ControlResult<()> {
        self.motion.start_motion(&self.link, direction)
    }

    /// Stop `group`. Stopping an idle group does nothing.
    pub fn stop_motion(&self, group: AxisGroup) -> ControlResult<()> {
        self.motion.stop_motion(&self.link, group)
    }

    /// Stop both groups.
    pub fn halt(&self) -> ControlResult<()> {
        self.motion.stop_all(&self.link)
    }

    /// Set the steer speed.
    pub fn set_speed(&self, level: SpeedLevel) -> ControlResult<()> {
        self.motion.set_speed(&self.link, level)
    }

    /// Current steer speed.
    pub fn speed(&self) -> SpeedLevel {
        self.motion.speed()
    }

    /// What `group` is doing, as last commanded.
    pub fn motion_state(&self, group: AxisGroup) -> MotionState {
        self.motion.state(group)
    }

    // ==================== Focus ====================

    /// Read the focus position.
    pub fn get_focus(&self) -> ControlResult<i32> {
        self.focus.get_focus(&self.link)
    }

    /// Switch to autofocus.
    pub fn enable_autofocus(&self) -> ControlResult<()> {
        self.focus.enable_autofocus(&self.link)
    }

    /// Switch to manual focus.
    pub fn disable_autofocus(&self) -> ControlResult<()> {
        self.focus.disable_autofocus(&self.link)
    }

    /// Move focus to `value`. Forwarded even in autofocus mode.
    pub fn set_focus(&self, value: i32) -> ControlResult<()> {
        self.focus.set_focus(&self.link, value)
    }

    /// Flip the focus mode, returning the focus read just before.
    pub fn toggle_autofocus(&self) -> ControlResult<i32> {
        self.focus.toggle_autofocus(&self.link)
    }

    /// Focus mode last commanded.
    pub fn focus_mode(&self) -> FocusMode {
        self.focus.mode()
    }

    // ==================== Poses and presets ====================

    /// Read the camera's current pose.
    pub fn capture_pose(&self) -> ControlResult<Pose> {
        pose::capture(&self.link)
    }

    /// Drive the camera to `pose`.
    pub fn recall_pose(&self, pose: &Pose) -> ControlResult<()> {
        pose::recall(&self.link, pose)
    }

    /// Pose stored at `slot`, if any.
    pub fn preset(&self, slot: PresetSlot) -> Option<Pose> {
        self.config_lock().presets.get(slot)
    }

    /// Capture the current pose into `slot` and persist it.
    ///
    /// If saving fails, the slot is put back to its previous contents and
    /// [`ControlError::Persist`] is returned.
    pub fn set_preset(&self, slot: PresetSlot) -> ControlResult<Pose> {
        let pose = self.capture_pose()?;

        let mut config = self.config_lock();
        let previous = config.presets.insert(slot, pose);
        if let Err(e) = self.store.save(&config) {
            config.presets.restore(slot, previous);
            warn!("Preset {slot} not saved: {e}");
            return Err(ControlError::Persist(e.to_string()));
        }

        info!("Stored preset {slot}");
        Ok(pose)
    }

    /// Drive the camera to the pose stored at `slot`.
    ///
    /// An unset slot does nothing and returns `Ok(None)`.
    pub fn recall_preset(&self, slot: PresetSlot) -> ControlResult<Option<Pose>> {
        self.link.session()?;

        let Some(pose) = self.preset(slot) else {
            debug!("Preset {slot} is unset");
            return Ok(None);
        };
        self.recall_pose(&pose)?;
        Ok(Some(pose))
    }
}
