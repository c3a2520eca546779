//! Per axis-group motion state machine.
//!
//! Directions fall into two mutually exclusive groups: steer (pan and tilt)
//! and zoom. Each group is either idle or driving in exactly one direction.
//!
//! Button and key events are not trusted to arrive in clean pairs, so:
//!
//! - a repeated start for the active direction sends nothing
//! - a start for another direction in the same group stops the old one first
//! - a stop for an idle group sends nothing
//!
//! Motion state changes only through starts and stops. A group stays active
//! across link loss and reconnects until a stop frame has been delivered, so a
//! release that arrives after a reconnect still stops the camera.

use std::fmt;
use std::sync::{Mutex, MutexGuard};

use clap::ValueEnum;
use tracing::{debug, trace};

use crate::connection::{ConnectionManager, Session};
use crate::error::ControlResult;
use crate::transport::Transport;
use crate::visca;

/// A single drive direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, strum::EnumIter, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Direction {
    /// Pan towards the left
    #[value(alias = "left")]
    PanLeft,
    /// Pan towards the right
    #[value(alias = "right")]
    PanRight,
    /// Tilt upwards
    #[value(alias = "up")]
    TiltUp,
    /// Tilt downwards
    #[value(alias = "down")]
    TiltDown,
    /// Zoom towards telephoto
    #[value(aliases = ["in", "tele"])]
    ZoomIn,
    /// Zoom towards wide angle
    #[value(aliases = ["out", "wide"])]
    ZoomOut,
}

impl Direction {
    /// The axis group this direction belongs to.
    pub fn group(self) -> AxisGroup {
        match self {
            Direction::PanLeft | Direction::PanRight | Direction::TiltUp | Direction::TiltDown => {
                AxisGroup::Steer
            }
            Direction::ZoomIn | Direction::ZoomOut => AxisGroup::Zoom,
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" | "pan_left" => Ok(Direction::PanLeft),
            "right" | "pan_right" => Ok(Direction::PanRight),
            "up" | "tilt_up" => Ok(Direction::TiltUp),
            "down" | "tilt_down" => Ok(Direction::TiltDown),
            "in" | "tele" | "zoom_in" => Ok(Direction::ZoomIn),
            "out" | "wide" | "zoom_out" => Ok(Direction::ZoomOut),
            other => Err(format!("Unknown direction: {other}")),
        }
    }
}

/// A set of directions that cannot be active at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, strum::EnumIter, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum AxisGroup {
    /// Pan and tilt
    Steer,
    /// Zoom in and out
    Zoom,
}

impl std::str::FromStr for AxisGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "steer" | "slew" | "pan" | "tilt" => Ok(AxisGroup::Steer),
            "zoom" => Ok(AxisGroup::Zoom),
            other => Err(format!("Unknown axis group: {other}")),
        }
    }
}

/// Motion of one axis group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MotionState {
    /// Not moving
    #[default]
    Idle,
    /// Driving in the given direction until stopped
    Active(Direction),
}

/// Wire value for each speed level.
///
/// Vendor table, not a formula: the operator menu offers speeds 1, 3, ... 15
/// and the camera expects the even codes below them.
const SPEED_TABLE: [u8; SpeedLevel::COUNT] = [0x00, 0x02, 0x04, 0x06, 0x08, 0x0A, 0x0C, 0x0E];

/// One of eight discrete steer speeds, 0 (slowest) to 7 (fastest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpeedLevel(u8);

impl SpeedLevel {
    /// Number of speed levels.
    pub const COUNT: usize = 8;

    /// Fastest level.
    pub const MAX: SpeedLevel = SpeedLevel(SpeedLevel::COUNT as u8 - 1);

    /// Level `n`, or `None` if `n` is not in `0..=7`.
    pub fn new(n: u8) -> Option<Self> {
        (usize::from(n) < Self::COUNT).then_some(Self(n))
    }

    /// Level for an operator menu label (1, 3, 5, ... 15).
    pub fn from_menu_label(label: u8) -> Option<Self> {
        if label % 2 == 1 {
            Self::new(label / 2)
        } else {
            None
        }
    }

    /// Ordinal level.
    pub fn level(self) -> u8 {
        self.0
    }

    /// Menu label shown to the operator.
    pub fn menu_label(self) -> u8 {
        self.0 * 2 + 1
    }

    /// Protocol encoding of this level.
    pub fn wire(self) -> u8 {
        SPEED_TABLE[usize::from(self.0)]
    }

    /// All levels, slowest first.
    pub fn all() -> impl Iterator<Item = SpeedLevel> {
        (0..Self::COUNT as u8).map(SpeedLevel)
    }
}

impl Default for SpeedLevel {
    fn default() -> Self {
        Self(3)
    }
}

impl fmt::Display for SpeedLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SpeedLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u8>()
            .ok()
            .and_then(SpeedLevel::new)
            .ok_or_else(|| format!("Speed level must be 0-7, got {s:?}"))
    }
}

/// Recorded motion of one group.
#[derive(Debug, Clone, Copy, Default)]
struct GroupState {
    motion: MotionState,
    /// Set when the session changed while active: the camera may or may not
    /// still be driving, so a stop is still owed but a repeated start is not
    /// suppressed.
    stale: bool,
}

#[derive(Debug, Default)]
struct Groups {
    session: Option<Session>,
    steer: GroupState,
    zoom: GroupState,
    speed: SpeedLevel,
}

impl Groups {
    /// Carry motion recorded under an older session into `session`.
    fn sync(&mut self, session: Session) {
        if self.session == Some(session) {
            return;
        }
        for group in [&mut self.steer, &mut self.zoom] {
            if let MotionState::Active(direction) = group.motion {
                debug!("New connection session, {direction} still owes a stop");
                group.stale = true;
            }
        }
        self.session = Some(session);
    }

    fn group_mut(&mut self, group: AxisGroup) -> &mut GroupState {
        match group {
            AxisGroup::Steer => &mut self.steer,
            AxisGroup::Zoom => &mut self.zoom,
        }
    }

    fn set(&mut self, group: AxisGroup, motion: MotionState) {
        *self.group_mut(group) = GroupState {
            motion,
            stale: false,
        };
    }
}

/// Tracks and drives the two axis groups.
///
/// The internal lock is held across a stop-then-start pair, so the stop frame
/// has finished (or failed) before the start frame is attempted, and two
/// callers can never interleave their pairs.
///
/// A group only returns to idle once a stop frame has been delivered. A start
/// is recorded before its frame is sent, so a start that fails mid-exchange
/// still owes a stop.
#[derive(Debug, Default)]
pub struct MotionStateMachine {
    groups: Mutex<Groups>,
}

impl MotionStateMachine {
    /// Idle in both groups at the default speed.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Groups> {
        self.groups.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start driving `direction`.
    ///
    /// No frame is sent if the group is already driving that way in the
    /// current session. If the group is driving another way, it is stopped
    /// first.
    pub fn start_motion<T: Transport>(
        &self,
        link: &ConnectionManager<T>,
        direction: Direction,
    ) -> ControlResult<()> {
        let mut groups = self.lock();
        groups.sync(link.session()?);

        let group = direction.group();
        let speed = groups.speed;
        let current = *groups.group_mut(group);
        match current.motion {
            MotionState::Active(active) if active == direction && !current.stale => {
                trace!("{direction} already active, ignoring repeated start");
                return Ok(());
            }
            MotionState::Active(active) if active == direction => {
                debug!("Resending start for {direction} on new session");
            }
            MotionState::Active(active) => {
                debug!("Stopping {active} before starting {direction}");
                link.send(&visca::stop(group, speed))?;
                groups.set(group, MotionState::Idle);
            }
            MotionState::Idle => {}
        }

        groups.set(group, MotionState::Active(direction));
        link.send(&visca::start(direction, speed))
    }

    /// Stop whatever `group` is doing. Idle groups send nothing.
    ///
    /// If the stop frame fails the group stays active, so the next stop
    /// (after a reconnect) sends it again.
    pub fn stop_motion<T: Transport>(
        &self,
        link: &ConnectionManager<T>,
        group: AxisGroup,
    ) -> ControlResult<()> {
        let mut groups = self.lock();
        groups.sync(link.session()?);

        if groups.group_mut(group).motion == MotionState::Idle {
            trace!("{group} already idle, ignoring stop");
            return Ok(());
        }

        let speed = groups.speed;
        link.send(&visca::stop(group, speed))?;
        groups.set(group, MotionState::Idle);
        Ok(())
    }

    /// Stop both groups.
    pub fn stop_all<T: Transport>(&self, link: &ConnectionManager<T>) -> ControlResult<()> {
        self.stop_motion(link, AxisGroup::Steer)?;
        self.stop_motion(link, AxisGroup::Zoom)
    }

    /// Change the steer speed. Motion state is untouched; the level applies
    /// from the next start.
    pub fn set_speed<T: Transport>(
        &self,
        link: &ConnectionManager<T>,
        level: SpeedLevel,
    ) -> ControlResult<()> {
        let mut groups = self.lock();
        link.send(&visca::speed(level))?;
        groups.speed = level;
        Ok(())
    }

    /// Current speed level.
    pub fn speed(&self) -> SpeedLevel {
        self.lock().speed
    }

    /// Recorded state of `group`. Active until a stop has been delivered,
    /// whatever the connection does in between.
    pub fn state(&self, group: AxisGroup) -> MotionState {
        self.lock().group_mut(group).motion
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ControlError;
    use crate::mock::MockTransport;
    use crate::transport::TransportError;

    fn connected() -> (MockTransport, ConnectionManager<MockTransport>) {
        let mock = MockTransport::with_camera_on("/dev/ttyUSB0");
        let link = ConnectionManager::new(mock.clone());
        link.connect(None);
        mock.clear_events();
        (mock, link)
    }

    #[test]
    fn test_direction_groups() {
        use strum::IntoEnumIterator;
        let steer = Direction::iter()
            .filter(|d| d.group() == AxisGroup::Steer)
            .count();
        assert_eq!(steer, 4);
        assert_eq!(Direction::ZoomOut.group(), AxisGroup::Zoom);
    }

    #[test]
    fn test_direction_parse_aliases() {
        assert_eq!("left".parse::<Direction>().unwrap(), Direction::PanLeft);
        assert_eq!("TILT_UP".parse::<Direction>().unwrap(), Direction::TiltUp);
        assert_eq!("wide".parse::<Direction>().unwrap(), Direction::ZoomOut);
        assert!("sideways".parse::<Direction>().is_err());
        assert_eq!(Direction::PanLeft.to_string(), "pan_left");
    }

    #[test]
    fn test_speed_table() {
        let wires: Vec<u8> = SpeedLevel::all().map(SpeedLevel::wire).collect();
        assert_eq!(wires, SPEED_TABLE);
        assert_eq!(SpeedLevel::MAX.level(), 7);
        assert!(SpeedLevel::new(8).is_none());
    }

    #[test]
    fn test_speed_menu_labels() {
        assert_eq!(SpeedLevel::from_menu_label(1), SpeedLevel::new(0));
        assert_eq!(SpeedLevel::from_menu_label(15), SpeedLevel::new(7));
        assert_eq!(SpeedLevel::from_menu_label(4), None);
        assert_eq!(SpeedLevel::from_menu_label(17), None);
        assert_eq!(SpeedLevel::new(4).unwrap().menu_label(), 9);
    }

    #[test]
    fn test_start_then_stop() {
        let (mock, link) = connected();
        let motion = MotionStateMachine::new();
        let speed = motion.speed();

        motion.start_motion(&link, Direction::TiltUp).unwrap();
        assert_eq!(
            motion.state(AxisGroup::Steer),
            MotionState::Active(Direction::TiltUp)
        );

        motion.stop_motion(&link, AxisGroup::Steer).unwrap();
        assert_eq!(motion.state(AxisGroup::Steer), MotionState::Idle);

        assert_eq!(
            mock.sent_frames(),
            vec![
                visca::start(Direction::TiltUp, speed),
                visca::stop(AxisGroup::Steer, speed)
            ]
        );
    }

    #[test]
    fn test_groups_are_independent() {
        let (mock, link) = connected();
        let motion = MotionStateMachine::new();

        motion.start_motion(&link, Direction::PanLeft).unwrap();
        motion.start_motion(&link, Direction::ZoomIn).unwrap();

        assert_eq!(
            motion.state(AxisGroup::Steer),
            MotionState::Active(Direction::PanLeft)
        );
        assert_eq!(
            motion.state(AxisGroup::Zoom),
            MotionState::Active(Direction::ZoomIn)
        );
        assert_eq!(mock.sent_frames().len(), 2);
    }

    #[test]
    fn test_speed_carried_into_next_start() {
        let (mock, link) = connected();
        let motion = MotionStateMachine::new();
        let fast = SpeedLevel::MAX;

        motion.start_motion(&link, Direction::PanRight).unwrap();
        motion.set_speed(&link, fast).unwrap();
        assert_eq!(
            motion.state(AxisGroup::Steer),
            MotionState::Active(Direction::PanRight)
        );
        motion.stop_motion(&link, AxisGroup::Steer).unwrap();
        motion.start_motion(&link, Direction::PanRight).unwrap();

        let frames = mock.sent_frames();
        assert_eq!(frames[1], visca::speed(fast));
        assert_eq!(frames[3], visca::start(Direction::PanRight, fast));
    }

    #[test]
    fn test_failed_stop_keeps_group_active() {
        let (mock, link) = connected();
        let motion = MotionStateMachine::new();

        motion.start_motion(&link, Direction::PanLeft).unwrap();
        mock.fail_next(TransportError::Timeout);

        assert_eq!(
            motion.start_motion(&link, Direction::PanRight),
            Err(ControlError::NotConnected)
        );
        assert!(!link.is_connected());
        // Stop attempted, start never sent
        assert_eq!(mock.sent_frames().len(), 2);
        assert_eq!(
            motion.state(AxisGroup::Steer),
            MotionState::Active(Direction::PanLeft)
        );
    }

    #[test]
    fn test_stop_owed_across_reconnect() {
        let (mock, link) = connected();
        let motion = MotionStateMachine::new();
        let speed = motion.speed();

        motion.start_motion(&link, Direction::PanLeft).unwrap();
        link.connect(Some(&"/dev/ttyUSB0".into()));
        assert_eq!(
            motion.state(AxisGroup::Steer),
            MotionState::Active(Direction::PanLeft)
        );

        motion.stop_motion(&link, AxisGroup::Steer).unwrap();
        assert_eq!(
            mock.sent_frames(),
            vec![
                visca::start(Direction::PanLeft, speed),
                visca::stop(AxisGroup::Steer, speed)
            ]
        );
        assert_eq!(motion.state(AxisGroup::Steer), MotionState::Idle);
    }

    #[test]
    fn test_failed_start_owes_stop() {
        let (mock, link) = connected();
        let motion = MotionStateMachine::new();
        let speed = motion.speed();

        mock.fail_next(TransportError::Timeout);
        assert_eq!(
            motion.start_motion(&link, Direction::ZoomIn),
            Err(ControlError::NotConnected)
        );
        link.connect(None);
        mock.clear_events();

        motion.stop_motion(&link, AxisGroup::Zoom).unwrap();
        assert_eq!(mock.sent_frames(), vec![visca::stop(AxisGroup::Zoom, speed)]);
    }

    #[test]
    fn test_repeated_start_resent_after_reconnect() {
        let (mock, link) = connected();
        let motion = MotionStateMachine::new();

        motion.start_motion(&link, Direction::ZoomOut).unwrap();
        link.disconnect();
        link.connect(None);
        mock.clear_events();

        motion.start_motion(&link, Direction::ZoomOut).unwrap();
        motion.start_motion(&link, Direction::ZoomOut).unwrap();
        assert_eq!(
            mock.sent_frames(),
            vec![visca::start(Direction::ZoomOut, motion.speed())]
        );
    }

    #[test]
    fn test_set_speed_rejected_while_disconnected() {
        let link = ConnectionManager::new(MockTransport::new());
        let motion = MotionStateMachine::new();

        assert_eq!(
            motion.set_speed(&link, SpeedLevel::MAX),
            Err(ControlError::NotConnected)
        );
        assert_eq!(motion.speed(), SpeedLevel::default());
    }
}
