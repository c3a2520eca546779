//! Operator intents and how they reach the controller.
//!
//! Buttons, keys and REPL lines all reduce to an [`Intent`].
//! [`Controller::dispatch`] maps each intent to exactly one controller
//! operation, so the wiring can be tested without any UI.
//!
//! # Keyboard
//!
//! | Key | Direction |
//! |-----|-----------|
//! | W | tilt up |
//! | A | pan left |
//! | S | tilt down |
//! | D | pan right |
//! | E | zoom in |
//! | Q | zoom out |
//!
//! A press starts the direction and a release stops its group. Auto-repeat
//! presses are dropped here; the motion state machine would ignore them
//! anyway, but there is no point taking its lock for every repeat.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::config::ConfigStore;
use crate::controller::Controller;
use crate::error::ControlResult;
use crate::motion::{AxisGroup, Direction, SpeedLevel};
use crate::pose::Pose;
use crate::presets::PresetSlot;
use crate::transport::Transport;

/// Something the operator asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Direction button or key went down
    Press(Direction),
    /// Button or key for a group went up
    Release(AxisGroup),
    /// Pick a steer speed
    SetSpeed(SpeedLevel),
    /// Store the current pose in a slot
    SetPreset(PresetSlot),
    /// Drive to a stored pose
    RecallPreset(PresetSlot),
    /// Flip between autofocus and manual focus
    ToggleAutofocus,
    /// Switch to autofocus
    EnableAutofocus,
    /// Switch to manual focus
    DisableAutofocus,
    /// Manual focus set-point
    SetFocus(i32),
    /// Read the focus position
    GetFocus,
    /// Stop everything
    Halt,
}

/// What a dispatched intent produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing to report
    Done,
    /// A focus reading
    Focus(i32),
    /// Pose stored by a preset set
    Stored(Pose),
    /// Pose recalled, or `None` for an unset slot
    Recalled(Option<Pose>),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Done => write!(f, "ok"),
            Outcome::Focus(value) => write!(f, "focus {value}"),
            Outcome::Stored(pose) | Outcome::Recalled(Some(pose)) => write!(
                f,
                "pan {} tilt {} zoom {} focus {}",
                pose.pan, pose.tilt, pose.zoom, pose.focus
            ),
            Outcome::Recalled(None) => write!(f, "preset empty"),
        }
    }
}

impl<T: Transport, S: ConfigStore> Controller<T, S> {
    /// Run the operation bound to `intent`.
    pub fn dispatch(&self, intent: Intent) -> ControlResult<Outcome> {
        match intent {
            Intent::Press(direction) => self.start_motion(direction).map(|()| Outcome::Done),
            Intent::Release(group) => self.stop_motion(group).map(|()| Outcome::Done),
            Intent::SetSpeed(level) => self.set_speed(level).map(|()| Outcome::Done),
            Intent::SetPreset(slot) => self.set_preset(slot).map(Outcome::Stored),
            Intent::RecallPreset(slot) => self.recall_preset(slot).map(Outcome::Recalled),
            Intent::ToggleAutofocus => self.toggle_autofocus().map(Outcome::Focus),
            Intent::EnableAutofocus => self.enable_autofocus().map(|()| Outcome::Done),
            Intent::DisableAutofocus => self.disable_autofocus().map(|()| Outcome::Done),
            Intent::SetFocus(value) => self.set_focus(value).map(|()| Outcome::Done),
            Intent::GetFocus => self.get_focus().map(Outcome::Focus),
            Intent::Halt => self.halt().map(|()| Outcome::Done),
        }
    }
}

// ==================== Keyboard ====================

/// Steering keys, lowercase.
pub const KEY_BINDINGS: &[(char, Direction)] = &[
    ('w', Direction::TiltUp),
    ('a', Direction::PanLeft),
    ('s', Direction::TiltDown),
    ('d', Direction::PanRight),
    ('e', Direction::ZoomIn),
    ('q', Direction::ZoomOut),
];

/// A key going down or up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    /// Character the key produces, any case
    pub key: char,
    /// Down rather than up
    pub pressed: bool,
    /// Synthesized by the OS while the key is held
    pub auto_repeat: bool,
}

impl KeyEvent {
    /// A fresh key-down.
    pub fn press(key: char) -> Self {
        Self {
            key,
            pressed: true,
            auto_repeat: false,
        }
    }

    /// A key-up.
    pub fn release(key: char) -> Self {
        Self {
            key,
            pressed: false,
            auto_repeat: false,
        }
    }
}

/// Direction bound to `key`, ignoring case.
pub fn key_direction(key: char) -> Option<Direction> {
    let key = key.to_ascii_lowercase();
    KEY_BINDINGS
        .iter()
        .find(|(bound, _)| *bound == key)
        .map(|&(_, direction)| direction)
}

/// Intent for a key event, or `None` for unbound keys and auto-repeats.
pub fn key_intent(event: KeyEvent) -> Option<Intent> {
    if event.auto_repeat {
        return None;
    }
    let direction = key_direction(event.key)?;
    Some(if event.pressed {
        Intent::Press(direction)
    } else {
        Intent::Release(direction.group())
    })
}

// ==================== Text ====================

/// Error parsing an intent from a command line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseIntentError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown command: {0}")]
    Unknown(String),

    /// Known command with a bad or missing argument
    #[error("{command}: {reason}")]
    BadArgument { command: String, reason: String },
}

fn bad_argument(command: &str, reason: impl fmt::Display) -> ParseIntentError {
    ParseIntentError::BadArgument {
        command: command.to_string(),
        reason: reason.to_string(),
    }
}

impl FromStr for Intent {
    type Err = ParseIntentError;

    /// Parse REPL words.
    ///
    /// ```text
    /// left | right | up | down | in | out   start moving
    /// stop <steer|zoom>                     stop one group
    /// stop | halt                           stop everything
    /// speed <0-7>
    /// set <1-10> | recall <1-10>            presets
    /// af [on|off|toggle]
    /// focus [value]                         read or set focus
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let words: Vec<String> = s.split_whitespace().map(str::to_ascii_lowercase).collect();
        let (command, args) = match words.split_first() {
            Some((command, args)) => (command.as_str(), args),
            None => return Err(ParseIntentError::Empty),
        };
        let arg = |what: &str| {
            args.first()
                .map(String::as_str)
                .ok_or_else(|| bad_argument(command, format!("missing {what}")))
        };

        match command {
            "stop" => match args.first() {
                Some(group) => group
                    .parse()
                    .map(Intent::Release)
                    .map_err(|e| bad_argument(command, e)),
                None => Ok(Intent::Halt),
            },
            "halt" => Ok(Intent::Halt),
            "speed" => arg("level")?
                .parse()
                .map(Intent::SetSpeed)
                .map_err(|e| bad_argument(command, e)),
            "set" | "store" => arg("slot")?
                .parse()
                .map(Intent::SetPreset)
                .map_err(|e| bad_argument(command, e)),
            "recall" | "go" => arg("slot")?
                .parse()
                .map(Intent::RecallPreset)
                .map_err(|e| bad_argument(command, e)),
            "af" | "autofocus" => match args.first().map(String::as_str) {
                None | Some("toggle") => Ok(Intent::ToggleAutofocus),
                Some("on") => Ok(Intent::EnableAutofocus),
                Some("off") => Ok(Intent::DisableAutofocus),
                Some(other) => Err(bad_argument(command, format!("expected on/off, got {other}"))),
            },
            "focus" => match args.first() {
                Some(value) => value
                    .parse()
                    .map(Intent::SetFocus)
                    .map_err(|e| bad_argument(command, e)),
                None => Ok(Intent::GetFocus),
            },
            other => other
                .parse::<Direction>()
                .map(Intent::Press)
                .map_err(|_| ParseIntentError::Unknown(other.to_string())),
        }
    }
}
