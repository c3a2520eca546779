//! Preset slots and the in-memory preset store.
//!
//! A preset maps a small slot number (1 to 10) to a captured [`Pose`]. The
//! store is plain data; capture, recall and persistence are orchestrated by
//! the [`Controller`](crate::controller::Controller).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::pose::Pose;

/// Slot number rejected at the type boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Preset slot must be {min}-{max}, got {value:?}", min = PresetSlot::MIN, max = PresetSlot::MAX)]
pub struct InvalidSlot {
    value: String,
}

/// A preset slot number in `1..=10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PresetSlot(u8);

impl PresetSlot {
    /// Lowest slot number.
    pub const MIN: u8 = 1;
    /// Highest slot number.
    pub const MAX: u8 = 10;

    /// Slot `n`, or `None` outside `1..=10`.
    pub fn new(n: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&n).then_some(Self(n))
    }

    /// Slot number.
    pub fn get(self) -> u8 {
        self.0
    }

    /// Every slot, ascending.
    pub fn all() -> impl Iterator<Item = PresetSlot> {
        (Self::MIN..=Self::MAX).map(PresetSlot)
    }
}

impl TryFrom<u8> for PresetSlot {
    type Error = InvalidSlot;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        Self::new(n).ok_or_else(|| InvalidSlot {
            value: n.to_string(),
        })
    }
}

impl std::str::FromStr for PresetSlot {
    type Err = InvalidSlot;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u8>()
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| InvalidSlot {
                value: s.to_string(),
            })
    }
}

impl fmt::Display for PresetSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Poses stored by slot. One pose per slot; storing again replaces it.
///
/// Serialized as a JSON object keyed by the slot number as a string. Keys that
/// are not valid slots are dropped with a warning when loading.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, Pose>", into = "BTreeMap<String, Pose>")]
pub struct PresetStore {
    slots: BTreeMap<PresetSlot, Pose>,
}

impl PresetStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pose stored at `slot`.
    pub fn get(&self, slot: PresetSlot) -> Option<Pose> {
        self.slots.get(&slot).copied()
    }

    /// Store `pose` at `slot`, returning what was there.
    pub fn insert(&mut self, slot: PresetSlot, pose: Pose) -> Option<Pose> {
        self.slots.insert(slot, pose)
    }

    /// Put `slot` back to `previous` (a value returned by [`insert`](Self::insert)).
    pub fn restore(&mut self, slot: PresetSlot, previous: Option<Pose>) {
        match previous {
            Some(pose) => {
                self.slots.insert(slot, pose);
            }
            None => {
                self.slots.remove(&slot);
            }
        }
    }

    /// Stored presets, ascending by slot.
    pub fn iter(&self) -> impl Iterator<Item = (PresetSlot, Pose)> + '_ {
        self.slots.iter().map(|(&slot, &pose)| (slot, pose))
    }

    /// Number of stored presets.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when no preset is stored.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl From<BTreeMap<String, Pose>> for PresetStore {
    fn from(raw: BTreeMap<String, Pose>) -> Self {
        let mut slots = BTreeMap::new();
        for (key, pose) in raw {
            match key.parse::<PresetSlot>() {
                Ok(slot) => {
                    slots.insert(slot, pose);
                }
                Err(e) => warn!("Dropping preset: {e}"),
            }
        }
        Self { slots }
    }
}

impl From<PresetStore> for BTreeMap<String, Pose> {
    fn from(store: PresetStore) -> Self {
        store
            .slots
            .into_iter()
            .map(|(slot, pose)| (slot.to_string(), pose))
            .collect()
    }
}
