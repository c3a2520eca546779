//! Controller core for VISCA pan-tilt-zoom cameras on a serial link.
//!
//! The crate turns discrete operator intents ("start panning left", "stop",
//! "recall preset 3") into an ordered stream of camera frames, keeping at most
//! one active motion per axis group and demoting the connection whenever the
//! serial link fails.
//!
//! # Layers
//!
//! - [`transport`] - the [`Transport`](transport::Transport) seam and the
//!   `serialport`-backed [`SerialTransport`](transport::SerialTransport)
//! - [`visca`] - frame builders and reply decoding
//! - [`connection`] - probing, binding and failure demotion
//! - [`motion`] - per axis-group motion state machine and speed table
//! - [`focus`] - autofocus toggle and manual focus set-points
//! - [`pose`] - absolute pose capture and recall
//! - [`presets`] - preset slots and the in-memory preset store
//! - [`config`] - the persisted JSON document and its stores
//! - [`controller`] - the intent-level facade
//! - [`intent`] - static intent table for UI and keyboard wiring
//! - [`mock`] - scriptable in-memory camera for tests and dry runs
//!
//! # Example
//!
//! ```no_run
//! use tandyberg::config::JsonFileStore;
//! use tandyberg::controller::Controller;
//! use tandyberg::motion::{AxisGroup, Direction};
//! use tandyberg::transport::SerialTransport;
//!
//! let controller = Controller::open(SerialTransport::default(), JsonFileStore::default());
//! println!("{}", controller.connection_state());
//!
//! controller.start_motion(Direction::PanLeft)?;
//! controller.stop_motion(AxisGroup::Steer)?;
//! # Ok::<(), tandyberg::error::ControlError>(())
//! ```

pub mod config;
pub mod connection;
pub mod controller;
pub mod error;
pub mod focus;
pub mod intent;
pub mod mock;
pub mod motion;
pub mod pose;
pub mod presets;
pub mod transport;
pub mod visca;

pub use connection::{ConnectionManager, ConnectionState};
pub use controller::Controller;
pub use error::{ControlError, ControlResult};
pub use transport::{InterfaceId, Transport, TransportError};
