//! # joycon - Rust driver for Nintendo Joy-Con controllers
//!
//! Talks to one Joy-Con half over hidapi. Provides:
//! - Device discovery and the attach/detach handshake
//! - Stick and gyroscope calibration read from controller flash
//! - Decoding of stick, buttons (with press/release edges) and IMU samples
//! - A complementary filter fusing gyro and accelerometer into an orientation basis
//! - C FFI for integration with C/C++ hosts
//!
//! ## Quick Start
//! ```no_run
//! use joycon::{Button, Controller, ControllerConfig, PlayerLeds};
//!
//! let mut controller = Controller::open_first(None, ControllerConfig::from_env()).unwrap();
//! let poller = joycon::controller::attach_with_poller(&mut controller, PlayerLeds::PLAYER_1).unwrap();
//!
//! for _ in 0..600 {
//!     controller.update().unwrap();
//!     if controller.button_down(Button::Home) {
//!         controller.recenter();
//!     }
//!     println!("stick: {:?} euler: {:?}", controller.stick(), controller.euler_deg());
//!     std::thread::sleep(std::time::Duration::from_millis(16));
//! }
//!
//! poller.stop();
//! controller.detach();
//! ```

pub mod error;
pub mod types;
pub mod config;
pub mod protocol;
pub mod transport;
pub mod hid;
pub mod command;
pub mod calibration;
pub mod report;
pub mod orientation;
pub mod queue;
pub mod poller;
pub mod controller;
pub mod ffi;

pub use calibration::Calibration;
pub use config::ControllerConfig;
pub use controller::{Controller, ControllerState, Diagnostics};
pub use error::JoyConError;
pub use hid::{list_devices, HidTransport};
pub use orientation::{OrientationBasis, OrientationFilter};
pub use poller::{PollOutcome, Poller, PollerHandle};
pub use transport::Transport;
pub use types::*;

/// Result type alias for joycon operations.
pub type Result<T> = std::result::Result<T, JoyConError>;
