//! # riftcore - head tracking and stereo setup for Rift-class HMDs
//!
//! Bridges an HMD tracker to a stereoscopic renderer. Provides:
//! - A device session with strict handle lifecycle (manager, device, sensor)
//! - Orientation fusion with gravity tilt correction, magnetic yaw-drift
//!   correction and prediction
//! - Automatic hard-iron magnetometer calibration
//! - Per-eye viewport, projection and view-adjust matrices for the device optics
//! - A hidapi driver for the Rift DK1 and an in-process mock driver
//!
//! ## Quick Start
//! ```no_run
//! use riftcore::{RiftDriver, Session, Viewport};
//!
//! let mut session = Session::new(RiftDriver::default());
//! if !session.init() {
//!     eprintln!("no HMD: {:?}", session.last_error());
//! }
//! session.set_prediction(0.03, true);
//!
//! loop {
//!     session.poll();
//!     println!("yaw={:+.3}", session.yaw());
//!     let params = session
//!         .eye_render_params(Viewport::new(0, 0, 1280, 800), 0.1, 1000.0, 1.0, (-1.0, 0.0))
//!         .unwrap();
//!     println!("render scale {:.3}", params.render_scale);
//! }
//! ```

pub mod error;
pub mod types;
pub mod protocol;
pub mod hid;
pub mod driver;
pub mod device;
pub mod tracker;
pub mod config;
pub mod fusion;
pub mod magcal;
pub mod stereo;
pub mod session;
pub mod mock;

pub use config::{DriverConfig, FusionConfig};
pub use device::RiftDriver;
pub use error::HmdError;
pub use session::{Session, SessionState};
pub use types::*;

/// Result type alias for HMD operations.
pub type Result<T> = std::result::Result<T, HmdError>;
