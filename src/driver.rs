//! Narrow interface between the session and a device driver.
//!
//! A driver hands out three kinds of handles in a fixed order: a manager,
//! the HMD device opened through it, and the motion sensor opened on that
//! device. Every handle is an owned value and releases its underlying
//! resource when dropped.

use crate::types::{DeviceDescriptor, SensorSample, UserProfile};
use crate::Result;

/// Entry point of a device driver.
pub trait Driver {
    type Manager: DeviceManager;

    /// Acquire a device-manager handle.
    fn create_manager(&mut self) -> Result<Self::Manager>;
}

/// Enumerates and opens HMDs.
pub trait DeviceManager {
    type Device: HmdDevice;

    /// Open the first attached HMD.
    fn open_first_hmd(&mut self) -> Result<Self::Device>;
}

/// An opened HMD.
pub trait HmdDevice {
    type Sensor: SensorDevice;

    /// Read the static geometry/optics description.
    fn descriptor(&mut self) -> Result<DeviceDescriptor>;

    /// Profile associated with this device, if any.
    fn profile(&self) -> Option<UserProfile>;

    /// Open the motion sensor.
    fn open_sensor(&mut self) -> Result<Self::Sensor>;
}

/// Stream of raw motion samples.
pub trait SensorDevice {
    /// Next buffered sample without blocking.
    ///
    /// `Ok(None)` means nothing is buffered; `Err` means the stream has stopped.
    fn try_sample(&mut self) -> Result<Option<SensorSample>>;
}
