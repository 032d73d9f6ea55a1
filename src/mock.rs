//! Scriptable in-process driver.
//!
//! Serves a fixed descriptor and profile, replays samples pushed through a
//! [`MockFeeder`], can be told to fail at any acquisition step, and records
//! every handle acquisition and release.

use crate::driver::{DeviceManager, Driver, HmdDevice, SensorDevice};
use crate::types::{DeviceDescriptor, SensorSample, UserProfile};
use crate::{HmdError, Result};
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Kinds of handle handed out by a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handle {
    Manager,
    Device,
    Sensor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockEvent {
    Acquired(Handle),
    Released(Handle),
}

/// Acquisition step at which the mock reports an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePoint {
    Manager,
    Device,
    Descriptor,
    Sensor,
}

/// Shared record of handle events.
#[derive(Debug, Clone, Default)]
pub struct MockEventLog(Arc<Mutex<Vec<MockEvent>>>);

impl MockEventLog {
    fn record(&self, event: MockEvent) {
        if let Ok(mut events) = self.0.lock() {
            events.push(event);
        }
    }

    pub fn snapshot(&self) -> Vec<MockEvent> {
        self.0.lock().map(|events| events.clone()).unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.0.lock() {
            events.clear();
        }
    }
}

/// Pushes samples into the mock sensor stream.
#[derive(Clone)]
pub struct MockFeeder {
    sender: Sender<SensorSample>,
    stopped: Arc<AtomicBool>,
}

impl MockFeeder {
    pub fn push(&self, sample: SensorSample) {
        // The driver's state holds a receiver, so the channel stays connected.
        let _ = self.sender.send(sample);
    }

    /// Stop the stream; the sensor reports an error once drained.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }
}

/// Shared state every mock handle clones from the driver.
#[derive(Clone)]
struct MockState {
    descriptor: DeviceDescriptor,
    profile: Option<UserProfile>,
    fail_at: Option<FailurePoint>,
    events: MockEventLog,
    receiver: Receiver<SensorSample>,
    stopped: Arc<AtomicBool>,
}

impl MockState {
    fn fails_at(&self, point: FailurePoint) -> bool {
        self.fail_at == Some(point)
    }
}

pub struct MockDriver {
    state: MockState,
    sender: Sender<SensorSample>,
}

impl MockDriver {
    /// Mock serving the reference DK1 geometry and no profile.
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            state: MockState {
                descriptor: DeviceDescriptor::reference(),
                profile: None,
                fail_at: None,
                events: MockEventLog::default(),
                receiver,
                stopped: Arc::new(AtomicBool::new(false)),
            },
            sender,
        }
    }

    pub fn with_descriptor(mut self, descriptor: DeviceDescriptor) -> Self {
        self.state.descriptor = descriptor;
        self
    }

    pub fn with_profile(mut self, profile: UserProfile) -> Self {
        self.state.profile = Some(profile);
        self
    }

    pub fn fail_at(mut self, point: FailurePoint) -> Self {
        self.state.fail_at = Some(point);
        self
    }

    pub fn feeder(&self) -> MockFeeder {
        MockFeeder {
            sender: self.sender.clone(),
            stopped: self.state.stopped.clone(),
        }
    }

    pub fn event_log(&self) -> MockEventLog {
        self.state.events.clone()
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for MockDriver {
    type Manager = MockManager;

    fn create_manager(&mut self) -> Result<MockManager> {
        if self.state.fails_at(FailurePoint::Manager) {
            return Err(HmdError::Driver("mock manager unavailable".into()));
        }
        self.state.events.record(MockEvent::Acquired(Handle::Manager));
        Ok(MockManager {
            state: self.state.clone(),
        })
    }
}

pub struct MockManager {
    state: MockState,
}

impl DeviceManager for MockManager {
    type Device = MockHmd;

    fn open_first_hmd(&mut self) -> Result<MockHmd> {
        if self.state.fails_at(FailurePoint::Device) {
            return Err(HmdError::DeviceNotFound);
        }
        self.state.events.record(MockEvent::Acquired(Handle::Device));
        Ok(MockHmd {
            state: self.state.clone(),
        })
    }
}

impl Drop for MockManager {
    fn drop(&mut self) {
        self.state.events.record(MockEvent::Released(Handle::Manager));
    }
}

pub struct MockHmd {
    state: MockState,
}

impl HmdDevice for MockHmd {
    type Sensor = MockSensor;

    fn descriptor(&mut self) -> Result<DeviceDescriptor> {
        if self.state.fails_at(FailurePoint::Descriptor) {
            return Err(HmdError::NoDisplayInfo);
        }
        Ok(self.state.descriptor.clone())
    }

    fn profile(&self) -> Option<UserProfile> {
        self.state.profile.clone()
    }

    fn open_sensor(&mut self) -> Result<MockSensor> {
        if self.state.fails_at(FailurePoint::Sensor) {
            return Err(HmdError::Driver("mock sensor unavailable".into()));
        }
        self.state.events.record(MockEvent::Acquired(Handle::Sensor));
        Ok(MockSensor {
            receiver: self.state.receiver.clone(),
            stopped: self.state.stopped.clone(),
            events: self.state.events.clone(),
        })
    }
}

impl Drop for MockHmd {
    fn drop(&mut self) {
        self.state.events.record(MockEvent::Released(Handle::Device));
    }
}

pub struct MockSensor {
    receiver: Receiver<SensorSample>,
    stopped: Arc<AtomicBool>,
    events: MockEventLog,
}

impl SensorDevice for MockSensor {
    fn try_sample(&mut self) -> Result<Option<SensorSample>> {
        match self.receiver.try_recv() {
            Ok(sample) => Ok(Some(sample)),
            Err(_) if self.stopped.load(Ordering::Relaxed) => Err(HmdError::StreamStopped),
            Err(_) => Ok(None),
        }
    }
}

impl Drop for MockSensor {
    fn drop(&mut self) {
        self.events.record(MockEvent::Released(Handle::Sensor));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn sample() -> SensorSample {
        SensorSample {
            accelerometer: Vec3::new(0.0, 9.81, 0.0),
            gyroscope: Vec3::ZERO,
            magnetometer: Vec3::ZERO,
            time_delta: 0.001,
        }
    }

    #[test]
    fn test_handles_record_acquire_and_release() {
        let mut driver = MockDriver::new();
        let log = driver.event_log();
        {
            let mut manager = driver.create_manager().unwrap();
            let mut hmd = manager.open_first_hmd().unwrap();
            let _sensor = hmd.open_sensor().unwrap();
        }
        assert_eq!(
            log.snapshot(),
            vec![
                MockEvent::Acquired(Handle::Manager),
                MockEvent::Acquired(Handle::Device),
                MockEvent::Acquired(Handle::Sensor),
                MockEvent::Released(Handle::Sensor),
                MockEvent::Released(Handle::Device),
                MockEvent::Released(Handle::Manager),
            ]
        );
    }

    #[test]
    fn test_feeder_and_stop() {
        let mut driver = MockDriver::new();
        let feeder = driver.feeder();
        let mut manager = driver.create_manager().unwrap();
        let mut hmd = manager.open_first_hmd().unwrap();
        let mut sensor = hmd.open_sensor().unwrap();

        assert!(sensor.try_sample().unwrap().is_none());
        feeder.push(sample());
        feeder.stop();
        assert!(sensor.try_sample().unwrap().is_some());
        assert!(matches!(sensor.try_sample(), Err(HmdError::StreamStopped)));
    }

    #[test]
    fn test_failure_point() {
        let mut driver = MockDriver::new().fail_at(FailurePoint::Descriptor);
        let mut manager = driver.create_manager().unwrap();
        let mut hmd = manager.open_first_hmd().unwrap();
        assert!(matches!(hmd.descriptor(), Err(HmdError::NoDisplayInfo)));
    }
}
