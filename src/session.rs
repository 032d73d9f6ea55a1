//! Device session: owns the driver handles and exposes the host-facing
//! tracking, calibration and stereo surface.
//!
//! While the session is not [`SessionState::Active`] every getter returns a
//! fixed sentinel and every mutating call is a no-op.

use crate::config::FusionConfig;
use crate::driver::{DeviceManager, Driver, HmdDevice};
use crate::fusion::OrientationFusion;
use crate::magcal::MagneticCalibrator;
use crate::stereo::{self, StereoRequest};
use crate::types::{
    CalibrationState, DeviceDescriptor, EyeRenderParams, OrientationSample, UserProfile, Viewport,
    DEFAULT_IPD,
};
use crate::{HmdError, Result};
use glam::Quat;

/// Chromatic aberration correction reported while inactive.
pub const IDENTITY_CHROMA_AB_CORRECTION: [f32; 4] = [1.0, 0.0, 1.0, 0.0];

type DeviceOf<D> = <<D as Driver>::Manager as DeviceManager>::Device;
type SensorOf<D> = <DeviceOf<D> as HmdDevice>::Sensor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Active,
    Failed,
    Destroyed,
}

/// Handles held while active. Fields drop in declaration order,
/// the reverse of acquisition.
struct Handles<D: Driver> {
    sensor: SensorOf<D>,
    device: DeviceOf<D>,
    manager: D::Manager,
}

impl<D: Driver> Handles<D> {
    fn release(self) {
        let Handles {
            sensor,
            device,
            manager,
        } = self;
        drop(sensor);
        log::debug!("Sensor released");
        drop(device);
        log::debug!("Device released");
        drop(manager);
        log::debug!("Manager released");
    }
}

struct Acquired<D: Driver> {
    handles: Handles<D>,
    descriptor: DeviceDescriptor,
    profile: Option<UserProfile>,
}

/// Live state of an initialized session.
struct ActiveSession<D: Driver> {
    handles: Handles<D>,
    descriptor: DeviceDescriptor,
    profile: Option<UserProfile>,
    fusion: OrientationFusion,
    calibrator: MagneticCalibrator,
    pose: OrientationSample,
    stream_stopped: bool,
}

/// HMD session over a [`Driver`].
pub struct Session<D: Driver> {
    driver: D,
    fusion_config: FusionConfig,
    state: SessionState,
    active: Option<ActiveSession<D>>,
    /// Host-set IPD; wins over the descriptor's value.
    ipd: Option<f32>,
    last_error: Option<HmdError>,
}

impl<D: Driver> Session<D> {
    /// Session with fusion settings taken from the environment.
    pub fn new(driver: D) -> Self {
        Self::with_fusion_config(driver, FusionConfig::from_env())
    }

    pub fn with_fusion_config(driver: D, fusion_config: FusionConfig) -> Self {
        Self {
            driver,
            fusion_config,
            state: SessionState::Uninitialized,
            active: None,
            ipd: None,
            last_error: None,
        }
    }

    /// Acquire manager, device and sensor. Returns whether the session is
    /// now active; on failure every acquired handle has been released.
    pub fn init(&mut self) -> bool {
        if self.state == SessionState::Active {
            return true;
        }
        self.state = SessionState::Initializing;

        match self.acquire() {
            Ok(acquired) => {
                log::info!(
                    "HMD session active: {} {}x{}",
                    acquired.descriptor.display_name,
                    acquired.descriptor.h_resolution,
                    acquired.descriptor.v_resolution
                );
                let mut descriptor = acquired.descriptor;
                if let Some(ipd) = self.ipd {
                    descriptor.interpupillary_distance = ipd;
                }
                self.active = Some(ActiveSession {
                    handles: acquired.handles,
                    descriptor,
                    profile: acquired.profile,
                    fusion: OrientationFusion::new(self.fusion_config.clone()),
                    calibrator: MagneticCalibrator::new(),
                    pose: OrientationSample::default(),
                    stream_stopped: false,
                });
                self.last_error = None;
                self.state = SessionState::Active;
                true
            }
            Err(e) => {
                log::warn!("HMD session init failed: {}", e);
                self.last_error = Some(e);
                self.state = SessionState::Failed;
                false
            }
        }
    }

    /// Handles acquired so far drop in reverse order on every early return.
    fn acquire(&mut self) -> Result<Acquired<D>> {
        let mut manager = self.driver.create_manager()?;
        let mut device = manager.open_first_hmd()?;
        let profile = device.profile();
        let descriptor = device.descriptor()?;
        let sensor = device.open_sensor()?;
        Ok(Acquired {
            handles: Handles {
                sensor,
                device,
                manager,
            },
            descriptor,
            profile,
        })
    }

    /// Release sensor, device and manager. Safe to call in any state.
    pub fn destroy(&mut self) {
        if let Some(active) = self.active.take() {
            active.handles.release();
            self.state = SessionState::Destroyed;
            log::info!("HMD session destroyed");
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Error from the most recent failed [`init`](Self::init).
    pub fn last_error(&self) -> Option<&HmdError> {
        self.last_error.as_ref()
    }

    pub fn set_prediction(&mut self, delta_seconds: f32, enabled: bool) {
        if let Some(active) = self.active.as_mut() {
            active.fusion.set_prediction(delta_seconds, enabled);
        }
    }

    /// Fold all buffered sensor samples into the pose. Never blocks.
    pub fn poll(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        match active.fusion.poll(&mut active.handles.sensor) {
            Ok(_) => active.pose = active.fusion.pose(),
            Err(e) => {
                if !active.stream_stopped {
                    log::warn!("Sensor stream unavailable, keeping last pose: {}", e);
                    active.stream_stopped = true;
                }
            }
        }
    }

    /// Descriptor of the active device.
    pub fn descriptor(&self) -> Option<&DeviceDescriptor> {
        self.active.as_ref().map(|a| &a.descriptor)
    }

    fn descriptor_value<T>(&self, sentinel: T, f: impl FnOnce(&DeviceDescriptor) -> T) -> T {
        self.descriptor().map(f).unwrap_or(sentinel)
    }

    pub fn h_resolution(&self) -> i32 {
        self.descriptor_value(0, |d| d.h_resolution as i32)
    }

    pub fn v_resolution(&self) -> i32 {
        self.descriptor_value(0, |d| d.v_resolution as i32)
    }

    pub fn h_screen_size(&self) -> f32 {
        self.descriptor_value(0.0, |d| d.h_screen_size)
    }

    pub fn v_screen_size(&self) -> f32 {
        self.descriptor_value(0.0, |d| d.v_screen_size)
    }

    pub fn v_screen_center(&self) -> f32 {
        self.descriptor_value(0.0, |d| d.v_screen_center)
    }

    pub fn eye_to_screen_distance(&self) -> f32 {
        self.descriptor_value(0.0, |d| d.eye_to_screen_distance)
    }

    pub fn lens_separation_distance(&self) -> f32 {
        self.descriptor_value(0.0, |d| d.lens_separation_distance)
    }

    pub fn distortion_k(&self) -> [f32; 4] {
        self.descriptor_value([0.0; 4], |d| d.distortion_k)
    }

    pub fn chroma_ab_correction(&self) -> [f32; 4] {
        self.descriptor_value(IDENTITY_CHROMA_AB_CORRECTION, |d| d.chroma_ab_correction)
    }

    /// Last host-set IPD, else the device's, else [`DEFAULT_IPD`].
    pub fn interpupillary_distance(&self) -> f32 {
        self.ipd
            .or_else(|| self.descriptor().map(|d| d.interpupillary_distance))
            .unwrap_or(DEFAULT_IPD)
    }

    /// Persists in every state and survives failed inits.
    pub fn set_interpupillary_distance(&mut self, ipd: f32) {
        self.ipd = Some(ipd);
        if let Some(active) = self.active.as_mut() {
            active.descriptor.interpupillary_distance = ipd;
        }
    }

    fn pose(&self) -> OrientationSample {
        self.active.as_ref().map(|a| a.pose).unwrap_or_default()
    }

    pub fn yaw(&self) -> f32 {
        self.pose().yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pose().pitch
    }

    pub fn roll(&self) -> f32 {
        self.pose().roll
    }

    /// Identity while inactive.
    pub fn orientation(&self) -> Quat {
        self.pose().quaternion
    }

    /// Stereo parameters for `viewport`. Available in every state; without an
    /// active device the built-in reference geometry is used.
    pub fn eye_render_params(
        &self,
        viewport: Viewport,
        clip_near: f32,
        clip_far: f32,
        eye_to_screen_scale: f32,
        distortion_fit: (f32, f32),
    ) -> Result<EyeRenderParams> {
        let request = StereoRequest {
            viewport,
            ipd: self.interpupillary_distance(),
            eye_to_screen_scale,
            clip_near,
            clip_far,
            distortion_fit,
        };
        stereo::compute(self.descriptor(), &request)
    }

    pub fn begin_calibration(&mut self) {
        if let Some(active) = self.active.as_mut() {
            active.calibrator.begin(&mut active.fusion);
        }
    }

    /// Offer the current pose to the calibrator; returns the accepted sample count.
    pub fn update_calibration(&mut self) -> u32 {
        match self.active.as_mut() {
            Some(active) => active.calibrator.update(&mut active.fusion),
            None => 0,
        }
    }

    pub fn is_calibrated(&self) -> bool {
        self.active.as_ref().is_some_and(|a| a.calibrator.is_calibrated())
    }

    pub fn calibration_state(&self) -> CalibrationState {
        self.active
            .as_ref()
            .map(|a| a.calibrator.state())
            .unwrap_or_default()
    }

    pub fn set_mag_ref_distance(&mut self, distance: f32) {
        if let Some(active) = self.active.as_mut() {
            active.fusion.set_mag_ref_distance(distance);
        }
    }

    /// Return the head pose to the reference orientation.
    pub fn reset(&mut self) {
        if let Some(active) = self.active.as_mut() {
            active.fusion.reset();
            active.pose = active.fusion.pose();
        }
    }

    pub fn is_yaw_correction_in_progress(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| a.fusion.is_yaw_correction_in_progress())
    }

    /// Profile read from the device at init, if any.
    pub fn user_profile(&self) -> Option<&UserProfile> {
        self.active.as_ref().and_then(|a| a.profile.as_ref())
    }
}

impl<D: Driver> Drop for Session<D> {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{FailurePoint, MockDriver};

    fn session(driver: MockDriver) -> Session<MockDriver> {
        Session::with_fusion_config(driver, FusionConfig::default())
    }

    #[test]
    fn test_state_transitions() {
        let mut s = session(MockDriver::new());
        assert_eq!(s.state(), SessionState::Uninitialized);
        assert!(s.init());
        assert_eq!(s.state(), SessionState::Active);
        assert!(s.init());
        s.destroy();
        assert_eq!(s.state(), SessionState::Destroyed);
        assert!(s.init());
        assert!(s.is_active());
    }

    #[test]
    fn test_failed_init_keeps_error() {
        let mut s = session(MockDriver::new().fail_at(FailurePoint::Sensor));
        assert!(!s.init());
        assert_eq!(s.state(), SessionState::Failed);
        assert!(matches!(s.last_error(), Some(HmdError::Driver(_))));
        assert!(s.descriptor().is_none());
    }

    #[test]
    fn test_host_ipd_overrides_descriptor() {
        let mut s = session(MockDriver::new());
        assert!(s.init());
        assert_eq!(s.interpupillary_distance(), 0.064);
        s.set_interpupillary_distance(0.07);
        assert_eq!(s.descriptor().unwrap().interpupillary_distance, 0.07);
        s.destroy();
        assert_eq!(s.interpupillary_distance(), 0.07);
    }

    #[test]
    fn test_inactive_mutators_are_noops() {
        let mut s = session(MockDriver::new());
        s.set_prediction(0.02, true);
        s.poll();
        s.begin_calibration();
        assert_eq!(s.update_calibration(), 0);
        s.reset();
        assert_eq!(s.calibration_state(), CalibrationState::Idle);
        assert_eq!(s.orientation(), Quat::IDENTITY);
    }
}
