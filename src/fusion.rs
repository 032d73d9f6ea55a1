//! Orientation fusion: gyro integration with gravity tilt correction,
//! magnetometer yaw-drift correction and predictive extrapolation.

use crate::config::FusionConfig;
use crate::driver::SensorDevice;
use crate::types::{OrientationSample, SensorSample};
use crate::Result;
use glam::{Quat, Vec3, Vec4};

/// Standard gravity, m/s^2.
const GRAVITY: f32 = 9.81;
/// Accelerometer magnitude must be within this of `GRAVITY` to be trusted as "down".
const GRAVITY_TOLERANCE: f32 = 1.0;
/// Above this angular rate (rad/s) the accelerometer is not used for tilt.
const STILL_RATE: f32 = 0.1;
/// Fraction of the tilt error removed per sample.
const TILT_GAIN: f32 = 0.02;
const TILT_DEADBAND: f32 = 1e-3;
/// Fraction of the yaw error removed per sample.
const YAW_GAIN: f32 = 0.01;
const YAW_DEADBAND: f32 = 1e-3;
const MAX_YAW_STEP: f32 = 0.005;
/// Magnetic references kept for yaw correction.
const MAX_MAG_REFS: usize = 8;
/// Angular rates below this (rad/s) are not extrapolated.
const MIN_PREDICTION_RATE: f32 = 0.001;

/// Squared distance between two orientations, ignoring quaternion sign.
pub(crate) fn quat_distance_sq(a: Quat, b: Quat) -> f32 {
    let (a, b) = (Vec4::from(a), Vec4::from(b));
    (a - b).length_squared().min((a + b).length_squared())
}

/// Wrap an angle to [-pi, pi].
fn wrap_angle(a: f32) -> f32 {
    let two_pi = std::f32::consts::TAU;
    let wrapped = (a + std::f32::consts::PI).rem_euclid(two_pi) - std::f32::consts::PI;
    if wrapped < -std::f32::consts::PI {
        wrapped + two_pi
    } else {
        wrapped
    }
}

/// Heading of the horizontal projection of a world-frame vector.
/// Rotation about +Y by `a` increases it by `a`.
fn heading(v: Vec3) -> Option<f32> {
    let horizontal = Vec3::new(v.x, 0.0, v.z);
    if horizontal.length_squared() < 0.0025 * v.length_squared() {
        return None;
    }
    Some(v.x.atan2(v.z))
}

/// World-frame magnetic field observed at a given orientation.
#[derive(Debug, Clone, Copy)]
struct MagReference {
    orientation: Quat,
    field: Vec3,
}

/// Prediction settings.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Prediction {
    delta: f32,
    enabled: bool,
}

/// Continuously updated head orientation estimate.
pub struct OrientationFusion {
    config: FusionConfig,
    orientation: Quat,
    angular_velocity: Vec3,
    acceleration: Vec3,
    raw_magnetometer: Vec3,
    prediction: Prediction,
    yaw_correction_enabled: bool,
    yaw_correction_in_progress: bool,
    /// Hard-iron offset installed by magnetic calibration.
    mag_center: Option<Vec3>,
    mag_refs: Vec<MagReference>,
    sample_count: u64,
}

impl OrientationFusion {
    pub fn new(config: FusionConfig) -> Self {
        Self {
            config,
            orientation: Quat::IDENTITY,
            angular_velocity: Vec3::ZERO,
            acceleration: Vec3::ZERO,
            raw_magnetometer: Vec3::ZERO,
            prediction: Prediction {
                delta: 0.0,
                enabled: false,
            },
            yaw_correction_enabled: false,
            yaw_correction_in_progress: false,
            mag_center: None,
            mag_refs: Vec::new(),
            sample_count: 0,
        }
    }

    /// Drain every buffered sample from `sensor` without blocking.
    ///
    /// Returns how many samples were folded in; zero leaves the estimate untouched.
    pub fn poll<S: SensorDevice>(&mut self, sensor: &mut S) -> Result<usize> {
        let mut consumed = 0;
        while let Some(sample) = sensor.try_sample()? {
            self.handle_sample(&sample);
            consumed += 1;
        }
        if consumed > 0 {
            log::trace!("Fused {} samples", consumed);
        }
        Ok(consumed)
    }

    /// Fold one raw sample into the estimate.
    pub fn handle_sample(&mut self, sample: &SensorSample) {
        self.angular_velocity = sample.gyroscope;
        self.acceleration = sample.accelerometer;
        self.raw_magnetometer = sample.magnetometer;
        self.sample_count += 1;

        let rate = sample.gyroscope.length();
        let angle = rate * sample.time_delta;
        if angle > 0.0 {
            let delta = Quat::from_axis_angle(sample.gyroscope / rate, angle);
            self.orientation = (self.orientation * delta).normalize();
        }

        if self.config.gravity_correction {
            self.correct_tilt(rate);
        }
        self.correct_yaw();
    }

    /// Nudge the estimate so the measured acceleration points up.
    fn correct_tilt(&mut self, rate: f32) {
        let accel = self.acceleration;
        if rate > STILL_RATE || (accel.length() - GRAVITY).abs() > GRAVITY_TOLERANCE {
            return;
        }

        let up_measured = (self.orientation * accel).normalize_or_zero();
        let angle = up_measured.angle_between(Vec3::Y);
        if !(angle > TILT_DEADBAND) {
            return;
        }

        let axis = up_measured.cross(Vec3::Y).normalize_or_zero();
        if axis == Vec3::ZERO {
            return;
        }
        self.orientation = (Quat::from_axis_angle(axis, angle * TILT_GAIN) * self.orientation).normalize();
    }

    /// Compare the current field against the nearest stored reference and
    /// rotate about the vertical axis to close the heading gap.
    fn correct_yaw(&mut self) {
        self.yaw_correction_in_progress = false;
        if !self.yaw_correction_enabled {
            return;
        }
        let Some(center) = self.mag_center else {
            return;
        };

        let mag = self.raw_magnetometer - center;
        if mag.length_squared() < 1e-6 {
            return;
        }
        let field = self.orientation * mag;

        let nearest = self
            .mag_refs
            .iter()
            .map(|r| (quat_distance_sq(r.orientation, self.orientation), r.field))
            .min_by(|a, b| a.0.total_cmp(&b.0));

        let max_distance = self.config.mag_ref_distance;
        match nearest {
            Some((distance_sq, reference)) if distance_sq <= max_distance * max_distance => {
                let (Some(measured), Some(target)) = (heading(field), heading(reference)) else {
                    return;
                };
                let error = wrap_angle(target - measured);
                if error.abs() > YAW_DEADBAND {
                    let step = (error * YAW_GAIN).clamp(-MAX_YAW_STEP, MAX_YAW_STEP);
                    self.orientation = (Quat::from_rotation_y(step) * self.orientation).normalize();
                    self.yaw_correction_in_progress = true;
                }
            }
            _ if self.mag_refs.len() < MAX_MAG_REFS => {
                self.mag_refs.push(MagReference {
                    orientation: self.orientation,
                    field,
                });
                log::debug!("Captured magnetic reference #{}", self.mag_refs.len());
            }
            _ => {}
        }
    }

    /// Unpredicted orientation.
    pub fn orientation(&self) -> Quat {
        self.orientation
    }

    /// Orientation extrapolated `delta` seconds ahead with the latest angular velocity.
    /// Equals [`orientation`](Self::orientation) while prediction is disabled.
    pub fn predicted_orientation(&self) -> Quat {
        if !self.prediction.enabled {
            return self.orientation;
        }
        let rate = self.angular_velocity.length();
        if rate <= MIN_PREDICTION_RATE {
            return self.orientation;
        }
        let delta = Quat::from_axis_angle(self.angular_velocity / rate, rate * self.prediction.delta);
        (self.orientation * delta).normalize()
    }

    /// Current pose, predicted or raw per the prediction setting.
    pub fn pose(&self) -> OrientationSample {
        OrientationSample::from_quat(self.predicted_orientation())
    }

    pub fn set_prediction(&mut self, delta_seconds: f32, enabled: bool) {
        self.prediction = Prediction {
            delta: delta_seconds,
            enabled,
        };
    }

    pub fn is_prediction_enabled(&self) -> bool {
        self.prediction.enabled
    }

    /// Return to the reference pose and forget accumulated drift references.
    pub fn reset(&mut self) {
        self.orientation = Quat::IDENTITY;
        self.angular_velocity = Vec3::ZERO;
        self.mag_refs.clear();
        self.yaw_correction_in_progress = false;
        log::info!("Orientation reset");
    }

    pub fn set_yaw_correction_enabled(&mut self, enabled: bool) {
        self.yaw_correction_enabled = enabled;
        if !enabled {
            self.yaw_correction_in_progress = false;
        }
    }

    pub fn is_yaw_correction_enabled(&self) -> bool {
        self.yaw_correction_enabled
    }

    pub fn is_yaw_correction_in_progress(&self) -> bool {
        self.yaw_correction_in_progress
    }

    pub fn set_mag_ref_distance(&mut self, distance: f32) {
        self.config.mag_ref_distance = distance;
    }

    pub fn mag_ref_distance(&self) -> f32 {
        self.config.mag_ref_distance
    }

    /// Latest uncalibrated magnetometer reading (gauss).
    pub fn magnetometer(&self) -> Vec3 {
        self.raw_magnetometer
    }

    pub fn angular_velocity(&self) -> Vec3 {
        self.angular_velocity
    }

    /// Install a hard-iron offset. Stored references are dropped since they
    /// were measured against the previous offset.
    pub fn set_mag_calibration(&mut self, center: Vec3) {
        self.mag_center = Some(center);
        self.mag_refs.clear();
    }

    /// Forget the hard-iron offset and disable yaw correction.
    pub fn clear_mag_calibration(&mut self) {
        self.mag_center = None;
        self.mag_refs.clear();
        self.set_yaw_correction_enabled(false);
    }

    pub fn mag_calibration(&self) -> Option<Vec3> {
        self.mag_center
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }
}

impl Default for OrientationFusion {
    fn default() -> Self {
        Self::new(FusionConfig::default())
    }
}
