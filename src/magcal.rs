//! Hard-iron magnetometer calibration.
//!
//! Collects four magnetometer readings taken at well separated head
//! orientations. The readings lie on a sphere around the hard-iron offset;
//! solving for that sphere's center gives the offset, which is then handed
//! to the fusion filter and yaw correction is switched on.

use crate::fusion::{quat_distance_sq, OrientationFusion};
use crate::types::CalibrationState;
use glam::{Mat3, Quat, Vec3};

/// Samples needed for a sphere fit.
pub const REQUIRED_SAMPLES: usize = 4;
/// Minimum quaternion distance between sample orientations.
const MIN_QUAT_DISTANCE: f32 = 0.5;
/// Minimum distance between magnetometer readings, gauss.
const MIN_MAG_DISTANCE: f32 = 0.2;
/// Minimum distance of the last reading from the plane of the first three.
const MIN_PLANE_DISTANCE: f32 = 0.2;
const MIN_DETERMINANT: f32 = 1e-9;

#[derive(Debug, Clone, Copy)]
struct CalibrationPoint {
    orientation: Quat,
    field: Vec3,
}

/// Drives a magnetic calibration against an [`OrientationFusion`].
#[derive(Debug, Default)]
pub struct MagneticCalibrator {
    state: CalibrationState,
    points: Vec<CalibrationPoint>,
    center: Option<Vec3>,
}

impl MagneticCalibrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new calibration, discarding any previous result.
    pub fn begin(&mut self, fusion: &mut OrientationFusion) {
        fusion.clear_mag_calibration();
        self.points.clear();
        self.center = None;
        self.state = CalibrationState::Calibrating;
        log::info!("Magnetic calibration started");
    }

    /// Offer the fusion's current orientation and magnetometer reading.
    ///
    /// Returns the number of accepted samples, `0..=4`. Once four samples
    /// fit a sphere the calibration completes and the offset is installed.
    pub fn update(&mut self, fusion: &mut OrientationFusion) -> u32 {
        if self.state == CalibrationState::Calibrating
            && self.offer(fusion.orientation(), fusion.magnetometer())
            && self.points.len() == REQUIRED_SAMPLES
        {
            match self.solve() {
                Some(center) => {
                    log::info!(
                        "Magnetic calibration complete, center=({:.4}, {:.4}, {:.4})",
                        center.x,
                        center.y,
                        center.z
                    );
                    self.center = Some(center);
                    self.state = CalibrationState::Calibrated;
                    fusion.set_mag_calibration(center);
                    fusion.set_yaw_correction_enabled(true);
                }
                None => log::warn!("Magnetic calibration samples are degenerate, waiting for another"),
            }
        }
        self.points.len() as u32
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    pub fn is_calibrated(&self) -> bool {
        self.state == CalibrationState::Calibrated
    }

    pub fn sample_count(&self) -> u32 {
        self.points.len() as u32
    }

    /// Solved hard-iron offset.
    pub fn center(&self) -> Option<Vec3> {
        self.center
    }

    /// Record a sample if it is far enough from the ones already held.
    /// With a full set the last sample is replaced.
    fn offer(&mut self, orientation: Quat, field: Vec3) -> bool {
        let fixed = self.points.len().min(REQUIRED_SAMPLES - 1);
        let others = &self.points[..fixed];

        let min_quat_sq = MIN_QUAT_DISTANCE * MIN_QUAT_DISTANCE;
        let min_mag_sq = MIN_MAG_DISTANCE * MIN_MAG_DISTANCE;
        let separated = others.iter().all(|p| {
            quat_distance_sq(p.orientation, orientation) > min_quat_sq
                && p.field.distance_squared(field) > min_mag_sq
        });
        if !separated {
            return false;
        }

        if fixed == REQUIRED_SAMPLES - 1 && plane_distance(others, field) <= MIN_PLANE_DISTANCE {
            return false;
        }

        let point = CalibrationPoint { orientation, field };
        if self.points.len() == REQUIRED_SAMPLES {
            self.points[REQUIRED_SAMPLES - 1] = point;
        } else {
            self.points.push(point);
        }
        log::debug!(
            "Magnetic calibration sample {} accepted: ({:.3}, {:.3}, {:.3})",
            self.points.len(),
            field.x,
            field.y,
            field.z
        );
        true
    }

    /// Center of the sphere through the four held readings.
    fn solve(&self) -> Option<Vec3> {
        let p0 = self.points[0].field;
        let rows: Vec<Vec3> = self.points[1..].iter().map(|p| 2.0 * (p.field - p0)).collect();
        let b = Vec3::from_array(std::array::from_fn(|i| {
            self.points[i + 1].field.length_squared() - p0.length_squared()
        }));

        let a = Mat3::from_cols(rows[0], rows[1], rows[2]).transpose();
        if a.determinant().abs() < MIN_DETERMINANT {
            return None;
        }
        Some(a.inverse() * b)
    }
}

/// Distance of `point` from the plane through three readings.
fn plane_distance(plane: &[CalibrationPoint], point: Vec3) -> f32 {
    let normal = (plane[1].field - plane[0].field)
        .cross(plane[2].field - plane[0].field)
        .normalize_or_zero();
    (point - plane[0].field).dot(normal).abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_PI_2, PI};

    const EARTH_FIELD: Vec3 = Vec3::new(0.25, -0.35, 0.3);
    const OFFSET: Vec3 = Vec3::new(0.1, 0.05, -0.2);

    fn orientations() -> [Quat; 4] {
        [
            Quat::IDENTITY,
            Quat::from_rotation_y(FRAC_PI_2),
            Quat::from_rotation_x(FRAC_PI_2),
            Quat::from_rotation_x(PI),
        ]
    }

    fn reading(q: Quat) -> Vec3 {
        q.inverse() * EARTH_FIELD + OFFSET
    }

    fn calibrating() -> MagneticCalibrator {
        let mut cal = MagneticCalibrator::new();
        cal.state = CalibrationState::Calibrating;
        cal
    }

    #[test]
    fn test_sphere_fit_recovers_offset() {
        let mut cal = calibrating();
        for q in orientations() {
            assert!(cal.offer(q, reading(q)));
        }
        let center = cal.solve().unwrap();
        assert!(center.distance(OFFSET) < 1e-4, "center={:?}", center);
    }

    #[test]
    fn test_close_orientation_rejected() {
        let mut cal = calibrating();
        assert!(cal.offer(Quat::IDENTITY, reading(Quat::IDENTITY)));
        let nearby = Quat::from_rotation_y(0.1);
        assert!(!cal.offer(nearby, reading(nearby)));
        assert_eq!(cal.sample_count(), 1);
    }

    #[test]
    fn test_close_field_rejected() {
        let mut cal = calibrating();
        assert!(cal.offer(Quat::IDENTITY, reading(Quat::IDENTITY)));
        // Far orientation but nearly the same field.
        let q = Quat::from_rotation_x(PI);
        assert!(!cal.offer(q, reading(Quat::IDENTITY) + Vec3::splat(0.01)));
    }

    #[test]
    fn test_coplanar_fourth_sample_rejected() {
        let mut cal = calibrating();
        let qs = orientations();
        for q in &qs[..3] {
            assert!(cal.offer(*q, reading(*q)));
        }
        let p = &cal.points;
        // Lies on the plane of the first three, away from each of them.
        let centroid = (p[0].field + p[1].field + p[2].field) / 3.0;
        let candidate = centroid + (p[0].field - p[1].field) * 0.9;
        let far = Quat::from_rotation_z(PI);
        assert!(!cal.offer(far, candidate));
        assert_eq!(cal.sample_count(), 3);
    }

    #[test]
    fn test_full_set_replaces_last_sample() {
        let mut cal = calibrating();
        let qs = orientations();
        for q in qs {
            assert!(cal.offer(q, reading(q)));
        }
        let replacement = Quat::from_rotation_x(-FRAC_PI_2);
        assert!(cal.offer(replacement, reading(replacement)));
        assert_eq!(cal.sample_count(), 4);
        assert_eq!(cal.points[3].orientation, replacement);
        assert!(cal.solve().unwrap().distance(OFFSET) < 1e-4);
    }

    #[test]
    fn test_begin_resets_state() {
        let mut fusion = OrientationFusion::default();
        fusion.set_mag_calibration(Vec3::ONE);
        fusion.set_yaw_correction_enabled(true);

        let mut cal = MagneticCalibrator::new();
        assert_eq!(cal.state(), CalibrationState::Idle);
        cal.begin(&mut fusion);
        assert_eq!(cal.state(), CalibrationState::Calibrating);
        assert_eq!(cal.sample_count(), 0);
        assert!(!fusion.is_yaw_correction_enabled());
        assert!(fusion.mag_calibration().is_none());
    }

    #[test]
    fn test_update_when_idle_is_noop() {
        let mut fusion = OrientationFusion::default();
        let mut cal = MagneticCalibrator::new();
        assert_eq!(cal.update(&mut fusion), 0);
        assert_eq!(cal.state(), CalibrationState::Idle);
    }
}
