use glam::{EulerRot, Quat, Vec3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default interpupillary distance in meters, used until a device or the
/// host says otherwise.
pub const DEFAULT_IPD: f32 = 0.0635;

/// Static geometry and optics of a connected HMD.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceDescriptor {
    pub display_name: String,
    pub product_name: String,
    pub manufacturer: String,
    pub version: u32,
    /// Horizontal resolution of the whole panel in pixels.
    pub h_resolution: u32,
    /// Vertical resolution of the whole panel in pixels.
    pub v_resolution: u32,
    /// Physical panel width in meters.
    pub h_screen_size: f32,
    /// Physical panel height in meters.
    pub v_screen_size: f32,
    pub v_screen_center: f32,
    pub eye_to_screen_distance: f32,
    pub lens_separation_distance: f32,
    pub interpupillary_distance: f32,
    /// Radial distortion coefficients K0..K3.
    pub distortion_k: [f32; 4],
    pub chroma_ab_correction: [f32; 4],
}

impl Default for DeviceDescriptor {
    fn default() -> Self {
        Self {
            display_name: String::new(),
            product_name: String::new(),
            manufacturer: String::new(),
            version: 0,
            h_resolution: 0,
            v_resolution: 0,
            h_screen_size: 0.0,
            v_screen_size: 0.0,
            v_screen_center: 0.0,
            eye_to_screen_distance: 0.0,
            lens_separation_distance: 0.0,
            interpupillary_distance: DEFAULT_IPD,
            distortion_k: [0.0; 4],
            chroma_ab_correction: [1.0, 0.0, 1.0, 0.0],
        }
    }
}

impl DeviceDescriptor {
    /// Built-in Rift DK1 geometry, used for stereo setup when no device is active.
    pub fn reference() -> Self {
        let h_screen_size = 0.14976;
        let v_screen_size = h_screen_size / (1280.0 / 800.0);
        Self {
            display_name: "Oculus Rift DK1".into(),
            product_name: "Tracker DK".into(),
            manufacturer: "Oculus VR, Inc.".into(),
            version: 0,
            h_resolution: 1280,
            v_resolution: 800,
            h_screen_size,
            v_screen_size,
            v_screen_center: v_screen_size * 0.5,
            eye_to_screen_distance: 0.041,
            lens_separation_distance: 0.0635,
            interpupillary_distance: 0.064,
            distortion_k: [1.0, 0.22, 0.24, 0.0],
            chroma_ab_correction: [0.996, -0.004, 1.014, 0.0],
        }
    }
}

/// One raw inertial sample in the HMD frame (x right, y up, z toward the user).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    /// Accelerometer in m/s^2.
    pub accelerometer: Vec3,
    /// Gyroscope in rad/s.
    pub gyroscope: Vec3,
    /// Magnetometer in gauss.
    pub magnetometer: Vec3,
    /// Seconds elapsed since the previous sample.
    pub time_delta: f32,
}

/// Head orientation plus its Y-X-Z Euler decomposition (radians).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationSample {
    pub quaternion: Quat,
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

impl OrientationSample {
    pub fn from_quat(quaternion: Quat) -> Self {
        let (yaw, pitch, roll) = quaternion.to_euler(EulerRot::YXZ);
        Self {
            quaternion,
            yaw,
            pitch,
            roll,
        }
    }
}

impl Default for OrientationSample {
    fn default() -> Self {
        Self::from_quat(Quat::IDENTITY)
    }
}

/// Magnetic auto-calibration state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CalibrationState {
    #[default]
    Idle,
    Calibrating,
    Calibrated,
}

/// Pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Viewport {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Eye {
    Left,
    Right,
}

/// Render setup for one eye. Matrices are row-major (`m[row][col]`).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EyeParams {
    pub eye: Eye,
    pub viewport: Viewport,
    pub projection: [[f32; 4]; 4],
    /// Camera translation by half the IPD.
    pub view_adjust: [[f32; 4]; 4],
    /// Pixel-space projection for 2D overlays.
    pub ortho_projection: [[f32; 4]; 4],
}

/// Per-frame stereo rendering parameters handed to the host renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EyeRenderParams {
    /// Magnification applied before distortion so the warped image fills the viewport.
    pub render_scale: f32,
    /// Horizontal lens center offset in per-eye viewport units, mirrored for the right eye.
    pub x_center_offset: f32,
    pub fov_y_degrees: f32,
    /// Per-eye aspect ratio after the aspect multiplier.
    pub aspect: f32,
    pub distortion_k: [f32; 4],
    pub chroma_ab_correction: [f32; 4],
    pub left: EyeParams,
    pub right: EyeParams,
}

impl EyeRenderParams {
    /// Layout version of this transfer struct.
    pub const VERSION: u32 = 1;

    pub fn eye(&self, eye: Eye) -> &EyeParams {
        match eye {
            Eye::Left => &self.left,
            Eye::Right => &self.right,
        }
    }
}

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Gender {
    #[default]
    Unspecified = 0,
    Male = 1,
    Female = 2,
}

impl Gender {
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Anthropometric profile associated with a device.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UserProfile {
    /// Player height in meters.
    pub player_height: f32,
    /// Eye height in meters.
    pub eye_height: f32,
    pub ipd: f32,
    pub gender: Gender,
    pub name: String,
}

/// Attached tracker as seen during enumeration.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub product: String,
    pub manufacturer: String,
    pub serial: String,
    pub release: u16,
    pub path: String,
}

bitflags::bitflags! {
    /// Sensor configuration flags of the DK1 tracker.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SensorConfigFlags: u8 {
        const RAW_MODE           = 1 << 0;
        const CALIBRATION_TEST   = 1 << 1;
        const USE_CALIBRATION    = 1 << 2;
        const AUTO_CALIBRATION   = 1 << 3;
        const MOTION_KEEP_ALIVE  = 1 << 4;
        const COMMAND_KEEP_ALIVE = 1 << 5;
        const SENSOR_COORDINATES = 1 << 6;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_descriptor_uses_identity_chroma_and_default_ipd() {
        let d = DeviceDescriptor::default();
        assert_eq!(d.chroma_ab_correction, [1.0, 0.0, 1.0, 0.0]);
        assert_eq!(d.interpupillary_distance, DEFAULT_IPD);
        assert_eq!(d.h_resolution, 0);
        assert_eq!(d.distortion_k, [0.0; 4]);
    }

    #[test]
    fn euler_order_is_yaw_pitch_roll() {
        let q = Quat::from_rotation_y(0.3) * Quat::from_rotation_x(0.2) * Quat::from_rotation_z(0.1);
        let s = OrientationSample::from_quat(q);
        assert!((s.yaw - 0.3).abs() < 1e-5);
        assert!((s.pitch - 0.2).abs() < 1e-5);
        assert!((s.roll - 0.1).abs() < 1e-5);
    }

    #[test]
    fn gender_codes() {
        assert_eq!(Gender::Unspecified.code(), 0);
        assert_eq!(Gender::Female.code(), 2);
    }
}
