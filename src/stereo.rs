//! Per-eye stereo render parameters for a side-by-side HMD display.
//!
//! Pure computation: the same inputs always yield bit-identical output.
//! Matrices are built with glam and exported row-major.

use crate::types::{DeviceDescriptor, Eye, EyeParams, EyeRenderParams, Viewport};
use crate::{HmdError, Result};
use glam::{Mat4, Vec3};

/// Vertical field of view covered by the 2D overlay projection.
const AREA_2D_FOV_DEGREES: f32 = 85.0;
/// Fit points closer than this to the lens center disable scaling.
const MIN_FIT_DISTANCE: f32 = 1e-4;

/// Caller inputs for [`compute`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StereoRequest {
    /// Full window area, split left/right between the eyes.
    pub viewport: Viewport,
    pub ipd: f32,
    /// Multiplier on the eye-to-screen distance.
    pub eye_to_screen_scale: f32,
    pub clip_near: f32,
    pub clip_far: f32,
    /// Point on the lens where distortion is made exact; (0, 0) disables scaling.
    pub distortion_fit: (f32, f32),
}

/// Ratio between the device's native aspect and the viewport's aspect.
/// Computed in f64 so matching aspects yield exactly 1.0.
pub fn aspect_multiplier(descriptor: &DeviceDescriptor, viewport: Viewport) -> f32 {
    if descriptor.v_resolution == 0 || viewport.width <= 0 || viewport.height <= 0 {
        return 1.0;
    }
    let required = descriptor.h_resolution as f64 / descriptor.v_resolution as f64;
    let supplied = viewport.width as f64 / viewport.height as f64;
    (required / supplied) as f32
}

/// Compute render parameters for both eyes.
///
/// `Some(descriptor)` uses the active device geometry and corrects for the
/// viewport's aspect ratio; `None` falls back to
/// [`DeviceDescriptor::reference`] without aspect correction.
pub fn compute(descriptor: Option<&DeviceDescriptor>, request: &StereoRequest) -> Result<EyeRenderParams> {
    let vp = request.viewport;
    if vp.width <= 0
        || vp.height <= 0
        || vp.x.checked_add(vp.width).is_none()
        || vp.y.checked_add(vp.height).is_none()
    {
        return Err(HmdError::InvalidViewport {
            width: vp.width,
            height: vp.height,
        });
    }
    let (near, far) = (request.clip_near, request.clip_far);
    if !near.is_finite() || !far.is_finite() || (far - near).abs() < f32::EPSILON {
        return Err(HmdError::InvalidClipPlanes { near, far });
    }

    let config = match descriptor {
        Some(d) => StereoConfig::new(d.clone(), request, aspect_multiplier(d, vp)),
        None => StereoConfig::new(DeviceDescriptor::reference(), request, 1.0),
    };
    Ok(config.render_params())
}

/// Left-right stereo setup derived from a device geometry and a request.
struct StereoConfig {
    geometry: DeviceDescriptor,
    viewport: Viewport,
    near: f32,
    far: f32,
    fit: (f32, f32),
    aspect_multiplier: f32,
}

impl StereoConfig {
    fn new(mut geometry: DeviceDescriptor, request: &StereoRequest, aspect_multiplier: f32) -> Self {
        geometry.interpupillary_distance = request.ipd;
        geometry.eye_to_screen_distance *= request.eye_to_screen_scale;
        Self {
            geometry,
            viewport: request.viewport,
            near: request.clip_near,
            far: request.clip_far,
            fit: request.distortion_fit,
            aspect_multiplier,
        }
    }

    /// Horizontal offset of the lens center from the eye viewport center,
    /// in [-1, 1] viewport units.
    fn projection_center_offset(&self) -> f32 {
        let g = &self.geometry;
        let view_center = g.h_screen_size * 0.25;
        let eye_projection_shift = view_center - g.lens_separation_distance * 0.5;
        4.0 * eye_projection_shift / g.h_screen_size
    }

    /// Per-eye aspect ratio.
    fn aspect(&self) -> f32 {
        self.viewport.width as f32 / self.viewport.height as f32 * 0.5 * self.aspect_multiplier
    }

    fn distortion(&self, r: f32) -> f32 {
        let k = &self.geometry.distortion_k;
        let r2 = r * r;
        r * (k[0] + r2 * (k[1] + r2 * (k[2] + r2 * k[3])))
    }

    fn distortion_scale(&self, x_center_offset: f32) -> f32 {
        let (fit_x, fit_y) = self.fit;
        if fit_x.abs() < MIN_FIT_DISTANCE && fit_y.abs() < MIN_FIT_DISTANCE {
            return 1.0;
        }
        let eye_aspect = 0.5 * self.viewport.width as f32 / self.viewport.height as f32;
        let dx = fit_x - x_center_offset;
        let dy = fit_y / eye_aspect;
        let r = dx.hypot(dy);
        if r < MIN_FIT_DISTANCE {
            return self.geometry.distortion_k[0];
        }
        self.distortion(r) / r
    }

    fn render_params(&self) -> EyeRenderParams {
        let g = &self.geometry;
        let offset = self.projection_center_offset();
        let scale = self.distortion_scale(offset);
        let aspect = self.aspect();

        let half_screen = g.v_screen_size * 0.5 * scale;
        let fov_y = 2.0 * (half_screen / g.eye_to_screen_distance).atan();
        let center = perspective(fov_y, aspect, self.near, self.far);

        let ortho = self.ortho_projection(scale);
        let eye = |eye: Eye, sign: f32| EyeParams {
            eye,
            viewport: self.eye_viewport(eye),
            projection: to_rows(translation(sign * offset) * center),
            view_adjust: to_rows(translation(sign * g.interpupillary_distance * 0.5)),
            ortho_projection: to_rows(ortho.0 * translation(sign * ortho.1)),
        };

        EyeRenderParams {
            render_scale: scale,
            x_center_offset: offset,
            fov_y_degrees: fov_y.to_degrees(),
            aspect,
            distortion_k: g.distortion_k,
            chroma_ab_correction: g.chroma_ab_correction,
            left: eye(Eye::Left, 1.0),
            right: eye(Eye::Right, -1.0),
        }
    }

    fn eye_viewport(&self, eye: Eye) -> Viewport {
        let vp = self.viewport;
        let half = vp.width / 2;
        match eye {
            Eye::Left => Viewport::new(vp.x, vp.y, half, vp.height),
            Eye::Right => Viewport::new(vp.x + half, vp.y, half, vp.height),
        }
    }

    /// Pixel-space projection for 2D overlays, plus the per-eye horizontal
    /// shift in its input units (positive for the left eye, negative for the right).
    fn ortho_projection(&self, scale: f32) -> (Mat4, f32) {
        let g = &self.geometry;
        let meters_to_pixels = g.h_resolution as f32 / g.h_screen_size;
        let lens_pixels = meters_to_pixels * g.lens_separation_distance;
        let eye_pixels = meters_to_pixels * g.interpupillary_distance;
        let off_center_pixels = (g.eye_to_screen_distance / 0.8) * eye_pixels;
        let left_center = (g.h_resolution / 2) as f32 - lens_pixels * 0.5;
        let right_center = lens_pixels * 0.5;

        let area = AREA_2D_FOV_DEGREES.to_radians();
        let half_screen = (area * 0.5).tan() * g.eye_to_screen_distance;
        let fov_meters = 2.0 * half_screen / scale;
        let fov_pixels = g.v_resolution as f32 * fov_meters / g.v_screen_size;

        let mut rows = to_rows(Mat4::IDENTITY);
        rows[0][0] = fov_pixels / (self.viewport.width as f32 * 0.5);
        rows[1][1] = -fov_pixels / self.viewport.height as f32;
        rows[2][2] = 0.0;

        let pixel_offset = (left_center - right_center + off_center_pixels / scale) * 0.5;
        (from_rows(rows), pixel_offset * 2.0 / fov_pixels)
    }
}

/// Left-handed perspective with +Z forward.
fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    let tan_half = (fov_y * 0.5).tan();
    from_rows([
        [1.0 / (aspect * tan_half), 0.0, 0.0, 0.0],
        [0.0, 1.0 / tan_half, 0.0, 0.0],
        [0.0, 0.0, far / (far - near), far * near / (near - far)],
        [0.0, 0.0, 1.0, 0.0],
    ])
}

fn translation(x: f32) -> Mat4 {
    Mat4::from_translation(Vec3::new(x, 0.0, 0.0))
}

fn from_rows(rows: [[f32; 4]; 4]) -> Mat4 {
    Mat4::from_cols_array_2d(&rows).transpose()
}

fn to_rows(m: Mat4) -> [[f32; 4]; 4] {
    m.transpose().to_cols_array_2d()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(width: i32, height: i32) -> StereoRequest {
        StereoRequest {
            viewport: Viewport::new(0, 0, width, height),
            ipd: 0.0635,
            eye_to_screen_scale: 1.0,
            clip_near: 0.1,
            clip_far: 1000.0,
            distortion_fit: (-1.0, 0.0),
        }
    }

    #[test]
    fn test_inactive_uses_reference_geometry() {
        let params = compute(None, &request(800, 600)).unwrap();
        assert_eq!(params.left.viewport, Viewport::new(0, 0, 400, 600));
        assert_eq!(params.right.viewport, Viewport::new(400, 0, 400, 600));
        assert!(params.render_scale > 1.0);
        assert!(params.fov_y_degrees > 0.0 && params.fov_y_degrees < 180.0);
        assert_eq!(params.distortion_k, DeviceDescriptor::reference().distortion_k);
        // No aspect correction without a device.
        assert!((params.aspect - 800.0 / 600.0 * 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_matching_aspect_multiplier_is_exactly_one() {
        let d = DeviceDescriptor::reference();
        assert_eq!(aspect_multiplier(&d, Viewport::new(0, 0, 1280, 800)), 1.0);
        assert_eq!(aspect_multiplier(&d, Viewport::new(0, 0, 640, 400)), 1.0);
        let m = aspect_multiplier(&d, Viewport::new(0, 0, 800, 600));
        assert!((m - 1.6 / (800.0 / 600.0)).abs() < 1e-6);
    }

    #[test]
    fn test_active_aspect_corrected() {
        let d = DeviceDescriptor::reference();
        let params = compute(Some(&d), &request(800, 600)).unwrap();
        assert!((params.aspect - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_deterministic() {
        let d = DeviceDescriptor::reference();
        let a = compute(Some(&d), &request(1280, 800)).unwrap();
        let b = compute(Some(&d), &request(1280, 800)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_view_adjust_and_projection_offsets_mirror() {
        let params = compute(None, &request(1280, 800)).unwrap();
        assert!((params.left.view_adjust[0][3] - 0.03175).abs() < 1e-7);
        assert!((params.right.view_adjust[0][3] + 0.03175).abs() < 1e-7);
        assert_eq!(params.left.projection[0][2], params.x_center_offset);
        assert_eq!(params.right.projection[0][2], -params.x_center_offset);
        assert_eq!(params.left.projection[3][2], 1.0);
        assert_eq!(params.left.projection[3][3], 0.0);
        assert_eq!(
            params.left.ortho_projection[0][3],
            -params.right.ortho_projection[0][3]
        );
    }

    #[test]
    fn test_ortho_shift_applied_before_scaling() {
        let req = request(1280, 800);
        let params = compute(None, &req).unwrap();
        let config = StereoConfig::new(DeviceDescriptor::reference(), &req, 1.0);
        let (_, shift) = config.ortho_projection(params.render_scale);

        let left = params.left.ortho_projection;
        let right = params.right.ortho_projection;
        assert!(shift.abs() > 0.0);
        assert!((left[0][3] - left[0][0] * shift).abs() < 1e-6);
        assert!((right[0][3] + right[0][0] * shift).abs() < 1e-6);
        assert_eq!(left[2][2], 0.0);
    }

    #[test]
    fn test_center_offset_of_reference_lens() {
        let params = compute(None, &request(1280, 800)).unwrap();
        let expected = 4.0 * (0.14976 / 4.0 - 0.0635 / 2.0) / 0.14976;
        assert!((params.x_center_offset - expected).abs() < 1e-5);
    }

    #[test]
    fn test_zero_fit_point_disables_scaling() {
        let mut req = request(1280, 800);
        req.distortion_fit = (0.0, 0.0);
        let params = compute(None, &req).unwrap();
        assert_eq!(params.render_scale, 1.0);
    }

    #[test]
    fn test_eye_relief_scale_narrows_fov() {
        let base = compute(None, &request(1280, 800)).unwrap();
        let mut req = request(1280, 800);
        req.eye_to_screen_scale = 1.5;
        let scaled = compute(None, &req).unwrap();
        assert!(scaled.fov_y_degrees < base.fov_y_degrees);
    }

    #[test]
    fn test_viewport_origin_carried() {
        let mut req = request(1000, 500);
        req.viewport = Viewport::new(10, 20, 1000, 500);
        let params = compute(None, &req).unwrap();
        assert_eq!(params.left.viewport, Viewport::new(10, 20, 500, 500));
        assert_eq!(params.right.viewport, Viewport::new(510, 20, 500, 500));
    }

    #[test]
    fn test_rejects_invalid_input() {
        assert!(matches!(
            compute(None, &request(0, 600)),
            Err(HmdError::InvalidViewport { width: 0, height: 600 })
        ));
        let mut req = request(100, 100);
        req.viewport = Viewport::new(i32::MAX - 10, 0, 100, 100);
        assert!(matches!(compute(None, &req), Err(HmdError::InvalidViewport { .. })));

        let mut req = request(800, 600);
        req.clip_far = req.clip_near;
        assert!(matches!(compute(None, &req), Err(HmdError::InvalidClipPlanes { .. })));
    }
}
