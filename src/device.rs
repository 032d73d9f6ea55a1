use crate::config::DriverConfig;
use crate::driver::{DeviceManager, Driver, HmdDevice};
use crate::hid::HidTransport;
use crate::protocol::{self, DISTORTION_NONE, PID_DK1, VID};
use crate::tracker::TrackerStream;
use crate::types::{DeviceDescriptor, DeviceInfo, SensorConfigFlags, UserProfile, DEFAULT_IPD};
use crate::{HmdError, Result};
use hidapi::HidApi;
use std::ffi::CString;

/// Chromatic aberration correction of the DK1 lenses. Not reported by the device.
const DK1_CHROMA_AB_CORRECTION: [f32; 4] = [0.996, -0.004, 1.014, 0.0];

/// Check if a hidapi DeviceInfo is a DK1 tracker.
fn is_rift_hid(d: &hidapi::DeviceInfo) -> bool {
    d.vendor_id() == VID && d.product_id() == PID_DK1
}

fn create_hid_api() -> Result<HidApi> {
    let api = HidApi::new()?;
    #[cfg(target_os = "macos")]
    {
        // Keep HID opens shared on macOS to avoid seizing the interface.
        api.set_open_exclusive(false);
    }
    Ok(api)
}

fn device_info(d: &hidapi::DeviceInfo) -> DeviceInfo {
    DeviceInfo {
        product: d.product_string().unwrap_or("").to_string(),
        manufacturer: d.manufacturer_string().unwrap_or("").to_string(),
        serial: d.serial_number().unwrap_or("").to_string(),
        release: d.release_number(),
        path: d.path().to_str().unwrap_or("").to_string(),
    }
}

/// List all attached DK1 trackers.
pub fn list_devices() -> Result<Vec<DeviceInfo>> {
    let api = create_hid_api()?;
    Ok(api
        .device_list()
        .filter(|d| is_rift_hid(d))
        .map(device_info)
        .collect())
}

/// Build a descriptor from the display info report and the USB strings.
fn descriptor_from(info: &protocol::DisplayInfo, usb: &DeviceInfo) -> DeviceDescriptor {
    let mut distortion_k = [0.0f32; 4];
    distortion_k.copy_from_slice(&info.distortion_k[..4]);

    DeviceDescriptor {
        display_name: usb.product.clone(),
        product_name: usb.product.clone(),
        manufacturer: usb.manufacturer.clone(),
        version: usb.release as u32,
        h_resolution: info.h_resolution as u32,
        v_resolution: info.v_resolution as u32,
        h_screen_size: info.h_screen_size,
        v_screen_size: info.v_screen_size,
        v_screen_center: info.v_center,
        eye_to_screen_distance: info.eye_to_screen_distance[0],
        lens_separation_distance: info.lens_separation,
        interpupillary_distance: DEFAULT_IPD,
        distortion_k,
        chroma_ab_correction: DK1_CHROMA_AB_CORRECTION,
    }
}

/// hidapi-backed driver for the Rift DK1.
pub struct RiftDriver {
    config: DriverConfig,
}

impl RiftDriver {
    pub fn new(config: DriverConfig) -> Self {
        Self { config }
    }
}

impl Default for RiftDriver {
    fn default() -> Self {
        Self::new(DriverConfig::from_env())
    }
}

impl Driver for RiftDriver {
    type Manager = RiftManager;

    fn create_manager(&mut self) -> Result<RiftManager> {
        Ok(RiftManager {
            api: create_hid_api()?,
            config: self.config.clone(),
        })
    }
}

/// Owns the hidapi context used for enumeration.
pub struct RiftManager {
    api: HidApi,
    config: DriverConfig,
}

impl DeviceManager for RiftManager {
    type Device = RiftHmd;

    fn open_first_hmd(&mut self) -> Result<RiftHmd> {
        let hid_info = self
            .api
            .device_list()
            .find(|d| is_rift_hid(d))
            .ok_or(HmdError::DeviceNotFound)?;

        let info = device_info(hid_info);
        let device_path = hid_info.path().to_owned();
        let device = self.api.open_path(&device_path)?;

        log::info!(
            "Opened {} ({}) release={:04x}",
            info.product,
            info.manufacturer,
            info.release
        );

        Ok(RiftHmd {
            hid: HidTransport::new(device),
            device_path,
            info,
            config: self.config.clone(),
        })
    }
}

impl Drop for RiftManager {
    fn drop(&mut self) {
        log::debug!("Releasing HID manager");
    }
}

/// An opened DK1 used for feature-report queries.
pub struct RiftHmd {
    hid: HidTransport,
    /// Path for opening a second handle for the tracker stream.
    device_path: CString,
    info: DeviceInfo,
    config: DriverConfig,
}

impl RiftHmd {
    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Select the coordinate frame and keep-alive interval for streaming.
    fn configure_sensor(&self) -> Result<()> {
        let mut config = self.hid.read_sensor_config()?;
        config
            .flags
            .set(SensorConfigFlags::SENSOR_COORDINATES, self.config.sensor_coordinates);
        config.keep_alive_interval = self.config.keep_alive_ms;
        log::debug!("Sensor config: {:?}", config);
        self.hid.write_sensor_config(&config)?;
        self.hid.keep_alive(self.config.keep_alive_ms)
    }
}

impl HmdDevice for RiftHmd {
    type Sensor = TrackerStream;

    fn descriptor(&mut self) -> Result<DeviceDescriptor> {
        let info = self.hid.read_display_info()?;
        if info.distortion_type == DISTORTION_NONE {
            return Err(HmdError::NoDisplayInfo);
        }

        let descriptor = descriptor_from(&info, &self.info);
        log::info!(
            "Display {}x{} {:.5}x{:.5}m eye-to-screen={:.4} lens-separation={:.4} K={:?}",
            descriptor.h_resolution,
            descriptor.v_resolution,
            descriptor.h_screen_size,
            descriptor.v_screen_size,
            descriptor.eye_to_screen_distance,
            descriptor.lens_separation_distance,
            descriptor.distortion_k
        );
        Ok(descriptor)
    }

    fn profile(&self) -> Option<UserProfile> {
        self.config.profile.clone()
    }

    fn open_sensor(&mut self) -> Result<TrackerStream> {
        self.configure_sensor()?;

        // Open a second HID handle for the tracker reader thread.
        let api = create_hid_api()?;
        let tracker_device = api.open_path(&self.device_path)?;
        TrackerStream::start(
            HidTransport::new(tracker_device),
            api,
            self.config.keep_alive_ms,
            self.config.channel_capacity,
        )
    }
}

impl Drop for RiftHmd {
    fn drop(&mut self) {
        log::info!("Closing {}", self.info.product);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_from_display_info() {
        let info = protocol::DisplayInfo {
            distortion_type: 2,
            h_resolution: 1280,
            v_resolution: 800,
            h_screen_size: 0.14976,
            v_screen_size: 0.0936,
            v_center: 0.0468,
            lens_separation: 0.0635,
            eye_to_screen_distance: [0.041, 0.0395],
            distortion_k: [1.0, 0.22, 0.24, 0.0, 9.0, 9.0],
        };
        let usb = DeviceInfo {
            product: "Tracker DK".into(),
            manufacturer: "Oculus VR, Inc.".into(),
            serial: String::new(),
            release: 0x0105,
            path: String::new(),
        };

        let d = descriptor_from(&info, &usb);
        assert_eq!(d.h_resolution, 1280);
        assert_eq!(d.version, 0x0105);
        assert_eq!(d.eye_to_screen_distance, 0.041);
        assert_eq!(d.distortion_k, [1.0, 0.22, 0.24, 0.0]);
        assert_eq!(d.chroma_ab_correction, DK1_CHROMA_AB_CORRECTION);
        assert_eq!(d.interpupillary_distance, DEFAULT_IPD);
        assert_eq!(d.manufacturer, "Oculus VR, Inc.");
    }
}
