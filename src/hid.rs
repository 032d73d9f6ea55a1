use crate::protocol::{self, DisplayInfo, SensorConfig, FEATURE_BUFFER_SIZE};
use crate::{HmdError, Result};
use hidapi::HidDevice;

/// Feature-report transport for the DK1 tracker.
///
/// Feature reports carry the report id in byte 0 in both directions, so
/// the buffers built by `protocol` go to hidapi unchanged.
pub struct HidTransport {
    device: HidDevice,
}

impl HidTransport {
    pub fn new(device: HidDevice) -> Self {
        Self { device }
    }

    /// Read a feature report and return its bytes, report id first.
    pub fn get_feature(&self, report_id: u8) -> Result<Vec<u8>> {
        let mut buf = [0u8; FEATURE_BUFFER_SIZE];
        buf[0] = report_id;
        let len = self.device.get_feature_report(&mut buf).map_err(|e| {
            HmdError::HidCommand(format!("get_feature_report 0x{:02x} failed: {}", report_id, e))
        })?;

        if len == 0 || buf[0] != report_id {
            return Err(HmdError::InvalidReport { id: buf[0], len });
        }

        Ok(buf[..len].to_vec())
    }

    /// Send a feature report built by `protocol`.
    pub fn send_feature(&self, report: &[u8]) -> Result<()> {
        self.device.send_feature_report(report).map_err(|e| {
            HmdError::HidCommand(format!(
                "send_feature_report 0x{:02x} failed: {}",
                report.first().copied().unwrap_or(0),
                e
            ))
        })
    }

    /// Read one input report, waiting at most `timeout_ms`. Returns 0 on timeout.
    pub fn read_input(&self, buf: &mut [u8], timeout_ms: i32) -> Result<usize> {
        Ok(self.device.read_timeout(buf, timeout_ms)?)
    }

    /// Read the display geometry and lens coefficients.
    pub fn read_display_info(&self) -> Result<DisplayInfo> {
        let response = self.get_feature(protocol::REPORT_DISPLAY_INFO)?;
        protocol::parse_display_info(&response)
    }

    /// Read the current sensor configuration.
    pub fn read_sensor_config(&self) -> Result<SensorConfig> {
        let response = self.get_feature(protocol::REPORT_SENSOR_CONFIG)?;
        protocol::parse_sensor_config(&response)
    }

    /// Write a sensor configuration.
    pub fn write_sensor_config(&self, config: &SensorConfig) -> Result<()> {
        self.send_feature(&protocol::build_sensor_config(config))
    }

    /// Ask the tracker to keep streaming for another `interval_ms`.
    pub fn keep_alive(&self, interval_ms: u16) -> Result<()> {
        self.send_feature(&protocol::build_keep_alive(interval_ms))
    }
}
