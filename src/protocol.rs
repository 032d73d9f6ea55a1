use crate::types::{SensorConfigFlags, SensorSample};
use crate::{HmdError, Result};
use glam::Vec3;

// -- USB identifiers --
pub const VID: u16 = 0x2833;
pub const PID_DK1: u16 = 0x0001;

// -- Report ids --
pub const REPORT_TRACKER: u8 = 0x01;
pub const REPORT_SENSOR_CONFIG: u8 = 0x02;
pub const REPORT_KEEP_ALIVE: u8 = 0x08;
pub const REPORT_DISPLAY_INFO: u8 = 0x09;

// -- Report geometry --
pub const TRACKER_REPORT_SIZE: usize = 62;
pub const SENSOR_CONFIG_SIZE: usize = 7;
pub const KEEP_ALIVE_SIZE: usize = 5;
pub const DISPLAY_INFO_SIZE: usize = 56;
/// Largest feature report we exchange, including the report id.
pub const FEATURE_BUFFER_SIZE: usize = 69;

/// Raw accelerometer, gyro and magnetometer units are 1e-4 of m/s^2, rad/s and gauss.
pub const SCALE: f32 = 0.0001;

/// Distortion type reported when the tracker has no display attached.
pub const DISTORTION_NONE: u8 = 0;

/// Decoded display info feature report. Lengths are in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayInfo {
    pub distortion_type: u8,
    pub h_resolution: u16,
    pub v_resolution: u16,
    pub h_screen_size: f32,
    pub v_screen_size: f32,
    pub v_center: f32,
    pub lens_separation: f32,
    pub eye_to_screen_distance: [f32; 2],
    pub distortion_k: [f32; 6],
}

/// Decoded sensor config feature report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorConfig {
    pub flags: SensorConfigFlags,
    pub packet_interval: u8,
    /// Keep-alive interval in milliseconds.
    pub keep_alive_interval: u16,
}

/// One inertial reading as raw device counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawInertial {
    pub accel: [i32; 3],
    pub gyro: [i32; 3],
}

/// Decoded tracker input report. Holds up to three inertial readings.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerMessage {
    /// Readings the device took since the previous report (may exceed 3).
    pub num_samples: u8,
    /// Device clock in milliseconds, wraps at 16 bits.
    pub timestamp: u16,
    pub last_command_id: u16,
    /// Temperature in hundredths of a degree Celsius.
    pub temperature: i16,
    pub samples: Vec<RawInertial>,
    pub mag: [i16; 3],
}

impl TrackerMessage {
    /// Convert the contained readings to physical units, spreading
    /// `elapsed_s` evenly across them.
    pub fn sensor_samples(&self, elapsed_s: f32) -> Vec<SensorSample> {
        let count = self.samples.len().max(1) as f32;
        let time_delta = elapsed_s / count;
        let magnetometer = Vec3::new(
            self.mag[0] as f32,
            self.mag[1] as f32,
            self.mag[2] as f32,
        ) * SCALE;

        self.samples
            .iter()
            .map(|s| SensorSample {
                accelerometer: scaled(s.accel),
                gyroscope: scaled(s.gyro),
                magnetometer,
                time_delta,
            })
            .collect()
    }
}

fn scaled(v: [i32; 3]) -> Vec3 {
    Vec3::new(v[0] as f32, v[1] as f32, v[2] as f32) * SCALE
}

fn read_u16(data: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([data[at], data[at + 1]])
}

fn read_i16(data: &[u8], at: usize) -> i16 {
    i16::from_le_bytes([data[at], data[at + 1]])
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

fn read_f32(data: &[u8], at: usize) -> f32 {
    f32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

/// Micrometres on the wire to meters.
fn read_micrometres(data: &[u8], at: usize) -> f32 {
    read_u32(data, at) as f32 / 1_000_000.0
}

/// Unpack three signed 21-bit values tightly packed into 8 bytes.
///
/// Each value is first assembled into the top bits of an i32 so the
/// arithmetic shift carries the sign down.
pub fn unpack_sample(b: &[u8]) -> [i32; 3] {
    let x = ((b[0] as i32) << 24) | ((b[1] as i32) << 16) | (((b[2] & 0xF8) as i32) << 8);
    let y = (((b[2] & 0x07) as i32) << 29)
        | ((b[3] as i32) << 21)
        | ((b[4] as i32) << 13)
        | (((b[5] & 0xC0) as i32) << 5);
    let z = (((b[5] & 0x3F) as i32) << 26) | ((b[6] as i32) << 18) | ((b[7] as i32) << 10);
    [x >> 11, y >> 11, z >> 11]
}

/// Parse a tracker input report.
///
/// Layout:
/// - `[0]`: report id 0x01
/// - `[1]`: sample count
/// - `[2..4]`: u16 LE timestamp (ms)
/// - `[4..6]`: u16 LE last command id
/// - `[6..8]`: i16 LE temperature
/// - `[8..56]`: three 16-byte readings (8 packed accel bytes, 8 packed gyro bytes)
/// - `[56..62]`: magnetometer, 3x i16 LE
pub fn parse_tracker_message(data: &[u8]) -> Option<TrackerMessage> {
    if data.len() < TRACKER_REPORT_SIZE || data[0] != REPORT_TRACKER {
        return None;
    }

    let num_samples = data[1];
    let present = (num_samples as usize).min(3);
    let samples = (0..present)
        .map(|i| {
            let at = 8 + i * 16;
            RawInertial {
                accel: unpack_sample(&data[at..at + 8]),
                gyro: unpack_sample(&data[at + 8..at + 16]),
            }
        })
        .collect();

    Some(TrackerMessage {
        num_samples,
        timestamp: read_u16(data, 2),
        last_command_id: read_u16(data, 4),
        temperature: read_i16(data, 6),
        samples,
        mag: [read_i16(data, 56), read_i16(data, 58), read_i16(data, 60)],
    })
}

/// Parse the display info feature report.
pub fn parse_display_info(data: &[u8]) -> Result<DisplayInfo> {
    if data.len() < DISPLAY_INFO_SIZE || data[0] != REPORT_DISPLAY_INFO {
        return Err(HmdError::InvalidReport {
            id: data.first().copied().unwrap_or(0),
            len: data.len(),
        });
    }

    let mut distortion_k = [0.0f32; 6];
    for (i, k) in distortion_k.iter_mut().enumerate() {
        *k = read_f32(data, 32 + i * 4);
    }

    Ok(DisplayInfo {
        distortion_type: data[3],
        h_resolution: read_u16(data, 4),
        v_resolution: read_u16(data, 6),
        h_screen_size: read_micrometres(data, 8),
        v_screen_size: read_micrometres(data, 12),
        v_center: read_micrometres(data, 16),
        lens_separation: read_micrometres(data, 20),
        eye_to_screen_distance: [read_micrometres(data, 24), read_micrometres(data, 28)],
        distortion_k,
    })
}

/// Parse the sensor config feature report.
pub fn parse_sensor_config(data: &[u8]) -> Result<SensorConfig> {
    if data.len() < SENSOR_CONFIG_SIZE || data[0] != REPORT_SENSOR_CONFIG {
        return Err(HmdError::InvalidReport {
            id: data.first().copied().unwrap_or(0),
            len: data.len(),
        });
    }

    Ok(SensorConfig {
        flags: SensorConfigFlags::from_bits_truncate(data[3]),
        packet_interval: data[4],
        keep_alive_interval: read_u16(data, 5),
    })
}

/// Build the sensor config feature report.
/// Format: [0x02, cmd_id lo, cmd_id hi, flags, packet_interval, keep_alive lo, keep_alive hi]
pub fn build_sensor_config(config: &SensorConfig) -> [u8; SENSOR_CONFIG_SIZE] {
    let mut buf = [0u8; SENSOR_CONFIG_SIZE];
    buf[0] = REPORT_SENSOR_CONFIG;
    buf[3] = config.flags.bits();
    buf[4] = config.packet_interval;
    buf[5..7].copy_from_slice(&config.keep_alive_interval.to_le_bytes());
    buf
}

/// Build the keep-alive feature report.
/// Format: [0x08, cmd_id lo, cmd_id hi, interval lo, interval hi]
pub fn build_keep_alive(interval_ms: u16) -> [u8; KEEP_ALIVE_SIZE] {
    let mut buf = [0u8; KEEP_ALIVE_SIZE];
    buf[0] = REPORT_KEEP_ALIVE;
    buf[3..5].copy_from_slice(&interval_ms.to_le_bytes());
    buf
}

/// Milliseconds between two device timestamps, accounting for the 16-bit wrap.
pub fn timestamp_delta(previous: u16, current: u16) -> u16 {
    current.wrapping_sub(previous)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pack(v: [i32; 3]) -> [u8; 8] {
        let w = ((v[0] as u64 & 0x1F_FFFF) << 43)
            | ((v[1] as u64 & 0x1F_FFFF) << 22)
            | ((v[2] as u64 & 0x1F_FFFF) << 1);
        w.to_be_bytes()
    }

    #[test]
    fn test_unpack_sample_sign_extension() {
        let values = [-1, 1, -1_048_576];
        assert_eq!(unpack_sample(&pack(values)), values);

        let values = [1_048_575, -12345, 98_000];
        assert_eq!(unpack_sample(&pack(values)), values);
    }

    #[test]
    fn test_parse_tracker_message() {
        let mut data = [0u8; TRACKER_REPORT_SIZE];
        data[0] = REPORT_TRACKER;
        data[1] = 2;
        data[2..4].copy_from_slice(&1000u16.to_le_bytes());
        data[6..8].copy_from_slice(&2550i16.to_le_bytes());
        data[8..16].copy_from_slice(&pack([0, 98_100, 0]));
        data[16..24].copy_from_slice(&pack([0, 0, -5000]));
        data[24..32].copy_from_slice(&pack([10, 20, 30]));
        data[56..58].copy_from_slice(&1500i16.to_le_bytes());
        data[60..62].copy_from_slice(&(-2000i16).to_le_bytes());

        let msg = parse_tracker_message(&data).unwrap();
        assert_eq!(msg.num_samples, 2);
        assert_eq!(msg.timestamp, 1000);
        assert_eq!(msg.temperature, 2550);
        assert_eq!(msg.samples.len(), 2);
        assert_eq!(msg.samples[0].accel, [0, 98_100, 0]);
        assert_eq!(msg.samples[0].gyro, [0, 0, -5000]);
        assert_eq!(msg.samples[1].accel, [10, 20, 30]);
        assert_eq!(msg.mag, [1500, 0, -2000]);

        let samples = msg.sensor_samples(0.002);
        assert_eq!(samples.len(), 2);
        assert!((samples[0].accelerometer.y - 9.81).abs() < 1e-4);
        assert!((samples[0].gyroscope.z + 0.5).abs() < 1e-6);
        assert!((samples[0].magnetometer.x - 0.15).abs() < 1e-6);
        assert!((samples[1].time_delta - 0.001).abs() < 1e-9);
    }

    #[test]
    fn test_parse_tracker_message_rejects_other_reports() {
        let mut data = [0u8; TRACKER_REPORT_SIZE];
        data[0] = REPORT_KEEP_ALIVE;
        assert!(parse_tracker_message(&data).is_none());
        assert!(parse_tracker_message(&data[..10]).is_none());
    }

    #[test]
    fn test_parse_display_info() {
        let mut data = [0u8; DISPLAY_INFO_SIZE];
        data[0] = REPORT_DISPLAY_INFO;
        data[3] = 2;
        data[4..6].copy_from_slice(&1280u16.to_le_bytes());
        data[6..8].copy_from_slice(&800u16.to_le_bytes());
        data[8..12].copy_from_slice(&149_760u32.to_le_bytes());
        data[12..16].copy_from_slice(&93_600u32.to_le_bytes());
        data[16..20].copy_from_slice(&46_800u32.to_le_bytes());
        data[20..24].copy_from_slice(&63_500u32.to_le_bytes());
        data[24..28].copy_from_slice(&41_000u32.to_le_bytes());
        data[28..32].copy_from_slice(&41_000u32.to_le_bytes());
        data[32..36].copy_from_slice(&1.0f32.to_le_bytes());
        data[36..40].copy_from_slice(&0.22f32.to_le_bytes());
        data[40..44].copy_from_slice(&0.24f32.to_le_bytes());

        let info = parse_display_info(&data).unwrap();
        assert_eq!(info.distortion_type, 2);
        assert_eq!(info.h_resolution, 1280);
        assert_eq!(info.v_resolution, 800);
        assert!((info.h_screen_size - 0.14976).abs() < 1e-6);
        assert!((info.lens_separation - 0.0635).abs() < 1e-6);
        assert!((info.eye_to_screen_distance[0] - 0.041).abs() < 1e-6);
        assert_eq!(info.distortion_k[1], 0.22);
        assert_eq!(info.distortion_k[3], 0.0);
    }

    #[test]
    fn test_parse_display_info_too_short() {
        let data = [REPORT_DISPLAY_INFO, 0, 0];
        assert!(matches!(
            parse_display_info(&data),
            Err(HmdError::InvalidReport { id: 0x09, len: 3 })
        ));
    }

    #[test]
    fn test_sensor_config_encode_decode() {
        let config = SensorConfig {
            flags: SensorConfigFlags::USE_CALIBRATION | SensorConfigFlags::AUTO_CALIBRATION,
            packet_interval: 0,
            keep_alive_interval: 10_000,
        };
        let buf = build_sensor_config(&config);
        assert_eq!(buf[0], REPORT_SENSOR_CONFIG);
        assert_eq!(buf[3], 0x0C);
        assert_eq!(parse_sensor_config(&buf).unwrap(), config);
    }

    #[test]
    fn test_build_keep_alive() {
        assert_eq!(build_keep_alive(10_000), [0x08, 0, 0, 0x10, 0x27]);
    }

    #[test]
    fn test_timestamp_delta_wraps() {
        assert_eq!(timestamp_delta(100, 103), 3);
        assert_eq!(timestamp_delta(0xFFFE, 0x0001), 3);
    }
}
