/// Errors raised by the HMD drivers and the stereo calculator.
#[derive(Debug, thiserror::Error)]
pub enum HmdError {
    #[error("HID error: {0}")]
    Hid(#[from] hidapi::HidError),

    #[error("Device not found (VID=2833 PID=0001)")]
    DeviceNotFound,

    #[error("HID command failed: {0}")]
    HidCommand(String),

    #[error("Invalid report 0x{id:02x}: {len} bytes")]
    InvalidReport { id: u8, len: usize },

    #[error("Device reports no display information")]
    NoDisplayInfo,

    #[error("Sensor stream stopped")]
    StreamStopped,

    #[error("Invalid viewport size {width}x{height}")]
    InvalidViewport { width: i32, height: i32 },

    #[error("Invalid clip planes: near={near} far={far}")]
    InvalidClipPlanes { near: f32, far: f32 },

    #[error("Driver error: {0}")]
    Driver(String),
}
