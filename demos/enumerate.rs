//! List attached Rift DK1 trackers, one per line.
//!
//! Exits with status 2 when none are attached.

use riftcore::device::list_devices;
use riftcore::DeviceInfo;

fn describe(dev: &DeviceInfo) -> String {
    let serial = if dev.serial.is_empty() { "-" } else { dev.serial.as_str() };
    format!(
        "{:<24} rev {:04x}  serial {:<16} {}",
        dev.product, dev.release, serial, dev.path
    )
}

fn main() -> Result<(), riftcore::HmdError> {
    env_logger::init();

    let trackers = list_devices()?;
    if trackers.is_empty() {
        eprintln!("No DK1 tracker attached (VID 2833, PID 0001)");
        std::process::exit(2);
    }
    for dev in &trackers {
        println!("{}", describe(dev));
    }
    Ok(())
}
