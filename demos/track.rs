//! Print head orientation from the first connected HMD.
//!
//! Usage: cargo run --example track [--calibrate]
//! With `--calibrate`, turn the head around until calibration completes.
//! Press Ctrl+C to stop.

use riftcore::{RiftDriver, Session};
use std::time::{Duration, Instant};

fn main() {
    env_logger::init();
    let calibrate = std::env::args().any(|a| a == "--calibrate");

    let mut session = Session::new(RiftDriver::default());
    if !session.init() {
        if let Some(e) = session.last_error() {
            eprintln!("Failed to open HMD: {}", e);
        }
        std::process::exit(1);
    }

    session.set_prediction(0.03, true);
    if calibrate {
        session.begin_calibration();
        println!("Calibrating, look around in all directions...");
    }

    let mut last_report = Instant::now();
    let mut last_count = 0;
    loop {
        session.poll();

        if calibrate && !session.is_calibrated() {
            let count = session.update_calibration();
            if count != last_count {
                println!("Calibration sample {}/4", count);
                last_count = count;
            }
            if session.is_calibrated() {
                println!("Calibrated, yaw correction on");
            }
        }

        if last_report.elapsed() >= Duration::from_millis(100) {
            println!(
                "yaw={:+.3} pitch={:+.3} roll={:+.3}{}",
                session.yaw().to_degrees(),
                session.pitch().to_degrees(),
                session.roll().to_degrees(),
                if session.is_yaw_correction_in_progress() {
                    "  (correcting)"
                } else {
                    ""
                }
            );
            last_report = Instant::now();
        }

        std::thread::sleep(Duration::from_millis(5));
    }
}
