use crate::driver::SensorDevice;
use crate::hid::HidTransport;
use crate::protocol;
use crate::types::SensorSample;
use crate::{HmdError, Result};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use hidapi::HidApi;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Margin before the keep-alive lapses at which the reader renews it.
const KEEP_ALIVE_MARGIN: Duration = Duration::from_millis(200);

/// Handle to the DK1 tracker sample stream.
///
/// A background reader thread owns its own HID handle, decodes tracker
/// reports and publishes [`SensorSample`]s on a bounded channel.
pub struct TrackerStream {
    receiver: Receiver<SensorSample>,
    stop_flag: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
    /// Keeps the hidapi context alive for the reader's handle.
    _api: HidApi,
}

impl TrackerStream {
    /// Start the reader thread on an already configured tracker handle.
    pub(crate) fn start(
        transport: HidTransport,
        api: HidApi,
        keep_alive_ms: u16,
        capacity: usize,
    ) -> Result<TrackerStream> {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_clone = stop_flag.clone();

        let thread = std::thread::Builder::new()
            .name("rift-tracker".into())
            .spawn(move || {
                tracker_reader_loop(transport, sender, stop_clone, keep_alive_ms);
            })
            .map_err(|e| HmdError::HidCommand(format!("Failed to spawn tracker thread: {}", e)))?;

        Ok(TrackerStream {
            receiver,
            stop_flag,
            thread: Some(thread),
            _api: api,
        })
    }

    fn shutdown(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
            log::info!("Tracker stream closed");
        }
    }
}

impl SensorDevice for TrackerStream {
    fn try_sample(&mut self) -> Result<Option<SensorSample>> {
        match self.receiver.try_recv() {
            Ok(sample) => Ok(Some(sample)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(HmdError::StreamStopped),
        }
    }
}

impl Drop for TrackerStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The tracker reader loop runs in a dedicated thread.
///
/// Reads with a 100ms timeout so the stop flag and keep-alive deadline
/// are checked regularly. A read error ends the loop, which disconnects
/// the channel.
fn tracker_reader_loop(
    transport: HidTransport,
    sender: Sender<SensorSample>,
    stop_flag: Arc<AtomicBool>,
    keep_alive_ms: u16,
) {
    let renew_after = Duration::from_millis(keep_alive_ms as u64).saturating_sub(KEEP_ALIVE_MARGIN);
    let mut last_keep_alive = Instant::now();
    let mut last_timestamp: Option<u16> = None;
    let mut buf = [0u8; 64];

    log::info!("Tracker reader started");

    loop {
        if stop_flag.load(Ordering::Relaxed) {
            log::info!("Tracker reader stopping (stop flag set)");
            break;
        }

        if last_keep_alive.elapsed() >= renew_after {
            if let Err(e) = transport.keep_alive(keep_alive_ms) {
                log::warn!("Tracker keep-alive failed: {}", e);
            }
            last_keep_alive = Instant::now();
        }

        let len = match transport.read_input(&mut buf, 100) {
            Ok(0) => continue,
            Ok(n) => n,
            Err(e) => {
                log::warn!("Tracker read error, stopping reader: {}", e);
                break;
            }
        };

        let Some(msg) = protocol::parse_tracker_message(&buf[..len]) else {
            continue;
        };

        // First report (or a repeated timestamp) carries no usable delta; assume 1ms per reading.
        let elapsed_ms = match last_timestamp {
            Some(previous) => protocol::timestamp_delta(previous, msg.timestamp),
            None => 0,
        };
        let elapsed_ms = if elapsed_ms == 0 {
            msg.samples.len() as u16
        } else {
            elapsed_ms
        };
        last_timestamp = Some(msg.timestamp);

        for sample in msg.sensor_samples(elapsed_ms as f32 * 0.001) {
            if let Err(e) = sender.try_send(sample) {
                match e {
                    crossbeam_channel::TrySendError::Full(_) => {
                        log::trace!("Tracker channel full, dropping sample");
                    }
                    crossbeam_channel::TrySendError::Disconnected(_) => {
                        log::info!("Tracker channel disconnected, stopping reader");
                        return;
                    }
                }
            }
        }
    }
}
