//! Optional device tilt input from a Linux IIO accelerometer.
//!
//! Acquisition probes the sysfs tree once; when no usable accelerometer is
//! present the caller logs the error and carries on with pointer input only.
//! A successful acquisition owns a polling thread that converts the gravity
//! vector into tilt angles and streams them over a channel.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, info, warn};

use crate::frame::CancellationToken;

pub const DEFAULT_SENSOR_ROOT: &str = "/sys/bus/iio/devices";

const POLL_INTERVAL: Duration = Duration::from_millis(16);
const AXES: [&str; 3] = ["x", "y", "z"];

#[derive(Debug, thiserror::Error)]
pub enum OrientationError {
    #[error("no accelerometer found under {0}")]
    NoDevice(PathBuf),
    #[error("failed to read accelerometer channel {path}: {error}")]
    Read {
        path: PathBuf,
        #[source]
        error: io::Error,
    },
    #[error("malformed accelerometer value '{raw}' in {path}")]
    Malformed { path: PathBuf, raw: String },
    #[error("failed to spawn orientation thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Tilt angles in degrees.
///
/// `beta` is front-to-back rotation around the x axis, `gamma` left-to-right
/// rotation around the y axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationSample {
    pub gamma: f32,
    pub beta: f32,
}

impl OrientationSample {
    /// Derives tilt from an accelerometer reading in device coordinates.
    pub fn from_gravity([x, y, z]: [f64; 3]) -> Self {
        let beta = y.atan2(z).to_degrees();
        let gamma = (-x).atan2(y.hypot(z)).to_degrees();
        Self {
            gamma: gamma as f32,
            beta: beta as f32,
        }
    }
}

#[derive(Debug, Clone)]
struct Accelerometer {
    dir: PathBuf,
    scale: f64,
}

impl Accelerometer {
    fn discover(root: &Path) -> Result<Self, OrientationError> {
        let entries = fs::read_dir(root).map_err(|_| OrientationError::NoDevice(root.into()))?;
        let mut candidates: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with("iio:device"))
            })
            .filter(|path| {
                AXES.iter()
                    .all(|axis| path.join(format!("in_accel_{axis}_raw")).is_file())
            })
            .collect();
        candidates.sort();

        let dir = candidates
            .into_iter()
            .next()
            .ok_or_else(|| OrientationError::NoDevice(root.into()))?;
        let scale = match read_value(&dir.join("in_accel_scale")) {
            Ok(scale) => scale,
            Err(OrientationError::Read { .. }) => 1.0,
            Err(err) => return Err(err),
        };
        debug!(device = %dir.display(), scale, "found accelerometer");
        Ok(Self { dir, scale })
    }

    fn read(&self) -> Result<[f64; 3], OrientationError> {
        let mut vector = [0.0; 3];
        for (slot, axis) in vector.iter_mut().zip(AXES) {
            *slot = read_value(&self.dir.join(format!("in_accel_{axis}_raw")))? * self.scale;
        }
        Ok(vector)
    }
}

fn read_value(path: &Path) -> Result<f64, OrientationError> {
    let raw = fs::read_to_string(path).map_err(|error| OrientationError::Read {
        path: path.into(),
        error,
    })?;
    raw.trim()
        .parse()
        .map_err(|_| OrientationError::Malformed {
            path: path.into(),
            raw: raw.trim().to_string(),
        })
}

/// Replaces any unread sample with `sample`. Returns false once the
/// consumer is gone.
fn publish_latest(
    sender: &Sender<OrientationSample>,
    stale: &Receiver<OrientationSample>,
    mut sample: OrientationSample,
) -> bool {
    loop {
        match sender.try_send(sample) {
            Ok(()) => return true,
            Err(TrySendError::Full(rejected)) => {
                let _ = stale.try_recv();
                sample = rejected;
            }
            Err(TrySendError::Disconnected(_)) => return false,
        }
    }
}

/// Running accelerometer poller. Dropping it stops the thread.
pub struct OrientationSensor {
    receiver: Receiver<OrientationSample>,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl OrientationSensor {
    /// Probes for an accelerometer under `root` and starts polling it.
    ///
    /// The first reading is taken before the thread starts so unreadable
    /// channels fail here rather than silently later.
    pub fn acquire(root: &Path) -> Result<Self, OrientationError> {
        let accelerometer = Accelerometer::discover(root)?;
        let first = OrientationSample::from_gravity(accelerometer.read()?);

        let (sender, receiver) = bounded(1);
        let stale = receiver.clone();
        publish_latest(&sender, &stale, first);
        let token = CancellationToken::new();
        let thread_token = token.clone();
        let handle = thread::Builder::new()
            .name("orientation".into())
            .spawn(move || {
                while !thread_token.is_cancelled() {
                    thread::sleep(POLL_INTERVAL);
                    let sample = match accelerometer.read() {
                        Ok(vector) => OrientationSample::from_gravity(vector),
                        Err(err) => {
                            warn!(error = %err, "orientation polling stopped");
                            break;
                        }
                    };
                    if !publish_latest(&sender, &stale, sample) {
                        break;
                    }
                }
            })
            .map_err(OrientationError::Spawn)?;

        info!("device orientation input enabled");
        Ok(Self {
            receiver,
            token,
            handle: Some(handle),
        })
    }

    /// Drains pending samples and keeps the newest.
    pub fn latest(&self) -> Option<OrientationSample> {
        self.receiver.try_iter().last()
    }
}

impl Drop for OrientationSensor {
    fn drop(&mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_device(root: &Path, name: &str, [x, y, z]: [&str; 3], scale: Option<&str>) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("in_accel_x_raw"), x).unwrap();
        fs::write(dir.join("in_accel_y_raw"), y).unwrap();
        fs::write(dir.join("in_accel_z_raw"), z).unwrap();
        if let Some(scale) = scale {
            fs::write(dir.join("in_accel_scale"), scale).unwrap();
        }
        dir
    }

    #[test]
    fn flat_device_has_no_tilt() {
        let sample = OrientationSample::from_gravity([0.0, 0.0, 9.81]);
        assert!(sample.gamma.abs() < 1e-4);
        assert!(sample.beta.abs() < 1e-4);
    }

    #[test]
    fn tilting_changes_both_axes() {
        let upright = OrientationSample::from_gravity([0.0, 9.81, 0.0]);
        assert!((upright.beta - 90.0).abs() < 1e-3);

        let right_down = OrientationSample::from_gravity([-1.0, 0.0, 1.0]);
        assert!((right_down.gamma - 45.0).abs() < 1e-3);
    }

    #[test]
    fn acquires_scaled_device_and_streams_samples() {
        let root = tempfile::tempdir().unwrap();
        write_device(root.path(), "iio:device0", ["-50", "0", "50\n"], Some("0.01"));

        let sensor = OrientationSensor::acquire(root.path()).unwrap();
        let sample = sensor.latest().unwrap();
        assert!((sample.gamma - 45.0).abs() < 1e-3);
        assert!(sample.beta.abs() < 1e-3);
    }

    #[test]
    fn unread_samples_do_not_pile_up() {
        let root = tempfile::tempdir().unwrap();
        write_device(root.path(), "iio:device0", ["0", "0", "1"], None);

        let sensor = OrientationSensor::acquire(root.path()).unwrap();
        thread::sleep(POLL_INTERVAL * 8);
        assert!(sensor.receiver.len() <= 1);
        assert!(sensor.latest().is_some());
    }

    #[test]
    fn publishing_overwrites_the_unread_sample() {
        let (sender, receiver) = bounded(1);
        let first = OrientationSample::from_gravity([0.0, 0.0, 1.0]);
        let second = OrientationSample::from_gravity([-1.0, 0.0, 1.0]);
        assert!(publish_latest(&sender, &receiver, first));
        assert!(publish_latest(&sender, &receiver, second));
        assert_eq!(receiver.len(), 1);
        let latest = receiver.try_recv().unwrap();
        assert!((latest.gamma - 45.0).abs() < 1e-3);
    }

    #[test]
    fn skips_devices_without_accel_channels() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("iio:device0")).unwrap();
        fs::write(root.path().join("iio:device0/in_illuminance_raw"), "12").unwrap();
        write_device(root.path(), "iio:device1", ["0", "0", "1"], None);

        let sensor = OrientationSensor::acquire(root.path()).unwrap();
        assert!(sensor.latest().is_some());
    }

    #[test]
    fn missing_device_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        assert!(matches!(
            OrientationSensor::acquire(root.path()),
            Err(OrientationError::NoDevice(_))
        ));
        assert!(matches!(
            OrientationSensor::acquire(&root.path().join("absent")),
            Err(OrientationError::NoDevice(_))
        ));
    }

    #[test]
    fn malformed_reading_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        write_device(root.path(), "iio:device0", ["x", "0", "1"], None);
        assert!(matches!(
            OrientationSensor::acquire(root.path()),
            Err(OrientationError::Malformed { .. })
        ));
    }
}
