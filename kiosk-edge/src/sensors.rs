//! DS18B20 temperature sensors on the 1-Wire bus
//!
//! Each sensor shows up as `{W1_DEVICES_DIR}/28-xxxxxxxxxxxx/w1_slave`:
//!
//! ```text
//! 72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
//! 72 01 4b 46 7f ff 0e 10 57 t=23125
//! ```

use parking_lot::Mutex;
use shared::SensorEvent;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const FAMILY_PREFIX: &str = "28";
const CRC_RETRIES: usize = 5;
const CRC_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Sampling interval with at least one sensor attached
pub const ACTIVE_INTERVAL: Duration = Duration::from_secs(30);
/// Sampling interval with nothing attached
pub const IDLE_INTERVAL: Duration = Duration::from_secs(600);

/// Temperature in °C from a `w1_slave` file. `None` until the CRC line
/// reports `YES`.
pub fn parse_w1_slave(contents: &str) -> Option<f64> {
    let mut lines = contents.lines();
    if !lines.next()?.trim_end().ends_with("YES") {
        return None;
    }
    let line = lines.next()?;
    let pos = line.find("t=")?;
    line[pos + 2..]
        .trim()
        .parse::<f64>()
        .ok()
        .map(|milli| milli / 1000.0)
}

pub struct TemperatureSensors {
    dir: PathBuf,
    readings: Mutex<BTreeMap<String, f64>>,
}

impl TemperatureSensors {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            readings: Mutex::new(BTreeMap::new()),
        }
    }

    async fn discover(&self) -> Vec<(String, PathBuf)> {
        let mut found = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %self.dir.display(), error = %e, "no 1-Wire bus");
                return found;
            }
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(FAMILY_PREFIX) {
                found.push((name, entry.path().join("w1_slave")));
            }
        }
        found
    }

    async fn read_sensor(path: &Path) -> Option<f64> {
        for _ in 0..CRC_RETRIES {
            match tokio::fs::read_to_string(path).await {
                Ok(contents) => {
                    if let Some(value) = parse_w1_slave(&contents) {
                        return Some(value);
                    }
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "sensor read failed");
                    return None;
                }
            }
            tokio::time::sleep(CRC_RETRY_DELAY).await;
        }
        None
    }

    /// Rescan the bus and read every sensor. Disconnected sensors are
    /// dropped; a sensor that fails to read keeps its previous value.
    /// Returns the number of connected sensors.
    pub async fn refresh(&self) -> usize {
        let connected = self.discover().await;
        let mut fresh = BTreeMap::new();
        for (id, path) in &connected {
            if let Some(value) = Self::read_sensor(path).await {
                fresh.insert(id.clone(), value);
            }
        }

        let mut readings = self.readings.lock();
        readings.retain(|id, _| {
            let keep = connected.iter().any(|(c, _)| c == id);
            if !keep {
                info!(sensor = %id, "sensor disconnected");
            }
            keep
        });
        readings.extend(fresh);
        connected.len()
    }

    /// Latest readings per sensor id
    pub fn readings(&self) -> BTreeMap<String, f64> {
        self.readings.lock().clone()
    }

    /// Events for the health snapshot; empty until something was read
    pub fn events(&self) -> Vec<SensorEvent> {
        let readings = self.readings();
        if readings.is_empty() {
            Vec::new()
        } else {
            vec![SensorEvent::temperature(readings)]
        }
    }

    pub async fn run(&self, shutdown: CancellationToken) {
        loop {
            let count = self.refresh().await;
            let interval = if count > 0 {
                ACTIVE_INTERVAL
            } else {
                IDLE_INTERVAL
            };
            debug!(sensors = count, ?interval, "temperature sampled");
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }
}
