//! Health snapshot pushed to the backend on every state poll

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Local health as seen by the orchestrator
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HealthSnapshot {
    /// Latest status per managed printer, keyed by peripheral name
    #[serde(default)]
    pub printers: BTreeMap<String, super::StatusReport>,
    #[serde(default)]
    pub events: Vec<SensorEvent>,
}

impl HealthSnapshot {
    /// True when every printer reports `ready`.
    pub fn all_ready(&self) -> bool {
        self.printers
            .values()
            .all(|r| r.status == super::PrinterStatus::Ready)
    }
}

/// Sensor reading event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SensorEvent {
    Temperature {
        timestamp: DateTime<Utc>,
        data: TemperatureData,
    },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemperatureData {
    pub connected_sensors: usize,
    /// Latest reading per sensor id, in degrees Celsius
    pub values_c: BTreeMap<String, f64>,
}

impl SensorEvent {
    pub fn temperature(values_c: BTreeMap<String, f64>) -> Self {
        SensorEvent::Temperature {
            timestamp: Utc::now(),
            data: TemperatureData {
                connected_sensors: values_c.len(),
                values_c,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PrinterStatus, StatusReport};

    #[test]
    fn test_temperature_event_shape() {
        let readings = BTreeMap::from([
            ("28-0001".to_string(), 4.5),
            ("28-0002".to_string(), 5.25),
        ]);
        let event = SensorEvent::temperature(readings);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "temperature");
        assert_eq!(json["data"]["connectedSensors"], 2);
        assert_eq!(json["data"]["valuesC"]["28-0002"], 5.25);
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_all_ready() {
        let mut snapshot = HealthSnapshot::default();
        assert!(snapshot.all_ready());
        snapshot
            .printers
            .insert("receipt".into(), StatusReport::new(PrinterStatus::Ready));
        snapshot
            .printers
            .insert("label".into(), StatusReport::new(PrinterStatus::LowPaper));
        assert!(!snapshot.all_ready());
    }
}
