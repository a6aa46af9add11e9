use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::serial::{ReadingState, SensorReading};

/// Sink for every event of a session: the reading plus an optional
/// error or administrative message.
pub type SensorCallback = Arc<dyn Fn(SensorReading, Option<String>) + Send + Sync>;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Discovering,
    Opening,
    Active,
    Closing,
}

/// Flat, serializable view of one callback invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingRecord {
    pub state: ReadingState,
    #[serde(rename = "CO2", skip_serializing_if = "Option::is_none")]
    pub co2: Option<String>,
    #[serde(rename = "HUM", skip_serializing_if = "Option::is_none")]
    pub humidity: Option<String>,
    #[serde(rename = "TMP", skip_serializing_if = "Option::is_none")]
    pub temperature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl ReadingRecord {
    pub fn new(reading: &SensorReading, message: Option<String>) -> Self {
        let (co2, humidity, temperature) = match reading {
            SensorReading::Measurement { co2, humidity, temperature } => {
                (Some(co2.clone()), Some(humidity.clone()), Some(temperature.clone()))
            }
            _ => (None, None, None),
        };

        Self {
            state: reading.state(),
            co2,
            humidity,
            temperature,
            message,
            received_at: Utc::now(),
        }
    }
}
