use serde::{Deserialize, Serialize};

/// "STA\r\n" asks the sensor to start streaming measurements
const START_COMMAND: [u8; 5] = [0x53, 0x54, 0x41, 0x0d, 0x0a];
/// "STP\r\n" asks the sensor to stop streaming
const STOP_COMMAND: [u8; 5] = [0x53, 0x54, 0x50, 0x0d, 0x0a];

const ACK_LINE: &str = "OK STA";
const FIELD_COUNT: usize = 3;

/// Typed result of one event in a sensor session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorReading {
    /// The sensor accepted the start command ("OK STA")
    Acknowledged,
    /// One telemetry line. Values are kept exactly as the sensor printed them.
    Measurement {
        co2: String,
        humidity: String,
        temperature: String,
    },
    ConnectionClosed { reason: CloseReason },
    Error { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    /// Closed by `stop`
    Stopped,
    /// Closed by the transport, e.g. the sensor was unplugged
    Disconnected,
}

/// Caller-facing state label of a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadingState {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "connected")]
    Connected,
    #[serde(rename = "warning")]
    Warning,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "info")]
    Info,
}

impl SensorReading {
    pub fn state(&self) -> ReadingState {
        match self {
            SensorReading::Acknowledged => ReadingState::Ok,
            SensorReading::Measurement { .. } => ReadingState::Connected,
            SensorReading::ConnectionClosed { reason: CloseReason::Disconnected } => {
                ReadingState::Warning
            }
            SensorReading::ConnectionClosed { reason: CloseReason::Stopped } => ReadingState::Info,
            SensorReading::Error { .. } => ReadingState::Error,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, SensorReading::Error { .. })
    }

    pub fn error(message: impl Into<String>) -> Self {
        SensorReading::Error { message: message.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("line is not valid text: {0}")]
    NotText(#[from] std::str::Utf8Error),

    #[error("expected 3 comma-separated fields, got {0}")]
    FieldCount(usize),

    #[error("field has no value: {0:?}")]
    MissingValue(String),
}

/// Start command frame
pub fn encode_start() -> Vec<u8> {
    START_COMMAND.to_vec()
}

/// Stop command frame
pub fn encode_stop() -> Vec<u8> {
    STOP_COMMAND.to_vec()
}

/// Parse one line from the sensor.
///
/// Only the first line of `bytes` is considered. Telemetry fields are taken
/// by position (CO2, HUM, TMP); the key names are not checked.
pub fn parse_line(bytes: &[u8]) -> Result<SensorReading, DecodeError> {
    let text = std::str::from_utf8(bytes)?;
    let line = first_line(text);

    if line == ACK_LINE {
        return Ok(SensorReading::Acknowledged);
    }

    // Format: "CO2=606,HUM=46.5,TMP=29.8"
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != FIELD_COUNT {
        return Err(DecodeError::FieldCount(fields.len()));
    }

    let value = |field: &str| {
        field
            .split_once('=')
            .map(|(_, value)| value.to_string())
            .ok_or_else(|| DecodeError::MissingValue(field.to_string()))
    };

    Ok(SensorReading::Measurement {
        co2: value(fields[0])?,
        humidity: value(fields[1])?,
        temperature: value(fields[2])?,
    })
}

/// Like [`parse_line`], but folds any failure into `SensorReading::Error`.
pub fn decode_line(bytes: &[u8]) -> SensorReading {
    parse_line(bytes).unwrap_or_else(|e| SensorReading::error(e.to_string()))
}

fn first_line(text: &str) -> &str {
    let line = text.split('\n').next().unwrap_or("");
    line.strip_suffix('\r').unwrap_or(line)
}
