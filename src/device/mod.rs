pub mod manager;
pub mod models;

pub use manager::SensorSession;
pub use models::*;

use crate::serial::{DecodeError, SensorReading, SerialError};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("port is used already")]
    SessionAlreadyActive,

    #[error("callback is null")]
    CallbackMissing,

    #[error("Sensor is not found")]
    SensorNotFound,

    #[error("failed to open port: {0}")]
    TransportOpenFailure(#[source] SerialError),

    #[error("failed to decode line: {0}")]
    LineDecodeFailure(#[from] DecodeError),

    #[error("port is closed")]
    ConnectionClosedUnexpectedly,

    #[error("transport error: {0}")]
    Transport(String),
}

impl From<&SessionError> for SensorReading {
    fn from(err: &SessionError) -> Self {
        SensorReading::error(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
