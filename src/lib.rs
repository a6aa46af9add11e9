//! Driver for the I-O DATA USB-UD-CO2S CO2/humidity/temperature sensor.
//!
//! The sensor shows up as a USB virtual serial port and speaks a line-based
//! ASCII protocol. [`SensorSession`] finds it by USB vendor/product id, opens
//! the port, sends the start command and forwards every parsed line to a
//! callback.
//!
//! ```no_run
//! use std::sync::Arc;
//! use ud_co2s_lib::{NativeTransport, SensorCallback, SensorReading, SensorSession};
//!
//! # async fn run() {
//! let session = SensorSession::new(Arc::new(NativeTransport::new()));
//! let callback: SensorCallback = Arc::new(|reading: SensorReading, message: Option<String>| {
//!     println!("{:?} {:?}", reading, message);
//! });
//! let _ = session.start(Some(callback)).await;
//! // ...
//! session.stop().await;
//! # }
//! ```
pub mod config;
pub mod device;
pub mod serial;

pub use config::{PortConfig, SensorIdentity};
pub use device::{ReadingRecord, SensorCallback, SensorSession, SessionError, SessionState};
pub use serial::{
    CloseReason, NativeTransport, PortDescriptor, ReadingState, SensorReading, TransportProvider,
};
