//! In-memory transport for driving a session without hardware.
//!
//! [`MockTransport`] is handed to the session as its provider, while the
//! paired [`MockDevice`] stays with the test and plays the sensor: it injects
//! lines, simulates an unplug and records everything the session wrote.
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use super::interface::{OpenedPort, SerialLink, TransportEvent, TransportProvider, EVENT_CAPACITY};
use super::{PortDescriptor, Result, SerialError};
use crate::config::PortConfig;

pub struct MockTransport {
    ports: Vec<PortDescriptor>,
    list_error: Option<String>,
    open_error: Option<String>,
    write_error: Option<String>,
    stalled_lists: AtomicUsize,
    stalled_closes: Arc<AtomicUsize>,
    device: MockDevice,
}

impl MockTransport {
    pub fn new(ports: Vec<PortDescriptor>) -> (Self, MockDevice) {
        let device = MockDevice::default();
        let transport = Self {
            ports,
            list_error: None,
            open_error: None,
            write_error: None,
            stalled_lists: AtomicUsize::new(0),
            stalled_closes: Arc::new(AtomicUsize::new(0)),
            device: device.clone(),
        };
        (transport, device)
    }

    /// Make enumeration fail
    pub fn with_list_error(mut self, message: impl Into<String>) -> Self {
        self.list_error = Some(message.into());
        self
    }

    /// Make every open attempt fail
    pub fn with_open_error(mut self, message: impl Into<String>) -> Self {
        self.open_error = Some(message.into());
        self
    }

    /// Make every write on an opened port fail
    pub fn with_write_error(mut self, message: impl Into<String>) -> Self {
        self.write_error = Some(message.into());
        self
    }

    /// The next `count` enumerations never complete
    pub fn with_stalled_list(self, count: usize) -> Self {
        self.stalled_lists.store(count, Ordering::SeqCst);
        self
    }

    /// The next `count` port closes never complete
    pub fn with_stalled_close(self, count: usize) -> Self {
        self.stalled_closes.store(count, Ordering::SeqCst);
        self
    }
}

fn take_stall(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl TransportProvider for MockTransport {
    async fn list(&self) -> Result<Vec<PortDescriptor>> {
        if take_stall(&self.stalled_lists) {
            std::future::pending::<()>().await;
        }
        match &self.list_error {
            Some(message) => Err(SerialError::Enumeration(message.clone())),
            None => Ok(self.ports.clone()),
        }
    }

    async fn open(&self, config: &PortConfig) -> Result<OpenedPort> {
        if let Some(message) = &self.open_error {
            return Err(SerialError::ConnectionFailed(message.clone()));
        }
        if !self.ports.iter().any(|p| p.path == config.path) {
            return Err(SerialError::PortNotFound(config.path.clone()));
        }

        let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);
        {
            let mut state = self.device.state.lock().await;
            if state.events_tx.is_some() {
                return Err(SerialError::ConnectionFailed(format!("{} is busy", config.path)));
            }
            state.events_tx = Some(events_tx.clone());
            state.opened.push(config.clone());
        }

        Ok(OpenedPort {
            link: Box::new(MockLink {
                device: self.device.clone(),
                events_tx: Some(events_tx),
                write_error: self.write_error.clone(),
                stalled_closes: self.stalled_closes.clone(),
            }),
            events: events_rx,
        })
    }
}

struct MockLink {
    device: MockDevice,
    events_tx: Option<mpsc::Sender<TransportEvent>>,
    write_error: Option<String>,
    stalled_closes: Arc<AtomicUsize>,
}

#[async_trait]
impl SerialLink for MockLink {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.events_tx.is_none() {
            return Err(SerialError::NotConnected);
        }
        if let Some(message) = &self.write_error {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, message.clone()).into());
        }
        self.device.state.lock().await.written.push(data.to_vec());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if take_stall(&self.stalled_closes) {
            std::future::pending::<()>().await;
        }
        // A real port reports its own close as well
        if let Some(events_tx) = self.events_tx.take() {
            let _ = events_tx.try_send(TransportEvent::Closed);
        }
        let mut state = self.device.state.lock().await;
        state.events_tx = None;
        state.close_count += 1;
        Ok(())
    }
}

// An abandoned link frees the port, like dropping a native handle does
impl Drop for MockLink {
    fn drop(&mut self) {
        let Some(events_tx) = self.events_tx.take() else {
            return;
        };
        if let Ok(mut state) = self.device.state.try_lock() {
            if state.events_tx.as_ref().is_some_and(|tx| tx.same_channel(&events_tx)) {
                state.events_tx = None;
            }
        }
    }
}

#[derive(Default)]
struct DeviceState {
    events_tx: Option<mpsc::Sender<TransportEvent>>,
    written: Vec<Vec<u8>>,
    opened: Vec<PortConfig>,
    close_count: usize,
}

/// Test-side handle playing the sensor
#[derive(Clone, Default)]
pub struct MockDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl MockDevice {
    /// Send raw bytes to the session. Returns false if no port is open.
    pub async fn send(&self, bytes: &[u8]) -> bool {
        let events_tx = self.state.lock().await.events_tx.clone();
        match events_tx {
            Some(tx) => tx.send(TransportEvent::Data(bytes.to_vec())).await.is_ok(),
            None => false,
        }
    }

    /// Send one CRLF-terminated line
    pub async fn send_line(&self, line: &str) -> bool {
        self.send(format!("{}\r\n", line).as_bytes()).await
    }

    /// Report a read failure on the open port
    pub async fn fail(&self, message: &str) -> bool {
        let events_tx = self.state.lock().await.events_tx.clone();
        match events_tx {
            Some(tx) => tx.send(TransportEvent::Error(message.to_string())).await.is_ok(),
            None => false,
        }
    }

    /// Simulate the sensor being pulled out of the USB socket
    pub async fn unplug(&self) -> bool {
        let events_tx = self.state.lock().await.events_tx.take();
        match events_tx {
            Some(tx) => tx.send(TransportEvent::Closed).await.is_ok(),
            None => false,
        }
    }

    pub async fn is_open(&self) -> bool {
        self.state.lock().await.events_tx.is_some()
    }

    /// Every frame written by the session, in order
    pub async fn written(&self) -> Vec<Vec<u8>> {
        self.state.lock().await.written.clone()
    }

    /// Configurations of every successful open, in order
    pub async fn opened(&self) -> Vec<PortConfig> {
        self.state.lock().await.opened.clone()
    }

    pub async fn close_count(&self) -> usize {
        self.state.lock().await.close_count
    }
}
