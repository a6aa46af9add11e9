use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_serial::{DataBits, SerialPortBuilderExt, SerialStream, StopBits};

use super::{PortDescriptor, Result, SerialError};
use crate::config::{Parity, PortConfig};

pub const EVENT_CAPACITY: usize = 64;
const READ_BUFFER_SIZE: usize = 512;

/// Notifications from an open port
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A chunk of raw bytes, not aligned to lines
    Data(Vec<u8>),
    /// A read failure. The port is normally reported `Closed` right after.
    Error(String),
    /// The port went away, either closed by us or by the OS
    Closed,
}

/// Write side of an open port
#[async_trait]
pub trait SerialLink: Send {
    /// Resolves once the bytes have been handed to the OS
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Resolves once the port is released
    async fn close(&mut self) -> Result<()>;
}

/// A successfully opened port: the link to write through and the event stream to read from
pub struct OpenedPort {
    pub link: Box<dyn SerialLink>,
    pub events: mpsc::Receiver<TransportEvent>,
}

/// OS serial facility: enumeration and opening
#[async_trait]
pub trait TransportProvider: Send + Sync {
    async fn list(&self) -> Result<Vec<PortDescriptor>>;

    /// Resolving `Ok` is the open confirmation
    async fn open(&self, config: &PortConfig) -> Result<OpenedPort>;
}

/// Transport backed by the host's serial ports
#[derive(Debug, Default, Clone)]
pub struct NativeTransport;

impl NativeTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TransportProvider for NativeTransport {
    async fn list(&self) -> Result<Vec<PortDescriptor>> {
        let ports = serialport::available_ports()?;
        Ok(ports.into_iter().map(PortDescriptor::from).collect())
    }

    async fn open(&self, config: &PortConfig) -> Result<OpenedPort> {
        let stream = tokio_serial::new(config.path.as_str(), config.baud_rate)
            .data_bits(data_bits(config.data_bits)?)
            .stop_bits(stop_bits(config.stop_bits)?)
            .parity(parity(config.parity))
            .open_native_async()
            .map_err(|e| SerialError::ConnectionFailed(format!("{}: {}", config.path, e)))?;

        let (reader, writer) = tokio::io::split(stream);
        let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);
        let reader_task = tokio::spawn(read_loop(reader, events_tx));

        log::info!("Opened serial port {} at {} baud", config.path, config.baud_rate);

        Ok(OpenedPort {
            link: Box::new(NativeLink {
                path: config.path.clone(),
                writer: Some(writer),
                reader_task: Some(reader_task),
            }),
            events: events_rx,
        })
    }
}

struct NativeLink {
    path: String,
    writer: Option<WriteHalf<SerialStream>>,
    reader_task: Option<JoinHandle<()>>,
}

#[async_trait]
impl SerialLink for NativeLink {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(SerialError::NotConnected)?;
        writer.write_all(data).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let shutdown = match self.writer.take() {
            Some(mut writer) => writer.shutdown().await,
            None => Ok(()),
        };

        // The read half lives in the task; the port is released once both halves drop
        if let Some(task) = self.reader_task.take() {
            task.abort();
            let _ = task.await;
        }

        log::info!("Closed serial port {}", self.path);
        shutdown.map_err(SerialError::IoError)
    }
}

impl Drop for NativeLink {
    fn drop(&mut self) {
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
    }
}

async fn read_loop<R>(mut reader: R, events: mpsc::Sender<TransportEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut buffer = [0u8; READ_BUFFER_SIZE];
    loop {
        match reader.read(&mut buffer).await {
            Ok(0) => break,
            Ok(n) => {
                if events.send(TransportEvent::Data(buffer[..n].to_vec())).await.is_err() {
                    // Nobody is listening any more
                    return;
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(e) => {
                let _ = events.send(TransportEvent::Error(e.to_string())).await;
                break;
            }
        }
    }
    let _ = events.send(TransportEvent::Closed).await;
}

fn data_bits(bits: u8) -> Result<DataBits> {
    match bits {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        other => Err(SerialError::ConnectionFailed(format!("unsupported data bits: {}", other))),
    }
}

fn stop_bits(bits: u8) -> Result<StopBits> {
    match bits {
        1 => Ok(StopBits::One),
        2 => Ok(StopBits::Two),
        other => Err(SerialError::ConnectionFailed(format!("unsupported stop bits: {}", other))),
    }
}

fn parity(parity: Parity) -> tokio_serial::Parity {
    match parity {
        Parity::None => tokio_serial::Parity::None,
        Parity::Odd => tokio_serial::Parity::Odd,
        Parity::Even => tokio_serial::Parity::Even,
    }
}
