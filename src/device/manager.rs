use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use super::{Result, SensorCallback, SessionError, SessionState};
use crate::config::{PortConfig, SensorIdentity};
use crate::serial::interface::{OpenedPort, SerialLink, TransportEvent, TransportProvider};
use crate::serial::{self, protocol, CloseReason, LineFramer, PortDescriptor, SensorReading};

const PORT_CLOSED: &str = "port is closed";

/// Mutable session state shared with the event pump
struct SessionShared {
    state: SessionState,
    session_id: Option<Uuid>,
    port_path: Option<String>,
    link: Option<Box<dyn SerialLink>>,
    callback: Option<SensorCallback>,
    /// Bumped by every `start`/`stop` that enters a transitional state
    attempt: u64,
}

impl SessionShared {
    fn new() -> Self {
        Self {
            state: SessionState::Idle,
            session_id: None,
            port_path: None,
            link: None,
            callback: None,
            attempt: 0,
        }
    }

    fn begin(&mut self, state: SessionState) -> u64 {
        self.state = state;
        self.attempt += 1;
        self.attempt
    }

    fn reset(&mut self) {
        self.state = SessionState::Idle;
        self.session_id = None;
        self.port_path = None;
        self.link = None;
    }

    fn reset_abandoned(&mut self, attempt: u64) {
        let transitional = matches!(
            self.state,
            SessionState::Discovering | SessionState::Opening | SessionState::Closing
        );
        if self.attempt == attempt && transitional {
            log::warn!("Session abandoned while {:?}, back to idle", self.state);
            self.reset();
        }
    }
}

/// Returns the session to `Idle` when a `start` or `stop` future is dropped
/// before it leaves its transitional state.
struct PhaseGuard {
    shared: Arc<Mutex<SessionShared>>,
    attempt: u64,
    armed: bool,
}

impl PhaseGuard {
    fn new(shared: &Arc<Mutex<SessionShared>>, attempt: u64) -> Self {
        Self {
            shared: shared.clone(),
            attempt,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PhaseGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let attempt = self.attempt;
        match self.shared.try_lock() {
            Ok(mut shared) => shared.reset_abandoned(attempt),
            Err(_) => match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let shared = self.shared.clone();
                    handle.spawn(async move {
                        shared.lock().await.reset_abandoned(attempt);
                    });
                }
                Err(_) => log::error!("Session abandoned outside a runtime, state left as is"),
            },
        }
    }
}

/// Owns the single connection to the sensor.
///
/// `start` discovers the sensor, opens its port and sends the start command;
/// readings then flow to the registered callback until `stop` or until the
/// transport reports the port closed. Only one session can be open at a time.
pub struct SensorSession {
    provider: Arc<dyn TransportProvider>,
    identity: SensorIdentity,
    shared: Arc<Mutex<SessionShared>>,
}

impl SensorSession {
    pub fn new(provider: Arc<dyn TransportProvider>) -> Self {
        Self::with_identity(provider, SensorIdentity::default())
    }

    pub fn with_identity(provider: Arc<dyn TransportProvider>, identity: SensorIdentity) -> Self {
        Self {
            provider,
            identity,
            shared: Arc::new(Mutex::new(SessionShared::new())),
        }
    }

    pub fn identity(&self) -> &SensorIdentity {
        &self.identity
    }

    pub async fn state(&self) -> SessionState {
        self.shared.lock().await.state
    }

    pub async fn is_active(&self) -> bool {
        self.shared.lock().await.link.is_some()
    }

    /// Path of the open port, if any
    pub async fn port_path(&self) -> Option<String> {
        self.shared.lock().await.port_path.clone()
    }

    pub async fn session_id(&self) -> Option<Uuid> {
        self.shared.lock().await.session_id
    }

    /// Enumerate the ports that look like the sensor, in provider order.
    /// Enumeration failures are logged and yield an empty list.
    pub async fn discover(&self) -> Vec<PortDescriptor> {
        let ports = match self.provider.list().await {
            Ok(ports) => ports,
            Err(e) => {
                log::warn!("Serial port enumeration failed: {}", e);
                Vec::new()
            }
        };

        serial::find_sensor_ports(&ports, &self.identity)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Start a session reporting to `callback`.
    ///
    /// Every failure is also dispatched to a callback (the already registered
    /// one when a session is running) before being returned.
    pub async fn start(&self, callback: Option<SensorCallback>) -> Result<()> {
        let guard = {
            let mut shared = self.shared.lock().await;

            if shared.state != SessionState::Idle {
                let current = shared.callback.clone();
                drop(shared);
                let err = SessionError::SessionAlreadyActive;
                report(current.as_ref(), &err);
                return Err(err);
            }

            let Some(callback) = callback else {
                log::error!("start(): {}", SessionError::CallbackMissing);
                return Err(SessionError::CallbackMissing);
            };

            shared.callback = Some(callback);
            PhaseGuard::new(&self.shared, shared.begin(SessionState::Discovering))
        };

        let candidates = self.discover().await;
        let Some(port) = candidates.first() else {
            return Err(self.abort_start(SessionError::SensorNotFound).await);
        };
        if candidates.len() > 1 {
            log::info!("{} sensors found, using the first one on {}", candidates.len(), port.path);
        }

        self.shared.lock().await.state = SessionState::Opening;

        let config = PortConfig::for_path(port.path.clone());
        log::info!("Opening sensor port {}", config.path);
        let OpenedPort { link, events } = match self.provider.open(&config).await {
            Ok(opened) => opened,
            Err(e) => return Err(self.abort_start(SessionError::TransportOpenFailure(e)).await),
        };

        let session_id = Uuid::new_v4();
        let write_result = {
            let mut shared = self.shared.lock().await;
            shared.state = SessionState::Active;
            shared.session_id = Some(session_id);
            shared.port_path = Some(config.path.clone());

            // The pump blocks on this lock until the start command is out
            tokio::spawn(pump_events(self.shared.clone(), session_id, events));
            guard.disarm();

            shared.link.insert(link).write(&protocol::encode_start()).await
        };

        match write_result {
            Ok(()) => log::info!("Sensor session {} started on {}", session_id, config.path),
            Err(e) => {
                // The session stays up; a dead port reports its own close
                let err = SessionError::Transport(e.to_string());
                log::warn!("Failed to send start command: {}", e);
                let reading = SensorReading::from(&err);
                deliver(&self.shared, session_id, reading, Some(err.to_string())).await;
            }
        }

        Ok(())
    }

    /// Stop streaming and release the port.
    ///
    /// Safe to call at any time. A registered callback always receives an
    /// informational close event and is then unregistered.
    pub async fn stop(&self) {
        let closing = {
            let mut shared = self.shared.lock().await;
            match shared.link.take() {
                Some(link) => {
                    // Detaches the pump: the close it is about to see is ours
                    shared.session_id = None;
                    let attempt = shared.begin(SessionState::Closing);
                    Some((link, PhaseGuard::new(&self.shared, attempt)))
                }
                None => None,
            }
        };

        if let Some((mut link, guard)) = closing {
            if let Err(e) = link.write(&protocol::encode_stop()).await {
                log::warn!("Failed to send stop command: {}", e);
            }
            if let Err(e) = link.close().await {
                log::warn!("Failed to close sensor port: {}", e);
            }
            drop(link);

            self.shared.lock().await.reset();
            guard.disarm();
            log::info!("Sensor session stopped");
        }

        let callback = self.shared.lock().await.callback.take();
        if let Some(callback) = callback {
            callback(
                SensorReading::ConnectionClosed { reason: CloseReason::Stopped },
                Some(PORT_CLOSED.to_string()),
            );
        }
    }

    async fn abort_start(&self, err: SessionError) -> SessionError {
        let callback = {
            let mut shared = self.shared.lock().await;
            shared.reset();
            shared.callback.clone()
        };
        log::warn!("start(): {}", err);
        report(callback.as_ref(), &err);
        err
    }
}

fn report(callback: Option<&SensorCallback>, err: &SessionError) {
    match callback {
        Some(callback) => callback(SensorReading::from(err), Some(err.to_string())),
        None => log::error!("{}", err),
    }
}

/// Dispatch to the callback of `session_id`, dropping events of stale sessions.
async fn deliver(
    shared: &Mutex<SessionShared>,
    session_id: Uuid,
    reading: SensorReading,
    message: Option<String>,
) {
    let callback = {
        let shared = shared.lock().await;
        if shared.session_id != Some(session_id) {
            log::debug!("Dropping event of inactive session {}: {:?}", session_id, reading);
            return;
        }
        shared.callback.clone()
    };

    match callback {
        Some(callback) => callback(reading, message),
        None => log::info!("{:?}", reading),
    }
}

async fn pump_events(
    shared: Arc<Mutex<SessionShared>>,
    session_id: Uuid,
    mut events: mpsc::Receiver<TransportEvent>,
) {
    let mut framer = LineFramer::new();

    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Data(bytes) => {
                for line in framer.push(&bytes) {
                    let (reading, message) = match protocol::parse_line(&line) {
                        Ok(reading) => (reading, None),
                        Err(e) => {
                            let err = SessionError::LineDecodeFailure(e);
                            log::warn!("{} ({:?})", err, String::from_utf8_lossy(&line));
                            (SensorReading::from(&err), Some(err.to_string()))
                        }
                    };
                    deliver(&shared, session_id, reading, message).await;
                }
            }
            TransportEvent::Error(message) => {
                let err = SessionError::Transport(message);
                log::warn!("{}", err);
                let reading = SensorReading::from(&err);
                deliver(&shared, session_id, reading, Some(err.to_string())).await;
            }
            TransportEvent::Closed => break,
        }
    }

    handle_disconnect(&shared, session_id).await;
}

/// Transport-side close. A no-op when `stop` already owns the teardown.
async fn handle_disconnect(shared: &Mutex<SessionShared>, session_id: Uuid) {
    let callback = {
        let mut shared = shared.lock().await;
        if shared.session_id != Some(session_id) {
            log::debug!("Close of inactive session {} ignored", session_id);
            return;
        }
        if let Some(path) = &shared.port_path {
            log::warn!("Sensor port {} closed unexpectedly", path);
        }
        shared.reset();
        shared.callback.take()
    };

    if let Some(callback) = callback {
        callback(
            SensorReading::ConnectionClosed { reason: CloseReason::Disconnected },
            Some(SessionError::ConnectionClosedUnexpectedly.to_string()),
        );
    }
}
