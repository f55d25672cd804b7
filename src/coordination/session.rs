//! Session tracking for the coordination client.
//!
//! At most one session is tracked at a time. A freshly opened handle is the
//! *candidate*; it becomes *active* (usable by the layers above) once its
//! `SyncConnected` event is observed. A single dispatcher thread forwards
//! every watch event; events carrying a stale session id are dropped.
//!
//! The cell mutex below is the store's serialization lock: operations run
//! while holding it, and connection-state processing takes it too, so there
//! is never more than one outstanding mutation.

use super::{AuthInfo, EventType, KeeperState, WatchedEvent, ZkConnector, ZkHandle, ZkResult};
use crate::error::StoreError;
use log::{debug, error, info, warn};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

/// Connection lifecycle of the store's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Expired,
    /// Terminal: a peer holds the root's create-delete authority.
    Fenced,
}

struct SessionCell {
    /// Most recently opened handle; the session whose events are trusted.
    candidate: Option<Arc<dyn ZkHandle>>,
    /// Handle promoted on `SyncConnected`; `None` while unusable.
    active: Option<Arc<dyn ZkHandle>>,
    state: SessionState,
    auths: Vec<AuthInfo>,
    shutdown: bool,
}

struct SessionCore {
    connector: Arc<dyn ZkConnector>,
    address: String,
    session_timeout: Duration,
    num_retries: usize,
    default_sync_path: String,
    cell: Mutex<SessionCell>,
    connected: Condvar,
    events_tx: mpsc::Sender<WatchedEvent>,
}

impl SessionCore {
    fn create_connection_locked(&self, cell: &mut SessionCell) -> Result<(), StoreError> {
        if let Some(handle) = cell.candidate.take() {
            handle.close();
        }
        cell.active = None;
        cell.state = SessionState::Connecting;
        for attempt in 1..=self.num_retries {
            match self
                .connector
                .connect(self.session_timeout, self.events_tx.clone())
            {
                Ok(handle) => {
                    for auth in &cell.auths {
                        handle.add_auth(&auth.scheme, &auth.auth);
                    }
                    info!(
                        "opened coordination session {} to {}",
                        handle.session_id(),
                        self.address
                    );
                    cell.candidate = Some(handle);
                    return Ok(());
                }
                Err(code) => {
                    info!(
                        "failed to connect to {} on attempt {attempt}: {code}",
                        self.address
                    );
                }
            }
        }
        error!("unable to connect to the coordination service");
        Err(StoreError::Connection {
            address: self.address.clone(),
        })
    }

    /// Reconnect after session loss, then sync so the new session reads its
    /// own writes.
    fn reestablish_locked(&self, cell: &mut SessionCell, sync_path: &str) -> Result<(), StoreError> {
        self.create_connection_locked(cell)?;
        if let Some(handle) = &cell.candidate {
            if let Err(code) = handle.sync(sync_path) {
                error!("sync of {sync_path} after reconnect failed: {code}");
            }
        }
        Ok(())
    }

    fn wait_for_active(
        &self,
        cell: &mut MutexGuard<'_, SessionCell>,
    ) -> Result<Arc<dyn ZkHandle>, StoreError> {
        let deadline = Instant::now() + self.session_timeout;
        loop {
            if let Some(handle) = &cell.active {
                return Ok(handle.clone());
            }
            if self.connected.wait_until(cell, deadline).timed_out() {
                return match &cell.active {
                    Some(handle) => Ok(handle.clone()),
                    None => Err(StoreError::ConnectionWaitTimeout(self.session_timeout)),
                };
            }
        }
    }

    fn process_event(&self, event: WatchedEvent) {
        let mut cell = self.cell.lock();
        let tracked = cell.candidate.as_ref().map(|handle| handle.session_id());
        if tracked != Some(event.session_id) {
            info!(
                "ignoring watch event {:?} ({:?}) for {:?} from old session {}",
                event.event_type, event.keeper_state, event.path, event.session_id
            );
            return;
        }
        if event.event_type != EventType::None {
            debug!(
                "watch event {:?} for {:?}",
                event.event_type, event.path
            );
            return;
        }
        if cell.state == SessionState::Fenced {
            debug!("dropping connection event in fenced state");
            return;
        }
        match event.keeper_state {
            KeeperState::SyncConnected => {
                info!("coordination session connected");
                if cell.active.is_none() {
                    cell.active = cell.candidate.clone();
                    cell.state = SessionState::Connected;
                    self.connected.notify_all();
                    info!("coordination session usable again");
                }
            }
            KeeperState::Disconnected => {
                info!("coordination session disconnected");
                cell.active = None;
                cell.state = SessionState::Disconnected;
            }
            KeeperState::Expired => {
                info!("coordination session expired, reconnecting");
                cell.state = SessionState::Expired;
                let path = event
                    .path
                    .clone()
                    .unwrap_or_else(|| self.default_sync_path.clone());
                if let Err(err) = self.reestablish_locked(&mut cell, &path) {
                    warn!("session re-establishment failed: {err}");
                }
            }
        }
    }
}

/// Owns the tracked session and the dispatcher thread.
pub struct SessionManager {
    core: Arc<SessionCore>,
    dispatcher: Mutex<Option<thread::JoinHandle<()>>>,
}

impl SessionManager {
    pub fn new(
        connector: Arc<dyn ZkConnector>,
        address: impl Into<String>,
        session_timeout: Duration,
        num_retries: usize,
        default_sync_path: impl Into<String>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        let core = Arc::new(SessionCore {
            connector,
            address: address.into(),
            session_timeout,
            num_retries: num_retries.max(1),
            default_sync_path: default_sync_path.into(),
            cell: Mutex::new(SessionCell {
                candidate: None,
                active: None,
                state: SessionState::Disconnected,
                auths: Vec::new(),
                shutdown: false,
            }),
            connected: Condvar::new(),
            events_tx,
        });
        let weak = Arc::downgrade(&core);
        let dispatcher = thread::spawn(move || dispatch_loop(weak, events_rx));
        Self {
            core,
            dispatcher: Mutex::new(Some(dispatcher)),
        }
    }

    /// Opens a fresh session; the first operation afterwards blocks until
    /// its `SyncConnected` event promotes the handle.
    pub fn connect(&self) -> Result<(), StoreError> {
        let mut cell = self.core.cell.lock();
        self.core.create_connection_locked(&mut cell)
    }

    /// Runs one operation against the active handle under the serialization
    /// lock, waiting up to one session timeout for the handle to appear.
    pub fn with_active<T>(
        &self,
        op: impl FnOnce(&dyn ZkHandle) -> ZkResult<T>,
    ) -> Result<ZkResult<T>, StoreError> {
        let mut cell = self.core.cell.lock();
        let handle = self.core.wait_for_active(&mut cell)?;
        Ok(op(handle.as_ref()))
    }

    pub fn reconnect_and_sync(&self, path: &str) -> Result<(), StoreError> {
        let mut cell = self.core.cell.lock();
        self.core.reestablish_locked(&mut cell, path)
    }

    /// Registers a credential for the current and all future sessions.
    pub fn add_auth(&self, auth: AuthInfo) {
        let mut cell = self.core.cell.lock();
        if let Some(handle) = &cell.candidate {
            handle.add_auth(&auth.scheme, &auth.auth);
        }
        cell.auths.push(auth);
    }

    pub fn state(&self) -> SessionState {
        self.core.cell.lock().state
    }

    pub fn session_id(&self) -> Option<u64> {
        self.core
            .cell
            .lock()
            .candidate
            .as_ref()
            .map(|handle| handle.session_id())
    }

    /// Drives the state machine to its terminal state.
    pub fn mark_fenced(&self) {
        self.core.cell.lock().state = SessionState::Fenced;
    }

    pub fn close(&self) {
        {
            let mut cell = self.core.cell.lock();
            if cell.shutdown {
                return;
            }
            cell.shutdown = true;
            if let Some(handle) = cell.candidate.take() {
                handle.close();
            }
            cell.active = None;
            if cell.state != SessionState::Fenced {
                cell.state = SessionState::Disconnected;
            }
        }
        if let Some(join) = self.dispatcher.lock().take() {
            let _ = join.join();
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.close();
    }
}

fn dispatch_loop(core: Weak<SessionCore>, events: mpsc::Receiver<WatchedEvent>) {
    loop {
        match events.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => match core.upgrade() {
                Some(core) => core.process_event(event),
                None => break,
            },
            Err(RecvTimeoutError::Timeout) => match core.upgrade() {
                Some(core) => {
                    if core.cell.lock().shutdown {
                        break;
                    }
                }
                None => break,
            },
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}
