//! In-process coordination service with the full contract the store relies
//! on: hierarchical namespace, per-node ACL enforcement, digest auth, atomic
//! multi-operations, one-shot watches, and session lifecycle.
//!
//! Integration tests run the store against this backend; it is also usable
//! as an embedded namespace for single-process deployments.

use super::{
    digest_identity, Acl, CreateMode, ErrorCode, EventSink, EventType, KeeperState, Op, Stat,
    WatchedEvent, ZkConnector, ZkHandle, ZkResult, ANYONE_ID, DIGEST_SCHEME, PERM_ADMIN,
    PERM_CREATE, PERM_DELETE, PERM_READ, PERM_WRITE, WORLD_SCHEME,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
struct Znode {
    data: Vec<u8>,
    acl: Vec<Acl>,
    version: i32,
    cversion: i32,
    aversion: i32,
    ephemeral_owner: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Liveness {
    Open,
    Expired,
    Closed,
}

struct SessionRec {
    auth_ids: Vec<String>,
    events: EventSink,
    liveness: Liveness,
    injected_failures: VecDeque<ErrorCode>,
}

#[derive(Debug, Clone, Copy)]
enum NodeEvent {
    Created,
    Deleted,
    DataChanged,
}

struct EnsembleState {
    nodes: BTreeMap<String, Znode>,
    sessions: HashMap<u64, SessionRec>,
    data_watches: HashMap<String, Vec<u64>>,
    child_watches: HashMap<String, Vec<u64>>,
    next_session_id: u64,
}

/// A shared in-process namespace; every [`connect`](ZkConnector::connect)
/// opens a new session against the same tree.
#[derive(Clone)]
pub struct MemoryEnsemble {
    state: Arc<Mutex<EnsembleState>>,
}

impl Default for MemoryEnsemble {
    fn default() -> Self {
        Self::new()
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => "/",
    }
}

fn check_path(path: &str) -> ZkResult<()> {
    if !path.starts_with('/') || (path.len() > 1 && path.ends_with('/')) || path.contains("//") {
        return Err(ErrorCode::NoNode);
    }
    Ok(())
}

fn has_perm(auth_ids: &[String], acl: &[Acl], perm: u32) -> bool {
    acl.iter().any(|entry| {
        entry.perms & perm == perm
            && ((entry.scheme == WORLD_SCHEME && entry.id == ANYONE_ID)
                || (entry.scheme == DIGEST_SCHEME && auth_ids.iter().any(|id| *id == entry.id)))
    })
}

fn child_names(nodes: &BTreeMap<String, Znode>, path: &str) -> Vec<String> {
    let prefix = if path == "/" {
        "/".to_string()
    } else {
        format!("{path}/")
    };
    nodes
        .range(prefix.clone()..)
        .take_while(|(key, _)| key.starts_with(&prefix))
        .filter(|(key, _)| !key[prefix.len()..].contains('/'))
        .map(|(key, _)| key[prefix.len()..].to_string())
        .collect()
}

fn stat_of(node: &Znode, num_children: i32) -> Stat {
    Stat {
        version: node.version,
        cversion: node.cversion,
        aversion: node.aversion,
        data_length: node.data.len() as i32,
        num_children,
        ephemeral_owner: node.ephemeral_owner,
    }
}

fn apply_op(
    nodes: &mut BTreeMap<String, Znode>,
    auth_ids: &[String],
    session_id: u64,
    op: &Op,
    pending: &mut Vec<(NodeEvent, String)>,
) -> ZkResult<()> {
    match op {
        Op::Create {
            path,
            data,
            acl,
            mode,
        } => {
            check_path(path)?;
            if acl.is_empty() {
                return Err(ErrorCode::InvalidAcl);
            }
            if nodes.contains_key(path) {
                return Err(ErrorCode::NodeExists);
            }
            let parent_path = parent_of(path).to_string();
            let parent = nodes.get(&parent_path).ok_or(ErrorCode::NoNode)?;
            if !has_perm(auth_ids, &parent.acl, PERM_CREATE) {
                return Err(ErrorCode::NoAuth);
            }
            if parent.ephemeral_owner != 0 {
                // Ephemerals cannot have children.
                return Err(ErrorCode::NoNode);
            }
            nodes.insert(
                path.clone(),
                Znode {
                    data: data.clone(),
                    acl: acl.clone(),
                    version: 0,
                    cversion: 0,
                    aversion: 0,
                    ephemeral_owner: if mode.is_ephemeral() { session_id } else { 0 },
                },
            );
            if let Some(parent) = nodes.get_mut(&parent_path) {
                parent.cversion += 1;
            }
            pending.push((NodeEvent::Created, path.clone()));
            Ok(())
        }
        Op::SetData {
            path,
            data,
            version,
        } => {
            let node = nodes.get_mut(path).ok_or(ErrorCode::NoNode)?;
            if !has_perm(auth_ids, &node.acl, PERM_WRITE) {
                return Err(ErrorCode::NoAuth);
            }
            if *version >= 0 && *version != node.version {
                return Err(ErrorCode::BadVersion);
            }
            node.data = data.clone();
            node.version += 1;
            pending.push((NodeEvent::DataChanged, path.clone()));
            Ok(())
        }
        Op::Delete { path, version } => {
            let node = nodes.get(path).ok_or(ErrorCode::NoNode)?;
            if *version >= 0 && *version != node.version {
                return Err(ErrorCode::BadVersion);
            }
            if !child_names(nodes, path).is_empty() {
                return Err(ErrorCode::NotEmpty);
            }
            let parent_path = parent_of(path).to_string();
            let parent = nodes.get(&parent_path).ok_or(ErrorCode::NoNode)?;
            if !has_perm(auth_ids, &parent.acl, PERM_DELETE) {
                return Err(ErrorCode::NoAuth);
            }
            nodes.remove(path);
            if let Some(parent) = nodes.get_mut(&parent_path) {
                parent.cversion += 1;
            }
            pending.push((NodeEvent::Deleted, path.clone()));
            Ok(())
        }
    }
}

impl EnsembleState {
    fn begin_op(&mut self, session_id: u64) -> ZkResult<Vec<String>> {
        let session = self
            .sessions
            .get_mut(&session_id)
            .ok_or(ErrorCode::SessionClosed)?;
        match session.liveness {
            Liveness::Open => {}
            Liveness::Expired => return Err(ErrorCode::SessionExpired),
            Liveness::Closed => return Err(ErrorCode::SessionClosed),
        }
        if let Some(code) = session.injected_failures.pop_front() {
            return Err(code);
        }
        Ok(session.auth_ids.clone())
    }

    fn commit(&mut self, session_id: u64, ops: &[Op]) -> ZkResult<()> {
        let auth_ids = self.begin_op(session_id)?;
        let mut scratch = self.nodes.clone();
        let mut pending = Vec::new();
        for op in ops {
            apply_op(&mut scratch, &auth_ids, session_id, op, &mut pending)?;
        }
        self.nodes = scratch;
        for (event, path) in pending {
            self.fire(event, &path);
        }
        Ok(())
    }

    fn fire(&mut self, event: NodeEvent, path: &str) {
        let event_type = match event {
            NodeEvent::Created => EventType::NodeCreated,
            NodeEvent::Deleted => EventType::NodeDeleted,
            NodeEvent::DataChanged => EventType::NodeDataChanged,
        };
        for watcher in self.data_watches.remove(path).unwrap_or_default() {
            self.deliver(watcher, event_type, Some(path.to_string()));
        }
        if matches!(event, NodeEvent::Created | NodeEvent::Deleted) {
            let parent = parent_of(path).to_string();
            for watcher in self.child_watches.remove(&parent).unwrap_or_default() {
                self.deliver(watcher, EventType::NodeChildrenChanged, Some(parent.clone()));
            }
        }
    }

    fn deliver(&self, session_id: u64, event_type: EventType, path: Option<String>) {
        if let Some(session) = self.sessions.get(&session_id) {
            if session.liveness == Liveness::Open {
                let _ = session.events.send(WatchedEvent {
                    event_type,
                    keeper_state: KeeperState::SyncConnected,
                    path,
                    session_id,
                });
            }
        }
    }

    fn deliver_connection_state(&self, session_id: u64, state: KeeperState) {
        if let Some(session) = self.sessions.get(&session_id) {
            let _ = session.events.send(WatchedEvent {
                event_type: EventType::None,
                keeper_state: state,
                path: None,
                session_id,
            });
        }
    }

    fn remove_ephemerals_of(&mut self, session_id: u64) {
        let owned: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.ephemeral_owner == session_id)
            .map(|(path, _)| path.clone())
            .collect();
        for path in owned {
            self.nodes.remove(&path);
            let parent = parent_of(&path).to_string();
            if let Some(node) = self.nodes.get_mut(&parent) {
                node.cversion += 1;
            }
            self.fire(NodeEvent::Deleted, &path);
        }
    }
}

impl MemoryEnsemble {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            "/".to_string(),
            Znode {
                data: Vec::new(),
                acl: vec![Acl::open_unsafe()],
                version: 0,
                cversion: 0,
                aversion: 0,
                ephemeral_owner: 0,
            },
        );
        Self {
            state: Arc::new(Mutex::new(EnsembleState {
                nodes,
                sessions: HashMap::new(),
                data_watches: HashMap::new(),
                child_watches: HashMap::new(),
                next_session_id: 1,
            })),
        }
    }

    pub fn node_exists(&self, path: &str) -> bool {
        self.state.lock().nodes.contains_key(path)
    }

    pub fn node_data(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().nodes.get(path).map(|node| node.data.clone())
    }

    pub fn node_acl(&self, path: &str) -> Option<Vec<Acl>> {
        self.state.lock().nodes.get(path).map(|node| node.acl.clone())
    }

    pub fn live_session_ids(&self) -> Vec<u64> {
        let state = self.state.lock();
        let mut ids: Vec<u64> = state
            .sessions
            .iter()
            .filter(|(_, session)| session.liveness == Liveness::Open)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Declares the session permanently gone: its ephemerals are destroyed
    /// and the owner is notified with an `Expired` connection event.
    pub fn expire_session(&self, session_id: u64) {
        let mut state = self.state.lock();
        if let Some(session) = state.sessions.get_mut(&session_id) {
            if session.liveness != Liveness::Open {
                return;
            }
            session.liveness = Liveness::Expired;
        } else {
            return;
        }
        state.remove_ephemerals_of(session_id);
        state.deliver_connection_state(session_id, KeeperState::Expired);
    }

    /// Delivers a `Disconnected` transition; the session itself survives.
    pub fn disconnect_session(&self, session_id: u64) {
        self.state
            .lock()
            .deliver_connection_state(session_id, KeeperState::Disconnected);
    }

    /// Re-delivers `SyncConnected` for a session that was only disconnected.
    pub fn restore_session(&self, session_id: u64) {
        self.state
            .lock()
            .deliver_connection_state(session_id, KeeperState::SyncConnected);
    }

    /// Queues a failure code returned by the session's next operation.
    pub fn inject_failure(&self, session_id: u64, code: ErrorCode) {
        if let Some(session) = self.state.lock().sessions.get_mut(&session_id) {
            session.injected_failures.push_back(code);
        }
    }
}

impl ZkConnector for MemoryEnsemble {
    fn connect(&self, _session_timeout: Duration, events: EventSink) -> ZkResult<Arc<dyn ZkHandle>> {
        let mut state = self.state.lock();
        let session_id = state.next_session_id;
        state.next_session_id += 1;
        state.sessions.insert(
            session_id,
            SessionRec {
                auth_ids: Vec::new(),
                events,
                liveness: Liveness::Open,
                injected_failures: VecDeque::new(),
            },
        );
        state.deliver_connection_state(session_id, KeeperState::SyncConnected);
        Ok(Arc::new(MemorySession {
            session_id,
            state: self.state.clone(),
        }))
    }
}

struct MemorySession {
    session_id: u64,
    state: Arc<Mutex<EnsembleState>>,
}

impl ZkHandle for MemorySession {
    fn session_id(&self) -> u64 {
        self.session_id
    }

    fn add_auth(&self, scheme: &str, auth: &[u8]) {
        if scheme != DIGEST_SCHEME {
            return;
        }
        let credential = String::from_utf8_lossy(auth);
        let mut state = self.state.lock();
        if let Some(session) = state.sessions.get_mut(&self.session_id) {
            session.auth_ids.push(digest_identity(&credential));
        }
    }

    fn create(&self, path: &str, data: &[u8], acl: &[Acl], mode: CreateMode) -> ZkResult<String> {
        self.state.lock().commit(
            self.session_id,
            &[Op::create(path, data.to_vec(), acl.to_vec(), mode)],
        )?;
        Ok(path.to_string())
    }

    fn set_data(&self, path: &str, data: &[u8], version: i32) -> ZkResult<Stat> {
        let mut state = self.state.lock();
        state.commit(self.session_id, &[Op::set_data(path, data.to_vec(), version)])?;
        let num_children = child_names(&state.nodes, path).len() as i32;
        let node = state.nodes.get(path).ok_or(ErrorCode::NoNode)?;
        Ok(stat_of(node, num_children))
    }

    fn delete(&self, path: &str, version: i32) -> ZkResult<()> {
        self.state
            .lock()
            .commit(self.session_id, &[Op::delete(path, version)])
    }

    fn exists(&self, path: &str, watch: bool) -> ZkResult<Option<Stat>> {
        let mut state = self.state.lock();
        state.begin_op(self.session_id)?;
        if watch {
            state
                .data_watches
                .entry(path.to_string())
                .or_default()
                .push(self.session_id);
        }
        let num_children = child_names(&state.nodes, path).len() as i32;
        Ok(state.nodes.get(path).map(|node| stat_of(node, num_children)))
    }

    fn get_data(&self, path: &str, watch: bool) -> ZkResult<Vec<u8>> {
        let mut state = self.state.lock();
        let auth_ids = state.begin_op(self.session_id)?;
        let node = state.nodes.get(path).ok_or(ErrorCode::NoNode)?;
        if !has_perm(&auth_ids, &node.acl, PERM_READ) {
            return Err(ErrorCode::NoAuth);
        }
        let data = node.data.clone();
        if watch {
            state
                .data_watches
                .entry(path.to_string())
                .or_default()
                .push(self.session_id);
        }
        Ok(data)
    }

    fn get_children(&self, path: &str, watch: bool) -> ZkResult<Vec<String>> {
        let mut state = self.state.lock();
        let auth_ids = state.begin_op(self.session_id)?;
        let node = state.nodes.get(path).ok_or(ErrorCode::NoNode)?;
        if !has_perm(&auth_ids, &node.acl, PERM_READ) {
            return Err(ErrorCode::NoAuth);
        }
        if watch {
            state
                .child_watches
                .entry(path.to_string())
                .or_default()
                .push(self.session_id);
        }
        Ok(child_names(&state.nodes, path))
    }

    fn set_acl(&self, path: &str, acl: &[Acl], version: i32) -> ZkResult<Stat> {
        let mut state = self.state.lock();
        let auth_ids = state.begin_op(self.session_id)?;
        let num_children = child_names(&state.nodes, path).len() as i32;
        let node = state.nodes.get_mut(path).ok_or(ErrorCode::NoNode)?;
        if !has_perm(&auth_ids, &node.acl, PERM_ADMIN) {
            return Err(ErrorCode::NoAuth);
        }
        if acl.is_empty() {
            return Err(ErrorCode::InvalidAcl);
        }
        if version >= 0 && version != node.aversion {
            return Err(ErrorCode::BadVersion);
        }
        node.acl = acl.to_vec();
        node.aversion += 1;
        Ok(stat_of(node, num_children))
    }

    fn get_acl(&self, path: &str) -> ZkResult<(Vec<Acl>, Stat)> {
        let mut state = self.state.lock();
        state.begin_op(self.session_id)?;
        let num_children = child_names(&state.nodes, path).len() as i32;
        let node = state.nodes.get(path).ok_or(ErrorCode::NoNode)?;
        Ok((node.acl.clone(), stat_of(node, num_children)))
    }

    fn multi(&self, ops: &[Op]) -> ZkResult<()> {
        self.state.lock().commit(self.session_id, ops)
    }

    fn sync(&self, _path: &str) -> ZkResult<()> {
        // Single-copy namespace: a live session is always up to date.
        self.state.lock().begin_op(self.session_id).map(|_| ())
    }

    fn close(&self) {
        let mut state = self.state.lock();
        if let Some(session) = state.sessions.get_mut(&self.session_id) {
            if session.liveness == Liveness::Open {
                session.liveness = Liveness::Closed;
            } else {
                return;
            }
        } else {
            return;
        }
        state.remove_ephemerals_of(self.session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::PERM_ALL;
    use std::sync::mpsc;

    fn open_session(ensemble: &MemoryEnsemble) -> (Arc<dyn ZkHandle>, mpsc::Receiver<WatchedEvent>) {
        let (tx, rx) = mpsc::channel();
        let handle = ensemble
            .connect(Duration::from_secs(10), tx)
            .expect("connect");
        (handle, rx)
    }

    fn open_acl() -> Vec<Acl> {
        vec![Acl::open_unsafe()]
    }

    #[test]
    fn create_read_and_list() {
        let ensemble = MemoryEnsemble::new();
        let (zk, _rx) = open_session(&ensemble);
        zk.create("/a", b"1", &open_acl(), CreateMode::Persistent)
            .unwrap();
        zk.create("/a/x", b"2", &open_acl(), CreateMode::Persistent)
            .unwrap();
        zk.create("/a/y", b"3", &open_acl(), CreateMode::Persistent)
            .unwrap();
        assert_eq!(zk.get_data("/a/x", false).unwrap(), b"2");
        assert_eq!(zk.get_children("/a", false).unwrap(), vec!["x", "y"]);
        assert_eq!(
            zk.create("/a", b"", &open_acl(), CreateMode::Persistent),
            Err(ErrorCode::NodeExists)
        );
        assert_eq!(zk.get_data("/missing", false), Err(ErrorCode::NoNode));
    }

    #[test]
    fn multi_is_atomic() {
        let ensemble = MemoryEnsemble::new();
        let (zk, _rx) = open_session(&ensemble);
        zk.create("/a", b"", &open_acl(), CreateMode::Persistent)
            .unwrap();
        let err = zk
            .multi(&[
                Op::create("/a/one", Vec::new(), open_acl(), CreateMode::Persistent),
                Op::delete("/nope", -1),
            ])
            .unwrap_err();
        assert_eq!(err, ErrorCode::NoNode);
        // First op must have been rolled back.
        assert!(!ensemble.node_exists("/a/one"));
    }

    #[test]
    fn create_requires_create_on_parent() {
        let ensemble = MemoryEnsemble::new();
        let (owner, _rx1) = open_session(&ensemble);
        owner.add_auth(DIGEST_SCHEME, b"alice:pw");
        let locked = vec![
            Acl::world(PERM_READ | PERM_WRITE | PERM_ADMIN),
            Acl::digest(digest_identity("alice:pw"), PERM_ALL),
        ];
        owner
            .create("/locked", b"", &locked, CreateMode::Persistent)
            .unwrap();

        let (other, _rx2) = open_session(&ensemble);
        assert_eq!(
            other.create("/locked/child", b"", &open_acl(), CreateMode::Persistent),
            Err(ErrorCode::NoAuth)
        );
        assert!(owner
            .create("/locked/child", b"", &open_acl(), CreateMode::Persistent)
            .is_ok());
        // Delete is checked against the parent too.
        assert_eq!(other.delete("/locked/child", -1), Err(ErrorCode::NoAuth));
    }

    #[test]
    fn set_acl_requires_admin() {
        let ensemble = MemoryEnsemble::new();
        let (owner, _rx1) = open_session(&ensemble);
        owner.add_auth(DIGEST_SCHEME, b"alice:pw");
        let exclusive = vec![Acl::digest(digest_identity("alice:pw"), PERM_ALL)];
        owner
            .create("/guarded", b"", &exclusive, CreateMode::Persistent)
            .unwrap();
        let (other, _rx2) = open_session(&ensemble);
        assert_eq!(
            other.set_acl("/guarded", &open_acl(), -1),
            Err(ErrorCode::NoAuth)
        );
        assert!(owner.set_acl("/guarded", &open_acl(), -1).is_ok());
    }

    #[test]
    fn data_watch_fires_once() {
        let ensemble = MemoryEnsemble::new();
        let (zk, rx) = open_session(&ensemble);
        // Drain the connection event.
        assert_eq!(rx.recv().unwrap().keeper_state, KeeperState::SyncConnected);
        zk.create("/w", b"", &open_acl(), CreateMode::Persistent)
            .unwrap();
        zk.get_data("/w", true).unwrap();
        zk.set_data("/w", b"x", -1).unwrap();
        zk.set_data("/w", b"y", -1).unwrap();
        let event = rx.recv().unwrap();
        assert_eq!(event.event_type, EventType::NodeDataChanged);
        assert_eq!(event.path.as_deref(), Some("/w"));
        // One-shot: the second set_data produced no further event.
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn expired_session_rejects_operations_and_drops_ephemerals() {
        let ensemble = MemoryEnsemble::new();
        let (zk, rx) = open_session(&ensemble);
        zk.create("/e", b"", &open_acl(), CreateMode::Ephemeral)
            .unwrap();
        ensemble.expire_session(zk.session_id());
        assert!(!ensemble.node_exists("/e"));
        assert_eq!(zk.get_data("/", false), Err(ErrorCode::SessionExpired));
        let expired = std::iter::from_fn(|| rx.try_recv().ok())
            .find(|event| event.keeper_state == KeeperState::Expired);
        assert!(expired.is_some());
    }

    #[test]
    fn injected_failure_surfaces_once() {
        let ensemble = MemoryEnsemble::new();
        let (zk, _rx) = open_session(&ensemble);
        ensemble.inject_failure(zk.session_id(), ErrorCode::ConnectionLoss);
        assert_eq!(zk.get_data("/", false), Err(ErrorCode::ConnectionLoss));
        assert!(zk.get_data("/", false).is_ok());
    }
}
