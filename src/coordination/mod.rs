//! Data model and session traits for the ZooKeeper-compatible coordination
//! service backing the state store.
//!
//! The store never talks to a transport directly: it goes through
//! [`ZkHandle`] (one live session) obtained from a [`ZkConnector`]. The
//! in-process backend in [`memory`] implements both and is what the
//! integration tests run against.

pub mod memory;
pub mod session;

use sha2::{Digest, Sha256};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const PERM_READ: u32 = 1 << 0;
pub const PERM_WRITE: u32 = 1 << 1;
pub const PERM_CREATE: u32 = 1 << 2;
pub const PERM_DELETE: u32 = 1 << 3;
pub const PERM_ADMIN: u32 = 1 << 4;
pub const PERM_ALL: u32 = PERM_READ | PERM_WRITE | PERM_CREATE | PERM_DELETE | PERM_ADMIN;

/// The permission pair an active controller holds exclusively on the root.
pub const CREATE_DELETE_PERMS: u32 = PERM_CREATE | PERM_DELETE;

pub const WORLD_SCHEME: &str = "world";
pub const DIGEST_SCHEME: &str = "digest";
pub const ANYONE_ID: &str = "anyone";

/// One access-control entry: a permission bitmask plus a principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acl {
    pub perms: u32,
    pub scheme: String,
    pub id: String,
}

impl Acl {
    pub fn world(perms: u32) -> Self {
        Self {
            perms,
            scheme: WORLD_SCHEME.to_string(),
            id: ANYONE_ID.to_string(),
        }
    }

    /// The wide-open `world:anyone` entry granting every permission.
    pub fn open_unsafe() -> Self {
        Self::world(PERM_ALL)
    }

    pub fn digest(id: impl Into<String>, perms: u32) -> Self {
        Self {
            perms,
            scheme: DIGEST_SCHEME.to_string(),
            id: id.into(),
        }
    }

    /// The same entry with the given permission bits cleared.
    pub fn without_perms(&self, perms: u32) -> Self {
        Self {
            perms: self.perms & !perms,
            scheme: self.scheme.clone(),
            id: self.id.clone(),
        }
    }
}

/// Computes the digest-scheme identity for a `user:password` credential.
///
/// The identity stored in an ACL entry is `user:<hex(sha256(user:password))>`;
/// the raw credential never appears in the namespace.
pub fn digest_identity(credential: &str) -> String {
    let user = credential.split(':').next().unwrap_or_default();
    format!("{user}:{}", hex::encode(Sha256::digest(credential.as_bytes())))
}

/// How a znode is bound to its creating session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    /// Survives the creating session.
    Persistent,
    /// Deleted when the creating session ends.
    Ephemeral,
}

impl CreateMode {
    pub fn is_ephemeral(self) -> bool {
        matches!(self, CreateMode::Ephemeral)
    }
}

/// Znode metadata, the subset of the service's stat structure the store
/// consumes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stat {
    /// Number of changes to the data of the znode.
    pub version: i32,
    /// Number of changes to the children of the znode.
    pub cversion: i32,
    /// Number of changes to the ACL of the znode.
    pub aversion: i32,
    pub data_length: i32,
    pub num_children: i32,
    /// Session id of the owner if the znode is ephemeral, zero otherwise.
    pub ephemeral_owner: u64,
}

/// Failure codes surfaced by the coordination service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ErrorCode {
    #[error("connection loss")]
    ConnectionLoss,
    #[error("operation timeout")]
    OperationTimeout,
    #[error("session expired")]
    SessionExpired,
    #[error("session moved")]
    SessionMoved,
    #[error("no authorization")]
    NoAuth,
    #[error("node already exists")]
    NodeExists,
    #[error("no such node")]
    NoNode,
    #[error("node has children")]
    NotEmpty,
    #[error("version conflict")]
    BadVersion,
    #[error("invalid acl")]
    InvalidAcl,
    #[error("session closed")]
    SessionClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Connection-state change rather than a znode event.
    None,
    NodeCreated,
    NodeDeleted,
    NodeDataChanged,
    NodeChildrenChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeeperState {
    SyncConnected,
    Disconnected,
    Expired,
}

/// A one-shot notification delivered to the session that registered the
/// watch (or a connection-state transition for that session).
#[derive(Debug, Clone)]
pub struct WatchedEvent {
    pub event_type: EventType,
    pub keeper_state: KeeperState,
    pub path: Option<String>,
    /// Session the event belongs to; events from stale sessions are dropped
    /// by the dispatcher.
    pub session_id: u64,
}

/// One member of an atomic multi-operation.
#[derive(Debug, Clone)]
pub enum Op {
    Create {
        path: String,
        data: Vec<u8>,
        acl: Vec<Acl>,
        mode: CreateMode,
    },
    SetData {
        path: String,
        data: Vec<u8>,
        version: i32,
    },
    Delete {
        path: String,
        version: i32,
    },
}

impl Op {
    pub fn create(path: impl Into<String>, data: Vec<u8>, acl: Vec<Acl>, mode: CreateMode) -> Self {
        Op::Create {
            path: path.into(),
            data,
            acl,
            mode,
        }
    }

    pub fn set_data(path: impl Into<String>, data: Vec<u8>, version: i32) -> Self {
        Op::SetData {
            path: path.into(),
            data,
            version,
        }
    }

    pub fn delete(path: impl Into<String>, version: i32) -> Self {
        Op::Delete {
            path: path.into(),
            version,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Op::Create { path, .. } | Op::SetData { path, .. } | Op::Delete { path, .. } => path,
        }
    }
}

/// An auth credential registered on a session (`add_auth`).
#[derive(Debug, Clone)]
pub struct AuthInfo {
    pub scheme: String,
    pub auth: Vec<u8>,
}

impl AuthInfo {
    pub fn digest(credential: &str) -> Self {
        Self {
            scheme: DIGEST_SCHEME.to_string(),
            auth: credential.as_bytes().to_vec(),
        }
    }
}

pub type ZkResult<T> = Result<T, ErrorCode>;

/// Channel on which a session delivers its watch and connection events.
pub type EventSink = mpsc::Sender<WatchedEvent>;

/// One live session with the coordination service.
///
/// Every operation is synchronous and returns the service's failure code on
/// error; classification and retries happen a layer up.
pub trait ZkHandle: Send + Sync {
    fn session_id(&self) -> u64;
    /// Registers an auth credential for the remainder of the session.
    fn add_auth(&self, scheme: &str, auth: &[u8]);
    fn create(&self, path: &str, data: &[u8], acl: &[Acl], mode: CreateMode) -> ZkResult<String>;
    fn set_data(&self, path: &str, data: &[u8], version: i32) -> ZkResult<Stat>;
    fn delete(&self, path: &str, version: i32) -> ZkResult<()>;
    /// `watch` also arms a creation watch when the node is absent.
    fn exists(&self, path: &str, watch: bool) -> ZkResult<Option<Stat>>;
    fn get_data(&self, path: &str, watch: bool) -> ZkResult<Vec<u8>>;
    fn get_children(&self, path: &str, watch: bool) -> ZkResult<Vec<String>>;
    fn set_acl(&self, path: &str, acl: &[Acl], version: i32) -> ZkResult<Stat>;
    fn get_acl(&self, path: &str) -> ZkResult<(Vec<Acl>, Stat)>;
    /// Atomic batch: either every op applies or none does.
    fn multi(&self, ops: &[Op]) -> ZkResult<()>;
    /// Forces the session's view of `path` up to date with the quorum.
    fn sync(&self, path: &str) -> ZkResult<()>;
    fn close(&self);
}

/// Opens sessions against a concrete coordination backend.
pub trait ZkConnector: Send + Sync {
    /// Returns immediately with a fresh handle; the session is usable once
    /// its `SyncConnected` event arrives on `events`.
    fn connect(&self, session_timeout: Duration, events: EventSink) -> ZkResult<Arc<dyn ZkHandle>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn without_perms_clears_only_requested_bits() {
        let acl = Acl::open_unsafe().without_perms(CREATE_DELETE_PERMS);
        assert_eq!(acl.perms, PERM_READ | PERM_WRITE | PERM_ADMIN);
        assert_eq!(acl.scheme, WORLD_SCHEME);
        assert_eq!(acl.id, ANYONE_ID);
    }

    #[test]
    fn digest_identity_keeps_user_and_hashes_credential() {
        let id = digest_identity("rm:s3cret");
        assert!(id.starts_with("rm:"));
        assert_ne!(id, "rm:s3cret");
        assert_eq!(id, digest_identity("rm:s3cret"));
        assert_ne!(id, digest_identity("rm:other"));
    }

    #[test]
    fn op_reports_its_target_path() {
        let op = Op::set_data("/a/b", vec![1], -1);
        assert_eq!(op.path(), "/a/b");
    }
}
