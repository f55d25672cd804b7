//! Fenced, highly-available state store for a cluster resource manager.
//!
//! Persists the durable state a controller needs after failover —
//! applications and their attempts, delegation tokens and master keys, the
//! AM-RM secret-manager state, a layout version, and a monotonic activation
//! epoch — in a ZooKeeper-compatible coordination service.
//!
//! The hard part is the fencing and recovery protocol: two peer controllers
//! may race for authority over the same tree, and the store guarantees that
//! at most one of them can mutate it. Acquiring the root znode's
//! create-delete ACL is the fencing act; every mutation is wrapped in an
//! atomic create-lock / ops / delete-lock multi; a background prober keeps
//! re-asserting authority and reports `StoreError::Fenced` the moment it is
//! lost.
#![deny(unreachable_pub)]
#![deny(unused_must_use)]

pub mod config;
pub mod coordination;
pub mod error;
pub mod fencing;
pub mod layout;
pub mod records;
pub mod retry;
pub mod store;

pub use config::{OversizePolicy, ZkStoreConfig};
pub use coordination::memory::MemoryEnsemble;
pub use coordination::session::{SessionManager, SessionState};
pub use coordination::{
    digest_identity, Acl, AuthInfo, CreateMode, ErrorCode, EventType, KeeperState, Op, Stat,
    WatchedEvent, ZkConnector, ZkHandle, ZkResult, CREATE_DELETE_PERMS, PERM_ADMIN, PERM_ALL,
    PERM_CREATE, PERM_DELETE, PERM_READ, PERM_WRITE,
};
pub use error::StoreError;
pub use fencing::{
    construct_root_node_acl, fencing_identity, generate_fencing_password, ActiveStatusProber,
    FencingOps,
};
pub use layout::StoreLayout;
pub use records::{
    AmrmTokenSecretManagerState, ApplicationAttemptId, ApplicationAttemptState, ApplicationId,
    ApplicationState, ApplicationSubmissionContext, CodecError, ContainerId, Credentials,
    DelegationKey, DelegationTokenIdentifier, DelegationTokenRecord, Epoch,
    FinalApplicationStatus, MasterKey, Resource, RmAppAttemptState, RmAppState,
    RmDtSecretManagerState, RmState, Version,
};
pub use retry::{classify, RetryClass, RetryRunner};
pub use store::{
    LoggingEventSink, StateStore, StoreEventSink, ZkStateStore, CURRENT_VERSION_INFO,
};
