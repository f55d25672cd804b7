//! The store surface the resource manager drives: activation, recovery, and
//! the fenced mutation verbs.
//!
//! Control flow: once elected active, the resource manager constructs the
//! store ([`ZkStateStore::new`]) and calls [`StateStore::start`], which
//! connects, builds the root tree, fences the root znode, and launches the
//! liveness prober. Every later mutation goes through the retry engine and
//! is wrapped in a fenced multi-op.

use crate::config::{OversizePolicy, ZkStoreConfig};
use crate::coordination::session::{SessionManager, SessionState};
use crate::coordination::{
    Acl, AuthInfo, CreateMode, ErrorCode, Op, Stat, ZkConnector, ZkHandle, ZkResult,
};
use crate::error::StoreError;
use crate::fencing::{
    construct_root_node_acl, fencing_identity, generate_fencing_password, ActiveStatusProber,
    FencingOps,
};
use crate::layout::{
    node_path, StoreLayout, DELEGATION_KEY_PREFIX, DELEGATION_TOKEN_PREFIX,
};
use crate::records::{
    decode, decode_sequence_number, encode, encode_sequence_number,
    AmrmTokenSecretManagerState, ApplicationAttemptState, ApplicationId, ApplicationState,
    DelegationKey, DelegationTokenRecord, Epoch, RmState, Version, APPLICATION_ATTEMPT_ID_PREFIX,
    APPLICATION_ID_PREFIX,
};
use crate::retry::RetryRunner;
use log::{debug, info, warn};
use std::sync::Arc;

/// Layout version written to `RMVersionNode`.
pub const CURRENT_VERSION_INFO: Version = Version { major: 1, minor: 2 };

/// Side channel for asynchronous loss of authority and other failures the
/// store cannot return from a call frame (the liveness prober above all).
pub trait StoreEventSink: Send + Sync {
    fn store_operation_failed(&self, error: &StoreError);
}

/// Sink for deployments without an event bus wired up.
#[derive(Debug, Default)]
pub struct LoggingEventSink;

impl StoreEventSink for LoggingEventSink {
    fn store_operation_failed(&self, error: &StoreError) {
        warn!("store operation failed: {error}");
    }
}

/// The contract a durable resource-manager state store fulfils.
pub trait StateStore {
    fn start(&mut self) -> Result<(), StoreError>;
    fn close(&mut self) -> Result<(), StoreError>;
    fn load_state(&self) -> Result<RmState, StoreError>;
    fn store_application(&self, state: &ApplicationState) -> Result<(), StoreError>;
    fn update_application(&self, state: &ApplicationState) -> Result<(), StoreError>;
    fn store_attempt(&self, state: &ApplicationAttemptState) -> Result<(), StoreError>;
    fn update_attempt(&self, state: &ApplicationAttemptState) -> Result<(), StoreError>;
    fn remove_application(&self, state: &ApplicationState) -> Result<(), StoreError>;
    fn store_delegation_token(
        &self,
        record: &DelegationTokenRecord,
        latest_sequence_number: i32,
    ) -> Result<(), StoreError>;
    fn update_delegation_token(
        &self,
        record: &DelegationTokenRecord,
        latest_sequence_number: i32,
    ) -> Result<(), StoreError>;
    fn remove_delegation_token(&self, sequence_number: i32) -> Result<(), StoreError>;
    fn store_master_key(&self, key: &DelegationKey) -> Result<(), StoreError>;
    fn remove_master_key(&self, key_id: i32) -> Result<(), StoreError>;
    fn store_or_update_amrm_state(
        &self,
        state: &AmrmTokenSecretManagerState,
    ) -> Result<(), StoreError>;
    /// Returns the previous epoch and persists its successor; the first
    /// activation observes `0`.
    fn get_and_increment_epoch(&self) -> Result<u64, StoreError>;
    fn store_version(&self) -> Result<(), StoreError>;
    fn load_version(&self) -> Result<Option<Version>, StoreError>;
    /// Writes the current version when none is stored or on a same-major
    /// difference; a major mismatch is returned for the caller to decide.
    fn check_version(&self) -> Result<(), StoreError>;
    fn current_version(&self) -> Version;
    /// Removes the whole root subtree.
    fn delete_store(&self) -> Result<(), StoreError>;
}

/// Coordination-service implementation of [`StateStore`].
pub struct ZkStateStore {
    config: ZkStoreConfig,
    layout: StoreLayout,
    session: Arc<SessionManager>,
    runner: RetryRunner,
    fencing: FencingOps,
    root_node_acl: Vec<Acl>,
    event_sink: Arc<dyn StoreEventSink>,
    prober: Option<ActiveStatusProber>,
}

impl std::fmt::Debug for ZkStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZkStateStore")
            .field("config", &self.config)
            .field("layout", &self.layout)
            .field("root_node_acl", &self.root_node_acl)
            .finish_non_exhaustive()
    }
}

fn ancestor_paths(path: &str) -> Vec<String> {
    let mut paths = Vec::new();
    let mut current = String::new();
    for part in path.split('/').filter(|part| !part.is_empty()) {
        current.push('/');
        current.push_str(part);
        paths.push(current.clone());
    }
    paths
}

fn recursive_delete(zk: &dyn ZkHandle, path: &str, watch: bool) -> ZkResult<()> {
    for child in zk.get_children(path, watch)? {
        recursive_delete(zk, &node_path(path, &child), false)?;
    }
    zk.delete(path, -1)
}

impl ZkStateStore {
    pub fn new(
        config: ZkStoreConfig,
        connector: Arc<dyn ZkConnector>,
        event_sink: Arc<dyn StoreEventSink>,
    ) -> Result<Self, StoreError> {
        if config.address.trim().is_empty() {
            return Err(StoreError::MissingAddress);
        }
        let layout = StoreLayout::new(&config.parent_path);
        let session = Arc::new(SessionManager::new(
            connector,
            config.address.clone(),
            config.session_timeout,
            config.num_retries,
            layout.root().to_string(),
        ));
        for auth in &config.auths {
            session.add_auth(auth.clone());
        }
        let root_node_acl = if config.ha_enabled {
            match &config.root_node_acl {
                Some(custom) => {
                    info!("using operator-supplied root node ACL, digest fencing scheme skipped");
                    custom.clone()
                }
                None => {
                    let password = generate_fencing_password();
                    let digest_id = fencing_identity(&config.controller_id, &password);
                    session.add_auth(AuthInfo::digest(&format!(
                        "{}:{password}",
                        config.controller_id
                    )));
                    construct_root_node_acl(&config.acl, &digest_id)
                }
            }
        } else {
            config.acl.clone()
        };
        let runner = RetryRunner::new(
            session.clone(),
            config.num_retries,
            config.effective_retry_interval(),
            config.ha_enabled,
        );
        let fencing = FencingOps::new(layout.fencing_lock(), &config.acl);
        Ok(Self {
            layout,
            session,
            runner,
            fencing,
            root_node_acl,
            event_sink,
            prober: None,
            config,
        })
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn session_id(&self) -> Option<u64> {
        self.session.session_id()
    }

    fn create_root_dir(&self, path: &str) -> Result<(), StoreError> {
        // Root dirs bypass the fenced multi helpers: they exist before the
        // fence and an idempotent NodeExists is the common case.
        self.runner
            .run(path, |zk| {
                zk.create(path, &[], &self.config.acl, CreateMode::Persistent)
            })
            .map(|_| ())
    }

    fn log_root_node_acl(&self, prefix: &str) {
        if !log::log_enabled!(log::Level::Debug) {
            return;
        }
        let root = self.layout.root();
        if let Ok(Some((acl, stat))) = self.runner.run(root, |zk| zk.get_acl(root)) {
            debug!("{prefix} root ACL: {acl:?} ({stat:?})");
        }
    }

    fn fence(&self) -> Result<(), StoreError> {
        self.log_root_node_acl("before fencing,");
        let root = self.layout.root();
        self.runner
            .run(root, |zk| zk.set_acl(root, &self.root_node_acl, -1))?;
        // A previous controller may have died mid-multi and left the lock.
        let delete_stale = [self.fencing.delete_lock_op()];
        let lock_path = self.layout.fencing_lock();
        self.runner.run(lock_path, |zk| match zk.multi(&delete_stale) {
            Err(ErrorCode::NoNode) => {
                info!("fencing lock {lock_path} does not exist to delete");
                Ok(())
            }
            other => other,
        })?;
        self.log_root_node_acl("after fencing,");
        Ok(())
    }

    /// Wraps `ops` in the fencing-lock pair and runs the multi with retries.
    fn do_multi_with_retries(&self, ops: Vec<Op>) -> Result<(), StoreError> {
        let exec = self.fencing.fenced(ops);
        self.runner
            .run(self.layout.root(), |zk| zk.multi(&exec))
            .map(|_| ())
    }

    fn create_with_retries(&self, path: &str, data: Vec<u8>) -> Result<(), StoreError> {
        self.do_multi_with_retries(vec![Op::create(
            path,
            data,
            self.config.acl.clone(),
            CreateMode::Persistent,
        )])
    }

    fn set_data_with_retries(&self, path: &str, data: Vec<u8>, version: i32) -> Result<(), StoreError> {
        self.do_multi_with_retries(vec![Op::set_data(path, data, version)])
    }

    fn get_data_with_retries(&self, path: &str, watch: bool) -> Result<Vec<u8>, StoreError> {
        Ok(self
            .runner
            .run(path, |zk| zk.get_data(path, watch))?
            .unwrap_or_default())
    }

    fn get_children_with_retries(&self, path: &str, watch: bool) -> Result<Vec<String>, StoreError> {
        Ok(self
            .runner
            .run(path, |zk| zk.get_children(path, watch))?
            .unwrap_or_default())
    }

    fn exists_with_retries(&self, path: &str, watch: bool) -> Result<Option<Stat>, StoreError> {
        Ok(self
            .runner
            .run(path, |zk| zk.exists(path, watch))?
            .flatten())
    }

    fn within_limit(&self, path: &str, size: usize) -> Result<bool, StoreError> {
        if size <= self.config.znode_size_limit {
            return Ok(true);
        }
        match self.config.oversize_policy {
            OversizePolicy::SkipWithWarning => {
                warn!(
                    "blob for {path} is {size} bytes, over the {} byte znode limit; skipping the write",
                    self.config.znode_size_limit
                );
                Ok(false)
            }
            OversizePolicy::Fail => Err(StoreError::NodeSizeExceeded {
                path: path.to_string(),
                size,
                limit: self.config.znode_size_limit,
            }),
        }
    }

    fn load_rm_dt_secret_manager_state(&self, state: &mut RmState) -> Result<(), StoreError> {
        self.load_delegation_key_state(state)?;
        self.load_sequence_number_state(state)?;
        self.load_delegation_token_state(state)
    }

    fn load_delegation_key_state(&self, state: &mut RmState) -> Result<(), StoreError> {
        let root = self.layout.dt_master_keys_root();
        for child in self.get_children_with_retries(root, true)? {
            if !child.starts_with(DELEGATION_KEY_PREFIX) {
                info!("unknown child node with name {child}");
                continue;
            }
            let child_path = node_path(root, &child);
            let data = self.get_data_with_retries(&child_path, true)?;
            if data.is_empty() {
                warn!("content of {child_path} is broken");
                continue;
            }
            let key: DelegationKey = decode(&data)?;
            debug!(
                "loaded delegation key: id {} expiring {}",
                key.key_id, key.expiry_date
            );
            state.rm_secret_manager_state.master_key_state.insert(key);
        }
        Ok(())
    }

    fn load_sequence_number_state(&self, state: &mut RmState) -> Result<(), StoreError> {
        let data = self.get_data_with_retries(self.layout.dt_sequence_number(), false)?;
        if !data.is_empty() {
            state.rm_secret_manager_state.dt_sequence_number = decode_sequence_number(&data)?;
        }
        Ok(())
    }

    fn load_delegation_token_state(&self, state: &mut RmState) -> Result<(), StoreError> {
        let root = self.layout.delegation_tokens_root();
        for child in self.get_children_with_retries(root, true)? {
            if !child.starts_with(DELEGATION_TOKEN_PREFIX) {
                info!("unknown child node with name {child}");
                continue;
            }
            let child_path = node_path(root, &child);
            let data = self.get_data_with_retries(&child_path, true)?;
            if data.is_empty() {
                warn!("content of {child_path} is broken");
                continue;
            }
            let record: DelegationTokenRecord = decode(&data)?;
            debug!(
                "loaded delegation token {} with renew date {}",
                record.identifier.sequence_number, record.renew_date
            );
            state
                .rm_secret_manager_state
                .delegation_token_state
                .insert(record.identifier, record.renew_date);
        }
        Ok(())
    }

    fn load_rm_app_state(&self, state: &mut RmState) -> Result<(), StoreError> {
        for child in self.get_children_with_retries(self.layout.app_root(), true)? {
            if !child.starts_with(APPLICATION_ID_PREFIX) {
                info!("unknown child node with name {child}");
                continue;
            }
            let child_path = node_path(self.layout.app_root(), &child);
            let data = self.get_data_with_retries(&child_path, true)?;
            debug!("loading application from znode {child}");
            let application_id: ApplicationId = child.parse()?;
            let mut application: ApplicationState = decode(&data)?;
            if application.application_id() != application_id {
                return Err(StoreError::IdMismatch {
                    node: child,
                    embedded: application.application_id().to_string(),
                });
            }
            self.load_attempt_state(&mut application)?;
            state.app_state.insert(application_id, application);
        }
        debug!("done loading applications from the state store");
        Ok(())
    }

    fn load_attempt_state(&self, application: &mut ApplicationState) -> Result<(), StoreError> {
        let app_path = self.layout.app_path(&application.application_id());
        for child in self.get_children_with_retries(&app_path, false)? {
            if !child.starts_with(APPLICATION_ATTEMPT_ID_PREFIX) {
                info!("unknown child node with name {child}");
                continue;
            }
            let attempt_path = node_path(&app_path, &child);
            let data = self.get_data_with_retries(&attempt_path, true)?;
            let attempt: ApplicationAttemptState = decode(&data)?;
            application.attempts.insert(attempt.attempt_id, attempt);
        }
        Ok(())
    }

    fn load_amrm_token_secret_manager_state(&self, state: &mut RmState) -> Result<(), StoreError> {
        let data = self.get_data_with_retries(self.layout.amrm_root(), true)?;
        if data.is_empty() {
            warn!("no AM-RM token secret manager state saved");
            return Ok(());
        }
        state.amrm_token_secret_manager_state = Some(decode(&data)?);
        Ok(())
    }

    fn store_or_update_token_ops(
        &self,
        record: &DelegationTokenRecord,
        latest_sequence_number: i32,
        is_update: bool,
    ) -> Result<Vec<Op>, StoreError> {
        let sequence_number = record.identifier.sequence_number;
        let token_path = self.layout.delegation_token_path(sequence_number);
        let data = encode(record)?;
        debug!(
            "{} {DELEGATION_TOKEN_PREFIX}{sequence_number}",
            if is_update { "updating" } else { "storing" }
        );
        let mut ops = vec![if is_update {
            Op::set_data(token_path, data, -1)
        } else {
            Op::create(
                token_path,
                data,
                self.config.acl.clone(),
                CreateMode::Persistent,
            )
        }];
        debug!(
            "setting {} to {latest_sequence_number}",
            self.layout.dt_sequence_number()
        );
        ops.push(Op::set_data(
            self.layout.dt_sequence_number(),
            encode_sequence_number(latest_sequence_number),
            -1,
        ));
        Ok(ops)
    }
}

impl StateStore for ZkStateStore {
    fn start(&mut self) -> Result<(), StoreError> {
        self.session.connect()?;
        for path in ancestor_paths(self.layout.working_path()) {
            self.create_root_dir(&path)?;
        }
        self.create_root_dir(self.layout.root())?;
        if self.config.ha_enabled {
            self.fence()?;
            let runner = self.runner.clone();
            let fencing = self.fencing.clone();
            let root = self.layout.root().to_string();
            let probe = move || {
                let ops = fencing.fenced(Vec::new());
                runner.run(&root, |zk| zk.multi(&ops)).map(|_| ())
            };
            let sink = self.event_sink.clone();
            let session = self.session.clone();
            self.prober = Some(ActiveStatusProber::spawn(
                self.config.session_timeout,
                probe,
                move |_err| {
                    session.mark_fenced();
                    sink.store_operation_failed(&StoreError::Fenced);
                },
            ));
        }
        for path in self.layout.directory_nodes() {
            self.create_root_dir(path)?;
        }
        let root = self.layout.root();
        self.runner.run(root, |zk| zk.sync(root)).map(|_| ())
    }

    fn close(&mut self) -> Result<(), StoreError> {
        if let Some(mut prober) = self.prober.take() {
            prober.stop();
        }
        self.session.close();
        Ok(())
    }

    fn load_state(&self) -> Result<RmState, StoreError> {
        let mut state = RmState::default();
        self.load_rm_dt_secret_manager_state(&mut state)?;
        self.load_rm_app_state(&mut state)?;
        self.load_amrm_token_secret_manager_state(&mut state)?;
        Ok(state)
    }

    fn store_application(&self, state: &ApplicationState) -> Result<(), StoreError> {
        let path = self.layout.app_path(&state.application_id());
        debug!("storing info for app {} at {path}", state.application_id());
        let data = encode(state)?;
        if self.within_limit(&path, data.len())? {
            self.create_with_retries(&path, data)?;
        }
        Ok(())
    }

    fn update_application(&self, state: &ApplicationState) -> Result<(), StoreError> {
        let path = self.layout.app_path(&state.application_id());
        debug!(
            "storing final state info for app {} at {path}",
            state.application_id()
        );
        let data = encode(state)?;
        if !self.within_limit(&path, data.len())? {
            return Ok(());
        }
        if self.exists_with_retries(&path, true)?.is_some() {
            self.set_data_with_retries(&path, data, -1)
        } else {
            debug!(
                "{} znode did not exist, created a new one to update the application state",
                state.application_id()
            );
            self.create_with_retries(&path, data)
        }
    }

    fn store_attempt(&self, state: &ApplicationAttemptState) -> Result<(), StoreError> {
        let path = self.layout.attempt_path(&state.attempt_id);
        debug!("storing info for attempt {} at {path}", state.attempt_id);
        let data = encode(state)?;
        if self.within_limit(&path, data.len())? {
            self.create_with_retries(&path, data)?;
        }
        Ok(())
    }

    fn update_attempt(&self, state: &ApplicationAttemptState) -> Result<(), StoreError> {
        let path = self.layout.attempt_path(&state.attempt_id);
        debug!(
            "storing final state info for attempt {} at {path}",
            state.attempt_id
        );
        let data = encode(state)?;
        if !self.within_limit(&path, data.len())? {
            return Ok(());
        }
        if self.exists_with_retries(&path, true)?.is_some() {
            self.set_data_with_retries(&path, data, -1)
        } else {
            debug!(
                "{} znode did not exist, created a new one to update the attempt state",
                state.attempt_id
            );
            self.create_with_retries(&path, data)
        }
    }

    fn remove_application(&self, state: &ApplicationState) -> Result<(), StoreError> {
        let application_id = state.application_id();
        let app_path = self.layout.app_path(&application_id);
        let mut ops = Vec::with_capacity(state.attempts.len() + 1);
        // Attempts first: the application znode must be empty to delete.
        for attempt_id in state.attempts.keys() {
            ops.push(Op::delete(self.layout.attempt_path(attempt_id), -1));
        }
        ops.push(Op::delete(app_path.clone(), -1));
        debug!("removing info for app {application_id} at {app_path} and its attempts");
        self.do_multi_with_retries(ops)
    }

    fn store_delegation_token(
        &self,
        record: &DelegationTokenRecord,
        latest_sequence_number: i32,
    ) -> Result<(), StoreError> {
        let ops = self.store_or_update_token_ops(record, latest_sequence_number, false)?;
        self.do_multi_with_retries(ops)
    }

    fn update_delegation_token(
        &self,
        record: &DelegationTokenRecord,
        latest_sequence_number: i32,
    ) -> Result<(), StoreError> {
        let token_path = self
            .layout
            .delegation_token_path(record.identifier.sequence_number);
        let is_update = self.exists_with_retries(&token_path, true)?.is_some();
        if !is_update {
            debug!("attempted to update a non-existing znode {token_path}");
        }
        let ops = self.store_or_update_token_ops(record, latest_sequence_number, is_update)?;
        self.do_multi_with_retries(ops)
    }

    fn remove_delegation_token(&self, sequence_number: i32) -> Result<(), StoreError> {
        let token_path = self.layout.delegation_token_path(sequence_number);
        debug!("removing {DELEGATION_TOKEN_PREFIX}{sequence_number}");
        let mut ops = Vec::new();
        if self.exists_with_retries(&token_path, true)?.is_some() {
            ops.push(Op::delete(token_path, -1));
        } else {
            debug!("attempted to delete a non-existing znode {token_path}");
        }
        self.do_multi_with_retries(ops)
    }

    fn store_master_key(&self, key: &DelegationKey) -> Result<(), StoreError> {
        let path = self.layout.master_key_path(key.key_id);
        debug!("storing {DELEGATION_KEY_PREFIX}{}", key.key_id);
        self.create_with_retries(&path, encode(key)?)
    }

    fn remove_master_key(&self, key_id: i32) -> Result<(), StoreError> {
        let path = self.layout.master_key_path(key_id);
        debug!("removing {DELEGATION_KEY_PREFIX}{key_id}");
        if self.exists_with_retries(&path, true)?.is_some() {
            self.do_multi_with_retries(vec![Op::delete(path, -1)])
        } else {
            debug!("attempted to delete a non-existing znode {path}");
            Ok(())
        }
    }

    fn store_or_update_amrm_state(
        &self,
        state: &AmrmTokenSecretManagerState,
    ) -> Result<(), StoreError> {
        let data = encode(state)?;
        match self.set_data_with_retries(self.layout.amrm_root(), data, -1) {
            Ok(()) => Ok(()),
            Err(err) => {
                info!("error storing AM-RM token secret manager state: {err}");
                self.event_sink.store_operation_failed(&err);
                Err(err)
            }
        }
    }

    fn get_and_increment_epoch(&self) -> Result<u64, StoreError> {
        let path = self.layout.epoch_node();
        if self.exists_with_retries(path, true)?.is_some() {
            let data = self.get_data_with_retries(path, true)?;
            let current = decode::<Epoch>(&data)?.epoch;
            self.set_data_with_retries(path, encode(&Epoch { epoch: current + 1 })?, -1)?;
            Ok(current)
        } else {
            // Initialize the node with 1 for the next activation.
            self.create_with_retries(path, encode(&Epoch { epoch: 1 })?)?;
            Ok(0)
        }
    }

    fn store_version(&self) -> Result<(), StoreError> {
        let path = self.layout.version_node();
        let data = encode(&CURRENT_VERSION_INFO)?;
        if self.exists_with_retries(path, true)?.is_some() {
            self.set_data_with_retries(path, data, -1)
        } else {
            self.create_with_retries(path, data)
        }
    }

    fn load_version(&self) -> Result<Option<Version>, StoreError> {
        let path = self.layout.version_node();
        if self.exists_with_retries(path, true)?.is_some() {
            let data = self.get_data_with_retries(path, true)?;
            Ok(Some(decode(&data)?))
        } else {
            Ok(None)
        }
    }

    fn check_version(&self) -> Result<(), StoreError> {
        match self.load_version()? {
            None => {
                info!("no version stored, writing {CURRENT_VERSION_INFO}");
                self.store_version()
            }
            Some(loaded) if loaded == CURRENT_VERSION_INFO => Ok(()),
            Some(loaded) if loaded.is_compatible_to(&CURRENT_VERSION_INFO) => {
                info!("upgrading stored version {loaded} to {CURRENT_VERSION_INFO}");
                self.store_version()
            }
            Some(loaded) => Err(StoreError::VersionMismatch {
                loaded,
                current: CURRENT_VERSION_INFO,
            }),
        }
    }

    fn current_version(&self) -> Version {
        CURRENT_VERSION_INFO
    }

    fn delete_store(&self) -> Result<(), StoreError> {
        let root = self.layout.root();
        if self.exists_with_retries(root, true)?.is_some() {
            self.runner
                .run(root, |zk| recursive_delete(zk, root, true))
                .map(|_| ())?;
        }
        Ok(())
    }
}

impl Drop for ZkStateStore {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ancestor_paths_cover_every_component() {
        assert_eq!(ancestor_paths("/rmstore"), vec!["/rmstore"]);
        assert_eq!(
            ancestor_paths("/cluster/a/rmstore"),
            vec!["/cluster", "/cluster/a", "/cluster/a/rmstore"]
        );
    }

    #[test]
    fn missing_address_is_fatal_at_construction() {
        let config = ZkStoreConfig::new("  ");
        let connector = Arc::new(crate::coordination::memory::MemoryEnsemble::new());
        let err = ZkStateStore::new(config, connector, Arc::new(LoggingEventSink)).unwrap_err();
        assert!(matches!(err, StoreError::MissingAddress));
    }
}
