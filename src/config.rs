//! Store configuration. Every knob has the documented default; HA mode
//! changes how the retry interval is derived so that the aggregate retry
//! window never outlives a session.

use crate::coordination::{Acl, AuthInfo};
use std::time::Duration;

pub const DEFAULT_NUM_RETRIES: usize = 1000;
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_millis(10_000);
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(1_000);
pub const DEFAULT_PARENT_PATH: &str = "/rmstore";
pub const DEFAULT_ZNODE_SIZE_LIMIT: usize = 1024 * 1024;
pub const DEFAULT_CONTROLLER_ID: &str = "rm";

/// What to do with an application or attempt blob over the znode size limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OversizePolicy {
    /// Skip the write with a warning; recovery state for that record is
    /// sacrificed but the caller keeps running.
    #[default]
    SkipWithWarning,
    /// Fail the mutation with `StoreError::NodeSizeExceeded`.
    Fail,
}

#[derive(Debug, Clone)]
pub struct ZkStoreConfig {
    /// host:port list of the coordination service. Required.
    pub address: String,
    pub num_retries: usize,
    pub session_timeout: Duration,
    /// Delay between retries when HA is off; HA derives its own.
    pub retry_interval: Duration,
    pub parent_path: String,
    pub znode_size_limit: usize,
    /// ACL applied to every znode the store creates.
    pub acl: Vec<Acl>,
    /// Credentials registered on every session.
    pub auths: Vec<AuthInfo>,
    /// Operator-supplied root ACL; when set, the digest fencing scheme is
    /// skipped and this ACL is applied verbatim.
    pub root_node_acl: Option<Vec<Acl>>,
    pub ha_enabled: bool,
    pub oversize_policy: OversizePolicy,
    /// Digest username identifying this controller in the fencing ACL.
    pub controller_id: String,
}

impl ZkStoreConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            num_retries: DEFAULT_NUM_RETRIES,
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            parent_path: DEFAULT_PARENT_PATH.to_string(),
            znode_size_limit: DEFAULT_ZNODE_SIZE_LIMIT,
            acl: vec![Acl::open_unsafe()],
            auths: Vec::new(),
            root_node_acl: None,
            ha_enabled: false,
            oversize_policy: OversizePolicy::default(),
            controller_id: DEFAULT_CONTROLLER_ID.to_string(),
        }
    }

    pub fn with_num_retries(mut self, num_retries: usize) -> Self {
        self.num_retries = num_retries.max(1);
        self
    }

    pub fn with_session_timeout(mut self, session_timeout: Duration) -> Self {
        self.session_timeout = session_timeout;
        self
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    pub fn with_parent_path(mut self, parent_path: impl Into<String>) -> Self {
        self.parent_path = parent_path.into();
        self
    }

    pub fn with_znode_size_limit(mut self, znode_size_limit: usize) -> Self {
        self.znode_size_limit = znode_size_limit;
        self
    }

    pub fn with_acl(mut self, acl: Vec<Acl>) -> Self {
        self.acl = acl;
        self
    }

    pub fn with_auth(mut self, auth: AuthInfo) -> Self {
        self.auths.push(auth);
        self
    }

    pub fn with_root_node_acl(mut self, acl: Vec<Acl>) -> Self {
        self.root_node_acl = Some(acl);
        self
    }

    pub fn with_ha_enabled(mut self, ha_enabled: bool) -> Self {
        self.ha_enabled = ha_enabled;
        self
    }

    pub fn with_oversize_policy(mut self, policy: OversizePolicy) -> Self {
        self.oversize_policy = policy;
        self
    }

    pub fn with_controller_id(mut self, controller_id: impl Into<String>) -> Self {
        self.controller_id = controller_id.into();
        self
    }

    /// Under HA the retry window must fit inside one session lifetime: a
    /// stale controller's session expires before its retries run out, so it
    /// reconnects into a no-auth zone and self-fences.
    pub fn effective_retry_interval(&self) -> Duration {
        if self.ha_enabled {
            self.session_timeout / self.num_retries.max(1) as u32
        } else {
            self.retry_interval
        }
    }
}
