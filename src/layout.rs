//! The znode tree the store persists into. Path names and child-name
//! prefixes are an on-disk contract shared across controller versions and
//! must not drift.

use crate::records::{ApplicationAttemptId, ApplicationId};

pub const ROOT_ZNODE_NAME: &str = "ZKRMStateRoot";
pub const VERSION_NODE: &str = "RMVersionNode";
pub const EPOCH_NODE: &str = "EpochNode";
pub const FENCING_LOCK: &str = "RM_ZK_FENCING_LOCK";
pub const RM_APP_ROOT: &str = "RMAppRoot";
pub const RM_DT_SECRET_MANAGER_ROOT: &str = "RMDTSecretManagerRoot";
pub const RM_DT_SEQUENTIAL_NUMBER_ZNODE_NAME: &str = "RMDTSequentialNumber";
pub const RM_DELEGATION_TOKENS_ROOT_ZNODE_NAME: &str = "RMDelegationTokensRoot";
pub const RM_DT_MASTER_KEYS_ROOT_ZNODE_NAME: &str = "RMDTMasterKeysRoot";
pub const AMRM_TOKEN_SECRET_MANAGER_ROOT: &str = "AMRMTokenSecretManagerRoot";
pub const DELEGATION_TOKEN_PREFIX: &str = "RMDelegationToken_";
pub const DELEGATION_KEY_PREFIX: &str = "DelegationKey_";

pub fn node_path(root: &str, name: &str) -> String {
    format!("{root}/{name}")
}

/// All paths of the persisted tree, rooted at the configured working path.
///
/// ```text
/// <working>/ZKRMStateRoot
///   RMVersionNode
///   EpochNode
///   RM_ZK_FENCING_LOCK
///   RMAppRoot/<application id>/<application attempt id>
///   RMDTSecretManagerRoot
///     RMDTSequentialNumber
///     RMDelegationTokensRoot/RMDelegationToken_<seq>
///     RMDTMasterKeysRoot/DelegationKey_<id>
///   AMRMTokenSecretManagerRoot
/// ```
#[derive(Debug, Clone)]
pub struct StoreLayout {
    working_path: String,
    root: String,
    version_node: String,
    epoch_node: String,
    fencing_lock: String,
    app_root: String,
    dt_secret_manager_root: String,
    dt_master_keys_root: String,
    delegation_tokens_root: String,
    dt_sequence_number: String,
    amrm_root: String,
}

impl StoreLayout {
    pub fn new(working_path: &str) -> Self {
        let working_path = working_path.trim_end_matches('/').to_string();
        let root = node_path(&working_path, ROOT_ZNODE_NAME);
        let dt_secret_manager_root = node_path(&root, RM_DT_SECRET_MANAGER_ROOT);
        Self {
            version_node: node_path(&root, VERSION_NODE),
            epoch_node: node_path(&root, EPOCH_NODE),
            fencing_lock: node_path(&root, FENCING_LOCK),
            app_root: node_path(&root, RM_APP_ROOT),
            dt_master_keys_root: node_path(
                &dt_secret_manager_root,
                RM_DT_MASTER_KEYS_ROOT_ZNODE_NAME,
            ),
            delegation_tokens_root: node_path(
                &dt_secret_manager_root,
                RM_DELEGATION_TOKENS_ROOT_ZNODE_NAME,
            ),
            dt_sequence_number: node_path(
                &dt_secret_manager_root,
                RM_DT_SEQUENTIAL_NUMBER_ZNODE_NAME,
            ),
            amrm_root: node_path(&root, AMRM_TOKEN_SECRET_MANAGER_ROOT),
            dt_secret_manager_root,
            working_path,
            root,
        }
    }

    pub fn working_path(&self) -> &str {
        &self.working_path
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn version_node(&self) -> &str {
        &self.version_node
    }

    pub fn epoch_node(&self) -> &str {
        &self.epoch_node
    }

    pub fn fencing_lock(&self) -> &str {
        &self.fencing_lock
    }

    pub fn app_root(&self) -> &str {
        &self.app_root
    }

    pub fn dt_secret_manager_root(&self) -> &str {
        &self.dt_secret_manager_root
    }

    pub fn dt_master_keys_root(&self) -> &str {
        &self.dt_master_keys_root
    }

    pub fn delegation_tokens_root(&self) -> &str {
        &self.delegation_tokens_root
    }

    pub fn dt_sequence_number(&self) -> &str {
        &self.dt_sequence_number
    }

    pub fn amrm_root(&self) -> &str {
        &self.amrm_root
    }

    pub fn app_path(&self, application_id: &ApplicationId) -> String {
        node_path(&self.app_root, &application_id.to_string())
    }

    pub fn attempt_path(&self, attempt_id: &ApplicationAttemptId) -> String {
        node_path(
            &self.app_path(&attempt_id.application_id),
            &attempt_id.to_string(),
        )
    }

    pub fn delegation_token_path(&self, sequence_number: i32) -> String {
        node_path(
            &self.delegation_tokens_root,
            &format!("{DELEGATION_TOKEN_PREFIX}{sequence_number}"),
        )
    }

    pub fn master_key_path(&self, key_id: i32) -> String {
        node_path(
            &self.dt_master_keys_root,
            &format!("{DELEGATION_KEY_PREFIX}{key_id}"),
        )
    }

    /// Directory znodes in creation order, the root excluded (it is created
    /// separately so fencing can run in between).
    pub fn directory_nodes(&self) -> Vec<&str> {
        vec![
            &self.app_root,
            &self.dt_secret_manager_root,
            &self.dt_master_keys_root,
            &self.delegation_tokens_root,
            &self.dt_sequence_number,
            &self.amrm_root,
        ]
    }
}
