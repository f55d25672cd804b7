//! End-to-end recovery coverage: epoch monotonicity across restarts, full
//! state loads, delegation-token bookkeeping, oversize-blob policies, and
//! version handling, all against the in-process coordination backend.

use rmstore::{
    AmrmTokenSecretManagerState, ApplicationAttemptId, ApplicationAttemptState, ApplicationId,
    ApplicationState, ApplicationSubmissionContext, ContainerId, Credentials, DelegationKey,
    DelegationTokenIdentifier, DelegationTokenRecord, FinalApplicationStatus, LoggingEventSink,
    MasterKey, MemoryEnsemble, OversizePolicy, Resource, RmAppAttemptState, RmAppState, StateStore,
    StoreError, Version, ZkConnector, ZkStateStore, ZkStoreConfig, CURRENT_VERSION_INFO,
};
use std::collections::BTreeMap;
use std::sync::{mpsc, Arc};
use std::time::Duration;

const FENCING_LOCK_PATH: &str = "/rmstore/ZKRMStateRoot/RM_ZK_FENCING_LOCK";
const SEQUENCE_NUMBER_PATH: &str =
    "/rmstore/ZKRMStateRoot/RMDTSecretManagerRoot/RMDTSequentialNumber";
const VERSION_NODE_PATH: &str = "/rmstore/ZKRMStateRoot/RMVersionNode";
const APP_ROOT_PATH: &str = "/rmstore/ZKRMStateRoot/RMAppRoot";

fn config() -> ZkStoreConfig {
    ZkStoreConfig::new("memory:2181")
        .with_session_timeout(Duration::from_secs(2))
        .with_num_retries(5)
        .with_retry_interval(Duration::from_millis(1))
}

fn open_store(ensemble: &MemoryEnsemble, config: ZkStoreConfig) -> ZkStateStore {
    let mut store = ZkStateStore::new(
        config,
        Arc::new(ensemble.clone()),
        Arc::new(LoggingEventSink),
    )
    .expect("store config accepted");
    store.start().expect("store started");
    store
}

fn application(sequence: u32) -> ApplicationState {
    let application_id = ApplicationId::new(1_700_000_000_000, sequence);
    ApplicationState {
        submit_time: 100,
        start_time: 110,
        submission_context: ApplicationSubmissionContext {
            application_id,
            application_name: "wordcount".into(),
            queue: "default".into(),
            unmanaged_am: false,
            max_app_attempts: 2,
            resource: Resource {
                memory_mb: 2048,
                virtual_cores: 2,
            },
        },
        user: "alice".into(),
        state: RmAppState::Running,
        diagnostics: String::new(),
        finish_time: 0,
        attempts: BTreeMap::new(),
    }
}

fn attempt(application: &ApplicationState, number: u32) -> ApplicationAttemptState {
    ApplicationAttemptState {
        attempt_id: ApplicationAttemptId::new(application.application_id(), number),
        master_container: None,
        app_attempt_tokens: None,
        start_time: 120,
        finish_time: 0,
        state: RmAppAttemptState::Running,
        final_tracking_url: String::new(),
        diagnostics: String::new(),
        final_application_status: FinalApplicationStatus::Undefined,
        am_container_exit_status: -1000,
        memory_seconds: 0,
        vcore_seconds: 0,
    }
}

fn token_record(sequence_number: i32, renew_date: u64) -> DelegationTokenRecord {
    DelegationTokenRecord {
        identifier: DelegationTokenIdentifier {
            owner: "alice".into(),
            renewer: "rm".into(),
            real_user: String::new(),
            issue_date: 50,
            max_date: 5_000,
            sequence_number,
            master_key_id: 1,
        },
        renew_date,
    }
}

#[test]
fn epoch_is_monotonic_across_store_restarts() {
    let ensemble = MemoryEnsemble::new();
    {
        let mut store = open_store(&ensemble, config());
        assert_eq!(store.get_and_increment_epoch().unwrap(), 0);
        assert_eq!(store.get_and_increment_epoch().unwrap(), 1);
        assert_eq!(store.get_and_increment_epoch().unwrap(), 2);
        store.close().unwrap();
    }
    let mut store = open_store(&ensemble, config());
    assert_eq!(store.get_and_increment_epoch().unwrap(), 3);
    store.close().unwrap();
}

#[test]
fn load_state_recovers_applications_with_their_attempts() {
    let ensemble = MemoryEnsemble::new();
    let mut credentials = Credentials::default();
    credentials.tokens.insert("am-token".into(), vec![1, 2, 3]);

    {
        let mut store = open_store(&ensemble, config());
        let app = application(1);
        store.store_application(&app).unwrap();
        store.store_attempt(&attempt(&app, 1)).unwrap();
        let mut second = attempt(&app, 2);
        second.app_attempt_tokens = Some(credentials.to_bytes().unwrap());
        second.master_container = Some(ContainerId {
            attempt_id: second.attempt_id,
            container_id: 1,
        });
        store.store_attempt(&second).unwrap();
        store.close().unwrap();
    }

    let mut store = open_store(&ensemble, config());
    let state = store.load_state().unwrap();
    let app_id = ApplicationId::new(1_700_000_000_000, 1);
    let loaded = state.app_state.get(&app_id).expect("application recovered");
    assert_eq!(loaded.user, "alice");
    assert_eq!(loaded.attempts.len(), 2);
    let second_id = ApplicationAttemptId::new(app_id, 2);
    let recovered = &loaded.attempts[&second_id];
    let tokens = recovered
        .app_attempt_tokens
        .as_deref()
        .expect("credentials recovered");
    assert_eq!(Credentials::from_bytes(tokens).unwrap(), credentials);
    assert_eq!(
        recovered.master_container,
        Some(ContainerId {
            attempt_id: second_id,
            container_id: 1,
        })
    );
    assert!(!ensemble.node_exists(FENCING_LOCK_PATH));
    store.close().unwrap();
}

#[test]
fn update_creates_the_znode_when_it_is_missing() {
    let ensemble = MemoryEnsemble::new();
    let mut store = open_store(&ensemble, config());
    let mut app = application(4);
    store.update_application(&app).unwrap();
    app.state = RmAppState::Finished;
    app.finish_time = 500;
    store.update_application(&app).unwrap();
    let state = store.load_state().unwrap();
    let loaded = &state.app_state[&app.application_id()];
    assert_eq!(loaded.state, RmAppState::Finished);
    assert_eq!(loaded.finish_time, 500);

    let mut first = attempt(&app, 1);
    store.update_attempt(&first).unwrap();
    first.state = RmAppAttemptState::Finished;
    store.update_attempt(&first).unwrap();
    let state = store.load_state().unwrap();
    let loaded = &state.app_state[&app.application_id()].attempts[&first.attempt_id];
    assert_eq!(loaded.state, RmAppAttemptState::Finished);
    store.close().unwrap();
}

#[test]
fn remove_application_deletes_the_app_and_every_attempt_atomically() {
    let ensemble = MemoryEnsemble::new();
    let mut store = open_store(&ensemble, config());
    let mut app = application(2);
    store.store_application(&app).unwrap();
    let first = attempt(&app, 1);
    let second = attempt(&app, 2);
    store.store_attempt(&first).unwrap();
    store.store_attempt(&second).unwrap();
    app.attempts.insert(first.attempt_id, first);
    app.attempts.insert(second.attempt_id, second);

    store.remove_application(&app).unwrap();

    let app_path = format!("{APP_ROOT_PATH}/{}", app.application_id());
    assert!(!ensemble.node_exists(&app_path));
    assert!(store.load_state().unwrap().app_state.is_empty());
    assert!(!ensemble.node_exists(FENCING_LOCK_PATH));
    store.close().unwrap();
}

#[test]
fn delegation_tokens_carry_the_sequence_number() {
    let ensemble = MemoryEnsemble::new();
    let mut store = open_store(&ensemble, config());

    store
        .store_delegation_token(&token_record(7, 1_000), 7)
        .unwrap();
    let state = store.load_state().unwrap();
    assert_eq!(state.rm_secret_manager_state.dt_sequence_number, 7);
    let (identifier, renew_date) = state
        .rm_secret_manager_state
        .delegation_token_state
        .iter()
        .next()
        .expect("token recovered");
    assert_eq!(identifier.sequence_number, 7);
    assert_eq!(*renew_date, 1_000);
    assert_eq!(
        ensemble.node_data(SEQUENCE_NUMBER_PATH),
        Some(vec![0, 0, 0, 7])
    );

    store
        .update_delegation_token(&token_record(7, 2_000), 8)
        .unwrap();
    let state = store.load_state().unwrap();
    assert_eq!(state.rm_secret_manager_state.dt_sequence_number, 8);
    assert_eq!(
        state.rm_secret_manager_state.delegation_token_state[&token_record(7, 0).identifier],
        2_000
    );

    // Updating an absent token falls back to create.
    store
        .update_delegation_token(&token_record(9, 3_000), 9)
        .unwrap();
    let state = store.load_state().unwrap();
    assert_eq!(
        state.rm_secret_manager_state.delegation_token_state.len(),
        2
    );

    store.remove_delegation_token(7).unwrap();
    store.remove_delegation_token(7).unwrap(); // absent: tolerated
    let state = store.load_state().unwrap();
    assert_eq!(
        state.rm_secret_manager_state.delegation_token_state.len(),
        1
    );
    store.close().unwrap();
}

#[test]
fn master_keys_store_and_remove() {
    let ensemble = MemoryEnsemble::new();
    let mut store = open_store(&ensemble, config());
    let key = DelegationKey {
        key_id: 3,
        expiry_date: 9_000,
        key: vec![9, 9, 9],
    };
    store.store_master_key(&key).unwrap();
    let state = store.load_state().unwrap();
    assert!(state.rm_secret_manager_state.master_key_state.contains(&key));

    store.remove_master_key(3).unwrap();
    store.remove_master_key(3).unwrap(); // absent: tolerated
    let state = store.load_state().unwrap();
    assert!(state.rm_secret_manager_state.master_key_state.is_empty());
    store.close().unwrap();
}

#[test]
fn amrm_secret_manager_state_round_trips_and_tolerates_absence() {
    let ensemble = MemoryEnsemble::new();
    let mut store = open_store(&ensemble, config());
    assert!(store
        .load_state()
        .unwrap()
        .amrm_token_secret_manager_state
        .is_none());

    let amrm = AmrmTokenSecretManagerState {
        current_master_key: Some(MasterKey {
            key_id: 1,
            key_bytes: vec![1],
        }),
        next_master_key: Some(MasterKey {
            key_id: 2,
            key_bytes: vec![2],
        }),
    };
    store.store_or_update_amrm_state(&amrm).unwrap();
    assert_eq!(
        store.load_state().unwrap().amrm_token_secret_manager_state,
        Some(amrm)
    );
    store.close().unwrap();
}

#[test]
fn oversize_blobs_are_skipped_under_the_default_policy() {
    let ensemble = MemoryEnsemble::new();
    let mut store = open_store(&ensemble, config().with_znode_size_limit(16));
    let app = application(3);
    // Accepted, but the write never happened.
    store.store_application(&app).unwrap();
    store.update_application(&app).unwrap();
    let state = store.load_state().unwrap();
    assert!(state.app_state.is_empty());
    let app_path = format!("{APP_ROOT_PATH}/{}", app.application_id());
    assert!(!ensemble.node_exists(&app_path));
    store.close().unwrap();
}

#[test]
fn oversize_blobs_fail_when_configured_to() {
    let ensemble = MemoryEnsemble::new();
    let mut store = open_store(
        &ensemble,
        config()
            .with_znode_size_limit(16)
            .with_oversize_policy(OversizePolicy::Fail),
    );
    let err = store.store_application(&application(3)).unwrap_err();
    assert!(matches!(err, StoreError::NodeSizeExceeded { limit: 16, .. }));
    store.close().unwrap();
}

#[test]
fn version_is_written_when_absent_and_mismatch_is_surfaced() {
    let ensemble = MemoryEnsemble::new();
    let mut store = open_store(&ensemble, config());
    assert!(store.load_version().unwrap().is_none());
    store.check_version().unwrap();
    assert_eq!(store.load_version().unwrap(), Some(CURRENT_VERSION_INFO));
    assert_eq!(store.current_version(), Version::new(1, 2));
    store.check_version().unwrap();

    // A future major version lands in the node: the caller must decide.
    let (tx, _rx) = mpsc::channel();
    let raw = ensemble.connect(Duration::from_secs(2), tx).unwrap();
    raw.set_data(
        VERSION_NODE_PATH,
        &serde_json::to_vec(&Version::new(2, 0)).unwrap(),
        -1,
    )
    .unwrap();
    let err = store.check_version().unwrap_err();
    assert!(matches!(
        err,
        StoreError::VersionMismatch {
            loaded: Version { major: 2, minor: 0 },
            ..
        }
    ));
    store.close().unwrap();
}

#[test]
fn unknown_children_are_skipped_during_load() {
    let ensemble = MemoryEnsemble::new();
    let mut store = open_store(&ensemble, config());
    store.store_application(&application(5)).unwrap();

    let (tx, _rx) = mpsc::channel();
    let raw = ensemble.connect(Duration::from_secs(2), tx).unwrap();
    raw.create(
        &format!("{APP_ROOT_PATH}/not-an-application"),
        b"junk",
        &[rmstore::Acl::open_unsafe()],
        rmstore::CreateMode::Persistent,
    )
    .unwrap();

    let state = store.load_state().unwrap();
    assert_eq!(state.app_state.len(), 1);
    store.close().unwrap();
}

#[test]
fn mismatched_application_id_in_a_blob_is_fatal() {
    let ensemble = MemoryEnsemble::new();
    let mut store = open_store(&ensemble, config());
    let app = application(6);
    let blob = serde_json::to_vec(&app).unwrap();
    let (tx, _rx) = mpsc::channel();
    let raw = ensemble.connect(Duration::from_secs(2), tx).unwrap();
    raw.create(
        &format!("{APP_ROOT_PATH}/application_1700000000000_0099"),
        &blob,
        &[rmstore::Acl::open_unsafe()],
        rmstore::CreateMode::Persistent,
    )
    .unwrap();

    let err = store.load_state().unwrap_err();
    assert!(matches!(err, StoreError::IdMismatch { .. }));
    store.close().unwrap();
}

#[test]
fn delete_store_removes_the_whole_tree() {
    let ensemble = MemoryEnsemble::new();
    let mut store = open_store(&ensemble, config());
    store.store_application(&application(7)).unwrap();
    store.delete_store().unwrap();
    assert!(!ensemble.node_exists("/rmstore/ZKRMStateRoot"));
    assert!(ensemble.node_exists("/rmstore"));
    store.close().unwrap();
}
