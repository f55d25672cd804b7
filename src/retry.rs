//! Classification of coordination-service failure codes and the retry loop
//! every store operation runs through.

use crate::coordination::session::SessionManager;
use crate::coordination::{ErrorCode, ZkHandle, ZkResult};
use crate::error::StoreError;
use log::info;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// What a failure code means for the operation that hit it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Idempotent conflict: the node is already there, the write stands.
    TreatAsSuccess,
    /// Transient; retry on the same session after the retry interval.
    SameSession,
    /// The session is gone; reconnect, sync, then retry.
    NewSession,
    /// Authority lost. Terminal under HA, otherwise retried like any other.
    FencedWhenHa,
    /// Anything else: retried until the budget runs out, then surfaced.
    Other,
}

pub fn classify(code: ErrorCode) -> RetryClass {
    match code {
        ErrorCode::NodeExists => RetryClass::TreatAsSuccess,
        ErrorCode::ConnectionLoss | ErrorCode::OperationTimeout => RetryClass::SameSession,
        ErrorCode::SessionExpired | ErrorCode::SessionMoved => RetryClass::NewSession,
        ErrorCode::NoAuth => RetryClass::FencedWhenHa,
        _ => RetryClass::Other,
    }
}

/// Executes operations with the configured retry budget.
///
/// The budget is sized so that under HA the aggregate retry window cannot
/// exceed one session lifetime: a stale controller's session expires before
/// its retries run out, and the reconnect lands in a no-auth zone.
#[derive(Clone)]
pub struct RetryRunner {
    session: Arc<SessionManager>,
    num_retries: usize,
    retry_interval: Duration,
    ha_enabled: bool,
}

impl RetryRunner {
    pub fn new(
        session: Arc<SessionManager>,
        num_retries: usize,
        retry_interval: Duration,
        ha_enabled: bool,
    ) -> Self {
        Self {
            session,
            num_retries: num_retries.max(1),
            retry_interval,
            ha_enabled,
        }
    }

    /// Runs `op` until it succeeds or the failure is terminal.
    ///
    /// `primary_path` names the operation's target for logging and for the
    /// read-your-writes sync after a reconnect. `Ok(None)` means the op hit
    /// an idempotent `NodeExists`.
    pub fn run<T>(
        &self,
        primary_path: &str,
        op: impl Fn(&dyn ZkHandle) -> ZkResult<T>,
    ) -> Result<Option<T>, StoreError> {
        let mut attempts = 0;
        loop {
            let outcome = self.session.with_active(&op)?;
            let code = match outcome {
                Ok(value) => return Ok(Some(value)),
                Err(code) => code,
            };
            let class = classify(code);
            if class == RetryClass::TreatAsSuccess {
                info!("znode already exists at {primary_path}");
                return Ok(None);
            }
            if class == RetryClass::FencedWhenHa && self.ha_enabled {
                // A peer has taken over; even if it has not, assuming so is
                // the safe reading.
                self.session.mark_fenced();
                return Err(StoreError::Fenced);
            }
            attempts += 1;
            if attempts >= self.num_retries {
                info!("coordination retries exhausted for {primary_path}: {code}");
                return Err(StoreError::Coordination { code, attempts });
            }
            info!("retrying coordination operation on {primary_path} after {code}, retry {attempts}");
            thread::sleep(self.retry_interval);
            if class == RetryClass::NewSession {
                self.session.reconnect_and_sync(primary_path)?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::memory::MemoryEnsemble;
    use crate::coordination::{Acl, CreateMode};

    fn runner(ensemble: &MemoryEnsemble, ha_enabled: bool) -> (RetryRunner, Arc<SessionManager>) {
        let session = Arc::new(SessionManager::new(
            Arc::new(ensemble.clone()),
            "memory",
            Duration::from_secs(2),
            5,
            "/",
        ));
        session.connect().unwrap();
        (
            RetryRunner::new(session.clone(), 5, Duration::from_millis(1), ha_enabled),
            session,
        )
    }

    #[test]
    fn classification_matches_the_failure_table() {
        assert_eq!(classify(ErrorCode::NodeExists), RetryClass::TreatAsSuccess);
        assert_eq!(classify(ErrorCode::ConnectionLoss), RetryClass::SameSession);
        assert_eq!(classify(ErrorCode::OperationTimeout), RetryClass::SameSession);
        assert_eq!(classify(ErrorCode::SessionExpired), RetryClass::NewSession);
        assert_eq!(classify(ErrorCode::SessionMoved), RetryClass::NewSession);
        assert_eq!(classify(ErrorCode::NoAuth), RetryClass::FencedWhenHa);
        assert_eq!(classify(ErrorCode::NoNode), RetryClass::Other);
    }

    #[test]
    fn transient_failures_retry_on_the_same_session() {
        let ensemble = MemoryEnsemble::new();
        let (runner, session) = runner(&ensemble, false);
        let id = session.session_id().unwrap();
        ensemble.inject_failure(id, ErrorCode::ConnectionLoss);
        let data = runner.run("/", |zk| zk.get_data("/", false)).unwrap();
        assert_eq!(data, Some(Vec::new()));
        assert_eq!(session.session_id(), Some(id));
        session.close();
    }

    #[test]
    fn node_exists_counts_as_success() {
        let ensemble = MemoryEnsemble::new();
        let (runner, session) = runner(&ensemble, false);
        let acl = vec![Acl::open_unsafe()];
        runner
            .run("/dir", |zk| {
                zk.create("/dir", &[], &acl, CreateMode::Persistent)
            })
            .unwrap();
        let second = runner
            .run("/dir", |zk| {
                zk.create("/dir", &[], &acl, CreateMode::Persistent)
            })
            .unwrap();
        assert!(second.is_none());
        session.close();
    }

    #[test]
    fn session_loss_reconnects_before_retrying() {
        let ensemble = MemoryEnsemble::new();
        let (runner, session) = runner(&ensemble, false);
        let id = session.session_id().unwrap();
        ensemble.inject_failure(id, ErrorCode::SessionMoved);
        let children = runner.run("/", |zk| zk.get_children("/", false)).unwrap();
        assert_eq!(children, Some(Vec::new()));
        session.close();
    }

    #[test]
    fn no_auth_is_terminal_under_ha_only() {
        let ensemble = MemoryEnsemble::new();
        let (runner, session) = runner(&ensemble, true);
        let id = session.session_id().unwrap();
        ensemble.inject_failure(id, ErrorCode::NoAuth);
        let err = runner
            .run("/", |zk| zk.get_data("/", false))
            .unwrap_err();
        assert!(matches!(err, StoreError::Fenced));
        assert_eq!(
            session.state(),
            crate::coordination::session::SessionState::Fenced
        );
        session.close();
    }

    #[test]
    fn other_errors_exhaust_the_budget_then_surface() {
        let ensemble = MemoryEnsemble::new();
        let (runner, session) = runner(&ensemble, false);
        let err = runner
            .run("/missing", |zk| zk.get_data("/missing", false))
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Coordination {
                code: ErrorCode::NoNode,
                attempts: 5,
            }
        ));
        session.close();
    }
}
