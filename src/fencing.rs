//! Fencing: exclusive create-delete authority on the root znode, the fenced
//! multi wrapping every mutation, and the background prober that keeps
//! re-asserting authority.
//!
//! The fence works because `multi` is atomic: every mutation creates and
//! deletes the fencing lock around its real ops in one transaction. A peer
//! that lost the ACL race fails the whole multi with `NoAuth` (or
//! `NodeExists` while both still race for the lock) and none of its data
//! changes become observable.

use crate::coordination::{digest_identity, Acl, CreateMode, Op, CREATE_DELETE_PERMS};
use crate::error::StoreError;
use log::{info, warn};
use parking_lot::{Condvar, Mutex};
use rand::{thread_rng, Rng};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Fresh random password for the controller's digest credential; generated
/// once per activation and never persisted.
pub fn generate_fencing_password() -> String {
    thread_rng().gen::<i64>().to_string()
}

/// Digest identity for `controller_id:password`, suitable for an ACL entry.
pub fn fencing_identity(controller_id: &str, password: &str) -> String {
    digest_identity(&format!("{controller_id}:{password}"))
}

/// Builds the root-node ACL for the live controller: every source principal
/// keeps its permissions minus create-delete, and the controller's digest
/// identity alone receives exactly create-delete.
pub fn construct_root_node_acl(source: &[Acl], controller_digest_id: &str) -> Vec<Acl> {
    let mut acl: Vec<Acl> = source
        .iter()
        .map(|entry| entry.without_perms(CREATE_DELETE_PERMS))
        .collect();
    acl.push(Acl::digest(controller_digest_id, CREATE_DELETE_PERMS));
    acl
}

/// Pre-built create/delete ops for the fencing lock.
#[derive(Clone)]
pub struct FencingOps {
    create_lock: Op,
    delete_lock: Op,
}

impl FencingOps {
    pub fn new(fencing_lock_path: &str, acl: &[Acl]) -> Self {
        Self {
            create_lock: Op::create(
                fencing_lock_path,
                Vec::new(),
                acl.to_vec(),
                CreateMode::Persistent,
            ),
            delete_lock: Op::delete(fencing_lock_path, -1),
        }
    }

    pub fn delete_lock_op(&self) -> Op {
        self.delete_lock.clone()
    }

    /// Wraps `ops` in the fencing-lock create/delete pair. An empty list is
    /// the liveness probe.
    pub fn fenced(&self, ops: Vec<Op>) -> Vec<Op> {
        let mut wrapped = Vec::with_capacity(ops.len() + 2);
        wrapped.push(self.create_lock.clone());
        wrapped.extend(ops);
        wrapped.push(self.delete_lock.clone());
        wrapped
    }
}

struct ProbeStop {
    stopped: Mutex<bool>,
    wake: Condvar,
}

/// Periodically runs the empty fenced multi to prove this controller still
/// holds authority; any failure reports a fencing loss and the prober exits.
pub struct ActiveStatusProber {
    shutdown: Arc<ProbeStop>,
    join: Option<thread::JoinHandle<()>>,
}

impl ActiveStatusProber {
    pub fn spawn(
        interval: Duration,
        probe: impl Fn() -> Result<(), StoreError> + Send + 'static,
        on_failure: impl FnOnce(StoreError) + Send + 'static,
    ) -> Self {
        let shutdown = Arc::new(ProbeStop {
            stopped: Mutex::new(false),
            wake: Condvar::new(),
        });
        let shared = shutdown.clone();
        let join = thread::spawn(move || {
            let mut on_failure = Some(on_failure);
            loop {
                if let Err(err) = probe() {
                    warn!("active status probe failed: {err}");
                    if let Some(report) = on_failure.take() {
                        report(err);
                    }
                    break;
                }
                let mut stopped = shared.stopped.lock();
                if *stopped {
                    break;
                }
                let _ = shared.wake.wait_for(&mut stopped, interval);
                if *stopped {
                    break;
                }
            }
            info!("active status prober exiting");
        });
        Self {
            shutdown,
            join: Some(join),
        }
    }

    /// Interrupts the probe sleep and joins the thread. An in-flight probe
    /// finishes first; its duration is bounded by the retry budget.
    pub fn stop(&mut self) {
        *self.shutdown.stopped.lock() = true;
        self.shutdown.wake.notify_all();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for ActiveStatusProber {
    fn drop(&mut self) {
        self.stop();
    }
}
