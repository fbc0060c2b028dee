//! Single-flight scale-task executor.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info, warn};

use elastikv_cluster::ClusterBackend;
use elastikv_core::FleetConfig;

/// A queued scaling request: signed node-count delta plus whether the
/// delta is subject to the max-step clamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleTask {
    pub delta: i32,
    pub limited: bool,
}

/// Executes scale tasks against the cluster backend, one at a time.
///
/// The actuator owns the cluster-size bookkeeping: the active node count
/// lives here and is only readable from the outside. Tasks are drained
/// in FIFO order by a single worker; starting a second worker is a no-op
/// detected by a compare-and-set on the rebalancing flag.
pub struct Actuator {
    cfg: FleetConfig,
    cluster: Arc<dyn ClusterBackend>,
    queue: Mutex<VecDeque<ScaleTask>>,
    /// True exactly while a worker is executing tasks.
    rebalancing: AtomicBool,
    /// Current active node count according to our bookkeeping.
    active_nodes: AtomicU32,
}

impl Actuator {
    pub fn new(cfg: FleetConfig, cluster: Arc<dyn ClusterBackend>, initial_nodes: u32) -> Self {
        Self {
            cfg,
            cluster,
            queue: Mutex::new(VecDeque::new()),
            rebalancing: AtomicBool::new(false),
            active_nodes: AtomicU32::new(initial_nodes),
        }
    }

    /// Enqueue a scale task.
    ///
    /// The task is queued unconditionally. The return value is advisory:
    /// `false` means a rebalance is currently executing, so the caller
    /// should not expect the task to run immediately — not that it was
    /// dropped.
    pub fn schedule(&self, delta: i32, limited: bool) -> bool {
        self.queue
            .lock()
            .expect("actuator queue lock")
            .push_back(ScaleTask { delta, limited });
        if self.rebalancing.load(Ordering::SeqCst) {
            warn!(delta, "scale task queued while a rebalance is executing");
            false
        } else {
            debug!(delta, limited, "scale task queued");
            true
        }
    }

    /// Point-in-time read of the rebalancing flag.
    pub fn is_rebalancing(&self) -> bool {
        self.rebalancing.load(Ordering::SeqCst)
    }

    /// Active node count according to the actuator's bookkeeping.
    pub fn active_nodes(&self) -> u32 {
        self.active_nodes.load(Ordering::SeqCst)
    }

    pub fn min_nodes(&self) -> u32 {
        self.cfg.min_nodes
    }

    pub fn provisions_nodes(&self) -> bool {
        self.cfg.provision_nodes
    }

    /// Number of tasks waiting in the queue.
    pub fn queue_len(&self) -> usize {
        self.queue.lock().expect("actuator queue lock").len()
    }

    /// Start the worker if there is work and no worker is running.
    ///
    /// Returns the worker's join handle when one was started. The worker
    /// runs on the blocking pool because every backend call blocks by
    /// contract.
    pub fn pump(self: &Arc<Self>) -> Option<tokio::task::JoinHandle<()>> {
        if self.queue.lock().expect("actuator queue lock").is_empty() {
            return None;
        }
        if self
            .rebalancing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // The running worker will drain whatever we just saw queued.
            return None;
        }
        let this = Arc::clone(self);
        Some(tokio::task::spawn_blocking(move || this.run_worker()))
    }

    /// Pop the next task, clearing the rebalancing flag atomically with
    /// the empty check so a concurrent `schedule` never strands a task.
    fn next_task(&self) -> Option<ScaleTask> {
        let mut queue = self.queue.lock().expect("actuator queue lock");
        match queue.pop_front() {
            Some(task) => Some(task),
            None => {
                self.rebalancing.store(false, Ordering::SeqCst);
                None
            }
        }
    }

    fn run_worker(&self) {
        while let Some(task) = self.next_task() {
            let proceed = if task.delta > 0 {
                self.grow(task)
            } else if task.delta < 0 {
                self.shrink(task)
            } else {
                true
            };
            if !proceed {
                return;
            }
            // Let the cluster stabilize before evaluating further tasks.
            std::thread::sleep(self.cfg.post_rebalance_settle());
        }
    }

    /// Add nodes and rebalance onto them. Returns `false` when the
    /// clamped delta degenerated to a no-op and the worker should exit.
    fn grow(&self, task: ScaleTask) -> bool {
        let active = self.active_nodes() as i64;
        let mut delta = task.delta as i64;

        if task.limited && delta > self.cfg.max_step as i64 {
            delta = self.cfg.max_step as i64;
        }
        if active + delta > self.cfg.max_nodes as i64 {
            delta = self.cfg.max_nodes as i64 - active;
        }
        if delta <= 0 {
            info!(active, "already at the upper bound, nothing to add");
            self.rebalancing.store(false, Ordering::SeqCst);
            return false;
        }

        let target = (active + delta) as u32;
        self.active_nodes.store(target, Ordering::SeqCst);
        info!(from = active, to = target, "scaling up");

        if self.cfg.provision_nodes {
            if let Err(e) = self.cluster.request_nodes(delta as u32) {
                error!(error = %e, "node provisioning failed");
            }
            // The nodes report ready before their storage service is
            // actually reachable; give them time to come up.
            std::thread::sleep(self.cfg.node_settle());
        }

        self.rebalance(target);
        true
    }

    /// Remove nodes after rebalancing data off them. Returns `false`
    /// when the clamped delta degenerated to a no-op.
    fn shrink(&self, task: ScaleTask) -> bool {
        let active = self.active_nodes() as i64;
        if active <= self.cfg.min_nodes as i64 {
            info!(active, "already at the lower bound, nothing to remove");
            return true;
        }

        let mut delta = task.delta as i64;
        if active + delta < self.cfg.min_nodes as i64 {
            delta = self.cfg.min_nodes as i64 - active;
        }
        if task.limited && delta < -(self.cfg.max_step as i64) {
            delta = -(self.cfg.max_step as i64);
        }
        if delta >= 0 {
            self.rebalancing.store(false, Ordering::SeqCst);
            return false;
        }

        let target = (active + delta) as u32;
        self.active_nodes.store(target, Ordering::SeqCst);
        info!(from = active, to = target, "scaling down");

        // Move data off the excess nodes before touching them.
        self.rebalance(target);

        if self.cfg.provision_nodes {
            // Highest slot first, paced so the control plane is not
            // overwhelmed by deletions.
            for index in (target..active as u32).rev() {
                if let Err(e) = self.cluster.decommission_node(index) {
                    error!(index, error = %e, "decommission failed");
                }
                std::thread::sleep(self.cfg.decommission_delay());
            }
        }
        true
    }

    /// Trigger the external rebalance. Failures are logged and swallowed:
    /// the bookkeeping is not rolled back, the engine's inconsistency
    /// check is the safety net.
    fn rebalance(&self, target: u32) {
        match self.cluster.trigger_rebalance(target) {
            Ok(elapsed) => {
                info!(target, elapsed_secs = elapsed.as_secs(), "rebalance finished");
            }
            Err(e) => {
                error!(target, error = %e, "rebalance failed");
            }
        }
    }
}
