//! Hosting control loop.
//!
//! Consumes watch events, drops the ones whose revision did not change and
//! runs reconciliations. At most one reconciliation per identity is in
//! flight; events arriving meanwhile collapse into a single follow-up run.
//! Failures requeue the identity with exponential backoff.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::ControllerConfig;
use crate::error::ReconcileError;
use crate::fetch::BackoffPolicy;
use crate::predicate::{RevisionChangePredicate, WatchEvent};
use crate::reconcile::{Action, Reconciler};
use crate::types::ObjectRef;

/// A unit of reconciliation the controller can drive.
#[async_trait]
pub trait Reconcile: Send + Sync + 'static {
    async fn reconcile(
        &self,
        object: &ObjectRef,
        cancel: &CancellationToken,
    ) -> Result<Action, ReconcileError>;
}

#[async_trait]
impl Reconcile for Reconciler {
    async fn reconcile(
        &self,
        object: &ObjectRef,
        cancel: &CancellationToken,
    ) -> Result<Action, ReconcileError> {
        Reconciler::reconcile(self, object, cancel).await
    }
}

/// Requeue delay after consecutive failures of one identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequeuePolicy {
    pub base: Duration,
    pub max: Duration,
}

impl RequeuePolicy {
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self {
            base: Duration::from_millis(config.requeue_base_ms),
            max: Duration::from_millis(config.requeue_max_ms),
        }
    }
}

impl Default for RequeuePolicy {
    fn default() -> Self {
        Self::from_config(&ControllerConfig::default())
    }
}

impl BackoffPolicy for RequeuePolicy {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }
}

type Outcome = Result<Result<Action, ReconcileError>, JoinError>;

pub struct Controller<R: Reconcile> {
    reconciler: Arc<R>,
    predicate: RevisionChangePredicate,
    requeue: RequeuePolicy,
}

impl<R: Reconcile> Controller<R> {
    pub fn new(reconciler: Arc<R>, requeue: RequeuePolicy) -> Self {
        Self {
            reconciler,
            predicate: RevisionChangePredicate,
            requeue,
        }
    }

    /// Process events until `cancel` fires or the stream closes.
    ///
    /// After the stream closes, in-flight work and queued follow-ups are
    /// drained; pending requeues are dropped. On cancellation, running
    /// reconciliations observe the same token and are awaited.
    pub async fn run(self, mut events: mpsc::Receiver<WatchEvent>, cancel: CancellationToken) {
        let (requeue_tx, mut requeue_rx) = mpsc::unbounded_channel();
        let mut queue = WorkQueue {
            reconciler: self.reconciler,
            requeue: self.requeue,
            cancel: cancel.clone(),
            requeue_tx,
            in_flight: HashSet::new(),
            pending: HashSet::new(),
            failures: HashMap::new(),
            tasks: JoinSet::new(),
        };
        let mut events_open = true;

        info!("controller started");
        loop {
            if !events_open && queue.tasks.is_empty() {
                break;
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv(), if events_open => match event {
                    Some(event) => {
                        let object = event.object_ref();
                        if self.predicate.admit(&event) {
                            queue.enqueue(object);
                        } else {
                            debug!(object = %object, "revision unchanged, event dropped");
                        }
                    }
                    None => {
                        debug!("event stream closed, draining");
                        events_open = false;
                    }
                },
                Some(object) = requeue_rx.recv(), if events_open => queue.enqueue(object),
                Some(joined) = queue.tasks.join_next(), if !queue.tasks.is_empty() => match joined {
                    Ok((object, outcome)) => queue.complete(object, outcome),
                    Err(err) => error!(error = %err, "reconcile supervisor task failed"),
                },
            }
        }

        while queue.tasks.join_next().await.is_some() {}
        info!("controller stopped");
    }
}

struct WorkQueue<R: Reconcile> {
    reconciler: Arc<R>,
    requeue: RequeuePolicy,
    cancel: CancellationToken,
    requeue_tx: mpsc::UnboundedSender<ObjectRef>,
    in_flight: HashSet<ObjectRef>,
    /// Identities that changed while a reconciliation was running
    pending: HashSet<ObjectRef>,
    failures: HashMap<ObjectRef, u32>,
    tasks: JoinSet<(ObjectRef, Outcome)>,
}

impl<R: Reconcile> WorkQueue<R> {
    fn enqueue(&mut self, object: ObjectRef) {
        if self.in_flight.contains(&object) {
            debug!(object = %object, "reconciliation in flight, coalescing");
            self.pending.insert(object);
        } else {
            self.start(object);
        }
    }

    fn start(&mut self, object: ObjectRef) {
        self.in_flight.insert(object.clone());
        let reconciler = self.reconciler.clone();
        let cancel = self.cancel.clone();
        let key = object.clone();
        // The inner task isolates panics so the identity is always released.
        self.tasks.spawn(async move {
            let handle =
                tokio::spawn(async move { reconciler.reconcile(&key, &cancel).await });
            (object, handle.await)
        });
    }

    fn complete(&mut self, object: ObjectRef, outcome: Outcome) {
        self.in_flight.remove(&object);

        match outcome {
            Ok(Ok(Action::AwaitChange)) => {
                self.failures.remove(&object);
            }
            Ok(Ok(Action::RequeueAfter(delay))) => {
                self.failures.remove(&object);
                self.requeue_after(object.clone(), delay);
            }
            Ok(Err(ReconcileError::Cancelled)) => {
                debug!(object = %object, "reconciliation cancelled");
            }
            Ok(Err(err)) => self.failed(&object, &err),
            Err(err) => self.failed(&object, &err),
        }

        if self.pending.remove(&object) {
            self.start(object);
        }
    }

    fn failed(&mut self, object: &ObjectRef, err: &dyn std::error::Error) {
        let attempt = self.failures.entry(object.clone()).or_insert(0);
        *attempt = attempt.saturating_add(1);
        let delay = self.requeue.delay_for_attempt(*attempt);
        error!(
            object = %object,
            error = %err,
            attempt = *attempt,
            requeue_in_ms = delay.as_millis() as u64,
            "reconciliation failed"
        );
        self.requeue_after(object.clone(), delay);
    }

    fn requeue_after(&self, object: ObjectRef, delay: Duration) {
        let tx = self.requeue_tx.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(object);
                }
            }
        });
    }
}
