//! Controller runtime
//!
//! Wires store watches to per-controller work queues and drives a pool of
//! workers that call the controller's [`Reconciler`] for each queued key.
//! Controllers are built from an explicit list of constructors passed to
//! [`run`].

pub mod queue;

pub use queue::WorkQueue;

use async_trait::async_trait;
use kiln_core::Kind;
use kiln_core::domain::meta::{LabelSelector, ObjectKey};
use kiln_store::{ObjectStore, WatchEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::Config;
use crate::error::ReconcileError;

/// What the runtime should do with a key after a successful reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Done,
    RequeueAfter(Duration),
}

#[async_trait]
pub trait Reconciler: Send + Sync {
    async fn reconcile(&self, key: &ObjectKey) -> Result<Action, ReconcileError>;
}

/// Maps a watch event to the keys it should enqueue; an empty result
/// filters the event out
pub type KeyMapper = Box<dyn Fn(&WatchEvent) -> Vec<ObjectKey> + Send + Sync>;

/// One watched kind of a controller
pub struct Watch {
    pub kind: Kind,
    pub mapper: KeyMapper,
}

impl Watch {
    pub fn new(
        kind: Kind,
        mapper: impl Fn(&WatchEvent) -> Vec<ObjectKey> + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            mapper: Box::new(mapper),
        }
    }
}

/// A reconciler plus the watches feeding its queue
pub struct Controller {
    pub name: &'static str,
    pub reconciler: Arc<dyn Reconciler>,
    pub watches: Vec<Watch>,
    pub workers: usize,
}

/// Builds a controller from the shared configuration and store
pub type ControllerConstructor = fn(&Config, Arc<dyn ObjectStore>) -> Controller;

/// Starts every controller and runs them until `shutdown` flips to true
pub async fn run(
    config: &Config,
    store: Arc<dyn ObjectStore>,
    constructors: &[ControllerConstructor],
    shutdown: watch::Receiver<bool>,
) {
    let controllers = constructors
        .iter()
        .map(|construct| construct(config, Arc::clone(&store)))
        .collect();
    run_controllers(config, store, controllers, shutdown).await;
}

/// Runs already constructed controllers until `shutdown` flips to true
pub async fn run_controllers(
    config: &Config,
    store: Arc<dyn ObjectStore>,
    controllers: Vec<Controller>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut queues = Vec::new();
    let mut watchers = Vec::new();
    let mut workers = Vec::new();

    for controller in controllers {
        let queue = WorkQueue::new(config.queue_base_delay, config.queue_max_delay);
        info!(
            controller = controller.name,
            workers = controller.workers,
            "Starting controller"
        );

        for watch in controller.watches {
            watchers.push(spawn_watch(
                Arc::clone(&store),
                watch,
                queue.clone(),
                shutdown.clone(),
            ));
        }

        for _ in 0..controller.workers.max(1) {
            workers.push(spawn_worker(
                controller.name,
                Arc::clone(&controller.reconciler),
                queue.clone(),
                config.ctx_timeout,
            ));
        }

        queues.push(queue);
    }

    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            break;
        }
    }

    info!("Shutting down controllers");
    for queue in &queues {
        if !queue.is_empty() {
            debug!(pending = queue.len(), "Dropping queued keys");
        }
        queue.shut_down();
    }
    for handle in watchers {
        handle.abort();
    }
    for handle in workers {
        if let Err(e) = handle.await {
            warn!("Worker task panicked: {}", e);
        }
    }
}

fn spawn_watch(
    store: Arc<dyn ObjectStore>,
    watch: Watch,
    queue: WorkQueue,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        // Subscribe before listing so no change falls between the two
        let mut events = store.watch(watch.kind);
        relist(store.as_ref(), &watch, &queue).await;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                received = events.recv() => match received {
                    Ok(event) => {
                        for key in (watch.mapper)(&event) {
                            queue.add(key);
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(kind = %watch.kind, missed, "Watch lagged, relisting");
                        relist(store.as_ref(), &watch, &queue).await;
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        debug!(kind = %watch.kind, "Watch stopped");
    })
}

/// Replays every stored object of the watched kind as an `Added` event
async fn relist(store: &dyn ObjectStore, watch: &Watch, queue: &WorkQueue) {
    match store.list(watch.kind, None, &LabelSelector::new()).await {
        Ok(objects) => {
            for object in objects {
                for key in (watch.mapper)(&WatchEvent::Added(object)) {
                    queue.add(key);
                }
            }
        }
        Err(e) => error!(kind = %watch.kind, "Failed to list objects: {}", e),
    }
}

fn spawn_worker(
    name: &'static str,
    reconciler: Arc<dyn Reconciler>,
    queue: WorkQueue,
    ctx_timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(key) = queue.next().await {
            let span = info_span!("reconcile", controller = name, key = %key);
            let result = tokio::time::timeout(ctx_timeout, reconciler.reconcile(&key))
                .instrument(span.clone())
                .await
                .unwrap_or(Err(ReconcileError::Timeout(ctx_timeout)));

            span.in_scope(|| match result {
                Ok(Action::Done) => {
                    debug!("Reconciled");
                    queue.forget(&key);
                }
                Ok(Action::RequeueAfter(delay)) => {
                    debug!(?delay, "Reconciled, requeue scheduled");
                    queue.forget(&key);
                    queue.add_after(key.clone(), delay);
                }
                Err(e) => {
                    queue.add_rate_limited(key.clone());
                    warn!(
                        reason = e.reason(),
                        failures = queue.failures(&key),
                        "Reconcile failed: {}",
                        e
                    );
                }
            });
            queue.done(&key);
        }
    })
}
