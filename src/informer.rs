// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! List-then-watch pod event feed with synchronous handler dispatch.
//!
//! The informer performs a full pod listing, delivers it to subscribers as
//! synthetic Added events, then streams incremental changes. Transient
//! stream errors are retried internally with backoff and never reach
//! subscribers; a full re-list is forced periodically to heal from missed
//! events.

use crate::constants::watch as watch_limits;
use crate::error::{NodeporterError, Result};
use futures::future::BoxFuture;
use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, ResourceExt};
use kube_runtime::watcher::Config as WatcherConfig;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// A strongly typed pod change notification
#[derive(Clone, Debug)]
pub enum PodEvent {
    Added(Pod),
    Updated(Pod),
    Deleted(Pod),
}

/// Subscriber callbacks, invoked one event at a time by the informer's
/// dispatch loop. A slow handler delays delivery of subsequent events.
pub trait PodEventHandler: Send + Sync {
    fn on_added(&self, pod: Pod) -> BoxFuture<'_, ()>;

    fn on_updated(&self, _pod: Pod) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }

    fn on_deleted(&self, pod: Pod) -> BoxFuture<'_, ()>;
}

/// Local view of pod state, fed by the watcher stream. Owned exclusively
/// by the dispatch loop; handlers never mutate it.
///
/// Every listing (initial or forced re-list) is delivered as synthetic
/// Added events, so subscribers must be idempotent. Pods that vanished
/// between re-lists are delivered as Deleted with their last-known
/// snapshot.
#[derive(Default)]
struct PodView {
    pods: HashMap<(String, String), Pod>,
    /// Buffer for an in-progress re-list; replaces `pods` once complete
    relist: Option<HashMap<(String, String), Pod>>,
}

impl PodView {
    fn apply(&mut self, event: watcher::Event<Pod>) -> Vec<PodEvent> {
        match event {
            watcher::Event::Init => {
                self.relist = Some(HashMap::new());
                Vec::new()
            }
            watcher::Event::InitApply(pod) => {
                if let (Some(key), Some(relist)) = (pod_key(&pod), self.relist.as_mut()) {
                    relist.insert(key, pod.clone());
                }
                vec![PodEvent::Added(pod)]
            }
            watcher::Event::InitDone => {
                let Some(relist) = self.relist.take() else {
                    return Vec::new();
                };
                let vanished = self
                    .pods
                    .iter()
                    .filter(|(key, _)| !relist.contains_key(*key))
                    .map(|(_, pod)| PodEvent::Deleted(pod.clone()))
                    .collect();
                self.pods = relist;
                vanished
            }
            watcher::Event::Apply(pod) => {
                let Some(key) = pod_key(&pod) else {
                    return Vec::new();
                };
                match self.pods.insert(key, pod.clone()) {
                    Some(_) => vec![PodEvent::Updated(pod)],
                    None => vec![PodEvent::Added(pod)],
                }
            }
            watcher::Event::Delete(pod) => {
                if let Some(key) = pod_key(&pod) {
                    self.pods.remove(&key);
                }
                vec![PodEvent::Deleted(pod)]
            }
        }
    }
}

fn pod_key(pod: &Pod) -> Option<(String, String)> {
    let name = pod.metadata.name.clone()?;
    Some((pod.namespace().unwrap_or_default(), name))
}

/// Watches pods and dispatches change events to registered handlers, in
/// registration order, one event at a time
pub struct PodInformer {
    api: Api<Pod>,
    handlers: Vec<Arc<dyn PodEventHandler>>,
}

impl PodInformer {
    /// Watch pods across the whole cluster
    pub fn cluster_wide(client: Client) -> Self {
        Self {
            api: Api::all(client),
            handlers: Vec::new(),
        }
    }

    /// Watch pods in a single namespace
    pub fn namespaced(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            handlers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, handler: Arc<dyn PodEventHandler>) {
        self.handlers.push(handler);
    }

    /// Start the dispatch loop on a background task. A full re-list is
    /// forced every `resync_interval`.
    pub fn start(self, resync_interval: Duration) -> InformerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (synced_tx, synced_rx) = watch::channel(false);
        let task = tokio::spawn(run_informer(
            self.api,
            self.handlers,
            resync_interval,
            synced_tx,
            stop_rx,
        ));

        InformerHandle {
            stop_tx,
            synced_rx,
            task,
        }
    }
}

/// Handle to a running informer. Dropping it stops the dispatch loop.
pub struct InformerHandle {
    stop_tx: watch::Sender<bool>,
    synced_rx: watch::Receiver<bool>,
    task: JoinHandle<Result<()>>,
}

impl InformerHandle {
    /// Block until the initial listing has completed and been delivered to
    /// all handlers
    pub async fn wait_for_sync(&self, timeout: Duration) -> Result<()> {
        let mut synced = self.synced_rx.clone();
        let result = match tokio::time::timeout(timeout, synced.wait_for(|s| *s)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(NodeporterError::WatchClosed(
                "informer stopped before the initial sync completed".to_string(),
            )),
            Err(_) => Err(NodeporterError::SyncTimeout(timeout)),
        };
        result
    }

    /// Request the dispatch loop to stop. Idempotent and safe to call from
    /// any task; an in-flight handler invocation is allowed to complete.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    /// Wait for the dispatch loop to terminate. Returns `WatchClosed` if
    /// the informer gave up re-establishing the stream.
    pub async fn join(self) -> Result<()> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(NodeporterError::WatchClosed(format!(
                "informer task failed: {}",
                e
            ))),
        }
    }
}

#[derive(Debug)]
enum StreamEnd {
    Stopped,
    Resync,
    Ended,
}

async fn run_informer(
    api: Api<Pod>,
    handlers: Vec<Arc<dyn PodEventHandler>>,
    resync_interval: Duration,
    synced_tx: watch::Sender<bool>,
    mut stop_rx: watch::Receiver<bool>,
) -> Result<()> {
    let mut view = PodView::default();
    let mut failures = 0u32;

    loop {
        let stream = watcher(api.clone(), WatcherConfig::default())
            .default_backoff()
            .boxed();
        let deadline = Instant::now() + resync_interval;

        match drive_stream(
            stream,
            &handlers,
            &mut view,
            &synced_tx,
            &mut stop_rx,
            deadline,
            &mut failures,
        )
        .await?
        {
            StreamEnd::Stopped => {
                debug!("Pod informer stopped");
                return Ok(());
            }
            StreamEnd::Resync => debug!("Forcing pod re-list after resync interval"),
            StreamEnd::Ended => debug!("Watch stream ended, re-establishing"),
        }
    }
}

/// Drain one watcher stream until it ends, the resync deadline passes, or
/// a stop is requested. All event delivery happens here, one event at a
/// time on this task.
async fn drive_stream<S>(
    mut stream: S,
    handlers: &[Arc<dyn PodEventHandler>],
    view: &mut PodView,
    synced_tx: &watch::Sender<bool>,
    stop_rx: &mut watch::Receiver<bool>,
    deadline: Instant,
    failures: &mut u32,
) -> Result<StreamEnd>
where
    S: Stream<Item = std::result::Result<watcher::Event<Pod>, watcher::Error>> + Unpin,
{
    loop {
        tokio::select! {
            // Stop must win over a ready stream event so that no further
            // events are delivered once stop() has been observed
            biased;
            // An Err return means the handle was dropped, which also stops us.
            // The watch::Ref guard is dropped inside the arm's future so the
            // select output stays Send.
            _ = async { stop_rx.wait_for(|stopped| *stopped).await.map(|_| ()) } => return Ok(StreamEnd::Stopped),
            _ = tokio::time::sleep_until(deadline) => return Ok(StreamEnd::Resync),
            item = stream.next() => match item {
                None => return Ok(StreamEnd::Ended),
                Some(Err(err)) => {
                    *failures += 1;
                    if *failures >= watch_limits::MAX_CONSECUTIVE_FAILURES {
                        return Err(NodeporterError::WatchClosed(err.to_string()));
                    }
                    warn!("Pod watch error ({} consecutive): {}", failures, err);
                }
                Some(Ok(event)) => {
                    *failures = 0;
                    let init_done = matches!(event, watcher::Event::InitDone);
                    for pod_event in view.apply(event) {
                        dispatch(handlers, pod_event).await;
                    }
                    // The listing counts as synced only once it has been
                    // delivered to every handler
                    if init_done {
                        synced_tx.send_replace(true);
                    }
                }
            }
        }
    }
}

async fn dispatch(handlers: &[Arc<dyn PodEventHandler>], event: PodEvent) {
    for handler in handlers {
        match &event {
            PodEvent::Added(pod) => handler.on_added(pod.clone()).await,
            PodEvent::Updated(pod) => handler.on_updated(pod.clone()).await,
            PodEvent::Deleted(pod) => handler.on_deleted(pod.clone()).await,
        }
    }
}
