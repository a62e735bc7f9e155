// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Reconciliation policy: every pod owned by nodeporter gets a NodePort
//! service with the same name, and loses it again when the pod goes away.

use crate::client::ResourceClient;
use crate::constants::labels;
use crate::informer::PodEventHandler;
use futures::future::BoxFuture;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::{debug, error, info};

/// Reacts to pod lifecycle events by creating or deleting the exposing
/// service. A failed exposure is reported and left for the next resync to
/// redeliver; it never takes down the dispatch loop.
pub struct Reconciler {
    resources: ResourceClient,
    node_port: i32,
}

impl Reconciler {
    pub fn new(resources: ResourceClient, node_port: i32) -> Self {
        Self {
            resources,
            node_port,
        }
    }

    /// True if the pod carries the ownership label. The reconciler never
    /// touches pods that are not marked as managed by nodeporter.
    pub fn owns(pod: &Pod) -> bool {
        pod.labels()
            .get(labels::OWNER_KEY)
            .is_some_and(|v| v == labels::OWNER_VALUE)
    }

    async fn handle_added(&self, pod: Pod) {
        if !Self::owns(&pod) {
            return;
        }
        let namespace = pod.namespace().unwrap_or_default();
        let name = pod.name_any();

        match self
            .resources
            .expose_pod_on_node(&namespace, &name, self.node_port)
            .await
        {
            Ok(port) => info!("Exposed pod {}/{} on node port {}", namespace, name, port),
            // Resyncs redeliver Added events for pods that are already
            // exposed; the conflict means the service is in place
            Err(e) if e.is_already_exists() => {
                debug!("Pod {}/{} is already exposed", namespace, name)
            }
            Err(e) => error!(
                "Failed to expose pod {}/{}, leaving it for the next resync: {}",
                namespace, name, e
            ),
        }
    }

    async fn handle_deleted(&self, pod: Pod) {
        if !Self::owns(&pod) {
            return;
        }
        let namespace = pod.namespace().unwrap_or_default();
        let name = pod.name_any();

        match self.resources.delete_service(&namespace, &name).await {
            Ok(()) => info!("Deleted service for pod {}/{}", namespace, name),
            Err(e) if e.is_not_found() => {
                debug!("No service to delete for pod {}/{}", namespace, name)
            }
            Err(e) => error!(
                "Failed to delete service for pod {}/{}: {}",
                namespace, name, e
            ),
        }
    }
}

impl PodEventHandler for Reconciler {
    fn on_added(&self, pod: Pod) -> BoxFuture<'_, ()> {
        Box::pin(self.handle_added(pod))
    }

    fn on_deleted(&self, pod: Pod) -> BoxFuture<'_, ()> {
        Box::pin(self.handle_deleted(pod))
    }
}
