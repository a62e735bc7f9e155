// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Typed CRUD facade over the Kubernetes API for namespaces, pods and
//! services. Pure request/response; no client-side caching and no retries.

use crate::config::Config;
use crate::constants::{labels, pod_template};
use crate::error::{NodeporterError, Result};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, Namespace, Pod, PodSpec, Service, ServicePort, ServiceSpec,
};
use kube::{
    api::{DeleteParams, ListParams, ObjectMeta, PostParams},
    config::{KubeConfigOptions, Kubeconfig},
    Api, Client, ResourceExt,
};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

/// Create a Kubernetes client, from a kubeconfig file if one is configured
pub async fn make_client(config: &Config) -> Result<Client> {
    match &config.kubeconfig_path {
        Some(path) => client_from_kubeconfig(path).await,
        None => Client::try_default()
            .await
            .map_err(NodeporterError::api("client setup")),
    }
}

/// Create a Kubernetes client from a kubeconfig file path
async fn client_from_kubeconfig(path: &str) -> Result<Client> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| NodeporterError::KubeconfigError(format!("Failed to read {}: {}", path, e)))?;

    let kubeconfig: Kubeconfig = serde_yaml::from_str(&raw)
        .map_err(|e| NodeporterError::KubeconfigError(format!("Failed to parse kubeconfig: {}", e)))?;

    let client_config = kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| NodeporterError::KubeconfigError(format!("Failed to create config: {}", e)))?;

    Client::try_from(client_config)
        .map_err(|e| NodeporterError::KubeconfigError(format!("Failed to create client: {}", e)))
}

/// Typed CRUD operations against the cluster. Every failure is returned to
/// the caller; distinguished cases are exposed through
/// [`NodeporterError::is_already_exists`] and [`NodeporterError::is_not_found`].
#[derive(Clone)]
pub struct ResourceClient {
    client: Client,
}

impl ResourceClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// List the names of all namespaces in the cluster
    pub async fn list_namespaces(&self) -> Result<Vec<String>> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let list = namespaces
            .list(&ListParams::default())
            .await
            .map_err(NodeporterError::api("list namespaces"))?;

        Ok(list.items.iter().map(|ns| ns.name_any()).collect())
    }

    #[instrument(skip(self))]
    pub async fn create_namespace(&self, name: &str) -> Result<()> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        namespaces
            .create(&PostParams::default(), &ns)
            .await
            .map_err(NodeporterError::api("create namespace"))?;
        info!("Created namespace {}", name);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_namespace(&self, name: &str) -> Result<()> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        namespaces
            .delete(name, &DeleteParams::default())
            .await
            .map_err(NodeporterError::api("delete namespace"))?;
        info!("Deleted namespace {}", name);
        Ok(())
    }

    /// List pods matching a `key=value` label selector across the whole
    /// cluster, grouped by namespace
    pub async fn list_pods_by_label(&self, selector: &str) -> Result<BTreeMap<String, Vec<String>>> {
        let pods: Api<Pod> = Api::all(self.client.clone());
        let lp = ListParams::default().labels(selector);
        let list = pods
            .list(&lp)
            .await
            .map_err(NodeporterError::api("list pods"))?;

        let mut by_namespace: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for pod in list.items {
            by_namespace
                .entry(pod.namespace().unwrap_or_default())
                .or_default()
                .push(pod.name_any());
        }
        Ok(by_namespace)
    }

    /// Create a pod from the fixed single-container template, labelled as
    /// owned by nodeporter. Returns once the API server accepts the object;
    /// container scheduling happens asynchronously and is not awaited.
    #[instrument(skip(self))]
    pub async fn create_pod(&self, namespace: &str, name: &str) -> Result<()> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(owned_labels(name)),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: pod_template::CONTAINER_NAME.to_string(),
                    image: Some(pod_template::CONTAINER_IMAGE.to_string()),
                    ports: Some(vec![ContainerPort {
                        name: Some(pod_template::PORT_NAME.to_string()),
                        protocol: Some("TCP".to_string()),
                        container_port: pod_template::CONTAINER_PORT,
                        ..Default::default()
                    }]),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        };

        pods.create(&PostParams::default(), &pod)
            .await
            .map_err(NodeporterError::api("create pod"))?;
        info!("Created pod {}/{}", namespace, name);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        pods.delete(name, &DeleteParams::default())
            .await
            .map_err(NodeporterError::api("delete pod"))?;
        info!("Deleted pod {}/{}", namespace, name);
        Ok(())
    }

    /// Expose a pod on every cluster node through a NodePort service named
    /// after the pod, mapping container port 80 to the node port. The
    /// control plane may allocate a different port than the requested one;
    /// the allocated port is returned.
    #[instrument(skip(self))]
    pub async fn expose_pod_on_node(
        &self,
        namespace: &str,
        pod_name: &str,
        node_port: i32,
    ) -> Result<i32> {
        let services: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let service = Service {
            metadata: ObjectMeta {
                // The service shares its pod's name, pairing them 1:1
                name: Some(pod_name.to_string()),
                labels: Some(owned_labels(pod_name)),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                ports: Some(vec![ServicePort {
                    protocol: Some("TCP".to_string()),
                    port: pod_template::CONTAINER_PORT,
                    node_port: Some(node_port),
                    ..Default::default()
                }]),
                selector: Some(BTreeMap::from([(
                    labels::NAME_KEY.to_string(),
                    pod_name.to_string(),
                )])),
                type_: Some("NodePort".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let created = services
            .create(&PostParams::default(), &service)
            .await
            .map_err(NodeporterError::api("create service"))?;

        allocated_node_port(&created)
    }

    #[instrument(skip(self))]
    pub async fn delete_service(&self, namespace: &str, name: &str) -> Result<()> {
        let services: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        services
            .delete(name, &DeleteParams::default())
            .await
            .map_err(NodeporterError::api("delete service"))?;
        debug!("Deleted service {}/{}", namespace, name);
        Ok(())
    }
}

/// Labels shared by pods and their exposing services
fn owned_labels(pod_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (labels::OWNER_KEY.to_string(), labels::OWNER_VALUE.to_string()),
        (labels::NAME_KEY.to_string(), pod_name.to_string()),
    ])
}

fn allocated_node_port(service: &Service) -> Result<i32> {
    service
        .spec
        .as_ref()
        .and_then(|spec| spec.ports.as_ref())
        .and_then(|ports| ports.first())
        .and_then(|port| port.node_port)
        .ok_or_else(|| {
            NodeporterError::MalformedResponse(format!(
                "service {} has no node port",
                service.name_any()
            ))
        })
}
