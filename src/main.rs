// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use nodeporter::client::{make_client, ResourceClient};
use nodeporter::config::Config;
use nodeporter::informer::PodInformer;
use nodeporter::reconciler::Reconciler;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    info!("Starting nodeporter");

    // Load configuration
    let config = Config::from_env()?;

    // Create Kubernetes client
    let client = make_client(&config).await?;
    info!("Connected to Kubernetes cluster");

    let resources = ResourceClient::new(client.clone());

    let namespaces = resources.list_namespaces().await?;
    info!("Available namespaces: {:?}", namespaces);

    let pods = resources.list_pods_by_label(&config.label_selector).await?;
    info!("Pods matching {}: {:?}", config.label_selector, pods);

    // Watch pods and expose owned ones through NodePort services
    let mut informer = match &config.watch_namespace {
        Some(ns) => PodInformer::namespaced(client, ns),
        None => PodInformer::cluster_wide(client),
    };
    informer.subscribe(Arc::new(Reconciler::new(resources, config.target_node_port)));

    let handle = informer.start(config.resync_interval);
    handle.wait_for_sync(config.sync_timeout).await?;
    info!("Initial pod sync complete, reconciling pod events");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    handle.stop();
    handle.join().await?;

    Ok(())
}
