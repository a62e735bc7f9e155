// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

/// Operator configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to a kubeconfig file; falls back to in-cluster or default
    /// config inference when unset
    pub kubeconfig_path: Option<String>,
    /// Namespace to watch pods in; watches the whole cluster when unset
    pub watch_namespace: Option<String>,
    /// Label selector used for the startup pod listing
    pub label_selector: String,
    /// NodePort requested when exposing a pod
    pub target_node_port: i32,
    /// How often a full pod re-list is forced to heal from missed events
    pub resync_interval: Duration,
    /// How long to wait for the initial pod listing before giving up
    pub sync_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let kubeconfig_path = env::var("KUBECONFIG_PATH").ok();
        let watch_namespace = env::var("WATCH_NAMESPACE").ok().filter(|ns| !ns.is_empty());
        let label_selector =
            env::var("LABEL_SELECTOR").unwrap_or_else(|_| "k8s-app=kube-dns".to_string());

        let target_node_port = env::var("TARGET_NODE_PORT")
            .unwrap_or_else(|_| crate::constants::DEFAULT_NODE_PORT.to_string())
            .parse()
            .context("TARGET_NODE_PORT must be a valid port number")?;

        let resync_interval = Duration::from_secs(
            env::var("RESYNC_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("RESYNC_INTERVAL_SECS must be a number of seconds")?,
        );

        let sync_timeout = Duration::from_secs(
            env::var("SYNC_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("SYNC_TIMEOUT_SECS must be a number of seconds")?,
        );

        Ok(Config {
            kubeconfig_path,
            watch_namespace,
            label_selector,
            target_node_port,
            resync_interval,
            sync_timeout,
        })
    }
}
