// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Labels attached to every pod and service managed by nodeporter
pub mod labels {
    /// Marks a resource as managed by nodeporter; the reconciler ignores
    /// pods without it
    pub const OWNER_KEY: &str = "created-by";
    pub const OWNER_VALUE: &str = "nodeporter";
    /// Carries the pod name; a service selects its pod through this label
    pub const NAME_KEY: &str = "name";
}

/// Fixed single-container template used when creating pods
pub mod pod_template {
    pub const CONTAINER_NAME: &str = "web";
    pub const CONTAINER_IMAGE: &str = "nginx:1.12";
    pub const CONTAINER_PORT: i32 = 80;
    pub const PORT_NAME: &str = "http";
}

/// Watch behaviour
pub mod watch {
    /// Consecutive stream failures tolerated before the informer gives up
    pub const MAX_CONSECUTIVE_FAILURES: u32 = 8;
}

/// NodePort requested when exposing a pod; the control plane may allocate
/// a different one
pub const DEFAULT_NODE_PORT: i32 = 30000;
