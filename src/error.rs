// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NodeporterError {
    #[error("{op} failed: {source}")]
    Api {
        op: &'static str,
        #[source]
        source: kube::Error,
    },

    #[error("Failed to load kubeconfig: {0}")]
    KubeconfigError(String),

    #[error("Malformed API response: {0}")]
    MalformedResponse(String),

    #[error("Initial pod listing did not complete within {0:?}")]
    SyncTimeout(Duration),

    #[error("Pod watch closed: {0}")]
    WatchClosed(String),
}

impl NodeporterError {
    pub(crate) fn api(op: &'static str) -> impl FnOnce(kube::Error) -> Self {
        move |source| Self::Api { op, source }
    }

    /// True if the API call failed because the resource already exists.
    /// Callers repeating an idempotent create may treat this as success.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::Api { source: kube::Error::Api(resp), .. } if resp.code == 409)
    }

    /// True if the API call failed because the resource does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { source: kube::Error::Api(resp), .. } if resp.code == 404)
    }
}

pub type Result<T> = std::result::Result<T, NodeporterError>;
