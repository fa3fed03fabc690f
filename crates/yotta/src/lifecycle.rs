//! Per-label pod lifecycle: launch, query, destroy.
//!
//! The manager keeps no state between calls. Every operation starts from a
//! fresh `query_pods` for the label, so retrying any of them after a crash
//! is safe. Concurrent calls for the *same* label are not serialized here.
//!
//! ```text
//!            launch            remote RUNNING
//!   ABSENT ─────────▶ INIT ───────────────────▶ UP
//!     ▲                                          │ TERMINATED / FAILED
//!     │  destroy + empty query                   ▼
//!     └──────────────────────────────────────  STOPPED
//! ```
//!
//! There is no way back from STOPPED to UP; a new launch is required.

use serde::Serialize;
use tracing::{info, warn};

use crate::providers::traits::{
    FailedLaunch, LaunchRequest, PartialLaunchFailure, PodApi, PodRecord, ProvisionerError,
    RemoteState,
};
use crate::ssh::SshKeyProvisioner;
use crate::status::{assess, ClusterState, ClusterStatus, UnknownRemoteState};

/// Cloud name used in unsupported-operation errors.
pub const CLOUD_NAME: &str = "yotta";

/// Result of a successful launch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaunchOutcome {
    /// Cluster label.
    pub cluster_name_label: String,
    /// Pods now backing the label.
    pub pods: Vec<PodRecord>,
    /// True when active pods already existed and nothing was created.
    pub reused: bool,
}

/// Result of querying a label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterReport {
    /// Cluster label.
    pub cluster_name_label: String,
    /// Pods carrying the label.
    pub pods: Vec<PodRecord>,
    /// Aggregated state.
    pub state: ClusterState,
    /// Pods whose remote state was not understood.
    pub warnings: Vec<UnknownRemoteState>,
}

impl ClusterReport {
    /// Canonical status, `None` when absent.
    #[must_use]
    pub fn status(&self) -> Option<ClusterStatus> {
        self.state.status()
    }

    /// Whether no pods carry the label.
    #[must_use]
    pub fn is_absent(&self) -> bool {
        self.state == ClusterState::Absent
    }
}

/// Result of destroying a label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DestroyOutcome {
    /// Cluster label.
    pub cluster_name_label: String,
    /// Pod ids a delete was issued for.
    pub destroyed: Vec<String>,
}

/// Drives launch/query/destroy for cluster labels on top of a [`PodApi`].
#[derive(Debug, Clone)]
pub struct PodLifecycleManager<A> {
    api: A,
    ssh: Option<SshKeyProvisioner>,
}

impl<A: PodApi> PodLifecycleManager<A> {
    /// Create a manager without SSH key provisioning.
    #[must_use]
    pub fn new(api: A) -> Self {
        Self { api, ssh: None }
    }

    /// Ensure and register an SSH key before every launch.
    #[must_use]
    pub fn with_ssh_keys(mut self, ssh: SshKeyProvisioner) -> Self {
        self.ssh = Some(ssh);
        self
    }

    /// Underlying API.
    #[must_use]
    pub fn api(&self) -> &A {
        &self.api
    }

    /// Launch the pods of a cluster, or return the active pods already there.
    ///
    /// Any pod not `TERMINATED` or `FAILED` counts as active. That includes
    /// `PAUSED` pods and pods in unknown states: a label whose pods are
    /// paused is returned as is (`reused`), so the caller destroys it before
    /// launching a fresh cluster under the same label.
    ///
    /// Nodes are created one call at a time and launching stops at the
    /// first failure. Created pods are never rolled back.
    ///
    /// # Errors
    /// - [`ProvisionerError::Validation`] for a malformed request.
    /// - The typed error of the first create when it failed definitively and
    ///   nothing was created.
    /// - [`ProvisionerError::PartialLaunch`] when some pods exist, or a
    ///   create failed in a way that may still have produced a pod.
    pub async fn launch(
        &self,
        mut request: LaunchRequest,
    ) -> Result<LaunchOutcome, ProvisionerError> {
        request.validate()?;
        let label = request.cluster_name_label.clone();

        self.api.check_credentials().await?;

        let active: Vec<PodRecord> = self
            .api
            .query_pods(&label)
            .await?
            .into_iter()
            .filter(|p| !p.remote_state.is_terminal())
            .collect();
        if !active.is_empty() {
            info!(
                cluster = %label,
                count = active.len(),
                "Cluster already has active pods, not launching"
            );
            return Ok(LaunchOutcome {
                cluster_name_label: label,
                pods: active,
                reused: true,
            });
        }

        if let Some(ssh) = &self.ssh {
            let key = ssh.ensure_key(&self.api).await?;
            if request.ssh_public_key.is_none() {
                request.ssh_public_key = Some(key.public_key);
            }
        }

        let names = node_names(&label, request.node_count);
        info!(cluster = %label, nodes = names.len(), "Launching cluster");

        let mut succeeded: Vec<PodRecord> = Vec::new();
        for (index, node_name) in names.iter().enumerate() {
            let mut node_request = request.clone();
            node_request.pod_name = Some(node_name.clone());

            match self.api.launch_pods(&node_request).await {
                Ok(pods) => succeeded.extend(pods),
                Err(e) if succeeded.is_empty() && !e.is_ambiguous() => {
                    warn!(cluster = %label, node = %node_name, error = %e, "Launch failed");
                    return Err(e);
                }
                Err(e) => {
                    let failure = PartialLaunchFailure {
                        cluster_name_label: label.clone(),
                        requested: request.node_count,
                        succeeded,
                        failed: vec![FailedLaunch {
                            node_name: node_name.clone(),
                            reason: e.to_string(),
                        }],
                        not_attempted: names[index + 1..].to_vec(),
                    };
                    warn!(
                        cluster = %label,
                        created = failure.succeeded.len(),
                        requested = failure.requested,
                        error = %e,
                        "Partial launch, leaving created pods in place"
                    );
                    return Err(failure.into());
                }
            }
        }

        info!(cluster = %label, pods = succeeded.len(), "Cluster launched");
        Ok(LaunchOutcome {
            cluster_name_label: label,
            pods: succeeded,
            reused: false,
        })
    }

    /// Fetch the pods of a label and derive the cluster state.
    ///
    /// # Errors
    /// Returns the API error if the pods cannot be listed.
    pub async fn query(
        &self,
        cluster_name_label: &str,
    ) -> Result<ClusterReport, ProvisionerError> {
        let pods = self.api.query_pods(cluster_name_label).await?;
        let assessment = assess(&pods);
        info!(
            cluster = %cluster_name_label,
            pods = pods.len(),
            state = %assessment.state,
            "Queried cluster"
        );
        Ok(ClusterReport {
            cluster_name_label: cluster_name_label.to_string(),
            pods,
            state: assessment.state,
            warnings: assessment.warnings,
        })
    }

    /// Delete every pod of a label. A label without pods is already destroyed.
    ///
    /// # Errors
    /// Returns the API error if listing or deleting fails.
    pub async fn destroy(
        &self,
        cluster_name_label: &str,
    ) -> Result<DestroyOutcome, ProvisionerError> {
        let ids: Vec<String> = self
            .api
            .query_pods(cluster_name_label)
            .await?
            .into_iter()
            .filter(|p| p.remote_state != RemoteState::Terminated)
            .map(|p| p.pod_id)
            .collect();

        if ids.is_empty() {
            info!(cluster = %cluster_name_label, "Nothing to destroy");
        } else {
            self.api.destroy_pods(&ids).await?;
            info!(cluster = %cluster_name_label, pods = ids.len(), "Cluster destroyed");
        }

        Ok(DestroyOutcome {
            cluster_name_label: cluster_name_label.to_string(),
            destroyed: ids,
        })
    }

    /// Pausing is not available on this cloud.
    ///
    /// # Errors
    /// Always returns [`ProvisionerError::UnsupportedOperation`].
    #[allow(clippy::unused_async)]
    pub async fn pause(&self, cluster_name_label: &str) -> Result<(), ProvisionerError> {
        warn!(cluster = %cluster_name_label, "Pause requested but not supported");
        Err(ProvisionerError::UnsupportedOperation {
            operation: "pause",
            cloud: CLOUD_NAME,
        })
    }
}

/// Pod names for a cluster: `<label>-head`, then `<label>-worker1`, ...
fn node_names(label: &str, node_count: u32) -> Vec<String> {
    (0..node_count)
        .map(|i| {
            if i == 0 {
                format!("{label}-head")
            } else {
                format!("{label}-worker{i}")
            }
        })
        .collect()
}
