//! Mapping of remote pod states onto the canonical cluster status.
//!
//! | remote state | cluster status |
//! |---|---|
//! | `INITIALIZE` | `INIT` |
//! | `RUNNING`, `PAUSING`, `TERMINATING` | `UP` |
//! | `PAUSED`, `TERMINATED`, `FAILED` | `STOPPED` |
//! | anything else | `STOPPED`, with a warning |
//!
//! Pausing and terminating pods still hold their resources and answer on
//! their endpoints, so they count as up.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::providers::traits::{PodRecord, RemoteState};

/// Canonical status understood by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterStatus {
    /// Provisioning.
    Init,
    /// Usable.
    Up,
    /// Not usable and will not become usable without a fresh launch.
    Stopped,
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "INIT"),
            Self::Up => write!(f, "UP"),
            Self::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// State of a cluster label as seen by the lifecycle manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterState {
    /// No pods carry the label.
    Absent,
    /// See [`ClusterStatus::Init`].
    Init,
    /// See [`ClusterStatus::Up`].
    Up,
    /// See [`ClusterStatus::Stopped`].
    Stopped,
}

impl ClusterState {
    /// Canonical status, `None` when absent.
    #[must_use]
    pub fn status(self) -> Option<ClusterStatus> {
        match self {
            Self::Absent => None,
            Self::Init => Some(ClusterStatus::Init),
            Self::Up => Some(ClusterStatus::Up),
            Self::Stopped => Some(ClusterStatus::Stopped),
        }
    }
}

impl From<ClusterStatus> for ClusterState {
    fn from(status: ClusterStatus) -> Self {
        match status {
            ClusterStatus::Init => Self::Init,
            ClusterStatus::Up => Self::Up,
            ClusterStatus::Stopped => Self::Stopped,
        }
    }
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "ABSENT"),
            Self::Init => write!(f, "INIT"),
            Self::Up => write!(f, "UP"),
            Self::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// A pod reported a state this client does not understand.
///
/// The pod was counted as stopped; callers should alert on it.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("pod {pod_id} reported unknown remote state '{raw_state}', treated as STOPPED")]
pub struct UnknownRemoteState {
    /// Pod that reported the state.
    pub pod_id: String,
    /// State as received.
    pub raw_state: String,
}

/// Map one remote state to the canonical status.
#[must_use]
pub fn map_remote_state(state: &RemoteState) -> ClusterStatus {
    match state {
        RemoteState::Initialize => ClusterStatus::Init,
        RemoteState::Running | RemoteState::Pausing | RemoteState::Terminating => {
            ClusterStatus::Up
        }
        RemoteState::Paused
        | RemoteState::Terminated
        | RemoteState::Failed
        | RemoteState::Unrecognized(_) => ClusterStatus::Stopped,
    }
}

/// Aggregated status of a pod set plus any warnings raised while mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    /// Cluster state.
    pub state: ClusterState,
    /// Pods whose state could not be understood.
    pub warnings: Vec<UnknownRemoteState>,
}

/// Aggregate the status of every pod carrying a label.
///
/// Any UP pod makes the cluster UP; otherwise any STOPPED pod makes it
/// STOPPED; otherwise it is INIT. No pods means ABSENT.
#[must_use]
pub fn assess(pods: &[PodRecord]) -> Assessment {
    let mut warnings = Vec::new();
    let mut any_up = false;
    let mut any_stopped = false;

    for pod in pods {
        if let RemoteState::Unrecognized(raw) = &pod.remote_state {
            let warning = UnknownRemoteState {
                pod_id: pod.pod_id.clone(),
                raw_state: raw.clone(),
            };
            warn!(
                pod_id = %pod.pod_id,
                cluster = %pod.cluster_name_label,
                raw_state = %raw,
                "Unknown remote pod state, reporting STOPPED"
            );
            warnings.push(warning);
        }

        match map_remote_state(&pod.remote_state) {
            ClusterStatus::Up => any_up = true,
            ClusterStatus::Stopped => any_stopped = true,
            ClusterStatus::Init => {}
        }
    }

    let state = if pods.is_empty() {
        ClusterState::Absent
    } else if any_up {
        ClusterState::Up
    } else if any_stopped {
        ClusterState::Stopped
    } else {
        ClusterState::Init
    };

    Assessment { state, warnings }
}
