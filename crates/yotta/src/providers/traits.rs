//! Pod API trait and common types.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Errors that can occur while provisioning pods.
#[derive(Error, Debug)]
pub enum ProvisionerError {
    /// HTTP transport failure (connect, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Credentials were rejected by the remote service.
    #[error("Authentication failed ({status}): {message}")]
    Auth { status: u16, message: String },

    /// The request was malformed or rejected as invalid.
    ///
    /// `status` is `None` when the request was rejected locally.
    #[error("Invalid request{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Validation { status: Option<u16>, message: String },

    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Server-side failure that may succeed on retry.
    #[error("Transient failure{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Transient { status: Option<u16>, message: String },

    /// Transient failures persisted past the retry budget.
    #[error("Provisioner unavailable: {operation} failed after {attempts} attempts: {message}")]
    Unavailable {
        operation: String,
        attempts: u32,
        message: String,
    },

    /// The API answered with a non-success business code.
    #[error("API error: {code} - {message}")]
    Api { code: i64, message: String },

    /// A create was accepted but its response did not say what was created.
    #[error("Launch accepted but not confirmed: {0}")]
    UnconfirmedLaunch(String),

    /// Some pods of a launch were created and others were not.
    #[error(transparent)]
    PartialLaunch(Box<PartialLaunchFailure>),

    /// The cloud has no equivalent for the requested operation.
    #[error("Operation '{operation}' is not supported on {cloud}")]
    UnsupportedOperation {
        operation: &'static str,
        cloud: &'static str,
    },

    /// Local SSH keypair could not be created or read.
    #[error("SSH key error: {0}")]
    SshKey(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProvisionerError {
    /// Whether a retry of the same call may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => !e.is_builder(),
            Self::Transient { .. } => true,
            _ => false,
        }
    }

    /// Whether the remote side may have acted on a request that reported failure.
    ///
    /// A create that fails this way may still have produced a pod.
    #[must_use]
    pub fn is_ambiguous(&self) -> bool {
        self.is_transient()
            || matches!(
                self,
                Self::Unavailable { .. } | Self::UnconfirmedLaunch(_)
            )
    }
}

/// A node that could not be launched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedLaunch {
    /// Pod name the node would have had.
    pub node_name: String,
    /// Error reported for the attempt.
    pub reason: String,
}

/// Details of a launch that created only part of the requested pods.
///
/// Nothing is rolled back; the caller decides whether to destroy
/// `succeeded`.
#[derive(Error, Debug, Clone, Serialize)]
#[error(
    "Partial launch of cluster '{cluster_name_label}': {} of {requested} pods created, {} failed",
    .succeeded.len(),
    .failed.len()
)]
pub struct PartialLaunchFailure {
    /// Cluster label being launched.
    pub cluster_name_label: String,
    /// Number of pods requested.
    pub requested: u32,
    /// Pods the remote service reported as created.
    pub succeeded: Vec<PodRecord>,
    /// Attempts that failed.
    pub failed: Vec<FailedLaunch>,
    /// Pod names never attempted because an earlier attempt failed.
    pub not_attempted: Vec<String>,
}

impl From<PartialLaunchFailure> for ProvisionerError {
    fn from(failure: PartialLaunchFailure) -> Self {
        Self::PartialLaunch(Box::new(failure))
    }
}

/// Lifecycle state reported by the remote service for one pod.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RemoteState {
    /// Pod is being scheduled and started.
    Initialize,
    /// Pod is running.
    Running,
    /// Pod is being paused.
    Pausing,
    /// Pod is paused.
    Paused,
    /// Pod is being terminated.
    Terminating,
    /// Pod is gone.
    Terminated,
    /// Pod failed.
    Failed,
    /// A state this client does not know, kept verbatim.
    Unrecognized(String),
}

impl RemoteState {
    /// Decode the numeric wire value.
    #[must_use]
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Initialize,
            1 => Self::Running,
            2 => Self::Pausing,
            3 => Self::Paused,
            4 => Self::Terminating,
            5 => Self::Terminated,
            6 => Self::Failed,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    /// Decode a state name, ignoring case.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "INITIALIZE" => Self::Initialize,
            "RUNNING" => Self::Running,
            "PAUSING" => Self::Pausing,
            "PAUSED" => Self::Paused,
            "TERMINATING" => Self::Terminating,
            "TERMINATED" => Self::Terminated,
            "FAILED" => Self::Failed,
            _ => Self::Unrecognized(name.to_string()),
        }
    }

    /// Whether the pod has reached an end state and holds no resources.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated | Self::Failed)
    }
}

impl fmt::Display for RemoteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initialize => write!(f, "INITIALIZE"),
            Self::Running => write!(f, "RUNNING"),
            Self::Pausing => write!(f, "PAUSING"),
            Self::Paused => write!(f, "PAUSED"),
            Self::Terminating => write!(f, "TERMINATING"),
            Self::Terminated => write!(f, "TERMINATED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Unrecognized(raw) => write!(f, "UNRECOGNIZED({raw})"),
        }
    }
}

impl<'de> Deserialize<'de> for RemoteState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Code(i64),
            Name(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Code(code) => Self::from_code(code),
            Raw::Name(name) => Self::from_name(&name),
        })
    }
}

impl Serialize for RemoteState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Where a pod runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CloudType {
    /// Data-center hosted capacity.
    #[default]
    Secure,
    /// Community hosted capacity.
    Community,
}

impl CloudType {
    /// Numeric wire value.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Secure => 1,
            Self::Community => 2,
        }
    }
}

impl std::str::FromStr for CloudType {
    type Err = ProvisionerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SECURE" => Ok(Self::Secure),
            "COMMUNITY" => Ok(Self::Community),
            other => Err(ProvisionerError::Validation {
                status: None,
                message: format!("unknown cloud type '{other}'"),
            }),
        }
    }
}

impl fmt::Display for CloudType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Secure => write!(f, "SECURE"),
            Self::Community => write!(f, "COMMUNITY"),
        }
    }
}

/// A container port exposed by a pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    /// Port inside the container.
    pub port: u16,
    /// Public port the service forwards to `port`.
    pub proxy_port: Option<u16>,
    /// Protocol label (`SSH`, `TCP`, `HTTP`).
    pub protocol: String,
    /// Public host.
    pub host: Option<String>,
    /// Whether the remote health check passes.
    pub healthy: Option<bool>,
}

/// A publicly reachable address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Host name or IP.
    pub host: String,
    /// Port.
    pub port: u16,
}

/// Local, possibly stale, view of a remote pod.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodRecord {
    /// Remote-generated pod id.
    pub pod_id: String,
    /// Pod name.
    pub name: String,
    /// Cluster label the pod belongs to.
    pub cluster_name_label: String,
    /// Lifecycle state reported by the remote service.
    pub remote_state: RemoteState,
    /// When the pod was created.
    pub created_at: Option<DateTime<Utc>>,
    /// Exposed ports.
    pub expose: Vec<PortMapping>,
}

impl PodRecord {
    /// The exposed SSH port, if any.
    #[must_use]
    pub fn ssh_port(&self) -> Option<&PortMapping> {
        self.expose.iter().find(|p| p.protocol.eq_ignore_ascii_case("SSH"))
    }

    /// Map of container port to public endpoint.
    ///
    /// Empty unless the pod is running.
    #[must_use]
    pub fn endpoints(&self) -> BTreeMap<u16, Endpoint> {
        if self.remote_state != RemoteState::Running {
            return BTreeMap::new();
        }
        self.expose
            .iter()
            .filter_map(|p| {
                Some((
                    p.port,
                    Endpoint {
                        host: p.host.clone()?,
                        port: p.proxy_port?,
                    },
                ))
            })
            .collect()
    }
}

/// GPU models addressable through instance type strings.
const GPU_NAME_MAP: &[(&str, &str)] = &[("A10", "NVIDIA_A10_24G"), ("L4", "NVIDIA_L4_24G")];

/// Default container disk size.
pub const DEFAULT_DISK_SIZE_GB: u32 = 100;

/// Default provisioning timeout handed to the remote service.
pub const DEFAULT_LAUNCH_TIMEOUT_SECS: u64 = 600;

/// Request to launch the pods of one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchRequest {
    /// Cluster label shared by all pods.
    pub cluster_name_label: String,
    /// GPU model (e.g., `NVIDIA_L4_24G`).
    pub gpu_type: String,
    /// GPUs per pod.
    pub gpu_count: u32,
    /// Container image.
    pub image: String,
    /// Capacity pool.
    pub cloud_type: CloudType,
    /// Container disk size.
    pub disk_size_gb: u32,
    /// Provisioning timeout enforced by the remote service.
    pub timeout_seconds: u64,
    /// Number of pods in the cluster.
    pub node_count: u32,
    /// Region or zone.
    pub region: Option<String>,
    /// Extra TCP ports to expose.
    pub ports: Vec<u16>,
    /// Login user configured for SSH.
    pub ssh_user: Option<String>,
    /// Public key authorized on the pods.
    pub ssh_public_key: Option<String>,
    /// Name for the pod created by this request. Set per node by the manager.
    pub pod_name: Option<String>,
}

impl LaunchRequest {
    /// Create a single-node request with default disk size and timeout.
    #[must_use]
    pub fn new(
        cluster_name_label: impl Into<String>,
        gpu_type: impl Into<String>,
        gpu_count: u32,
        image: impl Into<String>,
    ) -> Self {
        Self {
            cluster_name_label: cluster_name_label.into(),
            gpu_type: gpu_type.into(),
            gpu_count,
            image: image.into(),
            cloud_type: CloudType::default(),
            disk_size_gb: DEFAULT_DISK_SIZE_GB,
            timeout_seconds: DEFAULT_LAUNCH_TIMEOUT_SECS,
            node_count: 1,
            region: None,
            ports: Vec::new(),
            ssh_user: None,
            ssh_public_key: None,
            pod_name: None,
        }
    }

    /// Create a request from an instance type such as `2x_L4_SECURE`.
    ///
    /// # Errors
    /// Returns [`ProvisionerError::Validation`] if the instance type is
    /// malformed or names an unknown GPU or cloud type.
    pub fn from_instance_type(
        cluster_name_label: impl Into<String>,
        instance_type: &str,
        image: impl Into<String>,
    ) -> Result<Self, ProvisionerError> {
        let invalid = |why: &str| ProvisionerError::Validation {
            status: None,
            message: format!("instance type '{instance_type}': {why}"),
        };

        let mut parts = instance_type.split('_');
        let (Some(count), Some(gpu), Some(cloud), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid("expected <count>x_<gpu>_<cloud>"));
        };

        let gpu_count: u32 = count
            .strip_suffix('x')
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| invalid("bad GPU count"))?;
        let gpu_type = GPU_NAME_MAP
            .iter()
            .find(|(short, _)| short.eq_ignore_ascii_case(gpu))
            .map(|(_, full)| *full)
            .ok_or_else(|| invalid("unknown GPU"))?;
        let cloud_type: CloudType = cloud.parse().map_err(|_| invalid("unknown cloud type"))?;

        let mut request = Self::new(cluster_name_label, gpu_type, gpu_count, image);
        request.cloud_type = cloud_type;
        Ok(request)
    }

    /// Set the number of pods.
    #[must_use]
    pub fn with_node_count(mut self, node_count: u32) -> Self {
        self.node_count = node_count;
        self
    }

    /// Check the request before anything is sent.
    ///
    /// # Errors
    /// Returns [`ProvisionerError::Validation`] describing the first problem.
    pub fn validate(&self) -> Result<(), ProvisionerError> {
        let problem = if self.cluster_name_label.trim().is_empty() {
            Some("cluster name label is empty")
        } else if self.gpu_type.trim().is_empty() {
            Some("GPU type is empty")
        } else if self.gpu_count == 0 {
            Some("GPU count must be at least 1")
        } else if self.image.trim().is_empty() {
            Some("image is empty")
        } else if self.node_count == 0 {
            Some("node count must be at least 1")
        } else if self.disk_size_gb == 0 {
            Some("disk size must be at least 1 GB")
        } else {
            None
        };

        match problem {
            Some(message) => Err(ProvisionerError::Validation {
                status: None,
                message: message.to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// Trait for the remote pod API.
///
/// Every method makes its own outbound call and keeps no state between
/// calls.
#[async_trait]
pub trait PodApi: Send + Sync {
    /// Validate the configured credentials.
    async fn check_credentials(&self) -> Result<(), ProvisionerError>;

    /// List pods carrying the given cluster label. Empty when none exist.
    async fn query_pods(&self, cluster_name_label: &str)
        -> Result<Vec<PodRecord>, ProvisionerError>;

    /// Create pods. Never retried.
    async fn launch_pods(&self, req: &LaunchRequest) -> Result<Vec<PodRecord>, ProvisionerError>;

    /// Delete pods. Ids that no longer exist count as deleted.
    async fn destroy_pods(&self, pod_ids: &[String]) -> Result<(), ProvisionerError>;

    /// Register an SSH public key with the account. Already known keys are accepted.
    async fn register_public_key(&self, public_key: &str) -> Result<(), ProvisionerError>;
}

#[async_trait]
impl<T: PodApi + ?Sized> PodApi for Arc<T> {
    async fn check_credentials(&self) -> Result<(), ProvisionerError> {
        (**self).check_credentials().await
    }

    async fn query_pods(
        &self,
        cluster_name_label: &str,
    ) -> Result<Vec<PodRecord>, ProvisionerError> {
        (**self).query_pods(cluster_name_label).await
    }

    async fn launch_pods(&self, req: &LaunchRequest) -> Result<Vec<PodRecord>, ProvisionerError> {
        (**self).launch_pods(req).await
    }

    async fn destroy_pods(&self, pod_ids: &[String]) -> Result<(), ProvisionerError> {
        (**self).destroy_pods(pod_ids).await
    }

    async fn register_public_key(&self, public_key: &str) -> Result<(), ProvisionerError> {
        (**self).register_public_key(public_key).await
    }
}
