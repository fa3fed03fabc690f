//! GPU pod provisioning on the Yotta cloud.
//!
//! This crate launches, inspects and destroys Kubernetes-backed GPU pods
//! through the Yotta SDK API and reports them to an orchestrator as a
//! cluster status (`INIT`, `UP`, `STOPPED`).
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐   launch / query / destroy   ┌──────────────────────┐
//! │ Orchestrator  │ ───────────────────────────▶ │ PodLifecycleManager  │
//! └───────────────┘ ◀─────── ClusterReport ───── │  • label idempotency │
//!                                                │  • partial failures  │
//!                                                └──────────┬───────────┘
//!                         ┌──────────────────┐              │
//!                         │ SshKeyProvisioner│◀─ ensure ────┤
//!                         └──────────────────┘              ▼
//!                  ┌────────────┐  map state   ┌──────────────────────┐
//!                  │   status   │ ◀─────────── │ YottaClient (PodApi) │──▶ REST
//!                  └────────────┘              │  • retry policy      │
//!                                              └──────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use yotta::config::{ClientConfig, Credentials};
//! use yotta::{LaunchRequest, PodLifecycleManager, SshKeyProvisioner, YottaClient};
//!
//! let client = YottaClient::new(ClientConfig::new(Credentials::load_default()?))?;
//! let manager = PodLifecycleManager::new(client)
//!     .with_ssh_keys(SshKeyProvisioner::default_location()?);
//!
//! manager.launch(LaunchRequest::new("job-1", "NVIDIA_L4_24G", 1, "ubuntu:22.04")).await?;
//! let report = manager.query("job-1").await?;
//! manager.destroy("job-1").await?;
//! ```

pub mod config;
pub mod lifecycle;
pub mod providers;
pub mod retry;
pub mod ssh;
pub mod status;

pub use config::{ClientConfig, Credentials};
pub use lifecycle::{ClusterReport, DestroyOutcome, LaunchOutcome, PodLifecycleManager};
pub use providers::yotta::YottaClient;
pub use providers::{
    CloudType, LaunchRequest, PartialLaunchFailure, PodApi, PodRecord, ProvisionerError,
    RemoteState,
};
pub use retry::RetryPolicy;
pub use ssh::{SshKey, SshKeyProvisioner, SshKeyRecord};
pub use status::{map_remote_state, ClusterState, ClusterStatus, UnknownRemoteState};
