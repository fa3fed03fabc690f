//! Yotta pod provider.
//!
//! Implements the [`PodApi`](crate::providers::PodApi) trait against the
//! Yotta SDK API (`/sdk/api`). All responses share one envelope:
//!
//! ```json
//! {"code": 10000, "message": "success", "data": ...}
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use yotta::config::{ClientConfig, Credentials};
//! use yotta::providers::yotta::YottaClient;
//! use yotta::providers::{LaunchRequest, PodApi};
//!
//! let client = YottaClient::new(ClientConfig::new(Credentials::load_default()?))?;
//! client.check_credentials().await?;
//!
//! let pods = client
//!     .launch_pods(&LaunchRequest::new("job-1", "NVIDIA_L4_24G", 1, "ubuntu:22.04"))
//!     .await?;
//! ```

mod client;
mod models;

pub use client::{YottaClient, API_KEY_HEADER};
pub use models::*;
