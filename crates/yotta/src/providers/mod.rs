//! Pod API seam and its Yotta implementation.
//!
//! This module contains the [`PodApi`] trait and the client for the Yotta
//! SDK API.

pub mod traits;
pub mod yotta;

pub use traits::{
    CloudType, Endpoint, FailedLaunch, LaunchRequest, PartialLaunchFailure, PodApi, PodRecord,
    PortMapping, ProvisionerError, RemoteState,
};
