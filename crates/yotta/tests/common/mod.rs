//! In-memory pod API shared by the integration tests.

#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use yotta::{LaunchRequest, PodApi, PodRecord, ProvisionerError, RemoteState};

#[derive(Default)]
struct State {
    pods: Vec<PodRecord>,
    next_id: u32,
    launch_calls: u32,
    fail_launch_at: Option<(u32, fn() -> ProvisionerError)>,
    /// Create the pod even though the failing call reports an error.
    create_on_failure: bool,
    reject_credentials: bool,
    launched: Vec<LaunchRequest>,
    destroy_calls: Vec<Vec<String>>,
    registered_keys: Vec<String>,
}

/// Pod API backed by a vector of pods.
///
/// Launches create pods in `INITIALIZE`; tests move them along with
/// [`FakeApi::set_state`]. Destroy marks pods `TERMINATED`.
#[derive(Default)]
pub struct FakeApi {
    state: Mutex<State>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `call`-th launch (1-based) with the error built by `error`.
    pub fn fail_launch_at(&self, call: u32, error: fn() -> ProvisionerError) {
        self.state.lock().unwrap().fail_launch_at = Some((call, error));
    }

    /// Make the failing launch still create its pod.
    pub fn create_on_failure(&self) {
        self.state.lock().unwrap().create_on_failure = true;
    }

    pub fn reject_credentials(&self) {
        self.state.lock().unwrap().reject_credentials = true;
    }

    /// Seed a pod directly.
    pub fn insert_pod(&self, label: &str, name: &str, state: RemoteState) -> String {
        let mut guard = self.state.lock().unwrap();
        guard.next_id += 1;
        let pod_id = format!("pod-{}", guard.next_id);
        guard.pods.push(pod(&pod_id, name, label, state));
        pod_id
    }

    pub fn set_state(&self, pod_id: &str, state: RemoteState) {
        let mut guard = self.state.lock().unwrap();
        if let Some(pod) = guard.pods.iter_mut().find(|p| p.pod_id == pod_id) {
            pod.remote_state = state;
        }
    }

    /// Set every pod of a label to `state`.
    pub fn set_label_state(&self, label: &str, state: RemoteState) {
        let mut guard = self.state.lock().unwrap();
        for pod in guard
            .pods
            .iter_mut()
            .filter(|p| p.cluster_name_label == label)
        {
            pod.remote_state = state.clone();
        }
    }

    /// Forget all pods, as the service does some time after termination.
    pub fn purge(&self) {
        self.state.lock().unwrap().pods.clear();
    }

    pub fn pods(&self) -> Vec<PodRecord> {
        self.state.lock().unwrap().pods.clone()
    }

    pub fn launch_calls(&self) -> u32 {
        self.state.lock().unwrap().launch_calls
    }

    pub fn launched(&self) -> Vec<LaunchRequest> {
        self.state.lock().unwrap().launched.clone()
    }

    pub fn destroy_calls(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().destroy_calls.clone()
    }

    pub fn registered_keys(&self) -> Vec<String> {
        self.state.lock().unwrap().registered_keys.clone()
    }
}

pub fn pod(pod_id: &str, name: &str, label: &str, state: RemoteState) -> PodRecord {
    PodRecord {
        pod_id: pod_id.to_string(),
        name: name.to_string(),
        cluster_name_label: label.to_string(),
        remote_state: state,
        created_at: None,
        expose: Vec::new(),
    }
}

#[async_trait]
impl PodApi for FakeApi {
    async fn check_credentials(&self) -> Result<(), ProvisionerError> {
        if self.state.lock().unwrap().reject_credentials {
            return Err(ProvisionerError::Auth {
                status: 401,
                message: "invalid api key".to_string(),
            });
        }
        Ok(())
    }

    async fn query_pods(
        &self,
        cluster_name_label: &str,
    ) -> Result<Vec<PodRecord>, ProvisionerError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .pods
            .iter()
            .filter(|p| p.cluster_name_label == cluster_name_label)
            .cloned()
            .collect())
    }

    async fn launch_pods(&self, req: &LaunchRequest) -> Result<Vec<PodRecord>, ProvisionerError> {
        let mut guard = self.state.lock().unwrap();
        guard.launch_calls += 1;
        guard.launched.push(req.clone());

        let failure = match guard.fail_launch_at {
            Some((call, error)) if call == guard.launch_calls => Some(error()),
            _ => None,
        };
        let failure = match (failure, guard.create_on_failure) {
            (Some(e), false) => return Err(e),
            (failure, _) => failure,
        };

        guard.next_id += 1;
        let pod_id = format!("pod-{}", guard.next_id);
        let name = req
            .pod_name
            .clone()
            .unwrap_or_else(|| req.cluster_name_label.clone());
        let record = pod(
            &pod_id,
            &name,
            &req.cluster_name_label,
            RemoteState::Initialize,
        );
        guard.pods.push(record.clone());

        match failure {
            Some(e) => Err(e),
            None => Ok(vec![record]),
        }
    }

    async fn destroy_pods(&self, pod_ids: &[String]) -> Result<(), ProvisionerError> {
        let mut guard = self.state.lock().unwrap();
        guard.destroy_calls.push(pod_ids.to_vec());
        for pod in guard
            .pods
            .iter_mut()
            .filter(|p| pod_ids.contains(&p.pod_id))
        {
            pod.remote_state = RemoteState::Terminated;
        }
        Ok(())
    }

    async fn register_public_key(&self, public_key: &str) -> Result<(), ProvisionerError> {
        let mut guard = self.state.lock().unwrap();
        if !guard.registered_keys.iter().any(|k| k == public_key) {
            guard.registered_keys.push(public_key.to_string());
        }
        Ok(())
    }
}
