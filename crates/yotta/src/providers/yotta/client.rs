//! Yotta SDK API client implementation.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::models::{
    ApiResponse, CreatePodBody, CreatedPods, DeletePodsBody, ExposeSpec, PodResource,
    PublicKeyBody, SUCCESS_CODE,
};
use crate::config::ClientConfig;
use crate::providers::traits::{
    LaunchRequest, PodApi, PodRecord, PortMapping, ProvisionerError, RemoteState,
};

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "X-API-KEY";

/// SSH port every pod exposes.
const SSH_PORT: u16 = 22;

/// Yotta pod API client.
#[derive(Clone)]
pub struct YottaClient {
    /// HTTP client.
    client: Client,
    /// Endpoint, credentials and retry policy.
    config: ClientConfig,
}

impl YottaClient {
    /// Create a new client.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(config: ClientConfig) -> Result<Self, ProvisionerError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { client, config })
    }

    /// Configuration this client was built with.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.endpoint.trim_end_matches('/'))
    }

    /// Make an authenticated GET request.
    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<T>, ProvisionerError> {
        let url = self.url(path);
        debug!(url = %url, "GET request");

        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, self.config.credentials.api_key())
            .query(query)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Make an authenticated POST request.
    async fn post<T, B>(&self, path: &str, body: &B) -> Result<Option<T>, ProvisionerError>
    where
        T: DeserializeOwned,
        B: serde::Serialize + Sync,
    {
        let url = self.url(path);
        debug!(url = %url, "POST request");

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, self.config.credentials.api_key())
            .json(body)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Classify the HTTP status and unwrap the `{code, message, data}` envelope.
    async fn handle_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<Option<T>, ProvisionerError> {
        let status = response.status();
        let text = response.text().await?;
        debug!(status = status.as_u16(), "Response received");

        if !status.is_success() {
            let message = serde_json::from_str::<ApiResponse<serde_json::Value>>(&text)
                .ok()
                .and_then(|r| r.message)
                .unwrap_or(text);
            return Err(Self::status_error(status, message));
        }

        let envelope: ApiResponse<serde_json::Value> =
            serde_json::from_str(&text).map_err(|e| {
                warn!(error = %e, status = status.as_u16(), "Failed to parse response envelope");
                ProvisionerError::Serialization(e)
            })?;

        if envelope.code != SUCCESS_CODE {
            return Err(ProvisionerError::Api {
                code: envelope.code,
                message: envelope
                    .message
                    .unwrap_or_else(|| "Unknown error".to_string()),
            });
        }

        match envelope.data {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(data) => serde_json::from_value(data).map(Some).map_err(|e| {
                warn!(error = %e, "Failed to parse response data");
                ProvisionerError::Serialization(e)
            }),
        }
    }

    fn status_error(status: StatusCode, message: String) -> ProvisionerError {
        let code = status.as_u16();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProvisionerError::Auth {
                status: code,
                message,
            },
            StatusCode::NOT_FOUND => ProvisionerError::NotFound(message),
            s if s.is_client_error() => ProvisionerError::Validation {
                status: Some(code),
                message,
            },
            _ => ProvisionerError::Transient {
                status: Some(code),
                message,
            },
        }
    }

    /// Convert an API pod resource to our `PodRecord` type.
    fn to_pod_record(resource: PodResource, cluster_name_label: &str) -> PodRecord {
        let created_at = resource.created_at.as_ref().and_then(|v| match v {
            serde_json::Value::String(s) => chrono::DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&chrono::Utc)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .and_then(chrono::DateTime::<chrono::Utc>::from_timestamp_millis),
            _ => None,
        });

        PodRecord {
            name: resource.name.unwrap_or_else(|| resource.id.clone()),
            pod_id: resource.id,
            cluster_name_label: resource
                .cluster_name
                .unwrap_or_else(|| cluster_name_label.to_string()),
            remote_state: resource.status,
            created_at,
            expose: resource
                .expose
                .into_iter()
                .map(|p| PortMapping {
                    port: p.port,
                    proxy_port: p.proxy_port,
                    protocol: p.protocol.unwrap_or_else(|| "TCP".to_string()),
                    host: p.host,
                    healthy: p.healthy,
                })
                .collect(),
        }
    }

    /// Build the create body for one pod.
    fn create_body(req: &LaunchRequest) -> CreatePodBody {
        let mut expose: Vec<ExposeSpec> = req
            .ports
            .iter()
            .filter(|&&p| p != SSH_PORT)
            .map(|&port| ExposeSpec {
                port,
                protocol: "TCP".to_string(),
            })
            .collect();
        expose.push(ExposeSpec {
            port: SSH_PORT,
            protocol: "SSH".to_string(),
        });

        CreatePodBody {
            name: req
                .pod_name
                .clone()
                .unwrap_or_else(|| req.cluster_name_label.clone()),
            cluster_name: req.cluster_name_label.clone(),
            image: req.image.clone(),
            gpu_type: req.gpu_type.clone(),
            gpu_count: req.gpu_count,
            cloud_type: req.cloud_type.code(),
            disk_size: req.disk_size_gb,
            timeout_seconds: req.timeout_seconds,
            region: req.region.clone(),
            expose,
            ssh_user: req.ssh_user.clone(),
            ssh_public_key: req.ssh_public_key.clone(),
        }
    }
}

#[async_trait]
impl PodApi for YottaClient {
    async fn check_credentials(&self) -> Result<(), ProvisionerError> {
        let user_id = self.config.credentials.user_id();
        info!(user_id = %user_id, "Checking API key");

        let query = [("userId", user_id)];
        let valid: Option<bool> = self
            .config
            .retry
            .run("check_credentials", || self.get("/key/check", &query))
            .await?;

        if valid == Some(true) {
            info!(user_id = %user_id, "API key is valid");
            Ok(())
        } else {
            Err(ProvisionerError::Auth {
                status: StatusCode::OK.as_u16(),
                message: format!("API key rejected for user {user_id}"),
            })
        }
    }

    async fn query_pods(
        &self,
        cluster_name_label: &str,
    ) -> Result<Vec<PodRecord>, ProvisionerError> {
        let query = [("cluster_name", cluster_name_label)];
        let resources: Option<Vec<PodResource>> = self
            .config
            .retry
            .run("query_pods", || self.get("/compute/list", &query))
            .await?;

        let mut records: Vec<PodRecord> = Vec::new();
        for resource in resources.unwrap_or_default() {
            if let Some(other) = resource
                .cluster_name
                .as_deref()
                .filter(|name| *name != cluster_name_label)
            {
                warn!(
                    pod_id = %resource.id,
                    cluster = %cluster_name_label,
                    other_cluster = %other,
                    "Ignoring pod listed under another cluster"
                );
                continue;
            }
            let record = Self::to_pod_record(resource, cluster_name_label);
            if let Some(existing) = records.iter_mut().find(|r| r.pod_id == record.pod_id) {
                *existing = record;
            } else {
                records.push(record);
            }
        }

        debug!(
            cluster = %cluster_name_label,
            count = records.len(),
            "Queried pods"
        );
        Ok(records)
    }

    async fn launch_pods(&self, req: &LaunchRequest) -> Result<Vec<PodRecord>, ProvisionerError> {
        let body = Self::create_body(req);
        info!(
            cluster = %req.cluster_name_label,
            name = %body.name,
            gpu_type = %req.gpu_type,
            gpu_count = req.gpu_count,
            cloud_type = %req.cloud_type,
            "Creating pod"
        );

        // Past a 2xx envelope with the success code the pod may exist, so any
        // failure to read the payload is reported as unconfirmed.
        let data: Option<serde_json::Value> = match self.post("/compute/create", &body).await {
            Ok(data) => data,
            Err(ProvisionerError::Serialization(e)) => {
                return Err(ProvisionerError::UnconfirmedLaunch(format!(
                    "create for '{}' returned an unreadable response: {e}",
                    body.name
                )))
            }
            Err(e) => return Err(e),
        };
        let Some(data) = data else {
            return Err(ProvisionerError::UnconfirmedLaunch(format!(
                "create for '{}' returned no pod",
                body.name
            )));
        };
        let created: CreatedPods = serde_json::from_value(data).map_err(|e| {
            warn!(name = %body.name, error = %e, "Unreadable create response");
            ProvisionerError::UnconfirmedLaunch(format!(
                "create for '{}' returned an unrecognized pod: {e}",
                body.name
            ))
        })?;

        let records = match created {
            CreatedPods::Many(resources) => resources
                .into_iter()
                .map(|r| Self::to_pod_record(r, &req.cluster_name_label))
                .collect(),
            CreatedPods::One(resource) => {
                vec![Self::to_pod_record(resource, &req.cluster_name_label)]
            }
            CreatedPods::Id(id) => vec![PodRecord {
                pod_id: id.into_string(),
                name: body.name.clone(),
                cluster_name_label: req.cluster_name_label.clone(),
                remote_state: RemoteState::Initialize,
                created_at: None,
                expose: Vec::new(),
            }],
        };
        if records.is_empty() {
            return Err(ProvisionerError::UnconfirmedLaunch(format!(
                "create for '{}' returned an empty pod list",
                body.name
            )));
        }

        for record in &records {
            info!(pod_id = %record.pod_id, state = %record.remote_state, "Pod created");
        }
        Ok(records)
    }

    async fn destroy_pods(&self, pod_ids: &[String]) -> Result<(), ProvisionerError> {
        if pod_ids.is_empty() {
            return Ok(());
        }
        info!(pod_ids = ?pod_ids, "Deleting pods");

        let body = DeletePodsBody {
            ids: pod_ids.to_vec(),
        };
        let result: Result<Option<serde_json::Value>, _> = self
            .config
            .retry
            .run("destroy_pods", || self.post("/compute/delete", &body))
            .await;

        match result {
            Ok(_) => {
                info!(pod_ids = ?pod_ids, "Pods deleted");
                Ok(())
            }
            Err(ProvisionerError::NotFound(message)) => {
                info!(pod_ids = ?pod_ids, message = %message, "Pods already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn register_public_key(&self, public_key: &str) -> Result<(), ProvisionerError> {
        let body = PublicKeyBody {
            public_key: public_key.trim().to_string(),
        };
        let result: Result<Option<serde_json::Value>, _> = self
            .config
            .retry
            .run("register_public_key", || {
                self.post("/compute/create/publicKey", &body)
            })
            .await;

        match result {
            Ok(_) => {
                info!("Public key registered");
                Ok(())
            }
            Err(ProvisionerError::Validation {
                status: Some(409), ..
            }) => {
                debug!("Public key already registered");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
