//! Yotta SDK API wire models.

use serde::{Deserialize, Deserializer, Serialize};

use crate::providers::traits::RemoteState;

/// Business code carried by every successful response.
pub const SUCCESS_CODE: i64 = 10000;

// ============================================================================
// Common envelope
// ============================================================================

/// Response envelope: `{"code": 10000, "message": "...", "data": ...}`.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    /// Business status code.
    pub code: i64,
    /// Human readable message.
    #[serde(default)]
    pub message: Option<String>,
    /// Payload.
    #[serde(default)]
    pub data: Option<T>,
}

/// Pod ids arrive as numbers from some endpoints and strings from others.
fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(IdValue::deserialize(deserializer)?.into_string())
}

/// A pod id as sent on the wire.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum IdValue {
    /// Numeric id.
    Number(i64),
    /// String id.
    Text(String),
}

impl IdValue {
    /// Render the id as a string.
    #[must_use]
    pub fn into_string(self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s,
        }
    }
}

// ============================================================================
// Pod types
// ============================================================================

/// Pod resource from the API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodResource {
    /// Pod id.
    #[serde(deserialize_with = "id_string", alias = "podId")]
    pub id: String,
    /// Pod name.
    #[serde(default)]
    pub name: Option<String>,
    /// Cluster label, when the API echoes it.
    #[serde(default, alias = "cluster_name")]
    pub cluster_name: Option<String>,
    /// Lifecycle state (numeric or named).
    #[serde(alias = "state")]
    pub status: RemoteState,
    /// Creation time: RFC 3339 string or epoch milliseconds.
    #[serde(default, alias = "created_at")]
    pub created_at: Option<serde_json::Value>,
    /// Exposed ports.
    #[serde(default)]
    pub expose: Vec<ExposeResource>,
}

/// Exposed port, e.g.
/// `{"port":22,"proxyPort":30003,"protocol":"SSH","host":"1.2.3.4","healthy":true}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExposeResource {
    /// Container port.
    pub port: u16,
    /// Public port.
    #[serde(default, alias = "proxy_port")]
    pub proxy_port: Option<u16>,
    /// Protocol label.
    #[serde(default)]
    pub protocol: Option<String>,
    /// Public host.
    #[serde(default)]
    pub host: Option<String>,
    /// Health flag.
    #[serde(default)]
    pub healthy: Option<bool>,
}

/// Payload of a create call: a list, a single pod, or a bare id.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CreatedPods {
    /// Several pods.
    Many(Vec<PodResource>),
    /// One pod.
    One(PodResource),
    /// Only the id of the new pod.
    Id(IdValue),
}

/// Request body for `POST /compute/create`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePodBody {
    /// Pod name.
    pub name: String,
    /// Cluster label.
    pub cluster_name: String,
    /// Container image.
    pub image: String,
    /// GPU model.
    pub gpu_type: String,
    /// GPUs per pod.
    pub gpu_count: u32,
    /// Cloud type code (1 = secure, 2 = community).
    pub cloud_type: u8,
    /// Disk size in GB.
    pub disk_size: u32,
    /// Remote provisioning timeout.
    pub timeout_seconds: u64,
    /// Region or zone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Ports to expose.
    pub expose: Vec<ExposeSpec>,
    /// SSH login user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_user: Option<String>,
    /// SSH public key to authorize.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_public_key: Option<String>,
}

/// A port to expose on a new pod.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ExposeSpec {
    /// Container port.
    pub port: u16,
    /// Protocol label.
    pub protocol: String,
}

/// Request body for `POST /compute/delete`.
#[derive(Debug, Serialize)]
pub struct DeletePodsBody {
    /// Pod ids.
    pub ids: Vec<String>,
}

/// Request body for `POST /compute/create/publicKey`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyBody {
    /// OpenSSH public key line.
    pub public_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pod_resource_camel_case_shape() {
        let json = r#"{
            "id": 1234,
            "name": "job-1-head",
            "status": 1,
            "createdAt": "2024-05-01T10:00:00Z",
            "expose": [{"port":22,"proxyPort":30003,"protocol":"SSH","host":"127.0.0.1","healthy":true}]
        }"#;
        let pod: PodResource = serde_json::from_str(json).unwrap();
        assert_eq!(pod.id, "1234");
        assert_eq!(pod.status, RemoteState::Running);
        assert_eq!(pod.expose[0].proxy_port, Some(30003));
        assert!(pod.cluster_name.is_none());
    }

    #[test]
    fn test_created_pods_variants() {
        let many: CreatedPods = serde_json::from_str(r#"[{"id":"a","status":0}]"#).unwrap();
        assert!(matches!(many, CreatedPods::Many(ref v) if v.len() == 1));

        let one: CreatedPods = serde_json::from_str(r#"{"id":"a","status":0}"#).unwrap();
        assert!(matches!(one, CreatedPods::One(_)));

        let id: CreatedPods = serde_json::from_str("987").unwrap();
        assert!(matches!(id, CreatedPods::Id(IdValue::Number(987))));
    }

    #[test]
    fn test_create_body_skips_empty_options() {
        let body = CreatePodBody {
            name: "job-head".to_string(),
            cluster_name: "job".to_string(),
            image: "img".to_string(),
            gpu_type: "NVIDIA_L4_24G".to_string(),
            gpu_count: 1,
            cloud_type: 1,
            disk_size: 100,
            timeout_seconds: 600,
            region: None,
            expose: vec![],
            ssh_user: None,
            ssh_public_key: None,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert!(value.get("region").is_none());
        assert!(value.get("sshPublicKey").is_none());
        assert_eq!(value["diskSize"], 100);
        assert_eq!(value["gpuType"], "NVIDIA_L4_24G");
        assert_eq!(value["clusterName"], "job");
        assert!(value.get("gpu_type").is_none());
    }

    #[test]
    fn test_pod_resource_accepts_create_aliases() {
        let pod: PodResource =
            serde_json::from_str(r#"{"podId":77,"state":"INITIALIZE"}"#).unwrap();
        assert_eq!(pod.id, "77");
        assert_eq!(pod.status, RemoteState::Initialize);
    }

    #[test]
    fn test_public_key_body_is_camel_case() {
        let body = PublicKeyBody {
            public_key: "ssh-ed25519 AAAA".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"publicKey": "ssh-ed25519 AAAA"})
        );
    }
}
