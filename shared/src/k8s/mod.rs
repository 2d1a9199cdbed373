use crate::api::{API_GROUP, API_VERSION};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

pub mod api;
pub mod naming;
pub mod pod;
pub mod revision;
pub mod rollout;
pub mod service;

pub const ERROR_NOT_FOUND: u16 = 404;
pub const ERROR_CONFLICT: u16 = 409;

pub const NODE_SELECTOR_OP_IN: &str = "In";
pub const OBJECT_NAME_FIELD: &str = "metadata.name";

/// What kind of Kubernetes object an object is dependent on.
#[derive(Clone, Debug)]
pub enum OwnershipType {
    ModelServing,
    Pod,
    Service,
    PodGroup,
}

/// Enough information to build an [`OwnerReference`] pointing at the owning object.
#[derive(Clone, Debug)]
pub struct OwnershipInfo {
    object_type: OwnershipType,
    object_name: String,
    object_uid: String,
}

impl OwnershipInfo {
    pub fn new(object_type: OwnershipType, object_name: String, object_uid: String) -> Self {
        OwnershipInfo {
            object_type,
            object_name,
            object_uid,
        }
    }

    pub fn get_api_version(&self) -> String {
        match self.object_type {
            OwnershipType::ModelServing => format!("{API_GROUP}/{API_VERSION}"),
            OwnershipType::PodGroup => "scheduling.x-k8s.io/v1alpha1".to_string(),
            OwnershipType::Pod | OwnershipType::Service => "v1".to_string(),
        }
    }

    pub fn get_kind(&self) -> String {
        match self.object_type {
            OwnershipType::ModelServing => "ModelServing",
            OwnershipType::Pod => "Pod",
            OwnershipType::Service => "Service",
            OwnershipType::PodGroup => "PodGroup",
        }
        .to_string()
    }

    pub fn get_controller(&self) -> Option<bool> {
        Some(true)
    }

    pub fn get_block_owner_deletion(&self) -> Option<bool> {
        Some(true)
    }

    pub fn get_name(&self) -> String {
        self.object_name.clone()
    }

    pub fn get_uid(&self) -> String {
        self.object_uid.clone()
    }

    pub fn as_owner_reference(&self) -> OwnerReference {
        OwnerReference {
            api_version: self.get_api_version(),
            kind: self.get_kind(),
            controller: self.get_controller(),
            block_owner_deletion: self.get_block_owner_deletion(),
            name: self.get_name(),
            uid: self.get_uid(),
        }
    }
}

/// True if a `kube::Error` wraps an HTTP 404 (used to treat "not found on
/// delete" as success).
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == ERROR_NOT_FOUND)
}

/// True if a `kube::Error` wraps an HTTP 409 conflict (used to treat
/// "already exists on create" as success).
pub fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == ERROR_CONFLICT)
}
