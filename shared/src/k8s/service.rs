//! Builds the headless service fronting a role instance's entry pod.

use super::OwnershipInfo;
use crate::api::{LABEL_GROUP_NAME, LABEL_NAME, LABEL_ROLE, LABEL_ROLE_ID};
use k8s_openapi::api::core::v1::{Service, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

/// `clusterIP=None`, `publishNotReadyAddresses=true`, selector matching the
/// role instance's identity labels. Named after the entry pod it fronts.
pub fn build_headless_service(
    ms_name: &str,
    namespace: &str,
    entry_pod_name: &str,
    group_name: &str,
    role_name: &str,
    role_id: &str,
    ownership: OwnershipInfo,
) -> Service {
    let mut labels = BTreeMap::new();
    labels.insert(LABEL_NAME.to_string(), ms_name.to_string());
    labels.insert(LABEL_GROUP_NAME.to_string(), group_name.to_string());
    labels.insert(LABEL_ROLE.to_string(), role_name.to_string());
    labels.insert(LABEL_ROLE_ID.to_string(), role_id.to_string());

    Service {
        metadata: ObjectMeta {
            name: Some(entry_pod_name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels.clone()),
            owner_references: Some(vec![ownership.as_owner_reference()]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".to_string()),
            publish_not_ready_addresses: Some(true),
            selector: Some(labels),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::OwnershipType;

    #[test]
    fn builds_headless_selector() {
        let svc = build_headless_service(
            "test-mi",
            "default",
            "test-mi-0-prefill-0-0",
            "test-mi-0",
            "prefill",
            "prefill-0",
            OwnershipInfo::new(OwnershipType::ModelServing, "test-mi".to_string(), "uid-1".to_string()),
        );
        assert_eq!(svc.metadata.name.as_deref(), Some("test-mi-0-prefill-0-0"));
        let spec = svc.spec.unwrap();
        assert_eq!(spec.cluster_ip.as_deref(), Some("None"));
        assert_eq!(spec.publish_not_ready_addresses, Some(true));
        let selector = spec.selector.unwrap();
        assert_eq!(selector.get(LABEL_ROLE_ID), Some(&"prefill-0".to_string()));
    }
}
