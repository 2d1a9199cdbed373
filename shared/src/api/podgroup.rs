//! The gang-scheduler reservation object.
//!
//! Modeled after the `scheduling.x-k8s.io/v1alpha1 PodGroup` shape used by
//! coscheduling-style Kubernetes schedulers: one object reserves atomic
//! scheduling for every pod that carries its group-name pod-group annotation.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Annotation carried by every pod when gang scheduling is enabled, naming
/// the PodGroup it belongs to.
pub const POD_GROUP_NAME_ANNOTATION: &str = "scheduling.x-k8s.io/group-name";
/// Annotation naming the task spec (`<roleName>-<roleIndex>`) a pod fills
/// within its pod group.
pub const POD_GROUP_TASK_ANNOTATION: &str = "scheduling.x-k8s.io/task-spec";

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "scheduling.x-k8s.io",
    version = "v1alpha1",
    kind = "PodGroup",
    namespaced
)]
#[kube(status = "PodGroupStatus")]
#[kube(apiextensions = "v1")]
#[serde(rename_all = "camelCase")]
pub struct PodGroupSpec {
    /// Minimum number of pods that must be scheduled together.
    pub min_member: i32,

    /// Minimum number of pods required per named task (`<roleName>-<roleIndex>`).
    #[serde(default)]
    pub min_task_member: BTreeMap<String, i32>,

    /// Sum of resource requests across every pod the group covers.
    #[serde(default)]
    pub min_resources: BTreeMap<String, Quantity>,

    /// Opaque network-topology hint passed through from the owning ModelServing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_topology: Option<serde_json::Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PodGroupStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}
