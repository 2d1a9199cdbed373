//! Defines the ModelServing CRD and its nested types.
//!
//! A ModelServing is the primary method for users to describe a multi-role,
//! multi-replica distributed inference workload. For each declared infer
//! group, the controller creates one role instance per role in the group's
//! template.

pub mod podgroup;

use k8s_openapi::api::core::v1::PodSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use podgroup::{PodGroup, PodGroupSpec, PodGroupStatus};

pub const API_GROUP: &str = "modelserving.sh";
pub const API_VERSION: &str = "v1alpha1";

pub const LABEL_NAME: &str = "model-serving/name";
pub const LABEL_GROUP_NAME: &str = "group-name";
pub const LABEL_ROLE: &str = "role";
pub const LABEL_ROLE_ID: &str = "role-id";
pub const LABEL_REVISION: &str = "revision";
pub const LABEL_ENTRY: &str = "entry";
pub const LABEL_WORKER_INDEX: &str = "worker-index";

pub const ENV_GROUP_SIZE: &str = "GROUP_SIZE";
pub const ENV_ENTRY_ADDRESS: &str = "ENTRY_ADDRESS";
pub const ENV_WORKER_INDEX: &str = "WORKER_INDEX";

/// Defines the information in the ModelServing CRD.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "modelserving.sh",
    version = "v1alpha1",
    kind = "ModelServing",
    namespaced
)]
#[kube(status = "ModelServingStatus")]
#[kube(apiextensions = "v1")]
#[serde(rename_all = "camelCase")]
pub struct ModelServingSpec {
    /// Desired number of infer groups.
    #[serde(default)]
    pub replicas: i32,

    /// Shape shared by every infer group created for this ModelServing.
    pub template: InferGroupTemplate,

    /// Rolling-by-group update strategy.
    #[serde(default)]
    pub rollout_strategy: RolloutStrategy,

    /// What to do when a role member fails or restarts.
    #[serde(default)]
    pub recovery_policy: RecoveryPolicy,

    /// The only gang scheduler this controller integrates with. Any other
    /// value is rejected at admission (out of scope here).
    pub scheduler_name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InferGroupTemplate {
    /// 1 to 4 uniquely named roles, each DNS-label-safe and at most 12 characters.
    pub roles: Vec<RoleSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gang_schedule: Option<GangScheduleSpec>,

    /// Grace window, in seconds, before a failing pod triggers a role rebuild.
    #[serde(default)]
    pub restart_grace_period_seconds: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleSpec {
    /// DNS-label-safe, at most 12 characters (e.g. "prefill", "decode").
    pub name: String,

    /// Number of role instances of this role per infer group (e.g. for xPyD).
    #[serde(default = "default_role_replicas")]
    pub replicas: i32,

    /// Template for the single coordinator pod of each role instance.
    pub entry_template: PodSpec,

    /// Number of worker pods per role instance.
    #[serde(default)]
    pub worker_replicas: i32,

    /// Template shared by every worker pod of this role. Required iff
    /// `worker_replicas > 0`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_template: Option<PodSpec>,
}

fn default_role_replicas() -> i32 {
    1
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GangScheduleSpec {
    /// Per-role floor on the number of role instances that must be counted
    /// towards the pod group's `minMember`. Roles absent from this map use
    /// their full `replicas` as the floor.
    #[serde(default)]
    pub min_role_replicas: HashMap<String, i32>,

    /// Opaque network-topology hint, passed through to the pod group verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_topology: Option<serde_json::Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RolloutStrategy {
    #[serde(default = "default_max_unavailable")]
    pub max_unavailable: IntOrString,
    #[serde(default = "default_max_surge")]
    pub max_surge: IntOrString,
    #[serde(default)]
    pub partition: i32,
}

impl Default for RolloutStrategy {
    fn default() -> Self {
        RolloutStrategy {
            max_unavailable: default_max_unavailable(),
            max_surge: default_max_surge(),
            partition: 0,
        }
    }
}

fn default_max_unavailable() -> IntOrString {
    IntOrString::Int(1)
}

fn default_max_surge() -> IntOrString {
    IntOrString::Int(0)
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum RecoveryPolicy {
    InferGroupRestart,
    #[default]
    None,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModelServingStatus {
    #[serde(default)]
    pub replicas: i32,
    #[serde(default)]
    pub available_replicas: i32,
    #[serde(default)]
    pub updated_replicas: i32,
    #[serde(default)]
    pub conditions: Vec<ModelServingCondition>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModelServingCondition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "time_schema")]
    pub last_transition_time: Option<Time>,
}

fn time_schema(_: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
    schemars::schema_for!(String).schema.into()
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, JsonSchema)]
pub enum ConditionType {
    Available,
    Progressing,
    UpdateInProgress,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}
