//! The Status Writer (spec §4.7): recomputes `replicas`/`availableReplicas`/
//! `updatedReplicas` and the three-condition automaton, patching the status
//! subresource only when something actually changed.
//!
//! Grounded on the general "patch status subresource via server-side apply,
//! skip if unchanged" idiom common across the retrieval pack's controllers
//! (e.g. `CoreDB::patch_status` in the pack's `other_examples`), adapted to
//! this crate's `shared::k8s::api::Api` trait instead of a bare `kube::Api`.

use std::collections::HashMap;
use std::sync::Arc;

use kube::api::{Patch, PatchParams};
use log::trace;
use modelserving_shared::api::{ConditionStatus, ConditionType, ModelServingCondition, ModelServingStatus};

use super::controller_ctx::ControllerContext;
use super::store::{GroupRecord, GroupStatus};
use super::Result;

const FIELD_MANAGER: &str = "modelserving-controller";

/// True once a group is fully converged at `target_revision`.
fn group_is_updated_and_available(group: &GroupRecord, target_revision: &str) -> bool {
    group.status == GroupStatus::Running && group.matches_revision(target_revision)
}

/// Recomputes the status fields and conditions per §4.7, from the store's
/// view of a `ModelServing`'s groups. `partition` is the rollout strategy's
/// partition field, used to pick `UpdateInProgress` vs. plain `Progressing`.
pub fn compute_status(
    groups: &HashMap<String, GroupRecord>,
    target_revision: &str,
    partition: i32,
) -> ModelServingStatus {
    let mut ordinals: Vec<u32> = groups.values().map(|g| g.ordinal).collect();
    ordinals.sort_unstable();

    let replicas = groups.len() as i32;
    let available_replicas = groups
        .values()
        .filter(|g| group_is_updated_and_available(g, target_revision))
        .count() as i32;
    let updated_replicas = groups
        .values()
        .filter(|g| g.matches_revision(target_revision))
        .count() as i32;

    let mut progressing_ordinals: Vec<u32> = groups
        .values()
        .filter(|g| !group_is_updated_and_available(g, target_revision))
        .map(|g| g.ordinal)
        .collect();
    progressing_ordinals.sort_unstable();

    let mut updated_ordinals: Vec<u32> = groups
        .values()
        .filter(|g| g.matches_revision(target_revision))
        .map(|g| g.ordinal)
        .collect();
    updated_ordinals.sort_unstable();

    let condition_type = if progressing_ordinals.is_empty() {
        ConditionType::Available
    } else if updated_ordinals.len() as i32 > partition {
        ConditionType::UpdateInProgress
    } else {
        ConditionType::Progressing
    };

    let message = format!(
        "progressing groups: {progressing_ordinals:?}, updated groups: {updated_ordinals:?}"
    );

    let conditions = [
        ConditionType::Available,
        ConditionType::Progressing,
        ConditionType::UpdateInProgress,
    ]
    .into_iter()
    .map(|type_| ModelServingCondition {
        type_,
        status: if type_ == condition_type {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        },
        reason: Some(format!("{condition_type:?}")),
        message: Some(message.clone()),
        last_transition_time: None,
    })
    .collect();

    ModelServingStatus {
        replicas,
        available_replicas,
        updated_replicas,
        conditions,
    }
}

/// `true` if the interesting part of status differs (field values, and the
/// `(type, status)` pair of each condition — messages/timestamps don't
/// gate a patch, since they would otherwise thrash on every sync).
fn status_changed(current: &ModelServingStatus, desired: &ModelServingStatus) -> bool {
    if current.replicas != desired.replicas
        || current.available_replicas != desired.available_replicas
        || current.updated_replicas != desired.updated_replicas
    {
        return true;
    }
    let current_by_type: HashMap<_, _> = current.conditions.iter().map(|c| (c.type_, c.status)).collect();
    desired
        .conditions
        .iter()
        .any(|c| current_by_type.get(&c.type_) != Some(&c.status))
}

/// Recomputes status for `ms_name` and patches the status subresource iff
/// it actually changed (§4.7 "Patch only when any field or condition
/// changes; use server-side status subresource").
pub async fn reconcile_status(
    ctx: Arc<ControllerContext>,
    namespace: &str,
    ms_name: &str,
    current_status: &ModelServingStatus,
    groups: &HashMap<String, GroupRecord>,
    target_revision: &str,
    partition: i32,
) -> Result<()> {
    let desired = compute_status(groups, target_revision, partition);
    if !status_changed(current_status, &desired) {
        trace!("status for {ms_name} unchanged, skipping patch");
        return Ok(());
    }

    let api = ctx.model_servings(namespace);
    let patch = serde_json::json!({
        "apiVersion": format!("{}/{}", modelserving_shared::api::API_GROUP, modelserving_shared::api::API_VERSION),
        "kind": "ModelServing",
        "status": desired,
    });
    api.patch_status(ms_name, &Patch::Merge(patch), &PatchParams::default())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::store::{GroupRecord, GroupStatus, RoleRecord};

    fn group(ordinal: u32, status: GroupStatus, revision: &str) -> GroupRecord {
        let mut g = GroupRecord::new(ordinal, revision.to_string());
        g.status = status;
        g.roles.insert("prefill".to_string(), RoleRecord::default());
        g
    }

    #[test]
    fn available_when_all_groups_converged() {
        let mut groups = HashMap::new();
        groups.insert("ms-0".to_string(), group(0, GroupStatus::Running, "rev1"));
        groups.insert("ms-1".to_string(), group(1, GroupStatus::Running, "rev1"));
        let status = compute_status(&groups, "rev1", 0);
        assert_eq!(status.replicas, 2);
        assert_eq!(status.available_replicas, 2);
        assert_eq!(status.updated_replicas, 2);
        let available = status
            .conditions
            .iter()
            .find(|c| c.type_ == ConditionType::Available)
            .unwrap();
        assert_eq!(available.status, ConditionStatus::True);
    }

    #[test]
    fn update_in_progress_past_partition() {
        let mut groups = HashMap::new();
        groups.insert("ms-0".to_string(), group(0, GroupStatus::Running, "old"));
        groups.insert("ms-1".to_string(), group(1, GroupStatus::Running, "new"));
        groups.insert("ms-2".to_string(), group(2, GroupStatus::Creating, "new"));
        // partition=0: ordinals >= 0 may update; updated_ordinals = [1,2] (2) > partition (0)
        let status = compute_status(&groups, "new", 0);
        let cond = status
            .conditions
            .iter()
            .find(|c| c.status == ConditionStatus::True)
            .unwrap();
        assert_eq!(cond.type_, ConditionType::UpdateInProgress);
    }

    #[test]
    fn progressing_when_updated_not_past_partition() {
        let mut groups = HashMap::new();
        groups.insert("ms-0".to_string(), group(0, GroupStatus::Running, "old"));
        groups.insert("ms-1".to_string(), group(1, GroupStatus::Creating, "new"));
        // partition=1: only ordinal 1 updated (count=1), not > partition(1) -> Progressing
        let status = compute_status(&groups, "new", 1);
        let cond = status
            .conditions
            .iter()
            .find(|c| c.status == ConditionStatus::True)
            .unwrap();
        assert_eq!(cond.type_, ConditionType::Progressing);
    }

    #[test]
    fn unchanged_status_skips_patch_detection() {
        let mut groups = HashMap::new();
        groups.insert("ms-0".to_string(), group(0, GroupStatus::Running, "rev1"));
        let desired = compute_status(&groups, "rev1", 0);
        assert!(!status_changed(&desired, &desired));
    }
}
