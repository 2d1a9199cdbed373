//! The authoritative in-memory model of group/role/role-instance lifecycle
//! state (spec §2 "Authoritative Store", §9 "Derived-state store vs. API
//! cache").
//!
//! The API server's pod/service caches are eventually consistent and
//! filtered by label selector; they are a fine source of *facts* but a poor
//! source of *decisions*. This store is the decision state: every scale,
//! rollout, and repair choice the reconciler makes is made against it, not
//! against a fresh list call. It is rebuilt from scratch whenever the
//! process restarts, by replaying the pod watcher's initial list (the store
//! carries no state that cannot be reconstructed from the cluster).
//!
//! Guarded by a single `tokio::sync::RwLock`; every read returns an owned
//! copy so callers never hold a reference into the lock past their own
//! critical section.

use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;

/// Lifecycle status of one infer group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupStatus {
    Creating,
    Running,
    Deleting,
    Scaling,
    NotFound,
}

/// Lifecycle status of one role instance (or, aggregated, of a role as a
/// whole across all of its instances).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoleInstanceStatus {
    Creating,
    Running,
    Deleting,
    NotFound,
}

/// One `(roleName, roleIndex)` pair: one entry pod, zero-or-more workers,
/// one headless service.
#[derive(Clone, Debug)]
pub struct RoleInstanceRecord {
    pub revision: String,
    pub status: RoleInstanceStatus,
    /// The role's `workerReplicas` at creation time, carried so a later
    /// delete (e.g. the role being dropped from the template entirely) can
    /// still reconstruct every worker pod name without consulting the spec.
    pub worker_replicas: i32,
    /// Names of pods belonging to this role instance currently observed
    /// Ready by the pod lifecycle handler.
    pub running_pods: HashSet<String>,
}

impl RoleInstanceRecord {
    pub fn new(revision: String, worker_replicas: i32) -> Self {
        RoleInstanceRecord {
            revision,
            status: RoleInstanceStatus::Creating,
            worker_replicas,
            running_pods: HashSet::new(),
        }
    }
}

/// All instances of a single named role (e.g. `prefill`) within one group.
#[derive(Clone, Debug, Default)]
pub struct RoleRecord {
    pub instances: HashMap<i32, RoleInstanceRecord>,
}

impl RoleRecord {
    /// True once every instance of this role is `Running` at `revision`.
    pub fn is_running_at(&self, revision: &str, expected_instances: i32) -> bool {
        self.instances.len() as i32 == expected_instances
            && self
                .instances
                .values()
                .all(|i| i.status == RoleInstanceStatus::Running && i.revision == revision)
    }
}

/// One infer group: `MS.name + "-" + ordinal`.
#[derive(Clone, Debug)]
pub struct GroupRecord {
    pub ordinal: u32,
    /// Revision the group is converging to (or has converged to).
    pub revision: String,
    pub status: GroupStatus,
    pub roles: HashMap<String, RoleRecord>,
    /// Set once a spec rejection (§7) condemns this group; suppresses
    /// repeat warnings on every subsequent sync.
    pub condemned_reason: Option<String>,
}

impl GroupRecord {
    pub fn new(ordinal: u32, revision: String) -> Self {
        GroupRecord {
            ordinal,
            revision,
            status: GroupStatus::Creating,
            roles: HashMap::new(),
            condemned_reason: None,
        }
    }

    /// A group is at its target revision once the group's own revision
    /// matches and every role it owns is `Running` there too.
    pub fn matches_revision(&self, target: &str) -> bool {
        self.revision == target
    }
}

/// `namespace/name` of a `ModelServing`, used as the store's outer key.
pub type MsKey = String;

pub fn ms_key(namespace: &str, name: &str) -> MsKey {
    format!("{namespace}/{name}")
}

#[derive(Default)]
pub struct Store {
    inner: RwLock<HashMap<MsKey, HashMap<String, GroupRecord>>>,
}

impl Store {
    pub fn new() -> Self {
        Store::default()
    }

    /// Returns an owned copy of every group currently tracked for `key`.
    /// Empty if the `ModelServing` has never been synced (caller should
    /// treat this the same as "load observed groups; none exist").
    pub async fn groups(&self, key: &MsKey) -> HashMap<String, GroupRecord> {
        self.inner
            .read()
            .await
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn group(&self, key: &MsKey, group_name: &str) -> Option<GroupRecord> {
        self.inner.read().await.get(key)?.get(group_name).cloned()
    }

    /// Inserts a new group record if absent; no-op if one is already
    /// tracked (idempotent create, §4.3 step 5).
    pub async fn ensure_group(&self, key: &MsKey, group_name: &str, ordinal: u32, revision: &str) {
        let mut guard = self.inner.write().await;
        let groups = guard.entry(key.clone()).or_default();
        groups
            .entry(group_name.to_string())
            .or_insert_with(|| GroupRecord::new(ordinal, revision.to_string()));
    }

    pub async fn set_group_status(&self, key: &MsKey, group_name: &str, status: GroupStatus) {
        let mut guard = self.inner.write().await;
        if let Some(group) = guard.get_mut(key).and_then(|g| g.get_mut(group_name)) {
            group.status = status;
        }
    }

    pub async fn set_group_revision(&self, key: &MsKey, group_name: &str, revision: &str) {
        let mut guard = self.inner.write().await;
        if let Some(group) = guard.get_mut(key).and_then(|g| g.get_mut(group_name)) {
            group.revision = revision.to_string();
        }
    }

    pub async fn condemn_group(&self, key: &MsKey, group_name: &str, reason: &str) {
        let mut guard = self.inner.write().await;
        if let Some(group) = guard.get_mut(key).and_then(|g| g.get_mut(group_name)) {
            group.condemned_reason = Some(reason.to_string());
        }
    }

    pub async fn remove_group(&self, key: &MsKey, group_name: &str) {
        if let Some(groups) = self.inner.write().await.get_mut(key) {
            groups.remove(group_name);
        }
    }

    /// Idempotent create of a role instance's tracking record.
    pub async fn ensure_role_instance(
        &self,
        key: &MsKey,
        group_name: &str,
        role_name: &str,
        role_index: i32,
        revision: &str,
        worker_replicas: i32,
    ) {
        let mut guard = self.inner.write().await;
        let Some(group) = guard.get_mut(key).and_then(|g| g.get_mut(group_name)) else {
            return;
        };
        let role = group.roles.entry(role_name.to_string()).or_default();
        role.instances
            .entry(role_index)
            .or_insert_with(|| RoleInstanceRecord::new(revision.to_string(), worker_replicas));
    }

    pub async fn remove_role_instance(
        &self,
        key: &MsKey,
        group_name: &str,
        role_name: &str,
        role_index: i32,
    ) {
        let mut guard = self.inner.write().await;
        if let Some(role) = guard
            .get_mut(key)
            .and_then(|g| g.get_mut(group_name))
            .and_then(|g| g.roles.get_mut(role_name))
        {
            role.instances.remove(&role_index);
        }
    }

    pub async fn remove_role(&self, key: &MsKey, group_name: &str, role_name: &str) {
        if let Some(group) = self.inner.write().await.get_mut(key).and_then(|g| g.get_mut(group_name)) {
            group.roles.remove(role_name);
        }
    }

    pub async fn set_role_instance_status(
        &self,
        key: &MsKey,
        group_name: &str,
        role_name: &str,
        role_index: i32,
        status: RoleInstanceStatus,
    ) {
        let mut guard = self.inner.write().await;
        if let Some(instance) = guard
            .get_mut(key)
            .and_then(|g| g.get_mut(group_name))
            .and_then(|g| g.roles.get_mut(role_name))
            .and_then(|r| r.instances.get_mut(&role_index))
        {
            instance.status = status;
        }
    }

    /// Records `pod_name` as running for its role instance. Returns the
    /// updated role instance (if the instance is still tracked) so the
    /// caller can decide whether the role/group has become fully ready
    /// without taking a second lock.
    pub async fn record_running_pod(
        &self,
        key: &MsKey,
        group_name: &str,
        role_name: &str,
        role_index: i32,
        pod_name: &str,
    ) -> Option<RoleInstanceRecord> {
        let mut guard = self.inner.write().await;
        let instance = guard
            .get_mut(key)
            .and_then(|g| g.get_mut(group_name))
            .and_then(|g| g.roles.get_mut(role_name))
            .and_then(|r| r.instances.get_mut(&role_index))?;
        instance.running_pods.insert(pod_name.to_string());
        Some(instance.clone())
    }

    /// Drops `pod_name` from its role instance's running set (pod failed or
    /// was deleted). If the owning group was `Running`, demotes it to
    /// `Creating` per §4.4 handleError.
    pub async fn drop_running_pod(
        &self,
        key: &MsKey,
        group_name: &str,
        role_name: &str,
        role_index: i32,
        pod_name: &str,
    ) {
        let mut guard = self.inner.write().await;
        let Some(group) = guard.get_mut(key).and_then(|g| g.get_mut(group_name)) else {
            return;
        };
        if let Some(instance) = group
            .roles
            .get_mut(role_name)
            .and_then(|r| r.instances.get_mut(&role_index))
        {
            instance.running_pods.remove(pod_name);
        }
        if group.status == GroupStatus::Running {
            group.status = GroupStatus::Creating;
        }
    }

    /// Total pods currently observed running across every role instance of
    /// `group_name`.
    pub async fn running_pod_count(&self, key: &MsKey, group_name: &str) -> usize {
        let guard = self.inner.read().await;
        guard
            .get(key)
            .and_then(|g| g.get(group_name))
            .map(|g| {
                g.roles
                    .values()
                    .flat_map(|r| r.instances.values())
                    .map(|i| i.running_pods.len())
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Drops every group tracked for `key` (used when the owning
    /// `ModelServing` is no longer found — cascading deletion handles the
    /// cluster objects, the store just stops tracking decision state).
    pub async fn remove_ms(&self, key: &MsKey) {
        self.inner.write().await.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ensure_group_is_idempotent() {
        let store = Store::new();
        let key = ms_key("default", "test-mi");
        store.ensure_group(&key, "test-mi-0", 0, "rev1").await;
        store.ensure_group(&key, "test-mi-0", 0, "rev2").await;
        let groups = store.groups(&key).await;
        assert_eq!(groups.len(), 1);
        assert_eq!(groups["test-mi-0"].revision, "rev1");
    }

    #[tokio::test]
    async fn record_running_pod_tracks_set() {
        let store = Store::new();
        let key = ms_key("default", "test-mi");
        store.ensure_group(&key, "test-mi-0", 0, "rev1").await;
        store
            .ensure_role_instance(&key, "test-mi-0", "prefill", 0, "rev1", 0)
            .await;
        let instance = store
            .record_running_pod(&key, "test-mi-0", "prefill", 0, "test-mi-0-prefill-0-0")
            .await
            .unwrap();
        assert!(instance.running_pods.contains("test-mi-0-prefill-0-0"));
    }

    #[tokio::test]
    async fn drop_running_pod_demotes_running_group() {
        let store = Store::new();
        let key = ms_key("default", "test-mi");
        store.ensure_group(&key, "test-mi-0", 0, "rev1").await;
        store.set_group_status(&key, "test-mi-0", GroupStatus::Running).await;
        store
            .ensure_role_instance(&key, "test-mi-0", "prefill", 0, "rev1", 0)
            .await;
        store
            .record_running_pod(&key, "test-mi-0", "prefill", 0, "p")
            .await;
        store
            .drop_running_pod(&key, "test-mi-0", "prefill", 0, "p")
            .await;
        let group = store.group(&key, "test-mi-0").await.unwrap();
        assert_eq!(group.status, GroupStatus::Creating);
    }
}
