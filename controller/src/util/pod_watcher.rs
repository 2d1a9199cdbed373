//! Watch Layer + Pod Lifecycle Handler (spec §4.1, §4.4).
//!
//! Subscribes to every pod carrying a `group-name` label — every pod this
//! controller itself creates, and nothing else, by construction (§3) — and
//! reacts to readiness, failure, and deletion. Grounded on the teacher's
//! `pod_watcher.rs`: a `watcher(...).default_backoff()` stream read in a
//! loop, dispatch per lifecycle transition, and a dedup guard so a repeated
//! event for the same pod doesn't re-run recovery twice. Updated to kube
//! 0.91's `watcher::Event::{Apply, Delete, Init, InitApply, InitDone}` (the
//! teacher's kube_runtime version instead names these
//! `Applied`/`Deleted`/`Restarted`), and retargeted at this crate's `Store`
//! and grace-period timer instead of the teacher's direct Instance/
//! Configuration service bookkeeping.

use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::{watcher, WatchStreamExt};
use kube::ResourceExt;
use log::{trace, warn};

use modelserving_shared::api::{
    ModelServing, RecoveryPolicy, LABEL_GROUP_NAME, LABEL_NAME, LABEL_REVISION, LABEL_ROLE, LABEL_ROLE_ID,
};
use modelserving_shared::k8s::{naming, revision};

use super::controller_ctx::ControllerContext;
use super::pod_action;
use super::store::{self, GroupStatus, RoleInstanceStatus};
use super::{ControllerError, Result};

/// Everything a pod's own labels tell us about which role instance it
/// belongs to (§3 "every pod we create carries these labels").
#[derive(Clone, Debug, PartialEq, Eq)]
struct PodIdentity {
    namespace: String,
    ms_name: String,
    group_name: String,
    role_name: String,
    role_index: i32,
}

/// Extracts a pod's owning role instance from its labels. `None` for
/// anything unlabeled or malformed — the watch's label selector keeps these
/// out in practice, but a defensive re-check costs nothing (§4.4 "malformed
/// or unlabeled objects are silently ignored").
fn pod_identity(pod: &Pod) -> Option<PodIdentity> {
    let namespace = pod.metadata.namespace.clone()?;
    let labels = pod.metadata.labels.as_ref()?;
    let ms_name = labels.get(LABEL_NAME)?.clone();
    let group_name = labels.get(LABEL_GROUP_NAME)?.clone();
    let role_name = labels.get(LABEL_ROLE)?.clone();
    let role_id = labels.get(LABEL_ROLE_ID)?;
    let (_, role_index) = naming::parse_role_id(role_id)?;
    // LABEL_REVISION is carried for observability/debugging only; the watch
    // handler always re-derives the authoritative role revision from the
    // live `ModelServing` spec rather than trusting the pod's own label.
    let _ = labels.get(LABEL_REVISION);
    Some(PodIdentity {
        namespace,
        ms_name,
        group_name,
        role_name,
        role_index,
    })
}

fn is_pod_ready(pod: &Pod) -> bool {
    let Some(status) = &pod.status else { return false };
    if status.phase.as_deref() != Some("Running") {
        return false;
    }
    status
        .conditions
        .as_ref()
        .map(|conds| conds.iter().any(|c| c.type_ == "Ready" && c.status == "True"))
        .unwrap_or(false)
}

/// A pod counts as errored if it has outright failed, or any of its
/// containers have restarted at least once — the signal the teacher's
/// `handle_ended_pod_if_needed`/`PodState::Ended` path reacts to, generalized
/// to also cover a crash-looping-but-still-"Running"-phase container.
fn pod_errored(pod: &Pod) -> bool {
    let Some(status) = &pod.status else { return false };
    if status.phase.as_deref() == Some("Failed") {
        return true;
    }
    let restarted = |statuses: &Vec<k8s_openapi::api::core::v1::ContainerStatus>| {
        statuses.iter().any(|c| c.restart_count > 0)
    };
    status.container_statuses.as_ref().map(restarted).unwrap_or(false)
        || status.init_container_statuses.as_ref().map(restarted).unwrap_or(false)
}

async fn enqueue(ctx: &Arc<ControllerContext>, namespace: &str, ms_name: &str) {
    let object_ref = ObjectRef::<ModelServing>::new(ms_name).within(namespace);
    if ctx.requeue.send(object_ref).await.is_err() {
        trace!("reconcile requeue channel closed, dropping trigger for {namespace}/{ms_name}");
    }
}

/// handleReady (§4.4): records the pod as running, and once every pod of its
/// role instance is ready, promotes the role instance, and once every role
/// of the group is fully converged, promotes the whole group.
async fn handle_ready(ctx: Arc<ControllerContext>, pod_name: &str, identity: &PodIdentity) -> Result<()> {
    let key = store::ms_key(&identity.namespace, &identity.ms_name);
    ctx.grace_timers
        .write()
        .await
        .remove(&(identity.namespace.clone(), pod_name.to_string()));

    let Some(instance) = ctx
        .store
        .record_running_pod(&key, &identity.group_name, &identity.role_name, identity.role_index, pod_name)
        .await
    else {
        trace!("pod {pod_name} became ready but its role instance is no longer tracked, ignoring");
        return Ok(());
    };

    if instance.running_pods.len() as i32 != instance.worker_replicas + 1 {
        return Ok(());
    }
    ctx.store
        .set_role_instance_status(&key, &identity.group_name, &identity.role_name, identity.role_index, RoleInstanceStatus::Running)
        .await;

    let Some(ms) = ctx.model_servings(&identity.namespace).get(&identity.ms_name).await? else {
        return Ok(());
    };
    if let Some(group) = ctx.store.group(&key, &identity.group_name).await {
        let all_roles_running = ms.spec.template.roles.iter().all(|role| {
            let role_revision = revision::role_revision(role);
            group
                .roles
                .get(&role.name)
                .map(|r| r.is_running_at(&role_revision, role.replicas))
                .unwrap_or(false)
        });
        if all_roles_running {
            ctx.store.set_group_status(&key, &identity.group_name, GroupStatus::Running).await;
        }
    }
    enqueue(&ctx, &identity.namespace, &identity.ms_name).await;
    Ok(())
}

/// handleError (§4.4, §5 "Grace-period timers"): drops the pod from the
/// running set immediately (demoting its group out of `Running`), then — if
/// a grace timer for this exact pod isn't already in flight — schedules a
/// deferred re-check. If the pod is still unready once the grace period
/// elapses and `recoveryPolicy` is `InferGroupRestart`, the whole role
/// instance is torn down so the next reconcile rebuilds every one of its
/// pods together (§4.3's step 6 role-healing pass), preserving the
/// "role restarts atomically" invariant. `recoveryPolicy: None` leaves the
/// pod's own `restartPolicy` to handle it.
async fn handle_error(ctx: Arc<ControllerContext>, pod_name: String, identity: PodIdentity) -> Result<()> {
    let key = store::ms_key(&identity.namespace, &identity.ms_name);
    ctx.store
        .drop_running_pod(&key, &identity.group_name, &identity.role_name, identity.role_index, &pod_name)
        .await;

    let timer_key = (identity.namespace.clone(), pod_name.clone());
    {
        let mut timers = ctx.grace_timers.write().await;
        if !timers.insert(timer_key.clone()) {
            trace!("grace timer already in flight for {pod_name}, ignoring duplicate error event");
            return Ok(());
        }
    }

    let Some(ms) = ctx.model_servings(&identity.namespace).get(&identity.ms_name).await? else {
        ctx.grace_timers.write().await.remove(&timer_key);
        return Ok(());
    };
    let grace = Duration::from_secs(ms.spec.template.restart_grace_period_seconds.max(0) as u64);
    let recovery_policy = ms.spec.recovery_policy;
    let worker_replicas = ctx
        .store
        .group(&key, &identity.group_name)
        .await
        .and_then(|g| {
            g.roles
                .get(&identity.role_name)
                .and_then(|r| r.instances.get(&identity.role_index).map(|i| i.worker_replicas))
        })
        .unwrap_or(0);

    let ctx_for_task = ctx.clone();
    let identity_for_task = identity.clone();
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        let still_unready = match ctx_for_task.pods(&identity_for_task.namespace).get(&pod_name).await {
            Ok(Some(p)) => !is_pod_ready(&p),
            Ok(None) => false,
            Err(e) => {
                warn!("grace-period re-check of {pod_name} failed, assuming still unready: {e}");
                true
            }
        };
        if still_unready && recovery_policy == RecoveryPolicy::InferGroupRestart {
            if let Err(e) = pod_action::delete_role_instance_by_name(
                ctx_for_task.clone(),
                &identity_for_task.namespace,
                &identity_for_task.group_name,
                &identity_for_task.role_name,
                identity_for_task.role_index,
                worker_replicas,
            )
            .await
            {
                warn!("role rebuild delete failed after grace period for {pod_name}: {e:?}");
            }
            let key = store::ms_key(&identity_for_task.namespace, &identity_for_task.ms_name);
            ctx_for_task
                .store
                .remove_role_instance(&key, &identity_for_task.group_name, &identity_for_task.role_name, identity_for_task.role_index)
                .await;
            enqueue(&ctx_for_task, &identity_for_task.namespace, &identity_for_task.ms_name).await;
        }
        ctx_for_task
            .grace_timers
            .write()
            .await
            .remove(&(identity_for_task.namespace.clone(), pod_name.clone()));
    });
    Ok(())
}

/// onDelete (§4.4): a pod disappearing always drops it from the running
/// set and cancels any in-flight grace timer (deletion pre-empts the
/// timer's own re-check). If `recoveryPolicy` is `InferGroupRestart`, the
/// rest of the role instance is torn down too, so a single deleted pod
/// rebuilds its whole role rather than leaving mismatched siblings behind.
async fn handle_delete(ctx: Arc<ControllerContext>, pod: Pod) -> Result<()> {
    let Some(identity) = pod_identity(&pod) else { return Ok(()) };
    let pod_name = pod.name_any();
    let key = store::ms_key(&identity.namespace, &identity.ms_name);

    ctx.store
        .drop_running_pod(&key, &identity.group_name, &identity.role_name, identity.role_index, &pod_name)
        .await;
    ctx.grace_timers
        .write()
        .await
        .remove(&(identity.namespace.clone(), pod_name.clone()));

    let Some(ms) = ctx.model_servings(&identity.namespace).get(&identity.ms_name).await? else {
        return Ok(());
    };
    if ms.spec.recovery_policy == RecoveryPolicy::InferGroupRestart {
        ctx.store
            .set_role_instance_status(&key, &identity.group_name, &identity.role_name, identity.role_index, RoleInstanceStatus::Deleting)
            .await;
        let worker_replicas = ctx
            .store
            .group(&key, &identity.group_name)
            .await
            .and_then(|g| {
                g.roles
                    .get(&identity.role_name)
                    .and_then(|r| r.instances.get(&identity.role_index).map(|i| i.worker_replicas))
            })
            .unwrap_or(0);
        pod_action::delete_role_instance_by_name(
            ctx.clone(),
            &identity.namespace,
            &identity.group_name,
            &identity.role_name,
            identity.role_index,
            worker_replicas,
        )
        .await?;
        ctx.store
            .remove_role_instance(&key, &identity.group_name, &identity.role_name, identity.role_index)
            .await;
    }
    enqueue(&ctx, &identity.namespace, &identity.ms_name).await;
    Ok(())
}

async fn handle_apply(ctx: Arc<ControllerContext>, pod: Pod) -> Result<()> {
    let Some(identity) = pod_identity(&pod) else { return Ok(()) };
    if pod.metadata.deletion_timestamp.is_some() {
        // Terminating; the corresponding `Delete` event drives cleanup once
        // it actually leaves the API server.
        return Ok(());
    }
    let pod_name = pod.name_any();
    if is_pod_ready(&pod) {
        handle_ready(ctx, &pod_name, &identity).await
    } else if pod_errored(&pod) {
        handle_error(ctx, pod_name, identity).await
    } else {
        Ok(())
    }
}

async fn dispatch(ctx: Arc<ControllerContext>, event: watcher::Event<Pod>) -> Result<()> {
    match event {
        watcher::Event::Apply(pod) | watcher::Event::InitApply(pod) => handle_apply(ctx, pod).await,
        watcher::Event::Delete(pod) => handle_delete(ctx, pod).await,
        watcher::Event::Init | watcher::Event::InitDone => Ok(()),
    }
}

async fn watch_once(ctx: Arc<ControllerContext>) -> Result<()> {
    let api = ctx.pods_all().as_inner();
    let config = watcher::Config::default().labels(LABEL_GROUP_NAME);
    let mut stream = watcher(api, config).default_backoff().boxed();
    while let Some(event) = stream
        .try_next()
        .await
        .map_err(ControllerError::WatcherError)?
    {
        if let Err(e) = dispatch(ctx.clone(), event).await {
            warn!("pod watch event handling failed: {e:?}");
        }
    }
    Ok(())
}

/// Runs the pod watch loop forever, restarting the underlying watch stream
/// (with a short backoff) if it ever terminates with an error — mirroring
/// the teacher's `pod_watcher::watch` being wrapped in a `loop` at its call
/// site in `main.rs`.
pub async fn run(ctx: Arc<ControllerContext>) {
    loop {
        if let Err(e) = watch_once(ctx.clone()).await {
            warn!("pod watch stream ended with error, restarting in 5s: {e:?}");
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{ContainerStatus, PodCondition, PodStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
    use std::collections::BTreeMap;

    fn labeled_pod(ready: bool, restart_count: i32) -> Pod {
        let mut labels = BTreeMap::new();
        labels.insert(LABEL_NAME.to_string(), "test-mi".to_string());
        labels.insert(LABEL_GROUP_NAME.to_string(), "test-mi-0".to_string());
        labels.insert(LABEL_ROLE.to_string(), "prefill".to_string());
        labels.insert(LABEL_ROLE_ID.to_string(), "prefill-0".to_string());
        labels.insert(LABEL_REVISION.to_string(), "rev1".to_string());

        Pod {
            metadata: ObjectMeta {
                name: Some("test-mi-0-prefill-0-0".to_string()),
                namespace: Some("default".to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            status: Some(PodStatus {
                phase: Some(if ready { "Running".to_string() } else { "Pending".to_string() }),
                conditions: Some(vec![PodCondition {
                    type_: "Ready".to_string(),
                    status: if ready { "True".to_string() } else { "False".to_string() },
                    ..Default::default()
                }]),
                container_statuses: Some(vec![ContainerStatus {
                    name: "main".to_string(),
                    restart_count,
                    image: String::new(),
                    image_id: String::new(),
                    ready: false,
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn extracts_identity_from_labels() {
        let pod = labeled_pod(true, 0);
        let identity = pod_identity(&pod).unwrap();
        assert_eq!(identity.namespace, "default");
        assert_eq!(identity.ms_name, "test-mi");
        assert_eq!(identity.group_name, "test-mi-0");
        assert_eq!(identity.role_name, "prefill");
        assert_eq!(identity.role_index, 0);
    }

    #[test]
    fn unlabeled_pod_has_no_identity() {
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("stray".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(pod_identity(&pod).is_none());
    }

    #[test]
    fn ready_pod_is_detected() {
        assert!(is_pod_ready(&labeled_pod(true, 0)));
        assert!(!is_pod_ready(&labeled_pod(false, 0)));
    }

    #[test]
    fn restarted_container_counts_as_errored() {
        assert!(pod_errored(&labeled_pod(false, 1)));
        assert!(!pod_errored(&labeled_pod(false, 0)));
    }

    #[test]
    fn deletion_timestamp_is_ignored_by_apply_detection() {
        let mut pod = labeled_pod(true, 0);
        pod.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
        assert!(pod.metadata.deletion_timestamp.is_some());
    }
}
