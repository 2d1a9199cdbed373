use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use modelserving_shared::api::{ModelServing, PodGroup};
use modelserving_shared::k8s::api::{Api, IntoApi};

use k8s_openapi::api::core::v1::{Pod, Service};
use tokio::sync::{mpsc, RwLock};

use super::store::Store;

/// Everything the reconciler and pod watcher need a scoped `kube::Api` for.
/// Grounded on the teacher's `ControllerKubeClient` trait alias over
/// `IntoApi`, generalized from `{Instance, Configuration, Pod, Job, Service,
/// Node}` to the types this controller actually creates.
pub trait ControllerKubeClient:
    IntoApi<ModelServing> + IntoApi<Pod> + IntoApi<Service> + IntoApi<PodGroup>
{
}

impl<T: IntoApi<ModelServing> + IntoApi<Pod> + IntoApi<Service> + IntoApi<PodGroup>>
    ControllerKubeClient for T
{
}

/// Shared state for one controller process.
pub struct ControllerContext {
    pub client: Arc<dyn ControllerKubeClient>,
    pub store: Arc<Store>,
    /// `(namespace, podName)` pairs with a grace-period timer already
    /// in flight, so `handleError` events for the same pod dedupe (§4.4,
    /// §5 "Grace-period timers").
    pub grace_timers: RwLock<HashSet<(String, String)>>,
    /// The only scheduler name `ModelServing.spec.schedulerName` may carry;
    /// `reconcile_inner` rejects any other value as a spec rejection (§3, §7).
    pub scheduler_name: String,
    /// Sender side of the channel the pod watcher uses to request a
    /// reconcile of an owning `ModelServing` (fed into
    /// `Controller::reconcile_on`, mirroring the teacher's
    /// `discovery_configuration_controller::start_controller`).
    pub requeue: mpsc::Sender<kube::runtime::reflector::ObjectRef<ModelServing>>,
    /// Per-key exponential backoff state for `error_policy`, grounded on the
    /// teacher's `discovery_configuration_controller::ControllerContext`
    /// (`error_backoffs: Mutex<HashMap<String, Duration>>`, doubled on every
    /// failure and cleared on success).
    pub error_backoffs: Mutex<HashMap<String, Duration>>,
}

impl ControllerContext {
    pub fn new(
        client: Arc<dyn ControllerKubeClient>,
        scheduler_name: String,
        requeue: mpsc::Sender<kube::runtime::reflector::ObjectRef<ModelServing>>,
    ) -> Self {
        ControllerContext {
            client,
            store: Arc::new(Store::new()),
            grace_timers: RwLock::new(HashSet::new()),
            scheduler_name,
            requeue,
            error_backoffs: Mutex::new(HashMap::new()),
        }
    }

    /// Resource-scoped accessors. `ControllerKubeClient` bundles `IntoApi`
    /// for several distinct resource types on the same trait object, so a
    /// bare `ctx.client.namespaced(ns)` can't tell which `namespaced` to
    /// call — these give each resource its own unambiguous name, the way
    /// the teacher's `KubeInterface` exposes `create_pod`/`create_service`
    /// as distinct methods rather than one generic call.
    pub fn pods(&self, namespace: &str) -> Box<dyn Api<Pod>> {
        IntoApi::<Pod>::namespaced(self.client.as_ref(), namespace)
    }

    /// Cluster-wide pod handle for the watch layer (§4.1), which watches
    /// every namespace at once rather than one namespace at a time.
    pub fn pods_all(&self) -> Box<dyn Api<Pod>> {
        IntoApi::<Pod>::all(self.client.as_ref())
    }

    pub fn services(&self, namespace: &str) -> Box<dyn Api<Service>> {
        IntoApi::<Service>::namespaced(self.client.as_ref(), namespace)
    }

    pub fn pod_groups(&self, namespace: &str) -> Box<dyn Api<PodGroup>> {
        IntoApi::<PodGroup>::namespaced(self.client.as_ref(), namespace)
    }

    pub fn model_servings(&self, namespace: &str) -> Box<dyn Api<ModelServing>> {
        IntoApi::<ModelServing>::namespaced(self.client.as_ref(), namespace)
    }

    pub fn model_servings_all(&self) -> Box<dyn Api<ModelServing>> {
        IntoApi::<ModelServing>::all(self.client.as_ref())
    }
}
