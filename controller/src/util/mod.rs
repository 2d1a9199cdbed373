pub(crate) mod controller_ctx;
pub mod gang;
pub mod ms_reconcile;
pub mod pod_action;
pub mod pod_watcher;
pub mod status;
pub mod store;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error(transparent)]
    KubeError(#[from] kube::Error),

    #[error("Finalizer Error: {0}")]
    // NB: awkward type because finalizer::Error embeds the reconciler error (which is this)
    // so boxing this error to break cycles
    FinalizerError(#[source] Box<kube::runtime::finalizer::Error<ControllerError>>),

    #[error("Watcher Error: {0}")]
    WatcherError(#[from] kube::runtime::watcher::Error),

    #[error("spec rejected: {0}")]
    SpecRejected(String),

    #[error("store inconsistency: {0}")]
    StoreInconsistency(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T, E = ControllerError> = std::result::Result<T, E>;
