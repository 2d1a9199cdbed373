//! Revision is a pure function of a role's share of the infer-group template:
//! stable across pointer identity, and across semantically-equal maps and
//! slices (we hash serde's canonical JSON encoding rather than the in-memory
//! layout).

use crate::api::{InferGroupTemplate, RoleSpec};
use serde::Serialize;
use sha2::{Digest, Sha256};

const REVISION_LEN: usize = 10;

fn hash_hex(value: &impl Serialize) -> String {
    // `serde_json` emits object keys in the order they were inserted for
    // maps, but our inputs use `HashMap` only for `min_role_replicas`, whose
    // contents do not participate in a role's own revision, so canonical
    // ordering of the fields we do hash is guaranteed by struct field order.
    let json = serde_json::to_vec(value).expect("revision input is always serializable");
    let mut hasher = Sha256::new();
    hasher.update(&json);
    let digest = hasher.finalize();
    hex::encode(digest)[..REVISION_LEN].to_string()
}

/// The group-level revision: a hash of the whole infer-group template.
pub fn group_revision(template: &InferGroupTemplate) -> String {
    hash_hex(template)
}

/// A role's share of the group revision: a hash of just that role's spec.
/// Distinct from the group revision so that changing one role does not
/// appear to change the revision of unrelated roles' running pods.
pub fn role_revision(role: &RoleSpec) -> String {
    hash_hex(role)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::PodSpec;

    fn role(name: &str) -> RoleSpec {
        RoleSpec {
            name: name.to_string(),
            replicas: 1,
            entry_template: PodSpec::default(),
            worker_replicas: 0,
            worker_template: None,
        }
    }

    #[test]
    fn stable_across_separate_equal_values() {
        let a = role("prefill");
        let b = role("prefill");
        assert_eq!(role_revision(&a), role_revision(&b));
    }

    #[test]
    fn differs_when_spec_differs() {
        let a = role("prefill");
        let mut b = role("prefill");
        b.replicas = 2;
        assert_ne!(role_revision(&a), role_revision(&b));
    }

    #[test]
    fn group_revision_is_stable() {
        let t1 = InferGroupTemplate {
            roles: vec![role("prefill"), role("decode")],
            gang_schedule: None,
            restart_grace_period_seconds: 30,
        };
        let t2 = InferGroupTemplate {
            roles: vec![role("prefill"), role("decode")],
            gang_schedule: None,
            restart_grace_period_seconds: 30,
        };
        assert_eq!(group_revision(&t1), group_revision(&t2));
    }
}
