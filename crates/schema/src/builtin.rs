//! Built-in registries.

use std::any::TypeId;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Endpoints, Namespace, Node, Pod, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::NamespaceResourceScope;
use kube::core::GroupVersionKind;

use crate::{ResourceSchema, Schemas};

/// Collection name used by [`basic`].
pub const COLLECTION1: &str = "collection1";

/// A single test collection `collection1` fed by `testdata.cfgsrc.io/v1alpha1` `Kind1`.
/// `spec`, when present, must be a mapping (enforced with `jsonschema-validate`).
pub fn basic() -> Schemas {
    std::iter::once(
        ResourceSchema::new(
            COLLECTION1,
            GroupVersionKind::gvk("testdata.cfgsrc.io", "v1alpha1", "Kind1"),
            "kind1s",
            true,
        )
        .with_openapi(kind1_openapi()),
    )
    .collect()
}

fn kind1_openapi() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "metadata": { "type": "object" },
            "spec": { "type": "object" }
        }
    })
}

/// Core Kubernetes kinds, named `k8s/<group|core>/<version>/<plural>`.
pub fn k8s() -> Schemas {
    vec![
        from_openapi::<ConfigMap>(),
        from_openapi::<Endpoints>(),
        from_openapi::<Namespace>(),
        from_openapi::<Node>(),
        from_openapi::<Pod>(),
        from_openapi::<Secret>(),
        from_openapi::<Service>(),
        from_openapi::<Deployment>(),
        from_openapi::<DaemonSet>(),
        from_openapi::<StatefulSet>(),
        from_openapi::<Ingress>(),
    ]
    .into_iter()
    .collect()
}

/// Collection name of a built-in k8s kind, e.g. `k8s/core/v1/services`.
pub fn k8s_collection<K: k8s_openapi::Resource>() -> String {
    let group = if K::GROUP.is_empty() { "core" } else { K::GROUP };
    format!("k8s/{}/{}/{}", group, K::VERSION, K::URL_PATH_SEGMENT)
}

fn from_openapi<K>() -> ResourceSchema
where
    K: k8s_openapi::Resource,
    K::Scope: 'static,
{
    let namespaced = TypeId::of::<K::Scope>() == TypeId::of::<NamespaceResourceScope>();
    ResourceSchema::new(
        k8s_collection::<K>(),
        GroupVersionKind::gvk(K::GROUP, K::VERSION, K::KIND),
        K::URL_PATH_SEGMENT,
        namespaced,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn k8s_registry_resolves_core_and_grouped_kinds() {
        let s = k8s();
        let svc = s.find("", "Service").expect("service registered");
        assert_eq!(svc.collection().as_str(), "k8s/core/v1/services");
        assert!(svc.is_namespaced());

        let node = s.find("", "Node").expect("node registered");
        assert!(!node.is_namespaced());

        let dep = s.find("apps", "Deployment").expect("deployment registered");
        assert_eq!(dep.collection().as_str(), "k8s/apps/v1/deployments");
        assert_eq!(dep.api_version(), "apps/v1");
    }

    #[test]
    fn basic_registry_has_one_collection() {
        let s = basic();
        assert_eq!(s.len(), 1);
        assert_eq!(s.find("testdata.cfgsrc.io", "Kind1").map(|r| r.collection().as_str()), Some(COLLECTION1));
        assert!(s.all()[0].openapi().is_some());
        assert!(k8s().all().iter().all(|r| r.openapi().is_none()));
    }
}
