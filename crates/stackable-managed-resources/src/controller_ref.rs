//! Which owner controls a child object.
//!
//! An object may carry many owner references, but at most one of them is marked as the
//! controller. Only the controller decides about the lifecycle of the child.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;

/// Returns the owner reference of `child` that is marked as its controller.
pub fn controller_of<K: Resource>(child: &K) -> Option<&OwnerReference> {
    child
        .meta()
        .owner_references
        .iter()
        .flatten()
        .find(|reference| reference.controller == Some(true))
}

/// Whether `child` is controlled by the object `owner` points at.
///
/// The UID has to match together with the kind and API group. The version is ignored, the same
/// object can be referenced through any version of its group.
pub fn is_controlled_by<K: Resource>(child: &K, owner: &OwnerReference) -> bool {
    controller_of(child).is_some_and(|controller| refers_to_same_object(controller, owner))
}

fn refers_to_same_object(a: &OwnerReference, b: &OwnerReference) -> bool {
    a.uid == b.uid && a.kind == b.kind && api_group(&a.api_version) == api_group(&b.api_version)
}

/// `apps.example.com/v1` has the group `apps.example.com`, the core group `v1` is empty.
fn api_group(api_version: &str) -> &str {
    api_version
        .rsplit_once('/')
        .map_or("", |(group, _version)| group)
}
