//! The owner side of an ownership relation.
//!
//! An owner is anything that can be pointed at by an [`OwnerReference`]: it needs a UID, an API
//! version, a kind and a name. Every statically typed [`Resource`] (built-in kinds as well as
//! custom resources derived with `kube::CustomResource`) is an [`Owner`] out of the box.
//! [`OwnerIdentity`] covers the case where only the identifying fields are known.
//!
//! [`OwnerReference`]: k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference

use std::borrow::Cow;

use kube::Resource;

/// Read-only view of the identity of an object that owns other objects.
///
/// Accessors return [`None`] for fields the object does not (yet) carry, e.g. the UID of an object
/// that was never persisted.
pub trait Owner {
    fn owner_uid(&self) -> Option<Cow<'_, str>>;
    fn owner_api_version(&self) -> Option<Cow<'_, str>>;
    fn owner_kind(&self) -> Option<Cow<'_, str>>;
    fn owner_name(&self) -> Option<Cow<'_, str>>;
}

impl<T> Owner for T
where
    T: Resource<DynamicType = ()>,
{
    fn owner_uid(&self) -> Option<Cow<'_, str>> {
        self.meta().uid.as_deref().map(Cow::Borrowed)
    }

    fn owner_api_version(&self) -> Option<Cow<'_, str>> {
        Some(T::api_version(&()))
    }

    fn owner_kind(&self) -> Option<Cow<'_, str>> {
        Some(T::kind(&()))
    }

    fn owner_name(&self) -> Option<Cow<'_, str>> {
        self.meta().name.as_deref().map(Cow::Borrowed)
    }
}

/// The bare identity of an owner, detached from the object itself.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct OwnerIdentity {
    pub uid: String,
    pub api_version: String,
    pub kind: String,
    pub name: String,
}

impl OwnerIdentity {
    pub fn new(
        uid: impl Into<String>,
        api_version: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            uid: uid.into(),
            api_version: api_version.into(),
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Captures the identity of any other [`Owner`], missing fields become empty strings.
    pub fn from_owner<O: Owner + ?Sized>(owner: &O) -> Self {
        fn owned(field: Option<Cow<'_, str>>) -> String {
            field.map(Cow::into_owned).unwrap_or_default()
        }

        Self {
            uid: owned(owner.owner_uid()),
            api_version: owned(owner.owner_api_version()),
            kind: owned(owner.owner_kind()),
            name: owned(owner.owner_name()),
        }
    }
}

impl Owner for OwnerIdentity {
    fn owner_uid(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Borrowed(&self.uid))
    }

    fn owner_api_version(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Borrowed(&self.api_version))
    }

    fn owner_kind(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Borrowed(&self.kind))
    }

    fn owner_name(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Borrowed(&self.name))
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::apps::v1::Deployment;
    use kube::api::ObjectMeta;

    use super::*;

    #[test]
    fn resource_is_an_owner() {
        let deployment = Deployment {
            metadata: ObjectMeta {
                name: Some("web".to_owned()),
                uid: Some("uid-1".to_owned()),
                ..ObjectMeta::default()
            },
            ..Deployment::default()
        };

        assert_eq!(
            OwnerIdentity::from_owner(&deployment),
            OwnerIdentity::new("uid-1", "apps/v1", "Deployment", "web")
        );
    }

    #[test]
    fn unpersisted_resource_has_no_uid() {
        let deployment = Deployment::default();

        assert_eq!(deployment.owner_uid(), None);
        assert_eq!(deployment.owner_name(), None);
        assert_eq!(deployment.owner_kind().as_deref(), Some("Deployment"));
    }
}
