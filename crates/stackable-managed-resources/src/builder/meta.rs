use std::{borrow::Cow, collections::BTreeMap};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use snafu::{OptionExt, Snafu, ensure};

use crate::owner::Owner;

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum Error {
    #[snafu(display("owner reference is missing the {field:?} field"))]
    MissingField { field: &'static str },

    #[snafu(display("owner reference field {field:?} must not be empty"))]
    EmptyField { field: &'static str },
}

impl Error {
    /// The owner reference field this error refers to.
    pub fn field(&self) -> &'static str {
        match self {
            Error::MissingField { field } | Error::EmptyField { field } => field,
        }
    }
}

/// A builder to build [`ObjectMeta`] objects for managed children.
///
/// Of special interest is the [`Self::ownerreference_from_owner()`] function.
/// Note: This builder only supports a single `OwnerReference`.
#[derive(Clone, Debug, Default)]
pub struct ObjectMetaBuilder {
    name: Option<String>,
    namespace: Option<String>,
    ownerreference: Option<OwnerReference>,
    labels: Option<BTreeMap<String, String>>,
}

impl ObjectMetaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self
    }

    pub fn namespace(&mut self, namespace: impl Into<String>) -> &mut Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// This can be used to set the `OwnerReference` to the provided owner.
    pub fn ownerreference_from_owner<O: Owner + ?Sized>(
        &mut self,
        owner: &O,
        block_owner_deletion: Option<bool>,
        controller: Option<bool>,
    ) -> Result<&mut Self> {
        self.ownerreference = Some(
            OwnerReferenceBuilder::new()
                .initialize_from_owner(owner)
                .block_owner_deletion_opt(block_owner_deletion)
                .controller_opt(controller)
                .build()?,
        );
        Ok(self)
    }

    /// This adds a single label to the existing labels.
    /// It'll override a label with the same key.
    pub fn with_label(
        &mut self,
        label_key: impl Into<String>,
        label_value: impl Into<String>,
    ) -> &mut Self {
        self.labels
            .get_or_insert_with(BTreeMap::new)
            .insert(label_key.into(), label_value.into());
        self
    }

    pub fn build(&self) -> ObjectMeta {
        ObjectMeta {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            owner_references: self
                .ownerreference
                .as_ref()
                .map(|ownerreference| vec![ownerreference.clone()]),
            labels: self.labels.clone(),
            ..ObjectMeta::default()
        }
    }
}

/// A builder to build [`OwnerReference`] objects.
///
/// Of special interest is the [`Self::initialize_from_owner()`] function.
#[derive(Clone, Debug, Default)]
pub struct OwnerReferenceBuilder {
    api_version: Option<String>,
    block_owner_deletion: Option<bool>,
    controller: Option<bool>,
    kind: Option<String>,
    name: Option<String>,
    uid: Option<String>,
}

impl OwnerReferenceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn api_version(&mut self, api_version: impl Into<String>) -> &mut Self {
        self.api_version = Some(api_version.into());
        self
    }

    pub fn api_version_opt(&mut self, api_version: impl Into<Option<String>>) -> &mut Self {
        self.api_version = api_version.into();
        self
    }

    pub fn block_owner_deletion(&mut self, block_owner_deletion: bool) -> &mut Self {
        self.block_owner_deletion = Some(block_owner_deletion);
        self
    }

    pub fn block_owner_deletion_opt(&mut self, block_owner_deletion: Option<bool>) -> &mut Self {
        self.block_owner_deletion = block_owner_deletion;
        self
    }

    pub fn controller(&mut self, controller: bool) -> &mut Self {
        self.controller = Some(controller);
        self
    }

    pub fn controller_opt(&mut self, controller: Option<bool>) -> &mut Self {
        self.controller = controller;
        self
    }

    pub fn kind(&mut self, kind: impl Into<String>) -> &mut Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn kind_opt(&mut self, kind: impl Into<Option<String>>) -> &mut Self {
        self.kind = kind.into();
        self
    }

    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self
    }

    pub fn name_opt(&mut self, name: impl Into<Option<String>>) -> &mut Self {
        self.name = name.into();
        self
    }

    pub fn uid(&mut self, uid: impl Into<String>) -> &mut Self {
        self.uid = Some(uid.into());
        self
    }

    pub fn uid_opt(&mut self, uid: impl Into<Option<String>>) -> &mut Self {
        self.uid = uid.into();
        self
    }

    /// Can be used to initialize a builder with the identity of an owner.
    /// The builder will create an `OwnerReference` that points to the passed owner.
    ///
    /// This will _not_ set `controller` or `block_owner_deletion`.
    pub fn initialize_from_owner<O: Owner + ?Sized>(&mut self, owner: &O) -> &mut Self {
        self.api_version_opt(owner.owner_api_version().map(Cow::into_owned))
            .kind_opt(owner.owner_kind().map(Cow::into_owned))
            .name_opt(owner.owner_name().map(Cow::into_owned))
            .uid_opt(owner.owner_uid().map(Cow::into_owned))
    }

    /// Builds the reference. All four identifying fields must be set and non-empty, otherwise
    /// the garbage collector would silently fail to resolve the owner.
    pub fn build(&self) -> Result<OwnerReference> {
        Ok(OwnerReference {
            api_version: required_field(self.api_version.as_deref(), "apiVersion")?,
            block_owner_deletion: self.block_owner_deletion,
            controller: self.controller,
            kind: required_field(self.kind.as_deref(), "kind")?,
            name: required_field(self.name.as_deref(), "name")?,
            uid: required_field(self.uid.as_deref(), "uid")?,
        })
    }
}

fn required_field(value: Option<&str>, field: &'static str) -> Result<String> {
    let value = value.context(MissingFieldSnafu { field })?;
    ensure!(!value.is_empty(), EmptyFieldSnafu { field });
    Ok(value.to_owned())
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::Pod;
    use rstest::rstest;

    use super::*;
    use crate::owner::OwnerIdentity;

    #[test]
    fn test_objectmeta_builder() {
        let mut pod = Pod::default();
        pod.metadata.name = Some("pod".to_string());
        pod.metadata.uid = Some("uid".to_string());

        let meta = ObjectMetaBuilder::new()
            .name("foo")
            .namespace("bar")
            .ownerreference_from_owner(&pod, Some(true), Some(false))
            .unwrap()
            .with_label("app.kubernetes.io/name", "pod")
            .with_label("app.kubernetes.io/name", "my-pod")
            .build();

        assert_eq!(meta.name, Some("foo".to_string()));
        assert_eq!(meta.namespace, Some("bar".to_string()));
        assert_eq!(meta.owner_references.as_ref().unwrap().len(), 1);
        assert!(matches!(
            meta.owner_references.unwrap().first(),
            Some(OwnerReference { uid, kind, block_owner_deletion: Some(true), controller: Some(false), .. })
                if uid == "uid" && kind == "Pod"
        ));
        let labels = meta.labels.unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(
            labels.get("app.kubernetes.io/name"),
            Some(&"my-pod".to_string())
        );
    }

    #[test]
    fn objectmeta_builder_rejects_unpersisted_owner() {
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("pod".to_string()),
                ..ObjectMeta::default()
            },
            ..Pod::default()
        };

        let err = ObjectMetaBuilder::new()
            .ownerreference_from_owner(&pod, None, None)
            .unwrap_err();
        assert_eq!(err, Error::MissingField { field: "uid" });
    }

    #[test]
    fn ownerreference_builder_copies_identity() {
        let owner = OwnerIdentity::new("abc-123", "apps.example.com/v1", "Widget", "my-widget");

        let reference = OwnerReferenceBuilder::new()
            .initialize_from_owner(&owner)
            .build()
            .unwrap();

        assert_eq!(
            reference,
            OwnerReference {
                uid: "abc-123".to_string(),
                api_version: "apps.example.com/v1".to_string(),
                kind: "Widget".to_string(),
                name: "my-widget".to_string(),
                block_owner_deletion: None,
                controller: None,
            }
        );
    }

    #[rstest]
    #[case::uid(OwnerIdentity::new("", "v1", "Widget", "w"), "uid")]
    #[case::api_version(OwnerIdentity::new("u", "", "Widget", "w"), "apiVersion")]
    #[case::kind(OwnerIdentity::new("u", "v1", "", "w"), "kind")]
    #[case::name(OwnerIdentity::new("u", "v1", "Widget", ""), "name")]
    fn ownerreference_builder_rejects_empty_fields(
        #[case] owner: OwnerIdentity,
        #[case] field: &str,
    ) {
        let err = OwnerReferenceBuilder::new()
            .initialize_from_owner(&owner)
            .build()
            .unwrap_err();

        assert!(matches!(err, Error::EmptyField { .. }));
        assert_eq!(err.field(), field);
    }

    #[test]
    fn ownerreference_builder_requires_all_fields() {
        let err = OwnerReferenceBuilder::new()
            .api_version("v1")
            .kind("ConfigMap")
            .uid("u")
            .build()
            .unwrap_err();

        assert_eq!(err, Error::MissingField { field: "name" });
    }
}
