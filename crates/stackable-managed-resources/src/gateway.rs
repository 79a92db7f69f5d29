//! The managed resource gateway.
//!
//! A reconcile loop uses the [`ResourceGateway`] to find out whether a child object already
//! exists, to attach an owner reference to new children and to remove children that are no
//! longer desired. Every call re-resolves against the cluster, nothing is cached.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use snafu::{ResultExt, Snafu};
use tracing::instrument;

use crate::{
    builder::meta::{self, ObjectMetaBuilder, OwnerReferenceBuilder},
    client::{self, ClusterClient, Deletion, ManagedResource},
    controller_ref,
    owner::Owner,
    validation,
};

/// Label key naming the tool that manages an object.
pub const APP_KUBERNETES_IO_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
/// Label key naming the instance an object belongs to.
pub const APP_KUBERNETES_IO_INSTANCE: &str = "app.kubernetes.io/instance";

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("invalid {kind} name {name:?}"))]
    InvalidResourceName {
        source: validation::Errors,
        kind: String,
        name: String,
    },

    #[snafu(display("unable to determine whether {kind} {name:?} exists"))]
    Lookup {
        source: client::Error,
        kind: String,
        name: String,
    },

    #[snafu(display("failed to request deletion of {kind} {name:?}"))]
    Delete {
        source: client::Error,
        kind: String,
        name: String,
    },

    #[snafu(display("failed to build owner reference"))]
    OwnerReference { source: meta::Error },
}

impl Error {
    /// The cluster could not be asked, the outcome of the request is unknown.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Lookup { .. } | Error::Delete { .. })
    }

    /// The input was rejected before any request was sent.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidResourceName { .. } | Error::OwnerReference { .. }
        )
    }
}

/// What [`ResourceGateway::delete_owned`] did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OwnedDeletion {
    /// The child was controlled by the owner and its deletion was requested.
    Requested,

    /// There was no such child.
    Absent,

    /// The child exists but is controlled by someone else (or nobody), it was left alone.
    NotOwned { controller_uid: Option<String> },
}

/// Existence checks, deletes and owner references for the children of an owner.
///
/// All operations are scoped to the namespace of the underlying [`ClusterClient`].
#[derive(Clone, Debug)]
pub struct ResourceGateway<C> {
    client: C,
    manager: Option<String>,
}

impl<C: ClusterClient> ResourceGateway<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            manager: None,
        }
    }

    /// Sets the value of the `app.kubernetes.io/managed-by` label on child metadata.
    pub fn with_manager(mut self, manager: impl Into<String>) -> Self {
        self.manager = Some(manager.into());
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// The namespace all operations are scoped to.
    pub fn namespace(&self) -> &str {
        self.client.namespace()
    }

    /// Looks up the child of kind `K` called `name`.
    ///
    /// Returns [`None`] if there is no such object. Failing to reach the cluster is an
    /// [`Error::Lookup`], never [`None`].
    #[instrument(skip(self), fields(kind = %K::kind(&()), namespace = %self.namespace()))]
    pub async fn exists<K: ManagedResource>(&self, name: &str) -> Result<Option<K>> {
        validate_name::<K>(name)?;

        self.client
            .get_opt::<K>(name, self.namespace())
            .await
            .with_context(|_| LookupSnafu {
                kind: K::kind(&()),
                name,
            })
    }

    /// Requests deletion of the child of kind `K` called `name`.
    ///
    /// Deleting a child that does not exist succeeds. This does not wait for the object to be
    /// removed, poll [`Self::exists`] if that is needed.
    #[instrument(skip(self), fields(kind = %K::kind(&()), namespace = %self.namespace()))]
    pub async fn delete<K: ManagedResource>(&self, name: &str) -> Result<()> {
        self.request_deletion::<K>(name).await.map(|_| ())
    }

    /// Requests deletion of the child of kind `K` called `name` only if it is controlled by
    /// `owner`.
    ///
    /// Children adopted by another controller (or not controlled at all) are never touched.
    #[instrument(skip(self, owner), fields(kind = %K::kind(&()), namespace = %self.namespace()))]
    pub async fn delete_owned<K, O>(&self, name: &str, owner: &O) -> Result<OwnedDeletion>
    where
        K: ManagedResource,
        O: Owner + Sync + ?Sized,
    {
        let owner_reference = self.create_owner_reference(owner)?;
        let Some(child) = self.exists::<K>(name).await? else {
            return Ok(OwnedDeletion::Absent);
        };

        if !controller_ref::is_controlled_by(&child, &owner_reference) {
            let controller_uid =
                controller_ref::controller_of(&child).map(|controller| controller.uid.clone());
            return Ok(OwnedDeletion::NotOwned { controller_uid });
        }

        // The child may have vanished in between, which is just as good
        Ok(match self.request_deletion::<K>(name).await? {
            Deletion::Requested => OwnedDeletion::Requested,
            Deletion::AlreadyAbsent => OwnedDeletion::Absent,
        })
    }

    /// Creates an [`OwnerReference`] pointing at `owner`, see [`create_owner_reference`].
    pub fn create_owner_reference<O: Owner + ?Sized>(&self, owner: &O) -> Result<OwnerReference> {
        create_owner_reference(owner)
    }

    /// Creates a controller reference pointing at `owner`, see [`create_controller_reference`].
    pub fn create_controller_reference<O: Owner + ?Sized>(
        &self,
        owner: &O,
    ) -> Result<OwnerReference> {
        create_controller_reference(owner)
    }

    /// Builds the metadata for a new child called `name` in the gateway namespace, controlled by
    /// `owner`.
    pub fn child_metadata<O: Owner + ?Sized>(&self, name: &str, owner: &O) -> Result<ObjectMeta> {
        let mut builder = ObjectMetaBuilder::new();
        builder
            .name(name)
            .namespace(self.namespace())
            .ownerreference_from_owner(owner, Some(true), Some(true))
            .context(OwnerReferenceSnafu)?
            .with_label(
                APP_KUBERNETES_IO_INSTANCE,
                owner.owner_name().unwrap_or_default(),
            );
        if let Some(manager) = &self.manager {
            builder.with_label(APP_KUBERNETES_IO_MANAGED_BY, manager.clone());
        }

        Ok(builder.build())
    }

    async fn request_deletion<K: ManagedResource>(&self, name: &str) -> Result<Deletion> {
        validate_name::<K>(name)?;

        self.client
            .delete::<K>(name, self.namespace())
            .await
            .with_context(|_| DeleteSnafu {
                kind: K::kind(&()),
                name,
            })
    }
}

/// Creates an [`OwnerReference`] pointing at `owner`.
///
/// Fails if the UID, API version, kind or name of the owner is missing or empty, such a
/// reference would never be resolved by the garbage collector.
pub fn create_owner_reference<O: Owner + ?Sized>(owner: &O) -> Result<OwnerReference> {
    OwnerReferenceBuilder::new()
        .initialize_from_owner(owner)
        .build()
        .context(OwnerReferenceSnafu)
}

/// Like [`create_owner_reference`], but marks `owner` as the controller of the child and blocks
/// deletion of the owner until the child is gone when deleting in the foreground.
pub fn create_controller_reference<O: Owner + ?Sized>(owner: &O) -> Result<OwnerReference> {
    OwnerReferenceBuilder::new()
        .initialize_from_owner(owner)
        .controller(true)
        .block_owner_deletion(true)
        .build()
        .context(OwnerReferenceSnafu)
}

fn validate_name<K: ManagedResource>(name: &str) -> Result<()> {
    let kind = K::kind(&());
    validation::validate_object_name(&kind, name).with_context(|_| InvalidResourceNameSnafu {
        kind: kind.clone(),
        name,
    })
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::{apps::v1::Deployment, core::v1::Service};
    use kube::api::ObjectMeta;
    use rstest::{fixture, rstest};

    use super::*;
    use crate::{client::memory::InMemoryClient, owner::OwnerIdentity};

    #[fixture]
    fn gateway() -> ResourceGateway<InMemoryClient> {
        ResourceGateway::new(InMemoryClient::new("ns1").unwrap())
    }

    fn widget() -> OwnerIdentity {
        OwnerIdentity::new("abc-123", "apps.example.com/v1", "Widget", "my-widget")
    }

    fn deployment(name: &str, owner_references: Option<Vec<OwnerReference>>) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                name: Some(name.to_owned()),
                owner_references,
                ..ObjectMeta::default()
            },
            ..Deployment::default()
        }
    }

    #[rstest]
    #[tokio::test]
    async fn missing_deployment_is_absent(gateway: ResourceGateway<InMemoryClient>) {
        let found = gateway.exists::<Deployment>("web").await.unwrap();
        assert!(found.is_none());
    }

    #[rstest]
    #[tokio::test]
    async fn existing_service_is_found(gateway: ResourceGateway<InMemoryClient>) {
        gateway
            .client()
            .insert(Service {
                metadata: ObjectMeta {
                    name: Some("web-svc".to_owned()),
                    ..ObjectMeta::default()
                },
                ..Service::default()
            })
            .unwrap();

        let service = gateway.exists::<Service>("web-svc").await.unwrap().unwrap();
        assert_eq!(service.metadata.name.as_deref(), Some("web-svc"));
        assert_eq!(service.metadata.namespace.as_deref(), Some("ns1"));
    }

    #[rstest]
    #[tokio::test]
    async fn deleting_missing_deployment_succeeds(gateway: ResourceGateway<InMemoryClient>) {
        gateway.delete::<Deployment>("web").await.unwrap();
        gateway.delete::<Deployment>("web").await.unwrap();
        assert_eq!(gateway.client().deletion_requests(), 2);
    }

    #[rstest]
    #[tokio::test]
    async fn unreachable_cluster_is_not_absence(gateway: ResourceGateway<InMemoryClient>) {
        gateway.client().set_available(false);

        let err = gateway.exists::<Deployment>("web").await.unwrap_err();
        assert!(matches!(err, Error::Lookup { .. }));
        assert!(err.is_transport());

        let err = gateway.delete::<Deployment>("web").await.unwrap_err();
        assert!(matches!(err, Error::Delete { .. }));
        assert!(err.is_transport());
    }

    #[rstest]
    #[case("")]
    #[case("Web")]
    #[case("web_1")]
    #[tokio::test]
    async fn invalid_names_are_rejected(
        gateway: ResourceGateway<InMemoryClient>,
        #[case] name: &str,
    ) {
        let err = gateway.exists::<Deployment>(name).await.unwrap_err();
        assert!(err.is_validation());

        let err = gateway.delete::<Service>(name).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(gateway.client().deletion_requests(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn service_names_must_be_dns_labels(gateway: ResourceGateway<InMemoryClient>) {
        let err = gateway.exists::<Service>("web.v1").await.unwrap_err();
        assert!(matches!(err, Error::InvalidResourceName { .. }));

        let err = gateway.delete::<Service>("1-web").await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(gateway.client().deletion_requests(), 0);

        // Deployments accept any subdomain
        assert!(gateway.exists::<Deployment>("web.v1").await.unwrap().is_none());
    }

    #[rstest]
    fn owner_reference_is_deterministic(gateway: ResourceGateway<InMemoryClient>) {
        let first = gateway.create_owner_reference(&widget()).unwrap();
        let second = gateway.create_owner_reference(&widget()).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.uid, "abc-123");
        assert_eq!(first.api_version, "apps.example.com/v1");
        assert_eq!(first.kind, "Widget");
        assert_eq!(first.name, "my-widget");
        assert_eq!(first.controller, None);
    }

    #[rstest]
    #[case::uid(OwnerIdentity { uid: String::new(), ..widget() })]
    #[case::api_version(OwnerIdentity { api_version: String::new(), ..widget() })]
    #[case::kind(OwnerIdentity { kind: String::new(), ..widget() })]
    #[case::name(OwnerIdentity { name: String::new(), ..widget() })]
    fn owner_reference_requires_all_fields(
        gateway: ResourceGateway<InMemoryClient>,
        #[case] owner: OwnerIdentity,
    ) {
        let err = gateway.create_owner_reference(&owner).unwrap_err();
        assert!(matches!(err, Error::OwnerReference { .. }));
        assert!(err.is_validation());
    }

    #[rstest]
    fn child_metadata_points_at_owner(gateway: ResourceGateway<InMemoryClient>) {
        let gateway = gateway.with_manager("widget-operator");

        let meta = gateway.child_metadata("web", &widget()).unwrap();

        assert_eq!(meta.name.as_deref(), Some("web"));
        assert_eq!(meta.namespace.as_deref(), Some("ns1"));
        let labels = meta.labels.unwrap();
        assert_eq!(
            labels.get(APP_KUBERNETES_IO_INSTANCE).map(String::as_str),
            Some("my-widget")
        );
        assert_eq!(
            labels.get(APP_KUBERNETES_IO_MANAGED_BY).map(String::as_str),
            Some("widget-operator")
        );
        let owner_references = meta.owner_references.unwrap();
        assert_eq!(owner_references.len(), 1);
        assert_eq!(owner_references[0].controller, Some(true));
        assert_eq!(owner_references[0].block_owner_deletion, Some(true));
    }

    #[rstest]
    #[tokio::test]
    async fn delete_owned_only_deletes_controlled_children(
        gateway: ResourceGateway<InMemoryClient>,
    ) {
        let owner = widget();
        let controlled = gateway.create_controller_reference(&owner).unwrap();
        let foreign = gateway
            .create_controller_reference(&OwnerIdentity {
                uid: "def-456".to_owned(),
                ..widget()
            })
            .unwrap();
        gateway
            .client()
            .insert(deployment("web", Some(vec![controlled])))
            .unwrap();
        gateway
            .client()
            .insert(deployment("other", Some(vec![foreign])))
            .unwrap();
        gateway.client().insert(deployment("orphan", None)).unwrap();

        assert_eq!(
            gateway.delete_owned::<Deployment, _>("web", &owner).await.unwrap(),
            OwnedDeletion::Requested
        );
        assert_eq!(
            gateway
                .delete_owned::<Deployment, _>("other", &owner)
                .await
                .unwrap(),
            OwnedDeletion::NotOwned {
                controller_uid: Some("def-456".to_owned())
            }
        );
        assert_eq!(
            gateway
                .delete_owned::<Deployment, _>("orphan", &owner)
                .await
                .unwrap(),
            OwnedDeletion::NotOwned {
                controller_uid: None
            }
        );
        assert_eq!(
            gateway.delete_owned::<Deployment, _>("web", &owner).await.unwrap(),
            OwnedDeletion::Absent
        );

        assert_eq!(gateway.client().len(), 2);
        assert_eq!(gateway.client().deletion_requests(), 1);
    }
}
