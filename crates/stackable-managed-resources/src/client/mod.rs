//! Access to the cluster API, scoped to a single namespace.
//!
//! [`ClusterClient`] is the capability the [`ResourceGateway`](crate::gateway::ResourceGateway)
//! is built on. [`Client`] implements it on top of a [`kube::Client`]. With the `test-utils`
//! feature the `memory` module offers an in-memory variant, which is handy to test reconcile
//! loops without a cluster.

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::{
    Api, Resource,
    api::{DeleteParams, PropagationPolicy},
    client::Client as KubeClient,
};
use serde::{Serialize, de::DeserializeOwned};
use snafu::{ResultExt, Snafu};
use strum::{Display, EnumString};
use tracing::instrument;

use crate::validation;

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("unable to infer a Kubernetes client from the environment"))]
    InferClient { source: kube::Error },

    #[snafu(display("namespace {namespace:?} is invalid"))]
    InvalidNamespace {
        source: validation::Errors,
        namespace: String,
    },

    #[snafu(display("failed to get {kind} {name:?} in namespace {namespace:?}"))]
    GetResource {
        source: kube::Error,
        kind: String,
        name: String,
        namespace: String,
    },

    #[snafu(display("failed to delete {kind} {name:?} in namespace {namespace:?}"))]
    DeleteResource {
        source: kube::Error,
        kind: String,
        name: String,
        namespace: String,
    },

    #[snafu(display("failed to decode {kind} {name:?} returned by the cluster"))]
    DecodeResource {
        source: serde_json::Error,
        kind: String,
        name: String,
    },

    #[snafu(display("failed to encode {kind} {name:?}"))]
    EncodeResource {
        source: serde_json::Error,
        kind: String,
        name: String,
    },

    #[snafu(display("the cluster API is unavailable: {reason}"))]
    Unavailable { reason: String },
}

/// A namespaced object kind the gateway can look up and delete by name.
///
/// This is implemented for every statically typed namespaced [`Resource`], e.g.
/// [`Deployment`](k8s_openapi::api::apps::v1::Deployment) and
/// [`Service`](k8s_openapi::api::core::v1::Service).
pub trait ManagedResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + DeserializeOwned
    + Serialize
    + Send
    + Sync
    + 'static
{
}

impl<K> ManagedResource for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + DeserializeOwned
        + Serialize
        + Send
        + Sync
        + 'static
{
}

/// What a delete request resulted in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Deletion {
    /// The API server accepted the request. The object may still exist until finalizers ran.
    Requested,

    /// There was nothing to delete.
    AlreadyAbsent,
}

/// The operations on the cluster API the gateway depends on.
///
/// Every call is a single request. Implementations must not retry and must report "not found"
/// as a regular outcome instead of an error.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// The namespace all lookups and deletes are scoped to.
    fn namespace(&self) -> &str;

    /// Retrieves the object of kind `K` called `name`, or [`None`] if there is none.
    async fn get_opt<K: ManagedResource>(&self, name: &str, namespace: &str) -> Result<Option<K>>;

    /// Requests deletion of the object of kind `K` called `name`. Does not wait for it to be gone.
    async fn delete<K: ManagedResource>(&self, name: &str, namespace: &str) -> Result<Deletion>;
}

/// How dependents of a deleted object are handled by the garbage collector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum DeletionPropagation {
    /// Delete the object immediately, dependents are collected in the background.
    #[default]
    Background,

    /// Delete dependents first, the object goes away once they are gone.
    Foreground,

    /// Keep dependents around, their owner references are removed.
    Orphan,
}

impl From<DeletionPropagation> for PropagationPolicy {
    fn from(propagation: DeletionPropagation) -> Self {
        match propagation {
            DeletionPropagation::Background => PropagationPolicy::Background,
            DeletionPropagation::Foreground => PropagationPolicy::Foreground,
            DeletionPropagation::Orphan => PropagationPolicy::Orphan,
        }
    }
}

/// Options to construct a [`Client`] from the environment.
#[cfg_attr(
    feature = "clap",
    derive(clap::Args),
    command(next_help_heading = "Cluster Options")
)]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientOptions {
    /// The namespace managed resources live in.
    ///
    /// Defaults to the namespace of the current kubeconfig context or, in-cluster, the namespace
    /// of the service account.
    #[cfg_attr(feature = "clap", arg(long, env = "WATCH_NAMESPACE"))]
    pub namespace: Option<String>,

    /// How dependents of deleted resources are handled.
    #[cfg_attr(
        feature = "clap",
        arg(long, env, value_enum, default_value_t = DeletionPropagation::Background)
    )]
    pub deletion_propagation: DeletionPropagation,

    /// Only validate delete requests on the server, don't persist them.
    #[cfg_attr(feature = "clap", arg(long))]
    pub dry_run: bool,
}

/// This `Client` can be used to access Kubernetes.
/// It wraps an underlying [`kube::client::Client`] and binds it to a single namespace.
#[derive(Clone)]
pub struct Client {
    client: KubeClient,
    namespace: String,
    delete_params: DeleteParams,
}

impl Client {
    /// Binds `client` to `namespace`, falling back to the default namespace of the client.
    pub fn new(client: KubeClient, namespace: Option<String>) -> Result<Self> {
        let namespace = namespace.unwrap_or_else(|| client.default_namespace().to_owned());
        validation::validate_namespace_name(&namespace).context(InvalidNamespaceSnafu {
            namespace: namespace.clone(),
        })?;

        Ok(Self {
            client,
            namespace,
            delete_params: DeleteParams::default(),
        })
    }

    /// Infers the Kubernetes configuration from the environment and applies `options`.
    pub async fn try_from_options(options: &ClientOptions) -> Result<Self> {
        let client = KubeClient::try_default().await.context(InferClientSnafu)?;
        Ok(Self::new(client, options.namespace.clone())?
            .with_deletion_propagation(options.deletion_propagation)
            .with_dry_run(options.dry_run))
    }

    pub fn with_deletion_propagation(mut self, propagation: DeletionPropagation) -> Self {
        self.delete_params.propagation_policy = Some(propagation.into());
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.delete_params.dry_run = dry_run;
        self
    }

    pub fn get_api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ClusterClient for Client {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    #[instrument(skip(self), fields(kind = %K::kind(&())))]
    async fn get_opt<K: ManagedResource>(&self, name: &str, namespace: &str) -> Result<Option<K>> {
        self.get_api::<K>(namespace)
            .get_opt(name)
            .await
            .with_context(|_| GetResourceSnafu {
                kind: K::kind(&()),
                name,
                namespace,
            })
    }

    #[instrument(skip(self), fields(kind = %K::kind(&())))]
    async fn delete<K: ManagedResource>(&self, name: &str, namespace: &str) -> Result<Deletion> {
        match self
            .get_api::<K>(namespace)
            .delete(name, &self.delete_params)
            .await
        {
            Ok(_) => Ok(Deletion::Requested),
            // Deleting something that is not there is not an error for the caller
            Err(kube::Error::Api(response)) if response.code == 404 => Ok(Deletion::AlreadyAbsent),
            Err(source) => Err(source).with_context(|_| DeleteResourceSnafu {
                kind: K::kind(&()),
                name,
                namespace,
            }),
        }
    }
}
