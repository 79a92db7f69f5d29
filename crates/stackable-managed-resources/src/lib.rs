//! Lifecycle primitives for the child objects of a custom resource.
//!
//! A controller that manages e.g. a Deployment and a Service on behalf of a custom resource (the
//! _owner_) needs to know whether a child already exists, needs to tag new children with an owner
//! reference so that the garbage collector removes them together with their owner, and needs to
//! remove children that are no longer desired. The [`ResourceGateway`] offers exactly these
//! operations, scoped to a single namespace, on top of any [`ClusterClient`].
//!
//! ## Crate Features
//!
//! - `clap` derives [`clap::Args`] for [`client::ClientOptions`].

pub mod builder;
pub mod client;
pub mod controller_ref;
pub mod gateway;
pub mod logging;
pub mod owner;
pub mod validation;

// External re-exports
pub use k8s_openapi;
pub use kube;

pub use crate::{
    client::{Client, ClusterClient, ManagedResource},
    gateway::ResourceGateway,
    owner::{Owner, OwnerIdentity},
};
