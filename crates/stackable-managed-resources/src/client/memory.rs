//! A [`ClusterClient`] that keeps objects in memory.
//!
//! It behaves like an API server that converges instantly: deleted objects are gone right away.
//! Use [`InMemoryClient::set_available`] to simulate a cluster that cannot be reached.

use std::{
    collections::BTreeMap,
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use snafu::{ResultExt, ensure};

use super::{
    ClusterClient, DecodeResourceSnafu, Deletion, EncodeResourceSnafu, Error,
    InvalidNamespaceSnafu, ManagedResource, UnavailableSnafu,
};
use crate::validation;

type Result<T, E = Error> = std::result::Result<T, E>;

/// Identifies a stored object.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct ObjectKey {
    api_version: String,
    kind: String,
    namespace: String,
    name: String,
}

impl ObjectKey {
    fn new<K: ManagedResource>(namespace: &str, name: &str) -> Self {
        Self {
            api_version: K::api_version(&()).into_owned(),
            kind: K::kind(&()).into_owned(),
            namespace: namespace.to_owned(),
            name: name.to_owned(),
        }
    }
}

#[derive(Debug)]
pub struct InMemoryClient {
    namespace: String,
    available: AtomicBool,
    objects: Mutex<BTreeMap<ObjectKey, serde_json::Value>>,
    deletion_requests: AtomicUsize,
}

impl InMemoryClient {
    /// Creates an empty cluster scoped to `namespace`, which must be a RFC 1123 label.
    pub fn new(namespace: impl Into<String>) -> Result<Self> {
        let namespace = namespace.into();
        validation::validate_namespace_name(&namespace).context(InvalidNamespaceSnafu {
            namespace: namespace.clone(),
        })?;

        Ok(Self {
            namespace,
            available: AtomicBool::new(true),
            objects: Mutex::default(),
            deletion_requests: AtomicUsize::new(0),
        })
    }

    /// Stores `object`, replacing any object of the same kind and name.
    ///
    /// Objects without a namespace are placed into the namespace of this client.
    pub fn insert<K: ManagedResource>(&self, mut object: K) -> Result<()> {
        let namespace = object
            .meta_mut()
            .namespace
            .get_or_insert_with(|| self.namespace.clone())
            .clone();
        let name = object.meta().name.clone().unwrap_or_default();
        let key = ObjectKey::new::<K>(&namespace, &name);
        let value = serde_json::to_value(&object).with_context(|_| EncodeResourceSnafu {
            kind: K::kind(&()),
            name: name.clone(),
        })?;

        lock(&self.objects).insert(key, value);
        Ok(())
    }

    /// Makes every following request fail (or succeed again) as if the API server was unreachable.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// The number of delete requests received so far, including those for absent objects.
    pub fn deletion_requests(&self) -> usize {
        self.deletion_requests.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        lock(&self.objects).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_available(&self) -> Result<()> {
        ensure!(
            self.available.load(Ordering::SeqCst),
            UnavailableSnafu {
                reason: "connection refused"
            }
        );
        Ok(())
    }
}

#[async_trait]
impl ClusterClient for InMemoryClient {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn get_opt<K: ManagedResource>(&self, name: &str, namespace: &str) -> Result<Option<K>> {
        self.ensure_available()?;

        let value = lock(&self.objects)
            .get(&ObjectKey::new::<K>(namespace, name))
            .cloned();
        value
            .map(serde_json::from_value)
            .transpose()
            .with_context(|_| DecodeResourceSnafu {
                kind: K::kind(&()),
                name,
            })
    }

    async fn delete<K: ManagedResource>(&self, name: &str, namespace: &str) -> Result<Deletion> {
        self.ensure_available()?;

        self.deletion_requests.fetch_add(1, Ordering::SeqCst);
        match lock(&self.objects).remove(&ObjectKey::new::<K>(namespace, name)) {
            Some(_) => Ok(Deletion::Requested),
            None => Ok(Deletion::AlreadyAbsent),
        }
    }
}

// A panic while holding the lock cannot leave the map half-updated.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
