//! Object store contract.
//!
//! The engine never talks to a concrete backend; it only needs the five
//! primitives below with optimistic-concurrency semantics.

use async_trait::async_trait;

use super::error::{Result, StoreError};
use crate::resource::{Kind, Object, ObjectKey, Resource};

/// Declarative object store holding specifications and live objects.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Get an object by kind and identity.
    async fn get(&self, kind: Kind, key: &ObjectKey) -> Result<Option<Object>>;

    /// Create a new object. Fails with `AlreadyExists` if the identity is taken.
    async fn create(&self, object: Object) -> Result<Object>;

    /// Replace an object's spec. The status sub-record is left untouched.
    ///
    /// Fails with `Conflict` if the object's resource version is stale.
    async fn update(&self, object: Object) -> Result<Object>;

    /// Replace an object's status sub-record. The spec is left untouched.
    ///
    /// Fails with `Conflict` if the object's resource version is stale.
    async fn update_status(&self, object: Object) -> Result<Object>;

    /// Delete an object.
    async fn delete(&self, kind: Kind, key: &ObjectKey) -> Result<()>;
}

fn downcast<R: Resource>(object: Object) -> Result<R> {
    let found = object.kind();
    let key = object.key();
    R::from_object(object).ok_or(StoreError::UnexpectedKind {
        expected: R::KIND,
        found,
        key,
    })
}

/// Fetch a typed object.
pub async fn get_typed<R: Resource>(store: &dyn ObjectStore, key: &ObjectKey) -> Result<Option<R>> {
    match store.get(R::KIND, key).await? {
        Some(object) => downcast(object).map(Some),
        None => Ok(None),
    }
}

/// Create a typed object, returning it as stored.
pub async fn create_typed<R: Resource>(store: &dyn ObjectStore, resource: R) -> Result<R> {
    downcast(store.create(resource.into_object()).await?)
}

/// Update a typed object, returning it as stored.
pub async fn update_typed<R: Resource>(store: &dyn ObjectStore, resource: R) -> Result<R> {
    downcast(store.update(resource.into_object()).await?)
}

/// Update a typed object's status, returning it as stored.
pub async fn update_status_typed<R: Resource>(store: &dyn ObjectStore, resource: R) -> Result<R> {
    downcast(store.update_status(resource.into_object()).await?)
}
