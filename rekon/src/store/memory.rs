//! In-memory object store.
//!
//! Behaves like the real store where the engine can observe it: UIDs and
//! resource versions are assigned on write, stale updates are rejected, and
//! deleting a workload collects the objects it owns. Every call is recorded
//! so tests can assert exactly which operations a pass performed.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::error::{Result, StoreError};
use super::traits::ObjectStore;
use crate::resource::{Kind, Object, ObjectKey, Resource};

/// Store operation, as recorded in the call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Create,
    Update,
    UpdateStatus,
    Delete,
}

impl Verb {
    pub fn is_write(&self) -> bool {
        !matches!(self, Verb::Get)
    }
}

/// One recorded store call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    pub verb: Verb,
    pub kind: Kind,
    pub key: ObjectKey,
}

impl StoreCall {
    pub fn new(verb: Verb, kind: Kind, key: ObjectKey) -> Self {
        Self { verb, kind, key }
    }
}

#[derive(Default)]
struct Inner {
    objects: BTreeMap<(Kind, ObjectKey), Object>,
    version: u64,
    calls: Vec<StoreCall>,
    failures: Vec<(Verb, Kind, StoreError)>,
}

impl Inner {
    fn next_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    /// Record a call and pop an injected failure matching it, if any.
    fn begin(&mut self, verb: Verb, kind: Kind, key: &ObjectKey) -> Result<()> {
        self.calls.push(StoreCall::new(verb, kind, key.clone()));
        match self
            .failures
            .iter()
            .position(|(v, k, _)| *v == verb && *k == kind)
        {
            Some(idx) => Err(self.failures.remove(idx).2),
            None => Ok(()),
        }
    }

    fn check_version(&self, object: &Object, existing: &Object) -> Result<()> {
        let actual = existing.meta().resource_version.unwrap_or_default();
        match object.meta().resource_version {
            Some(expected) if expected != actual => Err(StoreError::Conflict {
                kind: object.kind(),
                key: object.key(),
                expected,
                actual,
            }),
            _ => Ok(()),
        }
    }
}

/// In-memory [`ObjectStore`] with a call log and failure injection.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put an object directly into the store, bypassing the call log.
    pub async fn insert(&self, mut object: Object) -> Object {
        let mut inner = self.inner.write().await;
        let meta = object.meta_mut();
        if meta.uid.is_none() {
            meta.uid = Some(uuid::Uuid::new_v4().to_string());
        }
        let version = inner.next_version();
        object.meta_mut().resource_version = Some(version);
        inner
            .objects
            .insert((object.kind(), object.key()), object.clone());
        object
    }

    /// Read an object without recording a call.
    pub async fn peek<R: Resource>(&self, key: &ObjectKey) -> Option<R> {
        let inner = self.inner.read().await;
        inner
            .objects
            .get(&(R::KIND, key.clone()))
            .cloned()
            .and_then(R::from_object)
    }

    /// Change one object in place as an outside actor would.
    ///
    /// Bumps the resource version. Returns false if the object does not exist.
    pub async fn mutate<R: Resource>(&self, key: &ObjectKey, f: impl FnOnce(&mut R)) -> bool {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        let Some(mut typed) = inner
            .objects
            .get(&(R::KIND, key.clone()))
            .cloned()
            .and_then(R::from_object)
        else {
            return false;
        };
        f(&mut typed);
        typed.meta_mut().resource_version = Some(inner.next_version());
        inner
            .objects
            .insert((R::KIND, key.clone()), typed.into_object());
        true
    }

    /// Apply `f` to every object of one kind; `f` reports whether it changed
    /// the object. Returns the number of changed objects.
    pub async fn mutate_all<R: Resource>(&self, mut f: impl FnMut(&mut R) -> bool) -> usize {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        let keys: Vec<_> = inner
            .objects
            .keys()
            .filter(|(kind, _)| *kind == R::KIND)
            .cloned()
            .collect();

        let mut changed = 0;
        for slot in keys {
            let Some(mut typed) = inner.objects.get(&slot).cloned().and_then(R::from_object) else {
                continue;
            };
            if f(&mut typed) {
                typed.meta_mut().resource_version = Some(inner.next_version());
                inner.objects.insert(slot, typed.into_object());
                changed += 1;
            }
        }
        changed
    }

    /// Make the next call with this verb and kind fail with `error`.
    pub async fn fail_next(&self, verb: Verb, kind: Kind, error: StoreError) {
        self.inner.write().await.failures.push((verb, kind, error));
    }

    /// Every call recorded so far.
    pub async fn calls(&self) -> Vec<StoreCall> {
        self.inner.read().await.calls.clone()
    }

    /// Recorded calls that modify the store.
    pub async fn writes(&self) -> Vec<StoreCall> {
        self.inner
            .read()
            .await
            .calls
            .iter()
            .filter(|c| c.verb.is_write())
            .cloned()
            .collect()
    }

    /// Drain the call log.
    pub async fn take_calls(&self) -> Vec<StoreCall> {
        std::mem::take(&mut self.inner.write().await.calls)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, kind: Kind, key: &ObjectKey) -> Result<Option<Object>> {
        let mut inner = self.inner.write().await;
        inner.begin(Verb::Get, kind, key)?;
        Ok(inner.objects.get(&(kind, key.clone())).cloned())
    }

    async fn create(&self, mut object: Object) -> Result<Object> {
        let kind = object.kind();
        let key = object.key();
        let mut inner = self.inner.write().await;
        inner.begin(Verb::Create, kind, &key)?;
        if inner.objects.contains_key(&(kind, key.clone())) {
            return Err(StoreError::AlreadyExists { kind, key });
        }

        let version = inner.next_version();
        let meta = object.meta_mut();
        meta.uid = Some(uuid::Uuid::new_v4().to_string());
        meta.resource_version = Some(version);
        debug!("Created {} {} at version {}", kind, key, version);
        inner.objects.insert((kind, key), object.clone());
        Ok(object)
    }

    async fn update(&self, mut object: Object) -> Result<Object> {
        let kind = object.kind();
        let key = object.key();
        let mut inner = self.inner.write().await;
        inner.begin(Verb::Update, kind, &key)?;
        let existing = inner
            .objects
            .get(&(kind, key.clone()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind,
                key: key.clone(),
            })?;
        inner.check_version(&object, &existing)?;

        object.copy_status_from(&existing);
        let version = inner.next_version();
        let meta = object.meta_mut();
        meta.uid = existing.meta().uid.clone();
        meta.resource_version = Some(version);
        debug!("Updated {} {} to version {}", kind, key, version);
        inner.objects.insert((kind, key), object.clone());
        Ok(object)
    }

    async fn update_status(&self, object: Object) -> Result<Object> {
        let kind = object.kind();
        let key = object.key();
        let mut inner = self.inner.write().await;
        inner.begin(Verb::UpdateStatus, kind, &key)?;
        let mut stored = inner
            .objects
            .get(&(kind, key.clone()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind,
                key: key.clone(),
            })?;
        inner.check_version(&object, &stored)?;

        stored.copy_status_from(&object);
        stored.meta_mut().resource_version = Some(inner.next_version());
        inner.objects.insert((kind, key), stored.clone());
        Ok(stored)
    }

    async fn delete(&self, kind: Kind, key: &ObjectKey) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.begin(Verb::Delete, kind, key)?;
        if inner.objects.remove(&(kind, key.clone())).is_none() {
            return Err(StoreError::NotFound {
                kind,
                key: key.clone(),
            });
        }

        if kind == Kind::Workload {
            let before = inner.objects.len();
            inner
                .objects
                .retain(|_, object| !object.meta().is_owned_by(key));
            debug!(
                "Deleted workload {} and {} owned objects",
                key,
                before - inner.objects.len()
            );
        }
        Ok(())
    }
}
