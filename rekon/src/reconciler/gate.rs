//! Dependency gate - polls a precondition owned by another subsystem.

use tracing::{debug, info};

use crate::resource::{DatabaseSchema, Resource};
use crate::store::{ObjectStore, Result, StoreError, create_typed, get_typed};

/// An externally-owned object exposing a boolean readiness flag.
pub trait Precondition: Resource {
    fn is_ready(&self) -> bool;
}

impl Precondition for DatabaseSchema {
    fn is_ready(&self) -> bool {
        self.status.completed
    }
}

/// Readiness check gating progression to the next phase.
///
/// Never waits: a dependency that is absent is requested once and reported
/// not ready, and the caller's requeue supplies the wait.
pub struct DependencyGate<'a> {
    store: &'a dyn ObjectStore,
}

impl<'a> DependencyGate<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self { store }
    }

    pub async fn is_ready<P: Precondition>(&self, dependency: &P) -> Result<bool> {
        let key = dependency.key();
        match get_typed::<P>(self.store, &key).await? {
            Some(live) => {
                let ready = live.is_ready();
                debug!("{} {} ready: {}", P::KIND, key, ready);
                Ok(ready)
            }
            None => {
                info!("Requesting {} {}", P::KIND, key);
                match create_typed(self.store, dependency.clone()).await {
                    Ok(_) | Err(StoreError::AlreadyExists { .. }) => Ok(false),
                    Err(e) => Err(e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Kind, ObjectKey, ObjectMeta, SchemaSpec, SchemaStatus};
    use crate::store::{MemoryStore, StoreCall, Verb};

    fn schema() -> DatabaseSchema {
        DatabaseSchema {
            metadata: ObjectMeta::new("ns", "images"),
            spec: SchemaSpec {
                database_name: "images".to_string(),
                secret: "secret".to_string(),
            },
            status: SchemaStatus::default(),
        }
    }

    #[tokio::test]
    async fn test_missing_dependency_is_created_once() {
        let store = MemoryStore::new();
        let gate = DependencyGate::new(&store);

        assert!(!gate.is_ready(&schema()).await.unwrap());
        assert!(!gate.is_ready(&schema()).await.unwrap());

        let key = ObjectKey::new("ns", "images");
        assert_eq!(
            store.writes().await,
            vec![StoreCall::new(Verb::Create, Kind::DatabaseSchema, key)]
        );
    }

    #[tokio::test]
    async fn test_ready_once_completed() {
        let store = MemoryStore::new();
        let gate = DependencyGate::new(&store);
        let key = ObjectKey::new("ns", "images");

        gate.is_ready(&schema()).await.unwrap();
        store
            .mutate::<DatabaseSchema>(&key, |s| s.status.completed = true)
            .await;
        assert!(gate.is_ready(&schema()).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_create_is_not_an_error() {
        let store = MemoryStore::new();
        store
            .fail_next(
                Verb::Create,
                Kind::DatabaseSchema,
                StoreError::AlreadyExists {
                    kind: Kind::DatabaseSchema,
                    key: ObjectKey::new("ns", "images"),
                },
            )
            .await;

        let ready = DependencyGate::new(&store).is_ready(&schema()).await.unwrap();
        assert!(!ready);
    }
}
