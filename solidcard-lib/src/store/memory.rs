use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::{
    Identifier, ProfileDocument,
    session::AuthenticatedFetch,
    store::{FindOne, ProfileStore, StoreError, UpdateQuery},
};

/// A [`ProfileStore`] held in memory, keyed by document identifier.
///
/// Failures can be injected for reads and writes to exercise error paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    documents: RwLock<HashMap<Identifier, ProfileDocument>>,
    read_failure: RwLock<Option<StoreError>>,
    write_failure: RwLock<Option<StoreError>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(doc: ProfileDocument) -> Self {
        let store = Self::new();
        store.insert(doc);
        store
    }

    pub fn insert(&self, doc: ProfileDocument) {
        self.inner.documents.write().insert(doc.id.clone(), doc);
    }

    pub fn get(&self, id: &Identifier) -> Option<ProfileDocument> {
        self.inner.documents.read().get(id).cloned()
    }

    /// Make every following read fail with `error`. `None` restores normal reads.
    pub fn fail_reads(&self, error: Option<StoreError>) {
        *self.inner.read_failure.write() = error;
    }

    /// Make every following write fail with `error`. `None` restores normal writes.
    pub fn fail_writes(&self, error: Option<StoreError>) {
        *self.inner.write_failure.write() = error;
    }

    /// Number of writes that reached the store, failed or not.
    pub fn writes(&self) -> usize {
        self.inner.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn find_one(
        &self,
        query: &FindOne,
        _fetch: &AuthenticatedFetch,
    ) -> Result<ProfileDocument, StoreError> {
        if let Some(error) = self.inner.read_failure.read().clone() {
            return Err(error);
        }

        self.inner
            .documents
            .read()
            .get(&query.from)
            .filter(|doc| doc.id == query.where_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("{} not found", query.where_id)))
    }

    async fn update(
        &self,
        query: &UpdateQuery,
        _fetch: &AuthenticatedFetch,
    ) -> Result<ProfileDocument, StoreError> {
        self.inner.writes.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = self.inner.write_failure.read().clone() {
            return Err(error);
        }

        let mut documents = self.inner.documents.write();
        let doc = documents
            .get_mut(&query.doc)
            .filter(|doc| doc.id == query.data.id)
            .ok_or_else(|| StoreError::NotFound(format!("{} not found", query.data.id)))?;

        doc.apply(&query.data);
        debug!("Updated {}", doc.id);

        Ok(doc.clone())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ProfilePatch;

    fn fetch() -> AuthenticatedFetch {
        AuthenticatedFetch::with_client(reqwest::Client::new(), None)
    }

    fn id() -> Identifier {
        Identifier::parse("https://u.example/profile").unwrap()
    }

    #[tokio::test]
    async fn test_find_missing() {
        let store = MemoryStore::new();

        let err = store
            .find_one(&FindOne::profile(&id()), &fetch())
            .await
            .unwrap_err();

        assert!(err.kind().is_not_found());
    }

    #[tokio::test]
    async fn test_update_failure_leaves_document() {
        let store = MemoryStore::with_document(ProfileDocument::new(id()));
        store.fail_writes(Some(StoreError::Permission("forbidden".into())));

        let query = UpdateQuery {
            doc: id(),
            data: ProfilePatch {
                id: id(),
                name: "Ana".into(),
                email: None,
            },
        };
        let err = store.update(&query, &fetch()).await.unwrap_err();

        assert_eq!(err.to_string(), "forbidden");
        assert_eq!(store.writes(), 1);
        assert_eq!(store.get(&id()), Some(ProfileDocument::new(id())));
    }
}
