use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use procura_core::{ExpectedRevision, TenantId};

use super::{Document, DocumentStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DocumentKey {
    tenant_id: TenantId,
    collection: String,
    key: String,
}

/// In-memory document store.
///
/// Intended for tests/dev. Not optimized for performance; the revision check
/// and the write happen under one lock, which is all the atomicity the
/// services rely on.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<DocumentKey, Document>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn document_key(tenant_id: TenantId, collection: &str, key: &str) -> DocumentKey {
        DocumentKey {
            tenant_id,
            collection: collection.to_string(),
            key: key.to_string(),
        }
    }
}

fn poisoned(_: impl core::fmt::Debug) -> StoreError {
    StoreError::Unavailable("lock poisoned".to_string())
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(
        &self,
        tenant_id: TenantId,
        collection: &str,
        key: &str,
    ) -> Result<Option<Document>, StoreError> {
        let documents = self.documents.read().map_err(poisoned)?;
        Ok(documents
            .get(&Self::document_key(tenant_id, collection, key))
            .cloned())
    }

    async fn query(
        &self,
        tenant_id: TenantId,
        collection: &str,
        predicate: &(dyn for<'a> Fn(&'a JsonValue) -> bool + Send + Sync),
    ) -> Result<Vec<Document>, StoreError> {
        let candidates: Vec<Document> = {
            let documents = self.documents.read().map_err(poisoned)?;
            documents
                .iter()
                .filter(|(k, _)| k.tenant_id == tenant_id && k.collection == collection)
                .map(|(_, doc)| doc.clone())
                .collect()
        };
        Ok(candidates
            .into_iter()
            .filter(|doc| predicate(&doc.value))
            .collect())
    }

    async fn put(
        &self,
        tenant_id: TenantId,
        collection: &str,
        key: &str,
        value: JsonValue,
        expected: ExpectedRevision,
    ) -> Result<u64, StoreError> {
        let mut documents = self.documents.write().map_err(poisoned)?;
        let document_key = Self::document_key(tenant_id, collection, key);
        let current = documents.get(&document_key).map(|doc| doc.revision);

        if !expected.matches(current) {
            return Err(StoreError::Conflict(format!(
                "expected {expected:?}, found {current:?}"
            )));
        }

        let revision = current.unwrap_or(0) + 1;
        documents.insert(document_key, Document { revision, value });
        Ok(revision)
    }

    async fn merge(
        &self,
        tenant_id: TenantId,
        collection: &str,
        key: &str,
        partial: JsonValue,
    ) -> Result<u64, StoreError> {
        let mut documents = self.documents.write().map_err(poisoned)?;
        let document_key = Self::document_key(tenant_id, collection, key);
        let document = documents
            .get_mut(&document_key)
            .ok_or_else(|| StoreError::not_found(collection, key))?;

        let Some(patch) = partial.as_object() else {
            return Err(StoreError::Serialization(
                "merge patch must be a JSON object".to_string(),
            ));
        };
        let Some(target) = document.value.as_object_mut() else {
            return Err(StoreError::Serialization(
                "merge target is not a JSON object".to_string(),
            ));
        };
        for (field, value) in patch {
            target.insert(field.clone(), value.clone());
        }

        document.revision += 1;
        Ok(document.revision)
    }

    async fn delete(
        &self,
        tenant_id: TenantId,
        collection: &str,
        key: &str,
    ) -> Result<(), StoreError> {
        let mut documents = self.documents.write().map_err(poisoned)?;
        documents
            .remove(&Self::document_key(tenant_id, collection, key))
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(collection, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    #[tokio::test]
    async fn put_assigns_increasing_revisions() {
        let store = InMemoryDocumentStore::new();
        let tenant_id = test_tenant_id();

        let first = store
            .put(tenant_id, "orders", "a", json!({"n": 1}), ExpectedRevision::NoDocument)
            .await
            .unwrap();
        assert_eq!(first, 1);

        let second = store
            .put(tenant_id, "orders", "a", json!({"n": 2}), ExpectedRevision::Exact(1))
            .await
            .unwrap();
        assert_eq!(second, 2);

        let doc = store.get(tenant_id, "orders", "a").await.unwrap().unwrap();
        assert_eq!(doc.revision, 2);
        assert_eq!(doc.value, json!({"n": 2}));
    }

    #[tokio::test]
    async fn stale_revision_is_a_conflict() {
        let store = InMemoryDocumentStore::new();
        let tenant_id = test_tenant_id();

        store
            .put(tenant_id, "orders", "a", json!({}), ExpectedRevision::NoDocument)
            .await
            .unwrap();
        store
            .put(tenant_id, "orders", "a", json!({}), ExpectedRevision::Exact(1))
            .await
            .unwrap();

        // A writer that read revision 1 loses.
        let err = store
            .put(tenant_id, "orders", "a", json!({}), ExpectedRevision::Exact(1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        // Create-only writes fail once the document exists.
        let err = store
            .put(tenant_id, "orders", "a", json!({}), ExpectedRevision::NoDocument)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn tenants_do_not_see_each_other() {
        let store = InMemoryDocumentStore::new();
        let tenant_a = test_tenant_id();
        let tenant_b = test_tenant_id();

        store
            .put(tenant_a, "orders", "a", json!({"owner": "a"}), ExpectedRevision::NoDocument)
            .await
            .unwrap();

        assert!(store.get(tenant_b, "orders", "a").await.unwrap().is_none());
        assert!(
            store
                .query(tenant_b, "orders", &|_| true)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn query_filters_by_predicate_within_the_collection() {
        let store = InMemoryDocumentStore::new();
        let tenant_id = test_tenant_id();

        for (key, year) in [("a", 2024), ("b", 2025), ("c", 2025)] {
            store
                .put(
                    tenant_id,
                    "budgets",
                    key,
                    json!({"year": year}),
                    ExpectedRevision::NoDocument,
                )
                .await
                .unwrap();
        }
        store
            .put(tenant_id, "orders", "x", json!({"year": 2025}), ExpectedRevision::NoDocument)
            .await
            .unwrap();

        let docs = store
            .query(tenant_id, "budgets", &|value| value["year"] == json!(2025))
            .await
            .unwrap();
        assert_eq!(docs.len(), 2);
    }

    #[tokio::test]
    async fn merge_patches_top_level_fields_and_bumps_the_revision() {
        let store = InMemoryDocumentStore::new();
        let tenant_id = test_tenant_id();

        store
            .put(
                tenant_id,
                "budgets",
                "a",
                json!({"spent": 0, "name": "Ops"}),
                ExpectedRevision::NoDocument,
            )
            .await
            .unwrap();

        let revision = store
            .merge(tenant_id, "budgets", "a", json!({"spent": 250}))
            .await
            .unwrap();
        assert_eq!(revision, 2);

        let doc = store.get(tenant_id, "budgets", "a").await.unwrap().unwrap();
        assert_eq!(doc.value, json!({"spent": 250, "name": "Ops"}));

        let err = store
            .merge(tenant_id, "budgets", "missing", json!({"spent": 1}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn delete_removes_the_document_or_reports_absence() {
        let store = InMemoryDocumentStore::new();
        let tenant_id = test_tenant_id();

        store
            .put(tenant_id, "orders", "a", json!({}), ExpectedRevision::NoDocument)
            .await
            .unwrap();
        store.delete(tenant_id, "orders", "a").await.unwrap();
        assert!(store.get(tenant_id, "orders", "a").await.unwrap().is_none());

        let err = store.delete(tenant_id, "orders", "a").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
