//! Document store boundary: tenant-scoped keyed collections of JSON records.
//!
//! The hosted database behind the application is consumed, not owned. It is
//! modeled as keyed collections per tenant with no cross-document
//! transactions; concurrent writers coordinate through per-document
//! compare-and-swap revisions ([`ExpectedRevision`]).

mod in_memory;

pub use in_memory::InMemoryDocumentStore;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;

use procura_core::{ExpectedRevision, TenantId};

/// Collection names used by the services.
pub mod collections {
    pub const ORDERS: &str = "orders";
    pub const BUDGETS: &str = "budgets";
    pub const ANNUAL_BUDGETS: &str = "annual_budgets";
    pub const COUNTERS: &str = "counters";
}

/// A stored document plus the revision token the backend assigned to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Monotonically increasing per-document write counter, starting at 1.
    pub revision: u64,
    pub value: JsonValue,
}

/// Document store operation error.
///
/// These are **infrastructure errors** (storage, concurrency) as opposed to
/// domain errors (validation, preconditions).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Optimistic concurrency check failed (stale revision).
    #[error("revision conflict: {0}")]
    Conflict(String),

    /// No document at the key (for operations that require one).
    #[error("document not found: {collection}/{key}")]
    NotFound { collection: String, key: String },

    /// Backend unavailable or I/O failure.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Document (de)serialization failed.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn not_found(collection: &str, key: &str) -> Self {
        Self::NotFound {
            collection: collection.to_string(),
            key: key.to_string(),
        }
    }
}

/// Tenant-scoped document store.
///
/// Implementations must:
/// - enforce tenant isolation (a key is only visible to its tenant)
/// - enforce the [`ExpectedRevision`] check atomically with the write
/// - assign monotonically increasing revisions per document
///
/// No multi-document atomicity is assumed anywhere; callers that maintain
/// cross-document aggregates retry on [`StoreError::Conflict`].
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(
        &self,
        tenant_id: TenantId,
        collection: &str,
        key: &str,
    ) -> Result<Option<Document>, StoreError>;

    /// All documents of a tenant's collection matching `predicate`.
    async fn query(
        &self,
        tenant_id: TenantId,
        collection: &str,
        predicate: &(dyn for<'a> Fn(&'a JsonValue) -> bool + Send + Sync),
    ) -> Result<Vec<Document>, StoreError>;

    /// Full write guarded by `expected`; returns the new revision.
    async fn put(
        &self,
        tenant_id: TenantId,
        collection: &str,
        key: &str,
        value: JsonValue,
        expected: ExpectedRevision,
    ) -> Result<u64, StoreError>;

    /// Shallow-merge `partial`'s top-level fields into an existing document;
    /// returns the new revision.
    async fn merge(
        &self,
        tenant_id: TenantId,
        collection: &str,
        key: &str,
        partial: JsonValue,
    ) -> Result<u64, StoreError>;

    async fn delete(
        &self,
        tenant_id: TenantId,
        collection: &str,
        key: &str,
    ) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> DocumentStore for Arc<S>
where
    S: DocumentStore + ?Sized,
{
    async fn get(
        &self,
        tenant_id: TenantId,
        collection: &str,
        key: &str,
    ) -> Result<Option<Document>, StoreError> {
        (**self).get(tenant_id, collection, key).await
    }

    async fn query(
        &self,
        tenant_id: TenantId,
        collection: &str,
        predicate: &(dyn for<'a> Fn(&'a JsonValue) -> bool + Send + Sync),
    ) -> Result<Vec<Document>, StoreError> {
        (**self).query(tenant_id, collection, predicate).await
    }

    async fn put(
        &self,
        tenant_id: TenantId,
        collection: &str,
        key: &str,
        value: JsonValue,
        expected: ExpectedRevision,
    ) -> Result<u64, StoreError> {
        (**self).put(tenant_id, collection, key, value, expected).await
    }

    async fn merge(
        &self,
        tenant_id: TenantId,
        collection: &str,
        key: &str,
        partial: JsonValue,
    ) -> Result<u64, StoreError> {
        (**self).merge(tenant_id, collection, key, partial).await
    }

    async fn delete(
        &self,
        tenant_id: TenantId,
        collection: &str,
        key: &str,
    ) -> Result<(), StoreError> {
        (**self).delete(tenant_id, collection, key).await
    }
}
