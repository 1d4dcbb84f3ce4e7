//! Optimistic-concurrency primitives for document writes.

use crate::error::{DomainError, DomainResult};

/// Revision expectation for a compare-and-swap document write.
///
/// The document store assigns a monotonically increasing revision to every
/// write. A writer states what it read; the store rejects the write when the
/// document moved in the meantime. There are no cross-document transactions,
/// so this is the only coordination mechanism between concurrent writers.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedRevision {
    /// Skip the revision check (last writer wins).
    Any,
    /// Require that no document exists at the key yet (create).
    NoDocument,
    /// Require the document to be at an exact revision (update).
    Exact(u64),
}

impl ExpectedRevision {
    /// `actual` is `None` when no document exists at the key.
    pub fn matches(self, actual: Option<u64>) -> bool {
        match self {
            ExpectedRevision::Any => true,
            ExpectedRevision::NoDocument => actual.is_none(),
            ExpectedRevision::Exact(revision) => actual == Some(revision),
        }
    }

    pub fn check(self, actual: Option<u64>) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "revision check failed (expected: {self:?}, actual: {actual:?})"
            )))
        }
    }
}
