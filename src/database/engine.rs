//! Storage engine contract
//!
//! Items are addressed by a composite `(pk, sk)` key, carry a version used for
//! optimistic concurrency and may be projected into a secondary index for
//! ordered listing. Engines must honor the write conditions atomically: a
//! transaction either applies every operation or none of them.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::cursor::ResumeKey;
use crate::utils::errors::{StorageError, StorageResult};

/// Default deadline for a single storage call
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_millis(1500);

/// Largest page a query may return
pub const MAX_PAGE_SIZE: usize = 100;

/// Composite primary key of an item
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    pub pk: String,
    pub sk: String,
}

impl ItemKey {
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self { pk: pk.into(), sk: sk.into() }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.pk, self.sk)
    }
}

/// Secondary index projection of an item
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexEntry {
    pub partition: String,
    pub sort: String,
}

impl IndexEntry {
    pub fn new(partition: impl Into<String>, sort: impl Into<String>) -> Self {
        Self { partition: partition.into(), sort: sort.into() }
    }
}

/// A stored record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredItem {
    pub key: ItemKey,
    pub version: i64,
    pub body: serde_json::Value,
    pub index: Option<IndexEntry>,
}

/// Precondition attached to a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    None,
    NotExists,
    Exists,
    VersionEquals(i64),
}

/// A single operation inside `transact_write`
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Put { item: StoredItem, condition: Condition },
    Delete { key: ItemKey, condition: Condition },
}

impl WriteOp {
    /// Insert that fails if anything is stored at the key
    pub fn insert(item: StoredItem) -> Self {
        WriteOp::Put { item, condition: Condition::NotExists }
    }

    /// Replace that fails unless the stored version equals `expected`
    pub fn replace(item: StoredItem, expected: i64) -> Self {
        WriteOp::Put { item, condition: Condition::VersionEquals(expected) }
    }

    /// Delete that fails unless the stored version equals `expected`
    pub fn delete_versioned(key: ItemKey, expected: i64) -> Self {
        WriteOp::Delete { key, condition: Condition::VersionEquals(expected) }
    }

    /// Delete that succeeds whether or not the item exists
    pub fn delete(key: ItemKey) -> Self {
        WriteOp::Delete { key, condition: Condition::None }
    }

    pub fn key(&self) -> &ItemKey {
        match self {
            WriteOp::Put { item, .. } => &item.key,
            WriteOp::Delete { key, .. } => key,
        }
    }

    pub fn condition(&self) -> Condition {
        match self {
            WriteOp::Put { condition, .. } | WriteOp::Delete { condition, .. } => *condition,
        }
    }
}

/// Why a write condition did not hold
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    AlreadyExists,
    DoesNotExist,
    VersionMismatch { expected: i64, actual: i64 },
}

/// A failed condition inside a canceled transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionFailure {
    /// Position of the operation in the submitted list
    pub index: usize,
    pub key: ItemKey,
    pub reason: FailureReason,
}

/// What a query scans
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryTarget {
    /// Items of one partition whose sort key starts with a prefix, by sort key
    Partition { pk: String, sk_prefix: String },
    /// Items projected into one index partition, by index sort key
    Index { partition: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub target: QueryTarget,
    pub limit: usize,
    pub cursor: Option<ResumeKey>,
}

impl QueryRequest {
    /// Build a request, clamping the limit to `1..=MAX_PAGE_SIZE`
    pub fn new(target: QueryTarget, limit: usize, cursor: Option<ResumeKey>) -> Self {
        Self { target, limit: limit.clamp(1, MAX_PAGE_SIZE), cursor }
    }
}

/// One page of query results
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryPage {
    pub items: Vec<StoredItem>,
    pub next_cursor: Option<ResumeKey>,
    pub has_more: bool,
}

/// Key-value store with conditional writes, transactions and an ordered index
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Fetch one item
    async fn get(&self, key: &ItemKey) -> StorageResult<StoredItem>;

    /// Store an item only if nothing exists at its key
    async fn put_if_absent(&self, item: StoredItem) -> StorageResult<()>;

    /// Replace an item only if its stored version equals `expected_prior`
    async fn put_if_version(&self, item: StoredItem, expected_prior: i64) -> StorageResult<()>;

    /// Apply every operation or none
    async fn transact_write(&self, ops: Vec<WriteOp>) -> StorageResult<()>;

    /// Read one page, probing one item past the limit to detect more
    async fn query(&self, request: QueryRequest) -> StorageResult<QueryPage>;
}

pub type SharedEngine = Arc<dyn StorageEngine>;

/// Run a storage call under a deadline
pub async fn with_deadline<T, F>(operation: &'static str, deadline: Duration, call: F) -> StorageResult<T>
where
    F: Future<Output = StorageResult<T>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, deadline_ms = deadline.as_millis() as u64, "Storage deadline exceeded");
            Err(StorageError::Timeout { operation, after: deadline })
        }
    }
}

/// Check a write condition against the currently stored version
pub fn check_condition(current: Option<i64>, condition: Condition) -> Result<(), FailureReason> {
    match (condition, current) {
        (Condition::None, _) => Ok(()),
        (Condition::NotExists, None) => Ok(()),
        (Condition::NotExists, Some(_)) => Err(FailureReason::AlreadyExists),
        (Condition::Exists, Some(_)) => Ok(()),
        (Condition::Exists, None) => Err(FailureReason::DoesNotExist),
        (Condition::VersionEquals(_), None) => Err(FailureReason::DoesNotExist),
        (Condition::VersionEquals(expected), Some(actual)) if expected == actual => Ok(()),
        (Condition::VersionEquals(expected), Some(actual)) => {
            Err(FailureReason::VersionMismatch { expected, actual })
        }
    }
}

/// Reject transactions an engine cannot apply atomically
pub fn validate_transaction(ops: &[WriteOp]) -> StorageResult<()> {
    for (i, op) in ops.iter().enumerate() {
        if ops[..i].iter().any(|earlier| earlier.key() == op.key()) {
            return Err(StorageError::InvalidTransaction(format!(
                "item {} appears more than once",
                op.key()
            )));
        }
    }
    Ok(())
}

/// Resume key identifying `item`'s position within `target`
pub fn resume_key_for(target: &QueryTarget, item: &StoredItem) -> ResumeKey {
    match (target, &item.index) {
        (QueryTarget::Index { .. }, Some(index)) => {
            ResumeKey::indexed(&item.key.pk, &item.key.sk, &index.partition, &index.sort)
        }
        _ => ResumeKey::primary(&item.key.pk, &item.key.sk),
    }
}

/// Ensure a cursor was produced by a query over the same target
pub fn validate_cursor(target: &QueryTarget, cursor: &ResumeKey) -> StorageResult<()> {
    let belongs = match target {
        QueryTarget::Partition { pk, sk_prefix } => {
            !cursor.is_indexed()
                && cursor.pk() == Some(pk.as_str())
                && cursor.sk().is_some_and(|sk| sk.starts_with(sk_prefix.as_str()))
        }
        QueryTarget::Index { partition } => cursor.index_pk() == Some(partition.as_str()),
    };

    if belongs {
        Ok(())
    } else {
        Err(StorageError::InvalidCursor("cursor does not belong to this query".to_string()))
    }
}

/// Ordering of `key` within `target`, comparable across items of one query
pub fn position<'a>(target: &QueryTarget, key: &'a ResumeKey) -> (&'a str, &'a str, &'a str) {
    let pk = key.pk().unwrap_or_default();
    let sk = key.sk().unwrap_or_default();
    match target {
        QueryTarget::Partition { .. } => (sk, "", ""),
        QueryTarget::Index { .. } => (key.index_sk().unwrap_or_default(), pk, sk),
    }
}

/// Cut a page out of up to `limit + 1` fetched items
pub fn build_page(target: &QueryTarget, mut fetched: Vec<StoredItem>, limit: usize) -> QueryPage {
    let has_more = fetched.len() > limit;
    fetched.truncate(limit);
    let next_cursor = if has_more {
        fetched.last().map(|item| resume_key_for(target, item))
    } else {
        None
    };

    QueryPage { items: fetched, next_cursor, has_more }
}
