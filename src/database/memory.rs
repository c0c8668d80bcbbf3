//! In-memory storage engine
//!
//! Used for local development and tests. A single lock guards the whole map,
//! so a transaction's conditions are checked and its writes applied without
//! any other writer interleaving.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::engine::{
    build_page, check_condition, position, resume_key_for, validate_cursor, validate_transaction,
    with_deadline, ConditionFailure, FailureReason, ItemKey, QueryPage, QueryRequest, QueryTarget,
    StorageEngine, StoredItem, WriteOp, DEFAULT_OPERATION_TIMEOUT,
};
use crate::utils::errors::{StorageError, StorageResult};

#[derive(Debug, Clone)]
pub struct MemoryEngine {
    items: Arc<RwLock<BTreeMap<ItemKey, StoredItem>>>,
    deadline: Duration,
    latency: Option<Duration>,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self {
            items: Arc::new(RwLock::new(BTreeMap::new())),
            deadline: DEFAULT_OPERATION_TIMEOUT,
            latency: None,
        }
    }

    /// Set the per-call deadline
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Delay every call, to exercise deadline handling
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of stored items
    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl StorageEngine for MemoryEngine {
    async fn get(&self, key: &ItemKey) -> StorageResult<StoredItem> {
        with_deadline("get", self.deadline, async {
            self.simulate_latency().await;
            let items = self.items.read().await;
            items
                .get(key)
                .cloned()
                .ok_or_else(|| StorageError::NotFound { key: key.clone() })
        })
        .await
    }

    async fn put_if_absent(&self, item: StoredItem) -> StorageResult<()> {
        with_deadline("put_if_absent", self.deadline, async {
            self.simulate_latency().await;
            let mut items = self.items.write().await;
            if items.contains_key(&item.key) {
                return Err(StorageError::AlreadyExists { key: item.key });
            }
            items.insert(item.key.clone(), item);
            Ok(())
        })
        .await
    }

    async fn put_if_version(&self, item: StoredItem, expected_prior: i64) -> StorageResult<()> {
        with_deadline("put_if_version", self.deadline, async {
            self.simulate_latency().await;
            let mut items = self.items.write().await;
            match items.get(&item.key).map(|stored| stored.version) {
                None => Err(StorageError::DoesNotExist { key: item.key }),
                Some(actual) if actual != expected_prior => Err(StorageError::VersionMismatch {
                    key: item.key,
                    expected: expected_prior,
                    actual,
                }),
                Some(_) => {
                    items.insert(item.key.clone(), item);
                    Ok(())
                }
            }
        })
        .await
    }

    async fn transact_write(&self, ops: Vec<WriteOp>) -> StorageResult<()> {
        validate_transaction(&ops)?;

        with_deadline("transact_write", self.deadline, async {
            self.simulate_latency().await;
            let mut items = self.items.write().await;

            let failures: Vec<ConditionFailure> = ops
                .iter()
                .enumerate()
                .filter_map(|(index, op)| {
                    let current = items.get(op.key()).map(|stored| stored.version);
                    check_condition(current, op.condition()).err().map(|reason: FailureReason| {
                        ConditionFailure { index, key: op.key().clone(), reason }
                    })
                })
                .collect();

            if !failures.is_empty() {
                tracing::debug!(failed = failures.len(), "Transaction canceled");
                return Err(StorageError::TransactionCanceled { failures });
            }

            for op in ops {
                match op {
                    WriteOp::Put { item, .. } => {
                        items.insert(item.key.clone(), item);
                    }
                    WriteOp::Delete { key, .. } => {
                        items.remove(&key);
                    }
                }
            }
            Ok(())
        })
        .await
    }

    async fn query(&self, request: QueryRequest) -> StorageResult<QueryPage> {
        if let Some(cursor) = &request.cursor {
            validate_cursor(&request.target, cursor)?;
        }

        with_deadline("query", self.deadline, async {
            self.simulate_latency().await;
            let items = self.items.read().await;

            let candidates: Vec<&StoredItem> = match &request.target {
                QueryTarget::Partition { pk, sk_prefix } => items
                    .range(ItemKey::new(pk.as_str(), sk_prefix.as_str())..)
                    .take_while(|(key, _)| key.pk == *pk && key.sk.starts_with(sk_prefix.as_str()))
                    .map(|(_, item)| item)
                    .collect(),
                QueryTarget::Index { partition } => items
                    .values()
                    .filter(|item| item.index.as_ref().is_some_and(|index| index.partition == *partition))
                    .collect(),
            };

            let target = &request.target;
            let mut keyed: Vec<_> = candidates
                .into_iter()
                .map(|item| (resume_key_for(target, item), item))
                .collect();
            keyed.sort_by(|(a, _), (b, _)| position(target, a).cmp(&position(target, b)));

            let fetched: Vec<StoredItem> = keyed
                .iter()
                .filter(|(key, _)| match &request.cursor {
                    Some(cursor) => position(target, key) > position(target, cursor),
                    None => true,
                })
                .take(request.limit + 1)
                .map(|(_, item)| (*item).clone())
                .collect();

            Ok(build_page(target, fetched, request.limit))
        })
        .await
    }
}
