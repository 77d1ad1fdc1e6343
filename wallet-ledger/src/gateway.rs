//! Persistence gateway seam
//!
//! The ledger never talks to a database directly. The write-back synchronizer
//! pushes JSON documents through a [`PersistenceGateway`], which abstracts a
//! document store with two operations: insert a record, and update fields of
//! the record matching a key.

use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Document collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Account documents
    Users,
    /// Deposit documents
    Deposits,
    /// Transaction documents
    Transactions,
}

impl Collection {
    /// All collections
    pub const ALL: [Collection; 3] = [
        Collection::Users,
        Collection::Deposits,
        Collection::Transactions,
    ];

    /// Collection name in the durable store
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Deposits => "deposits",
            Collection::Transactions => "transactions",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Durable document store
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Store a document under `key`, replacing any document already there.
    ///
    /// The ledger starts empty on every run, so ids persisted by an earlier
    /// run can be written again.
    async fn insert(&self, collection: Collection, key: &str, record: Value) -> Result<()>;

    /// Set `fields` on the document stored under `key`
    async fn update_fields(
        &self,
        collection: Collection,
        key: &str,
        fields: Map<String, Value>,
    ) -> Result<()>;
}

/// Call observed by [`MemoryGateway`]
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    /// `insert`
    Insert {
        /// Target collection
        collection: Collection,
        /// Document key
        key: String,
    },
    /// `update_fields`
    Update {
        /// Target collection
        collection: Collection,
        /// Document key
        key: String,
    },
}

#[derive(Debug, Default)]
struct MemoryState {
    documents: HashMap<(Collection, String), Value>,
    calls: Vec<GatewayCall>,
    fail_after: Option<usize>,
}

/// In-process document store
///
/// Keeps documents in a map and logs every successful call in order.
/// Failures and latency can be injected for exercising the synchronizer.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    state: Mutex<MemoryState>,
    latency: Option<Duration>,
}

impl MemoryGateway {
    /// Empty gateway
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call after `successes` successful ones
    pub fn failing_after(successes: usize) -> Self {
        let gateway = Self::default();
        gateway.state.lock().fail_after = Some(successes);
        gateway
    }

    /// Delay every call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Successful calls in order
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().calls.clone()
    }

    /// Stored document
    pub fn document(&self, collection: Collection, key: &str) -> Option<Value> {
        self.state
            .lock()
            .documents
            .get(&(collection, key.to_string()))
            .cloned()
    }

    /// Number of documents in a collection
    pub fn count(&self, collection: Collection) -> usize {
        self.state
            .lock()
            .documents
            .keys()
            .filter(|(c, _)| *c == collection)
            .count()
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn check_failure(state: &MemoryState) -> Result<()> {
        match state.fail_after {
            Some(limit) if state.calls.len() >= limit => Err(Error::Storage(
                "injected gateway failure".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn insert(&self, collection: Collection, key: &str, record: Value) -> Result<()> {
        self.delay().await;

        let mut state = self.state.lock();
        Self::check_failure(&state)?;

        state.documents.insert((collection, key.to_string()), record);
        state.calls.push(GatewayCall::Insert {
            collection,
            key: key.to_string(),
        });
        Ok(())
    }

    async fn update_fields(
        &self,
        collection: Collection,
        key: &str,
        fields: Map<String, Value>,
    ) -> Result<()> {
        self.delay().await;

        let mut state = self.state.lock();
        Self::check_failure(&state)?;

        let document = state
            .documents
            .get_mut(&(collection, key.to_string()))
            .ok_or_else(|| Error::Storage(format!("no document {} in {}", key, collection)))?;
        merge_fields(document, fields)?;

        state.calls.push(GatewayCall::Update {
            collection,
            key: key.to_string(),
        });
        Ok(())
    }
}

/// Overwrite `fields` on a JSON object document
pub(crate) fn merge_fields(document: &mut Value, fields: Map<String, Value>) -> Result<()> {
    let object = document
        .as_object_mut()
        .ok_or_else(|| Error::Storage("stored document is not an object".to_string()))?;
    object.extend(fields);
    Ok(())
}
