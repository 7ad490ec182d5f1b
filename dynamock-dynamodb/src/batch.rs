//! Batch writes and reads
//!
//! Every entry of a batch runs on its own. A failing entry is handed back as
//! unprocessed together with its error; the others still apply.

use tracing::debug;

use crate::storage::{DynamoDBError, DynamoDBStorage, WriteCondition};
use crate::value::Item;

/// Maximum number of requests in one BatchWriteItem call
pub const MAX_BATCH_WRITE: usize = 25;
/// Maximum number of keys in one BatchGetItem call
pub const MAX_BATCH_GET: usize = 100;

/// One entry of a batch write
#[derive(Debug, Clone, PartialEq)]
pub enum WriteRequest {
    Put { table: String, item: Item },
    Delete { table: String, key: Item },
}

impl WriteRequest {
    pub fn table(&self) -> &str {
        match self {
            WriteRequest::Put { table, .. } | WriteRequest::Delete { table, .. } => table,
        }
    }
}

/// A batch entry that did not apply
#[derive(Debug)]
pub struct Unprocessed<T> {
    pub request: T,
    pub error: DynamoDBError,
}

#[derive(Debug, Default)]
pub struct BatchWriteOutcome {
    pub processed: usize,
    pub unprocessed: Vec<Unprocessed<WriteRequest>>,
}

/// One key of a batch get
#[derive(Debug, Clone, PartialEq)]
pub struct KeyRequest {
    pub table: String,
    pub key: Item,
}

impl DynamoDBStorage {
    /// Apply puts (overwriting) and deletes independently
    pub fn batch_write(
        &self,
        requests: Vec<WriteRequest>,
    ) -> Result<BatchWriteOutcome, DynamoDBError> {
        if requests.is_empty() || requests.len() > MAX_BATCH_WRITE {
            return Err(DynamoDBError::ValidationError(format!(
                "1 validation error detected: Value at 'requestItems' failed to satisfy constraint: \
                 Member must have length less than or equal to {MAX_BATCH_WRITE} and greater than or equal to 1"
            )));
        }

        let mut outcome = BatchWriteOutcome::default();
        for request in requests {
            let result = match &request {
                WriteRequest::Put { table, item } => self
                    .put_item(table, item.clone(), &WriteCondition::Always)
                    .map(|_| ()),
                WriteRequest::Delete { table, key } => self.delete(table, key).map(|_| ()),
            };
            match result {
                Ok(()) => outcome.processed += 1,
                Err(error) => {
                    debug!(table = %request.table(), error = %error, "Batch write entry failed");
                    outcome.unprocessed.push(Unprocessed { request, error });
                }
            }
        }

        debug!(
            processed = outcome.processed,
            unprocessed = outcome.unprocessed.len(),
            "Batch write"
        );
        Ok(outcome)
    }

    /// Fetch many keys lazily; missing items are skipped
    pub fn batch_get(&self, keys: Vec<KeyRequest>) -> Result<BatchGetIter<'_>, DynamoDBError> {
        if keys.is_empty() || keys.len() > MAX_BATCH_GET {
            return Err(DynamoDBError::ValidationError(format!(
                "Too many items requested for the BatchGetItem call; at most {MAX_BATCH_GET} keys are allowed"
            )));
        }

        Ok(BatchGetIter {
            storage: self,
            keys: keys.into_iter(),
            unprocessed: Vec::new(),
        })
    }
}

/// Lazy batch-get results as `(table, item)` pairs
pub struct BatchGetIter<'a> {
    storage: &'a DynamoDBStorage,
    keys: std::vec::IntoIter<KeyRequest>,
    unprocessed: Vec<Unprocessed<KeyRequest>>,
}

impl BatchGetIter<'_> {
    /// Keys that failed so far (missing table, malformed key)
    pub fn unprocessed(&self) -> &[Unprocessed<KeyRequest>] {
        &self.unprocessed
    }

    pub fn into_unprocessed(self) -> Vec<Unprocessed<KeyRequest>> {
        self.unprocessed
    }
}

impl Iterator for BatchGetIter<'_> {
    type Item = (String, Item);

    fn next(&mut self) -> Option<Self::Item> {
        for request in self.keys.by_ref() {
            match self.storage.get_item(&request.table, &request.key) {
                Ok(found) => return Some((request.table, found.item)),
                Err(DynamoDBError::ItemNotFound) => continue,
                Err(error) => {
                    debug!(table = %request.table, error = %error, "Batch get entry failed");
                    self.unprocessed.push(Unprocessed { request, error });
                }
            }
        }
        None
    }
}
