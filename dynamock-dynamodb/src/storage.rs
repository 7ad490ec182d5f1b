//! DynamoDB table storage
//!
//! The catalog maps table names to [`Table`]s; each table keeps its items in
//! a sharded map keyed by [`PrimaryKey`]. Every write runs inside the map's
//! entry lock for that key, so conditional writes to one key are serialized.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use dynamock_core::ErrorCode;

use crate::config::DynamoDBConfig;
use crate::expression::{apply_update, ConditionExpression, ExpressionError, UpdateInstruction};
use crate::filter::{Condition, ConditionSet, ItemFilter};
use crate::value::{item_size, AttributeValue, Item, Number, ScalarAttributeType};

/// DynamoDB errors
#[derive(Debug, Error)]
pub enum DynamoDBError {
    #[error("Requested resource not found: Table: {0} not found")]
    TableNotFound(String),

    #[error("Table already exists: {0}")]
    TableAlreadyExists(String),

    #[error("{0}")]
    ValidationError(String),

    #[error("The conditional request failed")]
    ConditionalCheckFailed,

    #[error("Requested item not found")]
    ItemNotFound,

    #[error("{0}")]
    Serialization(String),

    #[error("{0}")]
    Expression(#[from] ExpressionError),
}

impl DynamoDBError {
    pub fn code(&self) -> ErrorCode {
        match self {
            DynamoDBError::TableNotFound(_) | DynamoDBError::ItemNotFound => {
                ErrorCode::ResourceNotFoundException
            }
            DynamoDBError::TableAlreadyExists(_) => ErrorCode::ResourceInUseException,
            DynamoDBError::ValidationError(_) | DynamoDBError::Expression(_) => {
                ErrorCode::ValidationException
            }
            DynamoDBError::ConditionalCheckFailed => ErrorCode::ConditionalCheckFailedException,
            DynamoDBError::Serialization(_) => ErrorCode::SerializationException,
        }
    }
}

/// Key schema element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySchemaElement {
    #[serde(rename = "AttributeName")]
    pub attribute_name: String,
    #[serde(rename = "KeyType")]
    pub key_type: KeyType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
    #[serde(rename = "HASH")]
    Hash,
    #[serde(rename = "RANGE")]
    Range,
}

/// Attribute definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    #[serde(rename = "AttributeName")]
    pub attribute_name: String,
    #[serde(rename = "AttributeType")]
    pub attribute_type: ScalarAttributeType,
}

/// Provisioned throughput settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedThroughput {
    #[serde(rename = "ReadCapacityUnits")]
    pub read_capacity_units: i64,
    #[serde(rename = "WriteCapacityUnits")]
    pub write_capacity_units: i64,
}

impl ProvisionedThroughput {
    pub fn new(read_capacity_units: i64, write_capacity_units: i64) -> Self {
        Self {
            read_capacity_units,
            write_capacity_units,
        }
    }
}

impl Default for ProvisionedThroughput {
    fn default() -> Self {
        Self::new(5, 5)
    }
}

/// Throughput as reported by DescribeTable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionedThroughputDescription {
    #[serde(rename = "ReadCapacityUnits")]
    pub read_capacity_units: i64,
    #[serde(rename = "WriteCapacityUnits")]
    pub write_capacity_units: i64,
    #[serde(rename = "NumberOfDecreasesToday")]
    pub number_of_decreases_today: i64,
    #[serde(rename = "LastIncreaseDateTime", skip_serializing_if = "Option::is_none")]
    pub last_increase_date_time: Option<f64>,
    #[serde(rename = "LastDecreaseDateTime", skip_serializing_if = "Option::is_none")]
    pub last_decrease_date_time: Option<f64>,
}

impl From<ProvisionedThroughput> for ProvisionedThroughputDescription {
    fn from(throughput: ProvisionedThroughput) -> Self {
        Self {
            read_capacity_units: throughput.read_capacity_units,
            write_capacity_units: throughput.write_capacity_units,
            number_of_decreases_today: 0,
            last_increase_date_time: None,
            last_decrease_date_time: None,
        }
    }
}

/// Table description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescription {
    #[serde(rename = "TableName")]
    pub table_name: String,
    #[serde(rename = "TableArn")]
    pub table_arn: String,
    #[serde(rename = "TableStatus")]
    pub table_status: TableStatus,
    #[serde(rename = "KeySchema")]
    pub key_schema: Vec<KeySchemaElement>,
    #[serde(rename = "AttributeDefinitions")]
    pub attribute_definitions: Vec<AttributeDefinition>,
    #[serde(rename = "ProvisionedThroughput")]
    pub provisioned_throughput: ProvisionedThroughputDescription,
    #[serde(rename = "CreationDateTime")]
    pub creation_date_time: f64,
    #[serde(rename = "ItemCount")]
    pub item_count: i64,
    #[serde(rename = "TableSizeBytes")]
    pub table_size_bytes: i64,
    /// Always empty; secondary indexes are not emulated
    #[serde(rename = "GlobalSecondaryIndexes")]
    pub global_secondary_indexes: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TableStatus {
    Active,
    Deleting,
}

// === Keys ===

/// A key attribute and its declared type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAttribute {
    pub name: String,
    pub attribute_type: ScalarAttributeType,
}

impl KeyAttribute {
    pub fn new(name: impl Into<String>, attribute_type: ScalarAttributeType) -> Self {
        Self {
            name: name.into(),
            attribute_type,
        }
    }

    fn key_value(&self, value: Option<&AttributeValue>) -> Result<KeyValue, DynamoDBError> {
        let value = value.ok_or_else(|| {
            DynamoDBError::ValidationError(format!(
                "One or more parameter values were invalid: Missing the key {} in the item",
                self.name
            ))
        })?;

        let key = match (self.attribute_type, value) {
            (ScalarAttributeType::S, AttributeValue::S(s)) => KeyValue::S(s.clone()),
            (ScalarAttributeType::N, AttributeValue::N(n)) => KeyValue::N(*n),
            (ScalarAttributeType::B, AttributeValue::B(b)) => KeyValue::B(b.clone()),
            _ => {
                return Err(DynamoDBError::ValidationError(format!(
                    "One or more parameter values were invalid: Type mismatch for key {} expected: {} actual: {}",
                    self.name,
                    self.attribute_type,
                    value.type_name()
                )))
            }
        };

        if key.is_empty() {
            return Err(DynamoDBError::ValidationError(format!(
                "One or more parameter values are not valid. The AttributeValue for a key attribute cannot contain an empty {} value. Key: {}",
                self.attribute_type, self.name
            )));
        }
        Ok(key)
    }
}

/// Partition key plus optional sort key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySchema {
    partition_key: KeyAttribute,
    sort_key: Option<KeyAttribute>,
}

impl KeySchema {
    pub fn new(partition_key: KeyAttribute, sort_key: Option<KeyAttribute>) -> Self {
        Self {
            partition_key,
            sort_key,
        }
    }

    /// Partition-key-only schema
    pub fn hash(name: impl Into<String>, attribute_type: ScalarAttributeType) -> Self {
        Self::new(KeyAttribute::new(name, attribute_type), None)
    }

    pub fn with_range(mut self, name: impl Into<String>, attribute_type: ScalarAttributeType) -> Self {
        self.sort_key = Some(KeyAttribute::new(name, attribute_type));
        self
    }

    /// Build from the `KeySchema` and `AttributeDefinitions` of a CreateTable request
    pub fn from_definitions(
        elements: &[KeySchemaElement],
        definitions: &[AttributeDefinition],
    ) -> Result<Self, DynamoDBError> {
        let resolve = |element: &KeySchemaElement| {
            definitions
                .iter()
                .find(|d| d.attribute_name == element.attribute_name)
                .map(|d| KeyAttribute::new(&element.attribute_name, d.attribute_type))
                .ok_or_else(|| {
                    DynamoDBError::ValidationError(format!(
                        "One or more parameter values were invalid: Some index key attributes are not defined in AttributeDefinitions. Keys: [{}]",
                        element.attribute_name
                    ))
                })
        };

        let mut partition_key = None;
        let mut sort_key = None;
        for element in elements {
            let slot = match element.key_type {
                KeyType::Hash => &mut partition_key,
                KeyType::Range => &mut sort_key,
            };
            if slot.is_some() {
                return Err(DynamoDBError::ValidationError(
                    "Invalid KeySchema: Too many key elements of the same type".to_string(),
                ));
            }
            *slot = Some(resolve(element)?);
        }

        let partition_key = partition_key.ok_or_else(|| {
            DynamoDBError::ValidationError(
                "Invalid KeySchema: The first KeySchemaElement is not a HASH key type".to_string(),
            )
        })?;
        if sort_key.as_ref().is_some_and(|s| s.name == partition_key.name) {
            return Err(DynamoDBError::ValidationError(
                "Both the Hash Key and the Range Key element in the KeySchema have the same name"
                    .to_string(),
            ));
        }

        Ok(Self::new(partition_key, sort_key))
    }

    pub fn partition_key(&self) -> &KeyAttribute {
        &self.partition_key
    }

    pub fn sort_key(&self) -> Option<&KeyAttribute> {
        self.sort_key.as_ref()
    }

    pub fn is_key_attribute(&self, name: &str) -> bool {
        self.partition_key.name == name || self.sort_key.as_ref().is_some_and(|s| s.name == name)
    }

    /// Primary key of a full item
    pub fn primary_key(&self, item: &Item) -> Result<PrimaryKey, DynamoDBError> {
        let partition = self.partition_key.key_value(item.get(&self.partition_key.name))?;
        let sort = self
            .sort_key
            .as_ref()
            .map(|sort_key| sort_key.key_value(item.get(&sort_key.name)))
            .transpose()?;
        Ok(PrimaryKey { partition, sort })
    }

    /// Primary key of a lookup key; attributes outside the key schema are ignored
    pub fn key_from_lookup(&self, key: &Item) -> Result<PrimaryKey, DynamoDBError> {
        self.primary_key(key)
    }

    /// Key attributes as an item
    pub fn key_item(&self, key: &PrimaryKey) -> Item {
        let mut item = Item::new();
        item.insert(self.partition_key.name.clone(), key.partition.to_attribute());
        if let (Some(sort_key), Some(sort)) = (&self.sort_key, &key.sort) {
            item.insert(sort_key.name.clone(), sort.to_attribute());
        }
        item
    }

    pub fn elements(&self) -> Vec<KeySchemaElement> {
        let mut elements = vec![KeySchemaElement {
            attribute_name: self.partition_key.name.clone(),
            key_type: KeyType::Hash,
        }];
        if let Some(sort_key) = &self.sort_key {
            elements.push(KeySchemaElement {
                attribute_name: sort_key.name.clone(),
                key_type: KeyType::Range,
            });
        }
        elements
    }

    pub fn attribute_definitions(&self) -> Vec<AttributeDefinition> {
        std::iter::once(&self.partition_key)
            .chain(self.sort_key.as_ref())
            .map(|key| AttributeDefinition {
                attribute_name: key.name.clone(),
                attribute_type: key.attribute_type,
            })
            .collect()
    }
}

/// Scalar key value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyValue {
    S(String),
    N(Number),
    B(Vec<u8>),
}

impl KeyValue {
    fn is_empty(&self) -> bool {
        match self {
            KeyValue::S(s) => s.is_empty(),
            KeyValue::N(_) => false,
            KeyValue::B(b) => b.is_empty(),
        }
    }

    pub fn to_attribute(&self) -> AttributeValue {
        match self {
            KeyValue::S(s) => AttributeValue::S(s.clone()),
            KeyValue::N(n) => AttributeValue::N(*n),
            KeyValue::B(b) => AttributeValue::B(b.clone()),
        }
    }
}

/// Identity of an item within a table
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrimaryKey {
    pub partition: KeyValue,
    pub sort: Option<KeyValue>,
}

// === Writes ===

/// Precondition for a write
#[derive(Debug, Clone, Default)]
pub enum WriteCondition {
    /// Only create; fail if the key is taken
    #[default]
    NotExists,
    /// Unconditional overwrite
    Always,
    /// The stored item must exist at exactly this revision
    Revision(u64),
    /// Legacy `Expected` map
    Expected(ConditionSet),
    /// Parsed `ConditionExpression`
    Expression(ConditionExpression),
}

impl WriteCondition {
    fn check(&self, current: Option<&StoredItem>) -> Result<(), DynamoDBError> {
        let empty = Item::new();
        let document = current.map_or(&empty, |stored| stored.item.as_ref());
        let passed = match self {
            WriteCondition::NotExists => current.is_none(),
            WriteCondition::Always => true,
            WriteCondition::Revision(revision) => {
                current.is_some_and(|stored| stored.revision == *revision)
            }
            WriteCondition::Expected(conditions) => conditions.matches(document),
            WriteCondition::Expression(expression) => expression.evaluate(document),
        };

        if passed {
            Ok(())
        } else {
            Err(DynamoDBError::ConditionalCheckFailed)
        }
    }
}

/// An item together with its revision
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedItem {
    pub item: Item,
    pub revision: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PutOutcome {
    pub revision: u64,
    pub previous: Option<Item>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    pub old: Option<Item>,
    pub new: Item,
    pub revision: u64,
}

struct StoredItem {
    item: Arc<Item>,
    revision: u64,
    size: usize,
}

impl StoredItem {
    fn new(item: Item) -> Self {
        Self {
            size: item_size(&item),
            item: Arc::new(item),
            revision: 1,
        }
    }

    /// Swap in a new document and bump the revision, returning the old one
    fn replace(&mut self, item: Item) -> Item {
        self.size = item_size(&item);
        self.revision += 1;
        let previous = std::mem::replace(&mut self.item, Arc::new(item));
        Arc::try_unwrap(previous).unwrap_or_else(|shared| (*shared).clone())
    }
}

/// A table and its items
pub(crate) struct Table {
    name: String,
    arn: String,
    schema: KeySchema,
    created_at: f64,
    throughput: Mutex<ProvisionedThroughputDescription>,
    items: DashMap<PrimaryKey, StoredItem>,
}

impl Table {
    fn describe(&self, status: TableStatus) -> TableDescription {
        let size: usize = self.items.iter().map(|entry| entry.size).sum();
        TableDescription {
            table_name: self.name.clone(),
            table_arn: self.arn.clone(),
            table_status: status,
            key_schema: self.schema.elements(),
            attribute_definitions: self.schema.attribute_definitions(),
            provisioned_throughput: self.throughput.lock().clone(),
            creation_date_time: self.created_at,
            item_count: i64::try_from(self.items.len()).unwrap_or(i64::MAX),
            table_size_bytes: i64::try_from(size).unwrap_or(i64::MAX),
            global_secondary_indexes: Vec::new(),
        }
    }

    fn fetch(&self, key: &PrimaryKey) -> Option<Arc<Item>> {
        self.items.get(key).map(|stored| Arc::clone(&stored.item))
    }
}

fn epoch_seconds() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

fn validate_table_name(name: &str) -> Result<(), DynamoDBError> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if !(3..=255).contains(&name.len()) || !valid_chars {
        return Err(DynamoDBError::ValidationError(format!(
            "1 validation error detected: Value '{name}' at 'tableName' failed to satisfy constraint: \
             Member must satisfy regular expression pattern: [a-zA-Z0-9_.-]+ with length between 3 and 255"
        )));
    }
    Ok(())
}

/// In-memory DynamoDB storage
pub struct DynamoDBStorage {
    tables: DashMap<String, Arc<Table>>,
    config: DynamoDBConfig,
}

impl Default for DynamoDBStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl DynamoDBStorage {
    pub fn new() -> Self {
        Self::with_config(DynamoDBConfig::default())
    }

    pub fn with_config(config: DynamoDBConfig) -> Self {
        Self {
            tables: DashMap::new(),
            config,
        }
    }

    pub(crate) fn table(&self, table_name: &str) -> Result<Arc<Table>, DynamoDBError> {
        self.tables
            .get(table_name)
            .map(|table| Arc::clone(&table))
            .ok_or_else(|| DynamoDBError::TableNotFound(table_name.to_string()))
    }

    // === Catalog ===

    /// Create a new table
    pub fn create_table(
        &self,
        table_name: &str,
        key_schema: KeySchema,
        throughput: ProvisionedThroughput,
    ) -> Result<TableDescription, DynamoDBError> {
        validate_table_name(table_name)?;

        match self.tables.entry(table_name.to_string()) {
            Entry::Occupied(_) => Err(DynamoDBError::TableAlreadyExists(table_name.to_string())),
            Entry::Vacant(entry) => {
                let table = Table {
                    name: table_name.to_string(),
                    arn: self.config.table_arn(table_name),
                    schema: key_schema,
                    created_at: epoch_seconds(),
                    throughput: Mutex::new(throughput.into()),
                    items: DashMap::new(),
                };
                let description = table.describe(TableStatus::Active);
                entry.insert(Arc::new(table));
                info!(table = %table_name, "Created table");
                Ok(description)
            }
        }
    }

    /// Describe a table
    pub fn describe_table(&self, table_name: &str) -> Result<TableDescription, DynamoDBError> {
        Ok(self.table(table_name)?.describe(TableStatus::Active))
    }

    /// Delete a table and all of its items
    pub fn delete_table(&self, table_name: &str) -> Result<TableDescription, DynamoDBError> {
        let (_, table) = self
            .tables
            .remove(table_name)
            .ok_or_else(|| DynamoDBError::TableNotFound(table_name.to_string()))?;

        info!(table = %table_name, "Deleted table");
        Ok(table.describe(TableStatus::Deleting))
    }

    /// Replace the provisioned capacity of a table
    pub fn update_throughput(
        &self,
        table_name: &str,
        throughput: ProvisionedThroughput,
    ) -> Result<TableDescription, DynamoDBError> {
        let table = self.table(table_name)?;
        {
            let mut current = table.throughput.lock();
            let now = epoch_seconds();
            if throughput.read_capacity_units < current.read_capacity_units
                || throughput.write_capacity_units < current.write_capacity_units
            {
                current.number_of_decreases_today += 1;
                current.last_decrease_date_time = Some(now);
            }
            if throughput.read_capacity_units > current.read_capacity_units
                || throughput.write_capacity_units > current.write_capacity_units
            {
                current.last_increase_date_time = Some(now);
            }
            current.read_capacity_units = throughput.read_capacity_units;
            current.write_capacity_units = throughput.write_capacity_units;
        }

        info!(
            table = %table_name,
            read = throughput.read_capacity_units,
            write = throughput.write_capacity_units,
            "Updated table throughput"
        );
        Ok(table.describe(TableStatus::Active))
    }

    /// List all table names, sorted
    pub fn list_tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    pub fn key_schema(&self, table_name: &str) -> Result<KeySchema, DynamoDBError> {
        Ok(self.table(table_name)?.schema.clone())
    }

    // === Items ===

    /// Store an item if `condition` holds against the current one
    pub fn put_item(
        &self,
        table_name: &str,
        item: Item,
        condition: &WriteCondition,
    ) -> Result<PutOutcome, DynamoDBError> {
        let table = self.table(table_name)?;
        let key = table.schema.primary_key(&item)?;

        let outcome = match table.items.entry(key) {
            Entry::Occupied(mut entry) => {
                condition.check(Some(entry.get()))?;
                let stored = entry.get_mut();
                let previous = stored.replace(item);
                PutOutcome {
                    revision: stored.revision,
                    previous: Some(previous),
                }
            }
            Entry::Vacant(entry) => {
                condition.check(None)?;
                entry.insert(StoredItem::new(item));
                PutOutcome {
                    revision: 1,
                    previous: None,
                }
            }
        };

        debug!(table = %table_name, revision = outcome.revision, "Put item");
        Ok(outcome)
    }

    /// Get an item by key
    pub fn get_item(&self, table_name: &str, key: &Item) -> Result<VersionedItem, DynamoDBError> {
        let table = self.table(table_name)?;
        let key = table.schema.key_from_lookup(key)?;

        let (item, revision) = table
            .items
            .get(&key)
            .map(|stored| (Arc::clone(&stored.item), stored.revision))
            .ok_or(DynamoDBError::ItemNotFound)?;

        Ok(VersionedItem {
            item: (*item).clone(),
            revision,
        })
    }

    /// Delete an item if `condition` holds; returns the removed item
    pub fn delete_item(
        &self,
        table_name: &str,
        key: &Item,
        condition: &WriteCondition,
    ) -> Result<Option<Item>, DynamoDBError> {
        let table = self.table(table_name)?;
        let key = table.schema.key_from_lookup(key)?;

        let removed = match table.items.entry(key) {
            Entry::Occupied(entry) => {
                condition.check(Some(entry.get()))?;
                let (_, stored) = entry.remove_entry();
                Some(Arc::try_unwrap(stored.item).unwrap_or_else(|shared| (*shared).clone()))
            }
            Entry::Vacant(_) => {
                condition.check(None)?;
                None
            }
        };

        debug!(table = %table_name, removed = removed.is_some(), "Delete item");
        Ok(removed)
    }

    /// Unconditional delete; true if an item was removed
    pub fn delete(&self, table_name: &str, key: &Item) -> Result<bool, DynamoDBError> {
        self.delete_item(table_name, key, &WriteCondition::Always)
            .map(|removed| removed.is_some())
    }

    /// Apply update instructions to an item, creating it from the key if absent
    pub fn update_item(
        &self,
        table_name: &str,
        key: &Item,
        instructions: &[UpdateInstruction],
        condition: &WriteCondition,
    ) -> Result<UpdateOutcome, DynamoDBError> {
        let table = self.table(table_name)?;
        let primary_key = table.schema.key_from_lookup(key)?;

        if let Some(instruction) = instructions
            .iter()
            .find(|i| table.schema.is_key_attribute(i.attribute()))
        {
            return Err(DynamoDBError::ValidationError(format!(
                "One or more parameter values were invalid: Cannot update attribute {}. This attribute is part of the key",
                instruction.attribute()
            )));
        }

        let outcome = match table.items.entry(primary_key.clone()) {
            Entry::Occupied(mut entry) => {
                condition.check(Some(entry.get()))?;
                let current = Arc::clone(&entry.get().item);
                let updated = apply_update(&current, instructions)?;
                let stored = entry.get_mut();
                let old = stored.replace(updated.clone());
                UpdateOutcome {
                    old: Some(old),
                    new: updated,
                    revision: stored.revision,
                }
            }
            Entry::Vacant(entry) => {
                condition.check(None)?;
                let updated = apply_update(&table.schema.key_item(&primary_key), instructions)?;
                entry.insert(StoredItem::new(updated.clone()));
                UpdateOutcome {
                    old: None,
                    new: updated,
                    revision: 1,
                }
            }
        };

        debug!(
            table = %table_name,
            revision = outcome.revision,
            instructions = instructions.len(),
            "Updated item"
        );
        Ok(outcome)
    }

    /// Number of items in a table
    pub fn count(&self, table_name: &str) -> Result<usize, DynamoDBError> {
        Ok(self.table(table_name)?.items.len())
    }

    // === Query / Scan ===

    /// Every item that passes `filter`, in primary-key order
    pub fn scan(&self, table_name: &str, filter: ItemFilter) -> Result<ItemIter, DynamoDBError> {
        let table = self.table(table_name)?;
        let mut keys: Vec<PrimaryKey> = table.items.iter().map(|r| r.key().clone()).collect();
        keys.sort();

        debug!(table = %table_name, candidates = keys.len(), "Scan");
        Ok(ItemIter::new(table, keys, filter))
    }

    /// Items of one partition, ordered by sort key
    pub fn query(
        &self,
        table_name: &str,
        partition: &AttributeValue,
        sort_condition: Option<&Condition>,
        filter: ItemFilter,
    ) -> Result<ItemIter, DynamoDBError> {
        let table = self.table(table_name)?;
        let partition = table.schema.partition_key.key_value(Some(partition))?;

        if let Some(condition) = sort_condition {
            if table.schema.sort_key.is_none() {
                return Err(DynamoDBError::ValidationError(format!(
                    "Query key condition not supported: table {table_name} has no sort key"
                )));
            }
            if !condition.operator().is_key_operator() {
                return Err(DynamoDBError::ValidationError(format!(
                    "Query key condition not supported: {}",
                    condition.operator().as_str()
                )));
            }
        }

        let mut keys: Vec<PrimaryKey> = table
            .items
            .iter()
            .filter(|r| r.key().partition == partition)
            .filter(|r| match (sort_condition, &r.key().sort) {
                (Some(condition), Some(sort)) => condition.matches(Some(&sort.to_attribute())),
                _ => true,
            })
            .map(|r| r.key().clone())
            .collect();
        keys.sort();

        debug!(table = %table_name, candidates = keys.len(), "Query");
        Ok(ItemIter::new(table, keys, filter))
    }
}

/// Lazy result sequence of a scan or query
///
/// Holds a snapshot of matching keys; documents are fetched and filtered on
/// each `next()`, so items deleted after the snapshot are skipped.
pub struct ItemIter {
    table: Arc<Table>,
    keys: Vec<PrimaryKey>,
    position: usize,
    descending: bool,
    filter: ItemFilter,
    limit: Option<usize>,
    scanned: usize,
    last_key: Option<PrimaryKey>,
}

impl ItemIter {
    fn new(table: Arc<Table>, keys: Vec<PrimaryKey>, filter: ItemFilter) -> Self {
        Self {
            table,
            keys,
            position: 0,
            descending: false,
            filter,
            limit: None,
            scanned: 0,
            last_key: None,
        }
    }

    /// Iterate in reverse key order
    pub fn reversed(mut self) -> Self {
        self.keys.reverse();
        self.descending = !self.descending;
        self
    }

    /// Resume after `key` (an `ExclusiveStartKey`) in the current direction
    pub fn start_after(mut self, key: &Item) -> Result<Self, DynamoDBError> {
        let start = self.table.schema.key_from_lookup(key)?;
        let descending = self.descending;
        self.keys
            .retain(|candidate| if descending { candidate < &start } else { candidate > &start });
        self.position = 0;
        Ok(self)
    }

    /// Stop after evaluating `limit` stored items
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Number of stored items evaluated so far
    pub fn scanned_count(&self) -> usize {
        self.scanned
    }

    /// Key to resume from, when a limit stopped the iteration early
    pub fn last_evaluated_key(&self) -> Option<Item> {
        let limited = self.limit.is_some_and(|limit| self.scanned >= limit);
        if !limited || self.position >= self.keys.len() {
            return None;
        }
        self.last_key.as_ref().map(|key| self.table.schema.key_item(key))
    }
}

impl Iterator for ItemIter {
    type Item = Item;

    fn next(&mut self) -> Option<Item> {
        while self.position < self.keys.len() {
            if self.limit.is_some_and(|limit| self.scanned >= limit) {
                return None;
            }

            let key = &self.keys[self.position];
            self.position += 1;
            let Some(item) = self.table.fetch(key) else {
                continue;
            };

            self.scanned += 1;
            self.last_key = Some(key.clone());
            if self.filter.matches(&item) {
                return Some((*item).clone());
            }
        }
        None
    }
}
