//! DynamoDB HTTP request handlers

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use dynamock_core::{AwsError, ErrorCode, RequestId};

use crate::batch::{KeyRequest, WriteRequest};
use crate::expression::{
    parse_condition_expression, parse_key_condition_expression, parse_update_expression,
    ExpressionContext, UpdateInstruction, UpdateOperand,
};
use crate::filter::{
    ComparisonOperator, Condition, ConditionSet, ConditionalOperator, ItemFilter, KeyCondition,
};
use crate::storage::{
    AttributeDefinition, DynamoDBError, DynamoDBStorage, ItemIter, KeySchema, KeySchemaElement,
    ProvisionedThroughput, WriteCondition,
};
use crate::value::{AttributeValue, Item};

const CONTENT_TYPE: &str = "application/x-amz-json-1.0";

/// Shared state for DynamoDB handlers
pub struct DynamoDBState {
    pub storage: Arc<DynamoDBStorage>,
}

/// Handle a DynamoDB request
pub async fn handle_request(
    State(state): State<Arc<DynamoDBState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = RequestId::new();

    // Target format: DynamoDB_20120810.ActionName
    let target = match headers.get("x-amz-target").map(|t| t.to_str()) {
        Some(Ok(target)) => target,
        Some(Err(_)) => {
            return error_response(
                &request_id,
                ErrorCode::SerializationException,
                "Invalid x-amz-target header",
            )
        }
        None => {
            return error_response(
                &request_id,
                ErrorCode::MissingAction,
                "Missing x-amz-target header",
            )
        }
    };
    let action = target.rsplit('.').next().unwrap_or(target);

    let body_json: Value = if body.is_empty() {
        json!({})
    } else {
        match serde_json::from_slice(&body) {
            Ok(value @ Value::Object(_)) => value,
            Ok(_) => {
                return error_response(
                    &request_id,
                    ErrorCode::SerializationException,
                    "Request body must be a JSON object",
                )
            }
            Err(e) => {
                return error_response(
                    &request_id,
                    ErrorCode::SerializationException,
                    &format!("Invalid JSON: {e}"),
                )
            }
        }
    };

    info!(action = %action, request_id = %request_id, "DynamoDB request");

    let storage = state.storage.as_ref();
    let result = match action {
        "CreateTable" => handle_create_table(storage, &body_json),
        "DeleteTable" => handle_delete_table(storage, &body_json),
        "DescribeTable" => handle_describe_table(storage, &body_json),
        "UpdateTable" => handle_update_table(storage, &body_json),
        "ListTables" => handle_list_tables(storage, &body_json),
        "PutItem" => handle_put_item(storage, &body_json),
        "GetItem" => handle_get_item(storage, &body_json),
        "DeleteItem" => handle_delete_item(storage, &body_json),
        "UpdateItem" => handle_update_item(storage, &body_json),
        "Query" => handle_query(storage, &body_json),
        "Scan" => handle_scan(storage, &body_json),
        "BatchGetItem" => handle_batch_get_item(storage, &body_json),
        "BatchWriteItem" => handle_batch_write_item(storage, &body_json),
        _ => {
            warn!(action = %action, "Unknown DynamoDB operation");
            return error_response(
                &request_id,
                ErrorCode::UnknownOperationException,
                &format!("Unknown operation: {action}"),
            );
        }
    };

    match result {
        Ok(response_body) => json_response(&request_id, StatusCode::OK, &response_body),
        Err(e) => {
            warn!(action = %action, error = %e, "DynamoDB request failed");
            error_response(&request_id, e.code(), &e.to_string())
        }
    }
}

// === Table Operations ===

fn handle_create_table(storage: &DynamoDBStorage, body: &Value) -> Result<Value, DynamoDBError> {
    let table_name = table_name(body)?;
    let key_schema: Vec<KeySchemaElement> = parse_field(body, "KeySchema")?;
    let attribute_definitions: Vec<AttributeDefinition> =
        parse_field(body, "AttributeDefinitions")?;
    let throughput: ProvisionedThroughput =
        parse_optional(body, "ProvisionedThroughput")?.unwrap_or_default();

    let schema = KeySchema::from_definitions(&key_schema, &attribute_definitions)?;
    let description = storage.create_table(table_name, schema, throughput)?;

    Ok(json!({
        "TableDescription": description
    }))
}

fn handle_delete_table(storage: &DynamoDBStorage, body: &Value) -> Result<Value, DynamoDBError> {
    let description = storage.delete_table(table_name(body)?)?;

    Ok(json!({
        "TableDescription": description
    }))
}

fn handle_describe_table(storage: &DynamoDBStorage, body: &Value) -> Result<Value, DynamoDBError> {
    let description = storage.describe_table(table_name(body)?)?;

    Ok(json!({
        "Table": description
    }))
}

fn handle_update_table(storage: &DynamoDBStorage, body: &Value) -> Result<Value, DynamoDBError> {
    let table_name = table_name(body)?;
    let description = match parse_optional::<ProvisionedThroughput>(body, "ProvisionedThroughput")? {
        Some(throughput) => storage.update_throughput(table_name, throughput)?,
        None => storage.describe_table(table_name)?,
    };

    Ok(json!({
        "TableDescription": description
    }))
}

fn handle_list_tables(storage: &DynamoDBStorage, body: &Value) -> Result<Value, DynamoDBError> {
    let mut names = storage.list_tables();

    if let Some(start) = body.get("ExclusiveStartTableName").and_then(Value::as_str) {
        names.retain(|name| name.as_str() > start);
    }

    let mut last_evaluated = None;
    if let Some(limit) = parse_limit(body)? {
        if names.len() > limit {
            names.truncate(limit);
            last_evaluated = names.last().cloned();
        }
    }

    let mut result = json!({
        "TableNames": names
    });
    if let Some(last) = last_evaluated {
        result["LastEvaluatedTableName"] = json!(last);
    }

    Ok(result)
}

// === Item Operations ===

fn handle_put_item(storage: &DynamoDBStorage, body: &Value) -> Result<Value, DynamoDBError> {
    let table_name = table_name(body)?;
    let item: Item = parse_field(body, "Item")?;
    let attributes = ExpressionAttributes::parse(body)?;
    let condition = parse_write_condition(body, &attributes)?;
    let return_values = parse_return_values(body, &[ReturnValues::None, ReturnValues::AllOld])?;

    let outcome = storage.put_item(table_name, item, &condition)?;

    match (return_values, outcome.previous) {
        (ReturnValues::AllOld, Some(old)) => Ok(json!({ "Attributes": old })),
        _ => Ok(json!({})),
    }
}

fn handle_get_item(storage: &DynamoDBStorage, body: &Value) -> Result<Value, DynamoDBError> {
    let table_name = table_name(body)?;
    let key: Item = parse_field(body, "Key")?;

    match storage.get_item(table_name, &key) {
        Ok(found) => Ok(json!({ "Item": found.item })),
        Err(DynamoDBError::ItemNotFound) => Ok(json!({})),
        Err(e) => Err(e),
    }
}

fn handle_delete_item(storage: &DynamoDBStorage, body: &Value) -> Result<Value, DynamoDBError> {
    let table_name = table_name(body)?;
    let key: Item = parse_field(body, "Key")?;
    let attributes = ExpressionAttributes::parse(body)?;
    let condition = parse_write_condition(body, &attributes)?;
    let return_values = parse_return_values(body, &[ReturnValues::None, ReturnValues::AllOld])?;

    let removed = storage.delete_item(table_name, &key, &condition)?;

    match (return_values, removed) {
        (ReturnValues::AllOld, Some(old)) => Ok(json!({ "Attributes": old })),
        _ => Ok(json!({})),
    }
}

fn handle_update_item(storage: &DynamoDBStorage, body: &Value) -> Result<Value, DynamoDBError> {
    let table_name = table_name(body)?;
    let key: Item = parse_field(body, "Key")?;
    let attributes = ExpressionAttributes::parse(body)?;

    let update_expression = body.get("UpdateExpression").and_then(Value::as_str);
    let attribute_updates: Option<HashMap<String, AttributeValueUpdate>> =
        parse_optional(body, "AttributeUpdates")?;
    let instructions = match (update_expression, attribute_updates) {
        (Some(_), Some(_)) => {
            return Err(mixed_parameters("AttributeUpdates", "UpdateExpression"))
        }
        (Some(expression), None) => parse_update_expression(expression, attributes.context())?,
        (None, Some(updates)) => attribute_update_instructions(updates)?,
        (None, None) => Vec::new(),
    };

    let condition = parse_write_condition(body, &attributes)?;
    let return_values = parse_return_values(
        body,
        &[
            ReturnValues::None,
            ReturnValues::AllOld,
            ReturnValues::UpdatedOld,
            ReturnValues::AllNew,
            ReturnValues::UpdatedNew,
        ],
    )?;

    let outcome = storage.update_item(table_name, &key, &instructions, &condition)?;

    let returned = match return_values {
        ReturnValues::None => None,
        ReturnValues::AllOld => outcome.old,
        ReturnValues::AllNew => Some(outcome.new),
        ReturnValues::UpdatedOld => outcome.old.map(|old| updated_attributes(old, &instructions)),
        ReturnValues::UpdatedNew => Some(updated_attributes(outcome.new, &instructions)),
    };

    match returned {
        Some(attrs) if !attrs.is_empty() => Ok(json!({ "Attributes": attrs })),
        _ => Ok(json!({})),
    }
}

fn handle_query(storage: &DynamoDBStorage, body: &Value) -> Result<Value, DynamoDBError> {
    let table_name = table_name(body)?;
    reject_index(body, table_name)?;

    let schema = storage.key_schema(table_name)?;
    let attributes = ExpressionAttributes::parse(body)?;
    let partition_key = schema.partition_key().name.as_str();
    let sort_key = schema.sort_key().map(|k| k.name.as_str());

    let key_expression = body.get("KeyConditionExpression").and_then(Value::as_str);
    let key_conditions = parse_conditions(body, "KeyConditions")?;
    let key_condition = match (key_expression, key_conditions) {
        (Some(_), Some(_)) => return Err(mixed_parameters("KeyConditions", "KeyConditionExpression")),
        (Some(expression), None) => {
            parse_key_condition_expression(expression, attributes.context(), partition_key, sort_key)?
        }
        (None, Some(conditions)) => KeyCondition::from_conditions(conditions, partition_key, sort_key)?,
        (None, None) => {
            return Err(DynamoDBError::ValidationError(
                "Either the KeyConditions or KeyConditionExpression parameter must be specified in the request."
                    .to_string(),
            ))
        }
    };

    let filter = parse_filter(body, "QueryFilter", &attributes)?;
    let mut items = storage.query(
        table_name,
        &key_condition.partition,
        key_condition.sort.as_ref(),
        filter,
    )?;
    if body.get("ScanIndexForward").and_then(Value::as_bool) == Some(false) {
        items = items.reversed();
    }

    paginate(items, body)
}

fn handle_scan(storage: &DynamoDBStorage, body: &Value) -> Result<Value, DynamoDBError> {
    let table_name = table_name(body)?;
    reject_index(body, table_name)?;

    let attributes = ExpressionAttributes::parse(body)?;
    let filter = parse_filter(body, "ScanFilter", &attributes)?;
    let items = storage.scan(table_name, filter)?;

    paginate(items, body)
}

// === Batch Operations ===

#[derive(Debug, Deserialize)]
struct WriteRequestInput {
    #[serde(rename = "PutRequest")]
    put_request: Option<PutRequestInput>,
    #[serde(rename = "DeleteRequest")]
    delete_request: Option<DeleteRequestInput>,
}

#[derive(Debug, Deserialize)]
struct PutRequestInput {
    #[serde(rename = "Item")]
    item: Item,
}

#[derive(Debug, Deserialize)]
struct DeleteRequestInput {
    #[serde(rename = "Key")]
    key: Item,
}

#[derive(Debug, Deserialize)]
struct KeysAndAttributes {
    #[serde(rename = "Keys")]
    keys: Vec<Item>,
}

fn handle_batch_write_item(
    storage: &DynamoDBStorage,
    body: &Value,
) -> Result<Value, DynamoDBError> {
    let request_items: HashMap<String, Vec<WriteRequestInput>> =
        parse_field(body, "RequestItems")?;

    let mut requests = Vec::new();
    for (table, inputs) in request_items {
        for input in inputs {
            let request = match (input.put_request, input.delete_request) {
                (Some(put), None) => WriteRequest::Put {
                    table: table.clone(),
                    item: put.item,
                },
                (None, Some(delete)) => WriteRequest::Delete {
                    table: table.clone(),
                    key: delete.key,
                },
                _ => {
                    return Err(DynamoDBError::ValidationError(
                        "Supplied AttributeValue has more than one datatypes set, must contain exactly one of the supported datatypes"
                            .to_string(),
                    ))
                }
            };
            requests.push(request);
        }
    }

    let outcome = storage.batch_write(requests)?;

    let mut unprocessed: HashMap<String, Vec<Value>> = HashMap::new();
    for entry in outcome.unprocessed {
        let (table, request) = match entry.request {
            WriteRequest::Put { table, item } => (table, json!({ "PutRequest": { "Item": item } })),
            WriteRequest::Delete { table, key } => {
                (table, json!({ "DeleteRequest": { "Key": key } }))
            }
        };
        unprocessed.entry(table).or_default().push(request);
    }

    Ok(json!({
        "UnprocessedItems": unprocessed
    }))
}

fn handle_batch_get_item(storage: &DynamoDBStorage, body: &Value) -> Result<Value, DynamoDBError> {
    let request_items: HashMap<String, KeysAndAttributes> = parse_field(body, "RequestItems")?;

    let mut responses: HashMap<String, Vec<Item>> = HashMap::new();
    let mut keys = Vec::new();
    for (table, request) in request_items {
        responses.entry(table.clone()).or_default();
        keys.extend(request.keys.into_iter().map(|key| KeyRequest {
            table: table.clone(),
            key,
        }));
    }

    let mut results = storage.batch_get(keys)?;
    for (table, item) in results.by_ref() {
        responses.entry(table).or_default().push(item);
    }

    let mut unprocessed: HashMap<String, Value> = HashMap::new();
    for entry in results.into_unprocessed() {
        if responses.get(&entry.request.table).is_some_and(Vec::is_empty) {
            responses.remove(&entry.request.table);
        }
        let keys = unprocessed
            .entry(entry.request.table)
            .or_insert_with(|| json!({ "Keys": [] }));
        if let Some(list) = keys["Keys"].as_array_mut() {
            list.push(json!(entry.request.key));
        }
    }

    Ok(json!({
        "Responses": responses,
        "UnprocessedKeys": unprocessed
    }))
}

// === Helper Functions ===

fn table_name(body: &Value) -> Result<&str, DynamoDBError> {
    body.get("TableName")
        .and_then(Value::as_str)
        .ok_or_else(|| DynamoDBError::ValidationError("Missing TableName".to_string()))
}

/// Deserialize a required request field
fn parse_field<T: DeserializeOwned>(body: &Value, field: &str) -> Result<T, DynamoDBError> {
    parse_optional(body, field)?
        .ok_or_else(|| DynamoDBError::ValidationError(format!("Missing {field}")))
}

/// Deserialize an optional request field; JSON null counts as absent
fn parse_optional<T: DeserializeOwned>(
    body: &Value,
    field: &str,
) -> Result<Option<T>, DynamoDBError> {
    match body.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => T::deserialize(value)
            .map(Some)
            .map_err(|e| DynamoDBError::ValidationError(format!("Invalid {field}: {e}"))),
    }
}

fn parse_limit(body: &Value) -> Result<Option<usize>, DynamoDBError> {
    match parse_optional::<usize>(body, "Limit")? {
        Some(0) => Err(DynamoDBError::ValidationError(
            "1 validation error detected: Value '0' at 'limit' failed to satisfy constraint: Member must have value greater than or equal to 1"
                .to_string(),
        )),
        limit => Ok(limit),
    }
}

fn mixed_parameters(legacy: &str, expression: &str) -> DynamoDBError {
    DynamoDBError::ValidationError(format!(
        "Can not use both expression and non-expression parameters in the same request: \
         Non-expression parameters: {{{legacy}}} Expression parameters: {{{expression}}}"
    ))
}

fn reject_index(body: &Value, table_name: &str) -> Result<(), DynamoDBError> {
    match body.get("IndexName").and_then(Value::as_str) {
        Some(index) => Err(DynamoDBError::ValidationError(format!(
            "The table does not have the specified index: {index} (table {table_name})"
        ))),
        None => Ok(()),
    }
}

/// `ExpressionAttributeNames` and `ExpressionAttributeValues`
struct ExpressionAttributes {
    names: Option<HashMap<String, String>>,
    values: Option<HashMap<String, AttributeValue>>,
}

impl ExpressionAttributes {
    fn parse(body: &Value) -> Result<Self, DynamoDBError> {
        Ok(Self {
            names: parse_optional(body, "ExpressionAttributeNames")?,
            values: parse_optional(body, "ExpressionAttributeValues")?,
        })
    }

    fn context(&self) -> ExpressionContext<'_> {
        ExpressionContext::new(self.names.as_ref(), self.values.as_ref())
    }
}

#[derive(Debug, Deserialize)]
struct ConditionInput {
    #[serde(rename = "ComparisonOperator")]
    comparison_operator: ComparisonOperator,
    #[serde(rename = "AttributeValueList", default)]
    attribute_value_list: Vec<AttributeValue>,
}

/// Legacy `ScanFilter` / `QueryFilter` / `KeyConditions` map
fn parse_conditions(
    body: &Value,
    field: &str,
) -> Result<Option<Vec<(String, Condition)>>, DynamoDBError> {
    let Some(inputs) = parse_optional::<HashMap<String, ConditionInput>>(body, field)? else {
        return Ok(None);
    };
    inputs
        .into_iter()
        .map(|(name, input)| {
            Condition::new(input.comparison_operator, input.attribute_value_list)
                .map(|condition| (name, condition))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn parse_conditional_operator(body: &Value) -> Result<ConditionalOperator, DynamoDBError> {
    Ok(parse_optional(body, "ConditionalOperator")?.unwrap_or_default())
}

fn parse_filter(
    body: &Value,
    legacy_field: &str,
    attributes: &ExpressionAttributes,
) -> Result<ItemFilter, DynamoDBError> {
    let expression = body.get("FilterExpression").and_then(Value::as_str);
    match (expression, parse_conditions(body, legacy_field)?) {
        (Some(_), Some(_)) => Err(mixed_parameters(legacy_field, "FilterExpression")),
        (Some(expression), None) => Ok(ItemFilter::Expression(parse_condition_expression(
            expression,
            "FilterExpression",
            attributes.context(),
        )?)),
        (None, Some(conditions)) => Ok(ItemFilter::Conditions(ConditionSet::new(
            conditions,
            parse_conditional_operator(body)?,
        ))),
        (None, None) => Ok(ItemFilter::All),
    }
}

/// One entry of the legacy `Expected` map
#[derive(Debug, Deserialize)]
struct ExpectedAttributeValue {
    #[serde(rename = "Value")]
    value: Option<AttributeValue>,
    #[serde(rename = "Exists")]
    exists: Option<bool>,
    #[serde(rename = "ComparisonOperator")]
    comparison_operator: Option<ComparisonOperator>,
    #[serde(rename = "AttributeValueList", default)]
    attribute_value_list: Vec<AttributeValue>,
}

impl ExpectedAttributeValue {
    fn into_condition(self, name: &str) -> Result<Condition, DynamoDBError> {
        match (self.comparison_operator, self.exists, self.value) {
            (Some(operator), _, value) => {
                let values = if self.attribute_value_list.is_empty() {
                    value.into_iter().collect()
                } else {
                    self.attribute_value_list
                };
                Condition::new(operator, values)
            }
            (None, Some(false), None) => Ok(Condition::null()),
            (None, Some(false), Some(_)) => Err(DynamoDBError::ValidationError(format!(
                "One or more parameter values were invalid: Value cannot be used when Exists is false for Attribute: {name}"
            ))),
            (None, _, Some(value)) => Ok(Condition::eq(value)),
            (None, _, None) => Err(DynamoDBError::ValidationError(format!(
                "One or more parameter values were invalid: Value must be provided when Exists is true for Attribute: {name}"
            ))),
        }
    }
}

fn parse_write_condition(
    body: &Value,
    attributes: &ExpressionAttributes,
) -> Result<WriteCondition, DynamoDBError> {
    let expression = body.get("ConditionExpression").and_then(Value::as_str);
    let expected: Option<HashMap<String, ExpectedAttributeValue>> =
        parse_optional(body, "Expected")?;

    match (expression, expected) {
        (Some(_), Some(_)) => Err(mixed_parameters("Expected", "ConditionExpression")),
        (Some(expression), None) => Ok(WriteCondition::Expression(parse_condition_expression(
            expression,
            "ConditionExpression",
            attributes.context(),
        )?)),
        (None, Some(expected)) => {
            let conditions = expected
                .into_iter()
                .map(|(name, value)| value.into_condition(&name).map(|c| (name, c)))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(WriteCondition::Expected(ConditionSet::new(
                conditions,
                parse_conditional_operator(body)?,
            )))
        }
        (None, None) => Ok(WriteCondition::Always),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum ReturnValues {
    #[default]
    None,
    AllOld,
    UpdatedOld,
    AllNew,
    UpdatedNew,
}

fn parse_return_values(
    body: &Value,
    allowed: &[ReturnValues],
) -> Result<ReturnValues, DynamoDBError> {
    let return_values: ReturnValues = parse_optional(body, "ReturnValues")?.unwrap_or_default();
    if allowed.contains(&return_values) {
        Ok(return_values)
    } else {
        Err(DynamoDBError::ValidationError(
            "Return values set to invalid value".to_string(),
        ))
    }
}

/// The attributes an update touched
fn updated_attributes(mut item: Item, instructions: &[UpdateInstruction]) -> Item {
    item.retain(|name, _| instructions.iter().any(|i| i.attribute() == name));
    item
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum AttributeAction {
    #[default]
    Put,
    Delete,
    Add,
}

/// One entry of the legacy `AttributeUpdates` map
#[derive(Debug, Deserialize)]
struct AttributeValueUpdate {
    #[serde(rename = "Action", default)]
    action: AttributeAction,
    #[serde(rename = "Value")]
    value: Option<AttributeValue>,
}

/// Compile `AttributeUpdates` into update instructions, ordered by attribute name
fn attribute_update_instructions(
    updates: HashMap<String, AttributeValueUpdate>,
) -> Result<Vec<UpdateInstruction>, DynamoDBError> {
    let mut updates: Vec<_> = updates.into_iter().collect();
    updates.sort_by(|a, b| a.0.cmp(&b.0));

    updates
        .into_iter()
        .map(|(attribute, update)| match (update.action, update.value) {
            (AttributeAction::Put, Some(value)) => Ok(UpdateInstruction::Set {
                attribute,
                value: UpdateOperand::Value(value),
            }),
            (AttributeAction::Delete, None) => Ok(UpdateInstruction::Remove { attribute }),
            (AttributeAction::Delete, Some(value)) => {
                Ok(UpdateInstruction::Delete { attribute, value })
            }
            (AttributeAction::Add, Some(value)) => Ok(UpdateInstruction::Add { attribute, value }),
            (_, None) => Err(DynamoDBError::ValidationError(format!(
                "One or more parameter values were invalid: Only DELETE action is allowed when no attribute value is specified; attribute: {attribute}"
            ))),
        })
        .collect()
}

/// Apply `ExclusiveStartKey`, `Limit` and `Select` and build the response
fn paginate(mut items: ItemIter, body: &Value) -> Result<Value, DynamoDBError> {
    if let Some(start) = parse_optional::<Item>(body, "ExclusiveStartKey")? {
        items = items.start_after(&start)?;
    }
    if let Some(limit) = parse_limit(body)? {
        items = items.with_limit(limit);
    }
    let count_only = body.get("Select").and_then(Value::as_str) == Some("COUNT");

    let results: Vec<Item> = items.by_ref().collect();
    let mut response = json!({
        "Count": results.len(),
        "ScannedCount": items.scanned_count()
    });
    if !count_only {
        response["Items"] = json!(results);
    }
    if let Some(last_key) = items.last_evaluated_key() {
        response["LastEvaluatedKey"] = json!(last_key);
    }

    Ok(response)
}

/// Create a JSON response carrying the request id and checksum headers
fn json_response(request_id: &RequestId, status: StatusCode, body: &Value) -> Response {
    let body = body.to_string();
    let checksum = crc32fast::hash(body.as_bytes()).to_string();

    (
        status,
        [
            ("content-type", CONTENT_TYPE.to_string()),
            ("x-amzn-requestid", request_id.id.clone()),
            ("x-amz-id-2", request_id.extended_id.clone()),
            ("x-amz-crc32", checksum),
        ],
        body,
    )
        .into_response()
}

/// Create an error response
fn error_response(request_id: &RequestId, code: ErrorCode, message: &str) -> Response {
    let error = AwsError::new(code, message).with_request_id(request_id.id.clone());
    let status =
        StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = error.to_json();
    let checksum = crc32fast::hash(body.as_bytes()).to_string();

    (
        status,
        [
            ("content-type", CONTENT_TYPE.to_string()),
            ("x-amzn-requestid", error.request_id.clone()),
            ("x-amz-id-2", request_id.extended_id.clone()),
            ("x-amz-crc32", checksum),
        ],
        body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_exists_false_is_null_condition() {
        let expected: ExpectedAttributeValue = serde_json::from_value(json!({"Exists": false})).unwrap();
        assert_eq!(expected.into_condition("id").unwrap(), Condition::null());
    }

    #[test]
    fn test_expected_value_is_equality() {
        let expected: ExpectedAttributeValue =
            serde_json::from_value(json!({"Value": {"S": "Johann"}})).unwrap();
        assert_eq!(
            expected.into_condition("first_name").unwrap(),
            Condition::eq(AttributeValue::string("Johann"))
        );
    }

    #[test]
    fn test_expected_exists_false_with_value_is_rejected() {
        let expected: ExpectedAttributeValue =
            serde_json::from_value(json!({"Exists": false, "Value": {"S": "x"}})).unwrap();
        assert!(expected.into_condition("a").is_err());
    }

    #[test]
    fn test_attribute_updates_compile_to_instructions() {
        let updates: HashMap<String, AttributeValueUpdate> = serde_json::from_value(json!({
            "last_name": {"Action": "PUT", "Value": {"S": "Doh"}},
            "first_name": {"Action": "DELETE"},
            "visits": {"Action": "ADD", "Value": {"N": "1"}}
        }))
        .unwrap();

        let instructions = attribute_update_instructions(updates).unwrap();
        assert_eq!(
            instructions,
            vec![
                UpdateInstruction::Remove {
                    attribute: "first_name".to_string()
                },
                UpdateInstruction::Set {
                    attribute: "last_name".to_string(),
                    value: UpdateOperand::Value(AttributeValue::string("Doh")),
                },
                UpdateInstruction::Add {
                    attribute: "visits".to_string(),
                    value: AttributeValue::number(1i64),
                },
            ]
        );
    }

    #[test]
    fn test_updated_attributes_keeps_touched_names() {
        let mut item = Item::new();
        item.insert("a".to_string(), AttributeValue::number(1i64));
        item.insert("b".to_string(), AttributeValue::number(2i64));
        let instructions = vec![UpdateInstruction::Remove {
            attribute: "b".to_string(),
        }];
        let touched = updated_attributes(item, &instructions);
        assert_eq!(touched.len(), 1);
        assert!(touched.contains_key("b"));
    }

    #[test]
    fn test_return_values_restricted_per_operation() {
        let body = json!({"ReturnValues": "ALL_NEW"});
        assert!(parse_return_values(&body, &[ReturnValues::None, ReturnValues::AllOld]).is_err());
        assert_eq!(
            parse_return_values(&json!({}), &[ReturnValues::None]).unwrap(),
            ReturnValues::None
        );
    }
}
