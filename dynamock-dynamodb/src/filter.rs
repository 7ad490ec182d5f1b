//! Legacy comparison predicates
//!
//! `ScanFilter`, `QueryFilter`, `KeyConditions` and `Expected` all attach a
//! [`Condition`] (a `ComparisonOperator` plus its operand list) to an
//! attribute name. Operands are validated up front; evaluation never fails.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::expression::ConditionExpression;
use crate::storage::DynamoDBError;
use crate::value::{AttributeValue, Item};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComparisonOperator {
    Eq,
    Ne,
    Le,
    Lt,
    Ge,
    Gt,
    NotNull,
    Null,
    Contains,
    NotContains,
    BeginsWith,
    In,
    Between,
}

impl ComparisonOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "EQ",
            Self::Ne => "NE",
            Self::Le => "LE",
            Self::Lt => "LT",
            Self::Ge => "GE",
            Self::Gt => "GT",
            Self::NotNull => "NOT_NULL",
            Self::Null => "NULL",
            Self::Contains => "CONTAINS",
            Self::NotContains => "NOT_CONTAINS",
            Self::BeginsWith => "BEGINS_WITH",
            Self::In => "IN",
            Self::Between => "BETWEEN",
        }
    }

    /// Operators allowed on a sort key in a query
    pub fn is_key_operator(&self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Le | Self::Lt | Self::Ge | Self::Gt | Self::BeginsWith | Self::Between
        )
    }
}

/// How a set of conditions combines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConditionalOperator {
    #[default]
    And,
    Or,
}

/// A validated comparison predicate
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    operator: ComparisonOperator,
    values: Vec<AttributeValue>,
}

impl Condition {
    pub fn new(
        operator: ComparisonOperator,
        values: Vec<AttributeValue>,
    ) -> Result<Self, DynamoDBError> {
        let arity_error = || {
            DynamoDBError::ValidationError(format!(
                "One or more parameter values were invalid: Invalid number of argument(s) for the {} ComparisonOperator",
                operator.as_str()
            ))
        };
        let type_error = |value: &AttributeValue| {
            DynamoDBError::ValidationError(format!(
                "One or more parameter values were invalid: ComparisonOperator {} is not valid for {} AttributeValue type",
                operator.as_str(),
                value.type_name()
            ))
        };

        match operator {
            ComparisonOperator::Null | ComparisonOperator::NotNull => {
                if !values.is_empty() {
                    return Err(arity_error());
                }
            }
            ComparisonOperator::Eq | ComparisonOperator::Ne => {
                if values.len() != 1 {
                    return Err(arity_error());
                }
            }
            ComparisonOperator::Lt
            | ComparisonOperator::Le
            | ComparisonOperator::Gt
            | ComparisonOperator::Ge
            | ComparisonOperator::Contains
            | ComparisonOperator::NotContains => {
                let [value] = values.as_slice() else {
                    return Err(arity_error());
                };
                if value.scalar_type().is_none() {
                    return Err(type_error(value));
                }
            }
            ComparisonOperator::BeginsWith => {
                let [value] = values.as_slice() else {
                    return Err(arity_error());
                };
                if !matches!(value, AttributeValue::S(_) | AttributeValue::B(_)) {
                    return Err(type_error(value));
                }
            }
            ComparisonOperator::In => {
                if values.is_empty() {
                    return Err(arity_error());
                }
                if let Some(value) = values.iter().find(|v| v.scalar_type().is_none()) {
                    return Err(type_error(value));
                }
            }
            ComparisonOperator::Between => {
                let [low, high] = values.as_slice() else {
                    return Err(arity_error());
                };
                if low.scalar_type().is_none() {
                    return Err(type_error(low));
                }
                match low.compare(high) {
                    None => {
                        return Err(DynamoDBError::ValidationError(format!(
                            "One or more parameter values were invalid: AttributeValues inside AttributeValueList must be of same type; {} and {}",
                            low.type_name(),
                            high.type_name()
                        )))
                    }
                    Some(Ordering::Greater) => {
                        return Err(DynamoDBError::ValidationError(
                            "Invalid BETWEEN condition: the lower bound is greater than the upper bound"
                                .to_string(),
                        ))
                    }
                    Some(_) => {}
                }
            }
        }

        Ok(Self { operator, values })
    }

    pub fn eq(value: AttributeValue) -> Self {
        Self {
            operator: ComparisonOperator::Eq,
            values: vec![value],
        }
    }

    pub fn null() -> Self {
        Self {
            operator: ComparisonOperator::Null,
            values: Vec::new(),
        }
    }

    pub fn not_null() -> Self {
        Self {
            operator: ComparisonOperator::NotNull,
            values: Vec::new(),
        }
    }

    pub fn operator(&self) -> ComparisonOperator {
        self.operator
    }

    pub fn values(&self) -> &[AttributeValue] {
        &self.values
    }

    /// Evaluate against an attribute value; `None` means the attribute is absent
    pub fn matches(&self, value: Option<&AttributeValue>) -> bool {
        let value = match (self.operator, value) {
            (ComparisonOperator::Null, value) => return value.is_none(),
            (ComparisonOperator::NotNull, value) => return value.is_some(),
            (_, None) => return false,
            (_, Some(value)) => value,
        };

        let ordered = |accept: fn(Ordering) -> bool| value.compare(&self.values[0]).is_some_and(accept);

        match self.operator {
            ComparisonOperator::Eq => value == &self.values[0],
            ComparisonOperator::Ne => value != &self.values[0],
            ComparisonOperator::Lt => ordered(Ordering::is_lt),
            ComparisonOperator::Le => ordered(Ordering::is_le),
            ComparisonOperator::Gt => ordered(Ordering::is_gt),
            ComparisonOperator::Ge => ordered(Ordering::is_ge),
            ComparisonOperator::Between => {
                value.compare(&self.values[0]).is_some_and(Ordering::is_ge)
                    && value.compare(&self.values[1]).is_some_and(Ordering::is_le)
            }
            ComparisonOperator::BeginsWith => begins_with(value, &self.values[0]),
            ComparisonOperator::Contains => contains(value, &self.values[0]),
            ComparisonOperator::NotContains => !contains(value, &self.values[0]),
            ComparisonOperator::In => self.values.iter().any(|candidate| candidate == value),
            ComparisonOperator::Null => false,
            ComparisonOperator::NotNull => true,
        }
    }
}

pub(crate) fn begins_with(value: &AttributeValue, prefix: &AttributeValue) -> bool {
    match (value, prefix) {
        (AttributeValue::S(s), AttributeValue::S(p)) => s.starts_with(p.as_str()),
        (AttributeValue::B(b), AttributeValue::B(p)) => b.starts_with(p),
        _ => false,
    }
}

pub(crate) fn contains(haystack: &AttributeValue, needle: &AttributeValue) -> bool {
    match (haystack, needle) {
        (AttributeValue::S(s), AttributeValue::S(n)) => s.contains(n.as_str()),
        (AttributeValue::B(b), AttributeValue::B(n)) => {
            n.is_empty() || b.windows(n.len()).any(|window| window == n.as_slice())
        }
        (AttributeValue::Ss(set), AttributeValue::S(n)) => set.contains(n),
        (AttributeValue::Ns(set), AttributeValue::N(n)) => set.contains(n),
        (AttributeValue::Bs(set), AttributeValue::B(n)) => set.contains(n),
        (AttributeValue::L(list), needle) => list.iter().any(|element| element == needle),
        _ => false,
    }
}

/// Conditions on named attributes combined with AND or OR
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionSet {
    conditions: Vec<(String, Condition)>,
    operator: ConditionalOperator,
}

impl ConditionSet {
    pub fn new(
        conditions: impl IntoIterator<Item = (String, Condition)>,
        operator: ConditionalOperator,
    ) -> Self {
        Self {
            conditions: conditions.into_iter().collect(),
            operator,
        }
    }

    /// Every condition must hold
    pub fn all(conditions: impl IntoIterator<Item = (String, Condition)>) -> Self {
        Self::new(conditions, ConditionalOperator::And)
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, item: &Item) -> bool {
        if self.conditions.is_empty() {
            return true;
        }
        let mut results = self
            .conditions
            .iter()
            .map(|(name, condition)| condition.matches(item.get(name)));
        match self.operator {
            ConditionalOperator::And => results.all(|passed| passed),
            ConditionalOperator::Or => results.any(|passed| passed),
        }
    }
}

/// Post-filter applied by scan and query
#[derive(Debug, Clone, Default)]
pub enum ItemFilter {
    #[default]
    All,
    Conditions(ConditionSet),
    Expression(ConditionExpression),
}

impl ItemFilter {
    pub fn matches(&self, item: &Item) -> bool {
        match self {
            ItemFilter::All => true,
            ItemFilter::Conditions(conditions) => conditions.matches(item),
            ItemFilter::Expression(expression) => expression.evaluate(item),
        }
    }
}

impl From<ConditionSet> for ItemFilter {
    fn from(conditions: ConditionSet) -> Self {
        ItemFilter::Conditions(conditions)
    }
}

/// Partition value plus optional sort-key predicate for a query
#[derive(Debug, Clone, PartialEq)]
pub struct KeyCondition {
    pub partition: AttributeValue,
    pub sort: Option<Condition>,
}

impl KeyCondition {
    /// Build from the legacy `KeyConditions` map
    pub fn from_conditions(
        mut conditions: Vec<(String, Condition)>,
        partition_key: &str,
        sort_key: Option<&str>,
    ) -> Result<Self, DynamoDBError> {
        let position = conditions
            .iter()
            .position(|(name, _)| name == partition_key)
            .ok_or_else(|| {
                DynamoDBError::ValidationError(
                    "Query condition missed key schema element".to_string(),
                )
            })?;
        let (_, partition) = conditions.swap_remove(position);
        if partition.operator != ComparisonOperator::Eq {
            return Err(DynamoDBError::ValidationError(format!(
                "Query key condition not supported: {} on partition key",
                partition.operator.as_str()
            )));
        }

        let sort = match conditions.pop() {
            None => None,
            Some(_) if !conditions.is_empty() => {
                return Err(DynamoDBError::ValidationError(
                    "Conditions can be of length 1 or 2 only".to_string(),
                ))
            }
            Some((name, condition)) => {
                if sort_key != Some(name.as_str()) {
                    return Err(DynamoDBError::ValidationError(format!(
                        "Query condition references a non-key attribute: {name}"
                    )));
                }
                Some(condition)
            }
        };

        let partition = partition.values.into_iter().next().ok_or_else(|| {
            DynamoDBError::ValidationError("Missing partition key value".to_string())
        })?;

        Ok(Self { partition, sort })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> AttributeValue {
        AttributeValue::string(v)
    }

    fn n(v: i64) -> AttributeValue {
        AttributeValue::number(v)
    }

    #[test]
    fn test_missing_attribute_matches_only_null() {
        assert!(Condition::null().matches(None));
        assert!(!Condition::not_null().matches(None));
        assert!(!Condition::eq(s("x")).matches(None));
        let ne = Condition::new(ComparisonOperator::Ne, vec![s("x")]).unwrap();
        assert!(!ne.matches(None));
        let not_contains = Condition::new(ComparisonOperator::NotContains, vec![s("x")]).unwrap();
        assert!(!not_contains.matches(None));
    }

    #[test]
    fn test_null_ignores_value() {
        assert!(Condition::not_null().matches(Some(&AttributeValue::Null(true))));
        assert!(!Condition::null().matches(Some(&s(""))));
    }

    #[test]
    fn test_between_is_inclusive() {
        let between = Condition::new(ComparisonOperator::Between, vec![n(5), n(8)]).unwrap();
        assert!(between.matches(Some(&n(5))));
        assert!(between.matches(Some(&n(8))));
        assert!(!between.matches(Some(&n(9))));
        assert!(!between.matches(Some(&s("6"))));
    }

    #[test]
    fn test_operand_validation() {
        assert!(Condition::new(ComparisonOperator::Between, vec![n(1), s("a")]).is_err());
        assert!(Condition::new(ComparisonOperator::Between, vec![n(9), n(1)]).is_err());
        assert!(Condition::new(ComparisonOperator::Between, vec![n(1)]).is_err());
        assert!(Condition::new(ComparisonOperator::BeginsWith, vec![n(1)]).is_err());
        assert!(Condition::new(ComparisonOperator::Lt, vec![AttributeValue::Bool(true)]).is_err());
        assert!(Condition::new(ComparisonOperator::Null, vec![s("a")]).is_err());
        assert!(Condition::new(ComparisonOperator::In, vec![]).is_err());
        assert!(Condition::new(ComparisonOperator::Eq, vec![AttributeValue::string_set(["a"])]).is_ok());
    }

    #[test]
    fn test_begins_with_and_contains() {
        let prefix = Condition::new(ComparisonOperator::BeginsWith, vec![s("Mes")]).unwrap();
        assert!(prefix.matches(Some(&s("Message"))));
        assert!(!prefix.matches(Some(&s("message"))));

        let contains = Condition::new(ComparisonOperator::Contains, vec![s("b")]).unwrap();
        assert!(contains.matches(Some(&s("abc"))));
        assert!(contains.matches(Some(&AttributeValue::string_set(["a", "b"]))));
        assert!(contains.matches(Some(&AttributeValue::L(vec![s("b")]))));
        assert!(!contains.matches(Some(&n(1))));
    }

    #[test]
    fn test_ordering_numbers_exactly() {
        let gt = Condition::new(ComparisonOperator::Gt, vec![n(9)]).unwrap();
        assert!(gt.matches(Some(&n(10))));
        assert!(!gt.matches(Some(&s("10"))));
    }

    #[test]
    fn test_condition_set_and_or() {
        let mut item = Item::new();
        item.insert("a".to_string(), s("x"));

        let conditions = vec![
            ("a".to_string(), Condition::eq(s("x"))),
            ("b".to_string(), Condition::not_null()),
        ];
        assert!(!ConditionSet::all(conditions.clone()).matches(&item));
        assert!(ConditionSet::new(conditions, ConditionalOperator::Or).matches(&item));
        assert!(ConditionSet::default().matches(&item));
    }

    #[test]
    fn test_key_condition_from_conditions() {
        let key = KeyCondition::from_conditions(
            vec![
                ("sk".to_string(), Condition::new(ComparisonOperator::Gt, vec![n(1)]).unwrap()),
                ("pk".to_string(), Condition::eq(s("p"))),
            ],
            "pk",
            Some("sk"),
        )
        .unwrap();
        assert_eq!(key.partition, s("p"));
        assert_eq!(key.sort.unwrap().operator(), ComparisonOperator::Gt);

        assert!(KeyCondition::from_conditions(vec![], "pk", None).is_err());
        assert!(KeyCondition::from_conditions(
            vec![("pk".to_string(), Condition::not_null())],
            "pk",
            None
        )
        .is_err());
    }
}
