//! Expression parser and evaluator tests

use crate::expression::*;
use crate::filter::ComparisonOperator;
use crate::value::{AttributeValue, Item};
use std::collections::HashMap;

fn values(pairs: &[(&str, AttributeValue)]) -> HashMap<String, AttributeValue> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

fn names(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

fn item(pairs: &[(&str, AttributeValue)]) -> Item {
    values(pairs)
}

fn s(v: &str) -> AttributeValue {
    AttributeValue::string(v)
}

fn n(v: i64) -> AttributeValue {
    AttributeValue::number(v)
}

fn update(expression: &str, vals: &HashMap<String, AttributeValue>) -> Vec<UpdateInstruction> {
    parse_update_expression(expression, ExpressionContext::new(None, Some(vals))).unwrap()
}

fn condition(expression: &str, vals: &HashMap<String, AttributeValue>) -> ConditionExpression {
    parse_condition_expression(
        expression,
        "ConditionExpression",
        ExpressionContext::new(None, Some(vals)),
    )
    .unwrap()
}

mod update_expression_parsing {
    use super::*;

    #[test]
    fn test_simple_set() {
        let vals = values(&[(":v", s("Sam"))]);
        assert_eq!(
            update("SET username = :v", &vals),
            vec![UpdateInstruction::Set {
                attribute: "username".to_string(),
                value: UpdateOperand::Value(s("Sam")),
            }]
        );
    }

    #[test]
    fn test_clauses_in_source_order() {
        let vals = values(&[(":v", s("x")), (":n", n(1)), (":set", AttributeValue::string_set(["a"]))]);
        let instructions = update("REMOVE old SET a = :v, b = :v ADD counter :n DELETE tags :set", &vals);
        let attributes: Vec<_> = instructions.iter().map(UpdateInstruction::attribute).collect();
        assert_eq!(attributes, vec!["old", "a", "b", "counter", "tags"]);
        assert!(matches!(instructions[3], UpdateInstruction::Add { .. }));
        assert!(matches!(instructions[4], UpdateInstruction::Delete { .. }));
    }

    #[test]
    fn test_keywords_case_insensitive() {
        let vals = values(&[(":v", n(1))]);
        let instructions = update("set a = :v remove b", &vals);
        assert_eq!(instructions.len(), 2);
        assert!(matches!(instructions[1], UpdateInstruction::Remove { .. }));
    }

    #[test]
    fn test_name_placeholder() {
        let vals = values(&[(":v", n(1))]);
        let names = names(&[("#s", "status")]);
        let instructions = parse_update_expression(
            "SET #s = :v",
            ExpressionContext::new(Some(&names), Some(&vals)),
        )
        .unwrap();
        assert_eq!(instructions[0].attribute(), "status");
    }

    #[test]
    fn test_literals_in_set() {
        let instructions = update("SET a = 42, b = 'text'", &HashMap::new());
        assert_eq!(
            instructions,
            vec![
                UpdateInstruction::Set {
                    attribute: "a".to_string(),
                    value: UpdateOperand::Value(n(42)),
                },
                UpdateInstruction::Set {
                    attribute: "b".to_string(),
                    value: UpdateOperand::Value(s("text")),
                },
            ]
        );
    }

    #[test]
    fn test_functions_and_arithmetic() {
        let vals = values(&[(":zero", n(0)), (":one", n(1)), (":tail", AttributeValue::L(vec![]))]);
        let instructions = update(
            "SET visits = if_not_exists(visits, :zero), items = list_append(items, :tail), total = total - :one",
            &vals,
        );
        assert_eq!(
            instructions[0],
            UpdateInstruction::Set {
                attribute: "visits".to_string(),
                value: UpdateOperand::IfNotExists(
                    "visits".to_string(),
                    Box::new(UpdateOperand::Value(n(0)))
                ),
            }
        );
        assert!(matches!(
            &instructions[1],
            UpdateInstruction::Set { value: UpdateOperand::ListAppend(..), .. }
        ));
        assert!(matches!(
            &instructions[2],
            UpdateInstruction::Set { value: UpdateOperand::Minus(..), .. }
        ));
    }

    #[test]
    fn test_remove_value_placeholder_is_rejected() {
        let vals = values(&[(":x", s("a"))]);
        let err = parse_update_expression("REMOVE :x", ExpressionContext::new(None, Some(&vals)))
            .unwrap_err();
        assert!(matches!(err, ExpressionError::Invalid { .. }));
        assert!(err.to_string().contains(":x"));
    }

    #[test]
    fn test_nested_path_is_rejected() {
        let vals = values(&[(":v", n(1))]);
        let err = parse_update_expression("SET a.b = :v", ExpressionContext::new(None, Some(&vals)))
            .unwrap_err();
        assert!(matches!(err, ExpressionError::NestedPath { .. }));

        let err = parse_update_expression("REMOVE list[0]", ExpressionContext::default()).unwrap_err();
        assert!(matches!(err, ExpressionError::NestedPath { .. }));
    }

    #[test]
    fn test_duplicate_clause() {
        let vals = values(&[(":v", n(1))]);
        let err = parse_update_expression(
            "SET a = :v SET b = :v",
            ExpressionContext::new(None, Some(&vals)),
        )
        .unwrap_err();
        assert!(matches!(err, ExpressionError::Invalid { .. }));
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            parse_update_expression("   ", ExpressionContext::default()),
            Err(ExpressionError::Empty { .. })
        ));
        assert!(matches!(
            parse_update_expression("SET a = :missing", ExpressionContext::default()),
            Err(ExpressionError::MissingAttributeValue(_))
        ));
        assert!(matches!(
            parse_update_expression("SET #a = 1", ExpressionContext::default()),
            Err(ExpressionError::MissingAttributeName(_))
        ));
        assert!(matches!(
            parse_update_expression("UPSERT a", ExpressionContext::default()),
            Err(ExpressionError::Syntax { .. })
        ));
        assert!(matches!(
            parse_update_expression("SET a = frobnicate(b)", ExpressionContext::default()),
            Err(ExpressionError::Invalid { .. })
        ));
    }
}

mod update_application {
    use super::*;

    #[test]
    fn test_set_reads_pre_update_snapshot() {
        let original = item(&[("a", n(1)), ("b", n(2))]);
        let instructions = update("SET a = b, b = a", &HashMap::new());
        let updated = apply_update(&original, &instructions).unwrap();
        assert_eq!(updated["a"], n(2));
        assert_eq!(updated["b"], n(1));
    }

    #[test]
    fn test_last_write_wins() {
        let vals = values(&[(":one", n(1)), (":two", n(2))]);
        let instructions = update("SET a = :one, a = :two", &vals);
        let updated = apply_update(&Item::new(), &instructions).unwrap();
        assert_eq!(updated["a"], n(2));
    }

    #[test]
    fn test_remove_then_set_in_order() {
        let vals = values(&[(":v", s("new"))]);
        let original = item(&[("a", s("old")), ("b", s("keep"))]);
        let updated = apply_update(&original, &update("SET a = :v REMOVE b", &vals)).unwrap();
        assert_eq!(updated, item(&[("a", s("new"))]));

        let updated = apply_update(&original, &update("REMOVE a SET a = :v", &vals)).unwrap();
        assert_eq!(updated["a"], s("new"));
    }

    #[test]
    fn test_if_not_exists() {
        let vals = values(&[(":zero", n(0))]);
        let instructions = update("SET visits = if_not_exists(visits, :zero)", &vals);

        let fresh = apply_update(&Item::new(), &instructions).unwrap();
        assert_eq!(fresh["visits"], n(0));

        let existing = apply_update(&item(&[("visits", n(7))]), &instructions).unwrap();
        assert_eq!(existing["visits"], n(7));
    }

    #[test]
    fn test_arithmetic() {
        let vals = values(&[(":step", AttributeValue::parse_number("0.5").unwrap())]);
        let original = item(&[("score", n(10))]);

        let plus = apply_update(&original, &update("SET score = score + :step", &vals)).unwrap();
        assert_eq!(plus["score"], AttributeValue::parse_number("10.5").unwrap());

        let minus = apply_update(&original, &update("SET score = score - :step", &vals)).unwrap();
        assert_eq!(minus["score"], AttributeValue::parse_number("9.5").unwrap());
    }

    #[test]
    fn test_arithmetic_errors() {
        let vals = values(&[(":one", n(1))]);
        let instructions = update("SET score = score + :one", &vals);

        assert!(matches!(
            apply_update(&Item::new(), &instructions),
            Err(ExpressionError::MissingOperand(_))
        ));
        assert!(matches!(
            apply_update(&item(&[("score", s("ten"))]), &instructions),
            Err(ExpressionError::TypeMismatch("+"))
        ));
    }

    #[test]
    fn test_list_append() {
        let vals = values(&[(":more", AttributeValue::L(vec![n(3)]))]);
        let original = item(&[("items", AttributeValue::L(vec![n(1), n(2)]))]);
        let updated =
            apply_update(&original, &update("SET items = list_append(items, :more)", &vals)).unwrap();
        assert_eq!(updated["items"], AttributeValue::L(vec![n(1), n(2), n(3)]));
    }

    #[test]
    fn test_add_number_and_set() {
        let vals = values(&[
            (":n", n(5)),
            (":tags", AttributeValue::string_set(["b", "c"])),
        ]);
        let original = item(&[("count", n(1)), ("tags", AttributeValue::string_set(["a", "b"]))]);
        let updated = apply_update(&original, &update("ADD count :n, tags :tags", &vals)).unwrap();
        assert_eq!(updated["count"], n(6));
        assert_eq!(updated["tags"], AttributeValue::string_set(["a", "b", "c"]));

        let created = apply_update(&Item::new(), &update("ADD count :n", &vals)).unwrap();
        assert_eq!(created["count"], n(5));
    }

    #[test]
    fn test_add_type_mismatch() {
        let vals = values(&[(":n", n(5))]);
        let original = item(&[("tags", AttributeValue::string_set(["a"]))]);
        assert!(matches!(
            apply_update(&original, &update("ADD tags :n", &vals)),
            Err(ExpressionError::TypeMismatch("ADD"))
        ));
    }

    #[test]
    fn test_delete_from_set() {
        let vals = values(&[
            (":some", AttributeValue::number_set([1i64])),
            (":rest", AttributeValue::number_set([2i64, 3])),
        ]);
        let original = item(&[("ids", AttributeValue::number_set([1i64, 2, 3]))]);

        let updated = apply_update(&original, &update("DELETE ids :some", &vals)).unwrap();
        assert_eq!(updated["ids"], AttributeValue::number_set([2i64, 3]));

        let emptied = apply_update(&updated, &update("DELETE ids :rest", &vals)).unwrap();
        assert!(!emptied.contains_key("ids"));

        let untouched = apply_update(&Item::new(), &update("DELETE ids :some", &vals)).unwrap();
        assert!(untouched.is_empty());
    }
}

mod condition_evaluation {
    use super::*;

    fn message() -> Item {
        item(&[
            ("SentBy", s("User A")),
            ("Body", s("http://url_to_lolcat.gif")),
            ("Views", n(12)),
            ("Tags", AttributeValue::string_set(["cats", "web"])),
        ])
    }

    fn check(expression: &str, vals: &[(&str, AttributeValue)]) -> bool {
        condition(expression, &values(vals)).evaluate(&message())
    }

    #[test]
    fn test_comparisons() {
        assert!(check("SentBy = :v", &[(":v", s("User A"))]));
        assert!(!check("SentBy = :v", &[(":v", s("User B"))]));
        assert!(check("SentBy <> :v", &[(":v", s("User B"))]));
        assert!(check("Views > :v", &[(":v", n(10))]));
        assert!(check("Views <= :v", &[(":v", n(12))]));
        assert!(!check("Views < :v", &[(":v", s("12"))]));
    }

    #[test]
    fn test_missing_attribute_fails_comparison() {
        assert!(!check("Missing = :v", &[(":v", s("x"))]));
        assert!(!check("Missing <> :v", &[(":v", s("x"))]));
    }

    #[test]
    fn test_functions() {
        assert!(check("attribute_exists(SentBy)", &[]));
        assert!(check("attribute_not_exists(Missing)", &[]));
        assert!(check("begins_with(Body, :p)", &[(":p", s("http"))]));
        assert!(check("contains(Tags, :t)", &[(":t", s("cats"))]));
        assert!(check("contains(Body, :t)", &[(":t", s("lolcat"))]));
        assert!(check("attribute_type(Tags, :t)", &[(":t", s("SS"))]));
        assert!(check("size(Tags) = :two", &[(":two", n(2))]));
    }

    #[test]
    fn test_between_and_in() {
        assert!(check("Views BETWEEN :lo AND :hi", &[(":lo", n(10)), (":hi", n(20))]));
        assert!(!check("Views BETWEEN :lo AND :hi", &[(":lo", n(13)), (":hi", n(20))]));
        assert!(check(
            "SentBy IN (:a, :b)",
            &[(":a", s("User B")), (":b", s("User A"))]
        ));
    }

    #[test]
    fn test_logical_operators() {
        let vals = [(":a", s("User A")), (":n", n(100))];
        assert!(check("SentBy = :a AND NOT Views > :n", &vals));
        assert!(check("Views > :n OR SentBy = :a", &vals));
        assert!(!check("NOT (Views > :n OR SentBy = :a)", &vals));
        assert!(check("sentby = :a or attribute_exists(Views)", &vals));
    }

    #[test]
    fn test_errors() {
        let ctx = ExpressionContext::default();
        assert!(matches!(
            parse_condition_expression("", "FilterExpression", ctx),
            Err(ExpressionError::Empty { kind: "FilterExpression" })
        ));
        assert!(matches!(
            parse_condition_expression("a = ", "FilterExpression", ctx),
            Err(ExpressionError::Syntax { .. })
        ));
        assert!(matches!(
            parse_condition_expression("a = b extra", "FilterExpression", ctx),
            Err(ExpressionError::Syntax { .. })
        ));
        assert!(matches!(
            parse_condition_expression("a.b = c", "FilterExpression", ctx),
            Err(ExpressionError::NestedPath { .. })
        ));
        assert!(matches!(
            parse_condition_expression("is_cool(a)", "FilterExpression", ctx),
            Err(ExpressionError::Invalid { .. })
        ));
    }
}

mod key_condition_parsing {
    use super::*;

    fn key(expression: &str, vals: &[(&str, AttributeValue)]) -> crate::filter::KeyCondition {
        parse_key_condition_expression(
            expression,
            ExpressionContext::new(None, Some(&values(vals))),
            "pk",
            Some("sk"),
        )
        .unwrap()
    }

    #[test]
    fn test_partition_only() {
        let condition = key("pk = :pk", &[(":pk", s("a"))]);
        assert_eq!(condition.partition, s("a"));
        assert!(condition.sort.is_none());
    }

    #[test]
    fn test_sort_conditions() {
        let condition = key("pk = :pk AND sk >= :min", &[(":pk", s("a")), (":min", n(3))]);
        let sort = condition.sort.unwrap();
        assert_eq!(sort.operator(), ComparisonOperator::Ge);
        assert_eq!(sort.values(), &[n(3)]);

        let condition = key(
            "sk BETWEEN :lo AND :hi AND pk = :pk",
            &[(":pk", s("a")), (":lo", n(1)), (":hi", n(5))],
        );
        assert_eq!(condition.sort.unwrap().operator(), ComparisonOperator::Between);

        let condition = key("pk = :pk AND begins_with(sk, :p)", &[(":pk", s("a")), (":p", s("2024"))]);
        assert_eq!(condition.sort.unwrap().operator(), ComparisonOperator::BeginsWith);
    }

    #[test]
    fn test_name_placeholders() {
        let vals = values(&[(":pk", s("a"))]);
        let names = names(&[("#p", "pk")]);
        let condition = parse_key_condition_expression(
            "#p = :pk",
            ExpressionContext::new(Some(&names), Some(&vals)),
            "pk",
            None,
        )
        .unwrap();
        assert_eq!(condition.partition, s("a"));
    }

    #[test]
    fn test_unsupported_key_conditions() {
        let vals = values(&[(":v", s("a"))]);
        let ctx = ExpressionContext::new(None, Some(&vals));
        for expression in [
            "sk = :v",
            "pk <> :v",
            "pk = :v AND other = :v",
            "pk = :v OR sk = :v",
            "pk = :v AND contains(sk, :v)",
        ] {
            assert!(
                parse_key_condition_expression(expression, ctx, "pk", Some("sk")).is_err(),
                "{expression} should be rejected"
            );
        }
    }
}
