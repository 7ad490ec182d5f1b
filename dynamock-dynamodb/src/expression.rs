//! DynamoDB expression parser and evaluator
//!
//! Supports:
//! - UpdateExpression (compiled into a list of [`UpdateInstruction`]s)
//! - ConditionExpression / FilterExpression
//! - KeyConditionExpression (for Query)
//!
//! Placeholders (`#name`, `:value`) are resolved while parsing, so the parsed
//! forms carry plain attribute names and values. Only top-level attributes
//! are addressable.

use std::borrow::Cow;
use std::collections::HashMap;

use thiserror::Error;

use crate::filter::{self, ComparisonOperator, Condition, KeyCondition};
use crate::storage::DynamoDBError;
use crate::value::{AttributeValue, Item, NumberError};

#[derive(Debug, Error)]
pub enum ExpressionError {
    #[error("Invalid {kind}: Syntax error; token: \"{token}\"")]
    Syntax { kind: &'static str, token: String },

    #[error("Invalid {kind}: The expression can not be empty;")]
    Empty { kind: &'static str },

    #[error("Invalid {kind}: Nested document paths are not supported; token: \"{token}\"")]
    NestedPath { kind: &'static str, token: String },

    #[error("Invalid {kind}: {message}")]
    Invalid { kind: &'static str, message: String },

    #[error("An expression attribute name used in the document path is not defined; attribute name: {0}")]
    MissingAttributeName(String),

    #[error("An expression attribute value used in expression is not defined; attribute value: {0}")]
    MissingAttributeValue(String),

    #[error("The provided expression refers to an attribute that does not exist in the item; attribute: {0}")]
    MissingOperand(String),

    #[error("An operand in the update expression has an incorrect data type; operator or function: {0}")]
    TypeMismatch(&'static str),

    #[error(transparent)]
    Number(#[from] NumberError),
}

/// `ExpressionAttributeNames` and `ExpressionAttributeValues` of a request
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpressionContext<'a> {
    names: Option<&'a HashMap<String, String>>,
    values: Option<&'a HashMap<String, AttributeValue>>,
}

impl<'a> ExpressionContext<'a> {
    pub fn new(
        names: Option<&'a HashMap<String, String>>,
        values: Option<&'a HashMap<String, AttributeValue>>,
    ) -> Self {
        Self { names, values }
    }

    fn name(&self, placeholder: &str) -> Result<String, ExpressionError> {
        self.names
            .and_then(|names| names.get(placeholder))
            .cloned()
            .ok_or_else(|| ExpressionError::MissingAttributeName(placeholder.to_string()))
    }

    fn value(&self, placeholder: &str) -> Result<AttributeValue, ExpressionError> {
        self.values
            .and_then(|values| values.get(placeholder))
            .cloned()
            .ok_or_else(|| ExpressionError::MissingAttributeValue(placeholder.to_string()))
    }
}

// === Tokenizer ===

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Word,
    NamePlaceholder,
    ValuePlaceholder,
    Number,
    Str(String),
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Plus,
    Minus,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone)]
struct Token<'a> {
    kind: TokenKind,
    text: &'a str,
}

fn word_end(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_') {
        pos += 1;
    }
    pos
}

fn tokenize<'a>(input: &'a str, kind: &'static str) -> Result<Vec<Token<'a>>, ExpressionError> {
    let syntax = |token: &str| ExpressionError::Syntax {
        kind,
        token: token.to_string(),
    };
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];
        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        let start = pos;
        let next = bytes.get(pos + 1).copied();
        let token_kind = match c {
            b',' | b'(' | b')' | b'[' | b']' | b'.' | b'+' | b'-' | b'=' => {
                pos += 1;
                match c {
                    b',' => TokenKind::Comma,
                    b'(' => TokenKind::LParen,
                    b')' => TokenKind::RParen,
                    b'[' => TokenKind::LBracket,
                    b']' => TokenKind::RBracket,
                    b'.' => TokenKind::Dot,
                    b'+' => TokenKind::Plus,
                    b'-' => TokenKind::Minus,
                    _ => TokenKind::Eq,
                }
            }
            b'<' => match next {
                Some(b'=') => {
                    pos += 2;
                    TokenKind::Le
                }
                Some(b'>') => {
                    pos += 2;
                    TokenKind::Ne
                }
                _ => {
                    pos += 1;
                    TokenKind::Lt
                }
            },
            b'>' => {
                if next == Some(b'=') {
                    pos += 2;
                    TokenKind::Ge
                } else {
                    pos += 1;
                    TokenKind::Gt
                }
            }
            b'#' | b':' => {
                pos = word_end(bytes, pos + 1);
                if pos == start + 1 {
                    return Err(syntax(&input[start..pos]));
                }
                if c == b'#' {
                    TokenKind::NamePlaceholder
                } else {
                    TokenKind::ValuePlaceholder
                }
            }
            b'0'..=b'9' => {
                while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                    pos += 1;
                }
                if bytes.get(pos) == Some(&b'.')
                    && bytes.get(pos + 1).is_some_and(u8::is_ascii_digit)
                {
                    pos += 1;
                    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                        pos += 1;
                    }
                }
                TokenKind::Number
            }
            b'\'' | b'"' => {
                let close = input[start + 1..]
                    .find(char::from(c))
                    .ok_or_else(|| syntax(&input[start..]))?;
                let end = start + 1 + close;
                pos = end + 1;
                TokenKind::Str(input[start + 1..end].to_string())
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                pos = word_end(bytes, pos);
                TokenKind::Word
            }
            _ => {
                let bad = input[start..].chars().next().map(String::from).unwrap_or_default();
                return Err(syntax(&bad));
            }
        };

        tokens.push(Token {
            kind: token_kind,
            text: &input[start..pos],
        });
    }

    Ok(tokens)
}

// === Parser ===

struct Parser<'a, 'c> {
    tokens: Vec<Token<'a>>,
    pos: usize,
    kind: &'static str,
    context: ExpressionContext<'c>,
}

impl<'a, 'c> Parser<'a, 'c> {
    fn new(
        input: &'a str,
        kind: &'static str,
        context: ExpressionContext<'c>,
    ) -> Result<Self, ExpressionError> {
        let tokens = tokenize(input, kind)?;
        if tokens.is_empty() {
            return Err(ExpressionError::Empty { kind });
        }
        Ok(Self {
            tokens,
            pos: 0,
            kind,
            context,
        })
    }

    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token<'a>> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<Token<'a>> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek_is(&self, kind: &TokenKind) -> bool {
        self.peek().is_some_and(|t| &t.kind == kind)
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        self.peek()
            .is_some_and(|t| t.kind == TokenKind::Word && t.text.eq_ignore_ascii_case(keyword))
    }

    fn syntax_error(&self, token: Option<&Token<'_>>) -> ExpressionError {
        ExpressionError::Syntax {
            kind: self.kind,
            token: token.map_or("<EOF>", |t| t.text).to_string(),
        }
    }

    fn invalid(&self, message: impl Into<String>) -> ExpressionError {
        ExpressionError::Invalid {
            kind: self.kind,
            message: message.into(),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), ExpressionError> {
        match self.advance() {
            Some(token) if token.kind == kind => Ok(()),
            other => Err(self.syntax_error(other.as_ref())),
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ExpressionError> {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.syntax_error(self.peek()))
        }
    }

    fn finish(&self) -> Result<(), ExpressionError> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.syntax_error(self.peek()))
        }
    }

    /// Top-level attribute name or `#placeholder`
    fn attribute_name(&mut self) -> Result<String, ExpressionError> {
        let token = self.advance();
        let name = match &token {
            Some(t) if t.kind == TokenKind::Word => t.text.to_string(),
            Some(t) if t.kind == TokenKind::NamePlaceholder => self.context.name(t.text)?,
            other => return Err(self.syntax_error(other.as_ref())),
        };

        if self.peek_is(&TokenKind::Dot) || self.peek_is(&TokenKind::LBracket) {
            let path = self.peek().map_or("", |t| t.text);
            return Err(ExpressionError::NestedPath {
                kind: self.kind,
                token: format!("{}{}", token.map_or("", |t| t.text), path),
            });
        }
        Ok(name)
    }

    /// `:placeholder`, numeric literal or quoted string literal
    fn literal(&mut self) -> Result<Option<AttributeValue>, ExpressionError> {
        let value = match self.peek().map(|t| (&t.kind, t.text)) {
            Some((TokenKind::ValuePlaceholder, text)) => self.context.value(text)?,
            Some((TokenKind::Number, text)) => AttributeValue::parse_number(text)?,
            Some((TokenKind::Str(s), _)) => AttributeValue::S(s.clone()),
            _ => return Ok(None),
        };
        self.pos += 1;
        Ok(Some(value))
    }

    fn function_call_ahead(&self) -> bool {
        self.peek().is_some_and(|t| t.kind == TokenKind::Word)
            && self.peek_at(1).is_some_and(|t| t.kind == TokenKind::LParen)
    }
}

// === Update expressions ===

/// A single compiled update action
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateInstruction {
    Set {
        attribute: String,
        value: UpdateOperand,
    },
    Remove {
        attribute: String,
    },
    Add {
        attribute: String,
        value: AttributeValue,
    },
    Delete {
        attribute: String,
        value: AttributeValue,
    },
}

impl UpdateInstruction {
    pub fn attribute(&self) -> &str {
        match self {
            UpdateInstruction::Set { attribute, .. }
            | UpdateInstruction::Remove { attribute }
            | UpdateInstruction::Add { attribute, .. }
            | UpdateInstruction::Delete { attribute, .. } => attribute,
        }
    }
}

/// Right-hand side of a SET action
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOperand {
    Value(AttributeValue),
    Attribute(String),
    IfNotExists(String, Box<UpdateOperand>),
    ListAppend(Box<UpdateOperand>, Box<UpdateOperand>),
    Plus(Box<UpdateOperand>, Box<UpdateOperand>),
    Minus(Box<UpdateOperand>, Box<UpdateOperand>),
}

impl UpdateOperand {
    fn evaluate(&self, item: &Item) -> Result<AttributeValue, ExpressionError> {
        match self {
            UpdateOperand::Value(value) => Ok(value.clone()),
            UpdateOperand::Attribute(name) => item
                .get(name)
                .cloned()
                .ok_or_else(|| ExpressionError::MissingOperand(name.clone())),
            UpdateOperand::IfNotExists(name, default) => match item.get(name) {
                Some(value) => Ok(value.clone()),
                None => default.evaluate(item),
            },
            UpdateOperand::ListAppend(left, right) => {
                match (left.evaluate(item)?, right.evaluate(item)?) {
                    (AttributeValue::L(mut list), AttributeValue::L(tail)) => {
                        list.extend(tail);
                        Ok(AttributeValue::L(list))
                    }
                    _ => Err(ExpressionError::TypeMismatch("list_append")),
                }
            }
            UpdateOperand::Plus(left, right) => {
                match (left.evaluate(item)?, right.evaluate(item)?) {
                    (AttributeValue::N(a), AttributeValue::N(b)) => {
                        Ok(AttributeValue::N(a.checked_add(b)?))
                    }
                    _ => Err(ExpressionError::TypeMismatch("+")),
                }
            }
            UpdateOperand::Minus(left, right) => {
                match (left.evaluate(item)?, right.evaluate(item)?) {
                    (AttributeValue::N(a), AttributeValue::N(b)) => {
                        Ok(AttributeValue::N(a.checked_sub(b)?))
                    }
                    _ => Err(ExpressionError::TypeMismatch("-")),
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Clause {
    Set,
    Remove,
    Add,
    Delete,
}

impl Clause {
    fn from_keyword(word: &str) -> Option<Self> {
        match word.to_ascii_uppercase().as_str() {
            "SET" => Some(Clause::Set),
            "REMOVE" => Some(Clause::Remove),
            "ADD" => Some(Clause::Add),
            "DELETE" => Some(Clause::Delete),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Clause::Set => "SET",
            Clause::Remove => "REMOVE",
            Clause::Add => "ADD",
            Clause::Delete => "DELETE",
        }
    }
}

/// Parse an UpdateExpression into instructions, in source order
pub fn parse_update_expression(
    expression: &str,
    context: ExpressionContext<'_>,
) -> Result<Vec<UpdateInstruction>, ExpressionError> {
    let mut parser = Parser::new(expression, "UpdateExpression", context)?;
    let mut instructions = Vec::new();
    let mut seen = Vec::new();

    while let Some(token) = parser.advance() {
        let clause = match token.kind {
            TokenKind::Word => Clause::from_keyword(token.text),
            _ => None,
        }
        .ok_or_else(|| parser.syntax_error(Some(&token)))?;

        if seen.contains(&clause) {
            return Err(parser.invalid(format!(
                "The \"{}\" section can only be used once in an update expression;",
                clause.as_str()
            )));
        }
        seen.push(clause);

        loop {
            instructions.push(parser.update_action(clause)?);
            if parser.peek_is(&TokenKind::Comma) {
                parser.pos += 1;
            } else {
                break;
            }
        }
    }

    Ok(instructions)
}

impl Parser<'_, '_> {
    fn update_action(&mut self, clause: Clause) -> Result<UpdateInstruction, ExpressionError> {
        match clause {
            Clause::Set => {
                let attribute = self.attribute_name()?;
                self.expect(TokenKind::Eq)?;
                let value = self.update_operand()?;
                Ok(UpdateInstruction::Set { attribute, value })
            }
            Clause::Remove => {
                if let Some(token) = self.peek().filter(|t| t.kind != TokenKind::Word) {
                    if token.kind != TokenKind::NamePlaceholder {
                        return Err(self.invalid(format!(
                            "REMOVE operands must be attribute names; token: \"{}\"",
                            token.text
                        )));
                    }
                }
                let attribute = self.attribute_name()?;
                Ok(UpdateInstruction::Remove { attribute })
            }
            Clause::Add | Clause::Delete => {
                let attribute = self.attribute_name()?;
                let value = self
                    .literal()?
                    .ok_or_else(|| self.syntax_error(self.peek()))?;
                Ok(if clause == Clause::Add {
                    UpdateInstruction::Add { attribute, value }
                } else {
                    UpdateInstruction::Delete { attribute, value }
                })
            }
        }
    }

    fn update_operand(&mut self) -> Result<UpdateOperand, ExpressionError> {
        let left = self.update_term()?;
        if self.peek_is(&TokenKind::Plus) {
            self.pos += 1;
            let right = self.update_term()?;
            return Ok(UpdateOperand::Plus(Box::new(left), Box::new(right)));
        }
        if self.peek_is(&TokenKind::Minus) {
            self.pos += 1;
            let right = self.update_term()?;
            return Ok(UpdateOperand::Minus(Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn update_term(&mut self) -> Result<UpdateOperand, ExpressionError> {
        if let Some(value) = self.literal()? {
            return Ok(UpdateOperand::Value(value));
        }

        if self.function_call_ahead() {
            let name = self.advance().map(|t| t.text).unwrap_or_default();
            self.expect(TokenKind::LParen)?;
            let operand = match name {
                "if_not_exists" => {
                    let attribute = self.attribute_name()?;
                    self.expect(TokenKind::Comma)?;
                    let default = self.update_operand()?;
                    UpdateOperand::IfNotExists(attribute, Box::new(default))
                }
                "list_append" => {
                    let left = self.update_operand()?;
                    self.expect(TokenKind::Comma)?;
                    let right = self.update_operand()?;
                    UpdateOperand::ListAppend(Box::new(left), Box::new(right))
                }
                other => {
                    return Err(self.invalid(format!(
                        "Invalid function name; function: {other}"
                    )))
                }
            };
            self.expect(TokenKind::RParen)?;
            return Ok(operand);
        }

        Ok(UpdateOperand::Attribute(self.attribute_name()?))
    }
}

/// Apply instructions left to right
///
/// SET operands read the document as it was before the update, so
/// `SET a = b, b = a` swaps. Later writes to the same attribute win.
pub fn apply_update(
    original: &Item,
    instructions: &[UpdateInstruction],
) -> Result<Item, ExpressionError> {
    let mut item = original.clone();

    for instruction in instructions {
        match instruction {
            UpdateInstruction::Set { attribute, value } => {
                let value = value.evaluate(original)?;
                item.insert(attribute.clone(), value);
            }
            UpdateInstruction::Remove { attribute } => {
                item.remove(attribute);
            }
            UpdateInstruction::Add { attribute, value } => {
                let merged = add_values(item.remove(attribute), value)?;
                item.insert(attribute.clone(), merged);
            }
            UpdateInstruction::Delete { attribute, value } => {
                if let Some(current) = item.remove(attribute) {
                    if let Some(remaining) = delete_from_set(current, value)? {
                        item.insert(attribute.clone(), remaining);
                    }
                }
            }
        }
    }

    Ok(item)
}

fn add_values(
    current: Option<AttributeValue>,
    value: &AttributeValue,
) -> Result<AttributeValue, ExpressionError> {
    match (current, value) {
        (
            None,
            AttributeValue::N(_)
            | AttributeValue::Ss(_)
            | AttributeValue::Ns(_)
            | AttributeValue::Bs(_),
        ) => Ok(value.clone()),
        (Some(AttributeValue::N(a)), AttributeValue::N(b)) => Ok(AttributeValue::N(a.checked_add(*b)?)),
        (Some(AttributeValue::Ss(mut a)), AttributeValue::Ss(b)) => {
            a.extend(b.iter().cloned());
            Ok(AttributeValue::Ss(a))
        }
        (Some(AttributeValue::Ns(mut a)), AttributeValue::Ns(b)) => {
            a.extend(b.iter().copied());
            Ok(AttributeValue::Ns(a))
        }
        (Some(AttributeValue::Bs(mut a)), AttributeValue::Bs(b)) => {
            a.extend(b.iter().cloned());
            Ok(AttributeValue::Bs(a))
        }
        _ => Err(ExpressionError::TypeMismatch("ADD")),
    }
}

/// Remove set members; `None` when the set ends up empty
fn delete_from_set(
    current: AttributeValue,
    value: &AttributeValue,
) -> Result<Option<AttributeValue>, ExpressionError> {
    let remaining = match (current, value) {
        (AttributeValue::Ss(mut a), AttributeValue::Ss(b)) => {
            a.retain(|member| !b.contains(member));
            (!a.is_empty()).then_some(AttributeValue::Ss(a))
        }
        (AttributeValue::Ns(mut a), AttributeValue::Ns(b)) => {
            a.retain(|member| !b.contains(member));
            (!a.is_empty()).then_some(AttributeValue::Ns(a))
        }
        (AttributeValue::Bs(mut a), AttributeValue::Bs(b)) => {
            a.retain(|member| !b.contains(member));
            (!a.is_empty()).then_some(AttributeValue::Bs(a))
        }
        _ => return Err(ExpressionError::TypeMismatch("DELETE")),
    };
    Ok(remaining)
}

// === Condition expressions ===

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparator {
    fn from_token(kind: &TokenKind) -> Option<Self> {
        match kind {
            TokenKind::Eq => Some(Comparator::Eq),
            TokenKind::Ne => Some(Comparator::Ne),
            TokenKind::Lt => Some(Comparator::Lt),
            TokenKind::Le => Some(Comparator::Le),
            TokenKind::Gt => Some(Comparator::Gt),
            TokenKind::Ge => Some(Comparator::Ge),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Attribute(String),
    Value(AttributeValue),
    Size(String),
}

impl Operand {
    fn resolve<'v>(&'v self, item: &'v Item) -> Option<Cow<'v, AttributeValue>> {
        match self {
            Operand::Attribute(name) => item.get(name).map(Cow::Borrowed),
            Operand::Value(value) => Some(Cow::Borrowed(value)),
            Operand::Size(name) => {
                let size = match item.get(name)? {
                    AttributeValue::S(s) => s.len(),
                    AttributeValue::B(b) => b.len(),
                    AttributeValue::Ss(set) => set.len(),
                    AttributeValue::Ns(set) => set.len(),
                    AttributeValue::Bs(set) => set.len(),
                    AttributeValue::L(list) => list.len(),
                    AttributeValue::M(map) => map.len(),
                    _ => return None,
                };
                let size = i64::try_from(size).ok()?;
                Some(Cow::Owned(AttributeValue::number(size)))
            }
        }
    }
}

/// Parsed condition / filter expression
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionExpression {
    Compare {
        left: Operand,
        comparator: Comparator,
        right: Operand,
    },
    Between {
        operand: Operand,
        low: Operand,
        high: Operand,
    },
    In {
        operand: Operand,
        candidates: Vec<Operand>,
    },
    AttributeExists(String),
    AttributeNotExists(String),
    AttributeType(String, Operand),
    BeginsWith(Operand, Operand),
    Contains(Operand, Operand),
    And(Box<ConditionExpression>, Box<ConditionExpression>),
    Or(Box<ConditionExpression>, Box<ConditionExpression>),
    Not(Box<ConditionExpression>),
}

impl ConditionExpression {
    /// Evaluate against an item; missing attributes fail every comparison
    pub fn evaluate(&self, item: &Item) -> bool {
        match self {
            ConditionExpression::Compare {
                left,
                comparator,
                right,
            } => {
                let (Some(left), Some(right)) = (left.resolve(item), right.resolve(item)) else {
                    return false;
                };
                match comparator {
                    Comparator::Eq => left == right,
                    Comparator::Ne => left != right,
                    Comparator::Lt => left.compare(&right).is_some_and(|o| o.is_lt()),
                    Comparator::Le => left.compare(&right).is_some_and(|o| o.is_le()),
                    Comparator::Gt => left.compare(&right).is_some_and(|o| o.is_gt()),
                    Comparator::Ge => left.compare(&right).is_some_and(|o| o.is_ge()),
                }
            }
            ConditionExpression::Between { operand, low, high } => {
                let (Some(value), Some(low), Some(high)) =
                    (operand.resolve(item), low.resolve(item), high.resolve(item))
                else {
                    return false;
                };
                value.compare(&low).is_some_and(|o| o.is_ge())
                    && value.compare(&high).is_some_and(|o| o.is_le())
            }
            ConditionExpression::In {
                operand,
                candidates,
            } => operand.resolve(item).is_some_and(|value| {
                candidates
                    .iter()
                    .filter_map(|candidate| candidate.resolve(item))
                    .any(|candidate| candidate == value)
            }),
            ConditionExpression::AttributeExists(name) => item.contains_key(name),
            ConditionExpression::AttributeNotExists(name) => !item.contains_key(name),
            ConditionExpression::AttributeType(name, expected) => {
                match (item.get(name), expected.resolve(item)) {
                    (Some(value), Some(expected)) => {
                        expected.as_string() == Some(value.type_name())
                    }
                    _ => false,
                }
            }
            ConditionExpression::BeginsWith(value, prefix) => {
                match (value.resolve(item), prefix.resolve(item)) {
                    (Some(value), Some(prefix)) => filter::begins_with(&value, &prefix),
                    _ => false,
                }
            }
            ConditionExpression::Contains(haystack, needle) => {
                match (haystack.resolve(item), needle.resolve(item)) {
                    (Some(haystack), Some(needle)) => filter::contains(&haystack, &needle),
                    _ => false,
                }
            }
            ConditionExpression::And(left, right) => left.evaluate(item) && right.evaluate(item),
            ConditionExpression::Or(left, right) => left.evaluate(item) || right.evaluate(item),
            ConditionExpression::Not(inner) => !inner.evaluate(item),
        }
    }
}

/// Parse a condition or filter expression
///
/// `kind` names the request parameter in error messages
/// (`ConditionExpression`, `FilterExpression`, ...).
pub fn parse_condition_expression(
    expression: &str,
    kind: &'static str,
    context: ExpressionContext<'_>,
) -> Result<ConditionExpression, ExpressionError> {
    let mut parser = Parser::new(expression, kind, context)?;
    let condition = parser.or_expression()?;
    parser.finish()?;
    Ok(condition)
}

impl Parser<'_, '_> {
    fn or_expression(&mut self) -> Result<ConditionExpression, ExpressionError> {
        let mut left = self.and_expression()?;
        while self.peek_keyword("OR") {
            self.pos += 1;
            let right = self.and_expression()?;
            left = ConditionExpression::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expression(&mut self) -> Result<ConditionExpression, ExpressionError> {
        let mut left = self.not_expression()?;
        while self.peek_keyword("AND") {
            self.pos += 1;
            let right = self.not_expression()?;
            left = ConditionExpression::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_expression(&mut self) -> Result<ConditionExpression, ExpressionError> {
        if self.peek_keyword("NOT") {
            self.pos += 1;
            let inner = self.not_expression()?;
            return Ok(ConditionExpression::Not(Box::new(inner)));
        }
        self.primary_condition()
    }

    fn primary_condition(&mut self) -> Result<ConditionExpression, ExpressionError> {
        if self.peek_is(&TokenKind::LParen) {
            self.pos += 1;
            let inner = self.or_expression()?;
            self.expect(TokenKind::RParen)?;
            return Ok(inner);
        }

        if self.function_call_ahead() && !self.peek_keyword("size") {
            return self.condition_function();
        }

        let operand = self.condition_operand()?;
        let token = self.advance();
        match token {
            Some(ref t) if Comparator::from_token(&t.kind).is_some() => {
                let comparator = Comparator::from_token(&t.kind)
                    .ok_or_else(|| self.syntax_error(Some(t)))?;
                let right = self.condition_operand()?;
                Ok(ConditionExpression::Compare {
                    left: operand,
                    comparator,
                    right,
                })
            }
            Some(ref t) if t.kind == TokenKind::Word && t.text.eq_ignore_ascii_case("BETWEEN") => {
                let low = self.condition_operand()?;
                self.expect_keyword("AND")?;
                let high = self.condition_operand()?;
                Ok(ConditionExpression::Between { operand, low, high })
            }
            Some(ref t) if t.kind == TokenKind::Word && t.text.eq_ignore_ascii_case("IN") => {
                self.expect(TokenKind::LParen)?;
                let mut candidates = vec![self.condition_operand()?];
                while self.peek_is(&TokenKind::Comma) {
                    self.pos += 1;
                    candidates.push(self.condition_operand()?);
                }
                self.expect(TokenKind::RParen)?;
                Ok(ConditionExpression::In {
                    operand,
                    candidates,
                })
            }
            other => Err(self.syntax_error(other.as_ref())),
        }
    }

    fn condition_function(&mut self) -> Result<ConditionExpression, ExpressionError> {
        let name = self.advance().map(|t| t.text).unwrap_or_default();
        self.expect(TokenKind::LParen)?;
        let condition = match name {
            "attribute_exists" => ConditionExpression::AttributeExists(self.attribute_name()?),
            "attribute_not_exists" => {
                ConditionExpression::AttributeNotExists(self.attribute_name()?)
            }
            "attribute_type" => {
                let attribute = self.attribute_name()?;
                self.expect(TokenKind::Comma)?;
                ConditionExpression::AttributeType(attribute, self.condition_operand()?)
            }
            "begins_with" | "contains" => {
                let left = self.condition_operand()?;
                self.expect(TokenKind::Comma)?;
                let right = self.condition_operand()?;
                if name == "contains" {
                    ConditionExpression::Contains(left, right)
                } else {
                    ConditionExpression::BeginsWith(left, right)
                }
            }
            other => {
                return Err(self.invalid(format!("Invalid function name; function: {other}")))
            }
        };
        self.expect(TokenKind::RParen)?;
        Ok(condition)
    }

    fn condition_operand(&mut self) -> Result<Operand, ExpressionError> {
        if let Some(value) = self.literal()? {
            return Ok(Operand::Value(value));
        }
        if self.function_call_ahead() && self.peek_keyword("size") {
            self.pos += 2;
            let attribute = self.attribute_name()?;
            self.expect(TokenKind::RParen)?;
            return Ok(Operand::Size(attribute));
        }
        Ok(Operand::Attribute(self.attribute_name()?))
    }
}

// === Key conditions ===

/// Parse a KeyConditionExpression: `pk = :v [AND <sort condition>]`
pub fn parse_key_condition_expression(
    expression: &str,
    context: ExpressionContext<'_>,
    partition_key: &str,
    sort_key: Option<&str>,
) -> Result<KeyCondition, DynamoDBError> {
    let parsed = parse_condition_expression(expression, "KeyConditionExpression", context)?;
    let parts = match parsed {
        ConditionExpression::And(left, right) => vec![*left, *right],
        other => vec![other],
    };

    let mut partition = None;
    let mut sort = None;
    for part in parts {
        let (name, condition) = key_part(part)?;
        if name == partition_key
            && partition.is_none()
            && condition.operator() == ComparisonOperator::Eq
        {
            partition = condition.values().first().cloned();
        } else if sort_key == Some(name.as_str()) && sort.is_none() {
            sort = Some(condition);
        } else {
            return Err(DynamoDBError::ValidationError(format!(
                "Query key condition not supported; attribute: {name}"
            )));
        }
    }

    let partition = partition.ok_or_else(|| {
        DynamoDBError::ValidationError(format!(
            "Query condition missed key schema element: {partition_key}"
        ))
    })?;
    Ok(KeyCondition { partition, sort })
}

fn key_part(part: ConditionExpression) -> Result<(String, Condition), DynamoDBError> {
    let unsupported = || {
        DynamoDBError::ValidationError(
            "Invalid KeyConditionExpression: only key comparisons, BETWEEN and begins_with are supported"
                .to_string(),
        )
    };

    match part {
        ConditionExpression::Compare {
            left: Operand::Attribute(name),
            comparator,
            right: Operand::Value(value),
        } => {
            let operator = match comparator {
                Comparator::Eq => ComparisonOperator::Eq,
                Comparator::Lt => ComparisonOperator::Lt,
                Comparator::Le => ComparisonOperator::Le,
                Comparator::Gt => ComparisonOperator::Gt,
                Comparator::Ge => ComparisonOperator::Ge,
                Comparator::Ne => return Err(unsupported()),
            };
            Ok((name, Condition::new(operator, vec![value])?))
        }
        ConditionExpression::Between {
            operand: Operand::Attribute(name),
            low: Operand::Value(low),
            high: Operand::Value(high),
        } => Ok((
            name,
            Condition::new(ComparisonOperator::Between, vec![low, high])?,
        )),
        ConditionExpression::BeginsWith(Operand::Attribute(name), Operand::Value(prefix)) => Ok((
            name,
            Condition::new(ComparisonOperator::BeginsWith, vec![prefix])?,
        )),
        _ => Err(unsupported()),
    }
}
