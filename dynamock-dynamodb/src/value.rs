//! Attribute values
//!
//! [`AttributeValue`] is the tagged union stored in every item. On the wire it
//! is a single-key JSON object such as `{"S": "hello"}` or `{"N": "42"}`.
//! Numbers are exact decimals ([`Number`]), never floating point, so `1.10`
//! and `1.1` are the same value and `10` sorts after `9`.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// An item: attribute name to value
pub type Item = HashMap<String, AttributeValue>;

/// Maximum number of significant digits in a number
const MAX_PRECISION: u32 = 38;
/// Largest decimal exponent of the leading digit (9.99..E+125)
const MAX_MAGNITUDE: i64 = 125;
/// Smallest decimal exponent of the leading digit (1E-130)
const MIN_MAGNITUDE: i64 = -130;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NumberError {
    #[error("The parameter cannot be converted to a numeric value: {0}")]
    Invalid(String),

    #[error("Attempting to store more than 38 significant digits in a Number")]
    Precision,

    #[error("Number overflow. Attempting to store a number with magnitude larger than supported range")]
    Overflow,

    #[error("Number underflow. Attempting to store a number with magnitude smaller than supported range")]
    Underflow,
}

/// Exact decimal number: `mantissa * 10^exponent`
///
/// Always normalized (no trailing zeros in the mantissa, zero is `0E0`), so the
/// derived equality and hash agree with numeric equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Number {
    mantissa: i128,
    exponent: i32,
}

impl Number {
    pub const ZERO: Number = Number {
        mantissa: 0,
        exponent: 0,
    };

    fn from_parts(mut mantissa: i128, exponent: i64) -> Result<Self, NumberError> {
        if mantissa == 0 {
            return Ok(Self::ZERO);
        }

        let mut exponent = exponent;
        while mantissa % 10 == 0 {
            mantissa /= 10;
            exponent = exponent.checked_add(1).ok_or(NumberError::Overflow)?;
        }

        let digits = digit_count(mantissa.unsigned_abs());
        if digits > MAX_PRECISION {
            return Err(NumberError::Precision);
        }

        let magnitude = exponent
            .checked_add(i64::from(digits) - 1)
            .ok_or(NumberError::Overflow)?;
        if magnitude > MAX_MAGNITUDE {
            return Err(NumberError::Overflow);
        }
        if magnitude < MIN_MAGNITUDE {
            return Err(NumberError::Underflow);
        }

        Ok(Self {
            mantissa,
            exponent: i32::try_from(exponent).map_err(|_| NumberError::Overflow)?,
        })
    }

    pub fn is_zero(&self) -> bool {
        self.mantissa == 0
    }

    /// Number of significant digits
    pub fn precision(&self) -> u32 {
        digit_count(self.mantissa.unsigned_abs())
    }

    pub fn checked_add(self, other: Number) -> Result<Number, NumberError> {
        let exponent = self.exponent.min(other.exponent);
        let left = rescale(self.mantissa, self.exponent - exponent)?;
        let right = rescale(other.mantissa, other.exponent - exponent)?;
        let sum = left.checked_add(right).ok_or(NumberError::Overflow)?;
        Self::from_parts(sum, i64::from(exponent))
    }

    pub fn checked_sub(self, other: Number) -> Result<Number, NumberError> {
        self.checked_add(Number {
            mantissa: -other.mantissa,
            exponent: other.exponent,
        })
    }

    fn cmp_magnitude(&self, other: &Number) -> Ordering {
        let (left, right) = (self.mantissa.unsigned_abs(), other.mantissa.unsigned_abs());
        let (left_digits, right_digits) = (digit_count(left), digit_count(right));
        let left_lead = i64::from(self.exponent) + i64::from(left_digits);
        let right_lead = i64::from(other.exponent) + i64::from(right_digits);

        left_lead.cmp(&right_lead).then_with(|| {
            // Same leading position: pad both to the same digit count.
            let width = left_digits.max(right_digits);
            let left = left * 10u128.pow(width - left_digits);
            let right = right * 10u128.pow(width - right_digits);
            left.cmp(&right)
        })
    }
}

fn digit_count(value: u128) -> u32 {
    value.checked_ilog10().map_or(1, |d| d + 1)
}

fn rescale(mantissa: i128, by: i32) -> Result<i128, NumberError> {
    let by = u32::try_from(by).map_err(|_| NumberError::Overflow)?;
    10i128
        .checked_pow(by)
        .and_then(|factor| mantissa.checked_mul(factor))
        .ok_or(NumberError::Overflow)
}

impl Ord for Number {
    fn cmp(&self, other: &Self) -> Ordering {
        let (left_sign, right_sign) = (self.mantissa.signum(), other.mantissa.signum());
        if left_sign != right_sign {
            return left_sign.cmp(&right_sign);
        }
        match left_sign {
            0 => Ordering::Equal,
            1 => self.cmp_magnitude(other),
            _ => self.cmp_magnitude(other).reverse(),
        }
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for Number {
    type Err = NumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || NumberError::Invalid(s.to_string());
        let text = s.trim();

        let (negative, rest) = match text.as_bytes().first() {
            Some(b'-') => (true, &text[1..]),
            Some(b'+') => (false, &text[1..]),
            _ => (false, text),
        };

        let (coefficient, exponent) = match rest.find(|c| c == 'e' || c == 'E') {
            Some(pos) => (
                &rest[..pos],
                rest[pos + 1..].parse::<i64>().map_err(|_| invalid())?,
            ),
            None => (rest, 0),
        };

        let (int_part, frac_part) = coefficient.split_once('.').unwrap_or((coefficient, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let digits = format!("{int_part}{frac_part}");
        let significant = digits.trim_start_matches('0');
        let trimmed = significant.trim_end_matches('0');
        if trimmed.is_empty() {
            return Ok(Self::ZERO);
        }
        if trimmed.len() > MAX_PRECISION as usize {
            return Err(NumberError::Precision);
        }

        let frac_len = i64::try_from(frac_part.len()).map_err(|_| invalid())?;
        let trailing = i64::try_from(significant.len() - trimmed.len()).map_err(|_| invalid())?;
        let magnitude: i128 = trimmed.parse().map_err(|_| invalid())?;
        let mantissa = if negative { -magnitude } else { magnitude };

        let exponent = exponent
            .checked_sub(frac_len)
            .ok_or(NumberError::Underflow)?
            .checked_add(trailing)
            .ok_or(NumberError::Overflow)?;
        Self::from_parts(mantissa, exponent)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.mantissa == 0 {
            return f.write_str("0");
        }
        if self.mantissa < 0 {
            f.write_str("-")?;
        }

        let digits = self.mantissa.unsigned_abs().to_string();
        if self.exponent >= 0 {
            f.write_str(&digits)?;
            for _ in 0..self.exponent {
                f.write_str("0")?;
            }
            return Ok(());
        }

        let point = digits.len() as i64 + i64::from(self.exponent);
        if point > 0 {
            let (whole, fraction) = digits.split_at(point as usize);
            write!(f, "{whole}.{fraction}")
        } else {
            f.write_str("0.")?;
            for _ in 0..-point {
                f.write_str("0")?;
            }
            f.write_str(&digits)
        }
    }
}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        // An i64 has at most 19 digits, always within range.
        Self::from_parts(i128::from(value), 0).unwrap_or(Self::ZERO)
    }
}

impl Serialize for Number {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Number {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Scalar type of a key attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarAttributeType {
    S,
    N,
    B,
}

impl fmt::Display for ScalarAttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::S => "S",
            Self::N => "N",
            Self::B => "B",
        })
    }
}

/// DynamoDB attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    S(String),
    N(Number),
    #[serde(with = "wire::bytes")]
    B(Vec<u8>),
    #[serde(rename = "BOOL")]
    Bool(bool),
    #[serde(rename = "NULL")]
    Null(bool),
    #[serde(rename = "SS", deserialize_with = "wire::set")]
    Ss(BTreeSet<String>),
    #[serde(rename = "NS", deserialize_with = "wire::set")]
    Ns(BTreeSet<Number>),
    #[serde(rename = "BS", with = "wire::byte_set")]
    Bs(BTreeSet<Vec<u8>>),
    L(Vec<AttributeValue>),
    M(HashMap<String, AttributeValue>),
}

impl AttributeValue {
    pub fn string(s: impl Into<String>) -> Self {
        AttributeValue::S(s.into())
    }

    pub fn number(n: impl Into<Number>) -> Self {
        AttributeValue::N(n.into())
    }

    pub fn parse_number(text: &str) -> Result<Self, NumberError> {
        text.parse().map(AttributeValue::N)
    }

    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        AttributeValue::B(bytes.into())
    }

    pub fn string_set<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AttributeValue::Ss(values.into_iter().map(Into::into).collect())
    }

    pub fn number_set<I, N>(values: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<Number>,
    {
        AttributeValue::Ns(values.into_iter().map(Into::into).collect())
    }

    /// Get the string value if this is an S type
    pub fn as_string(&self) -> Option<&str> {
        match self {
            AttributeValue::S(s) => Some(s),
            _ => None,
        }
    }

    /// Get the number if this is an N type
    pub fn as_number(&self) -> Option<&Number> {
        match self {
            AttributeValue::N(n) => Some(n),
            _ => None,
        }
    }

    /// Wire type descriptor (`S`, `N`, `SS`, `BOOL`, ...)
    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::S(_) => "S",
            AttributeValue::N(_) => "N",
            AttributeValue::B(_) => "B",
            AttributeValue::Bool(_) => "BOOL",
            AttributeValue::Null(_) => "NULL",
            AttributeValue::Ss(_) => "SS",
            AttributeValue::Ns(_) => "NS",
            AttributeValue::Bs(_) => "BS",
            AttributeValue::L(_) => "L",
            AttributeValue::M(_) => "M",
        }
    }

    pub fn scalar_type(&self) -> Option<ScalarAttributeType> {
        match self {
            AttributeValue::S(_) => Some(ScalarAttributeType::S),
            AttributeValue::N(_) => Some(ScalarAttributeType::N),
            AttributeValue::B(_) => Some(ScalarAttributeType::B),
            _ => None,
        }
    }

    /// Order two values of the same scalar type; `None` for anything else
    pub fn compare(&self, other: &AttributeValue) -> Option<Ordering> {
        match (self, other) {
            (AttributeValue::S(a), AttributeValue::S(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
            (AttributeValue::N(a), AttributeValue::N(b)) => Some(a.cmp(b)),
            (AttributeValue::B(a), AttributeValue::B(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Approximate stored size in bytes, following DynamoDB's sizing rules
    pub fn size(&self) -> usize {
        match self {
            AttributeValue::S(s) => s.len(),
            AttributeValue::N(n) => number_size(n),
            AttributeValue::B(b) => b.len(),
            AttributeValue::Bool(_) | AttributeValue::Null(_) => 1,
            AttributeValue::Ss(set) => set.iter().map(String::len).sum(),
            AttributeValue::Ns(set) => set.iter().map(number_size).sum(),
            AttributeValue::Bs(set) => set.iter().map(Vec::len).sum(),
            AttributeValue::L(list) => 3 + list.iter().map(|v| 1 + v.size()).sum::<usize>(),
            AttributeValue::M(map) => {
                3 + map
                    .iter()
                    .map(|(k, v)| 1 + k.len() + v.size())
                    .sum::<usize>()
            }
        }
    }
}

fn number_size(n: &Number) -> usize {
    (n.precision() as usize + 1) / 2 + 1
}

/// Approximate stored size of a whole item
pub fn item_size(item: &Item) -> usize {
    item.iter().map(|(name, value)| name.len() + value.size()).sum()
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::S(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::S(s)
    }
}

impl From<i64> for AttributeValue {
    fn from(n: i64) -> Self {
        AttributeValue::N(n.into())
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Bool(b)
    }
}

/// Serde helpers for base64 binaries and duplicate-free sets
mod wire {
    use std::collections::BTreeSet;

    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    fn collect<T: Ord>(values: Vec<T>) -> Result<BTreeSet<T>, &'static str> {
        if values.is_empty() {
            return Err("One or more parameter values were invalid: An attribute set may not be empty");
        }
        let len = values.len();
        let set: BTreeSet<T> = values.into_iter().collect();
        if set.len() != len {
            return Err("One or more parameter values were invalid: Input collection contains duplicates");
        }
        Ok(set)
    }

    pub fn set<'de, D, T>(deserializer: D) -> Result<BTreeSet<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + Ord,
    {
        let values = Vec::<T>::deserialize(deserializer)?;
        collect(values).map_err(D::Error::custom)
    }

    pub mod bytes {
        use super::*;

        pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(&STANDARD.encode(value))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
            let text = String::deserialize(deserializer)?;
            STANDARD.decode(text).map_err(D::Error::custom)
        }
    }

    pub mod byte_set {
        use super::*;

        pub fn serialize<S: Serializer>(
            value: &BTreeSet<Vec<u8>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            serializer.collect_seq(value.iter().map(|b| STANDARD.encode(b)))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<BTreeSet<Vec<u8>>, D::Error> {
            let encoded = Vec::<String>::deserialize(deserializer)?;
            let decoded = encoded
                .iter()
                .map(|text| STANDARD.decode(text))
                .collect::<Result<Vec<_>, _>>()
                .map_err(D::Error::custom)?;
            collect(decoded).map_err(D::Error::custom)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(s: &str) -> Number {
        s.parse().unwrap()
    }

    #[test]
    fn test_number_parse_and_display() {
        assert_eq!(num("7").to_string(), "7");
        assert_eq!(num("-0.50").to_string(), "-0.5");
        assert_eq!(num("1.10").to_string(), "1.1");
        assert_eq!(num("1200").to_string(), "1200");
        assert_eq!(num("1.5e3").to_string(), "1500");
        assert_eq!(num("0.000123").to_string(), "0.000123");
        assert_eq!(num("+42").to_string(), "42");
        assert_eq!(num("-0").to_string(), "0");
        assert_eq!(num("127549192").to_string(), "127549192");
    }

    #[test]
    fn test_number_invalid() {
        assert!(matches!("abc".parse::<Number>(), Err(NumberError::Invalid(_))));
        assert!(matches!("".parse::<Number>(), Err(NumberError::Invalid(_))));
        assert!(matches!("1.2.3".parse::<Number>(), Err(NumberError::Invalid(_))));
        assert!(matches!("1e".parse::<Number>(), Err(NumberError::Invalid(_))));
        assert!(matches!(
            "123456789012345678901234567890123456789".parse::<Number>(),
            Err(NumberError::Precision)
        ));
        assert!(matches!("1e126".parse::<Number>(), Err(NumberError::Overflow)));
        assert!(matches!("1e-131".parse::<Number>(), Err(NumberError::Underflow)));
    }

    #[test]
    fn test_number_extreme_exponents() {
        assert!(matches!(
            "10e9223372036854775807".parse::<Number>(),
            Err(NumberError::Overflow)
        ));
        assert!(matches!(
            "1e9223372036854775807".parse::<Number>(),
            Err(NumberError::Overflow)
        ));
        assert!(matches!(
            "0.1e-9223372036854775808".parse::<Number>(),
            Err(NumberError::Underflow)
        ));
        assert!(matches!(
            "1e-9223372036854775808".parse::<Number>(),
            Err(NumberError::Underflow)
        ));
        assert!(serde_json::from_str::<AttributeValue>(r#"{"N":"0.1e-9223372036854775808"}"#).is_err());
    }

    #[test]
    fn test_number_ordering_is_exact() {
        assert!(num("10") > num("9"));
        assert!(num("-10") < num("-9"));
        assert!(num("0.1") < num("0.11"));
        assert!(num("-1") < num("0"));
        assert_eq!(num("1.10"), num("1.1"));
        assert_eq!(num("1e2").cmp(&num("100")), Ordering::Equal);
        assert!(
            num("12345678901234567890123456789012345678") > num("12345678901234567890123456789012345677")
        );
    }

    #[test]
    fn test_number_arithmetic() {
        assert_eq!(num("5").checked_add(num("1")).unwrap(), num("6"));
        assert_eq!(num("0.1").checked_add(num("0.2")).unwrap(), num("0.3"));
        assert_eq!(num("1").checked_sub(num("1.5")).unwrap(), num("-0.5"));
        assert!(num("9e125").checked_add(num("9e125")).is_err());
    }

    #[test]
    fn test_attribute_value_wire_format() {
        let value = AttributeValue::string("hello");
        assert_eq!(serde_json::to_string(&value).unwrap(), r#"{"S":"hello"}"#);

        let value: AttributeValue = serde_json::from_str(r#"{"N":"7.0"}"#).unwrap();
        assert_eq!(value, AttributeValue::number(7i64));
        assert_eq!(serde_json::to_string(&value).unwrap(), r#"{"N":"7"}"#);

        let value: AttributeValue = serde_json::from_str(r#"{"B":"aGk="}"#).unwrap();
        assert_eq!(value, AttributeValue::binary(b"hi".to_vec()));

        let value: AttributeValue = serde_json::from_str(r#"{"NULL":true}"#).unwrap();
        assert_eq!(value, AttributeValue::Null(true));

        let value: AttributeValue =
            serde_json::from_str(r#"{"M":{"tags":{"SS":["b","a"]},"ok":{"BOOL":true}}}"#).unwrap();
        let AttributeValue::M(map) = value else {
            panic!("expected map");
        };
        assert_eq!(map["tags"], AttributeValue::string_set(["a", "b"]));
        assert_eq!(map["ok"], AttributeValue::Bool(true));
    }

    #[test]
    fn test_sets_reject_duplicates_and_empty() {
        assert!(serde_json::from_str::<AttributeValue>(r#"{"SS":["a","a"]}"#).is_err());
        assert!(serde_json::from_str::<AttributeValue>(r#"{"NS":["1","1.0"]}"#).is_err());
        assert!(serde_json::from_str::<AttributeValue>(r#"{"NS":[]}"#).is_err());
        assert!(serde_json::from_str::<AttributeValue>(r#"{"BS":["aGk=","aGk="]}"#).is_err());
    }

    #[test]
    fn test_compare_only_same_scalar_types() {
        let s = AttributeValue::string("a");
        let n = AttributeValue::number(1i64);
        assert_eq!(s.compare(&AttributeValue::string("b")), Some(Ordering::Less));
        assert_eq!(n.compare(&AttributeValue::number(1i64)), Some(Ordering::Equal));
        assert_eq!(s.compare(&n), None);
        assert_eq!(AttributeValue::Bool(true).compare(&AttributeValue::Bool(true)), None);
    }

    #[test]
    fn test_item_size() {
        let mut item = Item::new();
        item.insert("id".to_string(), AttributeValue::string("abc"));
        item.insert("n".to_string(), AttributeValue::number(12345i64));
        // "id" + "abc" = 5, "n" + (5 digits + 1) / 2 + 1 = 5
        assert_eq!(item_size(&item), 10);
    }
}
