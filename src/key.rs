//! Sort keys and row comparison.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::error::Error;
use std::fmt;
use std::str::FromStr;

use crate::row::{Row, Value};

/// A single key field of a [`KeySpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyField {
    /// Field position in the row.
    pub index: usize,
    /// Reverse field order.
    pub descending: bool,
    /// Compare string values ignoring case.
    pub case_insensitive: bool,
}

impl KeyField {
    pub fn asc(index: usize) -> Self {
        KeyField {
            index,
            descending: false,
            case_insensitive: false,
        }
    }

    pub fn desc(index: usize) -> Self {
        KeyField {
            index,
            descending: true,
            case_insensitive: false,
        }
    }

    pub fn ignore_case(mut self) -> Self {
        self.case_insensitive = true;
        return self;
    }
}

/// Ordered list of key fields rows are sorted by.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeySpec {
    fields: Vec<KeyField>,
}

impl KeySpec {
    pub fn new(fields: Vec<KeyField>) -> Self {
        KeySpec { fields }
    }

    pub fn fields(&self) -> &[KeyField] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Checks the key spec is usable at all: non empty and without repeated field positions.
    pub fn validate(&self) -> Result<(), KeySpecError> {
        if self.fields.is_empty() {
            return Err(KeySpecError::Empty);
        }

        let mut seen = HashSet::with_capacity(self.fields.len());
        for field in &self.fields {
            if !seen.insert(field.index) {
                return Err(KeySpecError::DuplicateField(field.index));
            }
        }

        return Ok(());
    }

    /// Checks every key field is present in a row of the given arity.
    pub fn validate_arity(&self, arity: usize) -> Result<(), KeySpecError> {
        match self.fields.iter().find(|field| field.index >= arity) {
            Some(field) => Err(KeySpecError::FieldOutOfRange {
                index: field.index,
                arity,
            }),
            None => Ok(()),
        }
    }
}

impl From<Vec<KeyField>> for KeySpec {
    fn from(fields: Vec<KeyField>) -> Self {
        KeySpec::new(fields)
    }
}

impl FromStr for KeySpec {
    type Err = KeySpecError;

    /// Parses key spec of the form `0,2:desc,1:ci` where every item is a field position
    /// followed by optional `asc`, `desc` or `ci` flags separated by colons.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = Vec::new();

        for item in s.split(',').map(str::trim).filter(|item| !item.is_empty()) {
            let mut parts = item.split(':');
            let index = parts.next().unwrap_or_default();
            let mut field = KeyField::asc(
                index
                    .parse()
                    .map_err(|_| KeySpecError::Malformed(item.to_owned()))?,
            );

            for flag in parts {
                match flag.to_ascii_lowercase().as_str() {
                    "asc" => field.descending = false,
                    "desc" => field.descending = true,
                    "ci" => field.case_insensitive = true,
                    _ => return Err(KeySpecError::Malformed(item.to_owned())),
                }
            }
            fields.push(field);
        }

        let spec = KeySpec::new(fields);
        spec.validate()?;

        return Ok(spec);
    }
}

/// Key spec validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySpecError {
    /// No key fields given.
    Empty,
    /// The same field position is used more than once.
    DuplicateField(usize),
    /// Key field is missing in the row.
    FieldOutOfRange { index: usize, arity: usize },
    /// Textual key spec can't be parsed.
    Malformed(String),
}

impl Error for KeySpecError {}

impl fmt::Display for KeySpecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySpecError::Empty => write!(f, "no key fields specified"),
            KeySpecError::DuplicateField(index) => write!(f, "key field {} specified more than once", index),
            KeySpecError::FieldOutOfRange { index, arity } => {
                write!(f, "key field {} not found in row of {} fields", index, arity)
            }
            KeySpecError::Malformed(item) => write!(f, "malformed key field '{}'", item),
        }
    }
}

/// Row comparator interface. Implementations must define a total preorder over rows for the
/// given key spec, otherwise sorting and duplicate elimination results are undefined.
pub trait RowComparator {
    fn compare(&self, a: &Row, b: &Row, keys: &KeySpec) -> Ordering;
}

impl<F> RowComparator for F
where
    F: Fn(&Row, &Row, &KeySpec) -> Ordering,
{
    fn compare(&self, a: &Row, b: &Row, keys: &KeySpec) -> Ordering {
        self(a, b, keys)
    }
}

/// Default comparator. Compares key fields one by one using [`compare_values`].
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyComparator;

impl RowComparator for KeyComparator {
    fn compare(&self, a: &Row, b: &Row, keys: &KeySpec) -> Ordering {
        for field in keys.fields() {
            let left = a.get(field.index).unwrap_or(&Value::Null);
            let right = b.get(field.index).unwrap_or(&Value::Null);

            let ord = compare_values(left, right, field.case_insensitive);
            let ord = if field.descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }

        Ordering::Equal
    }
}

/// Compares two values in ascending order.
///
/// Nulls go before any other value. Integers and numbers are compared numerically,
/// values of other unrelated kinds are ordered by kind.
pub fn compare_values(a: &Value, b: &Value, case_insensitive: bool) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
        (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b).unwrap_or_else(|| a.total_cmp(b)),
        (Value::Integer(a), Value::Number(b)) => compare_integer_number(*a, *b),
        (Value::Number(a), Value::Integer(b)) => compare_integer_number(*b, *a).reverse(),
        (Value::Date(a), Value::Date(b)) => a.cmp(b),
        (Value::String(a), Value::String(b)) if case_insensitive => a
            .chars()
            .flat_map(char::to_lowercase)
            .cmp(b.chars().flat_map(char::to_lowercase)),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Binary(a), Value::Binary(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
        (a, b) => a.kind_rank().cmp(&b.kind_rank()),
    }
}

/// Compares an integer with a float exactly, without rounding the integer.
/// NaNs go to the end matching their sign, as [`f64::total_cmp`] places them.
fn compare_integer_number(a: i64, b: f64) -> Ordering {
    // 2^63, the first float above i64::MAX
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;

    if b.is_nan() {
        return if b.is_sign_negative() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    if b >= LIMIT {
        return Ordering::Less;
    }
    if b < -LIMIT {
        return Ordering::Greater;
    }

    let whole = b.trunc();
    match a.cmp(&(whole as i64)) {
        Ordering::Equal => whole.partial_cmp(&b).unwrap_or(Ordering::Equal),
        ord => ord,
    }
}

#[cfg(test)]
mod test {
    use std::cmp::Ordering;

    use rstest::*;

    use super::{compare_values, KeyComparator, KeyField, KeySpec, KeySpecError, RowComparator};
    use crate::row::Value;

    #[rstest]
    #[case(Value::Null, Value::Integer(0), Ordering::Less)]
    #[case(Value::Integer(2), Value::Integer(10), Ordering::Less)]
    #[case(Value::Integer(2), Value::Number(1.5), Ordering::Greater)]
    #[case(Value::Number(2.0), Value::Integer(2), Ordering::Equal)]
    #[case(Value::Boolean(false), Value::Boolean(true), Ordering::Less)]
    #[case(Value::String("b".into()), Value::String("a".into()), Ordering::Greater)]
    #[case(Value::String("B".into()), Value::String("a".into()), Ordering::Less)]
    #[case(Value::Binary(vec![9]), Value::Binary(vec![0, 0]), Ordering::Less)]
    #[case(Value::Date(5), Value::Date(5), Ordering::Equal)]
    #[case(Value::String("1".into()), Value::Integer(1), Ordering::Greater)]
    #[case(Value::Integer((1 << 53) + 1), Value::Number((1u64 << 53) as f64), Ordering::Greater)]
    #[case(Value::Integer(1 << 53), Value::Number((1u64 << 53) as f64), Ordering::Equal)]
    #[case(Value::Integer(i64::MAX), Value::Number(i64::MAX as f64), Ordering::Less)]
    #[case(Value::Integer(i64::MIN), Value::Number(i64::MIN as f64), Ordering::Equal)]
    #[case(Value::Integer(-1), Value::Number(-0.5), Ordering::Less)]
    #[case(Value::Integer(0), Value::Number(-0.0), Ordering::Equal)]
    #[case(Value::Number(-0.0), Value::Number(0.0), Ordering::Equal)]
    #[case(Value::Integer(i64::MAX), Value::Number(f64::INFINITY), Ordering::Less)]
    #[case(Value::Integer(i64::MIN), Value::Number(f64::NEG_INFINITY), Ordering::Greater)]
    #[case(Value::Integer(i64::MAX), Value::Number(f64::NAN), Ordering::Less)]
    fn test_compare_values(#[case] a: Value, #[case] b: Value, #[case] expected: Ordering) {
        assert_eq!(compare_values(&a, &b, false), expected);
        assert_eq!(compare_values(&b, &a, false), expected.reverse());
    }

    #[test]
    fn test_compare_values_case_insensitive() {
        let a = Value::String("Apple".into());
        let b = Value::String("aPPLE".into());

        assert_eq!(compare_values(&a, &b, true), Ordering::Equal);
        assert_ne!(compare_values(&a, &b, false), Ordering::Equal);
    }

    #[test]
    fn test_mixed_numbers_transitive() {
        let base: i64 = 1 << 53;
        let values: Vec<Value> = (-3..=3)
            .flat_map(|k| vec![Value::Integer(base + k), Value::Number((base + k) as f64)])
            .collect();

        for a in &values {
            for b in &values {
                for c in &values {
                    let ab = compare_values(a, b, false);
                    let bc = compare_values(b, c, false);
                    if ab != Ordering::Greater && bc != Ordering::Greater {
                        assert_ne!(compare_values(a, c, false), Ordering::Greater, "{:?} {:?} {:?}", a, b, c);
                    }
                }
            }
        }
    }

    #[test]
    fn test_key_comparator() {
        let keys = KeySpec::new(vec![KeyField::asc(1), KeyField::desc(0)]);

        assert_eq!(KeyComparator.compare(&row![1, "a"], &row![2, "b"], &keys), Ordering::Less);
        assert_eq!(KeyComparator.compare(&row![1, "a"], &row![2, "a"], &keys), Ordering::Greater);
        assert_eq!(KeyComparator.compare(&row![1, "a", 5], &row![1, "a", 6], &keys), Ordering::Equal);
    }

    #[test]
    fn test_descending_nulls_last() {
        let keys = KeySpec::new(vec![KeyField::desc(0)]);

        assert_eq!(
            KeyComparator.compare(&row![Value::Null], &row![1], &keys),
            Ordering::Greater
        );
    }

    #[rstest]
    #[case("0", Ok(vec![KeyField::asc(0)]))]
    #[case("2:desc, 0", Ok(vec![KeyField::desc(2), KeyField::asc(0)]))]
    #[case("1:ci:desc", Ok(vec![KeyField::desc(1).ignore_case()]))]
    #[case("", Err(KeySpecError::Empty))]
    #[case("0,0:desc", Err(KeySpecError::DuplicateField(0)))]
    #[case("x", Err(KeySpecError::Malformed("x".into())))]
    #[case("1:up", Err(KeySpecError::Malformed("1:up".into())))]
    fn test_key_spec_parse(#[case] input: &str, #[case] expected: Result<Vec<KeyField>, KeySpecError>) {
        let actual = input.parse::<KeySpec>();
        assert_eq!(actual, expected.map(KeySpec::new));
    }

    #[test]
    fn test_validate_arity() {
        let keys = KeySpec::new(vec![KeyField::asc(0), KeyField::asc(3)]);

        assert_eq!(keys.validate_arity(4), Ok(()));
        assert_eq!(
            keys.validate_arity(3),
            Err(KeySpecError::FieldOutOfRange { index: 3, arity: 3 })
        );
    }
}
