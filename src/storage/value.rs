//! Document Values
//!
//! Field values with a total order across types, and the ObjectId format
//! used as the clustering key of time-bucketed collections.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::fmt;

/// 12-byte object identifier. The first four bytes hold the creation time
/// in seconds since the UNIX epoch, big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    pub const MIN: ObjectId = ObjectId([0x00; 12]);

    /// Build an id from a timestamp and an 8-byte discriminator
    pub fn new(timestamp_secs: u32, tail: u64) -> Self {
        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&timestamp_secs.to_be_bytes());
        bytes[4..].copy_from_slice(&tail.to_be_bytes());
        Self(bytes)
    }

    /// Smallest id carrying the given timestamp
    pub fn min_for_timestamp(timestamp_secs: u32) -> Self {
        Self::new(timestamp_secs, 0)
    }

    /// Greatest id carrying the given timestamp
    pub fn max_for_timestamp(timestamp_secs: u32) -> Self {
        Self::new(timestamp_secs, u64::MAX)
    }

    pub fn timestamp_secs(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    /// Embedded creation time
    pub fn timestamp(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(i64::from(self.timestamp_secs()), 0)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// A document field value
#[derive(Debug, Clone)]
pub enum Value {
    MinKey,
    Null,
    Int(i64),
    Double(f64),
    String(String),
    ObjectId(ObjectId),
    Bool(bool),
    Date(DateTime<Utc>),
    Array(Vec<Value>),
    MaxKey,
}

impl Value {
    /// Canonical type bracket. Ints and doubles share one bracket.
    fn type_rank(&self) -> u8 {
        match self {
            Value::MinKey => 0,
            Value::Null => 1,
            Value::Int(_) | Value::Double(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::ObjectId(_) => 5,
            Value::Bool(_) => 6,
            Value::Date(_) => 7,
            Value::MaxKey => 255,
        }
    }

    /// Index keys generated for this value: one per array element, or the
    /// value itself.
    pub fn index_keys(&self) -> Vec<Value> {
        match self {
            Value::Array(items) if items.is_empty() => vec![Value::Null],
            Value::Array(items) => items.clone(),
            other => vec![other.clone()],
        }
    }
}

// 2^63 as a double; every double in [-2^63, 2^63) truncates to a valid i64
const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;

/// Exact comparison of an integer against a double. NaN sorts below every
/// number.
fn cmp_int_double(i: i64, d: f64) -> Ordering {
    if d.is_nan() {
        return Ordering::Greater;
    }
    if d >= TWO_POW_63 {
        return Ordering::Less;
    }
    if d < -TWO_POW_63 {
        return Ordering::Greater;
    }
    let whole = d.trunc();
    match i.cmp(&(whole as i64)) {
        Ordering::Equal => whole.partial_cmp(&d).unwrap_or(Ordering::Equal),
        other => other,
    }
}

fn cmp_doubles(x: f64, y: f64) -> Ordering {
    match (x.is_nan(), y.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
    }
}

fn cmp_numbers(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Int(x), Value::Double(y)) => cmp_int_double(*x, *y),
        (Value::Double(x), Value::Int(y)) => cmp_int_double(*y, *x).reverse(),
        (Value::Double(x), Value::Double(y)) => cmp_doubles(*x, *y),
        _ => Ordering::Equal,
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        let rank = self.type_rank().cmp(&other.type_rank());
        if rank != Ordering::Equal {
            return rank;
        }
        match (self, other) {
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::ObjectId(a), Value::ObjectId(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => a.cmp(b),
            (a, b) => cmp_numbers(a, b),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::Date(d)
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Value::ObjectId(id)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}
