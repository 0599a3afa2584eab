//! Deduplicating storage of composite keys with dense surrogate ids.
//!
//! An `IdentifierTable` maps every distinct key it has seen to a small integer id. Ids start at 1,
//! are handed out in insertion order and never reused, so an id is a stable reference to its key
//! for as long as the table lives. Lookups are a linear scan over stored keys, which is fine for
//! the cardinalities of scientific grid dimensions.

use std::fmt;

use chrono::NaiveDateTime;
use ndarray::Array1;
use tracing::debug;

use crate::errors::{Error, Result};

/// Surrogate id type
pub type Uid = u32;

/// A composite key, one value per column
pub type Key = Vec<KeyValue>;

/// A single column value of a key.
///
/// `Null` is a sentinel used for absent dimensions (no bounds, no level) and matches only another
/// `Null`. Floats are compared by total order, so a NaN key matches itself.
///
#[derive(Clone, Debug)]
pub enum KeyValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(NaiveDateTime),
    Bytes(Vec<u8>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyKind {
    Int,
    Float,
    Text,
    DateTime,
    Bytes,
}

impl KeyValue {
    pub fn kind(&self) -> Option<KeyKind> {
        match self {
            Self::Null => None,
            Self::Int(_) => Some(KeyKind::Int),
            Self::Float(_) => Some(KeyKind::Float),
            Self::Text(_) => Some(KeyKind::Text),
            Self::DateTime(_) => Some(KeyKind::DateTime),
            Self::Bytes(_) => Some(KeyKind::Bytes),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl PartialEq for KeyValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b).is_eq(),
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::DateTime(a), Self::DateTime(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::DateTime(dt) => write!(f, "{dt}"),
            Self::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

macro_rules! key_value_from {
    ($type:ty, $variant:ident) => {
        impl From<$type> for KeyValue {
            fn from(value: $type) -> Self {
                Self::$variant(value.into())
            }
        }
    };
}

key_value_from!(i32, Int);
key_value_from!(i64, Int);
key_value_from!(u32, Int);
key_value_from!(f32, Float);
key_value_from!(f64, Float);
key_value_from!(String, Text);
key_value_from!(&str, Text);
key_value_from!(NaiveDateTime, DateTime);
key_value_from!(Vec<u8>, Bytes);

impl<T> From<Option<T>> for KeyValue
where
    T: Into<KeyValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => value.into(),
            None => Self::Null,
        }
    }
}

/// Deduplicating table of keys and their surrogate ids.
///
#[derive(Clone, Debug)]
pub struct IdentifierTable {
    /// Name used in log and error messages, eg "tid"
    pub name: String,

    /// (id, key) rows in insertion order
    rows: Vec<(Uid, Key)>,

    /// Column kinds, each fixed by the first non-null value seen in that column. The number of
    /// columns is fixed by the first key added.
    kinds: Option<Vec<Option<KeyKind>>>,

    /// Next id to hand out
    next: Uid,
}

impl IdentifierTable {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            rows: vec![],
            kinds: None,
            next: 1,
        }
    }

    /// Add a batch of keys, minting ids for keys not yet in the table.
    ///
    /// Keys already stored, including keys repeated earlier in the same batch, are ignored. The
    /// whole batch is validated before anything is stored, so a key of the wrong width or kind
    /// leaves the table unchanged.
    ///
    /// Returns the number of new rows.
    ///
    pub fn add<I>(&mut self, batch: I) -> Result<usize>
    where
        I: IntoIterator<Item = Key>,
    {
        let batch: Vec<Key> = batch.into_iter().collect();
        let mut kinds = self.kinds.clone();
        for key in &batch {
            kinds = Some(self.check_key(kinds, key)?);
        }

        let mut added = 0;
        for key in batch {
            if self.find(&key).is_none() {
                self.rows.push((self.next, key));
                self.next += 1;
                added += 1;
            }
        }
        self.kinds = kinds;

        if added > 0 {
            debug!("{}: added {added} identifiers ({} total)", self.name, self.len());
        }

        Ok(added)
    }

    /// Add a single key, returning its id.
    ///
    pub fn add_one(&mut self, key: Key) -> Result<Uid> {
        self.add([key.clone()])?;
        self.get(&key)
    }

    /// Get the id for `key`.
    ///
    pub fn get(&self, key: &[KeyValue]) -> Result<Uid> {
        self.find(key)
            .ok_or_else(|| Error::LookupMiss(format!("{}: {key:?}", self.name)))
    }

    /// Same as `get` but returns `None` instead of an error on a miss.
    ///
    pub fn find(&self, key: &[KeyValue]) -> Option<Uid> {
        self.rows
            .iter()
            .find(|(_, stored)| stored.as_slice() == key)
            .map(|(uid, _)| *uid)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of columns in a key, if any key has been added yet
    pub fn width(&self) -> Option<usize> {
        self.kinds.as_ref().map(|kinds| kinds.len())
    }

    pub fn uids(&self) -> Array1<Uid> {
        Array1::from_iter(self.rows.iter().map(|(uid, _)| *uid))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Uid, &[KeyValue])> + '_ {
        self.rows.iter().map(|(uid, key)| (*uid, key.as_slice()))
    }

    fn check_key(
        &self,
        kinds: Option<Vec<Option<KeyKind>>>,
        key: &[KeyValue],
    ) -> Result<Vec<Option<KeyKind>>> {
        let mut kinds = kinds.unwrap_or_else(|| vec![None; key.len()]);
        if kinds.len() != key.len() {
            return Err(Error::KeyMismatch(format!(
                "{}: key has {} columns, table has {}",
                self.name,
                key.len(),
                kinds.len()
            )));
        }

        for (column, value) in key.iter().enumerate() {
            match (kinds[column], value.kind()) {
                (_, None) => {}
                (None, Some(kind)) => kinds[column] = Some(kind),
                (Some(expected), Some(kind)) if expected != kind => {
                    return Err(Error::KeyMismatch(format!(
                        "{}: column {column} holds {expected:?}, got {kind:?}",
                        self.name
                    )));
                }
                _ => {}
            }
        }

        Ok(kinds)
    }
}
