//! Immutable context snapshots
//!
//! A [`Context`] is a shared, frozen key-value record. Merging never touches
//! the receiver: it copies the underlying map, applies the partial update and
//! hands back a fresh snapshot. Nothing is exposed that could write in place.

use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::ContextError;

/// Read-only snapshot of the accumulated context.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Context(Arc<Map<String, Value>>);

impl Context {
    pub fn new(record: Map<String, Value>) -> Self {
        Self(Arc::new(record))
    }

    /// Wrap a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self, ContextError> {
        match value {
            Value::Object(record) => Ok(Self::new(record)),
            other => Err(ContextError::NotARecord(other.to_string())),
        }
    }

    /// Shallow-merge `partial` over this snapshot. Keys in `partial` win.
    ///
    /// Anything that is not a JSON object is treated as an empty update, so
    /// this never fails and never drops existing keys.
    pub fn merge(&self, partial: &Value) -> Self {
        match partial {
            Value::Object(update) => self.merge_map(update),
            _ => self.clone(),
        }
    }

    pub fn merge_map(&self, update: &Map<String, Value>) -> Self {
        if update.is_empty() {
            return self.clone();
        }

        let mut next = self.0.as_ref().clone();
        for (key, value) in update {
            next.insert(key.clone(), value.clone());
        }
        Self::new(next)
    }

    /// Snapshots are frozen; every write is rejected.
    pub fn set(&self, key: impl Into<String>, _value: Value) -> Result<(), ContextError> {
        Err(ContextError::NotExtensible { key: key.into() })
    }

    /// True when both handles point at the same snapshot.
    pub fn ptr_eq(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.as_ref().clone())
    }
}

impl Deref for Context {
    type Target = Map<String, Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Serialize for Context {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.as_ref().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Context {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Map::deserialize(deserializer).map(Self::new)
    }
}

impl From<Map<String, Value>> for Context {
    fn from(record: Map<String, Value>) -> Self {
        Self::new(record)
    }
}

impl PartialEq<Value> for Context {
    fn eq(&self, other: &Value) -> bool {
        match other {
            Value::Object(record) => self.0.as_ref() == record,
            _ => false,
        }
    }
}
