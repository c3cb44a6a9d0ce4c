//! Shared request/response types used across the engine.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn reversed(self) -> SortOrder {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }
}

/// Where nulls land relative to non-null values for the primary order key.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NullsOrder {
    First,
    Last,
}

/// One ordering key of an `orderBy` list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub order: SortOrder,
    pub nulls: Option<NullsOrder>,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        OrderBy {
            field: field.into(),
            order: SortOrder::Asc,
            nulls: None,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        OrderBy {
            field: field.into(),
            order: SortOrder::Desc,
            nulls: None,
        }
    }

    pub fn new(field: impl Into<String>, order: SortOrder) -> Self {
        OrderBy {
            field: field.into(),
            order,
            nulls: None,
        }
    }
}

/// A raw stored row: field name to scalar value. Rows always carry every
/// scalar field of their entity; projection narrows them on the way out.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> &Value {
        self.fields.get(field).unwrap_or(&Value::Null)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Record {
            fields: iter.into_iter().collect(),
        }
    }
}

/// A record reshaped by the projection engine: the selected scalar fields
/// plus any loaded relations.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectedRecord {
    pub fields: BTreeMap<String, Value>,
    pub relations: BTreeMap<String, RelationPayload>,
}

/// Loaded relation data attached to a `SelectedRecord`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RelationPayload {
    One(Option<Box<SelectedRecord>>),
    Many(Vec<SelectedRecord>),
}

impl SelectedRecord {
    pub fn get(&self, field: &str) -> &Value {
        self.fields.get(field).unwrap_or(&Value::Null)
    }

    pub fn relation(&self, name: &str) -> Option<&RelationPayload> {
        self.relations.get(name)
    }

    /// Convenience accessor for a loaded collection relation.
    pub fn many(&self, name: &str) -> &[SelectedRecord] {
        match self.relations.get(name) {
            Some(RelationPayload::Many(rows)) => rows,
            _ => &[],
        }
    }

    /// Convenience accessor for a loaded singular relation.
    pub fn one(&self, name: &str) -> Option<&SelectedRecord> {
        match self.relations.get(name) {
            Some(RelationPayload::One(Some(rec))) => Some(rec),
            _ => None,
        }
    }
}

/// Batch mutation outcome (`updateMany`, `deleteMany`, `createMany`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCount {
    pub count: u64,
}
