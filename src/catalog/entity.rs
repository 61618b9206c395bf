use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{EntityType, FuzzyDate};

/// Typed address of an entity: both relation endpoints use it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: EntityType,
    pub id: i64,
}

impl EntityRef {
    pub fn new(entity_type: EntityType, id: i64) -> Self {
        Self { entity_type, id }
    }
}

/// Shape of one attribute as read from a record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttributeValue<'a> {
    /// Key absent from the record.
    Missing,
    /// Null or empty string.
    Blank,
    Text(&'a str),
    /// Present but not a string.
    Malformed(&'a Value),
}

/// A record of one concrete entity type, read-only for this crate.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: i64,
    pub entity_type: EntityType,
    pub attributes: Map<String, Value>,
    pub start_date: Option<FuzzyDate>,
    pub end_date: Option<FuzzyDate>,
}

impl Entity {
    pub fn new(id: i64, entity_type: EntityType) -> Self {
        Self {
            id,
            entity_type,
            attributes: Map::new(),
            start_date: None,
            end_date: None,
        }
    }

    pub fn with_attribute(mut self, name: &str, value: Value) -> Self {
        self.attributes.insert(name.to_string(), value);
        self
    }

    pub fn with_start_date(mut self, written: &str) -> Self {
        self.start_date = Some(FuzzyDate::parse(written));
        self
    }

    pub fn with_end_date(mut self, written: &str) -> Self {
        self.end_date = Some(FuzzyDate::parse(written));
        self
    }

    pub fn key(&self) -> EntityRef {
        EntityRef::new(self.entity_type, self.id)
    }

    pub fn attribute(&self, name: &str) -> AttributeValue<'_> {
        match self.attributes.get(name) {
            None => AttributeValue::Missing,
            Some(Value::Null) => AttributeValue::Blank,
            Some(Value::String(s)) if s.is_empty() => AttributeValue::Blank,
            Some(Value::String(s)) => AttributeValue::Text(s),
            Some(other) => AttributeValue::Malformed(other),
        }
    }

    /// Attribute as text if it is a string.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Value::as_str)
    }

    pub fn start_year(&self) -> Option<i32> {
        self.start_date.as_ref().and_then(|d| d.year)
    }

    pub fn end_year(&self) -> Option<i32> {
        self.end_date.as_ref().and_then(|d| d.year)
    }
}
