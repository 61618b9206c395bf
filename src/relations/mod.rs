//! Typed, directional relations between entities.
//!
//! Relation kinds live in an immutable [`RelationRegistry`]; stored relations
//! are read through the [`RelationStore`] adapter, which can find an edge from
//! either endpoint while keeping its stored direction.

mod registry;
mod store;

pub use registry::{RelationKind, RelationRegistry, SICPROD_RELATION_KINDS};
pub use store::{NewRelation, RelationStore};

use serde::{Deserialize, Serialize};

use crate::catalog::{EntityRef, FuzzyDate};
use crate::error::Result;

/// Which endpoint of a stored relation a lookup started from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// The entity is the subject.
    Forward,
    /// The entity is the object.
    Reverse,
}

/// A stored relation (subject --kind--> object).
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub id: i64,
    pub kind: String,
    pub subject: EntityRef,
    pub object: EntityRef,
    pub start: Option<FuzzyDate>,
    pub end: Option<FuzzyDate>,
    pub notes: Option<String>,
}

impl Relation {
    /// View this relation from its subject.
    pub fn as_subject(self) -> DirectedRelation {
        DirectedRelation { relation: self, direction: Direction::Forward }
    }

    /// View this relation from its object.
    pub fn as_object(self) -> DirectedRelation {
        DirectedRelation { relation: self, direction: Direction::Reverse }
    }
}

/// A relation seen from one of its endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectedRelation {
    pub relation: Relation,
    pub direction: Direction,
}

impl DirectedRelation {
    /// The endpoint the relation is viewed from.
    pub fn this(&self) -> EntityRef {
        match self.direction {
            Direction::Forward => self.relation.subject,
            Direction::Reverse => self.relation.object,
        }
    }

    /// The opposite endpoint.
    pub fn other(&self) -> EntityRef {
        match self.direction {
            Direction::Forward => self.relation.object,
            Direction::Reverse => self.relation.subject,
        }
    }

    /// Forward name from the subject side, reverse name from the object side.
    pub fn display_name(&self, registry: &RelationRegistry) -> Result<&'static str> {
        let kind = registry.lookup(&self.relation.kind)?;
        Ok(kind.name_from(self.direction))
    }
}
