//! Entity source over the `entities` table: filtered listing, lookups and
//! bulk label resolution.

use std::collections::HashMap;
use std::sync::Arc;

use rusqlite::params;
use serde_json::{Map, Value};

use crate::catalog::{AttributeValue, Entity, EntityCatalog, EntityRef, EntityShape, EntityType, FuzzyDate};
use crate::db::{id_set_param, Db};
use crate::error::{ProsographError, Result};

/// Query value that matches blank or null categorical attributes.
pub const EMPTY_VALUE: &str = "empty";

/// Narrowing applied to a listing before facets and pagination.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityFilter {
    /// Case-insensitive substring over the type's search fields.
    pub search: Option<String>,
    /// Exact categorical matches; `"empty"` matches blank values.
    pub attributes: Vec<(String, String)>,
    /// Case-insensitive substring matches on free-text attributes.
    pub text: Vec<(String, String)>,
    pub start_year_min: Option<i32>,
    pub end_year_max: Option<i32>,
}

impl EntityFilter {
    /// Build a filter from query parameters, rejecting keys the type does not know.
    pub fn from_params<'a, I>(shape: &EntityShape, params: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut filter = EntityFilter::default();
        for (key, value) in params {
            match key {
                "search" => filter.search = Some(value.to_string()),
                "start_year_min" => filter.start_year_min = Some(parse_year(key, value)?),
                "end_year_max" => filter.end_year_max = Some(parse_year(key, value)?),
                attr if shape.attribute(attr).is_some() => {
                    filter.attributes.push((attr.to_string(), value.to_string()))
                }
                attr if shape.text_filters.iter().any(|f| *f == attr) => {
                    filter.text.push((attr.to_string(), value.to_string()))
                }
                other => {
                    return Err(ProsographError::InvalidInput(format!(
                        "unknown filter '{}' for {}",
                        other, shape.entity_type
                    )))
                }
            }
        }
        Ok(filter)
    }

    pub fn matches(&self, shape: &EntityShape, entity: &Entity) -> bool {
        if let Some(scope) = shape.default_scope {
            let in_scope = entity
                .text(scope.attribute)
                .is_some_and(|v| scope.values.contains(&v));
            if !in_scope {
                return false;
            }
        }

        for (attr, wanted) in &self.attributes {
            let matched = match entity.attribute(attr) {
                AttributeValue::Text(v) => v == wanted,
                AttributeValue::Blank => wanted == EMPTY_VALUE || wanted.is_empty(),
                AttributeValue::Missing | AttributeValue::Malformed(_) => false,
            };
            if !matched {
                return false;
            }
        }

        for (attr, needle) in &self.text {
            let needle = needle.to_lowercase();
            if !entity.text(attr).is_some_and(|v| v.to_lowercase().contains(&needle)) {
                return false;
            }
        }

        if let Some(needle) = &self.search {
            let needle = needle.to_lowercase();
            let found = shape
                .search_fields
                .iter()
                .filter_map(|field| entity.text(field))
                .any(|text| text.to_lowercase().contains(&needle));
            if !found {
                return false;
            }
        }

        if let Some(min) = self.start_year_min {
            if !entity.start_year().is_some_and(|year| year >= min) {
                return false;
            }
        }

        if let Some(max) = self.end_year_max {
            if !entity.end_year().is_some_and(|year| year <= max) {
                return false;
            }
        }

        true
    }

    /// SQL condition and parameters for the predicates SQLite evaluates
    /// exactly: the default scope and categorical matches. `?1` is the entity
    /// type. Substring filters stay with [`EntityFilter::matches`] since
    /// SQLite only folds ASCII case, and year bounds need the parsed dates.
    fn sql_condition(&self, shape: &EntityShape) -> Result<(String, Vec<String>)> {
        let mut params = vec![shape.entity_type.as_str().to_string()];
        let mut predicates = Vec::new();

        if let Some(scope) = shape.default_scope {
            params.push(json_path(scope.attribute));
            params.push(serde_json::to_string(scope.values)?);
            predicates.push(format!(
                "(json_type(attributes_json, ?{p}) = 'text' \
                 AND json_extract(attributes_json, ?{p}) IN (SELECT value FROM json_each(?{v})))",
                p = params.len() - 1,
                v = params.len(),
            ));
        }

        for (attr, wanted) in &self.attributes {
            params.push(json_path(attr));
            params.push(wanted.clone());
            let (p, v) = (params.len() - 1, params.len());
            let mut predicate = format!(
                "(json_type(attributes_json, ?{p}) = 'text' AND json_extract(attributes_json, ?{p}) = ?{v})",
                p = p,
                v = v,
            );
            if wanted == EMPTY_VALUE || wanted.is_empty() {
                predicate = format!(
                    "({} OR json_type(attributes_json, ?{p}) = 'null' \
                     OR (json_type(attributes_json, ?{p}) = 'text' AND json_extract(attributes_json, ?{p}) = ''))",
                    predicate,
                    p = p,
                );
            }
            predicates.push(predicate);
        }

        let mut condition = "entity_type = ?1".to_string();
        if !predicates.is_empty() {
            // json_type raises on unreadable JSON; such rows have no attributes
            condition.push_str(&format!(
                " AND CASE WHEN json_valid(attributes_json) THEN ({}) ELSE 0 END",
                predicates.join(" AND ")
            ));
        }
        Ok((condition, params))
    }
}

fn json_path(attribute: &str) -> String {
    format!("$.\"{}\"", attribute)
}

fn parse_year(key: &str, value: &str) -> Result<i32> {
    value
        .parse()
        .map_err(|_| ProsographError::InvalidInput(format!("{} must be a year, got '{}'", key, value)))
}

type EntityRow = (i64, String, String, Option<String>, Option<String>);

/// Read access to stored entities, plus writes used by loaders and tests.
#[derive(Clone)]
pub struct EntityStore {
    db: Db,
    catalog: Arc<EntityCatalog>,
}

impl EntityStore {
    pub fn new(db: Db, catalog: Arc<EntityCatalog>) -> Self {
        Self { db, catalog }
    }

    pub fn catalog(&self) -> &EntityCatalog {
        &self.catalog
    }

    /// Insert or replace an entity.
    pub async fn upsert(&self, entity: &Entity) -> Result<()> {
        let id = entity.id;
        let entity_type = entity.entity_type.as_str();
        let attributes = serde_json::to_string(&entity.attributes)?;
        let start = entity.start_date.as_ref().map(|d| d.written.clone());
        let end = entity.end_date.as_ref().map(|d| d.written.clone());

        self.db
            .with_connection(move |conn| {
                conn.execute(
                    "INSERT INTO entities (id, entity_type, attributes_json, start_date_written, end_date_written) \
                     VALUES (?1, ?2, ?3, ?4, ?5) \
                     ON CONFLICT(id) DO UPDATE SET \
                        entity_type = excluded.entity_type, \
                        attributes_json = excluded.attributes_json, \
                        start_date_written = excluded.start_date_written, \
                        end_date_written = excluded.end_date_written",
                    params![id, entity_type, attributes, start, end],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn get(&self, key: EntityRef) -> Result<Option<Entity>> {
        let rows = self
            .db
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, entity_type, attributes_json, start_date_written, end_date_written \
                     FROM entities WHERE id = ?1 AND entity_type = ?2",
                )?;
                let rows = stmt
                    .query_map(params![key.id, key.entity_type.as_str()], read_row)?
                    .collect::<std::result::Result<Vec<EntityRow>, rusqlite::Error>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter().next().map(entity_from_row).transpose()
    }

    /// Entities of one type passing the filter and the type's default scope,
    /// ordered by display name then id. Scope and categorical matches are
    /// narrowed in SQL before rows are decoded.
    pub async fn list(&self, entity_type: EntityType, filter: &EntityFilter) -> Result<Vec<Entity>> {
        let shape = self.catalog.shape(entity_type)?;
        let (condition, sql_params) = filter.sql_condition(shape)?;
        let query = format!(
            "SELECT id, entity_type, attributes_json, start_date_written, end_date_written \
             FROM entities WHERE {} ORDER BY id",
            condition
        );

        let rows = self
            .db
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(&query)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(sql_params.iter()), read_row)?
                    .collect::<std::result::Result<Vec<EntityRow>, rusqlite::Error>>()?;
                Ok(rows)
            })
            .await?;

        let mut entities = Vec::with_capacity(rows.len());
        for row in rows {
            let entity = entity_from_row(row)?;
            if filter.matches(shape, &entity) {
                entities.push(entity);
            }
        }

        let mut keyed: Vec<(String, Entity)> = entities
            .into_iter()
            .map(|e| (shape.naming.render(&e).to_lowercase(), e))
            .collect();
        keyed.sort_by(|(a_name, a), (b_name, b)| a_name.cmp(b_name).then(a.id.cmp(&b.id)));
        Ok(keyed.into_iter().map(|(_, e)| e).collect())
    }

    /// Display names for the given ids of one type. Ids that no longer
    /// resolve are absent from the map.
    pub async fn labels(&self, entity_type: EntityType, ids: &[i64]) -> Result<HashMap<i64, String>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let naming = self.catalog.shape(entity_type)?.naming;
        let id_param = id_set_param(ids)?;

        let rows = self
            .db
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, entity_type, attributes_json, start_date_written, end_date_written \
                     FROM entities \
                     WHERE entity_type = ?1 AND id IN (SELECT value FROM json_each(?2))",
                )?;
                let rows = stmt
                    .query_map(params![entity_type.as_str(), id_param], read_row)?
                    .collect::<std::result::Result<Vec<EntityRow>, rusqlite::Error>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|row| {
                let entity = entity_from_row(row)?;
                Ok((entity.id, naming.render(&entity)))
            })
            .collect()
    }
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntityRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn entity_from_row(row: EntityRow) -> Result<Entity> {
    let (id, entity_type, attributes_json, start, end) = row;
    let entity_type: EntityType = entity_type.parse()?;

    let attributes = match serde_json::from_str::<Value>(&attributes_json) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            log::warn!("Entity {} has unreadable attributes; treating them as absent", id);
            Map::new()
        }
    };

    Ok(Entity {
        id,
        entity_type,
        attributes,
        start_date: start.as_deref().map(FuzzyDate::parse),
        end_date: end.as_deref().map(FuzzyDate::parse),
    })
}
