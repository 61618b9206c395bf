//! Relation store adapter over the `relations` table.
//!
//! This is the only place that turns typed endpoint keys into SQL. Every
//! lookup is keyed by an id set so callers never issue per-entity queries.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::Arc;

use rusqlite::{params, Connection};

use super::{Direction, DirectedRelation, Relation, RelationKind, RelationRegistry};
use crate::catalog::{EntityRef, EntityType, FuzzyDate};
use crate::db::{id_set_param, Db};
use crate::error::{ProsographError, Result};

/// A relation to be written.
#[derive(Debug, Clone)]
pub struct NewRelation {
    pub kind: String,
    pub subject: EntityRef,
    pub object: EntityRef,
    pub start: Option<String>,
    pub end: Option<String>,
    pub notes: Option<String>,
}

impl NewRelation {
    pub fn new(kind: &str, subject: EntityRef, object: EntityRef) -> Self {
        Self {
            kind: kind.to_string(),
            subject,
            object,
            start: None,
            end: None,
            notes: None,
        }
    }

    pub fn with_start(mut self, written: &str) -> Self {
        self.start = Some(written.to_string());
        self
    }

    pub fn with_end(mut self, written: &str) -> Self {
        self.end = Some(written.to_string());
        self
    }

    pub fn with_notes(mut self, notes: &str) -> Self {
        self.notes = Some(notes.to_string());
        self
    }
}

/// Raw row before endpoint types and dates are interpreted.
type RelationRow = (
    i64,
    String,
    String,
    i64,
    String,
    i64,
    Option<String>,
    Option<String>,
    Option<String>,
);

const RELATION_COLUMNS: &str = "id, kind, subject_type, subject_id, object_type, object_id, \
     start_date_written, end_date_written, notes";

/// Read-side adapter over stored relations, plus validated writes.
#[derive(Clone)]
pub struct RelationStore {
    db: Db,
    registry: Arc<RelationRegistry>,
}

impl RelationStore {
    pub fn new(db: Db, registry: Arc<RelationRegistry>) -> Self {
        Self { db, registry }
    }

    pub fn registry(&self) -> &RelationRegistry {
        &self.registry
    }

    /// Insert a relation after checking its endpoints against the kind.
    pub async fn insert(&self, relation: NewRelation) -> Result<i64> {
        let kind = self.registry.lookup(&relation.kind)?;
        check_endpoints(kind, relation.subject.entity_type, relation.object.entity_type)?;

        self.db
            .with_connection(move |conn| {
                conn.execute(
                    "INSERT INTO relations (kind, subject_type, subject_id, object_type, object_id, \
                     start_date_written, end_date_written, notes) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        relation.kind,
                        relation.subject.entity_type.as_str(),
                        relation.subject.id,
                        relation.object.entity_type.as_str(),
                        relation.object.id,
                        relation.start,
                        relation.end,
                        relation.notes,
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
    }

    /// Relations where the given ids are the subject (`Forward`) or the object
    /// (`Reverse`), viewed from that side.
    pub async fn relations_from(&self, ids: &[i64], direction: Direction) -> Result<Vec<DirectedRelation>> {
        self.fetch_directed(ids, direction, None).await
    }

    /// Every relation touching one entity, forward ones first.
    pub async fn relations_of(&self, entity: EntityRef) -> Result<Vec<DirectedRelation>> {
        let mut relations = self
            .fetch_directed(&[entity.id], Direction::Forward, Some(entity.entity_type))
            .await?;
        relations.extend(
            self.fetch_directed(&[entity.id], Direction::Reverse, Some(entity.entity_type))
                .await?,
        );
        Ok(relations)
    }

    /// `(base id, other id)` pairs for relations of the given kinds that touch
    /// `base_ids` on either side. Stored direction is normalized away.
    ///
    /// Rows are narrowed by endpoint types only; every row read is checked
    /// against the registry, so an unregistered kind or a row whose endpoints
    /// contradict its kind fails the call instead of vanishing from the result.
    pub async fn relations_between_sets(
        &self,
        base_type: EntityType,
        base_ids: &[i64],
        kinds: &[&RelationKind],
    ) -> Result<Vec<(i64, i64)>> {
        if base_ids.is_empty() || kinds.is_empty() {
            return Ok(Vec::new());
        }

        let mut other_types: Vec<&str> = kinds
            .iter()
            .filter_map(|k| k.other_type(base_type))
            .map(|t| t.as_str())
            .collect();
        other_types.sort_unstable();
        other_types.dedup();
        let other_types = serde_json::to_string(&other_types)?;
        let ids = id_set_param(base_ids)?;

        let (forward, reverse) = self
            .db
            .with_connection(move |conn| {
                let forward = endpoint_rows(conn, Direction::Forward, base_type, Some(other_types.as_str()), &ids)?;
                let reverse = endpoint_rows(conn, Direction::Reverse, base_type, Some(other_types.as_str()), &ids)?;
                Ok((forward, reverse))
            })
            .await?;

        let mut pairs = Vec::with_capacity(forward.len() + reverse.len());
        for (direction, rows) in [(Direction::Forward, forward), (Direction::Reverse, reverse)] {
            for row in rows {
                let kind = self.checked_kind(base_type, direction, &row)?;
                if kinds.iter().any(|k| k.id == kind.id) {
                    pairs.push((row.this_id, row.other_id));
                }
            }
        }
        Ok(pairs)
    }

    /// Sorted, distinct neighbor ids of each entity across every relation
    /// touching it. One bulk pass per entity type; nothing is kept between
    /// calls, so every call sees the relations as currently stored.
    pub async fn neighbor_ids(&self, entities: &[EntityRef]) -> Result<HashMap<EntityRef, Vec<i64>>> {
        let mut by_type: BTreeMap<EntityType, Vec<i64>> = BTreeMap::new();
        for entity in entities {
            by_type.entry(entity.entity_type).or_default().push(entity.id);
        }

        let mut result = HashMap::with_capacity(entities.len());
        for (entity_type, ids) in by_type {
            let id_param = id_set_param(&ids)?;
            let (forward, reverse) = self
                .db
                .with_connection(move |conn| {
                    let forward = endpoint_rows(conn, Direction::Forward, entity_type, None, &id_param)?;
                    let reverse = endpoint_rows(conn, Direction::Reverse, entity_type, None, &id_param)?;
                    Ok((forward, reverse))
                })
                .await?;

            let mut grouped: BTreeMap<i64, BTreeSet<i64>> =
                ids.iter().map(|&id| (id, BTreeSet::new())).collect();
            for (direction, rows) in [(Direction::Forward, forward), (Direction::Reverse, reverse)] {
                for row in rows {
                    self.checked_kind(entity_type, direction, &row)?;
                    grouped.entry(row.this_id).or_default().insert(row.other_id);
                }
            }

            for (id, neighbors) in grouped {
                result.insert(EntityRef::new(entity_type, id), neighbors.into_iter().collect());
            }
        }

        Ok(result)
    }

    /// Fail when stored relations use kinds the registry does not know, or
    /// connect endpoint types their kind does not declare. Returns the number
    /// of distinct stored kinds.
    pub async fn check_stored_kinds(&self) -> Result<usize> {
        let stored: Vec<(String, String, String)> = self
            .db
            .with_connection(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT DISTINCT kind, subject_type, object_type FROM relations \
                     ORDER BY kind, subject_type, object_type",
                )?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
                Ok(rows)
            })
            .await?;

        let mut unknown: Vec<&str> = stored
            .iter()
            .map(|(kind, _, _)| kind.as_str())
            .filter(|kind| self.registry.lookup(kind).is_err())
            .collect();
        unknown.dedup();
        if !unknown.is_empty() {
            return Err(ProsographError::UnknownRelationKind(unknown.join(", ")));
        }

        let mut kinds = BTreeSet::new();
        for (kind, subject_type, object_type) in &stored {
            let kind = self.registry.lookup(kind)?;
            check_endpoints(kind, subject_type.parse()?, object_type.parse()?)?;
            kinds.insert(kind.id);
        }
        Ok(kinds.len())
    }

    /// Registered kind of a row read from `this_type`'s side, with its
    /// endpoints checked against the kind's declared types.
    fn checked_kind(&self, this_type: EntityType, direction: Direction, row: &EndpointRow) -> Result<&RelationKind> {
        let kind = self.registry.lookup(&row.kind)?;
        let other_type = EntityType::from_str(&row.other_type)?;
        match direction {
            Direction::Forward => check_endpoints(kind, this_type, other_type)?,
            Direction::Reverse => check_endpoints(kind, other_type, this_type)?,
        }
        Ok(kind)
    }

    async fn fetch_directed(
        &self,
        ids: &[i64],
        direction: Direction,
        entity_type: Option<EntityType>,
    ) -> Result<Vec<DirectedRelation>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let side = side_prefix(direction);
        let query = format!(
            "SELECT {columns} FROM relations \
             WHERE {side}_id IN (SELECT value FROM json_each(?1)) \
             AND (?2 IS NULL OR {side}_type = ?2) \
             ORDER BY id",
            columns = RELATION_COLUMNS,
            side = side,
        );
        let id_param = id_set_param(ids)?;
        let type_param = entity_type.map(|t| t.as_str());

        let rows: Vec<RelationRow> = self
            .db
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(&query)?;
                let rows = stmt
                    .query_map(params![id_param, type_param], |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                            row.get(6)?,
                            row.get(7)?,
                            row.get(8)?,
                        ))
                    })?
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|row| {
                let relation = self.relation_from_row(row)?;
                Ok(match direction {
                    Direction::Forward => relation.as_subject(),
                    Direction::Reverse => relation.as_object(),
                })
            })
            .collect()
    }

    fn relation_from_row(&self, row: RelationRow) -> Result<Relation> {
        let (id, kind, subject_type, subject_id, object_type, object_id, start, end, notes) = row;
        let subject = EntityRef::new(EntityType::from_str(&subject_type)?, subject_id);
        let object = EntityRef::new(EntityType::from_str(&object_type)?, object_id);
        // Stored kinds must still be registered and match their endpoints
        check_endpoints(self.registry.lookup(&kind)?, subject.entity_type, object.entity_type)?;
        Ok(Relation {
            id,
            kind,
            subject,
            object,
            start: start.as_deref().map(FuzzyDate::parse),
            end: end.as_deref().map(FuzzyDate::parse),
            notes,
        })
    }
}

fn check_endpoints(kind: &RelationKind, subject_type: EntityType, object_type: EntityType) -> Result<()> {
    if kind.subject_type != subject_type || kind.object_type != object_type {
        return Err(ProsographError::RelationTypeMismatch {
            kind: kind.id.to_string(),
            expected: format!("{} -> {}", kind.subject_type, kind.object_type),
            actual: format!("{} -> {}", subject_type, object_type),
        });
    }
    Ok(())
}

fn side_prefix(direction: Direction) -> &'static str {
    match direction {
        Direction::Forward => "subject",
        Direction::Reverse => "object",
    }
}

/// One stored relation seen from the side given by the query direction.
#[derive(Debug)]
struct EndpointRow {
    kind: String,
    this_id: i64,
    other_type: String,
    other_id: i64,
}

/// Rows where `this` is on the side given by `direction`, optionally narrowed
/// to a JSON array of types for the opposite endpoint.
fn endpoint_rows(
    conn: &Connection,
    direction: Direction,
    entity_type: EntityType,
    other_types_json: Option<&str>,
    ids_json: &str,
) -> Result<Vec<EndpointRow>> {
    let (this, other) = match direction {
        Direction::Forward => ("subject", "object"),
        Direction::Reverse => ("object", "subject"),
    };
    let query = format!(
        "SELECT kind, {this}_id, {other}_type, {other}_id FROM relations \
         WHERE {this}_type = ?1 \
         AND {this}_id IN (SELECT value FROM json_each(?2)) \
         AND (?3 IS NULL OR {other}_type IN (SELECT value FROM json_each(?3)))",
        this = this,
        other = other,
    );
    let mut stmt = conn.prepare_cached(&query)?;
    let rows = stmt
        .query_map(params![entity_type.as_str(), ids_json, other_types_json], |row| {
            Ok(EndpointRow {
                kind: row.get(0)?,
                this_id: row.get(1)?,
                other_type: row.get(2)?,
                other_id: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::migrated_db;
    use tempfile::TempDir;

    fn person(id: i64) -> EntityRef {
        EntityRef::new(EntityType::Person, id)
    }

    fn place(id: i64) -> EntityRef {
        EntityRef::new(EntityType::Place, id)
    }

    fn institution(id: i64) -> EntityRef {
        EntityRef::new(EntityType::Institution, id)
    }

    async fn setup() -> (RelationStore, TempDir) {
        let (db, temp) = migrated_db().await;
        let registry = Arc::new(RelationRegistry::sicprod().unwrap());
        let store = RelationStore::new(db, registry);
        // 1 -> 10 (bewohnt), 1 -> 5 twice (two kinds), 2 -> 1 (ist_kind_von)
        store.insert(NewRelation::new("bewohnt", person(1), place(10)).with_start("1490")).await.unwrap();
        store.insert(NewRelation::new("ist_mitglied_von", person(1), institution(5))).await.unwrap();
        store.insert(NewRelation::new("ist_taetig_an", person(1), institution(5))).await.unwrap();
        store.insert(NewRelation::new("ist_kind_von", person(2), person(1)).with_notes("laut Urkunde")).await.unwrap();
        (store, temp)
    }

    #[tokio::test]
    async fn test_insert_rejects_wrong_endpoint_types() {
        let (store, _temp) = setup().await;
        let err = store
            .insert(NewRelation::new("bewohnt", place(10), person(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, ProsographError::RelationTypeMismatch { .. }));

        let err = store
            .insert(NewRelation::new("wohnt_in", person(1), place(10)))
            .await
            .unwrap_err();
        assert!(matches!(err, ProsographError::UnknownRelationKind(_)));
    }

    #[tokio::test]
    async fn test_relations_from_both_directions() {
        let (store, _temp) = setup().await;

        let forward = store.relations_from(&[1], Direction::Forward).await.unwrap();
        assert_eq!(forward.len(), 3);
        assert!(forward.iter().all(|r| r.this() == person(1)));
        assert_eq!(forward[0].other(), place(10));
        assert_eq!(forward[0].relation.start.as_ref().unwrap().year, Some(1490));

        let reverse = store.relations_from(&[1], Direction::Reverse).await.unwrap();
        assert_eq!(reverse.len(), 1);
        assert_eq!(reverse[0].other(), person(2));
        assert_eq!(reverse[0].display_name(store.registry()).unwrap(), "ist Elternteil von");
        assert_eq!(reverse[0].relation.notes.as_deref(), Some("laut Urkunde"));
    }

    #[tokio::test]
    async fn test_unknown_ids_yield_nothing() {
        let (store, _temp) = setup().await;
        assert!(store.relations_from(&[999], Direction::Forward).await.unwrap().is_empty());
        assert!(store.relations_from(&[], Direction::Reverse).await.unwrap().is_empty());
        assert!(store.relations_of(place(999)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_relations_of_uses_typed_key() {
        let (store, _temp) = setup().await;
        let relations = store.relations_of(place(10)).await.unwrap();
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].direction, Direction::Reverse);

        // Same id under a different type has no relations
        assert!(store.relations_of(EntityRef::new(EntityType::Event, 10)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_relations_between_sets_normalizes_direction() {
        let (store, _temp) = setup().await;
        let registry = store.registry().clone();

        let person_person = registry.kinds_between(EntityType::Person, EntityType::Person);
        let mut pairs = store
            .relations_between_sets(EntityType::Person, &[1, 2], &person_person)
            .await
            .unwrap();
        pairs.sort();
        // The child relation is seen from both of its endpoints
        assert_eq!(pairs, vec![(1, 2), (2, 1)]);

        let person_institution = registry.kinds_between(EntityType::Person, EntityType::Institution);
        let pairs = store
            .relations_between_sets(EntityType::Person, &[1], &person_institution)
            .await
            .unwrap();
        assert_eq!(pairs, vec![(1, 5), (1, 5)]);

        let pairs = store
            .relations_between_sets(EntityType::Institution, &[5], &person_institution)
            .await
            .unwrap();
        assert_eq!(pairs, vec![(5, 1), (5, 1)]);
    }

    #[tokio::test]
    async fn test_neighbor_ids_sorted_and_distinct() {
        let (store, _temp) = setup().await;
        let neighbors = store
            .neighbor_ids(&[person(1), person(2), place(10), place(77)])
            .await
            .unwrap();

        assert_eq!(neighbors[&person(1)], vec![2, 5, 10]);
        assert_eq!(neighbors[&person(2)], vec![1]);
        assert_eq!(neighbors[&place(10)], vec![1]);
        assert!(neighbors[&place(77)].is_empty());
    }

    #[tokio::test]
    async fn test_neighbor_ids_see_writes_from_another_store() {
        let (store, _temp) = setup().await;
        let before = store.neighbor_ids(&[person(2), place(10)]).await.unwrap();
        assert_eq!(before[&person(2)], vec![1]);

        // Separate writer over the same database file
        let writer = RelationStore::new(store.db.clone(), Arc::new(RelationRegistry::sicprod().unwrap()));
        writer.insert(NewRelation::new("besitzt", person(2), place(10))).await.unwrap();

        let after = store.neighbor_ids(&[person(2), place(10)]).await.unwrap();
        assert_eq!(after[&person(2)], vec![1, 10]);
        assert_eq!(after[&place(10)], vec![1, 2]);
    }

    async fn insert_raw(store: &RelationStore, sql: &'static str) {
        store
            .db
            .with_connection(move |conn| {
                conn.execute(sql, [])?;
                Ok(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unregistered_stored_kind_fails_loudly() {
        let (store, _temp) = setup().await;
        insert_raw(
            &store,
            "INSERT INTO relations (kind, subject_type, subject_id, object_type, object_id) \
             VALUES ('abgeschafft', 'person', 3, 'place', 10)",
        )
        .await;

        let err = store.relations_from(&[3], Direction::Forward).await.unwrap_err();
        assert!(err.is_configuration());

        let kinds = store.registry().kinds_between(EntityType::Person, EntityType::Place);
        let err = store
            .relations_between_sets(EntityType::Person, &[3], &kinds)
            .await
            .unwrap_err();
        assert!(matches!(err, ProsographError::UnknownRelationKind(ref kind) if kind == "abgeschafft"));

        // Seen from the place side as well
        let err = store.neighbor_ids(&[place(10)]).await.unwrap_err();
        assert!(err.is_configuration());

        let err = store.check_stored_kinds().await.unwrap_err();
        assert!(matches!(err, ProsographError::UnknownRelationKind(ref kinds) if kinds == "abgeschafft"));
    }

    #[tokio::test]
    async fn test_stored_endpoints_contradicting_kind_fail_loudly() {
        let (store, _temp) = setup().await;
        // bewohnt is person -> place; this row is stored the other way round
        insert_raw(
            &store,
            "INSERT INTO relations (kind, subject_type, subject_id, object_type, object_id) \
             VALUES ('bewohnt', 'place', 11, 'person', 3)",
        )
        .await;

        let err = store.neighbor_ids(&[person(3)]).await.unwrap_err();
        assert!(matches!(err, ProsographError::RelationTypeMismatch { .. }));

        let kinds = store.registry().kinds_between(EntityType::Place, EntityType::Person);
        let err = store
            .relations_between_sets(EntityType::Place, &[11], &kinds)
            .await
            .unwrap_err();
        assert!(err.is_configuration());

        assert!(store.relations_of(place(11)).await.unwrap_err().is_configuration());
        assert!(matches!(
            store.check_stored_kinds().await.unwrap_err(),
            ProsographError::RelationTypeMismatch { .. }
        ));

        // Entities the bad row does not touch are unaffected
        assert_eq!(store.neighbor_ids(&[person(2)]).await.unwrap()[&person(2)], vec![1]);
    }

    #[tokio::test]
    async fn test_check_stored_kinds_counts_registered() {
        let (store, _temp) = setup().await;
        assert_eq!(store.check_stored_kinds().await.unwrap(), 4);
    }
}
