//! JSON views of entities and relations as served by the API.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::catalog::{Entity, EntityCatalog, EntityType, FuzzyDate};
use crate::entities::EntityStore;
use crate::error::Result;
use crate::relations::{DirectedRelation, RelationRegistry};

/// List/detail representation of an entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityView {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub attributes: Map<String, Value>,
    pub start_date_written: Option<String>,
    pub end_date_written: Option<String>,
}

impl EntityView {
    pub fn new(catalog: &EntityCatalog, entity: Entity) -> Result<Self> {
        let name = catalog.display_name(&entity)?;
        Ok(Self {
            id: entity.id,
            name,
            entity_type: entity.entity_type,
            attributes: entity.attributes,
            start_date_written: entity.start_date.map(|d| d.written),
            end_date_written: entity.end_date.map(|d| d.written),
        })
    }
}

/// The far endpoint of a relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelatedEntity {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
}

/// A relation rendered from one of its endpoints.
///
/// Each fuzzy date is given as written plus the first and last day it can
/// stand for (`start_start_date`..`start_end_date` for the start).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationView {
    pub name: &'static str,
    pub to: RelatedEntity,
    pub start_date_written: Option<String>,
    pub end_date_written: Option<String>,
    pub start_start_date: Option<NaiveDate>,
    pub start_end_date: Option<NaiveDate>,
    pub end_start_date: Option<NaiveDate>,
    pub end_end_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Entity detail with its relations grouped by the other endpoint's type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityDetail {
    #[serde(flatten)]
    pub entity: EntityView,
    pub relations: BTreeMap<EntityType, Vec<RelationView>>,
}

/// Render directed relations, resolving every far endpoint's label with one
/// lookup per type. Relations pointing at entities that no longer exist are
/// dropped.
pub async fn relation_views(
    entities: &EntityStore,
    registry: &RelationRegistry,
    relations: Vec<DirectedRelation>,
) -> Result<Vec<RelationView>> {
    let mut wanted: BTreeMap<EntityType, Vec<i64>> = BTreeMap::new();
    for relation in &relations {
        let other = relation.other();
        wanted.entry(other.entity_type).or_default().push(other.id);
    }

    let mut labels: HashMap<EntityType, HashMap<i64, String>> = HashMap::new();
    for (entity_type, ids) in wanted {
        labels.insert(entity_type, entities.labels(entity_type, &ids).await?);
    }

    let mut views = Vec::with_capacity(relations.len());
    for relation in relations {
        let other = relation.other();
        let Some(name) = labels.get(&other.entity_type).and_then(|l| l.get(&other.id)) else {
            log::warn!(
                "Relation {} points to missing {} {}; not rendered",
                relation.relation.id,
                other.entity_type,
                other.id
            );
            continue;
        };

        let relation_name = relation.display_name(registry)?;
        let (start_date_written, start_start_date, start_end_date) = date_parts(relation.relation.start);
        let (end_date_written, end_start_date, end_end_date) = date_parts(relation.relation.end);
        views.push(RelationView {
            name: relation_name,
            to: RelatedEntity {
                id: other.id,
                name: name.clone(),
                entity_type: other.entity_type,
            },
            start_date_written,
            end_date_written,
            start_start_date,
            start_end_date,
            end_start_date,
            end_end_date,
            notes: relation.relation.notes,
        });
    }
    Ok(views)
}

fn date_parts(date: Option<FuzzyDate>) -> (Option<String>, Option<NaiveDate>, Option<NaiveDate>) {
    match date {
        Some(date) => (Some(date.written), date.from, date.to),
        None => (None, None, None),
    }
}

/// Group relation views by the type of their far endpoint, keeping order.
pub fn group_by_type(views: Vec<RelationView>) -> BTreeMap<EntityType, Vec<RelationView>> {
    let mut grouped: BTreeMap<EntityType, Vec<RelationView>> = BTreeMap::new();
    for view in views {
        grouped.entry(view.to.entity_type).or_default().push(view);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::EntityRef;
    use crate::db::test_support::migrated_db;
    use crate::relations::{NewRelation, RelationStore};
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_entity_view_json() {
        let catalog = EntityCatalog::sicprod();
        let entity = Entity::new(10, EntityType::Place)
            .with_attribute("label", json!("Hall in Tirol"))
            .with_attribute("type", json!("Stadt"))
            .with_start_date("ca. 1300");

        let json = serde_json::to_value(EntityView::new(&catalog, entity).unwrap()).unwrap();
        assert_eq!(
            json,
            json!({
                "id": 10,
                "name": "Hall in Tirol",
                "type": "place",
                "attributes": {"label": "Hall in Tirol", "type": "Stadt"},
                "start_date_written": "ca. 1300",
                "end_date_written": null
            })
        );
    }

    #[tokio::test]
    async fn test_relation_views_use_direction_names() {
        let (db, _temp) = migrated_db().await;
        let entities = EntityStore::new(db.clone(), Arc::new(EntityCatalog::sicprod()));
        let registry = Arc::new(RelationRegistry::sicprod().unwrap());
        let relations = RelationStore::new(db, registry.clone());

        entities
            .upsert(&Entity::new(1, EntityType::Person).with_attribute("name", json!("Fugger")))
            .await
            .unwrap();
        entities
            .upsert(&Entity::new(10, EntityType::Place).with_attribute("label", json!("Augsburg")))
            .await
            .unwrap();
        let person = EntityRef::new(EntityType::Person, 1);
        let place = EntityRef::new(EntityType::Place, 10);
        relations
            .insert(
                NewRelation::new("bewohnt", person, place)
                    .with_start("1480")
                    .with_end("3.5.1490")
                    .with_notes("laut Steuerbuch"),
            )
            .await
            .unwrap();
        // Dangling endpoint is skipped
        relations
            .insert(NewRelation::new("bewohnt", person, EntityRef::new(EntityType::Place, 99)))
            .await
            .unwrap();

        let from_person = relations.relations_of(person).await.unwrap();
        let views = relation_views(&entities, &registry, from_person).await.unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].name, "bewohnt");
        assert_eq!(views[0].to.name, "Augsburg");
        assert_eq!(views[0].start_date_written.as_deref(), Some("1480"));
        assert_eq!(views[0].notes.as_deref(), Some("laut Steuerbuch"));

        let json = serde_json::to_value(&views[0]).unwrap();
        assert_eq!(json["start_start_date"], json!("1480-01-01"));
        assert_eq!(json["start_end_date"], json!("1480-12-31"));
        assert_eq!(json["end_date_written"], json!("3.5.1490"));
        assert_eq!(json["end_start_date"], json!("1490-05-03"));
        assert_eq!(json["end_end_date"], json!("1490-05-03"));

        let from_place = relations.relations_of(place).await.unwrap();
        let views = relation_views(&entities, &registry, from_place).await.unwrap();
        assert_eq!(views[0].name, "hat als Bewohner");
        assert_eq!(views[0].to.entity_type, EntityType::Person);
        assert_eq!(views[0].start_start_date, NaiveDate::from_ymd_opt(1480, 1, 1));

        let grouped = serde_json::to_value(group_by_type(views)).unwrap();
        assert_eq!(grouped["person"][0]["to"], json!({"id": 1, "name": "Fugger", "type": "person"}));
    }
}
