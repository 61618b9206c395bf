//! Network projection: every visible entity as a node with its neighbor ids.

use serde::Serialize;

use crate::catalog::{Entity, EntityRef, EntityType};
use crate::entities::{EntityFilter, EntityStore};
use crate::error::Result;
use crate::relations::RelationStore;

/// One node of the exported graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkNode {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    /// Sorted, distinct ids connected by any relation in either direction.
    pub related_to: Vec<i64>,
}

/// Builds the network from the entity source and the relation store.
#[derive(Clone)]
pub struct NetworkBuilder {
    entities: EntityStore,
    relations: RelationStore,
}

impl NetworkBuilder {
    pub fn new(entities: EntityStore, relations: RelationStore) -> Self {
        Self { entities, relations }
    }

    /// Nodes for every listed entity of the given types (all catalog types
    /// when empty), honouring the same default scopes as the list endpoints.
    pub async fn build(&self, types: &[EntityType]) -> Result<Vec<NetworkNode>> {
        let types = if types.is_empty() {
            self.entities.catalog().entity_types()
        } else {
            types.to_vec()
        };

        let mut all = Vec::new();
        for entity_type in types {
            all.extend(self.entities.list(entity_type, &EntityFilter::default()).await?);
        }
        self.project(&all).await
    }

    /// Nodes for an already selected collection, ordered by id. Neighbors
    /// come from one bulk lookup over the whole collection, made fresh for
    /// every projection.
    pub async fn project(&self, entities: &[Entity]) -> Result<Vec<NetworkNode>> {
        let keys: Vec<EntityRef> = entities.iter().map(Entity::key).collect();
        let mut neighbors = self.relations.neighbor_ids(&keys).await?;
        let catalog = self.entities.catalog();

        let mut nodes = Vec::with_capacity(entities.len());
        for entity in entities {
            nodes.push(NetworkNode {
                id: entity.id,
                name: catalog.display_name(entity)?,
                entity_type: entity.entity_type,
                related_to: neighbors.remove(&entity.key()).unwrap_or_default(),
            });
        }
        nodes.sort_by_key(|node| node.id);

        log::info!("Projected network with {} nodes", nodes.len());
        Ok(nodes)
    }
}
