//! Relation-target facets: per related entity, how many distinct base
//! entities are connected to it.

use std::collections::{BTreeMap, HashSet};

use super::FacetBucket;
use crate::catalog::EntityType;
use crate::entities::EntityStore;
use crate::error::Result;
use crate::relations::RelationStore;

/// Distinct base ids per related id. Parallel relations between the same
/// pair collapse to one.
pub(crate) fn distinct_counts(pairs: &[(i64, i64)]) -> BTreeMap<i64, usize> {
    let mut linked: BTreeMap<i64, HashSet<i64>> = BTreeMap::new();
    for &(base, related) in pairs {
        linked.entry(related).or_default().insert(base);
    }
    linked.into_iter().map(|(related, bases)| (related, bases.len())).collect()
}

/// Facet for one related type. Empty when nothing of that type is linked.
pub(crate) async fn relation_target_facet(
    entities: &EntityStore,
    relations: &RelationStore,
    base_type: EntityType,
    base_ids: &[i64],
    related_type: EntityType,
) -> Result<BTreeMap<i64, FacetBucket>> {
    let kinds = relations.registry().kinds_between(base_type, related_type);
    let pairs = relations
        .relations_between_sets(base_type, base_ids, &kinds)
        .await?;
    if pairs.is_empty() {
        return Ok(BTreeMap::new());
    }

    let counts = distinct_counts(&pairs);
    let related_ids: Vec<i64> = counts.keys().copied().collect();
    let labels = entities.labels(related_type, &related_ids).await?;

    let mut facet = BTreeMap::new();
    for (related_id, count) in counts {
        match labels.get(&related_id) {
            Some(name) => {
                facet.insert(related_id, FacetBucket { name: name.clone(), count });
            }
            None => log::warn!(
                "Relation from {} set points to missing {} {}; excluded from facets",
                base_type,
                related_type,
                related_id
            ),
        }
    }

    Ok(facet)
}
