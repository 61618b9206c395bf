//! Facet aggregation over a filtered base set of one entity type.
//!
//! A summary holds one categorical facet per declared attribute, the
//! `start`/`end` year bounds and one `relation_<type>` facet per related
//! type that actually has links into the base set.

mod categorical;
mod relation_targets;

use std::collections::BTreeMap;

use futures_util::future::try_join_all;
use serde::{Serialize, Serializer};

use crate::catalog::{Entity, EntityType};
use crate::entities::EntityStore;
use crate::error::Result;
use crate::relations::RelationStore;

/// Bucket key used for blank or null categorical values.
pub const EMPTY_BUCKET: &str = "empty";

/// Label and count of one facet value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FacetBucket {
    pub name: String,
    pub count: usize,
}

/// Aggregate facets of one base set. Serializes as a single JSON object with
/// alphabetically sorted keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FacetSummary {
    pub categorical: BTreeMap<String, BTreeMap<String, FacetBucket>>,
    pub start: Option<i32>,
    pub end: Option<i32>,
    pub related: BTreeMap<EntityType, BTreeMap<i64, FacetBucket>>,
}

impl FacetSummary {
    pub fn relation_key(entity_type: EntityType) -> String {
        format!("relation_{}", entity_type)
    }

    pub fn relation(&self, entity_type: EntityType) -> Option<&BTreeMap<i64, FacetBucket>> {
        self.related.get(&entity_type)
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum FacetEntry<'a> {
    Values(&'a BTreeMap<String, FacetBucket>),
    Year(Option<i32>),
    Related(&'a BTreeMap<i64, FacetBucket>),
}

impl Serialize for FacetSummary {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut entries: BTreeMap<String, FacetEntry<'_>> = BTreeMap::new();
        for (attr, buckets) in &self.categorical {
            entries.insert(attr.clone(), FacetEntry::Values(buckets));
        }
        entries.insert("start".to_string(), FacetEntry::Year(self.start));
        entries.insert("end".to_string(), FacetEntry::Year(self.end));
        for (entity_type, buckets) in &self.related {
            entries.insert(Self::relation_key(*entity_type), FacetEntry::Related(buckets));
        }
        entries.serialize(serializer)
    }
}

/// Computes facet summaries from the entity and relation adapters.
///
/// Stateless apart from the adapters it holds; one engine serves any number
/// of concurrent requests.
#[derive(Clone)]
pub struct FacetEngine {
    entities: EntityStore,
    relations: RelationStore,
}

impl FacetEngine {
    pub fn new(entities: EntityStore, relations: RelationStore) -> Self {
        Self { entities, relations }
    }

    /// Facets over `base`, which must be the full filtered set before any
    /// pagination. Entities of another type are ignored.
    pub async fn compute(&self, base_type: EntityType, base: &[Entity]) -> Result<FacetSummary> {
        let shape = self.entities.catalog().shape(base_type)?;

        let (matching, foreign): (Vec<&Entity>, Vec<&Entity>) =
            base.iter().partition(|e| e.entity_type == base_type);
        if !foreign.is_empty() {
            log::warn!(
                "Ignoring {} entities not of type {} in facet base set",
                foreign.len(),
                base_type
            );
        }
        let scan = categorical::scan_attributes(shape, matching.iter().copied());

        let mut base_ids: Vec<i64> = matching.iter().map(|e| e.id).collect();
        base_ids.sort_unstable();
        base_ids.dedup();

        let mut related = BTreeMap::new();
        if !base_ids.is_empty() {
            let related_types = self.relations.registry().related_types(base_type);
            let pending = related_types.into_iter().map(|related_type| {
                let base_ids = &base_ids;
                async move {
                    let facet = relation_targets::relation_target_facet(
                        &self.entities,
                        &self.relations,
                        base_type,
                        base_ids,
                        related_type,
                    )
                    .await?;
                    Ok::<_, crate::error::ProsographError>((related_type, facet))
                }
            });

            for (related_type, facet) in try_join_all(pending).await? {
                if !facet.is_empty() {
                    related.insert(related_type, facet);
                }
            }
        }

        log::debug!(
            "Computed facets for {} {} entities ({} relation facets)",
            matching.len(),
            base_type,
            related.len()
        );

        Ok(FacetSummary {
            categorical: scan.categorical,
            start: scan.start,
            end: scan.end,
            related,
        })
    }
}
