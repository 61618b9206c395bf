//! Single pass over the base set: categorical buckets and date bounds.

use std::collections::BTreeMap;

use super::{FacetBucket, EMPTY_BUCKET};
use crate::catalog::{AttributeValue, Entity, EntityShape};

/// Result of scanning the base set once.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct AttributeScan {
    pub categorical: BTreeMap<String, BTreeMap<String, FacetBucket>>,
    pub start: Option<i32>,
    pub end: Option<i32>,
}

/// Bucket every declared categorical attribute and track the earliest start
/// year and latest end year. Every declared attribute gets an entry, even
/// when the base set is empty.
pub(crate) fn scan_attributes<'a>(
    shape: &EntityShape,
    entities: impl IntoIterator<Item = &'a Entity>,
) -> AttributeScan {
    let mut scan = AttributeScan {
        categorical: shape
            .categorical
            .iter()
            .map(|attr| (attr.name.to_string(), BTreeMap::new()))
            .collect(),
        start: None,
        end: None,
    };

    for entity in entities {
        for attr in shape.categorical {
            let (key, name) = match entity.attribute(attr.name) {
                AttributeValue::Text(value) => (
                    value.to_string(),
                    attr.choice_label(value).unwrap_or(value).to_string(),
                ),
                AttributeValue::Blank => (EMPTY_BUCKET.to_string(), String::new()),
                AttributeValue::Missing => {
                    log::debug!("Entity {} has no '{}' attribute; skipped for that facet", entity.id, attr.name);
                    continue;
                }
                AttributeValue::Malformed(value) => {
                    log::debug!("Entity {} has malformed '{}' value {}; skipped for that facet", entity.id, attr.name, value);
                    continue;
                }
            };

            if let Some(buckets) = scan.categorical.get_mut(attr.name) {
                buckets
                    .entry(key)
                    .or_insert_with(|| FacetBucket { name, count: 0 })
                    .count += 1;
            }
        }

        // None means "not yet constrained": the first observed year wins
        if let Some(year) = entity.start_year() {
            scan.start = Some(scan.start.map_or(year, |current| current.min(year)));
        }
        if let Some(year) = entity.end_year() {
            scan.end = Some(scan.end.map_or(year, |current| current.max(year)));
        }
    }

    scan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{EntityCatalog, EntityType};
    use serde_json::json;

    fn person(id: i64, gender: serde_json::Value) -> Entity {
        Entity::new(id, EntityType::Person).with_attribute("gender", gender)
    }

    #[test]
    fn test_buckets_and_empty_key() {
        let catalog = EntityCatalog::sicprod();
        let shape = catalog.shape(EntityType::Person).unwrap();
        let entities = vec![
            person(1, json!("männlich")),
            person(2, json!("weiblich")),
            person(3, json!("")),
            person(4, json!(null)),
            person(5, json!("männlich")),
        ];

        let scan = scan_attributes(shape, &entities);
        let gender = &scan.categorical["gender"];
        assert_eq!(gender["männlich"], FacetBucket { name: "männlich".into(), count: 2 });
        assert_eq!(gender["weiblich"].count, 1);
        assert_eq!(gender[EMPTY_BUCKET], FacetBucket { name: String::new(), count: 2 });
        let total: usize = gender.values().map(|b| b.count).sum();
        assert_eq!(total, entities.len());
    }

    #[test]
    fn test_malformed_and_missing_values_skip_only_that_facet() {
        let catalog = EntityCatalog::sicprod();
        let shape = catalog.shape(EntityType::Salary).unwrap();
        let entities = vec![
            Entity::new(1, EntityType::Salary)
                .with_attribute("typ", json!(42))
                .with_attribute("repetitionType", json!("einfach")),
            Entity::new(2, EntityType::Salary).with_attribute("typ", json!("Sold")),
        ];

        let scan = scan_attributes(shape, &entities);
        assert_eq!(scan.categorical["typ"].len(), 1);
        assert_eq!(scan.categorical["typ"]["Sold"].count, 1);
        assert_eq!(scan.categorical["repetitionType"]["einfach"].count, 1);
    }

    #[test]
    fn test_date_bounds_ignore_missing_years() {
        let catalog = EntityCatalog::sicprod();
        let shape = catalog.shape(EntityType::Event).unwrap();
        let entities = vec![
            Entity::new(1, EntityType::Event).with_start_date("1502").with_end_date("1503"),
            Entity::new(2, EntityType::Event).with_start_date("ca. 1480"),
            Entity::new(3, EntityType::Event).with_start_date("unbekannt").with_end_date("1519-01-12"),
            Entity::new(4, EntityType::Event),
        ];

        let scan = scan_attributes(shape, &entities);
        assert_eq!(scan.start, Some(1480));
        assert_eq!(scan.end, Some(1519));
    }

    #[test]
    fn test_first_year_wins_over_sentinels() {
        let catalog = EntityCatalog::sicprod();
        let shape = catalog.shape(EntityType::Event).unwrap();
        // Years outside any fixed default range still come through
        let entities = vec![Entity::new(1, EntityType::Event).with_start_date("1700").with_end_date("1250")];
        let scan = scan_attributes(shape, &entities);
        assert_eq!(scan.start, Some(1700));
        assert_eq!(scan.end, Some(1250));
    }

    #[test]
    fn test_empty_base_set() {
        let catalog = EntityCatalog::sicprod();
        let scan = scan_attributes(catalog.shape(EntityType::Person).unwrap(), &[]);
        assert!(scan.categorical["gender"].is_empty());
        assert_eq!(scan.start, None);
        assert_eq!(scan.end, None);

        let scan = scan_attributes(catalog.shape(EntityType::Function).unwrap(), &[]);
        assert!(scan.categorical.is_empty());
    }
}
