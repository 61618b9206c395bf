//! Entity catalog: the closed set of entity types, their categorical
//! attributes and the rule that turns a record into a display name.

mod date;
mod entity;

pub use date::FuzzyDate;
pub use entity::{AttributeValue, Entity, EntityRef};

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ProsographError, Result};

/// Every entity kind the service knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Person,
    Function,
    Place,
    Institution,
    Event,
    Salary,
}

impl EntityType {
    pub const ALL: [EntityType; 6] = [
        EntityType::Person,
        EntityType::Function,
        EntityType::Place,
        EntityType::Institution,
        EntityType::Event,
        EntityType::Salary,
    ];

    /// Stable lowercase identifier used in storage, URLs and facet keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "person",
            EntityType::Function => "function",
            EntityType::Place => "place",
            EntityType::Institution => "institution",
            EntityType::Event => "event",
            EntityType::Salary => "salary",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = ProsographError;

    fn from_str(s: &str) -> Result<Self> {
        EntityType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ProsographError::UnknownEntityType(s.to_string()))
    }
}

/// A categorical attribute and its fixed `(value, label)` choice set.
#[derive(Debug, Clone, Copy)]
pub struct AttributeDescriptor {
    pub name: &'static str,
    pub choices: &'static [(&'static str, &'static str)],
}

impl AttributeDescriptor {
    pub fn choice_label(&self, value: &str) -> Option<&'static str> {
        self.choices
            .iter()
            .find(|(v, _)| *v == value)
            .map(|(_, label)| *label)
    }
}

/// How an entity's display name is derived from its attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingRule {
    /// `"first_name name"`, either part optional.
    FirstNameName,
    /// Dedicated `label` attribute.
    Label,
    /// Plain `name` attribute.
    Name,
}

impl NamingRule {
    pub fn render(&self, entity: &Entity) -> String {
        let name = match self {
            NamingRule::FirstNameName => {
                let parts: Vec<&str> = ["first_name", "name"]
                    .iter()
                    .filter_map(|attr| entity.text(attr))
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect();
                parts.join(" ")
            }
            NamingRule::Label => entity.text("label").unwrap_or_default().trim().to_string(),
            NamingRule::Name => entity.text("name").unwrap_or_default().trim().to_string(),
        };

        if name.is_empty() {
            format!("(ID: {})", entity.id)
        } else {
            name
        }
    }
}

/// Listing restricted to a subset of one attribute's values.
#[derive(Debug, Clone, Copy)]
pub struct DefaultScope {
    pub attribute: &'static str,
    pub values: &'static [&'static str],
}

/// Shape of one entity type.
#[derive(Debug, Clone)]
pub struct EntityShape {
    pub entity_type: EntityType,
    pub categorical: &'static [AttributeDescriptor],
    pub search_fields: &'static [&'static str],
    /// Free-text attributes filterable by case-insensitive substring.
    pub text_filters: &'static [&'static str],
    pub naming: NamingRule,
    pub default_scope: Option<DefaultScope>,
}

impl EntityShape {
    pub fn attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.categorical.iter().find(|a| a.name == name)
    }
}

const GENDER_CHOICES: &[(&str, &str)] = &[
    ("männlich", "männlich"),
    ("weiblich", "weiblich"),
    ("unbekannt", "unbekannt"),
];

const PLACE_TYPE_CHOICES: &[(&str, &str)] = &[
    ("Stadt", "Stadt"),
    ("Dorf/Nachbarschaft/Gemein/Siedlung/Weiler", "Dorf/Nachbarschaft/Gemein/Siedlung/Weiler"),
    ("Burg/Schloss", "Burg/Schloss"),
    ("Land/Herrschaftskomplex", "Land/Herrschaftskomplex"),
    ("Landschaft/Region", "Landschaft/Region"),
    ("Lehen", "Lehen"),
    ("Haus/Hof", "Haus/Hof"),
    ("Gericht", "Gericht"),
    ("Kloster", "Kloster"),
    ("Gewässer", "Gewässer"),
    ("Grundherrschaft", "Grundherrschaft"),
    ("Hofmark", "Hofmark"),
    ("Tal", "Tal"),
    ("Berg", "Berg"),
    ("Bergrevier", "Bergrevier"),
    ("Pflege", "Pflege"),
    ("(Land-)Vogtei", "(Land-)Vogtei"),
    ("Propstei", "Propstei"),
];

const INSTITUTION_TYPE_CHOICES: &[(&str, &str)] = &[
    ("Kanzlei", "Kanzlei"),
    ("Hofkapelle", "Hofkapelle"),
    ("Küche", "Küche"),
    ("(Dom-)Kapitel", "(Dom-)Kapitel"),
    ("Universität", "Universität"),
    ("Kloster", "Kloster"),
    ("Frauenzimmer", "Frauenzimmer"),
    ("Bistum", "Bistum"),
    ("Pfarrei", "Pfarrei"),
];

const EVENT_TYPE_CHOICES: &[(&str, &str)] = &[
    ("Hochzeit", "Hochzeit"),
    ("Landtag", "Landtag"),
    ("Fest/Turnier", "Fest/Turnier"),
    ("Schlacht", "Schlacht"),
    ("Gesandtschaft/Reise", "Gesandtschaft/Reise"),
    ("Taufe", "Taufe"),
    ("Amtseinsetzung", "Amtseinsetzung"),
    ("Reichstag", "Reichstag"),
];

const SALARY_TYP_CHOICES: &[(&str, &str)] = &[
    ("Sold", "Sold"),
    ("Zehrung", "Zehrung"),
    ("Provision", "Provision"),
    ("Kredit", "Kredit"),
    ("Sonstiges", "Sonstiges"),
    ("Burghut", "Burghut"),
    ("Botenlohn", "Botenlohn"),
];

const REPETITION_CHOICES: &[(&str, &str)] = &[
    ("einfach", "einfach"),
    ("wiederholend", "wiederholend"),
];

/// Registry of entity shapes, built once at startup and shared by reference.
#[derive(Debug, Clone)]
pub struct EntityCatalog {
    shapes: HashMap<EntityType, EntityShape>,
}

impl EntityCatalog {
    /// Build a catalog, rejecting duplicate registrations.
    pub fn new(shapes: Vec<EntityShape>) -> Result<Self> {
        let mut by_type = HashMap::with_capacity(shapes.len());
        for shape in shapes {
            let entity_type = shape.entity_type;
            if by_type.insert(entity_type, shape).is_some() {
                return Err(ProsographError::Config(format!(
                    "entity type {} registered twice",
                    entity_type
                )));
            }
        }
        Ok(Self { shapes: by_type })
    }

    /// The prosopography ontology: persons, functions, places, institutions,
    /// events and salaries.
    pub fn sicprod() -> Self {
        let shapes = vec![
            EntityShape {
                entity_type: EntityType::Person,
                categorical: &[AttributeDescriptor { name: "gender", choices: GENDER_CHOICES }],
                search_fields: &["first_name", "name", "alternative_label"],
                text_filters: &["status"],
                naming: NamingRule::FirstNameName,
                default_scope: None,
            },
            EntityShape {
                entity_type: EntityType::Function,
                categorical: &[],
                search_fields: &["name", "alternative_label"],
                text_filters: &[],
                naming: NamingRule::Name,
                default_scope: None,
            },
            EntityShape {
                entity_type: EntityType::Place,
                categorical: &[AttributeDescriptor { name: "type", choices: PLACE_TYPE_CHOICES }],
                search_fields: &["label", "alternative_label"],
                text_filters: &[],
                naming: NamingRule::Label,
                default_scope: None,
            },
            EntityShape {
                entity_type: EntityType::Institution,
                categorical: &[AttributeDescriptor { name: "type", choices: INSTITUTION_TYPE_CHOICES }],
                search_fields: &["name", "alternative_label"],
                text_filters: &[],
                naming: NamingRule::Name,
                default_scope: None,
            },
            EntityShape {
                entity_type: EntityType::Event,
                categorical: &[AttributeDescriptor { name: "type", choices: EVENT_TYPE_CHOICES }],
                search_fields: &["name", "alternative_label"],
                text_filters: &[],
                naming: NamingRule::Name,
                default_scope: None,
            },
            EntityShape {
                entity_type: EntityType::Salary,
                categorical: &[
                    AttributeDescriptor { name: "typ", choices: SALARY_TYP_CHOICES },
                    AttributeDescriptor { name: "repetitionType", choices: REPETITION_CHOICES },
                ],
                search_fields: &["name"],
                text_filters: &[],
                naming: NamingRule::Name,
                default_scope: Some(DefaultScope {
                    attribute: "typ",
                    values: &["Sold", "Provision", "Sonstiges"],
                }),
            },
        ];

        Self {
            shapes: shapes.into_iter().map(|s| (s.entity_type, s)).collect(),
        }
    }

    pub fn shape(&self, entity_type: EntityType) -> Result<&EntityShape> {
        self.shapes
            .get(&entity_type)
            .ok_or_else(|| ProsographError::UnknownEntityType(entity_type.to_string()))
    }

    /// Display name of an entity according to its type's naming rule.
    pub fn display_name(&self, entity: &Entity) -> Result<String> {
        Ok(self.shape(entity.entity_type)?.naming.render(entity))
    }

    /// Registered entity types in a stable order.
    pub fn entity_types(&self) -> Vec<EntityType> {
        let mut types: Vec<EntityType> = self.shapes.keys().copied().collect();
        types.sort();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entity_type_round_trip_names() {
        for t in EntityType::ALL {
            assert_eq!(t.as_str().parse::<EntityType>().unwrap(), t);
        }
        let err = "hof".parse::<EntityType>().unwrap_err();
        assert!(matches!(err, ProsographError::UnknownEntityType(ref s) if s == "hof"));
    }

    #[test]
    fn test_person_naming() {
        let catalog = EntityCatalog::sicprod();
        let person = Entity::new(1, EntityType::Person)
            .with_attribute("first_name", json!("Hans"))
            .with_attribute("name", json!("Sachs"));
        assert_eq!(catalog.display_name(&person).unwrap(), "Hans Sachs");

        let surname_only = Entity::new(2, EntityType::Person)
            .with_attribute("first_name", json!(null))
            .with_attribute("name", json!("Fugger"));
        assert_eq!(catalog.display_name(&surname_only).unwrap(), "Fugger");
    }

    #[test]
    fn test_place_uses_label_and_blank_falls_back_to_id() {
        let catalog = EntityCatalog::sicprod();
        let place = Entity::new(10, EntityType::Place)
            .with_attribute("label", json!("Innsbruck"))
            .with_attribute("name", json!("ignored"));
        assert_eq!(catalog.display_name(&place).unwrap(), "Innsbruck");

        let event = Entity::new(11, EntityType::Event).with_attribute("name", json!("  "));
        assert_eq!(catalog.display_name(&event).unwrap(), "(ID: 11)");
    }

    #[test]
    fn test_categorical_attributes_per_type() {
        let catalog = EntityCatalog::sicprod();
        assert!(catalog.shape(EntityType::Function).unwrap().categorical.is_empty());
        let salary = catalog.shape(EntityType::Salary).unwrap();
        let names: Vec<_> = salary.categorical.iter().map(|a| a.name).collect();
        assert_eq!(names, vec!["typ", "repetitionType"]);
        assert_eq!(
            salary.attribute("typ").unwrap().choice_label("Sold"),
            Some("Sold")
        );
        assert!(salary.attribute("gender").is_none());
    }

    #[test]
    fn test_catalog_rejects_duplicates_and_missing_types() {
        let shape = EntityShape {
            entity_type: EntityType::Function,
            categorical: &[],
            search_fields: &["name"],
            text_filters: &[],
            naming: NamingRule::Name,
            default_scope: None,
        };
        assert!(EntityCatalog::new(vec![shape.clone(), shape.clone()]).is_err());

        let partial = EntityCatalog::new(vec![shape]).unwrap();
        assert!(partial.shape(EntityType::Person).unwrap_err().is_configuration());
        assert_eq!(partial.entity_types(), vec![EntityType::Function]);
    }
}
