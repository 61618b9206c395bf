//! Static table of relation kinds and the indexes used to query it.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use super::Direction;
use crate::catalog::EntityType;
use crate::catalog::EntityType::{Event, Function, Institution, Person, Place, Salary};
use crate::error::{ProsographError, Result};

/// Metadata of one relation kind: endpoint types and the two display names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationKind {
    pub id: &'static str,
    pub subject_type: EntityType,
    pub object_type: EntityType,
    pub forward_name: &'static str,
    pub reverse_name: &'static str,
    /// Numeric property id of the legacy database, where one existed.
    pub legacy_id: Option<u32>,
}

impl RelationKind {
    pub fn name_from(&self, direction: Direction) -> &'static str {
        match direction {
            Direction::Forward => self.forward_name,
            Direction::Reverse => self.reverse_name,
        }
    }

    pub fn involves(&self, entity_type: EntityType) -> bool {
        self.subject_type == entity_type || self.object_type == entity_type
    }

    /// Type at the far end when starting from `entity_type`, if the kind touches it.
    pub fn other_type(&self, entity_type: EntityType) -> Option<EntityType> {
        if self.subject_type == entity_type {
            Some(self.object_type)
        } else if self.object_type == entity_type {
            Some(self.subject_type)
        } else {
            None
        }
    }
}

const fn kind(
    id: &'static str,
    subject_type: EntityType,
    object_type: EntityType,
    forward_name: &'static str,
    reverse_name: &'static str,
    legacy_id: Option<u32>,
) -> RelationKind {
    RelationKind { id, subject_type, object_type, forward_name, reverse_name, legacy_id }
}

/// Relation kinds of the prosopography ontology.
pub const SICPROD_RELATION_KINDS: &[RelationKind] = &[
    kind("bewohnt", Person, Place, "bewohnt", "hat als Bewohner", Some(1)),
    kind("besitzt", Person, Place, "besitzt", "ist im Besitz von", Some(2)),
    kind("hat_korrespondenz_mit", Person, Person, "hat Korrespondenz mit", "hat Korrespondenz mit", Some(3)),
    kind("hat_familienbeziehung_zu", Person, Person, "hat Familienbeziehung zu", "hat Familienbeziehung zu", Some(4)),
    kind("hat_ehe_mit", Person, Person, "hat Ehe mit", "hat Ehe mit", Some(5)),
    kind("empfiehlt", Person, Person, "empfiehlt", "wird empfohlen von", Some(7)),
    kind("hat_geschaeftsbeziehung_zu", Person, Person, "hat Geschäftsbeziehung zu", "hat Geschäftsbeziehung zu", Some(8)),
    kind("ist_mitglied_von", Person, Institution, "ist Mitglied von", "hat Mitglied", Some(9)),
    kind("nimmt_teil_an", Person, Event, "nimmt teil an", "hat als Teilnehmer", Some(10)),
    kind("wird_ausbezahlt_an_person", Salary, Person, "wird ausbezahlt an", "erhält", Some(11)),
    kind("ist_an", Function, Institution, "ist an", "hat Funktion", Some(12)),
    kind("wird_ausgeuebt_von", Function, Person, "wird ausgeübt von", "hat Funktion inne", Some(13)),
    kind("ist_teil_von", Place, Place, "ist Teil von", "hat als Teil", Some(14)),
    kind("institution_fuehrt_durch", Institution, Salary, "führt durch", "wird durchgeführt von", Some(15)),
    kind("ist_bruder_schwester_von", Person, Person, "ist Bruder/Schwester von", "ist Bruder/Schwester von", Some(143)),
    kind("ist_kind_von", Person, Person, "ist Kind von", "ist Elternteil von", Some(144)),
    kind("person_weist_an", Person, Salary, "weist an", "wird angewiesen von", Some(145)),
    kind("ist_geboren_in", Person, Place, "ist geboren in", "ist Geburtsort von", Some(146)),
    kind("ist_gestorben_in", Person, Place, "ist gestorben in", "ist Sterbeort von", Some(147)),
    kind("ging_hervor_aus", Function, Function, "ging hervor aus", "war Vorgänger von", Some(148)),
    kind("ist_untergeordnet", Function, Function, "ist untergeordnet", "hat untergeordnete Funktion", Some(149)),
    kind("ist_gelegen_in", Institution, Place, "ist gelegen in", "inkludiert", Some(150)),
    kind("findet_statt_in", Event, Place, "findet statt in", "ist Austragungsort von", Some(151)),
    kind("wird_ausbezahlt_an_function", Salary, Function, "wird ausbezahlt an", "erhält", Some(152)),
    kind("ist_taetig_in", Person, Place, "ist tätig in", "ist Tätigkeitsort von", Some(473)),
    kind("haelt_sich_auf_in", Person, Place, "hält sich auf in", "ist Aufenthaltsort von", Some(474)),
    kind("ist_vormund_von", Person, Person, "ist Vormund von", "ist Mündel von", Some(475)),
    kind("ist_taetig_an", Person, Institution, "ist tätig an", "hat tätige Person", Some(476)),
    kind("ist_pfruendner_von", Person, Institution, "ist Pfründner von", "hat Pfründner", Some(477)),
    kind("ausgeuebt_in", Function, Place, "ausgeübt in", "ist Ausübungsort von", Some(478)),
    kind("ist_im_dienst_von", Person, Person, "ist im Dienst von", "beschäftigt", Some(1978)),
    kind("hat_heimatort_in", Person, Place, "hat Heimatort in", "ist Heimatort von", Some(2421)),
    kind("ist_verpfaendet_an", Institution, Person, "ist verpfändet an", "besitzt als Pfand", Some(2422)),
    kind("gehoert_zu", Institution, Institution, "gehört zu", "zuständig für", Some(2423)),
    kind("institution_weist_an", Institution, Salary, "weist an", "wird angewiesen von", Some(2424)),
    kind("wird_angewiesen_von", Salary, Function, "wird angewiesen von", "weist an", Some(2425)),
    kind("verkauft_besitz_an", Person, Person, "verkauft Besitz an", "kauft Besitz von", Some(2455)),
    kind("hat_streit_mit", Person, Person, "hat Streit mit", "hat Streit mit", Some(2456)),
    kind("fuehrt_durch", Person, Salary, "führt durch", "wird durchgeführt von", Some(3760)),
    kind("funktion_fuehrt_durch", Function, Salary, "führt durch", "wird durchgeführt von", None),
    kind("nimmt_entgegen", Person, Salary, "nimmt entgegen", "wird entgegengenommen von", Some(3761)),
    kind("funktion_nimmt_entgegen", Function, Salary, "nimmt entgegen", "wird entgegengenommen von", None),
    kind("buergt_fuer", Person, Person, "bürgt für", "hat als Bürgen", Some(4290)),
    kind("ist_moeglicherweise_identisch_mit", Person, Person, "ist möglicherweise identisch mit", "ist möglicherweise identisch mit", Some(4578)),
    kind("steht_in_verbindung_mit", Institution, Institution, "steht in Verbindung mit", "steht in Verbindung mit", Some(6846)),
    kind("ist_verbunden_mit", Function, Function, "ist verbunden mit", "ist verbunden mit", Some(6861)),
    kind("ist_moeglicherweise_spezifiziert_als", Function, Function, "ist möglicherweise spezifiziert als", "ist möglicherweise verallgemeinert als", Some(6865)),
];

/// Immutable registry of relation kinds, indexed by id, legacy id and endpoint type.
#[derive(Debug, Clone)]
pub struct RelationRegistry {
    kinds: Vec<RelationKind>,
    by_id: HashMap<&'static str, usize>,
    by_legacy_id: HashMap<u32, usize>,
    by_subject_type: HashMap<EntityType, Vec<usize>>,
    by_object_type: HashMap<EntityType, Vec<usize>>,
}

impl RelationRegistry {
    /// Build the registry, rejecting duplicate ids and legacy ids.
    pub fn new(kinds: Vec<RelationKind>) -> Result<Self> {
        let mut by_id = HashMap::with_capacity(kinds.len());
        let mut by_legacy_id = HashMap::new();
        let mut by_subject_type: HashMap<EntityType, Vec<usize>> = HashMap::new();
        let mut by_object_type: HashMap<EntityType, Vec<usize>> = HashMap::new();

        for (index, kind) in kinds.iter().enumerate() {
            if by_id.insert(kind.id, index).is_some() {
                return Err(ProsographError::Config(format!(
                    "relation kind {} registered twice",
                    kind.id
                )));
            }
            if let Some(legacy_id) = kind.legacy_id {
                if by_legacy_id.insert(legacy_id, index).is_some() {
                    return Err(ProsographError::Config(format!(
                        "legacy relation id {} used by more than one kind",
                        legacy_id
                    )));
                }
            }
            by_subject_type.entry(kind.subject_type).or_default().push(index);
            by_object_type.entry(kind.object_type).or_default().push(index);
        }

        log::debug!("Relation registry built with {} kinds", kinds.len());

        Ok(Self { kinds, by_id, by_legacy_id, by_subject_type, by_object_type })
    }

    pub fn sicprod() -> Result<Self> {
        Self::new(SICPROD_RELATION_KINDS.to_vec())
    }

    /// Look up a kind by id. An unregistered id is a data-model mismatch.
    pub fn lookup(&self, id: &str) -> Result<&RelationKind> {
        self.by_id
            .get(id)
            .map(|&index| &self.kinds[index])
            .ok_or_else(|| ProsographError::UnknownRelationKind(id.to_string()))
    }

    pub fn by_legacy_id(&self, legacy_id: u32) -> Option<&RelationKind> {
        self.by_legacy_id.get(&legacy_id).map(|&index| &self.kinds[index])
    }

    /// Kinds whose subject type is `entity_type`.
    pub fn kinds_from_subject_type(&self, entity_type: EntityType) -> Vec<&RelationKind> {
        self.indexed(&self.by_subject_type, entity_type)
    }

    /// Kinds whose object type is `entity_type`.
    pub fn kinds_to_object_type(&self, entity_type: EntityType) -> Vec<&RelationKind> {
        self.indexed(&self.by_object_type, entity_type)
    }

    /// Kinds touching `entity_type` on either side, each listed once.
    pub fn kinds_involving(&self, entity_type: EntityType) -> Vec<&RelationKind> {
        let mut indexes: BTreeSet<usize> = BTreeSet::new();
        for map in [&self.by_subject_type, &self.by_object_type] {
            if let Some(found) = map.get(&entity_type) {
                indexes.extend(found.iter().copied());
            }
        }
        indexes.into_iter().map(|index| &self.kinds[index]).collect()
    }

    /// Kinds connecting `base` and `related`, in either direction.
    pub fn kinds_between(&self, base: EntityType, related: EntityType) -> Vec<&RelationKind> {
        self.kinds_involving(base)
            .into_iter()
            .filter(|kind| kind.other_type(base) == Some(related))
            .collect()
    }

    /// Entity types reachable from `entity_type` through one relation.
    pub fn related_types(&self, entity_type: EntityType) -> BTreeSet<EntityType> {
        self.kinds_involving(entity_type)
            .into_iter()
            .filter_map(|kind| kind.other_type(entity_type))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RelationKind> {
        self.kinds.iter()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    fn indexed(&self, map: &HashMap<EntityType, Vec<usize>>, entity_type: EntityType) -> Vec<&RelationKind> {
        map.get(&entity_type)
            .map(|indexes| indexes.iter().map(|&index| &self.kinds[index]).collect())
            .unwrap_or_default()
    }
}
