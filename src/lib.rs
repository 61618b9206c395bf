pub mod config;
pub mod error;
pub mod db;
pub mod catalog;
pub mod relations;
pub mod entities;
pub mod facets;
pub mod network;
pub mod api;

pub use config::Config;
pub use error::{ProsographError, Result};
pub use catalog::{Entity, EntityCatalog, EntityRef, EntityType};
pub use facets::{FacetEngine, FacetSummary};
pub use network::{NetworkBuilder, NetworkNode};
pub use relations::{RelationRegistry, RelationStore};
