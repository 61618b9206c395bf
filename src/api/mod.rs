//! Response assembly and the HTTP surface.

pub mod http;
pub mod pagination;
pub mod views;

pub use http::{router, serve, AppState};
pub use pagination::{Page, PageLinks, PageRequest, ResponseAssembler};
pub use views::{EntityDetail, EntityView, RelationView};
