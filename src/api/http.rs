use crate::api::pagination::{Page, PageLinks, PageRequest, ResponseAssembler};
use crate::api::views::{group_by_type, relation_views, EntityDetail, EntityView, RelationView};
use crate::catalog::{EntityCatalog, EntityRef, EntityType};
use crate::config::{Config, PaginationConfig};
use crate::db::Db;
use crate::entities::{EntityFilter, EntityStore};
use crate::error::{ProsographError, Result};
use crate::facets::FacetEngine;
use crate::network::{NetworkBuilder, NetworkNode};
use crate::relations::{RelationKind, RelationRegistry, RelationStore};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared handler state. Every component is cheap to clone and holds no
/// per-request data.
#[derive(Clone)]
pub struct AppState {
    entities: EntityStore,
    relations: RelationStore,
    assembler: ResponseAssembler,
    network: NetworkBuilder,
    pagination: PaginationConfig,
    base_url: String,
}

impl AppState {
    /// Wire the stores and the registry from configuration.
    pub fn from_config(db: Db, config: &Config) -> Result<Self> {
        let catalog = Arc::new(EntityCatalog::sicprod());
        let registry = Arc::new(RelationRegistry::sicprod()?);
        log::info!("Loaded {} relation kinds", registry.len());

        let entities = EntityStore::new(db.clone(), catalog);
        let relations = RelationStore::new(db, registry);

        let engine = FacetEngine::new(entities.clone(), relations.clone());
        Ok(Self {
            assembler: ResponseAssembler::new(engine, config.facets.degrade_on_error),
            network: NetworkBuilder::new(entities.clone(), relations.clone()),
            entities,
            relations,
            pagination: config.pagination.clone(),
            base_url: config.service.base_url.clone(),
        })
    }

    pub fn relations(&self) -> &RelationStore {
        &self.relations
    }
}

/// Build the API router with tracing and CORS.
pub fn router(state: AppState, allowed_origins: &[String]) -> Router {
    let cors = if allowed_origins.is_empty() {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        let origins: Vec<axum::http::HeaderValue> =
            allowed_origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/entities/:entity_type", get(handle_list))
        .route("/api/entities/:entity_type/", get(handle_list))
        .route("/api/entities/:entity_type/:id", get(handle_detail))
        .route("/api/entities/:entity_type/:id/relations", get(handle_relations))
        .route("/api/network", get(handle_network))
        .route("/api/relation-kinds", get(handle_relation_kinds))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Bind the configured port and serve until the process stops.
pub async fn serve(state: AppState, config: &Config) -> Result<()> {
    let addr = format!("127.0.0.1:{}", config.http_server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        ProsographError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to bind to {}: {}", addr, e),
        ))
    })?;
    log::info!("Serving prosograph API on http://{}", addr);

    axum::serve(listener, router(state, &config.http_server.allowed_origins))
        .await
        .map_err(|e| {
            ProsographError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("HTTP server error: {}", e),
            ))
        })
}

/// Error surfaced to HTTP clients.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(ProsographError),
}

impl From<ProsographError> for ApiError {
    fn from(err: ProsographError) -> Self {
        match err {
            ProsographError::EntityNotFound { .. } => ApiError::NotFound(err.to_string()),
            ProsographError::InvalidInput(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(err) => {
                if err.is_configuration() {
                    log::error!("Configuration error while handling request: {}", err);
                } else {
                    log::error!("Request failed: {}", err);
                }
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

fn parse_type(raw: &str) -> ApiResult<EntityType> {
    raw.parse()
        .map_err(|_| ApiError::NotFound(format!("Unknown entity type: {}", raw)))
}

async fn handle_health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn handle_list(
    State(state): State<AppState>,
    Path(entity_type): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> ApiResult<Json<Page<EntityView>>> {
    let entity_type = parse_type(&entity_type)?;
    let catalog = state.entities.catalog();
    let shape = catalog.shape(entity_type)?;

    let mut limit = None;
    let mut offset = None;
    let mut filters = Vec::new();
    for (key, value) in &params {
        match key.as_str() {
            "limit" => limit = Some(value.as_str()),
            "offset" => offset = Some(value.as_str()),
            _ => filters.push((key.clone(), value.clone())),
        }
    }

    let page = PageRequest::from_params(limit, offset, &state.pagination)?;
    let filter = EntityFilter::from_params(shape, filters.iter().map(|(k, v)| (k.as_str(), v.as_str())))?;
    let base = state.entities.list(entity_type, &filter).await?;
    log::debug!("Listing {} {} entities ({:?})", base.len(), entity_type, page);

    let links = PageLinks::new(&state.base_url, &format!("/api/entities/{}/", entity_type), filters)?;
    let response = state
        .assembler
        .assemble(entity_type, base, page, &links, |entity| EntityView::new(catalog, entity))
        .await?;
    Ok(Json(response))
}

async fn load_entity(state: &AppState, entity_type: &str, id: i64) -> ApiResult<EntityRef> {
    let key = EntityRef::new(parse_type(entity_type)?, id);
    if state.entities.get(key).await?.is_none() {
        return Err(ProsographError::EntityNotFound {
            entity_type: key.entity_type.to_string(),
            id,
        }
        .into());
    }
    Ok(key)
}

async fn handle_detail(
    State(state): State<AppState>,
    Path((entity_type, id)): Path<(String, i64)>,
) -> ApiResult<Json<EntityDetail>> {
    let key = EntityRef::new(parse_type(&entity_type)?, id);
    let entity = state.entities.get(key).await?.ok_or_else(|| ProsographError::EntityNotFound {
        entity_type: key.entity_type.to_string(),
        id,
    })?;

    let directed = state.relations.relations_of(key).await?;
    let views = relation_views(&state.entities, state.relations.registry(), directed).await?;

    Ok(Json(EntityDetail {
        entity: EntityView::new(state.entities.catalog(), entity)?,
        relations: group_by_type(views),
    }))
}

async fn handle_relations(
    State(state): State<AppState>,
    Path((entity_type, id)): Path<(String, i64)>,
) -> ApiResult<Json<Vec<RelationView>>> {
    let key = load_entity(&state, &entity_type, id).await?;
    let directed = state.relations.relations_of(key).await?;
    Ok(Json(relation_views(&state.entities, state.relations.registry(), directed).await?))
}

#[derive(Debug, serde::Deserialize)]
struct NetworkParams {
    types: Option<String>,
}

async fn handle_network(
    State(state): State<AppState>,
    Query(params): Query<NetworkParams>,
) -> ApiResult<Json<Vec<NetworkNode>>> {
    let types = match params.types.as_deref() {
        Some(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| {
                t.parse::<EntityType>()
                    .map_err(|_| ApiError::BadRequest(format!("Unknown entity type: {}", t)))
            })
            .collect::<ApiResult<Vec<_>>>()?,
        None => Vec::new(),
    };

    Ok(Json(state.network.build(&types).await?))
}

async fn handle_relation_kinds(State(state): State<AppState>) -> Json<Vec<RelationKind>> {
    Json(state.relations.registry().iter().cloned().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Entity;
    use crate::db::test_support::migrated_db;
    use crate::relations::NewRelation;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn test_config() -> Config {
        Config::from_toml(
            r#"
            [service]
            db_path = "unused.db"
            base_url = "http://localhost:8080"

            [pagination]
            default_limit = 2
            max_limit = 10
            "#,
        )
        .unwrap()
    }

    async fn setup() -> (Router, Db, TempDir) {
        let (db, temp) = migrated_db().await;
        let state = AppState::from_config(db.clone(), &test_config()).unwrap();

        for entity in [
            Entity::new(1, EntityType::Person)
                .with_attribute("first_name", json!("Jakob"))
                .with_attribute("name", json!("Fugger"))
                .with_attribute("gender", json!("männlich"))
                .with_attribute("status", json!("Kaufmann"))
                .with_start_date("1459"),
            Entity::new(2, EntityType::Person)
                .with_attribute("first_name", json!("Bianca Maria"))
                .with_attribute("name", json!("Sforza"))
                .with_attribute("gender", json!("weiblich")),
            Entity::new(3, EntityType::Person)
                .with_attribute("name", json!("Anonymus"))
                .with_attribute("gender", json!("")),
            Entity::new(10, EntityType::Place).with_attribute("label", json!("Augsburg")),
        ] {
            state.entities.upsert(&entity).await.unwrap();
        }
        state
            .relations
            .insert(
                NewRelation::new(
                    "bewohnt",
                    EntityRef::new(EntityType::Person, 1),
                    EntityRef::new(EntityType::Place, 10),
                )
                .with_start("5.1498"),
            )
            .await
            .unwrap();

        (router(state, &[]), db, temp)
    }

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _db, _temp) = setup().await;
        let (status, body) = get_json(&app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_list_with_facets_and_links() {
        let (app, _db, _temp) = setup().await;
        let (status, body) = get_json(&app, "/api/entities/person/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 3);
        assert_eq!(body["results"].as_array().unwrap().len(), 2);
        assert_eq!(body["results"][0]["name"], "Anonymus");
        assert_eq!(body["next"], "http://localhost:8080/api/entities/person/?limit=2&offset=2");
        assert_eq!(body["previous"], Value::Null);

        let facets = &body["facets"];
        assert_eq!(facets["gender"]["empty"], json!({"name": "", "count": 1}));
        assert_eq!(facets["gender"]["weiblich"]["count"], 1);
        assert_eq!(facets["relation_place"]["10"], json!({"name": "Augsburg", "count": 1}));
        assert_eq!(facets["start"], 1459);
        assert_eq!(facets["end"], Value::Null);

        let (_, second) = get_json(&app, "/api/entities/person/?limit=2&offset=2").await;
        assert_eq!(second["facets"], body["facets"]);
        assert_eq!(second["results"][0]["id"], 1);
        assert_eq!(second["previous"], "http://localhost:8080/api/entities/person/?limit=2");
    }

    #[tokio::test]
    async fn test_list_filters_and_errors() {
        let (app, _db, _temp) = setup().await;
        let (status, body) = get_json(&app, "/api/entities/person?gender=empty").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(body["results"][0]["id"], 3);

        let (status, body) = get_json(&app, "/api/entities/person/?status=kaufm").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(body["results"][0]["id"], 1);

        let (status, _) = get_json(&app, "/api/entities/place/?status=kaufm").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = get_json(&app, "/api/entities/person/?colour=blau").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("colour"));

        let (status, _) = get_json(&app, "/api/entities/hof/").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = get_json(&app, "/api/entities/person/?limit=viele").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_detail_and_relations() {
        let (app, _db, _temp) = setup().await;
        let (status, body) = get_json(&app, "/api/entities/place/10").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Augsburg");
        assert_eq!(body["relations"]["person"][0]["name"], "hat als Bewohner");
        assert_eq!(body["relations"]["person"][0]["to"]["name"], "Jakob Fugger");

        let (status, body) = get_json(&app, "/api/entities/person/1/relations").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["name"], "bewohnt");
        assert_eq!(body[0]["to"], json!({"id": 10, "name": "Augsburg", "type": "place"}));
        assert_eq!(body[0]["start_date_written"], "5.1498");
        assert_eq!(body[0]["start_start_date"], "1498-05-01");
        assert_eq!(body[0]["start_end_date"], "1498-05-31");
        assert_eq!(body[0]["end_start_date"], Value::Null);

        let (status, body) = get_json(&app, "/api/entities/person/99").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Entity not found: person 99");

        let (status, _) = get_json(&app, "/api/entities/place/1/relations").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_network_and_relation_kinds() {
        let (app, _db, _temp) = setup().await;
        let (status, body) = get_json(&app, "/api/network?types=place").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([{"id": 10, "name": "Augsburg", "type": "place", "related_to": [1]}]));

        let (_, body) = get_json(&app, "/api/network").await;
        assert_eq!(body.as_array().unwrap().len(), 4);

        let (status, _) = get_json(&app, "/api/network?types=place,hof").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, kinds) = get_json(&app, "/api/relation-kinds").await;
        let bewohnt = kinds
            .as_array()
            .unwrap()
            .iter()
            .find(|k| k["id"] == "bewohnt")
            .unwrap();
        assert_eq!(bewohnt["reverse_name"], "hat als Bewohner");
        assert_eq!(bewohnt["legacy_id"], 1);
    }

    #[tokio::test]
    async fn test_unregistered_stored_kind_is_a_server_error_everywhere() {
        let (app, db, _temp) = setup().await;
        db.with_connection(|conn| {
            conn.execute(
                "INSERT INTO relations (kind, subject_type, subject_id, object_type, object_id) \
                 VALUES ('abgeschafft', 'person', 2, 'place', 10)",
                [],
            )?;
            Ok(())
        })
        .await
        .unwrap();

        for uri in [
            "/api/entities/person/",
            "/api/entities/person/2",
            "/api/network",
        ] {
            let (status, body) = get_json(&app, uri).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{}", uri);
            assert_eq!(body["error"], "Internal server error");
        }
    }
}
