//! Limit/offset pagination envelope with facets computed over the whole
//! filtered set.

use serde::Serialize;
use url::Url;

use crate::catalog::{Entity, EntityType};
use crate::config::PaginationConfig;
use crate::error::{ProsographError, Result};
use crate::facets::{FacetEngine, FacetSummary};

/// Requested page window, already clamped to the configured bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: usize,
    pub offset: usize,
}

impl PageRequest {
    /// Parse `limit`/`offset` query values. A missing or zero limit falls back
    /// to the default; larger limits are capped at `max_limit`.
    pub fn from_params(limit: Option<&str>, offset: Option<&str>, config: &PaginationConfig) -> Result<Self> {
        let limit = match limit {
            Some(raw) => parse_count("limit", raw)?,
            None => 0,
        };
        let limit = match limit {
            0 => config.default_limit,
            n => n.min(config.max_limit),
        };
        let offset = match offset {
            Some(raw) => parse_count("offset", raw)?,
            None => 0,
        };
        Ok(Self { limit, offset })
    }
}

fn parse_count(key: &str, raw: &str) -> Result<usize> {
    raw.parse()
        .map_err(|_| ProsographError::InvalidInput(format!("{} must be a non-negative integer, got '{}'", key, raw)))
}

/// Response envelope. Fields are declared in alphabetical order so the JSON
/// keys come out sorted.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facets: Option<FacetSummary>,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

/// Builds absolute `next`/`previous` links for one listing URL.
#[derive(Debug, Clone)]
pub struct PageLinks {
    url: Url,
    params: Vec<(String, String)>,
}

impl PageLinks {
    /// `params` are the request's query pairs other than `limit`/`offset`.
    pub fn new(base_url: &str, path: &str, params: Vec<(String, String)>) -> Result<Self> {
        let mut url = Url::parse(base_url)
            .map_err(|e| ProsographError::Config(format!("invalid base_url '{}': {}", base_url, e)))?;
        let prefix = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{}/{}", prefix, path.trim_start_matches('/')));
        Ok(Self { url, params })
    }

    fn link(&self, limit: usize, offset: Option<usize>) -> String {
        let mut url = self.url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.clear();
            for (key, value) in &self.params {
                query.append_pair(key, value);
            }
            query.append_pair("limit", &limit.to_string());
            if let Some(offset) = offset {
                query.append_pair("offset", &offset.to_string());
            }
        }
        url.to_string()
    }

    pub fn next(&self, page: PageRequest, count: usize) -> Option<String> {
        let next_offset = page.offset.checked_add(page.limit)?;
        (next_offset < count).then(|| self.link(page.limit, Some(next_offset)))
    }

    /// The first page drops `offset` entirely.
    pub fn previous(&self, page: PageRequest) -> Option<String> {
        if page.offset == 0 {
            return None;
        }
        if page.offset <= page.limit {
            return Some(self.link(page.limit, None));
        }
        Some(self.link(page.limit, Some(page.offset - page.limit)))
    }
}

/// Computes facets over the full filtered set, then slices the page.
#[derive(Clone)]
pub struct ResponseAssembler {
    engine: FacetEngine,
    degrade_on_error: bool,
}

impl ResponseAssembler {
    pub fn new(engine: FacetEngine, degrade_on_error: bool) -> Self {
        Self { engine, degrade_on_error }
    }

    /// Facets under the configured failure policy. Configuration errors
    /// always propagate; other failures only when degrading is off.
    pub async fn facets(&self, base_type: EntityType, base: &[Entity]) -> Result<Option<FacetSummary>> {
        match self.engine.compute(base_type, base).await {
            Ok(summary) => Ok(Some(summary)),
            Err(e) if self.degrade_on_error && !e.is_configuration() => {
                log::warn!("Facet computation for {} failed, omitting facets: {}", base_type, e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Assemble one page. `render` turns each entity of the slice into its
    /// response representation.
    pub async fn assemble<T, F>(
        &self,
        base_type: EntityType,
        base: Vec<Entity>,
        page: PageRequest,
        links: &PageLinks,
        mut render: F,
    ) -> Result<Page<T>>
    where
        F: FnMut(Entity) -> Result<T>,
    {
        let count = base.len();
        let facets = self.facets(base_type, &base).await?;

        let results = base
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .map(&mut render)
            .collect::<Result<Vec<T>>>()?;

        Ok(Page {
            count,
            facets,
            next: links.next(page, count),
            previous: links.previous(page),
            results,
        })
    }
}
