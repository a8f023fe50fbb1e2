//! Route handler functions for all API endpoints.
//!
//! Each handler extracts query/path parameters via axum extractors,
//! checks readiness, calls the search engine, and returns JSON.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use marquee_core::types::{Movie, Suggestion};
use marquee_vector::SearchRequest;

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Response types
// =============================================================================

/// A search hit: the movie and its distance to the similarity text.
#[derive(Debug, Serialize, Deserialize)]
pub struct MovieHit {
    pub first: Movie,
    pub second: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub movies: Vec<MovieHit>,
    pub count: usize,
    /// Milliseconds.
    pub search_time: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutocompleteResponse {
    pub suggestions: Vec<Suggestion>,
    /// Milliseconds.
    pub autocomplete_time: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenresResponse {
    pub genres: Vec<String>,
    pub count: usize,
    /// Milliseconds.
    pub fetch_time: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub mode: String,
    pub uptime_secs: u64,
    pub indexed_documents: u64,
    pub ready: bool,
}

// =============================================================================
// Query parameters
// =============================================================================

/// Build a search request from raw query pairs.
///
/// `cast` and `genres` may repeat and may hold comma-separated values.
/// Unknown keys are ignored.
pub fn parse_search_params(pairs: &[(String, String)]) -> Result<SearchRequest, ApiError> {
    let mut request = SearchRequest::default();

    for (key, value) in pairs {
        match key.as_str() {
            "title" => request.title = non_blank(value),
            "text" => request.text = non_blank(value),
            "cast" | "cast[]" => request.cast.extend(split_list(value)),
            "genres" | "genres[]" => request.genres.extend(split_list(value)),
            "year" => {
                request.year = non_blank(value)
                    .map(|v| {
                        v.parse::<i32>().map_err(|_| {
                            ApiError::BadRequest(format!("Invalid year: '{}'", v))
                        })
                    })
                    .transpose()?;
            }
            "numberOfNearestNeighbors" => {
                request.neighbors = non_blank(value)
                    .map(|v| {
                        v.parse::<i64>().map_err(|_| {
                            ApiError::BadRequest(format!(
                                "Invalid numberOfNearestNeighbors: '{}'",
                                v
                            ))
                        })
                    })
                    .transpose()?;
            }
            _ => {}
        }
    }

    Ok(request)
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn split_list(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn ensure_ready(state: &AppState) -> Result<(), ApiError> {
    if state.readiness.is_ready() {
        return Ok(());
    }
    Err(ApiError::NotReady {
        indexed: state.readiness.total_indexed(),
        expected: state.readiness.expected(),
    })
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /search/{q} - title suggestions for a prefix.
pub async fn autocomplete(
    State(state): State<AppState>,
    Path(q): Path<String>,
) -> Result<Json<AutocompleteResponse>, ApiError> {
    ensure_ready(&state)?;

    let outcome = state.engine.suggest(&q)?;
    Ok(Json(AutocompleteResponse {
        suggestions: outcome.suggestions,
        autocomplete_time: outcome.elapsed.as_millis() as u64,
    }))
}

/// GET /search - hybrid movie search.
pub async fn search(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<SearchResponse>, ApiError> {
    ensure_ready(&state)?;

    let request = parse_search_params(&pairs)?;
    let outcome = state.engine.search(&request).await?;

    Ok(Json(SearchResponse {
        movies: outcome
            .results
            .into_iter()
            .map(|hit| MovieHit {
                first: hit.movie,
                second: hit.score,
            })
            .collect(),
        count: outcome.count,
        search_time: outcome.elapsed.as_millis() as u64,
    }))
}

/// GET /genres - every distinct genre, sorted.
pub async fn genres(State(state): State<AppState>) -> Result<Json<GenresResponse>, ApiError> {
    ensure_ready(&state)?;

    let outcome = state.engine.all_genres()?;
    Ok(Json(GenresResponse {
        count: outcome.genres.len(),
        genres: outcome.genres.into_iter().collect(),
        fetch_time: outcome.elapsed.as_millis() as u64,
    }))
}

/// GET /health - liveness and indexing progress. Never gated.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        mode: state.engine.mode().to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        indexed_documents: state.readiness.total_indexed(),
        ready: state.readiness.is_ready(),
    })
}
