//! County and state browsing.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use territory_core::error::AppError;
use uuid::Uuid;

use crate::{
    models::{County, CountyStatus, State as UsState},
    services::pricing::population_tier,
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct ListCountiesQuery {
    pub state_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct CountyResponse {
    pub county_id: Uuid,
    pub state_id: Uuid,
    pub name: String,
    pub population: i64,
    pub status: CountyStatus,
    /// Population-derived market tier (1 rural, 2 suburban, 3 urban).
    pub market_tier: i16,
}

impl From<County> for CountyResponse {
    fn from(c: County) -> Self {
        let status = c.status();
        Self {
            county_id: c.county_id,
            state_id: c.state_id,
            name: c.name,
            population: c.population,
            status,
            market_tier: population_tier(c.population),
        }
    }
}

pub async fn list_states(
    State(state): State<AppState>,
) -> Result<Json<Vec<UsState>>, AppError> {
    let states = state.db.list_states().await?;
    Ok(Json(states))
}

pub async fn list_counties(
    State(state): State<AppState>,
    Query(query): Query<ListCountiesQuery>,
) -> Result<Json<Vec<CountyResponse>>, AppError> {
    let counties = state.db.list_counties(query.state_id).await?;
    Ok(Json(counties.into_iter().map(CountyResponse::from).collect()))
}

pub async fn get_county(
    State(state): State<AppState>,
    Path(county_id): Path<Uuid>,
) -> Result<Json<CountyResponse>, AppError> {
    let county = state
        .db
        .get_county(county_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("County not found")))?;

    Ok(Json(CountyResponse::from(county)))
}
