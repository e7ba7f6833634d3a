//! Free trial registration.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use territory_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    models::CountyStatus,
    services::lifecycle::recompute_county_status,
    utils::ValidatedJson,
    AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct TrialRequest {
    pub county_id: Uuid,
    #[validate(length(min = 1, message = "Name is required"))]
    pub contact_name: String,
    #[validate(email(message = "Invalid email format"))]
    pub contact_email: String,
    pub contact_phone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TrialResponse {
    pub trial_id: Uuid,
    pub county_id: Uuid,
    pub county_status: CountyStatus,
}

/// Register a free trial for a county.
///
/// One trial per county, ever; the unique constraint on
/// `trial_registrations.county_id` enforces it under races.
pub async fn create_trial(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<TrialRequest>,
) -> Result<(StatusCode, Json<TrialResponse>), AppError> {
    let county = state
        .db
        .get_county(payload.county_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("County not found")))?;

    if county.status() == CountyStatus::FullyLocked {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "County is exclusively licensed"
        )));
    }

    let trial = state
        .db
        .create_trial_registration(
            county.county_id,
            &payload.contact_name,
            &payload.contact_email,
            payload.contact_phone.as_deref(),
        )
        .await?;

    let county_status = recompute_county_status(&state.db, county.county_id).await?;

    tracing::info!(
        trial_id = %trial.trial_id,
        county_id = %county.county_id,
        status = %county_status.as_str(),
        "Trial registered"
    );

    Ok((
        StatusCode::CREATED,
        Json(TrialResponse {
            trial_id: trial.trial_id,
            county_id: county.county_id,
            county_status,
        }),
    ))
}
