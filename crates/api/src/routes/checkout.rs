//! Upgrade checkout route

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use offseason_conversion::CheckoutResponse;
use serde::Deserialize;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

/// Tier as sent by the browser, either `"TIER_2"` or `2`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TierParam {
    Name(String),
    Number(u32),
}

impl TierParam {
    fn as_name(&self) -> String {
        match self {
            TierParam::Name(name) => name.clone(),
            TierParam::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutBody {
    pub tier: TierParam,
    pub certificate_code: String,
    pub email: String,
}

/// POST /api/checkout
pub async fn create_checkout(
    State(state): State<AppState>,
    body: Result<Json<CheckoutBody>, JsonRejection>,
) -> ApiResult<Json<CheckoutResponse>> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let response = state
        .conversion
        .checkout
        .create_session(&body.tier.as_name(), &body.certificate_code, &body.email)
        .await?;

    Ok(Json(response))
}
