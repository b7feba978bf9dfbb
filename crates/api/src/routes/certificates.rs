//! Certificate routes
//!
//! Check prices a certificate; convert replaces it with a winter
//! certificate.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    Json,
};
use offseason_conversion::{ConversionReceipt, ConversionRequest, PricedCertificate};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CheckQuery {
    pub certificate: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    pub is_valid: bool,
    pub certificate: PricedCertificate,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertBody {
    #[serde(flatten)]
    pub request: ConversionRequest,
    /// Paid checkout session, required for upgrades
    #[serde(default)]
    pub checkout_session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConvertResponse {
    pub success: bool,
    pub certificate: ConversionReceipt,
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /api/certificates/check?certificate=CODE
pub async fn check_certificate(
    State(state): State<AppState>,
    Query(query): Query<CheckQuery>,
) -> ApiResult<Json<CheckResponse>> {
    let code = query
        .certificate
        .filter(|c| !c.trim().is_empty())
        .ok_or(ApiError::MissingCertificate)?;

    let certificate = state.conversion.validator.validate(&code).await?;

    Ok(Json(CheckResponse {
        is_valid: true,
        certificate,
    }))
}

/// POST /api/certificates/convert
pub async fn convert_certificate(
    State(state): State<AppState>,
    body: Result<Json<ConvertBody>, JsonRejection>,
) -> ApiResult<Json<ConvertResponse>> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    tracing::info!(
        code = %body.request.code,
        conversion_type = %body.request.conversion_type,
        current_balance = body.request.current_balance,
        adjusted_balance = body.request.adjusted_balance,
        other_remaining_balance = body.request.other_remaining_balance,
        "Conversion requested"
    );

    let receipt = state
        .conversion
        .convert(&body.request, body.checkout_session_id.as_deref())
        .await?;

    Ok(Json(ConvertResponse {
        success: true,
        certificate: receipt,
    }))
}
