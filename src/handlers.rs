use crate::config::Config;
use crate::errors::AppError;
use crate::models::*;
use crate::presence::ConnectionRegistry;
use crate::services::{
    CustomerQualityService, LeadScoringService, PriceBenchmarkService, RecalculationOutcome,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use regex::Regex;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: PgPool,
    /// Application configuration.
    pub config: Config,
    /// Users currently holding a live session.
    pub presence: Arc<ConnectionRegistry>,
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "tradie-leads-api",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

// ============ Lead scoring ============

/// POST /api/v1/tradies/:id/lead-scores/recalculate
///
/// Replaces every stored lead score for the tradie. A tradie without a
/// profile gets a 404 and nothing is written.
pub async fn recalculate_tradie_scores(
    State(state): State<Arc<AppState>>,
    Path(tradie_id): Path<Uuid>,
) -> Result<Json<RecalculationResponse>, AppError> {
    tracing::info!("POST /tradies/{}/lead-scores/recalculate", tradie_id);

    let service = LeadScoringService::new(state.db.clone());
    let outcome = service.recalculate_all_scores_for_tradie(tradie_id).await?;
    recalculation_response(tradie_id, outcome).map(Json)
}

fn recalculation_response(
    tradie_id: Uuid,
    outcome: RecalculationOutcome,
) -> Result<RecalculationResponse, AppError> {
    match outcome {
        RecalculationOutcome::ProfileNotFound => Err(AppError::NotFound(format!(
            "Tradie profile {} not found",
            tradie_id
        ))),
        RecalculationOutcome::Recalculated { scores_written } => Ok(RecalculationResponse {
            tradie_id,
            status: "recalculated".to_string(),
            scores_written,
        }),
    }
}

/// GET /api/v1/tradies/:id/leads
pub async fn get_tradie_leads(
    State(state): State<Arc<AppState>>,
    Path(tradie_id): Path<Uuid>,
    Query(params): Query<LeadFeedParams>,
) -> Result<Json<Vec<LeadView>>, AppError> {
    tracing::info!("GET /tradies/{}/leads - params: {:?}", tradie_id, params);

    let service = LeadScoringService::new(state.db.clone());
    let leads = service
        .get_leads_for_tradie(tradie_id, params.min_score, params.limit)
        .await?;

    Ok(Json(leads))
}

/// POST /api/v1/lead-scores/recalculate
///
/// Full refresh across every tradie. Individual failures are counted in the
/// summary rather than failing the request.
pub async fn refresh_all_lead_scores(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RefreshSummary>, AppError> {
    tracing::info!("POST /lead-scores/recalculate");

    let service = LeadScoringService::new(state.db.clone());
    let summary = service.recalculate_all_tradies().await?;

    Ok(Json(summary))
}

// ============ Customer quality ============

/// POST /api/v1/customers/:id/quality/recalculate
pub async fn recalculate_customer_quality(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<Uuid>,
) -> Result<Json<CustomerQuality>, AppError> {
    tracing::info!("POST /customers/{}/quality/recalculate", customer_id);

    let service = CustomerQualityService::new(state.db.clone());
    service
        .recalculate_customer_quality(customer_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Customer {} not found", customer_id)))
}

/// GET /api/v1/customers/:id/quality
pub async fn get_customer_quality(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<Uuid>,
) -> Result<Json<CustomerQuality>, AppError> {
    tracing::info!("GET /customers/{}/quality", customer_id);

    let service = CustomerQualityService::new(state.db.clone());
    service
        .get_customer_quality(customer_id)
        .await?
        .map(Json)
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "No quality record for customer {}. Recalculate it first.",
                customer_id
            ))
        })
}

// ============ Price benchmarks ============

/// GET /api/v1/benchmarks?trade_category_id=..&postcode=..
pub async fn get_benchmark(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BenchmarkParams>,
) -> Result<Json<PriceBenchmark>, AppError> {
    tracing::info!("GET /benchmarks - params: {:?}", params);

    let postcode = match params.postcode.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => Some(validate_postcode(raw)?),
        _ => None,
    };

    let service = PriceBenchmarkService::new(state.db.clone());
    service
        .get_benchmark(params.trade_category_id, postcode)
        .await?
        .map(Json)
        .ok_or_else(|| {
            AppError::NotFound(
                "Not enough market data available for this trade category yet".to_string(),
            )
        })
}

/// GET /api/v1/quotes/:id/price-comparison
///
/// A quote without enough market data still returns 200 with rating `Unknown`.
pub async fn compare_quote_price(
    State(state): State<Arc<AppState>>,
    Path(quote_id): Path<Uuid>,
) -> Result<Json<QuoteComparison>, AppError> {
    tracing::info!("GET /quotes/{}/price-comparison", quote_id);

    let service = PriceBenchmarkService::new(state.db.clone());
    let comparison = service
        .compare_quote_price(quote_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Quote {} not found", quote_id)))?;

    if !comparison.has_benchmark() {
        tracing::debug!("Quote {} has no benchmark", quote_id);
    }

    Ok(Json(comparison))
}

/// GET /api/v1/tradies/:id/quotes/price-comparison
pub async fn get_tradie_quotes_comparison(
    State(state): State<Arc<AppState>>,
    Path(tradie_id): Path<Uuid>,
) -> Result<Json<TradieQuotesComparison>, AppError> {
    tracing::info!("GET /tradies/{}/quotes/price-comparison", tradie_id);

    let service = PriceBenchmarkService::new(state.db.clone());
    let comparison = service.get_tradie_quotes_comparison(tradie_id).await?;

    Ok(Json(comparison))
}

// ============ Presence ============

/// POST /api/v1/presence/:user_id/sessions
pub async fn connect_session(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> (StatusCode, Json<SessionResponse>) {
    let session_id = Uuid::new_v4();
    state.presence.connect(user_id, session_id);

    (
        StatusCode::CREATED,
        Json(SessionResponse {
            user_id,
            session_id,
            online_users: state.presence.online_count(),
        }),
    )
}

/// DELETE /api/v1/presence/:user_id/sessions/:session_id
pub async fn disconnect_session(
    State(state): State<Arc<AppState>>,
    Path((user_id, session_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    if state.presence.disconnect(user_id, session_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!(
            "Session {} not found for user {}",
            session_id, user_id
        )))
    }
}

/// GET /api/v1/presence/:user_id
pub async fn get_presence(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> Json<PresenceStatus> {
    let sessions = state.presence.sessions_for(user_id);
    Json(PresenceStatus {
        user_id,
        online: !sessions.is_empty(),
        sessions,
    })
}

/// Accepts 1 to 10 letters, digits or spaces. Postcodes shorter than a region
/// prefix are valid and get the category-wide benchmark.
fn validate_postcode(postcode: &str) -> Result<&str, AppError> {
    let re = Regex::new(r"^[A-Za-z0-9 ]{1,10}$")
        .map_err(|e| AppError::InternalError(format!("Invalid postcode pattern: {}", e)))?;

    if re.is_match(postcode) {
        Ok(postcode)
    } else {
        Err(AppError::BadRequest(format!(
            "Invalid postcode '{}': expected 1-10 letters, digits or spaces",
            postcode
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_postcode() {
        assert_eq!(validate_postcode("2000").unwrap(), "2000");
        assert!(validate_postcode("SW1A 1AA").is_ok());
        assert_eq!(validate_postcode("2").unwrap(), "2");
        assert!(validate_postcode("20000000000").is_err());
        assert!(matches!(
            validate_postcode("20;00"),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_missing_profile_is_not_found_not_a_status() {
        let tradie_id = Uuid::new_v4();

        assert!(matches!(
            recalculation_response(tradie_id, RecalculationOutcome::ProfileNotFound),
            Err(AppError::NotFound(_))
        ));

        let done = recalculation_response(
            tradie_id,
            RecalculationOutcome::Recalculated { scores_written: 3 },
        )
        .unwrap();
        assert_eq!(done.status, "recalculated");
        assert_eq!(done.scores_written, 3);
    }

    #[tokio::test]
    async fn test_health_reports_service_name() {
        let (status, Json(body)) = health().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "tradie-leads-api");
    }
}
