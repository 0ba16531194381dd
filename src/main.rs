use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{
    cors::CorsLayer, limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tradie_leads_api::config::Config;
use tradie_leads_api::db::Database;
use tradie_leads_api::handlers::{self, AppState};
use tradie_leads_api::presence::ConnectionRegistry;
use tradie_leads_api::services::LeadScoringService;

/// Serves `openapi.yml` from the working directory, or 404 if it is missing.
async fn serve_openapi_spec() -> impl IntoResponse {
    match tokio::fs::read_to_string("openapi.yml").await {
        Ok(content) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/yaml")],
            content,
        )
            .into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "OpenAPI spec not found").into_response(),
    }
}

/// Swagger UI page pointed at `/api-docs/openapi.yml`.
async fn serve_swagger_ui() -> impl IntoResponse {
    let html = r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Tradie Leads API - Swagger UI</title>
    <link rel="stylesheet" type="text/css" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css">
    <style>
        body { margin: 0; padding: 0; }
    </style>
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-standalone-preset.js"></script>
    <script>
        window.onload = function() {
            window.ui = SwaggerUIBundle({
                url: "/api-docs/openapi.yml",
                dom_id: '#swagger-ui',
                deepLinking: true,
                presets: [
                    SwaggerUIBundle.presets.apis,
                    SwaggerUIStandalonePreset
                ],
                layout: "StandaloneLayout"
            });
        };
    </script>
</body>
</html>
"#;
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/html; charset=utf-8")],
        html,
    )
}

/// Recalculates every tradie's lead scores on a fixed interval.
///
/// The first run happens one full interval after startup.
fn spawn_lead_refresh(pool: sqlx::PgPool, every: Duration) {
    tokio::spawn(async move {
        let service = LeadScoringService::new(pool);
        let mut interval = tokio::time::interval(every);
        interval.tick().await;

        loop {
            interval.tick().await;
            if let Err(e) = service.recalculate_all_tradies().await {
                tracing::error!("Scheduled lead refresh failed: {}", e);
            }
        }
    });
}

/// Main entry point for the application.
///
/// Sets up tracing, configuration, the database pool and schema, the
/// optional background refresh, and the HTTP routes and middleware, then
/// starts the Axum server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tradie_leads_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize database connection pool
    let db = Database::with_max_connections(&config.database_url, config.db_max_connections)
        .await?;
    tracing::info!("Database connection pool established");

    db.migrate().await?;
    tracing::info!("Database schema up to date");

    if config.lead_refresh_interval_secs > 0 {
        spawn_lead_refresh(
            db.pool.clone(),
            Duration::from_secs(config.lead_refresh_interval_secs),
        );
    }

    // Build application state
    let app_state = Arc::new(AppState {
        db: db.pool.clone(),
        config: config.clone(),
        presence: Arc::new(ConnectionRegistry::new()),
    });

    // Configure per-IP rate limiter
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(config.rate_limit_per_second)
            .burst_size(config.rate_limit_burst)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limit configuration"))?,
    );

    // Build protected routes with security layers
    let protected_routes = Router::new()
        // API Documentation
        .route("/docs", get(serve_swagger_ui))
        .route("/api-docs/openapi.yml", get(serve_openapi_spec))
        // Lead scoring
        .route(
            "/api/v1/tradies/:id/lead-scores/recalculate",
            post(handlers::recalculate_tradie_scores),
        )
        .route("/api/v1/tradies/:id/leads", get(handlers::get_tradie_leads))
        .route(
            "/api/v1/lead-scores/recalculate",
            post(handlers::refresh_all_lead_scores),
        )
        // Customer quality
        .route(
            "/api/v1/customers/:id/quality/recalculate",
            post(handlers::recalculate_customer_quality),
        )
        .route(
            "/api/v1/customers/:id/quality",
            get(handlers::get_customer_quality),
        )
        // Price benchmarks
        .route("/api/v1/benchmarks", get(handlers::get_benchmark))
        .route(
            "/api/v1/quotes/:id/price-comparison",
            get(handlers::compare_quote_price),
        )
        .route(
            "/api/v1/tradies/:id/quotes/price-comparison",
            get(handlers::get_tradie_quotes_comparison),
        )
        // Presence
        .route("/api/v1/presence/:user_id", get(handlers::get_presence))
        .route(
            "/api/v1/presence/:user_id/sessions",
            post(handlers::connect_session),
        )
        .route(
            "/api/v1/presence/:user_id/sessions/:session_id",
            delete(handlers::disconnect_session),
        )
        .layer(
            ServiceBuilder::new()
                // Request size limit: 1MB max payload
                .layer(RequestBodyLimitLayer::new(1024 * 1024))
                // Dropping a timed-out request rolls back its transaction
                .layer(TimeoutLayer::new(Duration::from_secs(
                    config.request_timeout_secs,
                )))
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    // Health check bypasses rate limiting
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
