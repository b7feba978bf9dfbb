//! Offseason Conversion API Server
//!
//! Serves certificate checks, conversions and upgrade checkout for the
//! offseason upgrade site.

use std::net::SocketAddr;

use axum::http::{header, HeaderValue, Method};
use axum::middleware;
use offseason_api::{create_router, security::security_headers_middleware, AppState, Config};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,offseason_api=debug,offseason_conversion=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        "Starting Offseason Conversion API v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Missing credentials stop the process here, before any request is served
    let config = Config::from_env()?;
    tracing::info!(
        acuity_base_url = %config.engine.acuity.base_url,
        offseason_bucket = %config.engine.acuity.offseason_appointment_type_id,
        winter_bucket = %config.engine.acuity.winter_appointment_type_id,
        winter_products = config.engine.winter_products.len(),
        require_paid_upgrade = config.engine.require_paid_upgrade,
        "Configuration loaded"
    );

    let state = AppState::from_config(&config)?;

    // Build CORS layer - restrict to allowed origins only
    let allowed_origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    tracing::info!(
        allowed_origins = ?allowed_origins,
        "CORS configured with {} allowed origins",
        allowed_origins.len()
    );

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::ORIGIN])
        .expose_headers([header::CONTENT_TYPE]);

    let app = create_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .layer(middleware::from_fn(security_headers_middleware)),
    );

    // Parse bind address
    let addr: SocketAddr = config.bind_address.parse()?;
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
