pub mod addresses;
pub mod subnets;

use axum::{
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::types::HealthResponse;
use subnets::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health))
        // Subnet management
        .route("/api/subnets", post(subnets::create_subnet))
        .route("/api/subnets", get(subnets::list_subnets))
        .route("/api/subnets/check-overlap", post(subnets::check_overlap))
        .route("/api/subnets/:id", get(subnets::get_subnet))
        .route("/api/subnets/:id", put(subnets::update_subnet))
        .route("/api/subnets/:id", delete(subnets::delete_subnet))
        .route("/api/subnets/:id/generate-ips", post(subnets::generate_ips))
        .route("/api/subnets/:id/utilization", get(subnets::utilization))
        // Address pool
        .route("/api/ip-addresses", get(addresses::list_addresses))
        .route("/api/ip-addresses/:id/assign", post(addresses::assign_address))
        .route("/api/ip-addresses/:id/release", post(addresses::release_address))
        // The admin UI calls this API from another origin
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Health check endpoint
async fn health() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
        }),
    )
}
