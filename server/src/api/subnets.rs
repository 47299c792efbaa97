use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use crate::{
    db::{execute_async, DbPool},
    error::Error,
    services::{cidr, ledger, overlap, pool, subnet_store, GatewayConvention},
    types::{
        CheckOverlapRequest, CheckOverlapResponse, CreateSubnetRequest, GeneratePoolRequest,
        GeneratePoolResponse, ListSubnetsResponse, Subnet, SubnetResponse, UtilizationResponse,
    },
};
use std::sync::Arc;

pub struct AppState {
    pub db: DbPool,
    pub gateway: GatewayConvention,
}

fn subnet_response(subnet: Subnet, convention: GatewayConvention) -> Result<SubnetResponse, Error> {
    // The stored CIDR is canonical, so this re-validation cannot fail on
    // healthy data.
    let range = cidr::validate(&subnet.cidr)?;
    let gateway_address = pool::effective_gateway(&subnet, &range, convention)?.to_string();
    Ok(SubnetResponse {
        subnet,
        gateway_address,
    })
}

/// POST /api/subnets - Create a subnet after validation and overlap check
pub async fn create_subnet(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSubnetRequest>,
) -> Result<(StatusCode, Json<SubnetResponse>), Error> {
    info!(
        "Creating subnet: router_id={}, cidr={}",
        req.router_id, req.cidr
    );

    let subnet = execute_async(&state.db, move |conn| {
        subnet_store::create_subnet(conn, &req)
    })
    .await?;

    info!("Subnet created: id={}, cidr={}", subnet.id, subnet.cidr);

    Ok((
        StatusCode::CREATED,
        Json(subnet_response(subnet, state.gateway)?),
    ))
}

/// GET /api/subnets - List all subnets
pub async fn list_subnets(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListSubnetsResponse>, Error> {
    let subnets = execute_async(&state.db, subnet_store::list_subnets).await?;

    let subnets = subnets
        .into_iter()
        .map(|s| subnet_response(s, state.gateway))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(ListSubnetsResponse { subnets }))
}

/// GET /api/subnets/:id - Get a subnet by ID
pub async fn get_subnet(
    State(state): State<Arc<AppState>>,
    Path(subnet_id): Path<String>,
) -> Result<Json<SubnetResponse>, Error> {
    let subnet = execute_async(&state.db, move |conn| {
        subnet_store::get_subnet(conn, &subnet_id)
    })
    .await?;

    Ok(Json(subnet_response(subnet, state.gateway)?))
}

/// PUT /api/subnets/:id - Update a subnet, excluding itself from the
/// overlap check
pub async fn update_subnet(
    State(state): State<Arc<AppState>>,
    Path(subnet_id): Path<String>,
    Json(req): Json<CreateSubnetRequest>,
) -> Result<Json<SubnetResponse>, Error> {
    info!("Updating subnet: id={}, cidr={}", subnet_id, req.cidr);

    let subnet = execute_async(&state.db, move |conn| {
        subnet_store::update_subnet(conn, &subnet_id, &req)
    })
    .await?;

    Ok(Json(subnet_response(subnet, state.gateway)?))
}

/// DELETE /api/subnets/:id - Delete a subnet and cascade its pool
pub async fn delete_subnet(
    State(state): State<Arc<AppState>>,
    Path(subnet_id): Path<String>,
) -> Result<StatusCode, Error> {
    info!("Deleting subnet: {}", subnet_id);

    execute_async(&state.db, move |conn| {
        subnet_store::delete_subnet(conn, &subnet_id)
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/subnets/check-overlap - Interactive pre-submit check; never
/// persists anything
pub async fn check_overlap(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CheckOverlapRequest>,
) -> Result<Json<CheckOverlapResponse>, Error> {
    let conflicts = execute_async(&state.db, move |conn| {
        let range = cidr::validate(&req.cidr)?;
        let existing = subnet_store::load_ranges(conn)?;
        Ok(overlap::find_overlaps(
            &range,
            &existing,
            req.exclude_id.as_deref(),
        ))
    })
    .await?;

    Ok(Json(CheckOverlapResponse {
        overlaps: !conflicts.is_empty(),
        subnets: conflicts,
    }))
}

/// POST /api/subnets/:id/generate-ips - Build (or explicitly rebuild) the
/// address pool
pub async fn generate_ips(
    State(state): State<Arc<AppState>>,
    Path(subnet_id): Path<String>,
    Json(req): Json<GeneratePoolRequest>,
) -> Result<Json<GeneratePoolResponse>, Error> {
    info!(
        "Generating pool: subnet_id={}, regenerate={}",
        subnet_id, req.regenerate
    );

    let convention = state.gateway;
    let resp = execute_async(&state.db, move |conn| {
        pool::generate_pool(conn, &subnet_id, req.regenerate, convention)
    })
    .await?;

    Ok(Json(resp))
}

/// GET /api/subnets/:id/utilization - Assignment counts and percentage
pub async fn utilization(
    State(state): State<Arc<AppState>>,
    Path(subnet_id): Path<String>,
) -> Result<Json<UtilizationResponse>, Error> {
    let resp = execute_async(&state.db, move |conn| {
        // 404 for an unknown subnet, 0% for a known one without a pool
        subnet_store::get_subnet(conn, &subnet_id)?;
        ledger::utilization(conn, &subnet_id)
    })
    .await?;

    Ok(Json(resp))
}
