use axum::{
    extract::{Path, Query, State},
    Json,
};
use tracing::info;

use crate::{
    api::subnets::AppState,
    db::execute_async,
    error::Error,
    services::{ledger, subnet_store},
    types::{AssignAddressRequest, IpAddress, ListAddressesQuery, ListAddressesResponse},
};
use std::sync::Arc;

/// GET /api/ip-addresses?subnet_id=&status=&search= - Filtered listing
/// with customer display fields
pub async fn list_addresses(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListAddressesQuery>,
) -> Result<Json<ListAddressesResponse>, Error> {
    let addresses = execute_async(&state.db, move |conn| {
        subnet_store::get_subnet(conn, &query.subnet_id)?;
        ledger::list_by_subnet(conn, &query.subnet_id, query.status, query.search.as_deref())
    })
    .await?;

    Ok(Json(ListAddressesResponse { addresses }))
}

/// POST /api/ip-addresses/:id/assign - Bind an available address to a
/// customer/service
pub async fn assign_address(
    State(state): State<Arc<AppState>>,
    Path(address_id): Path<String>,
    Json(req): Json<AssignAddressRequest>,
) -> Result<Json<IpAddress>, Error> {
    info!(
        "Assigning address: id={}, customer_id={}, service_id={}",
        address_id, req.customer_id, req.service_id
    );

    let address = execute_async(&state.db, move |conn| {
        ledger::assign(conn, &address_id, &req.customer_id, &req.service_id)
    })
    .await?;

    Ok(Json(address))
}

/// POST /api/ip-addresses/:id/release - Return an assigned address to the
/// pool
pub async fn release_address(
    State(state): State<Arc<AppState>>,
    Path(address_id): Path<String>,
) -> Result<Json<IpAddress>, Error> {
    info!("Releasing address: {}", address_id);

    let address = execute_async(&state.db, move |conn| ledger::release(conn, &address_id)).await?;

    Ok(Json(address))
}
