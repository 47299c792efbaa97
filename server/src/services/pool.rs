use rusqlite::Connection;
use std::net::Ipv4Addr;
use tracing::info;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::services::cidr::{self, NetworkRange};
use crate::services::{ledger, subnet_store};
use crate::types::{GeneratePoolResponse, Subnet};

/// Which usable address acts as the gateway when a subnet carries no
/// explicit override. Operators differ on this; first-usable is the
/// default convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayConvention {
    FirstUsable,
    LastUsable,
}

/// The gateway a subnet effectively uses: its explicit override when set,
/// else the convention-derived usable address.
pub fn effective_gateway(
    subnet: &Subnet,
    range: &NetworkRange,
    convention: GatewayConvention,
) -> Result<Ipv4Addr> {
    match &subnet.gateway {
        Some(gw) => gw
            .parse::<Ipv4Addr>()
            .map_err(|_| Error::Storage(format!("subnet {} has corrupt gateway '{}'", subnet.id, gw))),
        None => Ok(match convention {
            GatewayConvention::FirstUsable => range.first_usable(),
            GatewayConvention::LastUsable => range.last_usable(),
        }),
    }
}

/// (Re)build the full address inventory for a subnet.
///
/// Refuses with the current counts when rows already exist and
/// `regenerate` is false, so the caller can show the operator exactly what
/// a rebuild would destroy. With `regenerate` the old rows - bindings
/// included - are deleted and the pool is rebuilt, all inside one
/// transaction: a concurrent assign sees the old pool or the new pool,
/// never half of each.
///
/// Reserved rows are the network and broadcast addresses, plus the
/// effective gateway when it is not the first usable address (the
/// first-usable gateway stays in the assignable pool, matching how
/// operators inventory these ranges).
pub fn generate_pool(
    conn: &Connection,
    subnet_id: &str,
    regenerate: bool,
    convention: GatewayConvention,
) -> Result<GeneratePoolResponse> {
    let subnet = subnet_store::get_subnet(conn, subnet_id)?;
    let range = cidr::validate(&subnet.cidr)?;
    let gateway = effective_gateway(&subnet, &range, convention)?;

    let tx = crate::db::write_tx(conn)?;

    let counts = ledger::pool_counts(&tx, subnet_id)?;
    let regenerated = counts.total > 0;
    if regenerated && !regenerate {
        return Err(Error::PoolExists {
            subnet_id: subnet_id.to_string(),
            counts,
        });
    }
    if regenerated {
        info!(
            "Rebuilding pool for subnet {}: dropping {} rows ({} assigned)",
            subnet_id, counts.total, counts.assigned
        );
        tx.execute(
            "DELETE FROM ip_addresses WHERE subnet_id = ?1",
            rusqlite::params![subnet_id],
        )?;
    }

    let network = range.first();
    let broadcast = range.last();
    let gateway_num = u32::from(gateway);
    let reserve_gateway = gateway_num != network + 1;

    {
        let mut stmt = tx.prepare(
            "INSERT INTO ip_addresses (address_id, subnet_id, address, address_num, status, reserved_reason)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;

        for n in network..=broadcast {
            let (status, reason) = if n == network {
                ("reserved", Some("network"))
            } else if n == broadcast {
                ("reserved", Some("broadcast"))
            } else if reserve_gateway && n == gateway_num {
                ("reserved", Some("gateway"))
            } else {
                ("available", None)
            };

            stmt.execute(rusqlite::params![
                Uuid::new_v4().to_string(),
                subnet_id,
                Ipv4Addr::from(n).to_string(),
                n as i64,
                status,
                reason,
            ])?;
        }
    }

    tx.commit()?;

    let count = range.total_addresses();
    info!(
        "Generated pool for subnet {}: {} addresses ({})",
        subnet_id, count, subnet.cidr
    );

    Ok(GeneratePoolResponse { count, regenerated })
}
