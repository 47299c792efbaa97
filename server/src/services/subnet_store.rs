use rusqlite::{Connection, OptionalExtension};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::services::cidr::{self, NetworkRange};
use crate::services::overlap::{self, SubnetRange};
use crate::types::{AllocationMode, CreateSubnetRequest, Subnet, SubnetKind};

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

/// Validate the request's CIDR and gateway override together.
fn validated_range(req: &CreateSubnetRequest) -> Result<NetworkRange> {
    let range = cidr::validate(&req.cidr)?;
    if let Some(gateway) = &req.gateway {
        let gw = cidr::parse_address(gateway)?;
        if !range.is_usable(gw) {
            return Err(Error::GatewayOutsideSubnet {
                gateway: gw.to_string(),
                cidr: range.cidr(),
            });
        }
    }
    Ok(range)
}

/// Create a subnet. The overlap re-check and the INSERT run inside one
/// write transaction: SQLite's single-writer lock makes the pair atomic
/// against a concurrent create, so the detector's answer cannot go stale
/// between check and persist.
pub fn create_subnet(conn: &Connection, req: &CreateSubnetRequest) -> Result<Subnet> {
    let range = validated_range(req)?;

    let tx = crate::db::write_tx(conn)?;

    let conflicts = overlap::find_overlaps(&range, &load_ranges(&tx)?, None);
    if !conflicts.is_empty() {
        return Err(Error::Overlap { conflicts });
    }

    let subnet = Subnet {
        id: Uuid::new_v4().to_string(),
        router_id: req.router_id.clone(),
        cidr: range.cidr(),
        kind: req.kind,
        allocation: req.allocation,
        name: req.name.clone(),
        description: req.description.clone(),
        gateway: req.gateway.clone(),
        created_at: now(),
        updated_at: now(),
    };

    tx.execute(
        "INSERT INTO subnets (subnet_id, router_id, cidr, range_start, range_end, kind, allocation, name, description, gateway, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        rusqlite::params![
            subnet.id,
            subnet.router_id,
            subnet.cidr,
            range.first() as i64,
            range.last() as i64,
            subnet.kind.as_str(),
            subnet.allocation.as_str(),
            subnet.name,
            subnet.description,
            subnet.gateway,
            subnet.created_at,
            subnet.updated_at,
        ],
    )?;
    tx.commit()?;

    Ok(subnet)
}

/// Replace a subnet's fields, re-running the full validation pipeline with
/// the subnet itself excluded from the overlap check. Changing the CIDR
/// does not touch an existing pool; regeneration is a separate, explicit
/// call.
pub fn update_subnet(conn: &Connection, id: &str, req: &CreateSubnetRequest) -> Result<Subnet> {
    let range = validated_range(req)?;

    let tx = crate::db::write_tx(conn)?;

    let existing = get_subnet(&tx, id)?;

    let conflicts = overlap::find_overlaps(&range, &load_ranges(&tx)?, Some(id));
    if !conflicts.is_empty() {
        return Err(Error::Overlap { conflicts });
    }

    let updated = Subnet {
        id: existing.id.clone(),
        router_id: req.router_id.clone(),
        cidr: range.cidr(),
        kind: req.kind,
        allocation: req.allocation,
        name: req.name.clone(),
        description: req.description.clone(),
        gateway: req.gateway.clone(),
        created_at: existing.created_at,
        updated_at: now(),
    };

    tx.execute(
        "UPDATE subnets SET router_id = ?2, cidr = ?3, range_start = ?4, range_end = ?5, kind = ?6, allocation = ?7, name = ?8, description = ?9, gateway = ?10, updated_at = ?11
         WHERE subnet_id = ?1",
        rusqlite::params![
            updated.id,
            updated.router_id,
            updated.cidr,
            range.first() as i64,
            range.last() as i64,
            updated.kind.as_str(),
            updated.allocation.as_str(),
            updated.name,
            updated.description,
            updated.gateway,
            updated.updated_at,
        ],
    )?;
    tx.commit()?;

    Ok(updated)
}

/// Delete a subnet; its address pool goes with it via the cascade.
pub fn delete_subnet(conn: &Connection, id: &str) -> Result<()> {
    let rows_deleted = conn.execute(
        "DELETE FROM subnets WHERE subnet_id = ?1",
        rusqlite::params![id],
    )?;

    if rows_deleted == 0 {
        return Err(Error::SubnetNotFound(id.to_string()));
    }

    Ok(())
}

pub fn get_subnet(conn: &Connection, id: &str) -> Result<Subnet> {
    conn.query_row(
        "SELECT subnet_id, router_id, cidr, kind, allocation, name, description, gateway, created_at, updated_at
         FROM subnets WHERE subnet_id = ?1",
        rusqlite::params![id],
        row_to_subnet,
    )
    .optional()?
    .ok_or_else(|| Error::SubnetNotFound(id.to_string()))
}

pub fn list_subnets(conn: &Connection) -> Result<Vec<Subnet>> {
    let mut stmt = conn.prepare(
        "SELECT subnet_id, router_id, cidr, kind, allocation, name, description, gateway, created_at, updated_at
         FROM subnets ORDER BY created_at, subnet_id",
    )?;

    let subnets = stmt
        .query_map([], row_to_subnet)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(subnets)
}

/// All persisted ranges, for the overlap detector.
pub fn load_ranges(conn: &Connection) -> Result<Vec<SubnetRange>> {
    let mut stmt = conn.prepare(
        "SELECT subnet_id, name, cidr, range_start, range_end FROM subnets ORDER BY range_start",
    )?;

    let ranges = stmt
        .query_map([], |row| {
            Ok(SubnetRange {
                id: row.get(0)?,
                name: row.get(1)?,
                cidr: row.get(2)?,
                start: row.get::<_, i64>(3)? as u32,
                end: row.get::<_, i64>(4)? as u32,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(ranges)
}

fn row_to_subnet(row: &rusqlite::Row<'_>) -> rusqlite::Result<Subnet> {
    let kind: String = row.get(3)?;
    let allocation: String = row.get(4)?;
    Ok(Subnet {
        id: row.get(0)?,
        router_id: row.get(1)?,
        cidr: row.get(2)?,
        kind: SubnetKind::from_db(&kind).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                format!("unknown subnet kind '{}'", kind).into(),
            )
        })?,
        allocation: AllocationMode::from_db(&allocation).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                4,
                rusqlite::types::Type::Text,
                format!("unknown allocation mode '{}'", allocation).into(),
            )
        })?,
        name: row.get(5)?,
        description: row.get(6)?,
        gateway: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_test_db;
    use crate::types::{AllocationMode, SubnetKind};

    pub(crate) fn request(cidr: &str) -> CreateSubnetRequest {
        CreateSubnetRequest {
            router_id: "router-1".to_string(),
            cidr: cidr.to_string(),
            kind: SubnetKind::Private,
            allocation: AllocationMode::Dynamic,
            name: Some("office".to_string()),
            description: None,
            gateway: None,
        }
    }

    #[test]
    fn create_and_fetch_round_trip() {
        let conn = open_test_db();
        let created = create_subnet(&conn, &request("10.0.0.0/24")).unwrap();
        let fetched = get_subnet(&conn, &created.id).unwrap();

        assert_eq!(fetched.cidr, "10.0.0.0/24");
        assert_eq!(fetched.kind, SubnetKind::Private);
        assert_eq!(fetched.name.as_deref(), Some("office"));
    }

    #[test]
    fn overlapping_create_is_refused_with_conflict_list() {
        let conn = open_test_db();
        let first = create_subnet(&conn, &request("192.168.1.0/24")).unwrap();

        let err = create_subnet(&conn, &request("192.168.1.128/25")).unwrap_err();
        match err {
            Error::Overlap { conflicts } => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].id, first.id);
                assert_eq!(conflicts[0].cidr, "192.168.1.0/24");
            }
            other => panic!("expected overlap, got {:?}", other),
        }

        // Nothing was persisted for the refused subnet
        assert_eq!(list_subnets(&conn).unwrap().len(), 1);
    }

    #[test]
    fn update_excludes_itself_from_the_overlap_check() {
        let conn = open_test_db();
        let subnet = create_subnet(&conn, &request("10.1.0.0/24")).unwrap();
        create_subnet(&conn, &request("10.2.0.0/24")).unwrap();

        // Shrinking in place is fine even though it intersects its own range
        let updated = update_subnet(&conn, &subnet.id, &request("10.1.0.0/25")).unwrap();
        assert_eq!(updated.cidr, "10.1.0.0/25");
        assert_eq!(updated.created_at, subnet.created_at);

        // Growing over the neighbour is not
        let err = update_subnet(&conn, &subnet.id, &request("10.0.0.0/8")).unwrap_err();
        assert!(matches!(err, Error::Overlap { .. }));
    }

    #[test]
    fn gateway_override_must_be_usable() {
        let conn = open_test_db();

        let mut req = request("10.5.0.0/24");
        req.gateway = Some("10.5.0.0".to_string()); // network address
        assert!(matches!(
            create_subnet(&conn, &req).unwrap_err(),
            Error::GatewayOutsideSubnet { .. }
        ));

        req.gateway = Some("10.5.1.1".to_string()); // outside the range
        assert!(matches!(
            create_subnet(&conn, &req).unwrap_err(),
            Error::GatewayOutsideSubnet { .. }
        ));

        req.gateway = Some("10.5.0.254".to_string());
        assert!(create_subnet(&conn, &req).is_ok());
    }

    #[test]
    fn delete_missing_subnet_reports_not_found() {
        let conn = open_test_db();
        assert!(matches!(
            delete_subnet(&conn, "nope").unwrap_err(),
            Error::SubnetNotFound(_)
        ));
    }

    #[test]
    fn misaligned_cidr_never_reaches_the_store() {
        let conn = open_test_db();
        let err = create_subnet(&conn, &request("10.0.0.5/24")).unwrap_err();
        assert!(matches!(err, Error::MisalignedNetwork { .. }));
        assert!(list_subnets(&conn).unwrap().is_empty());
    }
}
