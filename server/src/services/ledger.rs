use rusqlite::{Connection, OptionalExtension};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};
use crate::types::{
    AddressState, IpAddress, IpAddressEntry, PoolCounts, ReservedReason, StatusFilter,
    UtilizationResponse,
};

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

/// Bind an address to a customer/service. The status guard lives in the
/// UPDATE itself, so two racing assigns resolve to exactly one winner; the
/// loser is told what state the row was actually in.
pub fn assign(
    conn: &Connection,
    address_id: &str,
    customer_id: &str,
    service_id: &str,
) -> Result<IpAddress> {
    let rows = conn.execute(
        "UPDATE ip_addresses SET status = 'assigned', customer_id = ?2, service_id = ?3, assigned_at = ?4
         WHERE address_id = ?1 AND status = 'available'",
        rusqlite::params![address_id, customer_id, service_id, now()],
    )?;

    if rows == 0 {
        return Err(wrong_state(conn, address_id, "available")?);
    }

    get_address(conn, address_id)
}

/// Return an assigned address to the pool, clearing its binding.
pub fn release(conn: &Connection, address_id: &str) -> Result<IpAddress> {
    let rows = conn.execute(
        "UPDATE ip_addresses SET status = 'available', customer_id = NULL, service_id = NULL, assigned_at = NULL
         WHERE address_id = ?1 AND status = 'assigned'",
        rusqlite::params![address_id],
    )?;

    if rows == 0 {
        return Err(wrong_state(conn, address_id, "assigned")?);
    }

    get_address(conn, address_id)
}

/// Zero affected rows means either a missing row or a row in the wrong
/// state; re-read to tell the caller which.
fn wrong_state(conn: &Connection, address_id: &str, expected: &'static str) -> Result<Error> {
    let actual: Option<String> = conn
        .query_row(
            "SELECT status FROM ip_addresses WHERE address_id = ?1",
            rusqlite::params![address_id],
            |row| row.get(0),
        )
        .optional()?;

    Ok(match actual {
        None => Error::AddressNotFound(address_id.to_string()),
        Some(actual) => Error::InvalidAddressState {
            id: address_id.to_string(),
            expected,
            actual,
        },
    })
}

pub fn get_address(conn: &Connection, address_id: &str) -> Result<IpAddress> {
    let row = conn
        .query_row(
            "SELECT address_id, subnet_id, address, address_num, status, reserved_reason,
                    customer_id, service_id, assigned_at, last_seen
             FROM ip_addresses WHERE address_id = ?1",
            rusqlite::params![address_id],
            raw_address_row,
        )
        .optional()?
        .ok_or_else(|| Error::AddressNotFound(address_id.to_string()))?;

    address_from_raw(row)
}

pub fn pool_counts(conn: &Connection, subnet_id: &str) -> Result<PoolCounts> {
    let mut stmt = conn.prepare(
        "SELECT status, COUNT(*) FROM ip_addresses WHERE subnet_id = ?1 GROUP BY status",
    )?;

    let mut counts = PoolCounts::default();
    let rows = stmt.query_map(rusqlite::params![subnet_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
    })?;

    for row in rows {
        let (status, count) = row?;
        match status.as_str() {
            "available" => counts.available = count,
            "assigned" => counts.assigned = count,
            "reserved" => counts.reserved = count,
            other => {
                return Err(Error::Storage(format!(
                    "subnet {} has rows with unknown status '{}'",
                    subnet_id, other
                )))
            }
        }
        counts.total += count;
    }

    Ok(counts)
}

pub fn utilization(conn: &Connection, subnet_id: &str) -> Result<UtilizationResponse> {
    let counts = pool_counts(conn, subnet_id)?;

    let percent = if counts.total == 0 {
        0
    } else {
        (counts.assigned as f64 / counts.total as f64 * 100.0).round() as u64
    };

    Ok(UtilizationResponse {
        subnet_id: subnet_id.to_string(),
        total: counts.total,
        assigned: counts.assigned,
        free: counts.available,
        percent,
    })
}

/// Address listing with the customer display join. `search` matches the
/// address text or the bound customer's names, case-insensitively.
pub fn list_by_subnet(
    conn: &Connection,
    subnet_id: &str,
    status: Option<StatusFilter>,
    search: Option<&str>,
) -> Result<Vec<IpAddressEntry>> {
    let mut stmt = conn.prepare(
        "SELECT a.address_id, a.subnet_id, a.address, a.address_num, a.status, a.reserved_reason,
                a.customer_id, a.service_id, a.assigned_at, a.last_seen,
                c.first_name, c.last_name, c.business_name
         FROM ip_addresses a
         LEFT JOIN customers c ON c.customer_id = a.customer_id
         WHERE a.subnet_id = ?1
           AND (?2 IS NULL OR a.status = ?2)
           AND (?3 IS NULL
                OR instr(lower(a.address), lower(?3)) > 0
                OR instr(lower(coalesce(c.first_name, '') || ' ' || coalesce(c.last_name, '')), lower(?3)) > 0
                OR instr(lower(coalesce(c.business_name, '')), lower(?3)) > 0)
         ORDER BY a.address_num",
    )?;

    let rows = stmt
        .query_map(
            rusqlite::params![subnet_id, status.map(|s| s.as_str()), search],
            |row| {
                let raw = raw_address_row(row)?;
                let first_name: Option<String> = row.get(10)?;
                let last_name: Option<String> = row.get(11)?;
                let business_name: Option<String> = row.get(12)?;
                Ok((raw, first_name, last_name, business_name))
            },
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(raw, first_name, last_name, business_name)| {
            Ok(IpAddressEntry {
                address: address_from_raw(raw)?,
                first_name,
                last_name,
                business_name,
            })
        })
        .collect()
}

/// Raw column tuple, turned into the typed model by `address_from_raw`.
struct RawAddressRow {
    id: String,
    subnet_id: String,
    address: String,
    address_num: i64,
    status: String,
    reserved_reason: Option<String>,
    customer_id: Option<String>,
    service_id: Option<String>,
    assigned_at: Option<i64>,
    last_seen: Option<i64>,
}

fn raw_address_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawAddressRow> {
    Ok(RawAddressRow {
        id: row.get(0)?,
        subnet_id: row.get(1)?,
        address: row.get(2)?,
        address_num: row.get(3)?,
        status: row.get(4)?,
        reserved_reason: row.get(5)?,
        customer_id: row.get(6)?,
        service_id: row.get(7)?,
        assigned_at: row.get(8)?,
        last_seen: row.get(9)?,
    })
}

/// The typed state makes an assigned-without-binding row unrepresentable;
/// a row that violates that is corruption, not input error.
fn address_from_raw(raw: RawAddressRow) -> Result<IpAddress> {
    let state = match raw.status.as_str() {
        "available" => AddressState::Available,
        "assigned" => match (raw.customer_id, raw.service_id, raw.assigned_at) {
            (Some(customer_id), Some(service_id), Some(assigned_at)) => AddressState::Assigned {
                customer_id,
                service_id,
                assigned_at,
            },
            _ => {
                return Err(Error::Storage(format!(
                    "address {} is assigned but carries no binding",
                    raw.id
                )))
            }
        },
        "reserved" => {
            let reason = raw
                .reserved_reason
                .as_deref()
                .and_then(ReservedReason::from_db)
                .ok_or_else(|| {
                    Error::Storage(format!("address {} is reserved without a reason", raw.id))
                })?;
            AddressState::Reserved { reason }
        }
        other => {
            return Err(Error::Storage(format!(
                "address {} has unknown status '{}'",
                raw.id, other
            )))
        }
    };

    Ok(IpAddress {
        id: raw.id,
        subnet_id: raw.subnet_id,
        address: raw.address,
        address_num: raw.address_num as u32,
        state,
        last_seen: raw.last_seen,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_test_db;
    use crate::services::pool::{self, GatewayConvention};
    use crate::services::subnet_store;
    use crate::types::{AllocationMode, CreateSubnetRequest, SubnetKind};

    fn seeded_subnet(conn: &Connection, cidr: &str) -> String {
        let subnet = subnet_store::create_subnet(
            conn,
            &CreateSubnetRequest {
                router_id: "router-1".to_string(),
                cidr: cidr.to_string(),
                kind: SubnetKind::Private,
                allocation: AllocationMode::Dynamic,
                name: None,
                description: None,
                gateway: None,
            },
        )
        .unwrap();
        pool::generate_pool(conn, &subnet.id, false, GatewayConvention::FirstUsable).unwrap();
        subnet.id
    }

    fn first_available(conn: &Connection, subnet_id: &str) -> IpAddress {
        list_by_subnet(conn, subnet_id, Some(StatusFilter::Available), None)
            .unwrap()
            .into_iter()
            .next()
            .unwrap()
            .address
    }

    #[test]
    fn assign_release_cycle() {
        let conn = open_test_db();
        let subnet_id = seeded_subnet(&conn, "10.0.0.0/28");
        let addr = first_available(&conn, &subnet_id);

        let assigned = assign(&conn, &addr.id, "cust-42", "svc-9").unwrap();
        match &assigned.state {
            AddressState::Assigned {
                customer_id,
                service_id,
                assigned_at,
            } => {
                assert_eq!(customer_id, "cust-42");
                assert_eq!(service_id, "svc-9");
                assert!(*assigned_at > 0);
            }
            other => panic!("expected assigned, got {:?}", other),
        }

        let released = release(&conn, &assigned.id).unwrap();
        assert_eq!(released.state, AddressState::Available);
    }

    #[test]
    fn double_assign_fails_with_state_error() {
        let conn = open_test_db();
        let subnet_id = seeded_subnet(&conn, "10.0.1.0/28");
        let addr = first_available(&conn, &subnet_id);

        assign(&conn, &addr.id, "cust-1", "svc-1").unwrap();
        let err = assign(&conn, &addr.id, "cust-2", "svc-2").unwrap_err();
        match err {
            Error::InvalidAddressState {
                expected, actual, ..
            } => {
                assert_eq!(expected, "available");
                assert_eq!(actual, "assigned");
            }
            other => panic!("expected state error, got {:?}", other),
        }

        // First binding is untouched
        let current = get_address(&conn, &addr.id).unwrap();
        match current.state {
            AddressState::Assigned { customer_id, .. } => assert_eq!(customer_id, "cust-1"),
            other => panic!("expected assigned, got {:?}", other),
        }
    }

    #[test]
    fn reserved_rows_refuse_assignment() {
        let conn = open_test_db();
        let subnet_id = seeded_subnet(&conn, "10.0.2.0/28");
        let reserved = list_by_subnet(&conn, &subnet_id, Some(StatusFilter::Reserved), None)
            .unwrap()
            .into_iter()
            .next()
            .unwrap()
            .address;

        let err = assign(&conn, &reserved.id, "cust-1", "svc-1").unwrap_err();
        assert!(matches!(err, Error::InvalidAddressState { .. }));
    }

    #[test]
    fn release_of_available_row_is_a_state_error() {
        let conn = open_test_db();
        let subnet_id = seeded_subnet(&conn, "10.0.3.0/28");
        let addr = first_available(&conn, &subnet_id);

        let err = release(&conn, &addr.id).unwrap_err();
        assert!(matches!(err, Error::InvalidAddressState { .. }));
    }

    #[test]
    fn missing_address_is_not_found() {
        let conn = open_test_db();
        assert!(matches!(
            assign(&conn, "nope", "c", "s").unwrap_err(),
            Error::AddressNotFound(_)
        ));
        assert!(matches!(
            release(&conn, "nope").unwrap_err(),
            Error::AddressNotFound(_)
        ));
    }

    #[test]
    fn utilization_arithmetic() {
        let conn = open_test_db();
        let subnet_id = seeded_subnet(&conn, "10.4.0.0/24");

        // Assign 64 of the 256 addresses
        let available = list_by_subnet(&conn, &subnet_id, Some(StatusFilter::Available), None).unwrap();
        for entry in available.iter().take(64) {
            assign(&conn, &entry.address.id, "cust", "svc").unwrap();
        }

        let util = utilization(&conn, &subnet_id).unwrap();
        assert_eq!(util.total, 256);
        assert_eq!(util.assigned, 64);
        assert_eq!(util.free, 254 - 64);
        assert_eq!(util.percent, 25);
    }

    #[test]
    fn utilization_of_empty_pool_is_zero() {
        let conn = open_test_db();
        let util = utilization(&conn, "no-pool").unwrap();
        assert_eq!(util.total, 0);
        assert_eq!(util.percent, 0);
    }

    #[test]
    fn search_matches_address_text_and_customer_names() {
        let conn = open_test_db();
        let subnet_id = seeded_subnet(&conn, "10.5.0.0/28");

        conn.execute(
            "INSERT INTO customers (customer_id, first_name, last_name, business_name)
             VALUES ('cust-42', 'Ada', 'Lovelace', 'Analytical Engines Ltd')",
            [],
        )
        .unwrap();

        let addr = first_available(&conn, &subnet_id);
        assign(&conn, &addr.id, "cust-42", "svc-1").unwrap();

        // By address fragment
        let by_addr = list_by_subnet(&conn, &subnet_id, None, Some("10.5.0.")).unwrap();
        assert_eq!(by_addr.len(), 16);

        // By customer name, case-insensitive
        let by_name = list_by_subnet(&conn, &subnet_id, None, Some("lovelace")).unwrap();
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].address.id, addr.id);
        assert_eq!(by_name[0].first_name.as_deref(), Some("Ada"));

        // By business name
        let by_biz = list_by_subnet(&conn, &subnet_id, None, Some("analytical")).unwrap();
        assert_eq!(by_biz.len(), 1);

        // No match
        let none = list_by_subnet(&conn, &subnet_id, None, Some("babbage")).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn status_filter_narrows_the_listing() {
        let conn = open_test_db();
        let subnet_id = seeded_subnet(&conn, "10.6.0.0/29");

        let reserved =
            list_by_subnet(&conn, &subnet_id, Some(StatusFilter::Reserved), None).unwrap();
        assert_eq!(reserved.len(), 2);

        let available =
            list_by_subnet(&conn, &subnet_id, Some(StatusFilter::Available), None).unwrap();
        assert_eq!(available.len(), 6);

        let assigned =
            list_by_subnet(&conn, &subnet_id, Some(StatusFilter::Assigned), None).unwrap();
        assert!(assigned.is_empty());
    }
}
