use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::types::{OverlapEntry, PoolCounts};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("invalid CIDR '{0}': expected dotted-quad/prefix, e.g. 10.0.0.0/24")]
    InvalidCidrFormat(String),

    #[error("octet {octet} out of range in '{cidr}': octets must be 0-255")]
    OctetOutOfRange { cidr: String, octet: String },

    #[error("prefix /{prefix} out of range: must be between /{min} and /{max}")]
    PrefixOutOfRange { prefix: u32, min: u8, max: u8 },

    #[error("'{supplied}' has host bits set outside its mask; the network address is '{suggested}'")]
    MisalignedNetwork { supplied: String, suggested: String },

    #[error("'{0}' is not a valid IPv4 address")]
    InvalidAddress(String),

    #[error("gateway {gateway} is outside the usable range of {cidr}")]
    GatewayOutsideSubnet { gateway: String, cidr: String },

    #[error("overlaps with: {}", conflict_summary(.conflicts))]
    Overlap { conflicts: Vec<OverlapEntry> },

    #[error("subnet not found: {0}")]
    SubnetNotFound(String),

    #[error("address not found: {0}")]
    AddressNotFound(String),

    #[error(
        "subnet {subnet_id} already has an address pool ({} assigned, {} available); \
         pass regenerate to rebuild it",
        .counts.assigned,
        .counts.available
    )]
    PoolExists {
        subnet_id: String,
        counts: PoolCounts,
    },

    #[error("address {id} is {actual}, expected {expected}")]
    InvalidAddressState {
        id: String,
        expected: &'static str,
        actual: String,
    },

    #[error("storage error: {0}")]
    Storage(String),
}

fn conflict_summary(conflicts: &[OverlapEntry]) -> String {
    conflicts
        .iter()
        .map(|c| match &c.name {
            Some(name) => format!("{} ({})", name, c.cidr),
            None => c.cidr.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

impl Error {
    fn code(&self) -> &'static str {
        match self {
            Error::InvalidCidrFormat(_) | Error::InvalidAddress(_) => "invalid_format",
            Error::OctetOutOfRange { .. }
            | Error::PrefixOutOfRange { .. }
            | Error::GatewayOutsideSubnet { .. } => "out_of_range",
            Error::MisalignedNetwork { .. } => "misaligned_network",
            Error::Overlap { .. } => "overlap",
            Error::SubnetNotFound(_) | Error::AddressNotFound(_) => "not_found",
            Error::PoolExists { .. } => "pool_exists",
            Error::InvalidAddressState { .. } => "invalid_state",
            Error::Storage(_) => "storage",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Error::InvalidCidrFormat(_)
            | Error::OctetOutOfRange { .. }
            | Error::PrefixOutOfRange { .. }
            | Error::MisalignedNetwork { .. }
            | Error::InvalidAddress(_)
            | Error::GatewayOutsideSubnet { .. } => StatusCode::BAD_REQUEST,
            Error::SubnetNotFound(_) | Error::AddressNotFound(_) => StatusCode::NOT_FOUND,
            Error::Overlap { .. }
            | Error::PoolExists { .. }
            | Error::InvalidAddressState { .. } => StatusCode::CONFLICT,
            Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    suggested_cidr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    conflicts: Option<Vec<OverlapEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    counts: Option<PoolCounts>,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        if matches!(self, Error::Storage(_)) {
            tracing::error!("request failed: {}", self);
        }

        let body = ErrorBody {
            error: self.code(),
            message: self.to_string(),
            suggested_cidr: match &self {
                Error::MisalignedNetwork { suggested, .. } => Some(suggested.clone()),
                _ => None,
            },
            conflicts: match &self {
                Error::Overlap { conflicts } => Some(conflicts.clone()),
                _ => None,
            },
            counts: match &self {
                Error::PoolExists { counts, .. } => Some(*counts),
                _ => None,
            },
        };

        (self.status(), Json(body)).into_response()
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

impl From<r2d2::Error> for Error {
    fn from(e: r2d2::Error) -> Self {
        Error::Storage(e.to_string())
    }
}
