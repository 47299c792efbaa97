use serde::{Deserialize, Serialize};

// ============================================================================
// Subnet Types
// ============================================================================

/// Catalog label for a subnet. The engine's address math is IPv4; `Ipv6` is
/// carried through for inventory records imported from the plan catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubnetKind {
    Public,
    Private,
    Cgnat,
    Ipv6,
}

impl SubnetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubnetKind::Public => "public",
            SubnetKind::Private => "private",
            SubnetKind::Cgnat => "cgnat",
            SubnetKind::Ipv6 => "ipv6",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "public" => Some(SubnetKind::Public),
            "private" => Some(SubnetKind::Private),
            "cgnat" => Some(SubnetKind::Cgnat),
            "ipv6" => Some(SubnetKind::Ipv6),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationMode {
    Dynamic,
    Static,
}

impl AllocationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationMode::Dynamic => "dynamic",
            AllocationMode::Static => "static",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "dynamic" => Some(AllocationMode::Dynamic),
            "static" => Some(AllocationMode::Static),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subnet {
    pub id: String,
    pub router_id: String,
    pub cidr: String,
    pub kind: SubnetKind,
    pub allocation: AllocationMode,
    pub name: Option<String>,
    pub description: Option<String>,
    /// Explicit gateway override. When unset the conventional gateway is
    /// derived from the server-wide convention (first or last usable).
    pub gateway: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubnetRequest {
    pub router_id: String,
    pub cidr: String,
    pub kind: SubnetKind,
    #[serde(default = "default_allocation")]
    pub allocation: AllocationMode,
    pub name: Option<String>,
    pub description: Option<String>,
    pub gateway: Option<String>,
}

fn default_allocation() -> AllocationMode {
    AllocationMode::Dynamic
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubnetResponse {
    #[serde(flatten)]
    pub subnet: Subnet,
    /// Effective gateway: the explicit override if set, else the
    /// convention-derived usable address.
    pub gateway_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListSubnetsResponse {
    pub subnets: Vec<SubnetResponse>,
}

// ============================================================================
// Overlap Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckOverlapRequest {
    pub cidr: String,
    pub exclude_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlapEntry {
    pub id: String,
    pub name: Option<String>,
    pub cidr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckOverlapResponse {
    pub overlaps: bool,
    pub subnets: Vec<OverlapEntry>,
}

// ============================================================================
// Address Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservedReason {
    Network,
    Broadcast,
    Gateway,
}

impl ReservedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservedReason::Network => "network",
            ReservedReason::Broadcast => "broadcast",
            ReservedReason::Gateway => "gateway",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "network" => Some(ReservedReason::Network),
            "broadcast" => Some(ReservedReason::Broadcast),
            "gateway" => Some(ReservedReason::Gateway),
            _ => None,
        }
    }
}

/// Address state as a closed variant: an `assigned` address cannot exist
/// without its customer/service binding, and a `reserved` address always
/// knows why it is reserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AddressState {
    Available,
    Assigned {
        customer_id: String,
        service_id: String,
        assigned_at: i64,
    },
    Reserved {
        reason: ReservedReason,
    },
}

impl AddressState {
    pub fn status_str(&self) -> &'static str {
        match self {
            AddressState::Available => "available",
            AddressState::Assigned { .. } => "assigned",
            AddressState::Reserved { .. } => "reserved",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpAddress {
    pub id: String,
    pub subnet_id: String,
    pub address: String,
    #[serde(skip)]
    pub address_num: u32,
    #[serde(flatten)]
    pub state: AddressState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<i64>,
}

/// Listing row: the address plus display fields joined from the customer
/// directory replica.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpAddressEntry {
    #[serde(flatten)]
    pub address: IpAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListAddressesResponse {
    pub addresses: Vec<IpAddressEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    Available,
    Assigned,
    Reserved,
}

impl StatusFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusFilter::Available => "available",
            StatusFilter::Assigned => "assigned",
            StatusFilter::Reserved => "reserved",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListAddressesQuery {
    pub subnet_id: String,
    pub status: Option<StatusFilter>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignAddressRequest {
    pub customer_id: String,
    pub service_id: String,
}

// ============================================================================
// Pool Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratePoolRequest {
    #[serde(default)]
    pub regenerate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratePoolResponse {
    pub count: u64,
    pub regenerated: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolCounts {
    pub total: u64,
    pub available: u64,
    pub assigned: u64,
    pub reserved: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UtilizationResponse {
    pub subnet_id: String,
    pub total: u64,
    pub assigned: u64,
    pub free: u64,
    pub percent: u64,
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}
