use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub error: Option<String>,
    pub message: Option<String>,
    pub suggested_cidr: Option<String>,
    pub conflicts: Option<Vec<ConflictEntry>>,
    pub counts: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConflictEntry {
    pub id: String,
    pub name: Option<String>,
    pub cidr: String,
}
