//! Cloud seams and response mapping.
//!
//! The wire shapes here are one concrete JSON mapping; the pollers and the
//! repository only depend on the [`CloudApi`] / [`SchemaBackend`] traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use circuitwatch_core::{CircuitMode, CircuitState, GroupMemberLocation, WriteOutcome};
use serde::{Deserialize, Serialize};

use crate::error::CloudError;

// ─── Seams ──────────────────────────────────────────────────────────

/// Read side of the cloud API. Enables fake injection for testing.
#[async_trait]
pub trait CloudApi: Send + Sync {
    async fn fetch_state(&self) -> Result<StateResponse, CloudError>;

    async fn fetch_roster(&self, group_id: &str) -> Result<Vec<MemberRow>, CloudError>;
}

/// Generic table backend used by the roster write path.
///
/// Every call is idempotent from the caller's side ("create if missing",
/// "insert or replace").
#[async_trait]
pub trait SchemaBackend: Send + Sync {
    async fn ensure_table(&self, table: &str) -> WriteOutcome<(), CloudError>;

    async fn ensure_column(
        &self,
        table: &str,
        column: &str,
        column_type: &str,
    ) -> WriteOutcome<(), CloudError>;

    async fn upsert(&self, table: &str, row: &UpsertRow) -> WriteOutcome<(), CloudError>;
}

// ─── Wire types ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateResponse {
    pub mode: CircuitMode,
    #[serde(default)]
    pub message: Option<String>,
    /// Either a preformatted string or a bare number.
    #[serde(default)]
    pub temperature: Option<serde_json::Value>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub session_info: Option<serde_json::Value>,
}

impl From<StateResponse> for CircuitState {
    fn from(resp: StateResponse) -> Self {
        let temperature = match resp.temperature {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        CircuitState {
            mode: resp.mode,
            message: resp.message,
            temperature,
            updated_at: resp.updated_at.unwrap_or_else(|| "cloud".to_string()),
            session_info: resp.session_info.filter(|v| !v.is_null()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberRow {
    pub user_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub last_updated: DateTime<Utc>,
    #[serde(default = "default_sharing")]
    pub sharing: bool,
}

fn default_sharing() -> bool {
    true
}

impl From<MemberRow> for GroupMemberLocation {
    fn from(row: MemberRow) -> Self {
        GroupMemberLocation {
            user_id: row.user_id,
            display_name: row.display_name,
            latitude: row.latitude,
            longitude: row.longitude,
            last_updated: row.last_updated,
            sharing: row.sharing,
        }
    }
}

/// One keyed row for [`SchemaBackend::upsert`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsertRow {
    /// Columns forming the primary key.
    pub key: Vec<String>,
    pub data: serde_json::Map<String, serde_json::Value>,
}
