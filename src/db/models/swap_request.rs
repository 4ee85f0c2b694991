use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row};

// ============================================================================
// Swap Request Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SwapRequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl SwapRequestStatus {
    /// Convert from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PENDING" => Some(SwapRequestStatus::Pending),
            "ACCEPTED" => Some(SwapRequestStatus::Accepted),
            "REJECTED" => Some(SwapRequestStatus::Rejected),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SwapRequestStatus::Pending => "PENDING",
            SwapRequestStatus::Accepted => "ACCEPTED",
            SwapRequestStatus::Rejected => "REJECTED",
        }
    }

    pub fn is_resolved(self) -> bool {
        !matches!(self, SwapRequestStatus::Pending)
    }
}

impl TryFrom<&str> for SwapRequestStatus {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::from_str(value).ok_or_else(|| format!("Invalid swap request status: {}", value))
    }
}

/// A proposal to exchange `requester_slot_id` for `target_slot_id`.
///
/// `requester_id` and `target_user_id` record the owners of the two slots at
/// the time the proposal was made; they are not rewritten when an accepted
/// swap exchanges the slots' owners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapRequest {
    pub id: String,
    pub requester_slot_id: String,
    pub target_slot_id: String,
    pub requester_id: String,
    pub target_user_id: String,
    pub status: SwapRequestStatus,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl SwapRequest {
    /// Whether this request references `slot_id` on either side.
    pub fn references(&self, slot_id: &str) -> bool {
        self.requester_slot_id == slot_id || self.target_slot_id == slot_id
    }
}

impl<'r> FromRow<'r, SqliteRow> for SwapRequest {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        Ok(SwapRequest {
            id: row.try_get("id")?,
            requester_slot_id: row.try_get("requester_slot_id")?,
            target_slot_id: row.try_get("target_slot_id")?,
            requester_id: row.try_get("requester_id")?,
            target_user_id: row.try_get("target_user_id")?,
            status: SwapRequestStatus::try_from(status.as_str())
                .map_err(|e| sqlx::Error::Decode(e.into()))?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// A swap request joined with the details of both slots and both users,
/// the shape returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapRequestView {
    #[serde(flatten)]
    pub request: SwapRequest,

    pub requester_slot_title: String,
    pub requester_slot_start: NaiveDateTime,
    pub requester_slot_end: NaiveDateTime,
    pub target_slot_title: String,
    pub target_slot_start: NaiveDateTime,
    pub target_slot_end: NaiveDateTime,
    pub requester_name: String,
    pub target_user_name: String,
}

impl<'r> FromRow<'r, SqliteRow> for SwapRequestView {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(SwapRequestView {
            request: SwapRequest::from_row(row)?,
            requester_slot_title: row.try_get("requester_slot_title")?,
            requester_slot_start: row.try_get("requester_slot_start")?,
            requester_slot_end: row.try_get("requester_slot_end")?,
            target_slot_title: row.try_get("target_slot_title")?,
            target_slot_start: row.try_get("target_slot_start")?,
            target_slot_end: row.try_get("target_slot_end")?,
            requester_name: row.try_get("requester_name")?,
            target_user_name: row.try_get("target_user_name")?,
        })
    }
}
