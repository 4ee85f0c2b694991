use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row};

// ============================================================================
// Slot Models (calendar events that can be offered for a swap)
// ============================================================================

/// Lifecycle state of a slot.
///
/// `SwapPending` is only ever entered as a side effect of a swap proposal and
/// is left again when that proposal is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotStatus {
    Busy,
    Swappable,
    SwapPending,
}

impl SlotStatus {
    /// Convert from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "BUSY" => Some(SlotStatus::Busy),
            "SWAPPABLE" => Some(SlotStatus::Swappable),
            "SWAP_PENDING" => Some(SlotStatus::SwapPending),
            _ => None,
        }
    }

    /// Convert to the stored representation
    pub fn as_str(self) -> &'static str {
        match self {
            SlotStatus::Busy => "BUSY",
            SlotStatus::Swappable => "SWAPPABLE",
            SlotStatus::SwapPending => "SWAP_PENDING",
        }
    }
}

impl From<SlotStatus> for String {
    fn from(status: SlotStatus) -> Self {
        status.as_str().to_string()
    }
}

impl TryFrom<&str> for SlotStatus {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::from_str(value).ok_or_else(|| format!("Invalid slot status: {}", value))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slot {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub status: SlotStatus,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl<'r> FromRow<'r, SqliteRow> for Slot {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        Ok(Slot {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            title: row.try_get("title")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            status: SlotStatus::try_from(status.as_str())
                .map_err(|e| sqlx::Error::Decode(e.into()))?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSlot {
    pub title: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
}

/// Partial update of a slot; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSlot {
    pub title: Option<String>,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    pub status: Option<SlotStatus>,
}

/// A swappable slot as shown in the marketplace, with its owner's identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotWithOwner {
    #[serde(flatten)]
    pub slot: Slot,
    pub owner_name: String,
    pub owner_email: String,
}

impl<'r> FromRow<'r, SqliteRow> for SlotWithOwner {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(SlotWithOwner {
            slot: Slot::from_row(row)?,
            owner_name: row.try_get("owner_name")?,
            owner_email: row.try_get("owner_email")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_stored_form() {
        for status in [SlotStatus::Busy, SlotStatus::Swappable, SlotStatus::SwapPending] {
            assert_eq!(SlotStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(SlotStatus::from_str("swap_pending"), Some(SlotStatus::SwapPending));
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!(SlotStatus::try_from("FREE").is_err());
        assert_eq!(SlotStatus::from_str(""), None);
    }

    #[test]
    fn status_serializes_as_upper_snake_case() {
        let json = serde_json::to_string(&SlotStatus::SwapPending).unwrap();
        assert_eq!(json, "\"SWAP_PENDING\"");
        let parsed: SlotStatus = serde_json::from_str("\"SWAPPABLE\"").unwrap();
        assert_eq!(parsed, SlotStatus::Swappable);
    }
}
