use chrono::NaiveDateTime;
use sqlx::SqlitePool;

use crate::db::{CreateSlot, Slot, SlotRepository, SlotStatus, SlotWithOwner, UpdateSlot, User};
use crate::error::{AppError, AppResult, SwapError};
use crate::services::begin_write;

const MAX_TITLE_LEN: usize = 200;

/// Slot CRUD and the BUSY/SWAPPABLE toggle.
///
/// Every mutation checks ownership and the SWAP_PENDING lock, then writes
/// conditionally on the status it observed inside the same transaction.
pub struct SlotService;

impl SlotService {
    pub fn validate_title(title: &str) -> AppResult<()> {
        if title.trim().is_empty() {
            return Err(AppError::Validation("Title cannot be empty".to_string()));
        }

        if title.chars().count() > MAX_TITLE_LEN {
            return Err(AppError::Validation(format!(
                "Title cannot exceed {} characters",
                MAX_TITLE_LEN
            )));
        }

        Ok(())
    }

    pub fn validate_range(start: NaiveDateTime, end: NaiveDateTime) -> Result<(), SwapError> {
        if start >= end {
            return Err(SwapError::InvalidRange);
        }
        Ok(())
    }

    fn not_found() -> SwapError {
        SwapError::NotFound("Slot".to_string())
    }

    /// Ownership and lock checks shared by every owner-only mutation.
    fn ensure_mutable_by(slot: &Slot, user: &User) -> Result<(), SwapError> {
        if slot.owner_id != user.id {
            return Err(SwapError::NotOwner);
        }
        if slot.status == SlotStatus::SwapPending {
            return Err(SwapError::SlotLocked);
        }
        Ok(())
    }

    pub async fn create_slot(db: &SqlitePool, owner: &User, input: CreateSlot) -> AppResult<Slot> {
        Self::validate_title(&input.title)?;
        Self::validate_range(input.start_time, input.end_time)?;

        let input = CreateSlot {
            title: input.title.trim().to_string(),
            ..input
        };
        let slot = SlotRepository::create(db, &owner.id, &input).await?;

        tracing::info!("User {} created slot {}", owner.id, slot.id);
        Ok(slot)
    }

    pub async fn list_mine(db: &SqlitePool, user: &User) -> AppResult<Vec<Slot>> {
        SlotRepository::list_by_owner(db, &user.id).await
    }

    /// A user's own slot. Other users' slots are reported as not found.
    pub async fn get_slot(db: &SqlitePool, user: &User, slot_id: &str) -> AppResult<Slot> {
        match SlotRepository::find_by_id(db, slot_id).await? {
            Some(slot) if slot.owner_id == user.id => Ok(slot),
            _ => Err(Self::not_found().into()),
        }
    }

    /// Every SWAPPABLE slot owned by someone other than `user`, earliest first.
    pub async fn list_swappable(db: &SqlitePool, user: &User) -> AppResult<Vec<SlotWithOwner>> {
        SlotRepository::list_swappable(db, &user.id).await
    }

    /// Toggle a slot between BUSY (`desired == false`) and SWAPPABLE.
    pub async fn set_swappable(
        db: &SqlitePool,
        user: &User,
        slot_id: &str,
        desired: bool,
    ) -> AppResult<Slot> {
        let mut tx = begin_write(db).await?;

        let slot = SlotRepository::find_by_id(&mut *tx, slot_id)
            .await?
            .ok_or_else(Self::not_found)?;
        Self::ensure_mutable_by(&slot, user)?;

        let target = if desired {
            SlotStatus::Swappable
        } else {
            SlotStatus::Busy
        };
        if slot.status == target {
            return Ok(slot);
        }

        if !SlotRepository::transition_status(&mut *tx, &slot.id, slot.status, target).await? {
            // only a proposal can have moved it since we read it
            return Err(SwapError::SlotLocked.into());
        }

        let updated = SlotRepository::find_by_id(&mut *tx, &slot.id)
            .await?
            .ok_or_else(Self::not_found)?;
        tx.commit().await?;

        tracing::info!(
            "Slot {} set to {} by {}",
            updated.id,
            updated.status.as_str(),
            user.id
        );
        Ok(updated)
    }

    /// Partial update of title, times and BUSY/SWAPPABLE status.
    pub async fn update_slot(
        db: &SqlitePool,
        user: &User,
        slot_id: &str,
        update: UpdateSlot,
    ) -> AppResult<Slot> {
        if update.status == Some(SlotStatus::SwapPending) {
            return Err(AppError::Validation(
                "SWAP_PENDING can only be set by proposing a swap".to_string(),
            ));
        }
        if let Some(ref title) = update.title {
            Self::validate_title(title)?;
        }

        let mut tx = begin_write(db).await?;

        let slot = SlotRepository::find_by_id(&mut *tx, slot_id)
            .await?
            .ok_or_else(Self::not_found)?;
        Self::ensure_mutable_by(&slot, user)?;

        let observed = slot.status;
        let merged = Slot {
            title: update
                .title
                .map(|t| t.trim().to_string())
                .unwrap_or(slot.title),
            start_time: update.start_time.unwrap_or(slot.start_time),
            end_time: update.end_time.unwrap_or(slot.end_time),
            status: update.status.unwrap_or(slot.status),
            ..slot
        };
        Self::validate_range(merged.start_time, merged.end_time)?;

        let updated = SlotRepository::update_if_status(&mut *tx, &merged, observed)
            .await?
            .ok_or(SwapError::SlotLocked)?;
        tx.commit().await?;

        tracing::info!("Slot {} updated by {}", updated.id, user.id);
        Ok(updated)
    }

    pub async fn delete_slot(db: &SqlitePool, user: &User, slot_id: &str) -> AppResult<()> {
        let mut tx = begin_write(db).await?;

        let slot = SlotRepository::find_by_id(&mut *tx, slot_id)
            .await?
            .ok_or_else(Self::not_found)?;
        Self::ensure_mutable_by(&slot, user)?;

        if !SlotRepository::delete_unlocked(&mut *tx, &slot.id).await? {
            return Err(SwapError::SlotLocked.into());
        }
        tx.commit().await?;

        tracing::info!("Slot {} deleted by {}", slot.id, user.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::db::{test_pool, CreateUser, UserRepository};

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 10)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    async fn user(db: &SqlitePool, name: &str) -> User {
        UserRepository::create(
            db,
            &CreateUser {
                name: name.to_string(),
                email: format!("{}@example.com", name.to_lowercase()),
                password_hash: "hash".to_string(),
            },
        )
        .await
        .unwrap()
    }

    fn standup() -> CreateSlot {
        CreateSlot {
            title: "Standup".to_string(),
            start_time: at(9, 0),
            end_time: at(9, 30),
        }
    }

    fn swap_err(err: AppError) -> SwapError {
        err.as_swap().cloned().unwrap_or_else(|| panic!("expected swap error, got: {:?}", err))
    }

    #[tokio::test]
    async fn create_rejects_inverted_or_empty_range() {
        let db = test_pool().await;
        let x = user(&db, "Xena").await;

        for (start, end) in [(at(10, 0), at(9, 0)), (at(9, 0), at(9, 0))] {
            let err = SlotService::create_slot(
                &db,
                &x,
                CreateSlot {
                    title: "Backwards".to_string(),
                    start_time: start,
                    end_time: end,
                },
            )
            .await
            .unwrap_err();
            assert_eq!(swap_err(err), SwapError::InvalidRange);
        }
    }

    #[tokio::test]
    async fn create_rejects_blank_title() {
        let db = test_pool().await;
        let x = user(&db, "Xena").await;
        let err = SlotService::create_slot(
            &db,
            &x,
            CreateSlot {
                title: "   ".to_string(),
                ..standup()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn toggle_is_owner_only() {
        let db = test_pool().await;
        let x = user(&db, "Xena").await;
        let y = user(&db, "Yuri").await;
        let slot = SlotService::create_slot(&db, &x, standup()).await.unwrap();

        let err = SlotService::set_swappable(&db, &y, &slot.id, true)
            .await
            .unwrap_err();
        assert_eq!(swap_err(err), SwapError::NotOwner);

        let slot = SlotService::set_swappable(&db, &x, &slot.id, true).await.unwrap();
        assert_eq!(slot.status, SlotStatus::Swappable);
        let slot = SlotService::set_swappable(&db, &x, &slot.id, false).await.unwrap();
        assert_eq!(slot.status, SlotStatus::Busy);
    }

    #[tokio::test]
    async fn pending_slots_cannot_be_toggled_updated_or_deleted() {
        let db = test_pool().await;
        let x = user(&db, "Xena").await;
        let slot = SlotService::create_slot(&db, &x, standup()).await.unwrap();
        SlotRepository::transition_status(&db, &slot.id, SlotStatus::Busy, SlotStatus::SwapPending)
            .await
            .unwrap();

        let err = SlotService::set_swappable(&db, &x, &slot.id, false)
            .await
            .unwrap_err();
        assert_eq!(swap_err(err), SwapError::SlotLocked);

        let err = SlotService::update_slot(
            &db,
            &x,
            &slot.id,
            UpdateSlot {
                title: Some("Renamed".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert_eq!(swap_err(err), SwapError::SlotLocked);

        let err = SlotService::delete_slot(&db, &x, &slot.id).await.unwrap_err();
        assert_eq!(swap_err(err), SwapError::SlotLocked);
    }

    #[tokio::test]
    async fn update_merges_fields_and_checks_range() {
        let db = test_pool().await;
        let x = user(&db, "Xena").await;
        let slot = SlotService::create_slot(&db, &x, standup()).await.unwrap();

        let err = SlotService::update_slot(
            &db,
            &x,
            &slot.id,
            UpdateSlot {
                start_time: Some(at(10, 0)),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert_eq!(swap_err(err), SwapError::InvalidRange);

        let updated = SlotService::update_slot(
            &db,
            &x,
            &slot.id,
            UpdateSlot {
                title: Some("Daily".to_string()),
                end_time: Some(at(10, 0)),
                status: Some(SlotStatus::Swappable),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.title, "Daily");
        assert_eq!(updated.start_time, at(9, 0));
        assert_eq!(updated.end_time, at(10, 0));
        assert_eq!(updated.status, SlotStatus::Swappable);
    }

    #[tokio::test]
    async fn update_cannot_set_swap_pending() {
        let db = test_pool().await;
        let x = user(&db, "Xena").await;
        let slot = SlotService::create_slot(&db, &x, standup()).await.unwrap();

        let err = SlotService::update_slot(
            &db,
            &x,
            &slot.id,
            UpdateSlot {
                status: Some(SlotStatus::SwapPending),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn delete_and_get_respect_ownership() {
        let db = test_pool().await;
        let x = user(&db, "Xena").await;
        let y = user(&db, "Yuri").await;
        let slot = SlotService::create_slot(&db, &x, standup()).await.unwrap();

        let err = SlotService::get_slot(&db, &y, &slot.id).await.unwrap_err();
        assert!(matches!(swap_err(err), SwapError::NotFound(_)));

        let err = SlotService::delete_slot(&db, &y, &slot.id).await.unwrap_err();
        assert_eq!(swap_err(err), SwapError::NotOwner);

        SlotService::delete_slot(&db, &x, &slot.id).await.unwrap();
        assert!(SlotService::list_mine(&db, &x).await.unwrap().is_empty());

        let err = SlotService::delete_slot(&db, &x, &slot.id).await.unwrap_err();
        assert!(matches!(swap_err(err), SwapError::NotFound(_)));
    }
}
