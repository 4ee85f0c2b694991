use sqlx::{SqliteConnection, SqlitePool};

use crate::db::{
    Slot, SlotRepository, SlotStatus, SwapRequest, SwapRequestRepository, SwapRequestStatus,
    SwapRequestView, User,
};
use crate::error::{AppError, AppResult, SwapError};
use crate::services::begin_write;

/// The swap-request state machine.
///
/// ```text
///   propose ──► PENDING ──respond(accept)──► ACCEPTED  (owners exchanged, both BUSY)
///                  │
///                  └────respond(reject)────► REJECTED  (both back to SWAPPABLE)
/// ```
///
/// While a request is PENDING both of its slots are SWAP_PENDING. Every
/// transition runs in a single transaction and only writes rows whose status
/// still matches what was read.
pub struct SwapService;

impl SwapService {
    fn slot_not_found() -> SwapError {
        SwapError::NotFound("Slot".to_string())
    }

    fn request_not_found() -> SwapError {
        SwapError::NotFound("Swap request".to_string())
    }

    /// Offer `my_slot_id` in exchange for `their_slot_id`.
    ///
    /// Losing a race against another proposal (or a toggle) on either slot
    /// surfaces as `SlotLocked`.
    pub async fn propose_swap(
        db: &SqlitePool,
        requester: &User,
        my_slot_id: &str,
        their_slot_id: &str,
    ) -> AppResult<SwapRequestView> {
        Self::try_propose(db, requester, my_slot_id, their_slot_id)
            .await
            .map_err(|e| e.or_lost_race(SwapError::SlotLocked))
    }

    async fn try_propose(
        db: &SqlitePool,
        requester: &User,
        my_slot_id: &str,
        their_slot_id: &str,
    ) -> AppResult<SwapRequestView> {
        let mut tx = begin_write(db).await?;

        let mine = SlotRepository::find_by_id(&mut *tx, my_slot_id)
            .await?
            .ok_or_else(Self::slot_not_found)?;
        let theirs = SlotRepository::find_by_id(&mut *tx, their_slot_id)
            .await?
            .ok_or_else(Self::slot_not_found)?;

        Self::check_proposal(requester, &mine, &theirs)?;

        let locked = SlotRepository::transition_pair(
            &mut *tx,
            &mine.id,
            &theirs.id,
            SlotStatus::Swappable,
            SlotStatus::SwapPending,
        )
        .await?;
        if locked != 2 {
            return Err(SwapError::SlotLocked.into());
        }

        let request = SwapRequestRepository::create(&mut *tx, &mine, &theirs).await?;
        let view = Self::load_view(&mut *tx, &request.id).await?;
        tx.commit().await?;

        tracing::info!(
            "Swap request {} proposed by {}: slot {} for slot {}",
            request.id,
            requester.id,
            mine.id,
            theirs.id
        );
        Ok(view)
    }

    /// Proposal preconditions, in the order failures are reported.
    fn check_proposal(requester: &User, mine: &Slot, theirs: &Slot) -> Result<(), SwapError> {
        if mine.owner_id != requester.id {
            return Err(SwapError::NotOwner);
        }
        if theirs.owner_id == requester.id {
            return Err(SwapError::SelfSwap);
        }
        if mine.status == SlotStatus::SwapPending || theirs.status == SlotStatus::SwapPending {
            return Err(SwapError::SlotLocked);
        }
        if mine.status != SlotStatus::Swappable || theirs.status != SlotStatus::Swappable {
            return Err(SwapError::SlotNotSwappable);
        }
        Ok(())
    }

    /// Accept or reject a PENDING request. Only the owner of the target slot
    /// may respond.
    ///
    /// A responder that loses a race to another response sees
    /// `AlreadyResolved`.
    pub async fn respond(
        db: &SqlitePool,
        responder: &User,
        request_id: &str,
        accept: bool,
    ) -> AppResult<SwapRequestView> {
        match Self::try_respond(db, responder, request_id, accept).await {
            Err(AppError::Swap(SwapError::SlotLocked)) => {
                match SwapRequestRepository::find_by_id(db, request_id).await? {
                    Some(request) if request.status.is_resolved() => Err(
                        SwapError::AlreadyResolved(request.status.as_str().to_string()).into(),
                    ),
                    _ => Err(SwapError::SlotLocked.into()),
                }
            }
            other => other,
        }
    }

    async fn try_respond(
        db: &SqlitePool,
        responder: &User,
        request_id: &str,
        accept: bool,
    ) -> AppResult<SwapRequestView> {
        let mut tx = begin_write(db).await?;

        let request = SwapRequestRepository::find_by_id(&mut *tx, request_id)
            .await?
            .ok_or_else(Self::request_not_found)?;

        if request.target_user_id != responder.id {
            return Err(SwapError::NotAuthorized.into());
        }
        if request.status.is_resolved() {
            return Err(SwapError::AlreadyResolved(request.status.as_str().to_string()).into());
        }

        let outcome = if accept {
            SwapRequestStatus::Accepted
        } else {
            SwapRequestStatus::Rejected
        };
        if !SwapRequestRepository::resolve(&mut *tx, &request.id, outcome).await? {
            return Err(SwapError::SlotLocked.into());
        }

        let requester_slot = SlotRepository::find_by_id(&mut *tx, &request.requester_slot_id)
            .await?
            .ok_or_else(Self::slot_not_found)?;
        let target_slot = SlotRepository::find_by_id(&mut *tx, &request.target_slot_id)
            .await?
            .ok_or_else(Self::slot_not_found)?;

        let touched = if accept {
            SlotRepository::exchange_owners(&mut *tx, &requester_slot, &target_slot).await?
        } else {
            SlotRepository::transition_pair(
                &mut *tx,
                &requester_slot.id,
                &target_slot.id,
                SlotStatus::SwapPending,
                SlotStatus::Swappable,
            )
            .await?
        };
        if touched != 2 {
            return Err(anyhow::anyhow!(
                "slots of swap request {} were not both SWAP_PENDING",
                request.id
            )
            .into());
        }

        if accept {
            Self::reject_competing(&mut *tx, &request).await?;
        }

        let view = Self::load_view(&mut *tx, &request.id).await?;
        tx.commit().await?;

        tracing::info!(
            "Swap request {} {} by {}",
            request.id,
            outcome.as_str(),
            responder.id
        );
        Ok(view)
    }

    /// Auto-reject every other PENDING request that references either slot
    /// of an accepted request, releasing their other slot back to SWAPPABLE.
    ///
    /// With one PENDING request per slot this finds nothing; it keeps the
    /// invariant if proposals are ever allowed to queue.
    async fn reject_competing(conn: &mut SqliteConnection, accepted: &SwapRequest) -> AppResult<()> {
        let competing = SwapRequestRepository::find_pending_referencing(
            &mut *conn,
            &accepted.requester_slot_id,
            &accepted.target_slot_id,
            &accepted.id,
        )
        .await?;

        for other in competing {
            if !SwapRequestRepository::resolve(&mut *conn, &other.id, SwapRequestStatus::Rejected)
                .await?
            {
                continue;
            }

            for slot_id in [&other.requester_slot_id, &other.target_slot_id] {
                if !accepted.references(slot_id) {
                    SlotRepository::transition_status(
                        &mut *conn,
                        slot_id,
                        SlotStatus::SwapPending,
                        SlotStatus::Swappable,
                    )
                    .await?;
                }
            }

            tracing::info!(
                "Swap request {} auto-rejected after {} was accepted",
                other.id,
                accepted.id
            );
        }

        Ok(())
    }

    async fn load_view(conn: &mut SqliteConnection, request_id: &str) -> AppResult<SwapRequestView> {
        SwapRequestRepository::find_view_by_id(conn, request_id)
            .await?
            .ok_or_else(|| Self::request_not_found().into())
    }

    /// Requests addressed to `user`, newest first, PENDING and resolved.
    pub async fn list_incoming(db: &SqlitePool, user: &User) -> AppResult<Vec<SwapRequestView>> {
        SwapRequestRepository::list_incoming(db, &user.id).await
    }

    /// Requests made by `user`, newest first.
    pub async fn list_outgoing(db: &SqlitePool, user: &User) -> AppResult<Vec<SwapRequestView>> {
        SwapRequestRepository::list_outgoing(db, &user.id).await
    }
}
