use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::db::{SlotWithOwner, SwapRequestView};
use crate::error::AppResult;
use crate::routes::auth::AuthUser;
use crate::services::{slots::SlotService, swaps::SwapService};
use crate::AppState;

/// Marketplace and swap negotiation routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/swappable-slots", get(swappable_slots))
        .route("/swap-request", post(propose_swap))
        .route("/swap-response/:id", post(respond_to_swap))
        .route("/swap-requests/incoming", get(incoming))
        .route("/swap-requests/outgoing", get(outgoing))
}

#[derive(Debug, Deserialize)]
pub struct ProposeSwapRequest {
    pub my_slot_id: String,
    pub their_slot_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SwapResponseRequest {
    pub accepted: bool,
}

async fn swappable_slots(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<SlotWithOwner>>> {
    Ok(Json(SlotService::list_swappable(&state.db, &user).await?))
}

async fn propose_swap(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<ProposeSwapRequest>,
) -> AppResult<(StatusCode, Json<SwapRequestView>)> {
    let view =
        SwapService::propose_swap(&state.db, &user, &request.my_slot_id, &request.their_slot_id)
            .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn respond_to_swap(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(request): Json<SwapResponseRequest>,
) -> AppResult<Json<SwapRequestView>> {
    Ok(Json(
        SwapService::respond(&state.db, &user, &id, request.accepted).await?,
    ))
}

async fn incoming(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<SwapRequestView>>> {
    Ok(Json(SwapService::list_incoming(&state.db, &user).await?))
}

async fn outgoing(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<SwapRequestView>>> {
    Ok(Json(SwapService::list_outgoing(&state.db, &user).await?))
}
