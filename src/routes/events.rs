use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use chrono::NaiveDateTime;
use serde::Deserialize;

use crate::db::{CreateSlot, Slot, SlotStatus, UpdateSlot};
use crate::error::AppResult;
use crate::routes::auth::AuthUser;
use crate::services::slots::SlotService;
use crate::AppState;

/// Routes for the caller's own calendar slots.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_mine).post(create_event))
        .route(
            "/:id",
            get(get_event).put(update_event).delete(delete_event),
        )
        .route("/:id/swappable", put(set_swappable))
}

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
}

#[derive(Debug, Deserialize)]
pub struct UpdateEventRequest {
    pub title: Option<String>,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    pub status: Option<SlotStatus>,
}

#[derive(Debug, Deserialize)]
pub struct SwappableRequest {
    pub swappable: bool,
}

async fn create_event(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<CreateEventRequest>,
) -> AppResult<(StatusCode, Json<Slot>)> {
    let slot = SlotService::create_slot(
        &state.db,
        &user,
        CreateSlot {
            title: request.title,
            start_time: request.start_time,
            end_time: request.end_time,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(slot)))
}

async fn list_mine(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<Slot>>> {
    Ok(Json(SlotService::list_mine(&state.db, &user).await?))
}

async fn get_event(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Slot>> {
    Ok(Json(SlotService::get_slot(&state.db, &user, &id).await?))
}

async fn update_event(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(request): Json<UpdateEventRequest>,
) -> AppResult<Json<Slot>> {
    let update = UpdateSlot {
        title: request.title,
        start_time: request.start_time,
        end_time: request.end_time,
        status: request.status,
    };

    Ok(Json(
        SlotService::update_slot(&state.db, &user, &id, update).await?,
    ))
}

async fn set_swappable(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(request): Json<SwappableRequest>,
) -> AppResult<Json<Slot>> {
    Ok(Json(
        SlotService::set_swappable(&state.db, &user, &id, request.swappable).await?,
    ))
}

async fn delete_event(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    SlotService::delete_slot(&state.db, &user, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
