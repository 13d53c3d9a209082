use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use ulid::Ulid;

use crate::engine::EngineError;
use crate::model::*;

use super::{from_ms, non_blank, parse_user_key, user_key, window, ApiError, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/rooms", post(create_room))
        .route("/rooms/available", get(available_rooms))
        .route("/rooms/book", post(book_room))
        .route("/rooms/bookings/:booking_id", delete(cancel_booking))
        .route("/rooms/:room_id/bookings", get(room_bookings))
        .route("/rooms/:room_id/free", get(free_windows))
}

fn room_error(err: EngineError) -> ApiError {
    match err {
        EngineError::NotFound(_) | EngineError::KindMismatch { .. } => {
            ApiError::not_found("Room not found")
        }
        EngineError::BookingNotFound(_) => ApiError::not_found("Booking not found"),
        EngineError::Conflict(_) => ApiError::conflict("Room already booked for that slot"),
        other => other.into(),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateRoom {
    name: String,
    location: Option<String>,
    capacity: u32,
    #[serde(default)]
    equipment: Vec<String>,
}

#[derive(Debug, Serialize)]
struct RoomView {
    id: Ulid,
    name: String,
    location: Option<String>,
    capacity: u32,
    equipment: Vec<String>,
}

impl From<ResourceInfo> for RoomView {
    fn from(info: ResourceInfo) -> Self {
        Self {
            id: info.id,
            name: info.name,
            location: info.details.location,
            capacity: info.capacity.unwrap_or(0),
            equipment: info.details.tags,
        }
    }
}

#[derive(Debug, Serialize)]
struct RoomBookingView {
    booking_id: Ulid,
    room_id: Ulid,
    user_id: Option<u64>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    purpose: Option<String>,
    status: BookingStatus,
    created_at: Option<DateTime<Utc>>,
}

impl From<Booking> for RoomBookingView {
    fn from(b: Booking) -> Self {
        Self {
            booking_id: b.id,
            room_id: b.resource_id,
            user_id: parse_user_key(&b.requester),
            start_time: b.span.and_then(|s| from_ms(s.start)),
            end_time: b.span.and_then(|s| from_ms(s.end)),
            purpose: b.label,
            status: b.status,
            created_at: from_ms(b.created_at),
        }
    }
}

async fn create_room(
    State(state): State<AppState>,
    Json(body): Json<CreateRoom>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let id = Ulid::new();
    let spec = ResourceSpec {
        kind: ResourceKind::Room,
        name: body.name,
        details: ResourceDetails {
            location: non_blank(body.location),
            tags: body.equipment,
            ..Default::default()
        },
        capacity: Some(body.capacity),
        starts_at: None,
    };
    state.engine.create_resource(id, spec).await?;
    Ok((StatusCode::CREATED, Json(json!({ "room_id": id }))))
}

#[derive(Debug, Deserialize)]
pub struct AvailableQuery {
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    min_capacity: Option<u32>,
}

/// Rooms, largest first; only those free for the whole slot when both
/// bounds are given.
async fn available_rooms(
    State(state): State<AppState>,
    Query(q): Query<AvailableQuery>,
) -> Result<Json<Vec<RoomView>>, ApiError> {
    let slot = match (q.start_time, q.end_time) {
        (Some(start), Some(end)) => Some(window(start, end)?),
        _ => None,
    };
    let rooms = state.engine.available_rooms(slot, q.min_capacity).await?;
    Ok(Json(rooms.into_iter().map(RoomView::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct BookRoom {
    room_id: Ulid,
    user_id: u64,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    purpose: Option<String>,
}

async fn book_room(
    State(state): State<AppState>,
    Json(body): Json<BookRoom>,
) -> Result<Json<Value>, ApiError> {
    let request = BookingRequest {
        requester: user_key(body.user_id),
        span: Some(window(body.start_time, body.end_time)?),
        label: non_blank(body.purpose),
        ..Default::default()
    };
    let booking = state
        .engine
        .create_booking(Ulid::new(), body.room_id, ResourceKind::Room, request)
        .await
        .map_err(room_error)?;
    Ok(Json(json!({ "booking_id": booking.id, "status": "confirmed" })))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Ulid>,
) -> Result<Json<Value>, ApiError> {
    let booking = state
        .engine
        .cancel_booking(booking_id, ResourceKind::Room)
        .await
        .map_err(|e| match e {
            EngineError::BookingNotFound(_) | EngineError::KindMismatch { .. } => {
                ApiError::not_found("Booking not found")
            }
            other => other.into(),
        })?;
    Ok(Json(json!({ "booking_id": booking.id, "status": "cancelled" })))
}

async fn room_bookings(
    State(state): State<AppState>,
    Path(room_id): Path<Ulid>,
) -> Result<Json<Vec<RoomBookingView>>, ApiError> {
    let info = state.engine.get_resource_info(room_id).await.map_err(room_error)?;
    if info.kind != ResourceKind::Room {
        return Err(ApiError::not_found("Room not found"));
    }
    let mut bookings = state
        .engine
        .bookings_for_resource(room_id, false)
        .await
        .map_err(room_error)?;
    bookings.sort_by_key(|b| b.span.map(|s| s.start));
    Ok(Json(bookings.into_iter().map(RoomBookingView::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct FreeQuery {
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct FreeWindow {
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
}

async fn free_windows(
    State(state): State<AppState>,
    Path(room_id): Path<Ulid>,
    Query(q): Query<FreeQuery>,
) -> Result<Json<Vec<FreeWindow>>, ApiError> {
    let query = window(q.start_time, q.end_time)?;
    let info = state.engine.get_resource_info(room_id).await.map_err(room_error)?;
    if info.kind != ResourceKind::Room {
        return Err(ApiError::not_found("Room not found"));
    }
    let free = state
        .engine
        .free_windows_for(room_id, query)
        .await
        .map_err(room_error)?;
    Ok(Json(
        free.into_iter()
            .map(|s| FreeWindow {
                start_time: from_ms(s.start),
                end_time: from_ms(s.end),
            })
            .collect(),
    ))
}
