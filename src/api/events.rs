use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use ulid::Ulid;

use crate::engine::EngineError;
use crate::model::*;

use super::{from_ms, non_blank, parse_user_key, to_ms, user_key, ApiError, AppState};

const KIND: ResourceKind = ResourceKind::CampusEvent;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/events", post(create_event).get(list_events))
        .route("/events/user/:user_id", get(user_events))
        .route("/events/:event_id/rsvp", post(rsvp))
        .route("/events/:event_id/cancel", post(cancel_rsvp))
        .route("/events/:event_id/registrations", get(registrations))
}

fn event_error(err: EngineError) -> ApiError {
    match err {
        EngineError::NotFound(_) | EngineError::KindMismatch { .. } => {
            ApiError::not_found("Event not found")
        }
        EngineError::BookingNotFound(_) | EngineError::RegistrationNotFound { .. } => {
            ApiError::not_found("Registration not found")
        }
        EngineError::CapacityExceeded(_) => ApiError::conflict("Event is fully booked"),
        other => other.into(),
    }
}

/// Events without a date sort last.
pub(super) fn by_date(events: &mut [ResourceInfo]) {
    events.sort_by(|a, b| {
        (a.starts_at.is_none(), a.starts_at, &a.name).cmp(&(b.starts_at.is_none(), b.starts_at, &b.name))
    });
}

#[derive(Debug, Deserialize)]
pub struct CreateEvent {
    title: String,
    description: Option<String>,
    category: Option<String>,
    date_time: DateTime<Utc>,
    location: Option<String>,
    organizer: Option<String>,
    max_attendees: Option<u32>,
}

#[derive(Debug, Serialize)]
struct EventView {
    id: Ulid,
    title: String,
    description: Option<String>,
    category: Option<String>,
    date_time: Option<DateTime<Utc>>,
    location: Option<String>,
    organizer: Option<String>,
    max_attendees: Option<u32>,
    current_attendees: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_registration_type: Option<String>,
}

impl From<ResourceInfo> for EventView {
    fn from(info: ResourceInfo) -> Self {
        Self {
            id: info.id,
            title: info.name,
            description: info.details.description,
            category: info.details.category,
            date_time: info.starts_at.and_then(from_ms),
            location: info.details.location,
            organizer: info.details.byline,
            max_attendees: info.capacity,
            current_attendees: info.occupancy,
            user_registration_type: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct RegistrationView {
    registration_id: Ulid,
    event_id: Ulid,
    user_id: Option<u64>,
    registration_type: Option<String>,
    note: Option<String>,
    status: BookingStatus,
    created_at: Option<DateTime<Utc>>,
}

impl From<Booking> for RegistrationView {
    fn from(b: Booking) -> Self {
        Self {
            registration_id: b.id,
            event_id: b.resource_id,
            user_id: parse_user_key(&b.requester),
            registration_type: b.label,
            note: b.note,
            status: b.status,
            created_at: from_ms(b.created_at),
        }
    }
}

async fn create_event(
    State(state): State<AppState>,
    Json(body): Json<CreateEvent>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let id = Ulid::new();
    let spec = ResourceSpec {
        kind: KIND,
        name: body.title,
        details: ResourceDetails {
            location: non_blank(body.location),
            description: non_blank(body.description),
            category: non_blank(body.category),
            byline: non_blank(body.organizer),
            tags: Vec::new(),
        },
        capacity: body.max_attendees,
        starts_at: Some(to_ms(body.date_time)),
    };
    state.engine.create_resource(id, spec).await?;
    Ok((StatusCode::CREATED, Json(json!({ "event_id": id }))))
}

async fn list_events(State(state): State<AppState>) -> Json<Vec<EventView>> {
    let mut events = state.engine.list_resources(Some(KIND)).await;
    by_date(&mut events);
    Json(events.into_iter().map(EventView::from).collect())
}

#[derive(Debug, Deserialize)]
pub struct Rsvp {
    user_id: u64,
    #[serde(default = "default_registration_type")]
    registration_type: String,
    note: Option<String>,
}

fn default_registration_type() -> String {
    "attendee".into()
}

/// Register, or change the registration type of an existing registration.
async fn rsvp(
    State(state): State<AppState>,
    Path(event_id): Path<Ulid>,
    Json(body): Json<Rsvp>,
) -> Result<Json<Value>, ApiError> {
    let engine = &state.engine;
    let requester = user_key(body.user_id);
    let registration_type =
        non_blank(Some(body.registration_type)).unwrap_or_else(default_registration_type);

    let request = BookingRequest {
        requester,
        label: Some(registration_type),
        note: non_blank(body.note),
        ..Default::default()
    };
    let (registration, outcome) = engine
        .register(Ulid::new(), event_id, KIND, request)
        .await
        .map_err(event_error)?;
    Ok(Json(json!({ "registration_id": registration.id, "status": outcome.as_str() })))
}

#[derive(Debug, Deserialize)]
pub struct CancelRsvp {
    user_id: u64,
}

async fn cancel_rsvp(
    State(state): State<AppState>,
    Path(event_id): Path<Ulid>,
    Json(body): Json<CancelRsvp>,
) -> Result<Json<Value>, ApiError> {
    let booking = state
        .engine
        .close_for_requester(event_id, KIND, &user_key(body.user_id), BookingStatus::Cancelled)
        .await
        .map_err(event_error)?;
    Ok(Json(json!({ "registration_id": booking.id, "status": "cancelled" })))
}

async fn user_events(
    State(state): State<AppState>,
    Path(user_id): Path<u64>,
) -> Json<Vec<EventView>> {
    let mut registered = state
        .engine
        .bookings_for_requester(KIND, &user_key(user_id), false)
        .await;
    registered.sort_by(|(a, _), (b, _)| {
        (a.starts_at.is_none(), a.starts_at).cmp(&(b.starts_at.is_none(), b.starts_at))
    });
    Json(
        registered
            .into_iter()
            .map(|(info, booking)| EventView {
                user_registration_type: booking.label,
                ..EventView::from(info)
            })
            .collect(),
    )
}

async fn registrations(
    State(state): State<AppState>,
    Path(event_id): Path<Ulid>,
) -> Result<Json<Vec<RegistrationView>>, ApiError> {
    let info = state.engine.get_resource_info(event_id).await.map_err(event_error)?;
    if info.kind != KIND {
        return Err(ApiError::not_found("Event not found"));
    }
    let bookings = state
        .engine
        .bookings_for_resource(event_id, false)
        .await
        .map_err(event_error)?;
    Ok(Json(bookings.into_iter().map(RegistrationView::from).collect()))
}
