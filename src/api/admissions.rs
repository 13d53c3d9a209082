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

use super::events::by_date;
use super::{from_ms, non_blank, to_ms, ApiError, AppState};

const KIND: ResourceKind = ResourceKind::AdmissionEvent;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admissions/events", post(create_event).get(list_events))
        .route("/admissions/events/:event_id/book", post(book_seat))
        .route("/admissions/events/:event_id/bookings", get(event_bookings))
        .route("/admissions/events/:event_id/withdraw", post(withdraw))
}

fn admission_error(err: EngineError) -> ApiError {
    match err {
        EngineError::NotFound(_) | EngineError::KindMismatch { .. } => {
            ApiError::not_found("Event not found")
        }
        EngineError::BookingNotFound(_) | EngineError::RegistrationNotFound { .. } => {
            ApiError::not_found("Booking not found")
        }
        EngineError::CapacityExceeded(_) => ApiError::conflict("Event is fully booked"),
        EngineError::Duplicate(_) => ApiError::conflict("You have already booked this event"),
        other => other.into(),
    }
}

/// Applicants are keyed by e-mail, compared case-insensitively.
fn applicant_key(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Deserialize)]
pub struct CreateAdmissionEvent {
    title: String,
    event_type: Option<String>,
    description: Option<String>,
    date_time: Option<DateTime<Utc>>,
    location: Option<String>,
    max_attendees: Option<u32>,
}

#[derive(Debug, Serialize)]
struct AdmissionEventView {
    id: Ulid,
    title: String,
    event_type: Option<String>,
    description: Option<String>,
    date_time: Option<DateTime<Utc>>,
    location: Option<String>,
    max_attendees: Option<u32>,
    current_attendees: u32,
}

impl From<ResourceInfo> for AdmissionEventView {
    fn from(info: ResourceInfo) -> Self {
        Self {
            id: info.id,
            title: info.name,
            event_type: info.details.category,
            description: info.details.description,
            date_time: info.starts_at.and_then(from_ms),
            location: info.details.location,
            max_attendees: info.capacity,
            current_attendees: info.occupancy,
        }
    }
}

#[derive(Debug, Serialize)]
struct SeatBookingView {
    booking_id: Ulid,
    event_id: Ulid,
    applicant_name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    note: Option<String>,
    status: BookingStatus,
    created_at: Option<DateTime<Utc>>,
}

impl From<Booking> for SeatBookingView {
    fn from(b: Booking) -> Self {
        let (applicant_name, email, phone) = match b.contact {
            Some(c) => (Some(c.name), c.email, c.phone),
            None => (None, Some(b.requester), None),
        };
        Self {
            booking_id: b.id,
            event_id: b.resource_id,
            applicant_name,
            email,
            phone,
            note: b.note,
            status: b.status,
            created_at: from_ms(b.created_at),
        }
    }
}

async fn create_event(
    State(state): State<AppState>,
    Json(body): Json<CreateAdmissionEvent>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let id = Ulid::new();
    let spec = ResourceSpec {
        kind: KIND,
        name: body.title,
        details: ResourceDetails {
            location: non_blank(body.location),
            description: non_blank(body.description),
            category: non_blank(body.event_type),
            ..Default::default()
        },
        capacity: body.max_attendees,
        starts_at: body.date_time.map(to_ms),
    };
    state.engine.create_resource(id, spec).await?;
    Ok((StatusCode::CREATED, Json(json!({ "event_id": id }))))
}

async fn list_events(State(state): State<AppState>) -> Json<Vec<AdmissionEventView>> {
    let mut events = state.engine.list_resources(Some(KIND)).await;
    by_date(&mut events);
    Json(events.into_iter().map(AdmissionEventView::from).collect())
}

#[derive(Debug, Deserialize)]
pub struct BookSeat {
    applicant_name: String,
    email: String,
    phone: Option<String>,
    note: Option<String>,
}

async fn book_seat(
    State(state): State<AppState>,
    Path(event_id): Path<Ulid>,
    Json(body): Json<BookSeat>,
) -> Result<Json<Value>, ApiError> {
    let requester = applicant_key(&body.email);
    if !requester.contains('@') {
        return Err(ApiError::validation("A valid e-mail address is required"));
    }
    let request = BookingRequest {
        contact: Some(Contact {
            name: body.applicant_name,
            email: Some(body.email.trim().to_string()),
            phone: non_blank(body.phone),
        }),
        requester,
        note: non_blank(body.note),
        ..Default::default()
    };
    let booking = state
        .engine
        .create_booking(Ulid::new(), event_id, KIND, request)
        .await
        .map_err(admission_error)?;
    Ok(Json(json!({ "booking_id": booking.id, "status": "confirmed" })))
}

/// All bookings in the order they were made, withdrawn ones included.
async fn event_bookings(
    State(state): State<AppState>,
    Path(event_id): Path<Ulid>,
) -> Result<Json<Vec<SeatBookingView>>, ApiError> {
    let info = state.engine.get_resource_info(event_id).await.map_err(admission_error)?;
    if info.kind != KIND {
        return Err(ApiError::not_found("Event not found"));
    }
    let mut bookings = state
        .engine
        .bookings_for_resource(event_id, true)
        .await
        .map_err(admission_error)?;
    bookings.sort_by_key(|b| (b.created_at, b.id));
    Ok(Json(bookings.into_iter().map(SeatBookingView::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct Withdraw {
    email: String,
}

async fn withdraw(
    State(state): State<AppState>,
    Path(event_id): Path<Ulid>,
    Json(body): Json<Withdraw>,
) -> Result<Json<Value>, ApiError> {
    let booking = state
        .engine
        .close_for_requester(
            event_id,
            KIND,
            &applicant_key(&body.email),
            BookingStatus::Withdrawn,
        )
        .await
        .map_err(admission_error)?;
    Ok(Json(json!({ "booking_id": booking.id, "status": "withdrawn" })))
}
