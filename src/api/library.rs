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

use super::{from_ms, non_blank, parse_user_key, user_key, ApiError, AppState};

const KIND: ResourceKind = ResourceKind::LibraryBook;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/library/books", post(add_book))
        .route("/library/books/search", get(search_books))
        .route("/library/books/reserve", post(reserve_book))
        .route("/library/reservations/:reservation_id", delete(cancel_reservation))
        .route("/library/students/:student_id/reservations", get(student_reservations))
}

fn library_error(err: EngineError) -> ApiError {
    match err {
        EngineError::NotFound(_) | EngineError::KindMismatch { .. } => {
            ApiError::not_found("Book not found")
        }
        EngineError::BookingNotFound(_) => ApiError::not_found("Reservation not found"),
        EngineError::CapacityExceeded(_) => ApiError::conflict("No copies available"),
        EngineError::Duplicate(_) => ApiError::conflict("You have already reserved this book"),
        other => other.into(),
    }
}

#[derive(Debug, Deserialize)]
pub struct AddBook {
    title: String,
    author: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
    available_copies: u32,
}

#[derive(Debug, Serialize)]
struct BookView {
    id: Ulid,
    title: String,
    author: Option<String>,
    keywords: Vec<String>,
    total_copies: u32,
    available_copies: u32,
}

impl From<ResourceInfo> for BookView {
    fn from(info: ResourceInfo) -> Self {
        Self {
            available_copies: info.remaining().unwrap_or(0),
            total_copies: info.capacity.unwrap_or(0),
            id: info.id,
            title: info.name,
            author: info.details.byline,
            keywords: info.details.tags,
        }
    }
}

#[derive(Debug, Serialize)]
struct ReservationView {
    reservation_id: Ulid,
    book_id: Ulid,
    title: String,
    author: Option<String>,
    student_id: Option<u64>,
    status: &'static str,
    reserved_at: Option<DateTime<Utc>>,
    closed_at: Option<DateTime<Utc>>,
}

fn reservation_status(status: BookingStatus) -> &'static str {
    match status {
        BookingStatus::Confirmed => "reserved",
        BookingStatus::Cancelled | BookingStatus::Withdrawn => "cancelled",
    }
}

async fn add_book(
    State(state): State<AppState>,
    Json(body): Json<AddBook>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let id = Ulid::new();
    let spec = ResourceSpec {
        kind: KIND,
        name: body.title,
        details: ResourceDetails {
            byline: non_blank(body.author),
            tags: body.keywords,
            ..Default::default()
        },
        capacity: Some(body.available_copies),
        starts_at: None,
    };
    state.engine.create_resource(id, spec).await?;
    Ok((StatusCode::CREATED, Json(json!({ "book_id": id }))))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    q: String,
}

async fn search_books(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Json<Vec<BookView>> {
    let books = state.engine.search_resources(KIND, &query.q).await;
    Json(books.into_iter().map(BookView::from).collect())
}

#[derive(Debug, Deserialize)]
pub struct Reserve {
    book_id: Ulid,
    student_id: u64,
}

async fn reserve_book(
    State(state): State<AppState>,
    Json(body): Json<Reserve>,
) -> Result<Json<Value>, ApiError> {
    let request = BookingRequest {
        requester: user_key(body.student_id),
        ..Default::default()
    };
    let reservation = state
        .engine
        .create_booking(Ulid::new(), body.book_id, KIND, request)
        .await
        .map_err(library_error)?;
    Ok(Json(json!({ "reservation_id": reservation.id, "status": "reserved" })))
}

async fn cancel_reservation(
    State(state): State<AppState>,
    Path(reservation_id): Path<Ulid>,
) -> Result<Json<Value>, ApiError> {
    let reservation = state
        .engine
        .cancel_booking(reservation_id, KIND)
        .await
        .map_err(|e| match e {
            EngineError::BookingNotFound(_) | EngineError::KindMismatch { .. } => {
                ApiError::not_found("Reservation not found")
            }
            other => other.into(),
        })?;
    Ok(Json(json!({ "reservation_id": reservation.id, "status": "cancelled" })))
}

/// Reservations of one student, newest first, cancelled ones included.
async fn student_reservations(
    State(state): State<AppState>,
    Path(student_id): Path<u64>,
) -> Json<Vec<ReservationView>> {
    let reservations = state
        .engine
        .bookings_for_requester(KIND, &user_key(student_id), true)
        .await;
    Json(
        reservations
            .into_iter()
            .map(|(book, r)| ReservationView {
                reservation_id: r.id,
                book_id: book.id,
                title: book.name,
                author: book.details.byline,
                student_id: parse_user_key(&r.requester),
                status: reservation_status(r.status),
                reserved_at: from_ms(r.created_at),
                closed_at: r.closed_at.and_then(from_ms),
            })
            .collect(),
    )
}
