use std::sync::Arc;

use tokio::sync::{oneshot, RwLock};
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::admission::{admit, check_len, find_duplicate, now_ms, validate_request};
use super::{Engine, EngineError, WalCommand};

fn validate_resource_fields(name: &str, details: &ResourceDetails) -> Result<(), EngineError> {
    if name.trim().is_empty() {
        return Err(EngineError::LimitExceeded("resource name is empty"));
    }
    check_len(Some(name), MAX_NAME_LEN, "resource name too long")?;
    check_len(details.location.as_deref(), MAX_NAME_LEN, "location too long")?;
    check_len(details.category.as_deref(), MAX_LABEL_LEN, "category too long")?;
    check_len(details.byline.as_deref(), MAX_NAME_LEN, "byline too long")?;
    check_len(details.description.as_deref(), MAX_NOTE_LEN, "description too long")?;
    if details.tags.len() > MAX_TAGS {
        return Err(EngineError::LimitExceeded("too many tags"));
    }
    for tag in &details.tags {
        check_len(Some(tag), MAX_LABEL_LEN, "tag too long")?;
    }
    Ok(())
}

fn check_kind(rs: &ResourceState, expected: ResourceKind) -> Result<(), EngineError> {
    if rs.kind != expected {
        return Err(EngineError::KindMismatch {
            id: rs.id,
            expected,
            actual: rs.kind,
        });
    }
    Ok(())
}

/// Outcome of [`Engine::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Registered,
    AlreadyRegistered,
    Updated,
}

impl Registration {
    pub fn as_str(self) -> &'static str {
        match self {
            Registration::Registered => "registered",
            Registration::AlreadyRegistered => "already_registered",
            Registration::Updated => "updated",
        }
    }
}

impl Engine {
    pub async fn create_resource(&self, id: Ulid, spec: ResourceSpec) -> Result<(), EngineError> {
        validate_resource_fields(&spec.name, &spec.details)?;
        if let Some(at) = spec.starts_at
            && !(MIN_VALID_TIMESTAMP_MS..MAX_VALID_TIMESTAMP_MS).contains(&at)
        {
            return Err(EngineError::LimitExceeded("timestamp out of range"));
        }
        let _gate = self.compaction_gate.read().await;
        if self.state.len() >= MAX_RESOURCES {
            return Err(EngineError::LimitExceeded("too many resources"));
        }
        if self.state.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::ResourceCreated {
            id,
            kind: spec.kind,
            name: spec.name.clone(),
            details: spec.details.clone(),
            capacity: spec.capacity,
            starts_at: spec.starts_at,
        };
        self.wal_append(&event).await?;
        info!(%id, kind = spec.kind.as_str(), capacity = ?spec.capacity, "resource created");
        self.state
            .insert(id, Arc::new(RwLock::new(ResourceState::new(id, spec))));
        metrics::gauge!(observability::RESOURCES_ACTIVE).set(self.state.len() as f64);
        Ok(())
    }

    /// Replace the descriptive fields and capacity. The kind cannot change,
    /// and a counter-based resource cannot shrink below its occupancy.
    pub async fn update_resource(&self, id: Ulid, spec: ResourceSpec) -> Result<(), EngineError> {
        validate_resource_fields(&spec.name, &spec.details)?;
        let _gate = self.compaction_gate.read().await;
        let mut guard = self.lock_resource(&id).await?;
        check_kind(&guard, spec.kind)?;

        if guard.policy().mode == AdmissionMode::Counter
            && let Some(capacity) = spec.capacity
            && capacity < guard.occupancy
        {
            return Err(EngineError::CapacityBelowOccupancy {
                capacity,
                occupancy: guard.occupancy,
            });
        }

        let event = Event::ResourceUpdated {
            id,
            name: spec.name,
            details: spec.details,
            capacity: spec.capacity,
            starts_at: spec.starts_at,
        };
        self.persist_and_apply(&mut guard, &event).await
    }

    pub async fn delete_resource(&self, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.compaction_gate.read().await;
        let guard = self.lock_resource(&id).await?;
        if guard.active_count() > 0 {
            return Err(EngineError::HasActiveBookings(id));
        }

        self.wal_append(&Event::ResourceDeleted { id }).await?;
        for booking in &guard.bookings {
            self.booking_to_resource.remove(&booking.id);
        }
        self.state.remove(&id);
        metrics::gauge!(observability::RESOURCES_ACTIVE).set(self.state.len() as f64);
        info!(%id, "resource deleted");
        Ok(())
    }

    /// Admission check and durable write under the resource's write lock.
    pub async fn create_booking(
        &self,
        id: Ulid,
        resource_id: Ulid,
        kind: ResourceKind,
        request: BookingRequest,
    ) -> Result<Booking, EngineError> {
        validate_request(&request)?;
        let _gate = self.compaction_gate.read().await;
        if self.booking_to_resource.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        let mut guard = self.lock_resource(&resource_id).await?;
        check_kind(&guard, kind)?;
        self.book_locked(&mut guard, id, request).await
    }

    /// Register `request` on a counter resource, or update the label and
    /// note of the requester's active booking. Lookup and write happen
    /// under one resource lock.
    pub async fn register(
        &self,
        id: Ulid,
        resource_id: Ulid,
        kind: ResourceKind,
        request: BookingRequest,
    ) -> Result<(Booking, Registration), EngineError> {
        validate_request(&request)?;
        let _gate = self.compaction_gate.read().await;
        if self.booking_to_resource.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        let mut guard = self.lock_resource(&resource_id).await?;
        check_kind(&guard, kind)?;

        let Some(existing) = find_duplicate(&guard, &request.requester).cloned() else {
            let booking = self.book_locked(&mut guard, id, request).await?;
            return Ok((booking, Registration::Registered));
        };
        if existing.label == request.label {
            return Ok((existing, Registration::AlreadyRegistered));
        }
        let event = Event::BookingAmended {
            id: existing.id,
            resource_id,
            label: request.label,
            note: request.note,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        let amended = guard
            .booking(existing.id)
            .cloned()
            .ok_or(EngineError::BookingNotFound(existing.id))?;
        Ok((amended, Registration::Updated))
    }

    async fn book_locked(
        &self,
        guard: &mut ResourceState,
        id: Ulid,
        request: BookingRequest,
    ) -> Result<Booking, EngineError> {
        let resource_id = guard.id;
        let kind = guard.kind;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_RESOURCE {
            return Err(EngineError::LimitExceeded("too many bookings on resource"));
        }

        if let Err(e) = admit(guard, &request) {
            metrics::counter!(
                observability::BOOKINGS_REJECTED_TOTAL,
                "kind" => kind.as_str(),
                "reason" => e.reason()
            )
            .increment(1);
            debug!(%resource_id, requester = %request.requester, "booking rejected: {e}");
            return Err(e);
        }

        let event = Event::BookingConfirmed {
            id,
            resource_id,
            requester: request.requester,
            span: request.span,
            label: request.label,
            note: request.note,
            contact: request.contact,
            created_at: now_ms(),
        };
        self.persist_and_apply(guard, &event).await?;
        metrics::counter!(observability::BOOKINGS_ADMITTED_TOTAL, "kind" => kind.as_str())
            .increment(1);
        debug!(%id, %resource_id, occupancy = guard.occupancy, "booking confirmed");
        guard.booking(id).cloned().ok_or(EngineError::BookingNotFound(id))
    }

    /// Soft-cancel by booking id.
    pub async fn cancel_booking(&self, id: Ulid, kind: ResourceKind) -> Result<Booking, EngineError> {
        self.close_booking(id, kind, BookingStatus::Cancelled).await
    }

    /// Soft-withdraw by booking id.
    pub async fn withdraw_booking(&self, id: Ulid, kind: ResourceKind) -> Result<Booking, EngineError> {
        self.close_booking(id, kind, BookingStatus::Withdrawn).await
    }

    /// Move a booking to `status`. Closing an already closed booking returns
    /// it unchanged and leaves the counter alone.
    pub async fn close_booking(
        &self,
        id: Ulid,
        kind: ResourceKind,
        status: BookingStatus,
    ) -> Result<Booking, EngineError> {
        let _gate = self.compaction_gate.read().await;
        let mut guard = self.resolve_booking_write(&id).await?;
        check_kind(&guard, kind)?;
        self.close_locked(&mut guard, id, status).await
    }

    /// Close the requester's active booking on a resource.
    pub async fn close_for_requester(
        &self,
        resource_id: Ulid,
        kind: ResourceKind,
        requester: &str,
        status: BookingStatus,
    ) -> Result<Booking, EngineError> {
        let _gate = self.compaction_gate.read().await;
        let mut guard = self.lock_resource(&resource_id).await?;
        check_kind(&guard, kind)?;
        let id = guard
            .bookings
            .iter()
            .rev()
            .find(|b| b.requester == requester && b.status.is_active())
            .map(|b| b.id)
            .ok_or_else(|| EngineError::RegistrationNotFound {
                resource_id,
                requester: requester.to_string(),
            })?;
        self.close_locked(&mut guard, id, status).await
    }

    async fn close_locked(
        &self,
        guard: &mut ResourceState,
        id: Ulid,
        status: BookingStatus,
    ) -> Result<Booking, EngineError> {
        let booking = guard.booking(id).ok_or(EngineError::BookingNotFound(id))?;
        if !booking.status.is_active() {
            return Ok(booking.clone());
        }
        let event = Event::BookingClosed {
            id,
            resource_id: guard.id,
            status,
            at: now_ms(),
        };
        self.persist_and_apply(guard, &event).await?;
        metrics::counter!(
            observability::BOOKINGS_CLOSED_TOTAL,
            "kind" => guard.kind.as_str(),
            "status" => status.as_str()
        )
        .increment(1);
        debug!(%id, resource_id = %guard.id, occupancy = guard.occupancy, "booking {}", status.as_str());
        guard.booking(id).cloned().ok_or(EngineError::BookingNotFound(id))
    }

    /// Rewrite the WAL with only the events needed to recreate the current
    /// state. Closed bookings are kept so their history survives.
    pub async fn compact_wal(&self) -> Result<usize, EngineError> {
        let _gate = self.compaction_gate.write().await;
        let mut events = Vec::new();

        for rs in self.all_resources() {
            let guard = rs.read().await;
            events.push(Event::ResourceCreated {
                id: guard.id,
                kind: guard.kind,
                name: guard.name.clone(),
                details: guard.details.clone(),
                capacity: guard.capacity,
                starts_at: guard.starts_at,
            });
            for booking in &guard.bookings {
                events.push(Event::BookingConfirmed {
                    id: booking.id,
                    resource_id: guard.id,
                    requester: booking.requester.clone(),
                    span: booking.span,
                    label: booking.label.clone(),
                    note: booking.note.clone(),
                    contact: booking.contact.clone(),
                    created_at: booking.created_at,
                });
                if !booking.status.is_active() {
                    events.push(Event::BookingClosed {
                        id: booking.id,
                        resource_id: guard.id,
                        status: booking.status,
                        at: booking.closed_at.unwrap_or(booking.created_at),
                    });
                }
            }
        }

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        Ok(count)
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
