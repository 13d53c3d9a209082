use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::admission::{find_duplicate, find_slot_conflict, validate_span};
use super::availability::free_windows;
use super::{Engine, EngineError};

impl Engine {
    pub async fn get_resource_info(&self, id: Ulid) -> Result<ResourceInfo, EngineError> {
        let rs = self.get_resource(&id).ok_or(EngineError::NotFound(id))?;
        let guard = rs.read().await;
        Ok(guard.info())
    }

    /// All resources, optionally of one kind. Unordered.
    pub async fn list_resources(&self, kind: Option<ResourceKind>) -> Vec<ResourceInfo> {
        let mut out = Vec::new();
        for rs in self.all_resources() {
            let guard = rs.read().await;
            if kind.is_none_or(|k| guard.kind == k) {
                out.push(guard.info());
            }
        }
        out
    }

    /// Case-insensitive substring match on name or byline, ordered by name.
    pub async fn search_resources(&self, kind: ResourceKind, text: &str) -> Vec<ResourceInfo> {
        let needle = text.trim().to_lowercase();
        let mut hits: Vec<ResourceInfo> = self
            .list_resources(Some(kind))
            .await
            .into_iter()
            .filter(|info| {
                needle.is_empty()
                    || info.name.to_lowercase().contains(&needle)
                    || info
                        .details
                        .byline
                        .as_deref()
                        .is_some_and(|b| b.to_lowercase().contains(&needle))
            })
            .collect();
        hits.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        hits
    }

    pub async fn get_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        let resource_id = self
            .get_resource_for_booking(&id)
            .ok_or(EngineError::BookingNotFound(id))?;
        let rs = self
            .get_resource(&resource_id)
            .ok_or(EngineError::BookingNotFound(id))?;
        let guard = rs.read().await;
        guard.booking(id).cloned().ok_or(EngineError::BookingNotFound(id))
    }

    /// Bookings on one resource in creation order.
    pub async fn bookings_for_resource(
        &self,
        id: Ulid,
        include_closed: bool,
    ) -> Result<Vec<Booking>, EngineError> {
        let rs = self.get_resource(&id).ok_or(EngineError::NotFound(id))?;
        let guard = rs.read().await;
        Ok(guard
            .bookings
            .iter()
            .filter(|b| include_closed || b.status.is_active())
            .cloned()
            .collect())
    }

    /// Every booking a requester holds on resources of `kind`, paired with
    /// the resource it belongs to. Newest first.
    pub async fn bookings_for_requester(
        &self,
        kind: ResourceKind,
        requester: &str,
        include_closed: bool,
    ) -> Vec<(ResourceInfo, Booking)> {
        let mut out = Vec::new();
        for rs in self.all_resources() {
            let guard = rs.read().await;
            if guard.kind != kind {
                continue;
            }
            for booking in &guard.bookings {
                if booking.requester == requester && (include_closed || booking.status.is_active()) {
                    out.push((guard.info(), booking.clone()));
                }
            }
        }
        out.sort_by(|a, b| b.1.created_at.cmp(&a.1.created_at).then(b.1.id.cmp(&a.1.id)));
        out
    }

    /// Rooms with at least `min_capacity` seats, restricted to those with no
    /// confirmed booking in `window` when one is given. Largest first.
    pub async fn available_rooms(
        &self,
        window: Option<Span>,
        min_capacity: Option<u32>,
    ) -> Result<Vec<ResourceInfo>, EngineError> {
        if let Some(span) = &window {
            validate_span(span)?;
        }
        let mut rooms = Vec::new();
        for rs in self.all_resources() {
            let guard = rs.read().await;
            if guard.kind != ResourceKind::Room {
                continue;
            }
            if min_capacity.is_some_and(|min| guard.capacity.unwrap_or(0) < min) {
                continue;
            }
            if let Some(span) = &window
                && find_slot_conflict(&guard, span).is_some()
            {
                continue;
            }
            rooms.push(guard.info());
        }
        rooms.sort_by(|a, b| {
            b.capacity
                .unwrap_or(0)
                .cmp(&a.capacity.unwrap_or(0))
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(rooms)
    }

    /// Free sub-windows of `window` on a slot-based resource.
    pub async fn free_windows_for(
        &self,
        resource_id: Ulid,
        window: Span,
    ) -> Result<Vec<Span>, EngineError> {
        if window.start >= window.end {
            return Err(EngineError::InvalidWindow("start must be before end"));
        }
        if window.duration_ms() > MAX_QUERY_WINDOW_MS {
            return Err(EngineError::LimitExceeded("query window too wide"));
        }
        let rs = self
            .get_resource(&resource_id)
            .ok_or(EngineError::NotFound(resource_id))?;
        let guard = rs.read().await;
        if guard.policy().mode != AdmissionMode::Slot {
            return Err(EngineError::InvalidWindow("resource is not booked by time window"));
        }
        Ok(free_windows(&guard, &window))
    }

    /// True when a confirmed booking overlaps `window`.
    pub async fn check_slot_conflict(
        &self,
        resource_id: Ulid,
        window: Span,
    ) -> Result<bool, EngineError> {
        let rs = self
            .get_resource(&resource_id)
            .ok_or(EngineError::NotFound(resource_id))?;
        let guard = rs.read().await;
        Ok(find_slot_conflict(&guard, &window).is_some())
    }

    /// The requester's active booking on the resource, if any.
    pub async fn check_duplicate_requester(
        &self,
        resource_id: Ulid,
        requester: &str,
    ) -> Result<Option<Booking>, EngineError> {
        let rs = self
            .get_resource(&resource_id)
            .ok_or(EngineError::NotFound(resource_id))?;
        let guard = rs.read().await;
        if guard.policy().dedupe_requester {
            return Ok(find_duplicate(&guard, requester).cloned());
        }
        Ok(guard
            .bookings
            .iter()
            .find(|b| b.requester == requester && b.status.is_active())
            .cloned())
    }
}
