use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds. The only time type.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Like `new`, but for untrusted input.
    pub fn checked(start: Ms, end: Ms) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// What kind of campus resource this is. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Room,
    CampusEvent,
    AdmissionEvent,
    LibraryBook,
}

impl ResourceKind {
    pub fn policy(self) -> AdmissionPolicy {
        match self {
            ResourceKind::Room => AdmissionPolicy {
                mode: AdmissionMode::Slot,
                dedupe_requester: false,
            },
            ResourceKind::CampusEvent | ResourceKind::AdmissionEvent | ResourceKind::LibraryBook => {
                AdmissionPolicy {
                    mode: AdmissionMode::Counter,
                    dedupe_requester: true,
                }
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Room => "room",
            ResourceKind::CampusEvent => "campus_event",
            ResourceKind::AdmissionEvent => "admission_event",
            ResourceKind::LibraryBook => "library_book",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionMode {
    /// Conflicts are overlapping time windows; one confirmed booking per window.
    Slot,
    /// Conflicts are a full occupancy counter; bookings carry no window.
    Counter,
}

/// Which checks run before a booking is admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionPolicy {
    pub mode: AdmissionMode,
    /// At most one active booking per requester on the resource.
    pub dedupe_requester: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
    Withdrawn,
}

impl BookingStatus {
    pub fn is_active(self) -> bool {
        matches!(self, BookingStatus::Confirmed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Withdrawn => "withdrawn",
        }
    }
}

/// Contact details for requesters without a user account (admission applicants).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Descriptive fields. None of them take part in admission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDetails {
    pub location: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    /// Author for books, organizer for events.
    pub byline: Option<String>,
    /// Room equipment, book keywords.
    pub tags: Vec<String>,
}

/// Everything needed to create a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSpec {
    pub kind: ResourceKind,
    pub name: String,
    pub details: ResourceDetails,
    /// `None` = unlimited. For rooms this is the seat count and does not gate admission.
    pub capacity: Option<u32>,
    pub starts_at: Option<Ms>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub resource_id: Ulid,
    pub requester: String,
    /// Present for slot-based resources only.
    pub span: Option<Span>,
    pub status: BookingStatus,
    /// Room purpose, event registration type.
    pub label: Option<String>,
    pub note: Option<String>,
    pub contact: Option<Contact>,
    pub created_at: Ms,
    pub closed_at: Option<Ms>,
}

/// A booking as asked for, before admission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingRequest {
    pub requester: String,
    pub span: Option<Span>,
    pub label: Option<String>,
    pub note: Option<String>,
    pub contact: Option<Contact>,
}

#[derive(Debug, Clone)]
pub struct ResourceState {
    pub id: Ulid,
    pub kind: ResourceKind,
    pub name: String,
    pub details: ResourceDetails,
    pub capacity: Option<u32>,
    pub starts_at: Option<Ms>,
    /// Confirmed bookings on a counter-based resource.
    pub occupancy: u32,
    /// Every booking ever made, in creation order. Closed ones are kept.
    pub bookings: Vec<Booking>,
    /// Confirmed slot bookings, sorted by `span.start`.
    pub slots: Vec<(Span, Ulid)>,
    /// requester → active booking, maintained only when the policy dedupes.
    pub active_by_requester: HashMap<String, Ulid>,
}

impl ResourceState {
    pub fn new(id: Ulid, spec: ResourceSpec) -> Self {
        Self {
            id,
            kind: spec.kind,
            name: spec.name,
            details: spec.details,
            capacity: spec.capacity,
            starts_at: spec.starts_at,
            occupancy: 0,
            bookings: Vec::new(),
            slots: Vec::new(),
            active_by_requester: HashMap::new(),
        }
    }

    pub fn policy(&self) -> AdmissionPolicy {
        self.kind.policy()
    }

    pub fn booking(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn active_count(&self) -> usize {
        self.bookings.iter().filter(|b| b.status.is_active()).count()
    }

    /// Insert a booking and update the occupancy counter and indexes.
    pub fn insert_booking(&mut self, booking: Booking) {
        if booking.status.is_active() {
            let policy = self.policy();
            if let Some(span) = booking.span {
                let pos = self.slots.partition_point(|(s, _)| s.start <= span.start);
                self.slots.insert(pos, (span, booking.id));
            }
            if policy.mode == AdmissionMode::Counter {
                self.occupancy += 1;
            }
            if policy.dedupe_requester {
                self.active_by_requester
                    .insert(booking.requester.clone(), booking.id);
            }
        }
        self.bookings.push(booking);
    }

    /// Move an active booking to a closed status. Returns false if the
    /// booking does not exist or is already closed.
    pub fn close_booking(&mut self, id: Ulid, status: BookingStatus, at: Ms) -> bool {
        let policy = self.policy();
        let Some(booking) = self.bookings.iter_mut().find(|b| b.id == id) else {
            return false;
        };
        if !booking.status.is_active() {
            return false;
        }
        booking.status = status;
        booking.closed_at = Some(at);

        self.slots.retain(|(_, bid)| *bid != id);
        if policy.mode == AdmissionMode::Counter {
            self.occupancy = self.occupancy.saturating_sub(1);
        }
        if policy.dedupe_requester
            && self.active_by_requester.get(&booking.requester) == Some(&id)
        {
            self.active_by_requester.remove(&booking.requester);
        }
        true
    }

    pub fn amend_booking(&mut self, id: Ulid, label: Option<String>, note: Option<String>) -> bool {
        match self.bookings.iter_mut().find(|b| b.id == id) {
            Some(booking) => {
                booking.label = label;
                booking.note = note;
                true
            }
            None => false,
        }
    }

    /// Confirmed slots whose span overlaps the query window.
    /// Uses binary search to skip slots starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &(Span, Ulid)> {
        let right_bound = self.slots.partition_point(|(s, _)| s.start < query.end);
        self.slots[..right_bound]
            .iter()
            .filter(move |(s, _)| s.end > query.start)
    }

    pub fn info(&self) -> ResourceInfo {
        ResourceInfo {
            id: self.id,
            kind: self.kind,
            name: self.name.clone(),
            details: self.details.clone(),
            capacity: self.capacity,
            starts_at: self.starts_at,
            occupancy: self.occupancy,
        }
    }
}

/// The event types. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ResourceCreated {
        id: Ulid,
        kind: ResourceKind,
        name: String,
        details: ResourceDetails,
        capacity: Option<u32>,
        starts_at: Option<Ms>,
    },
    ResourceUpdated {
        id: Ulid,
        name: String,
        details: ResourceDetails,
        capacity: Option<u32>,
        starts_at: Option<Ms>,
    },
    ResourceDeleted {
        id: Ulid,
    },
    BookingConfirmed {
        id: Ulid,
        resource_id: Ulid,
        requester: String,
        span: Option<Span>,
        label: Option<String>,
        note: Option<String>,
        contact: Option<Contact>,
        created_at: Ms,
    },
    BookingAmended {
        id: Ulid,
        resource_id: Ulid,
        label: Option<String>,
        note: Option<String>,
    },
    BookingClosed {
        id: Ulid,
        resource_id: Ulid,
        status: BookingStatus,
        at: Ms,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfo {
    pub id: Ulid,
    pub kind: ResourceKind,
    pub name: String,
    pub details: ResourceDetails,
    pub capacity: Option<u32>,
    pub starts_at: Option<Ms>,
    pub occupancy: u32,
}

impl ResourceInfo {
    /// Places left on a counter-based resource; `None` when unlimited.
    pub fn remaining(&self) -> Option<u32> {
        self.capacity.map(|c| c.saturating_sub(self.occupancy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(kind: ResourceKind, capacity: Option<u32>) -> ResourceSpec {
        ResourceSpec {
            kind,
            name: "Test".into(),
            details: ResourceDetails::default(),
            capacity,
            starts_at: None,
        }
    }

    fn booking(resource_id: Ulid, requester: &str, span: Option<Span>) -> Booking {
        Booking {
            id: Ulid::new(),
            resource_id,
            requester: requester.into(),
            span,
            status: BookingStatus::Confirmed,
            label: None,
            note: None,
            contact: None,
            created_at: 0,
            closed_at: None,
        }
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
        assert_eq!(a.duration_ms(), 100);
    }

    #[test]
    fn span_checked_rejects_empty_and_inverted() {
        assert!(Span::checked(100, 100).is_none());
        assert!(Span::checked(200, 100).is_none());
        assert_eq!(Span::checked(100, 101), Some(Span::new(100, 101)));
    }

    #[test]
    fn kind_policies() {
        assert_eq!(ResourceKind::Room.policy().mode, AdmissionMode::Slot);
        assert!(!ResourceKind::Room.policy().dedupe_requester);
        for kind in [
            ResourceKind::CampusEvent,
            ResourceKind::AdmissionEvent,
            ResourceKind::LibraryBook,
        ] {
            assert_eq!(kind.policy().mode, AdmissionMode::Counter);
            assert!(kind.policy().dedupe_requester);
        }
    }

    #[test]
    fn slots_stay_sorted() {
        let rid = Ulid::new();
        let mut rs = ResourceState::new(rid, spec(ResourceKind::Room, Some(30)));
        rs.insert_booking(booking(rid, "1", Some(Span::new(300, 400))));
        rs.insert_booking(booking(rid, "1", Some(Span::new(100, 200))));
        rs.insert_booking(booking(rid, "2", Some(Span::new(200, 300))));
        let starts: Vec<Ms> = rs.slots.iter().map(|(s, _)| s.start).collect();
        assert_eq!(starts, vec![100, 200, 300]);
        // Slot resources do not count occupancy.
        assert_eq!(rs.occupancy, 0);
        assert!(rs.active_by_requester.is_empty());
    }

    #[test]
    fn overlapping_skips_past_and_future() {
        let rid = Ulid::new();
        let mut rs = ResourceState::new(rid, spec(ResourceKind::Room, None));
        rs.insert_booking(booking(rid, "a", Some(Span::new(100, 200))));
        rs.insert_booking(booking(rid, "b", Some(Span::new(450, 600))));
        rs.insert_booking(booking(rid, "c", Some(Span::new(1000, 1100))));

        let hits: Vec<_> = rs.overlapping(&Span::new(500, 800)).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, Span::new(450, 600));
    }

    #[test]
    fn overlapping_adjacent_not_included() {
        let rid = Ulid::new();
        let mut rs = ResourceState::new(rid, spec(ResourceKind::Room, None));
        rs.insert_booking(booking(rid, "a", Some(Span::new(100, 200))));
        assert_eq!(rs.overlapping(&Span::new(200, 300)).count(), 0);
        assert_eq!(rs.overlapping(&Span::new(0, 100)).count(), 0);
        assert_eq!(rs.overlapping(&Span::new(199, 300)).count(), 1);
    }

    #[test]
    fn counter_tracks_insert_and_close() {
        let rid = Ulid::new();
        let mut rs = ResourceState::new(rid, spec(ResourceKind::CampusEvent, Some(5)));
        let b1 = booking(rid, "7", None);
        let b2 = booking(rid, "8", None);
        let id1 = b1.id;
        rs.insert_booking(b1);
        rs.insert_booking(b2);
        assert_eq!(rs.occupancy, 2);
        assert_eq!(rs.active_by_requester.get("7"), Some(&id1));

        assert!(rs.close_booking(id1, BookingStatus::Cancelled, 10));
        assert_eq!(rs.occupancy, 1);
        assert!(!rs.active_by_requester.contains_key("7"));

        // Closing twice changes nothing.
        assert!(!rs.close_booking(id1, BookingStatus::Cancelled, 20));
        assert_eq!(rs.occupancy, 1);
        assert_eq!(rs.booking(id1).map(|b| b.closed_at), Some(Some(10)));
        assert_eq!(rs.active_count(), 1);
        assert_eq!(rs.bookings.len(), 2);
    }

    #[test]
    fn close_removes_slot() {
        let rid = Ulid::new();
        let mut rs = ResourceState::new(rid, spec(ResourceKind::Room, None));
        let b = booking(rid, "a", Some(Span::new(100, 200)));
        let id = b.id;
        rs.insert_booking(b);
        assert!(rs.close_booking(id, BookingStatus::Cancelled, 0));
        assert!(rs.slots.is_empty());
        assert_eq!(rs.booking(id).map(|b| b.status), Some(BookingStatus::Cancelled));
    }

    #[test]
    fn close_unknown_booking() {
        let rid = Ulid::new();
        let mut rs = ResourceState::new(rid, spec(ResourceKind::LibraryBook, Some(1)));
        assert!(!rs.close_booking(Ulid::new(), BookingStatus::Cancelled, 0));
        assert_eq!(rs.occupancy, 0);
    }

    #[test]
    fn remaining_places() {
        let rid = Ulid::new();
        let mut rs = ResourceState::new(rid, spec(ResourceKind::AdmissionEvent, Some(2)));
        rs.insert_booking(booking(rid, "a@x.org", None));
        assert_eq!(rs.info().remaining(), Some(1));
        let unlimited = ResourceState::new(Ulid::new(), spec(ResourceKind::CampusEvent, None));
        assert_eq!(unlimited.info().remaining(), None);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::BookingConfirmed {
            id: Ulid::new(),
            resource_id: Ulid::new(),
            requester: "a@x.org".into(),
            span: None,
            label: Some("attendee".into()),
            note: None,
            contact: Some(Contact {
                name: "Ann".into(),
                email: Some("a@x.org".into()),
                phone: None,
            }),
            created_at: 1_700_000_000_000,
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
