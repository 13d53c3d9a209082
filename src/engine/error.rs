use thiserror::Error;
use ulid::Ulid;

use crate::model::ResourceKind;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(Ulid),
    #[error("booking not found: {0}")]
    BookingNotFound(Ulid),
    #[error("no active booking for {requester} on {resource_id}")]
    RegistrationNotFound { resource_id: Ulid, requester: String },
    #[error("already exists: {0}")]
    AlreadyExists(Ulid),
    #[error("conflict with booking: {0}")]
    Conflict(Ulid),
    #[error("capacity {0} exceeded: all places taken")]
    CapacityExceeded(u32),
    #[error("requester already holds booking {0}")]
    Duplicate(Ulid),
    #[error("capacity {capacity} is below current occupancy {occupancy}")]
    CapacityBelowOccupancy { capacity: u32, occupancy: u32 },
    #[error("resource {0} still has active bookings")]
    HasActiveBookings(Ulid),
    #[error("resource {id} is a {actual:?}, expected {expected:?}")]
    KindMismatch {
        id: Ulid,
        expected: ResourceKind,
        actual: ResourceKind,
    },
    #[error("invalid window: {0}")]
    InvalidWindow(&'static str),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("WAL error: {0}")]
    WalError(String),
}

impl EngineError {
    /// Short reason label for rejection metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            EngineError::NotFound(_)
            | EngineError::BookingNotFound(_)
            | EngineError::RegistrationNotFound { .. } => "not_found",
            EngineError::Conflict(_) => "slot_conflict",
            EngineError::CapacityExceeded(_) => "capacity",
            EngineError::Duplicate(_) => "duplicate",
            EngineError::InvalidWindow(_)
            | EngineError::LimitExceeded(_)
            | EngineError::KindMismatch { .. } => "invalid",
            EngineError::AlreadyExists(_)
            | EngineError::CapacityBelowOccupancy { .. }
            | EngineError::HasActiveBookings(_) => "state",
            EngineError::WalError(_) => "storage",
        }
    }
}
