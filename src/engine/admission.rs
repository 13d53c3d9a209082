//! Admission control: the single check every booking passes before it is
//! written. Pure functions over a borrowed `ResourceState`; the caller holds
//! the resource's write lock so the check and the write cannot interleave
//! with another booking on the same resource.

use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    if span.start >= span.end {
        return Err(EngineError::InvalidWindow("start must be before end"));
    }
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("window too wide"));
    }
    Ok(())
}

pub(crate) fn check_len(
    value: Option<&str>,
    max: usize,
    what: &'static str,
) -> Result<(), EngineError> {
    match value {
        Some(v) if v.len() > max => Err(EngineError::LimitExceeded(what)),
        _ => Ok(()),
    }
}

/// Shape checks that need no resource state.
pub(crate) fn validate_request(request: &BookingRequest) -> Result<(), EngineError> {
    if request.requester.trim().is_empty() {
        return Err(EngineError::LimitExceeded("requester is empty"));
    }
    check_len(Some(&request.requester), MAX_REQUESTER_LEN, "requester too long")?;
    check_len(request.label.as_deref(), MAX_LABEL_LEN, "label too long")?;
    check_len(request.note.as_deref(), MAX_NOTE_LEN, "note too long")?;
    if let Some(contact) = &request.contact {
        check_len(Some(&contact.name), MAX_NAME_LEN, "contact name too long")?;
        check_len(contact.email.as_deref(), MAX_REQUESTER_LEN, "contact email too long")?;
        check_len(contact.phone.as_deref(), MAX_LABEL_LEN, "contact phone too long")?;
    }
    if let Some(span) = &request.span {
        validate_span(span)?;
    }
    Ok(())
}

/// First confirmed booking overlapping `span`, if any.
pub fn find_slot_conflict(rs: &ResourceState, span: &Span) -> Option<Ulid> {
    rs.overlapping(span).map(|(_, id)| *id).next()
}

/// Admit when capacity is unlimited or not yet reached.
pub fn has_capacity(capacity: Option<u32>, current: u32) -> bool {
    capacity.is_none_or(|c| current < c)
}

/// The requester's active booking on this resource.
pub fn find_duplicate<'a>(rs: &'a ResourceState, requester: &str) -> Option<&'a Booking> {
    rs.active_by_requester
        .get(requester)
        .and_then(|id| rs.booking(*id))
        .filter(|b| b.status.is_active())
}

/// Decide whether `request` may be booked on `rs`.
///
/// Checks run in order: window shape for the resource's mode, duplicate
/// requester (when the policy dedupes), then slot overlap or capacity.
pub fn admit(rs: &ResourceState, request: &BookingRequest) -> Result<(), EngineError> {
    let policy = rs.policy();

    match (policy.mode, &request.span) {
        (AdmissionMode::Slot, None) => {
            return Err(EngineError::InvalidWindow("a time window is required"));
        }
        (AdmissionMode::Counter, Some(_)) => {
            return Err(EngineError::InvalidWindow("this resource does not take a time window"));
        }
        _ => {}
    }

    if policy.dedupe_requester
        && let Some(existing) = find_duplicate(rs, &request.requester)
    {
        return Err(EngineError::Duplicate(existing.id));
    }

    match policy.mode {
        AdmissionMode::Slot => {
            if let Some(span) = &request.span
                && let Some(conflicting) = find_slot_conflict(rs, span)
            {
                return Err(EngineError::Conflict(conflicting));
            }
        }
        AdmissionMode::Counter => {
            if !has_capacity(rs.capacity, rs.occupancy) {
                return Err(EngineError::CapacityExceeded(rs.capacity.unwrap_or(0)));
            }
        }
    }
    Ok(())
}
