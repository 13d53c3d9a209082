use crate::model::Ms;

pub const MAX_RESOURCES: usize = 100_000;
pub const MAX_BOOKINGS_PER_RESOURCE: usize = 50_000;

pub const MAX_NAME_LEN: usize = 255;
pub const MAX_LABEL_LEN: usize = 255;
pub const MAX_NOTE_LEN: usize = 4_096;
pub const MAX_REQUESTER_LEN: usize = 255;
pub const MAX_TAGS: usize = 64;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2100-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// A single room booking may not exceed 7 days.
pub const MAX_SPAN_DURATION_MS: Ms = 7 * 24 * 3_600_000;
/// Availability queries are capped at 366 days.
pub const MAX_QUERY_WINDOW_MS: Ms = 366 * 24 * 3_600_000;
