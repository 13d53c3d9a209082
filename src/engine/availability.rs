use crate::model::*;

/// Free sub-windows of `query` on a slot-based resource: the query minus
/// every confirmed booking that overlaps it.
pub fn free_windows(resource: &ResourceState, query: &Span) -> Vec<Span> {
    let booked: Vec<Span> = resource
        .overlapping(query)
        .map(|(span, _)| *span)
        .collect();
    // `slots` is sorted by start, so `booked` is too; overlaps between
    // bookings cannot happen on a slot resource but merge anyway.
    let booked = merge_overlapping(&booked);
    subtract_intervals(&[*query], &booked)
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end
        {
            last.end = last.end.max(span.end);
            continue;
        }
        merged.push(span);
    }
    merged
}

/// `base` minus `to_remove`. Both inputs sorted by start; `to_remove` disjoint.
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < b.end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Span::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < b.end {
            result.push(Span::new(current_start, b.end));
        }
    }

    result
}
