//! Visit grouping and cancellation staging.
//!
//! Grouping prefers explicit metadata (a shared visit key, or the phase-2 →
//! phase-1 parent link). Older records carry neither, so a heuristic groups
//! bookings by the same customer created within a small window of each other.
//! The heuristic is approximate; new visits always get a visit key.

use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// Order explicit members with `origin` first, dedupe, and cap.
pub fn explicit_group(
    origin: BookingId,
    members: impl IntoIterator<Item = BookingId>,
    cap: usize,
) -> Vec<BookingId> {
    let mut rest: Vec<BookingId> = members.into_iter().filter(|id| *id != origin).collect();
    rest.sort();
    rest.dedup();
    let mut ids = Vec::with_capacity(rest.len() + 1);
    ids.push(origin);
    ids.extend(rest);
    ids.truncate(cap.max(1));
    ids
}

/// Same-customer, still active bookings created within `window_minutes` of
/// `origin`. Cancelled or archived bookings neither join nor count toward `cap`.
///
/// Returns the singleton when `origin` lacks a customer or creation time, and
/// [`GroupSource::Ambiguous`] (also the singleton) when more than `cap`
/// bookings match.
pub fn heuristic_group(
    origin: &BookingRecord,
    same_date: &[BookingRecord],
    window_minutes: i64,
    cap: usize,
) -> CascadeGroup {
    let (Some(customer), Some(created)) = (&origin.customer, origin.created_at_ms) else {
        return CascadeGroup::singleton(origin.id, GroupSource::Singleton);
    };
    let window_ms = window_minutes * 60_000;

    let mut matches: Vec<&BookingRecord> = same_date
        .iter()
        .filter(|b| b.id != origin.id && b.date == origin.date && b.is_active())
        .filter(|b| b.customer.as_ref() == Some(customer))
        .filter(|b| {
            b.created_at_ms
                .is_some_and(|t| (t - created).abs() <= window_ms)
        })
        .collect();

    if matches.is_empty() {
        return CascadeGroup::singleton(origin.id, GroupSource::Singleton);
    }
    if matches.len() + 1 > cap {
        return CascadeGroup::singleton(origin.id, GroupSource::Ambiguous);
    }

    matches.sort_by_key(|b| (b.created_at_ms, b.id));
    let mut ids = Vec::with_capacity(matches.len() + 1);
    ids.push(origin.id);
    ids.extend(matches.iter().map(|b| b.id));
    CascadeGroup {
        ids,
        source: GroupSource::Heuristic,
    }
}

/// Deterministic per-customer history key, so re-running a cancellation
/// overwrites rather than duplicates.
pub fn history_key(customer: &CustomerKey, variant: &VariantId, booking: &BookingId) -> String {
    format!("{customer}:{variant}:{booking}")
}

/// Validate and trim caller-supplied actor metadata for `reason`.
/// Automatic expiry never carries a note or actor.
pub fn cancellation_for(
    reason: CancelReason,
    actor: Option<&ActorMeta>,
    now_ms: i64,
) -> Result<Cancellation, EngineError> {
    let (note, actor) = match actor {
        Some(meta) if reason.accepts_note() => (
            meta.note.as_deref().map(str::trim).filter(|s| !s.is_empty()),
            meta.actor.as_deref().map(str::trim).filter(|s| !s.is_empty()),
        ),
        _ => (None, None),
    };
    if note.is_some_and(|n| n.len() > MAX_NOTE_LEN) {
        return Err(EngineError::LimitExceeded("cancellation note too long"));
    }
    if actor.is_some_and(|a| a.len() > MAX_ACTOR_LEN) {
        return Err(EngineError::LimitExceeded("actor name too long"));
    }
    Ok(Cancellation {
        reason,
        note: note.map(String::from),
        actor: actor.map(String::from),
        cancelled_at_ms: now_ms,
    })
}

/// Writes that cancel one booking: the transition plus its history mirror.
/// Already archived bookings produce nothing.
pub fn stage_cancellation(record: &BookingRecord, cancellation: &Cancellation) -> Vec<StoreWrite> {
    if record.archived {
        return Vec::new();
    }
    let mut writes = vec![StoreWrite::Cancel {
        id: record.id,
        cancellation: cancellation.clone(),
    }];
    if let Some(customer) = &record.customer {
        writes.push(StoreWrite::History(HistoryRecord {
            key: history_key(customer, &record.variant_id, &record.id),
            customer: customer.clone(),
            variant_id: record.variant_id,
            booking_id: record.id,
            service_name: record.service_name.clone(),
            date: record.date,
            cancellation: cancellation.clone(),
        }));
    }
    writes
}
