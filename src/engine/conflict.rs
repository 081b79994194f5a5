use std::collections::HashMap;

use chrono::NaiveDate;

use crate::model::*;

use super::availability::{merge_overlapping, subtract_intervals};
use super::EngineError;

// ── Record adapter ────────────────────────────────────────────────

/// Normalize one stored booking into the busy intervals it occupies.
///
/// Cancelled and archived bookings occupy nothing. A stored follow-up adds a
/// second interval after its wait; the wait itself is never occupied.
/// Records whose time fields cannot be read are an error, not a guess.
pub fn normalize_record(record: &BookingRecord) -> Result<Vec<OccupiedInterval>, EngineError> {
    if !record.is_active() {
        return Ok(Vec::new());
    }
    let main = main_span(record)?;
    let mut out = vec![OccupiedInterval {
        worker_id: record.worker_id,
        span: main,
        booking_id: record.id,
    }];

    if let Some(follow_up) = &record.follow_up {
        if follow_up.wait_minutes < 0 || follow_up.duration_minutes <= 0 {
            return Err(corrupt(record, "follow-up has negative wait or empty duration"));
        }
        let start = main
            .end
            .checked_add(follow_up.wait_minutes)
            .ok_or_else(|| corrupt(record, "follow-up wait out of range"))?;
        let end = start
            .checked_add(follow_up.duration_minutes)
            .ok_or_else(|| corrupt(record, "follow-up duration out of range"))?;
        let span = checked_span(record, start, end)?;
        out.push(OccupiedInterval {
            worker_id: follow_up.worker_id.unwrap_or(record.worker_id),
            span,
            booking_id: record.id,
        });
    }
    Ok(out)
}

fn main_span(record: &BookingRecord) -> Result<Span, EngineError> {
    match &record.times {
        RecordTimes::Span { start, end } => checked_span(record, *start, *end),
        RecordTimes::StartDuration { start, duration } => {
            let end = start
                .checked_add(*duration)
                .ok_or_else(|| corrupt(record, "duration out of range"))?;
            checked_span(record, *start, end)
        }
        RecordTimes::Clock {
            start,
            end,
            duration,
        } => {
            let start = parse_clock(start)
                .ok_or_else(|| corrupt(record, &format!("unreadable start time {start:?}")))?;
            let end = match (end, duration) {
                (Some(end), _) => parse_clock(end)
                    .ok_or_else(|| corrupt(record, &format!("unreadable end time {end:?}")))?,
                (None, Some(duration)) => start
                    .checked_add(*duration)
                    .ok_or_else(|| corrupt(record, "duration out of range"))?,
                (None, None) => return Err(corrupt(record, "neither end time nor duration")),
            };
            checked_span(record, start, end)
        }
    }
}

fn checked_span(record: &BookingRecord, start: Minute, end: Minute) -> Result<Span, EngineError> {
    if start < 0 || end > MINUTES_PER_DAY || start >= end {
        return Err(corrupt(record, &format!("invalid interval {start}..{end}")));
    }
    Ok(Span::new(start, end))
}

fn corrupt(record: &BookingRecord, reason: &str) -> EngineError {
    EngineError::CorruptRecord {
        id: record.id,
        reason: reason.to_string(),
    }
}

// ── Conflict Index ────────────────────────────────────────────────

/// Busy intervals per worker for one date, each list sorted by `span.start`.
#[derive(Debug, Clone)]
pub struct ConflictIndex {
    date: NaiveDate,
    by_worker: HashMap<WorkerId, Vec<OccupiedInterval>>,
}

impl ConflictIndex {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            by_worker: HashMap::new(),
        }
    }

    /// Rebuild from the bookings currently stored for `date`. Records for other
    /// dates are ignored.
    pub fn build(date: NaiveDate, bookings: &[BookingRecord]) -> Result<Self, EngineError> {
        let mut index = Self::empty(date);
        for record in bookings.iter().filter(|b| b.date == date) {
            for interval in normalize_record(record)? {
                index.insert(interval);
            }
        }
        Ok(index)
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Insert interval maintaining sort order by span.start.
    pub fn insert(&mut self, interval: OccupiedInterval) {
        let list = self.by_worker.entry(interval.worker_id).or_default();
        let pos = list
            .binary_search_by_key(&interval.span.start, |i| i.span.start)
            .unwrap_or_else(|e| e);
        list.insert(pos, interval);
    }

    pub fn intervals(&self, worker: &WorkerId) -> &[OccupiedInterval] {
        self.by_worker.get(worker).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total intervals across all workers.
    pub fn len(&self) -> usize {
        self.by_worker.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Intervals of `worker` overlapping `query`.
    /// Uses binary search to skip intervals starting at or after `query.end`.
    pub fn overlapping<'a>(
        &'a self,
        worker: &WorkerId,
        query: &Span,
    ) -> impl Iterator<Item = &'a OccupiedInterval> + use<'a> {
        let list = self.intervals(worker);
        let right_bound = list.partition_point(|i| i.span.start < query.end);
        let query_start = query.start;
        list[..right_bound]
            .iter()
            .filter(move |i| i.span.end > query_start)
    }

    pub fn first_conflict(&self, worker: &WorkerId, span: &Span) -> Option<&OccupiedInterval> {
        self.overlapping(worker, span).next()
    }

    pub fn has_conflict(&self, worker: &WorkerId, start: Minute, end: Minute) -> bool {
        start < end && self.first_conflict(worker, &Span::new(start, end)).is_some()
    }

    /// Parts of `window` where `worker` is not occupied.
    pub fn free_spans(&self, worker: &WorkerId, window: Span) -> Vec<Span> {
        let busy: Vec<Span> = self.overlapping(worker, &window).map(|i| i.span).collect();
        subtract_intervals(&[window], &merge_overlapping(&busy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    const H: Minute = 60;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 12).unwrap()
    }

    fn record(worker: WorkerId, times: RecordTimes) -> BookingRecord {
        BookingRecord {
            id: Ulid::new(),
            site_id: Ulid::nil(),
            date: day(),
            worker_id: worker,
            service_id: Ulid::nil(),
            variant_id: Ulid::nil(),
            service_name: "Haircut".into(),
            phase: 1,
            status: BookingStatus::Confirmed,
            archived: false,
            times,
            follow_up: None,
            customer: None,
            created_at_ms: None,
            visit_key: None,
            parent_id: None,
            hold_expires_at_ms: None,
            cancellation: None,
        }
    }

    #[test]
    fn all_record_shapes_normalize_to_same_interval() {
        let w = Ulid::new();
        let shapes = [
            RecordTimes::Span {
                start: 10 * H,
                end: 10 * H + 30,
            },
            RecordTimes::StartDuration {
                start: 10 * H,
                duration: 30,
            },
            RecordTimes::Clock {
                start: "10:00".into(),
                end: Some("10:30".into()),
                duration: None,
            },
            RecordTimes::Clock {
                start: "10:00".into(),
                end: None,
                duration: Some(30),
            },
        ];
        for times in shapes {
            let out = normalize_record(&record(w, times)).unwrap();
            assert_eq!(out.len(), 1);
            assert_eq!(out[0].span, Span::new(10 * H, 10 * H + 30));
            assert_eq!(out[0].worker_id, w);
        }
    }

    #[test]
    fn unreadable_records_are_errors() {
        let w = Ulid::new();
        let bad = [
            RecordTimes::Clock {
                start: "ten".into(),
                end: None,
                duration: Some(30),
            },
            RecordTimes::Clock {
                start: "10:00".into(),
                end: None,
                duration: None,
            },
            RecordTimes::Span {
                start: 11 * H,
                end: 10 * H,
            },
            RecordTimes::StartDuration {
                start: 23 * H,
                duration: 90,
            },
            RecordTimes::StartDuration {
                start: 10 * H,
                duration: Minute::MAX,
            },
            RecordTimes::StartDuration {
                start: Minute::MIN,
                duration: 30,
            },
            RecordTimes::Clock {
                start: "35791395:00".into(),
                end: None,
                duration: Some(30),
            },
            RecordTimes::Clock {
                start: "10:00".into(),
                end: None,
                duration: Some(Minute::MAX),
            },
        ];
        for times in bad {
            let result = normalize_record(&record(w, times));
            assert!(matches!(result, Err(EngineError::CorruptRecord { .. })));
        }
    }

    #[test]
    fn cancelled_and_archived_bookings_excluded() {
        let w = Ulid::new();
        let times = RecordTimes::Span {
            start: 10 * H,
            end: 11 * H,
        };
        let mut cancelled = record(w, times.clone());
        cancelled.status = BookingStatus::Cancelled;
        let mut archived = record(w, times.clone());
        archived.archived = true;
        let live = record(w, times);

        let index = ConflictIndex::build(day(), &[cancelled, archived, live.clone()]).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.intervals(&w)[0].booking_id, live.id);
    }

    #[test]
    fn stored_follow_up_skips_wait_gap() {
        let w = Ulid::new();
        let mut r = record(
            w,
            RecordTimes::Span {
                start: 10 * H,
                end: 10 * H + 30,
            },
        );
        r.follow_up = Some(StoredFollowUp {
            wait_minutes: 10,
            duration_minutes: 45,
            worker_id: None,
        });
        let index = ConflictIndex::build(day(), &[r]).unwrap();
        assert_eq!(index.intervals(&w).len(), 2);
        // the 10 minute wait is free
        assert!(!index.has_conflict(&w, 10 * H + 30, 10 * H + 40));
        assert!(index.has_conflict(&w, 10 * H + 40, 10 * H + 41));
        assert!(!index.has_conflict(&w, 11 * H + 25, 12 * H));
    }

    #[test]
    fn follow_up_overflow_is_corrupt() {
        let w = Ulid::new();
        for (wait, duration) in [(Minute::MAX, 30), (10, Minute::MAX)] {
            let mut r = record(
                w,
                RecordTimes::Span {
                    start: 10 * H,
                    end: 10 * H + 30,
                },
            );
            r.follow_up = Some(StoredFollowUp {
                wait_minutes: wait,
                duration_minutes: duration,
                worker_id: None,
            });
            assert!(matches!(normalize_record(&r), Err(EngineError::CorruptRecord { .. })));
        }
    }

    #[test]
    fn follow_up_can_belong_to_another_worker() {
        let a = Ulid::new();
        let b = Ulid::new();
        let mut r = record(
            a,
            RecordTimes::Span {
                start: 9 * H,
                end: 9 * H + 30,
            },
        );
        r.follow_up = Some(StoredFollowUp {
            wait_minutes: 0,
            duration_minutes: 30,
            worker_id: Some(b),
        });
        let index = ConflictIndex::build(day(), &[r]).unwrap();
        assert_eq!(index.intervals(&a).len(), 1);
        assert_eq!(index.intervals(&b)[0].span, Span::new(9 * H + 30, 10 * H));
    }

    #[test]
    fn other_dates_ignored() {
        let w = Ulid::new();
        let mut r = record(
            w,
            RecordTimes::Span {
                start: 10 * H,
                end: 11 * H,
            },
        );
        r.date = day().succ_opt().unwrap();
        let index = ConflictIndex::build(day(), &[r]).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn half_open_overlap_semantics() {
        let w = Ulid::new();
        let index = ConflictIndex::build(
            day(),
            &[record(
                w,
                RecordTimes::Span {
                    start: 10 * H,
                    end: 10 * H + 30,
                },
            )],
        )
        .unwrap();
        assert!(!index.has_conflict(&w, 9 * H + 30, 10 * H)); // ends at start
        assert!(!index.has_conflict(&w, 10 * H + 30, 11 * H)); // starts at end
        assert!(index.has_conflict(&w, 10 * H + 29, 11 * H));
        assert!(index.has_conflict(&w, 9 * H, 12 * H)); // spans it
        assert!(!index.has_conflict(&Ulid::new(), 10 * H, 10 * H + 30));
    }

    #[test]
    fn intervals_kept_sorted() {
        let w = Ulid::new();
        let mk = |s: Minute| {
            record(
                w,
                RecordTimes::Span {
                    start: s,
                    end: s + 15,
                },
            )
        };
        let index = ConflictIndex::build(day(), &[mk(14 * H), mk(9 * H), mk(11 * H)]).unwrap();
        let starts: Vec<Minute> = index.intervals(&w).iter().map(|i| i.span.start).collect();
        assert_eq!(starts, vec![9 * H, 11 * H, 14 * H]);
    }

    #[test]
    fn free_spans_subtracts_busy_time() {
        let w = Ulid::new();
        let index = ConflictIndex::build(
            day(),
            &[
                record(
                    w,
                    RecordTimes::Span {
                        start: 10 * H,
                        end: 11 * H,
                    },
                ),
                record(
                    w,
                    RecordTimes::Span {
                        start: 10 * H + 30,
                        end: 12 * H,
                    },
                ),
            ],
        )
        .unwrap();
        assert_eq!(
            index.free_spans(&w, Span::new(9 * H, 18 * H)),
            vec![Span::new(9 * H, 10 * H), Span::new(12 * H, 18 * H)]
        );
    }
}
