use std::collections::HashSet;

use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::cascade::{cancellation_for, stage_cancellation};
use super::repair::repair_placement;
use super::{now_ms, Engine, EngineError, StoreError};

impl Engine {
    /// Repair `request.placement` against the latest bookings and persist it
    /// as one booking per phase, atomically.
    ///
    /// A lost race surfaces as [`EngineError::ConflictDetected`]; the caller
    /// should re-enumerate and let the client pick again.
    pub async fn commit_visit(&self, site: SiteId, request: VisitRequest) -> Result<CommittedVisit, EngineError> {
        let day = self.load_day(site, request.date).await?;
        let repaired = match repair_placement(
            &request.placement,
            &day.conflicts,
            &day.workers,
            &day.availability(),
        ) {
            Ok(repaired) => repaired,
            Err(e) => {
                if e.is_retryable() {
                    metrics::counter!(crate::observability::REPAIRS_TOTAL, "outcome" => "conflict")
                        .increment(1);
                }
                return Err(e);
            }
        };
        let outcome = if repaired.reassigned.is_empty() { "clean" } else { "reassigned" };
        metrics::counter!(crate::observability::REPAIRS_TOTAL, "outcome" => outcome).increment(1);

        let visit_key = Ulid::new();
        let created_at = now_ms();
        let status = if request.hold_expires_at_ms.is_some() {
            BookingStatus::Pending
        } else {
            BookingStatus::Confirmed
        };
        let booking_ids: Vec<BookingId> = repaired.placement.phases.iter().map(|_| Ulid::new()).collect();
        let first = booking_ids[0];

        let writes: Vec<StoreWrite> = repaired
            .placement
            .phases
            .iter()
            .zip(&booking_ids)
            .enumerate()
            .map(|(i, (phase, id))| {
                StoreWrite::Insert(BookingRecord {
                    id: *id,
                    site_id: site,
                    date: request.date,
                    worker_id: phase.worker_id,
                    service_id: phase.service_id,
                    variant_id: phase.variant_id,
                    service_name: phase.service_name.clone(),
                    phase: (i + 1).min(u8::MAX as usize) as u8,
                    status,
                    archived: false,
                    times: RecordTimes::Span {
                        start: phase.start_at,
                        end: phase.end_at,
                    },
                    follow_up: None,
                    customer: request.customer.clone(),
                    created_at_ms: Some(created_at),
                    visit_key: Some(visit_key),
                    parent_id: (i > 0).then_some(first),
                    hold_expires_at_ms: request.hold_expires_at_ms,
                    cancellation: None,
                })
            })
            .collect();

        self.bookings
            .commit_group(site, writes)
            .await
            .map_err(|e| match e {
                StoreError::Conflict { inserted, existing } => EngineError::ConflictDetected {
                    phase_index: booking_ids.iter().position(|id| *id == inserted).unwrap_or(0),
                    conflicting: Some(existing),
                },
                other => EngineError::Store(other),
            })?;

        metrics::counter!(crate::observability::VISITS_COMMITTED_TOTAL).increment(1);
        info!(%site, %visit_key, phases = booking_ids.len(), reassigned = repaired.reassigned.len(), "visit committed");
        self.notify.send(
            site,
            &VisitEvent::Committed {
                visit_key,
                booking_ids: booking_ids.clone(),
            },
        );

        Ok(CommittedVisit {
            visit_key,
            booking_ids,
            placement: repaired.placement,
            reassigned: repaired.reassigned,
        })
    }

    /// Cancel and archive every booking in `ids` in one atomic batch.
    ///
    /// Already archived bookings are skipped, so repeating a cancellation
    /// returns `{0, 0}`. Unknown ids count as failures and are not staged.
    /// When another cancellation archives a member between staging and
    /// commit, the batch is restaged so each booking is counted once.
    pub async fn cancel_group(
        &self,
        site: SiteId,
        ids: &[BookingId],
        reason: CancelReason,
        actor: Option<&ActorMeta>,
    ) -> Result<CancelOutcome, EngineError> {
        if ids.len() > MAX_BATCH_SIZE {
            return Err(EngineError::LimitExceeded("cancel batch too large"));
        }
        let cancellation = cancellation_for(reason, actor, now_ms())?;
        let mut seen = HashSet::new();
        let unique: Vec<BookingId> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();

        let mut attempt = 0;
        loop {
            attempt += 1;
            let staged = self.stage_group(site, &unique, &cancellation).await?;
            if staged.writes.is_empty() {
                return Ok(staged.outcome);
            }

            match self.bookings.commit_group(site, staged.writes).await {
                Ok(()) => {
                    let cancelled = staged.cancelled;
                    metrics::counter!(
                        crate::observability::BOOKINGS_CANCELLED_TOTAL,
                        "reason" => reason.as_str()
                    )
                    .increment(cancelled.len() as u64);
                    info!(%site, reason = reason.as_str(), cancelled = cancelled.len(), failed = staged.outcome.fail_count, "visit cancelled");
                    self.notify.send(
                        site,
                        &VisitEvent::Cancelled {
                            booking_ids: cancelled,
                            reason,
                        },
                    );
                    return Ok(staged.outcome);
                }
                Err(StoreError::AlreadyArchived(id)) if attempt < MAX_CANCEL_ATTEMPTS => {
                    debug!(%id, attempt, "cancel raced with another cancellation, restaging");
                }
                Err(e) => {
                    warn!(%site, error = %e, members = staged.cancelled.len(), "cascade batch rolled back");
                    metrics::counter!(crate::observability::BATCH_COMMIT_FAILURES_TOTAL).increment(1);
                    return Err(EngineError::BatchCommitFailure(e));
                }
            }
        }
    }

    async fn stage_group(
        &self,
        site: SiteId,
        ids: &[BookingId],
        cancellation: &Cancellation,
    ) -> Result<StagedCancel, EngineError> {
        let mut staged = StagedCancel::default();
        for id in ids {
            match self.bookings.get(site, *id).await? {
                None => {
                    debug!(%id, "cancel: booking not found");
                    staged.outcome.fail_count += 1;
                }
                Some(record) if record.archived => {
                    debug!(%id, "cancel: already archived, skipping");
                }
                Some(record) => {
                    staged.writes.extend(stage_cancellation(&record, cancellation));
                    staged.cancelled.push(record.id);
                    staged.outcome.success_count += 1;
                }
            }
        }
        Ok(staged)
    }

    /// Resolve `booking_id`'s visit and cancel all of it.
    pub async fn cancel_visit(
        &self,
        site: SiteId,
        booking_id: BookingId,
        reason: CancelReason,
        actor: Option<&ActorMeta>,
    ) -> Result<CancelOutcome, EngineError> {
        let group = self.resolve_cascade_group(site, booking_id).await?;
        self.cancel_group(site, &group.ids, reason, actor).await
    }

    /// Cancel every pending visit whose hold expired at or before `now`.
    /// Returns the number of bookings cancelled.
    pub async fn expire_holds(&self, site: SiteId, now: i64) -> Result<usize, EngineError> {
        let expired = self.bookings.list_expired_holds(site, now).await?;
        let mut handled = HashSet::new();
        let mut total = 0;
        for record in expired {
            if handled.contains(&record.id) {
                continue;
            }
            let group = self.resolve_cascade_group(site, record.id).await?;
            handled.extend(group.ids.iter().copied());
            let outcome = self
                .cancel_group(site, &group.ids, CancelReason::AutomaticExpiry, None)
                .await?;
            total += outcome.success_count;
        }
        Ok(total)
    }
}

#[derive(Default)]
struct StagedCancel {
    outcome: CancelOutcome,
    writes: Vec<StoreWrite>,
    cancelled: Vec<BookingId>,
}
