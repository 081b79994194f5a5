use std::time::Instant;

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::model::*;

use super::cascade::{explicit_group, heuristic_group};
use super::slots::{enumerate_with_index, SlotOptions};
use super::solver::place_chain;
use super::{ConflictIndex, Engine, EngineError};

impl Engine {
    /// Every feasible start time for `chain` on `date`, with its placement.
    pub async fn enumerate_slots(
        &self,
        site: SiteId,
        chain: &Chain,
        date: NaiveDate,
        preferred: Option<WorkerId>,
    ) -> Result<Vec<Slot>, EngineError> {
        self.enumerate_slots_from(site, chain, date, preferred, None).await
    }

    /// Like [`Engine::enumerate_slots`], skipping start times before `earliest`.
    pub async fn enumerate_slots_from(
        &self,
        site: SiteId,
        chain: &Chain,
        date: NaiveDate,
        preferred: Option<WorkerId>,
        earliest: Option<Minute>,
    ) -> Result<Vec<Slot>, EngineError> {
        let started = Instant::now();
        let day = self.load_day(site, date).await?;
        let options = SlotOptions {
            step_minutes: self.config.slot_step_minutes,
            earliest,
        };
        let slots = enumerate_with_index(
            chain,
            preferred,
            &day.workers,
            &day.conflicts,
            &day.availability(),
            options,
        );

        metrics::histogram!(crate::observability::ENUMERATE_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        metrics::counter!(crate::observability::SLOTS_ENUMERATED_TOTAL).increment(slots.len() as u64);
        debug!(%site, %date, phases = chain.len(), slots = slots.len(), "enumerated slots");
        Ok(slots)
    }

    /// Solve one start time. `Ok(None)` means infeasible, not an error.
    pub async fn place_chain(
        &self,
        site: SiteId,
        chain: &Chain,
        date: NaiveDate,
        start_at: Minute,
        preferred: Option<WorkerId>,
    ) -> Result<Option<Placement>, EngineError> {
        let day = self.load_day(site, date).await?;
        Ok(place_chain(
            chain,
            start_at,
            preferred,
            &day.workers,
            &day.conflicts,
            &day.availability(),
        ))
    }

    /// Fresh conflict index for a site-day, for callers that repair themselves.
    pub async fn conflict_index(&self, site: SiteId, date: NaiveDate) -> Result<ConflictIndex, EngineError> {
        let bookings = self.bookings.list_for_date(site, date).await?;
        ConflictIndex::build(date, &bookings)
    }

    /// A worker's unbooked time within their effective window on `date`.
    pub async fn worker_free_spans(
        &self,
        site: SiteId,
        date: NaiveDate,
        worker_id: WorkerId,
    ) -> Result<Vec<Span>, EngineError> {
        let day = self.load_day(site, date).await?;
        let worker = day
            .workers
            .iter()
            .find(|w| w.id == worker_id)
            .ok_or(EngineError::NotFound(worker_id))?;
        Ok(match day.availability().effective_window(worker) {
            Some(window) => day.conflicts.free_spans(&worker_id, window),
            None => Vec::new(),
        })
    }

    /// All bookings that belong to the same visit as `booking_id`, which is
    /// always included and listed first.
    pub async fn resolve_cascade_group(
        &self,
        site: SiteId,
        booking_id: BookingId,
    ) -> Result<CascadeGroup, EngineError> {
        let origin = self
            .bookings
            .get(site, booking_id)
            .await?
            .ok_or(EngineError::NotFound(booking_id))?;

        let group = match self.explicit_members(site, &origin).await? {
            Some(group) => group,
            None => {
                let same_date = self.bookings.list_for_date(site, origin.date).await?;
                heuristic_group(
                    &origin,
                    &same_date,
                    self.config.cascade_window_minutes,
                    self.config.heuristic_group_cap,
                )
            }
        };

        if group.source == GroupSource::Ambiguous {
            warn!(%booking_id, "cascade group ambiguous, cancelling booking alone");
        }
        metrics::counter!(
            crate::observability::CASCADE_RESOLUTIONS_TOTAL,
            "source" => group.source.as_str()
        )
        .increment(1);
        debug!(%booking_id, members = group.ids.len(), source = group.source.as_str(), "resolved cascade group");
        Ok(group)
    }

    /// Group from a shared visit key or a parent link, if either names more
    /// than one booking.
    async fn explicit_members(
        &self,
        site: SiteId,
        origin: &BookingRecord,
    ) -> Result<Option<CascadeGroup>, EngineError> {
        let cap = self.config.explicit_group_cap;

        if let Some(key) = origin.visit_key {
            let members = self.bookings.list_by_visit_key(site, key).await?;
            if members.len() > 1 {
                return Ok(Some(CascadeGroup {
                    ids: explicit_group(origin.id, members.iter().map(|b| b.id), cap),
                    source: GroupSource::VisitKey,
                }));
            }
        }

        let root = origin.parent_id.unwrap_or(origin.id);
        let mut members: Vec<BookingId> = self
            .bookings
            .list_children(site, root)
            .await?
            .iter()
            .map(|b| b.id)
            .collect();
        members.push(root);
        members.sort();
        members.dedup();
        if members.len() > 1 {
            return Ok(Some(CascadeGroup {
                ids: explicit_group(origin.id, members, cap),
                source: GroupSource::ParentLink,
            }));
        }
        Ok(None)
    }
}
