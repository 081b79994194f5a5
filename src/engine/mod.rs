mod availability;
mod cascade;
mod chain;
mod conflict;
mod error;
mod mutations;
mod queries;
mod repair;
mod slots;
mod solver;
mod store;

pub use availability::{
    business_window, merge_overlapping, subtract_intervals, worker_window, Availability, WorkerWindow,
};
pub use cascade::{cancellation_for, explicit_group, heuristic_group, history_key, stage_cancellation};
pub use chain::build_chain;
pub use conflict::{normalize_record, ConflictIndex};
pub use error::{EngineError, StoreError};
pub use repair::{repair_placement, Repaired};
pub use slots::{enumerate, enumerate_with_index, grid_points, SlotOptions};
pub use solver::place_chain;
pub use store::{
    BookingStore, CalendarConfigProvider, InMemoryStore, RosterProvider, SharedSiteState, SiteSnapshot,
    SiteState, Snapshot,
};

use std::sync::Arc;

use chrono::NaiveDate;

use crate::config::EngineConfig;
use crate::model::*;
use crate::notify::NotifyHub;

/// Async facade over the solving core.
///
/// Every call fetches fresh roster, hours, and bookings from the collaborators,
/// then runs the synchronous core over that data. No state is kept between
/// calls beyond the collaborators themselves.
pub struct Engine {
    pub(super) bookings: Arc<dyn BookingStore>,
    pub(super) roster: Arc<dyn RosterProvider>,
    pub(super) calendar: Arc<dyn CalendarConfigProvider>,
    pub notify: Arc<NotifyHub>,
    pub(super) config: EngineConfig,
}

/// Everything the core needs to solve one site-day.
pub(super) struct DayContext {
    pub date: NaiveDate,
    pub workers: Vec<Worker>,
    pub hours: BusinessHours,
    pub conflicts: ConflictIndex,
}

impl DayContext {
    pub fn availability(&self) -> Availability<'_> {
        Availability::new(&self.hours, self.date)
    }
}

impl Engine {
    pub fn new(
        bookings: Arc<dyn BookingStore>,
        roster: Arc<dyn RosterProvider>,
        calendar: Arc<dyn CalendarConfigProvider>,
        notify: Arc<NotifyHub>,
        config: EngineConfig,
    ) -> Self {
        Self {
            bookings,
            roster,
            calendar,
            notify,
            config: config.sanitized(),
        }
    }

    /// Engine whose three collaborators are the same in-memory store.
    pub fn in_memory(store: Arc<InMemoryStore>, notify: Arc<NotifyHub>, config: EngineConfig) -> Self {
        Self::new(store.clone(), store.clone(), store, notify, config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Fetch roster, hours, and the day's bookings concurrently and index them.
    pub(super) async fn load_day(&self, site: SiteId, date: NaiveDate) -> Result<DayContext, EngineError> {
        let (workers, hours, bookings) = futures::try_join!(
            self.roster.get_workers(site),
            self.calendar.get_business_hours(site),
            self.bookings.list_for_date(site, date),
        )?;
        let conflicts = ConflictIndex::build(date, &bookings)?;
        Ok(DayContext {
            date,
            workers,
            hours,
            conflicts,
        })
    }
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
