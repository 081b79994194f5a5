use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::model::*;

use super::conflict::{ConflictIndex, normalize_record};
use super::{EngineError, StoreError};

// ── Collaborator traits ──────────────────────────────────────────

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn list_for_date(&self, site: SiteId, date: NaiveDate) -> Result<Vec<BookingRecord>, StoreError>;

    async fn get(&self, site: SiteId, id: BookingId) -> Result<Option<BookingRecord>, StoreError>;

    async fn list_by_visit_key(&self, site: SiteId, key: VisitKey) -> Result<Vec<BookingRecord>, StoreError>;

    /// Bookings whose `parent_id` is `parent`.
    async fn list_children(&self, site: SiteId, parent: BookingId) -> Result<Vec<BookingRecord>, StoreError>;

    /// Pending, unarchived bookings whose hold expired at or before `now_ms`.
    async fn list_expired_holds(&self, site: SiteId, now_ms: i64) -> Result<Vec<BookingRecord>, StoreError>;

    /// Apply all writes or none.
    async fn commit_group(&self, site: SiteId, writes: Vec<StoreWrite>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait RosterProvider: Send + Sync {
    async fn get_workers(&self, site: SiteId) -> Result<Vec<Worker>, StoreError>;
}

#[async_trait]
pub trait CalendarConfigProvider: Send + Sync {
    async fn get_business_hours(&self, site: SiteId) -> Result<BusinessHours, StoreError>;
}

// ── In-memory implementation ─────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SiteState {
    pub workers: Vec<Worker>,
    pub hours: BusinessHours,
    pub bookings: BTreeMap<BookingId, BookingRecord>,
    pub history: BTreeMap<String, HistoryRecord>,
}

impl SiteState {
    pub fn new(hours: BusinessHours, workers: Vec<Worker>) -> Self {
        Self {
            workers,
            hours,
            bookings: BTreeMap::new(),
            history: BTreeMap::new(),
        }
    }
}

pub type SharedSiteState = Arc<RwLock<SiteState>>;

/// Store, roster, and calendar for any number of sites, held in memory.
///
/// `commit_group` validates every write under the site's write lock before
/// applying any of them, and re-checks inserted bookings against live ones so
/// a race that slipped past repair still surfaces as a conflict.
pub struct InMemoryStore {
    sites: DashMap<SiteId, SharedSiteState>,
    fail_next_commit: AtomicBool,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            sites: DashMap::new(),
            fail_next_commit: AtomicBool::new(false),
        }
    }

    pub fn insert_site(&self, site: SiteId, hours: BusinessHours, workers: Vec<Worker>) {
        self.sites
            .insert(site, Arc::new(RwLock::new(SiteState::new(hours, workers))));
    }

    pub fn site_ids(&self) -> Vec<SiteId> {
        self.sites.iter().map(|e| *e.key()).collect()
    }

    fn site(&self, site: &SiteId) -> Result<SharedSiteState, StoreError> {
        self.sites
            .get(site)
            .map(|e| e.value().clone())
            .ok_or(StoreError::UnknownSite(*site))
    }

    /// Seed a booking directly, bypassing conflict and shape checks (imports,
    /// fixtures). Unreadable rows surface later as `CorruptRecord`.
    pub async fn seed_booking(&self, record: BookingRecord) -> Result<(), StoreError> {
        let state = self.site(&record.site_id)?;
        let mut guard = state.write().await;
        guard.bookings.insert(record.id, record);
        Ok(())
    }

    pub async fn history_for(&self, site: SiteId, customer: &CustomerKey) -> Result<Vec<HistoryRecord>, StoreError> {
        let state = self.site(&site)?;
        let guard = state.read().await;
        Ok(guard
            .history
            .values()
            .filter(|h| &h.customer == customer)
            .cloned()
            .collect())
    }

    /// Make the next `commit_group` fail as a storage fault.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Load a snapshot, re-validating worker capabilities against the catalog.
    pub async fn from_snapshot(snapshot: Snapshot) -> Result<Self, EngineError> {
        let catalog = ServiceCatalog::new(snapshot.services);
        let store = Self::new();
        for site in snapshot.sites {
            for worker in &site.workers {
                worker.capabilities.check(&catalog)?;
            }
            store.insert_site(site.id, site.business_hours, site.workers);
            for mut booking in site.bookings {
                booking.site_id = site.id;
                normalize_record(&booking)?;
                store.seed_booking(booking).await?;
            }
        }
        Ok(store)
    }
}

/// Validate writes against the current state plus earlier writes in the batch.
fn validate_writes(state: &SiteState, writes: &[StoreWrite]) -> Result<(), StoreError> {
    let mut indexes: HashMap<NaiveDate, ConflictIndex> = HashMap::new();
    for write in writes {
        match write {
            StoreWrite::Insert(record) => {
                if state.bookings.contains_key(&record.id) {
                    return Err(StoreError::AlreadyExists(record.id));
                }
                let index = match indexes.entry(record.date) {
                    Entry::Occupied(e) => e.into_mut(),
                    Entry::Vacant(e) => e.insert(live_index(state, record.date)?),
                };
                let intervals = normalize_record(record)
                    .map_err(|e| StoreError::InvalidWrite(e.to_string()))?;
                for interval in &intervals {
                    if let Some(hit) = index.first_conflict(&interval.worker_id, &interval.span) {
                        return Err(StoreError::Conflict {
                            inserted: record.id,
                            existing: hit.booking_id,
                        });
                    }
                }
                for interval in intervals {
                    index.insert(interval);
                }
            }
            StoreWrite::Cancel { id, .. } => match state.bookings.get(id) {
                None => return Err(StoreError::NotFound(*id)),
                Some(existing) if existing.archived => return Err(StoreError::AlreadyArchived(*id)),
                Some(_) => {}
            },
            StoreWrite::History(_) => {}
        }
    }
    Ok(())
}

/// Conflict index over the stored bookings for `date`. An unreadable stored
/// row fails the write instead of counting as free time.
fn live_index(state: &SiteState, date: NaiveDate) -> Result<ConflictIndex, StoreError> {
    let mut index = ConflictIndex::empty(date);
    for existing in state.bookings.values().filter(|b| b.date == date) {
        let intervals = normalize_record(existing)
            .map_err(|e| StoreError::InvalidWrite(format!("stored booking unreadable: {e}")))?;
        for interval in intervals {
            index.insert(interval);
        }
    }
    Ok(index)
}

fn apply_write(state: &mut SiteState, write: StoreWrite) {
    match write {
        StoreWrite::Insert(record) => {
            state.bookings.insert(record.id, record);
        }
        StoreWrite::Cancel { id, cancellation } => {
            if let Some(record) = state.bookings.get_mut(&id) {
                record.status = BookingStatus::Cancelled;
                record.archived = true;
                record.cancellation = Some(cancellation);
            }
        }
        StoreWrite::History(entry) => {
            state.history.insert(entry.key.clone(), entry);
        }
    }
}

#[async_trait]
impl BookingStore for InMemoryStore {
    async fn list_for_date(&self, site: SiteId, date: NaiveDate) -> Result<Vec<BookingRecord>, StoreError> {
        let Ok(state) = self.site(&site) else {
            return Ok(Vec::new());
        };
        let guard = state.read().await;
        Ok(guard
            .bookings
            .values()
            .filter(|b| b.date == date)
            .cloned()
            .collect())
    }

    async fn get(&self, site: SiteId, id: BookingId) -> Result<Option<BookingRecord>, StoreError> {
        let state = self.site(&site)?;
        let guard = state.read().await;
        Ok(guard.bookings.get(&id).cloned())
    }

    async fn list_by_visit_key(&self, site: SiteId, key: VisitKey) -> Result<Vec<BookingRecord>, StoreError> {
        let state = self.site(&site)?;
        let guard = state.read().await;
        Ok(guard
            .bookings
            .values()
            .filter(|b| b.visit_key == Some(key))
            .cloned()
            .collect())
    }

    async fn list_children(&self, site: SiteId, parent: BookingId) -> Result<Vec<BookingRecord>, StoreError> {
        let state = self.site(&site)?;
        let guard = state.read().await;
        Ok(guard
            .bookings
            .values()
            .filter(|b| b.parent_id == Some(parent))
            .cloned()
            .collect())
    }

    async fn list_expired_holds(&self, site: SiteId, now_ms: i64) -> Result<Vec<BookingRecord>, StoreError> {
        let state = self.site(&site)?;
        let guard = state.read().await;
        Ok(guard
            .bookings
            .values()
            .filter(|b| b.status == BookingStatus::Pending && !b.archived)
            .filter(|b| b.hold_expires_at_ms.is_some_and(|t| t <= now_ms))
            .cloned()
            .collect())
    }

    async fn commit_group(&self, site: SiteId, writes: Vec<StoreWrite>) -> Result<(), StoreError> {
        let state = self.site(&site)?;
        let mut guard = state.write().await;
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected commit failure".into()));
        }
        validate_writes(&guard, &writes)?;
        for write in writes {
            apply_write(&mut guard, write);
        }
        Ok(())
    }
}

#[async_trait]
impl RosterProvider for InMemoryStore {
    async fn get_workers(&self, site: SiteId) -> Result<Vec<Worker>, StoreError> {
        let state = self.site(&site)?;
        let guard = state.read().await;
        Ok(guard.workers.clone())
    }
}

#[async_trait]
impl CalendarConfigProvider for InMemoryStore {
    async fn get_business_hours(&self, site: SiteId) -> Result<BusinessHours, StoreError> {
        let state = self.site(&site)?;
        let guard = state.read().await;
        Ok(guard.hours.clone())
    }
}

// ── Snapshot ─────────────────────────────────────────────────────

/// JSON seed for an [`InMemoryStore`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub sites: Vec<SiteSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteSnapshot {
    pub id: SiteId,
    pub business_hours: BusinessHours,
    #[serde(default)]
    pub workers: Vec<Worker>,
    #[serde(default)]
    pub bookings: Vec<BookingRecord>,
}
