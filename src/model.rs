use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::EngineError;

/// Minutes since local midnight. The only time-of-day type.
pub type Minute = i32;

pub const MINUTES_PER_DAY: Minute = 24 * 60;

pub type SiteId = Ulid;
pub type ServiceId = Ulid;
pub type VariantId = Ulid;
pub type WorkerId = Ulid;
pub type BookingId = Ulid;
pub type VisitKey = Ulid;

/// Half-open interval `[start, end)` in minutes of the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Minute,
    pub end: Minute,
}

impl Span {
    pub fn new(start: Minute, end: Minute) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration(&self) -> Minute {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Minute) -> bool {
        self.start <= t && t < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Intersection of two spans, `None` when they do not overlap.
    pub fn intersect(&self, other: &Span) -> Option<Span> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then(|| Span::new(start, end))
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", format_clock(self.start), format_clock(self.end))
    }
}

/// Parse `"HH:MM"` into minutes since midnight. `"24:00"` is accepted as end of day.
pub fn parse_clock(text: &str) -> Option<Minute> {
    let (h, m) = text.trim().split_once(':')?;
    let h: Minute = h.parse().ok()?;
    let m: Minute = m.parse().ok()?;
    if !(0..60).contains(&m) {
        return None;
    }
    let total = h.checked_mul(60)?.checked_add(m)?;
    (0..=MINUTES_PER_DAY).contains(&total).then_some(total)
}

pub fn format_clock(minute: Minute) -> String {
    format!("{:02}:{:02}", minute / 60, minute % 60)
}

// ── Catalog ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub name: String,
    /// Display grouping only.
    #[serde(default)]
    pub category: Option<String>,
}

/// Mandatory second phase of the same visit, performed after a non-blocking wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUp {
    pub name: String,
    pub wait_minutes: Minute,
    pub duration_minutes: Minute,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceVariant {
    pub id: VariantId,
    pub service_id: ServiceId,
    pub name: String,
    pub duration_minutes: Minute,
    #[serde(default)]
    pub follow_up: Option<FollowUp>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceCatalog {
    services: BTreeMap<ServiceId, Service>,
}

impl ServiceCatalog {
    pub fn new(services: impl IntoIterator<Item = Service>) -> Self {
        Self {
            services: services.into_iter().map(|s| (s.id, s)).collect(),
        }
    }

    pub fn get(&self, id: &ServiceId) -> Option<&Service> {
        self.services.get(id)
    }

    pub fn contains(&self, id: &ServiceId) -> bool {
        self.services.contains_key(id)
    }
}

// ── Staff ────────────────────────────────────────────────────────

/// Services a worker may perform. Only constructed through [`Capabilities::validated`]
/// outside of deserialization, so every id is known to the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capabilities(BTreeSet<ServiceId>);

impl Capabilities {
    pub fn validated(
        ids: impl IntoIterator<Item = ServiceId>,
        catalog: &ServiceCatalog,
    ) -> Result<Self, EngineError> {
        let mut set = BTreeSet::new();
        for id in ids {
            if !catalog.contains(&id) {
                return Err(EngineError::UnknownService(id));
            }
            set.insert(id);
        }
        Ok(Self(set))
    }

    /// Re-check a deserialized set against the catalog.
    pub fn check(&self, catalog: &ServiceCatalog) -> Result<(), EngineError> {
        match self.0.iter().find(|id| !catalog.contains(id)) {
            Some(id) => Err(EngineError::UnknownService(*id)),
            None => Ok(()),
        }
    }

    pub fn contains(&self, service: &ServiceId) -> bool {
        self.0.contains(service)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A worker's own schedule for one weekday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerDay {
    Open { open: Minute, close: Minute },
    Closed,
}

/// Per-weekday worker schedule, indexed Monday first. `None` inherits business hours.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyAvailability {
    days: [Option<WorkerDay>; 7],
}

impl WeeklyAvailability {
    pub fn inherit_all() -> Self {
        Self::default()
    }

    pub fn with_day(mut self, weekday: Weekday, day: WorkerDay) -> Self {
        self.days[weekday.num_days_from_monday() as usize] = Some(day);
        self
    }

    pub fn day(&self, weekday: Weekday) -> Option<&WorkerDay> {
        self.days[weekday.num_days_from_monday() as usize].as_ref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    pub name: String,
    pub capabilities: Capabilities,
    #[serde(default)]
    pub availability: WeeklyAvailability,
}

impl Worker {
    pub fn can_perform(&self, service: &ServiceId) -> bool {
        self.capabilities.contains(service)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessDay {
    pub enabled: bool,
    pub open: Minute,
    pub close: Minute,
}

impl BusinessDay {
    pub const CLOSED: BusinessDay = BusinessDay {
        enabled: false,
        open: 0,
        close: 0,
    };
}

/// Site operating hours, indexed Monday first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessHours {
    days: [BusinessDay; 7],
}

impl BusinessHours {
    /// Same hours every day of the week.
    pub fn uniform(open: Minute, close: Minute) -> Self {
        Self {
            days: [BusinessDay {
                enabled: true,
                open,
                close,
            }; 7],
        }
    }

    pub fn closed() -> Self {
        Self {
            days: [BusinessDay::CLOSED; 7],
        }
    }

    pub fn with_day(mut self, weekday: Weekday, day: BusinessDay) -> Self {
        self.days[weekday.num_days_from_monday() as usize] = day;
        self
    }

    pub fn day(&self, weekday: Weekday) -> &BusinessDay {
        &self.days[weekday.num_days_from_monday() as usize]
    }
}

// ── Bookings (persisted shape) ───────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

/// Historical layouts for a booking's time fields. Normalized into
/// [`OccupiedInterval`]s only by the conflict index adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum RecordTimes {
    Span { start: Minute, end: Minute },
    StartDuration { start: Minute, duration: Minute },
    Clock {
        start: String,
        #[serde(default)]
        end: Option<String>,
        #[serde(default)]
        duration: Option<Minute>,
    },
}

/// Follow-up phase stored inside the same legacy record as its main phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFollowUp {
    pub wait_minutes: Minute,
    pub duration_minutes: Minute,
    #[serde(default)]
    pub worker_id: Option<WorkerId>,
}

/// Normalized customer identity (trimmed, lowercased email or phone).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerKey(String);

impl CustomerKey {
    /// Returns `None` for blank input.
    pub fn new(raw: &str) -> Option<Self> {
        let key: String = raw
            .trim()
            .chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();
        (!key.is_empty()).then_some(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CustomerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CancelReason {
    Manual,
    AutomaticExpiry,
    CustomerInitiated,
}

impl CancelReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelReason::Manual => "manual",
            CancelReason::AutomaticExpiry => "automatic-expiry",
            CancelReason::CustomerInitiated => "customer-initiated",
        }
    }

    /// Whether a free-text note and actor may accompany the cancellation.
    pub fn accepts_note(&self) -> bool {
        !matches!(self, CancelReason::AutomaticExpiry)
    }
}

/// Who cancelled, and why, for manual and customer cancellations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorMeta {
    pub actor: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancellation {
    pub reason: CancelReason,
    pub note: Option<String>,
    pub actor: Option<String>,
    pub cancelled_at_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRecord {
    pub id: BookingId,
    pub site_id: SiteId,
    pub date: NaiveDate,
    pub worker_id: WorkerId,
    pub service_id: ServiceId,
    pub variant_id: VariantId,
    pub service_name: String,
    /// 1-based phase number within the visit.
    pub phase: u8,
    pub status: BookingStatus,
    #[serde(default)]
    pub archived: bool,
    pub times: RecordTimes,
    #[serde(default)]
    pub follow_up: Option<StoredFollowUp>,
    #[serde(default)]
    pub customer: Option<CustomerKey>,
    #[serde(default)]
    pub created_at_ms: Option<i64>,
    #[serde(default)]
    pub visit_key: Option<VisitKey>,
    #[serde(default)]
    pub parent_id: Option<BookingId>,
    #[serde(default)]
    pub hold_expires_at_ms: Option<i64>,
    #[serde(default)]
    pub cancellation: Option<Cancellation>,
}

impl BookingRecord {
    /// Occupies staff time: neither cancelled nor archived.
    pub fn is_active(&self) -> bool {
        !self.archived && self.status != BookingStatus::Cancelled
    }
}

// ── Solver types ─────────────────────────────────────────────────

/// A concrete busy window for one worker, derived from a stored booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupiedInterval {
    pub worker_id: WorkerId,
    pub span: Span,
    pub booking_id: BookingId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainPhase {
    pub service_id: ServiceId,
    pub variant_id: VariantId,
    pub service_name: String,
    pub duration_minutes: Minute,
    pub is_follow_up: bool,
}

/// Ordered phases of one visit. `gaps[i]` is the non-blocking wait between
/// phase `i` and phase `i + 1`.
///
/// Deserialization goes through [`Chain::with_gaps`], so a loaded chain obeys
/// the same rules as a built one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawChain")]
pub struct Chain {
    pub(crate) phases: Vec<ChainPhase>,
    pub(crate) gaps: Vec<Minute>,
}

#[derive(Deserialize)]
struct RawChain {
    phases: Vec<ChainPhase>,
    #[serde(default)]
    gaps: Vec<Minute>,
}

impl TryFrom<RawChain> for Chain {
    type Error = EngineError;

    fn try_from(raw: RawChain) -> Result<Self, Self::Error> {
        Chain::with_gaps(raw.phases, raw.gaps)
    }
}

impl Chain {
    pub fn phases(&self) -> &[ChainPhase] {
        &self.phases
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// Wait after phase `index`; zero after the last phase.
    pub fn gap_after(&self, index: usize) -> Minute {
        self.gaps.get(index).copied().unwrap_or(0)
    }

    /// Elapsed minutes from the first phase's start to the last phase's end.
    pub fn total_minutes(&self) -> Minute {
        self.phases.iter().map(|p| p.duration_minutes).sum::<Minute>()
            + self.gaps.iter().sum::<Minute>()
    }
}

/// One solved unit: a worker and a time for one chain phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPhase {
    pub phase_index: usize,
    pub service_id: ServiceId,
    pub variant_id: VariantId,
    pub service_name: String,
    pub worker_id: WorkerId,
    pub worker_name: String,
    pub start_at: Minute,
    pub end_at: Minute,
}

impl ResolvedPhase {
    pub fn span(&self) -> Span {
        Span::new(self.start_at, self.end_at)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub phases: Vec<ResolvedPhase>,
}

impl Placement {
    pub fn start(&self) -> Option<Minute> {
        self.phases.first().map(|p| p.start_at)
    }

    pub fn end(&self) -> Option<Minute> {
        self.phases.last().map(|p| p.end_at)
    }

    pub fn workers(&self) -> impl Iterator<Item = WorkerId> + '_ {
        self.phases.iter().map(|p| p.worker_id)
    }
}

/// A feasible start time for a whole chain, with the placement that proves it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub start: Minute,
    pub placement: Placement,
}

// ── Cascade types ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupSource {
    VisitKey,
    ParentLink,
    Heuristic,
    Singleton,
    /// Heuristic found more candidates than the cap; fell back to the singleton.
    Ambiguous,
}

impl GroupSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupSource::VisitKey => "visit_key",
            GroupSource::ParentLink => "parent_link",
            GroupSource::Heuristic => "heuristic",
            GroupSource::Singleton => "singleton",
            GroupSource::Ambiguous => "ambiguous",
        }
    }
}

/// Booking ids that make up one visit. The requested id is always first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeGroup {
    pub ids: Vec<BookingId>,
    pub source: GroupSource,
}

impl CascadeGroup {
    pub fn singleton(id: BookingId, source: GroupSource) -> Self {
        Self {
            ids: vec![id],
            source,
        }
    }

    pub fn contains(&self, id: &BookingId) -> bool {
        self.ids.contains(id)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOutcome {
    pub success_count: usize,
    pub fail_count: usize,
}

/// Per-customer history entry mirrored from a cancelled booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub key: String,
    pub customer: CustomerKey,
    pub variant_id: VariantId,
    pub booking_id: BookingId,
    pub service_name: String,
    pub date: NaiveDate,
    pub cancellation: Cancellation,
}

/// One staged write inside an atomic `commit_group`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreWrite {
    Insert(BookingRecord),
    Cancel {
        id: BookingId,
        cancellation: Cancellation,
    },
    History(HistoryRecord),
}

/// Broadcast on the site's notify channel after a successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisitEvent {
    Committed {
        visit_key: VisitKey,
        booking_ids: Vec<BookingId>,
    },
    Cancelled {
        booking_ids: Vec<BookingId>,
        reason: CancelReason,
    },
}

// ── Engine requests / results ────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitRequest {
    pub date: NaiveDate,
    pub placement: Placement,
    pub customer: Option<CustomerKey>,
    /// When set, the visit is stored as `Pending` until this instant.
    pub hold_expires_at_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedVisit {
    pub visit_key: VisitKey,
    pub booking_ids: Vec<BookingId>,
    pub placement: Placement,
    /// Phase indices whose worker changed during repair.
    pub reassigned: Vec<usize>,
}
