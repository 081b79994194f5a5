use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;
use crate::model::SiteId;

/// Background task that periodically cancels pending visits whose hold expired.
pub async fn run_reaper(engine: Arc<Engine>, sites: Vec<SiteId>) {
    let period = Duration::from_secs(engine.config().reaper_interval_secs);
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        reap_once(&engine, &sites, chrono::Utc::now().timestamp_millis()).await;
    }
}

/// One pass over `sites`. Returns the number of bookings cancelled.
pub async fn reap_once(engine: &Engine, sites: &[SiteId], now_ms: i64) -> usize {
    let mut total = 0;
    for site in sites {
        match engine.expire_holds(*site, now_ms).await {
            Ok(0) => {}
            Ok(n) => {
                info!(%site, cancelled = n, "reaped expired holds");
                total += n;
            }
            Err(e) => {
                // Store may be briefly unavailable; next tick retries
                tracing::debug!(%site, "reaper skip: {e}");
            }
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::{BookingStore, InMemoryStore};
    use crate::model::*;
    use crate::notify::NotifyHub;
    use chrono::NaiveDate;
    use ulid::Ulid;

    fn pending(site: SiteId, visit: VisitKey, start: Minute, expires_at: i64) -> BookingRecord {
        BookingRecord {
            id: Ulid::new(),
            site_id: site,
            date: NaiveDate::from_ymd_opt(2026, 10, 12).unwrap(),
            worker_id: Ulid::new(),
            service_id: Ulid::nil(),
            variant_id: Ulid::nil(),
            service_name: "Haircut".into(),
            phase: 1,
            status: BookingStatus::Pending,
            archived: false,
            times: RecordTimes::Span {
                start,
                end: start + 30,
            },
            follow_up: None,
            customer: None,
            created_at_ms: None,
            visit_key: Some(visit),
            parent_id: None,
            hold_expires_at_ms: Some(expires_at),
            cancellation: None,
        }
    }

    #[tokio::test]
    async fn reaper_cancels_expired_visits_only() {
        let store = std::sync::Arc::new(InMemoryStore::new());
        let site = Ulid::new();
        store.insert_site(site, BusinessHours::uniform(540, 1080), vec![]);
        let engine = Engine::in_memory(store.clone(), Arc::new(NotifyHub::new()), EngineConfig::default());

        let stale = Ulid::new();
        let p1 = pending(site, stale, 600, 1_000);
        let p2 = pending(site, stale, 640, 1_000);
        let live = pending(site, Ulid::new(), 700, 9_000);
        for r in [&p1, &p2, &live] {
            store.seed_booking(r.clone()).await.unwrap();
        }

        assert_eq!(reap_once(&engine, &[site], 5_000).await, 2);
        let after = store.get(site, p2.id).await.unwrap().unwrap();
        assert!(after.archived);
        let c = after.cancellation.unwrap();
        assert_eq!(c.reason, CancelReason::AutomaticExpiry);
        assert!(!store.get(site, live.id).await.unwrap().unwrap().archived);

        // nothing left to reap
        assert_eq!(reap_once(&engine, &[site], 5_000).await, 0);
    }

    #[tokio::test]
    async fn unknown_site_is_skipped() {
        let store = std::sync::Arc::new(InMemoryStore::new());
        let engine = Engine::in_memory(store, Arc::new(NotifyHub::new()), EngineConfig::default());
        assert_eq!(reap_once(&engine, &[Ulid::new()], 0).await, 0);
    }
}
