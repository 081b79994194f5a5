//! Multi-phase appointment scheduling: slot search, staff assignment,
//! commit-time repair, and whole-visit cancellation.
//!
//! ```
//! use std::sync::Arc;
//! use chrono::NaiveDate;
//! use ulid::Ulid;
//! use visitchain::config::EngineConfig;
//! use visitchain::engine::{build_chain, Engine, InMemoryStore};
//! use visitchain::model::*;
//! use visitchain::notify::NotifyHub;
//!
//! # tokio_test::block_on(async {
//! let haircut = Service { id: Ulid::new(), name: "Haircut".into(), category: None };
//! let catalog = ServiceCatalog::new([haircut.clone()]);
//! let cut = ServiceVariant {
//!     id: Ulid::new(),
//!     service_id: haircut.id,
//!     name: "Cut".into(),
//!     duration_minutes: 30,
//!     follow_up: None,
//! };
//! let maya = Worker {
//!     id: Ulid::new(),
//!     name: "Maya".into(),
//!     capabilities: Capabilities::validated([haircut.id], &catalog)?,
//!     availability: WeeklyAvailability::inherit_all(),
//! };
//!
//! let store = Arc::new(InMemoryStore::new());
//! let site = Ulid::new();
//! store.insert_site(site, BusinessHours::uniform(9 * 60, 18 * 60), vec![maya]);
//! let engine = Engine::in_memory(store, Arc::new(NotifyHub::new()), EngineConfig::default());
//!
//! let chain = build_chain(&[(&haircut, &cut)])?;
//! let date = NaiveDate::from_ymd_opt(2026, 10, 12).unwrap();
//! let slots = engine.enumerate_slots(site, &chain, date, None).await?;
//! assert_eq!(slots[0].start, 9 * 60);
//!
//! let request = VisitRequest {
//!     date,
//!     placement: slots[0].placement.clone(),
//!     customer: CustomerKey::new("ana@example.com"),
//!     hold_expires_at_ms: None,
//! };
//! let visit = engine.commit_visit(site, request).await?;
//! assert_eq!(visit.booking_ids.len(), 1);
//! # Ok::<(), visitchain::engine::EngineError>(())
//! # }).unwrap();
//! ```

pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod reaper;
