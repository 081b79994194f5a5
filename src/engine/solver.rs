use tracing::debug;

use crate::model::*;

use super::availability::Availability;
use super::conflict::ConflictIndex;

/// Assign one worker per phase for a chain starting at `start_at`.
///
/// Greedy per phase, no backtracking: candidates are tried as
/// preferred worker, then the previous phase's worker, then roster order.
/// Returns `None` when any phase has no free, capable worker.
pub fn place_chain(
    chain: &Chain,
    start_at: Minute,
    preferred: Option<WorkerId>,
    workers: &[Worker],
    conflicts: &ConflictIndex,
    availability: &Availability<'_>,
) -> Option<Placement> {
    availability.business_window()?;
    if start_at < 0 || start_at > MINUTES_PER_DAY - chain.total_minutes() {
        return None;
    }

    let mut cursor = start_at;
    let mut previous: Option<WorkerId> = None;
    let mut phases = Vec::with_capacity(chain.len());

    for (index, phase) in chain.phases().iter().enumerate() {
        let span = Span::new(cursor, cursor + phase.duration_minutes);
        let Some(worker) = candidates(workers, &phase.service_id, preferred, previous)
            .into_iter()
            .find(|w| worker_fits(w, &span, conflicts, availability))
        else {
            debug!(phase = index, start = %span, "no free worker for phase");
            return None;
        };

        phases.push(ResolvedPhase {
            phase_index: index,
            service_id: phase.service_id,
            variant_id: phase.variant_id,
            service_name: phase.service_name.clone(),
            worker_id: worker.id,
            worker_name: worker.name.clone(),
            start_at: span.start,
            end_at: span.end,
        });
        previous = Some(worker.id);
        cursor = span.end + chain.gap_after(index);
    }

    Some(Placement { phases })
}

/// Capability-eligible workers in the order they should be tried.
pub(crate) fn candidates<'w>(
    workers: &'w [Worker],
    service: &ServiceId,
    preferred: Option<WorkerId>,
    previous: Option<WorkerId>,
) -> Vec<&'w Worker> {
    let mut ordered: Vec<&Worker> = Vec::with_capacity(workers.len());
    for pick in [preferred, previous].into_iter().flatten() {
        if let Some(w) = workers.iter().find(|w| w.id == pick && w.can_perform(service))
            && !ordered.iter().any(|o| o.id == w.id)
        {
            ordered.push(w);
        }
    }
    for w in workers {
        if w.can_perform(service) && !ordered.iter().any(|o| o.id == w.id) {
            ordered.push(w);
        }
    }
    ordered
}

/// Worker's effective window covers `span` and nothing already booked overlaps it.
pub(crate) fn worker_fits(
    worker: &Worker,
    span: &Span,
    conflicts: &ConflictIndex,
    availability: &Availability<'_>,
) -> bool {
    availability.covers(worker, span) && conflicts.first_conflict(&worker.id, span).is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::build_chain;
    use chrono::{NaiveDate, Weekday};
    use ulid::Ulid;

    const H: Minute = 60;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 12).unwrap()
    }

    struct Fixture {
        haircut: Service,
        cut: ServiceVariant,
        nails: Service,
        manicure: ServiceVariant,
        hours: BusinessHours,
    }

    fn fixture() -> Fixture {
        let haircut = Service {
            id: Ulid::new(),
            name: "Haircut".into(),
            category: None,
        };
        let nails = Service {
            id: Ulid::new(),
            name: "Nails".into(),
            category: None,
        };
        Fixture {
            cut: ServiceVariant {
                id: Ulid::new(),
                service_id: haircut.id,
                name: "Short".into(),
                duration_minutes: 30,
                follow_up: Some(FollowUp {
                    name: "Color".into(),
                    wait_minutes: 10,
                    duration_minutes: 45,
                }),
            },
            manicure: ServiceVariant {
                id: Ulid::new(),
                service_id: nails.id,
                name: "Manicure".into(),
                duration_minutes: 40,
                follow_up: None,
            },
            haircut,
            nails,
            hours: BusinessHours::uniform(9 * H, 18 * H),
        }
    }

    fn worker(name: &str, services: &[ServiceId]) -> Worker {
        let catalog = ServiceCatalog::new(services.iter().map(|id| Service {
            id: *id,
            name: String::new(),
            category: None,
        }));
        Worker {
            id: Ulid::new(),
            name: name.into(),
            capabilities: Capabilities::validated(services.iter().copied(), &catalog).unwrap(),
            availability: WeeklyAvailability::inherit_all(),
        }
    }

    fn busy(index: &mut ConflictIndex, worker: &Worker, start: Minute, end: Minute) -> BookingId {
        let id = Ulid::new();
        index.insert(OccupiedInterval {
            worker_id: worker.id,
            span: Span::new(start, end),
            booking_id: id,
        });
        id
    }

    fn assert_contiguous(chain: &Chain, placement: &Placement) {
        assert_eq!(placement.phases.len(), chain.len());
        for i in 1..placement.phases.len() {
            assert_eq!(
                placement.phases[i].start_at,
                placement.phases[i - 1].end_at + chain.gap_after(i - 1)
            );
        }
    }

    #[test]
    fn busy_worker_skipped_for_free_one() {
        let f = fixture();
        let a = worker("A", &[f.haircut.id]);
        let b = worker("B", &[f.haircut.id]);
        let mut index = ConflictIndex::empty(day());
        busy(&mut index, &a, 10 * H, 10 * H + 30);

        let plain = ServiceVariant {
            follow_up: None,
            ..f.cut.clone()
        };
        let chain = build_chain(&[(&f.haircut, &plain)]).unwrap();
        let av = Availability::new(&f.hours, day());
        let placement = place_chain(&chain, 10 * H, None, &[a, b.clone()], &index, &av).unwrap();
        assert_eq!(placement.phases[0].worker_id, b.id);
        assert_eq!(placement.phases[0].worker_name, "B");
    }

    #[test]
    fn preferred_worker_wins_when_free() {
        let f = fixture();
        let a = worker("A", &[f.haircut.id]);
        let b = worker("B", &[f.haircut.id]);
        let chain = build_chain(&[(&f.haircut, &f.cut)]).unwrap();
        let av = Availability::new(&f.hours, day());
        let index = ConflictIndex::empty(day());

        let placement =
            place_chain(&chain, 9 * H, Some(b.id), &[a.clone(), b.clone()], &index, &av).unwrap();
        assert!(placement.workers().all(|w| w == b.id));
        assert_contiguous(&chain, &placement);
    }

    #[test]
    fn preferred_worker_without_capability_ignored() {
        let f = fixture();
        let a = worker("A", &[f.haircut.id]);
        let nails_only = worker("N", &[f.nails.id]);
        let chain = build_chain(&[(&f.haircut, &f.cut)]).unwrap();
        let av = Availability::new(&f.hours, day());
        let index = ConflictIndex::empty(day());

        let placement =
            place_chain(&chain, 9 * H, Some(nails_only.id), &[nails_only, a.clone()], &index, &av)
                .unwrap();
        assert!(placement.workers().all(|w| w == a.id));
    }

    #[test]
    fn continuity_prefers_previous_phase_worker() {
        let f = fixture();
        let a = worker("A", &[f.haircut.id]);
        let b = worker("B", &[f.haircut.id, f.nails.id]);
        let c = worker("C", &[f.nails.id]);
        let chain = build_chain(&[(&f.haircut, &f.cut), (&f.nails, &f.manicure)]).unwrap();
        let av = Availability::new(&f.hours, day());
        let mut index = ConflictIndex::empty(day());
        busy(&mut index, &a, 9 * H, 12 * H);

        // roster order would give C for nails; continuity keeps B
        let placement = place_chain(&chain, 9 * H, None, &[a, c, b.clone()], &index, &av).unwrap();
        assert_eq!(placement.phases[0].worker_id, b.id);
        assert_eq!(placement.phases[1].worker_id, b.id);
        assert_eq!(placement.phases[1].start_at, 9 * H + 30);
        assert_contiguous(&chain, &placement);
    }

    #[test]
    fn follow_up_placed_after_wait_gap() {
        let f = fixture();
        let maya = worker("Maya", &[f.haircut.id]);
        let chain = build_chain(&[(&f.haircut, &f.cut)]).unwrap();
        let av = Availability::new(&f.hours, day());
        let mut index = ConflictIndex::empty(day());
        // Maya is busy only during the wait gap; the gap does not block
        busy(&mut index, &maya, 9 * H + 30, 9 * H + 40);

        let placement = place_chain(&chain, 9 * H, None, &[maya], &index, &av).unwrap();
        assert_eq!(placement.phases[1].start_at, 9 * H + 40);
        assert_eq!(placement.phases[1].end_at, 10 * H + 25);
    }

    #[test]
    fn infeasible_phase_returns_none() {
        let f = fixture();
        let maya = worker("Maya", &[f.haircut.id]);
        let chain = build_chain(&[(&f.haircut, &f.cut)]).unwrap();
        let av = Availability::new(&f.hours, day());
        let mut index = ConflictIndex::empty(day());
        busy(&mut index, &maya, 9 * H + 40, 9 * H + 50);

        assert!(place_chain(&chain, 9 * H, None, &[maya], &index, &av).is_none());
    }

    #[test]
    fn outside_business_hours_is_infeasible() {
        let f = fixture();
        let maya = worker("Maya", &[f.haircut.id]);
        let chain = build_chain(&[(&f.haircut, &f.cut)]).unwrap();
        let av = Availability::new(&f.hours, day());
        let index = ConflictIndex::empty(day());

        assert!(place_chain(&chain, 8 * H + 45, None, &[maya.clone()], &index, &av).is_none());
        // 85 minutes starting 16:40 ends 18:05
        assert!(place_chain(&chain, 16 * H + 40, None, &[maya], &index, &av).is_none());
    }

    #[test]
    fn start_outside_the_day_is_infeasible() {
        let f = fixture();
        let maya = worker("Maya", &[f.haircut.id]);
        let chain = build_chain(&[(&f.haircut, &f.cut)]).unwrap();
        let av = Availability::new(&f.hours, day());
        let index = ConflictIndex::empty(day());

        for start in [Minute::MIN, -30, MINUTES_PER_DAY, Minute::MAX] {
            assert!(place_chain(&chain, start, None, std::slice::from_ref(&maya), &index, &av).is_none());
        }
    }

    #[test]
    fn worker_day_off_is_respected() {
        let f = fixture();
        let mut off = worker("Off", &[f.haircut.id]);
        off.availability = WeeklyAvailability::inherit_all().with_day(Weekday::Mon, WorkerDay::Closed);
        let chain = build_chain(&[(&f.haircut, &f.cut)]).unwrap();
        let av = Availability::new(&f.hours, day());
        let index = ConflictIndex::empty(day());

        assert!(place_chain(&chain, 10 * H, None, &[off], &index, &av).is_none());
    }

    #[test]
    fn no_placement_overlaps_existing_intervals() {
        let f = fixture();
        let a = worker("A", &[f.haircut.id]);
        let b = worker("B", &[f.haircut.id]);
        let roster = [a.clone(), b.clone()];
        let chain = build_chain(&[(&f.haircut, &f.cut)]).unwrap();
        let av = Availability::new(&f.hours, day());
        let mut index = ConflictIndex::empty(day());
        busy(&mut index, &a, 10 * H, 11 * H);
        busy(&mut index, &b, 12 * H, 13 * H);

        for start in (9 * H..17 * H).step_by(5) {
            if let Some(p) = place_chain(&chain, start, None, &roster, &index, &av) {
                assert_contiguous(&chain, &p);
                for phase in &p.phases {
                    assert!(!index.has_conflict(&phase.worker_id, phase.start_at, phase.end_at));
                    assert!(phase.end_at <= 18 * H);
                }
            }
        }
    }
}
