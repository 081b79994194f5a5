use tracing::warn;

use crate::model::*;

use super::availability::Availability;
use super::conflict::ConflictIndex;
use super::solver::{candidates, worker_fits};
use super::EngineError;

/// Outcome of a successful repair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repaired {
    pub placement: Placement,
    /// Phase indices that were moved to a different worker.
    pub reassigned: Vec<usize>,
}

/// Re-check a placement against the latest conflicts just before commit.
///
/// Phases that are still free keep their worker and time. A phase that lost a
/// race is reassigned at the same window to another capable, free worker. If
/// any phase cannot be reassigned the whole repair fails with a retryable
/// [`EngineError::ConflictDetected`]; nothing is partially repaired.
pub fn repair_placement(
    placement: &Placement,
    latest: &ConflictIndex,
    workers: &[Worker],
    availability: &Availability<'_>,
) -> Result<Repaired, EngineError> {
    if placement.phases.is_empty() {
        return Err(EngineError::InvalidChain("placement has no phases".into()));
    }

    let mut phases = Vec::with_capacity(placement.phases.len());
    let mut reassigned = Vec::new();
    let mut previous: Option<WorkerId> = None;

    for (index, phase) in placement.phases.iter().enumerate() {
        if phase.start_at >= phase.end_at {
            return Err(EngineError::InvalidChain(format!(
                "phase {index} has an empty window"
            )));
        }
        let span = phase.span();

        let current = workers
            .iter()
            .find(|w| w.id == phase.worker_id && w.can_perform(&phase.service_id));
        if let Some(worker) = current
            && worker_fits(worker, &span, latest, availability)
        {
            previous = Some(worker.id);
            phases.push(phase.clone());
            continue;
        }

        let replacement = candidates(workers, &phase.service_id, None, previous)
            .into_iter()
            .find(|w| worker_fits(w, &span, latest, availability));
        let Some(worker) = replacement else {
            let conflicting = latest
                .first_conflict(&phase.worker_id, &span)
                .map(|i| i.booking_id);
            warn!(phase = index, window = %span, "repair failed: no free worker");
            return Err(EngineError::ConflictDetected {
                phase_index: index,
                conflicting,
            });
        };

        warn!(
            phase = index,
            window = %span,
            from = %phase.worker_id,
            to = %worker.id,
            "repair reassigned phase"
        );
        reassigned.push(index);
        previous = Some(worker.id);
        phases.push(ResolvedPhase {
            worker_id: worker.id,
            worker_name: worker.name.clone(),
            ..phase.clone()
        });
    }

    Ok(Repaired {
        placement: Placement { phases },
        reassigned,
    })
}
