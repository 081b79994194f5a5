use chrono::NaiveDate;

use crate::model::*;

use super::availability::Availability;
use super::conflict::ConflictIndex;
use super::solver::place_chain;
use super::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotOptions {
    pub step_minutes: Minute,
    /// Skip start times before this minute (same-day lead time).
    pub earliest: Option<Minute>,
}

impl Default for SlotOptions {
    fn default() -> Self {
        Self {
            step_minutes: 15,
            earliest: None,
        }
    }
}

/// Candidate start times: `window.start`, `+step`, … up to `window.end - total`.
/// The latest start that still fits is always included, aligned or not.
pub fn grid_points(window: Span, total: Minute, step: Minute) -> Vec<Minute> {
    let last = window.end - total;
    if total <= 0 || step <= 0 || last < window.start {
        return Vec::new();
    }
    let mut points: Vec<Minute> = (window.start..=last).step_by(step as usize).collect();
    if points.last() != Some(&last) {
        points.push(last);
    }
    points
}

/// List every grid start time at which the whole chain can be placed.
pub fn enumerate_with_index(
    chain: &Chain,
    preferred: Option<WorkerId>,
    workers: &[Worker],
    conflicts: &ConflictIndex,
    availability: &Availability<'_>,
    options: SlotOptions,
) -> Vec<Slot> {
    let Some(window) = availability.business_window() else {
        return Vec::new();
    };
    grid_points(window, chain.total_minutes(), options.step_minutes)
        .into_iter()
        .filter(|start| options.earliest.is_none_or(|e| *start >= e))
        .filter_map(|start| {
            place_chain(chain, start, preferred, workers, conflicts, availability)
                .map(|placement| Slot { start, placement })
        })
        .collect()
}

/// Build the conflict index from the day's bookings, then enumerate.
pub fn enumerate(
    chain: &Chain,
    date: NaiveDate,
    preferred: Option<WorkerId>,
    workers: &[Worker],
    hours: &BusinessHours,
    bookings: &[BookingRecord],
    options: SlotOptions,
) -> Result<Vec<Slot>, EngineError> {
    let availability = Availability::new(hours, date);
    if availability.business_window().is_none() {
        return Ok(Vec::new());
    }
    let conflicts = ConflictIndex::build(date, bookings)?;
    Ok(enumerate_with_index(
        chain,
        preferred,
        workers,
        &conflicts,
        &availability,
        options,
    ))
}
