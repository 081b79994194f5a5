use chrono::{Datelike, NaiveDate};

use crate::model::*;

// ── Availability Resolver ─────────────────────────────────────────

/// A worker's own window for a date, before intersecting with business hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerWindow {
    Open(Span),
    /// Worker is off that day.
    Closed,
    /// No entry for the weekday: use business hours.
    Inherit,
}

/// Operating windows for one site on one date.
///
/// Effective window for a worker = business ∩ (worker ?? business).
/// A closed business day is closed for everyone.
#[derive(Debug, Clone)]
pub struct Availability<'a> {
    hours: &'a BusinessHours,
    date: NaiveDate,
    business: Option<Span>,
}

impl<'a> Availability<'a> {
    pub fn new(hours: &'a BusinessHours, date: NaiveDate) -> Self {
        let business = business_window(hours, date);
        Self {
            hours,
            date,
            business,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn hours(&self) -> &BusinessHours {
        self.hours
    }

    pub fn business_window(&self) -> Option<Span> {
        self.business
    }

    pub fn worker_window(&self, worker: &Worker) -> WorkerWindow {
        worker_window(worker, self.date)
    }

    pub fn effective_window(&self, worker: &Worker) -> Option<Span> {
        let business = self.business?;
        match self.worker_window(worker) {
            WorkerWindow::Inherit => Some(business),
            WorkerWindow::Closed => None,
            WorkerWindow::Open(own) => business.intersect(&own),
        }
    }

    /// Whether `span` lies inside the worker's effective window.
    pub fn covers(&self, worker: &Worker, span: &Span) -> bool {
        self.effective_window(worker)
            .is_some_and(|w| w.contains_span(span))
    }
}

/// Business window for a date, `None` when the site is closed.
pub fn business_window(hours: &BusinessHours, date: NaiveDate) -> Option<Span> {
    let day = hours.day(date.weekday());
    (day.enabled && day.open < day.close).then(|| Span::new(day.open, day.close))
}

pub fn worker_window(worker: &Worker, date: NaiveDate) -> WorkerWindow {
    match worker.availability.day(date.weekday()) {
        None => WorkerWindow::Inherit,
        Some(WorkerDay::Closed) => WorkerWindow::Closed,
        Some(WorkerDay::Open { open, close }) if open < close => {
            WorkerWindow::Open(Span::new(*open, *close))
        }
        // open >= close is a misconfigured day; treat as off
        Some(WorkerDay::Open { .. }) => WorkerWindow::Closed,
    }
}

// ── Interval helpers ──────────────────────────────────────────────

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end
        {
            last.end = last.end.max(span.end);
            continue;
        }
        merged.push(span);
    }
    merged
}

/// Remove sorted, disjoint `to_remove` spans from sorted `base` spans.
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Span::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(Span::new(current_start, current_end));
        }
    }

    result
}
