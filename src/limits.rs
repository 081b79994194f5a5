use crate::model::{MINUTES_PER_DAY, Minute};

/// Phases per visit chain.
pub const MAX_CHAIN_PHASES: usize = 8;

/// A chain must finish on the day it starts.
pub const MAX_CHAIN_MINUTES: Minute = MINUTES_PER_DAY;

/// Bookings cancelled in one cascade batch.
pub const MAX_BATCH_SIZE: usize = 100;

/// Restaging attempts when a cancel batch races with another cancellation.
pub const MAX_CANCEL_ATTEMPTS: usize = 3;

/// Free-text note attached to a manual or customer cancellation.
pub const MAX_NOTE_LEN: usize = 1_000;

/// Actor name attached to a cancellation.
pub const MAX_ACTOR_LEN: usize = 200;

/// Smallest slot grid step the enumerator accepts.
pub const MIN_SLOT_STEP_MINUTES: Minute = 5;
