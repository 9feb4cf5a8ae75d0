//! Expiration times: the reconciler's priority encoding.
//!
//! Larger values are more urgent. `SYNC` is the maximum representable value,
//! `NEVER` marks work that is deliberately deferred (off-screen subtrees) and
//! `NO_WORK` means nothing is pending. Wall-clock milliseconds map onto the
//! scale so that later times produce smaller expiration times.

use crate::scheduler::PriorityLevel;

pub type ExpirationTime = u32;

pub const MAX_SIGNED_31_BIT_INT: u32 = 1_073_741_823;

pub const NO_WORK: ExpirationTime = 0;
pub const NEVER: ExpirationTime = 1;
pub const SYNC: ExpirationTime = MAX_SIGNED_31_BIT_INT;

const UNIT_SIZE: u64 = 10;
const MAGIC_NUMBER_OFFSET: u32 = SYNC - 1;

/// Timeout and batch window used for user-blocking work.
pub const HIGH_PRIORITY_EXPIRATION_MS: u64 = 150;
pub const HIGH_PRIORITY_BATCH_SIZE_MS: u64 = 100;

/// Timeout and batch window used for default work.
pub const LOW_PRIORITY_EXPIRATION_MS: u64 = 5000;
pub const LOW_PRIORITY_BATCH_SIZE_MS: u64 = 250;

/// Converts a monotonic timestamp into an expiration time.
///
/// One unit is ten milliseconds. Timestamps beyond the representable range
/// saturate at `NEVER + 1` so that a clock never produces a sentinel.
pub fn ms_to_expiration_time(ms: u64) -> ExpirationTime {
    let units = ms / UNIT_SIZE;
    let floor = u64::from(NEVER) + 1;
    let offset = u64::from(MAGIC_NUMBER_OFFSET);
    if units + floor > offset {
        return NEVER + 1;
    }
    (offset - units) as ExpirationTime
}

pub fn expiration_time_to_ms(expiration_time: ExpirationTime) -> u64 {
    u64::from(MAGIC_NUMBER_OFFSET.saturating_sub(expiration_time)) * UNIT_SIZE
}

fn ceiling(num: u64, precision: u64) -> u64 {
    (num / precision + 1) * precision
}

/// Rounds the deadline `current_time + expiration_ms` up to the next
/// `bucket_size_ms` boundary.
///
/// Requests issued within one bucket window coalesce onto the same value.
pub fn compute_expiration_bucket(
    current_time: ExpirationTime,
    expiration_ms: u64,
    bucket_size_ms: u64,
) -> ExpirationTime {
    let elapsed = u64::from(MAGIC_NUMBER_OFFSET.saturating_sub(current_time));
    let bucketed = ceiling(
        elapsed + expiration_ms / UNIT_SIZE,
        bucket_size_ms / UNIT_SIZE,
    );
    let offset = u64::from(MAGIC_NUMBER_OFFSET);
    if bucketed + u64::from(NEVER) + 1 > offset {
        return NEVER + 1;
    }
    (offset - bucketed) as ExpirationTime
}

pub fn compute_interactive_expiration(current_time: ExpirationTime) -> ExpirationTime {
    compute_expiration_bucket(
        current_time,
        HIGH_PRIORITY_EXPIRATION_MS,
        HIGH_PRIORITY_BATCH_SIZE_MS,
    )
}

pub fn compute_async_expiration(current_time: ExpirationTime) -> ExpirationTime {
    compute_expiration_bucket(
        current_time,
        LOW_PRIORITY_EXPIRATION_MS,
        LOW_PRIORITY_BATCH_SIZE_MS,
    )
}

/// Classifies `expiration_time` back into a scheduler priority, relative to
/// `current_time`.
pub fn infer_priority_from_expiration_time(
    current_time: ExpirationTime,
    expiration_time: ExpirationTime,
) -> PriorityLevel {
    if expiration_time == SYNC {
        return PriorityLevel::Immediate;
    }
    if expiration_time == NEVER || expiration_time == NO_WORK {
        return PriorityLevel::Idle;
    }
    let remaining_ms =
        expiration_time_to_ms(expiration_time) as i64 - expiration_time_to_ms(current_time) as i64;
    if remaining_ms <= 0 {
        return PriorityLevel::Immediate;
    }
    let remaining_ms = remaining_ms as u64;
    if remaining_ms <= HIGH_PRIORITY_EXPIRATION_MS + HIGH_PRIORITY_BATCH_SIZE_MS {
        return PriorityLevel::UserBlocking;
    }
    if remaining_ms <= LOW_PRIORITY_EXPIRATION_MS + LOW_PRIORITY_BATCH_SIZE_MS {
        return PriorityLevel::Normal;
    }
    PriorityLevel::Idle
}

#[cfg(test)]
#[path = "tests/expiration_time_tests.rs"]
mod tests;
