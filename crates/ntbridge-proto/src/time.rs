// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! FILETIME (100ns ticks since 1601-01-01) <-> Linux timespec

use crate::stat::TimespecData;

/// FILETIME value of 1970-01-01T00:00:00Z.
pub const FILETIME_UNIX_EPOCH: u64 = 116_444_736_000_000_000;
pub const TICKS_PER_SECOND: i128 = 10_000_000;
const NANOS_PER_TICK: i128 = 100;

pub fn filetime_to_timespec(filetime: u64) -> TimespecData {
    let ticks = filetime as i128 - FILETIME_UNIX_EPOCH as i128;
    TimespecData {
        tv_sec: ticks.div_euclid(TICKS_PER_SECOND) as i64,
        tv_nsec: (ticks.rem_euclid(TICKS_PER_SECOND) * NANOS_PER_TICK) as i64,
    }
}

/// Times before 1601 clamp to zero; sub-tick nanoseconds are truncated.
pub fn timespec_to_filetime(ts: &TimespecData) -> u64 {
    let ticks = ts.tv_sec as i128 * TICKS_PER_SECOND
        + ts.tv_nsec as i128 / NANOS_PER_TICK
        + FILETIME_UNIX_EPOCH as i128;
    ticks.clamp(0, u64::MAX as i128) as u64
}
