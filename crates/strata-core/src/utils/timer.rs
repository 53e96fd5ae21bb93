// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Monotonic time sources for the game loop.
//!
//! The residency machinery never reads the clock itself; the loop samples a
//! [`GameClock`] once per tick and passes the millisecond value down.

use std::time::{Duration, Instant};

/// Measures the time elapsed since it was started.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    started_at: Instant,
}

impl Stopwatch {
    /// Creates a stopwatch that starts immediately.
    #[inline]
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
        }
    }

    /// Time elapsed since the stopwatch was started.
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Time elapsed in whole milliseconds, saturating at `u64::MAX`.
    #[inline]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Time elapsed in seconds.
    #[inline]
    pub fn elapsed_secs_f64(&self) -> f64 {
        self.elapsed().as_secs_f64()
    }

    /// Starts over from now.
    #[inline]
    pub fn restart(&mut self) {
        self.started_at = Instant::now();
    }
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new()
    }
}

/// The millisecond clock a game loop hands to `ensure_active`, `sweep` and
/// the eviction scheduler.
#[derive(Debug, Clone, Copy, Default)]
pub struct GameClock {
    stopwatch: Stopwatch,
    offset_ms: u64,
}

impl GameClock {
    /// Creates a clock reading zero now.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a clock reading `offset_ms` now, e.g. to resume a saved session.
    pub fn starting_at(offset_ms: u64) -> Self {
        Self {
            stopwatch: Stopwatch::new(),
            offset_ms,
        }
    }

    /// The current time in milliseconds. Never decreases.
    pub fn now_ms(&self) -> u64 {
        self.offset_ms.saturating_add(self.stopwatch.elapsed_ms())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    const SLEEP_DURATION_MS: u64 = 30;
    const SLEEP_MARGIN_MS: u64 = 500;

    #[test]
    fn test_stopwatch_measures_sleep() {
        let watch = Stopwatch::new();
        thread::sleep(Duration::from_millis(SLEEP_DURATION_MS));

        let elapsed_ms = watch.elapsed_ms();
        assert!(
            elapsed_ms >= SLEEP_DURATION_MS,
            "Elapsed ms ({elapsed_ms}) should be >= sleep duration ({SLEEP_DURATION_MS})"
        );
        assert!(
            elapsed_ms < SLEEP_DURATION_MS + SLEEP_MARGIN_MS,
            "Elapsed ms ({elapsed_ms}) should be within the margin"
        );
    }

    #[test]
    fn test_restart_resets_elapsed() {
        let mut watch = Stopwatch::new();
        thread::sleep(Duration::from_millis(SLEEP_DURATION_MS));
        watch.restart();
        assert!(watch.elapsed_ms() < SLEEP_DURATION_MS);
    }

    #[test]
    fn test_game_clock_is_monotonic_and_offset() {
        let clock = GameClock::starting_at(10_000);
        let first = clock.now_ms();
        assert!(first >= 10_000);
        thread::sleep(Duration::from_millis(5));
        assert!(clock.now_ms() >= first);
    }
}
