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

use strata_core::config::DEFAULT_SWEEP_PERIOD_MS;
use strata_core::ResidencyConfig;
use strata_data::assets::{ResourceRegistry, SweepSummary};

/// Throttles [`ResourceRegistry::sweep`] to one call per sweep period.
#[derive(Debug, Clone)]
pub struct EvictionScheduler {
    sweep_period_ms: u64,
    last_swept_at: u64,
    sweeps_run: u64,
}

impl EvictionScheduler {
    /// Creates a scheduler that sweeps at most once every `sweep_period_ms`.
    /// A period of zero sweeps on every tick.
    pub fn new(sweep_period_ms: u64) -> Self {
        Self {
            sweep_period_ms,
            last_swept_at: 0,
            sweeps_run: 0,
        }
    }

    /// Creates a scheduler using the configured sweep period.
    pub fn from_config(config: &ResidencyConfig) -> Self {
        Self::new(config.sweep_period_ms)
    }

    /// Should be called once per game-loop tick.
    /// Sweeps `registry` if at least one period has passed since the last sweep.
    pub fn tick(&mut self, registry: &mut ResourceRegistry, now: u64) -> Option<SweepSummary> {
        if now.saturating_sub(self.last_swept_at) >= self.sweep_period_ms {
            Some(self.force_sweep(registry, now))
        } else {
            None
        }
    }

    /// Sweeps immediately, e.g. after a level unload, and restarts the period.
    pub fn force_sweep(&mut self, registry: &mut ResourceRegistry, now: u64) -> SweepSummary {
        log::trace!("Sweeping residency registry at {now} ms");
        let summary = registry.sweep(now);
        self.last_swept_at = now;
        self.sweeps_run += 1;
        summary
    }

    /// Releases every resource in `registry`. Call once when the game loop exits.
    pub fn shutdown(&mut self, registry: &mut ResourceRegistry) -> usize {
        let released = registry.release_all();
        log::info!(
            "EvictionScheduler: shut down after {} sweeps, released {released} resources",
            self.sweeps_run
        );
        released
    }

    /// The minimum interval between two sweeps.
    pub fn sweep_period_ms(&self) -> u64 {
        self.sweep_period_ms
    }

    /// Changes the interval. Takes effect on the next tick.
    pub fn set_sweep_period(&mut self, sweep_period_ms: u64) {
        log::debug!(
            "EvictionScheduler: sweep period {} ms -> {sweep_period_ms} ms",
            self.sweep_period_ms
        );
        self.sweep_period_ms = sweep_period_ms;
    }

    /// The `now` of the last sweep, or zero before the first one.
    pub fn last_swept_at(&self) -> u64 {
        self.last_swept_at
    }

    /// How many sweeps have run.
    pub fn sweeps_run(&self) -> u64 {
        self.sweeps_run
    }
}

impl Default for EvictionScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_SWEEP_PERIOD_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_is_throttled_by_period() {
        let mut registry = ResourceRegistry::new();
        let mut scheduler = EvictionScheduler::new(5000);

        assert!(scheduler.tick(&mut registry, 16).is_none());
        assert!(scheduler.tick(&mut registry, 4999).is_none());
        assert!(
            scheduler.tick(&mut registry, 5000).is_some(),
            "a full period since the start triggers a sweep"
        );
        assert!(scheduler.tick(&mut registry, 9999).is_none());
        assert!(scheduler.tick(&mut registry, 10_000).is_some());
        assert_eq!(scheduler.sweeps_run(), 2);
        assert_eq!(scheduler.last_swept_at(), 10_000);
    }

    #[test]
    fn test_zero_period_sweeps_every_tick() {
        let mut registry = ResourceRegistry::new();
        let mut scheduler = EvictionScheduler::new(0);
        for now in [0, 0, 1, 2] {
            assert!(scheduler.tick(&mut registry, now).is_some());
        }
        assert_eq!(scheduler.sweeps_run(), 4);
    }

    #[test]
    fn test_force_sweep_restarts_period() {
        let mut registry = ResourceRegistry::new();
        let mut scheduler = EvictionScheduler::default();
        assert_eq!(scheduler.sweep_period_ms(), DEFAULT_SWEEP_PERIOD_MS);

        scheduler.force_sweep(&mut registry, 3000);
        assert!(scheduler.tick(&mut registry, 5000).is_none());
        assert!(scheduler.tick(&mut registry, 8000).is_some());
    }

    #[test]
    fn test_clock_going_backwards_never_sweeps() {
        let mut registry = ResourceRegistry::new();
        let mut scheduler = EvictionScheduler::new(100);
        scheduler.force_sweep(&mut registry, 1000);
        assert!(scheduler.tick(&mut registry, 10).is_none());
    }

    #[test]
    fn test_from_config_uses_configured_period() {
        let config = ResidencyConfig {
            sweep_period_ms: 250,
            ..Default::default()
        };
        let mut scheduler = EvictionScheduler::from_config(&config);
        assert_eq!(scheduler.sweep_period_ms(), 250);

        scheduler.set_sweep_period(1000);
        assert_eq!(scheduler.sweep_period_ms(), 1000);
    }
}
