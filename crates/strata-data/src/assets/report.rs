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

//! Summaries produced by sweeps and residency snapshots.

use std::fmt;
use strata_core::asset::{Demotion, ResidencyState};

/// What one [`sweep`](super::ResourceRegistry::sweep) did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
    /// Live records evaluated.
    pub visited: usize,
    /// Records that ended the sweep in `Cached` after being `Active`.
    pub demoted_to_cached: usize,
    /// Records that ended the sweep in `Storage`, including those that fell
    /// from `Active` in one call.
    pub demoted_to_storage: usize,
    /// Records whose `download` failed and stayed `Active`.
    pub failed: usize,
    /// Released records removed from the registry.
    pub pruned: usize,
    /// Records skipped because their lock was held during the sweep.
    pub busy: usize,
}

impl SweepSummary {
    pub(crate) fn record(&mut self, demotion: Demotion) {
        if demotion.failed {
            self.failed += 1;
        }
        if demotion.is_demoted() {
            match demotion.to {
                ResidencyState::Cached => self.demoted_to_cached += 1,
                ResidencyState::Storage => self.demoted_to_storage += 1,
                ResidencyState::Active => {}
            }
        }
    }

    /// Total records moved down at least one tier.
    pub fn demoted(&self) -> usize {
        self.demoted_to_cached + self.demoted_to_storage
    }
}

impl fmt::Display for SweepSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} visited, {} to Cached, {} to Storage, {} failed, {} pruned, {} busy",
            self.visited,
            self.demoted_to_cached,
            self.demoted_to_storage,
            self.failed,
            self.pruned,
            self.busy
        )
    }
}

/// A snapshot of what the registry holds in each tier.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResidencyReport {
    /// Live records.
    pub resources: usize,
    /// Records with only their source on disk.
    pub storage: usize,
    /// Records holding a host copy.
    pub cached: usize,
    /// Records resident on the device.
    pub active: usize,
    /// Host bytes held by `Cached` and `Active` records. An `Active` record
    /// keeps its host copy.
    pub cached_bytes: u64,
    /// Device bytes held by `Active` records.
    pub active_bytes: u64,
}

impl ResidencyReport {
    pub(crate) fn record(&mut self, state: ResidencyState, host_bytes: u64, device_bytes: u64) {
        self.resources += 1;
        self.cached_bytes += host_bytes;
        self.active_bytes += device_bytes;
        match state {
            ResidencyState::Storage => self.storage += 1,
            ResidencyState::Cached => self.cached += 1,
            ResidencyState::Active => self.active += 1,
        }
    }

    /// Host plus device bytes.
    pub fn total_bytes(&self) -> u64 {
        self.cached_bytes + self.active_bytes
    }
}

impl fmt::Display for ResidencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} resources ({} storage, {} cached / {} B, {} active / {} B)",
            self.resources,
            self.storage,
            self.cached,
            self.cached_bytes,
            self.active,
            self.active_bytes
        )
    }
}
