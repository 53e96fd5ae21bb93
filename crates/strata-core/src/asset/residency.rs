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

//! Residency tiers, floor policies and the time thresholds that drive demotion.

use super::error::PolicyError;
use serde::{Deserialize, Serialize};

/// Default time after the last use before an `Active` resource leaves the device.
pub const DEFAULT_ACTIVE_TIME_LIMIT_MS: u64 = 10_000;
/// Default time after the last use before a `Cached` resource leaves host memory.
pub const DEFAULT_CACHE_TIME_LIMIT_MS: u64 = 60_000;

/// The storage tier a resource currently occupies.
///
/// Tiers are totally ordered: `Storage < Cached < Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResidencyState {
    /// Only the source on disk exists.
    Storage,
    /// The decoded payload is held in host memory.
    Cached,
    /// The payload is resident on the device.
    Active,
}

/// The minimum tier a resource must be kept at.
///
/// A sweep never demotes a resource below its policy.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ResidencyPolicy {
    /// The resource may be evicted all the way back to disk.
    #[default]
    Storage,
    /// The host copy is kept; only the device copy may be evicted.
    Cached,
    /// The resource is pinned on the device.
    Active,
}

impl ResidencyPolicy {
    /// Returns the lowest state that satisfies this policy.
    pub fn floor_state(self) -> ResidencyState {
        match self {
            Self::Storage => ResidencyState::Storage,
            Self::Cached => ResidencyState::Cached,
            Self::Active => ResidencyState::Active,
        }
    }
}

impl ResidencyState {
    /// Returns `true` if holding this state satisfies `policy`.
    pub fn satisfies(self, policy: ResidencyPolicy) -> bool {
        self >= policy.floor_state()
    }
}

/// The pair of idle thresholds, in milliseconds, that govern demotion.
///
/// The active limit is always strictly below the cache limit and both are
/// positive; [`TimeLimits::new`] is the only way to build one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeLimits {
    active_ms: u64,
    cache_ms: u64,
}

impl TimeLimits {
    /// Validates and builds a pair of thresholds.
    ///
    /// # Errors
    /// Returns [`PolicyError::ZeroThreshold`] if either limit is zero and
    /// [`PolicyError::ThresholdOrder`] unless `active_ms < cache_ms`.
    pub fn new(active_ms: u64, cache_ms: u64) -> Result<Self, PolicyError> {
        if active_ms == 0 || cache_ms == 0 {
            return Err(PolicyError::ZeroThreshold);
        }
        if active_ms >= cache_ms {
            return Err(PolicyError::ThresholdOrder {
                active_ms,
                cache_ms,
            });
        }
        Ok(Self {
            active_ms,
            cache_ms,
        })
    }

    /// Idle time after which an `Active` resource may drop to `Cached`.
    pub fn active_ms(&self) -> u64 {
        self.active_ms
    }

    /// Idle time after which a `Cached` resource may drop to `Storage`.
    pub fn cache_ms(&self) -> u64 {
        self.cache_ms
    }
}

impl Default for TimeLimits {
    fn default() -> Self {
        Self {
            active_ms: DEFAULT_ACTIVE_TIME_LIMIT_MS,
            cache_ms: DEFAULT_CACHE_TIME_LIMIT_MS,
        }
    }
}

/// The residency configuration a record is created with.
///
/// This is the serializable form used by [`ResidencyConfig`](crate::ResidencyConfig);
/// the thresholds are only validated when turned into [`TimeLimits`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResidencySettings {
    /// The floor the record is promoted to on creation and never swept below.
    pub policy: ResidencyPolicy,
    /// See [`TimeLimits::active_ms`].
    pub active_time_limit_ms: u64,
    /// See [`TimeLimits::cache_ms`].
    pub cache_time_limit_ms: u64,
}

impl ResidencySettings {
    /// Builds settings from an already validated pair of limits.
    pub fn new(policy: ResidencyPolicy, limits: TimeLimits) -> Self {
        Self {
            policy,
            active_time_limit_ms: limits.active_ms(),
            cache_time_limit_ms: limits.cache_ms(),
        }
    }

    /// Returns a copy with a different policy.
    pub fn with_policy(mut self, policy: ResidencyPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Validates the thresholds.
    pub fn time_limits(&self) -> Result<TimeLimits, PolicyError> {
        TimeLimits::new(self.active_time_limit_ms, self.cache_time_limit_ms)
    }
}

impl Default for ResidencySettings {
    fn default() -> Self {
        Self::new(ResidencyPolicy::default(), TimeLimits::default())
    }
}

/// What a single [`demote_if_stale`](crate::asset::ResourceRecord::demote_if_stale)
/// call did to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Demotion {
    /// State before the call.
    pub from: ResidencyState,
    /// State after the call.
    pub to: ResidencyState,
    /// `true` if a demotion hook failed and the record stayed higher than the
    /// thresholds asked for.
    pub failed: bool,
}

impl Demotion {
    /// Returns `true` if the record moved down at least one tier.
    pub fn is_demoted(&self) -> bool {
        self.to < self.from
    }
}
