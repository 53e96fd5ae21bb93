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

//! The tier state machine and the shared handle consumers hold.
//!
//! All timestamps are milliseconds on a caller-supplied monotonic clock.

use super::error::{PolicyError, ResidencyError};
use super::identity::ResourceIdentity;
use super::residency::{Demotion, ResidencyPolicy, ResidencySettings, ResidencyState, TimeLimits};
use super::resource::TieredResource;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Resident(ResidencyState),
    /// Terminal. Distinct from `Storage`: the record can never be promoted again.
    Released,
}

/// A resource together with its residency bookkeeping.
///
/// Only the methods here move the record between tiers; the wrapped resource
/// never sees its own state. Every public operation leaves `state >= policy`.
///
/// `T` may be unsized so a record can be viewed through an interface trait
/// object such as `ResourceRecord<dyn GpuResident>`.
pub struct ResourceRecord<T: ?Sized> {
    lifecycle: Lifecycle,
    policy: ResidencyPolicy,
    limits: TimeLimits,
    last_used_at: u64,
    resource: T,
}

impl<T: TieredResource> ResourceRecord<T> {
    /// Validates `settings` and promotes `resource` to the policy tier.
    ///
    /// # Errors
    /// Returns `InvalidPolicyConfiguration` for bad thresholds or a policy below
    /// the resource's hard floor, and `Load`/`Upload` if the initial promotion
    /// fails. The resource is dropped in every error case.
    pub fn new(
        resource: T,
        settings: &ResidencySettings,
        now: u64,
    ) -> Result<Self, ResidencyError> {
        let limits = settings.time_limits()?;
        let floor = resource.policy_floor();
        if settings.policy < floor {
            return Err(PolicyError::BelowFloor {
                requested: settings.policy,
                floor,
            }
            .into());
        }

        let mut record = Self {
            lifecycle: Lifecycle::Resident(ResidencyState::Storage),
            policy: settings.policy,
            limits,
            last_used_at: now,
            resource,
        };
        record.promote_to(settings.policy.floor_state())?;
        Ok(record)
    }
}

impl<T: TieredResource + ?Sized> ResourceRecord<T> {
    /// The wrapped resource.
    pub fn resource(&self) -> &T {
        &self.resource
    }

    /// Mutable access to the wrapped resource's own data. The tier cannot be
    /// changed through this.
    pub fn resource_mut(&mut self) -> &mut T {
        &mut self.resource
    }

    /// The identity of the wrapped resource.
    pub fn identity(&self) -> &ResourceIdentity {
        self.resource.identity()
    }

    /// The current tier, or `None` once released.
    pub fn state(&self) -> Option<ResidencyState> {
        match self.lifecycle {
            Lifecycle::Resident(state) => Some(state),
            Lifecycle::Released => None,
        }
    }

    /// The configured floor.
    pub fn policy(&self) -> ResidencyPolicy {
        self.policy
    }

    /// The configured idle thresholds.
    pub fn time_limits(&self) -> TimeLimits {
        self.limits
    }

    /// Timestamp of the last successful `ensure_active`.
    pub fn last_used_at(&self) -> u64 {
        self.last_used_at
    }

    /// Returns `true` once [`release`](Self::release) has run.
    pub fn is_released(&self) -> bool {
        self.lifecycle == Lifecycle::Released
    }

    /// Returns `true` if the record is live and the resource reports a usable
    /// device copy.
    pub fn is_usable(&self) -> bool {
        !self.is_released() && self.resource.is_usable()
    }

    /// Bytes held at the current tier: zero in `Storage` or once released.
    pub fn byte_size(&self) -> u64 {
        match self.lifecycle {
            Lifecycle::Resident(ResidencyState::Active) => self.resource.active_byte_size(),
            Lifecycle::Resident(ResidencyState::Cached) => self.resource.cached_byte_size(),
            Lifecycle::Resident(ResidencyState::Storage) | Lifecycle::Released => 0,
        }
    }

    /// Promotes the record to `Active` and stamps it as used at `now`.
    ///
    /// From `Storage` both `load` and `upload` run. On failure the record stays
    /// at the last tier actually reached and `last_used_at` is not touched.
    ///
    /// # Panics
    /// Panics if the record was released.
    #[track_caller]
    pub fn ensure_active(&mut self, now: u64) -> Result<(), ResidencyError> {
        let before = self.resident_state();
        self.promote_to(ResidencyState::Active)?;
        self.last_used_at = now;
        if before < ResidencyState::Active && self.policy < ResidencyPolicy::Active {
            log::debug!(
                "{} is active above its {:?} policy until the next stale sweep",
                self.identity(),
                self.policy
            );
        }
        Ok(())
    }

    /// Promotes the record to at least `Cached` and stamps it as used at `now`.
    ///
    /// Used to prefetch host data without touching the device.
    ///
    /// # Panics
    /// Panics if the record was released.
    #[track_caller]
    pub fn ensure_cached(&mut self, now: u64) -> Result<(), ResidencyError> {
        self.promote_to(ResidencyState::Cached)?;
        self.last_used_at = now;
        Ok(())
    }

    /// Changes the floor, promoting immediately if the new policy demands a
    /// higher tier than the one held. Never demotes.
    ///
    /// # Errors
    /// A policy below the resource's hard floor is rejected and nothing
    /// changes. If the promotion fails the previous policy is restored.
    ///
    /// # Panics
    /// Panics if the record was released.
    #[track_caller]
    pub fn set_policy(&mut self, policy: ResidencyPolicy) -> Result<(), ResidencyError> {
        let current = self.resident_state();
        let floor = self.resource.policy_floor();
        if policy < floor {
            return Err(PolicyError::BelowFloor {
                requested: policy,
                floor,
            }
            .into());
        }

        let previous = std::mem::replace(&mut self.policy, policy);
        if !current.satisfies(policy) {
            if let Err(err) = self.promote_to(policy.floor_state()) {
                self.policy = previous;
                return Err(err);
            }
        }
        Ok(())
    }

    /// Replaces the idle thresholds.
    ///
    /// # Errors
    /// Rejects zero or inverted thresholds and leaves the record unchanged.
    ///
    /// # Panics
    /// Panics if the record was released.
    #[track_caller]
    pub fn set_time_limits(&mut self, active_ms: u64, cache_ms: u64) -> Result<(), ResidencyError> {
        let _ = self.resident_state();
        self.limits = TimeLimits::new(active_ms, cache_ms)?;
        Ok(())
    }

    /// Evaluates both idle thresholds against `now` and demotes accordingly.
    ///
    /// An `Active` record idle longer than the cache threshold falls two tiers
    /// in one call. Thresholds are strict: a record exactly at its limit stays.
    /// A failing `download` is logged and the record stays `Active`.
    ///
    /// Returns `None` for a released record.
    pub fn demote_if_stale(&mut self, now: u64) -> Option<Demotion> {
        let Lifecycle::Resident(from) = self.lifecycle else {
            return None;
        };
        let elapsed = now.saturating_sub(self.last_used_at);
        let mut state = from;
        let mut failed = false;

        if state == ResidencyState::Active
            && self.policy < ResidencyPolicy::Active
            && elapsed > self.limits.active_ms()
        {
            match self.resource.download() {
                Ok(()) => {
                    state = ResidencyState::Cached;
                    self.lifecycle = Lifecycle::Resident(state);
                    log::debug!(
                        "{} demoted to Cached after {elapsed} ms idle",
                        self.identity()
                    );
                }
                Err(err) => {
                    failed = true;
                    log::warn!("Failed to demote {}: {err}", self.identity());
                }
            }
        }

        if state == ResidencyState::Cached
            && self.policy == ResidencyPolicy::Storage
            && elapsed > self.limits.cache_ms()
        {
            self.resource.unload();
            state = ResidencyState::Storage;
            self.lifecycle = Lifecycle::Resident(state);
            log::debug!("{} demoted to Storage after {elapsed} ms idle", self.identity());
        }

        Some(Demotion {
            from,
            to: state,
            failed,
        })
    }

    /// Drops the device copy and host memory and marks the record permanently
    /// unusable.
    ///
    /// Returns `true` if this call did the work; a second call is a no-op that
    /// returns `false`.
    pub fn release(&mut self) -> bool {
        let Lifecycle::Resident(state) = self.lifecycle else {
            return false;
        };

        if state == ResidencyState::Active {
            if let Err(err) = self.resource.download() {
                log::error!(
                    "Device copy of {} could not be read back during release: {err}",
                    self.identity()
                );
            }
        }
        if state >= ResidencyState::Cached {
            self.resource.unload();
        }
        self.lifecycle = Lifecycle::Released;
        log::debug!("{} released from {state:?}", self.identity());
        true
    }

    #[track_caller]
    fn resident_state(&self) -> ResidencyState {
        match self.lifecycle {
            Lifecycle::Resident(state) => state,
            Lifecycle::Released => panic!("use after release: {}", self.identity()),
        }
    }

    fn promote_to(&mut self, target: ResidencyState) -> Result<(), ResidencyError> {
        let mut state = self.resident_state();

        if state == ResidencyState::Storage && target >= ResidencyState::Cached {
            if let Err(err) = self.resource.load() {
                log::warn!("Failed to load {}: {err}", self.identity());
                return Err(err.into());
            }
            state = ResidencyState::Cached;
            self.lifecycle = Lifecycle::Resident(state);
            log::debug!("{} promoted to Cached", self.identity());
        }

        if state == ResidencyState::Cached && target == ResidencyState::Active {
            if let Err(err) = self.resource.upload() {
                log::warn!("Failed to upload {}: {err}", self.identity());
                return Err(err.into());
            }
            self.lifecycle = Lifecycle::Resident(ResidencyState::Active);
            log::debug!("{} promoted to Active", self.identity());
        }

        Ok(())
    }
}

impl<T: TieredResource + ?Sized> fmt::Debug for ResourceRecord<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceRecord")
            .field("identity", self.identity())
            .field("lifecycle", &self.lifecycle)
            .field("policy", &self.policy)
            .field("limits", &self.limits)
            .field("last_used_at", &self.last_used_at)
            .finish_non_exhaustive()
    }
}

/// The shared storage behind an [`AssetHandle`].
///
/// Exposed so interface views can be produced by unsizing coercion, e.g.
/// `SharedRecord<Texture>` into `SharedRecord<dyn GpuResident>`.
pub type SharedRecord<T> = Arc<Mutex<ResourceRecord<T>>>;

/// A thread-safe, reference-counted handle to a tiered resource.
///
/// Cloning a handle is cheap and every clone refers to the same record. Each
/// record has its own lock, so promoting one resource never blocks another.
///
/// The per-record operations here lock, run, and unlock; use
/// [`lock`](Self::lock) to hold the record across several calls or to reach
/// the resource's own data.
pub struct AssetHandle<T: ?Sized>(SharedRecord<T>);

impl<T: TieredResource> AssetHandle<T> {
    /// Builds a record with [`ResourceRecord::new`] and wraps it in a handle.
    pub fn create(
        resource: T,
        settings: &ResidencySettings,
        now: u64,
    ) -> Result<Self, ResidencyError> {
        let record = ResourceRecord::new(resource, settings, now)?;
        Ok(Self(Arc::new(Mutex::new(record))))
    }
}

impl<T: ?Sized> AssetHandle<T> {
    /// Wraps already shared storage, typically an unsized view of another handle.
    pub fn from_shared(shared: SharedRecord<T>) -> Self {
        Self(shared)
    }

    /// The shared storage behind this handle.
    pub fn shared(&self) -> &SharedRecord<T> {
        &self.0
    }

    /// Returns `true` if both handles refer to the same record, even when one
    /// of them is an interface view.
    pub fn same_record<U: ?Sized>(&self, other: &AssetHandle<U>) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }

    /// Locks the record.
    ///
    /// State is only written after a hook returns, so a record poisoned by a
    /// panicking hook is still consistent and the poison is ignored.
    pub fn lock(&self) -> MutexGuard<'_, ResourceRecord<T>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the record if no one else holds it, including the calling thread.
    ///
    /// Returns `None` instead of blocking when the record is already locked.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, ResourceRecord<T>>> {
        match self.0.try_lock() {
            Ok(record) => Some(record),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }
}

impl<T: TieredResource + ?Sized> AssetHandle<T> {
    /// The identity of the wrapped resource.
    pub fn identity(&self) -> ResourceIdentity {
        self.lock().identity().clone()
    }

    /// See [`ResourceRecord::state`].
    pub fn state(&self) -> Option<ResidencyState> {
        self.lock().state()
    }

    /// See [`ResourceRecord::policy`].
    pub fn policy(&self) -> ResidencyPolicy {
        self.lock().policy()
    }

    /// See [`ResourceRecord::byte_size`].
    pub fn byte_size(&self) -> u64 {
        self.lock().byte_size()
    }

    /// See [`ResourceRecord::is_usable`].
    pub fn is_usable(&self) -> bool {
        self.lock().is_usable()
    }

    /// See [`ResourceRecord::is_released`].
    pub fn is_released(&self) -> bool {
        self.lock().is_released()
    }

    /// See [`ResourceRecord::ensure_active`].
    #[track_caller]
    pub fn ensure_active(&self, now: u64) -> Result<(), ResidencyError> {
        self.lock().ensure_active(now)
    }

    /// See [`ResourceRecord::ensure_cached`].
    #[track_caller]
    pub fn ensure_cached(&self, now: u64) -> Result<(), ResidencyError> {
        self.lock().ensure_cached(now)
    }

    /// See [`ResourceRecord::set_policy`].
    #[track_caller]
    pub fn set_policy(&self, policy: ResidencyPolicy) -> Result<(), ResidencyError> {
        self.lock().set_policy(policy)
    }

    /// See [`ResourceRecord::set_time_limits`].
    #[track_caller]
    pub fn set_time_limits(&self, active_ms: u64, cache_ms: u64) -> Result<(), ResidencyError> {
        self.lock().set_time_limits(active_ms, cache_ms)
    }

    /// See [`ResourceRecord::demote_if_stale`].
    pub fn demote_if_stale(&self, now: u64) -> Option<Demotion> {
        self.lock().demote_if_stale(now)
    }

    /// See [`ResourceRecord::release`].
    pub fn release(&self) -> bool {
        self.lock().release()
    }
}

impl<T: ?Sized> Clone for AssetHandle<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: TieredResource + ?Sized> fmt::Debug for AssetHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // A handle may be printed while its record is locked further up the stack.
        match self.try_lock() {
            Some(record) => f
                .debug_struct("AssetHandle")
                .field("identity", record.identity())
                .field("state", &record.state())
                .finish(),
            None => f.debug_struct("AssetHandle").finish_non_exhaustive(),
        }
    }
}
