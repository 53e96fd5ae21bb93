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

//! The process-wide resource store, owned by the game loop.

use super::ancestry::{AncestorView, ErasedHandle, RegisteredResource, TypeTag, Visit};
use super::report::{ResidencyReport, SweepSummary};
use std::any::TypeId;
use std::collections::HashMap;
use strata_core::asset::{
    AssetHandle, ResidencyError, ResidencySettings, ResourceIdentity, SharedRecord,
    TieredResource,
};
use strata_core::ResidencyConfig;

struct Entry {
    /// The concrete type that registered this record.
    owner: TypeId,
    handle: Box<dyn ErasedHandle>,
}

struct Bucket {
    tag: TypeTag,
    /// Several concrete types may register the same identity, so an interface
    /// bucket keeps one entry per owner. Concrete buckets hold exactly one.
    records: HashMap<ResourceIdentity, Vec<Entry>>,
}

impl Bucket {
    fn new(tag: TypeTag) -> Self {
        Self {
            tag,
            records: HashMap::new(),
        }
    }
}

/// Per concrete type: every tag it is stored under, computed on first
/// registration.
struct KindEntry {
    kind: &'static str,
    tags: Vec<TypeTag>,
}

/// Stores every live resource once per type tag it is reachable under.
///
/// A record inserted as `Texture` can be looked up as `Texture`, as
/// `dyn TieredResource`, and as any interface listed by its
/// [`RegisteredResource`] implementation. Within one type, an identity maps
/// to at most one live record.
///
/// The registry is a plain value: the application owns it and passes it to
/// the systems that need it.
pub struct ResourceRegistry {
    buckets: HashMap<TypeId, Bucket>,
    kinds: HashMap<TypeId, KindEntry>,
    config: ResidencyConfig,
}

impl ResourceRegistry {
    /// Creates an empty registry with the default configuration.
    pub fn new() -> Self {
        Self::with_config(ResidencyConfig::default())
    }

    /// Creates an empty registry that builds records with `config`.
    pub fn with_config(config: ResidencyConfig) -> Self {
        Self {
            buckets: HashMap::new(),
            kinds: HashMap::new(),
            config,
        }
    }

    /// The configuration new records are built with.
    pub fn config(&self) -> &ResidencyConfig {
        &self.config
    }

    /// The settings `T` resolves to: its per-kind override or the defaults.
    pub fn settings_for<T: RegisteredResource>(&self) -> &ResidencySettings {
        self.config.settings_for(T::KIND)
    }

    /// Returns the live record for `identity` under `T`, building and
    /// registering it with `ctor` on a miss.
    ///
    /// On a hit `ctor` is not invoked and the returned handle refers to the
    /// same record as every earlier call. A failing `ctor` leaves the registry
    /// unchanged.
    ///
    /// # Errors
    /// Whatever `ctor` returns, or [`ResidencyError::IdentityMismatch`] if it
    /// built a resource for another identity.
    pub fn get_or_create<T, E, F>(
        &mut self,
        identity: &ResourceIdentity,
        ctor: F,
    ) -> Result<AssetHandle<T>, E>
    where
        T: RegisteredResource,
        E: From<ResidencyError>,
        F: FnOnce() -> Result<AssetHandle<T>, E>,
    {
        if let Some(existing) = self.lookup::<T>(identity) {
            log::trace!("Registry hit for {identity} as {}", T::KIND);
            return Ok(existing.clone());
        }

        let handle = ctor()?;
        let constructed = handle.identity();
        if constructed != *identity {
            handle.release();
            return Err(ResidencyError::IdentityMismatch {
                requested: identity.clone(),
                constructed,
            }
            .into());
        }

        self.insert(handle.clone())?;
        Ok(handle)
    }

    /// Like [`get_or_create`](Self::get_or_create), but `make` only builds the
    /// raw resource; it is wrapped with [`settings_for::<T>`](Self::settings_for)
    /// and promoted to its policy tier at `now`.
    pub fn get_or_load<T, E, F>(
        &mut self,
        identity: &ResourceIdentity,
        now: u64,
        make: F,
    ) -> Result<AssetHandle<T>, E>
    where
        T: RegisteredResource,
        E: From<ResidencyError>,
        F: FnOnce() -> Result<T, E>,
    {
        let settings = self.settings_for::<T>().clone();
        self.get_or_create(identity, || {
            let resource = make()?;
            Ok(AssetHandle::create(resource, &settings, now)?)
        })
    }

    /// Registers an externally built handle under its own identity.
    ///
    /// A released record still waiting to be pruned is replaced.
    ///
    /// # Errors
    /// [`ResidencyError::DuplicateConstructionAttempted`] if a live record
    /// already holds the identity for `T`.
    pub fn insert<T: RegisteredResource>(
        &mut self,
        handle: AssetHandle<T>,
    ) -> Result<(), ResidencyError> {
        let owner = TypeId::of::<T>();
        let identity = handle.identity();

        if self.lookup::<T>(&identity).is_some() {
            return Err(ResidencyError::DuplicateConstructionAttempted(identity));
        }
        self.detach(owner, &identity);

        let as_resource: SharedRecord<dyn TieredResource> = handle.shared().clone();
        let mut views = vec![
            AncestorView::new(handle.clone()),
            AncestorView::new(AssetHandle::from_shared(as_resource)),
        ];
        views.extend(T::ancestor_views(&handle));

        let mut tags: Vec<TypeTag> = Vec::with_capacity(views.len());
        for view in views {
            let (tag, erased) = view.into_parts();
            if tags.contains(&tag) {
                continue;
            }
            tags.push(tag);
            self.buckets
                .entry(tag.id())
                .or_insert_with(|| Bucket::new(tag))
                .records
                .entry(identity.clone())
                .or_default()
                .push(Entry {
                    owner,
                    handle: erased,
                });
        }

        log::debug!(
            "Registered {identity} as {} under {} type tags",
            T::KIND,
            tags.len()
        );
        self.kinds.entry(owner).or_insert_with(|| KindEntry {
            kind: T::KIND,
            tags,
        });
        Ok(())
    }

    /// Returns the live record for `identity` viewed as `U`, which may be a
    /// concrete type or an interface such as `dyn GpuResident`.
    ///
    /// If several concrete types registered the same identity under one
    /// interface, the earliest registration wins. Never blocks on a record
    /// lock, so it may be called while a guard from [`AssetHandle::lock`] is held.
    pub fn lookup<U: TieredResource + ?Sized + 'static>(
        &self,
        identity: &ResourceIdentity,
    ) -> Option<&AssetHandle<U>> {
        self.buckets
            .get(&TypeId::of::<U>())?
            .records
            .get(identity)?
            .iter()
            .filter(|entry| entry.handle.is_live())
            .find_map(|entry| entry.handle.as_any().downcast_ref::<AssetHandle<U>>())
    }

    /// Every live record viewed as `U`, in no particular order.
    pub fn all<U: TieredResource + ?Sized + 'static>(
        &self,
    ) -> impl Iterator<Item = &AssetHandle<U>> + '_ {
        self.buckets
            .get(&TypeId::of::<U>())
            .into_iter()
            .flat_map(|bucket| bucket.records.values())
            .flatten()
            .filter(|entry| entry.handle.is_live())
            .filter_map(|entry| entry.handle.as_any().downcast_ref::<AssetHandle<U>>())
    }

    /// Returns `true` if a live record holds `identity` under `U`.
    pub fn contains<U: TieredResource + ?Sized + 'static>(
        &self,
        identity: &ResourceIdentity,
    ) -> bool {
        self.lookup::<U>(identity).is_some()
    }

    /// The number of registered records, counting each record once.
    ///
    /// Records released through their handle count until the next sweep.
    pub fn len(&self) -> usize {
        self.canonical_entries().count()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Releases the record registered as `T` under `identity` and removes it
    /// from every bucket.
    ///
    /// Returns `true` if a record was found and this call released it.
    pub fn release<T: RegisteredResource>(&mut self, identity: &ResourceIdentity) -> bool {
        let owner = TypeId::of::<T>();
        let released = self
            .buckets
            .get(&owner)
            .and_then(|bucket| bucket.records.get(identity))
            .is_some_and(|entries| entries.iter().any(|entry| entry.handle.release()));
        self.detach(owner, identity);
        released
    }

    /// Runs [`demote_if_stale`](AssetHandle::demote_if_stale) once on every
    /// live record and prunes records released through their handles.
    ///
    /// Only the concrete bucket of each record is visited, so a record
    /// reachable through several interfaces still sees its hooks run once.
    /// A record whose lock is held elsewhere is skipped and counted as busy;
    /// it is in use, so it is not stale.
    pub fn sweep(&mut self, now: u64) -> SweepSummary {
        let mut summary = SweepSummary::default();
        let mut stale_entries = Vec::new();

        for (owner, identity, entry) in self.canonical_entries() {
            match entry.handle.visit(now) {
                Visit::Swept(demotion) => {
                    summary.visited += 1;
                    summary.record(demotion);
                    if demotion.is_demoted() {
                        log::trace!("{identity}: {:?} -> {:?}", demotion.from, demotion.to);
                    }
                }
                Visit::Released => stale_entries.push((owner, identity.clone())),
                Visit::Busy => {
                    summary.busy += 1;
                    log::trace!("{identity}: locked, skipped");
                }
            }
        }

        for (owner, identity) in stale_entries {
            self.detach(owner, &identity);
            summary.pruned += 1;
        }

        if summary.demoted() > 0 || summary.failed > 0 || summary.pruned > 0 {
            log::debug!("Sweep at {now} ms: {summary}");
        } else {
            log::trace!("Sweep at {now} ms: {summary}");
        }
        summary
    }

    /// Releases every record and empties the registry. Used at shutdown.
    ///
    /// Locks each record in turn, so no record guard may be held by the caller.
    ///
    /// Returns how many records this call released.
    pub fn release_all(&mut self) -> usize {
        let released = self
            .canonical_entries()
            .filter(|(_, _, entry)| entry.handle.release())
            .count();
        self.buckets.clear();
        log::info!("Released {released} resources from the registry");
        released
    }

    /// Counts records per tier and the bytes they hold on each side.
    ///
    /// Locks each record in turn, so no record guard may be held by the caller.
    pub fn report(&self) -> ResidencyReport {
        let mut report = ResidencyReport::default();
        for (_, _, entry) in self.canonical_entries() {
            if let Some(footprint) = entry.handle.footprint() {
                report.record(footprint.state, footprint.host_bytes, footprint.device_bytes);
            }
        }
        report
    }

    /// The kind names of every concrete type registered so far.
    pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.kinds.values().map(|kind| kind.kind)
    }

    /// Each record once, from the bucket of the concrete type that owns it.
    fn canonical_entries(
        &self,
    ) -> impl Iterator<Item = (TypeId, &ResourceIdentity, &Entry)> + '_ {
        let buckets = &self.buckets;
        self.kinds
            .keys()
            .filter_map(move |owner| buckets.get(owner))
            .flat_map(|bucket| {
                let owner = bucket.tag.id();
                bucket.records.iter().flat_map(move |(identity, entries)| {
                    entries
                        .iter()
                        .filter(move |entry| entry.owner == owner)
                        .map(move |entry| (owner, identity, entry))
                })
            })
    }

    /// Removes every entry `owner` registered for `identity`.
    fn detach(&mut self, owner: TypeId, identity: &ResourceIdentity) {
        let Some(kind) = self.kinds.get(&owner) else {
            return;
        };
        for tag in &kind.tags {
            let Some(bucket) = self.buckets.get_mut(&tag.id()) else {
                continue;
            };
            if let Some(entries) = bucket.records.get_mut(identity) {
                entries.retain(|entry| entry.owner != owner);
                if entries.is_empty() {
                    bucket.records.remove(identity);
                }
            }
            if bucket.records.is_empty() {
                self.buckets.remove(&tag.id());
            }
        }
    }
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::asset::{
        DownloadError, LoadError, ResidencyPolicy, ResidencyState, TimeLimits, UploadError,
    };
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    trait Audible: TieredResource {
        fn channels(&self) -> u16;
    }

    #[derive(Default)]
    struct Clip {
        identity: Option<ResourceIdentity>,
        loaded: bool,
        uploaded: bool,
        downloads: u32,
        fail_download: bool,
    }

    impl Clip {
        fn new(identity: ResourceIdentity) -> Self {
            Self {
                identity: Some(identity),
                ..Default::default()
            }
        }
    }

    impl TieredResource for Clip {
        fn load(&mut self) -> Result<(), LoadError> {
            self.loaded = true;
            Ok(())
        }

        fn upload(&mut self) -> Result<(), UploadError> {
            self.uploaded = true;
            Ok(())
        }

        fn download(&mut self) -> Result<(), DownloadError> {
            self.downloads += 1;
            if self.fail_download {
                return Err(DownloadError::ReadbackFailed("mixer busy".to_string()));
            }
            self.uploaded = false;
            Ok(())
        }

        fn unload(&mut self) {
            self.loaded = false;
        }

        fn cached_byte_size(&self) -> u64 {
            if self.loaded {
                100
            } else {
                0
            }
        }

        fn active_byte_size(&self) -> u64 {
            if self.uploaded {
                40
            } else {
                0
            }
        }

        fn is_usable(&self) -> bool {
            self.uploaded
        }

        fn identity(&self) -> &ResourceIdentity {
            self.identity.as_ref().expect("clip identity")
        }
    }

    impl Audible for Clip {
        fn channels(&self) -> u16 {
            2
        }
    }

    crate::register_resource!(Clip, kind = "audio", ancestors = [dyn Audible]);

    fn settings() -> ResidencySettings {
        ResidencySettings::new(ResidencyPolicy::Storage, TimeLimits::new(1000, 5000).unwrap())
    }

    fn clip_handle(identity: &ResourceIdentity) -> AssetHandle<Clip> {
        AssetHandle::create(Clip::new(identity.clone()), &settings(), 0).unwrap()
    }

    #[test]
    fn test_get_or_create_invokes_constructor_once() {
        let mut registry = ResourceRegistry::new();
        let id = ResourceIdentity::path_single("music/theme.ogg");
        let mut calls = 0;

        let first = registry
            .get_or_create::<Clip, ResidencyError, _>(&id, || {
                calls += 1;
                Ok(clip_handle(&id))
            })
            .unwrap();
        let second = registry
            .get_or_create::<Clip, ResidencyError, _>(&id, || {
                calls += 1;
                Ok(clip_handle(&id))
            })
            .unwrap();

        assert_eq!(calls, 1, "the constructor runs only on a miss");
        assert!(first.same_record(&second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_failing_constructor_leaves_registry_unchanged() {
        let mut registry = ResourceRegistry::new();
        let id = ResourceIdentity::path_single("missing.ogg");

        let result = registry.get_or_create::<Clip, ResidencyError, _>(&id, || {
            Err(LoadError::MissingSource(id.clone()).into())
        });

        assert!(matches!(result, Err(ResidencyError::Load(_))));
        assert!(registry.is_empty());
        assert!(registry.all::<dyn TieredResource>().next().is_none());
    }

    #[test]
    fn test_constructor_with_wrong_identity_is_rejected() {
        let mut registry = ResourceRegistry::new();
        let requested = ResourceIdentity::path_single("a.ogg");
        let other = ResourceIdentity::path_single("b.ogg");

        let result = registry
            .get_or_create::<Clip, ResidencyError, _>(&requested, || Ok(clip_handle(&other)));

        assert!(matches!(result, Err(ResidencyError::IdentityMismatch { .. })));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_record_is_reachable_through_every_ancestor() {
        let mut registry = ResourceRegistry::new();
        let id = ResourceIdentity::path_single("sfx/step.wav");
        let handle = clip_handle(&id);
        registry.insert(handle.clone()).unwrap();

        let audible = registry.lookup::<dyn Audible>(&id).expect("ancestor view");
        assert!(audible.same_record(&handle));
        assert_eq!(audible.lock().resource().channels(), 2);

        assert!(registry.contains::<dyn TieredResource>(&id));
        assert!(registry.contains::<Clip>(&id));
        assert_eq!(registry.all::<dyn Audible>().count(), 1);
        assert_eq!(registry.kinds().collect::<Vec<_>>(), vec!["audio"]);
    }

    #[test]
    fn test_insert_rejects_live_duplicate() {
        let mut registry = ResourceRegistry::new();
        let id = ResourceIdentity::path_single("sfx/step.wav");
        registry.insert(clip_handle(&id)).unwrap();

        let result = registry.insert(clip_handle(&id));
        assert!(matches!(
            result,
            Err(ResidencyError::DuplicateConstructionAttempted(dup)) if dup == id
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_sweep_visits_each_record_once() {
        let config = ResidencyConfig::default().with_override("audio", settings());
        let mut registry = ResourceRegistry::with_config(config);
        let ids = ResourceIdentity::path_indexed("bank.fsb", 3);
        for id in &ids {
            let handle = registry
                .get_or_load::<Clip, ResidencyError, _>(id, 0, || Ok(Clip::new(id.clone())))
                .unwrap();
            handle.ensure_active(0).unwrap();
        }

        let summary = registry.sweep(999);
        assert_eq!(summary.visited, 3);
        assert_eq!(summary.demoted(), 0);
        assert_eq!(registry.report().active, 3);

        let summary = registry.sweep(1001);
        assert_eq!(summary.visited, 3, "ancestor buckets are not swept");
        assert_eq!(summary.demoted_to_cached, 3);
        for clip in registry.all::<Clip>() {
            assert_eq!(clip.lock().resource().downloads, 1);
        }

        let summary = registry.sweep(5001);
        assert_eq!(summary.demoted_to_storage, 3);
        assert_eq!(registry.report().storage, 3);
    }

    #[test]
    fn test_failed_download_is_counted_and_record_stays_active() {
        let mut registry = ResourceRegistry::new();
        let id = ResourceIdentity::unique();
        let handle = clip_handle(&id);
        handle.ensure_active(0).unwrap();
        handle.lock().resource_mut().fail_download = true;
        registry.insert(handle.clone()).unwrap();

        let summary = registry.sweep(2000);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.demoted(), 0);
        assert_eq!(handle.state(), Some(ResidencyState::Active));
    }

    #[test]
    fn test_handle_release_is_pruned_by_next_sweep() {
        let mut registry = ResourceRegistry::new();
        let id = ResourceIdentity::path_single("sfx/door.wav");
        let handle = clip_handle(&id);
        registry.insert(handle.clone()).unwrap();

        assert!(handle.release());
        assert!(registry.lookup::<Clip>(&id).is_none());
        assert!(registry.all::<dyn Audible>().next().is_none());
        assert_eq!(registry.len(), 1);

        let summary = registry.sweep(10);
        assert_eq!(summary.pruned, 1);
        assert_eq!(summary.visited, 0);
        assert!(registry.is_empty());

        registry.insert(clip_handle(&id)).unwrap();
        assert!(registry.contains::<dyn Audible>(&id));
    }

    #[test]
    fn test_release_removes_record_from_every_bucket() {
        let mut registry = ResourceRegistry::new();
        let id = ResourceIdentity::path_single("sfx/door.wav");
        let handle = clip_handle(&id);
        handle.ensure_active(0).unwrap();
        registry.insert(handle.clone()).unwrap();

        assert!(registry.release::<Clip>(&id));
        assert!(!registry.release::<Clip>(&id));
        assert!(handle.is_released());
        assert!(!registry.contains::<dyn Audible>(&id));
        assert!(!registry.contains::<dyn TieredResource>(&id));
    }

    #[test]
    fn test_release_all_releases_and_clears() {
        let mut registry = ResourceRegistry::new();
        let handles: Vec<_> = ResourceIdentity::path_indexed("bank.fsb", 4)
            .iter()
            .map(|id| {
                let handle = clip_handle(id);
                registry.insert(handle.clone()).unwrap();
                handle
            })
            .collect();
        handles[0].release();

        assert_eq!(registry.release_all(), 3);
        assert!(registry.is_empty());
        assert!(handles.iter().all(|handle| handle.is_released()));
    }

    #[test]
    fn test_report_counts_canonical_records_only() {
        let mut registry = ResourceRegistry::new();
        let id = ResourceIdentity::path_single("sfx/step.wav");
        let handle = clip_handle(&id);
        handle.ensure_active(0).unwrap();
        registry.insert(handle).unwrap();

        let report = registry.report();
        assert_eq!(report.resources, 1);
        assert_eq!(report.active, 1);
        assert_eq!(report.cached_bytes, 100, "an active clip keeps its host copy");
        assert_eq!(report.active_bytes, 40);
        assert_eq!(report.total_bytes(), 140);
    }

    #[test]
    fn test_queries_and_sweep_do_not_wait_on_a_record_the_caller_holds() {
        let mut registry = ResourceRegistry::new();
        let id = ResourceIdentity::path_single("sfx/engine.wav");
        let handle = clip_handle(&id);
        handle.ensure_active(0).unwrap();
        registry.insert(handle.clone()).unwrap();
        let held = handle.clone();

        let (sender, receiver) = mpsc::channel();
        thread::spawn(move || {
            let record = held.lock();
            let found =
                registry.contains::<Clip>(&id) && registry.lookup::<dyn Audible>(&id).is_some();
            let listed = registry.all::<Clip>().count();
            let summary = registry.sweep(10_000);
            drop(record);
            let _ = sender.send((found, listed, summary, registry.len()));
        });

        let (found, listed, summary, len) = receiver
            .recv_timeout(Duration::from_secs(5))
            .expect("registry blocked on a record locked by the caller");
        assert!(found);
        assert_eq!(listed, 1);
        assert_eq!(summary.busy, 1);
        assert_eq!(summary.visited, 0);
        assert_eq!(summary.pruned, 0);
        assert_eq!(len, 1);
        assert_eq!(handle.state(), Some(ResidencyState::Active));
    }

    #[test]
    fn test_settings_resolve_per_kind_override() {
        let config = ResidencyConfig::default()
            .with_override("audio", settings().with_policy(ResidencyPolicy::Cached));
        let mut registry = ResourceRegistry::with_config(config);
        let id = ResourceIdentity::path_single("music/theme.ogg");

        let handle = registry
            .get_or_load::<Clip, ResidencyError, _>(&id, 0, || Ok(Clip::new(id.clone())))
            .unwrap();
        assert_eq!(handle.policy(), ResidencyPolicy::Cached);
        assert_eq!(handle.state(), Some(ResidencyState::Cached));
    }
}
