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

use anyhow::Result;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use strata_agents::eviction_agent::EvictionScheduler;
use strata_core::asset::{
    DownloadError, LoadError, ResidencyError, ResidencyPolicy, ResidencyState, ResourceIdentity,
    TieredResource, UploadError,
};
use strata_core::ResidencyConfig;
use strata_data::assets::ResourceRegistry;

const FRAME_MS: u64 = 16;

// --- DUMMY RESOURCE FOR THIS TEST ---
struct Mesh {
    identity: ResourceIdentity,
    unloads: Arc<AtomicU32>,
    loaded: bool,
    uploaded: bool,
}

impl Mesh {
    fn new(identity: ResourceIdentity, unloads: &Arc<AtomicU32>) -> Self {
        Self {
            identity,
            unloads: Arc::clone(unloads),
            loaded: false,
            uploaded: false,
        }
    }
}

impl TieredResource for Mesh {
    fn load(&mut self) -> Result<(), LoadError> {
        self.loaded = true;
        Ok(())
    }

    fn upload(&mut self) -> Result<(), UploadError> {
        self.uploaded = true;
        Ok(())
    }

    fn download(&mut self) -> Result<(), DownloadError> {
        self.uploaded = false;
        Ok(())
    }

    fn unload(&mut self) {
        self.unloads.fetch_add(1, Ordering::SeqCst);
        self.loaded = false;
    }

    fn cached_byte_size(&self) -> u64 {
        if self.loaded {
            1024
        } else {
            0
        }
    }

    fn active_byte_size(&self) -> u64 {
        if self.uploaded {
            2048
        } else {
            0
        }
    }

    fn is_usable(&self) -> bool {
        self.uploaded
    }

    fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }
}

strata_data::register_resource!(Mesh, kind = "mesh");

const CONFIG: &str = r#"(
    sweep_period_ms: 500,
    defaults: (policy: Storage, active_time_limit_ms: 1000, cache_time_limit_ms: 3000),
    overrides: {
        "mesh": (policy: Storage, active_time_limit_ms: 1000, cache_time_limit_ms: 3000),
    },
)"#;

#[test]
fn test_game_loop_evicts_idle_meshes_and_keeps_used_ones() -> Result<()> {
    // --- 1. ARRANGE ---
    let dir = tempfile::tempdir()?;
    let config_path = dir.path().join("residency.ron");
    std::fs::write(&config_path, CONFIG)?;
    let config = ResidencyConfig::load(&config_path)?;

    let mut registry = ResourceRegistry::with_config(config.clone());
    let mut scheduler = EvictionScheduler::from_config(&config);
    let unloads = Arc::new(AtomicU32::new(0));

    let ids = ResourceIdentity::path_indexed("models/ship.gltf", 2);
    let (hull_id, turret_id) = (&ids[0], &ids[1]);
    for id in &ids {
        registry
            .get_or_load::<Mesh, ResidencyError, _>(id, 0, || Ok(Mesh::new(id.clone(), &unloads)))?;
    }

    // --- 2. ACT ---
    // The hull is drawn every frame; the turret only during the first second.
    let mut now = 0;
    while now <= 6000 {
        if let Some(hull) = registry.lookup::<Mesh>(hull_id) {
            hull.ensure_active(now)?;
        }
        if now < 1000 {
            if let Some(turret) = registry.lookup::<Mesh>(turret_id) {
                turret.ensure_active(now)?;
            }
        }
        scheduler.tick(&mut registry, now);
        now += FRAME_MS;
    }

    // --- 3. ASSERT ---
    let hull = registry.lookup::<Mesh>(hull_id).expect("hull is registered");
    let turret = registry.lookup::<Mesh>(turret_id).expect("turret is registered");
    assert_eq!(hull.state(), Some(ResidencyState::Active));
    assert_eq!(
        turret.state(),
        Some(ResidencyState::Storage),
        "idle for more than the cache limit"
    );
    assert_eq!(unloads.load(Ordering::SeqCst), 1);
    assert!(scheduler.sweeps_run() >= 11, "one sweep every 500 ms");
    Ok(())
}

#[test]
fn test_pinned_policy_survives_every_sweep() -> Result<()> {
    let mut registry = ResourceRegistry::new();
    let mut scheduler = EvictionScheduler::new(0);
    let unloads = Arc::new(AtomicU32::new(0));
    let id = ResourceIdentity::unique();

    let mesh = registry
        .get_or_load::<Mesh, ResidencyError, _>(&id, 0, || Ok(Mesh::new(id.clone(), &unloads)))?;
    mesh.set_policy(ResidencyPolicy::Active)?;
    assert_eq!(mesh.state(), Some(ResidencyState::Active));

    for now in [1_000, 100_000, 10_000_000, u64::MAX] {
        scheduler.tick(&mut registry, now);
        assert_eq!(mesh.state(), Some(ResidencyState::Active));
    }
    Ok(())
}

#[test]
fn test_shutdown_releases_all_meshes() -> Result<()> {
    let mut registry = ResourceRegistry::new();
    let mut scheduler = EvictionScheduler::default();
    let unloads = Arc::new(AtomicU32::new(0));

    let handles = ResourceIdentity::path_indexed("models/city.gltf", 3)
        .into_iter()
        .map(|id| {
            let mesh = Mesh::new(id.clone(), &unloads);
            registry.get_or_load::<Mesh, ResidencyError, _>(&id, 0, || Ok(mesh))
        })
        .collect::<Result<Vec<_>, _>>()?;
    for handle in &handles {
        handle.ensure_active(10)?;
    }

    assert_eq!(scheduler.shutdown(&mut registry), 3);
    assert_eq!(unloads.load(Ordering::SeqCst), 3);
    assert!(registry.is_empty());
    assert!(handles.iter().all(|handle| !handle.is_usable()));
    Ok(())
}
