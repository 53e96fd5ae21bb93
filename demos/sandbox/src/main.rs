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

// Strata Sandbox
// Drives the residency registry through a simulated nine second game loop.

mod assets;
mod device;

use anyhow::{Context, Result};
use assets::{Audible, GpuResident, Mesh, RenderTarget, SoundClip, Texture};
use device::FakeDevice;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use strata_agents::eviction_agent::EvictionScheduler;
use strata_core::asset::{AssetHandle, ResidencyError, ResourceIdentity, UploadError};
use strata_core::{ResidencyConfig, Stopwatch};
use strata_data::assets::ResourceRegistry;

const FRAME_MS: u64 = 16;
const DEMO_LENGTH_MS: u64 = 9000;
const DEVICE_BUDGET: u64 = 192 * 1024;
const MODEL_PATH: &str = "models/ship.mesh";
const MODEL_MESHES: u32 = 3;

const RESIDENCY_RON: &str = r#"(
    sweep_period_ms: 1000,
    defaults: (policy: Storage, active_time_limit_ms: 2000, cache_time_limit_ms: 6000),
    overrides: {
        "texture": (policy: Storage, active_time_limit_ms: 500, cache_time_limit_ms: 3000),
        "render_target": (policy: Active, active_time_limit_ms: 1000, cache_time_limit_ms: 2000),
        "audio": (policy: Cached, active_time_limit_ms: 1000, cache_time_limit_ms: 5000),
    },
)"#;

/// Which textures are on screen at a given time.
fn visible_textures(now: u64) -> &'static [&'static str] {
    match now {
        0..=2999 => &["textures/grass.png", "textures/rock.png"],
        3000..=5999 => &["textures/rock.png", "textures/sky.png"],
        _ => &["textures/grass.png", "textures/sky.png"],
    }
}

fn write_assets(root: &Path) -> Result<()> {
    let files: [(&str, Vec<u8>); 5] = [
        ("textures/grass.png", vec![0x22; 48 * 1024]),
        ("textures/rock.png", vec![0x77; 32 * 1024]),
        ("textures/sky.png", vec![0xaa; 56 * 1024]),
        ("audio/engine.wav", vec![0x01; 192 * 1500]),
        (MODEL_PATH, ship_model()),
    ];
    for (path, bytes) in files {
        let path = root.join(path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;
    }
    std::fs::write(root.join("residency.ron"), RESIDENCY_RON)?;
    Ok(())
}

fn ship_model() -> Vec<u8> {
    let hull = vec![b'h'; 6 * 1024];
    let turret = vec![b't'; 2 * 1024];
    let flag = vec![b'f'; 512];
    [hull, turret, flag].join(&b'\n')
}

/// Binds GPU resources for drawing, recovering from device memory pressure.
#[derive(Default)]
struct Renderer {
    stalled: HashSet<ResourceIdentity>,
    draws: u64,
}

impl Renderer {
    fn draw(
        &mut self,
        registry: &mut ResourceRegistry,
        scheduler: &mut EvictionScheduler,
        identity: &ResourceIdentity,
        now: u64,
    ) -> Result<()> {
        let Some(handle) = registry.lookup::<dyn GpuResident>(identity).cloned() else {
            log::warn!("Renderer: {identity} is not registered");
            return Ok(());
        };

        match handle.ensure_active(now) {
            Ok(()) => {}
            Err(ResidencyError::Upload(UploadError::OutOfDeviceMemory { .. })) => {
                // Evict whatever went idle since the last scheduled sweep, then retry once.
                scheduler.force_sweep(registry, now);
                if let Err(err) = handle.ensure_active(now) {
                    if self.stalled.insert(identity.clone()) {
                        log::warn!("Renderer: skipping {identity} at {now} ms: {err}");
                    }
                    return Ok(());
                }
            }
            Err(err) => return Err(err).with_context(|| format!("binding {identity}")),
        }

        if self.stalled.remove(identity) {
            log::info!("Renderer: {identity} is drawable again at {now} ms");
        }
        let bound_bytes = handle.lock().resource().device_bytes();
        log::trace!("Renderer: bound {identity} ({bound_bytes} B)");
        self.draws += 1;
        Ok(())
    }
}

fn play(registry: &ResourceRegistry, identity: &ResourceIdentity, now: u64) -> Result<()> {
    if let Some(clip) = registry.lookup::<dyn Audible>(identity) {
        clip.ensure_active(now)?;
    }
    Ok(())
}

fn load_texture(
    registry: &mut ResourceRegistry,
    root: &Path,
    device: &Arc<FakeDevice>,
    path: &str,
    now: u64,
) -> Result<AssetHandle<Texture>> {
    let identity = ResourceIdentity::path_single(path);
    registry.get_or_load(&identity, now, || -> Result<Texture> {
        Ok(Texture::new(root, identity.clone(), device)?)
    })
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    let workspace = tempfile::tempdir().context("creating the asset directory")?;
    let root = workspace.path();
    write_assets(root)?;

    let config = ResidencyConfig::load(root.join("residency.ron"))?;
    let device = Arc::new(FakeDevice::new("sandbox-gpu", DEVICE_BUDGET));
    let mut registry = ResourceRegistry::with_config(config.clone());
    let mut scheduler = EvictionScheduler::from_config(&config);
    let mut renderer = Renderer::default();
    let stopwatch = Stopwatch::new();

    let color_target = ResourceIdentity::unique();
    registry.get_or_load(&color_target, 0, || -> Result<RenderTarget> {
        Ok(RenderTarget::new(color_target.clone(), 128, 128, &device))
    })?;

    let meshes = ResourceIdentity::path_indexed(MODEL_PATH, MODEL_MESHES);
    for identity in &meshes {
        registry.get_or_load(identity, 0, || -> Result<Mesh> {
            Ok(Mesh::new(root, identity.clone(), &device)?)
        })?;
    }

    let engine_sound = ResourceIdentity::path_single("audio/engine.wav");
    let clip = registry.get_or_load(&engine_sound, 0, || -> Result<SoundClip> {
        Ok(SoundClip::new(root, engine_sound.clone())?)
    })?;
    log::info!(
        "Engine loop sound is {} ms long",
        clip.lock().resource().duration_ms()
    );

    let mut now = 0;
    while now <= DEMO_LENGTH_MS {
        renderer.draw(&mut registry, &mut scheduler, &color_target, now)?;

        for path in visible_textures(now) {
            let texture = load_texture(&mut registry, root, &device, path, now)?;
            renderer.draw(&mut registry, &mut scheduler, &texture.identity(), now)?;
        }

        // The ship leaves the scene after six seconds.
        if now < 6000 {
            for identity in &meshes {
                renderer.draw(&mut registry, &mut scheduler, identity, now)?;
            }
            play(&registry, &engine_sound, now)?;
        }

        if let Some(summary) = scheduler.tick(&mut registry, now) {
            if summary.demoted() > 0 {
                log::info!("t={now} ms: sweep {summary}");
            }
        }
        if now % 1000 == 0 {
            log::info!(
                "t={now} ms: {} | {} {} / {} B",
                registry.report(),
                device.name(),
                device.used(),
                device.budget()
            );
        }
        now += FRAME_MS;
    }

    log::info!(
        "Simulated {DEMO_LENGTH_MS} ms in {:.1} ms: {} draws, {} disk reads, {} sweeps",
        stopwatch.elapsed_secs_f64() * 1000.0,
        renderer.draws,
        assets::disk_reads(),
        scheduler.sweeps_run()
    );

    scheduler.shutdown(&mut registry);
    log::info!("Device memory after shutdown: {} B", device.used());
    Ok(())
}
