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

//! Sandbox resource types: textures, meshes and a render target on the fake
//! device, and sound clips on the mixer.

use crate::device::{DeviceBuffer, FakeDevice};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strata_core::asset::{
    DownloadError, LoadError, ResidencyPolicy, ResourceIdentity, TieredResource, UploadError,
};

static DISK_READS: AtomicU64 = AtomicU64::new(0);

/// Total number of files read by every resource so far.
pub fn disk_reads() -> u64 {
    DISK_READS.load(Ordering::Relaxed)
}

fn read_source(path: &Path) -> Result<Vec<u8>, LoadError> {
    DISK_READS.fetch_add(1, Ordering::Relaxed);
    std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn source_path(root: &Path, identity: &ResourceIdentity) -> Result<PathBuf, LoadError> {
    identity
        .path()
        .map(|path| root.join(path))
        .ok_or_else(|| LoadError::MissingSource(identity.clone()))
}

/// Anything the renderer can bind.
pub trait GpuResident: TieredResource {
    /// Bytes the resource occupies on the device while `Active`.
    fn device_bytes(&self) -> u64;
}

/// Anything the mixer can play.
pub trait Audible: TieredResource {
    fn duration_ms(&self) -> u64;
}

pub struct Texture {
    identity: ResourceIdentity,
    source: PathBuf,
    pixels: Option<Vec<u8>>,
    gpu: DeviceBuffer,
}

impl Texture {
    pub fn new(
        root: &Path,
        identity: ResourceIdentity,
        device: &Arc<FakeDevice>,
    ) -> Result<Self, LoadError> {
        Ok(Self {
            source: source_path(root, &identity)?,
            identity,
            pixels: None,
            gpu: DeviceBuffer::new(device),
        })
    }
}

impl TieredResource for Texture {
    fn load(&mut self) -> Result<(), LoadError> {
        let pixels = read_source(&self.source)?;
        if pixels.is_empty() {
            return Err(LoadError::Decode {
                path: self.source.clone(),
                reason: "image has no pixels".to_string(),
            });
        }
        self.pixels = Some(pixels);
        Ok(())
    }

    fn upload(&mut self) -> Result<(), UploadError> {
        self.gpu.upload(self.cached_byte_size())
    }

    fn download(&mut self) -> Result<(), DownloadError> {
        self.gpu.free();
        Ok(())
    }

    fn unload(&mut self) {
        self.pixels = None;
    }

    fn cached_byte_size(&self) -> u64 {
        self.pixels.as_ref().map_or(0, |pixels| pixels.len() as u64)
    }

    fn active_byte_size(&self) -> u64 {
        self.gpu.size()
    }

    fn is_usable(&self) -> bool {
        self.gpu.is_resident()
    }

    fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }
}

impl GpuResident for Texture {
    fn device_bytes(&self) -> u64 {
        self.gpu.size()
    }
}

/// One mesh out of a model file holding one vertex blob per line.
pub struct Mesh {
    identity: ResourceIdentity,
    source: PathBuf,
    vertices: Option<Vec<u8>>,
    gpu: DeviceBuffer,
}

impl Mesh {
    pub fn new(
        root: &Path,
        identity: ResourceIdentity,
        device: &Arc<FakeDevice>,
    ) -> Result<Self, LoadError> {
        Ok(Self {
            source: source_path(root, &identity)?,
            identity,
            vertices: None,
            gpu: DeviceBuffer::new(device),
        })
    }
}

impl TieredResource for Mesh {
    fn load(&mut self) -> Result<(), LoadError> {
        let index = self.identity.index().unwrap_or(0) as usize;
        let model = read_source(&self.source)?;
        let blob = model
            .split(|byte| *byte == b'\n')
            .nth(index)
            .ok_or_else(|| LoadError::Decode {
                path: self.source.clone(),
                reason: format!("model has no mesh #{index}"),
            })?;
        self.vertices = Some(blob.to_vec());
        Ok(())
    }

    fn upload(&mut self) -> Result<(), UploadError> {
        // Vertex buffer plus an index buffer of the same size.
        self.gpu.upload(self.cached_byte_size() * 2)
    }

    fn download(&mut self) -> Result<(), DownloadError> {
        self.gpu.free();
        Ok(())
    }

    fn unload(&mut self) {
        self.vertices = None;
    }

    fn cached_byte_size(&self) -> u64 {
        self.vertices.as_ref().map_or(0, |vertices| vertices.len() as u64)
    }

    fn active_byte_size(&self) -> u64 {
        self.gpu.size()
    }

    fn is_usable(&self) -> bool {
        self.gpu.is_resident()
    }

    fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }
}

impl GpuResident for Mesh {
    fn device_bytes(&self) -> u64 {
        self.gpu.size()
    }
}

/// A synthetic color target. It has no file behind it, so it can never be
/// dropped back to `Storage`.
pub struct RenderTarget {
    identity: ResourceIdentity,
    width: u32,
    height: u32,
    staging: Option<Vec<u8>>,
    gpu: DeviceBuffer,
}

impl RenderTarget {
    const BYTES_PER_PIXEL: u64 = 4;

    pub fn new(
        identity: ResourceIdentity,
        width: u32,
        height: u32,
        device: &Arc<FakeDevice>,
    ) -> Self {
        Self {
            identity,
            width,
            height,
            staging: None,
            gpu: DeviceBuffer::new(device),
        }
    }

    fn frame_bytes(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height) * Self::BYTES_PER_PIXEL
    }
}

impl TieredResource for RenderTarget {
    fn load(&mut self) -> Result<(), LoadError> {
        let bytes = usize::try_from(self.frame_bytes()).map_err(|_| LoadError::Decode {
            path: PathBuf::new(),
            reason: format!("{}x{} target does not fit in memory", self.width, self.height),
        })?;
        self.staging = Some(vec![0; bytes]);
        Ok(())
    }

    fn upload(&mut self) -> Result<(), UploadError> {
        self.gpu.upload(self.frame_bytes())
    }

    fn download(&mut self) -> Result<(), DownloadError> {
        // The rendered contents are transient; only the allocation matters.
        self.gpu.free();
        Ok(())
    }

    fn unload(&mut self) {
        self.staging = None;
    }

    fn cached_byte_size(&self) -> u64 {
        self.staging.as_ref().map_or(0, |staging| staging.len() as u64)
    }

    fn active_byte_size(&self) -> u64 {
        self.gpu.size()
    }

    fn is_usable(&self) -> bool {
        self.gpu.is_resident()
    }

    fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }

    fn policy_floor(&self) -> ResidencyPolicy {
        ResidencyPolicy::Cached
    }
}

impl GpuResident for RenderTarget {
    fn device_bytes(&self) -> u64 {
        self.gpu.size()
    }
}

/// 16-bit stereo PCM at 48 kHz.
pub struct SoundClip {
    identity: ResourceIdentity,
    source: PathBuf,
    samples: Option<Vec<u8>>,
    voice: bool,
}

impl SoundClip {
    const BYTES_PER_MS: u64 = 48 * 2 * 2;

    pub fn new(root: &Path, identity: ResourceIdentity) -> Result<Self, LoadError> {
        Ok(Self {
            source: source_path(root, &identity)?,
            identity,
            samples: None,
            voice: false,
        })
    }
}

impl TieredResource for SoundClip {
    fn load(&mut self) -> Result<(), LoadError> {
        self.samples = Some(read_source(&self.source)?);
        Ok(())
    }

    fn upload(&mut self) -> Result<(), UploadError> {
        self.voice = true;
        Ok(())
    }

    fn download(&mut self) -> Result<(), DownloadError> {
        self.voice = false;
        Ok(())
    }

    fn unload(&mut self) {
        self.samples = None;
    }

    fn cached_byte_size(&self) -> u64 {
        self.samples.as_ref().map_or(0, |samples| samples.len() as u64)
    }

    fn active_byte_size(&self) -> u64 {
        if self.voice {
            self.cached_byte_size()
        } else {
            0
        }
    }

    fn is_usable(&self) -> bool {
        self.voice
    }

    fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }
}

impl Audible for SoundClip {
    fn duration_ms(&self) -> u64 {
        self.cached_byte_size() / Self::BYTES_PER_MS
    }
}

strata_data::register_resource!(Texture, kind = "texture", ancestors = [dyn GpuResident]);
strata_data::register_resource!(Mesh, kind = "mesh", ancestors = [dyn GpuResident]);
strata_data::register_resource!(
    RenderTarget,
    kind = "render_target",
    ancestors = [dyn GpuResident]
);
strata_data::register_resource!(SoundClip, kind = "audio", ancestors = [dyn Audible]);
