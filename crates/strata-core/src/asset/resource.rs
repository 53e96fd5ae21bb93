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

use super::error::{DownloadError, LoadError, UploadError};
use super::identity::ResourceIdentity;
use super::residency::ResidencyPolicy;

/// The hook contract every concrete asset type implements.
///
/// The tier state machine in [`ResourceRecord`](super::ResourceRecord) is written
/// once against this trait; implementors only perform the actual I/O and device
/// work and never track their own tier. The machine guarantees the hooks are
/// called in tier order: `load` only from `Storage`, `upload` only from
/// `Cached`, `download` only from `Active`, `unload` only from `Cached`.
/// The one exception is release: if `download` fails there, `unload` still
/// runs so the record reaches its terminal state.
///
/// The trait is object safe so a resource can also be viewed through any
/// interface trait that extends it (for example `dyn GpuResident`).
///
/// # Examples
///
/// ```
/// use strata_core::asset::{
///     DownloadError, LoadError, ResourceIdentity, TieredResource, UploadError,
/// };
///
/// struct Sound {
///     identity: ResourceIdentity,
///     samples: Option<Vec<f32>>,
///     voice: Option<u32>,
/// }
///
/// impl TieredResource for Sound {
///     fn load(&mut self) -> Result<(), LoadError> {
///         self.samples = Some(vec![0.0; 480]);
///         Ok(())
///     }
///     fn upload(&mut self) -> Result<(), UploadError> {
///         self.voice = Some(1);
///         Ok(())
///     }
///     fn download(&mut self) -> Result<(), DownloadError> {
///         self.voice = None;
///         Ok(())
///     }
///     fn unload(&mut self) {
///         self.samples = None;
///     }
///     fn cached_byte_size(&self) -> u64 {
///         self.samples.as_ref().map_or(0, |s| (s.len() * 4) as u64)
///     }
///     fn active_byte_size(&self) -> u64 {
///         if self.voice.is_some() { self.cached_byte_size() } else { 0 }
///     }
///     fn is_usable(&self) -> bool {
///         self.voice.is_some()
///     }
///     fn identity(&self) -> &ResourceIdentity {
///         &self.identity
///     }
/// }
/// ```
pub trait TieredResource: Send + 'static {
    /// `Storage -> Cached`: decodes the source into host memory.
    fn load(&mut self) -> Result<(), LoadError>;

    /// `Cached -> Active`: hands the host payload to the device.
    fn upload(&mut self) -> Result<(), UploadError>;

    /// `Active -> Cached`: pulls the device copy back, or simply drops it while
    /// keeping host memory.
    fn download(&mut self) -> Result<(), DownloadError>;

    /// `Cached -> Storage`: frees host memory.
    fn unload(&mut self);

    /// Size of the host-side payload. Still meaningful while `Active`.
    fn cached_byte_size(&self) -> u64;

    /// Size of the device-side payload.
    fn active_byte_size(&self) -> u64;

    /// Returns `true` while the device copy can be drawn or played.
    fn is_usable(&self) -> bool;

    /// The identity this resource is registered under.
    fn identity(&self) -> &ResourceIdentity;

    /// The lowest policy this resource can live at.
    ///
    /// Resources that cannot be recreated from disk (render targets, generated
    /// textures) override this to return at least `Cached`.
    fn policy_floor(&self) -> ResidencyPolicy {
        ResidencyPolicy::Storage
    }
}
