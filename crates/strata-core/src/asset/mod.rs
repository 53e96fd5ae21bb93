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

//! Provides the foundational traits and primitive types for Strata's residency system.
//!
//! Every asset the engine streams (meshes, textures, audio clips, render targets)
//! lives in one of three storage tiers:
//!
//! - **Storage**: only the source file on disk exists.
//! - **Cached**: the decoded payload is held in host memory.
//! - **Active**: the payload has been handed to the GPU or audio device.
//!
//! The key components are:
//! - [`ResourceIdentity`]: the deduplication key naming a logical asset.
//! - [`TieredResource`]: the hook contract every concrete asset type implements.
//! - [`ResourceRecord`] and [`AssetHandle`]: the state machine, written once
//!   against the hook contract, and the shared handle consumers hold.
//!
//! This module has no knowledge of how records are stored or swept; the registry
//! lives in `strata-data`.

mod error;
mod handle;
mod identity;
mod residency;
mod resource;

pub use error::*;
pub use handle::*;
pub use identity::*;
pub use residency::*;
pub use resource::*;
