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

//! Defines the hierarchy of error types for the residency subsystem.
//!
//! Use after release is deliberately absent: touching a released record is a
//! programming error and panics.

use super::identity::ResourceIdentity;
use super::residency::ResidencyPolicy;
use std::path::PathBuf;
use thiserror::Error;

/// A failure while moving a resource from `Storage` to `Cached`.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The source file could not be read.
    #[error("failed to read '{}'", .path.display())]
    Io {
        /// The file that failed to load.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The bytes were read but the codec rejected them.
    #[error("failed to decode '{}': {reason}", .path.display())]
    Decode {
        /// The file whose contents could not be decoded.
        path: PathBuf,
        /// What the codec reported.
        reason: String,
    },
    /// The resource has nothing to load from, e.g. a synthetic render target
    /// whose host copy was dropped.
    #[error("resource {0} has no source to load from")]
    MissingSource(ResourceIdentity),
}

/// A failure while moving a resource from `Cached` to `Active`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UploadError {
    /// The device does not have room for the payload.
    #[error("out of device memory: requested {requested} bytes, {available} available")]
    OutOfDeviceMemory {
        /// Bytes the upload needed.
        requested: u64,
        /// Bytes the device had left.
        available: u64,
    },
    /// The device rejected the payload.
    #[error("device rejected upload: {0}")]
    Rejected(String),
    /// The device went away.
    #[error("device lost")]
    DeviceLost,
}

/// A failure while moving a resource from `Active` back to `Cached`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DownloadError {
    /// Reading the device copy back into host memory failed.
    #[error("device readback failed: {0}")]
    ReadbackFailed(String),
}

/// A residency configuration that violates the threshold or floor rules.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PolicyError {
    /// Thresholds must be positive.
    #[error("time limits must be positive")]
    ZeroThreshold,
    /// The active threshold must be strictly below the cache threshold.
    #[error("active time limit ({active_ms} ms) must be below cache time limit ({cache_ms} ms)")]
    ThresholdOrder {
        /// The rejected active threshold.
        active_ms: u64,
        /// The rejected cache threshold.
        cache_ms: u64,
    },
    /// The resource type cannot live at the requested policy.
    #[error("policy {requested:?} is below the hard floor {floor:?} for this resource")]
    BelowFloor {
        /// The rejected policy.
        requested: ResidencyPolicy,
        /// The lowest policy the resource supports.
        floor: ResidencyPolicy,
    },
}

/// The top-level error returned by residency operations.
#[derive(Debug, Error)]
pub enum ResidencyError {
    /// `load` failed; the record stayed in `Storage`.
    #[error(transparent)]
    Load(#[from] LoadError),
    /// `upload` failed; the record stayed in `Cached`.
    #[error(transparent)]
    Upload(#[from] UploadError),
    /// A policy or threshold setter was rejected; the record is unchanged.
    #[error("invalid policy configuration: {0}")]
    InvalidPolicyConfiguration(#[from] PolicyError),
    /// A second live resource was offered for an identity already registered
    /// under the same type. `get_or_create` never produces this because it
    /// deduplicates before constructing.
    #[error("a resource with identity {0} is already registered for this type")]
    DuplicateConstructionAttempted(ResourceIdentity),
    /// A constructor built a resource under a different identity than the
    /// one it was asked for.
    #[error("constructor for {requested} produced a resource identified as {constructed}")]
    IdentityMismatch {
        /// The identity passed to the registry.
        requested: ResourceIdentity,
        /// The identity the constructed resource reports.
        constructed: ResourceIdentity,
    },
    /// A configuration file could not be read or parsed.
    #[error("invalid residency configuration: {0}")]
    Config(String),
}
