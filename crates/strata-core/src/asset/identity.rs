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

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// Next value handed out by [`ResourceIdentity::unique`]. Never reused.
static NEXT_UNIQUE_ID: AtomicU64 = AtomicU64::new(1);

/// A normalized, forward-slash path naming an asset source file.
///
/// Two paths are equal when their normalized strings are equal. Nothing here
/// touches the filesystem, so two different spellings of a symlinked file are
/// still two different paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetPath(String);

impl AssetPath {
    /// Normalizes `path` and wraps it.
    ///
    /// Backslashes become forward slashes, empty and `.` segments are dropped,
    /// and `..` cancels the preceding segment when there is one.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self(normalize(&path.as_ref().to_string_lossy()))
    }

    /// Returns the normalized path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<Path> for AssetPath {
    fn as_ref(&self) -> &Path {
        Path::new(&self.0)
    }
}

fn normalize(raw: &str) -> String {
    let unified = raw.replace('\\', "/");
    let absolute = unified.starts_with('/');

    let mut segments: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                // `/..` is still `/`.
                _ if absolute => {}
                _ => segments.push(".."),
            },
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

/// The deduplication key for a logical asset.
///
/// Within one asset type, no two live resources share an identity: the registry
/// hands back the existing instance instead of constructing a second one.
/// Equality and hashing are structural over the variant and its payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceIdentity {
    /// A synthetic resource (generated texture, framebuffer) with a
    /// process-global id.
    Unique(u64),
    /// One file backs exactly one resource.
    PathSingle(AssetPath),
    /// One file backs several resources, e.g. the meshes of an imported model.
    /// The index tells the siblings apart.
    PathIndexed(AssetPath, u32),
}

impl ResourceIdentity {
    /// Allocates a fresh [`ResourceIdentity::Unique`] identity.
    pub fn unique() -> Self {
        Self::Unique(NEXT_UNIQUE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Creates the identity of a resource backed by the whole file at `path`.
    pub fn path_single(path: impl AsRef<Path>) -> Self {
        Self::PathSingle(AssetPath::new(path))
    }

    /// Creates the identity of the `index`-th resource inside `path`.
    pub fn path_index(path: impl AsRef<Path>, index: u32) -> Self {
        Self::PathIndexed(AssetPath::new(path), index)
    }

    /// Creates `count` sibling identities sharing `path`, indexed `0..count`.
    pub fn path_indexed(path: impl AsRef<Path>, count: u32) -> Vec<Self> {
        let path = AssetPath::new(path);
        (0..count)
            .map(|index| Self::PathIndexed(path.clone(), index))
            .collect()
    }

    /// Returns the source path, or `None` for synthetic resources.
    pub fn path(&self) -> Option<&AssetPath> {
        match self {
            Self::Unique(_) => None,
            Self::PathSingle(path) | Self::PathIndexed(path, _) => Some(path),
        }
    }

    /// Returns the sibling index of a [`ResourceIdentity::PathIndexed`] identity.
    pub fn index(&self) -> Option<u32> {
        match self {
            Self::PathIndexed(_, index) => Some(*index),
            _ => None,
        }
    }

    /// Returns `true` for synthetic resources that have no file behind them.
    pub fn is_unique(&self) -> bool {
        matches!(self, Self::Unique(_))
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unique(id) => write!(f, "unique#{id}"),
            Self::PathSingle(path) => write!(f, "{path}"),
            Self::PathIndexed(path, index) => write!(f, "{path}#{index}"),
        }
    }
}
