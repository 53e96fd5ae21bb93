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

//! Type tags and the static ancestor lists that make a record reachable
//! through the interface traits its concrete type implements.

use std::any::{Any, TypeId};
use std::fmt;
use strata_core::asset::{AssetHandle, Demotion, ResidencyState, TieredResource};

/// Names a bucket of the registry: a concrete resource type or an interface
/// trait object such as `dyn GpuResident`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeTag {
    id: TypeId,
    name: &'static str,
}

impl TypeTag {
    /// The tag of `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The underlying `TypeId`.
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// The type name, for diagnostics only.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// What a sweep found when it visited one record.
pub(crate) enum Visit {
    Swept(Demotion),
    Released,
    /// The record was locked elsewhere, typically by the caller of the sweep.
    Busy,
}

/// Bytes a live record holds on each side.
pub(crate) struct Footprint {
    pub(crate) state: ResidencyState,
    pub(crate) host_bytes: u64,
    pub(crate) device_bytes: u64,
}

/// A handle whose resource type has been erased, so handles of every type and
/// view can share one map.
///
/// `is_live` and `visit` never wait for the record lock: the game loop may
/// query or sweep the registry while it holds a record guard itself.
pub(crate) trait ErasedHandle: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    /// `false` once released. A record locked elsewhere counts as live.
    fn is_live(&self) -> bool;
    fn visit(&self, now: u64) -> Visit;
    fn release(&self) -> bool;
    /// `None` once released.
    fn footprint(&self) -> Option<Footprint>;
}

impl<T: TieredResource + ?Sized + 'static> ErasedHandle for AssetHandle<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn is_live(&self) -> bool {
        self.try_lock().map_or(true, |record| !record.is_released())
    }

    fn visit(&self, now: u64) -> Visit {
        match self.try_lock() {
            Some(mut record) => match record.demote_if_stale(now) {
                Some(demotion) => Visit::Swept(demotion),
                None => Visit::Released,
            },
            None => Visit::Busy,
        }
    }

    fn release(&self) -> bool {
        AssetHandle::release(self)
    }

    fn footprint(&self) -> Option<Footprint> {
        let record = self.lock();
        let state = record.state()?;
        let resource = record.resource();
        Some(Footprint {
            state,
            host_bytes: if state >= ResidencyState::Cached {
                resource.cached_byte_size()
            } else {
                0
            },
            device_bytes: if state == ResidencyState::Active {
                resource.active_byte_size()
            } else {
                0
            },
        })
    }
}

/// One way of looking at a record: its tag plus a handle typed for that tag.
pub struct AncestorView {
    tag: TypeTag,
    handle: Box<dyn ErasedHandle>,
}

impl AncestorView {
    /// Wraps a handle, typically an unsized view produced by coercing the
    /// concrete handle's [`SharedRecord`](strata_core::asset::SharedRecord).
    pub fn new<U: TieredResource + ?Sized + 'static>(handle: AssetHandle<U>) -> Self {
        Self {
            tag: TypeTag::of::<U>(),
            handle: Box::new(handle),
        }
    }

    /// The bucket this view is stored under.
    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    pub(crate) fn into_parts(self) -> (TypeTag, Box<dyn ErasedHandle>) {
        (self.tag, self.handle)
    }
}

impl fmt::Debug for AncestorView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AncestorView").field("tag", &self.tag).finish_non_exhaustive()
    }
}

/// A concrete resource type the registry can store.
///
/// `KIND` selects the per-kind override in
/// [`ResidencyConfig`](strata_core::ResidencyConfig). `ancestor_views` lists
/// the interface traits the type is reachable through; it is fixed per type
/// and is normally generated with [`register_resource!`](crate::register_resource).
pub trait RegisteredResource: TieredResource + Sized {
    /// The configuration key for this type, e.g. `"texture"`.
    const KIND: &'static str;

    /// One view of `handle` per interface trait the type is registered under.
    /// The concrete type and `dyn TieredResource` are always added by the
    /// registry and must not be listed here.
    fn ancestor_views(handle: &AssetHandle<Self>) -> Vec<AncestorView> {
        let _ = handle;
        Vec::new()
    }
}

/// Implements [`RegisteredResource`](crate::assets::RegisteredResource) for a
/// concrete resource type.
///
/// ```ignore
/// register_resource!(Texture, kind = "texture", ancestors = [dyn GpuResident, dyn Sampled]);
/// register_resource!(SoundClip, kind = "audio");
/// ```
///
/// Each ancestor must be a trait with `TieredResource` as a supertrait that
/// the type implements.
#[macro_export]
macro_rules! register_resource {
    ($ty:ty, kind = $kind:expr, ancestors = [$(dyn $ancestor:path),* $(,)?] $(,)?) => {
        impl $crate::assets::RegisteredResource for $ty {
            const KIND: &'static str = $kind;

            fn ancestor_views(
                handle: &$crate::assets::AssetHandle<Self>,
            ) -> ::std::vec::Vec<$crate::assets::AncestorView> {
                let _ = handle;
                ::std::vec![$({
                    let shared: $crate::assets::SharedRecord<dyn $ancestor> =
                        handle.shared().clone();
                    $crate::assets::AncestorView::new(
                        $crate::assets::AssetHandle::from_shared(shared),
                    )
                }),*]
            }
        }
    };
    ($ty:ty, kind = $kind:expr $(,)?) => {
        impl $crate::assets::RegisteredResource for $ty {
            const KIND: &'static str = $kind;
        }
    };
}
