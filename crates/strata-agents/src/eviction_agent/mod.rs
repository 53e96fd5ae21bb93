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

//! Acts as the agent for residency eviction.
//!
//! Scanning every live resource each frame would scale with asset count, while
//! idle thresholds are measured in seconds. The [`EvictionScheduler`] is
//! ticked once per frame and only sweeps the registry when its period has
//! elapsed.

mod scheduler;

pub use scheduler::*;
