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

//! A pretend graphics device with a fixed memory budget.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strata_core::asset::UploadError;

/// Tracks device memory the way a real allocator would report it.
#[derive(Debug)]
pub struct FakeDevice {
    name: &'static str,
    budget: u64,
    used: AtomicU64,
}

impl FakeDevice {
    pub fn new(name: &'static str, budget: u64) -> Self {
        Self {
            name,
            budget,
            used: AtomicU64::new(0),
        }
    }

    /// Reserves `bytes`, failing if the budget would be exceeded.
    pub fn allocate(&self, bytes: u64) -> Result<(), UploadError> {
        self.used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                used.checked_add(bytes).filter(|total| *total <= self.budget)
            })
            .map(|_| ())
            .map_err(|used| UploadError::OutOfDeviceMemory {
                requested: bytes,
                available: self.budget.saturating_sub(used),
            })
    }

    pub fn free(&self, bytes: u64) {
        let _ = self
            .used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                Some(used.saturating_sub(bytes))
            });
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn budget(&self) -> u64 {
        self.budget
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::SeqCst)
    }
}

/// One allocation on a [`FakeDevice`], held by a resource while it is `Active`.
#[derive(Debug)]
pub struct DeviceBuffer {
    device: Arc<FakeDevice>,
    size: Option<u64>,
}

impl DeviceBuffer {
    pub fn new(device: &Arc<FakeDevice>) -> Self {
        Self {
            device: Arc::clone(device),
            size: None,
        }
    }

    pub fn upload(&mut self, bytes: u64) -> Result<(), UploadError> {
        if self.size.is_some() {
            return Err(UploadError::Rejected(format!(
                "buffer already resident on {}",
                self.device.name()
            )));
        }
        self.device.allocate(bytes)?;
        self.size = Some(bytes);
        Ok(())
    }

    /// Frees the allocation, if any.
    pub fn free(&mut self) {
        if let Some(bytes) = self.size.take() {
            self.device.free(bytes);
        }
    }

    pub fn size(&self) -> u64 {
        self.size.unwrap_or(0)
    }

    pub fn is_resident(&self) -> bool {
        self.size.is_some()
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        self.free();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_respects_budget() {
        let device = FakeDevice::new("test", 100);
        device.allocate(60).unwrap();
        assert_eq!(
            device.allocate(50),
            Err(UploadError::OutOfDeviceMemory {
                requested: 50,
                available: 40
            })
        );
        device.free(60);
        assert_eq!(device.used(), 0);
    }

    #[test]
    fn test_buffer_frees_on_drop() {
        let device = Arc::new(FakeDevice::new("test", 100));
        {
            let mut buffer = DeviceBuffer::new(&device);
            buffer.upload(30).unwrap();
            assert_eq!(device.used(), 30);
        }
        assert_eq!(device.used(), 0);
    }
}
