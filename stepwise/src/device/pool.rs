use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};

use crate::plan::ExecutionPlan;

use super::{CpuStreamFactory, Device, DeviceStreamCollection, StreamFactory};

/// Session-level provider of device stream collections.
///
/// Collections handed out by `acquire` carry the pool generation current at
/// creation time. `recycle` only takes a collection back while that
/// generation is still current, so a collection that outlived an
/// `invalidate` is dropped instead of re-entering the pool.
pub struct DeviceStreamPool {
    factories: HashMap<Device, Arc<dyn StreamFactory>>,
    pooled: Mutex<Vec<DeviceStreamCollection>>,
    generation: AtomicU64,
    capacity: usize,
}

impl DeviceStreamPool {
    /// Pool with the host stream factory registered.
    pub fn new(capacity: usize) -> Self {
        let mut factories: HashMap<Device, Arc<dyn StreamFactory>> = HashMap::new();
        factories.insert(Device::Cpu, Arc::new(CpuStreamFactory));
        Self {
            factories,
            pooled: Mutex::new(Vec::new()),
            generation: AtomicU64::new(0),
            capacity,
        }
    }

    /// Register or replace the factory for a device family.
    pub fn register_factory(&mut self, factory: Arc<dyn StreamFactory>) {
        self.factories.insert(factory.device(), factory);
        self.invalidate();
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn pooled_count(&self) -> usize {
        self.pooled.lock().expect("stream pool mutex poisoned").len()
    }

    /// Hand out a collection sized for `plan`, reusing a pooled one if possible.
    pub fn acquire(&self, plan: &ExecutionPlan) -> Result<DeviceStreamCollection> {
        {
            let mut pooled = self.pooled.lock().expect("stream pool mutex poisoned");
            if let Some(pos) = pooled
                .iter()
                .position(|collection| collection.num_streams() == plan.streams.len())
            {
                crate::trace!("stream_pool.reuse generation={}", self.generation());
                return Ok(pooled.swap_remove(pos));
            }
        }
        let generation = self.generation();
        let mut collection = DeviceStreamCollection::new(plan.streams.len(), generation);
        for (idx, stream) in plan.streams.iter().enumerate() {
            let Some(stream) = stream else {
                continue;
            };
            let factory = self.factories.get(&stream.device).ok_or_else(|| {
                anyhow!(
                    "no stream factory registered for device {} (stream {})",
                    stream.device.as_str(),
                    idx
                )
            })?;
            let device_stream = factory.create_stream().with_context(|| {
                format!(
                    "failed to create {} stream for logic stream {}",
                    stream.device.as_str(),
                    idx
                )
            })?;
            collection.set_device_stream(idx, device_stream)?;
        }
        crate::trace!(
            "stream_pool.create streams={} generation={}",
            plan.streams.len(),
            generation
        );
        Ok(collection)
    }

    /// Offer a collection back. Returns false when it was dropped instead.
    pub fn recycle(&self, collection: DeviceStreamCollection) -> bool {
        if collection.generation() != self.generation() {
            crate::trace!(
                "stream_pool.discard stale generation={} current={}",
                collection.generation(),
                self.generation()
            );
            return false;
        }
        let mut pooled = self.pooled.lock().expect("stream pool mutex poisoned");
        if pooled.len() >= self.capacity {
            return false;
        }
        pooled.push(collection);
        true
    }

    /// Drop pooled collections and refuse any outstanding ones on return.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.pooled
            .lock()
            .expect("stream pool mutex poisoned")
            .clear();
    }
}
