use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

use crate::plan::ExecutionPlan;
use crate::tensor::{DType, SharedTensor, TensorValue};

use super::FeedsFetches;

/// Allocates the output tensor for one fetch given its dtype and shape.
pub type CustomAllocator = Arc<dyn Fn(DType, &[usize]) -> Result<SharedTensor> + Send + Sync>;

/// Value slots for every value of the plan, plus the current feed and fetch
/// bindings.
///
/// Slots persist across resumes: a value produced in one region stays
/// available to later regions. Rebinding only touches the slots named by the
/// new feeds and fetches.
pub struct ExecutionFrame {
    plan: Arc<ExecutionPlan>,
    values: Vec<Option<SharedTensor>>,
    initializers: HashSet<usize>,
    feed_idxs: Vec<usize>,
    fetch_idxs: Vec<usize>,
    fetch_allocators: HashMap<usize, CustomAllocator>,
}

impl ExecutionFrame {
    pub fn new(
        plan: Arc<ExecutionPlan>,
        io: &FeedsFetches,
        initializers: &HashMap<usize, SharedTensor>,
    ) -> Result<Self> {
        let mut values = vec![None; plan.values.len()];
        for (idx, tensor) in initializers {
            let slot = values
                .get_mut(*idx)
                .ok_or_else(|| anyhow!("initializer index {} out of range", idx))?;
            *slot = Some(Arc::clone(tensor));
        }
        let mut frame = Self {
            plan,
            values,
            initializers: initializers.keys().copied().collect(),
            feed_idxs: Vec::new(),
            fetch_idxs: Vec::new(),
            fetch_allocators: HashMap::new(),
        };
        frame.update_feeds(&io.feed_idxs, &io.feeds)?;
        frame.update_fetches(&io.fetch_idxs, &io.fetches, initializers)?;
        frame.set_fetch_allocators(io.fetch_allocators.clone());
        Ok(frame)
    }

    /// Bind feed tensors to their value slots.
    ///
    /// All feeds are checked before any slot is written.
    pub fn update_feeds(&mut self, feed_idxs: &[usize], feeds: &[SharedTensor]) -> Result<()> {
        if feed_idxs.len() != feeds.len() {
            return Err(anyhow!(
                "feed index count {} does not match feed count {}",
                feed_idxs.len(),
                feeds.len()
            ));
        }
        for (idx, feed) in feed_idxs.iter().zip(feeds) {
            self.check_index(*idx)?;
            if self.initializers.contains(idx) {
                return Err(anyhow!(
                    "value {} ({}) is an initializer and cannot be fed",
                    idx,
                    self.value_name(*idx)
                ));
            }
            let value = feed.lock().expect("tensor mutex poisoned");
            self.check_declared(*idx, value.dtype(), value.shape())
                .with_context(|| format!("feed {} rejected", self.value_name(*idx)))?;
        }
        for (idx, feed) in feed_idxs.iter().zip(feeds) {
            self.values[*idx] = Some(Arc::clone(feed));
        }
        self.feed_idxs = feed_idxs.to_vec();
        Ok(())
    }

    /// Bind fetch buffers to their value slots.
    ///
    /// A provided buffer replaces the slot. A fetch of an initializer receives
    /// a copy of it, into the provided buffer when there is one. A fetch of a
    /// fed value keeps the feed bound and copies it into the buffer. A fetch
    /// without a buffer leaves the slot alone so the run (or an earlier run)
    /// produces it.
    pub fn update_fetches(
        &mut self,
        fetch_idxs: &[usize],
        fetches: &[Option<SharedTensor>],
        initializers: &HashMap<usize, SharedTensor>,
    ) -> Result<()> {
        if fetch_idxs.len() != fetches.len() {
            return Err(anyhow!(
                "fetch index count {} does not match fetch count {}",
                fetch_idxs.len(),
                fetches.len()
            ));
        }
        for (idx, fetch) in fetch_idxs.iter().zip(fetches) {
            self.check_index(*idx)?;
            if let Some(buffer) = fetch {
                let value = buffer.lock().expect("tensor mutex poisoned");
                self.check_declared(*idx, value.dtype(), value.shape())
                    .with_context(|| format!("fetch buffer for {} rejected", self.value_name(*idx)))?;
                let source = if self.feed_idxs.contains(idx) {
                    self.values[*idx].as_ref()
                } else {
                    initializers.get(idx)
                };
                if let Some(init) = source {
                    if !Arc::ptr_eq(init, buffer) {
                        let init = init.lock().expect("tensor mutex poisoned");
                        value.ensure_matches(init.dtype(), init.shape()).with_context(|| {
                            format!("fetch buffer for {} does not match its source", self.value_name(*idx))
                        })?;
                    }
                }
            }
        }
        for (idx, fetch) in fetch_idxs.iter().zip(fetches) {
            if self.feed_idxs.contains(idx) {
                if let (Some(buffer), Some(feed)) = (fetch, &self.values[*idx]) {
                    if !Arc::ptr_eq(feed, buffer) {
                        let source = feed.lock().expect("tensor mutex poisoned").clone();
                        buffer
                            .lock()
                            .expect("tensor mutex poisoned")
                            .copy_from(&source)?;
                    }
                }
                continue;
            }
            let initializer = initializers.get(idx);
            match (fetch, initializer) {
                (Some(buffer), Some(init)) => {
                    if !Arc::ptr_eq(init, buffer) {
                        let source = init.lock().expect("tensor mutex poisoned").clone();
                        buffer
                            .lock()
                            .expect("tensor mutex poisoned")
                            .copy_from(&source)?;
                    }
                    self.values[*idx] = Some(Arc::clone(buffer));
                }
                (Some(buffer), None) => {
                    self.values[*idx] = Some(Arc::clone(buffer));
                }
                (None, Some(init)) => {
                    let copy = init.lock().expect("tensor mutex poisoned").clone();
                    self.values[*idx] = Some(copy.into_shared());
                }
                (None, None) => {}
            }
        }
        self.fetch_idxs = fetch_idxs.to_vec();
        Ok(())
    }

    /// Replace the per-fetch allocators, keyed by fetch position.
    pub fn set_fetch_allocators(&mut self, allocators: HashMap<usize, CustomAllocator>) {
        self.fetch_allocators = allocators;
    }

    /// Storage for an output value.
    ///
    /// An already bound slot (a caller buffer or a value from an earlier run)
    /// is reused when dtype and shape agree. Otherwise a fetch with a custom
    /// allocator gets its tensor from it, and anything else is zero-filled.
    pub fn allocate_output(&mut self, idx: usize, dtype: DType, shape: &[usize]) -> Result<SharedTensor> {
        self.check_index(idx)?;
        self.check_declared(idx, dtype, shape)
            .with_context(|| format!("output {} rejected", self.value_name(idx)))?;
        if let Some(existing) = &self.values[idx] {
            existing
                .lock()
                .expect("tensor mutex poisoned")
                .ensure_matches(dtype, shape)
                .with_context(|| format!("bound buffer for {} rejected", self.value_name(idx)))?;
            return Ok(Arc::clone(existing));
        }
        let allocator = self
            .fetch_idxs
            .iter()
            .position(|fetch| *fetch == idx)
            .and_then(|pos| self.fetch_allocators.get(&pos));
        let tensor = match allocator {
            Some(allocator) => {
                let tensor = allocator(dtype, shape).with_context(|| {
                    format!("custom allocator for {} failed", self.value_name(idx))
                })?;
                tensor
                    .lock()
                    .expect("tensor mutex poisoned")
                    .ensure_matches(dtype, shape)
                    .with_context(|| {
                        format!("custom allocator for {} returned a wrong buffer", self.value_name(idx))
                    })?;
                tensor
            }
            None => TensorValue::zeros(dtype, shape).into_shared(),
        };
        self.values[idx] = Some(Arc::clone(&tensor));
        Ok(tensor)
    }

    /// Bound value for a slot.
    pub fn value(&self, idx: usize) -> Result<SharedTensor> {
        self.check_index(idx)?;
        self.values[idx].clone().ok_or_else(|| {
            anyhow!(
                "value {} ({}) has not been fed or produced",
                idx,
                self.value_name(idx)
            )
        })
    }

    pub fn is_bound(&self, idx: usize) -> bool {
        matches!(self.values.get(idx), Some(Some(_)))
    }

    /// Current values of the fetches, in fetch order.
    pub fn fetch_values(&self) -> Vec<Option<SharedTensor>> {
        self.fetch_idxs
            .iter()
            .map(|idx| self.values[*idx].clone())
            .collect()
    }

    pub fn feed_idxs(&self) -> &[usize] {
        &self.feed_idxs
    }

    pub fn fetch_idxs(&self) -> &[usize] {
        &self.fetch_idxs
    }

    pub fn num_values(&self) -> usize {
        self.values.len()
    }

    fn value_name(&self, idx: usize) -> &str {
        self.plan
            .values
            .get(idx)
            .map(|info| info.name.as_str())
            .unwrap_or("?")
    }

    fn check_index(&self, idx: usize) -> Result<()> {
        if idx >= self.values.len() {
            return Err(anyhow!(
                "value index {} out of range ({} values)",
                idx,
                self.values.len()
            ));
        }
        Ok(())
    }

    fn check_declared(&self, idx: usize, dtype: DType, shape: &[usize]) -> Result<()> {
        let info = &self.plan.values[idx];
        if info.dtype != dtype {
            return Err(anyhow!(
                "dtype mismatch for {}: declared {:?}, got {:?}",
                info.name,
                info.dtype,
                dtype
            ));
        }
        if let Some(declared) = &info.shape {
            if declared.as_slice() != shape {
                return Err(anyhow!(
                    "shape mismatch for {}: declared {:?}, got {:?}",
                    info.name,
                    declared,
                    shape
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ExecutionFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionFrame")
            .field("num_values", &self.values.len())
            .field("feed_idxs", &self.feed_idxs)
            .field("fetch_idxs", &self.fetch_idxs)
            .field("fetch_allocators", &self.fetch_allocators.len())
            .finish()
    }
}
