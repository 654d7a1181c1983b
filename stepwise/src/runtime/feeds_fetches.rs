use std::collections::HashMap;
use std::fmt;

use anyhow::{anyhow, Result};

use crate::plan::ExecutionPlan;
use crate::tensor::{SharedTensor, TensorValue};

use super::CustomAllocator;

/// Feed and fetch names resolved to value indices once per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedsFetchesInfo {
    feed_names: Vec<String>,
    fetch_names: Vec<String>,
    feed_idxs: Vec<usize>,
    fetch_idxs: Vec<usize>,
}

impl FeedsFetchesInfo {
    pub fn new(plan: &ExecutionPlan, feed_names: &[&str], fetch_names: &[&str]) -> Result<Self> {
        let resolve = |kind: &str, name: &str| {
            plan.value_index(name)
                .ok_or_else(|| anyhow!("unknown {} name: {}", kind, name))
        };
        let feed_idxs = feed_names
            .iter()
            .map(|name| resolve("feed", name))
            .collect::<Result<Vec<_>>>()?;
        let fetch_idxs = fetch_names
            .iter()
            .map(|name| resolve("fetch", name))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            feed_names: feed_names.iter().map(|name| name.to_string()).collect(),
            fetch_names: fetch_names.iter().map(|name| name.to_string()).collect(),
            feed_idxs,
            fetch_idxs,
        })
    }

    pub fn feed_names(&self) -> &[String] {
        &self.feed_names
    }

    pub fn fetch_names(&self) -> &[String] {
        &self.fetch_names
    }

    pub fn feed_idxs(&self) -> &[usize] {
        &self.feed_idxs
    }

    pub fn fetch_idxs(&self) -> &[usize] {
        &self.fetch_idxs
    }

    /// Pair feed tensors with the resolved indices. Fetch buffers start empty.
    pub fn bind(&self, feeds: Vec<SharedTensor>) -> Result<FeedsFetches> {
        if feeds.len() != self.feed_idxs.len() {
            return Err(anyhow!(
                "expected {} feeds ({:?}), got {}",
                self.feed_idxs.len(),
                self.feed_names,
                feeds.len()
            ));
        }
        Ok(FeedsFetches::new(
            self.feed_idxs.clone(),
            feeds,
            self.fetch_idxs.clone(),
        ))
    }
}

/// The data one run call binds into the execution frame.
#[derive(Clone, Default)]
pub struct FeedsFetches {
    pub feed_idxs: Vec<usize>,
    pub feeds: Vec<SharedTensor>,
    pub fetch_idxs: Vec<usize>,
    /// Caller-provided output buffers, `None` to let the run allocate.
    pub fetches: Vec<Option<SharedTensor>>,
    /// Allocators for fetch outputs, keyed by fetch position.
    pub fetch_allocators: HashMap<usize, CustomAllocator>,
}

impl FeedsFetches {
    pub fn new(feed_idxs: Vec<usize>, feeds: Vec<SharedTensor>, fetch_idxs: Vec<usize>) -> Self {
        let fetches = vec![None; fetch_idxs.len()];
        Self {
            feed_idxs,
            feeds,
            fetch_idxs,
            fetches,
            fetch_allocators: HashMap::new(),
        }
    }

    /// Provide a pre-allocated output buffer for fetch `pos`.
    pub fn with_fetch_buffer(mut self, pos: usize, buffer: SharedTensor) -> Result<Self> {
        let slot = self
            .fetches
            .get_mut(pos)
            .ok_or_else(|| anyhow!("fetch position {} out of range", pos))?;
        *slot = Some(buffer);
        Ok(self)
    }

    pub fn with_fetch_allocator(mut self, pos: usize, allocator: CustomAllocator) -> Self {
        self.fetch_allocators.insert(pos, allocator);
        self
    }

    pub fn fetch(&self, pos: usize) -> Option<&SharedTensor> {
        self.fetches.get(pos).and_then(Option::as_ref)
    }

    /// Snapshot of the value produced for fetch `pos`.
    pub fn fetch_value(&self, pos: usize) -> Result<TensorValue> {
        let tensor = self
            .fetch(pos)
            .ok_or_else(|| anyhow!("fetch {} has not been produced", pos))?;
        let value = tensor.lock().expect("tensor mutex poisoned").clone();
        Ok(value)
    }
}

impl fmt::Debug for FeedsFetches {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let produced = self.fetches.iter().filter(|fetch| fetch.is_some()).count();
        f.debug_struct("FeedsFetches")
            .field("feed_idxs", &self.feed_idxs)
            .field("num_feeds", &self.feeds.len())
            .field("fetch_idxs", &self.fetch_idxs)
            .field("bound_fetches", &produced)
            .field("fetch_allocators", &self.fetch_allocators.len())
            .finish()
    }
}
