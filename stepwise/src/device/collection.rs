use std::sync::Arc;

use anyhow::{anyhow, Result};

use super::DeviceStream;

#[derive(Debug)]
enum StreamSlot {
    Empty,
    Owned(Arc<dyn DeviceStream>),
    Borrowed(Arc<dyn DeviceStream>),
}

impl StreamSlot {
    fn stream(&self) -> Option<&Arc<dyn DeviceStream>> {
        match self {
            StreamSlot::Empty => None,
            StreamSlot::Owned(stream) | StreamSlot::Borrowed(stream) => Some(stream),
        }
    }
}

/// Device streams for one run, one slot per logic stream of the plan.
///
/// A slot either owns its stream (created by a stream factory and released
/// when the collection is dropped) or borrows one supplied by the caller,
/// which is never released here.
#[derive(Debug)]
pub struct DeviceStreamCollection {
    generation: u64,
    slots: Vec<StreamSlot>,
}

impl DeviceStreamCollection {
    pub fn new(num_streams: usize, generation: u64) -> Self {
        let mut slots = Vec::with_capacity(num_streams);
        slots.resize_with(num_streams, || StreamSlot::Empty);
        Self { generation, slots }
    }

    /// Pool generation this collection was created under.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn num_streams(&self) -> usize {
        self.slots.len()
    }

    /// Install an owned stream for logic stream `idx`.
    pub fn set_device_stream(&mut self, idx: usize, stream: Arc<dyn DeviceStream>) -> Result<()> {
        let slot = self.slot_mut(idx)?;
        *slot = StreamSlot::Owned(stream);
        Ok(())
    }

    /// Install a caller-owned stream for logic stream `idx`.
    pub fn set_borrowed_device_stream(
        &mut self,
        idx: usize,
        stream: Arc<dyn DeviceStream>,
    ) -> Result<()> {
        let slot = self.slot_mut(idx)?;
        *slot = StreamSlot::Borrowed(stream);
        Ok(())
    }

    pub fn stream(&self, idx: usize) -> Option<&Arc<dyn DeviceStream>> {
        self.slots.get(idx).and_then(StreamSlot::stream)
    }

    pub fn is_owned(&self, idx: usize) -> bool {
        matches!(self.slots.get(idx), Some(StreamSlot::Owned(_)))
    }

    pub fn streams(&self) -> impl Iterator<Item = &Arc<dyn DeviceStream>> {
        self.slots.iter().filter_map(StreamSlot::stream)
    }

    /// First populated stream, used for work not tied to a logic stream.
    pub fn root_stream(&self) -> Option<&Arc<dyn DeviceStream>> {
        self.streams().next()
    }

    /// End-of-run cleanup. With `sync` every stream is flushed.
    pub fn clean_up(&self, sync: bool) -> Result<()> {
        if !sync {
            return Ok(());
        }
        for stream in self.streams() {
            stream.flush()?;
        }
        Ok(())
    }

    fn slot_mut(&mut self, idx: usize) -> Result<&mut StreamSlot> {
        let len = self.slots.len();
        self.slots
            .get_mut(idx)
            .ok_or_else(|| anyhow!("stream index {} out of range ({} streams)", idx, len))
    }
}

impl Drop for DeviceStreamCollection {
    fn drop(&mut self) {
        for slot in &self.slots {
            if let StreamSlot::Owned(stream) = slot {
                if let Err(err) = stream.release() {
                    crate::error!("failed to release stream {}: {}", stream.handle(), err);
                }
            }
        }
    }
}
