use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};

use super::{Device, Notification};

pub type StreamHandle = u64;

static NEXT_STREAM_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique stream handle.
pub fn next_stream_handle() -> StreamHandle {
    NEXT_STREAM_HANDLE.fetch_add(1, Ordering::Relaxed)
}

/// One hardware execution queue.
///
/// Implementations wrap the driver-level stream object; the runtime only
/// needs notification creation, cross-stream waits, flushing and release.
pub trait DeviceStream: Send + Sync + fmt::Debug {
    fn device(&self) -> Device;

    fn handle(&self) -> StreamHandle;

    fn create_notification(&self, num_consumers: usize) -> Arc<Notification> {
        Arc::new(Notification::new(self.handle(), num_consumers))
    }

    /// Make this stream wait until `notification` has been activated.
    fn wait_on(&self, notification: &Notification) -> Result<()> {
        if !notification.is_activated() {
            return Err(anyhow!(
                "stream {} cannot wait on inactive notification owned by stream {}",
                self.handle(),
                notification.owner()
            ));
        }
        notification.record_wait();
        Ok(())
    }

    /// Block until all work queued on this stream has completed.
    fn flush(&self) -> Result<()>;

    /// Return driver resources. Called once by the owning collection.
    fn release(&self) -> Result<()> {
        Ok(())
    }
}

/// Creates streams for one device family.
pub trait StreamFactory: Send + Sync {
    fn device(&self) -> Device;

    fn create_stream(&self) -> Result<Arc<dyn DeviceStream>>;
}

/// Host stream. Work submitted to it runs inline, so flushing only counts.
#[derive(Debug)]
pub struct CpuStream {
    handle: StreamHandle,
    flushes: AtomicUsize,
}

impl CpuStream {
    pub fn new() -> Self {
        Self {
            handle: next_stream_handle(),
            flushes: AtomicUsize::new(0),
        }
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::Acquire)
    }
}

impl Default for CpuStream {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceStream for CpuStream {
    fn device(&self) -> Device {
        Device::Cpu
    }

    fn handle(&self) -> StreamHandle {
        self.handle
    }

    fn flush(&self) -> Result<()> {
        self.flushes.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct CpuStreamFactory;

impl StreamFactory for CpuStreamFactory {
    fn device(&self) -> Device {
        Device::Cpu
    }

    fn create_stream(&self) -> Result<Arc<dyn DeviceStream>> {
        Ok(Arc::new(CpuStream::new()))
    }
}
