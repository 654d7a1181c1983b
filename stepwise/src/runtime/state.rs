use std::sync::Arc;

use anyhow::{anyhow, Result};
use uuid::Uuid;

use crate::device::DeviceStreamCollection;
use crate::logging::Logger;
use crate::plan::ExecutionPlan;
use crate::session::SessionState;

use super::{ExecutionContext, FeedsFetches, ProgramRegion};

/// State carried between the resumes of one partial-execution session.
///
/// The caller sets a program-counter range before each resume and then asks
/// for the region, the device streams and the execution context, in that
/// order. Regions are cached by exact range. The device stream collection
/// is acquired once and is never handed back to the session pool: it is
/// released together with this state.
pub struct PartialGraphExecutionState {
    id: Uuid,
    program_counter_start: usize,
    program_counter_end: usize,
    program_regions: Vec<ProgramRegion>,
    region_computations: usize,
    execution_context: Option<ExecutionContext>,
    device_stream_collection: Option<Arc<DeviceStreamCollection>>,
}

impl PartialGraphExecutionState {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            program_counter_start: 0,
            program_counter_end: 0,
            program_regions: Vec::new(),
            region_computations: 0,
            execution_context: None,
            device_stream_collection: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn program_counter_start(&self) -> usize {
        self.program_counter_start
    }

    pub fn program_counter_end(&self) -> usize {
        self.program_counter_end
    }

    /// Set the half-open range the next resume covers.
    pub fn set_program_counter_range(&mut self, start: usize, end: usize) -> Result<()> {
        if start > end {
            return Err(anyhow!(
                "invalid program counter range [{}, {}): start is past end",
                start,
                end
            ));
        }
        self.program_counter_start = start;
        self.program_counter_end = end;
        Ok(())
    }

    /// Region for the current range, computed on first request and cached.
    pub fn program_regions(&mut self, plan: &ExecutionPlan) -> &ProgramRegion {
        let (start, end) = (self.program_counter_start, self.program_counter_end);
        if let Some(pos) = self
            .program_regions
            .iter()
            .position(|region| region.matches(start, end))
        {
            return &self.program_regions[pos];
        }
        let region = ProgramRegion::resolve(plan, start, end);
        self.region_computations += 1;
        crate::trace!(
            "partial_state.region id={} range=[{}, {}) steps={}",
            self.id,
            start,
            end,
            region.num_steps()
        );
        self.program_regions.push(region);
        &self.program_regions[self.program_regions.len() - 1]
    }

    /// Every region computed so far, in computation order.
    pub fn cached_regions(&self) -> &[ProgramRegion] {
        &self.program_regions
    }

    /// How many times a region had to be computed rather than found in cache.
    pub fn region_computations(&self) -> usize {
        self.region_computations
    }

    /// Device streams for this state, acquired from the session on first use.
    pub fn device_stream_collection(
        &mut self,
        session: &dyn SessionState,
    ) -> Result<Arc<DeviceStreamCollection>> {
        if let Some(collection) = &self.device_stream_collection {
            return Ok(Arc::clone(collection));
        }
        // This state may outlive the session that created it, so the
        // collection is never recycled into the session pool.
        let collection = Arc::new(session.acquire_device_stream_collection()?);
        self.device_stream_collection = Some(Arc::clone(&collection));
        Ok(collection)
    }

    pub fn has_device_stream_collection(&self) -> bool {
        self.device_stream_collection.is_some()
    }

    /// Build the execution context on the first resume, refresh it afterwards.
    pub fn execution_context(
        &mut self,
        session: &dyn SessionState,
        io: &FeedsFetches,
        logger: &Logger,
    ) -> Result<&mut ExecutionContext> {
        let device_streams = self.device_stream_collection(session)?;
        if let Some(ctx) = self.execution_context.as_mut() {
            ctx.refresh(session, io, logger)?;
        } else {
            let plan = session.execution_plan();
            let valid_streams = plan.valid_stream_count();
            crate::logs!(logger, Info, "Number of streams: {}", valid_streams);
            let ctx = ExecutionContext::new(
                session,
                valid_streams,
                &plan.notification_owners,
                io,
                plan.num_barriers,
                logger,
                device_streams,
                // resumable runs always step streams from one thread
                true,
            )?;
            self.execution_context = Some(ctx);
        }
        self.execution_context
            .as_mut()
            .ok_or_else(|| anyhow!("execution context was not initialised"))
    }

    pub fn has_execution_context(&self) -> bool {
        self.execution_context.is_some()
    }
}

impl Default for PartialGraphExecutionState {
    fn default() -> Self {
        Self::new()
    }
}
