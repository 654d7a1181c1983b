use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::device::{DeviceStream, DeviceStreamCollection, Notification};
use crate::logging::Logger;
use crate::plan::{ExecutionPlan, NodeDef, StepKind, BARRIER_ARRIVALS};
use crate::session::SessionState;

use super::{ExecutionFrame, FeedsFetches, KernelContext};

/// Live state of one execution session.
///
/// Two kinds of state live here. Progress state (barrier countdowns and
/// per-stream arrivals, notifications, parked and finished streams, the
/// remaining-task count) only ever advances and survives every refresh. Call state (feed and fetch bindings,
/// fetch allocators, the logger) is replaced by [`ExecutionContext::refresh`]
/// on each resume.
pub struct ExecutionContext {
    frame: ExecutionFrame,
    logger: Logger,
    device_streams: Arc<DeviceStreamCollection>,
    notifications: Vec<Option<Arc<Notification>>>,
    count_down_barriers: Vec<AtomicI32>,
    barrier_arrived: Vec<bool>,
    parked_steps: Vec<Option<usize>>,
    remain_tasks: AtomicUsize,
    finished_streams: Vec<AtomicBool>,
    single_thread_mode: bool,
    refreshes: usize,
}

impl ExecutionContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session: &dyn SessionState,
        valid_streams: usize,
        notification_owners: &[usize],
        io: &FeedsFetches,
        num_barriers: usize,
        logger: &Logger,
        device_streams: Arc<DeviceStreamCollection>,
        single_thread_mode: bool,
    ) -> Result<Self> {
        let plan = session.execution_plan();
        let frame = ExecutionFrame::new(Arc::clone(plan), io, session.initialized_tensors())?;
        let consumers = notification_consumers(plan);
        let notifications = notification_owners
            .iter()
            .enumerate()
            .map(|(id, owner)| {
                device_streams
                    .stream(*owner)
                    .map(|stream| stream.create_notification(consumers.get(id).copied().unwrap_or(0)))
            })
            .collect();
        let count_down_barriers = (0..num_barriers)
            .map(|_| AtomicI32::new(BARRIER_ARRIVALS as i32))
            .collect();
        let finished_streams = (0..plan.streams.len())
            .map(|_| AtomicBool::new(false))
            .collect();
        Ok(Self {
            frame,
            logger: logger.clone(),
            device_streams,
            notifications,
            count_down_barriers,
            barrier_arrived: vec![false; plan.streams.len()],
            parked_steps: vec![None; plan.streams.len()],
            remain_tasks: AtomicUsize::new(valid_streams),
            finished_streams,
            single_thread_mode,
            refreshes: 0,
        })
    }

    /// Rebind this call's data. Progress state is left untouched.
    pub fn refresh(
        &mut self,
        session: &dyn SessionState,
        io: &FeedsFetches,
        logger: &Logger,
    ) -> Result<()> {
        self.frame.update_feeds(&io.feed_idxs, &io.feeds)?;
        self.frame
            .update_fetches(&io.fetch_idxs, &io.fetches, session.initialized_tensors())?;
        self.frame.set_fetch_allocators(io.fetch_allocators.clone());
        self.set_logger(logger);
        self.refreshes += 1;
        crate::logs!(
            self.logger,
            Verbose,
            "execution context refreshed ({} feeds, {} fetches, {} streams pending)",
            io.feeds.len(),
            io.fetches.len(),
            self.remain_tasks()
        );
        Ok(())
    }

    /// Number of refreshes since construction.
    pub fn refresh_count(&self) -> usize {
        self.refreshes
    }

    pub fn frame(&self) -> &ExecutionFrame {
        &self.frame
    }

    pub fn frame_mut(&mut self) -> &mut ExecutionFrame {
        &mut self.frame
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn set_logger(&mut self, logger: &Logger) {
        self.logger = logger.clone();
    }

    pub fn device_streams(&self) -> &Arc<DeviceStreamCollection> {
        &self.device_streams
    }

    pub fn device_stream(&self, stream: usize) -> Option<&Arc<dyn DeviceStream>> {
        self.device_streams.stream(stream)
    }

    pub fn single_thread_mode(&self) -> bool {
        self.single_thread_mode
    }

    pub fn num_notifications(&self) -> usize {
        self.notifications.len()
    }

    pub fn notification(&self, id: usize) -> Result<&Arc<Notification>> {
        match self.notifications.get(id) {
            Some(Some(notification)) => Ok(notification),
            Some(None) => Err(anyhow!(
                "notification {} has no owning device stream",
                id
            )),
            None => Err(anyhow!("unknown notification {}", id)),
        }
    }

    /// Record one arrival at a barrier. Returns true once every participant
    /// has arrived.
    pub fn dec_count_down_barrier(&self, barrier: usize) -> Result<bool> {
        let counter = self
            .count_down_barriers
            .get(barrier)
            .ok_or_else(|| anyhow!("unknown barrier {}", barrier))?;
        Ok(counter.fetch_sub(1, Ordering::AcqRel) - 1 <= 0)
    }

    pub fn barrier_count(&self, barrier: usize) -> Option<i32> {
        self.count_down_barriers
            .get(barrier)
            .map(|counter| counter.load(Ordering::Acquire))
    }

    pub fn barrier_open(&self, barrier: usize) -> bool {
        self.barrier_count(barrier).map_or(false, |count| count <= 0)
    }

    /// Whether `stream` has arrived at the barrier it is currently blocked on.
    pub fn barrier_arrived(&self, stream: usize) -> bool {
        self.barrier_arrived.get(stream).copied().unwrap_or(false)
    }

    pub(crate) fn set_barrier_arrived(&mut self, stream: usize, arrived: bool) {
        if let Some(flag) = self.barrier_arrived.get_mut(stream) {
            *flag = arrived;
        }
    }

    /// Step a stream stopped at because only a later resume can release it.
    pub fn parked_step(&self, stream: usize) -> Option<usize> {
        self.parked_steps.get(stream).copied().flatten()
    }

    pub(crate) fn set_parked_step(&mut self, stream: usize, step: Option<usize>) {
        if let Some(slot) = self.parked_steps.get_mut(stream) {
            *slot = step;
        }
    }

    /// Mark a stream as having executed its last step. Returns true the first
    /// time only, when it also decrements the remaining-task count.
    pub fn mark_stream_finished(&self, stream: usize) -> bool {
        let Some(flag) = self.finished_streams.get(stream) else {
            return false;
        };
        if flag.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.remain_tasks.fetch_sub(1, Ordering::AcqRel);
        true
    }

    pub fn stream_finished(&self, stream: usize) -> bool {
        self.finished_streams
            .get(stream)
            .map_or(false, |flag| flag.load(Ordering::Acquire))
    }

    pub fn remain_tasks(&self) -> usize {
        self.remain_tasks.load(Ordering::Acquire)
    }

    pub fn all_tasks_done(&self) -> bool {
        self.remain_tasks() == 0
    }

    pub(crate) fn kernel_context<'a>(&'a mut self, node: &'a NodeDef, stream: usize) -> KernelContext<'a> {
        KernelContext::new(
            node,
            &mut self.frame,
            self.device_streams.stream(stream),
            &self.logger,
        )
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("frame", &self.frame)
            .field("logger", &self.logger)
            .field("notifications", &self.notifications.len())
            .field("barriers", &self.count_down_barriers)
            .field("parked_steps", &self.parked_steps)
            .field("remain_tasks", &self.remain_tasks())
            .field("single_thread_mode", &self.single_thread_mode)
            .finish()
    }
}

fn notification_consumers(plan: &ExecutionPlan) -> Vec<usize> {
    let mut consumers = vec![0; plan.notification_owners.len()];
    for step in plan.streams.iter().flatten().flat_map(|stream| &stream.steps) {
        if let StepKind::WaitOnNotification { notification } = step.kind {
            if let Some(count) = consumers.get_mut(notification) {
                *count += 1;
            }
        }
    }
    consumers
}
