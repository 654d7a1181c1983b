#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use stepwise::{
    DType, Device, DeviceStream, ExecutionPlan, LogicStream, Logger, MemorySink, NodeDef,
    OpKernelRegistry, PlanBuilder, Session, SessionOptions, Severity, Step, StepKind,
    StreamFactory, StreamHandle, TensorValue,
};

/// Plan with launch steps only, one node per step, at the given counters.
pub fn plan_with_pcs(streams: &[&[usize]]) -> ExecutionPlan {
    let mut plan = ExecutionPlan::default();
    for (stream_idx, pcs) in streams.iter().enumerate() {
        let mut logic = LogicStream::new(Device::Cpu);
        for (step_idx, pc) in pcs.iter().enumerate() {
            plan.nodes.push(NodeDef {
                name: format!("s{}_n{}", stream_idx, step_idx),
                op: "record".to_string(),
                inputs: Vec::new(),
                outputs: Vec::new(),
            });
            logic.steps.push(Step {
                pc: *pc,
                kind: StepKind::LaunchKernel {
                    node: plan.nodes.len() - 1,
                },
            });
        }
        plan.streams.push(Some(logic));
    }
    plan
}

/// Stream A at counters 0,2,4,6 and stream B at 1,3,5.
pub fn two_stream_plan() -> ExecutionPlan {
    plan_with_pcs(&[&[0, 2, 4, 6], &[1, 3, 5]])
}

/// Two streams meeting at barrier 0 and linked by notification 0.
///
/// stream 0: pc0 a, pc1 arrive b0, pc4 c, pc6 activate n0
/// stream 1: pc2 d, pc3 arrive b0, pc5 e, pc7 wait n0, pc8 f
pub fn barrier_plan() -> Result<ExecutionPlan> {
    let mut builder = PlanBuilder::new();
    let s0 = builder.stream(Device::Cpu);
    let s1 = builder.stream(Device::Cpu);
    let b0 = builder.barrier();
    let n0 = builder.notification(s0);
    let a = builder.node("a", "record", &[], &[]);
    let c = builder.node("c", "record", &[], &[]);
    let d = builder.node("d", "record", &[], &[]);
    let e = builder.node("e", "record", &[], &[]);
    let f = builder.node("f", "record", &[], &[]);
    builder
        .launch(s0, 0, a)
        .arrive(s0, 1, b0)
        .launch(s0, 4, c)
        .activate(s0, 6, n0)
        .launch(s1, 2, d)
        .arrive(s1, 3, b0)
        .launch(s1, 5, e)
        .wait(s1, 7, n0)
        .launch(s1, 8, f);
    builder.build()
}

/// Values flow across streams: h = x + w on stream 0, y = 2 * h on stream 1.
///
/// stream 0: pc0 add, pc1 activate n0
/// stream 1: pc2 wait n0, pc3 scale
pub fn dataflow_plan() -> Result<ExecutionPlan> {
    let mut builder = PlanBuilder::new();
    let s0 = builder.stream(Device::Cpu);
    let s1 = builder.stream(Device::Cpu);
    let x = builder.value("x", DType::F32, Some(&[2]));
    let w = builder.value("w", DType::F32, Some(&[2]));
    let h = builder.value("h", DType::F32, Some(&[2]));
    let y = builder.value("y", DType::F32, Some(&[2]));
    let n0 = builder.notification(s0);
    let add = builder.node("add", "add", &[x, w], &[h]);
    let scale = builder.node("scale", "scale2", &[h], &[y]);
    builder
        .launch(s0, 0, add)
        .activate(s0, 1, n0)
        .wait(s1, 2, n0)
        .launch(s1, 3, scale);
    builder.build()
}

/// Kernels for the test plans. `record` appends the node name to `log`.
pub fn test_kernels(log: Arc<Mutex<Vec<String>>>) -> OpKernelRegistry {
    let mut registry = OpKernelRegistry::new();
    registry.register_fn("record", move |ctx| {
        log.lock()
            .map_err(|_| anyhow!("log poisoned"))?
            .push(ctx.node().name.clone());
        Ok(())
    });
    registry.register_fn("add", |ctx| {
        let lhs = ctx.input_value(0)?;
        let rhs = ctx.input_value(1)?;
        let data = lhs
            .typed::<f32>()?
            .iter()
            .zip(rhs.typed::<f32>()?)
            .map(|(a, b)| a + b)
            .collect::<Vec<_>>();
        ctx.set_output(0, TensorValue::from_vec(lhs.shape(), data)?)
    });
    registry.register_fn("scale2", |ctx| {
        let input = ctx.input_value(0)?;
        let data = input
            .typed::<f32>()?
            .iter()
            .map(|v| v * 2.0)
            .collect::<Vec<_>>();
        ctx.set_output(0, TensorValue::from_vec(input.shape(), data)?)
    });
    registry
}

/// Session with the test kernels registered.
pub fn session_with_kernels(plan: ExecutionPlan) -> Result<(Session, Arc<Mutex<Vec<String>>>)> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut session = Session::new(plan, SessionOptions::default())?;
    session.register_kernel_registry(Arc::new(test_kernels(Arc::clone(&log))));
    Ok((session, log))
}

pub fn recorded(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
    log.lock().expect("log poisoned").clone()
}

pub fn memory_logger(id: &str) -> (Logger, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let logger = Logger::new(id, Severity::Verbose, sink.clone());
    (logger, sink)
}

pub fn f32_tensor(data: &[f32]) -> Result<TensorValue> {
    TensorValue::from_vec(&[data.len()], data.to_vec())
}

/// Stream that reports flushes and releases to its factory.
#[derive(Debug)]
pub struct CountingStream {
    handle: StreamHandle,
    flushed: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl DeviceStream for CountingStream {
    fn device(&self) -> Device {
        Device::Cpu
    }

    fn handle(&self) -> StreamHandle {
        self.handle
    }

    fn flush(&self) -> Result<()> {
        self.flushed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release(&self) -> Result<()> {
        self.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Host stream factory that counts created, flushed and released streams.
#[derive(Debug, Default)]
pub struct CountingStreamFactory {
    pub created: AtomicUsize,
    pub flushed: Arc<AtomicUsize>,
    pub released: Arc<AtomicUsize>,
}

impl CountingStreamFactory {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn flushed(&self) -> usize {
        self.flushed.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl StreamFactory for CountingStreamFactory {
    fn device(&self) -> Device {
        Device::Cpu
    }

    fn create_stream(&self) -> Result<Arc<dyn DeviceStream>> {
        let handle = 10_000 + self.created.fetch_add(1, Ordering::SeqCst) as StreamHandle;
        Ok(Arc::new(CountingStream {
            handle,
            flushed: Arc::clone(&self.flushed),
            released: Arc::clone(&self.released),
        }))
    }
}

/// Factory whose streams cannot be created.
#[derive(Debug)]
pub struct FailingStreamFactory(pub Device);

impl StreamFactory for FailingStreamFactory {
    fn device(&self) -> Device {
        self.0
    }

    fn create_stream(&self) -> Result<Arc<dyn DeviceStream>> {
        Err(anyhow!("device out of streams"))
    }
}
