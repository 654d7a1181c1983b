use std::ops::Range;

use serde::Serialize;

use crate::plan::ExecutionPlan;

/// Per-stream step ranges covering a half-open program-counter range.
///
/// `stream_pc_range[i]` is the half-open index range into stream `i`'s steps
/// whose counters lie in `[start_pc, end_pc)`. An empty pair `(k, k)` means
/// the stream has no work in the region; null streams always map to `(0, 0)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgramRegion {
    pub start_pc: usize,
    pub end_pc: usize,
    pub stream_pc_range: Vec<(usize, usize)>,
}

impl ProgramRegion {
    /// Compute the region for `[start_pc, end_pc)` over every plan stream.
    ///
    /// Each stream is scanned once: the end search continues from the start
    /// index, which is valid because counters never decrease within a stream.
    pub fn resolve(plan: &ExecutionPlan, start_pc: usize, end_pc: usize) -> Self {
        let mut stream_pc_range = Vec::with_capacity(plan.streams.len());
        for stream in &plan.streams {
            let Some(stream) = stream else {
                stream_pc_range.push((0, 0));
                continue;
            };
            let steps = &stream.steps;
            let mut cur = 0;
            while cur < steps.len() && steps[cur].pc < start_pc {
                cur += 1;
            }
            let start = cur;
            while cur < steps.len() && steps[cur].pc < end_pc {
                cur += 1;
            }
            stream_pc_range.push((start, cur));
        }
        Self {
            start_pc,
            end_pc,
            stream_pc_range,
        }
    }

    pub fn matches(&self, start_pc: usize, end_pc: usize) -> bool {
        self.start_pc == start_pc && self.end_pc == end_pc
    }

    /// Step index range for one stream.
    pub fn stream_range(&self, stream: usize) -> Option<Range<usize>> {
        self.stream_pc_range
            .get(stream)
            .map(|(start, end)| *start..*end)
    }

    /// Number of steps selected across all streams.
    pub fn num_steps(&self) -> usize {
        self.stream_pc_range
            .iter()
            .map(|(start, end)| end - start)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.num_steps() == 0
    }
}
