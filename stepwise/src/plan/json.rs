use anyhow::Result;
use serde_json::Value;

use super::{validate_plan, ExecutionPlan};

pub struct PlanSerialize;

impl PlanSerialize {
    pub fn json(plan: &ExecutionPlan) -> Result<Value> {
        Ok(serde_json::to_value(plan)?)
    }

    pub fn to_string_pretty(plan: &ExecutionPlan) -> Result<String> {
        Ok(serde_json::to_string_pretty(plan)?)
    }
}

pub struct PlanDeserialize;

impl PlanDeserialize {
    /// Decode and validate a plan.
    pub fn from_json(value: Value) -> Result<ExecutionPlan> {
        let plan: ExecutionPlan = serde_json::from_value(value)?;
        validate_plan(&plan)?;
        Ok(plan)
    }

    pub fn from_str(text: &str) -> Result<ExecutionPlan> {
        let plan: ExecutionPlan = serde_json::from_str(text)?;
        validate_plan(&plan)?;
        Ok(plan)
    }
}
