use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Mutex;
use uuid::Uuid;

/// Execution state of a single agent step within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Active,
    Completed,
    Error,
}

/// Observability triple attached to completed agent calls.
///
/// `execution_time_ms` is measured; the two rates are illustrative
/// telemetry supplied by the caller, not derived from the call itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub execution_time_ms: u64,
    pub success_rate: f64,
    pub hallucination_score: f64,
}

/// One agent call's progress record within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStep {
    pub id: String,
    pub agent_name: String,
    pub action: String,
    pub status: StepStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<AgentMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intermediate_output: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub detailed_logs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citation: Option<String>,
}

/// Step fields supplied by the caller; id and timestamp are generated on push.
#[derive(Debug, Clone)]
pub struct NewStep {
    pub agent_name: String,
    pub action: String,
    pub status: StepStatus,
    pub description: Option<String>,
}

impl NewStep {
    /// An `active` step, the normal shape pushed at the start of an agent call.
    pub fn active(
        agent_name: impl Into<String>,
        action: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            action: action.into(),
            status: StepStatus::Active,
            description: Some(description.into()),
        }
    }
}

/// Partial update merged into the tail step only.
#[derive(Debug, Clone, Default)]
pub struct StepPatch {
    pub status: Option<StepStatus>,
    pub description: Option<String>,
    pub metrics: Option<AgentMetrics>,
    pub intermediate_output: Option<Value>,
    pub detailed_logs: Option<Vec<String>>,
    pub citation: Option<String>,
}

impl StepPatch {
    pub fn status(status: StepStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn completed() -> Self {
        Self::status(StepStatus::Completed)
    }

    pub fn failed() -> Self {
        Self::status(StepStatus::Error)
    }

    pub fn with_metrics(mut self, metrics: AgentMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.intermediate_output = Some(output);
        self
    }
}

/// Append-only, mutable-tail trace of an in-progress or completed run.
///
/// Only the most recently pushed step is ever patched; everything before
/// the tail is immutable history. The sequence is cleared at the start of
/// every new orchestrated operation via [`StepTrace::begin`].
pub struct StepTrace {
    steps: Mutex<Vec<AgentStep>>,
}

impl StepTrace {
    pub fn new() -> Self {
        Self {
            steps: Mutex::new(Vec::new()),
        }
    }

    /// Clear the step sequence at the start of a new run.
    pub fn begin(&self) {
        self.steps.lock().unwrap().clear();
    }

    /// Append a step with a generated id and timestamp. Returns the id.
    pub fn push(&self, step: NewStep) -> String {
        let id = Uuid::new_v4().to_string();
        self.steps.lock().unwrap().push(AgentStep {
            id: id.clone(),
            agent_name: step.agent_name,
            action: step.action,
            status: step.status,
            timestamp: Utc::now(),
            description: step.description,
            metrics: None,
            intermediate_output: None,
            detailed_logs: Vec::new(),
            citation: None,
        });
        id
    }

    /// Merge a partial update into the last step only. No-op when empty.
    pub fn patch_tail(&self, patch: StepPatch) {
        let mut steps = self.steps.lock().unwrap();
        let Some(tail) = steps.last_mut() else {
            return;
        };
        if let Some(status) = patch.status {
            tail.status = status;
        }
        if let Some(description) = patch.description {
            tail.description = Some(description);
        }
        if let Some(metrics) = patch.metrics {
            tail.metrics = Some(metrics);
        }
        if let Some(output) = patch.intermediate_output {
            tail.intermediate_output = Some(output);
        }
        if let Some(logs) = patch.detailed_logs {
            tail.detailed_logs = logs;
        }
        if let Some(citation) = patch.citation {
            tail.citation = Some(citation);
        }
    }

    /// Owned copy of the sequence in append order.
    pub fn snapshot(&self) -> Vec<AgentStep> {
        self.steps.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.steps.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for StepTrace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_appends_in_order() {
        let trace = StepTrace::new();
        trace.push(NewStep::active("Parser", "Ingestion", "reading"));
        trace.push(NewStep::active("Strategist", "Planning", "thinking"));

        let steps = trace.snapshot();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].agent_name, "Parser");
        assert_eq!(steps[1].agent_name, "Strategist");
        assert_eq!(steps[1].status, StepStatus::Active);
    }

    #[test]
    fn patch_tail_touches_only_last_element() {
        let trace = StepTrace::new();
        trace.push(NewStep::active("Parser", "Ingestion", "reading"));
        let first = trace.snapshot()[0].clone();
        trace.push(NewStep::active("Verifier", "Grounding", "searching"));

        trace.patch_tail(StepPatch::completed().with_metrics(AgentMetrics {
            execution_time_ms: 420,
            success_rate: 0.98,
            hallucination_score: 0.01,
        }));

        let steps = trace.snapshot();
        assert_eq!(steps.len(), 2);
        // earlier entry untouched
        assert_eq!(steps[0].status, first.status);
        assert_eq!(steps[0].id, first.id);
        assert!(steps[0].metrics.is_none());
        // tail updated in place
        assert_eq!(steps[1].status, StepStatus::Completed);
        assert_eq!(steps[1].metrics.as_ref().unwrap().execution_time_ms, 420);
    }

    #[test]
    fn patch_tail_on_empty_is_noop() {
        let trace = StepTrace::new();
        trace.patch_tail(StepPatch::failed());
        assert!(trace.is_empty());
    }

    #[test]
    fn begin_clears_previous_run() {
        let trace = StepTrace::new();
        trace.push(NewStep::active("Parser", "Ingestion", "reading"));
        trace.begin();
        assert!(trace.is_empty());
        trace.push(NewStep::active("Matcher", "Placement", "matching"));
        assert_eq!(trace.len(), 1);
    }
}
