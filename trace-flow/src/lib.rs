pub mod audit;
pub mod error;
pub mod runner;
pub mod store;
pub mod trace;

// Re-export commonly used types
pub use audit::{AuditEntry, AuditStatus, AuditTrail};
pub use error::{FlowError, Result};
pub use runner::{RunGuard, RunRegistry};
pub use store::{Envelope, FileKvStore, InMemoryKvStore, KvStore, SCHEMA_VERSION, load_or, save};
pub use trace::{AgentMetrics, AgentStep, NewStep, StepPatch, StepStatus, StepTrace};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_tail_invariant_across_pushes_and_patches() {
        let trace = StepTrace::new();
        let snapshots: Vec<_> = ["Parser", "Verifier", "Strategist"]
            .iter()
            .map(|agent| {
                trace.push(NewStep::active(*agent, "step", "working"));
                trace.snapshot().last().unwrap().clone()
            })
            .collect();
        trace.patch_tail(StepPatch::completed());
        trace.patch_tail(StepPatch {
            citation: Some("https://example.org".to_string()),
            ..Default::default()
        });

        let steps = trace.snapshot();
        assert_eq!(steps.len(), 3);
        for (step, after_push) in steps.iter().zip(&snapshots).take(2) {
            assert_eq!(step.status, after_push.status);
            assert_eq!(step.citation, after_push.citation);
        }
        assert_eq!(steps[2].status, StepStatus::Completed);
        assert_eq!(steps[2].citation.as_deref(), Some("https://example.org"));
    }

    #[test]
    fn agent_step_survives_store_round_trip() {
        let trace = StepTrace::new();
        trace.push(NewStep::active("Matcher", "Placement", "matching roles"));
        trace.patch_tail(StepPatch::completed().with_metrics(AgentMetrics {
            execution_time_ms: 812,
            success_rate: 0.97,
            hallucination_score: 0.02,
        }));
        let steps = trace.snapshot();

        let kv = InMemoryKvStore::new();
        save(&kv, "last_run_steps", &steps).unwrap();
        let loaded: Vec<AgentStep> = load_or(&kv, "last_run_steps", Vec::new());

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, steps[0].id);
        assert_eq!(loaded[0].status, StepStatus::Completed);
        assert_eq!(loaded[0].metrics.as_ref().unwrap().execution_time_ms, 812);
    }
}
