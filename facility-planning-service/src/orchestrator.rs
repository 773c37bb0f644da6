//! Run sequencing for the operator console: each operation validates its
//! preconditions, claims the run lock, traces every agent call, and
//! commits the merged result to the project tree with write-through
//! persistence. Runs are fail-fast: the first failed step settles the
//! run and skips the remaining agents.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use trace_flow::{
    AgentStep, AuditEntry, AuditStatus, AuditTrail, FlowError, KvStore, NewStep, Result,
    RunRegistry, StepPatch, StepTrace,
};

use crate::agents::types::ParsedReport;
use crate::agents::{AgentSuite, ForecastResult};
use crate::auth::AuthStore;
use crate::data;
use crate::models::{
    AnalysisHistoryEntry, HospitalReport, MedicalDesert, Placement, PlacementStatus,
    SourceDocument, User, UserProject, ids, today,
};
use crate::projects;
use crate::session::{SessionContext, SessionView, Theme};

const AGENT_CALL_TIMEOUT: Duration = Duration::from_secs(60);
const SOURCE_BOUNDARY: &str = "\n\n--- SOURCE BOUNDARY ---\n\n";
const CREATE_RUN_KEY: &str = "run:create-project";
const MAIN_REPORT_EXCERPT_CHARS: usize = 1000;

fn project_run_key(project_id: &str) -> String {
    format!("run:project:{project_id}")
}

/// Concatenate uploaded sources with an explicit boundary marker.
pub fn combine_documents(documents: &[SourceDocument]) -> String {
    documents
        .iter()
        .map(|d| d.content.as_str())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join(SOURCE_BOUNDARY)
}

fn main_report(parsed: &ParsedReport, combined: &str) -> HospitalReport {
    let mut excerpt: String = combined.chars().take(MAIN_REPORT_EXCERPT_CHARS).collect();
    if combined.chars().count() > MAIN_REPORT_EXCERPT_CHARS {
        excerpt.push_str("...");
    }
    HospitalReport {
        id: ids::main_report_id(),
        facility_name: parsed.facility_name.clone().unwrap_or_default(),
        region: parsed
            .region
            .clone()
            .unwrap_or_else(|| "Unknown".to_string()),
        report_date: today(),
        unstructured_text: excerpt,
        coordinates: parsed.coordinates,
        anomalies: Vec::new(),
        extracted_data: Some(parsed.to_extracted()),
    }
}

pub struct Orchestrator {
    agents: Arc<dyn AgentSuite>,
    auth: AuthStore,
    session: Mutex<SessionContext>,
    trace: StepTrace,
    audit: AuditTrail,
    runs: RunRegistry,
}

impl Orchestrator {
    pub fn new(kv: Arc<dyn KvStore>, agents: Arc<dyn AgentSuite>) -> Self {
        let auth = AuthStore::new(kv);
        let session = SessionContext::bootstrap(auth.current_user(), auth.theme());
        let audit = AuditTrail::default();
        audit.seed(vec![
            AuditEntry {
                id: Uuid::new_v4().to_string(),
                timestamp: Utc::now(),
                event: "System node initialized".to_string(),
                user: "kernel".to_string(),
                status: AuditStatus::Info,
            },
            AuditEntry {
                id: Uuid::new_v4().to_string(),
                timestamp: Utc::now(),
                event: "Identity registry loaded".to_string(),
                user: "auth".to_string(),
                status: AuditStatus::Success,
            },
        ]);
        Self {
            agents,
            auth,
            session: Mutex::new(session),
            trace: StepTrace::new(),
            audit,
            runs: RunRegistry::new(),
        }
    }

    // ---- identity -------------------------------------------------------

    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<User> {
        let user = self.auth.register(name, email, password)?;
        let mut session = self.session.lock().await;
        session.user = Some(user.clone());
        session.clear_active();
        Ok(user)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        let user = self.auth.login(email, password)?;
        let mut session = self.session.lock().await;
        session.user = Some(user.clone());
        session.clear_active();
        Ok(user)
    }

    pub async fn logout(&self) -> Result<()> {
        self.auth.logout()?;
        let mut session = self.session.lock().await;
        session.clear_on_logout();
        if let Err(e) = self.auth.save_theme(session.theme) {
            warn!(error = %e, "failed to persist theme on logout");
        }
        Ok(())
    }

    pub async fn set_theme(&self, theme: Theme) -> Result<()> {
        let mut session = self.session.lock().await;
        session.theme = theme;
        if let Err(e) = self.auth.save_theme(theme) {
            warn!(error = %e, "failed to persist theme, keeping in-memory value");
        }
        Ok(())
    }

    // ---- orchestrated runs ----------------------------------------------

    /// Create a project from uploaded sources: parse, discover, strategize,
    /// then commit the assembled project and make it active.
    pub async fn create_project(
        &self,
        name: &str,
        documents: Vec<SourceDocument>,
    ) -> Result<UserProject> {
        if name.trim().is_empty() {
            return Err(FlowError::Validation(
                "Project codename is required.".to_string(),
            ));
        }
        if self.session.lock().await.user.is_none() {
            return Err(FlowError::Precondition("No operator session".to_string()));
        }
        let _guard = self.runs.acquire(CREATE_RUN_KEY)?;
        let outcome = self.create_project_run(name, &documents).await;
        self.settle("Project synthesis", outcome).await
    }

    async fn create_project_run(
        &self,
        name: &str,
        documents: &[SourceDocument],
    ) -> Result<UserProject> {
        self.trace.begin();
        let combined = combine_documents(documents);

        let parse = self
            .run_step(
                NewStep::active(
                    "Parser",
                    "Multi-format ingestion",
                    format!("Parsing {} source document(s)", documents.len()),
                ),
                self.agents.parse_report(&combined),
            )
            .await?;
        self.trace.patch_tail(
            StepPatch::completed()
                .with_metrics(parse.metrics.clone())
                .with_output(serde_json::to_value(&parse.report)?),
        );
        let mut parsed = parse.report;

        let query = parsed
            .facility_name
            .clone()
            .unwrap_or_else(|| name.to_string());
        let discovery = self
            .run_step(
                NewStep::active(
                    "Verifier",
                    "Global grounding",
                    format!("Discovering facilities for {query}"),
                ),
                self.agents.discover_facilities(&query),
            )
            .await?;
        self.trace
            .patch_tail(StepPatch::completed().with_metrics(discovery.metrics.clone()));

        let mut reports = discovery.facilities;
        if parsed.facility_name.is_some() {
            if let Some(absorbed) = projects::splice_discovery(&mut parsed, &reports) {
                reports.retain(|r| r.id != absorbed);
            }
            reports.insert(0, main_report(&parsed, &combined));
        }

        let strategy = self
            .run_step(
                NewStep::active(
                    "Strategist",
                    "Strategic planning",
                    "Synthesizing the resource roadmap",
                ),
                self.agents.generate_strategy(&reports),
            )
            .await?;
        self.trace
            .patch_tail(StepPatch::completed().with_metrics(strategy.metrics.clone()));

        let mut session = self.session.lock().await;
        let user = session.user.clone().ok_or_else(|| {
            FlowError::Precondition("Operator session ended mid-run".to_string())
        })?;
        let project = UserProject::new(name, vec![combined], reports, Some(strategy.text.clone()));
        let project = projects::append_history(
            &project,
            AnalysisHistoryEntry::new(strategy.text, self.trace.snapshot()),
        );
        let (user, project) = projects::create_project(&user, project);
        self.commit_user(&mut session, user);
        session.set_active(&project);
        session.grounding = discovery.grounding;
        let operator = operator_of(&session);
        self.audit.record(
            format!("Project initialized: {}", project.name),
            operator,
            AuditStatus::Success,
        );
        info!(project = %project.id, reports = project.reports.len(), "project committed");
        Ok(project)
    }

    /// Parse one manually entered facility report and append it to the
    /// active project. Coordinates fall back to the placement policy when
    /// neither the parser nor the operator supplied any.
    pub async fn add_manual_node(
        &self,
        facility_name: &str,
        region: &str,
        unstructured_text: &str,
    ) -> Result<HospitalReport> {
        if facility_name.trim().is_empty() {
            return Err(FlowError::Validation(
                "Facility name is required.".to_string(),
            ));
        }
        let project_id = self.active_project_id().await?;
        let _guard = self.runs.acquire(&project_run_key(&project_id))?;
        let outcome = self
            .add_manual_node_run(facility_name, region, unstructured_text)
            .await;
        self.settle("Manual ingestion", outcome).await
    }

    async fn add_manual_node_run(
        &self,
        facility_name: &str,
        region: &str,
        unstructured_text: &str,
    ) -> Result<HospitalReport> {
        self.trace.begin();
        let parse = self
            .run_step(
                NewStep::active(
                    "Parser",
                    "Manual ingestion",
                    format!("Processing entry for {facility_name}"),
                ),
                self.agents.parse_report(unstructured_text),
            )
            .await?;
        let parsed = parse.report;

        let coordinates = parsed
            .coordinates
            .unwrap_or_else(|| data::fallback_coordinates(region));
        let report = HospitalReport {
            id: ids::manual_report_id(),
            facility_name: parsed
                .facility_name
                .clone()
                .unwrap_or_else(|| facility_name.to_string()),
            region: region.to_string(),
            report_date: today(),
            unstructured_text: unstructured_text.to_string(),
            coordinates: Some(coordinates),
            anomalies: Vec::new(),
            extracted_data: Some(parsed.to_extracted()),
        };
        self.trace.patch_tail(
            StepPatch::completed()
                .with_metrics(parse.metrics)
                .with_output(serde_json::to_value(&report)?),
        );

        let mut session = self.session.lock().await;
        let user = session.user.clone().ok_or_else(|| {
            FlowError::Precondition("Operator session ended mid-run".to_string())
        })?;
        let project = session.active_project().cloned().ok_or_else(|| {
            FlowError::Precondition("Active project was removed mid-run".to_string())
        })?;
        let project = projects::append_report(&project, report.clone());
        let user = projects::upsert_project(&user, &project);
        self.commit_user(&mut session, user);
        session.set_active(&project);
        let operator = operator_of(&session);
        self.audit.record(
            format!("Node ingested: {}", report.facility_name),
            operator,
            AuditStatus::Success,
        );
        Ok(report)
    }

    /// Re-run discovery and strategy for the active project. The merged
    /// discovery result is committed as soon as that step completes, so a
    /// strategist failure leaves it in place.
    pub async fn refresh_analysis(&self) -> Result<String> {
        let project_id = self.active_project_id().await?;
        let _guard = self.runs.acquire(&project_run_key(&project_id))?;
        let outcome = self.refresh_run().await;
        self.settle("Synthesis refresh", outcome).await
    }

    async fn refresh_run(&self) -> Result<String> {
        self.trace.begin();
        let query = {
            let session = self.session.lock().await;
            session
                .active_project()
                .map(|p| p.name.clone())
                .ok_or_else(|| {
                    FlowError::Precondition("Active project was removed mid-run".to_string())
                })?
        };

        let discovery = self
            .run_step(
                NewStep::active(
                    "Verifier",
                    "Deep scrape",
                    format!("Searching for updates on {query}"),
                ),
                self.agents.discover_facilities(&query),
            )
            .await?;
        self.trace
            .patch_tail(StepPatch::completed().with_metrics(discovery.metrics.clone()));

        let reports_for_plan = {
            let mut session = self.session.lock().await;
            let user = session.user.clone().ok_or_else(|| {
                FlowError::Precondition("Operator session ended mid-run".to_string())
            })?;
            let project = session.active_project().cloned().ok_or_else(|| {
                FlowError::Precondition("Active project was removed mid-run".to_string())
            })?;
            let (project, added) = projects::merge_discovery(&project, discovery.facilities);
            let user = projects::upsert_project(&user, &project);
            self.commit_user(&mut session, user);
            session.set_active(&project);
            session.grounding.extend(discovery.grounding);
            info!(added, project = %project.id, "discovery merged");
            project.reports
        };

        let strategy = self
            .run_step(
                NewStep::active(
                    "Strategist",
                    "Logic synthesis",
                    "Re-calculating resource horizons",
                ),
                self.agents.generate_strategy(&reports_for_plan),
            )
            .await?;
        self.trace
            .patch_tail(StepPatch::completed().with_metrics(strategy.metrics.clone()));

        let mut session = self.session.lock().await;
        let user = session.user.clone().ok_or_else(|| {
            FlowError::Precondition("Operator session ended mid-run".to_string())
        })?;
        let mut project = session.active_project().cloned().ok_or_else(|| {
            FlowError::Precondition("Active project was removed mid-run".to_string())
        })?;
        project.analysis_result = Some(strategy.text.clone());
        let project = projects::append_history(
            &project,
            AnalysisHistoryEntry::new(strategy.text.clone(), self.trace.snapshot()),
        );
        let user = projects::upsert_project(&user, &project);
        self.commit_user(&mut session, user);
        session.set_active(&project);
        let operator = operator_of(&session);
        self.audit.record(
            format!("Synthesis refreshed: {}", project.name),
            operator,
            AuditStatus::Success,
        );
        Ok(strategy.text)
    }

    /// Match specialists to the active project's reported gaps and store
    /// the planned placements on the project.
    pub async fn match_expertise(&self) -> Result<Vec<Placement>> {
        let project_id = self.active_project_id().await?;
        if self.session.lock().await.reports.is_empty() {
            return Err(FlowError::Precondition(
                "No reports to match against".to_string(),
            ));
        }
        let _guard = self.runs.acquire(&project_run_key(&project_id))?;
        let outcome = self.match_run().await;
        self.settle("Expertise matching", outcome).await
    }

    async fn match_run(&self) -> Result<Vec<Placement>> {
        self.trace.begin();
        let reports = self.session.lock().await.reports.clone();
        let matched = self
            .run_step(
                NewStep::active(
                    "Matcher",
                    "Expertise matching",
                    format!("Matching specialists across {} facilities", reports.len()),
                ),
                self.agents.match_expertise(&reports),
            )
            .await?;
        let placements: Vec<Placement> = matched
            .recommendations
            .iter()
            .map(|r| Placement {
                id: ids::placement_id(),
                facility_name: r.facility.clone(),
                role: r.role.clone(),
                priority: r.priority,
                status: PlacementStatus::Planned,
            })
            .collect();
        self.trace.patch_tail(
            StepPatch::completed()
                .with_metrics(matched.metrics.clone())
                .with_output(serde_json::to_value(&matched.recommendations)?),
        );

        let mut session = self.session.lock().await;
        let user = session.user.clone().ok_or_else(|| {
            FlowError::Precondition("Operator session ended mid-run".to_string())
        })?;
        let project = session.active_project().cloned().ok_or_else(|| {
            FlowError::Precondition("Active project was removed mid-run".to_string())
        })?;
        let project = projects::set_placements(&project, placements.clone());
        let user = projects::upsert_project(&user, &project);
        self.commit_user(&mut session, user);
        session.set_active(&project);
        let operator = operator_of(&session);
        self.audit.record(
            format!("Placements planned: {}", placements.len()),
            operator,
            AuditStatus::Success,
        );
        Ok(placements)
    }

    /// Forecast gap evolution for the active project. A read-only
    /// projection: nothing is committed to the project tree.
    pub async fn forecast_gaps(&self) -> Result<ForecastResult> {
        let project_id = self.active_project_id().await?;
        let _guard = self.runs.acquire(&project_run_key(&project_id))?;
        let outcome = self.forecast_run().await;
        self.settle("Gap forecasting", outcome).await
    }

    async fn forecast_run(&self) -> Result<ForecastResult> {
        self.trace.begin();
        let reports = self.session.lock().await.reports.clone();
        let forecast = self
            .run_step(
                NewStep::active(
                    "Predictor",
                    "Horizon forecast",
                    "Forecasting medical desert evolution",
                ),
                self.agents.forecast_gaps(&reports),
            )
            .await?;
        self.trace.patch_tail(
            StepPatch::completed()
                .with_metrics(forecast.metrics.clone())
                .with_output(serde_json::to_value(&forecast.forecasts)?),
        );
        self.audit.record(
            format!("Forecast generated: {} regions", forecast.forecasts.len()),
            self.operator_name().await,
            AuditStatus::Info,
        );
        Ok(forecast)
    }

    // ---- synchronous operations -----------------------------------------

    pub async fn select_project(&self, project_id: &str) -> Result<UserProject> {
        let mut session = self.session.lock().await;
        let project = session
            .user
            .as_ref()
            .and_then(|u| u.projects.iter().find(|p| p.id == project_id))
            .cloned()
            .ok_or_else(|| FlowError::Precondition(format!("Unknown project: {project_id}")))?;
        session.set_active(&project);
        Ok(project)
    }

    /// Remove a project; when it is the active one, the derived view is
    /// cleared in the same commit.
    pub async fn delete_project(&self, project_id: &str) -> Result<()> {
        let mut session = self.session.lock().await;
        let user = session
            .user
            .clone()
            .ok_or_else(|| FlowError::Precondition("No operator session".to_string()))?;
        if !user.projects.iter().any(|p| p.id == project_id) {
            return Err(FlowError::Precondition(format!(
                "Unknown project: {project_id}"
            )));
        }
        let user = projects::delete_project(&user, project_id);
        if session.active_project_id.as_deref() == Some(project_id) {
            session.clear_active();
        }
        self.commit_user(&mut session, user);
        Ok(())
    }

    pub async fn record_intervention(&self, report_id: &str) -> Result<()> {
        let session = self.session.lock().await;
        let report = session
            .reports
            .iter()
            .find(|r| r.id == report_id)
            .ok_or_else(|| FlowError::Precondition(format!("Unknown report: {report_id}")))?;
        let operator = operator_of(&session);
        self.audit.record(
            format!("Protocol deployed: {}", report.facility_name),
            operator,
            AuditStatus::Success,
        );
        Ok(())
    }

    // ---- projections -----------------------------------------------------

    pub async fn session_view(&self) -> SessionView {
        let session = self.session.lock().await;
        let thinking = self.runs.is_running(CREATE_RUN_KEY)
            || session
                .active_project_id
                .as_deref()
                .map(|id| self.runs.is_running(&project_run_key(id)))
                .unwrap_or(false);
        SessionView::capture(&session, thinking)
    }

    pub fn trace_steps(&self) -> Vec<AgentStep> {
        self.trace.snapshot()
    }

    pub fn audit_entries(&self, status: Option<AuditStatus>) -> Vec<AuditEntry> {
        self.audit.entries(status)
    }

    pub fn deserts(&self) -> Vec<MedicalDesert> {
        data::desert_regions()
    }

    /// Reports whose extraction confidence falls under the verification
    /// threshold, for the integrity view.
    pub async fn flagged_reports(&self) -> Vec<HospitalReport> {
        self.session
            .lock()
            .await
            .reports
            .iter()
            .filter(|r| r.flagged())
            .cloned()
            .collect()
    }

    // ---- internals -------------------------------------------------------

    /// Push an `active` step, await the bound agent call under the
    /// per-call timeout, and patch the tail to `error` on any failure.
    /// Success enrichment is patched by the caller.
    async fn run_step<T, F>(&self, step: NewStep, call: F) -> Result<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        let agent_name = step.agent_name.clone();
        self.trace.push(step);
        match tokio::time::timeout(AGENT_CALL_TIMEOUT, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(agent = %agent_name, error = %e, "agent step failed");
                self.trace.patch_tail(StepPatch::failed());
                Err(FlowError::Agent(format!("{agent_name}: {e}")))
            }
            Err(_) => {
                warn!(agent = %agent_name, "agent step timed out");
                self.trace.patch_tail(StepPatch::failed());
                Err(FlowError::Agent(format!("{agent_name}: call timed out")))
            }
        }
    }

    /// One warning entry per failed run; validation failures never get
    /// this far.
    async fn settle<T>(&self, operation: &str, outcome: Result<T>) -> Result<T> {
        if let Err(e) = &outcome {
            self.audit.record(
                format!("{operation} failed: {e}"),
                self.operator_name().await,
                AuditStatus::Warning,
            );
        }
        outcome
    }

    /// Replace the session user and write it through. A failed save is
    /// surfaced as a warning while the in-memory state stands; the next
    /// mutation retries the write.
    fn commit_user(&self, session: &mut SessionContext, user: User) {
        if let Err(e) = self.auth.persist_user(&user) {
            warn!(error = %e, "write-through persistence failed, keeping in-memory state");
            self.audit.record(
                format!("Persistence degraded: {e}"),
                user.name.clone(),
                AuditStatus::Warning,
            );
        }
        session.user = Some(user);
    }

    async fn active_project_id(&self) -> Result<String> {
        self.session
            .lock()
            .await
            .active_project_id
            .clone()
            .ok_or_else(|| FlowError::Precondition("No active project".to_string()))
    }

    async fn operator_name(&self) -> String {
        operator_of(&*self.session.lock().await)
    }
}

fn operator_of(session: &SessionContext) -> String {
    session
        .user
        .as_ref()
        .map(|u| u.name.clone())
        .unwrap_or_else(|| "operator".to_string())
}
