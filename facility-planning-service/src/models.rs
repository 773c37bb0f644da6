use chrono::Utc;
use serde::{Deserialize, Serialize};
use trace_flow::AgentStep;
use uuid::Uuid;

/// Registered operator. Identity key is the email; the password is stored
/// as entered (the AuthStore seam is where a hardened build would hash it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    pub email: String,
    pub password: String,
    pub projects: Vec<UserProject>,
}

impl User {
    pub fn new(name: impl Into<String>, email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password: password.into(),
            projects: Vec::new(),
        }
    }
}

/// A named unit of work bundling ingested facility reports and the
/// agent-generated strategic plan for a region or operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProject {
    pub id: String,
    pub name: String,
    pub created_at: String,
    pub documents: Vec<String>,
    pub reports: Vec<HospitalReport>,
    pub analysis_result: Option<String>,
    #[serde(default)]
    pub analysis_history: Vec<AnalysisHistoryEntry>,
    #[serde(default)]
    pub placements: Vec<Placement>,
}

impl UserProject {
    pub fn new(
        name: impl Into<String>,
        documents: Vec<String>,
        reports: Vec<HospitalReport>,
        analysis_result: Option<String>,
    ) -> Self {
        Self {
            id: ids::project_id(),
            name: name.into(),
            created_at: today(),
            documents,
            reports,
            analysis_result,
            analysis_history: Vec::new(),
            placements: Vec::new(),
        }
    }
}

/// One facility's structured and unstructured data, either manually
/// entered or discovered via external search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HospitalReport {
    pub id: String,
    pub facility_name: String,
    pub region: String,
    pub report_date: String,
    pub unstructured_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<(f64, f64)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub anomalies: Vec<Anomaly>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_data: Option<ExtractedData>,
}

impl HospitalReport {
    /// Extraction confidence below 0.9 marks a report as unverified for
    /// the integrity views; a report with no extraction at all is flagged.
    pub fn flagged(&self) -> bool {
        match &self.extracted_data {
            Some(data) => data.confidence < 0.9,
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedData {
    #[serde(default)]
    pub beds: Option<u32>,
    #[serde(default)]
    pub specialties: Vec<String>,
    #[serde(default)]
    pub equipment_list: Vec<EquipmentItem>,
    #[serde(default)]
    pub gaps: Vec<String>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentItem {
    pub name: String,
    pub status: EquipmentStatus,
}

/// Unrecognized status strings from the model degrade to `Limited`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum EquipmentStatus {
    Operational,
    Limited,
    Offline,
}

impl From<String> for EquipmentStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Operational" => Self::Operational,
            "Offline" => Self::Offline,
            _ => Self::Limited,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub description: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    ConflictingData,
    UnverifiedClaim,
    OutdatedMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Frozen snapshot of one orchestrated run's final plan and full step
/// trace, kept so prior runs stay inspectable after a newer run
/// overwrites the live plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisHistoryEntry {
    pub id: String,
    pub timestamp: String,
    pub plan: String,
    pub steps: Vec<AgentStep>,
}

impl AnalysisHistoryEntry {
    pub fn new(plan: impl Into<String>, steps: Vec<AgentStep>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now().to_rfc3339(),
            plan: plan.into(),
            steps,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub id: String,
    pub facility_name: String,
    pub role: String,
    pub priority: PlacementPriority,
    pub status: PlacementStatus,
}

/// Unrecognized priority strings from the model degrade to `Routine`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum PlacementPriority {
    Critical,
    High,
    Routine,
}

impl From<String> for PlacementPriority {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Critical" => Self::Critical,
            "High" => Self::High,
            _ => Self::Routine,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlacementStatus {
    Planned,
    Deployed,
    Completed,
}

/// Geographic cluster flagged as under-resourced; read-only overlay data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicalDesert {
    pub id: String,
    pub region: String,
    pub population_density: PopulationDensity,
    pub primary_gaps: Vec<String>,
    pub severity: u8,
    pub coordinates: (f64, f64),
    pub predicted_risk: f64,
    pub predictive_gaps: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PopulationDensity {
    High,
    Medium,
    Low,
}

/// Web source reference returned alongside generated text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub uri: String,
}

/// One user-supplied text source for project creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub name: String,
    pub content: String,
}

pub fn today() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

/// Id construction. Projects and manually ingested reports use time-based
/// ids; discovered reports get a client-generated uuid since the agent
/// does not guarantee one. Prefixes keep the namespaces from colliding.
pub mod ids {
    use chrono::Utc;
    use uuid::Uuid;

    pub fn project_id() -> String {
        format!("p{}", Utc::now().timestamp_millis())
    }

    pub fn main_report_id() -> String {
        format!("main-{}", Utc::now().timestamp_millis())
    }

    pub fn manual_report_id() -> String {
        format!("manual-{}", Utc::now().timestamp_millis())
    }

    pub fn discovered_report_id() -> String {
        format!("web-{}", Uuid::new_v4())
    }

    pub fn placement_id() -> String {
        format!("pl-{}", Uuid::new_v4())
    }

    /// Manual provenance covers both the operator's main report and
    /// manually ingested nodes.
    pub fn is_manual(report_id: &str) -> bool {
        report_id.starts_with("manual-") || report_id.starts_with("main-")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flagged_follows_confidence_threshold() {
        let mut report = HospitalReport {
            id: ids::manual_report_id(),
            facility_name: "Wa Hospital".to_string(),
            region: "Upper West".to_string(),
            report_date: today(),
            unstructured_text: String::new(),
            coordinates: None,
            anomalies: Vec::new(),
            extracted_data: Some(ExtractedData {
                beds: Some(120),
                specialties: vec!["General Medicine".to_string()],
                equipment_list: Vec::new(),
                gaps: Vec::new(),
                verified: true,
                confidence: 0.92,
            }),
        };
        assert!(!report.flagged());

        report.extracted_data.as_mut().unwrap().confidence = 0.85;
        assert!(report.flagged());

        report.extracted_data = None;
        assert!(report.flagged());
    }

    #[test]
    fn unknown_equipment_status_degrades_to_limited() {
        let item: EquipmentItem =
            serde_json::from_str(r#"{"name": "MRI", "status": "Partially Working"}"#).unwrap();
        assert_eq!(item.status, EquipmentStatus::Limited);
    }

    #[test]
    fn id_namespaces_are_disjoint() {
        assert!(ids::is_manual(&ids::manual_report_id()));
        assert!(ids::is_manual(&ids::main_report_id()));
        assert!(!ids::is_manual(&ids::discovered_report_id()));
    }
}
