use serde::{Deserialize, Serialize};
use trace_flow::AgentMetrics;

use crate::models::{Citation, EquipmentItem, ExtractedData, HospitalReport, PlacementPriority};

/// Structured extraction from one unstructured facility report. Every
/// field defaults, so a partial model response still deserializes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParsedReport {
    pub facility_name: Option<String>,
    pub region: Option<String>,
    pub coordinates: Option<(f64, f64)>,
    pub beds: Option<u32>,
    pub specialties: Vec<String>,
    pub equipment_list: Vec<EquipmentItem>,
    pub gaps: Vec<String>,
    pub confidence: f64,
}

impl ParsedReport {
    pub fn to_extracted(&self) -> ExtractedData {
        ExtractedData {
            beds: self.beds,
            specialties: self.specialties.clone(),
            equipment_list: self.equipment_list.clone(),
            gaps: self.gaps.clone(),
            verified: false,
            confidence: self.confidence,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseResult {
    pub report: ParsedReport,
    pub metrics: AgentMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryResult {
    pub facilities: Vec<HospitalReport>,
    pub grounding: Vec<Citation>,
    pub metrics: AgentMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyResult {
    pub text: String,
    pub grounding: Vec<Citation>,
    pub metrics: AgentMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpertiseMatch {
    pub facility: String,
    pub role: String,
    pub reason: String,
    pub priority: PlacementPriority,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub recommendations: Vec<ExpertiseMatch>,
    pub metrics: AgentMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesertForecast {
    pub region: String,
    pub future_gap: String,
    pub probability: f64,
    pub timeframe: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastResult {
    pub forecasts: Vec<DesertForecast>,
    pub metrics: AgentMetrics,
}
