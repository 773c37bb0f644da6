//! Live agent suite backed by one OpenRouter completion model.

use anyhow::anyhow;
use async_trait::async_trait;
use rig::agent::Agent;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::openrouter;
use serde::Deserialize;
use std::time::Instant;
use tracing::{info, warn};

use super::extract::{extract_array, extract_object};
use super::types::{
    DesertForecast, DiscoveryResult, ExpertiseMatch, ForecastResult, MatchResult, ParseResult,
    ParsedReport, StrategyResult,
};
use super::{AgentSuite, observed_metrics};
use crate::models::{Citation, ExtractedData, HospitalReport, ids, today};

const COMPLETION_MODEL: &str = "google/gemini-2.5-flash";

fn completion_agent(preamble: &str) -> anyhow::Result<Agent<openrouter::CompletionModel>> {
    let api_key = std::env::var("OPENROUTER_API_KEY")
        .map_err(|_| anyhow!("OPENROUTER_API_KEY not set"))?;
    let client = openrouter::Client::new(&api_key);
    Ok(client.agent(COMPLETION_MODEL).preamble(preamble).build())
}

/// Discovery payload as requested from the model; citations ride inside
/// the structured output since the completion API exposes no separate
/// grounding channel.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireDiscovery {
    facilities: Vec<WireFacility>,
    sources: Vec<Citation>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireFacility {
    facility_name: String,
    region: String,
    report_date: String,
    unstructured_text: String,
    coordinates: Option<(f64, f64)>,
    extracted_data: Option<ExtractedData>,
}

impl WireFacility {
    fn into_report(self) -> HospitalReport {
        HospitalReport {
            id: ids::discovered_report_id(),
            facility_name: self.facility_name,
            region: self.region,
            report_date: if self.report_date.is_empty() {
                today()
            } else {
                self.report_date
            },
            unstructured_text: self.unstructured_text,
            coordinates: self.coordinates,
            anomalies: Vec::new(),
            extracted_data: self.extracted_data,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireMatch {
    recommendations: Vec<ExpertiseMatch>,
}

#[derive(Debug, Deserialize)]
struct WireForecast {
    forecasts: Vec<DesertForecast>,
}

fn facility_names(reports: &[HospitalReport]) -> String {
    reports
        .iter()
        .map(|r| r.facility_name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

pub struct LlmAgents;

impl LlmAgents {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LlmAgents {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentSuite for LlmAgents {
    async fn parse_report(&self, raw_text: &str) -> anyhow::Result<ParseResult> {
        let started = Instant::now();
        let agent = completion_agent(
            "You are a medical infrastructure analyst extracting structured capabilities from facility reports.",
        )?;
        let prompt = format!(
            r#"Parse this facility report into structured medical capabilities. Extract the specific equipment list with operational status when it is mentioned.

Respond with ONLY a JSON object shaped exactly like:
{{"facility_name": string or null, "beds": number or null, "specialties": [string], "equipment_list": [{{"name": string, "status": "Operational" or "Limited" or "Offline"}}], "gaps": [string], "confidence": number between 0 and 1}}

Report:
{raw_text}"#
        );
        let response = agent.prompt(&prompt).await?;

        let report = match extract_object::<ParsedReport>(&response) {
            Some(parsed) => parsed,
            None => {
                warn!("parser response held no usable JSON, degrading to empty extraction");
                ParsedReport::default()
            }
        };
        Ok(ParseResult {
            report,
            metrics: observed_metrics(started),
        })
    }

    async fn discover_facilities(&self, query: &str) -> anyhow::Result<DiscoveryResult> {
        let started = Instant::now();
        let agent = completion_agent(
            "You are a healthcare infrastructure researcher reporting on real facility assessments.",
        )?;
        let prompt = format!(
            r#"List real, recently reported (2024-2025) health facilities relevant to "{query}", with their specific current challenges: equipment status (oxygen plants, dialysis, MRI and similar), staffing shortages, and bed capacity. Provide at least 5 facilities when the area is known to you; fewer, or none, is acceptable when it is not.

Respond with ONLY a JSON object shaped exactly like:
{{"facilities": [{{"facility_name": string, "region": string, "report_date": string, "unstructured_text": string, "coordinates": [latitude, longitude], "extracted_data": {{"beds": number, "specialties": [string], "equipment_list": [{{"name": string, "status": "Operational" or "Limited" or "Offline"}}], "gaps": [string], "verified": boolean, "confidence": number between 0 and 1}}}}], "sources": [{{"title": string, "uri": string}}]}}"#
        );
        let response = agent.prompt(&prompt).await?;

        let wire = extract_object::<WireDiscovery>(&response).unwrap_or_else(|| WireDiscovery {
            facilities: extract_array::<WireFacility>(&response),
            sources: Vec::new(),
        });
        let facilities: Vec<HospitalReport> = wire
            .facilities
            .into_iter()
            .filter(|f| !f.facility_name.trim().is_empty())
            .map(WireFacility::into_report)
            .collect();
        info!(count = facilities.len(), query, "discovery resolved");

        Ok(DiscoveryResult {
            facilities,
            grounding: wire.sources,
            metrics: observed_metrics(started),
        })
    }

    async fn generate_strategy(&self, reports: &[HospitalReport]) -> anyhow::Result<StrategyResult> {
        let started = Instant::now();
        let agent = completion_agent(
            "You are a strategic regional planner for healthcare infrastructure.",
        )?;
        let prompt = format!(
            r#"Analyze the regional medical deserts around these facilities: {}.
Estimate distances to the nearest referral hubs and synthesize a 12-month resource allocation plan addressing the reported infrastructure gaps. Present the findings in Markdown with clear headings and tables.

Facility dossier:
{}"#,
            facility_names(reports),
            serde_json::to_string(reports)?
        );
        let text = agent.prompt(&prompt).await?;

        Ok(StrategyResult {
            text,
            grounding: Vec::new(),
            metrics: observed_metrics(started),
        })
    }

    async fn match_expertise(&self, reports: &[HospitalReport]) -> anyhow::Result<MatchResult> {
        let started = Instant::now();
        let agent = completion_agent(
            "You are a medical workforce placement specialist.",
        )?;
        let prompt = format!(
            r#"Based on these hospital reports and their extracted gaps, suggest optimal placements of medical professionals (doctors, nurses, specialists). Identify which facility needs which specialty most urgently.

Respond with ONLY a JSON object shaped exactly like:
{{"recommendations": [{{"facility": string, "role": string, "reason": string, "priority": "Critical" or "High" or "Routine"}}]}}

Reports:
{}"#,
            serde_json::to_string(reports)?
        );
        let response = agent.prompt(&prompt).await?;

        let wire = extract_object::<WireMatch>(&response)
            .ok_or_else(|| anyhow!("matcher response held no usable JSON"))?;
        Ok(MatchResult {
            recommendations: wire.recommendations,
            metrics: observed_metrics(started),
        })
    }

    async fn forecast_gaps(&self, reports: &[HospitalReport]) -> anyhow::Result<ForecastResult> {
        let started = Instant::now();
        let agent = completion_agent(
            "You are a healthcare capacity forecaster.",
        )?;
        let prompt = format!(
            r#"Forecast future infrastructure needs and medical desert evolution based on these hospital reports and current trends.

Respond with ONLY a JSON object shaped exactly like:
{{"forecasts": [{{"region": string, "future_gap": string, "probability": number between 0 and 1, "timeframe": string}}]}}

Reports:
{}"#,
            serde_json::to_string(reports)?
        );
        let response = agent.prompt(&prompt).await?;

        let wire = extract_object::<WireForecast>(&response)
            .ok_or_else(|| anyhow!("predictor response held no usable JSON"))?;
        Ok(ForecastResult {
            forecasts: wire.forecasts,
            metrics: observed_metrics(started),
        })
    }
}
