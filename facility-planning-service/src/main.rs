use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use facility_planning_service::agents::{ForecastResult, LlmAgents};
use facility_planning_service::models::{
    HospitalReport, MedicalDesert, Placement, SourceDocument, UserProject,
};
use facility_planning_service::orchestrator::Orchestrator;
use facility_planning_service::session::{SessionView, Theme};
use trace_flow::{AgentStep, AuditEntry, AuditStatus, FileKvStore, FlowError};

#[derive(Clone)]
struct AppState {
    orchestrator: Arc<Orchestrator>,
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    name: String,
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct ThemeRequest {
    theme: Theme,
}

#[derive(Debug, Deserialize)]
struct CreateProjectRequest {
    name: String,
    #[serde(default)]
    documents: Vec<SourceDocument>,
}

#[derive(Debug, Deserialize)]
struct AddNodeRequest {
    facility_name: String,
    region: String,
    unstructured_text: String,
}

#[derive(Debug, Deserialize)]
struct InterventionRequest {
    report_id: String,
}

#[derive(Debug, Deserialize)]
struct AuditQuery {
    status: Option<String>,
}

#[derive(Serialize)]
struct PlanResponse {
    plan: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(err: FlowError) -> ApiError {
    let status = match &err {
        FlowError::Validation(_) => StatusCode::BAD_REQUEST,
        FlowError::Precondition(_) | FlowError::RunInProgress(_) => StatusCode::CONFLICT,
        FlowError::Agent(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorBody {
            error: err.to_string(),
        }),
    )
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "facility_planning_service=debug,trace_flow=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let data_dir =
        std::env::var("FACILITY_DATA_DIR").unwrap_or_else(|_| "./data".to_string());
    let kv = FileKvStore::new(&data_dir).expect("Failed to prepare data directory");
    let orchestrator = Arc::new(Orchestrator::new(Arc::new(kv), Arc::new(LlmAgents::new())));
    let app_state = AppState { orchestrator };

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/session", get(session))
        .route("/theme", post(set_theme))
        .route("/projects", post(create_project))
        .route("/projects/{id}", delete(delete_project))
        .route("/projects/{id}/activate", post(activate_project))
        .route("/nodes", post(add_node))
        .route("/analysis/refresh", post(refresh_analysis))
        .route("/analysis/match", post(match_expertise))
        .route("/analysis/forecast", post(forecast_gaps))
        .route("/analysis/integrity", get(integrity))
        .route("/trace", get(trace_steps))
        .route("/audit", get(audit_log))
        .route("/deserts", get(deserts))
        .route("/interventions", post(record_intervention))
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();

    info!("Server running on http://0.0.0.0:3000");

    axum::serve(listener, app).await.unwrap();
}

async fn health_check() -> &'static str {
    "OK"
}

async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<SessionView>, ApiError> {
    state
        .orchestrator
        .register(&request.name, &request.email, &request.password)
        .await
        .map_err(api_error)?;
    Ok(Json(state.orchestrator.session_view().await))
}

async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<SessionView>, ApiError> {
    state
        .orchestrator
        .login(&request.email, &request.password)
        .await
        .map_err(api_error)?;
    Ok(Json(state.orchestrator.session_view().await))
}

async fn logout(State(state): State<AppState>) -> Result<Json<SessionView>, ApiError> {
    state.orchestrator.logout().await.map_err(api_error)?;
    Ok(Json(state.orchestrator.session_view().await))
}

async fn session(State(state): State<AppState>) -> Json<SessionView> {
    Json(state.orchestrator.session_view().await)
}

async fn set_theme(
    State(state): State<AppState>,
    Json(request): Json<ThemeRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .orchestrator
        .set_theme(request.theme)
        .await
        .map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_project(
    State(state): State<AppState>,
    Json(request): Json<CreateProjectRequest>,
) -> Result<Json<UserProject>, ApiError> {
    info!(name = %request.name, documents = request.documents.len(), "create project request");
    state
        .orchestrator
        .create_project(&request.name, request.documents)
        .await
        .map(Json)
        .map_err(api_error)
}

async fn delete_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .orchestrator
        .delete_project(&project_id)
        .await
        .map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn activate_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<UserProject>, ApiError> {
    state
        .orchestrator
        .select_project(&project_id)
        .await
        .map(Json)
        .map_err(api_error)
}

async fn add_node(
    State(state): State<AppState>,
    Json(request): Json<AddNodeRequest>,
) -> Result<Json<HospitalReport>, ApiError> {
    state
        .orchestrator
        .add_manual_node(
            &request.facility_name,
            &request.region,
            &request.unstructured_text,
        )
        .await
        .map(Json)
        .map_err(api_error)
}

async fn refresh_analysis(
    State(state): State<AppState>,
) -> Result<Json<PlanResponse>, ApiError> {
    state
        .orchestrator
        .refresh_analysis()
        .await
        .map(|plan| Json(PlanResponse { plan }))
        .map_err(api_error)
}

async fn match_expertise(
    State(state): State<AppState>,
) -> Result<Json<Vec<Placement>>, ApiError> {
    state
        .orchestrator
        .match_expertise()
        .await
        .map(Json)
        .map_err(api_error)
}

async fn forecast_gaps(State(state): State<AppState>) -> Result<Json<ForecastResult>, ApiError> {
    state
        .orchestrator
        .forecast_gaps()
        .await
        .map(Json)
        .map_err(api_error)
}

async fn integrity(State(state): State<AppState>) -> Json<Vec<HospitalReport>> {
    Json(state.orchestrator.flagged_reports().await)
}

async fn trace_steps(State(state): State<AppState>) -> Json<Vec<AgentStep>> {
    Json(state.orchestrator.trace_steps())
}

async fn audit_log(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Json<Vec<AuditEntry>> {
    let status = match query.status.as_deref() {
        Some("success") => Some(AuditStatus::Success),
        Some("warning") => Some(AuditStatus::Warning),
        Some("info") => Some(AuditStatus::Info),
        _ => None,
    };
    Json(state.orchestrator.audit_entries(status))
}

async fn deserts(State(state): State<AppState>) -> Json<Vec<MedicalDesert>> {
    Json(state.orchestrator.deserts())
}

async fn record_intervention(
    State(state): State<AppState>,
    Json(request): Json<InterventionRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .orchestrator
        .record_intervention(&request.report_id)
        .await
        .map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}
