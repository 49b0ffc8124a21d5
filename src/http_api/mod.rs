use std::{net::SocketAddr, sync::Arc};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    BoqItem, CatalogFilter, ComparisonEntry, CoverageRow, DecompositionSpec, Department,
    EngineError, EngineState, LocalContentReport, PriceHistoryReport, Project, Resource,
    ResourceClass, Risk, StrategyOutcome, StrategyRequest, UnitPriceAnalysis,
};

#[derive(Clone)]
pub struct AppState {
    engine: Arc<RwLock<EngineState>>,
}

impl AppState {
    pub fn new(engine: EngineState) -> Self {
        Self {
            engine: Arc::new(RwLock::new(engine)),
        }
    }

    pub fn with_shared(engine: Arc<RwLock<EngineState>>) -> Self {
        Self { engine }
    }

    fn engine(&self) -> Arc<RwLock<EngineState>> {
        self.engine.clone()
    }
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: crate::ErrorBody,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    body: crate::ErrorBody,
}

impl From<EngineError> for ApiError {
    fn from(value: EngineError) -> Self {
        let status = match &value {
            EngineError::UnknownResource { .. }
            | EngineError::UnknownProject { .. }
            | EngineError::UnknownDepartment { .. } => StatusCode::NOT_FOUND,
            EngineError::DuplicateId { .. } => StatusCode::CONFLICT,
            EngineError::DecompositionInconsistent { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::BAD_REQUEST,
        };
        Self {
            status,
            body: value.to_body(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorEnvelope { error: self.body })).into_response()
    }
}

fn parse_class(class: &str) -> Result<ResourceClass, ApiError> {
    ResourceClass::from_str(class).ok_or_else(|| {
        ApiError::from(EngineError::validation_field(
            format!("unknown resource class '{class}'"),
            "class",
        ))
    })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/catalogs/:class", get(list_resources).post(add_resource))
        .route(
            "/catalogs/:class/:id",
            get(get_resource).put(replace_resource).delete(delete_resource),
        )
        .route("/projects", get(list_projects).post(create_project))
        .route("/projects/:id/boq", get(list_boq).post(upsert_boq_item))
        .route("/projects/:id/boq/:item", get(get_boq_item).delete(delete_boq_item))
        .route("/projects/:id/analyses/:item", get(get_analysis).post(analyze_item))
        .route("/projects/:id/strategies", get(compare_strategies))
        .route("/projects/:id/strategies/apply", post(apply_strategy))
        .route("/projects/:id/local-content", get(local_content))
        .route("/projects/:id/allocations", post(allocate))
        .route("/departments", get(list_departments).post(add_department))
        .route("/allocations/coverage", get(coverage))
        .route("/risks", get(list_risks).post(add_risk))
        .route("/risks/matrix", get(risk_matrix))
        .route("/risks/response-plan", get(response_plan))
        .route("/price-history/:resource", get(price_trend))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, engine: EngineState) -> std::io::Result<()> {
    let state = AppState::new(engine);
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn list_resources(
    State(state): State<AppState>,
    Path(class): Path<String>,
    Query(filter): Query<CatalogFilter>,
) -> Result<Json<Vec<Resource>>, ApiError> {
    let class = parse_class(&class)?;
    let engine = state.engine();
    let resources = {
        let guard = engine.read();
        guard
            .catalogs
            .catalog(class)
            .list(&filter)
            .into_iter()
            .cloned()
            .collect()
    };
    Ok(Json(resources))
}

async fn add_resource(
    State(state): State<AppState>,
    Path(class): Path<String>,
    Json(resource): Json<Resource>,
) -> Result<(StatusCode, Json<Resource>), ApiError> {
    let class = parse_class(&class)?;
    let engine = state.engine();
    {
        let mut guard = engine.write();
        guard.catalogs.catalog_mut(class).add(resource.clone())?;
    }
    Ok((StatusCode::CREATED, Json(resource)))
}

async fn get_resource(
    State(state): State<AppState>,
    Path((class, id)): Path<(String, String)>,
) -> Result<Json<Resource>, ApiError> {
    let class = parse_class(&class)?;
    let engine = state.engine();
    let resource = {
        let guard = engine.read();
        guard.catalogs.catalog(class).get(&id)?.clone()
    };
    Ok(Json(resource))
}

async fn replace_resource(
    State(state): State<AppState>,
    Path((class, id)): Path<(String, String)>,
    Json(resource): Json<Resource>,
) -> Result<Json<Resource>, ApiError> {
    let class = parse_class(&class)?;
    if resource.id != id {
        return Err(ApiError::from(EngineError::validation_field(
            "resource id in payload does not match path parameter",
            "id",
        )));
    }
    let engine = state.engine();
    let invalidated = {
        let mut guard = engine.write();
        guard.update_resource(class, &id, |existing| *existing = resource.clone())?
    };
    let _ = invalidated;
    let updated = {
        let guard = engine.read();
        guard.catalogs.catalog(class).get(&id)?.clone()
    };
    Ok(Json(updated))
}

async fn delete_resource(
    State(state): State<AppState>,
    Path((class, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let class = parse_class(&class)?;
    let engine = state.engine();
    {
        let mut guard = engine.write();
        guard.remove_resource(class, &id)?;
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn list_projects(State(state): State<AppState>) -> Json<Vec<Project>> {
    let engine = state.engine();
    let projects = {
        let guard = engine.read();
        guard.projects().cloned().collect()
    };
    Json(projects)
}

async fn create_project(
    State(state): State<AppState>,
    Json(project): Json<Project>,
) -> Result<(StatusCode, Json<Project>), ApiError> {
    let engine = state.engine();
    {
        let mut guard = engine.write();
        guard.add_project(project.clone())?;
    }
    Ok((StatusCode::CREATED, Json(project)))
}

async fn list_boq(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<Vec<BoqItem>>, ApiError> {
    let engine = state.engine();
    let items = {
        let guard = engine.read();
        guard.boq_ref(&project_id)?.items()?
    };
    Ok(Json(items))
}

async fn upsert_boq_item(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(item): Json<BoqItem>,
) -> Result<(StatusCode, Json<BoqItem>), ApiError> {
    let engine = state.engine();
    let stored = {
        let mut guard = engine.write();
        guard.boq_mut(&project_id)?.upsert_item(item.clone())?;
        guard.boq_ref(&project_id)?.get_item(&item.id)?
    };
    Ok((StatusCode::CREATED, Json(stored)))
}

async fn get_boq_item(
    State(state): State<AppState>,
    Path((project_id, item_id)): Path<(String, String)>,
) -> Result<Json<BoqItem>, ApiError> {
    let engine = state.engine();
    let item = {
        let guard = engine.read();
        guard.boq_ref(&project_id)?.get_item(&item_id)?
    };
    Ok(Json(item))
}

async fn delete_boq_item(
    State(state): State<AppState>,
    Path((project_id, item_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let engine = state.engine();
    let removed = {
        let mut guard = engine.write();
        guard.boq_mut(&project_id)?.delete_item(&item_id)?
    };
    if !removed {
        return Err(ApiError::from(EngineError::UnknownResource { id: item_id }));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn analyze_item(
    State(state): State<AppState>,
    Path((project_id, item_id)): Path<(String, String)>,
    Json(spec): Json<DecompositionSpec>,
) -> Result<Json<UnitPriceAnalysis>, ApiError> {
    let engine = state.engine();
    let analyzed_at = chrono::Local::now().naive_local();
    let analysis = {
        let mut guard = engine.write();
        guard.analyze_item(&project_id, &item_id, &spec, analyzed_at)?
    };
    Ok(Json(analysis))
}

async fn get_analysis(
    State(state): State<AppState>,
    Path((_project_id, item_id)): Path<(String, String)>,
) -> Result<Json<UnitPriceAnalysis>, ApiError> {
    let engine = state.engine();
    let analysis = {
        let guard = engine.read();
        guard
            .analysis(&item_id)
            .cloned()
            .ok_or(EngineError::UnknownResource { id: item_id })?
    };
    Ok(Json(analysis))
}

async fn apply_strategy(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(request): Json<StrategyRequest>,
) -> Result<Json<StrategyOutcome>, ApiError> {
    let engine = state.engine();
    let outcome = {
        let guard = engine.read();
        guard.apply_strategy(&project_id, &request)?
    };
    Ok(Json(outcome))
}

async fn compare_strategies(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<Vec<ComparisonEntry>>, ApiError> {
    let engine = state.engine();
    let entries = {
        let guard = engine.read();
        guard.compare_strategies(&project_id)?
    };
    Ok(Json(entries))
}

async fn local_content(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<LocalContentReport>, ApiError> {
    let engine = state.engine();
    let report = {
        let guard = engine.read();
        guard.local_content(&project_id)?
    };
    Ok(Json(report))
}

async fn allocate(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<Vec<crate::Allocation>>, ApiError> {
    let engine = state.engine();
    let rows = {
        let mut guard = engine.write();
        guard.allocate(&project_id)?
    };
    Ok(Json(rows))
}

async fn list_departments(State(state): State<AppState>) -> Json<Vec<Department>> {
    let engine = state.engine();
    let departments = {
        let guard = engine.read();
        guard.departments().cloned().collect()
    };
    Json(departments)
}

async fn add_department(
    State(state): State<AppState>,
    Json(department): Json<Department>,
) -> Result<(StatusCode, Json<Department>), ApiError> {
    let engine = state.engine();
    {
        let mut guard = engine.write();
        guard.add_department(department.clone())?;
    }
    Ok((StatusCode::CREATED, Json(department)))
}

async fn coverage(State(state): State<AppState>) -> Json<Vec<CoverageRow>> {
    let engine = state.engine();
    let rows = {
        let guard = engine.read();
        guard.coverage_report()
    };
    Json(rows)
}

async fn list_risks(State(state): State<AppState>) -> Json<Vec<Risk>> {
    let engine = state.engine();
    let risks = {
        let guard = engine.read();
        guard.risks.risks().to_vec()
    };
    Json(risks)
}

async fn add_risk(
    State(state): State<AppState>,
    Json(risk): Json<Risk>,
) -> Result<(StatusCode, Json<Risk>), ApiError> {
    let engine = state.engine();
    {
        let mut guard = engine.write();
        guard.risks.add(risk.clone())?;
    }
    Ok((StatusCode::CREATED, Json(risk)))
}

async fn risk_matrix(State(state): State<AppState>) -> Json<[[u32; 4]; 4]> {
    let engine = state.engine();
    let grid = {
        let guard = engine.read();
        guard.risks.matrix()
    };
    Json(grid)
}

#[derive(Debug, Deserialize)]
struct ResponsePlanQuery {
    #[serde(default = "default_min_score")]
    min_score: u8,
}

fn default_min_score() -> u8 {
    9
}

async fn response_plan(
    State(state): State<AppState>,
    Query(query): Query<ResponsePlanQuery>,
) -> Json<Vec<Risk>> {
    let engine = state.engine();
    let plan = {
        let guard = engine.read();
        guard
            .risks
            .response_plan(query.min_score)
            .into_iter()
            .cloned()
            .collect()
    };
    Json(plan)
}

#[derive(Debug, Deserialize)]
struct TrendQuery {
    start: Option<chrono::NaiveDate>,
    end: Option<chrono::NaiveDate>,
}

async fn price_trend(
    State(state): State<AppState>,
    Path(resource_id): Path<String>,
    Query(query): Query<TrendQuery>,
) -> Result<Json<PriceHistoryReport>, ApiError> {
    let window = match (query.start, query.end) {
        (Some(start), Some(end)) => Some((start, end)),
        _ => None,
    };
    let engine = state.engine();
    let report = {
        let guard = engine.read();
        guard.price_trend(&resource_id, window)?
    };
    Ok(Json(report))
}
