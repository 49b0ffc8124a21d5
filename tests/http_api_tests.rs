#![cfg(feature = "http_api")]

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
};
use pricing_tool::{
    BoqItem, EngineState, MaterialDetail, Project, Resource, ResourceKind, Unit, http_api,
};
use serde_json::json;
use std::collections::BTreeMap;
use tower::util::ServiceExt;

fn new_router() -> axum::Router {
    let state = http_api::AppState::new(EngineState::new());
    http_api::router(state)
}

fn material(id: &str) -> Resource {
    Resource {
        id: id.into(),
        name: format!("Material {id}"),
        category: "steel".into(),
        subcategory: "rebar".into(),
        is_local: true,
        description: String::new(),
        kind: ResourceKind::Material(MaterialDetail {
            unit: Unit::Ton,
            price: 700.0,
            supplier: String::new(),
            origin: String::new(),
            lead_time_days: 0,
            min_order: 0.0,
        }),
        extra: BTreeMap::new(),
    }
}

async fn post_json(app: &axum::Router, uri: &str, payload: &impl serde::Serialize) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(payload).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn get_json(app: &axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn catalog_lifecycle_via_http_api() {
    let app = new_router();

    let (status, _) = post_json(&app, "/catalogs/materials", &material("ST-1")).await;
    assert_eq!(status, StatusCode::CREATED);

    // Duplicate add conflicts.
    let (status, body) = post_json(&app, "/catalogs/materials", &material("ST-1")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["kind"], json!("DuplicateId"));

    let (status, fetched) = get_json(&app, "/catalogs/materials/ST-1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["name"], json!("Material ST-1"));

    let (status, listed) = get_json(&app, "/catalogs/materials?is_local=true").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, body) = get_json(&app, "/catalogs/materials/ghost").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["kind"], json!("UnknownResource"));
}

#[tokio::test]
async fn analyze_and_price_via_http_api() {
    let app = new_router();

    let (status, _) = post_json(&app, "/projects", &Project::new("P-1", "Depot")).await;
    assert_eq!(status, StatusCode::CREATED);

    let item = BoqItem::new("A-1", "A-1", "Earthworks", Unit::CubicMeter, 100.0, 25.0);
    let (status, _) = post_json(&app, "/projects/P-1/boq", &item).await;
    assert_eq!(status, StatusCode::CREATED);

    let spec = json!({
        "mode": "top_down",
        "materials": {"percentage": 0.45},
        "equipment": {"percentage": 0.25},
        "labor": {"percentage": 0.2},
        "subcontractors": {"percentage": 0.1},
        "overhead_pct": 0.1,
        "profit_pct": 0.15,
        "contingency_pct": 0.05,
        "auto_normalize": false
    });
    let (status, analysis) = post_json(&app, "/projects/P-1/analyses/A-1", &spec).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(analysis["direct_cost"], json!(25.0));
    assert_eq!(analysis["total_cost"], json!(32.5));

    let (status, outcome) = post_json(
        &app,
        "/projects/P-1/strategies/apply",
        &json!({"strategy": "standard", "profit_margin": 0.0}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["total_cost"], outcome["total_price"]);

    let (status, entries) = get_json(&app, "/projects/P-1/strategies").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(entries.as_array().unwrap().len(), 6);

    let (status, report) = get_json(&app, "/projects/P-1/local-content").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["percentage"], json!(0.0));
}

#[tokio::test]
async fn invalid_decomposition_returns_bad_request() {
    let app = new_router();
    post_json(&app, "/projects", &Project::new("P-1", "Depot")).await;
    let item = BoqItem::new("A-1", "A-1", "Earthworks", Unit::CubicMeter, 100.0, 25.0);
    post_json(&app, "/projects/P-1/boq", &item).await;

    let spec = json!({
        "mode": "top_down",
        "materials": {"percentage": 0.8},
        "equipment": {"percentage": 0.4},
        "labor": {"percentage": 0.2},
        "subcontractors": {"percentage": 0.1},
        "overhead_pct": 0.1,
        "profit_pct": 0.15,
        "contingency_pct": 0.05,
        "auto_normalize": false
    });
    let (status, body) = post_json(&app, "/projects/P-1/analyses/A-1", &spec).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], json!("InvalidDecomposition"));
}

#[tokio::test]
async fn risk_matrix_via_http_api() {
    let app = new_router();
    let risk = json!({
        "id": "R-1",
        "category": "supply",
        "description": "Cement shortage",
        "probability": "likely",
        "impact": "high",
        "response_strategy": "mitigate",
        "action_plan": "second supplier",
        "owner": "procurement"
    });
    let (status, _) = post_json(&app, "/risks", &risk).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, grid) = get_json(&app, "/risks/matrix").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(grid[2][2], json!(1));

    let (status, plan) = get_json(&app, "/risks/response-plan").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(plan.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn deleting_boq_item_then_fetching_is_not_found() {
    let app = new_router();
    post_json(&app, "/projects", &Project::new("P-1", "Depot")).await;
    let item = BoqItem::new("A-1", "A-1", "Earthworks", Unit::CubicMeter, 100.0, 25.0);
    post_json(&app, "/projects/P-1/boq", &item).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/projects/P-1/boq/A-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let (status, _) = get_json(&app, "/projects/P-1/boq/A-1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
