use chrono::{NaiveDate, NaiveDateTime};
use pricing_tool::analysis::{ClassSpec, DecompositionSpec, ReconcileMode};
use pricing_tool::{
    BoqItem, Catalog, Department, EngineState, Impact, MaterialDetail, PriceSample, Probability,
    Project, Resource, ResourceClass, ResourceKind, ResponseStrategy, Risk, StateSnapshot, Unit,
    load_boq_from_csv, load_catalog_from_csv, load_state_from_json, save_boq_to_csv,
    save_catalog_to_csv, save_state_to_json,
};
use std::collections::BTreeMap;
use tempfile::NamedTempFile;

fn ts() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 8, 1)
        .unwrap()
        .and_hms_opt(7, 45, 0)
        .unwrap()
}

fn material(id: &str, extra: &[(&str, &str)]) -> Resource {
    Resource {
        id: id.into(),
        name: format!("Material {id}"),
        category: "steel".into(),
        subcategory: "rebar".into(),
        is_local: true,
        description: "High yield".into(),
        kind: ResourceKind::Material(MaterialDetail {
            unit: Unit::Ton,
            price: 715.5,
            supplier: "Mill Co".into(),
            origin: "domestic".into(),
            lead_time_days: 14,
            min_order: 2.5,
        }),
        extra: extra
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<String, String>>(),
    }
}

fn build_sample_state() -> EngineState {
    let mut state = EngineState::new();
    state.catalogs.materials.add(material("ST-1", &[])).unwrap();

    let mut project = Project::new("P-1", "Terminal expansion");
    project.client = "Port authority".into();
    project.profit_margin = 0.12;
    project.local_content_target = 0.35;
    state.add_project(project).unwrap();

    state
        .boq_mut("P-1")
        .unwrap()
        .upsert_item(BoqItem::new("A-1", "A-1", "Rebar supply", Unit::Ton, 40.0, 900.0))
        .unwrap();

    let spec = DecompositionSpec {
        mode: ReconcileMode::TopDown,
        materials: ClassSpec::lump(0.55),
        equipment: ClassSpec::lump(0.15),
        labor: ClassSpec::lump(0.20),
        subcontractors: ClassSpec::lump(0.10),
        overhead_pct: 0.08,
        profit_pct: 0.12,
        contingency_pct: 0.03,
        auto_normalize: false,
    };
    state.analyze_item("P-1", "A-1", &spec, ts()).unwrap();

    state
        .add_department(Department {
            id: "D-1".into(),
            name: "Estimating".into(),
            category: pricing_tool::DepartmentCategory::Technical,
            annual_cost: 800_000.0,
            staff_count: 6,
            allocation_method: pricing_tool::AllocationMethod::FixedAmountPerProject,
            allocation_percentage: None,
            fixed_cost: Some(25_000.0),
        })
        .unwrap();
    state.allocate("P-1").unwrap();

    state
        .risks
        .add(Risk {
            id: "R-1".into(),
            category: "supply".into(),
            description: "Steel price spike".into(),
            probability: Probability::Possible,
            impact: Impact::High,
            response_strategy: ResponseStrategy::Transfer,
            action_plan: "index-linked supply contract".into(),
            owner: "procurement".into(),
            deadline: NaiveDate::from_ymd_opt(2026, 10, 1),
        })
        .unwrap();

    state
        .price_history
        .record_sample(PriceSample {
            resource_id: "ST-1".into(),
            date: NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
            price: 700.0,
            source: None,
            notes: None,
        })
        .unwrap();

    state
}

fn snapshots_equal(a: &EngineState, b: &EngineState) {
    let snap_a = serde_json::to_value(StateSnapshot::from_state(a).unwrap()).unwrap();
    let snap_b = serde_json::to_value(StateSnapshot::from_state(b).unwrap()).unwrap();
    assert_eq!(snap_a, snap_b);
}

#[test]
fn json_state_round_trip_is_lossless() {
    let state = build_sample_state();
    let file = NamedTempFile::new().unwrap();

    save_state_to_json(&state, file.path()).unwrap();
    let loaded = load_state_from_json(file.path()).unwrap();

    snapshots_equal(&state, &loaded);

    // Save the loaded state again: byte-identical document.
    let second = NamedTempFile::new().unwrap();
    save_state_to_json(&loaded, second.path()).unwrap();
    let first_doc = std::fs::read_to_string(file.path()).unwrap();
    let second_doc = std::fs::read_to_string(second.path()).unwrap();
    assert_eq!(first_doc, second_doc);
}

#[test]
fn reanalyzing_a_reloaded_state_reproduces_the_analysis() {
    let state = build_sample_state();
    let file = NamedTempFile::new().unwrap();
    save_state_to_json(&state, file.path()).unwrap();
    let mut loaded = load_state_from_json(file.path()).unwrap();

    let original = state.analysis("A-1").cloned().unwrap();
    let spec = DecompositionSpec {
        mode: ReconcileMode::TopDown,
        materials: ClassSpec::lump(0.55),
        equipment: ClassSpec::lump(0.15),
        labor: ClassSpec::lump(0.20),
        subcontractors: ClassSpec::lump(0.10),
        overhead_pct: 0.08,
        profit_pct: 0.12,
        contingency_pct: 0.03,
        auto_normalize: false,
    };
    let reanalyzed = loaded.analyze_item("P-1", "A-1", &spec, ts()).unwrap();
    assert_eq!(reanalyzed, original);
}

#[test]
fn catalog_csv_round_trip_preserves_extra_columns() {
    let mut catalog = Catalog::new(ResourceClass::Materials);
    catalog
        .add(material("ST-1", &[("warehouse", "yard 3"), ("hs_code", "7214.20")]))
        .unwrap();
    catalog.add(material("ST-2", &[])).unwrap();

    let file = NamedTempFile::new().unwrap();
    save_catalog_to_csv(&catalog, file.path()).unwrap();
    let rows = load_catalog_from_csv(ResourceClass::Materials, file.path()).unwrap();

    let mut reloaded = Catalog::new(ResourceClass::Materials);
    reloaded.import(rows).unwrap();
    assert_eq!(reloaded.len(), 2);

    let with_extras = reloaded.get("ST-1").unwrap();
    assert_eq!(with_extras.extra.get("warehouse").map(String::as_str), Some("yard 3"));
    assert_eq!(with_extras.extra.get("hs_code").map(String::as_str), Some("7214.20"));
    match &with_extras.kind {
        ResourceKind::Material(detail) => {
            assert_eq!(detail.price, 715.5);
            assert_eq!(detail.unit, Unit::Ton);
            assert_eq!(detail.lead_time_days, 14);
        }
        _ => unreachable!(),
    }
}

#[test]
fn catalog_csv_import_keeps_last_duplicate_row() {
    let file = NamedTempFile::new().unwrap();
    std::fs::write(
        file.path(),
        "id,name,category,subcategory,unit,price\n\
         M-1,First,steel,rebar,ton,700\n\
         M-1,Second,steel,rebar,ton,750\n",
    )
    .unwrap();
    let rows = load_catalog_from_csv(ResourceClass::Materials, file.path()).unwrap();
    let mut catalog = Catalog::new(ResourceClass::Materials);
    catalog.import(rows).unwrap();
    assert_eq!(catalog.len(), 1);
    let winner = catalog.get("M-1").unwrap();
    assert_eq!(winner.name, "Second");
}

#[test]
fn catalog_csv_missing_required_column_fails() {
    let file = NamedTempFile::new().unwrap();
    std::fs::write(file.path(), "id,name,category,subcategory\nM-1,First,steel,rebar\n").unwrap();
    let err = load_catalog_from_csv(ResourceClass::Materials, file.path()).unwrap_err();
    assert!(err.to_string().contains("unit"));
}

#[test]
fn boq_csv_round_trip_rederives_totals() {
    let mut state = build_sample_state();
    state
        .boq_mut("P-1")
        .unwrap()
        .upsert_item(BoqItem::new("B-2", "B-2", "Mesh", Unit::SquareMeter, 120.0, 14.25))
        .unwrap();

    let file = NamedTempFile::new().unwrap();
    save_boq_to_csv(state.boq_ref("P-1").unwrap(), file.path()).unwrap();
    let items = load_boq_from_csv(file.path()).unwrap();
    assert_eq!(items.len(), 2);

    let mesh = items.iter().find(|item| item.code == "B-2").unwrap();
    assert_eq!(mesh.total_price, 1_710.0);
    assert_eq!(mesh.unit, Unit::SquareMeter);
}

#[test]
fn boq_csv_import_rejects_bad_numbers() {
    let file = NamedTempFile::new().unwrap();
    std::fs::write(
        file.path(),
        "code,description,unit,quantity,unit_price,category\nA-1,Works,m3,abc,10,civil\n",
    )
    .unwrap();
    assert!(load_boq_from_csv(file.path()).is_err());
}

#[cfg(feature = "sqlite")]
mod sqlite_round_trip {
    use super::*;
    use pricing_tool::{SqliteStateStore, StateStore};

    #[test]
    fn sqlite_store_round_trips_state() {
        let state = build_sample_state();
        let file = NamedTempFile::new().unwrap();
        let store = SqliteStateStore::new(file.path()).unwrap();

        store.save_state(&state).unwrap();
        let loaded = store.load_state().unwrap().expect("state stored");
        snapshots_equal(&state, &loaded);
    }

    #[test]
    fn empty_store_loads_nothing() {
        let file = NamedTempFile::new().unwrap();
        let store = SqliteStateStore::new(file.path()).unwrap();
        assert!(store.load_state().unwrap().is_none());
    }

    #[test]
    fn save_overwrites_previous_state() {
        let state = build_sample_state();
        let file = NamedTempFile::new().unwrap();
        let store = SqliteStateStore::new(file.path()).unwrap();
        store.save_state(&state).unwrap();

        let mut updated = store.load_state().unwrap().unwrap();
        updated
            .boq_mut("P-1")
            .unwrap()
            .upsert_item(BoqItem::new("C-3", "C-3", "Anchors", Unit::Piece, 500.0, 3.2))
            .unwrap();
        store.save_state(&updated).unwrap();

        let reloaded = store.load_state().unwrap().unwrap();
        assert_eq!(reloaded.boq_ref("P-1").unwrap().len(), 2);
    }
}
