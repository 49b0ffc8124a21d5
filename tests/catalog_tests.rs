use pricing_tool::{
    Catalog, CatalogFilter, Catalogs, EquipmentDetail, LabourDetail, MaterialDetail, RateSet,
    Resource, ResourceClass, ResourceKind, SubcontractorDetail, Unit,
};
use std::collections::BTreeMap;

fn material(id: &str, category: &str, is_local: bool, price: f64) -> Resource {
    Resource {
        id: id.into(),
        name: format!("Material {id}"),
        category: category.into(),
        subcategory: "general".into(),
        is_local,
        description: String::new(),
        kind: ResourceKind::Material(MaterialDetail {
            unit: Unit::Ton,
            price,
            supplier: "Supplier Co".into(),
            origin: if is_local { "domestic".into() } else { "import".into() },
            lead_time_days: 7,
            min_order: 1.0,
        }),
        extra: BTreeMap::new(),
    }
}

fn subcontractor(id: &str, classification: u8, rating: f64) -> Resource {
    Resource {
        id: id.into(),
        name: format!("Sub {id}"),
        category: "mep".into(),
        subcategory: "electrical".into(),
        is_local: true,
        description: String::new(),
        kind: ResourceKind::Subcontractor(SubcontractorDetail {
            classification,
            experience_years: 10,
            rating,
            specialties: vec!["substations".into()],
            min_project_value: Some(100_000.0),
            max_project_value: Some(10_000_000.0),
            contact: Some("bids@sub.example".into()),
        }),
        extra: BTreeMap::new(),
    }
}

#[test]
fn add_get_remove_round_trip() {
    let mut catalog = Catalog::new(ResourceClass::Materials);
    catalog.add(material("M-1", "steel", true, 700.0)).unwrap();

    let stored = catalog.get("M-1").unwrap();
    assert_eq!(stored.name, "Material M-1");

    let removed = catalog.remove("M-1").unwrap();
    assert_eq!(removed.id, "M-1");
    assert_eq!(catalog.get("M-1").unwrap_err().kind(), "UnknownResource");
}

#[test]
fn duplicate_add_fails_and_leaves_entry_untouched() {
    let mut catalog = Catalog::new(ResourceClass::Materials);
    catalog.add(material("M-1", "steel", true, 700.0)).unwrap();
    let err = catalog.add(material("M-1", "steel", true, 900.0)).unwrap_err();
    assert_eq!(err.kind(), "DuplicateId");
    match &catalog.get("M-1").unwrap().kind {
        ResourceKind::Material(detail) => assert_eq!(detail.price, 700.0),
        _ => unreachable!(),
    }
}

#[test]
fn update_revalidates_the_entry() {
    let mut catalog = Catalog::new(ResourceClass::Subcontractors);
    catalog.add(subcontractor("S-1", 2, 4.5)).unwrap();

    let err = catalog
        .update("S-1", |resource| {
            if let ResourceKind::Subcontractor(detail) = &mut resource.kind {
                detail.rating = 9.0;
            }
        })
        .unwrap_err();
    assert_eq!(err.kind(), "ValidationError");

    // Rejected update must not have landed.
    match &catalog.get("S-1").unwrap().kind {
        ResourceKind::Subcontractor(detail) => assert_eq!(detail.rating, 4.5),
        _ => unreachable!(),
    }
}

#[test]
fn list_filters_by_category_locality_and_classification() {
    let mut materials = Catalog::new(ResourceClass::Materials);
    materials.add(material("M-1", "steel", true, 700.0)).unwrap();
    materials.add(material("M-2", "steel", false, 650.0)).unwrap();
    materials.add(material("M-3", "concrete", true, 120.0)).unwrap();

    let steel = materials.list(&CatalogFilter {
        category: Some("steel".into()),
        ..CatalogFilter::default()
    });
    assert_eq!(steel.len(), 2);

    let local_steel = materials.list(&CatalogFilter {
        category: Some("steel".into()),
        is_local: Some(true),
        ..CatalogFilter::default()
    });
    assert_eq!(local_steel.len(), 1);
    assert_eq!(local_steel[0].id, "M-1");

    let imported = materials.list(&CatalogFilter {
        origin: Some("import".into()),
        ..CatalogFilter::default()
    });
    assert_eq!(imported.len(), 1);

    let mut subs = Catalog::new(ResourceClass::Subcontractors);
    subs.add(subcontractor("S-1", 1, 4.8)).unwrap();
    subs.add(subcontractor("S-2", 3, 3.2)).unwrap();

    let tier_one = subs.list(&CatalogFilter {
        classification: Some(1),
        ..CatalogFilter::default()
    });
    assert_eq!(tier_one.len(), 1);
    assert_eq!(tier_one[0].id, "S-1");

    let well_rated = subs.list(&CatalogFilter {
        min_rating: Some(4.0),
        ..CatalogFilter::default()
    });
    assert_eq!(well_rated.len(), 1);
}

#[test]
fn import_is_idempotent_and_later_rows_win() {
    let mut catalog = Catalog::new(ResourceClass::Materials);
    let rows = vec![
        material("M-1", "steel", true, 700.0),
        material("M-2", "steel", false, 650.0),
        material("M-1", "steel", true, 725.0),
    ];
    let imported = catalog.import(rows.clone()).unwrap();
    assert_eq!(imported, 3);
    assert_eq!(catalog.len(), 2);
    match &catalog.get("M-1").unwrap().kind {
        ResourceKind::Material(detail) => assert_eq!(detail.price, 725.0),
        _ => unreachable!(),
    }

    // Importing the same rows again changes nothing.
    catalog.import(rows).unwrap();
    assert_eq!(catalog.len(), 2);
}

#[test]
fn catalogs_find_searches_all_classes() {
    let mut catalogs = Catalogs::new();
    catalogs.materials.add(material("M-1", "steel", true, 700.0)).unwrap();
    catalogs
        .labour
        .add(Resource {
            id: "L-1".into(),
            name: "Steel fixer".into(),
            category: "structural".into(),
            subcategory: "rebar".into(),
            is_local: true,
            description: String::new(),
            kind: ResourceKind::Labour(LabourDetail {
                rates: RateSet::new(12.0, 96.0, 480.0, 2_112.0),
                nationality: String::new(),
                skills: vec!["rebar".into()],
                certifications: Vec::new(),
            }),
            extra: BTreeMap::new(),
        })
        .unwrap();
    catalogs
        .equipment
        .add(Resource {
            id: "EQ-1".into(),
            name: "Tower crane".into(),
            category: "lifting".into(),
            subcategory: "crane".into(),
            is_local: false,
            description: String::new(),
            kind: ResourceKind::Equipment(EquipmentDetail {
                rates: RateSet {
                    daily: Some(1_200.0),
                    ..RateSet::default()
                },
                fuel_consumption: 18.0,
                maintenance_period_days: 90,
                maintenance_cost: 4_000.0,
                operator_required: true,
            }),
            extra: BTreeMap::new(),
        })
        .unwrap();

    assert!(catalogs.find("M-1").is_some());
    assert!(catalogs.find("L-1").is_some());
    assert!(catalogs.find("EQ-1").is_some());
    assert!(catalogs.find("missing").is_none());
    assert_eq!(catalogs.get("missing").unwrap_err().kind(), "UnknownResource");
}

#[test]
fn equipment_rate_lookup_converts_missing_tiers() {
    let mut catalogs = Catalogs::new();
    catalogs
        .equipment
        .add(Resource {
            id: "EQ-2".into(),
            name: "Excavator".into(),
            category: "earthmoving".into(),
            subcategory: "tracked".into(),
            is_local: true,
            description: String::new(),
            kind: ResourceKind::Equipment(EquipmentDetail {
                rates: RateSet {
                    hourly: Some(80.0),
                    ..RateSet::default()
                },
                fuel_consumption: 22.0,
                maintenance_period_days: 30,
                maintenance_cost: 1_500.0,
                operator_required: true,
            }),
            extra: BTreeMap::new(),
        })
        .unwrap();

    let resource = catalogs.get("EQ-2").unwrap();
    // 80/hour over an 8-hour day.
    let daily = resource
        .unit_price_for(Unit::Day, &catalogs.time_config)
        .unwrap()
        .unwrap();
    assert_eq!(daily, 640.0);

    // A physical unit makes no sense for a rated resource.
    let err = resource
        .unit_price_for(Unit::CubicMeter, &catalogs.time_config)
        .unwrap_err();
    assert_eq!(err.kind(), "ValidationError");
}
