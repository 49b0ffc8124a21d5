use super::{PersistenceError, PersistenceResult};
use crate::allocation::{Allocation, Department};
use crate::analysis::UnitPriceAnalysis;
use crate::boq::{BillOfQuantities, BoqItem};
use crate::catalog::{
    Catalog, Catalogs, EquipmentDetail, LabourDetail, MaterialDetail, RateSet, Resource,
    ResourceClass, ResourceKind, SubcontractorDetail,
};
use crate::price_history::{PriceHistoryStore, TrendConfig};
use crate::project::Project;
use crate::risk::RiskRegister;
use crate::state::EngineState;
use crate::units::Unit;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

/// Canonical single-document serialization of the engine state.
#[derive(Debug, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub catalogs: Catalogs,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub boq_items_by_project: BTreeMap<String, Vec<BoqItem>>,
    #[serde(default)]
    pub analyses_by_item: BTreeMap<String, UnitPriceAnalysis>,
    #[serde(default)]
    pub departments: Vec<Department>,
    #[serde(default)]
    pub allocations: Vec<Allocation>,
    #[serde(default)]
    pub risks: RiskRegister,
    #[serde(default)]
    pub price_history: PriceHistoryStore,
    #[serde(default)]
    pub trend_config: TrendConfig,
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self {
            catalogs: Catalogs::new(),
            projects: Vec::new(),
            boq_items_by_project: BTreeMap::new(),
            analyses_by_item: BTreeMap::new(),
            departments: Vec::new(),
            allocations: Vec::new(),
            risks: RiskRegister::new(),
            price_history: PriceHistoryStore::new(),
            trend_config: TrendConfig::default(),
        }
    }
}

impl StateSnapshot {
    pub fn from_state(state: &EngineState) -> PersistenceResult<Self> {
        let mut boq_items_by_project = BTreeMap::new();
        let mut projects = Vec::new();
        for project in state.projects() {
            let items = state.boq_ref(&project.id)?.items()?;
            boq_items_by_project.insert(project.id.clone(), items);
            projects.push(project.clone());
        }
        Ok(Self {
            catalogs: state.catalogs.clone(),
            projects,
            boq_items_by_project,
            analyses_by_item: state.analyses().clone(),
            departments: state.departments().cloned().collect(),
            allocations: state.allocations().to_vec(),
            risks: state.risks.clone(),
            price_history: state.price_history.clone(),
            trend_config: state.trend_config,
        })
    }

    pub fn into_state(self) -> PersistenceResult<EngineState> {
        let mut state = EngineState::new();
        state.catalogs = self.catalogs;
        for project in self.projects {
            state.add_project(project)?;
        }
        for (project_id, items) in self.boq_items_by_project {
            let boq = BillOfQuantities::from_items(items)?;
            state.restore_boq(project_id, boq);
        }
        for (_, analysis) in self.analyses_by_item {
            state.set_analysis(analysis);
        }
        for department in self.departments {
            state.add_department(department)?;
        }
        state.restore_allocations(self.allocations);
        state.risks = self.risks;
        state.price_history = self.price_history;
        state.trend_config = self.trend_config;
        Ok(state)
    }
}

pub fn save_state_to_json<P: AsRef<Path>>(state: &EngineState, path: P) -> PersistenceResult<()> {
    let snapshot = StateSnapshot::from_state(state)?;
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, &snapshot)?;
    Ok(())
}

pub fn load_state_from_json<P: AsRef<Path>>(path: P) -> PersistenceResult<EngineState> {
    let file = File::open(path)?;
    let snapshot: StateSnapshot = serde_json::from_reader(file)?;
    snapshot.into_state()
}

// ---- catalog CSV ----

fn known_headers(class: ResourceClass) -> &'static [&'static str] {
    match class {
        ResourceClass::Materials => &[
            "id",
            "name",
            "category",
            "subcategory",
            "is_local",
            "description",
            "unit",
            "price",
            "supplier",
            "origin",
            "lead_time_days",
            "min_order",
        ],
        ResourceClass::Equipment => &[
            "id",
            "name",
            "category",
            "subcategory",
            "is_local",
            "description",
            "rate_hourly",
            "rate_daily",
            "rate_weekly",
            "rate_monthly",
            "fuel_consumption",
            "maintenance_period_days",
            "maintenance_cost",
            "operator_required",
        ],
        ResourceClass::Labor => &[
            "id",
            "name",
            "category",
            "subcategory",
            "is_local",
            "description",
            "rate_hourly",
            "rate_daily",
            "rate_weekly",
            "rate_monthly",
            "nationality",
            "skills",
            "certifications",
        ],
        ResourceClass::Subcontractors => &[
            "id",
            "name",
            "category",
            "subcategory",
            "is_local",
            "description",
            "classification",
            "experience_years",
            "rating",
            "specialties",
            "min_project_value",
            "max_project_value",
            "contact",
        ],
    }
}

fn known_value(resource: &Resource, header: &str) -> String {
    match header {
        "id" => resource.id.clone(),
        "name" => resource.name.clone(),
        "category" => resource.category.clone(),
        "subcategory" => resource.subcategory.clone(),
        "is_local" => resource.is_local.to_string(),
        "description" => resource.description.clone(),
        other => match &resource.kind {
            ResourceKind::Material(detail) => match other {
                "unit" => detail.unit.as_str().to_string(),
                "price" => detail.price.to_string(),
                "supplier" => detail.supplier.clone(),
                "origin" => detail.origin.clone(),
                "lead_time_days" => detail.lead_time_days.to_string(),
                "min_order" => detail.min_order.to_string(),
                _ => String::new(),
            },
            ResourceKind::Equipment(detail) => match other {
                "rate_hourly" => format_option_f64(detail.rates.hourly),
                "rate_daily" => format_option_f64(detail.rates.daily),
                "rate_weekly" => format_option_f64(detail.rates.weekly),
                "rate_monthly" => format_option_f64(detail.rates.monthly),
                "fuel_consumption" => detail.fuel_consumption.to_string(),
                "maintenance_period_days" => detail.maintenance_period_days.to_string(),
                "maintenance_cost" => detail.maintenance_cost.to_string(),
                "operator_required" => detail.operator_required.to_string(),
                _ => String::new(),
            },
            ResourceKind::Labour(detail) => match other {
                "rate_hourly" => format_option_f64(detail.rates.hourly),
                "rate_daily" => format_option_f64(detail.rates.daily),
                "rate_weekly" => format_option_f64(detail.rates.weekly),
                "rate_monthly" => format_option_f64(detail.rates.monthly),
                "nationality" => detail.nationality.clone(),
                "skills" => join_strings(&detail.skills),
                "certifications" => join_strings(&detail.certifications),
                _ => String::new(),
            },
            ResourceKind::Subcontractor(detail) => match other {
                "classification" => detail.classification.to_string(),
                "experience_years" => detail.experience_years.to_string(),
                "rating" => detail.rating.to_string(),
                "specialties" => join_strings(&detail.specialties),
                "min_project_value" => format_option_f64(detail.min_project_value),
                "max_project_value" => format_option_f64(detail.max_project_value),
                "contact" => detail.contact.clone().unwrap_or_default(),
                _ => String::new(),
            },
        },
    }
}

/// Export a catalog. Columns are the class's known set followed by the
/// union of preserved extra columns.
pub fn save_catalog_to_csv<P: AsRef<Path>>(catalog: &Catalog, path: P) -> PersistenceResult<()> {
    let known = known_headers(catalog.class());
    let mut extra_headers: Vec<String> = Vec::new();
    for resource in catalog.iter() {
        for key in resource.extra.keys() {
            if !extra_headers.iter().any(|existing| existing == key) {
                extra_headers.push(key.clone());
            }
        }
    }
    extra_headers.sort();

    let file = File::create(path)?;
    let mut writer = csv::Writer::from_writer(file);
    let mut header_row: Vec<&str> = known.to_vec();
    for header in &extra_headers {
        header_row.push(header.as_str());
    }
    writer.write_record(&header_row)?;

    for resource in catalog.iter() {
        let mut row: Vec<String> = known
            .iter()
            .map(|header| known_value(resource, header))
            .collect();
        for header in &extra_headers {
            row.push(resource.extra.get(header).cloned().unwrap_or_default());
        }
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

struct Row<'a> {
    headers: &'a csv::StringRecord,
    record: &'a csv::StringRecord,
}

impl<'a> Row<'a> {
    fn get(&self, header: &str) -> Option<&str> {
        self.headers
            .iter()
            .position(|candidate| candidate.eq_ignore_ascii_case(header))
            .and_then(|idx| self.record.get(idx))
            .map(str::trim)
    }

    fn required(&self, header: &str) -> PersistenceResult<&str> {
        match self.get(header) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(PersistenceError::InvalidData(format!(
                "missing required column '{header}'"
            ))),
        }
    }
}

fn row_rates(row: &Row<'_>) -> PersistenceResult<RateSet> {
    Ok(RateSet {
        hourly: parse_opt_f64(row.get("rate_hourly").unwrap_or(""))?,
        daily: parse_opt_f64(row.get("rate_daily").unwrap_or(""))?,
        weekly: parse_opt_f64(row.get("rate_weekly").unwrap_or(""))?,
        monthly: parse_opt_f64(row.get("rate_monthly").unwrap_or(""))?,
    })
}

fn row_to_resource(class: ResourceClass, row: &Row<'_>) -> PersistenceResult<Resource> {
    let kind = match class {
        ResourceClass::Materials => {
            let unit_str = row.required("unit")?;
            let unit = Unit::from_str(unit_str).ok_or_else(|| {
                PersistenceError::InvalidData(format!("unknown unit '{unit_str}'"))
            })?;
            ResourceKind::Material(MaterialDetail {
                unit,
                price: parse_f64(row.required("price")?)?,
                supplier: row.get("supplier").unwrap_or("").to_string(),
                origin: row.get("origin").unwrap_or("").to_string(),
                lead_time_days: parse_opt_u32(row.get("lead_time_days").unwrap_or(""))?
                    .unwrap_or(0),
                min_order: parse_opt_f64(row.get("min_order").unwrap_or(""))?.unwrap_or(0.0),
            })
        }
        ResourceClass::Equipment => ResourceKind::Equipment(EquipmentDetail {
            rates: row_rates(row)?,
            fuel_consumption: parse_opt_f64(row.get("fuel_consumption").unwrap_or(""))?
                .unwrap_or(0.0),
            maintenance_period_days: parse_opt_u32(
                row.get("maintenance_period_days").unwrap_or(""),
            )?
            .unwrap_or(0),
            maintenance_cost: parse_opt_f64(row.get("maintenance_cost").unwrap_or(""))?
                .unwrap_or(0.0),
            operator_required: parse_opt_bool(row.get("operator_required").unwrap_or(""))?
                .unwrap_or(false),
        }),
        ResourceClass::Labor => ResourceKind::Labour(LabourDetail {
            rates: row_rates(row)?,
            nationality: row.get("nationality").unwrap_or("").to_string(),
            skills: split_strings(row.get("skills").unwrap_or("")),
            certifications: split_strings(row.get("certifications").unwrap_or("")),
        }),
        ResourceClass::Subcontractors => ResourceKind::Subcontractor(SubcontractorDetail {
            classification: parse_u8(row.required("classification")?)?,
            experience_years: parse_opt_u32(row.get("experience_years").unwrap_or(""))?
                .unwrap_or(0),
            rating: parse_opt_f64(row.get("rating").unwrap_or(""))?.unwrap_or(3.0),
            specialties: split_strings(row.get("specialties").unwrap_or("")),
            min_project_value: parse_opt_f64(row.get("min_project_value").unwrap_or(""))?,
            max_project_value: parse_opt_f64(row.get("max_project_value").unwrap_or(""))?,
            contact: row
                .get("contact")
                .filter(|value| !value.is_empty())
                .map(ToOwned::to_owned),
        }),
    };

    // Columns the class does not know about are preserved verbatim.
    let known = known_headers(class);
    let mut extra = BTreeMap::new();
    for (idx, header) in row.headers.iter().enumerate() {
        if known.iter().any(|candidate| candidate.eq_ignore_ascii_case(header)) {
            continue;
        }
        if let Some(value) = row.record.get(idx) {
            if !value.trim().is_empty() {
                extra.insert(header.to_string(), value.to_string());
            }
        }
    }

    Ok(Resource {
        id: row.required("id")?.to_string(),
        name: row.required("name")?.to_string(),
        category: row.get("category").unwrap_or("").to_string(),
        subcategory: row.get("subcategory").unwrap_or("").to_string(),
        is_local: parse_opt_bool(row.get("is_local").unwrap_or(""))?.unwrap_or(false),
        description: row.get("description").unwrap_or("").to_string(),
        kind,
        extra,
    })
}

/// Parse one class's catalog rows from CSV. Rows come back in file order so
/// the catalog's upsert-on-import keeps the last duplicate.
pub fn load_catalog_from_csv<P: AsRef<Path>>(
    class: ResourceClass,
    path: P,
) -> PersistenceResult<Vec<Resource>> {
    let file = File::open(path)?;
    let mut reader = csv::Reader::from_reader(file);
    let headers = reader.headers()?.clone();
    let mut resources = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row = Row {
            headers: &headers,
            record: &record,
        };
        resources.push(row_to_resource(class, &row)?);
    }
    Ok(resources)
}

// ---- BoQ CSV ----

pub fn save_boq_to_csv<P: AsRef<Path>>(boq: &BillOfQuantities, path: P) -> PersistenceResult<()> {
    let file = File::create(path)?;
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record([
        "code",
        "description",
        "unit",
        "quantity",
        "unit_price",
        "category",
        "total_price",
    ])?;
    for item in boq.items()? {
        writer.write_record([
            item.code.as_str(),
            item.description.as_str(),
            item.unit.as_str(),
            &item.quantity.to_string(),
            &item.unit_price.to_string(),
            item.category.as_deref().unwrap_or(""),
            &item.total_price.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Bulk-import rows with columns {code, description, unit, quantity,
/// unit_price, category}. The item id is the code; `total_price` in the
/// file is ignored and re-derived.
pub fn load_boq_from_csv<P: AsRef<Path>>(path: P) -> PersistenceResult<Vec<BoqItem>> {
    let file = File::open(path)?;
    let mut reader = csv::Reader::from_reader(file);
    let headers = reader.headers()?.clone();
    let mut items = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row = Row {
            headers: &headers,
            record: &record,
        };
        let code = row.required("code")?.to_string();
        let unit_str = row.required("unit")?;
        let unit = Unit::from_str(unit_str).ok_or_else(|| {
            PersistenceError::InvalidData(format!("unknown unit '{unit_str}'"))
        })?;
        let mut item = BoqItem::new(
            code.clone(),
            code,
            row.get("description").unwrap_or("").to_string(),
            unit,
            parse_f64(row.required("quantity")?)?,
            parse_f64(row.required("unit_price")?)?,
        );
        item.category = row
            .get("category")
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned);
        items.push(item);
    }
    Ok(items)
}

// ---- string helpers ----

fn format_option_f64(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn parse_f64(input: &str) -> PersistenceResult<f64> {
    input
        .trim()
        .parse::<f64>()
        .map_err(|e| PersistenceError::InvalidData(format!("invalid number '{input}': {e}")))
}

fn parse_opt_f64(input: &str) -> PersistenceResult<Option<f64>> {
    if input.trim().is_empty() {
        return Ok(None);
    }
    parse_f64(input).map(Some)
}

fn parse_u8(input: &str) -> PersistenceResult<u8> {
    input
        .trim()
        .parse::<u8>()
        .map_err(|e| PersistenceError::InvalidData(format!("invalid integer '{input}': {e}")))
}

fn parse_opt_u32(input: &str) -> PersistenceResult<Option<u32>> {
    if input.trim().is_empty() {
        return Ok(None);
    }
    input
        .trim()
        .parse::<u32>()
        .map(Some)
        .map_err(|e| PersistenceError::InvalidData(format!("invalid integer '{input}': {e}")))
}

fn parse_opt_bool(input: &str) -> PersistenceResult<Option<bool>> {
    if input.trim().is_empty() {
        return Ok(None);
    }
    match input.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(Some(true)),
        "false" | "no" | "0" => Ok(Some(false)),
        other => Err(PersistenceError::InvalidData(format!(
            "invalid boolean '{other}'"
        ))),
    }
}

fn join_strings(values: &[String]) -> String {
    values.join(";")
}

fn split_strings(input: &str) -> Vec<String> {
    if input.trim().is_empty() {
        return Vec::new();
    }
    input.split(';').map(|s| s.trim().to_string()).collect()
}
