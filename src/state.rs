use crate::allocation::{self, Allocation, CoverageRow, Department};
use crate::analysis::{self, DecompositionSpec, UnitPriceAnalysis};
use crate::boq::BillOfQuantities;
use crate::catalog::{Catalogs, ResourceClass};
use crate::error::{EngineError, EngineResult};
use crate::local_content::{self, LocalContentReport};
use crate::price_history::{self, PriceHistoryReport, PriceHistoryStore, TrendConfig};
use crate::project::Project;
use crate::risk::RiskRegister;
use crate::strategy::{self, ComparisonEntry, PricingInput, StrategyOutcome, StrategyRequest};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::{BTreeMap, HashMap};

/// The whole engine as one value. The host owns it; every operation is a
/// method; reads never mutate.
#[derive(Debug, Default)]
pub struct EngineState {
    pub catalogs: Catalogs,
    projects: BTreeMap<String, Project>,
    boq: BTreeMap<String, BillOfQuantities>,
    analyses: BTreeMap<String, UnitPriceAnalysis>,
    departments: BTreeMap<String, Department>,
    allocations: Vec<Allocation>,
    pub risks: RiskRegister,
    pub price_history: PriceHistoryStore,
    pub trend_config: TrendConfig,
}

impl EngineState {
    pub fn new() -> Self {
        Self {
            catalogs: Catalogs::new(),
            projects: BTreeMap::new(),
            boq: BTreeMap::new(),
            analyses: BTreeMap::new(),
            departments: BTreeMap::new(),
            allocations: Vec::new(),
            risks: RiskRegister::new(),
            price_history: PriceHistoryStore::new(),
            trend_config: TrendConfig::default(),
        }
    }

    // ---- projects ----

    pub fn add_project(&mut self, project: Project) -> EngineResult<()> {
        if project.id.trim().is_empty() {
            return Err(EngineError::validation_field("project id must not be empty", "id"));
        }
        if self.projects.contains_key(&project.id) {
            return Err(EngineError::DuplicateId { id: project.id });
        }
        self.boq.insert(project.id.clone(), BillOfQuantities::new());
        self.projects.insert(project.id.clone(), project);
        Ok(())
    }

    pub fn project(&self, project_id: &str) -> EngineResult<&Project> {
        self.projects
            .get(project_id)
            .ok_or_else(|| EngineError::UnknownProject {
                id: project_id.to_string(),
            })
    }

    pub fn update_project<F>(&mut self, project_id: &str, mutate: F) -> EngineResult<()>
    where
        F: FnOnce(&mut Project),
    {
        let Some(project) = self.projects.get_mut(project_id) else {
            return Err(EngineError::UnknownProject {
                id: project_id.to_string(),
            });
        };
        mutate(project);
        if project.id != project_id {
            return Err(EngineError::validation_field(
                "project id cannot be changed by update",
                "id",
            ));
        }
        Ok(())
    }

    pub fn remove_project(&mut self, project_id: &str) -> EngineResult<Project> {
        let Some(project) = self.projects.remove(project_id) else {
            return Err(EngineError::UnknownProject {
                id: project_id.to_string(),
            });
        };
        if let Some(boq) = self.boq.remove(project_id) {
            if let Ok(items) = boq.items() {
                for item in items {
                    self.analyses.remove(&item.id);
                }
            }
        }
        self.allocations
            .retain(|allocation| allocation.project_id != project_id);
        Ok(project)
    }

    pub fn projects(&self) -> impl Iterator<Item = &Project> {
        self.projects.values()
    }

    /// Effective value: the explicit override, or the BoQ roll-up.
    pub fn project_value(&self, project_id: &str) -> EngineResult<f64> {
        let project = self.project(project_id)?;
        if let Some(value) = project.value {
            return Ok(value);
        }
        self.boq_ref(project_id)?.total_value()
    }

    // ---- BoQ ----

    pub fn boq_ref(&self, project_id: &str) -> EngineResult<&BillOfQuantities> {
        self.boq
            .get(project_id)
            .ok_or_else(|| EngineError::UnknownProject {
                id: project_id.to_string(),
            })
    }

    pub fn boq_mut(&mut self, project_id: &str) -> EngineResult<&mut BillOfQuantities> {
        self.boq
            .get_mut(project_id)
            .ok_or_else(|| EngineError::UnknownProject {
                id: project_id.to_string(),
            })
    }

    pub(crate) fn restore_boq(&mut self, project_id: String, boq: BillOfQuantities) {
        self.boq.insert(project_id, boq);
    }

    pub(crate) fn restore_allocations(&mut self, allocations: Vec<Allocation>) {
        self.allocations = allocations;
    }

    // ---- analyses ----

    /// Analyze one item and store the result, replacing any prior analysis.
    pub fn analyze_item(
        &mut self,
        project_id: &str,
        item_id: &str,
        spec: &DecompositionSpec,
        analyzed_at: NaiveDateTime,
    ) -> EngineResult<UnitPriceAnalysis> {
        let item = self.boq_ref(project_id)?.get_item(item_id)?;
        let analysis = analysis::analyze(&item, spec, &self.catalogs, analyzed_at)?;

        // Bottom-up analyses define the item's unit price.
        if analysis.unit_price != item.unit_price {
            let boq = self.boq_mut(project_id)?;
            boq.set_unit_price(item_id, analysis.unit_price)?;
        }

        self.analyses.insert(item_id.to_string(), analysis.clone());
        Ok(analysis)
    }

    pub fn analysis(&self, item_id: &str) -> Option<&UnitPriceAnalysis> {
        self.analyses.get(item_id)
    }

    pub fn set_analysis(&mut self, analysis: UnitPriceAnalysis) {
        self.analyses.insert(analysis.item_id.clone(), analysis);
    }

    pub fn analyses(&self) -> &BTreeMap<String, UnitPriceAnalysis> {
        &self.analyses
    }

    /// Mark every analysis referencing `resource_id` as stale. Their totals
    /// refuse to report until the host re-analyzes the items.
    pub fn invalidate(&mut self, resource_id: &str) -> usize {
        let mut count = 0;
        for analysis in self.analyses.values_mut() {
            if analysis.references_resource(resource_id) {
                analysis.dirty = true;
                count += 1;
            }
        }
        count
    }

    // ---- strategies ----

    fn pricing_parts(
        &self,
        project_id: &str,
    ) -> EngineResult<(&Project, Vec<crate::boq::BoqItem>, HashMap<String, UnitPriceAnalysis>)>
    {
        let project = self.project(project_id)?;
        let items = self.boq_ref(project_id)?.items()?;
        let analyses: HashMap<String, UnitPriceAnalysis> = items
            .iter()
            .filter_map(|item| {
                self.analyses
                    .get(&item.id)
                    .map(|analysis| (item.id.clone(), analysis.clone()))
            })
            .collect();
        Ok((project, items, analyses))
    }

    pub fn apply_strategy(
        &self,
        project_id: &str,
        request: &StrategyRequest,
    ) -> EngineResult<StrategyOutcome> {
        let (project, items, analyses) = self.pricing_parts(project_id)?;
        strategy::apply(
            PricingInput {
                project,
                items: &items,
                analyses: &analyses,
                catalogs: &self.catalogs,
            },
            request,
        )
    }

    pub fn compare_strategies(&self, project_id: &str) -> EngineResult<Vec<ComparisonEntry>> {
        let (project, items, analyses) = self.pricing_parts(project_id)?;
        Ok(strategy::compare(PricingInput {
            project,
            items: &items,
            analyses: &analyses,
            catalogs: &self.catalogs,
        }))
    }

    // ---- local content ----

    pub fn local_content(&self, project_id: &str) -> EngineResult<LocalContentReport> {
        let project = self.project(project_id)?;
        let items = self.boq_ref(project_id)?.items()?;
        let mut weighted: Vec<(f64, &UnitPriceAnalysis)> = Vec::new();
        for item in &items {
            if let Some(analysis) = self.analyses.get(&item.id) {
                analysis.current_total_cost()?;
                weighted.push((item.quantity, analysis));
            }
        }
        Ok(local_content::evaluate(
            &weighted,
            &self.catalogs,
            project.local_content_target,
        ))
    }

    // ---- departments & allocations ----

    pub fn add_department(&mut self, department: Department) -> EngineResult<()> {
        department.validate()?;
        if self.departments.contains_key(&department.id) {
            return Err(EngineError::DuplicateId { id: department.id });
        }
        self.departments.insert(department.id.clone(), department);
        Ok(())
    }

    pub fn department(&self, department_id: &str) -> EngineResult<&Department> {
        self.departments
            .get(department_id)
            .ok_or_else(|| EngineError::UnknownDepartment {
                id: department_id.to_string(),
            })
    }

    pub fn update_department<F>(&mut self, department_id: &str, mutate: F) -> EngineResult<()>
    where
        F: FnOnce(&mut Department),
    {
        let Some(existing) = self.departments.get(department_id) else {
            return Err(EngineError::UnknownDepartment {
                id: department_id.to_string(),
            });
        };
        let mut updated = existing.clone();
        mutate(&mut updated);
        if updated.id != department_id {
            return Err(EngineError::validation_field(
                "department id cannot be changed by update",
                "id",
            ));
        }
        updated.validate()?;
        self.departments.insert(department_id.to_string(), updated);
        Ok(())
    }

    pub fn remove_department(&mut self, department_id: &str) -> EngineResult<Department> {
        let Some(department) = self.departments.remove(department_id) else {
            return Err(EngineError::UnknownDepartment {
                id: department_id.to_string(),
            });
        };
        self.allocations
            .retain(|allocation| allocation.department_id != department_id);
        Ok(department)
    }

    pub fn departments(&self) -> impl Iterator<Item = &Department> {
        self.departments.values()
    }

    pub fn allocations(&self) -> &[Allocation] {
        &self.allocations
    }

    fn active_project_values(&self) -> EngineResult<Vec<f64>> {
        let ids: Vec<String> = self.projects.keys().cloned().collect();
        ids.iter().map(|id| self.project_value(id)).collect()
    }

    /// Allocate every department onto one project and record the rows,
    /// replacing the project's previous rows.
    pub fn allocate(&mut self, project_id: &str) -> EngineResult<Vec<Allocation>> {
        let project = self.project(project_id)?.clone();
        let project_value = self.project_value(project_id)?;
        let active_values = self.active_project_values()?;
        let departments: Vec<Department> = self.departments.values().cloned().collect();
        let rows = allocation::allocate(&departments, &project, project_value, &active_values)?;
        self.allocations
            .retain(|allocation| allocation.project_id != project_id);
        self.allocations.extend(rows.clone());
        Ok(rows)
    }

    /// Recompute every project's allocations against current values and
    /// parameters.
    pub fn reallocate_all(&mut self) -> EngineResult<usize> {
        let project_ids: Vec<String> = self.projects.keys().cloned().collect();
        let mut count = 0;
        for project_id in project_ids {
            count += self.allocate(&project_id)?.len();
        }
        Ok(count)
    }

    pub fn coverage_report(&self) -> Vec<CoverageRow> {
        let departments: Vec<Department> = self.departments.values().cloned().collect();
        allocation::coverage_report(&departments, &self.allocations)
    }

    // ---- price history ----

    pub fn price_trend(
        &self,
        resource_id: &str,
        window: Option<(NaiveDate, NaiveDate)>,
    ) -> EngineResult<PriceHistoryReport> {
        price_history::analyze_samples(
            resource_id,
            self.price_history.samples(resource_id),
            window,
            &self.trend_config,
        )
    }

    // ---- catalog pass-throughs that maintain the dirty bits ----

    /// Update a catalog entry and invalidate analyses that reference it.
    pub fn update_resource<F>(
        &mut self,
        class: ResourceClass,
        resource_id: &str,
        mutate: F,
    ) -> EngineResult<usize>
    where
        F: FnOnce(&mut crate::catalog::Resource),
    {
        self.catalogs.catalog_mut(class).update(resource_id, mutate)?;
        Ok(self.invalidate(resource_id))
    }

    pub fn remove_resource(
        &mut self,
        class: ResourceClass,
        resource_id: &str,
    ) -> EngineResult<usize> {
        self.catalogs.catalog_mut(class).remove(resource_id)?;
        Ok(self.invalidate(resource_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{ClassSpec, ComponentInput, ReconcileMode};
    use crate::boq::BoqItem;
    use crate::catalog::{MaterialDetail, Resource, ResourceKind};
    use crate::units::Unit;

    fn timestamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 4, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn material(id: &str, price: f64) -> Resource {
        Resource {
            id: id.into(),
            name: id.into(),
            category: "steel".into(),
            subcategory: "rebar".into(),
            is_local: false,
            description: String::new(),
            kind: ResourceKind::Material(MaterialDetail {
                unit: Unit::Ton,
                price,
                supplier: String::new(),
                origin: String::new(),
                lead_time_days: 0,
                min_order: 0.0,
            }),
            extra: Default::default(),
        }
    }

    #[test]
    fn catalog_mutation_marks_analyses_dirty() {
        let mut state = EngineState::new();
        state.catalogs.materials.add(material("ST-1", 700.0)).unwrap();
        state.add_project(Project::new("P-1", "Plant")).unwrap();
        state
            .boq_mut("P-1")
            .unwrap()
            .upsert_item(BoqItem::new("I-1", "I-1", "Rebar supply", Unit::Ton, 4.0, 0.0))
            .unwrap();

        let spec = DecompositionSpec {
            mode: ReconcileMode::BottomUp,
            materials: ClassSpec::lines(vec![ComponentInput {
                resource_ref: Some("ST-1".into()),
                description: None,
                quantity: 1.0,
                unit: Unit::Ton,
                unit_price: None,
            }]),
            equipment: ClassSpec::default(),
            labor: ClassSpec::default(),
            subcontractors: ClassSpec::default(),
            overhead_pct: 0.0,
            profit_pct: 0.0,
            contingency_pct: 0.0,
            auto_normalize: false,
        };
        state.analyze_item("P-1", "I-1", &spec, timestamp()).unwrap();
        assert!(!state.analysis("I-1").unwrap().dirty);

        let invalidated = state
            .update_resource(ResourceClass::Materials, "ST-1", |resource| {
                if let ResourceKind::Material(detail) = &mut resource.kind {
                    detail.price = 800.0;
                }
            })
            .unwrap();
        assert_eq!(invalidated, 1);
        let stale = state.analysis("I-1").unwrap();
        assert!(stale.dirty);
        assert!(stale.current_total_cost().is_err());

        // Recomputing clears the dirty bit and picks up the new price.
        let fresh = state.analyze_item("P-1", "I-1", &spec, timestamp()).unwrap();
        assert!(!fresh.dirty);
        assert_eq!(fresh.direct_cost, 800.0);
    }

    #[test]
    fn project_value_prefers_explicit_override() {
        let mut state = EngineState::new();
        let mut project = Project::new("P-1", "Plant");
        project.value = Some(5_000.0);
        state.add_project(project).unwrap();
        state
            .boq_mut("P-1")
            .unwrap()
            .upsert_item(BoqItem::new("I-1", "I-1", "Works", Unit::Piece, 2.0, 100.0))
            .unwrap();
        assert_eq!(state.project_value("P-1").unwrap(), 5_000.0);

        state.update_project("P-1", |project| project.value = None).unwrap();
        assert_eq!(state.project_value("P-1").unwrap(), 200.0);
    }
}
