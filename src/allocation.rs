use crate::boq::BoqItem;
use crate::error::{EngineError, EngineResult};
use crate::project::Project;
use crate::rounding::{round2, round4};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepartmentCategory {
    Administrative,
    Technical,
    Support,
}

impl DepartmentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepartmentCategory::Administrative => "administrative",
            DepartmentCategory::Technical => "technical",
            DepartmentCategory::Support => "support",
        }
    }
}

/// How a support department's cost lands on projects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationMethod {
    PercentOfProjectValue,
    FixedAmountPerProject,
    ProRataByProjectValue,
}

impl AllocationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationMethod::PercentOfProjectValue => "percent_of_project_value",
            AllocationMethod::FixedAmountPerProject => "fixed_amount_per_project",
            AllocationMethod::ProRataByProjectValue => "pro_rata_by_project_value",
        }
    }

    pub fn from_str(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "percent_of_project_value" | "percent" => Some(AllocationMethod::PercentOfProjectValue),
            "fixed_amount_per_project" | "fixed" => Some(AllocationMethod::FixedAmountPerProject),
            "pro_rata_by_project_value" | "pro_rata" => Some(AllocationMethod::ProRataByProjectValue),
            _ => None,
        }
    }
}

impl fmt::Display for AllocationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Department {
    pub id: String,
    pub name: String,
    pub category: DepartmentCategory,
    pub annual_cost: f64,
    #[serde(default)]
    pub staff_count: u32,
    pub allocation_method: AllocationMethod,
    /// Parameter for `percent_of_project_value`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocation_percentage: Option<f64>,
    /// Parameter for `fixed_amount_per_project`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_cost: Option<f64>,
}

impl Department {
    pub fn validate(&self) -> EngineResult<()> {
        if self.id.trim().is_empty() {
            return Err(EngineError::validation_field("department id must not be empty", "id"));
        }
        if !self.annual_cost.is_finite() || self.annual_cost < 0.0 {
            return Err(EngineError::validation_field(
                format!("department '{}' has invalid annual cost", self.id),
                "annual_cost",
            ));
        }
        match self.allocation_method {
            AllocationMethod::PercentOfProjectValue => {
                let pct = self.allocation_percentage.ok_or_else(|| {
                    EngineError::validation_field(
                        format!("department '{}' requires allocation_percentage", self.id),
                        "allocation_percentage",
                    )
                })?;
                if !pct.is_finite() || pct < 0.0 {
                    return Err(EngineError::validation_field(
                        format!("department '{}' allocation_percentage {pct} is invalid", self.id),
                        "allocation_percentage",
                    ));
                }
            }
            AllocationMethod::FixedAmountPerProject => {
                let fixed = self.fixed_cost.ok_or_else(|| {
                    EngineError::validation_field(
                        format!("department '{}' requires fixed_cost", self.id),
                        "fixed_cost",
                    )
                })?;
                if !fixed.is_finite() || fixed < 0.0 {
                    return Err(EngineError::validation_field(
                        format!("department '{}' fixed_cost {fixed} is invalid", self.id),
                        "fixed_cost",
                    ));
                }
            }
            AllocationMethod::ProRataByProjectValue => {}
        }
        Ok(())
    }
}

/// One department-to-project allocation row. `allocation_amount` is always
/// recomputed from the method, never stored authoritatively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub project_id: String,
    pub department_id: String,
    pub method: AllocationMethod,
    pub parameter: f64,
    pub allocation_amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Compute the allocation of one department onto one project.
///
/// `project_value` is the project's effective value (explicit or summed
/// from its BoQ); `active_values` is the value of every active project and
/// is only consulted for pro-rata.
pub fn allocate_department(
    department: &Department,
    project: &Project,
    project_value: f64,
    active_values: &[f64],
) -> EngineResult<Allocation> {
    department.validate()?;
    let (parameter, amount) = match department.allocation_method {
        AllocationMethod::PercentOfProjectValue => {
            let pct = department.allocation_percentage.unwrap_or(0.0);
            (pct, project_value * pct)
        }
        AllocationMethod::FixedAmountPerProject => {
            let fixed = department.fixed_cost.unwrap_or(0.0);
            (fixed, fixed)
        }
        AllocationMethod::ProRataByProjectValue => {
            let total: f64 = active_values.iter().sum();
            if active_values.is_empty() || total <= 0.0 {
                return Err(EngineError::NoActiveProjects);
            }
            (
                department.annual_cost,
                department.annual_cost * (project_value / total),
            )
        }
    };
    Ok(Allocation {
        project_id: project.id.clone(),
        department_id: department.id.clone(),
        method: department.allocation_method,
        parameter,
        allocation_amount: round2(amount),
        notes: None,
    })
}

/// Allocate every department onto one project.
pub fn allocate(
    departments: &[Department],
    project: &Project,
    project_value: f64,
    active_values: &[f64],
) -> EngineResult<Vec<Allocation>> {
    departments
        .iter()
        .map(|department| allocate_department(department, project, project_value, active_values))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageRow {
    pub department_id: String,
    pub department_name: String,
    pub annual_cost: f64,
    pub allocated_total: f64,
    /// allocated / annual cost; 1.0 means fully funded.
    pub coverage: f64,
    /// Positive when allocations fall short of the annual cost.
    pub shortfall: f64,
}

/// Per-department funding picture across all recorded allocations.
pub fn coverage_report(departments: &[Department], allocations: &[Allocation]) -> Vec<CoverageRow> {
    let mut totals: HashMap<&str, f64> = HashMap::new();
    for allocation in allocations {
        *totals.entry(allocation.department_id.as_str()).or_default() +=
            allocation.allocation_amount;
    }
    departments
        .iter()
        .map(|department| {
            let allocated_total = round2(totals.get(department.id.as_str()).copied().unwrap_or(0.0));
            let coverage = if department.annual_cost > 0.0 {
                round4(allocated_total / department.annual_cost)
            } else {
                0.0
            };
            CoverageRow {
                department_id: department.id.clone(),
                department_name: department.name.clone(),
                annual_cost: department.annual_cost,
                allocated_total,
                coverage,
                shortfall: round2(department.annual_cost - allocated_total),
            }
        })
        .collect()
}

/// How a project's total indirect allocation spreads over its BoQ items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemDistribution {
    EqualShare,
    ProportionalToValue,
    ProportionalToDuration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemShare {
    pub item_id: String,
    pub amount: f64,
}

/// Spread `total_allocation` across the items. Duration-proportional
/// distribution needs per-item durations (days); items without an entry get
/// zero weight.
pub fn distribute_to_items(
    total_allocation: f64,
    items: &[BoqItem],
    rule: ItemDistribution,
    durations: Option<&HashMap<String, f64>>,
) -> EngineResult<Vec<ItemShare>> {
    if items.is_empty() {
        return Ok(Vec::new());
    }
    let weights: Vec<f64> = match rule {
        ItemDistribution::EqualShare => vec![1.0; items.len()],
        ItemDistribution::ProportionalToValue => {
            items.iter().map(|item| item.total_price).collect()
        }
        ItemDistribution::ProportionalToDuration => {
            let Some(durations) = durations else {
                return Err(EngineError::validation_field(
                    "duration-proportional distribution requires item durations",
                    "durations",
                ));
            };
            items
                .iter()
                .map(|item| durations.get(&item.id).copied().unwrap_or(0.0))
                .collect()
        }
    };
    let weight_sum: f64 = weights.iter().sum();
    if weight_sum <= 0.0 {
        // Degenerate weights fall back to an even split.
        let share = round2(total_allocation / items.len() as f64);
        return Ok(items
            .iter()
            .map(|item| ItemShare {
                item_id: item.id.clone(),
                amount: share,
            })
            .collect());
    }
    Ok(items
        .iter()
        .zip(weights)
        .map(|(item, weight)| ItemShare {
            item_id: item.id.clone(),
            amount: round2(total_allocation * weight / weight_sum),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pro_rata_department() -> Department {
        Department {
            id: "D-1".into(),
            name: "Engineering office".into(),
            category: DepartmentCategory::Technical,
            annual_cost: 2_400_000.0,
            staff_count: 12,
            allocation_method: AllocationMethod::ProRataByProjectValue,
            allocation_percentage: None,
            fixed_cost: None,
        }
    }

    #[test]
    fn pro_rata_splits_by_project_value() {
        let department = pro_rata_department();
        let project = Project::new("P-1", "Tower");
        let allocation =
            allocate_department(&department, &project, 50_000_000.0, &[50_000_000.0, 30_000_000.0])
                .unwrap();
        assert_eq!(allocation.allocation_amount, 1_500_000.0);
    }

    #[test]
    fn pro_rata_without_active_projects_fails() {
        let department = pro_rata_department();
        let project = Project::new("P-1", "Tower");
        let err = allocate_department(&department, &project, 1_000.0, &[]).unwrap_err();
        assert_eq!(err.kind(), "NoActiveProjects");
    }

    #[test]
    fn fixed_amount_ignores_project_value() {
        let department = Department {
            allocation_method: AllocationMethod::FixedAmountPerProject,
            fixed_cost: Some(10_000.0),
            ..pro_rata_department()
        };
        let project = Project::new("P-2", "Bridge");
        let allocation = allocate_department(&department, &project, 987_654.0, &[]).unwrap();
        assert_eq!(allocation.allocation_amount, 10_000.0);
    }
}
